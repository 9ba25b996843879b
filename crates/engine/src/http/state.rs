//! Application state composition.

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::error::EngineError;
use crate::generator::{ClaudeClient, Generator};
use crate::ports::{ClockPort, GeneratorPort, SharedRng, SystemClock};
use crate::registry::GraphRegistry;
use crate::services::{
    EncounterService, MapService, NarrativeService, NpcService, ServiceDeps, WorldStateService,
};
use crate::store::Store;

/// Everything the HTTP handlers reach for. Built once at startup; services
/// share the store pool, the graph registry, the generator, and the RNG.
pub struct AppState {
    pub config: AppConfig,
    pub store: Store,
    pub registry: Arc<GraphRegistry>,
    pub rng: SharedRng,
    pub narrative: NarrativeService,
    pub npc: NpcService,
    pub encounters: EncounterService,
    pub map: MapService,
    pub world: WorldStateService,
}

impl AppState {
    /// Production wiring: Anthropic client, system clock, entropy-seeded
    /// RNG.
    pub async fn new(config: AppConfig) -> Result<Self, EngineError> {
        let client = ClaudeClient::new(
            &config.anthropic_api_key,
            &config.ai_model,
            config.ai_max_tokens,
            config.ai_temperature,
        );
        Self::with_generator(config, Arc::new(client), SharedRng::from_entropy()).await
    }

    /// Wiring with an injected generator port and RNG (tests use a scripted
    /// fake and a fixed seed).
    pub async fn with_generator(
        config: AppConfig,
        port: Arc<dyn GeneratorPort>,
        rng: SharedRng,
    ) -> Result<Self, EngineError> {
        let store = Store::connect(&config.database_url).await?;
        let registry = Arc::new(GraphRegistry::new(Duration::from_secs(
            config.graph_lock_timeout_secs,
        )));
        let clock: Arc<dyn ClockPort> = Arc::new(SystemClock);
        let generator = Generator::new(port, config.generator_max_retries);

        let deps = ServiceDeps {
            store: store.clone(),
            generator,
            registry: registry.clone(),
            clock,
            rng: rng.clone(),
        };

        Ok(Self {
            config,
            store,
            registry,
            rng,
            narrative: NarrativeService::new(deps.clone()),
            npc: NpcService::new(deps.clone()),
            encounters: EncounterService::new(deps.clone()),
            map: MapService::new(deps.clone()),
            world: WorldStateService::new(deps),
        })
    }
}
