//! World-state services: the orchestration layer between the HTTP surface,
//! the store, the knowledge graph, and the generator.
//!
//! Every service receives its collaborators at construction (no globals)
//! and runs each mutating operation as one unit-of-work: take the campaign
//! graph lock, snapshot the graph, open a store transaction, do the work,
//! save the graph, commit. On error the transaction rolls back (drop) and
//! the snapshot is restored, so no partial mutation survives.

mod encounter;
mod map;
mod narrative;
mod npc;
mod world_state;

pub use encounter::{
    ActionOutcome, ActionResult, BalanceReport, EncounterService, ResolutionSummary,
};
pub use map::{MapData, MapEdge, MapNode, MapService};
pub use narrative::{NarrativeService, RecapSummary};
pub use npc::{DialogueResult, NpcMemoryView, NpcPublicInfo, NpcService};
pub use world_state::{LevelUp, MovePartyResult, WorldStateService, XpAwardResult};

use std::sync::Arc;

use serde_json::{Map, Value};
use sqlx::SqliteConnection;

use lorekeeper_domain::{
    Campaign, CampaignId, CharacterKind, KnowledgeGraph, LocationId, SessionId,
};

use crate::error::EngineError;
use crate::generator::Generator;
use crate::ports::{ClockPort, SharedRng};
use crate::registry::GraphRegistry;
use crate::store::{load_graph, Store};

/// The collaborators every service is constructed with.
#[derive(Clone)]
pub struct ServiceDeps {
    pub store: Store,
    pub generator: Generator,
    pub registry: Arc<GraphRegistry>,
    pub clock: Arc<dyn ClockPort>,
    pub rng: SharedRng,
}

/// Lock a campaign's graph and make sure it is hydrated before returning
/// the guard.
pub(crate) async fn locked_graph(
    store: &Store,
    registry: &GraphRegistry,
    campaign_id: CampaignId,
) -> Result<tokio::sync::OwnedMutexGuard<KnowledgeGraph>, EngineError> {
    let mut conn = store.acquire().await?;
    let mut graph = registry.lock(campaign_id).await?;
    ensure_graph_loaded(&mut conn, &mut graph, campaign_id).await?;
    Ok(graph)
}

/// Hydrate the locked graph when it is not bound to this campaign yet.
pub(crate) async fn ensure_graph_loaded(
    conn: &mut SqliteConnection,
    graph: &mut KnowledgeGraph,
    campaign_id: CampaignId,
) -> Result<(), EngineError> {
    if graph.campaign_id() != Some(campaign_id) {
        *graph = load_graph(conn, campaign_id).await?;
    }
    Ok(())
}

/// Fetch the campaign or fail with NotFound.
pub(crate) async fn require_campaign(
    store: &Store,
    conn: &mut SqliteConnection,
    campaign_id: CampaignId,
) -> Result<Campaign, EngineError> {
    store
        .campaigns()
        .get(conn, campaign_id)
        .await?
        .ok_or_else(|| EngineError::not_found("Campaign", campaign_id))
}

/// Format the last `limit` events of a session as alternating
/// "Player:"/"Story:" lines for prompt context.
pub(crate) async fn recent_events_summary(
    store: &Store,
    conn: &mut SqliteConnection,
    session_id: SessionId,
    limit: i64,
) -> Result<String, EngineError> {
    let mut events = store
        .events()
        .recent_for_session(conn, session_id, limit)
        .await?;
    if events.is_empty() {
        return Ok("This is the beginning of the adventure.".to_string());
    }
    events.reverse();

    let mut lines = Vec::new();
    for event in &events {
        if let Some(action) = &event.player_action {
            lines.push(format!("Player: {action}"));
        }
        if !event.content.is_empty() {
            let content: String = if event.content.chars().count() > 200 {
                let truncated: String = event.content.chars().take(200).collect();
                format!("{truncated}...")
            } else {
                event.content.clone()
            };
            lines.push(format!("Story: {content}"));
        }
    }
    let tail_start = lines.len().saturating_sub(20);
    Ok(lines[tail_start..].join("\n"))
}

/// Summaries of up to ten living PCs for prompt context.
pub(crate) async fn character_summaries(
    store: &Store,
    conn: &mut SqliteConnection,
    campaign_id: CampaignId,
) -> Result<String, EngineError> {
    let pcs = store
        .characters()
        .list(conn, campaign_id, Some(CharacterKind::Pc), true)
        .await?;
    if pcs.is_empty() {
        return Ok("No active characters.".to_string());
    }

    let summaries: Vec<String> = pcs
        .iter()
        .take(10)
        .map(|character| {
            let mut summary = format!("- {}", character.name);
            if let (Some(race), Some(class)) = (&character.race, &character.char_class) {
                summary.push_str(&format!(" ({race} {class}, Level {})", character.level));
            }
            summary.push_str(&format!(
                " - HP: {}/{}",
                character.hp_current, character.hp_max
            ));
            if !character.personality_traits.is_empty() {
                let traits: Vec<&str> = character
                    .personality_traits
                    .iter()
                    .take(3)
                    .map(String::as_str)
                    .collect();
                summary.push_str(&format!(" - Traits: {}", traits.join(", ")));
            }
            summary
        })
        .collect();
    Ok(summaries.join("\n"))
}

/// A short textual descriptor of a location for prompt context.
pub(crate) async fn location_description(
    store: &Store,
    conn: &mut SqliteConnection,
    location_id: Option<LocationId>,
) -> Result<String, EngineError> {
    let Some(location_id) = location_id else {
        return Ok("Location unknown.".to_string());
    };
    let Some(location) = store.locations().get(conn, location_id).await? else {
        return Ok("Location unknown.".to_string());
    };

    let mut description = format!("{} ({})", location.name, location.location_type);
    description.push('\n');
    description.push_str(
        location
            .description
            .as_deref()
            .unwrap_or("No description available."),
    );
    if let Some(atmosphere) = &location.atmosphere {
        description.push_str(&format!("\nAtmosphere: {atmosphere}"));
    }
    Ok(description)
}

// Accessors for the loosely-shaped structured responses.

pub(crate) fn response_str<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

pub(crate) fn response_i64(map: &Map<String, Value>, key: &str) -> Option<i64> {
    map.get(key).and_then(Value::as_i64)
}

pub(crate) fn response_array<'a>(map: &'a Map<String, Value>, key: &str) -> &'a [Value] {
    map.get(key).and_then(Value::as_array).map_or(&[], Vec::as_slice)
}

pub(crate) fn response_string_list(map: &Map<String, Value>, key: &str) -> Vec<String> {
    response_array(map, key)
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}
