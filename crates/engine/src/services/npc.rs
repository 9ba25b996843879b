//! NPC service: generation, dialogue, disposition, and the player-facing
//! view that must never leak secrets.

use serde::Serialize;
use serde_json::Value;

use lorekeeper_domain::{
    CampaignId, Character, CharacterId, CharacterKind, EdgeType, LocationId, NodeType,
    SpeechPattern,
};

use crate::error::EngineError;
use crate::prompts::{self, keys};
use crate::store::save_graph;

use super::{
    ensure_graph_loaded, require_campaign, response_i64, response_str, response_string_list,
    ServiceDeps,
};

/// One dialogue turn, as returned to the DM.
#[derive(Debug, Clone, Serialize)]
pub struct DialogueResult {
    pub character_id: CharacterId,
    pub character_name: String,
    pub dialogue: String,
    pub mood: String,
    pub disposition_change: i32,
    pub new_disposition: i32,
    pub revealed_information: Vec<String>,
    pub internal_thoughts: Option<String>,
}

/// What an NPC remembers about the party.
#[derive(Debug, Clone, Serialize)]
pub struct NpcMemoryView {
    pub npc_id: CharacterId,
    pub npc_name: String,
    pub disposition: i32,
    pub memory: Vec<String>,
    pub known_characters: Vec<(String, String)>,
    pub known_locations: Vec<(String, String)>,
    pub faction_memberships: Vec<(String, String)>,
}

/// Player-visible NPC info. Motivation, secret, and internal thoughts never
/// appear here; disposition is reduced to a demeanor band.
#[derive(Debug, Clone, Serialize)]
pub struct NpcPublicInfo {
    pub id: CharacterId,
    pub name: String,
    pub race: Option<String>,
    pub occupation: Option<String>,
    pub appearance: Option<String>,
    pub demeanor: &'static str,
    pub observable_traits: Vec<String>,
}

#[derive(Clone)]
pub struct NpcService {
    deps: ServiceDeps,
}

impl NpcService {
    pub fn new(deps: ServiceDeps) -> Self {
        Self { deps }
    }

    async fn require_npc(
        &self,
        conn: &mut sqlx::SqliteConnection,
        npc_id: CharacterId,
    ) -> Result<Character, EngineError> {
        let character = self
            .deps
            .store
            .characters()
            .get(conn, npc_id)
            .await?
            .filter(|character| character.kind == CharacterKind::Npc)
            .ok_or_else(|| EngineError::not_found("NPC", npc_id))?;
        Ok(character)
    }

    /// Generate a new NPC, persist it, and register it in the knowledge
    /// graph (with a located_in edge when a location was given).
    pub async fn generate_npc(
        &self,
        campaign_id: CampaignId,
        role: Option<&str>,
        location_id: Option<LocationId>,
        personality_hints: &[String],
        name: Option<&str>,
    ) -> Result<Character, EngineError> {
        let store = &self.deps.store;
        let mut conn = store.acquire().await?;
        let campaign = require_campaign(store, &mut conn, campaign_id).await?;

        let mut graph = self.deps.registry.lock(campaign_id).await?;
        ensure_graph_loaded(&mut conn, &mut graph, campaign_id).await?;

        let mut location_name = "Unknown location".to_string();
        if let Some(location_id) = location_id {
            if let Some(location) = store.locations().get(&mut conn, location_id).await? {
                location_name = format!("{} ({})", location.name, location.location_type);
            }
        }

        let seeds: Vec<String> = location_id.map(|id| id.to_string()).into_iter().collect();
        let knowledge_context = graph.render_for_prompt(&seeds, 2, 50);

        let system = prompts::render(
            keys::NPC_GENERATION_SYSTEM,
            &[
                ("genre", campaign.genre.as_str()),
                ("tone", campaign.tone.as_str()),
                ("knowledge_graph_context", &knowledge_context),
            ],
        )?;
        let hints = if personality_hints.is_empty() {
            "None specified".to_string()
        } else {
            personality_hints.join(", ")
        };
        let user = prompts::render(
            keys::NPC_GENERATION_USER,
            &[
                ("role", role.unwrap_or("general townsperson")),
                ("location", &location_name),
                ("personality_hints", &hints),
            ],
        )?;

        let response = self
            .deps
            .generator
            .generate_structured(&system, &user, "", None, None)
            .await?;

        let mut npc = Character::new(
            campaign_id,
            name.or_else(|| response_str(&response, "name"))
                .unwrap_or("Unknown NPC"),
            CharacterKind::Npc,
            self.deps.clock.now(),
        );
        npc.race = Some(
            response_str(&response, "race")
                .unwrap_or("Human")
                .to_string(),
        );
        npc.char_class = response_str(&response, "occupation").map(str::to_string);
        npc.personality_traits = response_string_list(&response, "personality_traits");
        npc.backstory = response_str(&response, "backstory").map(str::to_string);
        npc.appearance = response_str(&response, "appearance").map(str::to_string);
        npc.motivation = response_str(&response, "motivation").map(str::to_string);
        npc.secret = response_str(&response, "secret").map(str::to_string);
        npc.speech_pattern = Some(
            response_str(&response, "speech_pattern")
                .and_then(|raw| raw.parse::<SpeechPattern>().ok())
                .unwrap_or(SpeechPattern::Casual),
        );
        npc.disposition = response_i64(&response, "initial_disposition")
            .unwrap_or(0)
            .clamp(-100, 100) as i32;
        npc.current_location_id = location_id;

        let snapshot = graph.snapshot();
        let outcome: Result<(), EngineError> = async {
            let mut properties = lorekeeper_domain::Properties::new();
            if let Some(role) = role {
                properties.insert("role".to_string(), Value::String(role.to_string()));
            }
            properties.insert(
                "personality".to_string(),
                serde_json::to_value(&npc.personality_traits).unwrap_or(Value::Null),
            );
            if let Some(motivation) = &npc.motivation {
                properties.insert("motivation".to_string(), Value::String(motivation.clone()));
            }

            graph.add_entity(
                npc.id.to_string(),
                NodeType::Character,
                npc.name.clone(),
                npc.backstory.clone(),
                Some(properties),
                5,
            );
            if let Some(location_id) = location_id {
                // The location may predate the graph; register it on demand.
                if !graph.contains(&location_id.to_string()) {
                    if let Some(location) = store.locations().get(&mut conn, location_id).await? {
                        graph.add_entity(
                            location_id.to_string(),
                            NodeType::Location,
                            location.name.clone(),
                            location.description.clone(),
                            None,
                            5,
                        );
                    }
                }
                if graph.contains(&location_id.to_string()) {
                    graph.add_relationship(
                        &npc.id.to_string(),
                        &location_id.to_string(),
                        EdgeType::LocatedIn,
                        None,
                    )?;
                }
            }

            let mut tx = store.begin().await?;
            store.characters().save(&mut tx, &npc).await?;
            save_graph(&mut tx, campaign_id, &graph).await?;
            tx.commit().await.map_err(crate::store::StoreError::from)?;
            Ok(())
        }
        .await;

        if let Err(err) = outcome {
            *graph = snapshot;
            return Err(err);
        }
        Ok(npc)
    }

    /// One dialogue turn with an NPC. Applies the disposition change and
    /// appends a memory entry summarizing the exchange.
    pub async fn generate_dialogue(
        &self,
        npc_id: CharacterId,
        player_message: &str,
        context: Option<&str>,
    ) -> Result<DialogueResult, EngineError> {
        let store = &self.deps.store;
        let mut conn = store.acquire().await?;
        let mut npc = self.require_npc(&mut conn, npc_id).await?;
        let campaign = require_campaign(store, &mut conn, npc.campaign_id).await?;

        // Hold the campaign lock for the whole turn so concurrent dialogue
        // requests for one campaign serialize.
        let mut graph = self.deps.registry.lock(campaign.id).await?;
        ensure_graph_loaded(&mut conn, &mut graph, campaign.id).await?;
        let knowledge_context = graph.render_for_prompt(&[npc_id.to_string()], 2, 50);

        let memory_text = if npc.npc_memory.is_empty() {
            "No previous interactions.".to_string()
        } else {
            npc.npc_memory
                .iter()
                .rev()
                .take(10)
                .rev()
                .map(|entry| format!("- {entry}"))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let mut current_situation = "General conversation".to_string();
        if let Some(location_id) = npc.current_location_id {
            if let Some(location) = store.locations().get(&mut conn, location_id).await? {
                current_situation = format!("At {}", location.name);
            }
        }

        let traits = if npc.personality_traits.is_empty() {
            "neutral".to_string()
        } else {
            npc.personality_traits.join(", ")
        };
        let disposition = npc.disposition.to_string();
        let system = prompts::render(
            keys::NPC_DIALOGUE_SYSTEM,
            &[
                ("npc_name", npc.name.as_str()),
                ("genre", campaign.genre.as_str()),
                ("personality_traits", &traits),
                ("motivation", npc.motivation.as_deref().unwrap_or("Unknown")),
                ("secret", npc.secret.as_deref().unwrap_or("None")),
                (
                    "speech_pattern",
                    npc.speech_pattern.map_or("casual", |p| p.as_str()),
                ),
                ("disposition", &disposition),
                ("npc_memory", &memory_text),
                ("knowledge_graph_context", &knowledge_context),
                ("current_situation", &current_situation),
            ],
        )?;
        let user = prompts::render(
            keys::NPC_DIALOGUE_USER,
            &[
                ("player_message", player_message),
                ("context", context.unwrap_or("None")),
            ],
        )?;

        // Higher temperature for more varied dialogue.
        let response = self
            .deps
            .generator
            .generate_structured(&system, &user, "", Some(0.9), None)
            .await?;

        let mood = response_str(&response, "mood").unwrap_or("neutral").to_string();
        let disposition_change = response_i64(&response, "disposition_change").unwrap_or(0) as i32;

        let truncated_message: String = player_message.chars().take(100).collect();
        npc.npc_memory.push(format!(
            "Player said: '{truncated_message}' - Responded with {mood} mood"
        ));
        npc.adjust_disposition(disposition_change);
        npc.updated_at = self.deps.clock.now();

        let mut tx = store.begin().await?;
        store.characters().save(&mut tx, &npc).await?;
        tx.commit().await.map_err(crate::store::StoreError::from)?;

        Ok(DialogueResult {
            character_id: npc_id,
            character_name: npc.name.clone(),
            dialogue: response_str(&response, "dialogue").unwrap_or("...").to_string(),
            mood,
            disposition_change,
            new_disposition: npc.disposition,
            revealed_information: response_string_list(&response, "revealed_information"),
            internal_thoughts: response_str(&response, "internal_thoughts").map(str::to_string),
        })
    }

    /// Clamped disposition update with a memory entry describing the event.
    pub async fn update_npc_disposition(
        &self,
        npc_id: CharacterId,
        event_description: &str,
        disposition_change: i32,
    ) -> Result<Character, EngineError> {
        let store = &self.deps.store;
        let mut conn = store.acquire().await?;
        let mut npc = self.require_npc(&mut conn, npc_id).await?;

        npc.adjust_disposition(disposition_change);
        let sign = if disposition_change >= 0 { "+" } else { "" };
        npc.npc_memory.push(format!(
            "Event: {event_description} (disposition {sign}{disposition_change})"
        ));
        npc.updated_at = self.deps.clock.now();

        let mut tx = store.begin().await?;
        store.characters().save(&mut tx, &npc).await?;
        tx.commit().await.map_err(crate::store::StoreError::from)?;
        Ok(npc)
    }

    /// What the NPC remembers, combined with its graph neighborhood.
    pub async fn get_npc_memory(&self, npc_id: CharacterId) -> Result<NpcMemoryView, EngineError> {
        let store = &self.deps.store;
        let mut conn = store.acquire().await?;
        let npc = self.require_npc(&mut conn, npc_id).await?;

        let mut graph = self.deps.registry.lock(npc.campaign_id).await?;
        ensure_graph_loaded(&mut conn, &mut graph, npc.campaign_id).await?;
        let knowledge = graph.get_character_knowledge(&npc_id.to_string());
        drop(graph);

        let pair = |nodes: Vec<lorekeeper_domain::NeighborNode>| {
            nodes
                .into_iter()
                .map(|n| (n.node.id, n.node.name))
                .collect::<Vec<_>>()
        };

        Ok(NpcMemoryView {
            npc_id,
            npc_name: npc.name,
            disposition: npc.disposition,
            memory: npc.npc_memory,
            known_characters: pair(knowledge.known_characters),
            known_locations: pair(knowledge.known_locations),
            faction_memberships: pair(knowledge.faction_memberships),
        })
    }

    /// The player-facing view. Motivation, secret, and internal thoughts
    /// are structurally excluded; at most two personality traits leak
    /// through as "observable".
    pub async fn get_npc_info_for_players(
        &self,
        npc_id: CharacterId,
    ) -> Result<NpcPublicInfo, EngineError> {
        let store = &self.deps.store;
        let mut conn = store.acquire().await?;
        let npc = self.require_npc(&mut conn, npc_id).await?;

        Ok(NpcPublicInfo {
            id: npc.id,
            name: npc.name.clone(),
            race: npc.race.clone(),
            occupation: npc.char_class.clone(),
            appearance: npc.appearance.clone(),
            demeanor: npc.demeanor(),
            observable_traits: npc.personality_traits.iter().take(2).cloned().collect(),
        })
    }
}
