//! Narrative service: story beats, openings, choice branching, and recaps.

use serde::Serialize;
use serde_json::Value;

use lorekeeper_domain::{
    Campaign, EventId, EventType, KnowledgeUpdate, NewEntity, NodeId, NodeType, SessionId,
    StoryEvent,
};

use crate::error::EngineError;
use crate::generator::PARSE_ERROR_KEY;
use crate::prompts::{self, keys};
use crate::store::save_graph;

use super::{
    character_summaries, ensure_graph_loaded, location_description, recent_events_summary,
    require_campaign, response_i64, response_str, response_string_list, ServiceDeps,
};

/// Aggregated recap of a session.
#[derive(Debug, Clone, Serialize)]
pub struct RecapSummary {
    pub session_id: SessionId,
    pub session_number: i32,
    pub recap: String,
    pub key_events: Vec<String>,
    pub characters_met: Vec<String>,
    pub locations_visited: Vec<String>,
    pub items_acquired: Vec<String>,
    pub total_xp: i64,
}

#[derive(Clone)]
pub struct NarrativeService {
    deps: ServiceDeps,
}

impl NarrativeService {
    pub fn new(deps: ServiceDeps) -> Self {
        Self { deps }
    }

    /// Generate a story beat in response to a player action.
    ///
    /// The canonical pipeline: assemble context from the store and the
    /// campaign graph, call the generator, apply declared entity births to
    /// the graph, append the event, save the graph, commit.
    pub async fn generate_story_beat(
        &self,
        session_id: SessionId,
        player_action: &str,
        additional_context: Option<&str>,
    ) -> Result<StoryEvent, EngineError> {
        let store = &self.deps.store;
        let mut conn = store.acquire().await?;

        let session = store
            .sessions()
            .get(&mut conn, session_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Session", session_id))?;
        if !session.is_active() {
            return Err(EngineError::state_violation(format!(
                "session {session_id} is not active"
            )));
        }
        let campaign = require_campaign(store, &mut conn, session.campaign_id).await?;

        let mut graph = self.deps.registry.lock(campaign.id).await?;
        ensure_graph_loaded(&mut conn, &mut graph, campaign.id).await?;

        // Context assembly.
        let recent_events = recent_events_summary(store, &mut conn, session_id, 10).await?;
        let summaries = character_summaries(store, &mut conn, campaign.id).await?;

        let pcs = store
            .characters()
            .list(&mut conn, campaign.id, Some(lorekeeper_domain::CharacterKind::Pc), false)
            .await?;
        let location_id = pcs.first().and_then(|pc| pc.current_location_id);
        let location = location_description(store, &mut conn, location_id).await?;

        let mut seeds: Vec<String> = pcs.iter().map(|pc| pc.id.to_string()).collect();
        if let Some(location_id) = location_id {
            seeds.push(location_id.to_string());
        }
        let knowledge_context = graph.render_for_prompt(&seeds, 2, 50);

        let system = prompts::render(
            keys::NARRATIVE_SYSTEM,
            &[
                ("genre", campaign.genre.as_str()),
                ("campaign_name", &campaign.name),
                ("tone", campaign.tone.as_str()),
                ("knowledge_graph_context", &knowledge_context),
                ("recent_events_summary", &recent_events),
                ("character_summaries", &summaries),
                ("location_description", &location),
            ],
        )?;
        let user = prompts::render(
            keys::NARRATIVE_USER,
            &[
                ("player_action", player_action),
                ("additional_context", additional_context.unwrap_or("None")),
            ],
        )?;

        let response = self
            .deps
            .generator
            .generate_structured(&system, &user, "", None, None)
            .await?;

        // Unit-of-work: graph mutations + event insert, atomic together.
        let snapshot = graph.snapshot();
        let outcome: Result<StoryEvent, EngineError> = async {
            let new_entities = declared_entities(&response);
            for entity in &new_entities {
                let node_type: NodeType = entity.entity_type.parse().map_err(|err| {
                    tracing::warn!(entity = %entity.name, "generator declared invalid entity type");
                    EngineError::Graph(err)
                })?;
                graph.add_entity(
                    NodeId::new().to_string(),
                    node_type,
                    entity.name.clone(),
                    entity.description.clone(),
                    None,
                    5,
                );
            }

            let mut tx = store.begin().await?;
            let sequence_order = store.events().max_sequence(&mut tx, session_id).await? + 1;

            let mut event = StoryEvent::new(
                session_id,
                EventType::Narrative,
                response_str(&response, "narrative").unwrap_or_default(),
                sequence_order,
                self.deps.clock.now(),
            );
            event.player_action = Some(player_action.to_string());
            event.choices = response
                .get("choices")
                .and_then(Value::as_array)
                .map(|choices| {
                    choices
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                });
            event.mood = Some(
                response_str(&response, "mood")
                    .unwrap_or("neutral")
                    .to_string(),
            );
            event.new_entities = new_entities;
            event.knowledge_updates = declared_updates(&response);
            event.xp_awarded = response_i64(&response, "xp_awarded").map(|xp| xp as i32);
            event.parse_error = response.contains_key(PARSE_ERROR_KEY);
            event.location_id = location_id;

            store.events().insert(&mut tx, &event).await?;
            save_graph(&mut tx, campaign.id, &graph).await?;
            tx.commit().await.map_err(crate::store::StoreError::from)?;
            Ok(event)
        }
        .await;

        if outcome.is_err() {
            *graph = snapshot;
        }
        outcome
    }

    /// Generate the opening scene of a session. Always the first event
    /// (sequence_order = 1); optionally prepends the previous session's
    /// recap.
    pub async fn generate_opening(
        &self,
        session_id: SessionId,
        style: &str,
        include_recap: bool,
    ) -> Result<StoryEvent, EngineError> {
        let store = &self.deps.store;
        let mut conn = store.acquire().await?;

        let session = store
            .sessions()
            .get(&mut conn, session_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Session", session_id))?;
        if !session.is_active() {
            return Err(EngineError::state_violation(format!(
                "session {session_id} is not active"
            )));
        }
        let campaign = require_campaign(store, &mut conn, session.campaign_id).await?;

        let mut graph = self.deps.registry.lock(campaign.id).await?;
        ensure_graph_loaded(&mut conn, &mut graph, campaign.id).await?;

        let mut recap_section = String::new();
        if include_recap && session.session_number > 1 {
            let previous = store
                .sessions()
                .find_by_number(&mut conn, campaign.id, session.session_number - 1)
                .await?;
            if let Some(recap) = previous.and_then(|s| s.recap) {
                recap_section = format!("\nPREVIOUSLY:\n{recap}");
            }
        }

        let summaries = character_summaries(store, &mut conn, campaign.id).await?;
        let pcs = store
            .characters()
            .list(&mut conn, campaign.id, Some(lorekeeper_domain::CharacterKind::Pc), false)
            .await?;
        let location_id = pcs.first().and_then(|pc| pc.current_location_id);
        let location = location_description(store, &mut conn, location_id).await?;
        let seeds: Vec<String> = pcs.iter().map(|pc| pc.id.to_string()).collect();
        let knowledge_context = graph.render_for_prompt(&seeds, 2, 50);

        let system = prompts::render(
            keys::NARRATIVE_SYSTEM,
            &[
                ("genre", campaign.genre.as_str()),
                ("campaign_name", &campaign.name),
                ("tone", campaign.tone.as_str()),
                ("knowledge_graph_context", &knowledge_context),
                ("recent_events_summary", "Starting new session."),
                ("character_summaries", &summaries),
                ("location_description", &location),
            ],
        )?;
        let user = prompts::render(
            keys::OPENING_USER,
            &[("style", style), ("recap_section", &recap_section)],
        )?;

        let response = self
            .deps
            .generator
            .generate_structured(&system, &user, "", None, None)
            .await?;

        let mut tx = store.begin().await?;
        let mut event = StoryEvent::new(
            session_id,
            EventType::Narrative,
            response_str(&response, "narrative").unwrap_or_default(),
            1,
            self.deps.clock.now(),
        );
        event.choices = response
            .get("choices")
            .and_then(Value::as_array)
            .map(|choices| {
                choices
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            });
        event.mood = Some(
            response_str(&response, "mood")
                .unwrap_or("dramatic")
                .to_string(),
        );
        event.new_entities = declared_entities(&response);
        event.knowledge_updates = declared_updates(&response);
        event.parse_error = response.contains_key(PARSE_ERROR_KEY);
        event.location_id = location_id;

        store.events().insert(&mut tx, &event).await?;
        tx.commit().await.map_err(crate::store::StoreError::from)?;
        Ok(event)
    }

    /// Branch the story along one of an event's offered choices.
    pub async fn branch_story(
        &self,
        session_id: SessionId,
        event_id: EventId,
        choice_index: i32,
    ) -> Result<StoryEvent, EngineError> {
        let store = &self.deps.store;
        let chosen_action = {
            let mut conn = store.acquire().await?;
            let event = store
                .events()
                .get(&mut conn, event_id)
                .await?
                .ok_or_else(|| EngineError::not_found("Event", event_id))?;
            let choices = event
                .choices
                .as_ref()
                .filter(|choices| !choices.is_empty())
                .ok_or_else(|| EngineError::invalid_input("event has no choices"))?;
            if choice_index < 0 {
                return Err(EngineError::invalid_input(format!(
                    "invalid choice index: {choice_index}"
                )));
            }
            let chosen = choices
                .get(choice_index as usize)
                .ok_or_else(|| {
                    EngineError::invalid_input(format!("invalid choice index: {choice_index}"))
                })?
                .clone();

            store
                .events()
                .set_chosen_index(&mut conn, event_id, choice_index)
                .await?;
            chosen
        };

        let context = format!("The player chose: {chosen_action}");
        self.generate_story_beat(session_id, &chosen_action, Some(&context))
            .await
    }

    /// Generate and persist a recap of everything that happened in a
    /// session.
    pub async fn generate_recap(&self, session_id: SessionId) -> Result<RecapSummary, EngineError> {
        let store = &self.deps.store;
        let mut conn = store.acquire().await?;

        let mut session = store
            .sessions()
            .get(&mut conn, session_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Session", session_id))?;
        let campaign = require_campaign(store, &mut conn, session.campaign_id).await?;

        let events = store
            .events()
            .list_for_session(&mut conn, session_id, 0, i64::MAX)
            .await?;
        if events.is_empty() {
            return Ok(RecapSummary {
                session_id,
                session_number: session.session_number,
                recap: "Nothing significant happened in this session.".to_string(),
                key_events: Vec::new(),
                characters_met: Vec::new(),
                locations_visited: Vec::new(),
                items_acquired: Vec::new(),
                total_xp: 0,
            });
        }

        let mut events_summary = Vec::new();
        let mut characters_met = Vec::new();
        let mut location_ids = Vec::new();
        let mut items_acquired = Vec::new();
        let mut total_xp: i64 = 0;

        for event in &events {
            if !event.content.is_empty() {
                events_summary.push(event.content.chars().take(300).collect::<String>());
            }
            for entity in &event.new_entities {
                if entity.entity_type == "character" && !characters_met.contains(&entity.name) {
                    characters_met.push(entity.name.clone());
                }
            }
            if let Some(xp) = event.xp_awarded {
                total_xp += i64::from(xp);
            }
            items_acquired.extend(event.items_awarded.iter().cloned());
            if let Some(location_id) = event.location_id {
                if !location_ids.contains(&location_id) {
                    location_ids.push(location_id);
                }
            }
        }

        let mut location_names = Vec::new();
        for location_id in &location_ids {
            if let Some(location) = store.locations().get(&mut conn, *location_id).await? {
                location_names.push(location.name);
            }
        }

        let system = prompts::render(
            keys::RECAP_SYSTEM,
            &[
                ("genre", campaign.genre.as_str()),
                ("tone", campaign.tone.as_str()),
            ],
        )?;
        let session_number = session.session_number.to_string();
        let user = prompts::render(
            keys::RECAP_USER,
            &[
                ("session_number", session_number.as_str()),
                (
                    "events_summary",
                    &events_summary
                        .iter()
                        .take(20)
                        .cloned()
                        .collect::<Vec<_>>()
                        .join("\n"),
                ),
                (
                    "characters",
                    &non_empty_or(&characters_met.join(", "), "None"),
                ),
                (
                    "locations",
                    &non_empty_or(&location_names.join(", "), "Unknown"),
                ),
                (
                    "items",
                    &non_empty_or(
                        &items_acquired
                            .iter()
                            .take(10)
                            .cloned()
                            .collect::<Vec<_>>()
                            .join(", "),
                        "None",
                    ),
                ),
            ],
        )?;

        let response = self
            .deps
            .generator
            .generate_structured(&system, &user, "", None, None)
            .await?;

        let recap = response_str(&response, "recap").unwrap_or_default().to_string();
        session.recap = Some(recap.clone());
        let mut tx = store.begin().await?;
        store.sessions().save(&mut tx, &session).await?;
        tx.commit().await.map_err(crate::store::StoreError::from)?;

        Ok(RecapSummary {
            session_id,
            session_number: session.session_number,
            recap,
            key_events: response_string_list(&response, "key_events"),
            characters_met,
            locations_visited: location_names,
            items_acquired,
            total_xp,
        })
    }

    /// Freeform scene description for a known location.
    pub async fn generate_scene_description(
        &self,
        campaign_id: lorekeeper_domain::CampaignId,
        location_id: lorekeeper_domain::LocationId,
    ) -> Result<String, EngineError> {
        let store = &self.deps.store;
        let mut conn = store.acquire().await?;
        let campaign = require_campaign(store, &mut conn, campaign_id).await?;

        let location = location_description(store, &mut conn, Some(location_id)).await?;
        let mut graph = self.deps.registry.lock(campaign_id).await?;
        ensure_graph_loaded(&mut conn, &mut graph, campaign_id).await?;
        let context = graph.render_for_prompt(&[location_id.to_string()], 2, 50);
        drop(graph);

        let system = scene_system_prompt(&campaign);
        let user = format!(
            "Describe this location in detail:\n\n{location}\n\nCONTEXT:\n{context}\n\n\
             Include:\n- Sensory details (sights, sounds, smells)\n- Atmosphere and mood\n\
             - Notable features\n- Any NPCs or creatures present\n- Points of interest\n\n\
             Keep it to 2-3 paragraphs."
        );

        Ok(self
            .deps
            .generator
            .generate_with_retry(&system, &user, "", None, None)
            .await?)
    }
}

fn scene_system_prompt(campaign: &Campaign) -> String {
    format!(
        "You are describing a location in a {} campaign.\nThe tone is {}. Create vivid, immersive descriptions.",
        campaign.genre, campaign.tone
    )
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    if value.is_empty() {
        fallback.to_string()
    } else {
        value.to_string()
    }
}

/// Entity births declared in a structured response.
fn declared_entities(response: &serde_json::Map<String, Value>) -> Vec<NewEntity> {
    super::response_array(response, "new_entities")
        .iter()
        .filter_map(|value| serde_json::from_value::<NewEntity>(value.clone()).ok())
        .filter(|entity| !entity.name.is_empty() && !entity.entity_type.is_empty())
        .collect()
}

/// Relationship deltas declared in a structured response. Recorded on the
/// event only; a dedicated interpreter would be needed to apply them.
fn declared_updates(response: &serde_json::Map<String, Value>) -> Vec<KnowledgeUpdate> {
    super::response_array(response, "knowledge_updates")
        .iter()
        .filter_map(|value| serde_json::from_value::<KnowledgeUpdate>(value.clone()).ok())
        .collect()
}
