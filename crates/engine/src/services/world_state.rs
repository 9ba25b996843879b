//! World-state manager: read-only aggregate views plus the two multi-entity
//! write operations (party movement and XP awards).

use serde::Serialize;
use serde_json::{json, Value};

use lorekeeper_domain::{
    level_for_xp, CampaignId, CharacterKind, LocationId, SessionId, SessionStatus,
};

use crate::error::EngineError;

use super::{ensure_graph_loaded, require_campaign, ServiceDeps};

/// One character's level gain from an XP award.
#[derive(Debug, Clone, Serialize)]
pub struct LevelUp {
    pub character_id: lorekeeper_domain::CharacterId,
    pub character_name: String,
    pub old_level: i32,
    pub new_level: i32,
    pub hp_increase: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct XpAwardResult {
    pub total_xp_awarded: i64,
    pub xp_per_character: i64,
    pub reason: Option<String>,
    pub characters_awarded: usize,
    pub level_ups: Vec<LevelUp>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MovePartyResult {
    pub previous_location: Option<Value>,
    pub new_location: Value,
    pub party_moved: usize,
    pub newly_discovered: bool,
}

#[derive(Clone)]
pub struct WorldStateService {
    deps: ServiceDeps,
}

impl WorldStateService {
    pub fn new(deps: ServiceDeps) -> Self {
        Self { deps }
    }

    /// Complete campaign overview: counts, active session, party, graph
    /// stats.
    pub async fn get_campaign_state(&self, campaign_id: CampaignId) -> Result<Value, EngineError> {
        let store = &self.deps.store;
        let mut conn = store.acquire().await?;
        let campaign = require_campaign(store, &mut conn, campaign_id).await?;

        let counts = store.campaigns().counts(&mut conn, campaign_id).await?;
        let sessions = store.sessions().list_for_campaign(&mut conn, campaign_id).await?;
        let active_session = sessions.iter().find(|s| s.status == SessionStatus::Active);
        let pcs = store
            .characters()
            .list(&mut conn, campaign_id, Some(CharacterKind::Pc), false)
            .await?;

        let mut graph = self.deps.registry.lock(campaign_id).await?;
        ensure_graph_loaded(&mut conn, &mut graph, campaign_id).await?;
        let stats = graph.stats();
        drop(graph);

        Ok(json!({
            "campaign": {
                "id": campaign.id,
                "name": campaign.name,
                "description": campaign.description,
                "genre": campaign.genre,
                "tone": campaign.tone,
                "created_at": campaign.created_at,
            },
            "stats": {
                "sessions": counts.sessions,
                "characters": counts.characters,
                "locations": counts.locations,
                "knowledge_nodes": stats.total_nodes,
                "knowledge_edges": stats.total_edges,
            },
            "active_session": active_session.map(|session| json!({
                "id": session.id,
                "number": session.session_number,
                "started_at": session.started_at,
            })),
            "party": pcs.iter().map(|pc| json!({
                "id": pc.id,
                "name": pc.name,
                "race": pc.race,
                "class": pc.char_class,
                "level": pc.level,
                "hp_current": pc.hp_current,
                "hp_max": pc.hp_max,
            })).collect::<Vec<_>>(),
        }))
    }

    /// Session-level view: latest event, active encounter, party, location.
    pub async fn get_session_state(&self, session_id: SessionId) -> Result<Value, EngineError> {
        let store = &self.deps.store;
        let mut conn = store.acquire().await?;

        let session = store
            .sessions()
            .get(&mut conn, session_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Session", session_id))?;

        let event_count = store.events().count_for_session(&mut conn, session_id).await?;
        let latest_event = store
            .events()
            .recent_for_session(&mut conn, session_id, 1)
            .await?
            .into_iter()
            .next();
        let active_encounter = store
            .encounters()
            .active_for_session(&mut conn, session_id)
            .await?;

        let pcs = store
            .characters()
            .list(&mut conn, session.campaign_id, Some(CharacterKind::Pc), true)
            .await?;
        let current_location = match pcs.first().and_then(|pc| pc.current_location_id) {
            Some(location_id) => store.locations().get(&mut conn, location_id).await?,
            None => None,
        };

        Ok(json!({
            "session": {
                "id": session.id,
                "campaign_id": session.campaign_id,
                "number": session.session_number,
                "status": session.status,
                "started_at": session.started_at,
            },
            "event_count": event_count,
            "latest_event": latest_event.map(|event| json!({
                "id": event.id,
                "type": event.event_type,
                "mood": event.mood,
                "content_preview": event.content.chars().take(200).collect::<String>(),
                "has_choices": event.choices.as_ref().is_some_and(|c| !c.is_empty()),
            })),
            "active_encounter": active_encounter.map(|encounter| json!({
                "id": encounter.id,
                "name": encounter.name,
                "type": encounter.encounter_type,
                "status": encounter.status,
                "round": encounter.current_round,
            })),
            "party_status": pcs.iter().map(|pc| json!({
                "id": pc.id,
                "name": pc.name,
                "hp_current": pc.hp_current,
                "hp_max": pc.hp_max,
                "conditions": pc.conditions,
            })).collect::<Vec<_>>(),
            "current_location": current_location.map(|location| json!({
                "id": location.id,
                "name": location.name,
                "type": location.location_type,
                "description": location.description,
                "danger_level": location.danger_level,
            })),
        }))
    }

    /// Detailed party status with aggregate totals.
    pub async fn get_party_status(&self, campaign_id: CampaignId) -> Result<Value, EngineError> {
        let store = &self.deps.store;
        let mut conn = store.acquire().await?;
        require_campaign(store, &mut conn, campaign_id).await?;

        let pcs = store
            .characters()
            .list(&mut conn, campaign_id, Some(CharacterKind::Pc), false)
            .await?;

        let alive: Vec<_> = pcs.iter().filter(|pc| pc.is_alive).collect();
        let total_hp: i64 = alive.iter().map(|pc| i64::from(pc.hp_current)).sum();
        let total_max_hp: i64 = alive.iter().map(|pc| i64::from(pc.hp_max)).sum();
        let total_xp: i64 = pcs.iter().map(|pc| pc.experience_points).sum();
        let total_gold: i64 = pcs.iter().map(|pc| i64::from(pc.gold)).sum();
        let average_level = if pcs.is_empty() {
            1.0
        } else {
            pcs.iter().map(|pc| f64::from(pc.level)).sum::<f64>() / pcs.len() as f64
        };
        let hp_percentage = if total_max_hp > 0 {
            (total_hp as f64 / total_max_hp as f64 * 1000.0).round() / 10.0
        } else {
            0.0
        };

        Ok(json!({
            "party_size": pcs.len(),
            "alive_members": alive.len(),
            "total_hp": total_hp,
            "total_max_hp": total_max_hp,
            "hp_percentage": hp_percentage,
            "average_level": (average_level * 10.0).round() / 10.0,
            "total_xp": total_xp,
            "total_gold": total_gold,
            "members": pcs.iter().map(|pc| json!({
                "id": pc.id,
                "name": pc.name,
                "race": pc.race,
                "class": pc.char_class,
                "level": pc.level,
                "hp_current": pc.hp_current,
                "hp_max": pc.hp_max,
                "hp_percentage": if pc.hp_max > 0 {
                    (f64::from(pc.hp_current) / f64::from(pc.hp_max) * 1000.0).round() / 10.0
                } else {
                    0.0
                },
                "ac": pc.armor_class,
                "is_alive": pc.is_alive,
                "conditions": pc.conditions,
                "gold": pc.gold,
                "xp": pc.experience_points,
                "current_location_id": pc.current_location_id,
            })).collect::<Vec<_>>(),
        }))
    }

    /// Location view combining the row, present characters, and graph
    /// context.
    pub async fn get_location_state(&self, location_id: LocationId) -> Result<Value, EngineError> {
        let store = &self.deps.store;
        let mut conn = store.acquire().await?;

        let location = store
            .locations()
            .get(&mut conn, location_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Location", location_id))?;

        let characters = store
            .characters()
            .list_at_location(&mut conn, location_id, true)
            .await?;

        let mut graph = self.deps.registry.lock(location.campaign_id).await?;
        ensure_graph_loaded(&mut conn, &mut graph, location.campaign_id).await?;
        let context = graph.get_context_for_location(&location_id.to_string());
        drop(graph);

        Ok(json!({
            "location": {
                "id": location.id,
                "name": location.name,
                "type": location.location_type,
                "description": location.description,
                "detailed_description": location.detailed_description,
                "danger_level": location.danger_level,
                "is_discovered": location.is_discovered,
                "terrain": location.terrain,
                "climate": location.climate,
                "atmosphere": location.atmosphere,
                "coordinates": { "x": location.x_coord, "y": location.y_coord },
            },
            "characters_present": characters.iter().map(|character| json!({
                "id": character.id,
                "name": character.name,
                "type": character.kind,
                "disposition": (character.kind == CharacterKind::Npc)
                    .then_some(character.disposition),
            })).collect::<Vec<_>>(),
            "points_of_interest": location.points_of_interest,
            "environmental_effects": location.environmental_effects,
            "connected_locations": location.connected_locations,
            "parent_location_id": location.parent_location_id,
            "knowledge_context": {
                "recent_events": context.recent_events.iter().take(5).map(|event| json!({
                    "name": event.node.name,
                    "description": event.node.description,
                })).collect::<Vec<_>>(),
                "known_items": context.items.iter().take(10).map(|item| json!({
                    "name": item.node.name,
                })).collect::<Vec<_>>(),
            },
        }))
    }

    /// Campaign-wide event timeline, newest first.
    pub async fn get_timeline(
        &self,
        campaign_id: CampaignId,
        limit: i64,
    ) -> Result<Vec<Value>, EngineError> {
        let store = &self.deps.store;
        let mut conn = store.acquire().await?;
        require_campaign(store, &mut conn, campaign_id).await?;

        let rows = store
            .events()
            .recent_for_campaign(&mut conn, campaign_id, limit)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                json!({
                    "event_id": row.event.id,
                    "session_id": row.event.session_id,
                    "session_number": row.session_number,
                    "event_type": row.event.event_type,
                    "content_preview": row.event.content.chars().take(150).collect::<String>(),
                    "mood": row.event.mood,
                    "has_choices": row.event.choices.as_ref().is_some_and(|c| !c.is_empty()),
                    "xp_awarded": row.event.xp_awarded,
                    "created_at": row.event.created_at,
                })
            })
            .collect())
    }

    /// Move every living PC to the destination and mark it discovered.
    /// Idempotent on the location fields.
    pub async fn move_party(
        &self,
        campaign_id: CampaignId,
        destination_id: LocationId,
    ) -> Result<MovePartyResult, EngineError> {
        let store = &self.deps.store;
        let mut conn = store.acquire().await?;
        require_campaign(store, &mut conn, campaign_id).await?;

        let mut destination = store
            .locations()
            .get(&mut conn, destination_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Location", destination_id))?;
        if destination.campaign_id != campaign_id {
            return Err(EngineError::not_found("Location", destination_id));
        }

        let mut pcs = store
            .characters()
            .list(&mut conn, campaign_id, Some(CharacterKind::Pc), true)
            .await?;

        let previous_location = match pcs.first().and_then(|pc| pc.current_location_id) {
            Some(location_id) => store.locations().get(&mut conn, location_id).await?,
            None => None,
        };

        let newly_discovered = !destination.is_discovered;
        let now = self.deps.clock.now();

        let mut tx = store.begin().await?;
        for pc in &mut pcs {
            pc.current_location_id = Some(destination_id);
            pc.updated_at = now;
            store.characters().save(&mut tx, pc).await?;
        }
        if newly_discovered {
            destination.is_discovered = true;
            destination.updated_at = now;
            store.locations().save(&mut tx, &destination).await?;
        }
        tx.commit().await.map_err(crate::store::StoreError::from)?;

        Ok(MovePartyResult {
            previous_location: previous_location.map(|location| {
                json!({ "id": location.id, "name": location.name })
            }),
            new_location: json!({
                "id": destination.id,
                "name": destination.name,
                "type": destination.location_type,
                "description": destination.description,
                "danger_level": destination.danger_level,
            }),
            party_moved: pcs.len(),
            newly_discovered,
        })
    }

    /// Split XP evenly across living PCs and apply level gains from the
    /// threshold table. Levels cap at 20; each gained level grants
    /// 5 + CON modifier hit points.
    pub async fn award_xp(
        &self,
        campaign_id: CampaignId,
        xp_amount: i64,
        reason: Option<&str>,
    ) -> Result<XpAwardResult, EngineError> {
        if xp_amount < 0 {
            return Err(EngineError::invalid_input("xp_amount must be non-negative"));
        }

        let store = &self.deps.store;
        let mut conn = store.acquire().await?;
        require_campaign(store, &mut conn, campaign_id).await?;

        let mut pcs = store
            .characters()
            .list(&mut conn, campaign_id, Some(CharacterKind::Pc), true)
            .await?;

        let xp_per_character = if pcs.is_empty() {
            0
        } else {
            xp_amount / pcs.len() as i64
        };

        let now = self.deps.clock.now();
        let mut level_ups = Vec::new();
        let mut tx = store.begin().await?;
        for pc in &mut pcs {
            let old_level = pc.level;
            pc.experience_points += xp_per_character;
            let new_level = level_for_xp(pc.experience_points);

            if new_level > old_level {
                pc.level = new_level;
                let hp_increase = 5 + pc.abilities.constitution_modifier();
                pc.hp_max += hp_increase;
                pc.hp_current += hp_increase;
                level_ups.push(LevelUp {
                    character_id: pc.id,
                    character_name: pc.name.clone(),
                    old_level,
                    new_level,
                    hp_increase,
                });
            }
            pc.updated_at = now;
            store.characters().save(&mut tx, pc).await?;
        }
        tx.commit().await.map_err(crate::store::StoreError::from)?;

        Ok(XpAwardResult {
            total_xp_awarded: xp_amount,
            xp_per_character,
            reason: reason.map(str::to_string),
            characters_awarded: pcs.len(),
            level_ups,
        })
    }
}
