//! Encounter service: generation, the combat state machine, balance
//! scoring, loot, and resolution.

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use lorekeeper_domain::value_objects::dice;
use lorekeeper_domain::{
    ability_modifier, AbilityScores, CampaignId, Character, CharacterId, CharacterKind,
    CombatLogEntry, Difficulty, Encounter, EncounterId, EncounterStatus, EncounterType, Enemy,
    InitiativeEntry, LocationId, SessionId,
};

use crate::error::EngineError;
use crate::prompts::{self, keys};

use super::{
    require_campaign, response_array, response_str, response_string_list, ServiceDeps,
};

/// Mechanical outcome of one action inside an encounter.
#[derive(Debug, Clone, Serialize)]
pub struct ActionResult {
    pub success: bool,
    pub description: String,
    pub damage_dealt: Option<i32>,
    pub healing: Option<i32>,
    pub conditions_applied: Vec<String>,
    pub target_defeated: bool,
    pub dice_rolls: Vec<Value>,
}

/// Full response to a resolve_action call.
#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    pub encounter_id: EncounterId,
    pub action_result: ActionResult,
    pub narrative: String,
    pub next_turn: Option<InitiativeEntry>,
    pub encounter_status: EncounterStatus,
    pub enemies_remaining: usize,
    pub round_changed: bool,
    pub new_round: Option<i32>,
}

/// Balance analysis of an encounter against the current party.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceReport {
    pub encounter_id: EncounterId,
    pub difficulty_rating: Difficulty,
    pub intended_difficulty: Difficulty,
    pub party_power: f64,
    pub enemy_power: f64,
    pub power_ratio: f64,
    pub estimated_rounds: i32,
    pub survival_chance: f64,
    pub resource_cost: &'static str,
    pub recommendations: Vec<String>,
}

/// Summary returned when an encounter ends.
#[derive(Debug, Clone, Serialize)]
pub struct ResolutionSummary {
    pub encounter_id: EncounterId,
    pub outcome: String,
    pub rounds_taken: i32,
    pub rewards_distributed: bool,
    pub rewards: Option<Value>,
}

/// Party shape used for generation and balancing.
struct PartyInfo {
    size: usize,
    average_level: f64,
    total_hp: i64,
    characters: Vec<Character>,
}

const RESOLUTION_OUTCOMES: [&str; 4] = ["victory", "defeat", "fled", "negotiated"];

#[derive(Clone)]
pub struct EncounterService {
    deps: ServiceDeps,
}

impl EncounterService {
    pub fn new(deps: ServiceDeps) -> Self {
        Self { deps }
    }

    async fn party_info(
        &self,
        conn: &mut sqlx::SqliteConnection,
        campaign_id: CampaignId,
    ) -> Result<PartyInfo, EngineError> {
        let pcs = self
            .deps
            .store
            .characters()
            .list(conn, campaign_id, Some(CharacterKind::Pc), true)
            .await?;
        if pcs.is_empty() {
            return Ok(PartyInfo {
                size: 4,
                average_level: 1.0,
                total_hp: 40,
                characters: Vec::new(),
            });
        }
        let total_levels: i64 = pcs.iter().map(|pc| i64::from(pc.level)).sum();
        let total_hp: i64 = pcs.iter().map(|pc| i64::from(pc.hp_current)).sum();
        Ok(PartyInfo {
            size: pcs.len(),
            average_level: total_levels as f64 / pcs.len() as f64,
            total_hp,
            characters: pcs,
        })
    }

    /// Generate an encounter. Combat and boss encounters get enemies with
    /// ids and full HP, rolled initiative (enemies use their dexterity
    /// modifier, PCs roll flat), and the top of the order marked current.
    pub async fn generate_encounter(
        &self,
        session_id: SessionId,
        encounter_type: EncounterType,
        difficulty: Difficulty,
        location_id: Option<LocationId>,
        theme: Option<&str>,
    ) -> Result<Encounter, EngineError> {
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
        let party = self.party_info(&mut conn, campaign.id).await?;

        let mut graph = self.deps.registry.lock(campaign.id).await?;
        super::ensure_graph_loaded(&mut conn, &mut graph, campaign.id).await?;

        let mut location_text = "Unknown location".to_string();
        if let Some(location_id) = location_id {
            if let Some(location) = store.locations().get(&mut conn, location_id).await? {
                location_text = format!(
                    "{}: {}",
                    location.name,
                    location.description.as_deref().unwrap_or("No description")
                );
            }
        }
        let seeds: Vec<String> = location_id.map(|id| id.to_string()).into_iter().collect();
        let knowledge_context = graph.render_for_prompt(&seeds, 2, 50);

        let party_size = party.size.to_string();
        let party_level = (party.average_level as i64).to_string();
        let system = prompts::render(
            keys::ENCOUNTER_SYSTEM,
            &[
                ("encounter_type", encounter_type.as_str()),
                ("genre", campaign.genre.as_str()),
                ("difficulty", difficulty.as_str()),
                ("party_size", &party_size),
                ("party_level", &party_level),
                ("location_description", &location_text),
                ("knowledge_graph_context", &knowledge_context),
                ("recent_events", "No recent events."),
            ],
        )?;

        let user = match encounter_type {
            EncounterType::Social => prompts::render(
                keys::ENCOUNTER_SOCIAL_USER,
                &[
                    ("stakes", "varies"),
                    ("npcs", "to be determined"),
                    ("location", &location_text),
                    ("tension", "medium"),
                ],
            )?,
            EncounterType::Puzzle => prompts::render(
                keys::ENCOUNTER_PUZZLE_USER,
                &[
                    ("theme", theme.unwrap_or("mysterious")),
                    ("difficulty", difficulty.as_str()),
                    ("location", &location_text),
                ],
            )?,
            EncounterType::Combat | EncounterType::Boss => prompts::render(
                keys::ENCOUNTER_COMBAT_USER,
                &[
                    ("theme", theme.unwrap_or("appropriate for the location")),
                    ("party_size", &party_size),
                    ("party_level", &party_level),
                    ("difficulty", difficulty.as_str()),
                    ("location", &location_text),
                ],
            )?,
            EncounterType::Exploration => prompts::render(
                keys::ENCOUNTER_COMBAT_USER,
                &[
                    ("theme", theme.unwrap_or("exploration hazard")),
                    ("party_size", &party_size),
                    ("party_level", &party_level),
                    ("difficulty", difficulty.as_str()),
                    ("location", &location_text),
                ],
            )?,
        };

        let response = self
            .deps
            .generator
            .generate_structured(&system, &user, "", None, None)
            .await?;

        let mut encounter = Encounter::new(
            session_id,
            response_str(&response, "name").unwrap_or("Unknown Encounter"),
            encounter_type,
            difficulty,
            self.deps.clock.now(),
        );
        encounter.location_id = location_id;
        encounter.description = response_str(&response, "description").map(str::to_string);
        encounter.environmental_effects = response_string_list(&response, "environmental_effects");
        encounter.terrain_features = response_string_list(&response, "terrain_features");
        encounter.rewards = response.get("rewards").cloned();
        encounter.party_level_at_start = Some(party.average_level as i32);
        encounter.party_size_at_start = Some(party.size as i32);

        if encounter_type.has_combatants() {
            encounter.enemies = parse_enemies(response_array(&response, "enemies"));
            encounter.initiative_order = self.roll_initiative_order(&encounter.enemies, &party)?;
            if let Some(first) = encounter.initiative_order.first_mut() {
                first.is_current = true;
            }
        }
        if encounter_type == EncounterType::Social {
            encounter.participants = response_string_list(&response, "participants");
            encounter.social_stakes = response_str(&response, "stakes").map(str::to_string);
        }
        if encounter_type == EncounterType::Puzzle {
            encounter.puzzle_description = response_str(&response, "setup").map(str::to_string);
            encounter.puzzle_solution = response_str(&response, "solution").map(str::to_string);
            encounter.puzzle_hints = response_string_list(&response, "hints");
        }

        let mut tx = store.begin().await?;
        store.encounters().save(&mut tx, &encounter).await?;
        tx.commit().await.map_err(crate::store::StoreError::from)?;
        Ok(encounter)
    }

    fn roll_initiative_order(
        &self,
        enemies: &[Enemy],
        party: &PartyInfo,
    ) -> Result<Vec<InitiativeEntry>, EngineError> {
        let mut order = Vec::new();
        for enemy in enemies {
            let roll = self
                .deps
                .rng
                .with(|rng| dice::roll_initiative(rng, enemy.abilities.dexterity_modifier()))
                .map_err(|e| EngineError::invalid_input(e.to_string()))?;
            order.push(InitiativeEntry {
                character_id: enemy.id.clone(),
                character_name: enemy.name.clone(),
                initiative_roll: roll.total,
                is_enemy: true,
                is_current: false,
            });
        }
        for pc in &party.characters {
            // PC dexterity is not consulted here; flat d20, as the turn
            // engine has no stat source wired for initiative yet.
            let roll = self
                .deps
                .rng
                .with(|rng| dice::roll_initiative(rng, 0))
                .map_err(|e| EngineError::invalid_input(e.to_string()))?;
            order.push(InitiativeEntry {
                character_id: pc.id.to_string(),
                character_name: pc.name.clone(),
                initiative_roll: roll.total,
                is_enemy: false,
                is_current: false,
            });
        }
        order.sort_by(|a, b| b.initiative_roll.cmp(&a.initiative_roll));
        Ok(order)
    }

    /// Resolve one action inside an active encounter and advance the turn.
    ///
    /// Calls for the same encounter serialize on the campaign lock, so the
    /// turn counter advances in arrival order.
    pub async fn resolve_action(
        &self,
        encounter_id: EncounterId,
        character_id: &str,
        action_type: &str,
        target_id: Option<&str>,
        dice_total: Option<i32>,
        _description: Option<&str>,
    ) -> Result<ActionOutcome, EngineError> {
        let store = &self.deps.store;
        let mut conn = store.acquire().await?;

        let mut encounter = store
            .encounters()
            .get(&mut conn, encounter_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Encounter", encounter_id))?;
        if !encounter.is_active() {
            return Err(EngineError::state_violation(format!(
                "encounter {encounter_id} is not active"
            )));
        }

        let session = store
            .sessions()
            .get(&mut conn, encounter.session_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Session", encounter.session_id))?;

        // Serialize turn advancement per campaign (covers the encounter).
        let _graph_guard = self.deps.registry.lock(session.campaign_id).await?;

        // Locate the actor among enemies, falling back to the party.
        // Only a party actor contributes a real strength score; enemy stat
        // blocks are not consulted here, so enemy attacks roll at +0.
        let mut actor_name = "Unknown".to_string();
        let mut actor_strength = 10;
        let mut actor_character: Option<Character> = None;
        if let Some(enemy) = encounter.enemies.iter().find(|e| e.id == character_id) {
            actor_name = enemy.name.clone();
        } else if let Ok(actor_id) = CharacterId::parse(character_id) {
            if let Some(character) = store.characters().get(&mut conn, actor_id).await? {
                actor_name = character.name.clone();
                actor_strength = character.abilities.strength;
                actor_character = Some(character);
            }
        }

        // Locate the target.
        let mut target_name: Option<String> = None;
        let mut target_ac = 10;
        let mut target_enemy_index: Option<usize> = None;
        let mut target_character: Option<Character> = None;
        if let Some(target_id) = target_id {
            if let Some(index) = encounter.enemies.iter().position(|e| e.id == target_id) {
                target_name = Some(encounter.enemies[index].name.clone());
                target_ac = encounter.enemies[index].armor_class;
                target_enemy_index = Some(index);
            } else if let Ok(parsed) = CharacterId::parse(target_id) {
                if let Some(character) = store.characters().get(&mut conn, parsed).await? {
                    target_name = Some(character.name.clone());
                    target_ac = character.armor_class;
                    target_character = Some(character);
                }
            }
        }

        let mut result = ActionResult {
            success: true,
            description: String::new(),
            damage_dealt: None,
            healing: None,
            conditions_applied: Vec::new(),
            target_defeated: false,
            dice_rolls: Vec::new(),
        };

        match action_type {
            "attack" => {
                let display_target = target_name.as_deref().unwrap_or("the air");
                let attack_total = match dice_total {
                    Some(total) => total,
                    None => {
                        let roll = self
                            .deps
                            .rng
                            .with(|rng| {
                                dice::attack_roll(
                                    rng,
                                    target_ac,
                                    ability_modifier(actor_strength),
                                    false,
                                    false,
                                )
                            })
                            .map_err(|e| EngineError::invalid_input(e.to_string()))?;
                        result
                            .dice_rolls
                            .push(serde_json::to_value(&roll).unwrap_or(Value::Null));
                        roll.total
                    }
                };

                let hit = attack_total >= target_ac;
                if hit {
                    // Placeholder damage; weapon and attacker stats are not
                    // consulted by the current resolution rules.
                    let damage_roll = self
                        .deps
                        .rng
                        .with(|rng| dice::roll(rng, "1d8+2"))
                        .map_err(|e| EngineError::invalid_input(e.to_string()))?;
                    let damage = damage_roll.total;
                    result.damage_dealt = Some(damage);
                    result
                        .dice_rolls
                        .push(serde_json::to_value(&damage_roll).unwrap_or(Value::Null));

                    if let Some(index) = target_enemy_index {
                        let enemy = &mut encounter.enemies[index];
                        enemy.hp_current = (enemy.hp_current - damage).max(0);
                        if enemy.hp_current == 0 {
                            enemy.is_defeated = true;
                            result.target_defeated = true;
                        }
                    } else if let Some(character) = target_character.as_mut() {
                        character.apply_damage(damage);
                        character.updated_at = self.deps.clock.now();
                    }

                    result.success = true;
                    result.description =
                        format!("{actor_name} hits {display_target} for {damage} damage!");
                    if result.target_defeated {
                        result
                            .description
                            .push_str(&format!(" {display_target} is defeated!"));
                    }
                } else {
                    result.success = false;
                    result.description = format!("{actor_name}'s attack misses {display_target}.");
                }
            }
            "dodge" => {
                result.description =
                    format!("{actor_name} takes the Dodge action, gaining defensive advantage.");
                result.conditions_applied.push("dodging".to_string());
                if let Some(character) = actor_character.as_mut() {
                    if !character.conditions.contains(&"dodging".to_string()) {
                        character.conditions.push("dodging".to_string());
                        character.updated_at = self.deps.clock.now();
                    }
                }
            }
            "dash" => {
                result.description =
                    format!("{actor_name} dashes, doubling their movement speed.");
            }
            "help" => {
                result.description = format!(
                    "{actor_name} helps an ally, granting them advantage on their next action."
                );
            }
            other => {
                return Err(EngineError::invalid_input(format!(
                    "unknown action type: {other}"
                )));
            }
        }

        encounter.combat_log.push(CombatLogEntry {
            round: encounter.current_round,
            actor: actor_name,
            actor_id: character_id.to_string(),
            action: action_type.to_string(),
            target: target_name,
            target_id: target_id.map(str::to_string),
            result: result.description.clone(),
            damage: result.damage_dealt,
            timestamp: self.deps.clock.now(),
        });

        let round_changed = encounter.advance_turn();
        let new_round = round_changed.then_some(encounter.current_round);

        let enemies_remaining = encounter.enemies_remaining();
        if enemies_remaining == 0 && !encounter.enemies.is_empty() {
            encounter.finish(EncounterStatus::Resolved, self.deps.clock.now());
        }

        let mut tx = store.begin().await?;
        store.encounters().save(&mut tx, &encounter).await?;
        if let Some(character) = &target_character {
            store.characters().save(&mut tx, character).await?;
        }
        if let Some(character) = &actor_character {
            if action_type == "dodge" {
                store.characters().save(&mut tx, character).await?;
            }
        }
        tx.commit().await.map_err(crate::store::StoreError::from)?;

        let next_turn = if encounter.is_active() {
            encounter.current_entry().cloned()
        } else {
            None
        };

        Ok(ActionOutcome {
            encounter_id,
            narrative: result.description.clone(),
            action_result: result,
            next_turn,
            encounter_status: encounter.status,
            enemies_remaining,
            round_changed,
            new_round,
        })
    }

    /// Analyze encounter balance against the current party.
    pub async fn balance_encounter(
        &self,
        encounter_id: EncounterId,
    ) -> Result<BalanceReport, EngineError> {
        let store = &self.deps.store;
        let mut conn = store.acquire().await?;

        let encounter = store
            .encounters()
            .get(&mut conn, encounter_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Encounter", encounter_id))?;
        let session = store
            .sessions()
            .get(&mut conn, encounter.session_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Session", encounter.session_id))?;
        let party = self.party_info(&mut conn, session.campaign_id).await?;

        let party_power = party.total_hp as f64 * 0.5 + party.average_level * party.size as f64 * 10.0;
        let enemy_power: f64 = encounter
            .enemies
            .iter()
            .map(|enemy| {
                f64::from(enemy.hp_max) * 0.5
                    + f64::from(enemy.armor_class) * 2.0
                    + enemy.special_abilities.len() as f64 * 5.0
            })
            .sum();

        let power_ratio = if party_power > 0.0 {
            enemy_power / party_power
        } else {
            1.0
        };

        let (difficulty_rating, survival_chance) = if power_ratio < 0.6 {
            (Difficulty::Easy, 0.95)
        } else if power_ratio < 1.0 {
            (Difficulty::Medium, 0.85)
        } else if power_ratio < 1.5 {
            (Difficulty::Hard, 0.70)
        } else {
            (Difficulty::Deadly, 0.50)
        };

        let total_enemy_hp: i64 = encounter.enemies.iter().map(|e| i64::from(e.hp_max)).sum();
        let avg_damage_per_round = party_power * 0.1;
        let estimated_rounds = if avg_damage_per_round > 0.0 {
            ((total_enemy_hp as f64 / avg_damage_per_round) as i32).max(1)
        } else {
            5
        };

        let mut recommendations = Vec::new();
        if power_ratio > 1.5 {
            recommendations.push("Consider removing an enemy or reducing HP".to_string());
        }
        if power_ratio < 0.5 {
            recommendations.push("Consider adding enemies or increasing difficulty".to_string());
        }
        if estimated_rounds > 10 {
            recommendations.push("Combat may be too long - consider reducing enemy HP".to_string());
        }
        if estimated_rounds < 2 {
            recommendations.push("Combat may be too short - consider adding enemies".to_string());
        }

        let resource_cost = if power_ratio > 1.2 {
            "high"
        } else if power_ratio > 0.8 {
            "medium"
        } else {
            "low"
        };

        Ok(BalanceReport {
            encounter_id,
            difficulty_rating,
            intended_difficulty: encounter.difficulty,
            party_power,
            enemy_power,
            power_ratio: (power_ratio * 100.0).round() / 100.0,
            estimated_rounds,
            survival_chance,
            resource_cost,
            recommendations,
        })
    }

    /// Loot for an encounter: the rewards declared at generation time, or a
    /// fresh generation cached onto the encounter.
    pub async fn generate_loot(&self, encounter_id: EncounterId) -> Result<Value, EngineError> {
        let store = &self.deps.store;
        let mut conn = store.acquire().await?;

        let mut encounter = store
            .encounters()
            .get(&mut conn, encounter_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Encounter", encounter_id))?;
        if let Some(rewards) = &encounter.rewards {
            return Ok(rewards.clone());
        }

        let session = store
            .sessions()
            .get(&mut conn, encounter.session_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Session", encounter.session_id))?;
        let campaign = require_campaign(store, &mut conn, session.campaign_id).await?;

        let system = prompts::render(keys::ITEM_SYSTEM, &[("genre", campaign.genre.as_str())])?;
        let party_level = encounter.party_level_at_start.unwrap_or(1).to_string();
        let user = prompts::render(
            keys::LOOT_USER,
            &[
                ("difficulty", encounter.difficulty.as_str()),
                ("encounter_type", encounter.encounter_type.as_str()),
                ("party_level", &party_level),
                ("theme", "general"),
                ("location", "unknown"),
            ],
        )?;

        let response = self
            .deps
            .generator
            .generate_structured(&system, &user, "", None, None)
            .await?;
        let rewards = Value::Object(response);

        encounter.rewards = Some(rewards.clone());
        let mut tx = store.begin().await?;
        store.encounters().save(&mut tx, &encounter).await?;
        tx.commit().await.map_err(crate::store::StoreError::from)?;
        Ok(rewards)
    }

    /// End an encounter. Victory with reward distribution produces loot and
    /// marks it distributed. The resolved state is terminal.
    pub async fn resolve_encounter(
        &self,
        encounter_id: EncounterId,
        outcome: &str,
        distribute_rewards: bool,
    ) -> Result<ResolutionSummary, EngineError> {
        if !RESOLUTION_OUTCOMES.contains(&outcome) {
            return Err(EngineError::invalid_input(format!(
                "unknown outcome: {outcome}"
            )));
        }

        let store = &self.deps.store;
        let mut conn = store.acquire().await?;
        let mut encounter = store
            .encounters()
            .get(&mut conn, encounter_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Encounter", encounter_id))?;
        if !encounter.is_active() {
            return Err(EngineError::state_violation(format!(
                "encounter {encounter_id} already ended"
            )));
        }
        drop(conn);

        let mut rewards = None;
        let mut rewards_distributed = false;
        if distribute_rewards && outcome == "victory" {
            rewards = Some(self.generate_loot(encounter_id).await?);
            rewards_distributed = true;
            // generate_loot may have persisted rewards; re-read for the save.
            let mut conn = store.acquire().await?;
            if let Some(fresh) = store.encounters().get(&mut conn, encounter_id).await? {
                encounter = fresh;
            }
            encounter.rewards_distributed = true;
        }

        encounter.finish(EncounterStatus::Resolved, self.deps.clock.now());

        let mut tx = store.begin().await?;
        store.encounters().save(&mut tx, &encounter).await?;
        tx.commit().await.map_err(crate::store::StoreError::from)?;

        Ok(ResolutionSummary {
            encounter_id,
            outcome: outcome.to_string(),
            rounds_taken: encounter.current_round,
            rewards_distributed,
            rewards,
        })
    }
}

/// Convert declared enemy blocks into combat-ready enemies: fresh ids,
/// full HP, undefeated.
fn parse_enemies(values: &[Value]) -> Vec<Enemy> {
    values
        .iter()
        .enumerate()
        .filter_map(|(index, value)| {
            let object = value.as_object()?;
            let name = object.get("name")?.as_str()?.to_string();
            let hp_max = object.get("hp_max").and_then(Value::as_i64).unwrap_or(10) as i32;
            let armor_class = object
                .get("armor_class")
                .and_then(Value::as_i64)
                .unwrap_or(10) as i32;
            let abilities = object
                .get("abilities")
                .cloned()
                .and_then(|value| serde_json::from_value::<AbilityScores>(value).ok())
                .unwrap_or_default();
            Some(Enemy {
                id: format!("enemy_{index}_{}", short_suffix()),
                name,
                enemy_type: object
                    .get("type")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                hp_current: hp_max,
                hp_max,
                armor_class,
                abilities,
                attacks: object
                    .get("attacks")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default(),
                special_abilities: object
                    .get("special_abilities")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default(),
                is_defeated: false,
            })
        })
        .collect()
}

fn short_suffix() -> String {
    Uuid::new_v4().simple().to_string().chars().take(8).collect()
}
