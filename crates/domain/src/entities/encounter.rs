//! Encounter entity and its combat state machine.
//!
//! Invariants while an encounter is active:
//! - exactly one initiative entry has `is_current = true`
//! - `current_turn_index` is that entry's position
//! - `current_round` starts at 1 and increments when the turn index wraps
//!
//! The transition to `Resolved` is irreversible.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::AbilityScores;
use crate::ids::{EncounterId, LocationId, SessionId};

/// Kind of encounter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncounterType {
    Combat,
    Social,
    Puzzle,
    Exploration,
    Boss,
}

impl EncounterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Combat => "combat",
            Self::Social => "social",
            Self::Puzzle => "puzzle",
            Self::Exploration => "exploration",
            Self::Boss => "boss",
        }
    }

    /// Combat and boss encounters carry enemies and an initiative order.
    pub fn has_combatants(&self) -> bool {
        matches!(self, Self::Combat | Self::Boss)
    }
}

impl fmt::Display for EncounterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EncounterType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "combat" => Ok(Self::Combat),
            "social" => Ok(Self::Social),
            "puzzle" => Ok(Self::Puzzle),
            "exploration" => Ok(Self::Exploration),
            "boss" => Ok(Self::Boss),
            other => Err(format!("Unknown encounter type: {other}")),
        }
    }
}

/// Intended difficulty band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Deadly,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
            Self::Deadly => "deadly",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            "deadly" => Ok(Self::Deadly),
            other => Err(format!("Unknown difficulty: {other}")),
        }
    }
}

/// Encounter lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncounterStatus {
    Active,
    Resolved,
    Fled,
    Failed,
}

impl EncounterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Resolved => "resolved",
            Self::Fled => "fled",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for EncounterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EncounterStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "resolved" => Ok(Self::Resolved),
            "fled" => Ok(Self::Fled),
            "failed" => Ok(Self::Failed),
            other => Err(format!("Unknown encounter status: {other}")),
        }
    }
}

/// An enemy inside a combat encounter. Enemies live on the encounter row,
/// not in the characters table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enemy {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub enemy_type: Option<String>,
    pub hp_current: i32,
    pub hp_max: i32,
    pub armor_class: i32,
    #[serde(default)]
    pub abilities: AbilityScores,
    /// Attack blocks as declared by the generator. Stored but not consulted
    /// by action resolution.
    #[serde(default)]
    pub attacks: Vec<serde_json::Value>,
    #[serde(default)]
    pub special_abilities: Vec<serde_json::Value>,
    #[serde(default)]
    pub is_defeated: bool,
}

/// One slot of the initiative order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiativeEntry {
    pub character_id: String,
    pub character_name: String,
    pub initiative_roll: i32,
    pub is_enemy: bool,
    pub is_current: bool,
}

/// Append-only combat log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatLogEntry {
    pub round: i32,
    pub actor: String,
    pub actor_id: String,
    pub action: String,
    pub target: Option<String>,
    pub target_id: Option<String>,
    pub result: String,
    pub damage: Option<i32>,
    pub timestamp: DateTime<Utc>,
}

/// An encounter within a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Encounter {
    pub id: EncounterId,
    pub session_id: SessionId,
    pub location_id: Option<LocationId>,

    pub name: String,
    pub encounter_type: EncounterType,
    pub description: Option<String>,

    pub difficulty: Difficulty,
    pub status: EncounterStatus,

    pub current_round: i32,
    pub current_turn_index: i32,

    pub enemies: Vec<Enemy>,
    pub initiative_order: Vec<InitiativeEntry>,
    pub combat_log: Vec<CombatLogEntry>,

    // Social encounters
    pub participants: Vec<String>,
    pub social_stakes: Option<String>,

    // Puzzle encounters
    pub puzzle_description: Option<String>,
    pub puzzle_solution: Option<String>,
    pub puzzle_hints: Vec<String>,
    pub hints_revealed: i32,

    pub environmental_effects: Vec<String>,
    pub terrain_features: Vec<String>,

    pub rewards: Option<serde_json::Value>,
    pub rewards_distributed: bool,

    pub party_level_at_start: Option<i32>,
    pub party_size_at_start: Option<i32>,

    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Encounter {
    pub fn new(
        session_id: SessionId,
        name: impl Into<String>,
        encounter_type: EncounterType,
        difficulty: Difficulty,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EncounterId::new(),
            session_id,
            location_id: None,
            name: name.into(),
            encounter_type,
            description: None,
            difficulty,
            status: EncounterStatus::Active,
            current_round: 1,
            current_turn_index: 0,
            enemies: Vec::new(),
            initiative_order: Vec::new(),
            combat_log: Vec::new(),
            participants: Vec::new(),
            social_stakes: None,
            puzzle_description: None,
            puzzle_solution: None,
            puzzle_hints: Vec::new(),
            hints_revealed: 0,
            environmental_effects: Vec::new(),
            terrain_features: Vec::new(),
            rewards: None,
            rewards_distributed: false,
            party_level_at_start: None,
            party_size_at_start: None,
            created_at: now,
            ended_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == EncounterStatus::Active
    }

    /// Count of enemies still standing. This is the authoritative number for
    /// the auto-resolve check.
    pub fn enemies_remaining(&self) -> usize {
        self.enemies.iter().filter(|e| !e.is_defeated).count()
    }

    /// Advance to the next turn. Returns `true` when the order wrapped and a
    /// new round began. Keeps the `is_current` flags in sync with
    /// `current_turn_index`.
    pub fn advance_turn(&mut self) -> bool {
        if self.initiative_order.is_empty() {
            return false;
        }
        self.current_turn_index += 1;
        let mut round_changed = false;
        if self.current_turn_index as usize >= self.initiative_order.len() {
            self.current_turn_index = 0;
            self.current_round += 1;
            round_changed = true;
        }
        for (index, entry) in self.initiative_order.iter_mut().enumerate() {
            entry.is_current = index == self.current_turn_index as usize;
        }
        round_changed
    }

    /// The initiative entry whose turn it is, if combat is running.
    pub fn current_entry(&self) -> Option<&InitiativeEntry> {
        self.initiative_order.get(self.current_turn_index as usize)
    }

    /// End the encounter. The resolved state is terminal.
    pub fn finish(&mut self, status: EncounterStatus, now: DateTime<Utc>) {
        self.status = status;
        self.ended_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encounter_with_order(entries: usize) -> Encounter {
        let now = Utc::now();
        let mut encounter = Encounter::new(
            SessionId::new(),
            "Ambush",
            EncounterType::Combat,
            Difficulty::Medium,
            now,
        );
        for index in 0..entries {
            encounter.initiative_order.push(InitiativeEntry {
                character_id: format!("c{index}"),
                character_name: format!("Fighter {index}"),
                initiative_roll: 20 - index as i32,
                is_enemy: index % 2 == 0,
                is_current: index == 0,
            });
        }
        encounter
    }

    #[test]
    fn advance_turn_wraps_and_bumps_round() {
        let mut encounter = encounter_with_order(4);
        assert!(!encounter.advance_turn());
        assert!(!encounter.advance_turn());
        assert!(!encounter.advance_turn());
        // Fourth advance wraps back to the top of the order.
        assert!(encounter.advance_turn());
        assert_eq!(encounter.current_round, 2);
        assert_eq!(encounter.current_turn_index, 0);
    }

    #[test]
    fn exactly_one_entry_is_current_after_advances() {
        let mut encounter = encounter_with_order(3);
        for _ in 0..7 {
            encounter.advance_turn();
            let current_count = encounter
                .initiative_order
                .iter()
                .filter(|e| e.is_current)
                .count();
            assert_eq!(current_count, 1);
            let current_index = encounter
                .initiative_order
                .iter()
                .position(|e| e.is_current)
                .expect("current entry");
            assert_eq!(current_index as i32, encounter.current_turn_index);
        }
    }

    #[test]
    fn round_follows_turns_taken() {
        let mut encounter = encounter_with_order(3);
        for turn in 1..=10 {
            encounter.advance_turn();
            assert_eq!(encounter.current_round, 1 + turn / 3);
            assert_eq!(encounter.current_turn_index, turn % 3);
        }
    }

    #[test]
    fn enemies_remaining_counts_undefeated() {
        let now = Utc::now();
        let mut encounter = Encounter::new(
            SessionId::new(),
            "Pack",
            EncounterType::Combat,
            Difficulty::Easy,
            now,
        );
        for index in 0..3 {
            encounter.enemies.push(Enemy {
                id: format!("e{index}"),
                name: format!("Wolf {index}"),
                enemy_type: Some("beast".to_string()),
                hp_current: 11,
                hp_max: 11,
                armor_class: 13,
                abilities: AbilityScores::default(),
                attacks: Vec::new(),
                special_abilities: Vec::new(),
                is_defeated: false,
            });
        }
        assert_eq!(encounter.enemies_remaining(), 3);
        encounter.enemies[1].is_defeated = true;
        assert_eq!(encounter.enemies_remaining(), 2);
    }
}
