//! Character entity - player characters, NPCs, and monsters.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CampaignId, CharacterId, LocationId};

/// What kind of character this is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CharacterKind {
    Pc,
    Npc,
    Monster,
}

impl CharacterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pc => "pc",
            Self::Npc => "npc",
            Self::Monster => "monster",
        }
    }
}

impl fmt::Display for CharacterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CharacterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pc" => Ok(Self::Pc),
            "npc" => Ok(Self::Npc),
            "monster" => Ok(Self::Monster),
            other => Err(format!("Unknown character type: {other}")),
        }
    }
}

/// NPC speech pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechPattern {
    Formal,
    Casual,
    Archaic,
    Broken,
    Eloquent,
    Gruff,
    Nervous,
}

impl SpeechPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Formal => "formal",
            Self::Casual => "casual",
            Self::Archaic => "archaic",
            Self::Broken => "broken",
            Self::Eloquent => "eloquent",
            Self::Gruff => "gruff",
            Self::Nervous => "nervous",
        }
    }
}

impl FromStr for SpeechPattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "formal" => Ok(Self::Formal),
            "casual" => Ok(Self::Casual),
            "archaic" => Ok(Self::Archaic),
            "broken" => Ok(Self::Broken),
            "eloquent" => Ok(Self::Eloquent),
            "gruff" => Ok(Self::Gruff),
            "nervous" => Ok(Self::Nervous),
            other => Err(format!("Unknown speech pattern: {other}")),
        }
    }
}

/// Modifier for an ability score: floor((score - 10) / 2).
pub fn ability_modifier(score: i32) -> i32 {
    (score - 10).div_euclid(2)
}

/// The six ability scores, each in 1..=30
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScores {
    pub strength: i32,
    pub dexterity: i32,
    pub constitution: i32,
    pub intelligence: i32,
    pub wisdom: i32,
    pub charisma: i32,
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self {
            strength: 10,
            dexterity: 10,
            constitution: 10,
            intelligence: 10,
            wisdom: 10,
            charisma: 10,
        }
    }
}

impl AbilityScores {
    pub fn strength_modifier(&self) -> i32 {
        ability_modifier(self.strength)
    }

    pub fn dexterity_modifier(&self) -> i32 {
        ability_modifier(self.dexterity)
    }

    pub fn constitution_modifier(&self) -> i32 {
        ability_modifier(self.constitution)
    }

    /// All six scores are within 1..=30.
    pub fn is_valid(&self) -> bool {
        [
            self.strength,
            self.dexterity,
            self.constitution,
            self.intelligence,
            self.wisdom,
            self.charisma,
        ]
        .iter()
        .all(|score| (1..=30).contains(score))
    }
}

/// XP required to reach levels 1..=20.
pub const XP_THRESHOLDS: [i64; 20] = [
    0, 300, 900, 2700, 6500, 14000, 23000, 34000, 48000, 64000, 85000, 100000, 120000, 140000,
    165000, 195000, 225000, 265000, 305000, 355000,
];

/// The level earned by a total XP amount, capped at 20.
pub fn level_for_xp(xp: i64) -> i32 {
    let mut level = 1;
    for (index, threshold) in XP_THRESHOLDS.iter().enumerate() {
        if xp >= *threshold {
            level = index as i32 + 1;
        }
    }
    level
}

/// A character: PC, NPC, or monster. NPC-only fields stay `None` for PCs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub campaign_id: CampaignId,
    pub name: String,
    pub kind: CharacterKind,
    pub race: Option<String>,
    pub char_class: Option<String>,
    pub level: i32,

    // Combat block
    pub hp_current: i32,
    pub hp_max: i32,
    pub armor_class: i32,
    pub abilities: AbilityScores,

    // Personality and background
    pub personality_traits: Vec<String>,
    pub backstory: Option<String>,
    pub appearance: Option<String>,

    // NPC-only fields - never exposed to players
    pub motivation: Option<String>,
    pub secret: Option<String>,
    pub disposition: i32,
    pub speech_pattern: Option<SpeechPattern>,
    pub npc_memory: Vec<String>,

    // Inventory and equipment
    pub inventory: Vec<serde_json::Value>,
    pub equipment: BTreeMap<String, serde_json::Value>,
    pub gold: i32,

    // Skills and proficiencies
    pub skills: BTreeMap<String, i32>,
    pub proficiencies: Vec<String>,
    pub languages: Vec<String>,

    // Status
    pub is_alive: bool,
    pub conditions: Vec<String>,

    pub current_location_id: Option<LocationId>,
    pub experience_points: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Character {
    pub fn new(
        campaign_id: CampaignId,
        name: impl Into<String>,
        kind: CharacterKind,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CharacterId::new(),
            campaign_id,
            name: name.into(),
            kind,
            race: None,
            char_class: None,
            level: 1,
            hp_current: 10,
            hp_max: 10,
            armor_class: 10,
            abilities: AbilityScores::default(),
            personality_traits: Vec::new(),
            backstory: None,
            appearance: None,
            motivation: None,
            secret: None,
            disposition: 0,
            speech_pattern: None,
            npc_memory: Vec::new(),
            inventory: Vec::new(),
            equipment: BTreeMap::new(),
            gold: 0,
            skills: BTreeMap::new(),
            proficiencies: Vec::new(),
            languages: Vec::new(),
            is_alive: true,
            conditions: Vec::new(),
            current_location_id: None,
            experience_points: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a disposition delta, clamped to [-100, 100].
    pub fn adjust_disposition(&mut self, delta: i32) {
        self.disposition = (self.disposition + delta).clamp(-100, 100);
    }

    /// Public demeanor band shown to players instead of the raw disposition.
    pub fn demeanor(&self) -> &'static str {
        match self.disposition {
            d if d >= 50 => "friendly",
            d if d >= 20 => "warm",
            d if d >= -19 => "neutral",
            d if d >= -49 => "cold",
            _ => "hostile",
        }
    }

    /// Damage the character, flooring HP at zero.
    pub fn apply_damage(&mut self, amount: i32) {
        self.hp_current = (self.hp_current - amount).max(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ability_modifier_floors_toward_negative() {
        assert_eq!(ability_modifier(10), 0);
        assert_eq!(ability_modifier(11), 0);
        assert_eq!(ability_modifier(12), 1);
        assert_eq!(ability_modifier(9), -1);
        assert_eq!(ability_modifier(8), -1);
        assert_eq!(ability_modifier(7), -2);
        assert_eq!(ability_modifier(1), -5);
        assert_eq!(ability_modifier(30), 10);
    }

    #[test]
    fn disposition_clamps_at_both_ends() {
        let now = Utc::now();
        let mut npc = Character::new(CampaignId::new(), "Greta", CharacterKind::Npc, now);
        npc.adjust_disposition(250);
        assert_eq!(npc.disposition, 100);
        npc.adjust_disposition(-500);
        assert_eq!(npc.disposition, -100);
    }

    #[test]
    fn demeanor_bands_match_disposition() {
        let now = Utc::now();
        let mut npc = Character::new(CampaignId::new(), "Greta", CharacterKind::Npc, now);
        let cases = [
            (100, "friendly"),
            (50, "friendly"),
            (49, "warm"),
            (20, "warm"),
            (19, "neutral"),
            (0, "neutral"),
            (-19, "neutral"),
            (-20, "cold"),
            (-49, "cold"),
            (-50, "hostile"),
            (-100, "hostile"),
        ];
        for (disposition, expected) in cases {
            npc.disposition = disposition;
            assert_eq!(npc.demeanor(), expected, "disposition {disposition}");
        }
    }

    #[test]
    fn level_for_xp_uses_threshold_table() {
        assert_eq!(level_for_xp(0), 1);
        assert_eq!(level_for_xp(299), 1);
        assert_eq!(level_for_xp(300), 2);
        assert_eq!(level_for_xp(900), 3);
        assert_eq!(level_for_xp(354_999), 19);
        assert_eq!(level_for_xp(355_000), 20);
        assert_eq!(level_for_xp(9_999_999), 20);
    }

    #[test]
    fn damage_floors_at_zero() {
        let now = Utc::now();
        let mut pc = Character::new(CampaignId::new(), "Alice", CharacterKind::Pc, now);
        pc.apply_damage(4);
        assert_eq!(pc.hp_current, 6);
        pc.apply_damage(100);
        assert_eq!(pc.hp_current, 0);
    }
}
