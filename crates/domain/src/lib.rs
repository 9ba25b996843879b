//! Lorekeeper domain layer.
//!
//! This crate contains everything the engine reasons about without touching
//! the outside world:
//!
//! - `ids` - Typed UUID newtypes for every entity
//! - `entities/` - Campaigns, sessions, characters, locations, events, encounters
//! - `value_objects/` - Dice notation and rolling
//! - `graph/` - The in-memory campaign knowledge graph
//! - `error` - Unified domain error type

pub mod entities;
pub mod error;
pub mod graph;
pub mod ids;
pub mod value_objects;

pub use entities::{
    ability_modifier, level_for_xp, AbilityScores, Campaign, Character, CharacterKind,
    CombatLogEntry, ConnectedLocation, Difficulty, Encounter, EncounterStatus, EncounterType,
    Enemy, EventType, GameSession, Genre, InitiativeEntry, KnowledgeUpdate, Location, NewEntity,
    SessionStatus, SpeechPattern, StoryEvent, Tone, XP_THRESHOLDS,
};
pub use error::DomainError;
pub use graph::{
    Direction, EdgeType, GraphEdge, GraphError, GraphExport, GraphNode, KnowledgeGraph,
    NeighborNode, NodeType, Properties, TraversedEdge,
};
pub use ids::{CampaignId, CharacterId, EncounterId, EventId, LocationId, NodeId, SessionId};
pub use value_objects::dice::{
    attack_roll, roll, roll_damage, roll_initiative, roll_stat, roll_stats, roll_with_advantage,
    roll_with_disadvantage, saving_throw, skill_check, DiceNotation, DiceParseError, DiceRoll,
};
