//! Entity modules (explicit re-export list).

mod campaign;
mod character;
mod encounter;
mod location;
mod session;
mod story_event;

pub use campaign::{Campaign, Genre, Tone};
pub use character::{
    ability_modifier, level_for_xp, AbilityScores, Character, CharacterKind, SpeechPattern,
    XP_THRESHOLDS,
};
pub use encounter::{
    CombatLogEntry, Difficulty, Encounter, EncounterStatus, EncounterType, Enemy, InitiativeEntry,
};
pub use location::{ConnectedLocation, Location};
pub use session::{GameSession, SessionStatus};
pub use story_event::{EventType, KnowledgeUpdate, NewEntity, StoryEvent};
