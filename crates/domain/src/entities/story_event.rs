//! Story event entity - one recorded beat of the narrative timeline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{EncounterId, EventId, LocationId, SessionId};

/// Category of story event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Narrative,
    Dialogue,
    Combat,
    Roll,
    System,
    Choice,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Narrative => "narrative",
            Self::Dialogue => "dialogue",
            Self::Combat => "combat",
            Self::Roll => "roll",
            Self::System => "system",
            Self::Choice => "choice",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "narrative" => Ok(Self::Narrative),
            "dialogue" => Ok(Self::Dialogue),
            "combat" => Ok(Self::Combat),
            "roll" => Ok(Self::Roll),
            "system" => Ok(Self::System),
            "choice" => Ok(Self::Choice),
            other => Err(format!("Unknown event type: {other}")),
        }
    }
}

/// An entity birth declared by the generator in a structured response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A relationship delta declared by the generator. Recorded on the event
/// verbatim; not applied to the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeUpdate {
    pub entity: String,
    pub relationship: String,
    pub target: String,
}

/// One beat of the story. `sequence_order` is 1-based and strictly
/// increasing within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryEvent {
    pub id: EventId,
    pub session_id: SessionId,
    pub event_type: EventType,
    /// Markdown narrative content
    pub content: String,

    // Player interaction
    pub player_action: Option<String>,
    pub choices: Option<Vec<String>>,
    pub chosen_index: Option<i32>,

    // Narrative metadata
    pub mood: Option<String>,
    pub speaker: Option<String>,

    pub dice_rolls: Vec<serde_json::Value>,
    pub knowledge_updates: Vec<KnowledgeUpdate>,
    pub new_entities: Vec<NewEntity>,

    // Rewards
    pub xp_awarded: Option<i32>,
    pub items_awarded: Vec<String>,

    /// Set when the generator's structured response failed JSON extraction
    /// and the content fell back to raw text
    pub parse_error: bool,

    pub sequence_order: i32,

    // Associated entities
    pub location_id: Option<LocationId>,
    pub encounter_id: Option<EncounterId>,

    pub created_at: DateTime<Utc>,
}

impl StoryEvent {
    pub fn new(
        session_id: SessionId,
        event_type: EventType,
        content: impl Into<String>,
        sequence_order: i32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EventId::new(),
            session_id,
            event_type,
            content: content.into(),
            player_action: None,
            choices: None,
            chosen_index: None,
            mood: None,
            speaker: None,
            dice_rolls: Vec::new(),
            knowledge_updates: Vec::new(),
            new_entities: Vec::new(),
            xp_awarded: None,
            items_awarded: Vec::new(),
            parse_error: false,
            sequence_order,
            location_id: None,
            encounter_id: None,
            created_at: now,
        }
    }
}
