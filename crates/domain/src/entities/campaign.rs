//! Campaign entity - the root of ownership for a game world.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::CampaignId;

/// Campaign genre
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Genre {
    Fantasy,
    SciFi,
    Horror,
    Steampunk,
}

impl Genre {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fantasy => "fantasy",
            Self::SciFi => "sci-fi",
            Self::Horror => "horror",
            Self::Steampunk => "steampunk",
        }
    }
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Genre {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fantasy" => Ok(Self::Fantasy),
            "sci-fi" | "scifi" => Ok(Self::SciFi),
            "horror" => Ok(Self::Horror),
            "steampunk" => Ok(Self::Steampunk),
            other => Err(format!("Unknown genre: {other}")),
        }
    }
}

/// Campaign storytelling tone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Serious,
    Lighthearted,
    Dark,
    Epic,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Serious => "serious",
            Self::Lighthearted => "lighthearted",
            Self::Dark => "dark",
            Self::Epic => "epic",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Tone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "serious" => Ok(Self::Serious),
            "lighthearted" => Ok(Self::Lighthearted),
            "dark" => Ok(Self::Dark),
            "epic" => Ok(Self::Epic),
            other => Err(format!("Unknown tone: {other}")),
        }
    }
}

/// A campaign - one long-running game world. Every other entity cascades
/// from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    pub description: Option<String>,
    pub genre: Genre,
    pub tone: Tone,
    pub setting_description: Option<String>,
    /// Free-form world rules (key -> rule text)
    pub world_rules: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn new(name: impl Into<String>, genre: Genre, tone: Tone, now: DateTime<Utc>) -> Self {
        Self {
            id: CampaignId::new(),
            name: name.into(),
            description: None,
            genre,
            tone,
            setting_description: None,
            world_rules: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genre_round_trips_through_str() {
        for genre in [Genre::Fantasy, Genre::SciFi, Genre::Horror, Genre::Steampunk] {
            assert_eq!(genre.as_str().parse::<Genre>().expect("parse"), genre);
        }
    }

    #[test]
    fn sci_fi_serializes_with_hyphen() {
        let json = serde_json::to_string(&Genre::SciFi).expect("serialize");
        assert_eq!(json, "\"sci-fi\"");
    }

    #[test]
    fn unknown_tone_is_rejected() {
        assert!("grimdark".parse::<Tone>().is_err());
    }
}
