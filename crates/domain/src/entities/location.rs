//! Location entity - places in the game world, with map coordinates and a
//! parent hierarchy (region > city > building > room).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CampaignId, LocationId};

/// An entry in a location's connection list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedLocation {
    pub location_id: LocationId,
    pub name: Option<String>,
    pub path_type: String,
    pub travel_time: Option<String>,
}

/// A place in the world. `parent_location_id` forms a hierarchy; cycles are
/// rejected at the service boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub campaign_id: CampaignId,
    pub name: String,
    pub location_type: String,
    pub description: Option<String>,
    pub detailed_description: Option<String>,

    // Map position
    pub x_coord: f64,
    pub y_coord: f64,

    // Attributes
    pub danger_level: i32,
    pub is_discovered: bool,
    pub is_accessible: bool,

    // Environment
    pub terrain: Option<String>,
    pub climate: Option<String>,
    pub atmosphere: Option<String>,

    // Contents
    pub points_of_interest: Vec<serde_json::Value>,
    pub resources: Vec<String>,
    pub environmental_effects: Vec<String>,

    // Connections and hierarchy
    pub connected_locations: Vec<ConnectedLocation>,
    pub parent_location_id: Option<LocationId>,

    pub properties: BTreeMap<String, serde_json::Value>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Location {
    pub fn new(
        campaign_id: CampaignId,
        name: impl Into<String>,
        location_type: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: LocationId::new(),
            campaign_id,
            name: name.into(),
            location_type: location_type.into(),
            description: None,
            detailed_description: None,
            x_coord: 0.0,
            y_coord: 0.0,
            danger_level: 1,
            is_discovered: false,
            is_accessible: true,
            terrain: None,
            climate: None,
            atmosphere: None,
            points_of_interest: Vec::new(),
            resources: Vec::new(),
            environmental_effects: Vec::new(),
            connected_locations: Vec::new(),
            parent_location_id: None,
            properties: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the danger level, clamped to 1..=10.
    pub fn set_danger_level(&mut self, level: i32) {
        self.danger_level = level.clamp(1, 10);
    }

    /// Euclidean distance to another location on the map plane.
    pub fn distance_to(&self, other: &Location) -> f64 {
        let dx = self.x_coord - other.x_coord;
        let dy = self.y_coord - other.y_coord;
        (dx * dx + dy * dy).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn danger_level_clamps_to_range() {
        let now = Utc::now();
        let mut loc = Location::new(CampaignId::new(), "Pit", "dungeon", now);
        loc.set_danger_level(15);
        assert_eq!(loc.danger_level, 10);
        loc.set_danger_level(-3);
        assert_eq!(loc.danger_level, 1);
    }

    #[test]
    fn distance_is_euclidean() {
        let now = Utc::now();
        let mut a = Location::new(CampaignId::new(), "A", "city", now);
        let mut b = Location::new(CampaignId::new(), "B", "city", now);
        a.x_coord = 0.0;
        a.y_coord = 0.0;
        b.x_coord = 3.0;
        b.y_coord = 4.0;
        assert!((a.distance_to(&b) - 5.0).abs() < f64::EPSILON);
    }
}
