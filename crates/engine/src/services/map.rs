//! Map service: location generation, dungeons, world regions, connections,
//! discovery, and map data for clients.

use rand::Rng;
use serde::Serialize;
use serde_json::Value;

use lorekeeper_domain::{
    CampaignId, ConnectedLocation, EdgeType, KnowledgeGraph, Location, LocationId, NodeType,
    Properties,
};

use crate::error::EngineError;
use crate::prompts::{self, keys};
use crate::store::save_graph;

use super::{ensure_graph_loaded, require_campaign, response_str, response_string_list, ServiceDeps};

/// A location as rendered on the map.
#[derive(Debug, Clone, Serialize)]
pub struct MapNode {
    pub id: LocationId,
    pub name: String,
    #[serde(rename = "type")]
    pub location_type: String,
    pub x: f64,
    pub y: f64,
    pub danger_level: i32,
    pub is_discovered: bool,
    pub terrain: Option<String>,
    pub parent_id: Option<LocationId>,
}

/// A travel connection between two map nodes (reverse edges deduped).
#[derive(Debug, Clone, Serialize)]
pub struct MapEdge {
    pub source: LocationId,
    pub target: LocationId,
    pub path_type: String,
    pub travel_time: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MapData {
    pub campaign_id: CampaignId,
    pub nodes: Vec<MapNode>,
    pub edges: Vec<MapEdge>,
    pub total_locations: usize,
}

const REGION_PATH_TYPES: [&str; 4] = ["road", "trail", "river", "mountain pass"];
const DUNGEON_ROOM_TYPES: [&str; 7] = [
    "chamber",
    "corridor",
    "hall",
    "vault",
    "trap room",
    "puzzle room",
    "boss chamber",
];
const REGION_LOCATION_TYPES: [&str; 6] =
    ["city", "town", "village", "wilderness", "dungeon", "landmark"];

/// Minimum spacing between generated locations on the map plane.
const MIN_LOCATION_DISTANCE: f64 = 20.0;

#[derive(Clone)]
pub struct MapService {
    deps: ServiceDeps,
}

impl MapService {
    pub fn new(deps: ServiceDeps) -> Self {
        Self { deps }
    }

    /// Scatter coordinates near the parent (or anywhere in world space),
    /// retrying up to ten times to keep a minimum distance from existing
    /// locations.
    fn generate_coordinates(
        &self,
        parent: Option<&Location>,
        existing: &[Location],
    ) -> (f64, f64) {
        self.deps.rng.with(|rng| {
            let (mut x, mut y) = match parent {
                Some(parent) => (
                    parent.x_coord + rng.gen_range(-50.0..=50.0),
                    parent.y_coord + rng.gen_range(-50.0..=50.0),
                ),
                None => (
                    rng.gen_range(-500.0..=500.0),
                    rng.gen_range(-500.0..=500.0),
                ),
            };

            for _ in 0..10 {
                let overlaps = existing.iter().any(|location| {
                    let dx = x - location.x_coord;
                    let dy = y - location.y_coord;
                    (dx * dx + dy * dy).sqrt() < MIN_LOCATION_DISTANCE
                });
                if !overlaps {
                    break;
                }
                x += rng.gen_range(-30.0..=30.0);
                y += rng.gen_range(-30.0..=30.0);
            }

            ((x * 100.0).round() / 100.0, (y * 100.0).round() / 100.0)
        })
    }

    /// Generate one location and register it in the knowledge graph.
    pub async fn generate_location(
        &self,
        campaign_id: CampaignId,
        location_type: &str,
        theme: Option<&str>,
        danger_level: i32,
        parent_location_id: Option<LocationId>,
        name: Option<&str>,
    ) -> Result<Location, EngineError> {
        let store = &self.deps.store;
        let mut conn = store.acquire().await?;
        let campaign = require_campaign(store, &mut conn, campaign_id).await?;

        let mut graph = self.deps.registry.lock(campaign_id).await?;
        ensure_graph_loaded(&mut conn, &mut graph, campaign_id).await?;
        let knowledge_context = graph.render_for_prompt(&[], 2, 50);

        let existing = store
            .locations()
            .list_for_campaign(&mut conn, campaign_id, false)
            .await?;
        let parent = parent_location_id
            .and_then(|parent_id| existing.iter().find(|l| l.id == parent_id).cloned());
        let connected_text = parent
            .as_ref()
            .map_or("None specified".to_string(), |p| p.name.clone());

        let system = prompts::render(
            keys::LOCATION_SYSTEM,
            &[
                ("genre", campaign.genre.as_str()),
                ("tone", campaign.tone.as_str()),
                ("knowledge_graph_context", &knowledge_context),
            ],
        )?;
        let danger_text = danger_level.to_string();
        let user = prompts::render(
            keys::LOCATION_USER,
            &[
                ("location_type", location_type),
                ("theme", theme.unwrap_or("appropriate to the world")),
                ("danger_level", &danger_text),
                ("connected_locations", &connected_text),
            ],
        )?;

        let response = self
            .deps
            .generator
            .generate_structured(&system, &user, "", None, None)
            .await?;

        let (x, y) = self.generate_coordinates(parent.as_ref(), &existing);

        let mut location = Location::new(
            campaign_id,
            name.or_else(|| response_str(&response, "name"))
                .unwrap_or("Unknown Location"),
            response_str(&response, "location_type").unwrap_or(location_type),
            self.deps.clock.now(),
        );
        location.description = response_str(&response, "description").map(str::to_string);
        location.detailed_description =
            response_str(&response, "detailed_description").map(str::to_string);
        location.x_coord = x;
        location.y_coord = y;
        location.set_danger_level(
            response
                .get("danger_level")
                .and_then(Value::as_i64)
                .map_or(danger_level, |v| v as i32),
        );
        location.terrain = response_str(&response, "terrain").map(str::to_string);
        location.climate = response_str(&response, "climate").map(str::to_string);
        location.atmosphere = response_str(&response, "atmosphere").map(str::to_string);
        location.points_of_interest = response
            .get("points_of_interest")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        location.resources = response_string_list(&response, "resources");
        location.environmental_effects = response_string_list(&response, "environmental_effects");
        location.parent_location_id = parent.as_ref().map(|p| p.id);
        for key in ["lore", "potential_encounters", "npcs"] {
            if let Some(value) = response.get(key) {
                location.properties.insert(key.to_string(), value.clone());
            }
        }

        let snapshot = graph.snapshot();
        let outcome: Result<(), EngineError> = async {
            let mut properties = Properties::new();
            properties.insert(
                "location_type".to_string(),
                Value::String(location.location_type.clone()),
            );
            properties.insert(
                "danger_level".to_string(),
                Value::Number(location.danger_level.into()),
            );
            if let Some(terrain) = &location.terrain {
                properties.insert("terrain".to_string(), Value::String(terrain.clone()));
            }
            graph.add_entity(
                location.id.to_string(),
                NodeType::Location,
                location.name.clone(),
                location.description.clone(),
                Some(properties),
                5,
            );

            if let Some(parent) = &parent {
                if !graph.contains(&parent.id.to_string()) {
                    graph.add_entity(
                        parent.id.to_string(),
                        NodeType::Location,
                        parent.name.clone(),
                        parent.description.clone(),
                        None,
                        5,
                    );
                }
                graph.add_relationship(
                    &location.id.to_string(),
                    &parent.id.to_string(),
                    EdgeType::PartOf,
                    None,
                )?;
                let mut contained = Properties::new();
                contained.insert(
                    "path_type".to_string(),
                    Value::String("contained".to_string()),
                );
                graph.add_relationship(
                    &location.id.to_string(),
                    &parent.id.to_string(),
                    EdgeType::ConnectedTo,
                    Some(contained),
                )?;
            }

            let mut tx = store.begin().await?;
            store.locations().save(&mut tx, &location).await?;
            save_graph(&mut tx, campaign_id, &graph).await?;
            tx.commit().await.map_err(crate::store::StoreError::from)?;
            Ok(())
        }
        .await;

        if let Err(err) = outcome {
            *graph = snapshot;
            return Err(err);
        }
        Ok(location)
    }

    /// Generate a dungeon: an entrance plus `num_rooms` rooms chained by
    /// passages, ending in a boss chamber. Rooms past the third have a 30%
    /// chance of a secret passage back to an earlier room.
    pub async fn generate_dungeon(
        &self,
        campaign_id: CampaignId,
        name: &str,
        theme: &str,
        num_rooms: usize,
        danger_level: i32,
        parent_location_id: Option<LocationId>,
    ) -> Result<Vec<Location>, EngineError> {
        let mut locations = Vec::new();

        let entrance = self
            .generate_location(
                campaign_id,
                "dungeon",
                Some(theme),
                danger_level,
                parent_location_id,
                Some(name),
            )
            .await?;
        locations.push(entrance.clone());

        for index in 0..num_rooms {
            let is_last = index == num_rooms - 1;
            let (room_type, room_danger) = if is_last {
                ("boss chamber".to_string(), (danger_level + 2).clamp(1, 10))
            } else {
                self.deps.rng.with(|rng| {
                    let room_type =
                        DUNGEON_ROOM_TYPES[rng.gen_range(0..DUNGEON_ROOM_TYPES.len())].to_string();
                    let danger = (danger_level + rng.gen_range(-1..=2)).clamp(1, 10);
                    (room_type, danger)
                })
            };

            let room_name = format!("{name} - {} {}", title_case(&room_type), index + 1);
            let room = self
                .generate_location(
                    campaign_id,
                    "room",
                    Some(&format!("{theme} {room_type}")),
                    room_danger,
                    Some(entrance.id),
                    Some(&room_name),
                )
                .await?;
            locations.push(room);
        }

        // Chain the rooms, with occasional secret passages, in one pass
        // under the campaign lock.
        let store = &self.deps.store;
        let mut conn = store.acquire().await?;
        let mut graph = self.deps.registry.lock(campaign_id).await?;
        ensure_graph_loaded(&mut conn, &mut graph, campaign_id).await?;

        let snapshot = graph.snapshot();
        let outcome: Result<(), EngineError> = async {
            for window in locations.windows(2) {
                connect_in_graph(&mut graph, window[0].id, window[1].id, "passage", None)?;
            }
            // Secret passages become possible from the fourth room on
            // (`locations` counts the entrance at index 0).
            for (index, room) in locations.iter().enumerate().skip(4) {
                let add_secret = self.deps.rng.with(|rng| rng.gen_bool(0.3));
                if add_secret {
                    let earlier_index = self.deps.rng.with(|rng| rng.gen_range(1..index));
                    connect_in_graph(
                        &mut graph,
                        locations[earlier_index].id,
                        room.id,
                        "secret passage",
                        None,
                    )?;
                }
            }

            let mut tx = store.begin().await?;
            save_graph(&mut tx, campaign_id, &graph).await?;
            tx.commit().await.map_err(crate::store::StoreError::from)?;
            Ok(())
        }
        .await;

        if let Err(err) = outcome {
            *graph = snapshot;
            return Err(err);
        }
        Ok(locations)
    }

    /// Generate a themed region with `num_locations` child locations of
    /// random types, cross-connected by random paths.
    pub async fn generate_world_region(
        &self,
        campaign_id: CampaignId,
        theme: &str,
        num_locations: usize,
    ) -> Result<Vec<Location>, EngineError> {
        let mut locations = Vec::new();

        let region = self
            .generate_location(campaign_id, "region", Some(theme), 3, None, None)
            .await?;
        locations.push(region.clone());

        for _ in 0..num_locations {
            let (location_type, danger) = self.deps.rng.with(|rng| {
                (
                    REGION_LOCATION_TYPES[rng.gen_range(0..REGION_LOCATION_TYPES.len())],
                    rng.gen_range(1..=7),
                )
            });
            let location = self
                .generate_location(
                    campaign_id,
                    location_type,
                    Some(theme),
                    danger,
                    Some(region.id),
                    None,
                )
                .await?;
            locations.push(location);
        }

        let store = &self.deps.store;
        let mut conn = store.acquire().await?;
        let mut graph = self.deps.registry.lock(campaign_id).await?;
        ensure_graph_loaded(&mut conn, &mut graph, campaign_id).await?;

        let snapshot = graph.snapshot();
        let outcome: Result<(), EngineError> = async {
            for index in 2..locations.len() {
                let connections = self
                    .deps
                    .rng
                    .with(|rng| rng.gen_range(1..=2usize.min(index - 1)));
                for _ in 0..connections {
                    let (other_index, path_type, hours) = self.deps.rng.with(|rng| {
                        (
                            rng.gen_range(1..index),
                            REGION_PATH_TYPES[rng.gen_range(0..REGION_PATH_TYPES.len())],
                            rng.gen_range(1..=48),
                        )
                    });
                    if other_index != index {
                        connect_in_graph(
                            &mut graph,
                            locations[index].id,
                            locations[other_index].id,
                            path_type,
                            Some(format!("{hours} hours")),
                        )?;
                    }
                }
            }

            let mut tx = store.begin().await?;
            save_graph(&mut tx, campaign_id, &graph).await?;
            tx.commit().await.map_err(crate::store::StoreError::from)?;
            Ok(())
        }
        .await;

        if let Err(err) = outcome {
            *graph = snapshot;
            return Err(err);
        }
        Ok(locations)
    }

    /// Connect two locations bidirectionally: graph edges both ways plus
    /// entries in both rows' connection lists.
    pub async fn connect_locations(
        &self,
        location_a_id: LocationId,
        location_b_id: LocationId,
        path_type: &str,
        travel_time: Option<&str>,
    ) -> Result<(), EngineError> {
        let store = &self.deps.store;
        let mut conn = store.acquire().await?;

        let mut location_a = store
            .locations()
            .get(&mut conn, location_a_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Location", location_a_id))?;
        let mut location_b = store
            .locations()
            .get(&mut conn, location_b_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Location", location_b_id))?;
        if location_a.campaign_id != location_b.campaign_id {
            return Err(EngineError::invalid_input(
                "locations belong to different campaigns",
            ));
        }

        let campaign_id = location_a.campaign_id;
        let mut graph = self.deps.registry.lock(campaign_id).await?;
        ensure_graph_loaded(&mut conn, &mut graph, campaign_id).await?;

        let snapshot = graph.snapshot();
        let outcome: Result<(), EngineError> = async {
            for location in [&location_a, &location_b] {
                if !graph.contains(&location.id.to_string()) {
                    graph.add_entity(
                        location.id.to_string(),
                        NodeType::Location,
                        location.name.clone(),
                        location.description.clone(),
                        None,
                        5,
                    );
                }
            }
            connect_in_graph(
                &mut graph,
                location_a_id,
                location_b_id,
                path_type,
                travel_time.map(str::to_string),
            )?;
            connect_in_graph(
                &mut graph,
                location_b_id,
                location_a_id,
                path_type,
                travel_time.map(str::to_string),
            )?;

            location_a.connected_locations.push(ConnectedLocation {
                location_id: location_b_id,
                name: Some(location_b.name.clone()),
                path_type: path_type.to_string(),
                travel_time: travel_time.map(str::to_string),
            });
            location_b.connected_locations.push(ConnectedLocation {
                location_id: location_a_id,
                name: Some(location_a.name.clone()),
                path_type: path_type.to_string(),
                travel_time: travel_time.map(str::to_string),
            });
            location_a.updated_at = self.deps.clock.now();
            location_b.updated_at = self.deps.clock.now();

            let mut tx = store.begin().await?;
            store.locations().save(&mut tx, &location_a).await?;
            store.locations().save(&mut tx, &location_b).await?;
            save_graph(&mut tx, campaign_id, &graph).await?;
            tx.commit().await.map_err(crate::store::StoreError::from)?;
            Ok(())
        }
        .await;

        if let Err(err) = outcome {
            *graph = snapshot;
            return Err(err);
        }
        Ok(())
    }

    /// Mark a location discovered. Idempotent.
    pub async fn discover_location(&self, location_id: LocationId) -> Result<Location, EngineError> {
        let store = &self.deps.store;
        let mut conn = store.acquire().await?;
        let mut location = store
            .locations()
            .get(&mut conn, location_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Location", location_id))?;

        if !location.is_discovered {
            location.is_discovered = true;
            location.updated_at = self.deps.clock.now();
            let mut tx = store.begin().await?;
            store.locations().save(&mut tx, &location).await?;
            tx.commit().await.map_err(crate::store::StoreError::from)?;
        }
        Ok(location)
    }

    /// Map nodes and deduped edges for rendering.
    pub async fn get_map_data(
        &self,
        campaign_id: CampaignId,
        include_undiscovered: bool,
    ) -> Result<MapData, EngineError> {
        let store = &self.deps.store;
        let mut conn = store.acquire().await?;
        require_campaign(store, &mut conn, campaign_id).await?;

        let locations = store
            .locations()
            .list_for_campaign(&mut conn, campaign_id, !include_undiscovered)
            .await?;

        let mut nodes = Vec::new();
        let mut edges: Vec<MapEdge> = Vec::new();

        for location in &locations {
            nodes.push(MapNode {
                id: location.id,
                name: location.name.clone(),
                location_type: location.location_type.clone(),
                x: location.x_coord,
                y: location.y_coord,
                danger_level: location.danger_level,
                is_discovered: location.is_discovered,
                terrain: location.terrain.clone(),
                parent_id: location.parent_location_id,
            });

            for connection in &location.connected_locations {
                let reverse_exists = edges.iter().any(|edge| {
                    edge.source == connection.location_id && edge.target == location.id
                });
                if !reverse_exists {
                    edges.push(MapEdge {
                        source: location.id,
                        target: connection.location_id,
                        path_type: connection.path_type.clone(),
                        travel_time: connection.travel_time.clone(),
                    });
                }
            }
        }

        Ok(MapData {
            campaign_id,
            total_locations: locations.len(),
            nodes,
            edges,
        })
    }
}

fn connect_in_graph(
    graph: &mut KnowledgeGraph,
    source: LocationId,
    target: LocationId,
    path_type: &str,
    travel_time: Option<String>,
) -> Result<(), EngineError> {
    let mut properties = Properties::new();
    properties.insert(
        "path_type".to_string(),
        Value::String(path_type.to_string()),
    );
    if let Some(travel_time) = travel_time {
        properties.insert("travel_time".to_string(), Value::String(travel_time));
    }
    graph.add_relationship(
        &source.to_string(),
        &target.to_string(),
        EdgeType::ConnectedTo,
        Some(properties),
    )?;
    Ok(())
}

fn title_case(input: &str) -> String {
    input
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_case_capitalizes_each_word() {
        assert_eq!(title_case("boss chamber"), "Boss Chamber");
        assert_eq!(title_case("vault"), "Vault");
    }
}
