//! Location table access.

use sqlx::{Row, SqliteConnection};

use lorekeeper_domain::{CampaignId, Location, LocationId};

use super::{from_json, parse_ts, to_json, ts, StoreError};

pub struct LocationRepo;

impl LocationRepo {
    pub async fn save(
        &self,
        conn: &mut SqliteConnection,
        location: &Location,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO locations (
                id, campaign_id, name, location_type, description, detailed_description,
                x_coord, y_coord, danger_level, is_discovered, is_accessible,
                terrain, climate, atmosphere, points_of_interest, resources,
                environmental_effects, connected_locations, parent_location_id,
                properties, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                location_type = excluded.location_type,
                description = excluded.description,
                detailed_description = excluded.detailed_description,
                x_coord = excluded.x_coord,
                y_coord = excluded.y_coord,
                danger_level = excluded.danger_level,
                is_discovered = excluded.is_discovered,
                is_accessible = excluded.is_accessible,
                terrain = excluded.terrain,
                climate = excluded.climate,
                atmosphere = excluded.atmosphere,
                points_of_interest = excluded.points_of_interest,
                resources = excluded.resources,
                environmental_effects = excluded.environmental_effects,
                connected_locations = excluded.connected_locations,
                parent_location_id = excluded.parent_location_id,
                properties = excluded.properties,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(location.id.to_string())
        .bind(location.campaign_id.to_string())
        .bind(&location.name)
        .bind(&location.location_type)
        .bind(&location.description)
        .bind(&location.detailed_description)
        .bind(location.x_coord)
        .bind(location.y_coord)
        .bind(location.danger_level)
        .bind(location.is_discovered)
        .bind(location.is_accessible)
        .bind(&location.terrain)
        .bind(&location.climate)
        .bind(&location.atmosphere)
        .bind(to_json(&location.points_of_interest)?)
        .bind(to_json(&location.resources)?)
        .bind(to_json(&location.environmental_effects)?)
        .bind(to_json(&location.connected_locations)?)
        .bind(location.parent_location_id.map(|id| id.to_string()))
        .bind(to_json(&location.properties)?)
        .bind(ts(&location.created_at))
        .bind(ts(&location.updated_at))
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn get(
        &self,
        conn: &mut SqliteConnection,
        id: LocationId,
    ) -> Result<Option<Location>, StoreError> {
        let row = sqlx::query("SELECT * FROM locations WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(conn)
            .await?;
        row.map(row_to_location).transpose()
    }

    pub async fn list_for_campaign(
        &self,
        conn: &mut SqliteConnection,
        campaign_id: CampaignId,
        discovered_only: bool,
    ) -> Result<Vec<Location>, StoreError> {
        let mut sql = String::from("SELECT * FROM locations WHERE campaign_id = ?");
        if discovered_only {
            sql.push_str(" AND is_discovered = 1");
        }
        sql.push_str(" ORDER BY created_at");
        let rows = sqlx::query(&sql)
            .bind(campaign_id.to_string())
            .fetch_all(conn)
            .await?;
        rows.into_iter().map(row_to_location).collect()
    }

    pub async fn delete(
        &self,
        conn: &mut SqliteConnection,
        id: LocationId,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM locations WHERE id = ?")
            .bind(id.to_string())
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_location(row: sqlx::sqlite::SqliteRow) -> Result<Location, StoreError> {
    let id: String = row.get("id");
    let campaign_id: String = row.get("campaign_id");
    let parent_location_id: Option<String> = row.get("parent_location_id");
    Ok(Location {
        id: LocationId::parse(&id).map_err(|e| StoreError::Serialization(e.to_string()))?,
        campaign_id: CampaignId::parse(&campaign_id)
            .map_err(|e| StoreError::Serialization(e.to_string()))?,
        name: row.get("name"),
        location_type: row.get("location_type"),
        description: row.get("description"),
        detailed_description: row.get("detailed_description"),
        x_coord: row.get("x_coord"),
        y_coord: row.get("y_coord"),
        danger_level: row.get("danger_level"),
        is_discovered: row.get("is_discovered"),
        is_accessible: row.get("is_accessible"),
        terrain: row.get("terrain"),
        climate: row.get("climate"),
        atmosphere: row.get("atmosphere"),
        points_of_interest: from_json(row.get::<String, _>("points_of_interest").as_str())?,
        resources: from_json(row.get::<String, _>("resources").as_str())?,
        environmental_effects: from_json(row.get::<String, _>("environmental_effects").as_str())?,
        connected_locations: from_json(row.get::<String, _>("connected_locations").as_str())?,
        parent_location_id: parent_location_id
            .map(|raw| LocationId::parse(&raw))
            .transpose()
            .map_err(|e| StoreError::Serialization(e.to_string()))?,
        properties: from_json(row.get::<String, _>("properties").as_str())?,
        created_at: parse_ts(row.get::<String, _>("created_at").as_str())?,
        updated_at: parse_ts(row.get::<String, _>("updated_at").as_str())?,
    })
}
