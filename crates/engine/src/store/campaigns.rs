//! Campaign table access.

use sqlx::{Row, SqliteConnection};

use lorekeeper_domain::{Campaign, CampaignId};

use super::{from_json, parse_enum, parse_ts, to_json, StoreError};

/// Per-campaign child-entity counts for list views.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct CampaignCounts {
    pub sessions: i64,
    pub characters: i64,
    pub locations: i64,
}

pub struct CampaignRepo;

impl CampaignRepo {
    pub async fn save(
        &self,
        conn: &mut SqliteConnection,
        campaign: &Campaign,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO campaigns (id, name, description, genre, tone, setting_description,
                                   world_rules, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                genre = excluded.genre,
                tone = excluded.tone,
                setting_description = excluded.setting_description,
                world_rules = excluded.world_rules,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(campaign.id.to_string())
        .bind(&campaign.name)
        .bind(&campaign.description)
        .bind(campaign.genre.as_str())
        .bind(campaign.tone.as_str())
        .bind(&campaign.setting_description)
        .bind(to_json(&campaign.world_rules)?)
        .bind(super::ts(&campaign.created_at))
        .bind(super::ts(&campaign.updated_at))
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn get(
        &self,
        conn: &mut SqliteConnection,
        id: CampaignId,
    ) -> Result<Option<Campaign>, StoreError> {
        let row = sqlx::query("SELECT * FROM campaigns WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(conn)
            .await?;
        row.map(row_to_campaign).transpose()
    }

    pub async fn list(
        &self,
        conn: &mut SqliteConnection,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Campaign>, StoreError> {
        let rows = sqlx::query("SELECT * FROM campaigns ORDER BY created_at LIMIT ? OFFSET ?")
            .bind(limit)
            .bind(skip)
            .fetch_all(conn)
            .await?;
        rows.into_iter().map(row_to_campaign).collect()
    }

    pub async fn counts(
        &self,
        conn: &mut SqliteConnection,
        id: CampaignId,
    ) -> Result<CampaignCounts, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM game_sessions WHERE campaign_id = ?1) AS sessions,
                (SELECT COUNT(*) FROM characters WHERE campaign_id = ?1) AS characters,
                (SELECT COUNT(*) FROM locations WHERE campaign_id = ?1) AS locations
            "#,
        )
        .bind(id.to_string())
        .fetch_one(conn)
        .await?;
        Ok(CampaignCounts {
            sessions: row.get("sessions"),
            characters: row.get("characters"),
            locations: row.get("locations"),
        })
    }

    /// Delete a campaign; children cascade at the database level.
    pub async fn delete(
        &self,
        conn: &mut SqliteConnection,
        id: CampaignId,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM campaigns WHERE id = ?")
            .bind(id.to_string())
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_campaign(row: sqlx::sqlite::SqliteRow) -> Result<Campaign, StoreError> {
    let id: String = row.get("id");
    Ok(Campaign {
        id: CampaignId::parse(&id).map_err(|e| StoreError::Serialization(e.to_string()))?,
        name: row.get("name"),
        description: row.get("description"),
        genre: parse_enum(row.get::<String, _>("genre").as_str())?,
        tone: parse_enum(row.get::<String, _>("tone").as_str())?,
        setting_description: row.get("setting_description"),
        world_rules: from_json(row.get::<String, _>("world_rules").as_str())?,
        created_at: parse_ts(row.get::<String, _>("created_at").as_str())?,
        updated_at: parse_ts(row.get::<String, _>("updated_at").as_str())?,
    })
}
