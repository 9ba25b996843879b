//! Game session table access.

use sqlx::{Row, SqliteConnection};

use lorekeeper_domain::{CampaignId, GameSession, SessionId};

use super::{opt_ts, parse_enum, parse_opt_ts, parse_ts, ts, StoreError};

pub struct SessionRepo;

impl SessionRepo {
    pub async fn save(
        &self,
        conn: &mut SqliteConnection,
        session: &GameSession,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO game_sessions (id, campaign_id, session_number, status, recap, notes,
                                       started_at, ended_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                recap = excluded.recap,
                notes = excluded.notes,
                ended_at = excluded.ended_at
            "#,
        )
        .bind(session.id.to_string())
        .bind(session.campaign_id.to_string())
        .bind(session.session_number)
        .bind(session.status.as_str())
        .bind(&session.recap)
        .bind(&session.notes)
        .bind(ts(&session.started_at))
        .bind(opt_ts(&session.ended_at))
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn get(
        &self,
        conn: &mut SqliteConnection,
        id: SessionId,
    ) -> Result<Option<GameSession>, StoreError> {
        let row = sqlx::query("SELECT * FROM game_sessions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(conn)
            .await?;
        row.map(row_to_session).transpose()
    }

    pub async fn list_for_campaign(
        &self,
        conn: &mut SqliteConnection,
        campaign_id: CampaignId,
    ) -> Result<Vec<GameSession>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM game_sessions WHERE campaign_id = ? ORDER BY session_number",
        )
        .bind(campaign_id.to_string())
        .fetch_all(conn)
        .await?;
        rows.into_iter().map(row_to_session).collect()
    }

    /// Highest session_number in the campaign plus one.
    pub async fn next_session_number(
        &self,
        conn: &mut SqliteConnection,
        campaign_id: CampaignId,
    ) -> Result<i32, StoreError> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(session_number), 0) AS max_number FROM game_sessions WHERE campaign_id = ?",
        )
        .bind(campaign_id.to_string())
        .fetch_one(conn)
        .await?;
        Ok(row.get::<i32, _>("max_number") + 1)
    }

    pub async fn find_by_number(
        &self,
        conn: &mut SqliteConnection,
        campaign_id: CampaignId,
        session_number: i32,
    ) -> Result<Option<GameSession>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM game_sessions WHERE campaign_id = ? AND session_number = ?",
        )
        .bind(campaign_id.to_string())
        .bind(session_number)
        .fetch_optional(conn)
        .await?;
        row.map(row_to_session).transpose()
    }
}

fn row_to_session(row: sqlx::sqlite::SqliteRow) -> Result<GameSession, StoreError> {
    let id: String = row.get("id");
    let campaign_id: String = row.get("campaign_id");
    Ok(GameSession {
        id: SessionId::parse(&id).map_err(|e| StoreError::Serialization(e.to_string()))?,
        campaign_id: CampaignId::parse(&campaign_id)
            .map_err(|e| StoreError::Serialization(e.to_string()))?,
        session_number: row.get("session_number"),
        status: parse_enum(row.get::<String, _>("status").as_str())?,
        recap: row.get("recap"),
        notes: row.get("notes"),
        started_at: parse_ts(row.get::<String, _>("started_at").as_str())?,
        ended_at: parse_opt_ts(row.get("ended_at"))?,
    })
}
