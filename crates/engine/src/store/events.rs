//! Story event table access.

use sqlx::{Row, SqliteConnection};

use lorekeeper_domain::{
    CampaignId, EncounterId, EventId, LocationId, SessionId, StoryEvent,
};

use super::{from_json, parse_enum, parse_ts, to_json, ts, StoreError};

/// A story event joined with its session number, for campaign timelines.
#[derive(Debug, Clone)]
pub struct TimelineRow {
    pub event: StoryEvent,
    pub session_number: i32,
}

pub struct EventRepo;

impl EventRepo {
    pub async fn insert(
        &self,
        conn: &mut SqliteConnection,
        event: &StoryEvent,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO story_events (
                id, session_id, event_type, content, player_action, choices, chosen_index,
                mood, speaker, dice_rolls, knowledge_updates, new_entities, xp_awarded,
                items_awarded, parse_error, sequence_order, location_id, encounter_id, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.id.to_string())
        .bind(event.session_id.to_string())
        .bind(event.event_type.as_str())
        .bind(&event.content)
        .bind(&event.player_action)
        .bind(event.choices.as_ref().map(to_json).transpose()?)
        .bind(event.chosen_index)
        .bind(&event.mood)
        .bind(&event.speaker)
        .bind(to_json(&event.dice_rolls)?)
        .bind(to_json(&event.knowledge_updates)?)
        .bind(to_json(&event.new_entities)?)
        .bind(event.xp_awarded)
        .bind(to_json(&event.items_awarded)?)
        .bind(event.parse_error)
        .bind(event.sequence_order)
        .bind(event.location_id.map(|id| id.to_string()))
        .bind(event.encounter_id.map(|id| id.to_string()))
        .bind(ts(&event.created_at))
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn get(
        &self,
        conn: &mut SqliteConnection,
        id: EventId,
    ) -> Result<Option<StoryEvent>, StoreError> {
        let row = sqlx::query("SELECT * FROM story_events WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(conn)
            .await?;
        row.map(row_to_event).transpose()
    }

    pub async fn set_chosen_index(
        &self,
        conn: &mut SqliteConnection,
        id: EventId,
        chosen_index: i32,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE story_events SET chosen_index = ? WHERE id = ?")
            .bind(chosen_index)
            .bind(id.to_string())
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Events of a session in sequence order, paginated.
    pub async fn list_for_session(
        &self,
        conn: &mut SqliteConnection,
        session_id: SessionId,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<StoryEvent>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM story_events WHERE session_id = ? ORDER BY sequence_order LIMIT ? OFFSET ?",
        )
        .bind(session_id.to_string())
        .bind(limit)
        .bind(skip)
        .fetch_all(conn)
        .await?;
        rows.into_iter().map(row_to_event).collect()
    }

    /// The most recent events of a session, newest first.
    pub async fn recent_for_session(
        &self,
        conn: &mut SqliteConnection,
        session_id: SessionId,
        limit: i64,
    ) -> Result<Vec<StoryEvent>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM story_events WHERE session_id = ? ORDER BY sequence_order DESC LIMIT ?",
        )
        .bind(session_id.to_string())
        .bind(limit)
        .fetch_all(conn)
        .await?;
        rows.into_iter().map(row_to_event).collect()
    }

    pub async fn max_sequence(
        &self,
        conn: &mut SqliteConnection,
        session_id: SessionId,
    ) -> Result<i32, StoreError> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(sequence_order), 0) AS max_order FROM story_events WHERE session_id = ?",
        )
        .bind(session_id.to_string())
        .fetch_one(conn)
        .await?;
        Ok(row.get("max_order"))
    }

    pub async fn count_for_session(
        &self,
        conn: &mut SqliteConnection,
        session_id: SessionId,
    ) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM story_events WHERE session_id = ?")
            .bind(session_id.to_string())
            .fetch_one(conn)
            .await?;
        Ok(row.get("total"))
    }

    /// Latest events across every session of a campaign, newest first, with
    /// session numbers attached.
    pub async fn recent_for_campaign(
        &self,
        conn: &mut SqliteConnection,
        campaign_id: CampaignId,
        limit: i64,
    ) -> Result<Vec<TimelineRow>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT e.*, s.session_number
            FROM story_events e
            JOIN game_sessions s ON s.id = e.session_id
            WHERE s.campaign_id = ?
            ORDER BY e.created_at DESC, e.sequence_order DESC
            LIMIT ?
            "#,
        )
        .bind(campaign_id.to_string())
        .bind(limit)
        .fetch_all(conn)
        .await?;
        rows.into_iter()
            .map(|row| {
                let session_number: i32 = row.get("session_number");
                Ok(TimelineRow {
                    event: row_to_event(row)?,
                    session_number,
                })
            })
            .collect()
    }
}

fn row_to_event(row: sqlx::sqlite::SqliteRow) -> Result<StoryEvent, StoreError> {
    let id: String = row.get("id");
    let session_id: String = row.get("session_id");
    let choices: Option<String> = row.get("choices");
    let location_id: Option<String> = row.get("location_id");
    let encounter_id: Option<String> = row.get("encounter_id");
    Ok(StoryEvent {
        id: EventId::parse(&id).map_err(|e| StoreError::Serialization(e.to_string()))?,
        session_id: SessionId::parse(&session_id)
            .map_err(|e| StoreError::Serialization(e.to_string()))?,
        event_type: parse_enum(row.get::<String, _>("event_type").as_str())?,
        content: row.get("content"),
        player_action: row.get("player_action"),
        choices: choices.map(|raw| from_json(&raw)).transpose()?,
        chosen_index: row.get("chosen_index"),
        mood: row.get("mood"),
        speaker: row.get("speaker"),
        dice_rolls: from_json(row.get::<String, _>("dice_rolls").as_str())?,
        knowledge_updates: from_json(row.get::<String, _>("knowledge_updates").as_str())?,
        new_entities: from_json(row.get::<String, _>("new_entities").as_str())?,
        xp_awarded: row.get("xp_awarded"),
        items_awarded: from_json(row.get::<String, _>("items_awarded").as_str())?,
        parse_error: row.get("parse_error"),
        sequence_order: row.get("sequence_order"),
        location_id: location_id
            .map(|raw| LocationId::parse(&raw))
            .transpose()
            .map_err(|e| StoreError::Serialization(e.to_string()))?,
        encounter_id: encounter_id
            .map(|raw| EncounterId::parse(&raw))
            .transpose()
            .map_err(|e| StoreError::Serialization(e.to_string()))?,
        created_at: parse_ts(row.get::<String, _>("created_at").as_str())?,
    })
}
