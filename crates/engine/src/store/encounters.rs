//! Encounter table access.

use sqlx::{Row, SqliteConnection};

use lorekeeper_domain::{Encounter, EncounterId, LocationId, SessionId};

use super::{from_json, opt_ts, parse_enum, parse_opt_ts, parse_ts, to_json, ts, StoreError};

pub struct EncounterRepo;

impl EncounterRepo {
    pub async fn save(
        &self,
        conn: &mut SqliteConnection,
        encounter: &Encounter,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO encounters (
                id, session_id, location_id, name, encounter_type, description,
                difficulty, status, current_round, current_turn_index, enemies,
                initiative_order, combat_log, participants, social_stakes,
                puzzle_description, puzzle_solution, puzzle_hints, hints_revealed,
                environmental_effects, terrain_features, rewards, rewards_distributed,
                party_level_at_start, party_size_at_start, created_at, ended_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                current_round = excluded.current_round,
                current_turn_index = excluded.current_turn_index,
                enemies = excluded.enemies,
                initiative_order = excluded.initiative_order,
                combat_log = excluded.combat_log,
                hints_revealed = excluded.hints_revealed,
                rewards = excluded.rewards,
                rewards_distributed = excluded.rewards_distributed,
                ended_at = excluded.ended_at
            "#,
        )
        .bind(encounter.id.to_string())
        .bind(encounter.session_id.to_string())
        .bind(encounter.location_id.map(|id| id.to_string()))
        .bind(&encounter.name)
        .bind(encounter.encounter_type.as_str())
        .bind(&encounter.description)
        .bind(encounter.difficulty.as_str())
        .bind(encounter.status.as_str())
        .bind(encounter.current_round)
        .bind(encounter.current_turn_index)
        .bind(to_json(&encounter.enemies)?)
        .bind(to_json(&encounter.initiative_order)?)
        .bind(to_json(&encounter.combat_log)?)
        .bind(to_json(&encounter.participants)?)
        .bind(&encounter.social_stakes)
        .bind(&encounter.puzzle_description)
        .bind(&encounter.puzzle_solution)
        .bind(to_json(&encounter.puzzle_hints)?)
        .bind(encounter.hints_revealed)
        .bind(to_json(&encounter.environmental_effects)?)
        .bind(to_json(&encounter.terrain_features)?)
        .bind(encounter.rewards.as_ref().map(to_json).transpose()?)
        .bind(encounter.rewards_distributed)
        .bind(encounter.party_level_at_start)
        .bind(encounter.party_size_at_start)
        .bind(ts(&encounter.created_at))
        .bind(opt_ts(&encounter.ended_at))
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn get(
        &self,
        conn: &mut SqliteConnection,
        id: EncounterId,
    ) -> Result<Option<Encounter>, StoreError> {
        let row = sqlx::query("SELECT * FROM encounters WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(conn)
            .await?;
        row.map(row_to_encounter).transpose()
    }

    pub async fn active_for_session(
        &self,
        conn: &mut SqliteConnection,
        session_id: SessionId,
    ) -> Result<Option<Encounter>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM encounters WHERE session_id = ? AND status = 'active' ORDER BY created_at DESC LIMIT 1",
        )
        .bind(session_id.to_string())
        .fetch_optional(conn)
        .await?;
        row.map(row_to_encounter).transpose()
    }
}

fn row_to_encounter(row: sqlx::sqlite::SqliteRow) -> Result<Encounter, StoreError> {
    let id: String = row.get("id");
    let session_id: String = row.get("session_id");
    let location_id: Option<String> = row.get("location_id");
    let rewards: Option<String> = row.get("rewards");
    Ok(Encounter {
        id: EncounterId::parse(&id).map_err(|e| StoreError::Serialization(e.to_string()))?,
        session_id: SessionId::parse(&session_id)
            .map_err(|e| StoreError::Serialization(e.to_string()))?,
        location_id: location_id
            .map(|raw| LocationId::parse(&raw))
            .transpose()
            .map_err(|e| StoreError::Serialization(e.to_string()))?,
        name: row.get("name"),
        encounter_type: parse_enum(row.get::<String, _>("encounter_type").as_str())?,
        description: row.get("description"),
        difficulty: parse_enum(row.get::<String, _>("difficulty").as_str())?,
        status: parse_enum(row.get::<String, _>("status").as_str())?,
        current_round: row.get("current_round"),
        current_turn_index: row.get("current_turn_index"),
        enemies: from_json(row.get::<String, _>("enemies").as_str())?,
        initiative_order: from_json(row.get::<String, _>("initiative_order").as_str())?,
        combat_log: from_json(row.get::<String, _>("combat_log").as_str())?,
        participants: from_json(row.get::<String, _>("participants").as_str())?,
        social_stakes: row.get("social_stakes"),
        puzzle_description: row.get("puzzle_description"),
        puzzle_solution: row.get("puzzle_solution"),
        puzzle_hints: from_json(row.get::<String, _>("puzzle_hints").as_str())?,
        hints_revealed: row.get("hints_revealed"),
        environmental_effects: from_json(row.get::<String, _>("environmental_effects").as_str())?,
        terrain_features: from_json(row.get::<String, _>("terrain_features").as_str())?,
        rewards: rewards.map(|raw| from_json(&raw)).transpose()?,
        rewards_distributed: row.get("rewards_distributed"),
        party_level_at_start: row.get("party_level_at_start"),
        party_size_at_start: row.get("party_size_at_start"),
        created_at: parse_ts(row.get::<String, _>("created_at").as_str())?,
        ended_at: parse_opt_ts(row.get("ended_at"))?,
    })
}
