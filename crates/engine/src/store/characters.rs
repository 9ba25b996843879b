//! Character table access.

use sqlx::{Row, SqliteConnection};

use lorekeeper_domain::{
    AbilityScores, CampaignId, Character, CharacterId, CharacterKind, LocationId,
};

use super::{from_json, parse_enum, parse_ts, to_json, ts, StoreError};

pub struct CharacterRepo;

impl CharacterRepo {
    pub async fn save(
        &self,
        conn: &mut SqliteConnection,
        character: &Character,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO characters (
                id, campaign_id, name, character_type, race, char_class, level,
                hp_current, hp_max, armor_class,
                strength, dexterity, constitution, intelligence, wisdom, charisma,
                personality_traits, backstory, appearance, motivation, secret,
                disposition, speech_pattern, npc_memory, inventory, equipment, gold,
                skills, proficiencies, languages, is_alive, conditions,
                current_location_id, experience_points, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                    ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                character_type = excluded.character_type,
                race = excluded.race,
                char_class = excluded.char_class,
                level = excluded.level,
                hp_current = excluded.hp_current,
                hp_max = excluded.hp_max,
                armor_class = excluded.armor_class,
                strength = excluded.strength,
                dexterity = excluded.dexterity,
                constitution = excluded.constitution,
                intelligence = excluded.intelligence,
                wisdom = excluded.wisdom,
                charisma = excluded.charisma,
                personality_traits = excluded.personality_traits,
                backstory = excluded.backstory,
                appearance = excluded.appearance,
                motivation = excluded.motivation,
                secret = excluded.secret,
                disposition = excluded.disposition,
                speech_pattern = excluded.speech_pattern,
                npc_memory = excluded.npc_memory,
                inventory = excluded.inventory,
                equipment = excluded.equipment,
                gold = excluded.gold,
                skills = excluded.skills,
                proficiencies = excluded.proficiencies,
                languages = excluded.languages,
                is_alive = excluded.is_alive,
                conditions = excluded.conditions,
                current_location_id = excluded.current_location_id,
                experience_points = excluded.experience_points,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(character.id.to_string())
        .bind(character.campaign_id.to_string())
        .bind(&character.name)
        .bind(character.kind.as_str())
        .bind(&character.race)
        .bind(&character.char_class)
        .bind(character.level)
        .bind(character.hp_current)
        .bind(character.hp_max)
        .bind(character.armor_class)
        .bind(character.abilities.strength)
        .bind(character.abilities.dexterity)
        .bind(character.abilities.constitution)
        .bind(character.abilities.intelligence)
        .bind(character.abilities.wisdom)
        .bind(character.abilities.charisma)
        .bind(to_json(&character.personality_traits)?)
        .bind(&character.backstory)
        .bind(&character.appearance)
        .bind(&character.motivation)
        .bind(&character.secret)
        .bind(character.disposition)
        .bind(character.speech_pattern.map(|p| p.as_str()))
        .bind(to_json(&character.npc_memory)?)
        .bind(to_json(&character.inventory)?)
        .bind(to_json(&character.equipment)?)
        .bind(character.gold)
        .bind(to_json(&character.skills)?)
        .bind(to_json(&character.proficiencies)?)
        .bind(to_json(&character.languages)?)
        .bind(character.is_alive)
        .bind(to_json(&character.conditions)?)
        .bind(character.current_location_id.map(|id| id.to_string()))
        .bind(character.experience_points)
        .bind(ts(&character.created_at))
        .bind(ts(&character.updated_at))
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn get(
        &self,
        conn: &mut SqliteConnection,
        id: CharacterId,
    ) -> Result<Option<Character>, StoreError> {
        let row = sqlx::query("SELECT * FROM characters WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(conn)
            .await?;
        row.map(row_to_character).transpose()
    }

    /// Characters of a campaign, optionally filtered by kind and liveness.
    pub async fn list(
        &self,
        conn: &mut SqliteConnection,
        campaign_id: CampaignId,
        kind: Option<CharacterKind>,
        alive_only: bool,
    ) -> Result<Vec<Character>, StoreError> {
        let mut sql = String::from("SELECT * FROM characters WHERE campaign_id = ?");
        if kind.is_some() {
            sql.push_str(" AND character_type = ?");
        }
        if alive_only {
            sql.push_str(" AND is_alive = 1");
        }
        sql.push_str(" ORDER BY created_at");

        let mut query = sqlx::query(&sql).bind(campaign_id.to_string());
        if let Some(kind) = kind {
            query = query.bind(kind.as_str());
        }
        let rows = query.fetch_all(conn).await?;
        rows.into_iter().map(row_to_character).collect()
    }

    pub async fn list_at_location(
        &self,
        conn: &mut SqliteConnection,
        location_id: LocationId,
        alive_only: bool,
    ) -> Result<Vec<Character>, StoreError> {
        let mut sql = String::from("SELECT * FROM characters WHERE current_location_id = ?");
        if alive_only {
            sql.push_str(" AND is_alive = 1");
        }
        sql.push_str(" ORDER BY created_at");
        let rows = sqlx::query(&sql)
            .bind(location_id.to_string())
            .fetch_all(conn)
            .await?;
        rows.into_iter().map(row_to_character).collect()
    }

    pub async fn delete(
        &self,
        conn: &mut SqliteConnection,
        id: CharacterId,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM characters WHERE id = ?")
            .bind(id.to_string())
            .execute(conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_character(row: sqlx::sqlite::SqliteRow) -> Result<Character, StoreError> {
    let id: String = row.get("id");
    let campaign_id: String = row.get("campaign_id");
    let speech_pattern: Option<String> = row.get("speech_pattern");
    let current_location_id: Option<String> = row.get("current_location_id");
    Ok(Character {
        id: CharacterId::parse(&id).map_err(|e| StoreError::Serialization(e.to_string()))?,
        campaign_id: CampaignId::parse(&campaign_id)
            .map_err(|e| StoreError::Serialization(e.to_string()))?,
        name: row.get("name"),
        kind: parse_enum(row.get::<String, _>("character_type").as_str())?,
        race: row.get("race"),
        char_class: row.get("char_class"),
        level: row.get("level"),
        hp_current: row.get("hp_current"),
        hp_max: row.get("hp_max"),
        armor_class: row.get("armor_class"),
        abilities: AbilityScores {
            strength: row.get("strength"),
            dexterity: row.get("dexterity"),
            constitution: row.get("constitution"),
            intelligence: row.get("intelligence"),
            wisdom: row.get("wisdom"),
            charisma: row.get("charisma"),
        },
        personality_traits: from_json(row.get::<String, _>("personality_traits").as_str())?,
        backstory: row.get("backstory"),
        appearance: row.get("appearance"),
        motivation: row.get("motivation"),
        secret: row.get("secret"),
        disposition: row.get("disposition"),
        speech_pattern: speech_pattern
            .map(|raw| parse_enum(raw.as_str()))
            .transpose()?,
        npc_memory: from_json(row.get::<String, _>("npc_memory").as_str())?,
        inventory: from_json(row.get::<String, _>("inventory").as_str())?,
        equipment: from_json(row.get::<String, _>("equipment").as_str())?,
        gold: row.get("gold"),
        skills: from_json(row.get::<String, _>("skills").as_str())?,
        proficiencies: from_json(row.get::<String, _>("proficiencies").as_str())?,
        languages: from_json(row.get::<String, _>("languages").as_str())?,
        is_alive: row.get("is_alive"),
        conditions: from_json(row.get::<String, _>("conditions").as_str())?,
        current_location_id: current_location_id
            .map(|raw| LocationId::parse(&raw))
            .transpose()
            .map_err(|e| StoreError::Serialization(e.to_string()))?,
        experience_points: row.get("experience_points"),
        created_at: parse_ts(row.get::<String, _>("created_at").as_str())?,
        updated_at: parse_ts(row.get::<String, _>("updated_at").as_str())?,
    })
}
