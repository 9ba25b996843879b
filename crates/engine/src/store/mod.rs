//! Relational store adapter over SQLite.
//!
//! `Store` owns the pool and creates the schema on connect. Typed repos
//! expose CRUD per table; every repo method takes a `&mut SqliteConnection`
//! so a caller can thread one transaction through an entire unit-of-work:
//!
//! ```ignore
//! let mut tx = store.begin().await?;
//! store.characters().save(&mut tx, &pc).await?;
//! store.events().insert(&mut tx, &event).await?;
//! tx.commit().await?;
//! ```
//!
//! Dropping the transaction without committing rolls everything back.

mod campaigns;
mod characters;
mod encounters;
mod events;
mod graph_store;
mod knowledge;
mod locations;
mod sessions;

pub use campaigns::{CampaignCounts, CampaignRepo};
pub use characters::CharacterRepo;
pub use encounters::EncounterRepo;
pub use events::{EventRepo, TimelineRow};
pub use graph_store::{load_graph, save_graph};
pub use knowledge::KnowledgeRepo;
pub use locations::LocationRepo;
pub use sessions::SessionRepo;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found")]
    NotFound,
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound,
            other => Self::Database(other.to_string()),
        }
    }
}

/// Handle to the SQLite store. Cloning shares the pool.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Connect and create the schema if missing.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>, StoreError> {
        Ok(self.pool.acquire().await?)
    }

    /// Begin a unit-of-work transaction.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, StoreError> {
        Ok(self.pool.begin().await?)
    }

    pub fn campaigns(&self) -> CampaignRepo {
        CampaignRepo
    }

    pub fn sessions(&self) -> SessionRepo {
        SessionRepo
    }

    pub fn characters(&self) -> CharacterRepo {
        CharacterRepo
    }

    pub fn locations(&self) -> LocationRepo {
        LocationRepo
    }

    pub fn events(&self) -> EventRepo {
        EventRepo
    }

    pub fn encounters(&self) -> EncounterRepo {
        EncounterRepo
    }

    pub fn knowledge(&self) -> KnowledgeRepo {
        KnowledgeRepo
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS campaigns (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                genre TEXT NOT NULL,
                tone TEXT NOT NULL,
                setting_description TEXT,
                world_rules TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS game_sessions (
                id TEXT PRIMARY KEY,
                campaign_id TEXT NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
                session_number INTEGER NOT NULL,
                status TEXT NOT NULL,
                recap TEXT,
                notes TEXT,
                started_at TEXT NOT NULL,
                ended_at TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS locations (
                id TEXT PRIMARY KEY,
                campaign_id TEXT NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                location_type TEXT NOT NULL,
                description TEXT,
                detailed_description TEXT,
                x_coord REAL NOT NULL DEFAULT 0,
                y_coord REAL NOT NULL DEFAULT 0,
                danger_level INTEGER NOT NULL DEFAULT 1,
                is_discovered INTEGER NOT NULL DEFAULT 0,
                is_accessible INTEGER NOT NULL DEFAULT 1,
                terrain TEXT,
                climate TEXT,
                atmosphere TEXT,
                points_of_interest TEXT NOT NULL DEFAULT '[]',
                resources TEXT NOT NULL DEFAULT '[]',
                environmental_effects TEXT NOT NULL DEFAULT '[]',
                connected_locations TEXT NOT NULL DEFAULT '[]',
                parent_location_id TEXT REFERENCES locations(id) ON DELETE SET NULL,
                properties TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS characters (
                id TEXT PRIMARY KEY,
                campaign_id TEXT NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                character_type TEXT NOT NULL,
                race TEXT,
                char_class TEXT,
                level INTEGER NOT NULL DEFAULT 1,
                hp_current INTEGER NOT NULL DEFAULT 10,
                hp_max INTEGER NOT NULL DEFAULT 10,
                armor_class INTEGER NOT NULL DEFAULT 10,
                strength INTEGER NOT NULL DEFAULT 10,
                dexterity INTEGER NOT NULL DEFAULT 10,
                constitution INTEGER NOT NULL DEFAULT 10,
                intelligence INTEGER NOT NULL DEFAULT 10,
                wisdom INTEGER NOT NULL DEFAULT 10,
                charisma INTEGER NOT NULL DEFAULT 10,
                personality_traits TEXT NOT NULL DEFAULT '[]',
                backstory TEXT,
                appearance TEXT,
                motivation TEXT,
                secret TEXT,
                disposition INTEGER NOT NULL DEFAULT 0,
                speech_pattern TEXT,
                npc_memory TEXT NOT NULL DEFAULT '[]',
                inventory TEXT NOT NULL DEFAULT '[]',
                equipment TEXT NOT NULL DEFAULT '{}',
                gold INTEGER NOT NULL DEFAULT 0,
                skills TEXT NOT NULL DEFAULT '{}',
                proficiencies TEXT NOT NULL DEFAULT '[]',
                languages TEXT NOT NULL DEFAULT '[]',
                is_alive INTEGER NOT NULL DEFAULT 1,
                conditions TEXT NOT NULL DEFAULT '[]',
                current_location_id TEXT REFERENCES locations(id) ON DELETE SET NULL,
                experience_points INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS story_events (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES game_sessions(id) ON DELETE CASCADE,
                event_type TEXT NOT NULL,
                content TEXT NOT NULL,
                player_action TEXT,
                choices TEXT,
                chosen_index INTEGER,
                mood TEXT,
                speaker TEXT,
                dice_rolls TEXT NOT NULL DEFAULT '[]',
                knowledge_updates TEXT NOT NULL DEFAULT '[]',
                new_entities TEXT NOT NULL DEFAULT '[]',
                xp_awarded INTEGER,
                items_awarded TEXT NOT NULL DEFAULT '[]',
                parse_error INTEGER NOT NULL DEFAULT 0,
                sequence_order INTEGER NOT NULL,
                location_id TEXT,
                encounter_id TEXT,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS encounters (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES game_sessions(id) ON DELETE CASCADE,
                location_id TEXT REFERENCES locations(id) ON DELETE SET NULL,
                name TEXT NOT NULL,
                encounter_type TEXT NOT NULL,
                description TEXT,
                difficulty TEXT NOT NULL,
                status TEXT NOT NULL,
                current_round INTEGER NOT NULL DEFAULT 1,
                current_turn_index INTEGER NOT NULL DEFAULT 0,
                enemies TEXT NOT NULL DEFAULT '[]',
                initiative_order TEXT NOT NULL DEFAULT '[]',
                combat_log TEXT NOT NULL DEFAULT '[]',
                participants TEXT NOT NULL DEFAULT '[]',
                social_stakes TEXT,
                puzzle_description TEXT,
                puzzle_solution TEXT,
                puzzle_hints TEXT NOT NULL DEFAULT '[]',
                hints_revealed INTEGER NOT NULL DEFAULT 0,
                environmental_effects TEXT NOT NULL DEFAULT '[]',
                terrain_features TEXT NOT NULL DEFAULT '[]',
                rewards TEXT,
                rewards_distributed INTEGER NOT NULL DEFAULT 0,
                party_level_at_start INTEGER,
                party_size_at_start INTEGER,
                created_at TEXT NOT NULL,
                ended_at TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS knowledge_nodes (
                id TEXT PRIMARY KEY,
                campaign_id TEXT NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
                node_type TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                entity_id TEXT,
                entity_type TEXT,
                properties TEXT NOT NULL DEFAULT '{}',
                importance INTEGER NOT NULL DEFAULT 5,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS knowledge_edges (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL REFERENCES knowledge_nodes(id) ON DELETE CASCADE,
                target_id TEXT NOT NULL REFERENCES knowledge_nodes(id) ON DELETE CASCADE,
                edge_type TEXT NOT NULL,
                properties TEXT NOT NULL DEFAULT '{}',
                started_at TEXT,
                ended_at TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                UNIQUE(source_id, target_id, edge_type)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_sessions_campaign ON game_sessions(campaign_id)",
            "CREATE INDEX IF NOT EXISTS idx_characters_campaign ON characters(campaign_id)",
            "CREATE INDEX IF NOT EXISTS idx_locations_campaign ON locations(campaign_id)",
            "CREATE INDEX IF NOT EXISTS idx_events_session ON story_events(session_id, sequence_order)",
            "CREATE INDEX IF NOT EXISTS idx_encounters_session ON encounters(session_id)",
            "CREATE INDEX IF NOT EXISTS idx_knowledge_nodes_campaign ON knowledge_nodes(campaign_id)",
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

// Column conversion helpers shared by the repos.

pub(crate) fn ts(value: &DateTime<Utc>) -> String {
    value.to_rfc3339()
}

pub(crate) fn opt_ts(value: &Option<DateTime<Utc>>) -> Option<String> {
    value.as_ref().map(ts)
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Serialization(format!("bad timestamp '{raw}': {e}")))
}

pub(crate) fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    raw.map(|value| parse_ts(&value)).transpose()
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

pub(crate) fn from_json<T: DeserializeOwned>(raw: &str) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Serialization(e.to_string()))
}

pub(crate) fn parse_enum<T>(raw: &str) -> Result<T, StoreError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e: T::Err| StoreError::Serialization(format!("bad column value '{raw}': {e}")))
}
