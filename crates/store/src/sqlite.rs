//! SQLite backend.
//!
//! One database file with six tables:
//! - `conversations` and `messages` for chat history
//! - `regions` and `poi_sets` for per-conversation map state
//! - `area_boundaries` and `listings` for imported reference data
//!
//! Messages, regions, and POI sets cascade-delete with their owner.
//! Timestamps are stored as fixed-width RFC 3339 text so they sort lexically.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use settlr_core::error::StoreError;
use settlr_core::geo::Ring;
use settlr_core::message::{Conversation, ConversationId, Message, Role, ToolCallRecord};
use settlr_core::region::{AreaBoundary, Listing, PointOfInterest, PointOfInterestSet, Region};
use settlr_core::store::{GeoStore, HistoryStore, StoreResult};
use sqlx::sqlite::{
    Sqlite, SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

const SCHEMA: &[(&str, &str)] = &[
    (
        "conversations table",
        r#"
        CREATE TABLE IF NOT EXISTS conversations (
            id          TEXT PRIMARY KEY,
            title       TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        )
        "#,
    ),
    (
        "messages table",
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,
            id              TEXT UNIQUE NOT NULL,
            conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            role            TEXT NOT NULL,
            content         TEXT NOT NULL,
            tool_calls      TEXT,
            timestamp       TEXT NOT NULL
        )
        "#,
    ),
    (
        "messages index",
        "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, timestamp, seq)",
    ),
    (
        "regions table",
        r#"
        CREATE TABLE IF NOT EXISTS regions (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            name            TEXT NOT NULL,
            coordinates     TEXT NOT NULL,
            created_at      TEXT NOT NULL
        )
        "#,
    ),
    (
        "regions index",
        "CREATE INDEX IF NOT EXISTS idx_regions_conversation ON regions(conversation_id, id)",
    ),
    (
        "poi_sets table",
        r#"
        CREATE TABLE IF NOT EXISTS poi_sets (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            region_id       INTEGER NOT NULL REFERENCES regions(id) ON DELETE CASCADE,
            conversation_id TEXT NOT NULL,
            interest        TEXT NOT NULL,
            points          TEXT NOT NULL,
            created_at      TEXT NOT NULL
        )
        "#,
    ),
    (
        "poi_sets index",
        "CREATE INDEX IF NOT EXISTS idx_poi_sets_region ON poi_sets(region_id, id)",
    ),
    (
        "area_boundaries table",
        r#"
        CREATE TABLE IF NOT EXISTS area_boundaries (
            name        TEXT PRIMARY KEY,
            aliases     TEXT NOT NULL DEFAULT '[]',
            coordinates TEXT NOT NULL
        )
        "#,
    ),
    (
        "listings table",
        r#"
        CREATE TABLE IF NOT EXISTS listings (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            reference       TEXT NOT NULL,
            source          TEXT,
            link            TEXT,
            price           TEXT,
            address         TEXT,
            bedrooms        INTEGER,
            bathrooms       INTEGER,
            area_sqm        REAL,
            title           TEXT,
            description     TEXT,
            images          TEXT NOT NULL DEFAULT '[]',
            floor_plan_url  TEXT,
            location        TEXT
        )
        "#,
    ),
];

/// SQLite-backed conversation and map store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a database.
    ///
    /// Accepts `sqlite://path.db`, a bare path, or `":memory:"` for an
    /// in-process ephemeral database (useful for tests).
    pub async fn new(url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite URL: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        // Each connection to `:memory:` is its own database, so pin to one.
        let in_memory = url.contains(":memory:");
        let mut pool_options = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 4 });
        if in_memory {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {url}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> StoreResult<Self> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> StoreResult<()> {
        for (label, sql) in SCHEMA {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{label}: {e}")))?;
        }
        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_conversation(row: &SqliteRow) -> StoreResult<Conversation> {
        Ok(Conversation {
            id: ConversationId(col(row, "id")?),
            title: col(row, "title")?,
            created_at: parse_time(&col::<String>(row, "created_at")?)?,
            updated_at: parse_time(&col::<String>(row, "updated_at")?)?,
        })
    }

    fn row_to_message(row: &SqliteRow) -> StoreResult<Message> {
        let role_str: String = col(row, "role")?;
        let role = Role::parse(&role_str)
            .ok_or_else(|| StoreError::QueryFailed(format!("unknown role '{role_str}'")))?;
        let tool_calls: Vec<ToolCallRecord> = match col::<Option<String>>(row, "tool_calls")? {
            Some(json) => from_json(&json, "tool_calls")?,
            None => Vec::new(),
        };

        Ok(Message {
            id: col(row, "id")?,
            role,
            content: col(row, "content")?,
            tool_calls,
            tool_call_id: None,
            timestamp: parse_time(&col::<String>(row, "timestamp")?)?,
        })
    }

    fn row_to_region(row: &SqliteRow) -> StoreResult<Region> {
        Ok(Region {
            id: col(row, "id")?,
            conversation_id: ConversationId(col(row, "conversation_id")?),
            name: col(row, "name")?,
            ring: from_json(&col::<String>(row, "coordinates")?, "coordinates")?,
            created_at: parse_time(&col::<String>(row, "created_at")?)?,
        })
    }

    fn row_to_poi_set(row: &SqliteRow) -> StoreResult<PointOfInterestSet> {
        Ok(PointOfInterestSet {
            id: col(row, "id")?,
            region_id: col(row, "region_id")?,
            conversation_id: ConversationId(col(row, "conversation_id")?),
            interest: col(row, "interest")?,
            points: from_json(&col::<String>(row, "points")?, "points")?,
            created_at: parse_time(&col::<String>(row, "created_at")?)?,
        })
    }

    fn row_to_boundary(row: &SqliteRow) -> StoreResult<AreaBoundary> {
        Ok(AreaBoundary {
            name: col(row, "name")?,
            aliases: from_json(&col::<String>(row, "aliases")?, "aliases")?,
            ring: from_json(&col::<String>(row, "coordinates")?, "coordinates")?,
        })
    }

    fn row_to_listing(row: &SqliteRow) -> StoreResult<Listing> {
        let small = |name: &str| -> StoreResult<Option<u32>> {
            Ok(col::<Option<i64>>(row, name)?.and_then(|v| u32::try_from(v).ok()))
        };
        Ok(Listing {
            id: col(row, "id")?,
            reference: col(row, "reference")?,
            source: col(row, "source")?,
            link: col(row, "link")?,
            price: col(row, "price")?,
            address: col(row, "address")?,
            bedrooms: small("bedrooms")?,
            bathrooms: small("bathrooms")?,
            area_sqm: col(row, "area_sqm")?,
            title: col(row, "title")?,
            description: col(row, "description")?,
            images: from_json(&col::<String>(row, "images")?, "images")?,
            floor_plan_url: col(row, "floor_plan_url")?,
            location: col(row, "location")?,
        })
    }
}

/// Read a column, mapping decode failures to [`StoreError::QueryFailed`].
fn col<'r, T>(row: &'r SqliteRow, name: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StoreError::QueryFailed(format!("{name} column: {e}")))
}

fn from_json<T: serde::de::DeserializeOwned>(json: &str, what: &str) -> StoreResult<T> {
    serde_json::from_str(json).map_err(|e| StoreError::QueryFailed(format!("{what} JSON: {e}")))
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T, what: &str) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|e| StoreError::Storage(format!("{what} JSON: {e}")))
}

fn format_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(s: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::QueryFailed(format!("timestamp '{s}': {e}")))
}

fn query_failed(context: &str) -> impl Fn(sqlx::Error) -> StoreError + '_ {
    move |e| StoreError::QueryFailed(format!("{context}: {e}"))
}

fn storage_failed(context: &str) -> impl Fn(sqlx::Error) -> StoreError + '_ {
    move |e| StoreError::Storage(format!("{context}: {e}"))
}

#[async_trait]
impl HistoryStore for SqliteStore {
    async fn create_conversation(
        &self,
        id: &ConversationId,
        first_message: &str,
    ) -> StoreResult<Conversation> {
        let conversation = Conversation::new(id.clone(), first_message);
        let first = Message::user(first_message);
        let created = format_time(&conversation.created_at);

        let mut tx = self.pool.begin().await.map_err(storage_failed("BEGIN"))?;

        sqlx::query(
            "INSERT INTO conversations (id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
        )
        .bind(id.as_str())
        .bind(&conversation.title)
        .bind(&created)
        .execute(&mut *tx)
        .await
        .map_err(storage_failed("INSERT conversation"))?;

        sqlx::query(
            "INSERT INTO messages (id, conversation_id, role, content, tool_calls, timestamp) \
             VALUES (?1, ?2, ?3, ?4, NULL, ?5)",
        )
        .bind(&first.id)
        .bind(id.as_str())
        .bind(first.role.as_str())
        .bind(&first.content)
        .bind(format_time(&first.timestamp))
        .execute(&mut *tx)
        .await
        .map_err(storage_failed("INSERT first message"))?;

        tx.commit().await.map_err(storage_failed("COMMIT"))?;
        debug!(conversation_id = %id, "Created conversation");
        Ok(conversation)
    }

    async fn get_conversation(&self, id: &ConversationId) -> StoreResult<Option<Conversation>> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed("SELECT conversation"))?;
        row.as_ref().map(Self::row_to_conversation).transpose()
    }

    async fn append_message(&self, id: &ConversationId, message: &Message) -> StoreResult<()> {
        let tool_calls = if message.tool_calls.is_empty() {
            None
        } else {
            Some(to_json(&message.tool_calls, "tool_calls")?)
        };
        let timestamp = format_time(&message.timestamp);

        let mut tx = self.pool.begin().await.map_err(storage_failed("BEGIN"))?;

        let updated = sqlx::query("UPDATE conversations SET updated_at = ?2 WHERE id = ?1")
            .bind(id.as_str())
            .bind(&timestamp)
            .execute(&mut *tx)
            .await
            .map_err(storage_failed("UPDATE conversation"))?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("conversation {id}")));
        }

        sqlx::query(
            "INSERT INTO messages (id, conversation_id, role, content, tool_calls, timestamp) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&message.id)
        .bind(id.as_str())
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(tool_calls)
        .bind(&timestamp)
        .execute(&mut *tx)
        .await
        .map_err(storage_failed("INSERT message"))?;

        tx.commit().await.map_err(storage_failed("COMMIT"))?;
        Ok(())
    }

    async fn messages(&self, id: &ConversationId) -> StoreResult<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT * FROM messages WHERE conversation_id = ?1 ORDER BY timestamp ASC, seq ASC",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(query_failed("SELECT messages"))?;
        rows.iter().map(Self::row_to_message).collect()
    }
}

#[async_trait]
impl GeoStore for SqliteStore {
    async fn insert_region(
        &self,
        conversation_id: &ConversationId,
        name: &str,
        ring: &Ring,
    ) -> StoreResult<Region> {
        let created_at = Utc::now();
        let result = sqlx::query(
            "INSERT INTO regions (conversation_id, name, coordinates, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(conversation_id.as_str())
        .bind(name)
        .bind(to_json(ring, "coordinates")?)
        .bind(format_time(&created_at))
        .execute(&self.pool)
        .await
        .map_err(storage_failed("INSERT region"))?;

        Ok(Region {
            id: result.last_insert_rowid(),
            conversation_id: conversation_id.clone(),
            name: name.to_string(),
            ring: ring.clone(),
            created_at,
        })
    }

    async fn get_region(&self, region_id: i64) -> StoreResult<Option<Region>> {
        let row = sqlx::query("SELECT * FROM regions WHERE id = ?1")
            .bind(region_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_failed("SELECT region"))?;
        row.as_ref().map(Self::row_to_region).transpose()
    }

    async fn regions(&self, conversation_id: &ConversationId) -> StoreResult<Vec<Region>> {
        let rows = sqlx::query("SELECT * FROM regions WHERE conversation_id = ?1 ORDER BY id ASC")
            .bind(conversation_id.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed("SELECT regions"))?;
        rows.iter().map(Self::row_to_region).collect()
    }

    async fn insert_poi_sets(
        &self,
        region: &Region,
        sets: &[(String, Vec<PointOfInterest>)],
    ) -> StoreResult<Vec<PointOfInterestSet>> {
        let created_at = Utc::now();
        let mut tx = self.pool.begin().await.map_err(storage_failed("BEGIN"))?;
        let mut stored = Vec::with_capacity(sets.len());

        for (interest, points) in sets {
            let result = sqlx::query(
                "INSERT INTO poi_sets (region_id, conversation_id, interest, points, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .bind(region.id)
            .bind(region.conversation_id.as_str())
            .bind(interest)
            .bind(to_json(points, "points")?)
            .bind(format_time(&created_at))
            .execute(&mut *tx)
            .await
            .map_err(storage_failed("INSERT poi_set"))?;

            stored.push(PointOfInterestSet {
                id: result.last_insert_rowid(),
                region_id: region.id,
                conversation_id: region.conversation_id.clone(),
                interest: interest.clone(),
                points: points.clone(),
                created_at,
            });
        }

        tx.commit().await.map_err(storage_failed("COMMIT"))?;
        Ok(stored)
    }

    async fn poi_sets(&self, region_id: i64) -> StoreResult<Vec<PointOfInterestSet>> {
        let rows = sqlx::query("SELECT * FROM poi_sets WHERE region_id = ?1 ORDER BY id ASC")
            .bind(region_id)
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed("SELECT poi_sets"))?;
        rows.iter().map(Self::row_to_poi_set).collect()
    }

    async fn upsert_boundary(&self, boundary: &AreaBoundary) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO area_boundaries (name, aliases, coordinates)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(name) DO UPDATE SET
                aliases = excluded.aliases,
                coordinates = excluded.coordinates
            "#,
        )
        .bind(&boundary.name)
        .bind(to_json(&boundary.aliases, "aliases")?)
        .bind(to_json(&boundary.ring, "coordinates")?)
        .execute(&self.pool)
        .await
        .map_err(storage_failed("UPSERT boundary"))?;
        Ok(())
    }

    async fn boundaries(&self) -> StoreResult<Vec<AreaBoundary>> {
        let rows = sqlx::query("SELECT * FROM area_boundaries ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed("SELECT boundaries"))?;
        rows.iter().map(Self::row_to_boundary).collect()
    }

    async fn insert_listing(&self, listing: &Listing) -> StoreResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO listings (
                reference, source, link, price, address, bedrooms, bathrooms,
                area_sqm, title, description, images, floor_plan_url, location
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&listing.reference)
        .bind(&listing.source)
        .bind(&listing.link)
        .bind(&listing.price)
        .bind(&listing.address)
        .bind(listing.bedrooms.map(i64::from))
        .bind(listing.bathrooms.map(i64::from))
        .bind(listing.area_sqm)
        .bind(&listing.title)
        .bind(&listing.description)
        .bind(to_json(&listing.images, "images")?)
        .bind(&listing.floor_plan_url)
        .bind(&listing.location)
        .execute(&self.pool)
        .await
        .map_err(storage_failed("INSERT listing"))?;
        Ok(result.last_insert_rowid())
    }

    async fn listings(&self) -> StoreResult<Vec<Listing>> {
        let rows = sqlx::query("SELECT * FROM listings ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(query_failed("SELECT listings"))?;
        rows.iter().map(Self::row_to_listing).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use settlr_core::geo::Coordinate;

    async fn test_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    fn square() -> Ring {
        Ring::new(vec![
            Coordinate::new(-0.08, 51.52),
            Coordinate::new(-0.08, 51.53),
            Coordinate::new(-0.07, 51.53),
            Coordinate::new(-0.07, 51.52),
        ])
        .unwrap()
    }

    fn poi(name: &str) -> PointOfInterest {
        PointOfInterest {
            name: name.into(),
            latitude: 51.525,
            longitude: -0.075,
            address: Some("1 Test St".into()),
            rating: Some(4.5),
            review_count: Some(120),
            categories: vec!["bar".into()],
            website: None,
            gmaps_link: None,
        }
    }

    #[tokio::test]
    async fn create_conversation_stores_first_message() {
        let store = test_store().await;
        let id = ConversationId::from("c1");
        let conv = store
            .create_conversation(&id, "Tell me about Shoreditch")
            .await
            .unwrap();
        assert_eq!(conv.title, "Tell me about Shoreditch");

        let fetched = store.get_conversation(&id).await.unwrap().unwrap();
        assert_eq!(fetched.id, id);

        let messages = store.messages(&id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn missing_conversation_is_none() {
        let store = test_store().await;
        assert!(store
            .get_conversation(&ConversationId::from("nope"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn append_to_missing_conversation_fails() {
        let store = test_store().await;
        let err = store
            .append_message(&ConversationId::from("nope"), &Message::user("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn messages_keep_insertion_order_on_equal_timestamps() {
        let store = test_store().await;
        let id = ConversationId::from("c1");
        store.create_conversation(&id, "first").await.unwrap();

        let stamp = Utc::now();
        for text in ["a", "b", "c"] {
            let mut msg = Message::assistant(text);
            msg.timestamp = stamp;
            store.append_message(&id, &msg).await.unwrap();
        }

        let contents: Vec<String> = store
            .messages(&id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["first", "a", "b", "c"]);
    }

    #[tokio::test]
    async fn tool_calls_round_trip() {
        let store = test_store().await;
        let id = ConversationId::from("c1");
        store.create_conversation(&id, "hi").await.unwrap();

        let msg = Message::assistant("Found it").with_tool_calls(vec![ToolCallRecord {
            id: "toolu_1".into(),
            name: "resolve_area".into(),
            input: serde_json::json!({"area_name": "Hackney"}),
        }]);
        store.append_message(&id, &msg).await.unwrap();

        let messages = store.messages(&id).await.unwrap();
        assert_eq!(messages[1].tool_calls.len(), 1);
        assert_eq!(messages[1].tool_calls[0].input["area_name"], "Hackney");
    }

    #[tokio::test]
    async fn append_bumps_updated_at() {
        let store = test_store().await;
        let id = ConversationId::from("c1");
        let created = store.create_conversation(&id, "hi").await.unwrap();

        let mut msg = Message::assistant("later");
        msg.timestamp = created.updated_at + chrono::Duration::seconds(5);
        store.append_message(&id, &msg).await.unwrap();

        let fetched = store.get_conversation(&id).await.unwrap().unwrap();
        assert!(fetched.updated_at > created.updated_at);
    }

    #[tokio::test]
    async fn record_user_message_creates_then_appends() {
        let store = test_store().await;
        let id = ConversationId::from("c1");
        store.record_user_message(&id, "first").await.unwrap();
        store.record_user_message(&id, "second").await.unwrap();

        let conv = store.get_conversation(&id).await.unwrap().unwrap();
        assert_eq!(conv.title, "first");
        assert_eq!(store.messages(&id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn region_and_poi_round_trip() {
        let store = test_store().await;
        let id = ConversationId::from("c1");
        store.create_conversation(&id, "hi").await.unwrap();

        let region = store.insert_region(&id, "Shoreditch", &square()).await.unwrap();
        let fetched = store.get_region(region.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Shoreditch");
        assert_eq!(fetched.ring, square());

        let sets = vec![
            ("karaoke bars".to_string(), vec![poi("Lucky Voice")]),
            ("gyms".to_string(), vec![]),
        ];
        store.insert_poi_sets(&region, &sets).await.unwrap();

        let sets = store.poi_sets(region.id).await.unwrap();
        assert_eq!(sets.len(), 2);
        assert_eq!(sets[0].interest, "karaoke bars");
        assert_eq!(sets[0].points[0].name, "Lucky Voice");
        assert!(sets[1].points.is_empty());

        assert_eq!(store.regions(&id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn poi_sets_are_stored_all_or_nothing() {
        let store = test_store().await;
        let id = ConversationId::from("c1");
        store.create_conversation(&id, "hi").await.unwrap();
        let region = store.insert_region(&id, "Shoreditch", &square()).await.unwrap();
        sqlx::query(
            "CREATE TRIGGER reject_boom BEFORE INSERT ON poi_sets WHEN NEW.interest = 'boom' \
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let sets = vec![
            ("cafes".to_string(), vec![poi("Ozone")]),
            ("boom".to_string(), vec![]),
        ];
        assert!(store.insert_poi_sets(&region, &sets).await.is_err());
        assert!(store.poi_sets(region.id).await.unwrap().is_empty());

        let stored = store.insert_poi_sets(&region, &sets[..1]).await.unwrap();
        let read = store.poi_sets(region.id).await.unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].id, stored[0].id);
        assert_eq!(read[0].points, stored[0].points);
    }

    #[tokio::test]
    async fn region_requires_existing_conversation() {
        let store = test_store().await;
        let result = store
            .insert_region(&ConversationId::from("ghost"), "Soho", &square())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn boundary_upsert_replaces() {
        let store = test_store().await;
        let mut boundary = AreaBoundary {
            name: "Hackney".into(),
            aliases: vec![],
            ring: square(),
        };
        store.upsert_boundary(&boundary).await.unwrap();
        boundary.aliases = vec!["Dalston".into()];
        store.upsert_boundary(&boundary).await.unwrap();

        let all = store.boundaries().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].aliases, vec!["Dalston"]);
    }

    #[tokio::test]
    async fn listing_round_trip() {
        let store = test_store().await;
        let listing = Listing {
            id: 0,
            reference: "rm-1".into(),
            source: Some("rightmove".into()),
            link: Some("https://example.com/1".into()),
            price: Some("£2,000 pcm".into()),
            address: Some("Hoxton Sq".into()),
            bedrooms: Some(2),
            bathrooms: Some(1),
            area_sqm: Some(61.5),
            title: None,
            description: None,
            images: vec!["a.jpg".into()],
            floor_plan_url: None,
            location: Some("[-0.075, 51.525]".into()),
        };
        let id = store.insert_listing(&listing).await.unwrap();

        let all = store.listings().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);
        assert_eq!(all[0].bedrooms, Some(2));
        assert_eq!(all[0].images, vec!["a.jpg"]);
        assert_eq!(all[0].monthly_price(), Some(2000));
    }

    #[tokio::test]
    async fn file_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("settlr.db").display());
        let id = ConversationId::from("c1");

        {
            let store = SqliteStore::new(&url).await.unwrap();
            store.create_conversation(&id, "persist me").await.unwrap();
        }

        let store = SqliteStore::new(&url).await.unwrap();
        assert_eq!(store.messages(&id).await.unwrap().len(), 1);
    }
}
