use crate::channel::ChannelConfig;
use crate::content::{ItemKey, ItemRecord, ReplicationState, micros_to_datetime};
use crate::error::{Result, StrataError};
use crate::group::{GroupConfig, GroupRecord};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior, params};
use std::path::{Path, PathBuf};
use std::time::Duration;

const SELECT_GROUP: &str =
    "SELECT name, callback_url, channel_url, transactional, last_completed, created_at
     FROM groups
     WHERE name = ?1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupPut {
    Created,
    Unchanged,
    Replaced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

/// SQLite index for channels, items and groups. Payload bytes live in the
/// cache and long-term stores; this only records where and what they are.
pub struct MetadataStore {
    db_path: PathBuf,
}

impl MetadataStore {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let store = Self { db_path };
        store.init_schema()?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn get_conn(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS channels (
                channel_id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                tags TEXT NOT NULL,
                ttl_days INTEGER,
                created_at TEXT NOT NULL,
                deleted_at TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_channels_live_name
             ON channels(name) WHERE deleted_at IS NULL",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS items (
                pk INTEGER PRIMARY KEY AUTOINCREMENT,
                channel_id TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                timestamp_micros INTEGER NOT NULL,
                content_type TEXT NOT NULL,
                content_language TEXT,
                size_bytes INTEGER NOT NULL DEFAULT 0,
                sha256 TEXT NOT NULL,
                cache_path TEXT,
                replication_state TEXT NOT NULL CHECK(replication_state IN ('pending', 'replicated')),
                long_term_url TEXT,
                write_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(channel_id, sequence)
            )",
            [],
        )?;

        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_items_write_id
             ON items(channel_id, write_id) WHERE write_id IS NOT NULL",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_items_time
             ON items(channel_id, timestamp_micros)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_items_replication
             ON items(replication_state, timestamp_micros)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS groups (
                name TEXT PRIMARY KEY,
                callback_url TEXT NOT NULL,
                channel_url TEXT NOT NULL,
                transactional INTEGER NOT NULL DEFAULT 0,
                last_completed INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    /// Returns false when a live channel already holds the name.
    pub fn insert_channel(&self, channel: &ChannelConfig) -> Result<bool> {
        let conn = self.get_conn()?;
        let tags = serde_json::to_string(&channel.tags)?;

        let inserted = conn.execute(
            "INSERT INTO channels (channel_id, name, tags, ttl_days, created_at, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL)",
            params![
                channel.channel_id,
                channel.name,
                tags,
                channel.ttl_days.map(|days| days as i64),
                channel.created_at.to_rfc3339(),
            ],
        );

        match inserted {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::SqliteFailure(error, _))
                if error.code == ErrorCode::ConstraintViolation =>
            {
                Ok(false)
            }
            Err(error) => Err(error.into()),
        }
    }

    pub fn get_live_channel(&self, name: &str) -> Result<Option<ChannelConfig>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                "SELECT channel_id, name, tags, ttl_days, created_at
                 FROM channels
                 WHERE name = ?1 AND deleted_at IS NULL",
                params![name],
                ChannelRow::from_row,
            )
            .optional()?;

        row.map(ChannelRow::decode).transpose()
    }

    pub fn is_channel_live(&self, channel_id: &str) -> Result<bool> {
        let conn = self.get_conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM channels WHERE channel_id = ?1 AND deleted_at IS NULL",
                params![channel_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn list_live_channels(&self) -> Result<Vec<ChannelConfig>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT channel_id, name, tags, ttl_days, created_at
             FROM channels
             WHERE deleted_at IS NULL
             ORDER BY name ASC",
        )?;

        let mut rows = stmt.query([])?;
        let mut channels = Vec::new();
        while let Some(row) = rows.next()? {
            channels.push(ChannelRow::from_row(row)?.decode()?);
        }

        Ok(channels)
    }

    /// Marks the live channel with `name` deleted and returns its id.
    pub fn tombstone_channel(&self, name: &str) -> Result<Option<String>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let channel_id: Option<String> = tx
            .query_row(
                "SELECT channel_id FROM channels WHERE name = ?1 AND deleted_at IS NULL",
                params![name],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(channel_id) = &channel_id {
            tx.execute(
                "UPDATE channels SET deleted_at = ?2 WHERE channel_id = ?1",
                params![channel_id, Utc::now().to_rfc3339()],
            )?;
        }

        tx.commit()?;
        Ok(channel_id)
    }

    pub fn list_tombstoned_channels(&self, deleted_before: DateTime<Utc>) -> Result<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT channel_id, deleted_at
             FROM channels
             WHERE deleted_at IS NOT NULL",
        )?;

        let mut rows = stmt.query([])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let channel_id: String = row.get(0)?;
            let deleted_at: String = row.get(1)?;
            if parse_rfc3339(&deleted_at)? <= deleted_before {
                ids.push(channel_id);
            }
        }

        Ok(ids)
    }

    pub fn purge_channel(&self, channel_id: &str) -> Result<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let items = tx.execute("DELETE FROM items WHERE channel_id = ?1", params![channel_id])?;
        tx.execute(
            "DELETE FROM channels WHERE channel_id = ?1 AND deleted_at IS NOT NULL",
            params![channel_id],
        )?;
        tx.commit()?;
        Ok(items)
    }

    pub fn latest_item(&self, channel_id: &str) -> Result<Option<ItemKey>> {
        let conn = self.get_conn()?;
        let key = conn
            .query_row(
                "SELECT sequence, timestamp_micros
                 FROM items
                 WHERE channel_id = ?1
                 ORDER BY sequence DESC
                 LIMIT 1",
                params![channel_id],
                item_key_from_row,
            )
            .optional()?;
        Ok(key)
    }

    pub fn adjacent_item(
        &self,
        channel_id: &str,
        sequence: i64,
        direction: Direction,
    ) -> Result<Option<ItemKey>> {
        let sql = match direction {
            Direction::Next => {
                "SELECT sequence, timestamp_micros FROM items
                 WHERE channel_id = ?1 AND sequence > ?2
                 ORDER BY sequence ASC LIMIT 1"
            }
            Direction::Previous => {
                "SELECT sequence, timestamp_micros FROM items
                 WHERE channel_id = ?1 AND sequence < ?2
                 ORDER BY sequence DESC LIMIT 1"
            }
        };

        let conn = self.get_conn()?;
        let key = conn
            .query_row(sql, params![channel_id, sequence], item_key_from_row)
            .optional()?;
        Ok(key)
    }

    /// Returns false when the item was already indexed.
    pub fn insert_item(&self, record: &ItemRecord, cache_path: Option<&str>) -> Result<bool> {
        self.insert_item_with_write_id(record, cache_path, None)
    }

    /// Like `insert_item`, additionally recording the client's write id. A
    /// write id is unique per channel.
    pub fn insert_item_with_write_id(
        &self,
        record: &ItemRecord,
        cache_path: Option<&str>,
        write_id: Option<&str>,
    ) -> Result<bool> {
        let conn = self.get_conn()?;
        let now = Utc::now().to_rfc3339();

        let affected = conn.execute(
            "INSERT INTO items (
                channel_id,
                sequence,
                timestamp_micros,
                content_type,
                content_language,
                size_bytes,
                sha256,
                cache_path,
                replication_state,
                long_term_url,
                write_id,
                created_at,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, ?11, ?10, ?10)
            ON CONFLICT(channel_id, sequence) DO NOTHING",
            params![
                record.channel_id,
                record.sequence,
                record.timestamp.timestamp_micros(),
                record.content_type,
                record.content_language,
                record.size_bytes as i64,
                record.sha256,
                cache_path,
                record.replication.as_str(),
                now,
                write_id,
            ],
        )?;

        Ok(affected > 0)
    }

    pub fn get_item_by_write_id(
        &self,
        channel_id: &str,
        write_id: &str,
    ) -> Result<Option<ItemRecord>> {
        let conn = self.get_conn()?;
        let record = conn
            .query_row(
                "SELECT channel_id, sequence, timestamp_micros, content_type, content_language,
                        size_bytes, sha256, replication_state
                 FROM items
                 WHERE channel_id = ?1 AND write_id = ?2",
                params![channel_id, write_id],
                ItemRow::from_row,
            )
            .optional()?;

        record.map(ItemRow::decode).transpose()
    }

    pub fn get_item(&self, channel_id: &str, sequence: i64) -> Result<Option<ItemRecord>> {
        let conn = self.get_conn()?;
        let record = conn
            .query_row(
                "SELECT channel_id, sequence, timestamp_micros, content_type, content_language,
                        size_bytes, sha256, replication_state
                 FROM items
                 WHERE channel_id = ?1 AND sequence = ?2",
                params![channel_id, sequence],
                ItemRow::from_row,
            )
            .optional()?;

        record.map(ItemRow::decode).transpose()
    }

    /// Items whose timestamp falls in `[start_micros, end_micros)`, by sequence.
    pub fn list_items_between(
        &self,
        channel_id: &str,
        start_micros: i64,
        end_micros: i64,
    ) -> Result<Vec<ItemKey>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT sequence, timestamp_micros
             FROM items
             WHERE channel_id = ?1
               AND timestamp_micros >= ?2
               AND timestamp_micros < ?3
             ORDER BY sequence ASC",
        )?;

        let mut rows = stmt.query(params![channel_id, start_micros, end_micros])?;
        let mut keys = Vec::new();
        while let Some(row) = rows.next()? {
            keys.push(item_key_from_row(row)?);
        }

        Ok(keys)
    }

    pub fn mark_replicated(
        &self,
        channel_id: &str,
        sequence: i64,
        long_term_url: &str,
    ) -> Result<bool> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE items
             SET replication_state = 'replicated',
                 long_term_url = ?3,
                 updated_at = ?4
             WHERE channel_id = ?1 AND sequence = ?2",
            params![channel_id, sequence, long_term_url, Utc::now().to_rfc3339()],
        )?;
        Ok(affected > 0)
    }

    /// Pending items of live channels stamped before `before_micros`, oldest first.
    pub fn list_pending_items(&self, before_micros: i64, limit: usize) -> Result<Vec<(String, i64)>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT items.channel_id, items.sequence
             FROM items
             JOIN channels ON channels.channel_id = items.channel_id
             WHERE items.replication_state = 'pending'
               AND items.timestamp_micros < ?1
               AND channels.deleted_at IS NULL
             ORDER BY items.timestamp_micros ASC, items.sequence ASC
             LIMIT ?2",
        )?;

        let mut rows = stmt.query(params![before_micros, limit as i64])?;
        let mut pending = Vec::new();
        while let Some(row) = rows.next()? {
            pending.push((row.get(0)?, row.get(1)?));
        }

        Ok(pending)
    }

    pub fn count_pending_items(&self, channel_id: &str) -> Result<u64> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM items
             WHERE channel_id = ?1 AND replication_state = 'pending'",
            params![channel_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn get_group(&self, name: &str) -> Result<Option<GroupRecord>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(SELECT_GROUP, params![name], GroupRow::from_row)
            .optional()?;

        row.map(GroupRow::decode).transpose()
    }

    pub fn list_groups(&self) -> Result<Vec<GroupRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT name, callback_url, channel_url, transactional, last_completed, created_at
             FROM groups
             ORDER BY name ASC",
        )?;

        let mut rows = stmt.query([])?;
        let mut groups = Vec::new();
        while let Some(row) = rows.next()? {
            groups.push(GroupRow::from_row(row)?.decode()?);
        }

        Ok(groups)
    }

    /// Stores `group` unless it conflicts with the stored config of the same
    /// name. The check and the write share one immediate transaction, so
    /// concurrent puts of a name are decided one after another. Delivery
    /// progress is reset when the config changes.
    pub fn put_group(&self, group: &GroupConfig) -> Result<(GroupPut, GroupRecord)> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = tx
            .query_row(SELECT_GROUP, params![group.name], GroupRow::from_row)
            .optional()?
            .map(GroupRow::decode)
            .transpose()?;

        let put = match &existing {
            Some(existing) if existing.config == *group => GroupPut::Unchanged,
            Some(existing) if group.conflicts_with(&existing.config) => {
                return Err(StrataError::GroupConflict(group.name.clone()));
            }
            Some(_) => GroupPut::Replaced,
            None => GroupPut::Created,
        };

        if put != GroupPut::Unchanged {
            tx.execute(
                "INSERT INTO groups (
                    name,
                    callback_url,
                    channel_url,
                    transactional,
                    last_completed,
                    created_at,
                    updated_at
                ) VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?5)
                ON CONFLICT(name) DO UPDATE SET
                    callback_url = excluded.callback_url,
                    channel_url = excluded.channel_url,
                    transactional = excluded.transactional,
                    last_completed = NULL,
                    updated_at = excluded.updated_at",
                params![
                    group.name,
                    group.callback_url,
                    group.channel_url,
                    group.transactional as i64,
                    Utc::now().to_rfc3339(),
                ],
            )?;
        }

        let stored = tx
            .query_row(SELECT_GROUP, params![group.name], GroupRow::from_row)?
            .decode()?;
        tx.commit()?;

        Ok((put, stored))
    }

    pub fn delete_group(&self, name: &str) -> Result<bool> {
        let conn = self.get_conn()?;
        let affected = conn.execute("DELETE FROM groups WHERE name = ?1", params![name])?;
        Ok(affected > 0)
    }

    /// Raises `last_completed`; never moves it backwards.
    pub fn record_group_delivery(&self, name: &str, sequence: i64) -> Result<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE groups
             SET last_completed = MAX(COALESCE(last_completed, ?2), ?2),
                 updated_at = ?3
             WHERE name = ?1",
            params![name, sequence, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

struct ChannelRow {
    channel_id: String,
    name: String,
    tags: String,
    ttl_days: Option<i64>,
    created_at: String,
}

impl ChannelRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            channel_id: row.get(0)?,
            name: row.get(1)?,
            tags: row.get(2)?,
            ttl_days: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn decode(self) -> Result<ChannelConfig> {
        Ok(ChannelConfig {
            channel_id: self.channel_id,
            name: self.name,
            tags: serde_json::from_str(&self.tags)?,
            ttl_days: self.ttl_days.map(|days| days as u32),
            created_at: parse_rfc3339(&self.created_at)?,
        })
    }
}

struct ItemRow {
    channel_id: String,
    sequence: i64,
    timestamp_micros: i64,
    content_type: String,
    content_language: Option<String>,
    size_bytes: i64,
    sha256: String,
    replication_state: String,
}

impl ItemRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            channel_id: row.get(0)?,
            sequence: row.get(1)?,
            timestamp_micros: row.get(2)?,
            content_type: row.get(3)?,
            content_language: row.get(4)?,
            size_bytes: row.get(5)?,
            sha256: row.get(6)?,
            replication_state: row.get(7)?,
        })
    }

    fn decode(self) -> Result<ItemRecord> {
        Ok(ItemRecord {
            channel_id: self.channel_id,
            sequence: self.sequence,
            timestamp: micros_to_datetime(self.timestamp_micros),
            content_type: self.content_type,
            content_language: self.content_language,
            size_bytes: self.size_bytes as u64,
            sha256: self.sha256,
            replication: ReplicationState::parse(&self.replication_state)?,
        })
    }
}

struct GroupRow {
    name: String,
    callback_url: String,
    channel_url: String,
    transactional: i64,
    last_completed: Option<i64>,
    created_at: String,
}

impl GroupRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            callback_url: row.get(1)?,
            channel_url: row.get(2)?,
            transactional: row.get(3)?,
            last_completed: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn decode(self) -> Result<GroupRecord> {
        Ok(GroupRecord {
            config: GroupConfig {
                name: self.name,
                callback_url: self.callback_url,
                channel_url: self.channel_url,
                transactional: self.transactional != 0,
            },
            last_completed: self.last_completed,
            created_at: parse_rfc3339(&self.created_at)?,
        })
    }
}

fn item_key_from_row(row: &Row<'_>) -> rusqlite::Result<ItemKey> {
    Ok(ItemKey {
        sequence: row.get(0)?,
        timestamp_micros: row.get(1)?,
    })
}

fn parse_rfc3339(value: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(value)
        .map_err(|error| StrataError::Internal(format!("invalid RFC3339 timestamp: {}", error)))?;
    Ok(parsed.with_timezone(&Utc))
}
