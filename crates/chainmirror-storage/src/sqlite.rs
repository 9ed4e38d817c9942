//! SQLite mirror store.
//!
//! Keeps one row per `kid` in `{prefix}_depositories`. File-backed databases
//! run in WAL mode.
//!
//! # Usage
//! ```rust,no_run
//! use chainmirror_storage::sqlite::SqliteMirrorStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteMirrorStore::open("./mirror.db", "hf").await?;
//! let memory = SqliteMirrorStore::in_memory("hf").await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::debug;

use chainmirror_core::store::{like_pattern, ORDER_BY};
use chainmirror_core::{Condition, MirrorError, MirrorFilter, MirrorRecord, MirrorStore, Pagination};

use crate::{table_name, COLUMNS};

fn storage_err(e: sqlx::Error) -> MirrorError {
    MirrorError::Storage(e.to_string())
}

pub struct SqliteMirrorStore {
    pool: SqlitePool,
    table: String,
}

impl SqliteMirrorStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./mirror.db"`) or a full
    /// SQLite URL (`"sqlite:./mirror.db?mode=rwc"`).
    pub async fn open(path: &str, table_prefix: &str) -> Result<Self, MirrorError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };
        let pool = SqlitePool::connect(&url).await.map_err(storage_err)?;
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&pool)
            .await
            .map_err(storage_err)?;
        Self::with_pool(pool, table_prefix).await
    }

    /// Private in-memory database. A single connection keeps every query on
    /// the same database.
    pub async fn in_memory(table_prefix: &str) -> Result<Self, MirrorError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage_err)?;
        Self::with_pool(pool, table_prefix).await
    }

    async fn with_pool(pool: SqlitePool, table_prefix: &str) -> Result<Self, MirrorError> {
        let store = Self {
            pool,
            table: table_name(table_prefix)?,
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), MirrorError> {
        let table = &self.table;
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                kid               TEXT    NOT NULL PRIMARY KEY,
                ledger_index      INTEGER NOT NULL,
                block_number      INTEGER NOT NULL,
                operator          TEXT    NOT NULL,
                owner             TEXT    NOT NULL,
                name              TEXT    NOT NULL,
                content_name      TEXT    NOT NULL,
                content_id        TEXT    NOT NULL,
                content_type      TEXT    NOT NULL,
                trusted_timestamp INTEGER NOT NULL,
                description       TEXT    NOT NULL
            );"
        ))
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_block ON {table} (block_number);"
        ))
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_ts ON {table} (trusted_timestamp);"
        ))
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        Ok(())
    }
}

fn push_where(qb: &mut QueryBuilder<'_, Sqlite>, conditions: &[Condition]) {
    for (i, c) in conditions.iter().enumerate() {
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        match c {
            Condition::KidEquals(kid) => {
                qb.push("kid = ").push_bind(kid.clone());
            }
            Condition::NameContains(s) | Condition::ContentNameContains(s) => {
                qb.push(c.column())
                    .push(" LIKE ")
                    .push_bind(like_pattern(s))
                    .push(" ESCAPE '\\'");
            }
            Condition::TimestampFrom(t) => {
                qb.push("trusted_timestamp >= ").push_bind(*t);
            }
            Condition::TimestampUntil(t) => {
                qb.push("trusted_timestamp <= ").push_bind(*t);
            }
        }
    }
}

fn record_from_row(row: &SqliteRow) -> MirrorRecord {
    MirrorRecord {
        kid: row.get("kid"),
        index: row.get::<i64, _>("ledger_index") as u64,
        block_number: row.get::<i64, _>("block_number") as u64,
        operator: row.get("operator"),
        owner: row.get("owner"),
        name: row.get("name"),
        content_name: row.get("content_name"),
        content_id: row.get("content_id"),
        content_type: row.get("content_type"),
        trusted_timestamp: row.get("trusted_timestamp"),
        description: row.get("description"),
    }
}

#[async_trait]
impl MirrorStore for SqliteMirrorStore {
    async fn upsert(&self, r: &MirrorRecord) -> Result<(), MirrorError> {
        sqlx::query(&format!(
            "INSERT OR REPLACE INTO {} ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.table
        ))
        .bind(&r.kid)
        .bind(r.index as i64)
        .bind(r.block_number as i64)
        .bind(&r.operator)
        .bind(&r.owner)
        .bind(&r.name)
        .bind(&r.content_name)
        .bind(&r.content_id)
        .bind(&r.content_type)
        .bind(r.trusted_timestamp)
        .bind(&r.description)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        debug!(kid = %r.kid, block = r.block_number, "row stored");
        Ok(())
    }

    async fn max_block_number(&self) -> Result<Option<u64>, MirrorError> {
        let row = sqlx::query(&format!("SELECT MAX(block_number) AS cp FROM {}", self.table))
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        let cp: Option<i64> = row.get("cp");
        Ok(cp.map(|b| b as u64))
    }

    async fn list(
        &self,
        filter: &MirrorFilter,
        page: &Pagination,
    ) -> Result<(Vec<MirrorRecord>, u64), MirrorError> {
        let conditions = filter.conditions();

        let mut count = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) AS cnt FROM {}", self.table));
        push_where(&mut count, &conditions);
        let total: i64 = count
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?
            .get("cnt");

        let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS} FROM {}", self.table));
        push_where(&mut select, &conditions);
        select.push(format!(" ORDER BY {ORDER_BY}"));
        // SQLite needs a LIMIT before OFFSET; -1 means unbounded.
        let limit = if page.size == 0 { -1 } else { page.size as i64 };
        select
            .push(" LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(page.from as i64);

        let rows = select
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok((rows.iter().map(record_from_row).collect(), total as u64))
    }
}
