//! The relational mirror's capability surface (`MirrorStore`), the query
//! model shared by every backend, and an in-memory implementation.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MirrorError;
use crate::types::MirrorRecord;

// ─── Query model ──────────────────────────────────────────────────────────────

/// Conjunctive filter over mirror rows. Empty fields impose no constraint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MirrorFilter {
    pub kid: Option<String>,
    /// Substring of `name`.
    pub name: Option<String>,
    /// Substring of `content_name`.
    pub content_name: Option<String>,
    /// Inclusive lower bound on `trusted_timestamp` (Unix seconds).
    pub start_time: Option<i64>,
    /// Inclusive upper bound on `trusted_timestamp` (Unix seconds).
    pub end_time: Option<i64>,
}

impl MirrorFilter {
    pub fn by_kid(kid: impl Into<String>) -> Self {
        Self {
            kid: Some(kid.into()),
            ..Default::default()
        }
    }

    /// The predicates this filter stands for, in a fixed order.
    pub fn conditions(&self) -> Vec<Condition> {
        let mut out = Vec::new();
        if let Some(kid) = non_empty(&self.kid) {
            out.push(Condition::KidEquals(kid.to_string()));
        }
        if let Some(name) = non_empty(&self.name) {
            out.push(Condition::NameContains(name.to_string()));
        }
        if let Some(cn) = non_empty(&self.content_name) {
            out.push(Condition::ContentNameContains(cn.to_string()));
        }
        if let Some(t) = self.start_time {
            out.push(Condition::TimestampFrom(t));
        }
        if let Some(t) = self.end_time {
            out.push(Condition::TimestampUntil(t));
        }
        out
    }

    pub fn matches(&self, record: &MirrorRecord) -> bool {
        self.conditions().iter().all(|c| c.matches(record))
    }
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().filter(|s| !s.is_empty())
}

/// A single predicate over a mirror row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    KidEquals(String),
    NameContains(String),
    ContentNameContains(String),
    TimestampFrom(i64),
    TimestampUntil(i64),
}

impl Condition {
    /// Column the predicate applies to.
    pub fn column(&self) -> &'static str {
        match self {
            Self::KidEquals(_) => "kid",
            Self::NameContains(_) => "name",
            Self::ContentNameContains(_) => "content_name",
            Self::TimestampFrom(_) | Self::TimestampUntil(_) => "trusted_timestamp",
        }
    }

    pub fn matches(&self, r: &MirrorRecord) -> bool {
        match self {
            Self::KidEquals(kid) => r.kid == *kid,
            Self::NameContains(s) => r.name.contains(s.as_str()),
            Self::ContentNameContains(s) => r.content_name.contains(s.as_str()),
            Self::TimestampFrom(t) => r.trusted_timestamp >= *t,
            Self::TimestampUntil(t) => r.trusted_timestamp <= *t,
        }
    }
}

/// `LIKE` pattern matching `needle` anywhere, with `\` as the escape character.
pub fn like_pattern(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len() + 2);
    out.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}

/// Offset/limit window over the ordered result set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub from: u64,
    /// Maximum rows returned; `0` means no limit.
    pub size: u64,
}

impl Pagination {
    pub fn new(from: u64, size: u64) -> Self {
        Self { from, size }
    }

    pub fn first() -> Self {
        Self { from: 0, size: 1 }
    }
}

/// Result ordering shared by all backends: newest trusted timestamp first,
/// ties broken by block number (descending) and then kid.
pub const ORDER_BY: &str = "trusted_timestamp DESC, block_number DESC, kid ASC";

pub(crate) fn sort_records(rows: &mut [MirrorRecord]) {
    rows.sort_by(|a, b| {
        b.trusted_timestamp
            .cmp(&a.trusted_timestamp)
            .then(b.block_number.cmp(&a.block_number))
            .then(a.kid.cmp(&b.kid))
    });
}

// ─── MirrorStore ──────────────────────────────────────────────────────────────

/// Durable storage for mirror rows. Implementations are selected once at
/// startup and shared as `Arc<dyn MirrorStore>`.
#[async_trait]
pub trait MirrorStore: Send + Sync {
    /// Insert the record, or replace the existing row with the same `kid`.
    async fn upsert(&self, record: &MirrorRecord) -> Result<(), MirrorError>;

    /// Highest `block_number` over all rows, `None` when empty.
    async fn max_block_number(&self) -> Result<Option<u64>, MirrorError>;

    /// Matching rows in [`ORDER_BY`] order within `page`, plus the total
    /// number of matching rows.
    async fn list(
        &self,
        filter: &MirrorFilter,
        page: &Pagination,
    ) -> Result<(Vec<MirrorRecord>, u64), MirrorError>;

    /// First matching row.
    async fn get(&self, filter: &MirrorFilter) -> Result<Option<MirrorRecord>, MirrorError> {
        let (mut rows, _) = self.list(filter, &Pagination::first()).await?;
        Ok(rows.pop())
    }
}

// ─── MemoryMirrorStore ────────────────────────────────────────────────────────

/// Mirror rows held in RAM. All data is lost when the process exits.
#[derive(Default)]
pub struct MemoryMirrorStore {
    rows: Mutex<HashMap<String, MirrorRecord>>,
}

impl MemoryMirrorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MirrorStore for MemoryMirrorStore {
    async fn upsert(&self, record: &MirrorRecord) -> Result<(), MirrorError> {
        self.rows
            .lock()
            .unwrap()
            .insert(record.kid.clone(), record.clone());
        Ok(())
    }

    async fn max_block_number(&self) -> Result<Option<u64>, MirrorError> {
        Ok(self.rows.lock().unwrap().values().map(|r| r.block_number).max())
    }

    async fn list(
        &self,
        filter: &MirrorFilter,
        page: &Pagination,
    ) -> Result<(Vec<MirrorRecord>, u64), MirrorError> {
        let conditions = filter.conditions();
        let mut rows: Vec<_> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|r| conditions.iter().all(|c| c.matches(r)))
            .cloned()
            .collect();
        sort_records(&mut rows);

        let total = rows.len() as u64;
        let take = if page.size == 0 { usize::MAX } else { page.size as usize };
        let rows = rows
            .into_iter()
            .skip(page.from as usize)
            .take(take)
            .collect();
        Ok((rows, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(kid: &str, block: u64, ts: i64, name: &str) -> MirrorRecord {
        MirrorRecord {
            kid: kid.into(),
            block_number: block,
            trusted_timestamp: ts,
            name: name.into(),
            content_name: format!("{name}.pdf"),
            ..Default::default()
        }
    }

    async fn seeded() -> MemoryMirrorStore {
        let store = MemoryMirrorStore::new();
        store.upsert(&rec("a", 1, 100, "alpha report")).await.unwrap();
        store.upsert(&rec("b", 2, 300, "beta report")).await.unwrap();
        store.upsert(&rec("c", 3, 200, "gamma")).await.unwrap();
        store
    }

    #[test]
    fn empty_fields_produce_no_conditions() {
        let f = MirrorFilter {
            kid: Some(String::new()),
            ..Default::default()
        };
        assert!(f.conditions().is_empty());
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("a_b%c\\"), "%a\\_b\\%c\\\\%");
        assert_eq!(like_pattern("plain"), "%plain%");
    }

    #[tokio::test]
    async fn list_orders_by_timestamp_desc() {
        let store = seeded().await;
        let (rows, total) = store
            .list(&MirrorFilter::default(), &Pagination::default())
            .await
            .unwrap();
        assert_eq!(total, 3);
        let kids: Vec<_> = rows.iter().map(|r| r.kid.as_str()).collect();
        assert_eq!(kids, ["b", "c", "a"]);
    }

    #[tokio::test]
    async fn filters_combine_with_and() {
        let store = seeded().await;
        let f = MirrorFilter {
            name: Some("report".into()),
            start_time: Some(150),
            ..Default::default()
        };
        let (rows, total) = store.list(&f, &Pagination::default()).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].kid, "b");
    }

    #[tokio::test]
    async fn pagination_windows_but_counts_everything() {
        let store = seeded().await;
        let (rows, total) = store
            .list(&MirrorFilter::default(), &Pagination::new(1, 1))
            .await
            .unwrap();
        assert_eq!(total, 3);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kid, "c");
    }

    #[tokio::test]
    async fn upsert_replaces_and_max_block_tracks() {
        let store = seeded().await;
        assert_eq!(store.max_block_number().await.unwrap(), Some(3));
        store.upsert(&rec("a", 9, 100, "alpha v2")).await.unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(store.max_block_number().await.unwrap(), Some(9));
        let a = store.get(&MirrorFilter::by_kid("a")).await.unwrap().unwrap();
        assert_eq!(a.name, "alpha v2");
        assert!(store.get(&MirrorFilter::by_kid("zz")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_store_has_no_checkpoint() {
        assert_eq!(MemoryMirrorStore::new().max_block_number().await.unwrap(), None);
    }
}
