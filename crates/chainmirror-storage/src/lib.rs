//! chainmirror-storage: `MirrorStore` backends.
//!
//! Backends:
//! - [`discard`]: logs each projected row and keeps nothing
//! - `sqlite`: SQLite via `sqlx` (embedded, single-file persistence)
//! - `postgres`: PostgreSQL via `sqlx`
//!
//! The in-memory backend lives in `chainmirror-core` as `MemoryMirrorStore`.
//!
//! Every SQL backend keeps its rows in one table, `{prefix}_depositories`,
//! where the prefix is passed in by the caller.

pub mod discard;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use discard::DiscardStore;

use chainmirror_core::MirrorError;

/// Columns of the mirror table, in the order every backend selects them.
pub const COLUMNS: &str = "kid, ledger_index, block_number, operator, owner, name, \
                           content_name, content_id, content_type, trusted_timestamp, description";

/// Name of the mirror table for `prefix`.
///
/// The prefix is spliced into SQL, so only ASCII letters, digits and `_` are accepted.
pub fn table_name(prefix: &str) -> Result<String, MirrorError> {
    if prefix.is_empty()
        || !prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(MirrorError::Storage(format!(
            "invalid table prefix {prefix:?}: use letters, digits and '_'"
        )));
    }
    Ok(format!("{prefix}_depositories"))
}
