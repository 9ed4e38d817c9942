//! Logger-only store: every projected row is written to the log and dropped.

use async_trait::async_trait;
use tracing::info;

use chainmirror_core::{MirrorError, MirrorFilter, MirrorRecord, MirrorStore, Pagination};

/// Store that persists nothing.
///
/// Reads always come back empty, so a listener backed by it starts from
/// genesis on every run.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardStore;

impl DiscardStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MirrorStore for DiscardStore {
    async fn upsert(&self, record: &MirrorRecord) -> Result<(), MirrorError> {
        info!(
            kid = %record.kid,
            index = record.index,
            block = record.block_number,
            operator = %record.operator,
            owner = %record.owner,
            name = %record.name,
            content_id = %record.content_id,
            "depository"
        );
        Ok(())
    }

    async fn max_block_number(&self) -> Result<Option<u64>, MirrorError> {
        Ok(None)
    }

    async fn list(
        &self,
        _filter: &MirrorFilter,
        _page: &Pagination,
    ) -> Result<(Vec<MirrorRecord>, u64), MirrorError> {
        Ok((Vec::new(), 0))
    }
}
