//! Ledger Mirror Projector: the only writer of mirror rows.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::MirrorError;
use crate::store::{MirrorFilter, MirrorStore, Pagination};
use crate::types::{ChainEvent, EventPayload, MirrorRecord, ValueRecord};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectorConfig {
    /// Use the value's own `trustedTimestamp` when it is a positive integer,
    /// instead of the server clock.
    pub trust_payload_timestamp: bool,
}

/// Builds mirror rows from decoded events and serves the read paths.
#[derive(Clone)]
pub struct Projector {
    store: Arc<dyn MirrorStore>,
    config: ProjectorConfig,
}

impl Projector {
    pub fn new(store: Arc<dyn MirrorStore>, config: ProjectorConfig) -> Self {
        Self { store, config }
    }

    /// Upsert the row for `payload.kid`.
    ///
    /// Provenance (`index`, `kid`, `operator`, `owner`, `block_number`) comes
    /// from the event; content fields come from the value. A row that already
    /// exists keeps its first-assigned trusted timestamp, so projecting the
    /// same event again converges to an identical row.
    pub async fn project(
        &self,
        event: &ChainEvent,
        payload: &EventPayload,
        value: &ValueRecord,
    ) -> Result<MirrorRecord, MirrorError> {
        let existing = self.store.get(&MirrorFilter::by_kid(&payload.kid)).await?;
        let trusted_timestamp = match existing {
            Some(row) => row.trusted_timestamp,
            None => self.assign_timestamp(value),
        };

        let record = MirrorRecord {
            kid: payload.kid.clone(),
            index: payload.index,
            block_number: event.block_number,
            operator: payload.operator.clone(),
            owner: payload.owner.clone(),
            name: value.name.clone(),
            content_name: value.content_name.clone(),
            content_id: value.content_id.clone(),
            content_type: value.content_type.clone(),
            trusted_timestamp,
            description: value.description.clone(),
        };
        self.store.upsert(&record).await?;

        tracing::debug!(
            kid = %record.kid,
            block = record.block_number,
            index = record.index,
            "projected"
        );
        Ok(record)
    }

    fn assign_timestamp(&self, value: &ValueRecord) -> i64 {
        if self.config.trust_payload_timestamp {
            if let Ok(ts) = value.trusted_timestamp.trim().parse::<i64>() {
                if ts > 0 {
                    return ts;
                }
            }
        }
        chrono::Utc::now().timestamp()
    }

    /// Highest persisted block number, `None` before anything was projected.
    pub async fn checkpoint(&self) -> Result<Option<u64>, MirrorError> {
        self.store.max_block_number().await
    }

    pub async fn get(&self, filter: &MirrorFilter) -> Result<Option<MirrorRecord>, MirrorError> {
        self.store.get(filter).await
    }

    /// Matching rows (newest trusted timestamp first) and the total match count.
    pub async fn list(
        &self,
        filter: &MirrorFilter,
        page: &Pagination,
    ) -> Result<(Vec<MirrorRecord>, u64), MirrorError> {
        self.store.list(filter, page).await
    }
}
