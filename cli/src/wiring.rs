//! Backend selection. Everything downstream works through trait objects.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use chainmirror_core::{LedgerClient, MemoryLedger, MemoryMirrorStore, MirrorStore};
use chainmirror_fabric::{FabricConfig, FabricGatewayClient};
use chainmirror_storage::postgres::{PostgresMirrorStore, PostgresOptions};
use chainmirror_storage::sqlite::SqliteMirrorStore;
use chainmirror_storage::DiscardStore;

use crate::config::{LedgerConfig, LedgerKind, StoreConfig, StoreKind};

pub async fn open_store(cfg: &StoreConfig) -> Result<Arc<dyn MirrorStore>> {
    info!(kind = ?cfg.kind, prefix = %cfg.table_prefix, "opening mirror store");
    let store: Arc<dyn MirrorStore> = match cfg.kind {
        StoreKind::Memory => Arc::new(MemoryMirrorStore::new()),
        StoreKind::Discard => Arc::new(DiscardStore::new()),
        StoreKind::Sqlite => Arc::new(
            SqliteMirrorStore::open(&cfg.dsn, &cfg.table_prefix)
                .await
                .with_context(|| format!("opening sqlite store at {}", cfg.dsn))?,
        ),
        StoreKind::Postgres => {
            let opts = PostgresOptions {
                max_connections: cfg.max_connections,
                ..Default::default()
            };
            Arc::new(
                PostgresMirrorStore::connect_with_options(&cfg.dsn, &cfg.table_prefix, opts)
                    .await
                    .context("connecting to postgres store")?,
            )
        }
    };
    Ok(store)
}

pub fn open_ledger(cfg: &LedgerConfig) -> Result<Arc<dyn LedgerClient>> {
    info!(kind = ?cfg.kind, contract = %cfg.contract, "opening ledger client");
    let client: Arc<dyn LedgerClient> = match cfg.kind {
        LedgerKind::Memory => {
            let mut ledger = MemoryLedger::new(cfg.contract.as_str());
            if !cfg.client_identity.is_empty() {
                ledger = ledger.with_client_identity(cfg.client_identity.as_str());
            }
            Arc::new(ledger)
        }
        LedgerKind::Fabric => {
            let fabric = FabricConfig {
                gateway_url: cfg.gateway_url.clone(),
                events_url: cfg.events_url.clone(),
                channel: cfg.channel.clone(),
                request_timeout_ms: cfg.request_timeout_ms,
            };
            Arc::new(FabricGatewayClient::new(fabric).context("building fabric gateway client")?)
        }
    };
    Ok(client)
}
