//! Service configuration, loaded from YAML and then overridden by flags.
//!
//! ```yaml
//! ledger:
//!   kind: fabric
//!   gateway_url: http://fabric-gateway:8080
//!   channel: mychannel
//!   contract: depository
//! store:
//!   kind: postgres
//!   dsn: postgresql://mirror:secret@db/mirror
//!   table_prefix: hf
//! listener:
//!   events: [PutValue, PutUntrustValue]
//! http:
//!   addr: 0.0.0.0:9999
//! log:
//!   level: info
//!   json: true
//! ```

use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use chainmirror_core::contract::{EVENT_PUT_UNTRUST_VALUE, EVENT_PUT_VALUE};
use chainmirror_core::{ProjectorConfig, RestartConfig, RetryConfig};

use crate::logging::LogConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub ledger: LedgerConfig,
    pub store: StoreConfig,
    pub listener: ListenerConfig,
    pub projector: ProjectorConfig,
    pub http: HttpConfig,
    pub log: LogConfig,
}

impl ServiceConfig {
    /// Read `path`, or fall back to defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_yaml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LedgerKind {
    #[default]
    Fabric,
    /// Process-local ledger; state is lost on exit.
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub kind: LedgerKind,
    pub gateway_url: String,
    /// Derived from `gateway_url` when empty.
    pub events_url: String,
    pub channel: String,
    pub contract: String,
    pub request_timeout_ms: u64,
    /// Operator recorded for untrusted writes on the memory ledger.
    pub client_identity: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            kind: LedgerKind::default(),
            gateway_url: "http://localhost:8080".into(),
            events_url: String::new(),
            channel: "mychannel".into(),
            contract: "depository".into(),
            request_timeout_ms: 30_000,
            client_identity: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Sqlite,
    Postgres,
    Memory,
    Discard,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    /// File path for sqlite, connection URL for postgres.
    pub dsn: String,
    pub table_prefix: String,
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            dsn: "./chainmirror.db".into(),
            table_prefix: "hf".into(),
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Event names routed to the depository handler.
    pub events: Vec<String>,
    /// Retries for the value fetch behind each event.
    pub decode_retry: RetryConfig,
    /// Backoff between listener restarts.
    pub restart: RestartConfig,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            events: vec![EVENT_PUT_VALUE.into(), EVENT_PUT_UNTRUST_VALUE.into()],
            decode_retry: RetryConfig::default(),
            restart: RestartConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub addr: SocketAddr,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 9999)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ServiceConfig::load(None).unwrap();
        assert_eq!(cfg.ledger.kind, LedgerKind::Fabric);
        assert_eq!(cfg.store.kind, StoreKind::Sqlite);
        assert_eq!(cfg.store.table_prefix, "hf");
        assert_eq!(cfg.listener.events, ["PutValue", "PutUntrustValue"]);
        assert_eq!(cfg.http.addr.port(), 9999);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let cfg: ServiceConfig = serde_yaml::from_str(
            "
ledger:
  kind: memory
  contract: notary
store:
  kind: postgres
  dsn: postgresql://localhost/mirror
listener:
  events: [PutValue]
  decode_retry:
    max_retries: 5
projector:
  trust_payload_timestamp: true
log:
  level: debug
  components:
    chainmirror-core: trace
",
        )
        .unwrap();
        assert_eq!(cfg.ledger.kind, LedgerKind::Memory);
        assert_eq!(cfg.ledger.contract, "notary");
        assert_eq!(cfg.ledger.channel, "mychannel");
        assert_eq!(cfg.store.kind, StoreKind::Postgres);
        assert_eq!(cfg.store.table_prefix, "hf");
        assert_eq!(cfg.listener.events, ["PutValue"]);
        assert_eq!(cfg.listener.decode_retry.max_retries, 5);
        assert_eq!(cfg.listener.decode_retry.initial_backoff_ms, 200);
        assert!(cfg.projector.trust_payload_timestamp);
        assert_eq!(cfg.log.components["chainmirror-core"], "trace");
    }

    #[test]
    fn unknown_store_kind_is_an_error() {
        assert!(serde_yaml::from_str::<ServiceConfig>("store:\n  kind: rocksdb\n").is_err());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = ServiceConfig::load(Some(Path::new("/nonexistent/chainmirror.yaml"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/chainmirror.yaml"));
    }
}
