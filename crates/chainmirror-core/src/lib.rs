//! chainmirror-core: event-sourced mirror of a permissioned ledger contract.
//!
//! # Architecture
//!
//! ```text
//! EventListener ── subscribe(checkpoint + 1) ──► LedgerClient
//!      │
//!      └── HandlerRegistry ("PutValue", "PutUntrustValue", ...)
//!               └── DepositoryEventHandler
//!                      ├── EventDecoder  (payload → GetValueByKID, bounded retry)
//!                      └── Projector     (upsert by kid) ──► MirrorStore
//!
//! write path:  Message (auth) ──► DepositoryContract ──► ContractGateway ──► LedgerClient
//! ```
//!
//! The write and the mirror update are decoupled: a write is durable once
//! `submit` returns, and shows up in the mirror after the ledger re-emits it
//! as an event.

pub mod auth;
pub mod contract;
pub mod decoder;
pub mod error;
pub mod gateway;
pub mod handler;
pub mod ledger;
pub mod listener;
pub mod memory_ledger;
pub mod projector;
pub mod retry;
pub mod store;
pub mod types;

pub use auth::Message;
pub use contract::DepositoryContract;
pub use decoder::EventDecoder;
pub use error::{AuthError, DecodeError, GatewayError, MirrorError};
pub use gateway::ContractGateway;
pub use handler::{DepositoryEventHandler, EventHandler, HandlerRegistry};
pub use ledger::{ChainEventStream, FaultCode, LedgerClient, LedgerFault};
pub use listener::{EventListener, ListenerMetrics, ListenerState, RestartConfig};
pub use memory_ledger::MemoryLedger;
pub use projector::{Projector, ProjectorConfig};
pub use retry::{RetryConfig, RetryPolicy};
pub use store::{Condition, MemoryMirrorStore, MirrorFilter, MirrorStore, Pagination};
pub use types::{ChainEvent, EventPayload, MirrorRecord, ValueRecord};
