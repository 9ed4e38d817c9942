//! The ledger capabilities this crate depends on: ordered writes, local
//! reads, and an event subscription.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

use crate::types::ChainEvent;

/// Status code attached to a raw ledger failure (modelled on gRPC status codes,
/// which is what ledger gateways report).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCode {
    /// The contract rejected the transaction during endorsement or commit.
    Aborted,
    InvalidArgument,
    FailedPrecondition,
    NotFound,
    Unavailable,
    DeadlineExceeded,
    Cancelled,
    Internal,
    Unknown,
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Aborted => "aborted",
            Self::InvalidArgument => "invalid-argument",
            Self::FailedPrecondition => "failed-precondition",
            Self::NotFound => "not-found",
            Self::Unavailable => "unavailable",
            Self::DeadlineExceeded => "deadline-exceeded",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// An un-normalized failure reported by a [`LedgerClient`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct LedgerFault {
    pub code: FaultCode,
    pub message: String,
}

impl LedgerFault {
    pub fn new(code: FaultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Chaincode events in commit order.
pub type ChainEventStream = Pin<Box<dyn Stream<Item = Result<ChainEvent, LedgerFault>> + Send>>;

/// Client for one ledger channel.
///
/// Implementations must be `Send + Sync` so a single client can be shared by
/// the listener task and request handlers as `Arc<dyn LedgerClient>`.
#[async_trait]
pub trait LedgerClient: Send + Sync + 'static {
    /// Ordered, consensus-committed invocation. Resolves once committed.
    async fn submit(
        &self,
        contract: &str,
        function: &str,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerFault>;

    /// Local read against committed state.
    async fn evaluate(
        &self,
        contract: &str,
        function: &str,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerFault>;

    /// Stream events emitted by `contract`, starting at `start_block` (inclusive).
    async fn subscribe(
        &self,
        contract: &str,
        start_block: u64,
    ) -> Result<ChainEventStream, LedgerFault>;
}
