//! Error types for the mirror pipeline and the authenticated write path.

use thiserror::Error;

/// Failures while authenticating a signed [`Message`](crate::auth::Message).
///
/// All variants are terminal for the request that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The envelope could not be decoded (bad base64 or JSON).
    #[error("not a message: {0}")]
    NotAMessage(String),

    /// The envelope decoded but its contents failed to parse or verify.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("algorithm not supported yet")]
    AlgorithmNotSupported,

    #[error("invalid signature")]
    InvalidSignature,
}

/// Normalized contract-call failures returned by the
/// [`ContractGateway`](crate::gateway::ContractGateway).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The contract logic rejected the call. The message is the contract's own.
    #[error("{0}")]
    Chaincode(String),

    /// Connectivity or timeout failure talking to the ledger.
    #[error("transport error: {0}")]
    Transport(String),

    /// The requested key does not exist (or is not yet visible).
    #[error("not found: {0}")]
    NotFound(String),
}

impl GatewayError {
    /// Returns `true` for failures that may succeed when repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::NotFound(_))
    }
}

/// Malformed event or value payloads. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unmarshal event payload: {0}")]
    Payload(String),

    #[error("decode value: {0}")]
    Base64(String),

    #[error("unmarshal value record: {0}")]
    Value(String),
}

/// Errors raised by the event listener, its handlers, and the projector.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("storage error: {0}")]
    Storage(String),

    /// The event subscription could not be opened or broke mid-stream.
    #[error("subscription error: {0}")]
    Subscription(String),

    #[error("handler error in '{handler}': {reason}")]
    Handler { handler: String, reason: String },

    #[error("{0}")]
    Other(String),
}

impl MirrorError {
    /// Returns `true` if the listener must stop and hand control back to
    /// process-level supervision. Everything else is contained to one event.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Subscription(_))
    }
}
