//! Shared types for the mirror pipeline.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

// ─── ChainEvent ───────────────────────────────────────────────────────────────

/// A chaincode event as delivered by the ledger's event stream.
///
/// Events arrive in ledger commit order and must be processed in that order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainEvent {
    /// Event name set by the contract (e.g. `"PutValue"`).
    pub event_name: String,
    /// Block in which the emitting transaction was committed.
    pub block_number: u64,
    /// Raw event payload, base64 on the wire.
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
}

impl ChainEvent {
    pub fn new(event_name: impl Into<String>, block_number: u64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            event_name: event_name.into(),
            block_number,
            payload: payload.into(),
        }
    }
}

// ─── EventPayload ─────────────────────────────────────────────────────────────

/// The key descriptor carried in a depository event's payload.
///
/// `operator` and `owner` are consensus-ordered and therefore trusted over
/// anything found in the value itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    #[serde(default, skip_serializing_if = "is_zero")]
    pub index: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kid: String,
    #[serde(default)]
    pub operator: String,
    #[serde(default)]
    pub owner: String,
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

impl EventPayload {
    /// Parse an event payload. A payload without a `kid` is rejected since
    /// there would be nothing to fetch.
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        let payload: Self =
            serde_json::from_slice(bytes).map_err(|e| DecodeError::Payload(e.to_string()))?;
        if payload.kid.is_empty() {
            return Err(DecodeError::Payload("missing kid".into()));
        }
        Ok(payload)
    }
}

// ─── ValueRecord ──────────────────────────────────────────────────────────────

/// The full application value stored on-ledger under a `kid`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueRecord {
    pub name: String,
    #[serde(rename = "contentName")]
    pub content_name: String,
    #[serde(rename = "contentType")]
    pub content_type: String,
    /// Hash of the deposited content.
    #[serde(rename = "contentID")]
    pub content_id: String,
    /// Size of the deposited content in bytes.
    #[serde(rename = "contentSize")]
    pub content_size: i64,
    #[serde(rename = "trustedTimestamp")]
    pub trusted_timestamp: String,
    pub platform: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl ValueRecord {
    /// Decode the ledger representation: base64 (standard alphabet) of JSON.
    pub fn from_base64(encoded: &str) -> Result<Self, DecodeError> {
        let raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| DecodeError::Base64(e.to_string()))?;
        serde_json::from_slice(&raw).map_err(|e| DecodeError::Value(e.to_string()))
    }

    /// Encode into the ledger representation.
    pub fn to_base64(&self) -> String {
        // Serializing a struct of plain strings and integers cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        STANDARD.encode(json)
    }
}

// ─── MirrorRecord ─────────────────────────────────────────────────────────────

/// One row of the relational mirror, keyed by `kid`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorRecord {
    pub kid: String,
    pub index: u64,
    pub block_number: u64,
    pub operator: String,
    pub owner: String,
    pub name: String,
    pub content_name: String,
    #[serde(rename = "contentID")]
    pub content_id: String,
    pub content_type: String,
    /// Unix seconds.
    pub trusted_timestamp: i64,
    pub description: String,
}

// ─── serde helper ─────────────────────────────────────────────────────────────

/// Serialize `Vec<u8>` as a standard base64 string.
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
