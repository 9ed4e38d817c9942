//! chainmirror-fabric: `LedgerClient` over a Fabric gateway service.
//!
//! - Transactions: `POST {gateway}/channels/{channel}/contracts/{contract}/submit|evaluate`
//!   with `{"function": .., "args": [..]}`; the reply is `{"result": <base64>}`.
//! - Events: WebSocket `{events}/channels/{channel}/contracts/{contract}/events?startBlock=N`
//!   delivering one JSON chain event per text frame.

pub mod client;
pub mod config;
pub mod events;

pub use client::FabricGatewayClient;
pub use config::FabricConfig;
