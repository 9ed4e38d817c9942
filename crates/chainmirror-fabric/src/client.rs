//! REST transactions and event subscriptions against a Fabric gateway service.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use chainmirror_core::{ChainEventStream, FaultCode, LedgerClient, LedgerFault};

use crate::config::FabricConfig;
use crate::events;

#[derive(Serialize)]
struct TransactionRequest<'a> {
    function: &'a str,
    args: &'a [String],
}

#[derive(Deserialize)]
struct TransactionResponse {
    /// Base64 of the contract's return bytes.
    #[serde(default)]
    result: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// `LedgerClient` backed by `reqwest` (transactions) and `tokio-tungstenite`
/// (events).
pub struct FabricGatewayClient {
    config: FabricConfig,
    http: reqwest::Client,
}

impl FabricGatewayClient {
    pub fn new(config: FabricConfig) -> Result<Self, LedgerFault> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| LedgerFault::new(FaultCode::Internal, format!("http client: {e}")))?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &FabricConfig {
        &self.config
    }

    async fn transact(
        &self,
        op: &str,
        contract: &str,
        function: &str,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerFault> {
        let url = self.config.transaction_url(contract, op)?;
        let resp = self
            .http
            .post(url)
            .json(&TransactionRequest { function, args })
            .send()
            .await
            .map_err(fault_from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let fault = fault_from_status(status, &body);
            tracing::debug!(op, function, status = status.as_u16(), error = %fault, "gateway rejected call");
            return Err(fault);
        }

        let body: TransactionResponse = resp.json().await.map_err(|e| {
            LedgerFault::new(FaultCode::Internal, format!("malformed gateway response: {e}"))
        })?;
        STANDARD.decode(body.result.as_bytes()).map_err(|e| {
            LedgerFault::new(FaultCode::Internal, format!("malformed gateway result: {e}"))
        })
    }
}

/// Map a non-success HTTP reply onto a ledger fault, keeping the gateway's message.
pub fn fault_from_status(status: StatusCode, body: &str) -> LedgerFault {
    let message = serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| {
            if body.trim().is_empty() {
                format!("HTTP {}", status.as_u16())
            } else {
                body.trim().to_string()
            }
        });
    let code = match status {
        StatusCode::NOT_FOUND => FaultCode::NotFound,
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => FaultCode::DeadlineExceeded,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE => FaultCode::Unavailable,
        s if s.is_server_error() => FaultCode::Internal,
        _ => FaultCode::Aborted,
    };
    LedgerFault::new(code, message)
}

pub fn fault_from_reqwest(e: reqwest::Error) -> LedgerFault {
    let code = if e.is_timeout() {
        FaultCode::DeadlineExceeded
    } else if e.is_connect() || e.is_request() {
        FaultCode::Unavailable
    } else {
        FaultCode::Unknown
    };
    LedgerFault::new(code, e.to_string())
}

#[async_trait]
impl LedgerClient for FabricGatewayClient {
    async fn submit(
        &self,
        contract: &str,
        function: &str,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerFault> {
        self.transact("submit", contract, function, args).await
    }

    async fn evaluate(
        &self,
        contract: &str,
        function: &str,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerFault> {
        self.transact("evaluate", contract, function, args).await
    }

    async fn subscribe(
        &self,
        contract: &str,
        start_block: u64,
    ) -> Result<ChainEventStream, LedgerFault> {
        let url = self.config.events_url(contract, start_block)?;
        events::connect(url).await
    }
}
