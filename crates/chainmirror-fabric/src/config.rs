//! Gateway endpoint configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use chainmirror_core::{FaultCode, LedgerFault};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FabricConfig {
    /// Base URL of the gateway's REST API, e.g. `"http://localhost:8080/api"`.
    pub gateway_url: String,
    /// Base URL for event subscriptions. Derived from `gateway_url` when empty
    /// (`http` → `ws`, `https` → `wss`).
    pub events_url: String,
    pub channel: String,
    /// Per-request timeout in milliseconds for submit/evaluate.
    pub request_timeout_ms: u64,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            gateway_url: "http://localhost:8080".into(),
            events_url: String::new(),
            channel: "mychannel".into(),
            request_timeout_ms: 30_000,
        }
    }
}

impl FabricConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// `{gateway}/channels/{channel}/contracts/{contract}/{op}`.
    pub fn transaction_url(&self, contract: &str, op: &str) -> Result<Url, LedgerFault> {
        let mut url = parse(&self.gateway_url)?;
        push_segments(&mut url, &["channels", &self.channel, "contracts", contract, op])?;
        Ok(url)
    }

    /// `{events}/channels/{channel}/contracts/{contract}/events?startBlock={start}`.
    pub fn events_url(&self, contract: &str, start_block: u64) -> Result<Url, LedgerFault> {
        let mut url = if self.events_url.is_empty() {
            let mut url = parse(&self.gateway_url)?;
            let scheme = match url.scheme() {
                "https" => "wss",
                _ => "ws",
            };
            url.set_scheme(scheme)
                .map_err(|_| config_fault(format!("cannot derive events url from {url}")))?;
            url
        } else {
            parse(&self.events_url)?
        };
        push_segments(&mut url, &["channels", &self.channel, "contracts", contract, "events"])?;
        url.query_pairs_mut()
            .append_pair("startBlock", &start_block.to_string());
        Ok(url)
    }
}

fn parse(raw: &str) -> Result<Url, LedgerFault> {
    Url::parse(raw).map_err(|e| config_fault(format!("invalid url {raw:?}: {e}")))
}

fn push_segments(url: &mut Url, segments: &[&str]) -> Result<(), LedgerFault> {
    let display = url.to_string();
    let mut path = url
        .path_segments_mut()
        .map_err(|_| config_fault(format!("url {display} cannot have a path")))?;
    path.pop_if_empty().extend(segments);
    Ok(())
}

fn config_fault(message: String) -> LedgerFault {
    LedgerFault::new(FaultCode::InvalidArgument, message)
}
