//! Event Decoder: raw chain event → (key descriptor, full value).

use crate::contract::FN_GET_VALUE_BY_KID;
use crate::error::MirrorError;
use crate::gateway::ContractGateway;
use crate::retry::{RetryConfig, RetryPolicy};
use crate::types::{ChainEvent, EventPayload, ValueRecord};

/// Decodes depository events, fetching the referenced value from the ledger.
///
/// Missing-key and transport failures on the fetch are retried with bounded
/// backoff; everything else fails the event immediately.
#[derive(Clone)]
pub struct EventDecoder {
    gateway: ContractGateway,
    retry: RetryPolicy,
}

impl EventDecoder {
    pub fn new(gateway: ContractGateway, retry: RetryConfig) -> Self {
        Self {
            gateway,
            retry: RetryPolicy::new(retry),
        }
    }

    pub async fn decode(&self, event: &ChainEvent) -> Result<(EventPayload, ValueRecord), MirrorError> {
        let payload = EventPayload::parse(&event.payload)?;

        let gateway = &self.gateway;
        let kid = payload.kid.as_str();
        let raw = self
            .retry
            .run(FN_GET_VALUE_BY_KID, move || async move {
                gateway.evaluate(FN_GET_VALUE_BY_KID, &[kid]).await
            })
            .await?;

        let encoded = String::from_utf8_lossy(&raw);
        let value = ValueRecord::from_base64(&encoded)?;
        Ok((payload, value))
    }
}
