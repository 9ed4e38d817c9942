//! Typed wrapper over the depository contract's functions.

use crate::auth::Message;
use crate::error::{GatewayError, MirrorError};
use crate::gateway::ContractGateway;
use crate::types::ValueRecord;

pub const FN_INITIALIZE: &str = "Initialize";
pub const FN_PUT_VALUE: &str = "PutValue";
pub const FN_PUT_UNTRUST_VALUE: &str = "PutUntrustValue";
pub const FN_GET_VALUE_BY_KID: &str = "GetValueByKID";
pub const FN_GET_VALUE_BY_INDEX: &str = "GetValueByIndex";
pub const FN_TOTAL: &str = "Total";
pub const FN_CURRENT: &str = "Current";
pub const FN_GET_METADATA: &str = "org.hyperledger.fabric:GetMetadata";

/// Event names emitted by the two write entry points.
pub const EVENT_PUT_VALUE: &str = FN_PUT_VALUE;
pub const EVENT_PUT_UNTRUST_VALUE: &str = FN_PUT_UNTRUST_VALUE;

#[derive(Clone)]
pub struct DepositoryContract {
    gateway: ContractGateway,
}

impl DepositoryContract {
    pub fn new(gateway: ContractGateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &ContractGateway {
        &self.gateway
    }

    pub async fn initialize(&self) -> Result<(), GatewayError> {
        self.gateway.submit::<&str>(FN_INITIALIZE, &[]).await.map(|_| ())
    }

    /// The nonce `account` must sign its next trusted write with.
    pub async fn current_nonce(&self, account: &str) -> Result<u64, GatewayError> {
        let raw = self.gateway.evaluate(FN_CURRENT, &[account]).await?;
        parse_u64(FN_CURRENT, &raw)
    }

    pub async fn total(&self) -> Result<u64, GatewayError> {
        let raw = self.gateway.evaluate::<&str>(FN_TOTAL, &[]).await?;
        parse_u64(FN_TOTAL, &raw)
    }

    /// Trusted write. `value` is the base64 value the message was signed over.
    /// Returns the assigned kid.
    pub async fn put_value(&self, msg: &Message, value: &str) -> Result<String, MirrorError> {
        let envelope = msg.marshal()?;
        let kid = self
            .gateway
            .submit(FN_PUT_VALUE, &[envelope.as_str(), value])
            .await?;
        Ok(String::from_utf8_lossy(&kid).into_owned())
    }

    /// Untrusted write: recorded under the submitting client's identity.
    pub async fn put_untrust_value(&self, value: &str) -> Result<String, GatewayError> {
        let kid = self.gateway.submit(FN_PUT_UNTRUST_VALUE, &[value]).await?;
        Ok(String::from_utf8_lossy(&kid).into_owned())
    }

    /// Raw base64 value stored under `kid`.
    pub async fn get_value_by_kid(&self, kid: &str) -> Result<String, GatewayError> {
        let raw = self.gateway.evaluate(FN_GET_VALUE_BY_KID, &[kid]).await?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    /// Raw base64 value at 1-based `index`.
    pub async fn get_value_by_index(&self, index: u64) -> Result<String, GatewayError> {
        let index = index.to_string();
        let raw = self
            .gateway
            .evaluate(FN_GET_VALUE_BY_INDEX, &[index.as_str()])
            .await?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    /// Contract metadata as published by the ledger runtime.
    pub async fn metadata(&self) -> Result<serde_json::Value, GatewayError> {
        let raw = self.gateway.evaluate::<&str>(FN_GET_METADATA, &[]).await?;
        serde_json::from_slice(&raw)
            .map_err(|e| GatewayError::Chaincode(format!("{FN_GET_METADATA}: {e}")))
    }

    /// Fetch and decode the value stored under `kid`.
    pub async fn value_record(&self, kid: &str) -> Result<ValueRecord, MirrorError> {
        let raw = self.get_value_by_kid(kid).await?;
        Ok(ValueRecord::from_base64(&raw)?)
    }
}

fn parse_u64(function: &str, raw: &[u8]) -> Result<u64, GatewayError> {
    let text = String::from_utf8_lossy(raw);
    text.trim()
        .parse()
        .map_err(|_| GatewayError::Chaincode(format!("{function}: unexpected result {text:?}")))
}
