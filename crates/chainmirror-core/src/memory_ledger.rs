//! In-memory ledger implementing the depository contract.
//!
//! Every committed write gets its own block and emits one chaincode event.
//! Subscriptions replay the backlog from the requested block and then follow
//! live commits. Useful for tests and the `memory` dev mode.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;

use crate::auth::Message;
use crate::contract::{
    FN_CURRENT, FN_GET_METADATA, FN_GET_VALUE_BY_INDEX, FN_GET_VALUE_BY_KID, FN_INITIALIZE,
    FN_PUT_UNTRUST_VALUE, FN_PUT_VALUE, FN_TOTAL,
};
use crate::ledger::{ChainEventStream, FaultCode, LedgerClient, LedgerFault};
use crate::types::{ChainEvent, EventPayload, ValueRecord};

const LIVE_CAPACITY: usize = 1024;

#[derive(Default)]
struct LedgerState {
    /// kid → base64 value.
    values: HashMap<String, String>,
    /// Position `i` holds the kid at index `i + 1`.
    kids: Vec<String>,
    /// account → next expected nonce.
    nonces: HashMap<String, u64>,
    events: Vec<ChainEvent>,
    height: u64,
    /// Upcoming `GetValueByKID` reads that should miss.
    hidden_reads: u32,
}

/// A single-contract ledger held in memory.
pub struct MemoryLedger {
    contract: String,
    /// Identity recorded as operator/owner for untrusted writes.
    client_identity: String,
    state: Mutex<LedgerState>,
    live: Mutex<broadcast::Sender<ChainEvent>>,
}

impl MemoryLedger {
    pub fn new(contract: impl Into<String>) -> Self {
        let (tx, _) = broadcast::channel(LIVE_CAPACITY);
        Self {
            contract: contract.into(),
            client_identity: "x509::CN=memory-client".into(),
            state: Mutex::new(LedgerState::default()),
            live: Mutex::new(tx),
        }
    }

    pub fn with_client_identity(mut self, identity: impl Into<String>) -> Self {
        self.client_identity = identity.into();
        self
    }

    /// Current block height (0 before the first commit).
    pub fn height(&self) -> u64 {
        self.state.lock().unwrap().height
    }

    /// Commit a raw event at `event.block_number` without touching contract state.
    ///
    /// Lets callers place events at exact heights or with malformed payloads.
    pub fn append_event(&self, event: ChainEvent) {
        let mut state = self.state.lock().unwrap();
        state.height = state.height.max(event.block_number);
        self.commit_event(&mut state, event);
    }

    /// Store a value under `kid` without emitting an event.
    pub fn put_raw(&self, kid: impl Into<String>, value: impl Into<String>) {
        let mut state = self.state.lock().unwrap();
        let kid = kid.into();
        if state.values.insert(kid.clone(), value.into()).is_none() {
            state.kids.push(kid);
        }
    }

    /// Make the next `n` reads by kid report the key as missing.
    pub fn hide_next_reads(&self, n: u32) {
        self.state.lock().unwrap().hidden_reads = n;
    }

    /// End every open subscription, as a dropped gateway connection would.
    pub fn close_subscriptions(&self) {
        let (tx, _) = broadcast::channel(LIVE_CAPACITY);
        *self.live.lock().unwrap() = tx;
    }

    fn commit_event(&self, state: &mut LedgerState, event: ChainEvent) {
        state.events.push(event.clone());
        // No receivers is fine: nobody is subscribed yet.
        let _ = self.live.lock().unwrap().send(event);
    }

    fn check_contract(&self, contract: &str) -> Result<(), LedgerFault> {
        if contract == self.contract {
            Ok(())
        } else {
            Err(LedgerFault::new(
                FaultCode::NotFound,
                format!("contract {contract} is not deployed"),
            ))
        }
    }

    /// Validate and commit `value`, emitting `event_name`. Caller holds the state lock.
    fn commit_value(
        &self,
        state: &mut LedgerState,
        event_name: &str,
        value: &str,
        operator: &str,
        owner: &str,
    ) -> Result<Vec<u8>, LedgerFault> {
        ValueRecord::from_base64(value)
            .map_err(|e| LedgerFault::new(FaultCode::Aborted, format!("invalid value: {e}")))?;
        let kid = hex::encode(Sha256::digest(value.as_bytes()));
        if state.values.contains_key(&kid) {
            return Err(LedgerFault::new(
                FaultCode::Aborted,
                format!("value with kid {kid} already exists"),
            ));
        }

        let payload = EventPayload {
            index: state.kids.len() as u64 + 1,
            kid: kid.clone(),
            operator: operator.to_string(),
            owner: owner.to_string(),
        };
        let payload = serde_json::to_vec(&payload)
            .map_err(|e| LedgerFault::new(FaultCode::Internal, e.to_string()))?;

        state.values.insert(kid.clone(), value.to_string());
        state.kids.push(kid.clone());
        state.height += 1;
        let event = ChainEvent::new(event_name, state.height, payload);
        self.commit_event(state, event);

        Ok(kid.into_bytes())
    }

    fn put_value(&self, args: &[String]) -> Result<Vec<u8>, LedgerFault> {
        let [message, value] = args else {
            return Err(arg_count(FN_PUT_VALUE, 2, args.len()));
        };
        let msg = Message::unmarshal(message.as_bytes())
            .map_err(|e| LedgerFault::new(FaultCode::Aborted, e.to_string()))?;
        let sender = msg
            .verify_against_args(&[value])
            .map_err(|e| LedgerFault::new(FaultCode::Aborted, e.to_string()))?;

        let mut state = self.state.lock().unwrap();
        let expected = state.nonces.get(&sender).copied().unwrap_or(0);
        if msg.nonce != expected {
            return Err(LedgerFault::new(
                FaultCode::Aborted,
                format!("invalid nonce: expect {expected} got {}", msg.nonce),
            ));
        }
        let kid = self.commit_value(&mut state, FN_PUT_VALUE, value, &sender, &sender)?;
        state.nonces.insert(sender, expected + 1);
        Ok(kid)
    }

    fn get_value_by_kid(&self, args: &[String]) -> Result<Vec<u8>, LedgerFault> {
        let [kid] = args else {
            return Err(arg_count(FN_GET_VALUE_BY_KID, 1, args.len()));
        };
        let mut state = self.state.lock().unwrap();
        if state.hidden_reads > 0 {
            state.hidden_reads -= 1;
            return Err(missing_kid(kid));
        }
        state
            .values
            .get(kid)
            .map(|v| v.clone().into_bytes())
            .ok_or_else(|| missing_kid(kid))
    }

    fn get_value_by_index(&self, args: &[String]) -> Result<Vec<u8>, LedgerFault> {
        let [index] = args else {
            return Err(arg_count(FN_GET_VALUE_BY_INDEX, 1, args.len()));
        };
        let i: usize = index.parse().map_err(|_| {
            LedgerFault::new(FaultCode::InvalidArgument, format!("invalid index {index:?}"))
        })?;
        let state = self.state.lock().unwrap();
        i.checked_sub(1)
            .and_then(|pos| state.kids.get(pos))
            .and_then(|kid| state.values.get(kid))
            .map(|v| v.clone().into_bytes())
            .ok_or_else(|| {
                LedgerFault::new(FaultCode::Aborted, format!("value at index {i} does not exist"))
            })
    }

    fn current(&self, args: &[String]) -> Result<Vec<u8>, LedgerFault> {
        let [account] = args else {
            return Err(arg_count(FN_CURRENT, 1, args.len()));
        };
        let state = self.state.lock().unwrap();
        let nonce = state.nonces.get(account).copied().unwrap_or(0);
        Ok(nonce.to_string().into_bytes())
    }

    fn metadata(&self) -> Vec<u8> {
        let functions = [
            FN_INITIALIZE,
            FN_PUT_VALUE,
            FN_PUT_UNTRUST_VALUE,
            FN_GET_VALUE_BY_KID,
            FN_GET_VALUE_BY_INDEX,
            FN_TOTAL,
            FN_CURRENT,
        ];
        let transactions: Vec<_> = functions
            .iter()
            .map(|f| serde_json::json!({ "name": f }))
            .collect();
        let mut contracts = serde_json::Map::new();
        contracts.insert(
            self.contract.clone(),
            serde_json::json!({ "name": self.contract, "transactions": transactions }),
        );
        let meta = serde_json::json!({
            "info": { "title": self.contract, "version": "latest" },
            "contracts": contracts,
        });
        meta.to_string().into_bytes()
    }

    fn invoke(&self, function: &str, args: &[String]) -> Result<Vec<u8>, LedgerFault> {
        match function {
            FN_INITIALIZE => Ok(Vec::new()),
            FN_PUT_VALUE => self.put_value(args),
            FN_PUT_UNTRUST_VALUE => {
                let [value] = args else {
                    return Err(arg_count(FN_PUT_UNTRUST_VALUE, 1, args.len()));
                };
                let id = &self.client_identity;
                let mut state = self.state.lock().unwrap();
                self.commit_value(&mut state, FN_PUT_UNTRUST_VALUE, value, id, id)
            }
            _ => self.query(function, args),
        }
    }

    fn query(&self, function: &str, args: &[String]) -> Result<Vec<u8>, LedgerFault> {
        match function {
            FN_GET_VALUE_BY_KID => self.get_value_by_kid(args),
            FN_GET_VALUE_BY_INDEX => self.get_value_by_index(args),
            FN_TOTAL => Ok(self.state.lock().unwrap().kids.len().to_string().into_bytes()),
            FN_CURRENT => self.current(args),
            FN_GET_METADATA => Ok(self.metadata()),
            other => Err(LedgerFault::new(
                FaultCode::InvalidArgument,
                format!("unknown function {other} in contract {}", self.contract),
            )),
        }
    }
}

fn arg_count(function: &str, want: usize, got: usize) -> LedgerFault {
    LedgerFault::new(
        FaultCode::InvalidArgument,
        format!("{function}: expected {want} arguments, got {got}"),
    )
}

fn missing_kid(kid: &str) -> LedgerFault {
    LedgerFault::new(FaultCode::Aborted, format!("value with kid {kid} not found"))
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn submit(
        &self,
        contract: &str,
        function: &str,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerFault> {
        self.check_contract(contract)?;
        self.invoke(function, args)
    }

    async fn evaluate(
        &self,
        contract: &str,
        function: &str,
        args: &[String],
    ) -> Result<Vec<u8>, LedgerFault> {
        self.check_contract(contract)?;
        self.query(function, args)
    }

    async fn subscribe(
        &self,
        contract: &str,
        start_block: u64,
    ) -> Result<ChainEventStream, LedgerFault> {
        self.check_contract(contract)?;

        // Snapshot and subscribe under the state lock so no commit falls between.
        let (backlog, rx) = {
            let state = self.state.lock().unwrap();
            let backlog: Vec<_> = state
                .events
                .iter()
                .filter(|e| e.block_number >= start_block)
                .cloned()
                .collect();
            (backlog, self.live.lock().unwrap().subscribe())
        };

        let live = stream::unfold(rx, move |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(event) if event.block_number < start_block => continue,
                    Ok(event) => return Some((Ok(event), rx)),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        let fault = LedgerFault::new(
                            FaultCode::Unavailable,
                            format!("event subscription lagged by {n} events"),
                        );
                        return Some((Err(fault), rx));
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        Ok(stream::iter(backlog.into_iter().map(Ok)).chain(live).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testkit::{sign, signing_key};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;

    const CC: &str = "depository";

    fn value(content_id: &str) -> String {
        ValueRecord {
            name: "report".into(),
            content_name: "report.pdf".into(),
            content_type: "application/pdf".into(),
            content_id: content_id.into(),
            content_size: 10,
            trusted_timestamp: "1690000000".into(),
            platform: "test".into(),
            description: String::new(),
        }
        .to_base64()
    }

    fn args(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn put_value_enforces_nonce_order() {
        let ledger = MemoryLedger::new(CC);
        let key = signing_key(0x21);
        let v1 = value("0x01");

        let msg = sign(&key, 0, &[&v1]).marshal().unwrap();
        let kid = ledger.submit(CC, FN_PUT_VALUE, &args(&[&msg, &v1])).await.unwrap();
        assert_eq!(String::from_utf8(kid).unwrap().len(), 64);

        // Replaying nonce 0 is rejected.
        let v2 = value("0x02");
        let replay = sign(&key, 0, &[&v2]).marshal().unwrap();
        let err = ledger
            .submit(CC, FN_PUT_VALUE, &args(&[&replay, &v2]))
            .await
            .unwrap_err();
        assert_eq!(err.message, "invalid nonce: expect 1 got 0");

        let next = sign(&key, 1, &[&v2]).marshal().unwrap();
        ledger.submit(CC, FN_PUT_VALUE, &args(&[&next, &v2])).await.unwrap();
        assert_eq!(ledger.height(), 2);
    }

    #[tokio::test]
    async fn duplicate_values_are_rejected() {
        let ledger = MemoryLedger::new(CC);
        let v = value("0x01");
        ledger.submit(CC, FN_PUT_UNTRUST_VALUE, &args(&[&v])).await.unwrap();
        let err = ledger
            .submit(CC, FN_PUT_UNTRUST_VALUE, &args(&[&v]))
            .await
            .unwrap_err();
        assert!(err.message.contains("already exists"));
        assert_eq!(ledger.height(), 1);
    }

    #[tokio::test]
    async fn failed_write_does_not_consume_nonce() {
        let ledger = MemoryLedger::new(CC);
        let key = signing_key(0x22);
        let v = value("0x01");
        ledger.submit(CC, FN_PUT_UNTRUST_VALUE, &args(&[&v])).await.unwrap();

        let msg = sign(&key, 0, &[&v]).marshal().unwrap();
        assert!(ledger.submit(CC, FN_PUT_VALUE, &args(&[&msg, &v])).await.is_err());

        let sender = crate::auth::address_from_der(&sign(&key, 0, &["x"]).public_key).unwrap();
        let current = ledger.evaluate(CC, FN_CURRENT, &args(&[&sender])).await.unwrap();
        assert_eq!(current, b"0");
    }

    #[tokio::test]
    async fn reads_by_kid_and_index() {
        let ledger = MemoryLedger::new(CC);
        let v = value("0x01");
        let kid = ledger.submit(CC, FN_PUT_UNTRUST_VALUE, &args(&[&v])).await.unwrap();
        let kid = String::from_utf8(kid).unwrap();

        let by_kid = ledger.evaluate(CC, FN_GET_VALUE_BY_KID, &args(&[&kid])).await.unwrap();
        let by_index = ledger.evaluate(CC, FN_GET_VALUE_BY_INDEX, &args(&["1"])).await.unwrap();
        assert_eq!(by_kid, v.as_bytes());
        assert_eq!(by_index, by_kid);

        let missing = ledger.evaluate(CC, FN_GET_VALUE_BY_KID, &args(&["nope"])).await.unwrap_err();
        assert!(missing.message.contains("not found"));
        assert_eq!(ledger.evaluate(CC, FN_TOTAL, &[]).await.unwrap(), b"1");
    }

    #[tokio::test]
    async fn evaluate_cannot_write() {
        let ledger = MemoryLedger::new(CC);
        let v = value("0x01");
        let err = ledger
            .evaluate(CC, FN_PUT_UNTRUST_VALUE, &args(&[&v]))
            .await
            .unwrap_err();
        assert_eq!(err.code, FaultCode::InvalidArgument);
        assert_eq!(ledger.height(), 0);
    }

    #[tokio::test]
    async fn invalid_value_is_rejected() {
        let ledger = MemoryLedger::new(CC);
        let garbage = STANDARD.encode("nope");
        let err = ledger
            .submit(CC, FN_PUT_UNTRUST_VALUE, &args(&[&garbage]))
            .await
            .unwrap_err();
        assert!(err.message.starts_with("invalid value"));
    }

    #[tokio::test]
    async fn subscription_replays_from_start_block_then_follows() {
        let ledger = MemoryLedger::new(CC);
        ledger.append_event(ChainEvent::new("PutValue", 100, b"a".to_vec()));
        ledger.append_event(ChainEvent::new("PutValue", 101, b"b".to_vec()));

        let mut stream = ledger.subscribe(CC, 101).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.block_number, 101);

        ledger.append_event(ChainEvent::new("PutValue", 102, b"c".to_vec()));
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.block_number, 102);

        ledger.close_subscriptions();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn unknown_contract_is_rejected() {
        let ledger = MemoryLedger::new(CC);
        let err = ledger.evaluate("other", FN_TOTAL, &[]).await.unwrap_err();
        assert_eq!(err.code, FaultCode::NotFound);
    }
}
