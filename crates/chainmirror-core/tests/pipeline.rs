//! End-to-end tests: write path → ledger events → listener → mirror.

use std::sync::Arc;
use std::time::Duration;

use chainmirror_core::contract::{EVENT_PUT_UNTRUST_VALUE, EVENT_PUT_VALUE};
use chainmirror_core::{
    ChainEvent, ContractGateway, DepositoryContract, DepositoryEventHandler, EventDecoder,
    EventListener, HandlerRegistry, ListenerMetrics, MemoryLedger, MemoryMirrorStore, Message,
    MirrorFilter, MirrorRecord, MirrorStore, Pagination, Projector, ProjectorConfig, RetryConfig,
    ValueRecord,
};
use p256::ecdsa::signature::hazmat::PrehashSigner;
use p256::ecdsa::{Signature, SigningKey};
use p256::pkcs8::EncodePublicKey;
use tokio::sync::watch;

const CONTRACT: &str = "depository";

struct Fixture {
    ledger: Arc<MemoryLedger>,
    store: Arc<MemoryMirrorStore>,
    contract: DepositoryContract,
    projector: Projector,
}

impl Fixture {
    fn new() -> Self {
        let ledger = Arc::new(MemoryLedger::new(CONTRACT));
        let store = Arc::new(MemoryMirrorStore::new());
        let gateway = ContractGateway::new(ledger.clone(), CONTRACT);
        Self {
            contract: DepositoryContract::new(gateway),
            projector: Projector::new(store.clone(), ProjectorConfig::default()),
            ledger,
            store,
        }
    }

    fn handler(&self) -> Arc<DepositoryEventHandler> {
        let decoder = EventDecoder::new(self.contract.gateway().clone(), RetryConfig::immediate(2));
        Arc::new(DepositoryEventHandler::new(decoder, self.projector.clone()))
    }

    fn listener(&self, events: &[&str]) -> EventListener {
        let handler = self.handler();
        let mut registry = HandlerRegistry::new();
        for name in events {
            registry.on_event(*name, handler.clone());
        }
        EventListener::new(self.contract.gateway().clone(), self.projector.clone(), registry)
    }

    async fn rows(&self) -> Vec<MirrorRecord> {
        self.store
            .list(&MirrorFilter::default(), &Pagination::default())
            .await
            .unwrap()
            .0
    }
}

/// Run `listener` until `done` holds for its metrics, then shut it down.
async fn drive(listener: &EventListener, done: impl Fn(&ListenerMetrics) -> bool) {
    let (tx, rx) = watch::channel(false);
    let stop = async {
        while !done(&listener.metrics()) {
            tokio::task::yield_now().await;
        }
        tx.send(true).unwrap();
    };
    let (result, ()) = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(listener.run(rx), stop)
    })
    .await
    .expect("listener did not reach the expected state");
    result.unwrap();
}

fn value(content_id: &str) -> String {
    ValueRecord {
        name: format!("doc {content_id}"),
        content_name: format!("{content_id}.pdf"),
        content_type: "application/pdf".into(),
        content_id: content_id.into(),
        content_size: 42,
        trusted_timestamp: "1700000000".into(),
        platform: "integration".into(),
        description: String::new(),
    }
    .to_base64()
}

fn sign(key: &SigningKey, nonce: u64, args: &[&str]) -> Message {
    let digest = chainmirror_core::auth::payload_digest(nonce, args);
    let sig: Signature = key.sign_prehash(&digest).unwrap();
    Message {
        nonce,
        public_key: key.verifying_key().to_public_key_der().unwrap().as_bytes().to_vec(),
        signature: sig.to_der().as_bytes().to_vec(),
    }
}

#[tokio::test]
async fn trusted_write_is_mirrored() {
    let fx = Fixture::new();
    let key = SigningKey::from_slice(&[0x07; 32]).unwrap();

    let v = value("0xfeed");
    let msg = sign(&key, 0, &[&v]);
    let sender = msg.verify_against_args(&[&v]).unwrap();
    let kid = fx.contract.put_value(&msg, &v).await.unwrap();

    let listener = fx.listener(&[EVENT_PUT_VALUE, EVENT_PUT_UNTRUST_VALUE]);
    drive(&listener, |m| m.events_projected == 1).await;

    let (rows, total) = fx
        .projector
        .list(&MirrorFilter::by_kid(&kid), &Pagination::default())
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(rows[0].content_id, "0xfeed");
    assert_eq!(rows[0].operator, sender);
    assert_eq!(rows[0].owner, sender);
    assert_eq!(rows[0].index, 1);
}

#[tokio::test]
async fn poison_event_does_not_stop_the_loop() {
    let fx = Fixture::new();
    fx.ledger
        .append_event(ChainEvent::new(EVENT_PUT_VALUE, 1, b"{not json".to_vec()));
    for id in ["0x01", "0x02", "0x03"] {
        fx.contract.put_untrust_value(&value(id)).await.unwrap();
    }

    let listener = fx.listener(&[EVENT_PUT_VALUE, EVENT_PUT_UNTRUST_VALUE]);
    drive(&listener, |m| m.events_projected == 3).await;

    assert_eq!(fx.rows().await.len(), 3);
    let m = listener.metrics();
    assert_eq!(m.events_skipped, 1);
    assert_eq!(m.handler_errors, 0);
}

#[tokio::test]
async fn unregistered_events_are_not_mirrored() {
    let fx = Fixture::new();
    fx.contract.put_untrust_value(&value("0x01")).await.unwrap();

    let listener = fx.listener(&[EVENT_PUT_VALUE]);
    drive(&listener, |m| m.events_unhandled == 1).await;

    assert!(fx.rows().await.is_empty());
    let m = listener.metrics();
    assert_eq!(m.events_skipped + m.handler_errors, 0);
}

#[tokio::test]
async fn restart_resumes_strictly_after_checkpoint() {
    let fx = Fixture::new();
    fx.store
        .upsert(&MirrorRecord {
            kid: "k-old".into(),
            block_number: 100,
            ..Default::default()
        })
        .await
        .unwrap();

    fx.ledger.put_raw("k100", value("0x100"));
    fx.ledger.put_raw("k101", value("0x101"));
    for (block, kid) in [(100, "k100"), (101, "k101")] {
        let payload = format!(r#"{{"index":{block},"kid":"{kid}","operator":"a","owner":"a"}}"#);
        fx.ledger
            .append_event(ChainEvent::new(EVENT_PUT_VALUE, block, payload.into_bytes()));
    }

    let listener = fx.listener(&[EVENT_PUT_VALUE]);
    assert_eq!(listener.start_block().await.unwrap(), 101);
    drive(&listener, |m| m.events_projected == 1).await;

    assert!(fx.projector.get(&MirrorFilter::by_kid("k100")).await.unwrap().is_none());
    assert!(fx.projector.get(&MirrorFilter::by_kid("k101")).await.unwrap().is_some());
    assert_eq!(fx.projector.checkpoint().await.unwrap(), Some(101));
}

#[tokio::test]
async fn second_run_picks_up_only_new_events() {
    let fx = Fixture::new();
    fx.contract.put_untrust_value(&value("0x01")).await.unwrap();
    fx.contract.put_untrust_value(&value("0x02")).await.unwrap();

    let first = fx.listener(&[EVENT_PUT_UNTRUST_VALUE]);
    drive(&first, |m| m.events_projected == 2).await;
    assert_eq!(fx.projector.checkpoint().await.unwrap(), Some(2));

    fx.contract.put_untrust_value(&value("0x03")).await.unwrap();
    let second = fx.listener(&[EVENT_PUT_UNTRUST_VALUE]);
    drive(&second, |m| m.events_projected == 1).await;

    assert_eq!(fx.rows().await.len(), 3);
    assert_eq!(fx.projector.checkpoint().await.unwrap(), Some(3));
}

#[tokio::test]
async fn redelivered_event_converges_to_one_row() {
    let fx = Fixture::new();
    fx.contract.put_untrust_value(&value("0x01")).await.unwrap();
    let mut events = fx.contract.gateway().subscribe(0).await.unwrap();
    let event = futures::StreamExt::next(&mut events).await.unwrap().unwrap();

    let handler = fx.handler();
    let a = handler.process(&event).await.unwrap();
    let b = handler.process(&event).await.unwrap();

    assert_eq!(a, b);
    assert_eq!(fx.rows().await, vec![a]);
}

#[tokio::test]
async fn checkpoint_follows_last_projected_block() {
    let fx = Fixture::new();
    for i in 1..=5 {
        fx.contract.put_untrust_value(&value(&format!("0x{i:02}"))).await.unwrap();
    }

    let listener = fx.listener(&[EVENT_PUT_UNTRUST_VALUE]);
    drive(&listener, |m| m.events_projected == 5).await;

    assert_eq!(fx.projector.checkpoint().await.unwrap(), Some(fx.ledger.height()));
    assert_eq!(fx.ledger.height(), 5);
}
