//! `EventListener`: the long-running consume loop.
//!
//! ```text
//! Idle → Subscribing → Consuming → Draining → Stopped
//! ```
//!
//! On start the listener reads the projector's checkpoint and subscribes
//! strictly after it. Each delivered event is dispatched by name; failures of
//! a single event are counted and logged, never fatal. Losing the subscription
//! itself ends the run with [`MirrorError::Subscription`] so the caller can
//! restart it (see [`EventListener::supervise`]).

use std::sync::Mutex;
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::MirrorError;
use crate::gateway::ContractGateway;
use crate::handler::HandlerRegistry;
use crate::projector::Projector;
use crate::types::ChainEvent;

/// Lifecycle of one listener run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    Subscribing,
    Consuming,
    Draining,
    Stopped,
}

/// Metrics snapshot for the listener.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ListenerMetrics {
    /// Events a handler completed successfully.
    pub events_projected: u64,
    /// Events dropped because they could not be decoded or their value fetched.
    pub events_skipped: u64,
    /// Events with no registered handler.
    pub events_unhandled: u64,
    /// Other handler failures (e.g. storage).
    pub handler_errors: u64,
    /// Completed subscription runs that ended in a fatal error.
    pub restarts: u64,
}

/// Restart policy used by [`EventListener::supervise`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
        }
    }
}

impl RestartConfig {
    fn backoff(&self, attempt: u32) -> Duration {
        let ms = self
            .initial_backoff_ms
            .saturating_mul(2u64.pow(attempt.min(16)))
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

pub struct EventListener {
    gateway: ContractGateway,
    projector: Projector,
    registry: HandlerRegistry,
    state: Mutex<ListenerState>,
    metrics: Mutex<ListenerMetrics>,
}

impl EventListener {
    pub fn new(gateway: ContractGateway, projector: Projector, registry: HandlerRegistry) -> Self {
        Self {
            gateway,
            projector,
            registry,
            state: Mutex::new(ListenerState::Idle),
            metrics: Mutex::new(ListenerMetrics::default()),
        }
    }

    pub fn state(&self) -> ListenerState {
        *self.state.lock().unwrap()
    }

    pub fn metrics(&self) -> ListenerMetrics {
        self.metrics.lock().unwrap().clone()
    }

    fn set_state(&self, next: ListenerState) {
        *self.state.lock().unwrap() = next;
    }

    /// First block to subscribe from: one past the persisted checkpoint, or
    /// genesis when nothing has been mirrored.
    pub async fn start_block(&self) -> Result<u64, MirrorError> {
        Ok(self.projector.checkpoint().await?.map_or(0, |cp| cp + 1))
    }

    /// Consume events until `shutdown` flips to `true` (clean `Ok`) or the
    /// subscription fails (fatal `Err`).
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), MirrorError> {
        self.set_state(ListenerState::Subscribing);
        let result = self.consume(&mut shutdown).await;
        self.set_state(ListenerState::Stopped);

        match &result {
            Ok(()) => info!(contract = self.gateway.contract(), "listener stopped"),
            Err(e) => error!(contract = self.gateway.contract(), error = %e, "listener failed"),
        }
        result
    }

    async fn consume(&self, shutdown: &mut watch::Receiver<bool>) -> Result<(), MirrorError> {
        let start = self
            .start_block()
            .await
            .map_err(|e| MirrorError::Subscription(format!("read checkpoint: {e}")))?;
        info!(
            contract = self.gateway.contract(),
            start_block = start,
            events = ?self.registry.event_names(),
            "subscribing to chaincode events"
        );
        let mut stream = self
            .gateway
            .subscribe(start)
            .await
            .map_err(|e| MirrorError::Subscription(e.to_string()))?;
        self.set_state(ListenerState::Consuming);

        let outcome = loop {
            if *shutdown.borrow() {
                break Ok(());
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    // A dropped sender can never signal again; treat it as shutdown.
                    if changed.is_err() || *shutdown.borrow() {
                        break Ok(());
                    }
                }
                item = stream.next() => match item {
                    Some(Ok(event)) => self.dispatch(&event).await,
                    Some(Err(fault)) => break Err(MirrorError::Subscription(fault.to_string())),
                    None => break Err(MirrorError::Subscription("event stream ended".into())),
                },
            }
        };

        self.set_state(ListenerState::Draining);
        drop(stream);
        outcome
    }

    async fn dispatch(&self, event: &ChainEvent) {
        let Some(handler) = self.registry.get(&event.event_name) else {
            warn!(
                event = %event.event_name,
                block = event.block_number,
                "no handler registered, event not mirrored"
            );
            self.metrics.lock().unwrap().events_unhandled += 1;
            return;
        };

        debug!(event = %event.event_name, block = event.block_number, "dispatching");
        match handler.handle(event).await {
            Ok(()) => self.metrics.lock().unwrap().events_projected += 1,
            Err(e @ (MirrorError::Decode(_) | MirrorError::Gateway(_))) => {
                warn!(
                    event = %event.event_name,
                    block = event.block_number,
                    error = %e,
                    "skipping event"
                );
                self.metrics.lock().unwrap().events_skipped += 1;
            }
            Err(e) => {
                let err = MirrorError::Handler {
                    handler: handler.name().to_string(),
                    reason: e.to_string(),
                };
                warn!(event = %event.event_name, block = event.block_number, error = %err);
                self.metrics.lock().unwrap().handler_errors += 1;
            }
        }
    }

    /// Run the listener, restarting it with capped exponential backoff after
    /// each fatal subscription failure. Every restart re-reads the checkpoint.
    /// Returns once `shutdown` flips to `true`.
    pub async fn supervise(&self, mut shutdown: watch::Receiver<bool>, restart: &RestartConfig) {
        let mut attempt = 0u32;
        loop {
            match self.run(shutdown.clone()).await {
                Ok(()) => return,
                Err(e) => {
                    self.metrics.lock().unwrap().restarts += 1;
                    let delay = restart.backoff(attempt);
                    attempt = attempt.saturating_add(1);
                    warn!(error = %e, delay_ms = delay.as_millis() as u64, "restarting listener");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                return;
                            }
                        }
                    }
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MirrorError;
    use crate::handler::EventHandler;
    use crate::memory_ledger::MemoryLedger;
    use crate::projector::ProjectorConfig;
    use crate::store::MemoryMirrorStore;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Failing;

    #[async_trait]
    impl EventHandler for Failing {
        async fn handle(&self, _e: &ChainEvent) -> Result<(), MirrorError> {
            Err(MirrorError::Storage("disk full".into()))
        }
        fn name(&self) -> &str {
            "failing"
        }
    }

    fn listener(ledger: Arc<MemoryLedger>, registry: HandlerRegistry) -> EventListener {
        let gateway = ContractGateway::new(ledger, "depository");
        let projector = Projector::new(Arc::new(MemoryMirrorStore::new()), ProjectorConfig::default());
        EventListener::new(gateway, projector, registry)
    }

    #[tokio::test]
    async fn empty_mirror_starts_from_genesis() {
        let l = listener(Arc::new(MemoryLedger::new("depository")), HandlerRegistry::new());
        assert_eq!(l.start_block().await.unwrap(), 0);
        assert_eq!(l.state(), ListenerState::Idle);
    }

    #[tokio::test]
    async fn handler_errors_are_counted_not_fatal() {
        let ledger = Arc::new(MemoryLedger::new("depository"));
        ledger.append_event(ChainEvent::new("Broken", 1, Vec::new()));
        ledger.append_event(ChainEvent::new("Broken", 2, Vec::new()));
        ledger.append_event(ChainEvent::new("Other", 3, Vec::new()));

        let mut registry = HandlerRegistry::new();
        registry.on_event("Broken", Arc::new(Failing));
        let l = listener(ledger.clone(), registry);

        let (tx, rx) = watch::channel(false);
        let run = l.run(rx);
        let stop = async {
            while l.metrics().events_unhandled < 1 {
                tokio::task::yield_now().await;
            }
            tx.send(true).unwrap();
        };
        let (result, ()) = tokio::join!(run, stop);

        assert!(result.is_ok());
        assert_eq!(l.state(), ListenerState::Stopped);
        let m = l.metrics();
        assert_eq!(m.handler_errors, 2);
        assert_eq!(m.events_unhandled, 1);
        assert_eq!(m.events_projected, 0);
    }

    #[tokio::test]
    async fn closed_stream_is_fatal() {
        let ledger = Arc::new(MemoryLedger::new("depository"));
        let l = listener(ledger.clone(), HandlerRegistry::new());
        let (_tx, rx) = watch::channel(false);

        let run = l.run(rx);
        let close = async {
            while l.state() != ListenerState::Consuming {
                tokio::task::yield_now().await;
            }
            ledger.close_subscriptions();
        };
        let (result, ()) = tokio::join!(run, close);

        let err = result.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(l.state(), ListenerState::Stopped);
    }

    #[tokio::test]
    async fn unknown_contract_fails_to_subscribe() {
        let ledger = Arc::new(MemoryLedger::new("depository"));
        let gateway = ContractGateway::new(ledger, "acl");
        let projector = Projector::new(Arc::new(MemoryMirrorStore::new()), ProjectorConfig::default());
        let l = EventListener::new(gateway, projector, HandlerRegistry::new());

        let (_tx, rx) = watch::channel(false);
        assert!(matches!(l.run(rx).await, Err(MirrorError::Subscription(_))));
    }

    #[tokio::test]
    async fn supervise_restarts_until_shutdown() {
        let ledger = Arc::new(MemoryLedger::new("depository"));
        let l = listener(ledger.clone(), HandlerRegistry::new());
        let (tx, rx) = watch::channel(false);
        let restart = RestartConfig {
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        };

        let supervised = l.supervise(rx, &restart);
        let driver = async {
            while l.metrics().restarts < 2 {
                if l.state() == ListenerState::Consuming {
                    ledger.close_subscriptions();
                }
                tokio::task::yield_now().await;
            }
            tx.send(true).unwrap();
        };
        tokio::join!(supervised, driver);

        assert!(l.metrics().restarts >= 2);
    }

    #[test]
    fn restart_backoff_is_capped() {
        let cfg = RestartConfig {
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
        };
        assert_eq!(cfg.backoff(0), Duration::from_millis(100));
        assert_eq!(cfg.backoff(2), Duration::from_millis(400));
        assert_eq!(cfg.backoff(10), Duration::from_millis(1_000));
    }
}
