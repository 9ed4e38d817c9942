//! Event handler trait and the event-name dispatch table.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::decoder::EventDecoder;
use crate::error::MirrorError;
use crate::projector::Projector;
use crate::types::{ChainEvent, MirrorRecord};

/// Processes one kind of chain event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Called once per delivered event whose name this handler is registered for.
    async fn handle(&self, event: &ChainEvent) -> Result<(), MirrorError>;

    /// Name used in logs and error reports.
    fn name(&self) -> &str;
}

/// Runtime map from event name to handler.
///
/// Events whose name has no entry are not mirrored.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event_name`, replacing any previous entry.
    pub fn on_event(&mut self, event_name: impl Into<String>, handler: Arc<dyn EventHandler>) {
        self.handlers.insert(event_name.into(), handler);
    }

    pub fn get(&self, event_name: &str) -> Option<&Arc<dyn EventHandler>> {
        self.handlers.get(event_name)
    }

    pub fn event_names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Decode a depository event and project it into the mirror.
pub struct DepositoryEventHandler {
    decoder: EventDecoder,
    projector: Projector,
}

impl DepositoryEventHandler {
    pub fn new(decoder: EventDecoder, projector: Projector) -> Self {
        Self { decoder, projector }
    }

    pub async fn process(&self, event: &ChainEvent) -> Result<MirrorRecord, MirrorError> {
        let (payload, value) = self.decoder.decode(event).await?;
        self.projector.project(event, &payload, &value).await
    }
}

#[async_trait]
impl EventHandler for DepositoryEventHandler {
    async fn handle(&self, event: &ChainEvent) -> Result<(), MirrorError> {
        self.process(event).await.map(|_| ())
    }

    fn name(&self) -> &str {
        "depository"
    }
}
