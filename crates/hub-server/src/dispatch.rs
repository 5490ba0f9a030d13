//! Routing of polled messages
//!
//! Events go to the rule engine, requests are executed and answered over the
//! bus, and responses are only logged.

use std::sync::Arc;

use async_trait::async_trait;
use hub_bus::{Bus, MessageHandler};
use hub_core::{Event, Message, Request, Response};
use hub_procedure::Executor;
use hub_rules::EventProcessor;
use tracing::{debug, info, warn};

/// Message handler of the dispatch loop
#[derive(Clone)]
pub struct Dispatcher {
    bus: Arc<dyn Bus>,
    executor: Executor,
    processor: EventProcessor,
    token: Option<String>,
}

impl Dispatcher {
    pub fn new(
        bus: Arc<dyn Bus>,
        executor: Executor,
        processor: EventProcessor,
        token: Option<String>,
    ) -> Self {
        Self {
            bus,
            executor,
            processor,
            token,
        }
    }

    /// Whether `request` carries the configured token, if one is configured
    pub fn is_authorized(&self, request: &Request) -> bool {
        match &self.token {
            Some(expected) => request.token() == Some(expected.as_str()),
            None => true,
        }
    }

    async fn on_event(&self, event: Event) {
        debug!(event_type = %event.event_type(), origin = %event.origin(), "Received event");
        for (hook, response) in self.processor.process_event(&event).await {
            if response.is_error() {
                warn!(hook = %hook, errors = ?response.errors, "Hook finished with errors");
            }
        }
    }

    /// Whether `request` is addressed to this node
    ///
    /// An empty target counts as local.
    pub fn is_local(&self, request: &Request) -> bool {
        let target = request.target();
        target.is_empty() || target == self.bus.device_id()
    }

    async fn on_request(&self, request: Request) {
        if !self.is_local(&request) {
            debug!(
                action = %request.action(),
                target = %request.target(),
                "Skipping request for another node"
            );
            return;
        }

        if !self.is_authorized(&request) {
            info!(
                action = %request.action(),
                origin = %request.origin(),
                "Rejected request with missing or invalid token"
            );
            return;
        }

        debug!(action = %request.action(), id = %request.id(), "Executing request");
        let response = self.executor.execute_request(&request).await;
        if let Err(err) = self.bus.post(response.into()) {
            warn!(id = %request.id(), error = %err, "Failed to post response");
        }
    }

    fn on_response(&self, response: Response) {
        let id = response.id.as_deref().unwrap_or("-");
        if response.is_error() {
            info!(id, errors = ?response.errors, "Received error response");
        } else {
            debug!(id, output = %response.output, "Received response");
        }
    }
}

#[async_trait]
impl MessageHandler for Dispatcher {
    async fn handle(&self, msg: Message) {
        match msg {
            Message::Event(event) => self.on_event(event).await,
            Message::Request(request) => self.on_request(request).await,
            Message::Response(response) => self.on_response(response),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("device_id", &self.bus.device_id())
            .field("processor", &self.processor)
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}
