//! Event routing to subscribed channels.
//!
//! The router turns a built [`EventData`] into wire frames: it computes
//! the emitting top-level context, asks the subscription manager for the
//! ordered channel list, serializes the payload once, and queues one
//! frame per channel. Delivery goes through an unbounded queue, so
//! events never block command processing.

// ============================================================================
// Imports
// ============================================================================

use tokio::sync::mpsc;
use tracing::trace;

use crate::protocol::event::EventData;
use crate::protocol::frame::OutgoingMessage;
use crate::store::context::BrowsingContextStore;
use crate::subscription::SubscriptionManager;

// ============================================================================
// EventRouter
// ============================================================================

/// Fan-out of BiDi events to client channels.
pub struct EventRouter {
    outgoing: mpsc::UnboundedSender<String>,
}

impl EventRouter {
    /// Creates a router queuing frames into `outgoing`.
    #[must_use]
    pub fn new(outgoing: mpsc::UnboundedSender<String>) -> Self {
        Self { outgoing }
    }

    /// Emits one event to every subscribed channel, oldest subscription
    /// first.
    pub fn emit(
        &self,
        subscriptions: &SubscriptionManager,
        contexts: &BrowsingContextStore,
        event: EventData,
    ) {
        // Roll the emitting context up to its top-level ancestor; a
        // context already gone from the store routes as session-wide.
        let top_level = event
            .context()
            .and_then(|context| contexts.top_level_of(context).ok());
        self.emit_at(subscriptions, event, top_level.as_ref());
    }

    /// Emits with an explicit top-level routing context; used for
    /// teardown events whose context already left the store.
    pub fn emit_at(
        &self,
        subscriptions: &SubscriptionManager,
        event: EventData,
        top_level: Option<&crate::identifiers::BrowsingContextId>,
    ) {
        let method = event.method();
        let channels = subscriptions.channels_for(method, top_level);
        if channels.is_empty() {
            trace!(method, "Event dropped: no subscribers");
            return;
        }

        // Serialize once, then stamp each channel.
        let params = event.params_value();
        for channel in channels {
            let frame = OutgoingMessage::event(method, params.clone(), &channel).to_frame();
            let _ = self.outgoing.send(frame);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
