//! Broadcast-channel event sink.
//!
//! Fans supervisor events out to in-process subscribers over a tokio
//! broadcast channel. Lossy by design: with no subscribers (or a lagging
//! one) events are dropped, never blocking the supervisor.

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::application::ports::{EventSink, OrderUpdate};
use crate::domain::TenantId;
use crate::resilience::ClassifiedError;

/// An event published by the supervisor.
#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    /// An order was placed, updated, or failed.
    OrderUpdate {
        /// The tenant the update belongs to.
        tenant: TenantId,
        /// Groups orders placed by one fan-out, when known.
        order_set_id: Option<Uuid>,
        /// The update payload.
        update: OrderUpdate,
    },
    /// A fatal exchange error was escalated for a tenant.
    ExchangeError {
        /// The affected tenant.
        tenant: TenantId,
        /// The classified error.
        error: ClassifiedError,
    },
}

/// `EventSink` publishing to a tokio broadcast channel.
#[derive(Debug)]
pub struct ChannelEventSink {
    sender: broadcast::Sender<SupervisorEvent>,
}

impl ChannelEventSink {
    /// Create a sink with the given subscriber buffer capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to supervisor events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.sender.subscribe()
    }
}

impl Default for ChannelEventSink {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn notify_order_update(
        &self,
        tenant: &TenantId,
        order_set_id: Option<Uuid>,
        update: OrderUpdate,
    ) {
        // A send error just means nobody is listening.
        let _ = self.sender.send(SupervisorEvent::OrderUpdate {
            tenant: tenant.clone(),
            order_set_id,
            update,
        });
    }

    async fn notify_exchange_error(&self, tenant: &TenantId, error: ClassifiedError) {
        tracing::error!(tenant = %tenant, error = %error, "exchange error escalated");
        let _ = self.sender.send(SupervisorEvent::ExchangeError {
            tenant: tenant.clone(),
            error,
        });
    }
}
