//! Event Sink Port (Driven Port)
//!
//! Fire-and-forget delivery of order updates and classified exchange errors
//! to external observers. Delivery failures are the sink's problem; the
//! supervisor never blocks or errors on notification.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{PendingOrder, TenantId};
use crate::resilience::ClassifiedError;

/// Payload of an order-update notification.
///
/// A failed buy/sell surfaces as an update carrying the error instead of
/// order fields.
#[derive(Debug, Clone)]
pub enum OrderUpdate {
    /// Order fields mirrored from the venue.
    Order(PendingOrder),
    /// The operation failed; the classified error stands in for the order.
    Failed(ClassifiedError),
}

/// Port for outbound event notification.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Notify observers of an order update (or a failed order operation).
    async fn notify_order_update(
        &self,
        tenant: &TenantId,
        order_set_id: Option<Uuid>,
        update: OrderUpdate,
    );

    /// Notify observers of a fatal exchange error for a tenant.
    async fn notify_exchange_error(&self, tenant: &TenantId, error: ClassifiedError);
}
