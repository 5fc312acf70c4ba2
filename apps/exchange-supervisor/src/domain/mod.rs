//! Domain types shared across the supervisor.
//!
//! Tenant identity, order records mirrored from the venue, and the value
//! objects they are built from. No I/O and no supervision logic here.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque unique identity for a tenant (e.g. a username).
///
/// The registry guarantees at most one live session per `TenantId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(String);

impl TenantId {
    /// Create a new tenant identity.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Side of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    /// Buy order.
    Buy,
    /// Sell order.
    Sell,
}

/// Order lifecycle status as reported by the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Accepted but not yet filled.
    New,
    /// Partially filled.
    PartiallyFilled,
    /// Completely filled.
    Filled,
    /// Canceled.
    Canceled,
    /// Rejected by the venue.
    Rejected,
}

impl OrderStatus {
    /// Check whether the order can still change.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Filled | Self::Canceled | Self::Rejected)
    }
}

/// Order state as returned by the venue for a single order.
///
/// Produced by the exchange connector; the session joins it with tenant
/// identity to form a [`PendingOrder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    /// Venue-assigned order ID.
    pub order_id: String,
    /// Traded instrument.
    pub symbol: String,
    /// Order side.
    pub side: OrderSide,
    /// Order quantity.
    pub quantity: Decimal,
    /// Limit price, if any.
    pub price: Option<Decimal>,
    /// Current status.
    pub status: OrderStatus,
    /// Venue timestamp of the last change.
    pub timestamp: DateTime<Utc>,
}

/// Locally held order record, mirrored from the venue.
///
/// Keyed by `order_id` in the durable store, so repeated upserts of the
/// same snapshot are idempotent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    /// Venue-assigned order ID (the upsert key).
    pub order_id: String,
    /// Owning tenant.
    pub tenant: TenantId,
    /// Order set this order was placed under, if placed through us.
    pub order_set_id: Option<Uuid>,
    /// Traded instrument.
    pub symbol: String,
    /// Order side.
    pub side: OrderSide,
    /// Order quantity.
    pub quantity: Decimal,
    /// Limit price, if any.
    pub price: Option<Decimal>,
    /// Current status.
    pub status: OrderStatus,
    /// Timestamp of the last venue-reported change.
    pub last_timestamp: DateTime<Utc>,
}

impl PendingOrder {
    /// Build a record from a venue snapshot.
    #[must_use]
    pub fn from_snapshot(
        tenant: &TenantId,
        order_set_id: Option<Uuid>,
        snapshot: &OrderSnapshot,
    ) -> Self {
        Self {
            order_id: snapshot.order_id.clone(),
            tenant: tenant.clone(),
            order_set_id,
            symbol: snapshot.symbol.clone(),
            side: snapshot.side,
            quantity: snapshot.quantity,
            price: snapshot.price,
            status: snapshot.status,
            last_timestamp: snapshot.timestamp,
        }
    }
}
