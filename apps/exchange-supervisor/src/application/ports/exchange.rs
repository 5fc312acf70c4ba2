//! Exchange Connector Port (Driven Port)
//!
//! Interface for the venue-specific connector. The connector owns all
//! request/response encoding and the transport itself; the supervisor only
//! sees orders, a health signal, and transport events.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::Credentials;
use crate::domain::{OrderSide, OrderSnapshot, TenantId};

/// Request to place an order on the venue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    /// Instrument to trade.
    pub symbol: String,
    /// Order side.
    pub side: OrderSide,
    /// Quantity to trade.
    pub quantity: Decimal,
    /// Limit price; `None` places a market order.
    pub price: Option<Decimal>,
}

impl PlaceOrderRequest {
    /// Create a market order request.
    #[must_use]
    pub fn market(symbol: impl Into<String>, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            price: None,
        }
    }

    /// Create a limit order request.
    #[must_use]
    pub fn limit(
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            quantity,
            price: Some(price),
        }
    }
}

/// Events emitted by the connector's transport.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// The transport disconnected with the given close code.
    Closed {
        /// Raw close code from the venue (e.g. 1000, 1012).
        code: u16,
    },
    /// An inbound message arrived (contents are connector-internal).
    Message,
}

/// Raw errors surfaced by the exchange connector.
///
/// The classifier in `resilience::classifier` maps these onto the retry /
/// fatal taxonomy; nothing else in the crate inspects them.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExchangeError {
    /// Network-level failure (connection reset, DNS, broken pipe).
    #[error("network error: {message}")]
    Network {
        /// Error details.
        message: String,
    },

    /// The call did not complete in time.
    #[error("timeout during {operation}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
    },

    /// The venue is rate limiting this credential set.
    #[error("rate limited by venue")]
    RateLimited {
        /// Suggested retry delay, if the venue provided one.
        retry_after_secs: Option<u64>,
    },

    /// The venue rejected the request with an application error.
    #[error("venue error: {code} - {message}")]
    Api {
        /// Venue error code.
        code: String,
        /// Venue error description.
        message: String,
    },

    /// Order was rejected outright.
    #[error("order rejected: {reason}")]
    OrderRejected {
        /// Rejection reason.
        reason: String,
    },

    /// Credentials were rejected.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// No transport is currently open.
    #[error("not connected")]
    NotConnected,
}

/// Port for the venue connector owned by one session.
#[async_trait]
pub trait ExchangeConnector: Send + Sync {
    /// Open (or reopen) the transport and API handle.
    async fn connect(&self) -> Result<(), ExchangeError>;

    /// Close the transport. Safe to call when already closed.
    async fn close(&self) -> Result<(), ExchangeError>;

    /// Whether a transport handle currently exists.
    fn is_connected(&self) -> bool;

    /// Whether the transport is alive and passing traffic.
    fn is_healthy(&self) -> bool;

    /// Place an order; multi-leg requests may yield several orders.
    async fn place_order(
        &self,
        request: &PlaceOrderRequest,
    ) -> Result<Vec<OrderSnapshot>, ExchangeError>;

    /// Cancel an order by venue order ID.
    async fn cancel_order(&self, order_id: &str) -> Result<OrderSnapshot, ExchangeError>;

    /// Fetch the authoritative order state for this credential set.
    async fn fetch_orders(&self) -> Result<Vec<OrderSnapshot>, ExchangeError>;

    /// Subscribe to transport events (close codes, inbound messages).
    fn transport_events(&self) -> broadcast::Receiver<TransportEvent>;
}

/// Factory building one connector per tenant.
///
/// This is the seam that keeps venue specifics out of the registry: the
/// registry hands over credentials and gets back a ready-to-connect
/// connector.
#[async_trait]
pub trait ConnectorFactory: Send + Sync {
    /// The connector type this factory produces.
    type Connector: ExchangeConnector + 'static;

    /// Build a connector for the given tenant.
    async fn create(
        &self,
        tenant: &TenantId,
        credentials: &Credentials,
    ) -> Result<Arc<Self::Connector>, ExchangeError>;
}
