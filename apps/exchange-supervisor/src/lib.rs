#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Exchange Supervisor - Connection Supervision & Call Resilience
//!
//! Maintains one supervised venue session per tenant: a registry owns the
//! tenant-to-session map, each session owns its connector, reconnect
//! schedule, reconciliation and health-check loops, and every remote call
//! runs through a pipeline that serializes access to the transport,
//! classifies failures, and retries with bounded exponential backoff.
//!
//! # Layers (inside -> outside)
//!
//! - **Domain**: Tenants, orders, and order snapshots
//! - **Resilience**: Backoff policy, error classification, retry driver,
//!   and the call pipeline
//! - **Application**: Ports for the venue connector, durable store, and
//!   event sink
//! - **Session**: Per-tenant lifecycle and the registry
//! - **Infrastructure**: In-memory store, broadcast event sink, sandbox
//!   connector
//!
//! # Data Flow
//!
//! ```text
//! caller ──► SessionRegistry ──► Session ──► CallPipeline ──► ExchangeConnector
//!                                  │                │
//!                                  ▼                ▼
//!                              OrderStore       EventSink
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Domain layer - Tenant and order types with no external dependencies.
pub mod domain;

/// Application layer - Port definitions.
pub mod application;

/// Resilience layer - Backoff, classification, retry, and the pipeline.
pub mod resilience;

/// Session layer - Per-tenant lifecycle and the registry.
pub mod session;

/// Infrastructure layer - Concrete port implementations.
pub mod infrastructure;

/// Configuration loading.
pub mod config;

/// Tracing setup.
pub mod telemetry;

pub use application::ports::{
    ConnectorFactory, EventSink, ExchangeConnector, ExchangeError, OrderStore, OrderUpdate,
    PlaceOrderRequest, StoreError, TransportEvent,
};
pub use config::{ConfigError, Credentials, SupervisorConfig};
pub use domain::{OrderSide, OrderSnapshot, OrderStatus, PendingOrder, TenantId};
pub use resilience::{
    CallOutcome, CallPipeline, ClassifiedError, CloseCode, ErrorKind, ReconnectSchedule,
    RetryPolicy, classify, run_with_retry,
};
pub use session::registry::{PlacementResult, SessionRegistry};
pub use session::{Session, SessionState};
