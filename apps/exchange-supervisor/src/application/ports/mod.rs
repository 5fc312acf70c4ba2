//! Driven ports.
//!
//! The supervisor core talks to three external collaborators through these
//! interfaces: the venue-specific exchange connector, the durable order
//! store, and the event sink observers listen on. Adapters live under
//! `infrastructure`.

mod events;
mod exchange;
mod store;

pub use events::{EventSink, OrderUpdate};
pub use exchange::{
    ConnectorFactory, ExchangeConnector, ExchangeError, PlaceOrderRequest, TransportEvent,
};
pub use store::{OrderStore, StoreError};
