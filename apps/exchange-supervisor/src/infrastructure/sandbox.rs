//! Sandbox exchange connector.
//!
//! Simulated venue returning canned responses without any network I/O.
//! Useful for development runs and integration tests that don't require
//! real venue connectivity. Order IDs are generated sequentially starting
//! from 1, and tests can inject transport closes and scripted failures.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::application::ports::{
    ConnectorFactory, ExchangeConnector, ExchangeError, PlaceOrderRequest, TransportEvent,
};
use crate::config::Credentials;
use crate::domain::{OrderSnapshot, OrderStatus, TenantId};

/// Simulated venue connector.
#[derive(Debug)]
pub struct SandboxConnector {
    connected: AtomicBool,
    order_counter: AtomicU64,
    orders: Mutex<HashMap<String, OrderSnapshot>>,
    next_error: Mutex<Option<ExchangeError>>,
    events: broadcast::Sender<TransportEvent>,
}

impl SandboxConnector {
    /// Create a disconnected sandbox connector.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            connected: AtomicBool::new(false),
            order_counter: AtomicU64::new(1),
            orders: Mutex::new(HashMap::new()),
            next_error: Mutex::new(None),
            events,
        }
    }

    /// Script the next API call to fail with `error`.
    pub fn fail_next_call(&self, error: ExchangeError) {
        *self.next_error.lock() = Some(error);
    }

    /// Simulate the venue closing the transport with `code`.
    pub fn inject_close(&self, code: u16) {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::Closed { code });
    }

    fn take_scripted_error(&self) -> Result<(), ExchangeError> {
        match self.next_error.lock().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn require_connected(&self) -> Result<(), ExchangeError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ExchangeError::NotConnected)
        }
    }
}

impl Default for SandboxConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeConnector for SandboxConnector {
    async fn connect(&self) -> Result<(), ExchangeError> {
        self.take_scripted_error()?;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), ExchangeError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_healthy(&self) -> bool {
        self.is_connected()
    }

    async fn place_order(
        &self,
        request: &PlaceOrderRequest,
    ) -> Result<Vec<OrderSnapshot>, ExchangeError> {
        self.require_connected()?;
        self.take_scripted_error()?;

        let id = self.order_counter.fetch_add(1, Ordering::SeqCst);
        let snapshot = OrderSnapshot {
            order_id: format!("sandbox-{id}"),
            symbol: request.symbol.clone(),
            side: request.side,
            quantity: request.quantity,
            price: request.price,
            status: OrderStatus::New,
            timestamp: chrono::Utc::now(),
        };
        self.orders
            .lock()
            .insert(snapshot.order_id.clone(), snapshot.clone());
        Ok(vec![snapshot])
    }

    async fn cancel_order(&self, order_id: &str) -> Result<OrderSnapshot, ExchangeError> {
        self.require_connected()?;
        self.take_scripted_error()?;

        let mut orders = self.orders.lock();
        let snapshot = orders.get_mut(order_id).ok_or_else(|| ExchangeError::Api {
            code: "not_found".to_string(),
            message: format!("order {order_id} not found"),
        })?;
        snapshot.status = OrderStatus::Canceled;
        snapshot.timestamp = chrono::Utc::now();
        Ok(snapshot.clone())
    }

    async fn fetch_orders(&self) -> Result<Vec<OrderSnapshot>, ExchangeError> {
        self.require_connected()?;
        self.take_scripted_error()?;
        Ok(self.orders.lock().values().cloned().collect())
    }

    fn transport_events(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}

/// Factory producing sandbox connectors, one per tenant.
#[derive(Debug, Default)]
pub struct SandboxConnectorFactory {
    created: Mutex<Vec<(TenantId, Arc<SandboxConnector>)>>,
}

impl SandboxConnectorFactory {
    /// Create a new factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The connector most recently created for `tenant`, if any.
    #[must_use]
    pub fn connector_for(&self, tenant: &TenantId) -> Option<Arc<SandboxConnector>> {
        self.created
            .lock()
            .iter()
            .rev()
            .find(|(t, _)| t == tenant)
            .map(|(_, c)| Arc::clone(c))
    }
}

#[async_trait]
impl ConnectorFactory for SandboxConnectorFactory {
    type Connector = SandboxConnector;

    async fn create(
        &self,
        tenant: &TenantId,
        _credentials: &Credentials,
    ) -> Result<Arc<Self::Connector>, ExchangeError> {
        let connector = Arc::new(SandboxConnector::new());
        self.created
            .lock()
            .push((tenant.clone(), Arc::clone(&connector)));
        tracing::debug!(tenant = %tenant, "created sandbox connector");
        Ok(connector)
    }
}
