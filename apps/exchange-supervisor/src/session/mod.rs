//! Per-Tenant Session
//!
//! Owns one tenant's connection state: the venue connector, the reconnect
//! schedule, the reconciliation and health-check loops, and the call
//! pipeline every remote operation goes through. Created and destroyed only
//! by the [`registry`](crate::session::registry).

pub mod registry;

use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::application::ports::{
    EventSink, ExchangeConnector, OrderStore, OrderUpdate, PlaceOrderRequest, TransportEvent,
};
use crate::config::SupervisorConfig;
use crate::domain::{PendingOrder, TenantId};
use crate::resilience::{
    CallPipeline, ClassifiedError, CloseCode, ReconnectSchedule, RetryPolicy,
};

/// Session lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No transport; eligible for (re)connection.
    Disconnected,
    /// Transport being opened.
    Connecting,
    /// Transport open and serving calls.
    Connected,
    /// Torn down; terminal.
    Aborted,
}

/// One tenant's supervised venue session.
pub struct Session<C, S, E> {
    tenant: TenantId,
    connector: Arc<C>,
    store: Arc<S>,
    events: Arc<E>,
    pipeline: CallPipeline<C, E>,
    state: RwLock<SessionState>,
    schedule: Mutex<ReconnectSchedule>,
    reconciliation_interval: std::time::Duration,
    health_check_interval: std::time::Duration,
    cancel: CancellationToken,
    reconcile_cancel: CancellationToken,
}

impl<C, S, E> Session<C, S, E>
where
    C: ExchangeConnector + 'static,
    S: OrderStore + 'static,
    E: EventSink + 'static,
{
    /// Create a session in the `Disconnected` state.
    pub fn new(
        tenant: TenantId,
        connector: Arc<C>,
        store: Arc<S>,
        events: Arc<E>,
        config: &SupervisorConfig,
    ) -> Self {
        let cancel = CancellationToken::new();
        let pipeline = CallPipeline::new(
            tenant.clone(),
            Arc::clone(&connector),
            Arc::clone(&events),
            RetryPolicy::from(&config.retry),
            config.retry.busy_wait_timeout,
            cancel.clone(),
        );

        Self {
            tenant,
            connector,
            store,
            events,
            pipeline,
            state: RwLock::new(SessionState::Disconnected),
            schedule: Mutex::new(ReconnectSchedule::new(
                config.connection.base_timeout,
                Instant::now(),
            )),
            reconciliation_interval: config.connection.reconciliation_interval,
            health_check_interval: config.connection.health_check_interval,
            reconcile_cancel: cancel.child_token(),
            cancel,
        }
    }

    /// The owning tenant.
    #[must_use]
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Whether a reconnect would currently be allowed.
    #[must_use]
    pub fn reconnect_eligible(&self) -> bool {
        self.schedule.lock().can_reconnect(Instant::now())
    }

    /// Open the transport and arm the supervision loops.
    ///
    /// Arms three independent tasks: the reconciliation interval, the
    /// health-check interval, and a transport-event listener feeding close
    /// codes into the backoff policy. All stop on `abort_connections`.
    pub async fn start(self: &Arc<Self>) -> Result<(), ClassifiedError> {
        self.set_state(SessionState::Connecting);

        if let Err(error) = self.connector.connect().await {
            let classified = crate::resilience::classify(&error);
            tracing::error!(
                tenant = %self.tenant,
                error = %classified,
                "failed to open transport"
            );
            self.set_state(SessionState::Disconnected);
            return Err(classified);
        }

        self.set_state(SessionState::Connected);
        self.schedule.lock().reset(Instant::now());
        tracing::info!(tenant = %self.tenant, "session connected");

        self.spawn_reconcile_loop();
        self.spawn_health_loop();
        self.spawn_transport_listener();

        Ok(())
    }

    /// Check transport health and reconnect if unhealthy and eligible.
    ///
    /// Never reconnects before `next_allowed_at`: that gate is the
    /// backpressure device preventing reconnect storms, and it also makes
    /// the health-check/reconciliation race self-resolving (the loser sees
    /// a not-yet-eligible time).
    pub async fn check_health(&self) {
        if self.state() == SessionState::Aborted {
            return;
        }
        if self.connector.is_healthy() {
            return;
        }

        let now = Instant::now();
        let remaining = self.schedule.lock().time_until_eligible(now);
        if remaining > std::time::Duration::ZERO {
            tracing::debug!(
                tenant = %self.tenant,
                remaining_ms = remaining.as_millis(),
                "transport unhealthy but reconnect not yet allowed"
            );
            return;
        }

        self.reconnect().await;
    }

    /// Handle a transport close: push the reconnect time back per the
    /// backoff policy and drop to `Disconnected`.
    pub fn on_close(&self, code: CloseCode) {
        let delay = self.schedule.lock().push_back(code, Instant::now());
        tracing::warn!(
            tenant = %self.tenant,
            code = code.as_u16(),
            delay_secs = delay.as_secs_f64(),
            "transport closed; reconnect pushed back"
        );
        if self.state() != SessionState::Aborted {
            self.set_state(SessionState::Disconnected);
        }
    }

    /// Re-synchronize local order state with the venue.
    ///
    /// Fetches authoritative order state through the pipeline and upserts
    /// every record into the durable store. Store failures are logged and
    /// left for the next tick; fetch failures propagate classified.
    pub async fn reconcile(&self) -> Result<usize, ClassifiedError> {
        let snapshots = self
            .pipeline
            .execute("fetch_orders", |c| async move { c.fetch_orders().await })
            .await?;

        for snapshot in &snapshots {
            let record = PendingOrder::from_snapshot(&self.tenant, None, snapshot);
            if let Err(error) = self.store.upsert_order(&record).await {
                tracing::warn!(
                    tenant = %self.tenant,
                    order_id = %record.order_id,
                    error = %error,
                    "failed to upsert reconciled order; next tick will retry"
                );
            }
            self.events
                .notify_order_update(&self.tenant, None, OrderUpdate::Order(record))
                .await;
        }

        tracing::debug!(
            tenant = %self.tenant,
            orders = snapshots.len(),
            "reconciled order state"
        );
        Ok(snapshots.len())
    }

    /// Place an order through the resilience pipeline.
    ///
    /// Success upserts the resulting orders and emits order-update events;
    /// failure emits an order-update event carrying the classified error
    /// and returns it.
    pub async fn place_order(
        &self,
        request: PlaceOrderRequest,
        order_set_id: Uuid,
    ) -> Result<Vec<PendingOrder>, ClassifiedError> {
        let result = self
            .pipeline
            .execute("place_order", |c| {
                let request = request.clone();
                async move { c.place_order(&request).await }
            })
            .await;

        match result {
            Ok(snapshots) => {
                let mut placed = Vec::with_capacity(snapshots.len());
                for snapshot in &snapshots {
                    let record =
                        PendingOrder::from_snapshot(&self.tenant, Some(order_set_id), snapshot);
                    if let Err(error) = self.store.upsert_order(&record).await {
                        tracing::warn!(
                            tenant = %self.tenant,
                            order_id = %record.order_id,
                            error = %error,
                            "failed to upsert placed order"
                        );
                    }
                    self.events
                        .notify_order_update(
                            &self.tenant,
                            Some(order_set_id),
                            OrderUpdate::Order(record.clone()),
                        )
                        .await;
                    placed.push(record);
                }
                Ok(placed)
            }
            Err(classified) => {
                self.events
                    .notify_order_update(
                        &self.tenant,
                        Some(order_set_id),
                        OrderUpdate::Failed(classified.clone()),
                    )
                    .await;
                Err(classified)
            }
        }
    }

    /// Cancel an order through the resilience pipeline.
    pub async fn cancel_order(&self, order_id: &str) -> Result<PendingOrder, ClassifiedError> {
        let owned_id = order_id.to_string();
        let result = self
            .pipeline
            .execute("cancel_order", |c| {
                let order_id = owned_id.clone();
                async move { c.cancel_order(&order_id).await }
            })
            .await;

        match result {
            Ok(snapshot) => {
                let record = PendingOrder::from_snapshot(&self.tenant, None, &snapshot);
                if let Err(error) = self.store.upsert_order(&record).await {
                    tracing::warn!(
                        tenant = %self.tenant,
                        order_id = %record.order_id,
                        error = %error,
                        "failed to upsert canceled order"
                    );
                }
                self.events
                    .notify_order_update(&self.tenant, None, OrderUpdate::Order(record.clone()))
                    .await;
                Ok(record)
            }
            Err(classified) => {
                self.events
                    .notify_order_update(&self.tenant, None, OrderUpdate::Failed(classified.clone()))
                    .await;
                Err(classified)
            }
        }
    }

    /// Tear the session down: cancel all loops and pending retry waits,
    /// close the transport if open, and enter the terminal `Aborted` state.
    ///
    /// Idempotent and safe to call concurrently with an in-flight call;
    /// the in-flight call finishes or fails naturally.
    pub async fn abort_connections(&self) {
        {
            let mut state = self.state.write();
            if *state == SessionState::Aborted {
                return;
            }
            *state = SessionState::Aborted;
        }

        self.cancel.cancel();

        if self.connector.is_connected() {
            if let Err(error) = self.connector.close().await {
                tracing::warn!(
                    tenant = %self.tenant,
                    error = %error,
                    "error closing transport during abort"
                );
            }
        }

        tracing::info!(tenant = %self.tenant, "session aborted");
    }

    fn set_state(&self, state: SessionState) {
        *self.state.write() = state;
    }

    async fn reconnect(&self) {
        self.set_state(SessionState::Connecting);
        tracing::info!(tenant = %self.tenant, "reconnecting transport");

        match self.connector.connect().await {
            Ok(()) => {
                self.set_state(SessionState::Connected);
                self.schedule.lock().reset(Instant::now());
                tracing::info!(tenant = %self.tenant, "transport reconnected");
            }
            Err(error) => {
                tracing::warn!(tenant = %self.tenant, error = %error, "reconnect failed");
                // A failed reconnect backs off like an abnormal closure.
                self.on_close(CloseCode::Other(1006));
            }
        }
    }

    /// Periodic reconciliation. A fatal classified error stops this loop
    /// for good (the pipeline has already escalated it to the event sink);
    /// non-fatal failures wait for the next scheduled tick.
    fn spawn_reconcile_loop(self: &Arc<Self>) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(session.reconciliation_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick fires immediately; the session just connected.
            interval.tick().await;

            loop {
                tokio::select! {
                    () = session.reconcile_cancel.cancelled() => {
                        tracing::debug!(tenant = %session.tenant, "reconciliation loop cancelled");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(error) = session.reconcile().await {
                            tracing::error!(
                                tenant = %session.tenant,
                                error = %error,
                                "reconciliation failed"
                            );
                            if error.fatal {
                                tracing::error!(
                                    tenant = %session.tenant,
                                    "fatal exchange error; stopping reconciliation loop"
                                );
                                break;
                            }
                        }
                    }
                }
            }
        });
    }

    fn spawn_health_loop(self: &Arc<Self>) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(session.health_check_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The immediate first tick would race the connect in start().
            interval.tick().await;

            loop {
                tokio::select! {
                    () = session.cancel.cancelled() => {
                        tracing::debug!(tenant = %session.tenant, "health-check loop cancelled");
                        break;
                    }
                    _ = interval.tick() => {
                        session.check_health().await;
                    }
                }
            }
        });
    }

    fn spawn_transport_listener(self: &Arc<Self>) {
        let session = Arc::clone(self);
        let mut events = session.connector.transport_events();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = session.cancel.cancelled() => {
                        tracing::debug!(tenant = %session.tenant, "transport listener cancelled");
                        break;
                    }
                    event = events.recv() => match event {
                        Ok(TransportEvent::Closed { code }) => {
                            session.on_close(CloseCode::from(code));
                        }
                        Ok(TransportEvent::Message) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(
                                tenant = %session.tenant,
                                skipped,
                                "transport event listener lagged"
                            );
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                            tracing::debug!(
                                tenant = %session.tenant,
                                "transport event channel closed"
                            );
                            break;
                        }
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::sync::broadcast;

    use crate::application::ports::{ExchangeError, StoreError};
    use crate::domain::{OrderSide, OrderSnapshot, OrderStatus};
    use rust_decimal::Decimal;

    struct FakeConnector {
        connected: AtomicBool,
        healthy: AtomicBool,
        connect_calls: AtomicUsize,
        close_calls: AtomicUsize,
        orders: parking_lot::Mutex<Vec<OrderSnapshot>>,
        events: broadcast::Sender<TransportEvent>,
    }

    impl FakeConnector {
        fn new() -> Self {
            let (events, _) = broadcast::channel(16);
            Self {
                connected: AtomicBool::new(false),
                healthy: AtomicBool::new(true),
                connect_calls: AtomicUsize::new(0),
                close_calls: AtomicUsize::new(0),
                orders: parking_lot::Mutex::new(Vec::new()),
                events,
            }
        }

        fn push_order(&self, order_id: &str) {
            self.orders.lock().push(OrderSnapshot {
                order_id: order_id.to_string(),
                symbol: "XBTUSD".to_string(),
                side: OrderSide::Buy,
                quantity: Decimal::ONE,
                price: None,
                status: OrderStatus::New,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    #[async_trait::async_trait]
    impl ExchangeConnector for FakeConnector {
        async fn connect(&self) -> Result<(), ExchangeError> {
            self.connect_calls.fetch_add(1, Ordering::SeqCst);
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&self) -> Result<(), ExchangeError> {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
            self.connected.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        fn is_healthy(&self) -> bool {
            self.healthy.load(Ordering::SeqCst) && self.is_connected()
        }

        async fn place_order(
            &self,
            request: &PlaceOrderRequest,
        ) -> Result<Vec<OrderSnapshot>, ExchangeError> {
            let snapshot = OrderSnapshot {
                order_id: format!("order-{}", self.orders.lock().len()),
                symbol: request.symbol.clone(),
                side: request.side,
                quantity: request.quantity,
                price: request.price,
                status: OrderStatus::New,
                timestamp: chrono::Utc::now(),
            };
            self.orders.lock().push(snapshot.clone());
            Ok(vec![snapshot])
        }

        async fn cancel_order(&self, order_id: &str) -> Result<OrderSnapshot, ExchangeError> {
            let mut orders = self.orders.lock();
            let found = orders
                .iter_mut()
                .find(|o| o.order_id == order_id)
                .ok_or_else(|| ExchangeError::Api {
                    code: "404".to_string(),
                    message: format!("order {order_id} not found"),
                })?;
            found.status = OrderStatus::Canceled;
            Ok(found.clone())
        }

        async fn fetch_orders(&self) -> Result<Vec<OrderSnapshot>, ExchangeError> {
            Ok(self.orders.lock().clone())
        }

        fn transport_events(&self) -> broadcast::Receiver<TransportEvent> {
            self.events.subscribe()
        }
    }

    #[derive(Default)]
    struct NullStore {
        upserts: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl OrderStore for NullStore {
        async fn upsert_order(&self, _order: &PendingOrder) -> Result<(), StoreError> {
            self.upserts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn delete_user(&self, _tenant: &TenantId) -> Result<(), StoreError> {
            Ok(())
        }

        async fn delete_orders(&self, _tenant: &TenantId) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct NullSink;

    #[async_trait::async_trait]
    impl EventSink for NullSink {
        async fn notify_order_update(
            &self,
            _tenant: &TenantId,
            _order_set_id: Option<Uuid>,
            _update: OrderUpdate,
        ) {
        }

        async fn notify_exchange_error(&self, _tenant: &TenantId, _error: ClassifiedError) {}
    }

    fn config() -> SupervisorConfig {
        let mut config = SupervisorConfig::default();
        config.retry.min_timeout = Duration::from_millis(1);
        config.connection.base_timeout = Duration::from_secs(5);
        config.connection.reconciliation_interval = Duration::from_secs(3600);
        config.connection.health_check_interval = Duration::from_secs(3600);
        config
    }

    fn session(connector: Arc<FakeConnector>) -> Arc<Session<FakeConnector, NullStore, NullSink>> {
        Arc::new(Session::new(
            TenantId::new("alice"),
            connector,
            Arc::new(NullStore::default()),
            Arc::new(NullSink),
            &config(),
        ))
    }

    #[tokio::test]
    async fn start_connects_and_enters_connected_state() {
        let connector = Arc::new(FakeConnector::new());
        let s = session(Arc::clone(&connector));

        assert_eq!(s.state(), SessionState::Disconnected);
        s.start().await.unwrap();

        assert_eq!(s.state(), SessionState::Connected);
        assert_eq!(connector.connect_calls.load(Ordering::SeqCst), 1);
        assert!(s.reconnect_eligible());
    }

    #[tokio::test]
    async fn close_pushes_back_and_disconnects() {
        let connector = Arc::new(FakeConnector::new());
        let s = session(connector);
        s.start().await.unwrap();

        s.on_close(CloseCode::ServiceRestart);

        assert_eq!(s.state(), SessionState::Disconnected);
        assert!(!s.reconnect_eligible());
    }

    #[tokio::test]
    async fn health_check_respects_backoff_gate() {
        let connector = Arc::new(FakeConnector::new());
        let s = session(Arc::clone(&connector));
        s.start().await.unwrap();

        // Lose the transport with a long backoff pending.
        connector.connected.store(false, Ordering::SeqCst);
        s.on_close(CloseCode::ServiceRestart);
        let connects_before = connector.connect_calls.load(Ordering::SeqCst);

        s.check_health().await;

        // Not eligible yet: no reconnect attempt was made.
        assert_eq!(
            connector.connect_calls.load(Ordering::SeqCst),
            connects_before
        );
        assert_eq!(s.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn health_check_reconnects_when_eligible() {
        let connector = Arc::new(FakeConnector::new());
        let s = session(Arc::clone(&connector));
        s.start().await.unwrap();

        // Transport dies; schedule is still immediately eligible.
        connector.connected.store(false, Ordering::SeqCst);
        let connects_before = connector.connect_calls.load(Ordering::SeqCst);

        s.check_health().await;

        assert_eq!(
            connector.connect_calls.load(Ordering::SeqCst),
            connects_before + 1
        );
        assert_eq!(s.state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn healthy_transport_is_left_alone() {
        let connector = Arc::new(FakeConnector::new());
        let s = session(Arc::clone(&connector));
        s.start().await.unwrap();
        let connects_before = connector.connect_calls.load(Ordering::SeqCst);

        s.check_health().await;

        assert_eq!(
            connector.connect_calls.load(Ordering::SeqCst),
            connects_before
        );
    }

    #[tokio::test]
    async fn abort_is_idempotent_and_closes_once() {
        let connector = Arc::new(FakeConnector::new());
        let s = session(Arc::clone(&connector));
        s.start().await.unwrap();

        s.abort_connections().await;
        s.abort_connections().await;
        s.abort_connections().await;

        assert_eq!(s.state(), SessionState::Aborted);
        assert_eq!(connector.close_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn abort_without_open_transport_is_safe() {
        let connector = Arc::new(FakeConnector::new());
        let s = session(Arc::clone(&connector));

        s.abort_connections().await;

        assert_eq!(s.state(), SessionState::Aborted);
        assert_eq!(connector.close_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn reconcile_upserts_fetched_orders() {
        let connector = Arc::new(FakeConnector::new());
        connector.push_order("o-1");
        connector.push_order("o-2");

        let store = Arc::new(NullStore::default());
        let s = Arc::new(Session::new(
            TenantId::new("alice"),
            Arc::clone(&connector),
            Arc::clone(&store),
            Arc::new(NullSink),
            &config(),
        ));
        s.start().await.unwrap();

        let count = s.reconcile().await.unwrap();

        assert_eq!(count, 2);
        assert_eq!(store.upserts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn place_order_records_and_returns_pending_orders() {
        let connector = Arc::new(FakeConnector::new());
        let store = Arc::new(NullStore::default());
        let s = Arc::new(Session::new(
            TenantId::new("alice"),
            connector,
            Arc::clone(&store),
            Arc::new(NullSink),
            &config(),
        ));
        s.start().await.unwrap();

        let set_id = Uuid::new_v4();
        let placed = s
            .place_order(
                PlaceOrderRequest::market("XBTUSD", OrderSide::Buy, Decimal::ONE),
                set_id,
            )
            .await
            .unwrap();

        assert_eq!(placed.len(), 1);
        assert_eq!(placed[0].order_set_id, Some(set_id));
        assert_eq!(store.upserts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transport_close_event_feeds_backoff() {
        let connector = Arc::new(FakeConnector::new());
        let s = session(Arc::clone(&connector));
        s.start().await.unwrap();

        connector
            .events
            .send(TransportEvent::Closed { code: 1012 })
            .unwrap();

        // Give the listener task a moment to process the event.
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(s.state(), SessionState::Disconnected);
        assert!(!s.reconnect_eligible());
    }
}
