//! Call Resilience Pipeline
//!
//! Wraps every remote operation for one session with busy-gating, lazy
//! connection, bounded retry, and error classification. At most one call is
//! executing against the transport at a time; concurrent callers queue
//! behind the busy gate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{EventSink, ExchangeConnector, ExchangeError};
use crate::domain::TenantId;

use super::classifier::{ClassifiedError, classify};
use super::retry::{CallOutcome, RetryPolicy, run_with_retry};

/// Resilient executor for one session's remote calls.
pub struct CallPipeline<C, E> {
    tenant: TenantId,
    connector: Arc<C>,
    events: Arc<E>,
    policy: RetryPolicy,
    busy_wait_timeout: Duration,
    gate: Mutex<()>,
    active: AtomicBool,
    cancel: CancellationToken,
}

impl<C, E> CallPipeline<C, E>
where
    C: ExchangeConnector,
    E: EventSink,
{
    /// Create a pipeline for the given tenant.
    pub fn new(
        tenant: TenantId,
        connector: Arc<C>,
        events: Arc<E>,
        policy: RetryPolicy,
        busy_wait_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            tenant,
            connector,
            events,
            policy,
            busy_wait_timeout,
            gate: Mutex::new(()),
            active: AtomicBool::new(false),
            cancel,
        }
    }

    /// Whether a call is currently executing against the transport.
    #[must_use]
    pub fn has_active_call(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Execute a remote operation through the pipeline.
    ///
    /// Steps: wait for any in-flight call (bounded; an overlong wait is
    /// logged and the caller keeps queueing), lazily connect if no transport
    /// exists, then drive the operation through classification and bounded
    /// retry. Fatal classified errors are additionally forwarded to the
    /// event sink before propagating to the caller.
    pub async fn execute<T, F, Fut>(
        &self,
        operation: &'static str,
        op: F,
    ) -> Result<T, ClassifiedError>
    where
        F: Fn(Arc<C>) -> Fut,
        Fut: Future<Output = Result<T, ExchangeError>>,
    {
        let _guard = self.acquire_gate(operation).await;

        if !self.connector.is_connected() {
            tracing::debug!(tenant = %self.tenant, operation, "lazily connecting before call");
            if let Err(error) = self.connector.connect().await {
                let classified = classify(&error);
                self.escalate_if_fatal(&classified).await;
                return Err(classified);
            }
        }

        // Reborrow so each attempt's future captures a copy of the
        // reference rather than moving the closure itself.
        let op = &op;
        let result = run_with_retry(&self.policy, &self.cancel, || {
            let connector = Arc::clone(&self.connector);
            async move {
                self.active.store(true, Ordering::SeqCst);
                let outcome = op(connector).await;
                self.active.store(false, Ordering::SeqCst);

                match outcome {
                    Ok(value) => CallOutcome::Ok(value),
                    Err(error) => {
                        let classified = classify(&error);
                        tracing::warn!(
                            tenant = %self.tenant,
                            operation,
                            kind = ?classified.kind,
                            retry = classified.retry,
                            fatal = classified.fatal,
                            "remote call failed: {}",
                            classified.message
                        );
                        if classified.retry {
                            CallOutcome::Retryable(classified)
                        } else {
                            CallOutcome::Fatal(classified)
                        }
                    }
                }
            }
        })
        .await;

        self.active.store(false, Ordering::SeqCst);

        if let Err(classified) = &result {
            self.escalate_if_fatal(classified).await;
        }

        result
    }

    /// Wait for the busy gate. Each wait episode is bounded by
    /// `busy_wait_timeout`; an overrun is operational noise, logged once per
    /// episode while the caller keeps queueing until the gate frees up.
    async fn acquire_gate(&self, operation: &'static str) -> MutexGuard<'_, ()> {
        let mut episodes: u32 = 0;
        loop {
            match timeout(self.busy_wait_timeout, self.gate.lock()).await {
                Ok(guard) => return guard,
                Err(_) => {
                    episodes += 1;
                    tracing::warn!(
                        tenant = %self.tenant,
                        operation,
                        episodes,
                        waited_ms = u128::from(episodes) * self.busy_wait_timeout.as_millis(),
                        "busy gate wait exceeded; still queueing behind active call"
                    );
                }
            }
        }
    }

    async fn escalate_if_fatal(&self, classified: &ClassifiedError) {
        if classified.fatal {
            self.events
                .notify_exchange_error(&self.tenant, classified.clone())
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use tokio::sync::broadcast;
    use uuid::Uuid;

    use crate::application::ports::{OrderUpdate, PlaceOrderRequest, TransportEvent};
    use crate::domain::OrderSnapshot;
    use crate::resilience::classifier::ErrorKind;

    /// Connector fake that counts concurrent entries into the transport.
    struct InstrumentedConnector {
        connected: AtomicBool,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        connect_calls: AtomicUsize,
        events: broadcast::Sender<TransportEvent>,
    }

    impl InstrumentedConnector {
        fn new(connected: bool) -> Self {
            let (events, _) = broadcast::channel(8);
            Self {
                connected: AtomicBool::new(connected),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                connect_calls: AtomicUsize::new(0),
                events,
            }
        }

        fn enter(&self) {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        }

        fn exit(&self) {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait::async_trait]
    impl ExchangeConnector for InstrumentedConnector {
        async fn connect(&self) -> Result<(), ExchangeError> {
            self.connect_calls.fetch_add(1, Ordering::SeqCst);
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
            _request: &PlaceOrderRequest,
        ) -> Result<Vec<OrderSnapshot>, ExchangeError> {
            Ok(vec![])
        }

        async fn cancel_order(&self, _order_id: &str) -> Result<OrderSnapshot, ExchangeError> {
            Err(ExchangeError::NotConnected)
        }

        async fn fetch_orders(&self) -> Result<Vec<OrderSnapshot>, ExchangeError> {
            self.enter();
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.exit();
            Ok(vec![])
        }

        fn transport_events(&self) -> broadcast::Receiver<TransportEvent> {
            self.events.subscribe()
        }
    }

    /// Sink fake recording fatal escalations.
    #[derive(Default)]
    struct RecordingSink {
        fatal_errors: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl EventSink for RecordingSink {
        async fn notify_order_update(
            &self,
            _tenant: &TenantId,
            _order_set_id: Option<Uuid>,
            _update: OrderUpdate,
        ) {
        }

        async fn notify_exchange_error(&self, _tenant: &TenantId, _error: ClassifiedError) {
            self.fatal_errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn pipeline(
        connector: Arc<InstrumentedConnector>,
        sink: Arc<RecordingSink>,
        max_attempts: u32,
    ) -> CallPipeline<InstrumentedConnector, RecordingSink> {
        CallPipeline::new(
            TenantId::new("alice"),
            connector,
            sink,
            RetryPolicy {
                max_attempts,
                min_timeout: Duration::from_millis(1),
                factor: 1.0,
                jitter_factor: 0.0,
            },
            Duration::from_millis(50),
            CancellationToken::new(),
        )
    }

    #[tokio::test]
    async fn lazily_connects_before_first_call() {
        let connector = Arc::new(InstrumentedConnector::new(false));
        let sink = Arc::new(RecordingSink::default());
        let p = pipeline(Arc::clone(&connector), sink, 3);

        let result = p
            .execute("fetch_orders", |c| async move { c.fetch_orders().await })
            .await;

        assert!(result.is_ok());
        assert_eq!(connector.connect_calls.load(Ordering::SeqCst), 1);
        assert!(connector.is_connected());
    }

    #[tokio::test]
    async fn concurrent_callers_never_overlap_on_the_transport() {
        let connector = Arc::new(InstrumentedConnector::new(true));
        let sink = Arc::new(RecordingSink::default());
        let p = Arc::new(pipeline(Arc::clone(&connector), sink, 1));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let p = Arc::clone(&p);
            handles.push(tokio::spawn(async move {
                p.execute("fetch_orders", |c| async move { c.fetch_orders().await })
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(connector.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(!p.has_active_call());
    }

    #[tokio::test]
    async fn gate_wait_overrun_keeps_queueing_until_the_call_finishes() {
        let connector = Arc::new(InstrumentedConnector::new(true));
        let sink = Arc::new(RecordingSink::default());
        // Helper's gate bound is 50ms; the first call holds it for 150ms.
        let p = Arc::new(pipeline(Arc::clone(&connector), sink, 1));

        let holder = Arc::clone(&p);
        let long_call = tokio::spawn(async move {
            holder
                .execute("fetch_orders", |_| async {
                    tokio::time::sleep(Duration::from_millis(150)).await;
                    Ok(())
                })
                .await
        });
        // Let the long call take the gate first.
        tokio::time::sleep(Duration::from_millis(10)).await;

        let result = p.execute("fetch_orders", |_| async { Ok(()) }).await;

        assert!(result.is_ok());
        long_call.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn retries_transient_errors_then_returns_last() {
        let connector = Arc::new(InstrumentedConnector::new(true));
        let sink = Arc::new(RecordingSink::default());
        let p = pipeline(connector, Arc::clone(&sink), 3);
        let calls = AtomicUsize::new(0);

        let result: Result<(), _> = p
            .execute("place_order", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(ExchangeError::Network {
                        message: "connection reset".to_string(),
                    })
                }
            })
            .await;

        let error = result.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(error.kind, ErrorKind::Transient);
        // Transient exhaustion is not fatal: nothing escalated.
        assert_eq!(sink.fatal_errors.load(Ordering::SeqCst), 0);
        assert!(!p.has_active_call());
    }

    #[tokio::test]
    async fn fatal_errors_abort_and_escalate_once() {
        let connector = Arc::new(InstrumentedConnector::new(true));
        let sink = Arc::new(RecordingSink::default());
        let p = pipeline(connector, Arc::clone(&sink), 5);
        let calls = AtomicUsize::new(0);

        let result: Result<(), _> = p
            .execute("place_order", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ExchangeError::AuthenticationFailed) }
            })
            .await;

        let error = result.unwrap_err();
        assert!(error.fatal);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink.fatal_errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_errors_surface_without_retry_or_escalation() {
        let connector = Arc::new(InstrumentedConnector::new(true));
        let sink = Arc::new(RecordingSink::default());
        let p = pipeline(connector, Arc::clone(&sink), 5);
        let calls = AtomicUsize::new(0);

        let result: Result<(), _> = p
            .execute("cancel_order", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(ExchangeError::OrderRejected {
                        reason: "unsupported".to_string(),
                    })
                }
            })
            .await;

        assert_eq!(result.unwrap_err().kind, ErrorKind::Unknown);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink.fatal_errors.load(Ordering::SeqCst), 0);
    }
}
