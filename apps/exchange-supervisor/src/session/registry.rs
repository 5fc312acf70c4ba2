//! Session Registry
//!
//! The single owner of the tenant-to-session map. Registration replaces and
//! aborts any prior session for the tenant, removal tears the session down
//! and unconditionally clears durable state, and order placement fans out
//! to an explicit set of tenants.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::application::ports::{
    ConnectorFactory, EventSink, OrderStore, PlaceOrderRequest, StoreError,
};
use crate::config::{Credentials, SupervisorConfig};
use crate::domain::{PendingOrder, TenantId};
use crate::resilience::{ClassifiedError, classify};

use super::Session;

/// Per-tenant result of a fanned-out order placement.
pub struct PlacementResult {
    /// The tenant the order was placed for.
    pub tenant: TenantId,
    /// The placed orders, or the classified failure.
    pub outcome: Result<Vec<PendingOrder>, ClassifiedError>,
}

/// Owner of all live tenant sessions.
pub struct SessionRegistry<F, S, E>
where
    F: ConnectorFactory,
{
    factory: F,
    store: Arc<S>,
    events: Arc<E>,
    config: SupervisorConfig,
    sessions: Mutex<HashMap<TenantId, Arc<Session<F::Connector, S, E>>>>,
}

impl<F, S, E> SessionRegistry<F, S, E>
where
    F: ConnectorFactory,
    S: OrderStore + 'static,
    E: EventSink + 'static,
{
    /// Create an empty registry.
    pub fn new(factory: F, store: Arc<S>, events: Arc<E>, config: SupervisorConfig) -> Self {
        Self {
            factory,
            store,
            events,
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Register a tenant, replacing any existing session.
    ///
    /// An existing session for the tenant is aborted before the new one is
    /// created, so at most one live session per tenant exists at any point.
    /// If the new session fails to start, the tenant ends up with no
    /// session at all (the old one is already gone) and the classified
    /// error propagates. Returns `true` when the tenant was not previously
    /// registered.
    pub async fn add_or_replace(
        &self,
        tenant: TenantId,
        credentials: Credentials,
    ) -> Result<bool, ClassifiedError> {
        let mut sessions = self.sessions.lock().await;

        let previous = sessions.remove(&tenant);
        let is_new = previous.is_none();
        if let Some(previous) = previous {
            tracing::info!(tenant = %tenant, "replacing existing session");
            previous.abort_connections().await;
        }

        let connector = self
            .factory
            .create(&tenant, &credentials)
            .await
            .map_err(|error| {
                let classified = classify(&error);
                tracing::error!(
                    tenant = %tenant,
                    error = %classified,
                    "failed to create connector"
                );
                classified
            })?;

        let session = Arc::new(Session::new(
            tenant.clone(),
            connector,
            Arc::clone(&self.store),
            Arc::clone(&self.events),
            &self.config,
        ));
        if let Err(classified) = session.start().await {
            // A tenant that failed to start holds no session and no durable
            // state; re-registering later begins from scratch.
            if let Err(error) = self.delete_tenant_records(&tenant).await {
                tracing::error!(
                    tenant = %tenant,
                    error = %error,
                    "failed to clear tenant state after failed start"
                );
            }
            return Err(classified);
        }

        sessions.insert(tenant.clone(), session);
        tracing::info!(tenant = %tenant, is_new, "session registered");
        Ok(is_new)
    }

    /// Deregister a tenant.
    ///
    /// Aborts the live session if one exists, then deletes the tenant's
    /// durable records regardless. Removing a tenant that was never
    /// registered still clears durable state; that makes removal safe to
    /// retry after a crash between abort and cleanup.
    pub async fn remove(&self, tenant: &TenantId) -> Result<(), StoreError> {
        let session = self.sessions.lock().await.remove(tenant);
        match session {
            Some(session) => {
                session.abort_connections().await;
                tracing::info!(tenant = %tenant, "session removed");
            }
            None => {
                tracing::debug!(tenant = %tenant, "remove for unregistered tenant; clearing state");
            }
        }

        self.delete_tenant_records(tenant).await
    }

    /// Delete a tenant's durable user and order records. Both deletions are
    /// attempted even if the first fails; the first failure is returned.
    async fn delete_tenant_records(&self, tenant: &TenantId) -> Result<(), StoreError> {
        let mut first_error = None;
        if let Err(error) = self.store.delete_user(tenant).await {
            tracing::error!(tenant = %tenant, error = %error, "failed to delete user record");
            first_error = Some(error);
        }
        if let Err(error) = self.store.delete_orders(tenant).await {
            tracing::error!(tenant = %tenant, error = %error, "failed to delete order records");
            first_error.get_or_insert(error);
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// The connector factory. Lets callers that own the concrete factory
    /// type reach its diagnostics.
    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Whether the tenant currently has a session.
    pub async fn exists(&self, tenant: &TenantId) -> bool {
        self.sessions.lock().await.contains_key(tenant)
    }

    /// Snapshot of currently registered tenants.
    pub async fn active_tenants(&self) -> Vec<TenantId> {
        self.sessions.lock().await.keys().cloned().collect()
    }

    /// Snapshot of the current sessions.
    pub async fn active_sessions(&self) -> Vec<Arc<Session<F::Connector, S, E>>> {
        self.sessions.lock().await.values().cloned().collect()
    }

    /// Run `f` over a snapshot of the current sessions.
    ///
    /// The snapshot is taken up front, so registry mutations during the
    /// iteration are never observed mid-iteration.
    pub async fn for_each_active<G>(&self, mut f: G)
    where
        G: FnMut(&TenantId, &Arc<Session<F::Connector, S, E>>),
    {
        let snapshot: Vec<_> = {
            let sessions = self.sessions.lock().await;
            sessions
                .iter()
                .map(|(tenant, session)| (tenant.clone(), Arc::clone(session)))
                .collect()
        };
        for (tenant, session) in &snapshot {
            f(tenant, session);
        }
    }

    /// The live session for a tenant, if any.
    pub async fn session(&self, tenant: &TenantId) -> Option<Arc<Session<F::Connector, S, E>>> {
        self.sessions.lock().await.get(tenant).cloned()
    }

    /// Place an order for each named tenant.
    ///
    /// All placements share one order-set id. An empty tenant list places
    /// nothing. Tenants without a session are skipped with a warning; each
    /// registered tenant gets an independent outcome, so one tenant's
    /// failure never blocks another's placement.
    pub async fn place_order_for(
        &self,
        tenants: &[TenantId],
        request: &PlaceOrderRequest,
    ) -> Vec<PlacementResult> {
        if tenants.is_empty() {
            tracing::debug!("order fan-out requested for no tenants; placing nothing");
            return Vec::new();
        }

        let order_set_id = Uuid::new_v4();
        let mut results = Vec::with_capacity(tenants.len());

        for tenant in tenants {
            let Some(session) = self.session(tenant).await else {
                tracing::warn!(tenant = %tenant, "order fan-out skipped unregistered tenant");
                continue;
            };

            let outcome = session.place_order(request.clone(), order_set_id).await;
            if let Err(error) = &outcome {
                tracing::warn!(
                    tenant = %tenant,
                    order_set_id = %order_set_id,
                    error = %error,
                    "order placement failed for tenant"
                );
            }
            results.push(PlacementResult {
                tenant: tenant.clone(),
                outcome,
            });
        }

        results
    }

    /// Abort every session. Used during process shutdown.
    pub async fn shutdown(&self) {
        let sessions: Vec<_> = {
            let mut map = self.sessions.lock().await;
            map.drain().collect()
        };
        for (tenant, session) in sessions {
            tracing::info!(tenant = %tenant, "shutting down session");
            session.abort_connections().await;
        }
    }
}
