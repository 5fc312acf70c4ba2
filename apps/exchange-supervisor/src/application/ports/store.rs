//! Durable Store Port (Driven Port)
//!
//! Simple upsert/delete interface over the durable order and user records.
//! All operations are idempotent; the supervisor retries them implicitly on
//! the next reconciliation tick rather than eagerly.

use async_trait::async_trait;

use crate::domain::{PendingOrder, TenantId};

/// Durable store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The store is unreachable or refused the operation.
    #[error("store unavailable: {message}")]
    Unavailable {
        /// Error details.
        message: String,
    },

    /// The record could not be encoded.
    #[error("serialization error: {message}")]
    Serialization {
        /// Error details.
        message: String,
    },
}

/// Port for durable order/user record storage.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert or update an order record, keyed by its `order_id`.
    async fn upsert_order(&self, order: &PendingOrder) -> Result<(), StoreError>;

    /// Delete a tenant's user record. Idempotent.
    async fn delete_user(&self, tenant: &TenantId) -> Result<(), StoreError>;

    /// Delete all of a tenant's order records. Idempotent.
    async fn delete_orders(&self, tenant: &TenantId) -> Result<(), StoreError>;
}
