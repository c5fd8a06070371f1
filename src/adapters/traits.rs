// Remote operation contracts the workflow depends on

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::adapters::errors::AdapterError;

/// Result of the idempotency check for a token pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolLookup {
    /// True when a usable (non-pending) pool already exists
    pub skip: bool,
    pub pool_id: String,
}

/// One unit of remote work per method.
///
/// Implementations talk to the message-passing network. Errors are returned,
/// never panicked; the orchestrator decides whether an error is retried.
#[async_trait]
pub trait PoolAdapters: Send + Sync {
    /// Check whether a pool for the pair already exists
    async fn check_pool_exists(
        &self,
        token_a: &str,
        token_b: &str,
    ) -> Result<PoolLookup, AdapterError>;

    /// Ask the factory to spawn a pool; returns the request's tracking id
    async fn request_pool_creation(
        &self,
        token_a: &str,
        token_b: &str,
    ) -> Result<String, AdapterError>;

    /// Fetch the outcome of a creation request
    async fn confirm_creation_request(
        &self,
        tracking_id: &str,
    ) -> Result<serde_json::Value, AdapterError>;

    /// Look up the pool id for the pair
    async fn resolve_pool_id(&self, token_a: &str, token_b: &str) -> Result<String, AdapterError>;

    /// Probe the pool process for liveness
    async fn verify_pool_live(&self, pool_id: &str) -> Result<String, AdapterError>;

    /// Registration status of the pool with the indexing service
    async fn get_registration_status(&self, pool_id: &str) -> Result<String, AdapterError>;

    /// Pay for index registration of the pool
    async fn submit_registration_payment(
        &self,
        pool_id: &str,
        token: &str,
        amount: &str,
    ) -> Result<String, AdapterError>;

    /// Transfer `amount` of `token` into the pool
    async fn transfer_asset_into_pool(
        &self,
        pool_id: &str,
        token: &str,
        amount: &str,
    ) -> Result<String, AdapterError>;

    /// Confirm that a submitted transfer settled
    async fn confirm_settlement(&self, tracking_id: &str) -> Result<String, AdapterError>;
}
