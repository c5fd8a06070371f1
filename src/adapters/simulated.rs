// In-memory message-passing network with eventual consistency
//
// Every lag counter models how many polls an operation answers "not yet"
// before the network catches up. Failures can be injected per operation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

use crate::adapters::errors::AdapterError;
use crate::adapters::traits::{PoolAdapters, PoolLookup};
use crate::workflows::policy::REGISTRATION_COMPLETE;

/// Pool id reported for a pair whose pool process has not resolved yet
pub const PENDING_MARKER: &str = "pending";

/// Status reported by the index until a registration completes
pub const REGISTRATION_PENDING: &str = "pending";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    CheckPoolExists,
    RequestPoolCreation,
    ConfirmCreationRequest,
    ResolvePoolId,
    VerifyPoolLive,
    GetRegistrationStatus,
    SubmitRegistrationPayment,
    TransferAssetIntoPool,
    ConfirmSettlement,
}

impl Operation {
    pub const ALL: [Operation; 9] = [
        Operation::CheckPoolExists,
        Operation::RequestPoolCreation,
        Operation::ConfirmCreationRequest,
        Operation::ResolvePoolId,
        Operation::VerifyPoolLive,
        Operation::GetRegistrationStatus,
        Operation::SubmitRegistrationPayment,
        Operation::TransferAssetIntoPool,
        Operation::ConfirmSettlement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CheckPoolExists => "check-pool-exists",
            Operation::RequestPoolCreation => "request-pool-creation",
            Operation::ConfirmCreationRequest => "confirm-creation-request",
            Operation::ResolvePoolId => "resolve-pool-id",
            Operation::VerifyPoolLive => "verify-pool-live",
            Operation::GetRegistrationStatus => "get-registration-status",
            Operation::SubmitRegistrationPayment => "submit-registration-payment",
            Operation::TransferAssetIntoPool => "transfer-asset-into-pool",
            Operation::ConfirmSettlement => "confirm-settlement",
        }
    }
}

impl std::str::FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| format!("unknown adapter operation: {s}"))
    }
}

/// How slowly the simulated network converges
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationProfile {
    /// Resolve lookups answered "not ready" after a pool is requested
    pub resolve_lag: u32,
    /// Liveness probes answered "not ready" after a pool resolves
    pub live_lag: u32,
    /// Settlement checks answered "not ready" per transfer
    pub settle_lag: u32,
    /// Registration polls answered "pending" per pool
    pub registration_lag: u32,
    /// Artificial latency of every call
    pub latency_ms: u64,
}

/// A call the network received, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterCall {
    pub operation: Operation,
    pub args: Vec<String>,
}

#[derive(Debug)]
struct PoolRecord {
    id: String,
    pending_resolves: u32,
    pending_probes: u32,
    pending_registration_polls: u32,
    registered: bool,
    balances: HashMap<String, u128>,
}

#[derive(Debug)]
enum MessageKind {
    Creation { token_a: String, token_b: String },
    Registration,
    Transfer { pool_id: String, token: String, amount: u128 },
}

#[derive(Debug)]
struct MessageRecord {
    seq: u64,
    kind: MessageKind,
    pending_confirms: u32,
    settled: bool,
}

#[derive(Debug, Default)]
struct NetworkState {
    pools: HashMap<(String, String), PoolRecord>,
    messages: HashMap<String, MessageRecord>,
    injected_failures: HashMap<Operation, u32>,
    calls: Vec<AdapterCall>,
    next_message: u64,
}

impl NetworkState {
    fn record(&mut self, operation: Operation, args: &[&str]) -> Result<(), AdapterError> {
        self.calls.push(AdapterCall {
            operation,
            args: args.iter().map(|a| a.to_string()).collect(),
        });

        if let Some(remaining) = self.injected_failures.get_mut(&operation) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(AdapterError::Transport(format!(
                    "injected failure for {}",
                    operation.as_str()
                )));
            }
        }
        Ok(())
    }

    fn next_message_id(&mut self) -> String {
        self.next_message += 1;
        format!("msg-{:04}", self.next_message)
    }

    fn post(&mut self, kind: MessageKind, pending_confirms: u32) -> String {
        let tracking_id = self.next_message_id();
        let settled = !matches!(kind, MessageKind::Transfer { .. });
        self.messages.insert(
            tracking_id.clone(),
            MessageRecord {
                seq: self.next_message,
                kind,
                pending_confirms,
                settled,
            },
        );
        tracking_id
    }

    /// Messages to one pool are processed in order, so settling a transfer
    /// settles every earlier transfer to the same pool. Nothing is credited
    /// when a balance would overflow.
    fn settle_transfers(&mut self, pool_id: &str, up_to: u64) -> Result<(), AdapterError> {
        let Some(pool) = self.pools.values_mut().find(|pool| pool.id == pool_id) else {
            return Ok(());
        };

        let mut balances = pool.balances.clone();
        let mut settled = Vec::new();
        for (tracking_id, message) in &self.messages {
            if message.settled || message.seq > up_to {
                continue;
            }
            if let MessageKind::Transfer { pool_id: target, token, amount } = &message.kind {
                if target != pool_id {
                    continue;
                }
                let balance = balances.entry(token.clone()).or_insert(0);
                *balance = balance.checked_add(*amount).ok_or_else(|| {
                    AdapterError::Rejected(format!("{token} balance of {pool_id} would overflow"))
                })?;
                settled.push(tracking_id.clone());
            }
        }

        pool.balances = balances;
        for tracking_id in settled {
            if let Some(message) = self.messages.get_mut(&tracking_id) {
                message.settled = true;
            }
        }
        Ok(())
    }

    fn pool_by_id(&mut self, pool_id: &str) -> Option<&mut PoolRecord> {
        self.pools.values_mut().find(|pool| pool.id == pool_id)
    }
}

/// Pools are keyed by the unordered token pair
fn pair_key(token_a: &str, token_b: &str) -> (String, String) {
    if token_a <= token_b {
        (token_a.to_string(), token_b.to_string())
    } else {
        (token_b.to_string(), token_a.to_string())
    }
}

fn parse_amount(amount: &str) -> Result<u128, AdapterError> {
    amount
        .parse::<u128>()
        .map_err(|_| AdapterError::Rejected(format!("invalid quantity {amount:?}")))
}

#[derive(Debug)]
pub struct SimulatedNetwork {
    profile: SimulationProfile,
    state: Mutex<NetworkState>,
}

impl Default for SimulatedNetwork {
    fn default() -> Self {
        Self::new(SimulationProfile::default())
    }
}

impl SimulatedNetwork {
    pub fn new(profile: SimulationProfile) -> Self {
        Self {
            profile,
            state: Mutex::new(NetworkState::default()),
        }
    }

    /// Seed a live pool for the pair and return its id
    pub fn with_existing_pool(self, token_a: &str, token_b: &str) -> (Self, String) {
        let pool_id = format!("pool-{}", uuid::Uuid::new_v4().simple());
        self.inspect().pools.insert(
            pair_key(token_a, token_b),
            PoolRecord {
                id: pool_id.clone(),
                pending_resolves: 0,
                pending_probes: 0,
                pending_registration_polls: self.profile.registration_lag,
                registered: false,
                balances: HashMap::new(),
            },
        );
        (self, pool_id)
    }

    /// Make the next `times` calls of `operation` fail with a transport error
    pub fn fail_next(&self, operation: Operation, times: u32) {
        *self.inspect().injected_failures.entry(operation).or_insert(0) += times;
    }

    pub fn calls(&self) -> Vec<AdapterCall> {
        self.inspect().calls.clone()
    }

    pub fn call_count(&self, operation: Operation) -> usize {
        self.inspect()
            .calls
            .iter()
            .filter(|call| call.operation == operation)
            .count()
    }

    /// Settled balance of `token` held by the pool
    pub fn balance(&self, pool_id: &str, token: &str) -> u128 {
        self.inspect()
            .pool_by_id(pool_id)
            .and_then(|pool| pool.balances.get(token).copied())
            .unwrap_or(0)
    }

    pub fn is_registered(&self, pool_id: &str) -> bool {
        self.inspect()
            .pool_by_id(pool_id)
            .is_some_and(|pool| pool.registered)
    }

    pub fn pool_count(&self) -> usize {
        self.inspect().pools.len()
    }

    // Inspection helpers keep working after a panicked holder poisoned the lock
    fn inspect(&self) -> MutexGuard<'_, NetworkState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn enter(
        &self,
        operation: Operation,
        args: &[&str],
    ) -> Result<MutexGuard<'_, NetworkState>, AdapterError> {
        if self.profile.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.profile.latency_ms)).await;
        }
        debug!(operation = ?operation, args = ?args, "Simulated network call");

        let mut state = self
            .state
            .lock()
            .map_err(|_| AdapterError::Transport("network state poisoned".to_string()))?;
        state.record(operation, args)?;
        Ok(state)
    }
}

#[async_trait]
impl PoolAdapters for SimulatedNetwork {
    async fn check_pool_exists(
        &self,
        token_a: &str,
        token_b: &str,
    ) -> Result<PoolLookup, AdapterError> {
        let state = self.enter(Operation::CheckPoolExists, &[token_a, token_b]).await?;

        let lookup = match state.pools.get(&pair_key(token_a, token_b)) {
            Some(pool) if pool.pending_resolves == 0 => PoolLookup {
                skip: true,
                pool_id: pool.id.clone(),
            },
            Some(_) => PoolLookup {
                skip: false,
                pool_id: PENDING_MARKER.to_string(),
            },
            None => PoolLookup {
                skip: false,
                pool_id: String::new(),
            },
        };
        Ok(lookup)
    }

    async fn request_pool_creation(
        &self,
        token_a: &str,
        token_b: &str,
    ) -> Result<String, AdapterError> {
        let mut state = self.enter(Operation::RequestPoolCreation, &[token_a, token_b]).await?;

        let profile = &self.profile;
        state
            .pools
            .entry(pair_key(token_a, token_b))
            .or_insert_with(|| PoolRecord {
                id: format!("pool-{}", uuid::Uuid::new_v4().simple()),
                pending_resolves: profile.resolve_lag,
                pending_probes: profile.live_lag,
                pending_registration_polls: profile.registration_lag,
                registered: false,
                balances: HashMap::new(),
            });

        Ok(state.post(
            MessageKind::Creation {
                token_a: token_a.to_string(),
                token_b: token_b.to_string(),
            },
            0,
        ))
    }

    async fn confirm_creation_request(
        &self,
        tracking_id: &str,
    ) -> Result<serde_json::Value, AdapterError> {
        let state = self.enter(Operation::ConfirmCreationRequest, &[tracking_id]).await?;

        match state.messages.get(tracking_id) {
            Some(MessageRecord {
                kind: MessageKind::Creation { token_a, token_b },
                ..
            }) => Ok(json!({
                "tracking_id": tracking_id,
                "action": "Spawn-Pool",
                "token_a": token_a,
                "token_b": token_b,
                "status": "accepted",
            })),
            Some(_) => Err(AdapterError::Rejected(format!(
                "{tracking_id} is not a pool creation request"
            ))),
            None => Err(AdapterError::Rejected(format!("unknown message {tracking_id}"))),
        }
    }

    async fn resolve_pool_id(&self, token_a: &str, token_b: &str) -> Result<String, AdapterError> {
        let mut state = self.enter(Operation::ResolvePoolId, &[token_a, token_b]).await?;

        let pool = state
            .pools
            .get_mut(&pair_key(token_a, token_b))
            .ok_or_else(|| AdapterError::NotReady(format!("no pool for {token_a}/{token_b}")))?;
        if pool.pending_resolves > 0 {
            pool.pending_resolves -= 1;
            return Err(AdapterError::NotReady(format!(
                "pool for {token_a}/{token_b} is still {PENDING_MARKER}"
            )));
        }
        Ok(pool.id.clone())
    }

    async fn verify_pool_live(&self, pool_id: &str) -> Result<String, AdapterError> {
        let mut state = self.enter(Operation::VerifyPoolLive, &[pool_id]).await?;

        let pool = state
            .pool_by_id(pool_id)
            .ok_or_else(|| AdapterError::NotReady(format!("process {pool_id} not found")))?;
        if pool.pending_probes > 0 {
            pool.pending_probes -= 1;
            return Err(AdapterError::NotReady(format!("process {pool_id} not answering yet")));
        }
        Ok(format!("pong:{pool_id}"))
    }

    async fn get_registration_status(&self, pool_id: &str) -> Result<String, AdapterError> {
        let mut state = self.enter(Operation::GetRegistrationStatus, &[pool_id]).await?;

        let pool = state
            .pool_by_id(pool_id)
            .ok_or_else(|| AdapterError::Rejected(format!("index does not know {pool_id}")))?;
        if pool.pending_registration_polls > 0 {
            pool.pending_registration_polls -= 1;
            return Ok(REGISTRATION_PENDING.to_string());
        }
        Ok(REGISTRATION_COMPLETE.to_string())
    }

    async fn submit_registration_payment(
        &self,
        pool_id: &str,
        token: &str,
        amount: &str,
    ) -> Result<String, AdapterError> {
        let mut state = self
            .enter(Operation::SubmitRegistrationPayment, &[pool_id, token, amount])
            .await?;

        parse_amount(amount)?;
        let pool = state
            .pool_by_id(pool_id)
            .ok_or_else(|| {
                AdapterError::Rejected(format!("cannot register unknown pool {pool_id}"))
            })?;
        pool.registered = true;

        Ok(state.post(MessageKind::Registration, 0))
    }

    async fn transfer_asset_into_pool(
        &self,
        pool_id: &str,
        token: &str,
        amount: &str,
    ) -> Result<String, AdapterError> {
        let mut state = self
            .enter(Operation::TransferAssetIntoPool, &[pool_id, token, amount])
            .await?;

        let amount = parse_amount(amount)?;
        if state.pool_by_id(pool_id).is_none() {
            return Err(AdapterError::Rejected(format!("cannot fund unknown pool {pool_id}")));
        }

        Ok(state.post(
            MessageKind::Transfer {
                pool_id: pool_id.to_string(),
                token: token.to_string(),
                amount,
            },
            self.profile.settle_lag,
        ))
    }

    async fn confirm_settlement(&self, tracking_id: &str) -> Result<String, AdapterError> {
        let mut state = self.enter(Operation::ConfirmSettlement, &[tracking_id]).await?;

        let message = state
            .messages
            .get_mut(tracking_id)
            .ok_or_else(|| AdapterError::NotReady(format!("{tracking_id} not seen yet")))?;
        if message.pending_confirms > 0 {
            message.pending_confirms -= 1;
            return Err(AdapterError::NotReady(format!("{tracking_id} not settled yet")));
        }

        let transfer = match &message.kind {
            MessageKind::Transfer { pool_id, .. } => Some((pool_id.clone(), message.seq)),
            _ => None,
        };
        if let Some((pool_id, seq)) = transfer {
            state.settle_transfers(&pool_id, seq)?;
        }
        Ok(format!("settled:{tracking_id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_existing_pool_is_reported_for_either_order() {
        let (network, pool_id) = SimulatedNetwork::default().with_existing_pool("X", "Y");

        let lookup = network.check_pool_exists("Y", "X").await.unwrap();
        assert!(lookup.skip);
        assert_eq!(lookup.pool_id, pool_id);
    }

    #[tokio::test]
    async fn test_pending_pool_is_not_skipped() {
        let network = SimulatedNetwork::new(SimulationProfile {
            resolve_lag: 2,
            ..Default::default()
        });
        network.request_pool_creation("X", "Y").await.unwrap();

        let lookup = network.check_pool_exists("X", "Y").await.unwrap();
        assert!(!lookup.skip);
        assert_eq!(lookup.pool_id, PENDING_MARKER);

        assert!(matches!(
            network.resolve_pool_id("X", "Y").await,
            Err(AdapterError::NotReady(_))
        ));
        assert!(network.resolve_pool_id("X", "Y").await.is_err());
        assert!(network.resolve_pool_id("X", "Y").await.is_ok());
    }

    #[tokio::test]
    async fn test_transfers_credit_on_settlement() {
        let network = SimulatedNetwork::new(SimulationProfile {
            settle_lag: 1,
            ..Default::default()
        });
        let (network, pool_id) = network.with_existing_pool("X", "Y");

        let tx = network.transfer_asset_into_pool(&pool_id, "X", "100").await.unwrap();
        assert_eq!(network.balance(&pool_id, "X"), 0);
        assert!(network.confirm_settlement(&tx).await.is_err());
        assert_eq!(network.confirm_settlement(&tx).await.unwrap(), format!("settled:{tx}"));
        assert_eq!(network.balance(&pool_id, "X"), 100);

        // Confirming twice does not credit twice
        network.confirm_settlement(&tx).await.unwrap();
        assert_eq!(network.balance(&pool_id, "X"), 100);
    }

    #[tokio::test]
    async fn test_settling_a_transfer_settles_earlier_ones() {
        let (network, pool_id) = SimulatedNetwork::default().with_existing_pool("X", "Y");

        network.transfer_asset_into_pool(&pool_id, "X", "100").await.unwrap();
        let last = network.transfer_asset_into_pool(&pool_id, "Y", "250").await.unwrap();
        network.confirm_settlement(&last).await.unwrap();

        assert_eq!(network.balance(&pool_id, "X"), 100);
        assert_eq!(network.balance(&pool_id, "Y"), 250);
    }

    #[tokio::test]
    async fn test_balance_overflow_is_rejected_without_poisoning() {
        let (network, pool_id) = SimulatedNetwork::default().with_existing_pool("X", "Y");
        let half = (u128::MAX / 2 + 1).to_string();

        network.transfer_asset_into_pool(&pool_id, "X", &half).await.unwrap();
        let second = network.transfer_asset_into_pool(&pool_id, "X", &half).await.unwrap();

        assert!(matches!(
            network.confirm_settlement(&second).await,
            Err(AdapterError::Rejected(_))
        ));
        assert_eq!(network.balance(&pool_id, "X"), 0);

        // The network keeps answering after the rejected settlement
        let (network, other) = network.with_existing_pool("A", "B");
        let small = network.transfer_asset_into_pool(&other, "A", "5").await.unwrap();
        network.confirm_settlement(&small).await.unwrap();
        assert_eq!(network.balance(&other, "A"), 5);
    }

    #[test]
    fn test_operation_names_parse() {
        for op in Operation::ALL {
            assert_eq!(op.as_str().parse::<Operation>().unwrap(), op);
        }
        assert!("spawn".parse::<Operation>().is_err());
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let network = SimulatedNetwork::default();
        network.fail_next(Operation::RequestPoolCreation, 1);

        assert!(matches!(
            network.request_pool_creation("X", "Y").await,
            Err(AdapterError::Transport(_))
        ));
        assert!(network.request_pool_creation("X", "Y").await.is_ok());
        assert_eq!(network.call_count(Operation::RequestPoolCreation), 2);
        assert_eq!(network.pool_count(), 1);
    }

    #[tokio::test]
    async fn test_registration_status_and_payment() {
        let network = SimulatedNetwork::new(SimulationProfile {
            registration_lag: 1,
            ..Default::default()
        });
        let (network, pool_id) = network.with_existing_pool("X", "Y");

        assert_eq!(network.get_registration_status(&pool_id).await.unwrap(), REGISTRATION_PENDING);
        assert_eq!(network.get_registration_status(&pool_id).await.unwrap(), REGISTRATION_COMPLETE);

        assert!(network.submit_registration_payment(&pool_id, "PAY", "x").await.is_err());
        network.submit_registration_payment(&pool_id, "PAY", "5").await.unwrap();
        assert!(network.is_registered(&pool_id));
    }
}
