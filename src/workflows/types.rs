// Core types for the pool creation workflow

use serde::{Deserialize, Serialize};
use std::fmt;

/// Workflow steps, declared in execution order.
///
/// The derived `Ord` follows declaration order, so a `BTreeMap<StepId, _>`
/// iterates steps in the order the workflow runs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StepId {
    #[serde(rename = "spawn-pool")]
    SpawnPool,
    #[serde(rename = "confirm-request")]
    ConfirmRequest,
    #[serde(rename = "resolve-pool-id")]
    ResolvePoolId,
    #[serde(rename = "verify-pool-ready")]
    VerifyPoolReady,
    #[serde(rename = "check-registration-status")]
    CheckRegistrationStatus,
    #[serde(rename = "register-with-index")]
    RegisterWithIndex,
    #[serde(rename = "provide-liquidity-A")]
    ProvideLiquidityA,
    #[serde(rename = "provide-liquidity-B")]
    ProvideLiquidityB,
    #[serde(rename = "verify-liquidity")]
    VerifyLiquidity,
}

impl StepId {
    pub const ALL: [StepId; 9] = [
        StepId::SpawnPool,
        StepId::ConfirmRequest,
        StepId::ResolvePoolId,
        StepId::VerifyPoolReady,
        StepId::CheckRegistrationStatus,
        StepId::RegisterWithIndex,
        StepId::ProvideLiquidityA,
        StepId::ProvideLiquidityB,
        StepId::VerifyLiquidity,
    ];

    /// Stable identifier used in snapshots and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            StepId::SpawnPool => "spawn-pool",
            StepId::ConfirmRequest => "confirm-request",
            StepId::ResolvePoolId => "resolve-pool-id",
            StepId::VerifyPoolReady => "verify-pool-ready",
            StepId::CheckRegistrationStatus => "check-registration-status",
            StepId::RegisterWithIndex => "register-with-index",
            StepId::ProvideLiquidityA => "provide-liquidity-A",
            StepId::ProvideLiquidityB => "provide-liquidity-B",
            StepId::VerifyLiquidity => "verify-liquidity",
        }
    }

    /// Human readable label shown by progress views
    pub fn label(&self) -> &'static str {
        match self {
            StepId::SpawnPool => "Spawn pool process",
            StepId::ConfirmRequest => "Confirm creation request",
            StepId::ResolvePoolId => "Resolve pool id",
            StepId::VerifyPoolReady => "Verify pool is live",
            StepId::CheckRegistrationStatus => "Check index registration",
            StepId::RegisterWithIndex => "Register with index",
            StepId::ProvideLiquidityA => "Provide liquidity (token A)",
            StepId::ProvideLiquidityB => "Provide liquidity (token B)",
            StepId::VerifyLiquidity => "Verify liquidity settled",
        }
    }

    /// How failures of this step are handled
    pub fn retry_class(&self) -> RetryClass {
        match self {
            StepId::ResolvePoolId | StepId::VerifyPoolReady | StepId::VerifyLiquidity => {
                RetryClass::SelfHealing
            }
            StepId::CheckRegistrationStatus => RetryClass::Bounded,
            StepId::SpawnPool
            | StepId::ConfirmRequest
            | StepId::RegisterWithIndex
            | StepId::ProvideLiquidityA
            | StepId::ProvideLiquidityB => RetryClass::Manual,
        }
    }

    /// Steps that only run when index registration was requested
    pub fn is_registration_step(&self) -> bool {
        matches!(
            self,
            StepId::CheckRegistrationStatus | StepId::RegisterWithIndex
        )
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StepId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepId::ALL
            .iter()
            .copied()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| format!("unknown workflow step: {s}"))
    }
}

/// Failure handling tier of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryClass {
    /// Expected to heal on its own; retried after a fixed delay
    SelfHealing,
    /// Retried after a fixed delay until the registration ceiling is hit
    Bounded,
    /// State-changing request; waits for an operator RETRY
    Manual,
}

/// Display status of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Current,
    Done,
    Failed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StepStatus::Pending => "pending",
            StepStatus::Current => "current",
            StepStatus::Done => "done",
            StepStatus::Failed => "failed",
        };
        f.write_str(text)
    }
}

/// Per-step record held in the workflow context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepState {
    pub enabled: bool,
    pub label: String,
    pub status: StepStatus,
    /// Value consumed by later steps (tracking id, pool id, status)
    pub result: Option<String>,
    /// Full adapter response or failure event, for display only
    pub raw: Option<serde_json::Value>,
    pub retries: u32,
}

impl StepState {
    pub fn new(step: StepId, enabled: bool) -> Self {
        Self {
            enabled,
            label: step.label().to_string(),
            status: StepStatus::Pending,
            result: None,
            raw: None,
            retries: 0,
        }
    }
}

/// Sub-state of the active step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPhase {
    /// Adapter call outstanding
    Run,
    /// Sleeping before an automatic retry
    Waiting,
    /// Terminal for now, accepts RETRY
    Failed,
}

/// Typed success output of a step, produced by the executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOutput {
    /// Idempotency hit: a usable pool already exists for the pair
    PoolExists { pool_id: String },
    CreationRequested { tracking_id: String },
    CreationConfirmed { tracking_id: String },
    PoolResolved { pool_id: String },
    PoolLive { token: String },
    RegistrationStatus { status: String },
    RegistrationSubmitted { tracking_id: String },
    TransferSubmitted { tracking_id: String },
    Settled { token: String },
}

impl StepOutput {
    /// The value stored as the step's `result`
    pub fn result_value(&self) -> &str {
        match self {
            StepOutput::PoolExists { pool_id } | StepOutput::PoolResolved { pool_id } => pool_id,
            StepOutput::CreationRequested { tracking_id }
            | StepOutput::CreationConfirmed { tracking_id }
            | StepOutput::RegistrationSubmitted { tracking_id }
            | StepOutput::TransferSubmitted { tracking_id } => tracking_id,
            StepOutput::PoolLive { token } | StepOutput::Settled { token } => token,
            StepOutput::RegistrationStatus { status } => status,
        }
    }
}

/// Read-only projection of a step for progress rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepView {
    pub id: StepId,
    pub label: String,
    pub status: StepStatus,
    pub result: Option<String>,
    pub enabled: bool,
    pub retries: u32,
}
