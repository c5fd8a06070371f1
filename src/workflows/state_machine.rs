// Pool creation state machine
//
// `transition` is a pure function: it takes the current state and an event and
// returns the replacement state plus the effect the orchestrator must perform
// next. Nothing here touches the network or the clock.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::workflows::context::{RegistrationPayment, WorkflowContext, WorkflowInputs};
use crate::workflows::policy::RetryPolicy;
use crate::workflows::types::{RetryClass, StepId, StepOutput, StepPhase, StepStatus, StepView};

/// Top-level workflow state; the context lives inside the variants that have one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkflowState {
    Idle,
    Running {
        step: StepId,
        phase: StepPhase,
        context: WorkflowContext,
    },
    Completed {
        context: WorkflowContext,
    },
    Failed {
        context: WorkflowContext,
    },
}

/// Commands a host may dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowCommand {
    Start(WorkflowInputs),
    /// Re-run the active step; only applies while it sits in `failed`
    Retry,
    /// Give up on the run and move to the global `failed` state
    Abandon { reason: String },
}

/// Adapter failure as seen by the state machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailure {
    pub message: String,
    pub raw: serde_json::Value,
}

/// Everything that can move the machine: host commands plus effect completions
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    Start(WorkflowInputs),
    Retry,
    Abandon {
        reason: String,
    },
    StepSucceeded {
        step: StepId,
        output: StepOutput,
        raw: serde_json::Value,
    },
    StepFailed {
        step: StepId,
        failure: StepFailure,
    },
    DelayElapsed {
        step: StepId,
    },
}

impl From<WorkflowCommand> for WorkflowEvent {
    fn from(command: WorkflowCommand) -> Self {
        match command {
            WorkflowCommand::Start(inputs) => WorkflowEvent::Start(inputs),
            WorkflowCommand::Retry => WorkflowEvent::Retry,
            WorkflowCommand::Abandon { reason } => WorkflowEvent::Abandon { reason },
        }
    }
}

/// Token transfer into the pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub pool_id: String,
    pub token: String,
    pub amount: String,
}

/// Inputs of one step invocation, sliced out of the context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepRequest {
    SpawnPool { token_a: String, token_b: String },
    ConfirmRequest { tracking_id: String },
    ResolvePoolId { token_a: String, token_b: String },
    VerifyPoolReady { pool_id: String },
    CheckRegistrationStatus { pool_id: String },
    RegisterWithIndex { pool_id: String, payment: RegistrationPayment },
    ProvideLiquidityA(Transfer),
    ProvideLiquidityB(Transfer),
    VerifyLiquidity { tracking_id: String },
}

impl StepRequest {
    pub fn step(&self) -> StepId {
        match self {
            StepRequest::SpawnPool { .. } => StepId::SpawnPool,
            StepRequest::ConfirmRequest { .. } => StepId::ConfirmRequest,
            StepRequest::ResolvePoolId { .. } => StepId::ResolvePoolId,
            StepRequest::VerifyPoolReady { .. } => StepId::VerifyPoolReady,
            StepRequest::CheckRegistrationStatus { .. } => StepId::CheckRegistrationStatus,
            StepRequest::RegisterWithIndex { .. } => StepId::RegisterWithIndex,
            StepRequest::ProvideLiquidityA(_) => StepId::ProvideLiquidityA,
            StepRequest::ProvideLiquidityB(_) => StepId::ProvideLiquidityB,
            StepRequest::VerifyLiquidity { .. } => StepId::VerifyLiquidity,
        }
    }
}

/// Work the orchestrator performs after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    None,
    Invoke(StepRequest),
    Wait { step: StepId, delay: Duration },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: WorkflowState,
    pub effect: Effect,
    /// False when the event does not apply to the current state
    pub applied: bool,
}

impl Transition {
    fn to(state: WorkflowState, effect: Effect) -> Self {
        Self {
            state,
            effect,
            applied: true,
        }
    }

    fn ignored(state: &WorkflowState) -> Self {
        Self {
            state: state.clone(),
            effect: Effect::None,
            applied: false,
        }
    }
}

/// Compute the next state for `event`
pub fn transition(
    state: &WorkflowState,
    event: &WorkflowEvent,
    policy: &RetryPolicy,
) -> Transition {
    match (state, event) {
        (WorkflowState::Idle, WorkflowEvent::Start(inputs)) => {
            enter_run(WorkflowContext::new(inputs.clone()), StepId::SpawnPool)
        }

        (
            WorkflowState::Running { step, phase: StepPhase::Run, context },
            WorkflowEvent::StepSucceeded { step: finished, output, raw },
        ) if step == finished => on_success(context.clone(), *step, output, raw, policy),

        (
            WorkflowState::Running { step, phase: StepPhase::Run, context },
            WorkflowEvent::StepFailed { step: failed, failure },
        ) if step == failed => on_failure(context.clone(), *step, failure.clone(), policy),

        (
            WorkflowState::Running { step, phase: StepPhase::Waiting, context },
            WorkflowEvent::DelayElapsed { step: waited },
        ) if step == waited => rerun(context.clone(), *step),

        (
            WorkflowState::Running { step, phase: StepPhase::Failed, context },
            WorkflowEvent::Retry,
        ) => {
            let context = context.clone().with_step(*step, |s| s.result = None);
            rerun(context, *step)
        }

        (WorkflowState::Running { step, context, .. }, WorkflowEvent::Abandon { reason }) => {
            fail_workflow(context.clone(), *step, reason)
        }

        _ => Transition::ignored(state),
    }
}

/// Entry action of a step's `run` sub-state: mark it current and request the adapter call
fn enter_run(context: WorkflowContext, step: StepId) -> Transition {
    let request = match build_request(&context, step) {
        Ok(request) => request,
        Err(message) => return fail_workflow(context, step, &message),
    };

    let context = context.with_step(step, |s| s.status = StepStatus::Current);
    Transition::to(
        WorkflowState::Running {
            step,
            phase: StepPhase::Run,
            context,
        },
        Effect::Invoke(request),
    )
}

fn rerun(context: WorkflowContext, step: StepId) -> Transition {
    let context = context.with_step(step, |s| s.retries = s.retries.saturating_add(1));
    enter_run(context, step)
}

fn build_request(context: &WorkflowContext, step: StepId) -> Result<StepRequest, String> {
    let inputs = &context.inputs;
    let pool_id = || {
        context
            .amm_process_id
            .clone()
            .ok_or_else(|| format!("{step} needs a pool id but none has been resolved"))
    };
    let result_of = |source: StepId| {
        context
            .result(source)
            .map(str::to_string)
            .ok_or_else(|| format!("{step} needs the result of {source}"))
    };

    let request = match step {
        StepId::SpawnPool => StepRequest::SpawnPool {
            token_a: inputs.token_a.clone(),
            token_b: inputs.token_b.clone(),
        },
        StepId::ConfirmRequest => StepRequest::ConfirmRequest {
            tracking_id: result_of(StepId::SpawnPool)?,
        },
        StepId::ResolvePoolId => StepRequest::ResolvePoolId {
            token_a: inputs.token_a.clone(),
            token_b: inputs.token_b.clone(),
        },
        StepId::VerifyPoolReady => StepRequest::VerifyPoolReady { pool_id: pool_id()? },
        StepId::CheckRegistrationStatus => {
            StepRequest::CheckRegistrationStatus { pool_id: pool_id()? }
        }
        StepId::RegisterWithIndex => StepRequest::RegisterWithIndex {
            pool_id: pool_id()?,
            payment: inputs
                .registration
                .clone()
                .ok_or_else(|| format!("{step} needs a registration payment"))?,
        },
        StepId::ProvideLiquidityA => StepRequest::ProvideLiquidityA(Transfer {
            pool_id: pool_id()?,
            token: inputs.token_a.clone(),
            amount: inputs.amount_a.clone(),
        }),
        StepId::ProvideLiquidityB => StepRequest::ProvideLiquidityB(Transfer {
            pool_id: pool_id()?,
            token: inputs.token_b.clone(),
            amount: inputs.amount_b.clone(),
        }),
        StepId::VerifyLiquidity => StepRequest::VerifyLiquidity {
            tracking_id: result_of(StepId::ProvideLiquidityB)?,
        },
    };
    Ok(request)
}

fn on_success(
    context: WorkflowContext,
    step: StepId,
    output: &StepOutput,
    raw: &serde_json::Value,
    policy: &RetryPolicy,
) -> Transition {
    let result = output.result_value().to_string();

    let context = match output {
        StepOutput::PoolExists { pool_id } => {
            // Idempotency hit: the creation steps are satisfied by the existing pool
            let mut context = context.with_pool_id(pool_id);
            for skipped in [StepId::ConfirmRequest, StepId::ResolvePoolId] {
                context = context.with_step(skipped, |s| {
                    s.status = StepStatus::Done;
                    s.enabled = false;
                    s.result = Some(pool_id.clone());
                });
            }
            context
        }
        StepOutput::PoolResolved { pool_id } => context.with_pool_id(pool_id),
        StepOutput::RegistrationStatus { status } if !policy.is_registration_complete(status) => {
            let context = context.with_step(step, |s| s.result = Some(result.clone()));
            let failure = StepFailure {
                message: format!("registration status is {status}"),
                raw: raw.clone(),
            };
            return on_failure(context, step, failure, policy);
        }
        _ => context,
    };

    let context = context.with_step(step, |s| {
        s.status = StepStatus::Done;
        s.result = Some(result);
        s.raw = Some(raw.clone());
    });

    match context.next_step_after(step) {
        Some(next) => enter_run(context, next),
        None => Transition::to(WorkflowState::Completed { context }, Effect::None),
    }
}

fn on_failure(
    context: WorkflowContext,
    step: StepId,
    failure: StepFailure,
    policy: &RetryPolicy,
) -> Transition {
    let retries = context.step(step).retries;
    let retry_allowed = match step.retry_class() {
        RetryClass::SelfHealing => policy.self_heal_allows(retries),
        RetryClass::Bounded => policy.registration_allows(retries),
        RetryClass::Manual => false,
    };

    if retry_allowed {
        let context = context.with_step(step, |s| s.raw = Some(failure.raw));
        return Transition::to(
            WorkflowState::Running {
                step,
                phase: StepPhase::Waiting,
                context,
            },
            Effect::Wait {
                step,
                delay: policy.retry_delay,
            },
        );
    }

    let context = context
        .with_step(step, |s| {
            s.status = StepStatus::Failed;
            s.result = Some(failure.message.clone());
            s.raw = Some(failure.raw);
        })
        .with_error(failure.message);

    Transition::to(
        WorkflowState::Running {
            step,
            phase: StepPhase::Failed,
            context,
        },
        Effect::None,
    )
}

fn fail_workflow(context: WorkflowContext, step: StepId, message: &str) -> Transition {
    let context = context
        .with_step(step, |s| {
            s.status = StepStatus::Failed;
            s.result = Some(message.to_string());
        })
        .with_error(message);
    Transition::to(WorkflowState::Failed { context }, Effect::None)
}

/// Coarse lifecycle of a workflow instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Idle,
    Running,
    Completed,
    Failed,
}

/// Read-only view handed to hosts for progress rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    pub status: WorkflowStatus,
    pub active_step: Option<StepId>,
    pub phase: Option<StepPhase>,
    pub steps: Vec<StepView>,
    pub amm_process_id: Option<String>,
    pub error: Option<String>,
}

impl WorkflowState {
    pub fn status(&self) -> WorkflowStatus {
        match self {
            WorkflowState::Idle => WorkflowStatus::Idle,
            WorkflowState::Running { .. } => WorkflowStatus::Running,
            WorkflowState::Completed { .. } => WorkflowStatus::Completed,
            WorkflowState::Failed { .. } => WorkflowStatus::Failed,
        }
    }

    pub fn context(&self) -> Option<&WorkflowContext> {
        match self {
            WorkflowState::Idle => None,
            WorkflowState::Running { context, .. }
            | WorkflowState::Completed { context }
            | WorkflowState::Failed { context } => Some(context),
        }
    }

    pub fn active_step(&self) -> Option<(StepId, StepPhase)> {
        match self {
            WorkflowState::Running { step, phase, .. } => Some((*step, *phase)),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        let context = self.context();
        let active = self.active_step();
        WorkflowSnapshot {
            status: self.status(),
            active_step: active.map(|(step, _)| step),
            phase: active.map(|(_, phase)| phase),
            steps: context.map(WorkflowContext::views).unwrap_or_default(),
            amm_process_id: context.and_then(|c| c.amm_process_id.clone()),
            error: context.and_then(|c| c.error.clone()),
        }
    }
}
