// Workflow orchestrator: performs the effects requested by the state machine
//
// The orchestrator owns the only copy of the workflow state. Hosts dispatch
// commands and read snapshots; adapter results are fed back as events. No
// adapter error ever escapes this type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn, Instrument};

use crate::adapters::PoolAdapters;
use crate::telemetry::{create_workflow_span, generate_correlation_id};
use crate::workflows::executor::execute_step;
use crate::workflows::policy::RetryPolicy;
use crate::workflows::state_machine::{
    transition, Effect, StepRequest, WorkflowCommand, WorkflowEvent, WorkflowSnapshot,
    WorkflowState, WorkflowStatus,
};
use crate::workflows::types::{StepId, StepPhase};

/// One applied state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepTransitionRecord {
    pub from_status: WorkflowStatus,
    pub from_step: Option<(StepId, StepPhase)>,
    pub to_status: WorkflowStatus,
    pub to_step: Option<(StepId, StepPhase)>,
    pub event: String,
    pub timestamp: DateTime<Utc>,
    /// Time spent in the previous state
    pub duration_ms: u64,
}

pub(crate) fn event_name(event: &WorkflowEvent) -> &'static str {
    match event {
        WorkflowEvent::Start(_) => "START",
        WorkflowEvent::Retry => "RETRY",
        WorkflowEvent::Abandon { .. } => "ABANDON",
        WorkflowEvent::StepSucceeded { .. } => "STEP_SUCCEEDED",
        WorkflowEvent::StepFailed { .. } => "STEP_FAILED",
        WorkflowEvent::DelayElapsed { .. } => "DELAY_ELAPSED",
    }
}

/// Perform a single effect and return the event it produces
pub async fn perform_effect<A>(adapters: &A, effect: &Effect) -> Option<WorkflowEvent>
where
    A: PoolAdapters + ?Sized,
{
    match effect {
        Effect::None => None,
        Effect::Invoke(request) => Some(execute_step(adapters, request).await),
        Effect::Wait { step, delay } => {
            tokio::time::sleep(*delay).await;
            Some(WorkflowEvent::DelayElapsed { step: *step })
        }
    }
}

pub struct WorkflowOrchestrator<A: PoolAdapters + ?Sized> {
    adapters: Arc<A>,
    policy: RetryPolicy,
    state: WorkflowState,
    history: Vec<StepTransitionRecord>,
    invocations: Vec<StepRequest>,
    correlation_id: String,
    entered_at: Instant,
}

impl<A: PoolAdapters + ?Sized> std::fmt::Debug for WorkflowOrchestrator<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowOrchestrator")
            .field("policy", &self.policy)
            .field("state", &self.state)
            .field("history_len", &self.history.len())
            .field("correlation_id", &self.correlation_id)
            .finish()
    }
}

impl<A: PoolAdapters + ?Sized> WorkflowOrchestrator<A> {
    pub fn new(adapters: Arc<A>, policy: RetryPolicy) -> Self {
        Self {
            adapters,
            policy,
            state: WorkflowState::Idle,
            history: Vec::new(),
            invocations: Vec::new(),
            correlation_id: generate_correlation_id(),
            entered_at: Instant::now(),
        }
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        self.state.snapshot()
    }

    pub fn history(&self) -> &[StepTransitionRecord] {
        &self.history
    }

    /// Step requests handed to adapters so far, in order
    pub fn invocations(&self) -> &[StepRequest] {
        &self.invocations
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn adapters(&self) -> &Arc<A> {
        &self.adapters
    }

    /// Apply one event and return the effect to perform next
    pub fn apply(&mut self, event: WorkflowEvent) -> Effect {
        let outcome = transition(&self.state, &event, &self.policy);
        if !outcome.applied {
            warn!(
                event = event_name(&event),
                status = ?self.state.status(),
                active_step = ?self.state.active_step(),
                "Ignoring event that does not apply to the current workflow state"
            );
            return Effect::None;
        }

        let record = StepTransitionRecord {
            from_status: self.state.status(),
            from_step: self.state.active_step(),
            to_status: outcome.state.status(),
            to_step: outcome.state.active_step(),
            event: event_name(&event).to_string(),
            timestamp: Utc::now(),
            duration_ms: self.entered_at.elapsed().as_millis() as u64,
        };
        self.log_transition(&record, &outcome.state);

        self.history.push(record);
        self.state = outcome.state;
        self.entered_at = Instant::now();
        if let Effect::Invoke(request) = &outcome.effect {
            self.invocations.push(request.clone());
        }
        outcome.effect
    }

    fn log_transition(&self, record: &StepTransitionRecord, next: &WorkflowState) {
        info!(
            correlation_id = %self.correlation_id,
            event = %record.event,
            from_step = ?record.from_step,
            to_step = ?record.to_step,
            duration_ms = record.duration_ms,
            "Pool workflow transition"
        );

        match next {
            WorkflowState::Running { step, phase: StepPhase::Failed, context } => {
                error!(
                    step = %step,
                    error = ?context.error,
                    "Workflow step failed, waiting for RETRY"
                );
            }
            WorkflowState::Running { step, phase: StepPhase::Waiting, context } => {
                warn!(
                    step = %step,
                    retries = context.step(*step).retries,
                    delay_ms = self.policy.retry_delay.as_millis() as u64,
                    "Workflow step not ready, retrying after delay"
                );
            }
            WorkflowState::Completed { context } => {
                info!(pool_id = ?context.amm_process_id, "Pool workflow completed");
            }
            WorkflowState::Failed { context } => {
                error!(error = ?context.error, "Pool workflow failed");
            }
            _ => {}
        }
    }

    /// Perform effects until the workflow needs outside input
    pub async fn drive(&mut self, mut effect: Effect) {
        while let Some(event) = perform_effect(self.adapters.as_ref(), &effect).await {
            effect = self.apply(event);
        }
    }

    /// Dispatch a host command and run the workflow until it settles:
    /// completed, failed, or a step waiting for RETRY.
    pub async fn dispatch(&mut self, command: WorkflowCommand) -> WorkflowSnapshot {
        let span = create_workflow_span("pool-creation", &self.correlation_id);
        let effect = self.apply(command.into());
        self.drive(effect).instrument(span).await;
        self.snapshot()
    }
}
