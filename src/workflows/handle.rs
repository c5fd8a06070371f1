// Host-owned workflow task
//
// The orchestrator runs in its own task. The host talks to it only through a
// command channel and reads progress from a watch channel. Dropping the handle
// aborts the task, which cancels any adapter call still in flight.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

use crate::adapters::PoolAdapters;
use crate::telemetry::create_workflow_span;
use crate::workflows::context::WorkflowInputs;
use crate::workflows::orchestrator::{perform_effect, WorkflowOrchestrator};
use crate::workflows::policy::RetryPolicy;
use crate::workflows::state_machine::{
    Effect, WorkflowCommand, WorkflowEvent, WorkflowSnapshot, WorkflowStatus,
};
use crate::workflows::types::StepPhase;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Workflow task has stopped")]
    Closed,
}

/// True once the workflow needs outside input or is finished
pub fn is_settled(snapshot: &WorkflowSnapshot) -> bool {
    match snapshot.status {
        WorkflowStatus::Running => snapshot.phase == Some(StepPhase::Failed),
        _ => true,
    }
}

pub struct WorkflowHandle {
    commands: mpsc::UnboundedSender<WorkflowCommand>,
    snapshots: watch::Receiver<WorkflowSnapshot>,
    task: JoinHandle<()>,
    correlation_id: String,
}

impl WorkflowHandle {
    /// Spawn a workflow instance on the current tokio runtime
    pub fn spawn<A>(adapters: Arc<A>, policy: RetryPolicy) -> Self
    where
        A: PoolAdapters + ?Sized + 'static,
    {
        let orchestrator = WorkflowOrchestrator::new(adapters, policy);
        let correlation_id = orchestrator.correlation_id().to_string();
        let (commands, receiver) = mpsc::unbounded_channel();
        let (publisher, snapshots) = watch::channel(orchestrator.snapshot());

        let span = create_workflow_span("pool-creation", &correlation_id);
        let task = tokio::spawn(run_workflow(orchestrator, receiver, publisher).instrument(span));

        Self {
            commands,
            snapshots,
            task,
            correlation_id,
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn dispatch(&self, command: WorkflowCommand) -> Result<(), WorkflowError> {
        self.commands.send(command).map_err(|_| WorkflowError::Closed)
    }

    pub fn start(&self, inputs: WorkflowInputs) -> Result<(), WorkflowError> {
        self.dispatch(WorkflowCommand::Start(inputs))
    }

    pub fn retry(&self) -> Result<(), WorkflowError> {
        self.dispatch(WorkflowCommand::Retry)
    }

    pub fn abandon(&self, reason: impl Into<String>) -> Result<(), WorkflowError> {
        self.dispatch(WorkflowCommand::Abandon {
            reason: reason.into(),
        })
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> WorkflowSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkflowSnapshot> {
        self.snapshots.clone()
    }

    /// Wait until a published snapshot satisfies `predicate`
    pub async fn wait_for(
        &mut self,
        predicate: impl FnMut(&WorkflowSnapshot) -> bool,
    ) -> Result<WorkflowSnapshot, WorkflowError> {
        self.snapshots
            .wait_for(predicate)
            .await
            .map(|snapshot| snapshot.clone())
            .map_err(|_| WorkflowError::Closed)
    }
}

impl Drop for WorkflowHandle {
    fn drop(&mut self) {
        if !self.task.is_finished() {
            debug!(correlation_id = %self.correlation_id, "Discarding workflow instance");
            self.task.abort();
        }
    }
}

async fn run_workflow<A>(
    mut orchestrator: WorkflowOrchestrator<A>,
    mut commands: mpsc::UnboundedReceiver<WorkflowCommand>,
    publisher: watch::Sender<WorkflowSnapshot>,
) where
    A: PoolAdapters + ?Sized,
{
    let mut effect = Effect::None;

    loop {
        let event = if effect == Effect::None {
            match commands.recv().await {
                Some(command) => WorkflowEvent::from(command),
                None => break,
            }
        } else {
            match next_event(&orchestrator, &effect, &mut commands).await {
                Some(event) => event,
                None => break,
            }
        };

        effect = orchestrator.apply(event);
        publisher.send_replace(orchestrator.snapshot());
    }

    info!(
        correlation_id = %orchestrator.correlation_id(),
        status = ?orchestrator.state().status(),
        "Workflow host went away, discarding instance"
    );
}

/// Wait for the pending effect while still listening for ABANDON
async fn next_event<A>(
    orchestrator: &WorkflowOrchestrator<A>,
    effect: &Effect,
    commands: &mut mpsc::UnboundedReceiver<WorkflowCommand>,
) -> Option<WorkflowEvent>
where
    A: PoolAdapters + ?Sized,
{
    let pending = perform_effect(orchestrator.adapters().as_ref(), effect);
    tokio::pin!(pending);

    loop {
        tokio::select! {
            event = &mut pending => return event,
            command = commands.recv() => match command {
                Some(WorkflowCommand::Abandon { reason }) => {
                    return Some(WorkflowEvent::Abandon { reason });
                }
                Some(other) => {
                    warn!(command = ?other, "Ignoring command while a step is in flight");
                }
                None => return None,
            },
        }
    }
}
