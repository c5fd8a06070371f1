// Pool creation workflow
//
// A pure state machine (`state_machine`) decides what happens next; the
// orchestrator performs the requested effects against the adapters and the
// handle exposes the running instance to its host.

pub mod context;
pub mod executor;
pub mod handle;
pub mod orchestrator;
pub mod policy;
pub mod state_machine;
pub mod types;

#[cfg(test)]
pub mod mocks;


pub use context::{InputError, RegistrationPayment, WorkflowContext, WorkflowInputs};
pub use handle::{is_settled, WorkflowError, WorkflowHandle};
pub use orchestrator::{StepTransitionRecord, WorkflowOrchestrator};
pub use policy::{RetryPolicy, REGISTRATION_COMPLETE};
pub use state_machine::{
    transition, Effect, StepFailure, StepRequest, Transfer, Transition, WorkflowCommand,
    WorkflowEvent, WorkflowSnapshot, WorkflowState, WorkflowStatus,
};
pub use types::{RetryClass, StepId, StepOutput, StepPhase, StepState, StepStatus, StepView};
