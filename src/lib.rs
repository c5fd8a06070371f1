// Pool Workflow Library - liquidity pool creation orchestration
// This exposes the workflow, its adapter contracts and the ambient stack

pub mod adapters;
pub mod config;
pub mod telemetry;
pub mod workflows;

// Re-export key types for easy access
pub use adapters::{
    AdapterError, Operation, PoolAdapters, PoolLookup, SimulatedNetwork, SimulationProfile,
};
pub use self::config::{config, PoolWorkflowConfig};
pub use telemetry::{create_workflow_span, generate_correlation_id, init_telemetry};
pub use workflows::{
    transition, RetryPolicy, StepId, StepPhase, StepStatus, WorkflowCommand, WorkflowContext,
    WorkflowEvent, WorkflowHandle, WorkflowInputs, WorkflowOrchestrator, WorkflowSnapshot,
    WorkflowState, WorkflowStatus,
};
