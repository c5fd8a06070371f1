// End-to-end workflow scenarios against the simulated network
// Timers run on a paused tokio clock so retry delays cost nothing

use pool_workflow::adapters::{Operation, SimulatedNetwork, SimulationProfile};
use pool_workflow::workflows::{
    is_settled, RetryPolicy, StepId, StepPhase, StepStatus, WorkflowCommand, WorkflowHandle,
    WorkflowInputs, WorkflowOrchestrator, WorkflowSnapshot, WorkflowStatus,
};
use std::sync::Arc;
use std::time::Duration;

fn policy() -> RetryPolicy {
    RetryPolicy::default().with_retry_delay(Duration::from_millis(250))
}

fn inputs() -> WorkflowInputs {
    WorkflowInputs::new("AO", "WAR", "1000", "2500").unwrap()
}

fn step_of(snapshot: &WorkflowSnapshot, id: StepId) -> &pool_workflow::workflows::StepView {
    snapshot.steps.iter().find(|s| s.id == id).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_fresh_pool_converges_through_lag() {
    let network = Arc::new(SimulatedNetwork::new(SimulationProfile {
        resolve_lag: 2,
        live_lag: 1,
        settle_lag: 3,
        ..Default::default()
    }));
    let mut workflow = WorkflowOrchestrator::new(Arc::clone(&network), policy());

    let snapshot = workflow.dispatch(WorkflowCommand::Start(inputs())).await;

    assert_eq!(snapshot.status, WorkflowStatus::Completed);
    assert_eq!(step_of(&snapshot, StepId::ResolvePoolId).retries, 2);
    assert_eq!(step_of(&snapshot, StepId::VerifyPoolReady).retries, 1);
    assert_eq!(step_of(&snapshot, StepId::VerifyLiquidity).retries, 3);

    let pool_id = snapshot.amm_process_id.clone().unwrap();
    assert_eq!(network.balance(&pool_id, "AO"), 1000);
    assert_eq!(network.balance(&pool_id, "WAR"), 2500);
    assert_eq!(network.call_count(Operation::RequestPoolCreation), 1);
}

#[tokio::test(start_paused = true)]
async fn test_existing_pool_skips_creation() {
    let (network, pool_id) = SimulatedNetwork::default().with_existing_pool("WAR", "AO");
    let network = Arc::new(network);
    let mut workflow = WorkflowOrchestrator::new(Arc::clone(&network), policy());

    let snapshot = workflow.dispatch(WorkflowCommand::Start(inputs())).await;

    assert_eq!(snapshot.status, WorkflowStatus::Completed);
    assert_eq!(snapshot.amm_process_id.as_deref(), Some(pool_id.as_str()));
    assert_eq!(workflow.invocations().len(), 5);
    assert_eq!(network.call_count(Operation::RequestPoolCreation), 0);
    assert_eq!(network.call_count(Operation::ResolvePoolId), 0);

    for id in [StepId::ConfirmRequest, StepId::ResolvePoolId] {
        let step = step_of(&snapshot, id);
        assert_eq!(step.status, StepStatus::Done);
        assert!(!step.enabled);
    }
}

#[tokio::test(start_paused = true)]
async fn test_replaying_a_run_reuses_the_pool() {
    let network = Arc::new(SimulatedNetwork::default());

    let mut first = WorkflowOrchestrator::new(Arc::clone(&network), policy());
    let first = first.dispatch(WorkflowCommand::Start(inputs())).await;
    let mut second = WorkflowOrchestrator::new(Arc::clone(&network), policy());
    let second = second.dispatch(WorkflowCommand::Start(inputs())).await;

    assert_eq!(first.status, WorkflowStatus::Completed);
    assert_eq!(second.status, WorkflowStatus::Completed);
    assert_eq!(first.amm_process_id, second.amm_process_id);
    assert_eq!(network.pool_count(), 1);
    assert_eq!(network.call_count(Operation::RequestPoolCreation), 1);

    let pool_id = second.amm_process_id.unwrap();
    assert_eq!(network.balance(&pool_id, "AO"), 2000);
}

#[tokio::test(start_paused = true)]
async fn test_registration_polls_until_complete() {
    let network = Arc::new(SimulatedNetwork::new(SimulationProfile {
        registration_lag: 2,
        ..Default::default()
    }));
    let mut workflow = WorkflowOrchestrator::new(Arc::clone(&network), policy());
    let inputs = inputs().with_registration("WAR", "10").unwrap();

    let snapshot = workflow.dispatch(WorkflowCommand::Start(inputs)).await;

    assert_eq!(snapshot.status, WorkflowStatus::Completed);
    assert_eq!(network.call_count(Operation::GetRegistrationStatus), 3);
    assert_eq!(step_of(&snapshot, StepId::CheckRegistrationStatus).retries, 2);
    assert!(network.is_registered(snapshot.amm_process_id.as_deref().unwrap()));
}

#[tokio::test(start_paused = true)]
async fn test_registration_gives_up_after_ceiling() {
    let network = Arc::new(SimulatedNetwork::new(SimulationProfile {
        registration_lag: 100,
        ..Default::default()
    }));
    let mut workflow =
        WorkflowOrchestrator::new(Arc::clone(&network), policy().with_registration_ceiling(2));
    let inputs = inputs().with_registration("WAR", "10").unwrap();

    let snapshot = workflow.dispatch(WorkflowCommand::Start(inputs)).await;

    assert_eq!(snapshot.status, WorkflowStatus::Running);
    assert_eq!(snapshot.active_step, Some(StepId::CheckRegistrationStatus));
    assert_eq!(snapshot.phase, Some(StepPhase::Failed));
    assert_eq!(snapshot.error.as_deref(), Some("registration status is pending"));
    assert_eq!(network.call_count(Operation::GetRegistrationStatus), 3);

    // A manual retry past the ceiling polls exactly once more
    let snapshot = workflow.dispatch(WorkflowCommand::Retry).await;
    assert_eq!(snapshot.phase, Some(StepPhase::Failed));
    assert_eq!(network.call_count(Operation::GetRegistrationStatus), 4);
    assert_eq!(network.call_count(Operation::SubmitRegistrationPayment), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_transfer_resumes_on_retry() {
    let network = SimulatedNetwork::default();
    network.fail_next(Operation::TransferAssetIntoPool, 1);
    let network = Arc::new(network);
    let mut workflow = WorkflowOrchestrator::new(Arc::clone(&network), policy());

    let failed = workflow.dispatch(WorkflowCommand::Start(inputs())).await;

    assert_eq!(failed.active_step, Some(StepId::ProvideLiquidityA));
    assert_eq!(failed.phase, Some(StepPhase::Failed));
    assert_eq!(step_of(&failed, StepId::ProvideLiquidityA).status, StepStatus::Failed);
    assert_eq!(step_of(&failed, StepId::ProvideLiquidityB).status, StepStatus::Pending);
    let pool_id = failed.amm_process_id.clone().unwrap();
    assert_eq!(network.balance(&pool_id, "AO"), 0);

    let done = workflow.dispatch(WorkflowCommand::Retry).await;

    assert_eq!(done.status, WorkflowStatus::Completed);
    assert_eq!(step_of(&done, StepId::ProvideLiquidityA).retries, 1);
    assert_eq!(network.call_count(Operation::CheckPoolExists), 1);
    assert_eq!(network.call_count(Operation::TransferAssetIntoPool), 3);
    let last_transfer = network
        .calls()
        .into_iter()
        .filter(|call| call.operation == Operation::TransferAssetIntoPool)
        .last()
        .unwrap();
    assert_eq!(last_transfer.args, vec![pool_id.clone(), "WAR".to_string(), "2500".to_string()]);
    assert_eq!(network.balance(&pool_id, "AO"), 1000);
    assert_eq!(network.balance(&pool_id, "WAR"), 2500);
}

#[tokio::test(start_paused = true)]
async fn test_history_records_every_transition() {
    let network = Arc::new(SimulatedNetwork::new(SimulationProfile {
        resolve_lag: 1,
        ..Default::default()
    }));
    let mut workflow = WorkflowOrchestrator::new(network, policy());

    workflow.dispatch(WorkflowCommand::Start(inputs())).await;

    let history = workflow.history();
    assert_eq!(history.first().unwrap().from_status, WorkflowStatus::Idle);
    assert_eq!(history.last().unwrap().to_status, WorkflowStatus::Completed);
    assert!(history
        .iter()
        .any(|record| record.to_step == Some((StepId::ResolvePoolId, StepPhase::Run))
            && record.event == "DELAY_ELAPSED"));
}

#[tokio::test(start_paused = true)]
async fn test_handle_abandons_a_stuck_pool() {
    let network = Arc::new(SimulatedNetwork::new(SimulationProfile {
        resolve_lag: u32::MAX,
        ..Default::default()
    }));
    let mut handle = WorkflowHandle::spawn(network, policy());

    handle.start(inputs()).unwrap();
    handle
        .wait_for(|s| {
            s.active_step == Some(StepId::ResolvePoolId) && s.phase == Some(StepPhase::Waiting)
        })
        .await
        .unwrap();

    handle.abandon("pool never appeared").unwrap();
    let snapshot = handle
        .wait_for(|s| s.status == WorkflowStatus::Failed)
        .await
        .unwrap();

    assert!(is_settled(&snapshot));
    assert_eq!(snapshot.error.as_deref(), Some("pool never appeared"));
    assert_eq!(step_of(&snapshot, StepId::ResolvePoolId).status, StepStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_handle_drives_registration_to_completion() {
    let network = Arc::new(SimulatedNetwork::new(SimulationProfile {
        resolve_lag: 1,
        registration_lag: 1,
        settle_lag: 1,
        ..Default::default()
    }));
    let mut handle = WorkflowHandle::spawn(Arc::clone(&network), policy());

    handle
        .start(inputs().with_registration("WAR", "10").unwrap())
        .unwrap();
    let snapshot = handle
        .wait_for(|s| s.status == WorkflowStatus::Completed)
        .await
        .unwrap();

    assert!(snapshot.steps.iter().all(|s| s.status == StepStatus::Done));
    assert_eq!(network.call_count(Operation::SubmitRegistrationPayment), 1);
}

fn slow_network() -> Arc<SimulatedNetwork> {
    Arc::new(SimulatedNetwork::new(SimulationProfile {
        latency_ms: 1_000,
        ..Default::default()
    }))
}

fn funding_in_flight(snapshot: &WorkflowSnapshot) -> bool {
    snapshot.active_step == Some(StepId::ProvideLiquidityA)
        && snapshot.phase == Some(StepPhase::Run)
}

#[tokio::test(start_paused = true)]
async fn test_dropping_the_handle_cancels_the_adapter_call() {
    let network = slow_network();
    let mut handle = WorkflowHandle::spawn(Arc::clone(&network), policy());

    handle.start(inputs()).unwrap();
    handle.wait_for(funding_in_flight).await.unwrap();
    let mut progress = handle.subscribe();

    drop(handle);

    // The publisher goes away with the aborted task
    while progress.changed().await.is_ok() {}
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(network.call_count(Operation::TransferAssetIntoPool), 0);
    assert_eq!(network.call_count(Operation::VerifyPoolLive), 1);
}

#[tokio::test(start_paused = true)]
async fn test_abandon_interrupts_the_adapter_call() {
    let network = slow_network();
    let mut handle = WorkflowHandle::spawn(Arc::clone(&network), policy());

    handle.start(inputs()).unwrap();
    handle.wait_for(funding_in_flight).await.unwrap();

    handle.abandon("funding cancelled").unwrap();
    let snapshot = handle
        .wait_for(|s| s.status == WorkflowStatus::Failed)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(snapshot.error.as_deref(), Some("funding cancelled"));
    assert_eq!(step_of(&snapshot, StepId::ProvideLiquidityA).status, StepStatus::Failed);
    assert_eq!(step_of(&snapshot, StepId::ProvideLiquidityB).status, StepStatus::Pending);
    assert_eq!(network.call_count(Operation::TransferAssetIntoPool), 0);
}
