// Step executor: runs the adapter calls behind one step request

use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::adapters::{AdapterError, PoolAdapters};
use crate::workflows::state_machine::{StepFailure, StepRequest, Transfer, WorkflowEvent};
use crate::workflows::types::{StepId, StepOutput};

/// Execute `request` against `adapters` and turn the outcome into the event
/// the state machine consumes. Adapter errors become `StepFailed`; this
/// function itself cannot fail.
pub async fn execute_step<A>(adapters: &A, request: &StepRequest) -> WorkflowEvent
where
    A: PoolAdapters + ?Sized,
{
    let step = request.step();
    debug!(step = %step, request = ?request, "Executing workflow step");

    match run_request(adapters, request).await {
        Ok((output, raw)) => WorkflowEvent::StepSucceeded { step, output, raw },
        Err(error) => {
            warn!(step = %step, error = %error, "Workflow step adapter failed");
            WorkflowEvent::StepFailed {
                step,
                failure: failure_for(step, &error),
            }
        }
    }
}

fn failure_for(step: StepId, error: &AdapterError) -> StepFailure {
    StepFailure {
        message: error.to_string(),
        raw: json!({
            "type": "error",
            "step": step,
            "error": error,
        }),
    }
}

fn raw_of(value: &impl Serialize) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|e| json!({ "unserializable": e.to_string() }))
}

async fn run_request<A>(
    adapters: &A,
    request: &StepRequest,
) -> Result<(StepOutput, serde_json::Value), AdapterError>
where
    A: PoolAdapters + ?Sized,
{
    match request {
        StepRequest::SpawnPool { token_a, token_b } => {
            let lookup = adapters.check_pool_exists(token_a, token_b).await?;
            if lookup.skip {
                let raw = json!({ "lookup": raw_of(&lookup) });
                return Ok((StepOutput::PoolExists { pool_id: lookup.pool_id }, raw));
            }

            let tracking_id = adapters.request_pool_creation(token_a, token_b).await?;
            let raw = json!({ "lookup": raw_of(&lookup), "tracking_id": tracking_id });
            Ok((StepOutput::CreationRequested { tracking_id }, raw))
        }
        StepRequest::ConfirmRequest { tracking_id } => {
            let confirmation = adapters.confirm_creation_request(tracking_id).await?;
            Ok((
                StepOutput::CreationConfirmed {
                    tracking_id: tracking_id.clone(),
                },
                confirmation,
            ))
        }
        StepRequest::ResolvePoolId { token_a, token_b } => {
            let pool_id = adapters.resolve_pool_id(token_a, token_b).await?;
            let raw = json!({ "pool_id": pool_id });
            Ok((StepOutput::PoolResolved { pool_id }, raw))
        }
        StepRequest::VerifyPoolReady { pool_id } => {
            let token = adapters.verify_pool_live(pool_id).await?;
            let raw = json!({ "pool_id": pool_id, "liveness": token });
            Ok((StepOutput::PoolLive { token }, raw))
        }
        StepRequest::CheckRegistrationStatus { pool_id } => {
            let status = adapters.get_registration_status(pool_id).await?;
            let raw = json!({ "pool_id": pool_id, "status": status });
            Ok((StepOutput::RegistrationStatus { status }, raw))
        }
        StepRequest::RegisterWithIndex { pool_id, payment } => {
            let tracking_id = adapters
                .submit_registration_payment(pool_id, &payment.token, &payment.amount)
                .await?;
            let raw = json!({
                "pool_id": pool_id,
                "payment": raw_of(payment),
                "tracking_id": tracking_id,
            });
            Ok((StepOutput::RegistrationSubmitted { tracking_id }, raw))
        }
        StepRequest::ProvideLiquidityA(transfer) | StepRequest::ProvideLiquidityB(transfer) => {
            transfer_into_pool(adapters, transfer).await
        }
        StepRequest::VerifyLiquidity { tracking_id } => {
            let token = adapters.confirm_settlement(tracking_id).await?;
            let raw = json!({ "tracking_id": tracking_id, "settlement": token });
            Ok((StepOutput::Settled { token }, raw))
        }
    }
}

async fn transfer_into_pool<A>(
    adapters: &A,
    transfer: &Transfer,
) -> Result<(StepOutput, serde_json::Value), AdapterError>
where
    A: PoolAdapters + ?Sized,
{
    let tracking_id = adapters
        .transfer_asset_into_pool(&transfer.pool_id, &transfer.token, &transfer.amount)
        .await?;
    let raw = json!({ "transfer": raw_of(transfer), "tracking_id": tracking_id });
    Ok((StepOutput::TransferSubmitted { tracking_id }, raw))
}
