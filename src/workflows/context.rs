// Workflow inputs and the immutable context threaded through transitions

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::workflows::types::{StepId, StepState, StepStatus, StepView};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("Token id for {side} must not be empty")]
    EmptyToken { side: &'static str },
    #[error("Pool needs two distinct tokens, got {token} twice")]
    SameToken { token: String },
    #[error("Amount for {side} must be a positive integer quantity, got {value:?}")]
    InvalidAmount { side: &'static str, value: String },
}

/// Payment attached to an index registration request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationPayment {
    pub token: String,
    pub amount: String,
}

/// Parameters carried by the START command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowInputs {
    pub token_a: String,
    pub token_b: String,
    /// Smallest-unit integer quantity of token A
    pub amount_a: String,
    /// Smallest-unit integer quantity of token B
    pub amount_b: String,
    /// Present only when index registration was requested
    pub registration: Option<RegistrationPayment>,
}

impl WorkflowInputs {
    pub fn new(
        token_a: impl Into<String>,
        token_b: impl Into<String>,
        amount_a: impl Into<String>,
        amount_b: impl Into<String>,
    ) -> Result<Self, InputError> {
        let inputs = Self {
            token_a: token_a.into(),
            token_b: token_b.into(),
            amount_a: amount_a.into(),
            amount_b: amount_b.into(),
            registration: None,
        };

        validate_token("token A", &inputs.token_a)?;
        validate_token("token B", &inputs.token_b)?;
        if inputs.token_a == inputs.token_b {
            return Err(InputError::SameToken {
                token: inputs.token_a,
            });
        }
        validate_amount("token A", &inputs.amount_a)?;
        validate_amount("token B", &inputs.amount_b)?;

        Ok(inputs)
    }

    /// Request index registration, paid with `amount` of `token`
    pub fn with_registration(
        mut self,
        token: impl Into<String>,
        amount: impl Into<String>,
    ) -> Result<Self, InputError> {
        let payment = RegistrationPayment {
            token: token.into(),
            amount: amount.into(),
        };
        validate_token("payment", &payment.token)?;
        validate_amount("payment", &payment.amount)?;
        self.registration = Some(payment);
        Ok(self)
    }

    pub fn registration_requested(&self) -> bool {
        self.registration.is_some()
    }
}

fn validate_token(side: &'static str, token: &str) -> Result<(), InputError> {
    if token.trim().is_empty() {
        return Err(InputError::EmptyToken { side });
    }
    Ok(())
}

fn validate_amount(side: &'static str, value: &str) -> Result<(), InputError> {
    let digits_only = !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit());
    if !digits_only || value.bytes().all(|b| b == b'0') {
        return Err(InputError::InvalidAmount {
            side,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// The only cross-step state of a run.
///
/// Every `with_*` method consumes the context and returns the replacement,
/// so a transition never mutates a context another state still refers to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowContext {
    pub steps: BTreeMap<StepId, StepState>,
    pub inputs: WorkflowInputs,
    pub amm_process_id: Option<String>,
    pub error: Option<String>,
}

impl WorkflowContext {
    /// Fresh context for a START; registration steps are disabled unless requested
    pub fn new(inputs: WorkflowInputs) -> Self {
        let register = inputs.registration_requested();
        let steps = StepId::ALL
            .iter()
            .map(|step| {
                let enabled = register || !step.is_registration_step();
                (*step, StepState::new(*step, enabled))
            })
            .collect();

        Self {
            steps,
            inputs,
            amm_process_id: None,
            error: None,
        }
    }

    pub fn step(&self, step: StepId) -> &StepState {
        // Every StepId is inserted by `new` and never removed
        &self.steps[&step]
    }

    pub fn status(&self, step: StepId) -> StepStatus {
        self.step(step).status
    }

    pub fn result(&self, step: StepId) -> Option<&str> {
        self.step(step).result.as_deref()
    }

    /// First enabled step after `step` that has not finished yet
    pub fn next_step_after(&self, step: StepId) -> Option<StepId> {
        self.steps
            .range(step..)
            .skip(1)
            .find(|(_, state)| state.enabled && state.status != StepStatus::Done)
            .map(|(id, _)| *id)
    }

    pub fn with_step(mut self, step: StepId, update: impl FnOnce(&mut StepState)) -> Self {
        if let Some(state) = self.steps.get_mut(&step) {
            update(state);
        }
        self
    }

    /// Record the pool id; a value that is already set is kept
    pub fn with_pool_id(mut self, pool_id: &str) -> Self {
        if self.amm_process_id.is_none() {
            self.amm_process_id = Some(pool_id.to_string());
        }
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    pub fn views(&self) -> Vec<StepView> {
        self.steps
            .iter()
            .map(|(id, state)| StepView {
                id: *id,
                label: state.label.clone(),
                status: state.status,
                result: state.result.clone(),
                enabled: state.enabled,
                retries: state.retries,
            })
            .collect()
    }

    pub fn count_with_status(&self, status: StepStatus) -> usize {
        self.steps.values().filter(|s| s.status == status).count()
    }
}
