// Mock adapters for testing - scripted responses, no network

use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::adapters::{AdapterError, PoolAdapters, PoolLookup};
use crate::workflows::policy::REGISTRATION_COMPLETE;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockCall {
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

/// Adapters that succeed by default; failures and statuses are queued per call
#[derive(Debug, Default)]
pub struct MockPoolAdapters {
    pub existing_pool: Mutex<Option<String>>,
    pub pool_id: Mutex<String>,
    pub failures: Mutex<HashMap<MockCall, VecDeque<AdapterError>>>,
    pub registration_statuses: Mutex<VecDeque<String>>,
    pub executed_calls: Mutex<Vec<MockCall>>,
    pub transfers: Mutex<Vec<(String, String, String)>>,
    next_id: Mutex<u32>,
}

impl MockPoolAdapters {
    pub fn new() -> Self {
        Self {
            pool_id: Mutex::new("pool-new".to_string()),
            ..Default::default()
        }
    }

    pub fn set_existing_pool(&self, pool_id: &str) {
        *self.existing_pool.lock().unwrap() = Some(pool_id.to_string());
    }

    pub fn fail_next(&self, call: MockCall, error: AdapterError) {
        self.failures
            .lock()
            .unwrap()
            .entry(call)
            .or_default()
            .push_back(error);
    }

    pub fn fail_times(&self, call: MockCall, times: usize) {
        for _ in 0..times {
            self.fail_next(call, AdapterError::NotReady(format!("{call:?} not ready")));
        }
    }

    pub fn queue_registration_status(&self, status: &str) {
        self.registration_statuses
            .lock()
            .unwrap()
            .push_back(status.to_string());
    }

    pub fn executed_calls(&self) -> Vec<MockCall> {
        self.executed_calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, call: MockCall) -> usize {
        self.executed_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| **c == call)
            .count()
    }

    pub fn transfers(&self) -> Vec<(String, String, String)> {
        self.transfers.lock().unwrap().clone()
    }

    fn track(&self, call: MockCall) -> Result<(), AdapterError> {
        self.executed_calls.lock().unwrap().push(call);
        match self.failures.lock().unwrap().get_mut(&call) {
            Some(queue) => queue.pop_front().map_or(Ok(()), Err),
            None => Ok(()),
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        format!("{prefix}-{}", *next)
    }
}

#[async_trait]
impl PoolAdapters for MockPoolAdapters {
    async fn check_pool_exists(
        &self,
        _token_a: &str,
        _token_b: &str,
    ) -> Result<PoolLookup, AdapterError> {
        self.track(MockCall::CheckPoolExists)?;
        Ok(match self.existing_pool.lock().unwrap().clone() {
            Some(pool_id) => PoolLookup { skip: true, pool_id },
            None => PoolLookup { skip: false, pool_id: String::new() },
        })
    }

    async fn request_pool_creation(
        &self,
        _token_a: &str,
        _token_b: &str,
    ) -> Result<String, AdapterError> {
        self.track(MockCall::RequestPoolCreation)?;
        Ok(self.next_id("spawn"))
    }

    async fn confirm_creation_request(
        &self,
        tracking_id: &str,
    ) -> Result<serde_json::Value, AdapterError> {
        self.track(MockCall::ConfirmCreationRequest)?;
        Ok(json!({ "tracking_id": tracking_id, "status": "accepted" }))
    }

    async fn resolve_pool_id(
        &self,
        _token_a: &str,
        _token_b: &str,
    ) -> Result<String, AdapterError> {
        self.track(MockCall::ResolvePoolId)?;
        Ok(self.pool_id.lock().unwrap().clone())
    }

    async fn verify_pool_live(&self, pool_id: &str) -> Result<String, AdapterError> {
        self.track(MockCall::VerifyPoolLive)?;
        Ok(format!("pong:{pool_id}"))
    }

    async fn get_registration_status(&self, _pool_id: &str) -> Result<String, AdapterError> {
        self.track(MockCall::GetRegistrationStatus)?;
        Ok(self
            .registration_statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| REGISTRATION_COMPLETE.to_string()))
    }

    async fn submit_registration_payment(
        &self,
        _pool_id: &str,
        _token: &str,
        _amount: &str,
    ) -> Result<String, AdapterError> {
        self.track(MockCall::SubmitRegistrationPayment)?;
        Ok(self.next_id("register"))
    }

    async fn transfer_asset_into_pool(
        &self,
        pool_id: &str,
        token: &str,
        amount: &str,
    ) -> Result<String, AdapterError> {
        self.track(MockCall::TransferAssetIntoPool)?;
        self.transfers
            .lock()
            .unwrap()
            .push((pool_id.to_string(), token.to_string(), amount.to_string()));
        Ok(self.next_id("transfer"))
    }

    async fn confirm_settlement(&self, tracking_id: &str) -> Result<String, AdapterError> {
        self.track(MockCall::ConfirmSettlement)?;
        Ok(format!("settled:{tracking_id}"))
    }
}
