// Retry policy for automatically retried steps

use std::time::Duration;

use crate::config::WorkflowSettings;

/// Status reported by the index once a registration is paid and complete
pub const REGISTRATION_COMPLETE: &str = "paid-complete";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Fixed pause between automatic attempts
    pub retry_delay: Duration,
    /// Ceiling for self-healing steps; `None` retries until the adapter succeeds
    pub self_heal_max_retries: Option<u32>,
    /// Ceiling for registration status polling
    pub registration_max_retries: u32,
    pub registration_complete_status: String,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_millis(2_000),
            self_heal_max_retries: None,
            registration_max_retries: 5,
            registration_complete_status: REGISTRATION_COMPLETE.to_string(),
        }
    }
}

impl RetryPolicy {
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_self_heal_ceiling(mut self, ceiling: Option<u32>) -> Self {
        self.self_heal_max_retries = ceiling;
        self
    }

    pub fn with_registration_ceiling(mut self, ceiling: u32) -> Self {
        self.registration_max_retries = ceiling;
        self
    }

    /// Whether a self-healing step that has already retried `retries` times may go again
    pub fn self_heal_allows(&self, retries: u32) -> bool {
        self.self_heal_max_retries
            .map_or(true, |ceiling| retries < ceiling)
    }

    pub fn registration_allows(&self, retries: u32) -> bool {
        retries < self.registration_max_retries
    }

    pub fn is_registration_complete(&self, status: &str) -> bool {
        status == self.registration_complete_status
    }
}

impl From<&WorkflowSettings> for RetryPolicy {
    fn from(settings: &WorkflowSettings) -> Self {
        Self {
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
            self_heal_max_retries: settings.self_heal_max_retries,
            registration_max_retries: settings.registration_max_retries,
            registration_complete_status: settings.registration_complete_status.clone(),
        }
    }
}
