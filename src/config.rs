use anyhow::Result;
use ::config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::adapters::SimulationProfile;
use crate::workflows::policy::REGISTRATION_COMPLETE;

/// Main configuration structure for the pool workflow
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PoolWorkflowConfig {
    /// Retry policy settings
    pub workflow: WorkflowSettings,
    /// Logging settings
    pub observability: ObservabilityConfig,
    /// Defaults for the simulated network used by `simulate`
    pub simulation: SimulationProfile,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorkflowSettings {
    /// Fixed delay between automatic retries
    pub retry_delay_ms: u64,
    /// Retry ceiling for self-healing steps (unset means unbounded)
    pub self_heal_max_retries: Option<u32>,
    /// Retry ceiling for registration status polling
    pub registration_max_retries: u32,
    /// Registration status the index reports once registration is complete
    pub registration_complete_status: String,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            retry_delay_ms: 2_000,
            self_heal_max_retries: None,
            registration_max_retries: 5,
            registration_complete_status: REGISTRATION_COMPLETE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level
    pub log_level: String,
    /// Emit JSON structured logs instead of human readable lines
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl PoolWorkflowConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (pool-workflow.toml, .pool-workflow-rc)
    /// 3. Environment variables (prefixed with POOL_WORKFLOW__)
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("."))
    }

    /// Same as `load`, resolving configuration files relative to `dir`
    pub fn load_from(dir: &Path) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        let toml_path = dir.join("pool-workflow.toml");
        if toml_path.exists() {
            builder = builder.add_source(File::from(toml_path));
        }

        let rc_path = dir.join(".pool-workflow-rc");
        if rc_path.exists() {
            builder = builder.add_source(File::from(rc_path).format(FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("POOL_WORKFLOW")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<PoolWorkflowConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        // Load .env file first
        let _ = PoolWorkflowConfig::load_env_file();
        PoolWorkflowConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static PoolWorkflowConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}
