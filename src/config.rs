//! Configuration for the orchestration core
//!
//! Every operational bound is an external tunable: registry capacity, idle
//! timeout, sweep cadence, per-turn hop bound, and tool timeout. Values can
//! come from code (builder), the environment, or a TOML file.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum concurrent sessions held by the registry.
    pub max_sessions: usize,

    /// Idle time after which a session is expired by the sweep.
    pub idle_timeout: Duration,

    /// Interval between sweeps of the registry.
    pub sweep_interval: Duration,

    /// Maximum agent invocations (hops) within a single turn.
    pub max_tool_iterations: usize,

    /// Per-call timeout for tool invocations.
    pub tool_timeout: Duration,

    /// Model used by the default provider.
    pub model: String,

    /// Sampling temperature for the default provider.
    pub temperature: f32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_sessions: 100,
            idle_timeout: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(300),
            max_tool_iterations: 10,
            tool_timeout: Duration::from_secs(30),
            model: "gpt-4o".to_string(),
            temperature: 0.1,
        }
    }
}

/// Configuration builder
pub struct ConfigBuilder {
    config: OrchestratorConfig,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: OrchestratorConfig::default(),
        }
    }

    pub fn max_sessions(mut self, max: usize) -> Self {
        self.config.max_sessions = max;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    pub fn max_tool_iterations(mut self, max: usize) -> Self {
        self.config.max_tool_iterations = max;
        self
    }

    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.config.tool_timeout = timeout;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    pub fn build(self) -> OrchestratorConfig {
        self.config
    }
}

/// Load configuration from environment variables, starting from defaults.
pub fn from_env() -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();

    if let Ok(max) = std::env::var("SWARMGATE_MAX_SESSIONS") {
        if let Ok(max) = max.parse() {
            config.max_sessions = max;
        }
    }
    if let Ok(secs) = std::env::var("SWARMGATE_IDLE_TIMEOUT_SECS") {
        if let Ok(secs) = secs.parse() {
            config.idle_timeout = Duration::from_secs(secs);
        }
    }
    if let Ok(secs) = std::env::var("SWARMGATE_SWEEP_INTERVAL_SECS") {
        if let Ok(secs) = secs.parse() {
            config.sweep_interval = Duration::from_secs(secs);
        }
    }
    if let Ok(max) = std::env::var("SWARMGATE_MAX_TOOL_ITERATIONS") {
        if let Ok(max) = max.parse() {
            config.max_tool_iterations = max;
        }
    }
    if let Ok(model) = std::env::var("SWARMGATE_MODEL") {
        config.model = model;
    }
    if let Ok(temperature) = std::env::var("SWARMGATE_TEMPERATURE") {
        if let Ok(temperature) = temperature.parse() {
            config.temperature = temperature;
        }
    }

    config
}

/// Load configuration from a TOML file.
pub fn from_file(
    path: impl AsRef<std::path::Path>,
) -> Result<OrchestratorConfig, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: OrchestratorConfig = toml::from_str(&contents)?;
    Ok(config)
}
