use std::env;

use ecds_bus::{DispatcherConfig, ShutdownPolicy};

use crate::error::RuntimeResult;
use crate::logging::LogLevel;

pub const LOG_LEVEL_VAR: &str = "ECDS_LOG";
pub const SHUTDOWN_POLICY_VAR: &str = "ECDS_SHUTDOWN";

#[derive(Clone, Debug, Default)]
pub struct RuntimeConfig {
    pub log_level: LogLevel,
    pub dispatcher: DispatcherConfig,
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn dispatcher(mut self, dispatcher: DispatcherConfig) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.dispatcher.shutdown_policy = policy;
        self
    }

    /// Defaults overridden by `ECDS_LOG` and `ECDS_SHUTDOWN`.
    pub fn from_env() -> RuntimeResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like [`RuntimeConfig::from_env`] with an explicit variable source.
    pub fn from_lookup<F>(lookup: F) -> RuntimeResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(level) = lookup(LOG_LEVEL_VAR) {
            config.log_level = level.parse()?;
        }
        if let Some(policy) = lookup(SHUTDOWN_POLICY_VAR) {
            config.dispatcher.shutdown_policy = policy.parse()?;
        }
        Ok(config)
    }
}
