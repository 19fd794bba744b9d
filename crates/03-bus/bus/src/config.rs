use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::DispatchError;

/// What happens to queued messages when a dispatcher stops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ShutdownPolicy {
    /// Discard whatever is still queued.
    #[default]
    Drop,
    /// Deliver everything already queued, then stop.
    Drain,
}

impl FromStr for ShutdownPolicy {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(ShutdownPolicy::Drop),
            "drain" => Ok(ShutdownPolicy::Drain),
            other => Err(DispatchError::UnknownPolicy(other.to_owned())),
        }
    }
}

impl fmt::Display for ShutdownPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownPolicy::Drop => f.write_str("drop"),
            ShutdownPolicy::Drain => f.write_str("drain"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DispatcherConfig {
    pub name: String,
    pub shutdown_policy: ShutdownPolicy,
    /// Default bound for [`DispatcherHandle::flush`](crate::DispatcherHandle::flush).
    pub idle_timeout: Duration,
}

impl DispatcherConfig {
    pub const DEFAULT_NAME: &'static str = "ecds-dispatcher";

    pub fn new() -> Self {
        Self {
            name: Self::DEFAULT_NAME.to_owned(),
            shutdown_policy: ShutdownPolicy::default(),
            idle_timeout: Duration::from_secs(5),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn shutdown_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.shutdown_policy = policy;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::new()
    }
}
