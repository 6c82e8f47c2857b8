//! Configuration for the engine.

use std::time::Duration;

/// Deadline and retry budget for one exchange step.
///
/// The first send is not a retry: a step is attempted `1 + retries` times,
/// and each attempt waits `timeout` measured from the last activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Time to wait for a response after each send.
    pub timeout: Duration,
    /// Number of resends after the first attempt.
    pub retries: u32,
}

impl RetryPolicy {
    /// Creates a retry policy.
    pub fn new(timeout: Duration, retries: u32) -> Self {
        Self { timeout, retries }
    }

    /// Creates a policy that sends once and never resends.
    pub fn no_retry(timeout: Duration) -> Self {
        Self {
            timeout,
            retries: 0,
        }
    }

    /// Sets the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry count.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Total number of sends for one step.
    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Longest a single step can take before it resolves `TimedOut`.
    pub fn worst_case(&self) -> Duration {
        self.timeout.saturating_mul(self.attempts())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), 3)
    }
}

/// Configuration for the engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Policy for command exchanges.
    pub command: RetryPolicy,
    /// Policy for each step of a mission transfer.
    pub mission: RetryPolicy,
    /// Default bound on blocking calls.
    pub blocking_timeout: Duration,
}

impl EngineConfig {
    /// Creates a configuration with default policies.
    pub fn new() -> Self {
        Self {
            command: RetryPolicy::default(),
            mission: RetryPolicy::new(Duration::from_secs(1), 4),
            blocking_timeout: Duration::from_secs(30),
        }
    }

    /// Sets the command policy.
    pub fn with_command_policy(mut self, policy: RetryPolicy) -> Self {
        self.command = policy;
        self
    }

    /// Sets the mission transfer policy.
    pub fn with_mission_policy(mut self, policy: RetryPolicy) -> Self {
        self.mission = policy;
        self
    }

    /// Sets the default bound on blocking calls.
    pub fn with_blocking_timeout(mut self, timeout: Duration) -> Self {
        self.blocking_timeout = timeout;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
