//! Configuration types for the updater

use crate::artifacts::ArtifactTarget;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default values shared by the engine and the CLI
pub mod defaults {
    use std::time::Duration;

    /// Safety cap for unbounded rules
    pub const MAX_ITERATIONS: u32 = 999;

    /// How long the dispatcher sleeps when every worker is busy
    pub const BACKOFF: Duration = Duration::from_millis(20);

    /// Iterations after which the region is checkpointed for oscillation checks
    pub const CHECK_INTERVALS: [u32; 7] = [3, 10, 25, 50, 100, 200, 500];
}

/// What a failed sentence looks like in the output stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Emit whatever partial output exists
    #[default]
    Silent,
    /// Same as `Silent`, preceded by a comment naming the failure
    Annotate,
}

/// Updater configuration
#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    /// Number of worker threads (None = auto)
    pub threads: Option<usize>,
    /// Following sentences visible to each rule run
    pub lookahead: usize,
    /// Preceding sentences visible to each rule run
    pub lookback: usize,
    /// Collapse repeated namespace declarations in the output
    pub prefix_deduplication: bool,
    /// Cap for unbounded rules
    pub max_iterations: u32,
    /// Dispatcher sleep when no worker is free
    pub backoff: Duration,
    /// Output form of failed sentences
    pub failure_policy: FailurePolicy,
    /// Graph visualisation snapshots
    pub graphs: Option<ArtifactTarget>,
    /// Sorted fact dump snapshots
    pub facts: Option<ArtifactTarget>,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            threads: None,
            lookahead: 0,
            lookback: 0,
            prefix_deduplication: false,
            max_iterations: defaults::MAX_ITERATIONS,
            backoff: defaults::BACKOFF,
            failure_policy: FailurePolicy::Silent,
            graphs: None,
            facts: None,
        }
    }
}

impl UpdaterConfig {
    /// Create a builder
    pub fn builder() -> UpdaterConfigBuilder {
        UpdaterConfigBuilder::default()
    }

    /// Effective worker count; falls back to the processor count
    pub fn worker_count(&self) -> usize {
        match self.threads {
            Some(n) if n > 0 => n,
            _ => num_cpus::get().max(1),
        }
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if self.backoff.is_zero() {
            return Err(ConfigError::Invalid(
                "backoff must be greater than zero".to_string(),
            ));
        }
        for target in [&self.graphs, &self.facts].into_iter().flatten() {
            if target.dir.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(
                    "artifact directory must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Builder for [`UpdaterConfig`]
#[derive(Debug, Default)]
pub struct UpdaterConfigBuilder {
    config: UpdaterConfig,
}

impl UpdaterConfigBuilder {
    /// Set thread count
    pub fn threads(mut self, threads: Option<usize>) -> Self {
        self.config.threads = threads;
        self
    }

    /// Set lookahead size
    pub fn lookahead(mut self, lookahead: usize) -> Self {
        self.config.lookahead = lookahead;
        self
    }

    /// Set lookback size
    pub fn lookback(mut self, lookback: usize) -> Self {
        self.config.lookback = lookback;
        self
    }

    /// Enable namespace declaration deduplication
    pub fn prefix_deduplication(mut self, enabled: bool) -> Self {
        self.config.prefix_deduplication = enabled;
        self
    }

    /// Set the cap for unbounded rules
    pub fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    /// Set the dispatcher backoff
    pub fn backoff(mut self, backoff: Duration) -> Self {
        self.config.backoff = backoff;
        self
    }

    /// Set the failure policy
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    /// Write `.dot` snapshots
    pub fn graphs(mut self, target: ArtifactTarget) -> Self {
        self.config.graphs = Some(target);
        self
    }

    /// Write `.nt` snapshots
    pub fn facts(mut self, target: ArtifactTarget) -> Self {
        self.config.facts = Some(target);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<UpdaterConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = UpdaterConfig::default();
        assert_eq!(config.max_iterations, 999);
        assert_eq!(config.backoff, Duration::from_millis(20));
        assert_eq!(config.failure_policy, FailurePolicy::Silent);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_worker_count_fallback() {
        let auto = UpdaterConfig::default();
        assert!(auto.worker_count() >= 1);

        let zero = UpdaterConfig::builder().threads(Some(0)).build().unwrap();
        assert_eq!(zero.worker_count(), auto.worker_count());

        let fixed = UpdaterConfig::builder().threads(Some(3)).build().unwrap();
        assert_eq!(fixed.worker_count(), 3);
    }

    #[test]
    fn test_builder_rejects_zero_cap() {
        let result = UpdaterConfig::builder().max_iterations(0).build();
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_builder_rejects_empty_artifact_dir() {
        let result = UpdaterConfig::builder()
            .graphs(ArtifactTarget::new("", vec![]))
            .build();
        assert!(result.is_err());
    }
}
