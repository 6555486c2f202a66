//! Configuration builders controlling training.

use serde::{Deserialize, Serialize};

use crate::error::{BytepairError, Result};

/// Configuration for incremental BPE training.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrainerConfig {
    /// Enables periodic progress logging through the `log` facade.
    pub show_progress: bool,
    /// Number of reduction steps between progress reports.
    pub report_interval: usize,
    /// Forces a merge on the first reduction step even when no pair repeats.
    pub prime_first_merge: bool,
    /// Allows the initial pair scan to run across Rayon worker threads.
    pub parallel_seed: bool,
    /// Inputs shorter than this many bytes are always scanned sequentially.
    pub parallel_seed_min_len: usize,
}

impl TrainerConfig {
    /// Returns a builder initialised with [`TrainerConfig::default`].
    #[must_use]
    pub fn builder() -> TrainerBuilder {
        TrainerBuilder::default()
    }

    /// Validates the invariants required for training.
    pub fn validate(&self) -> Result<()> {
        if self.report_interval == 0 {
            return Err(BytepairError::InvalidConfig(
                "report_interval must be greater than zero".into(),
            ));
        }
        if self.parallel_seed_min_len < 2 {
            return Err(BytepairError::InvalidConfig(format!(
                "parallel_seed_min_len ({}) must be at least 2",
                self.parallel_seed_min_len
            )));
        }
        Ok(())
    }

    /// Returns true when an input of `len` bytes should be scanned in parallel.
    #[must_use]
    pub fn seeds_in_parallel(&self, len: usize) -> bool {
        self.parallel_seed && len >= self.parallel_seed_min_len
    }
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            show_progress: true,
            report_interval: 1000,
            prime_first_merge: true,
            parallel_seed: true,
            parallel_seed_min_len: 1 << 20,
        }
    }
}

/// Builder for [`TrainerConfig`].
#[derive(Debug, Default, Clone)]
pub struct TrainerBuilder {
    cfg: TrainerConfig,
}

impl TrainerBuilder {
    /// Creates a builder with [`TrainerConfig::default`] settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables progress logging.
    #[must_use]
    pub fn show_progress(mut self, enabled: bool) -> Self {
        self.cfg.show_progress = enabled;
        self
    }

    /// Sets the number of reduction steps between progress reports.
    #[must_use]
    pub fn report_interval(mut self, steps: usize) -> Self {
        self.cfg.report_interval = steps;
        self
    }

    /// Keeps or drops the forced merge on the first reduction step.
    #[must_use]
    pub fn prime_first_merge(mut self, enabled: bool) -> Self {
        self.cfg.prime_first_merge = enabled;
        self
    }

    /// Enables or disables the parallel initial pair scan.
    #[must_use]
    pub fn parallel_seed(mut self, enabled: bool) -> Self {
        self.cfg.parallel_seed = enabled;
        self
    }

    /// Sets the input length from which the initial scan runs in parallel.
    #[must_use]
    pub fn parallel_seed_min_len(mut self, len: usize) -> Self {
        self.cfg.parallel_seed_min_len = len;
        self
    }

    /// Finalises the builder, returning a validated [`TrainerConfig`].
    pub fn build(self) -> Result<TrainerConfig> {
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let cfg = TrainerConfig::builder()
            .show_progress(false)
            .report_interval(10)
            .prime_first_merge(false)
            .parallel_seed(false)
            .build()
            .expect("config should be valid");
        assert!(!cfg.show_progress);
        assert_eq!(cfg.report_interval, 10);
        assert!(!cfg.prime_first_merge);
        assert!(!cfg.seeds_in_parallel(usize::MAX));
    }

    #[test]
    fn validate_rejects_zero_interval() {
        let err = TrainerConfig::builder()
            .report_interval(0)
            .build()
            .expect_err("validation should fail");
        assert!(matches!(
            err,
            BytepairError::InvalidConfig(message) if message.contains("report_interval")
        ));
    }

    #[test]
    fn parallel_threshold_applies() {
        let cfg = TrainerConfig::builder()
            .parallel_seed_min_len(16)
            .build()
            .expect("config should be valid");
        assert!(!cfg.seeds_in_parallel(15));
        assert!(cfg.seeds_in_parallel(16));
        assert!(TrainerConfig::builder()
            .parallel_seed_min_len(1)
            .build()
            .is_err());
    }
}
