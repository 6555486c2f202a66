//! Training façade that drives an [`Encoding`] to convergence.

use std::fmt;
use std::path::Path;

use log::{debug, error, info};

use crate::config::{TrainerBuilder, TrainerConfig};
use crate::corpus::load_input;
use crate::encoding::{Encoding, Step};
use crate::error::Result;
use crate::metrics::{IterationMetrics, Reporter, StopReason, TrainingMetrics};
use crate::model::BpeModel;

/// High-level façade configuring and executing BPE training runs.
#[derive(Debug, Clone)]
pub struct Trainer {
    cfg: TrainerConfig,
}

/// Artifacts returned after a training session completes.
#[must_use]
#[derive(Debug, Clone)]
pub struct TrainerArtifacts {
    /// Trained grammar and reduced token stream.
    pub model: BpeModel,
    /// Progress snapshots and summary captured during training.
    pub metrics: TrainingMetrics,
}

impl Trainer {
    /// Creates a new trainer for the supplied configuration.
    #[must_use]
    pub fn new(cfg: TrainerConfig) -> Self {
        Self { cfg }
    }

    /// Returns a [`TrainerBuilder`] with default settings.
    #[must_use]
    pub fn builder() -> TrainerBuilder {
        TrainerConfig::builder()
    }

    /// Returns an immutable reference to the underlying configuration.
    #[must_use]
    pub fn config(&self) -> &TrainerConfig {
        &self.cfg
    }

    /// Trains on the contents of a single file.
    pub fn train_from_path<P: AsRef<Path>>(&self, path: P) -> Result<TrainerArtifacts> {
        let bytes = load_input(path)?;
        self.train_from_bytes(&bytes)
    }

    /// Trains on an in-memory byte buffer.
    pub fn train_from_bytes(&self, bytes: &[u8]) -> Result<TrainerArtifacts> {
        self.train_with_observer(bytes, |_| {})
    }

    /// Trains on `bytes`, handing every progress snapshot to `observer`.
    ///
    /// A snapshot is taken every [`TrainerConfig::report_interval`] reduction steps and
    /// once more when training converges.
    pub fn train_with_observer<F>(&self, bytes: &[u8], mut observer: F) -> Result<TrainerArtifacts>
    where
        F: FnMut(&IterationMetrics),
    {
        self.cfg.validate()?;
        let mut reporter = Reporter::new();
        let mut encoding = Encoding::new(bytes, &self.cfg)?;
        let seeded = reporter.observe(&encoding);
        if self.cfg.show_progress {
            info!(
                "seeded {} tokens with {} distinct pairs in {:.2?}",
                seeded.sequence_len, seeded.queue_len, seeded.elapsed_since_last
            );
        }

        let interval = self.cfg.report_interval;
        let mut metrics = TrainingMetrics::new(bytes.len() / interval + 1);
        loop {
            let step = encoding.reduce().inspect_err(|err| {
                if err.is_fatal() {
                    error!(
                        "training state corrupted after {} steps (sequence {}, grammar {}): {err}",
                        encoding.iterations(),
                        encoding.sequence_len(),
                        encoding.grammar_len()
                    );
                }
            })?;
            let record = match step {
                Step::Merged(record) => record,
                Step::Converged => break,
            };
            metrics.merges += 1;
            debug!(
                "merged {} -> {} ({} occurrences, {} rewrites)",
                record.pair, record.token, record.frequency, record.merges
            );

            if encoding.iterations() % interval == 0 {
                let snapshot = reporter.observe(&encoding);
                self.log_progress(&snapshot);
                observer(&snapshot);
                metrics.reports.push(snapshot);
            }
        }

        let last = reporter.observe(&encoding);
        observer(&last);
        metrics.reports.push(last);
        metrics.stop_reason = if encoding.queue_len() == 0 {
            StopReason::Exhausted
        } else {
            StopReason::Converged
        };
        metrics.total_duration = reporter.elapsed();

        if self.cfg.show_progress {
            info!(
                "completed {} merges in {:.2?}; sequence {} -> {} tokens, vocab size {}",
                metrics.merges,
                metrics.total_duration,
                bytes.len(),
                encoding.sequence_len(),
                encoding.grammar_len()
            );
        }

        let iterations = encoding.iterations() as u64;
        let (grammar, tokens) = encoding.into_parts();
        let model = BpeModel::new(grammar, tokens, iterations)?;
        Ok(TrainerArtifacts { model, metrics })
    }

    fn log_progress(&self, snapshot: &IterationMetrics) {
        if !self.cfg.show_progress {
            return;
        }
        let (pair, frequency) = snapshot
            .last_merge
            .map(|record| (record.pair.to_string(), record.frequency))
            .unwrap_or_else(|| ("-".into(), 0));
        info!(
            "iter {:>8} tokens {:>10} vocab {:>8} pair {} freq {:>8} pairs {:>8} in {:.2?}",
            snapshot.iteration,
            snapshot.sequence_len,
            snapshot.grammar_len,
            pair,
            frequency,
            snapshot.queue_len,
            snapshot.elapsed_since_last
        );
    }
}

impl fmt::Display for TrainerArtifacts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "BPE grammar with vocab size {}", self.model.vocab_size())?;
        writeln!(f, "Reduced sequence length: {}", self.model.tokens().len())?;
        writeln!(f, "Stop reason: {:?}", self.metrics.stop_reason)?;
        writeln!(f, "Total duration: {:?}", self.metrics.total_duration)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Pair;
    use crate::serialization;
    use tempfile::tempdir;

    fn trainer(report_interval: usize) -> Trainer {
        let cfg = TrainerConfig::builder()
            .show_progress(false)
            .report_interval(report_interval)
            .parallel_seed(false)
            .build()
            .unwrap();
        Trainer::new(cfg)
    }

    #[test]
    fn trainer_produces_merges() {
        let input = b"the cat sat on the mat with the hat";
        let artefacts = trainer(1000).train_from_bytes(input).unwrap();
        assert!(!artefacts.model.merges().is_empty());
        assert!(artefacts.model.tokens().len() < input.len());
        assert_eq!(artefacts.metrics.merges, artefacts.model.merges().len());
        assert_eq!(artefacts.metrics.stop_reason, StopReason::Converged);
        assert_eq!(artefacts.metrics.reports.len(), 1);
    }

    #[test]
    fn observer_sees_every_interval() {
        let input: Vec<u8> = b"abcdabcdabcdabcdxyxyxyxy".repeat(8);
        let mut seen = Vec::new();
        let artefacts = trainer(1)
            .train_with_observer(&input, |snapshot| seen.push(snapshot.iteration))
            .unwrap();
        // One snapshot per merge, plus the final one taken on the converging step.
        assert_eq!(seen.len(), artefacts.metrics.merges + 1);
        assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(*seen.last().unwrap() as u64, artefacts.model.iterations());
    }

    #[test]
    fn repeated_bytes_reduce_to_two_tokens() {
        let artefacts = trainer(10).train_from_bytes(&[7u8; 64]).unwrap();
        assert_eq!(artefacts.model.tokens().len(), 2);
        assert_eq!(artefacts.model.merges()[0], Pair::new(7, 7));
        assert_eq!(artefacts.metrics.stop_reason, StopReason::Converged);
    }

    #[test]
    fn fully_reduced_streams_are_exhausted() {
        let artefacts = trainer(1000).train_from_bytes(b"ab").unwrap();
        assert_eq!(artefacts.model.tokens(), &[256]);
        assert_eq!(artefacts.model.merges(), &[Pair::new(97, 98)]);
        assert_eq!(artefacts.metrics.stop_reason, StopReason::Exhausted);

        let empty = trainer(1000).train_from_bytes(b"").unwrap();
        assert!(empty.model.tokens().is_empty());
        assert_eq!(empty.metrics.merges, 0);
        assert_eq!(empty.metrics.stop_reason, StopReason::Exhausted);
    }

    #[test]
    fn trains_from_file_and_persists() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("input.txt");
        std::fs::write(&input, "abracadabra abracadabra abracadabra").unwrap();
        let artefacts = trainer(1000).train_from_path(&input).unwrap();

        let path = dir.path().join("grammar.bpe");
        artefacts.model.save_binary(&path).unwrap();
        let loaded = serialization::load_model(&path).unwrap();
        assert_eq!(loaded, artefacts.model);
    }

    #[test]
    fn display_summarises_run() {
        let artefacts = trainer(1000).train_from_bytes(b"aaaa").unwrap();
        let text = artefacts.to_string();
        assert!(text.contains("vocab size 257"));
        assert!(text.contains("Reduced sequence length: 2"));
    }
}
