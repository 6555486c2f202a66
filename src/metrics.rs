//! Progress snapshots describing the evolution of a training run.
//!
//! [`Encoding`] only answers plain queries.  A [`Reporter`] owns the clock, turns those
//! queries into an [`IterationMetrics`] snapshot whenever the caller decides to look, and
//! measures the wall time between consecutive snapshots.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::encoding::{Encoding, MergeRecord};

/// Reason a training run terminated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StopReason {
    /// Pairs remain but none occurs more than once.
    Converged,
    /// The stream was reduced until no adjacent pair was left at all.
    Exhausted,
}

/// Snapshot of the training state taken by a [`Reporter`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IterationMetrics {
    /// Number of reduction steps performed so far.
    pub iteration: usize,
    /// Current length of the token stream.
    pub sequence_len: usize,
    /// Current vocabulary size.
    pub grammar_len: usize,
    /// Most recent merge, if any.
    pub last_merge: Option<MergeRecord>,
    /// Distinct pairs still present in the stream.
    pub queue_len: usize,
    /// Wall time since the previous snapshot (or since the reporter was created).
    pub elapsed_since_last: Duration,
    /// Wall time since the reporter was created.
    pub elapsed_total: Duration,
    /// Resident set size sample captured from `/proc/self/status` on Linux.
    pub rss_kb: Option<usize>,
}

/// Aggregate metrics produced by a training session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingMetrics {
    /// Snapshots taken at every report interval.
    pub reports: Vec<IterationMetrics>,
    /// Number of merges performed.
    pub merges: usize,
    /// Total duration of the training session.
    pub total_duration: Duration,
    /// Reason training terminated.
    pub stop_reason: StopReason,
}

impl TrainingMetrics {
    /// Creates an empty metrics container with pre-allocated capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            reports: Vec::with_capacity(capacity),
            merges: 0,
            total_duration: Duration::ZERO,
            stop_reason: StopReason::Converged,
        }
    }
}

/// Reporting collaborator that samples an [`Encoding`] on its own schedule.
#[derive(Debug, Clone)]
pub struct Reporter {
    started: Instant,
    last: Instant,
}

impl Reporter {
    /// Starts both clocks now.
    #[must_use]
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last: now,
        }
    }

    /// Takes a snapshot and restarts the interval clock.
    pub fn observe(&mut self, encoding: &Encoding) -> IterationMetrics {
        let now = Instant::now();
        let snapshot = IterationMetrics {
            iteration: encoding.iterations(),
            sequence_len: encoding.sequence_len(),
            grammar_len: encoding.grammar_len(),
            last_merge: encoding.last_merge(),
            queue_len: encoding.queue_len(),
            elapsed_since_last: now.duration_since(self.last),
            elapsed_total: now.duration_since(self.started),
            rss_kb: sample_rss_kb(),
        };
        self.last = now;
        snapshot
    }

    /// Time since the reporter was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "linux")]
fn current_rss_kb() -> Option<usize> {
    use std::fs::File;
    use std::io::{BufRead, BufReader};

    let file = File::open("/proc/self/status").ok()?;
    for line in BufReader::new(file).lines().map_while(Result::ok) {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            return rest
                .split_whitespace()
                .find_map(|part| part.parse::<usize>().ok());
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
fn current_rss_kb() -> Option<usize> {
    None
}

/// Samples the current resident set size (RSS) on supported platforms.
pub fn sample_rss_kb() -> Option<usize> {
    current_rss_kb()
}
