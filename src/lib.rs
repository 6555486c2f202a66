//! Incremental byte pair encoding (BPE) training library and CLI.
//!
//! Training repeatedly finds the most frequent adjacent token pair in a byte stream,
//! mints a new token for it, and rewrites every occurrence in place until no pair occurs
//! more than once.  The result is a grammar (one production per minted token) and the
//! fully reduced token stream.
//!
//! Pair frequencies are maintained incrementally: a [`HeapMap`](heap_map::HeapMap) keeps
//! the set of positions of every pair ordered by set size, and a
//! [`LinkedArray`](linked_array::LinkedArray) lets a merge splice the stream in `O(1)`
//! without renumbering positions.
//!
//! ```no_run
//! use bytepair::{Trainer, TrainerConfig};
//!
//! # fn main() -> bytepair::Result<()> {
//! let cfg = TrainerConfig::builder()
//!     .report_interval(500)
//!     .show_progress(false)
//!     .build()?;
//! let artifacts = Trainer::new(cfg).train_from_path("corpus.txt")?;
//! artifacts.model.save_binary("grammar.bpe")?;
//! # Ok(())
//! # }
//! ```
//!
//! The CLI is enabled by default through the `cli` feature.  Library users can disable
//! default features to avoid the CLI dependencies.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    clippy::all,
    rust_2018_idioms,
    future_incompatible,
    unused_lifetimes,
    unreachable_pub
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::doc_markdown
)]

pub mod config;
pub mod corpus;
pub mod encoding;
pub mod error;
pub mod heap_map;
pub mod linked_array;
pub mod metrics;
pub mod model;
pub mod serialization;
pub mod trainer;

pub use config::{TrainerBuilder, TrainerConfig};
pub use encoding::{Encoding, MergeRecord, Step};
pub use error::{BytepairError, Result};
pub use metrics::{IterationMetrics, Reporter, StopReason, TrainingMetrics};
pub use model::{BpeModel, Grammar, Pair, TokenId};
pub use trainer::{Trainer, TrainerArtifacts};
