//! Streaming graph-rewrite engine for sentence-annotated corpora
//!
//! Input is cut into sentence blocks, each block is handed to a fixed pool of
//! worker threads together with a window of surrounding sentences, an ordered
//! update program is applied to it until every rule reaches its iteration cap
//! or a fixpoint, and results are written back in input order.
//!
//! ```no_run
//! use conll_update_engine::{RuleSpec, Updater};
//!
//! let updater = Updater::builder()
//!     .lookahead(1)
//!     .update("DELETE /PUNCT/{u}".parse::<RuleSpec>()?)
//!     .build()?;
//! let stdin = std::io::stdin();
//! let summary = updater.run(stdin.lock(), std::io::stdout())?;
//! eprintln!("{} sentences", summary.sentences);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]

pub mod artifacts;
pub mod block;
pub mod builtin;
pub mod collaborator;
pub mod config;
pub mod error;
pub mod graph;
pub mod reassembler;
pub mod rule;
pub mod scheduler;
pub mod segmenter;
pub mod stats;
pub mod updater;
pub mod window;
mod worker;

// Re-export key types
pub use artifacts::{ArtifactTarget, SnapshotStep};
pub use block::SentenceBlock;
pub use collaborator::{RuleEngine, SentenceCodec, SnapshotRenderer};
pub use config::{FailurePolicy, UpdaterConfig, UpdaterConfigBuilder};
pub use error::{ConfigError, EngineError, Result, RuleError, TaskError};
pub use graph::{BaseDataset, Graph, Workspace};
pub use reassembler::{OutputQueue, OutputReassembler, TaskOutcome, Ticket};
pub use rule::{IterationCap, RuleSpec, UpdateProgram, UpdateRule};
pub use scheduler::{Scheduler, SlotState, StopToken};
pub use segmenter::{Segments, StreamSegmenter};
pub use stats::{RuleStats, StatsAggregator, UpdateStats};
pub use updater::{RunSummary, Updater, UpdaterBuilder};
pub use window::{SentenceContext, WindowBuffer};
