//! Layered error types
//!
//! Configuration problems are reported before any input is read, per-sentence
//! problems are recovered inside the worker, and everything else aborts the run.

use std::path::PathBuf;
use thiserror::Error;

/// Errors detected while configuring an updater, before streaming starts
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A numeric setting is out of range
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// An iteration suffix such as `{0}` or `{x}` could not be parsed
    #[error("invalid iteration cap '{spec}' in rule argument '{argument}'")]
    InvalidIterationCap {
        /// The full rule argument
        argument: String,
        /// The text between the braces
        spec: String,
    },

    /// A rule argument names a file that does not exist
    #[error("rule No. {index} looks like a file path, but {path:?} could not be found")]
    MissingRuleFile {
        /// 1-based position of the rule in the program
        index: usize,
        /// The path that was tried
        path: PathBuf,
    },

    /// The rule engine rejected the rule text
    #[error("malformed rule No. {index} ({name}): {source}")]
    MalformedRule {
        /// 1-based position of the rule in the program
        index: usize,
        /// Rule name
        name: String,
        /// Parser error reported by the rule engine
        #[source]
        source: RuleError,
    },

    /// A file could not be read
    #[error("failed to read {path:?}: {source}")]
    Unreadable {
        /// The path that was read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A rule or reference graph is not valid UTF-8
    #[error("{path:?} is not UTF-8 encoded")]
    NotUtf8 {
        /// The offending file
        path: PathBuf,
    },

    /// A reference graph could not be parsed by the codec
    #[error("failed to load reference graph {location} into <{graph}>: {source}")]
    GraphLoad {
        /// Location the graph was read from
        location: String,
        /// Target graph name in the base dataset
        graph: String,
        /// Codec error
        #[source]
        source: TaskError,
    },

    /// An artifact output directory is unusable
    #[error("artifact directory {path:?} is not usable: {reason}")]
    ArtifactDirectory {
        /// The configured directory
        path: PathBuf,
        /// Why it was rejected
        reason: String,
    },
}

/// Errors raised by a rule engine collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    /// The rule text could not be parsed
    #[error("syntax error in operation '{operation}': {reason}")]
    Syntax {
        /// The offending operation
        operation: String,
        /// Parser message
        reason: String,
    },

    /// The rule contains no operations
    #[error("rule contains no operations")]
    Empty,

    /// An operation failed while executing
    #[error("execution failed: {0}")]
    Execution(String),
}

/// Errors that affect a single sentence
#[derive(Error, Debug)]
pub enum TaskError {
    /// The block could not be parsed into a graph
    #[error("failed to parse sentence: {0}")]
    Parse(String),

    /// The graph could not be serialized
    #[error("failed to serialize sentence: {0}")]
    Serialize(String),

    /// A rule failed while executing
    #[error("rule No. {index} ({name}) failed: {source}")]
    Rule {
        /// 1-based rule position
        index: usize,
        /// Rule name
        name: String,
        /// Rule engine error
        #[source]
        source: RuleError,
    },

    /// Input text is not trustworthy; aborts the whole run
    #[error("input data encoding issue: {0}")]
    Encoding(String),

    /// A collaborator panicked
    #[error("worker panicked: {0}")]
    Panic(String),
}

impl TaskError {
    /// Whether this failure must abort the run instead of being recovered
    pub fn is_fatal(&self) -> bool {
        matches!(self, TaskError::Encoding(_))
    }
}

/// Run-level errors
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// I/O error on the input or output stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding error (UTF-8, etc.)
    #[error("encoding error: {0}")]
    Encoding(String),

    /// A worker thread could not be spawned
    #[error("failed to spawn worker {id}: {reason}")]
    Spawn {
        /// Slot id
        id: usize,
        /// OS error message
        reason: String,
    },
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
