//! Seams to the external collaborators: block parsing/serialization, rule
//! execution and snapshot rendering

use crate::artifacts::SnapshotStep;
use crate::error::{RuleError, TaskError};
use crate::graph::{Graph, Workspace};
use crate::rule::UpdateRule;
use std::io;

/// Parses sentence blocks into graphs and writes them back
pub trait SentenceCodec: Send + Sync {
    /// Parse block text into `graph`
    fn parse(&self, text: &str, graph: &mut Graph) -> Result<(), TaskError>;

    /// Append the serialized graph to `out`
    fn serialize(&self, graph: &Graph, out: &mut String) -> Result<(), TaskError>;

    /// Identifier of the sentence held in `graph`, if it declares one
    fn sentence_id(&self, graph: &Graph) -> Option<String>;
}

/// Executes rewrite rules against a workspace
pub trait RuleEngine: Send + Sync {
    /// Validate rule text and split it into its ordered sub-operations
    fn prepare(&self, text: &str) -> Result<Vec<String>, RuleError>;

    /// Run one sub-operation; returns whether the current region changed
    fn apply(&self, workspace: &mut Workspace, operation: &str) -> Result<bool, RuleError>;

    /// Run every sub-operation of a rule once
    fn apply_rule(&self, workspace: &mut Workspace, rule: &UpdateRule) -> Result<bool, RuleError> {
        let mut changed = false;
        for operation in rule.operations() {
            changed |= self.apply(workspace, operation)?;
        }
        Ok(changed)
    }
}

/// Renders a debug snapshot of the current region
pub trait SnapshotRenderer: Send + Sync {
    /// File extension, without the dot
    fn extension(&self) -> &str;

    /// Write the snapshot
    fn render(&self, graph: &Graph, step: &SnapshotStep<'_>, out: &mut dyn io::Write) -> io::Result<()>;
}
