//! Sorted plain-text dump of the current region

use crate::artifacts::SnapshotStep;
use crate::collaborator::SnapshotRenderer;
use crate::graph::Graph;
use std::io::{self, Write};

/// Writes the statements in lexicographic order, one per line
#[derive(Debug, Clone, Copy, Default)]
pub struct FactDumpRenderer;

impl FactDumpRenderer {
    /// Create a renderer
    pub fn new() -> Self {
        Self
    }
}

impl SnapshotRenderer for FactDumpRenderer {
    fn extension(&self) -> &str {
        "nt"
    }

    fn render(&self, graph: &Graph, _step: &SnapshotStep<'_>, out: &mut dyn Write) -> io::Result<()> {
        let mut statements: Vec<&str> = graph.statements().collect();
        statements.sort_unstable();
        for statement in statements {
            writeln!(out, "{statement}")?;
        }
        Ok(())
    }
}
