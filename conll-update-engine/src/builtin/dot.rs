//! Graphviz rendering of the current region

use crate::artifacts::SnapshotStep;
use crate::collaborator::SnapshotRenderer;
use crate::graph::Graph;
use std::io::{self, Write};

/// Draws every `subject predicate object .` statement as a labelled edge
#[derive(Debug, Clone, Copy, Default)]
pub struct DotRenderer;

impl DotRenderer {
    /// Create a renderer
    pub fn new() -> Self {
        Self
    }
}

impl SnapshotRenderer for DotRenderer {
    fn extension(&self) -> &str {
        "dot"
    }

    fn render(&self, graph: &Graph, step: &SnapshotStep<'_>, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "digraph \"{}\" {{", escape(step.sentence_id))?;
        writeln!(out, "  charset=\"utf-8\";")?;
        writeln!(
            out,
            "  label=\"{}\";",
            escape(step.operation.unwrap_or(step.rule_name))
        )?;
        for statement in graph.statements() {
            if let Some((subject, predicate, object)) = split_statement(statement) {
                writeln!(
                    out,
                    "  \"{}\" -> \"{}\" [label=\"{}\"];",
                    escape(subject),
                    escape(object),
                    escape(predicate)
                )?;
            }
        }
        writeln!(out, "}}")
    }
}

fn split_statement(statement: &str) -> Option<(&str, &str, &str)> {
    let statement = statement.trim_end().trim_end_matches('.').trim_end();
    let (subject, rest) = statement.split_once(' ')?;
    let (predicate, object) = rest.split_once(' ')?;
    Some((subject, predicate, object.trim()))
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}
