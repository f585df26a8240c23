//! One statement per line

use crate::block::{is_comment, is_directive, is_namespace_declaration, normalize_line};
use crate::collaborator::SentenceCodec;
use crate::error::TaskError;
use crate::graph::Graph;

/// Type marker of sentence resources
pub const SENTENCE_TYPE: &str = "nif:Sentence";

/// Reads every non-directive line of a block as one `.`-terminated statement
/// and `@prefix` lines as namespace declarations
#[derive(Debug, Clone, Copy, Default)]
pub struct LineCodec;

impl LineCodec {
    /// Create a codec
    pub fn new() -> Self {
        Self
    }
}

impl SentenceCodec for LineCodec {
    fn parse(&self, text: &str, graph: &mut Graph) -> Result<(), TaskError> {
        for (i, raw) in text.lines().enumerate() {
            let line = normalize_line(raw);
            if line.is_empty() || is_comment(&line) {
                continue;
            }
            if is_namespace_declaration(&line) {
                graph.add_prefix(line);
                continue;
            }
            if is_directive(&line) {
                return Err(TaskError::Parse(format!(
                    "unsupported directive on line {}: {line}",
                    i + 1
                )));
            }
            if !line.ends_with('.') {
                return Err(TaskError::Parse(format!(
                    "line {} is not a terminated statement: {line}",
                    i + 1
                )));
            }
            graph.insert(line);
        }
        Ok(())
    }

    fn serialize(&self, graph: &Graph, out: &mut String) -> Result<(), TaskError> {
        for prefix in graph.prefixes() {
            out.push_str(prefix);
            out.push('\n');
        }
        for statement in graph.statements() {
            out.push_str(statement);
            out.push('\n');
        }
        Ok(())
    }

    fn sentence_id(&self, graph: &Graph) -> Option<String> {
        graph.statements().find_map(|statement| {
            let mut tokens = statement.split_whitespace();
            let subject = tokens.next()?;
            let is_sentence = tokens.next() == Some("a")
                && tokens.next().map(|t| t.trim_end_matches(['.', ';'])) == Some(SENTENCE_TYPE);
            is_sentence.then(|| local_name(subject).to_string())
        })
    }
}

/// The part of a resource name after its namespace
fn local_name(resource: &str) -> &str {
    let resource = resource.trim_start_matches('<').trim_end_matches('>');
    resource
        .rsplit(['#', '/', ':'])
        .next()
        .unwrap_or(resource)
}
