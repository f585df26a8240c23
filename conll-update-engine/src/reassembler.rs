//! Restores arrival order over out-of-order worker completions

use crate::block::is_namespace_declaration;
use crate::config::FailurePolicy;
use log::trace;
use std::collections::VecDeque;
use std::io::{self, Write};

/// Rendered result of one sentence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The update program ran to completion
    Completed(String),
    /// The sentence failed; `partial` is whatever could still be rendered
    Failed {
        /// Best-effort output
        partial: String,
        /// Failure description
        reason: String,
    },
}

impl TaskOutcome {
    /// Whether the sentence failed
    pub fn is_failed(&self) -> bool {
        matches!(self, TaskOutcome::Failed { .. })
    }
}

/// Reserved output position of a dispatched sentence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

impl Ticket {
    /// 0-based arrival position
    pub fn position(self) -> u64 {
        self.0
    }
}

/// Placeholders in arrival order, filled as workers finish
#[derive(Debug, Default)]
pub struct OutputQueue {
    head: u64,
    entries: VecDeque<Option<TaskOutcome>>,
}

impl OutputQueue {
    /// Empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a placeholder for the next sentence
    pub fn reserve(&mut self) -> Ticket {
        let ticket = Ticket(self.head + self.entries.len() as u64);
        self.entries.push_back(None);
        ticket
    }

    /// Fill a reserved placeholder; stale or repeated tickets are ignored
    pub fn resolve(&mut self, ticket: Ticket, outcome: TaskOutcome) {
        let Some(offset) = ticket.0.checked_sub(self.head) else {
            return;
        };
        if let Some(entry) = self.entries.get_mut(offset as usize) {
            if entry.is_none() {
                *entry = Some(outcome);
            }
        }
    }

    /// Remove the head entry if it is resolved
    pub fn pop_ready(&mut self) -> Option<TaskOutcome> {
        if !matches!(self.entries.front(), Some(Some(_))) {
            return None;
        }
        self.head += 1;
        self.entries.pop_front().flatten()
    }

    /// Entries reserved but not yet emitted
    pub fn in_flight(&self) -> usize {
        self.entries.len()
    }

    /// Whether every reserved entry has been emitted
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Writes resolved outcomes in order
#[derive(Debug)]
pub struct OutputReassembler<W: Write> {
    writer: W,
    prefix_deduplication: bool,
    failure_policy: FailurePolicy,
    last_prefixes: String,
    emitted: u64,
    failed: u64,
}

impl<W: Write> OutputReassembler<W> {
    /// Create a reassembler over a writer
    pub fn new(writer: W, prefix_deduplication: bool, failure_policy: FailurePolicy) -> Self {
        Self {
            writer,
            prefix_deduplication,
            failure_policy,
            last_prefixes: String::new(),
            emitted: 0,
            failed: 0,
        }
    }

    /// Emit every resolved entry at the head of the queue; returns how many
    pub fn flush_ready(&mut self, queue: &mut OutputQueue) -> io::Result<usize> {
        let mut count = 0;
        while let Some(outcome) = queue.pop_ready() {
            self.emit(outcome)?;
            count += 1;
        }
        if count > 0 {
            trace!("Flushed {count} sentences, {} in flight", queue.in_flight());
        }
        Ok(count)
    }

    /// Write one outcome
    pub fn emit(&mut self, outcome: TaskOutcome) -> io::Result<()> {
        let text = match outcome {
            TaskOutcome::Completed(text) => text,
            TaskOutcome::Failed { partial, reason } => {
                self.failed += 1;
                match self.failure_policy {
                    FailurePolicy::Silent => partial,
                    FailurePolicy::Annotate => {
                        format!("# UPDATE FAILED: {}\n{partial}", single_line(&reason))
                    }
                }
            }
        };

        let mut text = if self.prefix_deduplication {
            self.deduplicate(&text)
        } else {
            text
        };
        if !text.ends_with("\n\n") {
            text.push('\n');
        }

        self.writer.write_all(text.as_bytes())?;
        self.emitted += 1;
        Ok(())
    }

    /// Sentences written so far
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Failed sentences written so far
    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// Flush the underlying writer
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Recover the writer
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn deduplicate(&mut self, text: &str) -> String {
        let mut prefixes = String::new();
        let mut body = String::new();
        for line in text.lines() {
            if is_namespace_declaration(line) {
                prefixes.push_str(line);
                prefixes.push('\n');
            } else if !line.trim().is_empty() {
                body.push_str(line);
                body.push('\n');
            }
        }

        if prefixes != self.last_prefixes {
            let out = format!("{prefixes}{body}\n");
            self.last_prefixes = prefixes;
            out
        } else {
            body
        }
    }
}

fn single_line(reason: &str) -> String {
    reason.split_whitespace().collect::<Vec<_>>().join(" ")
}
