//! Per-step debug snapshots of the sentence being rewritten

use crate::collaborator::SnapshotRenderer;
use crate::error::ConfigError;
use crate::graph::Graph;
use log::{debug, error};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

/// Rule name of the snapshot taken before any rule runs
pub const INIT_STEP_NAME: &str = "INIT";

/// Sentence id used when the codec finds none
pub const UNKNOWN_SENTENCE_ID: &str = "none";

/// Where a kind of snapshot goes and which sentences it covers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactTarget {
    /// Output directory, created on activation if missing
    pub dir: PathBuf,
    /// Sentence ids to snapshot; empty means the first sentence of the run
    pub sentences: Vec<String>,
}

impl ArtifactTarget {
    /// Target a directory for the given sentences
    pub fn new(dir: impl Into<PathBuf>, sentences: Vec<String>) -> Self {
        Self {
            dir: dir.into(),
            sentences,
        }
    }
}

/// Position of a snapshot within a sentence's rule execution
#[derive(Debug, Clone, Copy)]
pub struct SnapshotStep<'a> {
    /// Name of the rule that produced this state
    pub rule_name: &'a str,
    /// The sub-operation that was just applied
    pub operation: Option<&'a str>,
    /// Sentence identifier
    pub sentence_id: &'a str,
    /// 1-based rule position (0 for the initial state)
    pub rule_index: usize,
    /// 1-based iteration of the rule (0 for the initial state)
    pub iteration: u32,
    /// 1-based sub-operation within the iteration (0 for the initial state)
    pub step: usize,
}

impl SnapshotStep<'_> {
    /// Deterministic artifact file name
    pub fn file_name(&self, extension: &str) -> String {
        format!(
            "{}__U{:03}_I{:04}_S{:03}__{}.{}",
            self.sentence_id, self.rule_index, self.iteration, self.step, self.rule_name, extension
        )
    }
}

#[derive(Clone)]
struct ArtifactSink {
    dir: PathBuf,
    sentences: Vec<String>,
    renderer: Arc<dyn SnapshotRenderer>,
}

/// Indices of the sinks that snapshot a given sentence
#[derive(Debug, Default)]
pub(crate) struct Selection(Vec<usize>);

impl Selection {
    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The configured snapshot sinks of a run
pub struct Artifacts {
    sinks: Vec<ArtifactSink>,
    first_sentence: OnceLock<String>,
}

impl Artifacts {
    /// No snapshots
    pub fn disabled() -> Self {
        Self {
            sinks: Vec::new(),
            first_sentence: OnceLock::new(),
        }
    }

    /// Prepare every target directory; an unusable directory is fatal
    pub fn activate(
        targets: Vec<(ArtifactTarget, Arc<dyn SnapshotRenderer>)>,
    ) -> Result<Self, ConfigError> {
        let mut sinks = Vec::with_capacity(targets.len());
        for (target, renderer) in targets {
            prepare_dir(&target.dir)?;
            debug!(
                "Writing .{} snapshots to {}",
                renderer.extension(),
                target.dir.display()
            );
            sinks.push(ArtifactSink {
                dir: target.dir,
                sentences: target.sentences,
                renderer,
            });
        }

        Ok(Self {
            sinks,
            first_sentence: OnceLock::new(),
        })
    }

    /// Same sinks, with the first-sentence default not yet observed
    pub fn for_run(&self) -> Self {
        Self {
            sinks: self.sinks.clone(),
            first_sentence: OnceLock::new(),
        }
    }

    /// Whether any snapshot sink is configured
    pub fn is_active(&self) -> bool {
        !self.sinks.is_empty()
    }

    /// Remember the id of the first sentence of the run; later calls are ignored
    pub fn note_first_sentence(&self, sentence_id: &str) {
        if self.first_sentence.set(sentence_id.to_string()).is_ok() {
            debug!("Snapshots default to first sentence: {sentence_id}");
        }
    }

    /// The id snapshots default to when a sink has no explicit sentence list
    pub fn first_sentence(&self) -> Option<&str> {
        self.first_sentence.get().map(String::as_str)
    }

    pub(crate) fn select(&self, sentence_id: &str) -> Selection {
        let first = self.first_sentence();
        Selection(
            self.sinks
                .iter()
                .enumerate()
                .filter(|(_, sink)| {
                    if sink.sentences.is_empty() {
                        first == Some(sentence_id)
                    } else {
                        sink.sentences.iter().any(|id| id == sentence_id)
                    }
                })
                .map(|(index, _)| index)
                .collect(),
        )
    }

    /// Write one snapshot per selected sink; failures are logged and skipped
    pub(crate) fn emit(&self, selection: &Selection, graph: &Graph, step: &SnapshotStep<'_>) {
        for &index in &selection.0 {
            let sink = &self.sinks[index];
            let extension = sink.renderer.extension();
            let path = sink.dir.join(step.file_name(extension));
            if let Err(e) = write_snapshot(&path, sink.renderer.as_ref(), graph, step) {
                error!(
                    "Error while producing {} for update No. {}: {} ({e})",
                    extension.to_uppercase(),
                    step.rule_index,
                    step.rule_name
                );
            }
        }
    }
}

impl std::fmt::Debug for Artifacts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Artifacts")
            .field("sinks", &self.sinks.len())
            .field("first_sentence", &self.first_sentence.get())
            .finish()
    }
}

fn write_snapshot(
    path: &Path,
    renderer: &dyn SnapshotRenderer,
    graph: &Graph,
    step: &SnapshotStep<'_>,
) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    renderer.render(graph, step, &mut writer)?;
    writer.flush()
}

fn prepare_dir(dir: &Path) -> Result<(), ConfigError> {
    let unusable = |reason: String| ConfigError::ArtifactDirectory {
        path: dir.to_path_buf(),
        reason,
    };

    if dir.exists() {
        if !dir.is_dir() {
            return Err(unusable("not a directory".to_string()));
        }
        return Ok(());
    }

    fs::create_dir_all(dir).map_err(|e| unusable(format!("failed to create: {e}")))
}
