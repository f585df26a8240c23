//! The streaming updater: segmentation, windowing, dispatch and reassembly

use crate::artifacts::{ArtifactTarget, Artifacts};
use crate::builtin::{DotRenderer, FactDumpRenderer, LineCodec, PatternRuleEngine};
use crate::collaborator::{RuleEngine, SentenceCodec, SnapshotRenderer};
use crate::config::UpdaterConfig;
use crate::error::{ConfigError, Result};
use crate::graph::{BaseDataset, Graph};
use crate::reassembler::OutputReassembler;
use crate::rule::{RuleSpec, UpdateProgram};
use crate::scheduler::Scheduler;
use crate::segmenter::Segments;
use crate::stats::{StatsAggregator, UpdateStats};
use crate::window::WindowBuffer;
use crate::worker::Pipeline;
use log::{debug, info, trace};
use serde::Serialize;
use std::fs;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;

/// What a finished run produced
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// Sentences written to the output
    pub sentences: u64,
    /// Sentences whose update failed
    pub failed: u64,
    /// Per-rule totals
    pub stats: UpdateStats,
}

/// Applies an update program to every sentence of a stream
pub struct Updater {
    config: UpdaterConfig,
    program: Arc<UpdateProgram>,
    codec: Arc<dyn SentenceCodec>,
    rules: Arc<dyn RuleEngine>,
    artifacts: Artifacts,
    base: BaseDataset,
}

impl Updater {
    /// Create a builder
    pub fn builder() -> UpdaterBuilder {
        UpdaterBuilder::new()
    }

    /// The configuration in use
    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    /// The loaded update program
    pub fn program(&self) -> &UpdateProgram {
        &self.program
    }

    /// Reference graphs loaded so far
    pub fn base(&self) -> &BaseDataset {
        &self.base
    }

    /// Read a reference graph through the codec into the base dataset
    ///
    /// The graph name defaults to the location. Graphs are visible to every
    /// run started afterwards.
    pub fn load_graph(
        &mut self,
        location: impl AsRef<Path>,
        name: Option<&str>,
    ) -> std::result::Result<(), ConfigError> {
        let path = location.as_ref();
        let location = path.display().to_string();
        let name = name.map_or_else(|| location.clone(), str::to_string);

        let bytes = fs::read(path).map_err(|e| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source: e,
        })?;
        let text = String::from_utf8(bytes).map_err(|_| ConfigError::NotUtf8 {
            path: path.to_path_buf(),
        })?;

        let mut graph = Graph::new();
        self.codec
            .parse(&text, &mut graph)
            .map_err(|source| ConfigError::GraphLoad {
                location: location.clone(),
                graph: name.clone(),
                source,
            })?;

        info!(
            "Loaded {} statements from {location} into <{name}>",
            graph.len()
        );
        self.base.merge(name, graph);
        Ok(())
    }

    /// Process the whole input stream
    pub fn run<R: BufRead, W: Write>(&self, input: R, output: W) -> Result<RunSummary> {
        self.run_with_progress(input, output, |_| {})
    }

    /// Process the whole input stream, reporting the number of sentences
    /// written after every flush
    pub fn run_with_progress<R, W, F>(&self, input: R, output: W, mut progress: F) -> Result<RunSummary>
    where
        R: BufRead,
        W: Write,
        F: FnMut(u64),
    {
        let pipeline = Arc::new(Pipeline {
            program: Arc::clone(&self.program),
            codec: Arc::clone(&self.codec),
            rules: Arc::clone(&self.rules),
            artifacts: Arc::new(self.artifacts.for_run()),
            base: Arc::new(self.base.clone()),
            max_iterations: self.config.max_iterations,
        });
        let workers = self.config.worker_count();
        info!(
            "Updating with {workers} workers, lookahead {}, lookback {}",
            self.config.lookahead, self.config.lookback
        );

        let mut scheduler = Scheduler::new(workers, self.config.backoff, pipeline);
        let mut window = WindowBuffer::new(self.config.lookback, self.config.lookahead);
        let mut out = OutputReassembler::new(
            output,
            self.config.prefix_deduplication,
            self.config.failure_policy,
        );

        for block in Segments::new(input) {
            if let Some(context) = window.push(block?) {
                scheduler.dispatch(context)?;
                flush(&scheduler, &mut out, &mut progress)?;
            }
        }
        while let Some(context) = window.drain() {
            scheduler.dispatch(context)?;
            flush(&scheduler, &mut out, &mut progress)?;
        }

        scheduler.wait_idle()?;
        flush(&scheduler, &mut out, &mut progress)?;
        let histories = scheduler.shutdown()?;
        out.flush()?;
        progress(out.emitted());

        let mut aggregator = StatsAggregator::new(&self.program);
        for history in &histories {
            aggregator.add(history);
        }
        let stats = aggregator.finish();
        debug!("Update statistics:\n{stats}");

        Ok(RunSummary {
            sentences: out.emitted(),
            failed: out.failed(),
            stats,
        })
    }
}

fn flush<W: Write>(
    scheduler: &Scheduler,
    out: &mut OutputReassembler<W>,
    progress: &mut impl FnMut(u64),
) -> Result<()> {
    let ready = scheduler.take_ready();
    if ready.is_empty() {
        return Ok(());
    }
    for outcome in ready {
        out.emit(outcome)?;
    }
    trace!("{} sentences written, {} in flight", out.emitted(), scheduler.in_flight());
    progress(out.emitted());
    Ok(())
}

impl std::fmt::Debug for Updater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Updater")
            .field("config", &self.config)
            .field("rules", &self.program.len())
            .field("graphs", &self.base.len())
            .finish()
    }
}

/// Builder for [`Updater`]
///
/// Collaborators default to the built-in line codec, pattern rule engine,
/// Graphviz renderer and sorted fact dump.
pub struct UpdaterBuilder {
    config: UpdaterConfig,
    updates: Vec<RuleSpec>,
    codec: Option<Arc<dyn SentenceCodec>>,
    rules: Option<Arc<dyn RuleEngine>>,
    graph_renderer: Option<Arc<dyn SnapshotRenderer>>,
    fact_renderer: Option<Arc<dyn SnapshotRenderer>>,
}

impl Default for UpdaterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdaterBuilder {
    /// Create a builder with the default configuration
    pub fn new() -> Self {
        Self {
            config: UpdaterConfig::default(),
            updates: Vec::new(),
            codec: None,
            rules: None,
            graph_renderer: None,
            fact_renderer: None,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: UpdaterConfig) -> Self {
        self.config = config;
        self
    }

    /// Set thread count
    pub fn threads(mut self, threads: Option<usize>) -> Self {
        self.config.threads = threads;
        self
    }

    /// Set lookahead size
    pub fn lookahead(mut self, lookahead: usize) -> Self {
        self.config.lookahead = lookahead;
        self
    }

    /// Set lookback size
    pub fn lookback(mut self, lookback: usize) -> Self {
        self.config.lookback = lookback;
        self
    }

    /// Append a rule to the program
    pub fn update(mut self, spec: RuleSpec) -> Self {
        self.updates.push(spec);
        self
    }

    /// Append several rules to the program
    pub fn updates(mut self, specs: impl IntoIterator<Item = RuleSpec>) -> Self {
        self.updates.extend(specs);
        self
    }

    /// Write `.dot` snapshots into a directory
    pub fn graphs(mut self, target: ArtifactTarget) -> Self {
        self.config.graphs = Some(target);
        self
    }

    /// Write `.nt` snapshots into a directory
    pub fn facts(mut self, target: ArtifactTarget) -> Self {
        self.config.facts = Some(target);
        self
    }

    /// Use a custom codec
    pub fn codec(mut self, codec: Arc<dyn SentenceCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    /// Use a custom rule engine
    pub fn rule_engine(mut self, rules: Arc<dyn RuleEngine>) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Use a custom renderer for graph snapshots
    pub fn graph_renderer(mut self, renderer: Arc<dyn SnapshotRenderer>) -> Self {
        self.graph_renderer = Some(renderer);
        self
    }

    /// Use a custom renderer for fact dumps
    pub fn fact_renderer(mut self, renderer: Arc<dyn SnapshotRenderer>) -> Self {
        self.fact_renderer = Some(renderer);
        self
    }

    /// Validate the configuration, load the program and prepare artifact
    /// directories
    pub fn build(self) -> std::result::Result<Updater, ConfigError> {
        self.config.validate()?;

        let codec = self.codec.unwrap_or_else(|| Arc::new(LineCodec::new()));
        let rules = self
            .rules
            .unwrap_or_else(|| Arc::new(PatternRuleEngine::new()));
        let program = UpdateProgram::load(&self.updates, rules.as_ref())?;

        let mut targets: Vec<(ArtifactTarget, Arc<dyn SnapshotRenderer>)> = Vec::new();
        if let Some(target) = &self.config.graphs {
            let renderer = self
                .graph_renderer
                .unwrap_or_else(|| Arc::new(DotRenderer::new()));
            targets.push((target.clone(), renderer));
        }
        if let Some(target) = &self.config.facts {
            let renderer = self
                .fact_renderer
                .unwrap_or_else(|| Arc::new(FactDumpRenderer::new()));
            targets.push((target.clone(), renderer));
        }
        let artifacts = Artifacts::activate(targets)?;

        debug!("Update program with {} rules", program.len());
        Ok(Updater {
            config: self.config,
            program: Arc::new(program),
            codec,
            rules,
            artifacts,
            base: BaseDataset::new(),
        })
    }
}
