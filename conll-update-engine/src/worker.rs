//! Per-thread rule execution
//!
//! An [`UpdateEngine`] owns one private [`Workspace`]. For every sentence it
//! loads the context into the workspace, runs the update program against the
//! current region and renders the result; per-sentence failures are turned
//! into [`TaskOutcome::Failed`] and never take the worker down.

use crate::artifacts::{Artifacts, Selection, SnapshotStep, INIT_STEP_NAME, UNKNOWN_SENTENCE_ID};
use crate::collaborator::{RuleEngine, SentenceCodec};
use crate::config::defaults::CHECK_INTERVALS;
use crate::error::{RuleError, TaskError};
use crate::graph::{BaseDataset, Graph, Workspace};
use crate::reassembler::TaskOutcome;
use crate::rule::{UpdateProgram, UpdateRule};
use crate::stats::{RuleRun, WorkerStats};
use crate::window::SentenceContext;
use log::{debug, trace, warn};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// Everything a worker needs that is fixed for the whole run
pub(crate) struct Pipeline {
    pub(crate) program: Arc<UpdateProgram>,
    pub(crate) codec: Arc<dyn SentenceCodec>,
    pub(crate) rules: Arc<dyn RuleEngine>,
    pub(crate) artifacts: Arc<Artifacts>,
    pub(crate) base: Arc<BaseDataset>,
    pub(crate) max_iterations: u32,
}

/// Rule executor bound to one worker slot
pub(crate) struct UpdateEngine {
    id: usize,
    pipeline: Arc<Pipeline>,
    workspace: Workspace,
    stats: WorkerStats,
}

impl UpdateEngine {
    pub(crate) fn new(id: usize, pipeline: Arc<Pipeline>) -> Self {
        Self {
            id,
            workspace: Workspace::new(Arc::clone(&pipeline.base)),
            stats: WorkerStats::new(pipeline.program.len()),
            pipeline,
        }
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    /// Transform one sentence
    ///
    /// `Err` is reserved for fatal errors; every other failure yields
    /// [`TaskOutcome::Failed`] with whatever output is left.
    pub(crate) fn process(
        &mut self,
        context: &SentenceContext,
        first: bool,
    ) -> Result<TaskOutcome, TaskError> {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.transform(context, first)));

        let failure = match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) if e.is_fatal() => {
                self.workspace.clear();
                return Err(e);
            }
            Ok(Err(e)) => Some(e.to_string()),
            Err(payload) => Some(TaskError::Panic(panic_message(payload.as_ref())).to_string()),
        };

        if let Some(reason) = &failure {
            warn!("Worker {}: sentence update failed: {reason}", self.id);
            self.workspace.clear();
        }

        let outcome = self.unload(context, failure);
        self.stats.finish_sentence();
        outcome
    }

    /// History accumulated so far
    pub(crate) fn into_stats(self) -> WorkerStats {
        self.stats
    }

    fn transform(&mut self, context: &SentenceContext, first: bool) -> Result<(), TaskError> {
        self.load(context)?;

        let artifacts = Arc::clone(&self.pipeline.artifacts);
        if !artifacts.is_active() {
            return self.execute(&Selection::default(), UNKNOWN_SENTENCE_ID);
        }

        let sentence_id = self
            .pipeline
            .codec
            .sentence_id(self.workspace.current())
            .unwrap_or_else(|| UNKNOWN_SENTENCE_ID.to_string());
        if first {
            artifacts.note_first_sentence(&sentence_id);
        }

        let selection = artifacts.select(&sentence_id);
        if !selection.is_empty() {
            let init = SnapshotStep {
                rule_name: INIT_STEP_NAME,
                operation: None,
                sentence_id: &sentence_id,
                rule_index: 0,
                iteration: 0,
                step: 0,
            };
            artifacts.emit(&selection, self.workspace.current(), &init);
        }

        self.execute(&selection, &sentence_id)
    }

    fn load(&mut self, context: &SentenceContext) -> Result<(), TaskError> {
        validate_encoding(context.current.text())?;

        let codec = Arc::clone(&self.pipeline.codec);
        let (lookback, current, lookahead) = self.workspace.regions_mut();
        for block in &context.lookback {
            codec.parse(block.text(), lookback)?;
        }
        codec.parse(context.current.text(), current)?;
        for block in &context.lookahead {
            codec.parse(block.text(), lookahead)?;
        }

        trace!(
            "Worker {}: loaded {} statements ({} lookback, {} lookahead)",
            self.id,
            self.workspace.current().len(),
            self.workspace.lookback().len(),
            self.workspace.lookahead().len()
        );
        Ok(())
    }

    fn execute(&mut self, selection: &Selection, sentence_id: &str) -> Result<(), TaskError> {
        let program = Arc::clone(&self.pipeline.program);
        for (i, rule) in program.rules().iter().enumerate() {
            let run = self
                .run_rule(rule, i + 1, selection, sentence_id)
                .map_err(|source| TaskError::Rule {
                    index: i + 1,
                    name: rule.name().to_string(),
                    source,
                })?;
            self.stats.record(i, &run);
        }
        Ok(())
    }

    /// Apply a rule until its cap is reached or the region stops changing
    fn run_rule(
        &mut self,
        rule: &UpdateRule,
        rule_index: usize,
        selection: &Selection,
        sentence_id: &str,
    ) -> Result<RuleRun, RuleError> {
        let max_iterations = self.pipeline.max_iterations;
        let cap = rule.cap().limit(max_iterations);
        let start = Instant::now();

        let mut run = RuleRun::default();
        let mut checkpoint: Option<Graph> = None;
        let mut changed = true;

        while changed && run.iterations < cap {
            let iteration = run.iterations + 1;
            let reported = if selection.is_empty() {
                self.pipeline.rules.apply_rule(&mut self.workspace, rule)?
            } else {
                self.apply_with_snapshots(rule, rule_index, iteration, selection, sentence_id)?
            };

            // Oscillating rules report changes forever; compare against the
            // checkpoint instead.
            changed = match checkpoint.take() {
                Some(before) => before != *self.workspace.current(),
                None => reported,
            };
            if CHECK_INTERVALS.contains(&iteration) {
                checkpoint = Some(self.workspace.current().clone());
            }

            run.iterations = iteration;
            if changed {
                run.changes += 1;
            }
        }

        if changed && rule.cap().is_unbounded() && run.iterations >= max_iterations {
            warn!(
                "Worker {}: rule No. {rule_index} ({}) still changing after {max_iterations} iterations",
                self.id,
                rule.name()
            );
        }

        run.elapsed = start.elapsed();
        debug!(
            "Worker {}: rule No. {rule_index} ({}) ran {} iterations",
            self.id,
            rule.name(),
            run.iterations
        );
        Ok(run)
    }

    fn apply_with_snapshots(
        &mut self,
        rule: &UpdateRule,
        rule_index: usize,
        iteration: u32,
        selection: &Selection,
        sentence_id: &str,
    ) -> Result<bool, RuleError> {
        let mut changed = false;
        for (step, operation) in rule.operations().iter().enumerate() {
            let before = self.workspace.current().clone();
            changed |= self.pipeline.rules.apply(&mut self.workspace, operation)?;

            if before != *self.workspace.current() {
                let snapshot = SnapshotStep {
                    rule_name: rule.name(),
                    operation: Some(operation),
                    sentence_id,
                    rule_index,
                    iteration,
                    step: step + 1,
                };
                self.pipeline
                    .artifacts
                    .emit(selection, self.workspace.current(), &snapshot);
            }
        }
        Ok(changed)
    }

    /// Render comments plus the current region, then reset the workspace
    fn unload(
        &mut self,
        context: &SentenceContext,
        failure: Option<String>,
    ) -> Result<TaskOutcome, TaskError> {
        let mut out = String::new();
        for comment in context.current.comments() {
            out.push_str(comment);
            out.push('\n');
        }
        let comments_len = out.len();

        let codec = Arc::clone(&self.pipeline.codec);
        let current = self.workspace.current();
        let serialized = panic::catch_unwind(AssertUnwindSafe(|| codec.serialize(current, &mut out)))
            .unwrap_or_else(|payload| Err(TaskError::Panic(panic_message(payload.as_ref()))));
        self.workspace.clear();

        match (serialized, failure) {
            (Ok(()), None) => Ok(TaskOutcome::Completed(out)),
            (Ok(()), Some(reason)) => Ok(TaskOutcome::Failed {
                partial: out,
                reason,
            }),
            (Err(e), _) if e.is_fatal() => Err(e),
            (Err(e), failure) => {
                warn!("Worker {}: {e}", self.id);
                out.truncate(comments_len);
                Ok(TaskOutcome::Failed {
                    partial: out,
                    reason: failure.unwrap_or_else(|| e.to_string()),
                })
            }
        }
    }
}

/// Lossy decoding upstream leaves replacement characters behind
fn validate_encoding(text: &str) -> Result<(), TaskError> {
    match text.lines().find(|line| line.contains('\u{FFFD}')) {
        Some(line) => Err(TaskError::Encoding(format!(
            "replacement character in \"{line}\""
        ))),
        None => Ok(()),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::SentenceBlock;
    use crate::rule::{IterationCap, RuleSpec};
    use parking_lot::Mutex;

    /// One statement per non-directive line; id from a `# id` comment
    struct TestCodec;

    impl SentenceCodec for TestCodec {
        fn parse(&self, text: &str, graph: &mut Graph) -> Result<(), TaskError> {
            for line in text.lines().map(str::trim) {
                if line.starts_with("!") {
                    return Err(TaskError::Parse(line.to_string()));
                }
                if !line.is_empty() && !line.starts_with('#') {
                    graph.insert(line);
                }
            }
            Ok(())
        }

        fn serialize(&self, graph: &Graph, out: &mut String) -> Result<(), TaskError> {
            for statement in graph.statements() {
                out.push_str(statement);
                out.push('\n');
                if statement == "boom" {
                    panic!("serializer exploded");
                }
            }
            Ok(())
        }

        fn sentence_id(&self, graph: &Graph) -> Option<String> {
            graph.statements().next().map(|s| s.replace(' ', "_"))
        }
    }

    /// Operations: `grow N` adds `n0..n{N-1}` one per application,
    /// `touch` deletes and re-inserts `x` reporting a change, `noop`,
    /// `panic`, `fail`, `copy-lookahead` copies lookahead statements.
    #[derive(Default)]
    struct TestRules {
        applied: Mutex<Vec<String>>,
    }

    impl RuleEngine for TestRules {
        fn prepare(&self, text: &str) -> Result<Vec<String>, RuleError> {
            Ok(text.lines().map(str::to_string).collect())
        }

        fn apply(&self, workspace: &mut Workspace, operation: &str) -> Result<bool, RuleError> {
            self.applied.lock().push(operation.to_string());
            match operation.split_whitespace().collect::<Vec<_>>().as_slice() {
                ["grow", n] => {
                    let n: usize = n.parse().map_err(|_| RuleError::Execution("n".into()))?;
                    let current = workspace.current_mut();
                    let have = current.statements().filter(|s| s.starts_with('n')).count();
                    Ok(have < n && current.insert(format!("n{have}")))
                }
                ["touch"] => {
                    let current = workspace.current_mut();
                    current.remove("x");
                    current.insert("x");
                    Ok(true)
                }
                ["noop"] => Ok(false),
                ["panic"] => panic!("rule exploded"),
                ["fail"] => Err(RuleError::Execution("deliberate".into())),
                ["copy-lookahead"] => {
                    let copied: Vec<String> =
                        workspace.lookahead().statements().map(str::to_string).collect();
                    let mut changed = false;
                    for statement in copied {
                        changed |= workspace.current_mut().insert(statement);
                    }
                    Ok(changed)
                }
                _ => Err(RuleError::Syntax {
                    operation: operation.to_string(),
                    reason: "unknown".into(),
                }),
            }
        }
    }

    fn engine(rules: &[(&str, IterationCap)], max_iterations: u32) -> (UpdateEngine, Arc<TestRules>) {
        engine_with_artifacts(rules, max_iterations, Artifacts::disabled())
    }

    fn engine_with_artifacts(
        rules: &[(&str, IterationCap)],
        max_iterations: u32,
        artifacts: Artifacts,
    ) -> (UpdateEngine, Arc<TestRules>) {
        let rule_engine = Arc::new(TestRules::default());
        let specs: Vec<RuleSpec> = rules
            .iter()
            .map(|(text, cap)| RuleSpec::new(*text, *cap))
            .collect();
        let program = UpdateProgram::load(&specs, rule_engine.as_ref()).unwrap();
        let pipeline = Pipeline {
            program: Arc::new(program),
            codec: Arc::new(TestCodec),
            rules: Arc::clone(&rule_engine) as Arc<dyn RuleEngine>,
            artifacts: Arc::new(artifacts),
            base: Arc::new(BaseDataset::new()),
            max_iterations,
        };
        (UpdateEngine::new(0, Arc::new(pipeline)), rule_engine)
    }

    fn context(text: &str) -> SentenceContext {
        SentenceContext::isolated(SentenceBlock::from(text))
    }

    #[test]
    fn test_zero_rules_reproduce_region_and_comments() {
        let (mut engine, _) = engine(&[], 999);
        let outcome = engine.process(&context("# sent 1\na b c\nd e f\n"), true).unwrap();
        assert_eq!(outcome, TaskOutcome::Completed("# sent 1\na b c\nd e f\n".into()));
    }

    #[test]
    fn test_unbounded_rule_stops_at_fixpoint() {
        let (mut engine, rules) = engine(&[("grow 2", IterationCap::Unbounded)], 999);
        engine.process(&context("a b c\n"), true).unwrap();

        // two growing applications, the third observes no change
        assert_eq!(rules.applied.lock().len(), 3);
        let stats = engine.into_stats();
        assert_eq!(stats.rules()[0].iterations, 3);
        assert_eq!(stats.rules()[0].changes, 2);
    }

    #[test]
    fn test_cap_one_on_fixpoint_records_no_change() {
        let (mut engine, _) = engine(&[("noop", IterationCap::Limited(1))], 999);
        engine.process(&context("a b c\n"), true).unwrap();
        let stats = engine.into_stats();
        assert_eq!(stats.rules()[0].iterations, 1);
        assert_eq!(stats.rules()[0].changes, 0);
    }

    #[test]
    fn test_explicit_cap_wins() {
        let (mut engine, _) = engine(&[("grow 50", IterationCap::Limited(4))], 999);
        let outcome = engine.process(&context("a\n"), true).unwrap();
        assert_eq!(outcome, TaskOutcome::Completed("a\nn0\nn1\nn2\nn3\n".into()));
    }

    #[test]
    fn test_global_cap_bounds_unbounded_rules() {
        let (mut engine, _) = engine(&[("grow 50", IterationCap::Unbounded)], 5);
        engine.process(&context("a\n"), true).unwrap();
        assert_eq!(engine.into_stats().rules()[0].iterations, 5);
    }

    #[test]
    fn test_oscillation_detected_at_checkpoint() {
        let (mut engine, _) = engine(&[("touch", IterationCap::Unbounded)], 999);
        engine.process(&context("a\n"), true).unwrap();
        // reported as changed every time; the region after iteration 4
        // equals the checkpoint taken after iteration 3
        let stats = engine.into_stats();
        assert_eq!(stats.rules()[0].iterations, 4);
        assert_eq!(stats.rules()[0].changes, 3);
    }

    #[test]
    fn test_lookahead_is_visible_but_not_emitted() {
        let (mut engine, _) = engine(&[("copy-lookahead", IterationCap::Limited(1))], 999);
        let ctx = SentenceContext {
            lookback: vec![],
            current: SentenceBlock::from("a\n"),
            lookahead: vec![SentenceBlock::from("b\n")],
        };
        let outcome = engine.process(&ctx, true).unwrap();
        assert_eq!(outcome, TaskOutcome::Completed("a\nb\n".into()));
    }

    #[test]
    fn test_rule_error_yields_failed_outcome_and_worker_survives() {
        let (mut engine, _) = engine(&[("fail", IterationCap::Limited(1))], 999);
        let outcome = engine.process(&context("# keep\na\n"), true).unwrap();
        match outcome {
            TaskOutcome::Failed { partial, reason } => {
                assert_eq!(partial, "# keep\n");
                assert!(reason.contains("rule No. 1"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(engine.process(&context("b\n"), false).unwrap().is_failed());
    }

    #[test]
    fn test_panic_is_contained() {
        let (mut engine, _) = engine(&[("panic", IterationCap::Limited(1))], 999);
        let outcome = engine.process(&context("a\n"), true).unwrap();
        match outcome {
            TaskOutcome::Failed { reason, .. } => assert!(reason.contains("rule exploded")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_serializer_panic_keeps_comments() {
        let (mut engine, _) = engine(&[], 999);
        let outcome = engine.process(&context("# keep\na\nboom\n"), true).unwrap();
        match outcome {
            TaskOutcome::Failed { partial, reason } => {
                assert_eq!(partial, "# keep\n");
                assert!(reason.contains("serializer exploded"));
            }
            other => panic!("expected failure, got {other:?}"),
        }

        let next = engine.process(&context("b\n"), false).unwrap();
        assert_eq!(next, TaskOutcome::Completed("b\n".into()));
        assert_eq!(engine.into_stats().sentences(), 2);
    }

    #[test]
    fn test_parse_error_is_not_fatal() {
        let (mut engine, _) = engine(&[], 999);
        let outcome = engine.process(&context("!broken\n"), true).unwrap();
        assert!(outcome.is_failed());
    }

    #[test]
    fn test_replacement_character_is_fatal() {
        let (mut engine, _) = engine(&[], 999);
        let result = engine.process(&context("a \u{FFFD} c\n"), true);
        assert!(matches!(result, Err(TaskError::Encoding(_))));
    }

    #[test]
    fn test_snapshots_follow_changing_steps() {
        use crate::artifacts::ArtifactTarget;
        use crate::collaborator::SnapshotRenderer;
        use std::io::Write;

        struct Names;
        impl SnapshotRenderer for Names {
            fn extension(&self) -> &str {
                "txt"
            }
            fn render(
                &self,
                graph: &Graph,
                _step: &SnapshotStep<'_>,
                out: &mut dyn Write,
            ) -> std::io::Result<()> {
                writeln!(out, "{}", graph.len())
            }
        }

        let temp = tempfile::TempDir::new().unwrap();
        let artifacts = Artifacts::activate(vec![(
            ArtifactTarget::new(temp.path(), vec![]),
            Arc::new(Names) as Arc<dyn SnapshotRenderer>,
        )])
        .unwrap();
        let (mut engine, _) =
            engine_with_artifacts(&[("grow 1\nnoop", IterationCap::Unbounded)], 999, artifacts);
        engine.process(&context("s1\n"), true).unwrap();

        let mut files: Vec<String> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        assert_eq!(
            files,
            vec![
                "s1__U000_I0000_S000__INIT.txt".to_string(),
                "s1__U001_I0001_S001__DIRECTUPDATE.txt".to_string(),
            ]
        );
    }
}
