//! Per-rule iteration and timing accounting across workers

use crate::rule::UpdateProgram;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Outcome of running one rule against one sentence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleRun {
    /// Applications performed
    pub iterations: u32,
    /// Applications that changed the region
    pub changes: u32,
    /// Wall time spent on the rule
    pub elapsed: Duration,
}

/// Accumulated totals for one rule position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleTotals {
    /// Applications performed
    pub iterations: u64,
    /// Applications that changed the region
    pub changes: u64,
    /// Wall time spent on the rule
    pub elapsed: Duration,
}

impl RuleTotals {
    fn add_run(&mut self, run: &RuleRun) {
        self.iterations += u64::from(run.iterations);
        self.changes += u64::from(run.changes);
        self.elapsed += run.elapsed;
    }

    fn add_totals(&mut self, other: &RuleTotals) {
        self.iterations += other.iterations;
        self.changes += other.changes;
        self.elapsed += other.elapsed;
    }
}

/// History kept by a single worker, returned when it terminates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    sentences: u64,
    rules: Vec<RuleTotals>,
}

impl WorkerStats {
    /// Empty history sized for a program
    pub fn new(rule_count: usize) -> Self {
        Self {
            sentences: 0,
            rules: vec![RuleTotals::default(); rule_count],
        }
    }

    /// Record one rule run; `rule_index` is 0-based
    pub fn record(&mut self, rule_index: usize, run: &RuleRun) {
        if rule_index >= self.rules.len() {
            self.rules.resize(rule_index + 1, RuleTotals::default());
        }
        self.rules[rule_index].add_run(run);
    }

    /// Count a processed sentence
    pub fn finish_sentence(&mut self) {
        self.sentences += 1;
    }

    /// Sentences processed by this worker
    pub fn sentences(&self) -> u64 {
        self.sentences
    }

    /// Totals per rule position
    pub fn rules(&self) -> &[RuleTotals] {
        &self.rules
    }
}

/// Sums worker histories per rule position
#[derive(Debug)]
pub struct StatsAggregator {
    names: Vec<String>,
    totals: Vec<RuleTotals>,
    sentences: u64,
    workers: usize,
}

impl StatsAggregator {
    /// Aggregator for the rules of a program
    pub fn new(program: &UpdateProgram) -> Self {
        let names: Vec<String> = program.rules().iter().map(|r| r.name().to_string()).collect();
        Self {
            totals: vec![RuleTotals::default(); names.len()],
            names,
            sentences: 0,
            workers: 0,
        }
    }

    /// Fold in one worker's history
    pub fn add(&mut self, worker: &WorkerStats) {
        for (total, rule) in self.totals.iter_mut().zip(worker.rules()) {
            total.add_totals(rule);
        }
        self.sentences += worker.sentences();
        self.workers += 1;
    }

    /// Final report
    pub fn finish(self) -> UpdateStats {
        UpdateStats {
            sentences: self.sentences,
            workers: self.workers,
            rules: self
                .names
                .into_iter()
                .zip(self.totals)
                .enumerate()
                .map(|(i, (name, totals))| RuleStats {
                    index: i + 1,
                    name,
                    iterations: totals.iterations,
                    changes: totals.changes,
                    elapsed_ms: totals.elapsed.as_secs_f64() * 1000.0,
                })
                .collect(),
        }
    }
}

/// Totals for one rule of the program
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleStats {
    /// 1-based rule position
    pub index: usize,
    /// Rule name
    pub name: String,
    /// Applications across all sentences
    pub iterations: u64,
    /// Applications that changed a region
    pub changes: u64,
    /// Wall time in milliseconds
    pub elapsed_ms: f64,
}

/// Statistics of a whole run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateStats {
    /// Sentences processed by workers
    pub sentences: u64,
    /// Workers that reported a history
    pub workers: usize,
    /// Per rule, in program order
    pub rules: Vec<RuleStats>,
}

impl fmt::Display for UpdateStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} sentences on {} workers",
            self.sentences, self.workers
        )?;
        for rule in &self.rules {
            writeln!(
                f,
                "Update No. {} ({}): {} iterations, {} changes, {:.1} ms",
                rule.index, rule.name, rule.iterations, rule.changes, rule.elapsed_ms
            )?;
        }
        Ok(())
    }
}
