//! Update command implementation

use super::init_logging;
use crate::config::CliConfig;
use crate::error::CliError;
use crate::input::open_input;
use crate::output::open_output;
use crate::progress::ProgressReporter;
use anyhow::{Context, Result};
use clap::Args;
use conll_update_engine::{
    ArtifactTarget, FailurePolicy, RuleSpec, RunSummary, Updater, UpdaterConfig,
};
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::str::FromStr;

/// Arguments for the update command
#[derive(Debug, Args)]
pub struct UpdateArgs {
    /// Input file (default: stdin)
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Output file (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Number of worker threads (default: number of CPUs)
    #[arg(short, long, value_name = "N")]
    pub threads: Option<usize>,

    /// Following sentences visible to every rule run
    #[arg(long, value_name = "N")]
    pub lookahead: Option<usize>,

    /// Preceding sentences visible to every rule run
    #[arg(long, value_name = "N")]
    pub lookback: Option<usize>,

    /// Collapse repeated @prefix blocks in the output
    #[arg(long)]
    pub prefix_deduplication: bool,

    /// Reference graph to preload
    #[arg(short, long, value_name = "LOCATION[=GRAPH]")]
    pub model: Vec<ModelArg>,

    /// Write .dot snapshots of each rule step into DIR
    #[arg(long, value_name = "DIR")]
    pub graphsout: Option<PathBuf>,

    /// Sentence to snapshot as .dot (default: the first sentence)
    #[arg(long, value_name = "ID", requires = "graphsout")]
    pub graphsout_sentence: Vec<String>,

    /// Write sorted fact dumps of each rule step into DIR
    #[arg(long, value_name = "DIR")]
    pub triplesout: Option<PathBuf>,

    /// Sentence to dump as .nt (default: the first sentence)
    #[arg(long, value_name = "ID", requires = "triplesout")]
    pub triplesout_sentence: Vec<String>,

    /// Mark failed sentences with a comment line
    #[arg(long)]
    pub annotate_failures: bool,

    /// Configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print run statistics as JSON to stderr
    #[arg(long)]
    pub stats: bool,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Rules in execution order: FILE or rule text, optionally suffixed
    /// with {N}, {u} or {*}
    #[arg(short, long, value_name = "RULE", num_args = 1..)]
    pub updates: Vec<String>,
}

/// A `LOCATION[=GRAPH]` argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelArg {
    /// File to read
    pub location: PathBuf,
    /// Target graph name
    pub graph: Option<String>,
}

impl FromStr for ModelArg {
    type Err = CliError;

    fn from_str(arg: &str) -> Result<Self, Self::Err> {
        let (location, graph) = match arg.split_once('=') {
            Some((location, graph)) => (location, Some(graph)),
            None => (arg, None),
        };
        if location.trim().is_empty() || graph.is_some_and(|g| g.trim().is_empty()) {
            return Err(CliError::InvalidModel(arg.to_string()));
        }
        Ok(Self {
            location: PathBuf::from(location),
            graph: graph.map(str::to_string),
        })
    }
}

impl UpdateArgs {
    /// Execute the update command
    pub fn execute(&self) -> Result<()> {
        init_logging(self.verbose, self.quiet);
        log::debug!("Arguments: {:?}", self);

        let file_config = CliConfig::load(self.config.as_deref())?;
        let mut updater = Updater::builder()
            .config(self.updater_config(&file_config))
            .updates(self.rule_specs(&file_config)?)
            .build()
            .context("Invalid update configuration")?;

        for model in &file_config.models {
            updater.load_graph(&model.location, model.graph.as_deref())?;
        }
        for model in &self.model {
            updater.load_graph(&model.location, model.graph.as_deref())?;
        }

        let input = open_input(self.input.as_deref())?;
        let output = open_output(self.output.as_deref())?;

        let progress = ProgressReporter::new(!self.quiet && io::stderr().is_terminal());
        let summary = updater
            .run_with_progress(input, output, |sentences| progress.update(sentences))
            .context("Update run aborted")?;
        progress.finish(summary.failed);

        self.report(&summary)
    }

    /// Merge the configuration file with the flags; flags win
    pub fn updater_config(&self, file: &CliConfig) -> UpdaterConfig {
        let processing = &file.processing;

        let failure_policy = if self.annotate_failures {
            FailurePolicy::Annotate
        } else {
            processing.failure_policy
        };
        let graphs = self
            .graphsout
            .as_ref()
            .map(|dir| ArtifactTarget::new(dir.clone(), self.graphsout_sentence.clone()))
            .or_else(|| file.artifacts.graphs.as_ref().map(ArtifactTarget::from));
        let facts = self
            .triplesout
            .as_ref()
            .map(|dir| ArtifactTarget::new(dir.clone(), self.triplesout_sentence.clone()))
            .or_else(|| file.artifacts.facts.as_ref().map(ArtifactTarget::from));

        UpdaterConfig {
            threads: self.threads.or(Some(processing.threads)),
            lookahead: self.lookahead.unwrap_or(processing.lookahead),
            lookback: self.lookback.unwrap_or(processing.lookback),
            prefix_deduplication: self.prefix_deduplication || processing.prefix_deduplication,
            max_iterations: processing.max_iterations,
            failure_policy,
            graphs,
            facts,
            ..UpdaterConfig::default()
        }
    }

    /// Rules from the command line, or from the configuration file if none
    /// were given
    pub fn rule_specs(&self, file: &CliConfig) -> Result<Vec<RuleSpec>> {
        file.resolve_rule_specs(&self.updates)
    }

    fn report(&self, summary: &RunSummary) -> Result<()> {
        log::info!(
            "Updated {} sentences ({} failed)",
            summary.sentences,
            summary.failed
        );
        log::debug!("{}", summary.stats);
        if summary.failed > 0 {
            log::warn!("{} of {} sentences failed", summary.failed, summary.sentences);
        }
        if self.stats {
            eprintln!("{}", serde_json::to_string_pretty(summary)?);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use conll_update_engine::IterationCap;

    #[derive(Debug, Parser)]
    struct TestCli {
        #[command(flatten)]
        args: UpdateArgs,
    }

    fn parse(args: &[&str]) -> UpdateArgs {
        let mut argv = vec!["conll-update"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).unwrap().args
    }

    #[test]
    fn test_model_argument() {
        let plain: ModelArg = "lexicon.ttl".parse().unwrap();
        assert_eq!(plain.location, PathBuf::from("lexicon.ttl"));
        assert_eq!(plain.graph, None);

        let named: ModelArg = "lexicon.ttl=http://ex.org/lexicon".parse().unwrap();
        assert_eq!(named.graph.as_deref(), Some("http://ex.org/lexicon"));

        assert!("=lexicon".parse::<ModelArg>().is_err());
        assert!("lexicon.ttl=".parse::<ModelArg>().is_err());
    }

    #[test]
    fn test_updates_take_multiple_values() {
        let args = parse(&["--updates", "DELETE /x/{u}", "INSERT :a :b :c .{3}", "--lookahead", "2"]);
        let specs = args.rule_specs(&CliConfig::default()).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].cap, IterationCap::Unbounded);
        assert_eq!(specs[1].cap, IterationCap::Limited(3));
        assert_eq!(args.lookahead, Some(2));
    }

    #[test]
    fn test_flags_override_config_file() {
        let file = CliConfig::from_toml(
            r#"
[processing]
threads = 8
lookahead = 3
lookback = 1
failure_policy = "silent"

[[updates]]
source = "DELETE /y/"

[artifacts.facts]
dir = "facts"
"#,
        )
        .unwrap();

        let args = parse(&["--lookahead", "1", "--annotate-failures", "--graphsout", "g"]);
        let config = args.updater_config(&file);
        assert_eq!(config.threads, Some(8));
        assert_eq!(config.lookahead, 1);
        assert_eq!(config.lookback, 1);
        assert_eq!(config.failure_policy, FailurePolicy::Annotate);
        assert_eq!(config.graphs.unwrap().dir, PathBuf::from("g"));
        assert_eq!(config.facts.unwrap().dir, PathBuf::from("facts"));

        let specs = args.rule_specs(&file).unwrap();
        assert_eq!(specs, vec![RuleSpec::new("DELETE /y/", IterationCap::Limited(1))]);
    }

    #[test]
    fn test_sentence_filter_requires_directory() {
        let mut argv = vec!["conll-update"];
        argv.extend_from_slice(&["--graphsout-sentence", "s1_0"]);
        assert!(TestCli::try_parse_from(argv).is_err());
    }
}
