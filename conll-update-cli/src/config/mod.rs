//! Configuration module
//!
//! A TOML file can hold everything the `update` command accepts on the
//! command line; flags given explicitly take precedence.

use anyhow::{Context, Result};
use conll_update_engine::config::defaults;
use conll_update_engine::{ArtifactTarget, FailurePolicy, IterationCap, RuleSpec};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// CLI configuration structure
#[derive(Debug, Deserialize, Serialize, Default, PartialEq)]
pub struct CliConfig {
    /// Processing configuration
    #[serde(default)]
    pub processing: ProcessingConfig,

    /// Update program, in order
    #[serde(default)]
    pub updates: Vec<UpdateEntry>,

    /// Reference graphs to preload
    #[serde(default)]
    pub models: Vec<ModelEntry>,

    /// Snapshot output
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
}

/// Processing-related configuration
#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Number of worker threads (0 = auto)
    pub threads: usize,

    /// Following sentences visible to rules
    pub lookahead: usize,

    /// Preceding sentences visible to rules
    pub lookback: usize,

    /// Collapse repeated namespace declarations
    pub prefix_deduplication: bool,

    /// Cap for unbounded rules
    pub max_iterations: u32,

    /// Output form of failed sentences
    pub failure_policy: FailurePolicy,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            lookahead: 0,
            lookback: 0,
            prefix_deduplication: false,
            max_iterations: defaults::MAX_ITERATIONS,
            failure_policy: FailurePolicy::Silent,
        }
    }
}

/// One rule of the update program
#[derive(Debug, Deserialize, Serialize, PartialEq)]
pub struct UpdateEntry {
    /// Rule file path or verbatim rule text
    pub source: String,

    /// Iteration cap: a positive number, `u` or `*` (default 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<String>,
}

impl UpdateEntry {
    /// Convert to an engine rule spec
    pub fn to_spec(&self) -> Result<RuleSpec> {
        let spec = match &self.iterations {
            Some(cap) => IterationCap::parse(cap.trim(), &self.source)
                .map(|cap| RuleSpec::new(self.source.clone(), cap)),
            None => self.source.parse(),
        };
        spec.with_context(|| format!("Invalid update entry: {}", self.source))
    }
}

/// A reference graph to preload
#[derive(Debug, Deserialize, Serialize, PartialEq)]
pub struct ModelEntry {
    /// File to read
    pub location: PathBuf,

    /// Graph name (default: the location)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<String>,
}

/// Snapshot output configuration
#[derive(Debug, Deserialize, Serialize, Default, PartialEq)]
pub struct ArtifactsConfig {
    /// Graphviz snapshots
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graphs: Option<ArtifactEntry>,

    /// Sorted fact dumps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facts: Option<ArtifactEntry>,
}

/// One snapshot target
#[derive(Debug, Deserialize, Serialize, PartialEq)]
pub struct ArtifactEntry {
    /// Output directory
    pub dir: PathBuf,

    /// Sentence ids (default: the first sentence)
    #[serde(default)]
    pub sentences: Vec<String>,
}

impl From<&ArtifactEntry> for ArtifactTarget {
    fn from(entry: &ArtifactEntry) -> Self {
        ArtifactTarget::new(entry.dir.clone(), entry.sentences.clone())
    }
}

impl CliConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load the file if given, defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Rule specs of the configured update program
    pub fn rule_specs(&self) -> Result<Vec<RuleSpec>> {
        self.updates.iter().map(UpdateEntry::to_spec).collect()
    }

    /// Rules given on the command line replace the configured program;
    /// the configured program is used when there are none
    pub fn resolve_rule_specs(&self, arguments: &[String]) -> Result<Vec<RuleSpec>> {
        if arguments.is_empty() {
            return self.rule_specs();
        }
        arguments
            .iter()
            .map(|arg| {
                arg.parse::<RuleSpec>()
                    .with_context(|| format!("Invalid update argument: {arg}"))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conll_update_engine::ConfigError;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = CliConfig::from_toml("").unwrap();
        assert_eq!(config, CliConfig::default());
        assert_eq!(config.processing.max_iterations, 999);
    }

    #[test]
    fn test_full_config() {
        let config = CliConfig::from_toml(
            r#"
[processing]
threads = 4
lookahead = 2
prefix_deduplication = true
failure_policy = "annotate"

[[updates]]
source = "DELETE /PUNCT/"
iterations = "u"

[[updates]]
source = "INSERT :a :b :c ."

[[models]]
location = "lexicon.ttl"
graph = "lexicon"

[artifacts.graphs]
dir = "graphs"
sentences = ["s1_0"]
"#,
        )
        .unwrap();

        assert_eq!(config.processing.threads, 4);
        assert_eq!(config.processing.lookahead, 2);
        assert_eq!(config.processing.lookback, 0);
        assert!(config.processing.prefix_deduplication);
        assert_eq!(config.processing.failure_policy, FailurePolicy::Annotate);

        let specs = config.rule_specs().unwrap();
        assert_eq!(specs[0], RuleSpec::new("DELETE /PUNCT/", IterationCap::Unbounded));
        assert_eq!(specs[1], RuleSpec::new("INSERT :a :b :c .", IterationCap::Limited(1)));

        assert_eq!(config.models[0].graph.as_deref(), Some("lexicon"));
        let graphs = config.artifacts.graphs.as_ref().unwrap();
        assert_eq!(ArtifactTarget::from(graphs).sentences, vec!["s1_0"]);
        assert!(config.artifacts.facts.is_none());
    }

    #[test]
    fn test_invalid_iterations() {
        let config = CliConfig::from_toml(
            r#"
[[updates]]
source = "DELETE /x/"
iterations = "0"
"#,
        )
        .unwrap();
        assert!(config.rule_specs().is_err());
    }

    #[test]
    fn test_command_line_rules_replace_configured_ones() {
        let config = CliConfig::from_toml(
            r#"
[[updates]]
source = "DELETE /y/"
"#,
        )
        .unwrap();

        let configured = config.resolve_rule_specs(&[]).unwrap();
        assert_eq!(configured, vec![RuleSpec::new("DELETE /y/", IterationCap::Limited(1))]);

        let given = config
            .resolve_rule_specs(&["DELETE /x/{u}".to_string()])
            .unwrap();
        assert_eq!(given, vec![RuleSpec::new("DELETE /x/", IterationCap::Unbounded)]);

        assert!(config.resolve_rule_specs(&["FROB".to_string()]).is_err());
    }

    #[test]
    fn test_malformed_iterations_are_rejected() {
        for cap in ["ten", "-3"] {
            let entry = UpdateEntry {
                source: "DELETE /PUNCT/".to_string(),
                iterations: Some(cap.to_string()),
            };
            let error = entry.to_spec().unwrap_err();
            assert!(matches!(
                error.downcast_ref::<ConfigError>(),
                Some(ConfigError::InvalidIterationCap { .. })
            ));
        }
    }

    #[test]
    fn test_iterations_field_keeps_source_verbatim() {
        let entry = UpdateEntry {
            source: "INSERT :x :y :z . WHERE /{x}".to_string(),
            iterations: Some("3".to_string()),
        };
        assert_eq!(
            entry.to_spec().unwrap(),
            RuleSpec::new("INSERT :x :y :z . WHERE /{x}", IterationCap::Limited(3))
        );
    }

    #[test]
    fn test_unknown_failure_policy() {
        let result = CliConfig::from_toml("[processing]\nfailure_policy = \"loud\"\n");
        assert!(result.is_err());
    }
}
