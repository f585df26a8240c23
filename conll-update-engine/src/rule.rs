//! The update program: ordered rewrite rules with iteration caps

use crate::collaborator::RuleEngine;
use crate::error::ConfigError;
use log::debug;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Name given to rules passed as verbatim text
pub const DEFAULT_RULE_NAME: &str = "DIRECTUPDATE";

/// File extensions that mark a rule argument as a path
const RULE_FILE_EXTENSIONS: [&str; 3] = ["rules", "sparql", "ru"];

/// How often a rule may be applied to one sentence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IterationCap {
    /// At most this many applications
    Limited(u32),
    /// Until fixpoint, bounded only by the global safety cap
    Unbounded,
}

impl IterationCap {
    /// The cap actually enforced under the given global safety cap
    pub fn limit(self, global: u32) -> u32 {
        match self {
            IterationCap::Limited(n) => n,
            IterationCap::Unbounded => global,
        }
    }

    /// Whether this rule runs until fixpoint
    pub fn is_unbounded(self) -> bool {
        matches!(self, IterationCap::Unbounded)
    }

    /// Parse a cap written as a positive number, `u` or `*`
    ///
    /// `argument` is the rule the cap belongs to and only appears in errors.
    pub fn parse(spec: &str, argument: &str) -> Result<Self, ConfigError> {
        match spec {
            "u" | "*" => Ok(IterationCap::Unbounded),
            digits => match digits.parse::<u32>() {
                Ok(n) if n > 0 && digits.bytes().all(|b| b.is_ascii_digit()) => {
                    Ok(IterationCap::Limited(n))
                }
                _ => Err(ConfigError::InvalidIterationCap {
                    argument: argument.to_string(),
                    spec: spec.to_string(),
                }),
            },
        }
    }
}

impl Default for IterationCap {
    fn default() -> Self {
        IterationCap::Limited(1)
    }
}

impl fmt::Display for IterationCap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IterationCap::Limited(n) => write!(f, "{n}"),
            IterationCap::Unbounded => write!(f, "*"),
        }
    }
}

/// A rule argument before loading: `SOURCE`, `SOURCE{N}`, `SOURCE{u}` or `SOURCE{*}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSpec {
    /// Path to a rule file, or verbatim rule text
    pub source: String,
    /// Iteration cap
    pub cap: IterationCap,
}

impl RuleSpec {
    /// A spec with an explicit cap
    pub fn new(source: impl Into<String>, cap: IterationCap) -> Self {
        Self {
            source: source.into(),
            cap,
        }
    }
}

impl FromStr for RuleSpec {
    type Err = ConfigError;

    fn from_str(argument: &str) -> Result<Self, Self::Err> {
        let suffix = argument
            .rfind('{')
            .filter(|_| argument.ends_with('}'))
            .map(|open| (open, &argument[open + 1..argument.len() - 1]))
            .filter(|(_, spec)| {
                !spec.is_empty() && spec.chars().all(|c| c.is_ascii_digit() || c == 'u' || c == '*')
            });
        let Some((open, spec)) = suffix else {
            return Ok(Self::new(argument, IterationCap::default()));
        };

        let cap = IterationCap::parse(spec, argument)?;
        Ok(Self::new(&argument[..open], cap))
    }
}

/// A loaded, validated rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRule {
    name: String,
    text: String,
    cap: IterationCap,
    operations: Vec<String>,
}

impl UpdateRule {
    /// Rule name used in logs and artifact file names
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The transformation text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Iteration cap
    pub fn cap(&self) -> IterationCap {
        self.cap
    }

    /// Sub-operations in execution order
    pub fn operations(&self) -> &[String] {
        &self.operations
    }
}

/// The ordered list of rules applied to every sentence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateProgram {
    rules: Vec<UpdateRule>,
}

impl UpdateProgram {
    /// A program with no rules
    pub fn empty() -> Self {
        Self::default()
    }

    /// Resolve, read and validate every rule
    pub fn load(specs: &[RuleSpec], engine: &dyn RuleEngine) -> Result<Self, ConfigError> {
        let mut rules = Vec::with_capacity(specs.len());

        for (position, spec) in specs.iter().enumerate() {
            let index = position + 1;
            let (name, text) = resolve_source(index, &spec.source)?;
            debug!("Update No.{index} named {name} with {} iterations", spec.cap);

            let operations = engine
                .prepare(&text)
                .map_err(|source| ConfigError::MalformedRule {
                    index,
                    name: name.clone(),
                    source,
                })?;

            rules.push(UpdateRule {
                name,
                text,
                cap: spec.cap,
                operations,
            });
        }

        Ok(Self { rules })
    }

    /// Rules in program order
    pub fn rules(&self) -> &[UpdateRule] {
        &self.rules
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the program has no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn resolve_source(index: usize, source: &str) -> Result<(String, String), ConfigError> {
    let path = Path::new(source);

    if path.is_file() {
        let bytes = fs::read(path).map_err(|e| ConfigError::Unreadable {
            path: path.to_path_buf(),
            source: e,
        })?;
        let text = String::from_utf8(bytes).map_err(|_| ConfigError::NotUtf8 {
            path: path.to_path_buf(),
        })?;
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .filter(|stem| !stem.is_empty())
            .unwrap_or_else(|| DEFAULT_RULE_NAME.to_string());
        return Ok((name, text));
    }

    let looks_like_file = !source.contains(char::is_whitespace)
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| RULE_FILE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
    if looks_like_file {
        return Err(ConfigError::MissingRuleFile {
            index,
            path: path.to_path_buf(),
        });
    }

    Ok((DEFAULT_RULE_NAME.to_string(), source.to_string()))
}
