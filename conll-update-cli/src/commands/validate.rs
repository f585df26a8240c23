//! Validate command implementation

use crate::config::CliConfig;
use crate::error::CliError;
use anyhow::Result;
use clap::Args;
use conll_update_engine::builtin::PatternRuleEngine;
use conll_update_engine::{IterationCap, RuleSpec, UpdateProgram};
use std::path::PathBuf;

/// Arguments for the validate command
#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Rules to check, in the same form the update command takes
    #[arg(short, long, value_name = "RULE", num_args = 1..)]
    pub updates: Vec<String>,

    /// Configuration file whose update program should be checked
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl ValidateArgs {
    /// Execute the validate command
    pub fn execute(&self) -> Result<()> {
        let specs = self.rule_specs()?;
        if specs.is_empty() {
            return Err(CliError::ConfigError(
                "no updates given; pass --updates or --config".to_string(),
            )
            .into());
        }
        println!("Validating update program ({} rules)", specs.len());

        match UpdateProgram::load(&specs, &PatternRuleEngine::new()) {
            Ok(program) => {
                println!("✓ Update program is valid");
                for (index, rule) in program.rules().iter().enumerate() {
                    println!(
                        "  Update No. {} ({}): {}, {} operations",
                        index + 1,
                        rule.name(),
                        describe_cap(rule.cap()),
                        rule.operations().len()
                    );
                }
                Ok(())
            }
            Err(e) => {
                println!("✗ Update program is invalid");
                println!("  Error: {e}");
                Err(anyhow::anyhow!("Validation failed: {}", e))
            }
        }
    }

    fn rule_specs(&self) -> Result<Vec<RuleSpec>> {
        CliConfig::load(self.config.as_deref())?.resolve_rule_specs(&self.updates)
    }
}

fn describe_cap(cap: IterationCap) -> String {
    match cap {
        IterationCap::Limited(1) => "once".to_string(),
        IterationCap::Limited(n) => format!("up to {n} iterations"),
        IterationCap::Unbounded => "until fixpoint".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_validate_args_debug() {
        let args = ValidateArgs {
            updates: vec![],
            config: Some(PathBuf::from("test.toml")),
        };

        let debug_str = format!("{:?}", args);
        assert!(debug_str.contains("ValidateArgs"));
        assert!(debug_str.contains("test.toml"));
    }

    #[test]
    fn test_validate_verbatim_rules() {
        let args = ValidateArgs {
            updates: vec![
                "DELETE /nif:nextWord/".to_string(),
                r#"REPLACE /"(I?)"/ => "I$1"{u}"#.to_string(),
            ],
            config: None,
        };
        assert!(args.execute().is_ok());
    }

    #[test]
    fn test_validate_rule_from_config() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            br#"
[[updates]]
source = "INSERT :s :p :o ."
iterations = "3"
"#,
        )
        .unwrap();

        let args = ValidateArgs {
            updates: vec![],
            config: Some(file.path().to_path_buf()),
        };
        let specs = args.rule_specs().unwrap();
        assert_eq!(specs, vec![RuleSpec::new("INSERT :s :p :o .", IterationCap::Limited(3))]);
        assert!(args.execute().is_ok());
    }

    #[test]
    fn test_command_line_rules_replace_config_rules() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(
            br#"
[[updates]]
source = "FROB /x/"
"#,
        )
        .unwrap();

        // the broken configured rule is never loaded
        let args = ValidateArgs {
            updates: vec!["DELETE /x/{u}".to_string()],
            config: Some(file.path().to_path_buf()),
        };
        let specs = args.rule_specs().unwrap();
        assert_eq!(specs, vec![RuleSpec::new("DELETE /x/", IterationCap::Unbounded)]);
        assert!(args.execute().is_ok());
    }

    #[test]
    fn test_validate_malformed_rule() {
        let args = ValidateArgs {
            updates: vec!["FROB /x/".to_string()],
            config: None,
        };
        assert!(args.execute().is_err());
    }

    #[test]
    fn test_validate_requires_updates() {
        let args = ValidateArgs {
            updates: vec![],
            config: None,
        };
        let error = args.execute().unwrap_err();
        assert!(error.downcast_ref::<CliError>().is_some());
    }

    #[test]
    fn test_describe_cap() {
        assert_eq!(describe_cap(IterationCap::Limited(1)), "once");
        assert_eq!(describe_cap(IterationCap::Limited(5)), "up to 5 iterations");
        assert_eq!(describe_cap(IterationCap::Unbounded), "until fixpoint");
    }
}
