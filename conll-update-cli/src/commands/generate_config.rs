//! Generate config command implementation

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

/// Arguments for the generate-config command
#[derive(Debug, Args)]
pub struct GenerateConfigArgs {
    /// Output file path
    #[arg(short, long, value_name = "FILE", required = true)]
    pub output: PathBuf,
}

impl GenerateConfigArgs {
    /// Execute the generate-config command
    pub fn execute(&self) -> Result<()> {
        use std::fs;

        println!("Generating configuration template...");
        println!("  Output file: {}", self.output.display());

        fs::write(&self.output, TEMPLATE)
            .with_context(|| format!("Failed to write to {}", self.output.display()))?;

        println!("✓ Configuration template generated successfully!");
        println!();
        println!("Next steps:");
        println!("1. Replace the example update with your own rules");
        println!("2. Validate your configuration:");
        println!("   conll-update validate --config {}", self.output.display());
        println!("3. Use it for processing:");
        println!(
            "   conll-update update -i input.ttl --config {}",
            self.output.display()
        );

        Ok(())
    }
}

const TEMPLATE: &str = r#"# conll-update configuration
#
# Flags given on the command line take precedence over these values.

[processing]
# Worker threads (0 = number of CPUs)
threads = 0

# Sentences before and after the current one that rules may read
lookahead = 0
lookback = 0

# Emit @prefix lines only when they differ from the previous sentence
prefix_deduplication = false

# Cap for rules marked "u" or "*"
max_iterations = 999

# "silent" writes partial output for failed sentences,
# "annotate" additionally precedes it with a comment
failure_policy = "silent"

# Update program, applied in order to every sentence.
# source is a rule file (.rules, .sparql, .ru) or verbatim rule text.
# iterations is a positive number, "u" or "*" (default 1).
[[updates]]
source = "DELETE /^:example-only /"
iterations = "1"

# Reference graphs visible to rules as GRAPH <name>
# [[models]]
# location = "lexicon.ttl"
# graph = "http://example.org/lexicon"

# Per-step snapshots; sentences defaults to the first sentence
# [artifacts.graphs]
# dir = "graphs"
# sentences = ["s1_0"]
#
# [artifacts.facts]
# dir = "facts"
"#;
