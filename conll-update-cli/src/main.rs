//! conll-update command-line entry point

use clap::Parser;
use conll_update_cli::commands::Commands;

/// Apply graph-rewrite rules to a stream of CoNLL-RDF sentences
#[derive(Debug, Parser)]
#[command(name = "conll-update", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli.command.execute() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
