
mod cli;
mod commands;

use cli::{Cli, Commands};
use commands::{apply, convert, export, merge};

pub fn run() -> anyhow::Result<()> {
    use clap::Parser;

    let cli = Cli::parse();
    polymesh::logging::init(cli.verbose);
    match &cli.command {
        Commands::Convert(args) => convert::run(&cli, args),
        Commands::Apply(args) => apply::run(&cli, args),
        Commands::Merge(args) => merge::run(&cli, args),
        Commands::Export(args) => export::run(&cli, args),
    }
}

fn main() -> anyhow::Result<()> { run() }
