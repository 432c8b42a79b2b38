use clap::Parser;
use tracing::error;

use dark_proteome::cli::Cli;
use dark_proteome::commands;

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .compact()
        .with_max_level(cli.log_level)
        .init();

    if let Err(e) = commands::run(cli) {
        error!("{}", e);
        std::process::exit(1);
    }
}
