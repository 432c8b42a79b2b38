pub mod annotate;
pub mod database;
pub mod homology;
pub mod mapping;
pub mod sequence;
pub mod tools;

use std::error::Error;

use thiserror::Error;

use crate::cli::{Cli, Commands};
use crate::settings::load_settings;

pub type CommandResult = Result<(), Box<dyn Error>>;

/// Raised after all outputs are written when some units failed.
#[derive(Error, Debug)]
#[error("{failed} of {total} {what} failed")]
pub struct UnitFailures {
    pub what: &'static str,
    pub failed: usize,
    pub total: usize,
}

pub(crate) fn check_failures(what: &'static str, failed: usize, total: usize) -> CommandResult {
    if failed > 0 {
        return Err(Box::new(UnitFailures { what, failed, total }));
    }
    Ok(())
}

pub fn run(cli: Cli) -> CommandResult {
    let settings = load_settings(cli.config.as_deref())?;

    match cli.command {
        Commands::Sequence(cmd) => sequence::command(cmd, settings),
        Commands::Mapping(cmd) => mapping::command(cmd, settings),
        Commands::Annotate(cmd) => annotate::command(cmd, settings),
        Commands::Homology(cmd) => homology::command(cmd, settings),
        Commands::Database(cmd) => database::command(cmd, settings),
        Commands::Tools(cmd) => tools::command(cmd, settings),
    }
}
