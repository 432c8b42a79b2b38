use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Prepare, filter and subset proteome FASTA files
    #[command(subcommand)]
    Sequence(commands::sequence::Commands),
    /// Map protein IDs to UniParc, PDB or AlphaFold DB
    #[command(subcommand)]
    Mapping(commands::mapping::Commands),
    /// Assign functional categories from InterProScan evidence
    #[command(subcommand)]
    Annotate(commands::annotate::Commands),
    /// Filter homology search hits and pick outgroups
    #[command(subcommand)]
    Homology(commands::homology::Commands),
    /// Assemble annotation sources into a versioned database
    #[command(subcommand)]
    Database(commands::database::Commands),
    /// Run alignment, tree and clustering tools in parallel
    #[command(subcommand)]
    Tools(commands::tools::Commands),
}

#[derive(Parser)]
#[command(
    name = "dark-proteome",
    color = clap::ColorChoice::Always,
    version,
    about = "Filtering, annotation and integration of uncharacterised proteomes",
)]
pub struct Cli {
    /// Maximum log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: tracing::Level,

    /// TOML configuration file [default: assets/config.toml]
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_every_group_has_help_text() {
        let cli = Cli::command();
        for group in ["sequence", "mapping", "annotate", "homology", "database", "tools"] {
            let sub = cli.find_subcommand(group).unwrap();
            assert!(sub.get_about().is_some(), "{} has no about text", group);
        }
    }

    #[test]
    fn test_parse_group_command() {
        let cli = Cli::try_parse_from(["dark-proteome", "--log-level", "debug", "homology", "best-hits", "hits.tsv"]).unwrap();
        assert_eq!(cli.log_level, tracing::Level::DEBUG);
        assert!(matches!(cli.command, Commands::Homology(_)));
    }
}
