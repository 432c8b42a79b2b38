use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use crate::annotation::homology::{best_hits, parse_hits, write_best_hits, DatabaseTag};
use crate::annotation::outgroup::{select_outgroups, OutgroupSelector};
use crate::commands::{check_failures, CommandResult};
use crate::settings::Settings;

///////////////////////////////////////////////////////////////////////////////

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Best hit per query and database from DIAMOND/MMseqs2/BLAST tables
    #[command(name = "best-hits")]
    BestHits(BestHitsCommand),
    /// Pick TACK/Euryarchaeota outgroups per orthogroup hit file
    Outgroups(OutgroupsCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct BestHitsCommand {
    /// Tabular hit files; the database is guessed from the file name
    #[arg(required = true)]
    hits: Vec<PathBuf>,
    #[arg(long, short, default_value = "best_hits.tsv")]
    output: PathBuf,
    #[arg(long)]
    max_evalue: Option<f64>,
    #[arg(long)]
    min_query_coverage: Option<f64>,
    #[arg(long)]
    min_subject_coverage: Option<f64>,
}

#[derive(Parser, Debug, Clone)]
pub struct OutgroupsCommand {
    /// Directory of `<orthogroup>_hits.tsv` files
    #[arg()]
    input_dir: PathBuf,
    #[arg(long, short, default_value = "outgroups.csv")]
    output: PathBuf,
    #[arg(long)]
    max_outgroups: Option<usize>,
    #[arg(long)]
    max_evalue: Option<f64>,
    #[arg(long)]
    min_coverage: Option<f64>,
}

///////////////////////////////////////////////////////////////////////////////

pub fn command(cmds: Commands, settings: Settings) -> CommandResult {
    match cmds {
        Commands::BestHits(cmd) => {
            let mut filter = settings.homology.best_hits;
            filter.max_evalue = cmd.max_evalue.or(filter.max_evalue);
            filter.min_query_coverage = cmd.min_query_coverage.or(filter.min_query_coverage);
            filter.min_subject_coverage = cmd.min_subject_coverage.or(filter.min_subject_coverage);

            let mut hits = Vec::new();
            let mut failed = 0usize;
            for path in &cmd.hits {
                let database = DatabaseTag::from_file_name(path);
                match parse_hits(path, database) {
                    Ok(parsed) => {
                        info!("{}: {} hits against {}", path.display(), parsed.hits.len(), database);
                        hits.extend(parsed.hits);
                    }
                    Err(e) => {
                        error!("Failed to parse {}: {}", path.display(), e);
                        failed += 1;
                    }
                }
            }

            let best = best_hits(&hits, &filter);
            write_best_hits(&cmd.output, &best)?;
            info!("Wrote {} best hits to {}", best.len(), cmd.output.display());
            check_failures("hit files", failed, cmd.hits.len())
        }
        Commands::Outgroups(cmd) => {
            let mut params = settings.homology.outgroups;
            if let Some(n) = cmd.max_outgroups {
                params.max_outgroups = n;
            }
            if let Some(evalue) = cmd.max_evalue {
                params.max_evalue = evalue;
            }
            if let Some(coverage) = cmd.min_coverage {
                params.min_coverage = coverage;
            }

            let selector = OutgroupSelector::new(params)?;
            let report = select_outgroups(&selector, &cmd.input_dir, &cmd.output)?;
            info!(
                "Outgroups found for {}/{} orthogroups, written to {}",
                report.with_outgroups,
                report.orthogroups,
                cmd.output.display()
            );
            check_failures(
                "hit files",
                report.failed.len(),
                report.orthogroups + report.failed.len(),
            )
        }
    }
}
