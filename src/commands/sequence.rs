use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::commands::{check_failures, CommandResult};
use crate::sequence::constants::{DEFAULT_HYPOTHETICAL_KEYWORDS, NAME_FIELD_INDEX};
use crate::sequence::disorder::DisorderScores;
use crate::sequence::filter::filter_directory;
use crate::sequence::prepare::prepare_genomes;
use crate::sequence::subset::{concatenate, extract_by_ids, KeywordSubset, ReferenceIndex};
use crate::settings::Settings;

///////////////////////////////////////////////////////////////////////////////

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Standardize headers of `<genome>/protein.faa` into `<genome>.fasta`
    Prepare(PrepareCommand),
    /// Split proteomes by length, ambiguous residues and disorder
    Filter(FilterCommand),
    /// Concatenate all FASTA files of a directory
    Concat(ConcatCommand),
    /// Keep records whose header name is blank or uncharacterised
    Subset(SubsetCommand),
    /// Extract sequences listed in ID files or hit tables
    Extract(ExtractCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct PrepareCommand {
    /// Directory holding one subdirectory per genome
    #[arg()]
    input_base: PathBuf,
    #[arg()]
    output_dir: PathBuf,
    #[arg(long, default_value = "protein.faa")]
    faa_name: String,
}

#[derive(Parser, Debug, Clone)]
pub struct FilterCommand {
    #[arg()]
    input_dir: PathBuf,
    #[arg()]
    output_dir: PathBuf,
    /// Where the rejected buckets and bucket_counts.csv go
    #[arg(long, short, default_value = "./rejected")]
    rejected_dir: PathBuf,
    /// Disorder score table (CSV or TSV); without it only length is filtered
    #[arg(long, short)]
    disorder: Option<PathBuf>,
    #[arg(long)]
    min_length: Option<usize>,
    #[arg(long)]
    max_length: Option<usize>,
    #[arg(long)]
    threshold: Option<f64>,
    /// Residue codes that send a sequence to the skipped bucket
    #[arg(long)]
    ambiguous: Option<String>,
}

#[derive(Parser, Debug, Clone)]
pub struct ConcatCommand {
    #[arg()]
    input_dir: PathBuf,
    #[arg()]
    output: PathBuf,
}

#[derive(Parser, Debug, Clone)]
pub struct SubsetCommand {
    #[arg()]
    input: PathBuf,
    #[arg()]
    output: PathBuf,
    /// Comma-separated keywords, case-insensitive
    #[arg(long, short, value_delimiter = ',')]
    keywords: Vec<String>,
    /// Zero-based header field holding the protein name
    #[arg(long, default_value_t = NAME_FIELD_INDEX)]
    field: usize,
}

#[derive(Parser, Debug, Clone)]
pub struct ExtractCommand {
    /// Reference FASTA
    #[arg(long, short)]
    reference: PathBuf,
    /// ID lists or hit tables, one output FASTA each
    #[arg(required = true)]
    id_files: Vec<PathBuf>,
    /// Read IDs from this column of a table with a header
    #[arg(long, short)]
    column: Option<String>,
    #[arg(long, short, default_value = "./extracted")]
    output_dir: PathBuf,
}

///////////////////////////////////////////////////////////////////////////////

pub fn command(cmds: Commands, settings: Settings) -> CommandResult {
    match cmds {
        Commands::Prepare(cmd) => {
            let report = prepare_genomes(&cmd.input_base, &cmd.output_dir, &cmd.faa_name)?;
            info!(
                "Prepared {} genomes ({} proteins written of {} read), {} skipped",
                report.genomes,
                report.proteins_written,
                report.proteins_read,
                report.skipped.len()
            );
            check_failures("genomes", report.failed.len(), report.genomes + report.failed.len())
        }
        Commands::Filter(cmd) => {
            let mut params = settings.filter;
            if let Some(min) = cmd.min_length {
                params.min_length = min;
            }
            if let Some(max) = cmd.max_length {
                params.max_length = max;
            }
            if let Some(threshold) = cmd.threshold {
                params.disorder_threshold = Some(threshold);
            }
            if let Some(ambiguous) = cmd.ambiguous {
                params.ambiguous_residues = ambiguous;
            }

            let scores = match &cmd.disorder {
                Some(path) => Some(DisorderScores::from_path(path)?),
                None => {
                    if params.disorder_threshold.is_some() {
                        warn!("No disorder scores given, filtering on length and residues only");
                    }
                    params.disorder_threshold = None;
                    None
                }
            };

            let report = filter_directory(&cmd.input_dir, &cmd.output_dir, &cmd.rejected_dir, &params, scores.as_ref())?;
            check_failures(
                "files",
                report.failed_files.len(),
                report.files_processed + report.failed_files.len(),
            )
        }
        Commands::Concat(cmd) => {
            let report = concatenate(&cmd.input_dir, &cmd.output)?;
            if report.invalid > 0 {
                warn!("Dropped {} records with empty ID or sequence", report.invalid);
            }
            check_failures("files", report.failed_files.len(), report.files + report.failed_files.len())
        }
        Commands::Subset(cmd) => {
            let subset = if cmd.keywords.is_empty() {
                KeywordSubset::new(&DEFAULT_HYPOTHETICAL_KEYWORDS, cmd.field)?
            } else {
                KeywordSubset::new(&cmd.keywords, cmd.field)?
            };
            subset.apply(&cmd.input, &cmd.output)?;
            Ok(())
        }
        Commands::Extract(cmd) => {
            let index = ReferenceIndex::from_path(&cmd.reference)?;
            info!("Indexed {} reference sequences", index.len());
            let reports = extract_by_ids(&index, &cmd.id_files, cmd.column.as_deref(), &cmd.output_dir)?;
            for report in &reports {
                info!(
                    "{}: wrote {}/{} sequences, {} missing",
                    report.unit,
                    report.written,
                    report.requested,
                    report.missing.len()
                );
            }
            check_failures("ID files", cmd.id_files.len() - reports.len(), cmd.id_files.len())
        }
    }
}
