use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::info;

use crate::annotation::homology::{self, best_hits, parse_hits, DatabaseTag};
use crate::annotation::interpro::{parse_gff3, parse_tsv, InterProResults};
use crate::annotation::orthofinder::Orthogroups;
use crate::annotation::signal::parse_signal;
use crate::annotation::SourceTable;
use crate::commands::CommandResult;
use crate::database::assemble::{assemble, base_from_fasta, check_source_names, KEY_COLUMN};
use crate::database::version::{SourceSummary, VersionWriter};
use crate::sequence::constants::DEFAULT_DISORDER_THRESHOLD;
use crate::sequence::disorder::DisorderScores;
use crate::settings::Settings;
use crate::util::{list_fasta_files, plain_file_name, unit_name};

///////////////////////////////////////////////////////////////////////////////

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Join every annotation source onto the protein table as a new version
    Assemble(AssembleCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct AssembleCommand {
    /// Standardized FASTA files or directories of them
    #[arg(long, short, required = true)]
    fasta: Vec<PathBuf>,
    /// Disorder score table for Percent_Disorder and Globular
    #[arg(long, short)]
    disorder: Option<PathBuf>,
    /// InterProScan TSV or GFF3 outputs
    #[arg(long)]
    interpro: Vec<PathBuf>,
    /// OrthoFinder Orthogroups.tsv
    #[arg(long)]
    orthogroups: Option<PathBuf>,
    /// Signal peptide predictions
    #[arg(long)]
    signal: Option<PathBuf>,
    /// Output of `annotate categorize`
    #[arg(long)]
    categories: Option<PathBuf>,
    /// Tabular homology hits; the best hit per database is kept
    #[arg(long)]
    hits: Vec<PathBuf>,
    /// Output of `mapping resolve`
    #[arg(long)]
    mapping: Vec<PathBuf>,
    /// Any delimited table as NAME=PATH, keyed by --key
    #[arg(long, value_parser = parse_named_table)]
    table: Vec<(String, PathBuf)>,
    #[arg(long, default_value = KEY_COLUMN)]
    key: String,
    /// Source names, highest precedence first; overrides the configuration
    #[arg(long, value_delimiter = ',')]
    precedence: Vec<String>,
    #[arg(long, short, default_value = "./database")]
    output_dir: PathBuf,
    #[arg(long)]
    stem: Option<String>,
    /// Allow the new version to lose columns of the previous one
    #[arg(long)]
    allow_dropped_columns: bool,
}

fn parse_named_table(value: &str) -> Result<(String, PathBuf), String> {
    match value.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => Ok((name.to_string(), PathBuf::from(path))),
        _ => Err(format!("expected NAME=PATH, got '{}'", value)),
    }
}

///////////////////////////////////////////////////////////////////////////////

fn fasta_inputs(paths: &[PathBuf]) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            files.extend(list_fasta_files(path)?);
        } else {
            files.push(path.clone());
        }
    }
    Ok(files)
}

fn interpro_table(paths: &[PathBuf]) -> Result<SourceTable, Box<dyn std::error::Error>> {
    let mut results = InterProResults::default();
    for path in paths {
        let name = plain_file_name(path);
        let parsed = if name.ends_with(".gff3") || name.ends_with(".gff") {
            parse_gff3(path)?
        } else {
            parse_tsv(path)?
        };
        results.extend(parsed);
    }
    Ok(results.to_source_table())
}

fn hits_table(paths: &[PathBuf], settings: &Settings) -> Result<SourceTable, Box<dyn std::error::Error>> {
    let mut hits = Vec::new();
    for path in paths {
        hits.extend(parse_hits(path, DatabaseTag::from_file_name(path))?.hits);
    }
    let best = best_hits(&hits, &settings.homology.best_hits);
    Ok(homology::to_source_table(&best))
}

fn summary(table: &SourceTable) -> SourceSummary {
    SourceSummary {
        name: table.name.clone(),
        rows: table.len(),
        columns: table.columns.clone(),
    }
}

fn assemble_version(cmd: AssembleCommand, settings: Settings) -> CommandResult {
    let fasta_files = fasta_inputs(&cmd.fasta)?;
    let scores = cmd.disorder.as_deref().map(DisorderScores::from_path).transpose()?;
    let threshold = settings.filter.disorder_threshold.unwrap_or(DEFAULT_DISORDER_THRESHOLD);
    let base = base_from_fasta(&fasta_files, scores.as_ref().map(|s| (s, threshold)))?;

    let mut sources: Vec<SourceTable> = Vec::new();
    if !cmd.interpro.is_empty() {
        sources.push(interpro_table(&cmd.interpro)?);
    }
    if let Some(path) = &cmd.orthogroups {
        sources.push(Orthogroups::from_path(path)?.to_source_table());
    }
    if let Some(path) = &cmd.signal {
        sources.push(parse_signal(path)?.to_source_table());
    }
    if let Some(path) = &cmd.categories {
        sources.push(SourceTable::from_delimited("functional_category", path, KEY_COLUMN)?);
    }
    if !cmd.hits.is_empty() {
        sources.push(hits_table(&cmd.hits, &settings)?);
    }
    for path in &cmd.mapping {
        sources.push(SourceTable::from_delimited(&unit_name(path, ".tsv"), path, "Input_ID")?);
    }
    for (name, path) in &cmd.table {
        sources.push(SourceTable::from_delimited(name, path, &cmd.key)?);
    }
    check_source_names(&base, &sources)?;
    for source in &sources {
        info!("Source '{}': {} rows, columns {:?}", source.name, source.len(), source.columns);
    }

    let precedence = if cmd.precedence.is_empty() {
        settings.database.precedence.clone()
    } else {
        cmd.precedence.clone()
    };
    let mut db = assemble(&base, &sources, &precedence);
    db.add_structure_status(settings.mapping.plddt_cutoff);

    let stem = cmd.stem.as_deref().unwrap_or(settings.database.stem.as_str());
    let writer = VersionWriter {
        dir: Path::new(&cmd.output_dir),
        stem,
        allow_dropped_columns: cmd.allow_dropped_columns || settings.database.allow_dropped_columns,
    };
    let mut summaries = vec![summary(&base)];
    summaries.extend(sources.iter().map(summary));
    let written = writer.write(&db, summaries, &precedence)?;

    info!(
        "Database version {}: {} proteins, {} columns, manifest {}",
        written.version,
        db.rows.len(),
        db.columns.len() + 1,
        written.manifest.display()
    );
    Ok(())
}

pub fn command(cmds: Commands, settings: Settings) -> CommandResult {
    match cmds {
        Commands::Assemble(cmd) => assemble_version(cmd, settings),
    }
}
