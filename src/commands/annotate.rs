use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use crate::annotation::interpro::{parse_gff3, parse_tsv, EntryList, InterProResults};
use crate::categorize::categorizer::{collect_evidence, summarize, write_assignments, write_summary, Categorizer};
use crate::categorize::rules::{KeywordMode, RuleSet};
use crate::commands::{check_failures, CommandResult};
use crate::sequence::fasta::read_records;
use crate::settings::Settings;
use crate::util::plain_file_name;

///////////////////////////////////////////////////////////////////////////////

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Assign one functional category per protein from InterProScan results
    Categorize(CategorizeCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct CategorizeCommand {
    /// InterProScan outputs, TSV or GFF3 (by extension)
    #[arg(required = true)]
    interpro: Vec<PathBuf>,
    /// InterPro entry.list
    #[arg(long, short)]
    entries: PathBuf,
    /// FASTA files listing every protein, so proteins without hits get No_IPR_Hit
    #[arg(long, short)]
    proteins: Vec<PathBuf>,
    /// Rule table, overrides the configuration
    #[arg(long, short)]
    rules: Option<PathBuf>,
    #[arg(long, value_enum)]
    keyword_mode: Option<KeywordMode>,
    #[arg(long, short, default_value = "./categories")]
    output_dir: PathBuf,
}

///////////////////////////////////////////////////////////////////////////////

fn is_gff3(path: &std::path::Path) -> bool {
    let name = plain_file_name(path);
    name.ends_with(".gff3") || name.ends_with(".gff")
}

fn categorize(cmd: CategorizeCommand, settings: Settings) -> CommandResult {
    // the rule table is loaded before any input so a bad table aborts early
    let rules_path = cmd.rules.unwrap_or(settings.categorize.rules);
    let mode = cmd.keyword_mode.unwrap_or(settings.categorize.keyword_mode);
    let rules = RuleSet::from_path(&rules_path, mode)?;
    let entries = EntryList::from_path(&cmd.entries)?;
    info!("Loaded {} InterPro entries", entries.len());

    let mut results = InterProResults::default();
    let mut failed = 0usize;
    for path in &cmd.interpro {
        let parsed = if is_gff3(path) { parse_gff3(path) } else { parse_tsv(path) };
        match parsed {
            Ok(parsed) => results.extend(parsed),
            Err(e) => {
                error!("Failed to parse {}: {}", path.display(), e);
                failed += 1;
            }
        }
    }

    let mut proteins = Vec::new();
    for path in &cmd.proteins {
        proteins.extend(read_records(path)?.iter().map(|r| r.id().to_string()));
    }

    let evidence = collect_evidence(&results, &entries, &proteins);
    let assignments = Categorizer::new(rules).assign_all(&evidence);

    std::fs::create_dir_all(&cmd.output_dir)?;
    let assignments_path = cmd.output_dir.join("functional_categories.tsv");
    write_assignments(&assignments_path, &assignments)?;
    write_summary(&cmd.output_dir.join("category_summary.tsv"), &assignments)?;

    for (category, count) in summarize(&assignments).iter().take(10) {
        info!("{:>8}  {}", count, category);
    }
    info!("Wrote {} assignments to {}", assignments.len(), assignments_path.display());
    check_failures("InterProScan files", failed, cmd.interpro.len())
}

pub fn command(cmds: Commands, settings: Settings) -> CommandResult {
    match cmds {
        Commands::Categorize(cmd) => categorize(cmd, settings),
    }
}
