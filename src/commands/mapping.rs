use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;

use crate::commands::{check_failures, CommandResult};
use crate::sequence::subset::read_ids;
use crate::settings::Settings;
use crate::uniprot::client::{AfdbConfidence, PdbCrossRefs, UniParcSearch};
use crate::uniprot::mapper::{map_batch, merge_outcomes, AccessionService, MappingFiles, RateLimiter, ReferenceTable};
use crate::uniprot::models::{IdSpace, MappingOutcome};

///////////////////////////////////////////////////////////////////////////////

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Resolve a list of IDs in one target ID space
    Resolve(ResolveCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct ResolveCommand {
    /// One ID per line, or a table when --column is given
    #[arg()]
    ids: PathBuf,
    #[arg(long, short)]
    column: Option<String>,
    #[arg(long, short, value_enum)]
    space: IdSpace,
    /// Two-column reference TSV, required for the `table` space
    #[arg(long, short)]
    table: Option<PathBuf>,
    #[arg(long, short, default_value = "./mapping")]
    output_dir: PathBuf,
    #[arg(long, short, default_value = "proteins")]
    prefix: String,
    /// Skip IDs already resolved or not found by an earlier run
    #[arg(long)]
    resume: bool,
    /// Minimum delay between remote requests, overrides the configuration
    #[arg(long)]
    delay_ms: Option<u64>,
}

///////////////////////////////////////////////////////////////////////////////

fn build_service(cmd: &ResolveCommand, settings: &Settings) -> Result<Box<dyn AccessionService>, Box<dyn std::error::Error>> {
    let mapping = &settings.mapping;
    let service: Box<dyn AccessionService> = match cmd.space {
        IdSpace::Uniparc => Box::new(UniParcSearch::new(&mapping.uniprot_url, mapping.request_timeout())?),
        IdSpace::Pdb => Box::new(PdbCrossRefs::new(&mapping.uniprot_url, mapping.request_timeout())?),
        IdSpace::Afdb => Box::new(AfdbConfidence::new(&mapping.afdb_url, mapping.request_timeout())?),
        IdSpace::Table => {
            let path = cmd.table.as_ref().ok_or("--table is required for the table ID space")?;
            Box::new(ReferenceTable::from_path(path)?)
        }
    };
    Ok(service)
}

fn resolve(cmd: ResolveCommand, settings: Settings) -> CommandResult {
    let ids = read_ids(&cmd.ids, cmd.column.as_deref())?;
    let service = build_service(&cmd, &settings)?;

    std::fs::create_dir_all(&cmd.output_dir)?;
    let files = MappingFiles::new(&cmd.output_dir, &cmd.prefix, cmd.space);

    let previous = if cmd.resume {
        let previous = files.load_previous()?;
        info!(
            "Resuming: {} resolved and {} not found in {}",
            previous.resolved.len(),
            previous.not_found.len(),
            files.mapping.display()
        );
        previous
    } else {
        MappingOutcome::default()
    };
    let done: BTreeSet<&String> = previous.resolved.keys().chain(previous.not_found.iter()).collect();
    let pending: Vec<String> = ids.iter().filter(|id| !done.contains(id)).cloned().collect();
    info!("{} IDs to resolve in {} space ({} already done)", pending.len(), cmd.space, ids.len() - pending.len());

    let delay = cmd
        .delay_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| settings.mapping.delay());
    let limiter = RateLimiter::new(delay);
    let current = map_batch(&pending, service.as_ref(), &limiter);
    let failed = current.failures.len();

    let outcome = merge_outcomes(previous, current);
    files.write(&outcome, cmd.space)?;
    info!(
        "{} resolved, {} not found; written to {}",
        outcome.resolved.len(),
        outcome.not_found.len(),
        files.mapping.display()
    );
    if failed > 0 {
        info!("Failed lookups are listed in {}", files.errors.display());
    }
    check_failures("lookups", failed, pending.len())
}

pub fn command(cmds: Commands, settings: Settings) -> CommandResult {
    match cmds {
        Commands::Resolve(cmd) => resolve(cmd, settings),
    }
}
