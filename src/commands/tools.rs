use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;

use crate::commands::{check_failures, CommandResult};
use crate::settings::Settings;
use crate::tools::external::{ExternalTool, ToolRunner};
use crate::tools::pool::{run_units, units_from_dir, write_summary, PoolSummary};

///////////////////////////////////////////////////////////////////////////////

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Align every orthogroup FASTA with MAFFT
    Align(AlignCommand),
    /// Build one tree per trimmed alignment
    Tree(TreeCommand),
    /// Cluster every FASTA file with CD-HIT
    Cluster(ClusterCommand),
}

#[derive(Args, Debug, Clone)]
pub struct PoolArgs {
    #[arg()]
    input_dir: PathBuf,
    #[arg(long, short)]
    output_dir: PathBuf,
    /// Only files ending with this suffix are units [default: per tool]
    #[arg(long)]
    input_suffix: Option<String>,
    #[arg(long, short)]
    workers: Option<usize>,
    /// Per-unit timeout in seconds, 0 disables it
    #[arg(long)]
    timeout: Option<u64>,
    /// Executable name or path, overrides the configuration
    #[arg(long)]
    program: Option<String>,
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct AlignCommand {
    #[command(flatten)]
    pool: PoolArgs,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeMethod {
    Fasttree,
    Iqtree,
}

#[derive(Parser, Debug, Clone)]
pub struct TreeCommand {
    #[command(flatten)]
    pool: PoolArgs,
    #[arg(long, short, value_enum, default_value = "fasttree")]
    method: TreeMethod,
}

#[derive(Parser, Debug, Clone)]
pub struct ClusterCommand {
    #[command(flatten)]
    pool: PoolArgs,
    /// Sequence identity threshold, overrides the configuration
    #[arg(long, short)]
    identity: Option<f64>,
}

///////////////////////////////////////////////////////////////////////////////

fn run_tool(tool: ExternalTool, configured_program: Option<String>, args: PoolArgs, settings: &Settings) -> CommandResult {
    let pool = &settings.pool;
    let timeout = match args.timeout {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs)),
        None => pool.timeout(),
    };
    let log_dir = args.log_dir.unwrap_or_else(|| args.output_dir.join(&pool.log_dir));
    let program = args.program.or(configured_program);

    // an unresolvable executable aborts before any unit runs
    let runner = ToolRunner::resolve(tool, program.as_deref(), &log_dir, timeout)?;
    let suffix = args
        .input_suffix
        .unwrap_or_else(|| runner.tool.default_input_suffix().to_string());
    let units = units_from_dir(&args.input_dir, &suffix, &args.output_dir, runner.tool.output_suffix())?;
    std::fs::create_dir_all(&args.output_dir)?;

    info!(
        "{}: {} units with {}, logs in {}",
        runner.tool.name(),
        units.len(),
        runner.executable.display(),
        log_dir.display()
    );
    let workers = args.workers.unwrap_or(pool.workers);
    let outcomes = run_units(&units, workers, |unit| runner.run(unit))?;

    let summary_path = args.output_dir.join(format!("{}_summary.csv", runner.tool.name()));
    write_summary(&summary_path, &outcomes)?;
    let summary = PoolSummary::from_outcomes(&outcomes);
    info!(
        "{} succeeded, {} skipped, {} failed; summary in {}",
        summary.succeeded,
        summary.skipped,
        summary.failed,
        summary_path.display()
    );
    check_failures("units", summary.failed, outcomes.len())
}

pub fn command(cmds: Commands, settings: Settings) -> CommandResult {
    match cmds {
        Commands::Align(cmd) => {
            let tool = ExternalTool::Mafft {
                args: settings.pool.mafft.args.clone(),
            };
            run_tool(tool, settings.pool.mafft.program.clone(), cmd.pool, &settings)
        }
        Commands::Tree(cmd) => {
            let (tool, program) = match cmd.method {
                TreeMethod::Fasttree => (
                    ExternalTool::FastTree {
                        args: settings.pool.fasttree.args.clone(),
                    },
                    settings.pool.fasttree.program.clone(),
                ),
                TreeMethod::Iqtree => (
                    ExternalTool::IqTree {
                        args: settings.pool.iqtree.args.clone(),
                    },
                    settings.pool.iqtree.program.clone(),
                ),
            };
            run_tool(tool, program, cmd.pool, &settings)
        }
        Commands::Cluster(cmd) => {
            let mut params = settings.pool.cdhit.clone();
            if let Some(identity) = cmd.identity {
                if !(0.0..=1.0).contains(&identity) {
                    return Err(format!("identity {} is outside 0..1", identity).into());
                }
                params.identity = identity;
            }
            run_tool(ExternalTool::CdHit(params), settings.pool.cdhit_program.clone(), cmd.pool, &settings)
        }
    }
}
