/// Bounded worker pool running one job per independent unit of work.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};

use csv::Writer;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use tracing::{error, info, warn};

use crate::tools::PoolError;
use crate::util::{list_files_with_suffix, unit_name};

/// One input file and the output it should produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    pub name: String,
    pub input: PathBuf,
    pub output: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitStatus {
    Succeeded { output: PathBuf },
    Skipped { output: PathBuf },
    Failed { reason: String },
}

impl UnitStatus {
    pub fn label(&self) -> &'static str {
        match self {
            UnitStatus::Succeeded { .. } => "succeeded",
            UnitStatus::Skipped { .. } => "skipped",
            UnitStatus::Failed { .. } => "failed",
        }
    }

    pub fn detail(&self) -> String {
        match self {
            UnitStatus::Succeeded { output } | UnitStatus::Skipped { output } => output.display().to_string(),
            UnitStatus::Failed { reason } => reason.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOutcome {
    pub name: String,
    pub status: UnitStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl PoolSummary {
    pub fn from_outcomes(outcomes: &[UnitOutcome]) -> Self {
        let mut summary = PoolSummary::default();
        for outcome in outcomes {
            match outcome.status {
                UnitStatus::Succeeded { .. } => summary.succeeded += 1,
                UnitStatus::Skipped { .. } => summary.skipped += 1,
                UnitStatus::Failed { .. } => summary.failed += 1,
            }
        }
        summary
    }
}

/// Pairs every `*<input_suffix>` file of `input_dir` with
/// `<output_dir>/<unit><output_suffix>`.
pub fn units_from_dir(
    input_dir: &Path,
    input_suffix: &str,
    output_dir: &Path,
    output_suffix: &str,
) -> Result<Vec<WorkUnit>, PoolError> {
    let files = list_files_with_suffix(input_dir, input_suffix).map_err(|source| PoolError::Io {
        path: input_dir.to_path_buf(),
        source,
    })?;
    if files.is_empty() {
        return Err(PoolError::NoUnits {
            dir: input_dir.to_path_buf(),
            suffix: input_suffix.to_string(),
        });
    }
    Ok(files
        .into_iter()
        .map(|input| {
            let name = unit_name(&input, input_suffix);
            let output = output_dir.join(format!("{}{}", name, output_suffix));
            WorkUnit { name, input, output }
        })
        .collect())
}

/// Runs `job` on every unit with at most `workers` concurrent jobs. A failing
/// or panicking job only fails its own unit. Outcomes are sorted by unit name.
pub fn run_units<F>(units: &[WorkUnit], workers: usize, job: F) -> Result<Vec<UnitOutcome>, PoolError>
where
    F: Fn(&WorkUnit) -> UnitStatus + Sync + Send,
{
    let pool = ThreadPoolBuilder::new().num_threads(workers.max(1)).build()?;
    info!("Running {} units on {} workers", units.len(), workers.max(1));

    let mut outcomes: Vec<UnitOutcome> = pool.install(|| {
        units
            .par_iter()
            .map(|unit| {
                let status = catch_unwind(AssertUnwindSafe(|| job(unit))).unwrap_or_else(|_| UnitStatus::Failed {
                    reason: "job panicked".to_string(),
                });
                match &status {
                    UnitStatus::Failed { reason } => error!("{}: {}", unit.name, reason),
                    UnitStatus::Skipped { output } => info!("{}: {} exists, skipping", unit.name, output.display()),
                    UnitStatus::Succeeded { .. } => info!("{}: done", unit.name),
                }
                UnitOutcome {
                    name: unit.name.clone(),
                    status,
                }
            })
            .collect()
    });
    outcomes.sort_by(|a, b| a.name.cmp(&b.name));

    let summary = PoolSummary::from_outcomes(&outcomes);
    if summary.failed > 0 {
        warn!(
            "{} succeeded, {} skipped, {} failed",
            summary.succeeded, summary.skipped, summary.failed
        );
    } else {
        info!("{} succeeded, {} skipped", summary.succeeded, summary.skipped);
    }
    Ok(outcomes)
}

/// Writes `Unit,Status,Detail` rows.
pub fn write_summary(path: &Path, outcomes: &[UnitOutcome]) -> Result<(), PoolError> {
    let csv_err = |source| PoolError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut wtr = Writer::from_path(path).map_err(csv_err)?;
    wtr.write_record(["Unit", "Status", "Detail"]).map_err(csv_err)?;
    for outcome in outcomes {
        wtr.write_record([outcome.name.as_str(), outcome.status.label(), &outcome.status.detail()])
            .map_err(csv_err)?;
    }
    wtr.flush().map_err(|source| PoolError::Io {
        path: path.to_path_buf(),
        source,
    })
}
