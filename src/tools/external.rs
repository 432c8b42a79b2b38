/// Invocation of the external alignment, tree and clustering programs.
///
/// A `ToolRunner` turns one `WorkUnit` into one process. stderr goes to
/// `<log_dir>/<unit>_<tool>.log`, a timeout kills the process, and partial
/// outputs of failed units are removed so a rerun retries them.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::debug;

use crate::tools::pool::{UnitStatus, WorkUnit};
use crate::tools::PoolError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CdHitParams {
    pub identity: f64,
    pub word_size: u32,
    pub memory_mb: u32,
    pub threads: u32,
    pub extra: Vec<String>,
}

impl Default for CdHitParams {
    fn default() -> Self {
        CdHitParams {
            identity: 0.9,
            word_size: 5,
            memory_mb: 16000,
            threads: 1,
            extra: vec!["-d".to_string(), "0".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExternalTool {
    /// `mafft <args> <input>`, alignment on stdout.
    Mafft { args: Vec<String> },
    /// `FastTree <args> < alignment`, Newick on stdout.
    FastTree { args: Vec<String> },
    /// `iqtree -s <input> --prefix <dir/unit> <args>`, tree in `<prefix>.treefile`.
    IqTree { args: Vec<String> },
    /// `cd-hit -i <input> -o <output> -c -n -M -T <extra>`.
    CdHit(CdHitParams),
}

impl ExternalTool {
    pub fn name(&self) -> &'static str {
        match self {
            ExternalTool::Mafft { .. } => "mafft",
            ExternalTool::FastTree { .. } => "fasttree",
            ExternalTool::IqTree { .. } => "iqtree",
            ExternalTool::CdHit(_) => "cdhit",
        }
    }

    pub fn default_program(&self) -> &'static str {
        match self {
            ExternalTool::Mafft { .. } => "mafft",
            ExternalTool::FastTree { .. } => "FastTreeMP",
            ExternalTool::IqTree { .. } => "iqtree2",
            ExternalTool::CdHit(_) => "cd-hit",
        }
    }

    pub fn default_input_suffix(&self) -> &'static str {
        match self {
            ExternalTool::Mafft { .. } | ExternalTool::CdHit(_) => ".fasta",
            ExternalTool::FastTree { .. } | ExternalTool::IqTree { .. } => "_trimmed.fasta",
        }
    }

    pub fn output_suffix(&self) -> &'static str {
        match self {
            ExternalTool::Mafft { .. } => ".mafft.fa",
            ExternalTool::FastTree { .. } => "_fasttree.nwk",
            ExternalTool::IqTree { .. } => ".treefile",
            ExternalTool::CdHit(_) => "_cdhit.fasta",
        }
    }

    fn arguments(&self, unit: &WorkUnit) -> Vec<OsString> {
        let mut argv: Vec<OsString> = Vec::new();
        match self {
            ExternalTool::Mafft { args } => {
                argv.extend(args.iter().map(OsString::from));
                argv.push(unit.input.clone().into_os_string());
            }
            ExternalTool::FastTree { args } => {
                argv.extend(args.iter().map(OsString::from));
            }
            ExternalTool::IqTree { args } => {
                argv.push("-s".into());
                argv.push(unit.input.clone().into_os_string());
                argv.push("--prefix".into());
                argv.push(iqtree_prefix(unit).into_os_string());
                argv.extend(args.iter().map(OsString::from));
            }
            ExternalTool::CdHit(params) => {
                argv.push("-i".into());
                argv.push(unit.input.clone().into_os_string());
                argv.push("-o".into());
                argv.push(unit.output.clone().into_os_string());
                for (flag, value) in [
                    ("-c", params.identity.to_string()),
                    ("-n", params.word_size.to_string()),
                    ("-M", params.memory_mb.to_string()),
                    ("-T", params.threads.to_string()),
                ] {
                    argv.push(flag.into());
                    argv.push(value.into());
                }
                argv.extend(params.extra.iter().map(OsString::from));
            }
        }
        argv
    }

    fn reads_stdin(&self) -> bool {
        matches!(self, ExternalTool::FastTree { .. })
    }

    fn writes_stdout(&self) -> bool {
        matches!(self, ExternalTool::Mafft { .. } | ExternalTool::FastTree { .. })
    }
}

fn iqtree_prefix(unit: &WorkUnit) -> PathBuf {
    unit.output.with_file_name(&unit.name)
}

fn is_non_empty(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

fn wait_with_timeout(child: &mut Child, timeout: Option<Duration>) -> io::Result<Option<ExitStatus>> {
    let Some(limit) = timeout else {
        return child.wait().map(Some);
    };
    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if started.elapsed() >= limit {
            if let Err(e) = child.kill() {
                debug!("kill after {:?} failed: {}", limit, e);
            }
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[derive(Debug, Clone)]
pub struct ToolRunner {
    pub tool: ExternalTool,
    pub executable: PathBuf,
    pub log_dir: PathBuf,
    pub timeout: Option<Duration>,
}

impl ToolRunner {
    /// Locates `program` (or the tool's default) on PATH.
    pub fn resolve(
        tool: ExternalTool,
        program: Option<&str>,
        log_dir: &Path,
        timeout: Option<Duration>,
    ) -> Result<Self, PoolError> {
        let program = program.unwrap_or(tool.default_program());
        let executable = which::which(program).map_err(|source| PoolError::MissingExecutable {
            program: program.to_string(),
            source,
        })?;
        debug!("{} resolved to {}", program, executable.display());
        Ok(ToolRunner {
            tool,
            executable,
            log_dir: log_dir.to_path_buf(),
            timeout,
        })
    }

    pub fn log_path(&self, unit: &WorkUnit) -> PathBuf {
        self.log_dir.join(format!("{}_{}.log", unit.name, self.tool.name()))
    }

    /// Runs one unit. Never panics on tool failure; the reason is returned.
    pub fn run(&self, unit: &WorkUnit) -> UnitStatus {
        if is_non_empty(&unit.output) {
            return UnitStatus::Skipped {
                output: unit.output.clone(),
            };
        }
        match self.execute(unit) {
            Ok(()) if is_non_empty(&unit.output) => UnitStatus::Succeeded {
                output: unit.output.clone(),
            },
            Ok(()) => {
                let _ = fs::remove_file(&unit.output);
                UnitStatus::Failed {
                    reason: format!("empty output {}", unit.output.display()),
                }
            }
            Err(reason) => {
                let _ = fs::remove_file(&unit.output);
                UnitStatus::Failed { reason }
            }
        }
    }

    fn execute(&self, unit: &WorkUnit) -> Result<(), String> {
        let describe = |what: &str, path: &Path, e: io::Error| format!("{} {}: {}", what, path.display(), e);

        for dir in [Some(self.log_dir.as_path()), unit.output.parent()].into_iter().flatten() {
            fs::create_dir_all(dir).map_err(|e| describe("cannot create", dir, e))?;
        }
        let log_path = self.log_path(unit);
        let log = File::create(&log_path).map_err(|e| describe("cannot create", &log_path, e))?;

        let mut command = Command::new(&self.executable);
        command.args(self.tool.arguments(unit));

        if self.tool.reads_stdin() {
            let input = File::open(&unit.input).map_err(|e| describe("cannot open", &unit.input, e))?;
            command.stdin(Stdio::from(input));
        } else {
            command.stdin(Stdio::null());
        }
        if self.tool.writes_stdout() {
            let output = File::create(&unit.output).map_err(|e| describe("cannot create", &unit.output, e))?;
            command.stdout(Stdio::from(output));
        } else {
            let log_copy = log.try_clone().map_err(|e| describe("cannot reopen", &log_path, e))?;
            command.stdout(Stdio::from(log_copy));
        }
        command.stderr(Stdio::from(log));

        debug!("{}: {:?}", unit.name, command);
        let mut child = command
            .spawn()
            .map_err(|e| describe("cannot start", &self.executable, e))?;

        match wait_with_timeout(&mut child, self.timeout) {
            Ok(Some(status)) if status.success() => Ok(()),
            Ok(Some(status)) => Err(format!("{} ({}), see {}", status, self.tool.name(), log_path.display())),
            Ok(None) => Err(format!(
                "timeout after {}s, process killed",
                self.timeout.map(|t| t.as_secs_f64()).unwrap_or_default()
            )),
            Err(e) => Err(describe("cannot wait for", &self.executable, e)),
        }
    }
}
