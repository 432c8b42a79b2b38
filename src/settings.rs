/// Layered run configuration: `.env`, then a TOML file, then
/// `DARK_PROTEOME__<SECTION>__<KEY>` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};
use dotenvy::dotenv;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::annotation::homology::HitFilter;
use crate::annotation::outgroup::OutgroupParams;
use crate::categorize::rules::KeywordMode;
use crate::sequence::filter::FilterParams;
use crate::tools::external::CdHitParams;
use crate::uniprot::client::{AFDB_FILES_URL, UNIPROT_REST_URL};

pub const DEFAULT_CONFIG: &str = "assets/config.toml";
const ENV_PREFIX: &str = "DARK_PROTEOME";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration path is not valid UTF-8: {0}")]
    InvalidPath(PathBuf),

    #[error("Invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MappingSettings {
    pub uniprot_url: String,
    pub afdb_url: String,
    /// Minimum delay between two remote requests.
    pub delay_ms: u64,
    pub request_timeout_secs: u64,
    pub plddt_cutoff: f64,
}

impl Default for MappingSettings {
    fn default() -> Self {
        MappingSettings {
            uniprot_url: UNIPROT_REST_URL.to_string(),
            afdb_url: AFDB_FILES_URL.to_string(),
            delay_ms: 500,
            request_timeout_secs: 30,
            plddt_cutoff: 70.0,
        }
    }
}

impl MappingSettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HomologySettings {
    pub best_hits: HitFilter,
    pub outgroups: OutgroupParams,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CategorizeSettings {
    pub rules: PathBuf,
    pub keyword_mode: KeywordMode,
}

impl Default for CategorizeSettings {
    fn default() -> Self {
        CategorizeSettings {
            rules: PathBuf::from("assets/category_rules.csv"),
            keyword_mode: KeywordMode::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub stem: String,
    /// Source names, highest precedence first.
    pub precedence: Vec<String>,
    pub allow_dropped_columns: bool,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            stem: "integrated_database".to_string(),
            precedence: ["functional_category", "interproscan", "orthofinder", "signal_peptide"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            allow_dropped_columns: false,
        }
    }
}

/// Program name (looked up on PATH) and extra arguments for one tool.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub program: Option<String>,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub workers: usize,
    /// Per-unit timeout; 0 disables it.
    pub timeout_secs: u64,
    pub log_dir: PathBuf,
    pub mafft: ToolSettings,
    pub fasttree: ToolSettings,
    pub iqtree: ToolSettings,
    pub cdhit_program: Option<String>,
    pub cdhit: CdHitParams,
}

impl Default for PoolSettings {
    fn default() -> Self {
        PoolSettings {
            workers: 4,
            timeout_secs: 3600,
            log_dir: PathBuf::from("logs"),
            mafft: ToolSettings {
                program: None,
                args: vec!["--auto".to_string()],
            },
            fasttree: ToolSettings {
                program: None,
                args: vec!["-lg".to_string(), "-gamma".to_string()],
            },
            iqtree: ToolSettings::default(),
            cdhit_program: None,
            cdhit: CdHitParams::default(),
        }
    }
}

impl PoolSettings {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub filter: FilterParams,
    pub mapping: MappingSettings,
    pub homology: HomologySettings,
    pub categorize: CategorizeSettings,
    pub database: DatabaseSettings,
    pub pool: PoolSettings,
}

impl Settings {
    fn validate(&self) -> Result<(), ConfigError> {
        self.filter.validate().map_err(|e| ConfigError::Invalid {
            key: "filter",
            reason: e.to_string(),
        })?;
        if self.pool.workers == 0 {
            return Err(ConfigError::Invalid {
                key: "pool.workers",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.pool.cdhit.identity) {
            return Err(ConfigError::Invalid {
                key: "pool.cdhit.identity",
                reason: format!("{} is outside 0..1", self.pool.cdhit.identity),
            });
        }
        Ok(())
    }
}

/// Loads settings. A missing default file is tolerated; an explicitly given
/// path must exist.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    dotenv().ok();

    let (file, required) = match path {
        Some(p) => (p, true),
        None => (Path::new(DEFAULT_CONFIG), false),
    };
    let file_name = file
        .to_str()
        .ok_or_else(|| ConfigError::InvalidPath(file.to_path_buf()))?;

    let settings: Settings = ConfigBuilder::<DefaultState>::default()
        .add_source(File::with_name(file_name).required(required))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;
    settings.validate()?;

    debug!("Loaded settings: {:?}", settings);
    Ok(settings)
}
