//! TOML configuration deserialisation for inversion jobs.
//!
//! ```toml
//! [cluster]
//! participants = 4
//!
//! [compute]
//! backend = "cpu"     # "serial" or "cpu"
//! threads = 0         # 0 = all cores
//! tolerance = 1e-6
//!
//! [input]
//! path = "matrix.bin"
//! format = "b"        # optional, inferred from the extension
//!
//! [output]
//! path = "inverse.txt"
//! ```

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// Top-level job configuration. Every section is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub compute: ComputeConfig,
    pub input: Option<FileConfig>,
    pub output: Option<FileConfig>,
}

/// Process group settings.
#[derive(Debug, Deserialize)]
pub struct ClusterConfig {
    /// Participants of the in-process cluster (default: 4).
    #[serde(default = "default_participants")]
    pub participants: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            participants: default_participants(),
        }
    }
}

fn default_participants() -> usize {
    4
}

/// Per-participant arithmetic settings.
#[derive(Debug, Deserialize)]
pub struct ComputeConfig {
    /// Compute backend: "serial" or "cpu". Default: "cpu".
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Worker threads per participant; 0 uses every core.
    #[serde(default)]
    pub threads: usize,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            threads: 0,
            tolerance: default_tolerance(),
        }
    }
}

fn default_backend() -> String {
    "cpu".into()
}

fn default_tolerance() -> f64 {
    rowcycle_core::PIVOT_TOLERANCE
}

/// A matrix file and its optional format flag (`t`/`b`).
#[derive(Debug, Deserialize)]
pub struct FileConfig {
    pub path: PathBuf,
    pub format: Option<String>,
}

/// Load and parse a TOML job configuration file.
pub fn load_config(path: &Path) -> anyhow::Result<JobConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config: JobConfig = toml::from_str(&content)
        .with_context(|| format!("Invalid config {}", path.display()))?;
    Ok(config)
}
