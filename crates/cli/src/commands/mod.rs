//! CLI Commands

pub mod config;
pub mod fixtures;
pub mod plan;
pub mod run;

use std::path::PathBuf;

use anyhow::{Context, Result};
use careflow_e2e::{RunConfig, RunSeed};
use tracing::debug;

pub const REDACTED: &str = "<redacted>";

/// Where the effective configuration comes from: the file, then flags and
/// `CAREFLOW_*` variables on top
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub path: PathBuf,
    pub base_url: Option<String>,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl ConfigSource {
    pub fn load(&self) -> Result<RunConfig> {
        let mut config = RunConfig::load(&self.path)
            .with_context(|| format!("loading {}", self.path.display()))?;

        if let Some(url) = &self.base_url {
            config.target.base_url = url.clone();
        }
        if let Some(email) = &self.admin_email {
            config.admin.email = email.clone();
        }
        if let Some(password) = &self.admin_password {
            config.admin.password = password.clone();
        }
        debug!("Configuration from {}: target {}", self.path.display(), config.target.base_url);
        Ok(config)
    }
}

/// How the process should exit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed,
    Infrastructure,
}

impl Outcome {
    pub fn code(self) -> i32 {
        match self {
            Outcome::Passed => 0,
            Outcome::Failed => 1,
            Outcome::Infrastructure => 2,
        }
    }
}

pub fn seed_or_next(seed: Option<u64>) -> RunSeed {
    seed.map(RunSeed::new).unwrap_or_else(RunSeed::next)
}
