//! Aggregated results and their on-disk form

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{E2eResult, FailureKind};
use crate::scenario::RunResult;

pub const RESULTS_FILE: &str = "test-results.json";

/// Result of running all scenario runs of one invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    pub results: Vec<RunResult>,
}

impl SuiteResult {
    pub fn from_runs(results: Vec<RunResult>, duration_ms: u64) -> Self {
        let passed = results.iter().filter(|r| r.passed).count();
        Self {
            total: results.len(),
            passed,
            failed: results.len() - passed,
            duration_ms,
            results,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// Some run never reached the application under test
    pub fn has_infrastructure_failure(&self) -> bool {
        self.results
            .iter()
            .any(|r| r.failure_kind == Some(FailureKind::Infrastructure))
    }
}

/// Write results to `<dir>/test-results.json`
pub fn write_results(dir: &Path, results: &SuiteResult) -> E2eResult<PathBuf> {
    std::fs::create_dir_all(dir)?;

    let path = dir.join(RESULTS_FILE);
    let json = serde_json::to_string_pretty(results)?;
    std::fs::write(&path, json)?;

    info!("Results written to: {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{FixtureDefaults, FixtureSet, RunSeed};
    use chrono::Utc;
    use uuid::Uuid;

    fn run(seed: u64, passed: bool, kind: Option<FailureKind>) -> RunResult {
        let seed = RunSeed::new(seed);
        let now = Utc::now();
        RunResult {
            run_id: Uuid::new_v4(),
            seed,
            passed,
            failed_step: (!passed).then(|| "Login".to_string()),
            failure_kind: kind,
            diagnostics: None,
            screenshot: None,
            steps: Vec::new(),
            fixtures: FixtureSet::generate(seed, &FixtureDefaults::default()),
            started_at: now,
            finished_at: now,
            duration_ms: 0,
        }
    }

    #[test]
    fn test_counts() {
        let suite = SuiteResult::from_runs(
            vec![run(1, true, None), run(2, false, Some(FailureKind::NavigationFailed))],
            42,
        );
        assert_eq!((suite.total, suite.passed, suite.failed), (2, 1, 1));
        assert!(!suite.all_passed());
        assert!(!suite.has_infrastructure_failure());

        let suite = SuiteResult::from_runs(vec![run(3, false, Some(FailureKind::Infrastructure))], 1);
        assert!(suite.has_infrastructure_failure());
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let suite = SuiteResult::from_runs(vec![run(1_700_000_000_000, true, None)], 1234);

        let path = write_results(&dir.path().join("out"), &suite).unwrap();
        assert!(path.ends_with(RESULTS_FILE));

        let content = std::fs::read_to_string(&path).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(raw["results"][0]["seed"], 1_700_000_000_000u64);
        assert_eq!(serde_json::from_str::<SuiteResult>(&content).unwrap(), suite);
    }
}
