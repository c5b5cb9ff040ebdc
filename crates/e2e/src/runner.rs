//! Runs independent scenario runs side by side

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::RunConfig;
use crate::driver::DriverFactory;
use crate::error::{E2eError, E2eResult};
use crate::fixtures::{FixtureSet, RunSeed};
use crate::playwright::PlaywrightFactory;
use crate::report::SuiteResult;
use crate::scenario::{RunResult, Scenario};

const PREFLIGHT_TIMEOUT: Duration = Duration::from_secs(10);

/// Owns the configuration and hands each run its own browser context
pub struct SuiteRunner {
    config: RunConfig,
    factory: Arc<dyn DriverFactory>,
}

impl SuiteRunner {
    pub fn new(config: RunConfig, factory: Arc<dyn DriverFactory>) -> Self {
        Self { config, factory }
    }

    /// Runner backed by real browsers
    pub fn with_playwright(config: RunConfig) -> Self {
        let factory = Arc::new(PlaywrightFactory::new(config.playwright()));
        Self::new(config, factory)
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Check that the target answers HTTP at all. Any status counts; only
    /// connection-level failures are fatal.
    pub async fn preflight(&self) -> E2eResult<()> {
        let url = &self.config.target.base_url;
        let client = reqwest::Client::builder().timeout(PREFLIGHT_TIMEOUT).build()?;

        match client.get(url).send().await {
            Ok(response) => {
                info!("Target {} answered {}", url, response.status());
                Ok(())
            }
            Err(e) => Err(E2eError::TargetUnreachable(format!("{url}: {e}"))),
        }
    }

    /// Seeds for `runs` runs: consecutive from `first`, or fresh per run
    pub fn seeds(runs: usize, first: Option<RunSeed>) -> Vec<RunSeed> {
        match first {
            Some(seed) => (0..runs as u64).map(|i| RunSeed::new(seed.value() + i)).collect(),
            None => (0..runs).map(|_| RunSeed::next()).collect(),
        }
    }

    /// One full scenario run. Failing to get a browser is reported as an
    /// infrastructure failure of that run, not an error of the suite.
    pub async fn run_one(&self, seed: RunSeed) -> E2eResult<RunResult> {
        let scenario = Scenario::new(self.config.clone(), seed);
        let started_at = Utc::now();

        let driver = match self.factory.open().await {
            Ok(driver) => driver,
            Err(e) => {
                error!("Could not open a browser for seed {}: {}", seed, e);
                return Ok(infrastructure_failure(scenario.fixtures().clone(), &e, started_at));
            }
        };

        scenario.run(driver).await
    }

    pub async fn run(&self, runs: usize, first_seed: Option<RunSeed>) -> E2eResult<SuiteResult> {
        self.config.validate()?;
        if self.config.target.preflight {
            self.preflight().await?;
        }

        let start = Instant::now();
        let seeds = Self::seeds(runs.max(1), first_seed);
        info!("Running {} scenario run(s)...", seeds.len());

        let outcomes = join_all(seeds.iter().map(|seed| self.run_one(*seed))).await;
        let results = outcomes.into_iter().collect::<E2eResult<Vec<_>>>()?;

        let suite = SuiteResult::from_runs(results, start.elapsed().as_millis() as u64);
        if suite.all_passed() {
            info!("Results: {} passed ({} ms)", suite.passed, suite.duration_ms);
        } else {
            warn!(
                "Results: {} passed, {} failed ({} ms)",
                suite.passed, suite.failed, suite.duration_ms
            );
        }
        Ok(suite)
    }
}

fn infrastructure_failure(fixtures: FixtureSet, err: &E2eError, started_at: chrono::DateTime<Utc>) -> RunResult {
    let finished_at = Utc::now();
    RunResult {
        run_id: Uuid::new_v4(),
        seed: fixtures.seed,
        passed: false,
        failed_step: None,
        failure_kind: Some(err.kind()),
        diagnostics: Some(err.to_string()),
        screenshot: None,
        steps: Vec::new(),
        fixtures,
        started_at,
        finished_at,
        duration_ms: (finished_at - started_at).num_milliseconds().max(0) as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdminCredentials;
    use crate::driver::UiDriver;
    use crate::error::FailureKind;
    use crate::step::StepState;
    use crate::testing::{Portal, PortalFactory};
    use async_trait::async_trait;

    fn config() -> RunConfig {
        let mut config = RunConfig::default();
        config.target.preflight = false;
        config.admin = AdminCredentials {
            email: "admin@portal.test".into(),
            password: "secret".into(),
        };
        config.output_dir = std::env::temp_dir().join("careflow-runner-tests");
        config
    }

    struct NoBrowser;

    #[async_trait]
    impl DriverFactory for NoBrowser {
        async fn open(&self) -> E2eResult<Arc<dyn UiDriver>> {
            Err(E2eError::BridgeNotFound)
        }
    }

    #[test]
    fn test_seeds() {
        let seeds = SuiteRunner::seeds(3, Some(RunSeed::new(10)));
        assert_eq!(seeds, vec![RunSeed::new(10), RunSeed::new(11), RunSeed::new(12)]);

        let fresh = SuiteRunner::seeds(2, None);
        assert!(fresh[0] < fresh[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_runs_use_distinct_seeds_and_pass() {
        let config = config();
        let seeds = SuiteRunner::seeds(2, Some(RunSeed::new(1_700_000_000_000)));
        let portal = seeds.iter().fold(Portal::new(&config), |portal, seed| {
            portal.with_fixtures(&FixtureSet::generate(*seed, &config.fixtures))
        });
        let runner = SuiteRunner::new(config, Arc::new(PortalFactory::new(portal)));

        let suite = runner.run(2, Some(seeds[0])).await.unwrap();
        assert_eq!(suite.total, 2);
        assert!(suite.all_passed(), "{:?}", suite.results.iter().map(|r| &r.diagnostics).collect::<Vec<_>>());
        assert_ne!(suite.results[0].fixtures.patient.mobile, suite.results[1].fixtures.patient.mobile);
        assert!(suite
            .results
            .iter()
            .all(|r| r.steps.iter().all(|s| s.state == StepState::Passed)));
    }

    #[tokio::test]
    async fn test_missing_browser_is_an_infrastructure_failure() {
        let runner = SuiteRunner::new(config(), Arc::new(NoBrowser));
        let suite = runner.run(1, Some(RunSeed::new(5))).await.unwrap();

        assert_eq!(suite.failed, 1);
        assert!(suite.has_infrastructure_failure());
        assert_eq!(suite.results[0].failure_kind, Some(FailureKind::Infrastructure));
        assert!(suite.results[0].failed_step.is_none());
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_before_running() {
        let mut config = config();
        config.admin.password.clear();
        let runner = SuiteRunner::new(config, Arc::new(NoBrowser));
        assert!(matches!(runner.run(1, None).await, Err(E2eError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_preflight_reports_unreachable_target() {
        let mut config = config();
        config.target.base_url = "http://127.0.0.1:9/".into();
        let runner = SuiteRunner::new(config, Arc::new(NoBrowser));
        assert!(matches!(runner.preflight().await, Err(E2eError::TargetUnreachable(_))));
    }
}
