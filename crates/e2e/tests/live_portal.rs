//! Runs the workflow against a real deployment.
//!
//! Needs Node.js with the `playwright` package installed, plus
//! `CAREFLOW_BASE_URL`, `CAREFLOW_ADMIN_EMAIL` and `CAREFLOW_ADMIN_PASSWORD`.
//! Run with: cargo test --package careflow-e2e --test live_portal -- --ignored

use std::path::PathBuf;

use careflow_e2e::{write_results, RunConfig, SuiteRunner};

fn live_config() -> Option<RunConfig> {
    let mut config = RunConfig::load(&PathBuf::from("careflow.toml")).ok()?;
    config.target.base_url = std::env::var("CAREFLOW_BASE_URL").ok()?;
    config.admin.email = std::env::var("CAREFLOW_ADMIN_EMAIL").ok()?;
    config.admin.password = std::env::var("CAREFLOW_ADMIN_PASSWORD").ok()?;
    Some(config)
}

/// Marked ignored because it needs a browser and a live portal.
#[tokio::test]
#[ignore]
async fn live_workflow_passes() {
    let Some(config) = live_config() else {
        eprintln!("CAREFLOW_* not set; skipping");
        return;
    };
    let output_dir = config.output_dir.clone();
    let runner = SuiteRunner::with_playwright(config);

    let suite = runner.run(1, None).await.unwrap();
    write_results(&output_dir, &suite).unwrap();

    let result = &suite.results[0];
    assert!(result.passed, "{}", result.diagnostics.as_deref().unwrap_or(""));
}
