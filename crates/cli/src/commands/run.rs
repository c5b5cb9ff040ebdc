//! Run Command

use std::path::PathBuf;

use anyhow::Result;
use careflow_e2e::step::StepRecord;
use careflow_e2e::{write_results, RunResult, RunSeed, StepState, SuiteResult, SuiteRunner};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use super::{ConfigSource, Outcome};
use crate::output::{print_info, print_list, print_value, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct RunArgs {
    /// Number of independent runs to execute concurrently
    #[arg(short, long, default_value = "1")]
    parallel: usize,

    /// Seed of the first run (later runs use seed+1, seed+2, ...)
    #[arg(long)]
    seed: Option<u64>,

    /// Override the output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Skip the HTTP reachability check
    #[arg(long)]
    no_preflight: bool,
}

#[derive(Serialize)]
pub struct RunDisplay {
    pub run_id: String,
    pub seed: u64,
    pub passed: bool,
    pub failed_step: String,
    pub failure_kind: String,
    pub duration_ms: u64,
}

impl From<&RunResult> for RunDisplay {
    fn from(r: &RunResult) -> Self {
        Self {
            run_id: r.run_id.to_string(),
            seed: r.seed.value(),
            passed: r.passed,
            failed_step: r.failed_step.clone().unwrap_or_default(),
            failure_kind: r.failure_kind.map(|k| k.to_string()).unwrap_or_default(),
            duration_ms: r.duration_ms,
        }
    }
}

impl TableDisplay for RunDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Run", "Seed", "Result", "Failed Step", "Failure", "Duration"]
    }

    fn row(&self) -> Vec<String> {
        let result = if self.passed {
            "✓ Passed".green().to_string()
        } else {
            "✗ Failed".red().to_string()
        };
        vec![
            self.run_id.chars().take(8).collect(),
            self.seed.to_string(),
            result,
            self.failed_step.clone(),
            self.failure_kind.clone(),
            format!("{:.1}s", self.duration_ms as f64 / 1000.0),
        ]
    }
}

#[derive(Serialize)]
pub struct StepDisplay {
    pub name: String,
    pub state: StepState,
    pub duration_ms: u64,
}

impl From<&StepRecord> for StepDisplay {
    fn from(s: &StepRecord) -> Self {
        Self {
            name: s.name.clone(),
            state: s.state,
            duration_ms: s.duration_ms,
        }
    }
}

impl TableDisplay for StepDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Step", "State", "Duration"]
    }

    fn row(&self) -> Vec<String> {
        let state = match self.state {
            StepState::Passed => "✓ passed".green().to_string(),
            StepState::Failed => "✗ failed".red().to_string(),
            StepState::Running => "… running".yellow().to_string(),
            StepState::Pending => "- pending".dimmed().to_string(),
        };
        vec![self.name.clone(), state, format!("{} ms", self.duration_ms)]
    }
}

pub async fn execute(args: RunArgs, source: &ConfigSource, format: OutputFormat) -> Result<Outcome> {
    let mut config = source.load()?;
    if let Some(output) = args.output {
        config.output_dir = output;
    }
    if args.headed {
        config.browser.headless = false;
    }
    if args.no_preflight {
        config.target.preflight = false;
    }
    let output_dir = config.output_dir.clone();

    let runner = SuiteRunner::with_playwright(config);
    let suite = runner.run(args.parallel, args.seed.map(RunSeed::new)).await?;
    let path = write_results(&output_dir, &suite)?;

    render(&suite, format)?;
    if format == OutputFormat::Table {
        print_info(&format!("Results written to {}", path.display()));
    }

    Ok(outcome(&suite))
}

fn render(suite: &SuiteResult, format: OutputFormat) -> Result<()> {
    if format != OutputFormat::Table {
        return print_value(suite, format);
    }

    let runs: Vec<RunDisplay> = suite.results.iter().map(RunDisplay::from).collect();
    print_list(&runs, format)?;

    for run in &suite.results {
        if suite.results.len() > 1 {
            println!("\nRun {} (seed {})", run.run_id, run.seed);
        }
        let steps: Vec<StepDisplay> = run.steps.iter().map(StepDisplay::from).collect();
        if !steps.is_empty() {
            print_list(&steps, format)?;
        }
        if let Some(diagnostics) = &run.diagnostics {
            println!("{}", diagnostics.red());
        }
    }

    println!(
        "\n{} passed, {} failed ({:.1}s)",
        suite.passed.to_string().green(),
        suite.failed.to_string().red(),
        suite.duration_ms as f64 / 1000.0
    );
    Ok(())
}

fn outcome(suite: &SuiteResult) -> Outcome {
    if suite.has_infrastructure_failure() {
        Outcome::Infrastructure
    } else if suite.all_passed() {
        Outcome::Passed
    } else {
        Outcome::Failed
    }
}
