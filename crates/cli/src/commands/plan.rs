//! Plan Command

use anyhow::Result;
use careflow_e2e::{Action, Scenario, Step};
use clap::Args;
use serde::Serialize;

use super::{seed_or_next, ConfigSource, REDACTED};
use crate::output::{print_list, print_value, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct PlanArgs {
    /// Seed to derive fixtures from
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Serialize)]
struct StepPlanDisplay {
    name: String,
    requires: String,
    actions: String,
    postcondition: String,
    timeout_ms: u64,
}

impl From<&Step> for StepPlanDisplay {
    fn from(step: &Step) -> Self {
        Self {
            name: step.name.clone(),
            requires: step.requires.iter().map(|f| f.to_string()).collect::<Vec<_>>().join(", "),
            actions: step.actions.iter().map(Action::describe).collect::<Vec<_>>().join("\n"),
            postcondition: step.postcondition.to_string(),
            timeout_ms: step.timeout_ms,
        }
    }
}

impl TableDisplay for StepPlanDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Step", "Requires", "Actions", "Postcondition", "Timeout"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.requires.clone(),
            self.actions.clone(),
            self.postcondition.clone(),
            format!("{} ms", self.timeout_ms),
        ]
    }
}

pub fn execute(args: PlanArgs, source: &ConfigSource, format: OutputFormat) -> Result<()> {
    let config = source.load()?;
    let password = config.admin.password.clone();
    let scenario = Scenario::new(config, seed_or_next(args.seed));
    let steps = redact(scenario.plan()?, &password);

    match format {
        OutputFormat::Table => {
            println!("Seed {}", scenario.seed());
            let rows: Vec<StepPlanDisplay> = steps.iter().map(StepPlanDisplay::from).collect();
            print_list(&rows, format)
        }
        _ => print_value(&steps, format),
    }
}

/// Mask the admin password wherever a step types it
fn redact(mut steps: Vec<Step>, password: &str) -> Vec<Step> {
    if password.is_empty() {
        return steps;
    }
    for step in &mut steps {
        for action in &mut step.actions {
            if let Action::Fill { value, .. } = action {
                if value == password {
                    *value = REDACTED.to_string();
                }
            }
        }
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use careflow_e2e::{RunConfig, RunSeed};

    #[test]
    fn test_password_never_printed() {
        let mut config = RunConfig::default();
        config.admin.email = "admin@portal.test".into();
        config.admin.password = "Pass@123".into();
        let steps = Scenario::new(config, RunSeed::new(1)).plan().unwrap();

        let steps = redact(steps, "Pass@123");
        let json = serde_json::to_string(&steps).unwrap();
        assert!(!json.contains("Pass@123"));
        assert!(json.contains(REDACTED));
    }
}
