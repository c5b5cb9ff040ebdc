//! Fixtures Command

use anyhow::Result;
use careflow_e2e::FixtureSet;
use clap::Args;
use serde::Serialize;

use super::{seed_or_next, ConfigSource};
use crate::output::{print_list, print_value, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct FixturesArgs {
    /// Seed to derive fixtures from
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Serialize)]
struct FixtureDisplay {
    kind: &'static str,
    name: String,
    email: String,
    mobile: String,
    dob: String,
    detail: String,
}

impl TableDisplay for FixtureDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Kind", "Name", "Email", "Mobile", "DOB", "Detail"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.kind.to_string(),
            self.name.clone(),
            self.email.clone(),
            self.mobile.clone(),
            self.dob.clone(),
            self.detail.clone(),
        ]
    }
}

fn rows(set: &FixtureSet) -> Vec<FixtureDisplay> {
    let provider = &set.provider;
    let patient = &set.patient;
    let appointment = &set.appointment;
    vec![
        FixtureDisplay {
            kind: "provider",
            name: provider.display_name(),
            email: provider.email.clone(),
            mobile: String::new(),
            dob: provider.dob.clone(),
            detail: format!("{} / {} / {}", provider.provider_type, provider.role, provider.gender),
        },
        FixtureDisplay {
            kind: "patient",
            name: patient.display_name(),
            email: patient.email.clone(),
            mobile: patient.mobile.clone(),
            dob: patient.dob.clone(),
            detail: patient.gender.clone(),
        },
        FixtureDisplay {
            kind: "appointment",
            name: appointment.appointment_type.clone(),
            email: String::new(),
            mobile: String::new(),
            dob: String::new(),
            detail: format!(
                "{} / {} / {}",
                appointment.reason, appointment.visit_type, appointment.time_zone
            ),
        },
    ]
}

pub fn execute(args: FixturesArgs, source: &ConfigSource, format: OutputFormat) -> Result<()> {
    let config = source.load()?;
    let set = FixtureSet::generate(seed_or_next(args.seed), &config.fixtures);

    match format {
        OutputFormat::Table => {
            println!("Seed {}", set.seed);
            print_list(&rows(&set), format)
        }
        _ => print_value(&set, format),
    }
}
