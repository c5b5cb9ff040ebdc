//! The provider-to-appointment workflow
//!
//! ```text
//! Login → NavigateAdminUserSettings → CreateProvider → ConfigureAvailability
//!       → CreatePatient → BookAppointment → VerifyAppointmentListed
//! ```
//!
//! Fixtures are generated once per run and threaded forward: the provider's
//! display name is the exact selection key in availability and booking, the
//! patient's display name selects them in booking, and the patient's first
//! name is what both patient creation and the final check look for.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::adapter::{Action, UiAdapter};
use crate::config::RunConfig;
use crate::descriptor::{Descriptor, Role};
use crate::driver::UiDriver;
use crate::error::{E2eResult, FailureKind};
use crate::fixtures::{FixtureSet, RunSeed};
use crate::session::{Fact, Session};
use crate::step::{Postcondition, Step, StepExecutor, StepRecord};

pub const LOGIN: &str = "Login";
pub const NAVIGATE_ADMIN_USER_SETTINGS: &str = "NavigateAdminUserSettings";
pub const CREATE_PROVIDER: &str = "CreateProvider";
pub const CONFIGURE_AVAILABILITY: &str = "ConfigureAvailability";
pub const CREATE_PATIENT: &str = "CreatePatient";
pub const BOOK_APPOINTMENT: &str = "BookAppointment";
pub const VERIFY_APPOINTMENT_LISTED: &str = "VerifyAppointmentListed";

/// Outcome of one scenario run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub seed: RunSeed,
    pub passed: bool,
    pub failed_step: Option<String>,
    pub failure_kind: Option<FailureKind>,
    pub diagnostics: Option<String>,
    pub screenshot: Option<PathBuf>,
    pub steps: Vec<StepRecord>,
    pub fixtures: FixtureSet,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
}

pub struct Scenario {
    config: RunConfig,
    fixtures: FixtureSet,
}

impl Scenario {
    pub fn new(config: RunConfig, seed: RunSeed) -> Self {
        let fixtures = FixtureSet::generate(seed, &config.fixtures);
        Self { config, fixtures }
    }

    pub fn seed(&self) -> RunSeed {
        self.fixtures.seed
    }

    pub fn fixtures(&self) -> &FixtureSet {
        &self.fixtures
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// The declared step sequence for this run's fixtures
    pub fn plan(&self) -> E2eResult<Vec<Step>> {
        Ok(vec![
            self.login()?,
            self.navigate_admin_user_settings(),
            self.create_provider(),
            self.configure_availability(),
            self.create_patient(),
            self.book_appointment(),
            self.verify_appointment_listed(),
        ])
    }

    /// Drive the whole workflow on `driver`. The driver is closed afterwards
    /// whatever the outcome.
    pub async fn run(&self, driver: Arc<dyn UiDriver>) -> E2eResult<RunResult> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let steps = self.plan()?;

        info!(
            "Run {} (seed {}): provider {}, patient {}",
            run_id,
            self.seed(),
            self.fixtures.provider.display_name(),
            self.fixtures.patient.display_name()
        );

        let adapter = UiAdapter::new(driver, self.config.wait_policy(), &self.config.target.base_url);
        let mut session = Session::new(adapter);
        let executor = StepExecutor::new().with_screenshot_dir(self.config.output_dir.join(self.seed().to_string()));

        let report = executor.run(&steps, &mut session).await;
        debug!(
            "Run {} confirmed: [{}]",
            run_id,
            session.facts().iter().map(|f| f.to_string()).collect::<Vec<_>>().join(", ")
        );
        session.close().await;
        let report = report?;

        let finished_at = Utc::now();
        let duration_ms = (finished_at - started_at).num_milliseconds().max(0) as u64;
        let passed = report.passed();
        let failure = report.failure;

        match &failure {
            None => info!("Run {} passed ({} ms)", run_id, duration_ms),
            Some(f) => error!("Run {} failed at {}", run_id, f.step),
        }

        Ok(RunResult {
            run_id,
            seed: self.seed(),
            passed,
            failed_step: failure.as_ref().map(|f| f.step.clone()),
            failure_kind: failure.as_ref().map(|f| f.kind),
            diagnostics: failure.as_ref().map(|f| f.diagnostics()),
            screenshot: failure.and_then(|f| f.screenshot),
            steps: report.records,
            fixtures: self.fixtures.clone(),
            started_at,
            finished_at,
            duration_ms,
        })
    }

    fn login(&self) -> E2eResult<Step> {
        let wait = self.config.wait_policy();
        let pattern = self.config.authenticated_url()?;

        Ok(Step::new(LOGIN, Postcondition::Url { pattern }, wait.navigation_timeout)
            .actions([
                Action::Goto {
                    url: self.config.target.base_url.clone(),
                },
                Action::fill(Descriptor::placeholder("Email"), &self.config.admin.email),
                Action::fill(Descriptor::css(r#"input[type="password"]"#), &self.config.admin.password),
                Action::click(Descriptor::button("Let's get Started")),
            ])
            .establishes(Fact::Authenticated))
    }

    fn navigate_admin_user_settings(&self) -> Step {
        Step::new(
            NAVIGATE_ADMIN_USER_SETTINGS,
            Postcondition::Visible {
                target: Descriptor::button("Add Provider User"),
            },
            self.config.wait_policy().postcondition_timeout,
        )
        .actions([
            Action::click(Descriptor::tab("Settings")),
            Action::click(Descriptor::menu_item("User Settings")),
            Action::click(Descriptor::tab("Providers")),
        ])
        .requires(Fact::Authenticated)
        .establishes(Fact::ProviderSettingsOpen)
    }

    fn create_provider(&self) -> Step {
        let provider = &self.fixtures.provider;

        Step::new(
            CREATE_PROVIDER,
            Postcondition::Visible {
                target: Descriptor::text(&self.config.messages.provider_created),
            },
            self.config.wait_policy().postcondition_timeout,
        )
        .actions([
            Action::click(Descriptor::button("Add Provider User")),
            Action::fill(Descriptor::placeholder("First Name"), &provider.first_name),
            Action::fill(Descriptor::placeholder("Last Name"), &provider.last_name),
            Action::choose("Provider Type", &provider.provider_type),
            Action::choose("Role *", &provider.role),
            Action::fill(Descriptor::placeholder("DOB"), &provider.dob),
            Action::choose("Gender *", &provider.gender),
            Action::fill(Descriptor::placeholder("Email"), &provider.email),
            Action::click(Descriptor::button("Save")),
        ])
        .requires(Fact::ProviderSettingsOpen)
        .establishes(Fact::ProviderExists {
            display_name: provider.display_name(),
        })
    }

    fn configure_availability(&self) -> Step {
        let provider = self.fixtures.provider.display_name();
        let availability = &self.config.availability;

        Step::new(
            CONFIGURE_AVAILABILITY,
            Postcondition::Visible {
                target: Descriptor::text(&self.config.messages.availability_added),
            },
            self.config.wait_policy().postcondition_timeout,
        )
        .actions([
            Action::click(Descriptor::tab("Scheduling")),
            Action::click(Descriptor::menu_item("Availability")),
            Action::click(Descriptor::button("Edit Availability")),
            Action::choose_exact("Select Provider", &provider),
            Action::choose("Booking Window", &availability.booking_window),
            Action::click(Descriptor::tab(&availability.day)),
            Action::choose("Start Time", &availability.start_time),
            Action::choose("End Time", &availability.end_time),
            Action::Check {
                target: Descriptor::role(Role::Checkbox, &self.fixtures.appointment.visit_type),
            },
            Action::click(Descriptor::button("Save")),
        ])
        .requires(Fact::ProviderExists {
            display_name: provider.clone(),
        })
        .establishes(Fact::AvailabilityConfigured { provider })
    }

    fn create_patient(&self) -> Step {
        let patient = &self.fixtures.patient;

        Step::new(
            CREATE_PATIENT,
            Postcondition::Visible {
                target: Descriptor::text(&patient.first_name),
            },
            self.config.wait_policy().postcondition_timeout,
        )
        .actions([
            Action::click(Descriptor::text("Create")),
            Action::click(Descriptor::text("New Patient")),
            Action::click(Descriptor::text("Enter Patient Details")),
            Action::click(Descriptor::text("Next")),
            Action::fill(Descriptor::placeholder("First Name"), &patient.first_name),
            Action::fill(Descriptor::placeholder("Last Name"), &patient.last_name),
            Action::fill(Descriptor::placeholder("Date of Birth"), &patient.dob),
            Action::select(Descriptor::field("gender"), &patient.gender),
            Action::fill(Descriptor::placeholder("Mobile"), &patient.mobile),
            Action::fill(Descriptor::placeholder("Email"), &patient.email),
            Action::click(Descriptor::button("Save")),
        ])
        .requires(Fact::AvailabilityConfigured {
            provider: self.fixtures.provider.display_name(),
        })
        .establishes(Fact::PatientExists {
            display_name: patient.display_name(),
        })
    }

    fn book_appointment(&self) -> Step {
        let patient = self.fixtures.patient.display_name();
        let provider = self.fixtures.provider.display_name();
        let appointment = &self.fixtures.appointment;

        let postcondition = match &self.config.messages.appointment_booked {
            Some(banner) => Postcondition::Visible {
                target: Descriptor::text(banner),
            },
            None => Postcondition::Hidden {
                target: Descriptor::button("Save and close"),
            },
        };

        Step::new(BOOK_APPOINTMENT, postcondition, self.config.wait_policy().postcondition_timeout)
            .actions([
                Action::click(Descriptor::text("Create")),
                Action::click(Descriptor::text("New appointment")),
                Action::select(Descriptor::field("patientName"), &patient),
                Action::select(Descriptor::field("appointmentType"), &appointment.appointment_type),
                Action::fill(Descriptor::field("reasonForVisit"), &appointment.reason),
                Action::select(Descriptor::field("timeZone"), &appointment.time_zone),
                Action::click(Descriptor::css(format!(r#"input[value="{}"]"#, appointment.visit_type))),
                Action::select(Descriptor::field("provider"), &provider),
                Action::click(Descriptor::button("View Availability")),
                Action::PickSlot {
                    policy: self.config.slot.clone(),
                },
                Action::click(Descriptor::button("Save and close")),
            ])
            .requires(Fact::PatientExists {
                display_name: patient.clone(),
            })
            .requires(Fact::AvailabilityConfigured { provider })
            .establishes(Fact::AppointmentBooked { patient })
    }

    fn verify_appointment_listed(&self) -> Step {
        let patient = &self.fixtures.patient;

        Step::new(
            VERIFY_APPOINTMENT_LISTED,
            Postcondition::Visible {
                target: Descriptor::text(&patient.first_name),
            },
            self.config.wait_policy().postcondition_timeout,
        )
        .actions([
            Action::click(Descriptor::tab("Scheduling")),
            Action::click(Descriptor::text("Appointments")),
        ])
        .requires(Fact::AppointmentBooked {
            patient: patient.display_name(),
        })
        .establishes(Fact::AppointmentListed {
            patient: patient.display_name(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::SlotPolicy;

    const SEED: RunSeed = RunSeed::new(1_700_000_000_000);

    fn scenario() -> Scenario {
        Scenario::new(RunConfig::default(), SEED)
    }

    #[test]
    fn test_plan_declares_the_fixed_pipeline() {
        let names: Vec<String> = scenario().plan().unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec![
                LOGIN,
                NAVIGATE_ADMIN_USER_SETTINGS,
                CREATE_PROVIDER,
                CONFIGURE_AVAILABILITY,
                CREATE_PATIENT,
                BOOK_APPOINTMENT,
                VERIFY_APPOINTMENT_LISTED
            ]
        );
    }

    #[test]
    fn test_provider_display_name_is_exact_selection_key() {
        let plan = scenario().plan().unwrap();
        let availability = &plan[3];
        assert!(availability.actions.contains(&Action::Choose {
            dropdown: Descriptor::dropdown("Select Provider"),
            option: "Prov1700000000000 User1700000000000".into(),
            exact: true,
        }));

        let booking = &plan[5];
        assert!(booking.actions.contains(&Action::select(
            Descriptor::field("provider"),
            "Prov1700000000000 User1700000000000"
        )));
        assert!(booking.actions.contains(&Action::select(
            Descriptor::field("patientName"),
            "Patient1700000000000 User1700000000000"
        )));
        assert!(booking.actions.contains(&Action::PickSlot {
            policy: SlotPolicy::default()
        }));
    }

    #[test]
    fn test_every_step_after_login_requires_an_earlier_fact() {
        let plan = scenario().plan().unwrap();
        assert!(plan[0].requires.is_empty());

        let mut established = Vec::new();
        for step in &plan {
            for fact in &step.requires {
                assert!(established.contains(fact), "{} requires {} before it exists", step.name, fact);
            }
            established.extend(step.establishes.clone());
        }
        assert_eq!(established.len(), plan.len());
    }

    #[test]
    fn test_booking_postcondition_follows_configured_banner() {
        let plan = scenario().plan().unwrap();
        assert_eq!(
            plan[5].postcondition,
            Postcondition::Hidden {
                target: Descriptor::button("Save and close")
            }
        );

        let mut config = RunConfig::default();
        config.messages.appointment_booked = Some("Appointment booked".into());
        let plan = Scenario::new(config, SEED).plan().unwrap();
        assert_eq!(
            plan[5].postcondition,
            Postcondition::Visible {
                target: Descriptor::text("Appointment booked")
            }
        );
    }

    #[test]
    fn test_login_waits_on_navigation_budget() {
        let plan = scenario().plan().unwrap();
        assert_eq!(plan[0].timeout(), RunConfig::default().wait_policy().navigation_timeout);
        assert!(matches!(plan[0].postcondition, Postcondition::Url { .. }));
    }
}
