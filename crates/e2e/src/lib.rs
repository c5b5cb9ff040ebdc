//! CareFlow E2E workflow verification
//!
//! This crate drives a provider portal through one business workflow and
//! reports exactly where it stops working:
//! - Generates unique provider, patient and appointment fixtures per run
//! - Locates elements by role, label, placeholder or text and refuses to
//!   guess between ambiguous candidates
//! - Waits on observable UI conditions, never on elapsed time alone
//! - Controls a real browser through a long-lived Playwright bridge
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                SuiteRunner (parallel runs)                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Scenario (one per RunSeed)                                 │
//! │    ├── FixtureSet::generate(seed) -> provider, patient, ... │
//! │    ├── plan() -> [Step]                                     │
//! │    │     Login → NavigateAdminUserSettings → CreateProvider │
//! │    │     → ConfigureAvailability → CreatePatient            │
//! │    │     → BookAppointment → VerifyAppointmentListed        │
//! │    └── run(driver) -> RunResult                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  StepExecutor                                               │
//! │    ├── requires/establishes Facts on the Session            │
//! │    ├── arm postcondition → perform actions → verify         │
//! │    └── stop at first failure, capture diagnostics           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  UiAdapter (locate / perform)  ──  WaitPolicy (poll)        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  UiDriver: PlaywrightDriver (node bridge) | FakePage        │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod adapter;
pub mod config;
pub mod descriptor;
pub mod driver;
pub mod error;
pub mod fixtures;
pub mod playwright;
pub mod report;
pub mod runner;
pub mod scenario;
pub mod session;
pub mod step;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod wait;

pub use adapter::{Action, SlotPolicy, UiAdapter};
pub use config::RunConfig;
pub use descriptor::Descriptor;
pub use driver::{DriverFactory, UiDriver};
pub use error::{E2eError, E2eResult, FailureKind};
pub use fixtures::{FixtureSet, RunSeed};
pub use report::{write_results, SuiteResult};
pub use runner::SuiteRunner;
pub use scenario::{RunResult, Scenario};
pub use step::{Step, StepExecutor, StepState};
pub use wait::WaitPolicy;
