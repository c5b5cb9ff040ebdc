//! A scripted stand-in for the provider portal.
//!
//! Builds a [`FakePage`] that walks through login, provider creation,
//! availability, patient creation and booking the way the real UI does:
//! controls appear after short delays, dropdown options only exist while the
//! listbox is open, and confirmation toasts outlive the screen they were
//! raised on.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::RunConfig;
use crate::descriptor::Descriptor;
use crate::driver::{DriverFactory, UiDriver};
use crate::error::E2eResult;
use crate::fixtures::FixtureSet;

use super::{Effect, FakeElement, FakePage};

const RENDER: Duration = Duration::from_millis(200);
const LISTBOX: Duration = Duration::from_millis(100);
const SAVE: Duration = Duration::from_millis(600);
const REDIRECT: Duration = Duration::from_millis(800);

const PROVIDER_FORM: &str = "Provider Details";
const AVAILABILITY_FORM: &str = "Availability Settings";
const PATIENT_FORM: &str = "Patient Details";

/// Builder for a scripted portal page
#[derive(Debug, Clone)]
pub struct Portal {
    landing_url: String,
    provider_created: String,
    availability_added: String,
    appointment_booked: Option<String>,
    providers: Vec<String>,
    patients: Vec<String>,
    reject_login: bool,
    drop_provider_save: bool,
    slots: Vec<String>,
}

impl Portal {
    pub fn new(config: &RunConfig) -> Self {
        Self {
            landing_url: format!("{}/app/provider/scheduling", config.target.base_url.trim_end_matches('/')),
            provider_created: config.messages.provider_created.clone(),
            availability_added: config.messages.availability_added.clone(),
            appointment_booked: config.messages.appointment_booked.clone(),
            providers: vec!["Existing Provider".to_string()],
            patients: Vec::new(),
            reject_login: false,
            drop_provider_save: false,
            slots: vec!["10:00 AM".to_string(), "10:30 AM".to_string()],
        }
    }

    /// Make the portal aware of a run's provider and patient
    pub fn with_fixtures(mut self, fixtures: &FixtureSet) -> Self {
        let provider = fixtures.provider.display_name();
        // Only exact selection tells these two apart.
        self.providers.push(format!("{provider} (inactive)"));
        self.providers.push(provider);
        self.patients.push(fixtures.patient.display_name());
        self
    }

    /// Login never redirects; an error banner appears instead
    pub fn reject_login(mut self) -> Self {
        self.reject_login = true;
        self
    }

    /// Saving a provider silently does nothing
    pub fn drop_provider_save(mut self) -> Self {
        self.drop_provider_save = true;
        self
    }

    /// No bookable slot is ever offered
    pub fn without_slots(mut self) -> Self {
        self.slots.clear();
        self
    }

    pub fn build(&self) -> Arc<FakePage> {
        let page = Arc::new(FakePage::new("about:blank"));
        page.set_title("Provider Portal");

        self.script_login(&page);
        self.script_navigation(&page);
        self.script_provider_form(&page);
        self.script_availability(&page);
        self.script_patient_form(&page);
        self.script_booking(&page);

        page
    }

    fn script_login(&self, page: &FakePage) {
        page.add(FakeElement::text("Welcome back"));
        page.add(FakeElement::input_placeholder("Email"));
        page.add(FakeElement::input_named("password").with_attr("type", "password"));
        page.add(FakeElement::button("Let's get Started"));

        let effects = if self.reject_login {
            vec![Effect::Show(vec![FakeElement::text("Invalid email or password")])]
        } else {
            vec![
                Effect::Navigate(self.landing_url.clone()),
                Effect::Screen(vec![
                    FakeElement::tab("Dashboard").persistent(),
                    FakeElement::tab("Scheduling").persistent(),
                    FakeElement::tab("Settings").persistent(),
                    FakeElement::text("Create").persistent(),
                    FakeElement::text("Good morning"),
                ]),
            ]
        };
        page.react(Descriptor::button("Let's get Started"), REDIRECT, effects);
    }

    fn script_navigation(&self, page: &FakePage) {
        page.on_click(
            Descriptor::tab("Settings"),
            RENDER,
            vec![
                FakeElement::menu_item("User Settings"),
                FakeElement::menu_item("Practice Settings"),
            ],
        );
        page.react(
            Descriptor::menu_item("User Settings"),
            RENDER,
            vec![Effect::Screen(vec![FakeElement::tab("Providers"), FakeElement::tab("Staff")])],
        );
        page.on_click(Descriptor::tab("Providers"), RENDER, vec![FakeElement::button("Add Provider User")]);
        page.react(
            Descriptor::tab("Scheduling"),
            RENDER,
            vec![Effect::Screen(vec![
                FakeElement::menu_item("Availability"),
                FakeElement::text("Appointments"),
            ])],
        );
    }

    fn script_provider_form(&self, page: &FakePage) {
        page.on_click(
            Descriptor::button("Add Provider User"),
            RENDER,
            vec![
                FakeElement::input_placeholder("First Name"),
                FakeElement::input_placeholder("Last Name"),
                FakeElement::label("Open").in_section("Provider Type"),
                FakeElement::label("Open").in_section("Role *"),
                FakeElement::input_placeholder("DOB (MM-DD-YYYY)"),
                FakeElement::label("Open").in_section("Gender *"),
                FakeElement::input_placeholder("Email"),
                FakeElement::button("Save").in_section(PROVIDER_FORM),
            ],
        );
        dropdown(page, "Provider Type", ["MD", "NP", "PA"]);
        dropdown(page, "Role *", ["Provider", "Provider Admin"]);
        dropdown(page, "Gender *", ["Female", "Male", "Other"]);

        if !self.drop_provider_save {
            page.on_click(
                save_in(PROVIDER_FORM),
                SAVE,
                vec![FakeElement::text(&self.provider_created).persistent()],
            );
        }
    }

    fn script_availability(&self, page: &FakePage) {
        page.react(
            Descriptor::menu_item("Availability"),
            RENDER,
            vec![Effect::Screen(vec![FakeElement::button("Edit Availability")])],
        );
        page.on_click(
            Descriptor::button("Edit Availability"),
            RENDER,
            vec![
                FakeElement::label("Open").in_section("Select Provider"),
                FakeElement::label("Open").in_section("Booking Window"),
                FakeElement::tab("Monday"),
                FakeElement::tab("Friday"),
                FakeElement::label("Open").in_section("Start Time"),
                FakeElement::label("Open").in_section("End Time"),
                FakeElement::checkbox("Telehealth"),
                FakeElement::checkbox("In Person"),
                FakeElement::button("Save").in_section(AVAILABILITY_FORM),
            ],
        );
        dropdown(page, "Select Provider", self.providers.clone());
        dropdown(page, "Booking Window", ["1 Week", "2 Weeks", "1 Month"]);
        dropdown(page, "Start Time", ["12:00 AM", "12:30 AM", "9:00 AM"]);
        dropdown(page, "End Time", ["10:00 PM", "10:30 PM"]);
        page.on_click(
            save_in(AVAILABILITY_FORM),
            SAVE,
            vec![FakeElement::text(&self.availability_added).persistent()],
        );
    }

    fn script_patient_form(&self, page: &FakePage) {
        page.on_click(
            Descriptor::text("Create"),
            RENDER,
            vec![FakeElement::text("New Patient"), FakeElement::text("New appointment")],
        );
        page.react(
            Descriptor::text("New Patient"),
            RENDER,
            vec![Effect::Screen(vec![
                FakeElement::text("Enter Patient Details"),
                FakeElement::text("Import from file"),
            ])],
        );
        page.on_click(Descriptor::text("Enter Patient Details"), RENDER, vec![FakeElement::text("Next")]);
        page.react(
            Descriptor::text("Next"),
            RENDER,
            vec![Effect::Screen(vec![
                FakeElement::input_placeholder("First Name"),
                FakeElement::input_placeholder("Last Name"),
                FakeElement::input_placeholder("Date of Birth"),
                FakeElement::select_named("gender", ["Male", "Female", "Other"]),
                FakeElement::input_placeholder("Mobile Number"),
                FakeElement::input_placeholder("Email"),
                FakeElement::button("Save").in_section(PATIENT_FORM),
            ])],
        );

        let mut profile = vec![FakeElement::text("Patient profile")];
        profile.extend(self.patients.iter().map(FakeElement::text));
        page.react(save_in(PATIENT_FORM), SAVE, vec![Effect::Screen(profile)]);
    }

    fn script_booking(&self, page: &FakePage) {
        page.react(
            Descriptor::text("New appointment"),
            RENDER,
            vec![Effect::Screen(vec![
                FakeElement::select_named("patientName", self.patients.clone()),
                FakeElement::select_named("appointmentType", ["New Patient Visit", "Follow Up"]),
                FakeElement::input_named("reasonForVisit"),
                FakeElement::select_named(
                    "timeZone",
                    ["Eastern Standard Time (UTC -5:00)", "Indian Standard Time (UTC +5:30)"],
                ),
                FakeElement::input_named("visitType").with_attr("value", "In-Person"),
                FakeElement::input_named("visitType").with_attr("value", "Telehealth"),
                FakeElement::select_named("provider", self.providers.clone()),
                FakeElement::button("View Availability"),
                FakeElement::button("Save and close"),
            ])],
        );

        let slots = self
            .slots
            .iter()
            .map(|s| FakeElement::text(s).with_class("slot available-slot"))
            .collect();
        page.on_click(Descriptor::button("View Availability"), RENDER, slots);

        let after_booking = self
            .appointment_booked
            .iter()
            .map(FakeElement::text)
            .collect();
        page.react(Descriptor::button("Save and close"), SAVE, vec![Effect::Screen(after_booking)]);

        let mut listing = vec![FakeElement::text("Upcoming")];
        listing.extend(
            self.patients
                .iter()
                .map(|p| FakeElement::text(format!("{p} - New Patient Visit - Telehealth"))),
        );
        page.react(Descriptor::text("Appointments"), RENDER, vec![Effect::Screen(listing)]);
    }
}

fn save_in(form: &str) -> Descriptor {
    Descriptor::Within {
        section: form.to_string(),
        target: Box::new(Descriptor::button("Save")),
    }
}

fn dropdown<I, S>(page: &FakePage, section: &str, options: I)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    page.on_click(
        Descriptor::dropdown(section),
        LISTBOX,
        options.into_iter().map(FakeElement::option).collect(),
    );
}

/// Hands out a freshly built portal for every run
pub struct PortalFactory {
    portal: Portal,
}

impl PortalFactory {
    pub fn new(portal: Portal) -> Self {
        Self { portal }
    }
}

#[async_trait]
impl DriverFactory for PortalFactory {
    async fn open(&self) -> E2eResult<Arc<dyn UiDriver>> {
        Ok(self.portal.build())
    }
}
