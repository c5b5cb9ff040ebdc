//! Run-scoped test data generation
//!
//! Every identifying field (names, emails, mobile numbers) is derived from a
//! single [`RunSeed`], so two runs with different seeds never collide and the
//! same seed always reproduces the same identities.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Mobile suffixes live in `[10_000_000, 99_999_999]`.
const MOBILE_BASE: u64 = 10_000_000;
const MOBILE_SPAN: u64 = 90_000_000;
/// Coprime with `MOBILE_SPAN`, so the mix is a bijection on `seed % MOBILE_SPAN`.
const MOBILE_MIX: u64 = 48_271;

/// Largest random lead a process takes over the wall clock for its first seed
const SEED_JITTER_MS: u64 = 1_000;

static LAST_SEED: AtomicU64 = AtomicU64::new(0);

/// Millisecond-resolution seed shared by every fixture of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunSeed(u64);

impl RunSeed {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Current wall-clock millis, strictly greater than any seed this
    /// process handed out before.
    ///
    /// Uniqueness is guaranteed within a process. Across processes, the
    /// first seed starts at a random lead of up to one second, so two
    /// processes launched in the same millisecond only collide if they also
    /// draw the same lead.
    pub fn next() -> Self {
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let jitter = rand::thread_rng().gen_range(0..SEED_JITTER_MS);
        let mut prev = LAST_SEED.load(Ordering::Relaxed);
        loop {
            let candidate = advance(prev, now, jitter);
            match LAST_SEED.compare_exchange_weak(prev, candidate, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => return Self(candidate),
                Err(actual) => prev = actual,
            }
        }
    }

    pub const fn value(&self) -> u64 {
        self.0
    }
}

/// Next seed after `prev`. A process with no seeds yet starts `jitter` ms
/// ahead of `now`.
fn advance(prev: u64, now: u64, jitter: u64) -> u64 {
    let floor = if prev == 0 { now + jitter } else { now };
    floor.max(prev + 1)
}

impl fmt::Display for RunSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RunSeed {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureKind {
    Provider,
    Patient,
    Appointment,
}

/// Injected per-entity attributes that are not identity-bearing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureDefaults {
    pub provider: ProviderDefaults,
    pub patient: PatientDefaults,
    pub appointment: AppointmentDefaults,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderDefaults {
    pub provider_type: String,
    pub role: String,
    pub gender: String,
}

impl Default for ProviderDefaults {
    fn default() -> Self {
        Self {
            provider_type: "MD".to_string(),
            role: "Provider".to_string(),
            gender: "Male".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientDefaults {
    pub gender: String,
    pub dob: String,
}

impl Default for PatientDefaults {
    fn default() -> Self {
        Self {
            gender: "Female".to_string(),
            dob: "01-01-1995".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppointmentDefaults {
    pub reason: String,
    pub appointment_type: String,
    pub visit_type: String,
    pub time_zone: String,
}

impl Default for AppointmentDefaults {
    fn default() -> Self {
        Self {
            reason: "Fever".to_string(),
            appointment_type: "New Patient Visit".to_string(),
            visit_type: "Telehealth".to_string(),
            time_zone: "Indian Standard Time (UTC +5:30)".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFixture {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub dob: String,
    pub gender: String,
    pub provider_type: String,
    pub role: String,
}

impl ProviderFixture {
    /// Name as the UI lists it in provider pickers
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientFixture {
    pub first_name: String,
    pub last_name: String,
    pub dob: String,
    pub gender: String,
    pub mobile: String,
    pub email: String,
}

impl PatientFixture {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentFixture {
    pub reason: String,
    pub appointment_type: String,
    pub visit_type: String,
    pub time_zone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fixture {
    Provider(ProviderFixture),
    Patient(PatientFixture),
    Appointment(AppointmentFixture),
}

impl Fixture {
    pub fn kind(&self) -> FixtureKind {
        match self {
            Fixture::Provider(_) => FixtureKind::Provider,
            Fixture::Patient(_) => FixtureKind::Patient,
            Fixture::Appointment(_) => FixtureKind::Appointment,
        }
    }
}

/// Generate one fixture. Pure: no I/O, no global state.
pub fn generate(kind: FixtureKind, seed: RunSeed, defaults: &FixtureDefaults) -> Fixture {
    match kind {
        FixtureKind::Provider => Fixture::Provider(provider(seed, &defaults.provider)),
        FixtureKind::Patient => Fixture::Patient(patient(seed, &defaults.patient)),
        FixtureKind::Appointment => Fixture::Appointment(appointment(&defaults.appointment)),
    }
}

fn provider(seed: RunSeed, defaults: &ProviderDefaults) -> ProviderFixture {
    let mut rng = StdRng::seed_from_u64(seed.value());
    let birth_year = 1980 + rng.gen_range(0..30);

    ProviderFixture {
        first_name: format!("Prov{seed}"),
        last_name: format!("User{seed}"),
        email: format!("provider{seed}@ecaretest.com"),
        dob: format!("01-01-{birth_year}"),
        gender: defaults.gender.clone(),
        provider_type: defaults.provider_type.clone(),
        role: defaults.role.clone(),
    }
}

fn patient(seed: RunSeed, defaults: &PatientDefaults) -> PatientFixture {
    PatientFixture {
        first_name: format!("Patient{seed}"),
        last_name: format!("User{seed}"),
        dob: defaults.dob.clone(),
        gender: defaults.gender.clone(),
        mobile: mobile_number(seed),
        email: format!("patient{seed}@mailinator.com"),
    }
}

fn appointment(defaults: &AppointmentDefaults) -> AppointmentFixture {
    AppointmentFixture {
        reason: defaults.reason.clone(),
        appointment_type: defaults.appointment_type.clone(),
        visit_type: defaults.visit_type.clone(),
        time_zone: defaults.time_zone.clone(),
    }
}

/// `98` followed by eight digits. Seeds within any `MOBILE_SPAN` ms window
/// (about 25 hours) map to distinct numbers.
fn mobile_number(seed: RunSeed) -> String {
    let offset = ((seed.value() % MOBILE_SPAN) * MOBILE_MIX) % MOBILE_SPAN;
    format!("98{}", MOBILE_BASE + offset)
}

/// The three fixtures of one scenario run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureSet {
    pub seed: RunSeed,
    pub provider: ProviderFixture,
    pub patient: PatientFixture,
    pub appointment: AppointmentFixture,
}

impl FixtureSet {
    pub fn generate(seed: RunSeed, defaults: &FixtureDefaults) -> Self {
        Self {
            seed,
            provider: provider(seed, &defaults.provider),
            patient: patient(seed, &defaults.patient),
            appointment: appointment(&defaults.appointment),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const SEED: RunSeed = RunSeed::new(1_700_000_000_000);

    #[test]
    fn test_literal_provider_identity() {
        let set = FixtureSet::generate(SEED, &FixtureDefaults::default());
        assert_eq!(set.provider.first_name, "Prov1700000000000");
        assert_eq!(set.provider.last_name, "User1700000000000");
        assert_eq!(set.provider.email, "provider1700000000000@ecaretest.com");
        assert_eq!(set.provider.display_name(), "Prov1700000000000 User1700000000000");
        assert_eq!(set.patient.first_name, "Patient1700000000000");
        assert_eq!(set.patient.email, "patient1700000000000@mailinator.com");
    }

    #[test]
    fn test_generation_is_idempotent() {
        let defaults = FixtureDefaults::default();
        for kind in [FixtureKind::Provider, FixtureKind::Patient, FixtureKind::Appointment] {
            assert_eq!(generate(kind, SEED, &defaults), generate(kind, SEED, &defaults));
        }
    }

    #[test]
    fn test_generate_matches_fixture_set() {
        let defaults = FixtureDefaults::default();
        let set = FixtureSet::generate(SEED, &defaults);
        assert_eq!(generate(FixtureKind::Patient, SEED, &defaults), Fixture::Patient(set.patient));
        assert_eq!(generate(FixtureKind::Provider, SEED, &defaults).kind(), FixtureKind::Provider);
    }

    #[test]
    fn test_distinct_seeds_have_distinct_identities() {
        let defaults = FixtureDefaults::default();
        let mut emails = HashSet::new();
        let mut mobiles = HashSet::new();

        // A burst of consecutive seeds plus a spread over a full day.
        let seeds = (0..500u64)
            .map(|i| SEED.value() + i)
            .chain((1..500u64).map(|i| SEED.value() + i * 172_800));

        for seed in seeds {
            let set = FixtureSet::generate(RunSeed::new(seed), &defaults);
            assert!(emails.insert(set.patient.email.clone()), "email collision at {seed}");
            assert!(emails.insert(set.provider.email.clone()), "email collision at {seed}");
            assert!(mobiles.insert(set.patient.mobile.clone()), "mobile collision at {seed}");
        }
    }

    #[test]
    fn test_mobile_shape() {
        for seed in [0u64, 1, 89_999_999, 90_000_000, SEED.value(), u64::MAX] {
            let mobile = mobile_number(RunSeed::new(seed));
            assert_eq!(mobile.len(), 10, "{mobile}");
            assert!(mobile.starts_with("98"));
            assert!(mobile.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_provider_dob_in_range() {
        let provider = provider(SEED, &ProviderDefaults::default());
        let year: u32 = provider.dob.trim_start_matches("01-01-").parse().unwrap();
        assert!((1980..2010).contains(&year));
    }

    #[test]
    fn test_first_seed_leads_the_clock_then_counts_up() {
        assert_eq!(advance(0, 1_700_000_000_000, 417), 1_700_000_000_417);
        // Same millisecond, different lead: different seeds.
        assert_ne!(advance(0, 1_700_000_000_000, 3), advance(0, 1_700_000_000_000, 4));
        assert_eq!(advance(1_700_000_000_417, 1_700_000_000_001, 900), 1_700_000_000_418);
        assert_eq!(advance(1_700_000_000_417, 1_700_000_005_000, 900), 1_700_000_005_000);
    }

    #[test]
    fn test_next_seed_is_strictly_increasing() {
        let a = RunSeed::next();
        let b = RunSeed::next();
        let c = RunSeed::next();
        assert!(a < b && b < c);
    }
}
