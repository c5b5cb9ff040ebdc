//! Per-run browser context plus the facts the UI has confirmed so far

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::adapter::UiAdapter;

/// A visibly confirmed effect that later steps may depend on
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "fact", rename_all = "snake_case")]
pub enum Fact {
    Authenticated,
    ProviderSettingsOpen,
    ProviderExists { display_name: String },
    AvailabilityConfigured { provider: String },
    PatientExists { display_name: String },
    AppointmentBooked { patient: String },
    AppointmentListed { patient: String },
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fact::Authenticated => write!(f, "authenticated session"),
            Fact::ProviderSettingsOpen => write!(f, "provider settings open"),
            Fact::ProviderExists { display_name } => write!(f, "provider \"{display_name}\" exists"),
            Fact::AvailabilityConfigured { provider } => {
                write!(f, "availability configured for \"{provider}\"")
            }
            Fact::PatientExists { display_name } => write!(f, "patient \"{display_name}\" exists"),
            Fact::AppointmentBooked { patient } => write!(f, "appointment booked for \"{patient}\""),
            Fact::AppointmentListed { patient } => write!(f, "appointment listed for \"{patient}\""),
        }
    }
}

/// Exclusively owned by the scenario for the duration of one run
pub struct Session {
    adapter: UiAdapter,
    facts: Vec<Fact>,
}

impl Session {
    pub fn new(adapter: UiAdapter) -> Self {
        Self {
            adapter,
            facts: Vec::new(),
        }
    }

    pub fn adapter(&self) -> &UiAdapter {
        &self.adapter
    }

    pub fn has(&self, fact: &Fact) -> bool {
        self.facts.contains(fact)
    }

    pub fn confirm(&mut self, fact: Fact) {
        if !self.has(&fact) {
            self.facts.push(fact);
        }
    }

    pub fn facts(&self) -> &[Fact] {
        &self.facts
    }

    pub async fn close(&self) {
        if let Err(e) = self.adapter.driver().close().await {
            tracing::warn!("Failed to close browser context: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePage;
    use crate::wait::WaitPolicy;
    use std::sync::Arc;

    #[test]
    fn test_confirm_keeps_first_occurrence_order() {
        let page = Arc::new(FakePage::new("about:blank"));
        let mut session = Session::new(UiAdapter::new(page, WaitPolicy::default(), "https://portal.test/"));

        session.confirm(Fact::Authenticated);
        session.confirm(Fact::ProviderSettingsOpen);
        session.confirm(Fact::Authenticated);

        assert_eq!(session.facts(), &[Fact::Authenticated, Fact::ProviderSettingsOpen]);
        assert!(session.has(&Fact::ProviderSettingsOpen));
        assert!(!session.has(&Fact::PatientExists {
            display_name: "Patient1 User1".into()
        }));
    }
}
