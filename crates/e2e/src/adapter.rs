//! UI action adapter
//!
//! Turns declarative [`Action`]s into driver calls. Every interaction first
//! resolves its target through [`UiAdapter::locate`], which only returns an
//! element once exactly one actionable candidate exists.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::descriptor::{is_exact_name, Descriptor, Role};
use crate::driver::{Candidate, ElementHandle, UiDriver};
use crate::error::{E2eError, E2eResult};
use crate::wait::WaitPolicy;

/// A single UI interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Navigate to a URL (relative URLs resolve against the base URL)
    Goto { url: String },

    /// Fill an input field
    Fill { target: Descriptor, value: String },

    /// Click an element
    Click { target: Descriptor },

    /// Check a checkbox
    Check { target: Descriptor },

    /// Select an option of a native `<select>` by its label
    Select { target: Descriptor, label: String },

    /// Open a combobox and click one of its options
    Choose {
        dropdown: Descriptor,
        option: String,
        #[serde(default)]
        exact: bool,
    },

    /// Click an appointment slot according to the slot policy
    PickSlot { policy: SlotPolicy },
}

impl Action {
    pub fn fill(target: Descriptor, value: impl Into<String>) -> Self {
        Action::Fill { target, value: value.into() }
    }

    pub fn click(target: Descriptor) -> Self {
        Action::Click { target }
    }

    pub fn select(target: Descriptor, label: impl Into<String>) -> Self {
        Action::Select { target, label: label.into() }
    }

    pub fn choose(section: impl Into<String>, option: impl Into<String>) -> Self {
        Action::Choose {
            dropdown: Descriptor::dropdown(section),
            option: option.into(),
            exact: false,
        }
    }

    pub fn choose_exact(section: impl Into<String>, option: impl Into<String>) -> Self {
        Action::Choose {
            dropdown: Descriptor::dropdown(section),
            option: option.into(),
            exact: true,
        }
    }

    /// Short label for logs
    pub fn describe(&self) -> String {
        match self {
            Action::Goto { url } => format!("goto:{}", url),
            Action::Fill { target, .. } => format!("fill:{}", target),
            Action::Click { target } => format!("click:{}", target),
            Action::Check { target } => format!("check:{}", target),
            Action::Select { target, label } => format!("select:{}={}", target, label),
            Action::Choose { dropdown, option, .. } => format!("choose:{}={}", dropdown, option),
            Action::PickSlot { policy } => format!("pick_slot:{}", policy),
        }
    }
}

/// How to choose among the slots a selector yields
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotPick {
    /// Take the first actionable slot in document order
    #[default]
    First,
    /// Require exactly one actionable slot
    Unique,
}

impl fmt::Display for SlotPick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotPick::First => f.write_str("first"),
            SlotPick::Unique => f.write_str("unique"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotCandidate {
    pub selector: String,
    #[serde(default)]
    pub pick: SlotPick,
}

/// Ordered fallback list of slot selectors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotPolicy {
    pub candidates: Vec<SlotCandidate>,
}

impl Default for SlotPolicy {
    fn default() -> Self {
        Self {
            candidates: vec![SlotCandidate {
                selector: ".available-slot".to_string(),
                pick: SlotPick::First,
            }],
        }
    }
}

impl fmt::Display for SlotPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .candidates
            .iter()
            .map(|c| format!("{} ({})", c.selector, c.pick))
            .collect();
        f.write_str(&parts.join(" | "))
    }
}

/// Outcome of narrowing a candidate list to one element
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    None,
    One(ElementHandle),
    Many(usize),
}

/// Keep actionable candidates; if several remain, a single exact-name match
/// wins.
pub fn disambiguate(candidates: Vec<Candidate>, descriptor: &Descriptor) -> Resolution {
    let mut actionable: Vec<Candidate> =
        candidates.into_iter().filter(Candidate::is_actionable).collect();

    match actionable.len() {
        0 => Resolution::None,
        1 => Resolution::One(actionable.remove(0).handle),
        n => {
            let Some(expected) = descriptor.expected_name() else {
                return Resolution::Many(n);
            };
            let mut exact: Vec<Candidate> = actionable
                .into_iter()
                .filter(|c| is_exact_name(&c.text, expected))
                .collect();
            if exact.len() == 1 {
                Resolution::One(exact.remove(0).handle)
            } else {
                Resolution::Many(n)
            }
        }
    }
}

pub struct UiAdapter {
    driver: Arc<dyn UiDriver>,
    policy: WaitPolicy,
    base_url: String,
}

impl UiAdapter {
    pub fn new(driver: Arc<dyn UiDriver>, policy: WaitPolicy, base_url: impl Into<String>) -> Self {
        Self {
            driver,
            policy,
            base_url: base_url.into(),
        }
    }

    pub fn driver(&self) -> &dyn UiDriver {
        self.driver.as_ref()
    }

    pub fn policy(&self) -> &WaitPolicy {
        &self.policy
    }

    /// Resolve `descriptor` to exactly one actionable element.
    pub async fn locate(&self, descriptor: &Descriptor) -> E2eResult<ElementHandle> {
        let start = Instant::now();
        let last_count = Mutex::new(0usize);
        let last_count_ref = &last_count;
        let driver = self.driver();

        let found = self
            .policy
            .poll(self.policy.action_timeout, || async move {
                let candidates = match driver.query(descriptor).await {
                    Ok(c) => c,
                    Err(e) => {
                        debug!("Query for {} failed, retrying: {}", descriptor, e);
                        return None;
                    }
                };
                match disambiguate(candidates, descriptor) {
                    Resolution::One(handle) => Some(handle),
                    Resolution::None => {
                        *last_count_ref.lock() = 0;
                        None
                    }
                    Resolution::Many(n) => {
                        *last_count_ref.lock() = n;
                        None
                    }
                }
            })
            .await;

        match found {
            Some(handle) => Ok(handle),
            None => {
                let count = last_count.into_inner();
                if count > 1 {
                    Err(E2eError::AmbiguousMatch {
                        descriptor: descriptor.to_string(),
                        count,
                    })
                } else {
                    Err(E2eError::ElementNotFound {
                        descriptor: descriptor.to_string(),
                        waited_ms: start.elapsed().as_millis() as u64,
                    })
                }
            }
        }
    }

    /// Perform one action. Never retried here: a half-applied form
    /// submission must not be replayed.
    pub async fn perform(&self, action: &Action) -> E2eResult<()> {
        debug!("Performing {}", action.describe());

        match action {
            Action::Goto { url } => self.driver.goto(&self.resolve_url(url)).await,
            Action::Fill { target, value } => {
                let element = self.locate(target).await?;
                self.driver.fill(&element, value).await
            }
            Action::Click { target } => {
                let element = self.locate(target).await?;
                self.driver.click(&element).await
            }
            Action::Check { target } => {
                let element = self.locate(target).await?;
                self.driver.check(&element).await
            }
            Action::Select { target, label } => {
                let element = self.locate(target).await?;
                self.driver.select_option(&element, label).await
            }
            Action::Choose { dropdown, option, exact } => {
                let toggle = self.locate(dropdown).await?;
                self.driver.click(&toggle).await?;
                let entry = Descriptor::Role {
                    role: Role::Option,
                    name: option.clone(),
                    exact: *exact,
                };
                let element = self.locate(&entry).await?;
                self.driver.click(&element).await
            }
            Action::PickSlot { policy } => self.pick_slot(policy).await,
        }
    }

    async fn pick_slot(&self, policy: &SlotPolicy) -> E2eResult<()> {
        let mut tried = Vec::new();
        let share = self.policy.action_timeout / policy.candidates.len().max(1) as u32;
        let driver = self.driver();

        for candidate in &policy.candidates {
            let descriptor = Descriptor::css(&candidate.selector);
            let descriptor_ref = &descriptor;
            let slots = self
                .policy
                .poll(share, || async move {
                    let actionable: Vec<ElementHandle> = driver
                        .query(descriptor_ref)
                        .await
                        .ok()?
                        .into_iter()
                        .filter(Candidate::is_actionable)
                        .map(|c| c.handle)
                        .collect();
                    (!actionable.is_empty()).then_some(actionable)
                })
                .await;

            let Some(slots) = slots else {
                debug!("No slot for {} ({})", candidate.selector, candidate.pick);
                tried.push(format!("{} ({})", candidate.selector, candidate.pick));
                continue;
            };

            let chosen = match candidate.pick {
                SlotPick::First => &slots[0],
                SlotPick::Unique if slots.len() == 1 => &slots[0],
                SlotPick::Unique => {
                    return Err(E2eError::AmbiguousMatch {
                        descriptor: descriptor.to_string(),
                        count: slots.len(),
                    })
                }
            };
            debug!("Picked slot {} via {}", chosen, candidate.selector);
            return self.driver.click(chosen).await;
        }

        Err(E2eError::SlotUnavailable { tried })
    }

    fn resolve_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                url.trim_start_matches('/')
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeElement, FakePage, Interaction};
    use std::time::Duration;

    fn candidate(id: &str, text: &str) -> Candidate {
        Candidate {
            handle: ElementHandle(id.into()),
            text: text.into(),
            visible: true,
            enabled: true,
            obscured: false,
        }
    }

    fn adapter(page: &Arc<FakePage>) -> UiAdapter {
        let policy = WaitPolicy {
            poll_interval: Duration::from_millis(100),
            action_timeout: Duration::from_secs(2),
            ..WaitPolicy::default()
        };
        UiAdapter::new(page.clone(), policy, "https://portal.test/")
    }

    #[test]
    fn test_disambiguate_prefers_single_exact_name() {
        let d = Descriptor::role(Role::Option, "Male");
        let got = disambiguate(vec![candidate("1", "Female"), candidate("2", "Male")], &d);
        assert_eq!(got, Resolution::One(ElementHandle("2".into())));
    }

    #[test]
    fn test_disambiguate_reports_many_without_exact_winner() {
        let d = Descriptor::text("Save");
        let got = disambiguate(vec![candidate("1", "Save draft"), candidate("2", "Save and close")], &d);
        assert_eq!(got, Resolution::Many(2));
    }

    #[test]
    fn test_disambiguate_skips_non_actionable() {
        let mut hidden = candidate("1", "Save");
        hidden.visible = false;
        let mut covered = candidate("2", "Save");
        covered.obscured = true;
        let d = Descriptor::button("Save");
        assert_eq!(disambiguate(vec![hidden.clone(), covered], &d), Resolution::None);
        assert_eq!(
            disambiguate(vec![hidden, candidate("3", "Save")], &d),
            Resolution::One(ElementHandle("3".into()))
        );
    }

    #[test]
    fn test_action_serde_shape() {
        let action = Action::choose("Provider Type", "MD");
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["action"], "choose");
        assert_eq!(json["dropdown"]["by"], "within");
        assert_eq!(json["option"], "MD");
    }

    #[tokio::test(start_paused = true)]
    async fn test_locate_waits_for_element_to_become_enabled() {
        let page = Arc::new(FakePage::new("https://portal.test/"));
        let save = page.add(FakeElement::button("Save").disabled());
        page.enable_after(Duration::from_millis(400), &save);

        let got = adapter(&page).locate(&Descriptor::button("Save")).await.unwrap();
        assert_eq!(got, save);
    }

    #[tokio::test(start_paused = true)]
    async fn test_locate_ignores_hidden_and_covered_matches() {
        let page = Arc::new(FakePage::new("https://portal.test/"));
        page.add(FakeElement::button("Save").hidden());
        page.add(FakeElement::button("Save").obscured());
        let ui = adapter(&page);

        let err = ui.locate(&Descriptor::button("Save")).await.unwrap_err();
        assert!(matches!(err, E2eError::ElementNotFound { .. }), "{err}");

        let save = page.add(FakeElement::button("Save"));
        assert_eq!(ui.locate(&Descriptor::button("Save")).await.unwrap(), save);
    }

    #[tokio::test(start_paused = true)]
    async fn test_locate_not_found_vs_ambiguous() {
        let page = Arc::new(FakePage::new("https://portal.test/"));
        let ui = adapter(&page);

        let err = ui.locate(&Descriptor::button("Missing")).await.unwrap_err();
        assert!(matches!(err, E2eError::ElementNotFound { .. }), "{err}");

        page.add(FakeElement::button("Save draft"));
        page.add(FakeElement::button("Save and close"));
        let err = ui.locate(&Descriptor::button("Save")).await.unwrap_err();
        assert!(matches!(err, E2eError::AmbiguousMatch { count: 2, .. }), "{err}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_choose_opens_dropdown_then_clicks_option() {
        let page = Arc::new(FakePage::new("https://portal.test/"));
        page.add(FakeElement::label("Open").in_section("Gender *"));
        page.on_click(
            Descriptor::dropdown("Gender *"),
            Duration::from_millis(150),
            vec![FakeElement::option("Male"), FakeElement::option("Female")],
        );

        adapter(&page).perform(&Action::choose("Gender *", "Male")).await.unwrap();

        let clicks: Vec<String> = page
            .interactions()
            .into_iter()
            .filter_map(|i| match i {
                Interaction::Click { text } => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(clicks, vec!["Open".to_string(), "Male".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pick_slot_falls_back_then_fails() {
        let page = Arc::new(FakePage::new("https://portal.test/"));
        let ui = adapter(&page);
        let policy = SlotPolicy {
            candidates: vec![
                SlotCandidate { selector: ".available-slot".into(), pick: SlotPick::First },
                SlotCandidate { selector: ".slot-free".into(), pick: SlotPick::Unique },
            ],
        };

        let err = ui.perform(&Action::PickSlot { policy: policy.clone() }).await.unwrap_err();
        match err {
            E2eError::SlotUnavailable { tried } => assert_eq!(tried.len(), 2),
            other => panic!("unexpected: {other}"),
        }

        page.add(FakeElement::text("10:00 AM").with_class("slot-free"));
        ui.perform(&Action::PickSlot { policy: policy.clone() }).await.unwrap();
        assert!(page
            .interactions()
            .contains(&Interaction::Click { text: "10:00 AM".into() }));

        page.add(FakeElement::text("10:30 AM").with_class("slot-free"));
        let err = ui.perform(&Action::PickSlot { policy }).await.unwrap_err();
        assert!(matches!(err, E2eError::AmbiguousMatch { count: 2, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_goto_resolves_relative_urls() {
        let page = Arc::new(FakePage::new("about:blank"));
        let ui = adapter(&page);
        ui.perform(&Action::Goto { url: "/login".into() }).await.unwrap();
        assert_eq!(page.current_url().await.unwrap(), "https://portal.test/login");
    }
}
