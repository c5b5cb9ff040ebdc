//! Step definitions and the fail-fast step executor

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

use crate::adapter::Action;
use crate::descriptor::Descriptor;
use crate::driver::{ElementHandle, PageSnapshot, UiDriver};
use crate::error::{E2eError, E2eResult, FailureKind};
use crate::session::{Fact, Session};
use crate::wait::{UrlPattern, WaitPolicy};

/// Lifecycle of one step within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    /// Not attempted (yet)
    Pending,
    Running,
    Passed,
    Failed,
}

impl StepState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Passed | Self::Failed)
    }

    pub fn can_transition_to(&self, to: StepState) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Running) | (Self::Running, Self::Passed) | (Self::Running, Self::Failed)
        )
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// The single observable condition that completes a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "expect", rename_all = "snake_case")]
pub enum Postcondition {
    /// A matching element appears that was not there before the step
    Visible { target: Descriptor },
    /// No matching element is visible any more
    Hidden { target: Descriptor },
    /// The page URL matches the pattern
    Url { pattern: UrlPattern },
}

impl fmt::Display for Postcondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Postcondition::Visible { target } => write!(f, "{target} visible"),
            Postcondition::Hidden { target } => write!(f, "{target} hidden"),
            Postcondition::Url { pattern } => write!(f, "url matches {pattern}"),
        }
    }
}

/// A postcondition bound to what the page looked like before the step's
/// first action
enum Armed<'a> {
    Visible {
        target: &'a Descriptor,
        baseline: HashSet<ElementHandle>,
    },
    Hidden {
        target: &'a Descriptor,
    },
    Url {
        pattern: &'a UrlPattern,
        stale: Option<String>,
    },
}

impl Postcondition {
    /// Record pre-action state so leftovers from earlier screens cannot
    /// satisfy this step.
    async fn arm(&self, driver: &dyn UiDriver) -> Armed<'_> {
        match self {
            Postcondition::Visible { target } => {
                let baseline: HashSet<ElementHandle> = match driver.query(target).await {
                    Ok(candidates) => candidates
                        .into_iter()
                        .filter(|c| c.visible)
                        .map(|c| c.handle)
                        .collect(),
                    Err(e) => {
                        debug!("Could not record baseline for {}: {}", target, e);
                        HashSet::new()
                    }
                };
                if !baseline.is_empty() {
                    warn!("{} already visible before the step; waiting for a fresh one", target);
                }
                Armed::Visible { target, baseline }
            }
            Postcondition::Hidden { target } => Armed::Hidden { target },
            Postcondition::Url { pattern } => {
                let stale = driver.current_url().await.ok().filter(|url| pattern.matches(url));
                Armed::Url { pattern, stale }
            }
        }
    }
}

impl Armed<'_> {
    async fn verify(&self, policy: &WaitPolicy, driver: &dyn UiDriver, budget: Duration) -> E2eResult<()> {
        match self {
            Armed::Visible { target, baseline } => policy
                .wait_until_fresh_visible(driver, target, baseline, budget)
                .await
                .map(|_| ()),
            Armed::Hidden { target } => policy.wait_until_hidden(driver, target, budget).await,
            Armed::Url { pattern, stale } => policy
                .wait_for_url_change(driver, pattern, stale.as_deref(), budget)
                .await
                .map(|_| ()),
        }
    }
}

/// A named unit of work: actions, then one postcondition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub actions: Vec<Action>,
    pub postcondition: Postcondition,
    /// Budget for the postcondition
    pub timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<Fact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub establishes: Option<Fact>,
}

impl Step {
    pub fn new(name: impl Into<String>, postcondition: Postcondition, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            actions: Vec::new(),
            postcondition,
            timeout_ms: timeout.as_millis() as u64,
            requires: Vec::new(),
            establishes: None,
        }
    }

    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.actions.extend(actions);
        self
    }

    pub fn requires(mut self, fact: Fact) -> Self {
        self.requires.push(fact);
        self
    }

    pub fn establishes(mut self, fact: Fact) -> Self {
        self.establishes = Some(fact);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub state: StepState,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl StepRecord {
    fn pending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: StepState::Pending,
            duration_ms: 0,
            error: None,
        }
    }

    fn transition(&mut self, to: StepState) -> E2eResult<()> {
        if !self.state.can_transition_to(to) {
            return Err(E2eError::InvalidStateTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        self.state = to;
        Ok(())
    }
}

/// Everything known about the one step that failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFailure {
    pub step: String,
    pub kind: FailureKind,
    /// The action or assertion that was being attempted
    pub attempted: String,
    pub error: String,
    pub observed: PageSnapshot,
    pub screenshot: Option<PathBuf>,
}

impl StepFailure {
    pub fn diagnostics(&self) -> String {
        let mut out = format!(
            "step {} failed with {}\n  attempted: {}\n  error: {}\n  observed: {}",
            self.step,
            self.kind,
            self.attempted,
            self.error,
            self.observed.summary(400)
        );
        if let Some(path) = &self.screenshot {
            out.push_str(&format!("\n  screenshot: {}", path.display()));
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub records: Vec<StepRecord>,
    pub failure: Option<StepFailure>,
}

impl ExecutionReport {
    pub fn passed(&self) -> bool {
        self.failure.is_none() && self.records.iter().all(|r| r.state == StepState::Passed)
    }
}

/// Runs steps in declared order and stops at the first failure
#[derive(Debug, Clone, Default)]
pub struct StepExecutor {
    screenshot_dir: Option<PathBuf>,
}

impl StepExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture a screenshot into `dir` when a step fails
    pub fn with_screenshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.screenshot_dir = Some(dir.into());
        self
    }

    pub async fn run(&self, steps: &[Step], session: &mut Session) -> E2eResult<ExecutionReport> {
        let mut records: Vec<StepRecord> = steps.iter().map(|s| StepRecord::pending(&s.name)).collect();

        let mut failure = None;

        for (step, record) in steps.iter().zip(records.iter_mut()) {
            record.transition(StepState::Running)?;
            info!("▶ {}", step.name);
            let start = Instant::now();

            let outcome = self.execute(step, session).await;
            record.duration_ms = start.elapsed().as_millis() as u64;

            match outcome {
                Ok(()) => {
                    record.transition(StepState::Passed)?;
                    if let Some(fact) = &step.establishes {
                        debug!("Confirmed: {}", fact);
                        session.confirm(fact.clone());
                    }
                    info!("✓ {} ({} ms)", step.name, record.duration_ms);
                }
                Err((attempted, e)) => {
                    record.transition(StepState::Failed)?;
                    record.error = Some(e.to_string());
                    error!("✗ {} - {}", step.name, e);

                    failure = Some(self.diagnose(step, attempted, &e, session).await);
                    break;
                }
            }
        }

        Ok(ExecutionReport { records, failure })
    }

    async fn execute(&self, step: &Step, session: &Session) -> Result<(), (String, E2eError)> {
        if let Some(missing) = step.requires.iter().find(|f| !session.has(f)) {
            return Err((
                format!("precondition: {missing}"),
                E2eError::PreconditionUnmet {
                    step: step.name.clone(),
                    missing: missing.to_string(),
                },
            ));
        }

        let adapter = session.adapter();
        let armed = step.postcondition.arm(adapter.driver()).await;

        for action in &step.actions {
            adapter
                .perform(action)
                .await
                .map_err(|e| (action.describe(), e))?;
        }

        armed
            .verify(adapter.policy(), adapter.driver(), step.timeout())
            .await
            .map_err(|e| (step.postcondition.to_string(), e))
    }

    async fn diagnose(&self, step: &Step, attempted: String, err: &E2eError, session: &Session) -> StepFailure {
        let adapter = session.adapter();
        let driver = adapter.driver();
        let budget = adapter.policy().action_timeout;

        let observed = match timeout(budget, driver.snapshot()).await {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => {
                warn!("Could not capture page state: {}", e);
                PageSnapshot::default()
            }
            Err(_) => {
                warn!("Timed out capturing page state");
                PageSnapshot::default()
            }
        };

        let screenshot = match &self.screenshot_dir {
            Some(dir) => {
                let path = dir.join(format!("failure-{}.png", step.name));
                match timeout(budget, driver.screenshot(&path)).await {
                    Ok(Ok(true)) => Some(path),
                    Ok(Ok(false)) => None,
                    Ok(Err(e)) => {
                        warn!("Screenshot failed: {}", e);
                        None
                    }
                    Err(_) => None,
                }
            }
            None => None,
        };

        StepFailure {
            step: step.name.clone(),
            kind: err.kind(),
            attempted,
            error: err.to_string(),
            observed,
            screenshot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::UiAdapter;
    use crate::testing::{FakeElement, FakePage};
    use std::sync::Arc;

    fn session(page: &Arc<FakePage>) -> Session {
        let policy = WaitPolicy {
            poll_interval: Duration::from_millis(100),
            action_timeout: Duration::from_secs(1),
            ..WaitPolicy::default()
        };
        Session::new(UiAdapter::new(page.clone(), policy, "https://portal.test"))
    }

    fn click_then_see(name: &str, button: &str, text: &str) -> Step {
        Step::new(
            name,
            Postcondition::Visible { target: Descriptor::text(text) },
            Duration::from_secs(2),
        )
        .action(Action::click(Descriptor::button(button)))
    }

    #[test]
    fn test_state_transitions() {
        assert!(StepState::Pending.can_transition_to(StepState::Running));
        assert!(StepState::Running.can_transition_to(StepState::Failed));
        assert!(!StepState::Pending.can_transition_to(StepState::Passed));
        assert!(!StepState::Passed.can_transition_to(StepState::Running));
        assert!(StepState::Failed.is_terminal());

        let mut record = StepRecord::pending("Login");
        let err = record.transition(StepState::Passed).unwrap_err();
        assert!(matches!(err, E2eError::InvalidStateTransition { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_steps_pass_in_order() {
        let page = Arc::new(FakePage::new("https://portal.test/"));
        page.add(FakeElement::button("One"));
        page.add(FakeElement::button("Two"));
        page.on_click(Descriptor::button("One"), Duration::from_millis(300), vec![FakeElement::text("one done")]);
        page.on_click(Descriptor::button("Two"), Duration::from_millis(300), vec![FakeElement::text("two done")]);

        let steps = vec![
            click_then_see("First", "One", "one done").establishes(Fact::Authenticated),
            click_then_see("Second", "Two", "two done").requires(Fact::Authenticated),
        ];
        let mut session = session(&page);
        let report = StepExecutor::new().run(&steps, &mut session).await.unwrap();

        assert!(report.passed());
        assert!(report.records.iter().all(|r| r.state == StepState::Passed));
        assert!(session.has(&Fact::Authenticated));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_stops_the_run() {
        let page = Arc::new(FakePage::new("https://portal.test/"));
        page.add(FakeElement::button("One"));
        page.add(FakeElement::button("Two"));
        page.set_title("Providers");

        let steps = vec![
            click_then_see("First", "One", "never shown"),
            click_then_see("Second", "Two", "two done"),
        ];
        let mut session = session(&page);
        let report = StepExecutor::new().run(&steps, &mut session).await.unwrap();

        assert!(!report.passed());
        assert_eq!(report.records[0].state, StepState::Failed);
        assert_eq!(report.records[1].state, StepState::Pending);

        let failure = report.failure.unwrap();
        assert_eq!(failure.step, "First");
        assert_eq!(failure.kind, FailureKind::TimeoutExpired);
        assert_eq!(failure.attempted, "text~=\"never shown\" visible");
        assert_eq!(failure.observed.title, "Providers");
        assert!(failure.diagnostics().contains("step First failed with TimeoutExpired"));
        // Only the first button was ever touched.
        assert_eq!(page.interactions().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_action_error_names_the_action() {
        let page = Arc::new(FakePage::new("https://portal.test/"));
        let steps = vec![click_then_see("First", "Missing", "whatever")];
        let mut session = session(&page);
        let report = StepExecutor::new().run(&steps, &mut session).await.unwrap();

        let failure = report.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::ElementNotFound);
        assert_eq!(failure.attempted, "click:role=button[name~=\"Missing\"]");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmet_precondition_fails_before_any_action() {
        let page = Arc::new(FakePage::new("https://portal.test/"));
        page.add(FakeElement::button("One"));
        let steps = vec![click_then_see("First", "One", "x").requires(Fact::Authenticated)];
        let mut session = session(&page);
        let report = StepExecutor::new().run(&steps, &mut session).await.unwrap();

        assert_eq!(report.failure.unwrap().kind, FailureKind::PreconditionUnmet);
        assert!(page.interactions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_leftover_toast_does_not_satisfy_postcondition() {
        let page = Arc::new(FakePage::new("https://portal.test/"));
        page.add(FakeElement::text("Saved successfully").persistent());
        page.add(FakeElement::button("Save"));

        let steps = vec![click_then_see("Save", "Save", "Saved successfully")];
        let mut session = session(&page);
        let report = StepExecutor::new().run(&steps, &mut session).await.unwrap();
        assert_eq!(report.failure.unwrap().kind, FailureKind::TimeoutExpired);

        page.on_click(
            Descriptor::button("Save"),
            Duration::from_millis(200),
            vec![FakeElement::text("Saved successfully")],
        );
        let mut session = self::session(&page);
        let report = StepExecutor::new().run(&steps, &mut session).await.unwrap();
        assert!(report.passed());
    }
}
