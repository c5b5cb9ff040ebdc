//! Run configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapter::SlotPolicy;
use crate::error::{E2eError, E2eResult};
use crate::fixtures::FixtureDefaults;
use crate::playwright::{Browser, PlaywrightConfig};
use crate::wait::{UrlPattern, WaitPolicy};

/// Everything a scenario run needs from the outside world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub target: TargetConfig,
    pub admin: AdminCredentials,
    pub fixtures: FixtureDefaults,
    pub availability: AvailabilityDefaults,
    pub messages: Messages,
    pub timeouts: Timeouts,
    pub slot: SlotPolicy,
    pub browser: BrowserConfig,
    /// Where results and failure screenshots go
    pub output_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            target: TargetConfig::default(),
            admin: AdminCredentials::default(),
            fixtures: FixtureDefaults::default(),
            availability: AvailabilityDefaults::default(),
            messages: Messages::default(),
            timeouts: Timeouts::default(),
            slot: SlotPolicy::default(),
            browser: BrowserConfig::default(),
            output_dir: PathBuf::from("test-results"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub base_url: String,
    /// Landing area after a successful login
    pub authenticated_url: String,
    /// Probe the base URL over HTTP before starting a browser
    pub preflight: bool,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000/".to_string(),
            authenticated_url: "**/app/provider/**".to_string(),
            preflight: true,
        }
    }
}

#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminCredentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Availability template applied to the new provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvailabilityDefaults {
    pub booking_window: String,
    pub day: String,
    pub start_time: String,
    pub end_time: String,
}

impl Default for AvailabilityDefaults {
    fn default() -> Self {
        Self {
            booking_window: "1 Week".to_string(),
            day: "Friday".to_string(),
            start_time: "12:00 AM".to_string(),
            end_time: "10:00 PM".to_string(),
        }
    }
}

/// Confirmation banners the UI shows after each write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Messages {
    pub provider_created: String,
    pub availability_added: String,
    /// Banner after booking; when unset, booking completes once the
    /// dialog's "Save and close" button is gone
    pub appointment_booked: Option<String>,
}

impl Default for Messages {
    fn default() -> Self {
        Self {
            provider_created: "Provider created successfully".to_string(),
            availability_added: "Availability added successfully".to_string(),
            appointment_booked: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub poll_interval_ms: u64,
    pub action_ms: u64,
    pub postcondition_ms: u64,
    pub navigation_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            action_ms: 10_000,
            postcondition_ms: 15_000,
            navigation_ms: 30_000,
        }
    }
}

impl From<&Timeouts> for WaitPolicy {
    fn from(t: &Timeouts) -> Self {
        Self {
            poll_interval: Duration::from_millis(t.poll_interval_ms),
            action_timeout: Duration::from_millis(t.action_ms),
            postcondition_timeout: Duration::from_millis(t.postcondition_ms),
            navigation_timeout: Duration::from_millis(t.navigation_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub kind: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Node.js executable used to host the Playwright bridge
    pub node_binary: String,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            kind: Browser::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            node_binary: "node".to_string(),
        }
    }
}

impl RunConfig {
    /// Load from TOML or YAML (by extension). A missing file yields defaults.
    pub fn load(path: &Path) -> E2eResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&content)?),
            _ => Ok(toml::from_str(&content)?),
        }
    }

    /// Save as TOML
    pub fn save(&self, path: &Path) -> E2eResult<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> E2eResult<()> {
        if self.target.base_url.trim().is_empty() {
            return Err(E2eError::InvalidConfig("target.base_url is empty".into()));
        }
        if !self.target.base_url.starts_with("http://") && !self.target.base_url.starts_with("https://") {
            return Err(E2eError::InvalidConfig(format!(
                "target.base_url must be http(s): {}",
                self.target.base_url
            )));
        }
        self.authenticated_url()?;
        if self.admin.email.trim().is_empty() || self.admin.password.is_empty() {
            return Err(E2eError::InvalidConfig(
                "admin credentials are missing (set CAREFLOW_ADMIN_EMAIL / CAREFLOW_ADMIN_PASSWORD)".into(),
            ));
        }
        if self.timeouts.poll_interval_ms == 0 {
            return Err(E2eError::InvalidConfig("timeouts.poll_interval_ms must be > 0".into()));
        }
        if self.slot.candidates.is_empty() {
            return Err(E2eError::InvalidConfig("slot.candidates is empty".into()));
        }
        Ok(())
    }

    pub fn authenticated_url(&self) -> E2eResult<UrlPattern> {
        UrlPattern::new(&self.target.authenticated_url)
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy::from(&self.timeouts)
    }

    pub fn playwright(&self) -> PlaywrightConfig {
        PlaywrightConfig {
            node_binary: self.browser.node_binary.clone(),
            browser: self.browser.kind,
            headless: self.browser.headless,
            viewport_width: self.browser.viewport_width,
            viewport_height: self.browser.viewport_height,
            action_timeout: Duration::from_millis(self.timeouts.action_ms),
            ..PlaywrightConfig::default()
        }
    }
}
