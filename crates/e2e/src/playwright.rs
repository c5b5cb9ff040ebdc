//! Playwright browser automation
//!
//! [`PlaywrightDriver`] keeps one Node.js process alive per browser context
//! and talks to it over stdin/stdout, one JSON object per line. Element
//! handles are ids the bridge stamps onto DOM nodes: a node keeps its id for
//! as long as it stays attached, and ids are never reused within a bridge,
//! even across full page loads. Handles of detached nodes are released on
//! the next query.

use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::descriptor::Descriptor;
use crate::driver::{Candidate, DriverFactory, ElementHandle, PageSnapshot, UiDriver};
use crate::error::{E2eError, E2eResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub node_binary: String,
    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Playwright's own per-call timeout inside the bridge
    pub action_timeout: Duration,
    /// How long the browser may take to come up
    pub launch_timeout: Duration,
    /// Upper bound on any single bridge round trip
    pub request_timeout: Duration,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            node_binary: "node".to_string(),
            browser: Browser::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            action_timeout: Duration::from_secs(10),
            launch_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl PlaywrightConfig {
    /// Build the bridge script with this configuration baked in
    pub fn build_script(&self) -> E2eResult<String> {
        let settings = serde_json::json!({
            "browser": self.browser.as_str(),
            "headless": self.headless,
            "viewport": { "width": self.viewport_width, "height": self.viewport_height },
            "actionTimeoutMs": self.action_timeout.as_millis() as u64,
        });
        Ok(BRIDGE_SCRIPT
            .replace("__CAREFLOW_SETTINGS__", &serde_json::to_string(&settings)?)
            .replace("__CAREFLOW_ID_ALLOCATOR__", ID_ALLOCATOR))
    }
}

/// Element ids come from one counter per bridge process, so a full page load
/// never hands out an id that an element of the previous document held.
const ID_ALLOCATOR: &str = r#"
let nextId = 0;
function allocateId() {
  nextId += 1;
  return 'n' + nextId;
}
"#;

const BRIDGE_SCRIPT: &str = r#"
const path = require('path');
const readline = require('readline');
const playwright = require(require.resolve('playwright', { paths: [process.cwd(), __dirname] }));

const settings = __CAREFLOW_SETTINGS__;
const handles = new Map();
__CAREFLOW_ID_ALLOCATOR__
let browser;
let page;

function reply(message) {
  process.stdout.write(JSON.stringify(message) + '\n');
}

function locate(root, d) {
  switch (d.by) {
    case 'role': return root.getByRole(d.role, { name: d.name, exact: !!d.exact });
    case 'label': return root.getByLabel(d.label);
    case 'placeholder': return root.getByPlaceholder(d.text);
    case 'text': return root.getByText(d.text, { exact: !!d.exact });
    case 'field_name': return root.locator(`[name=${JSON.stringify(d.name)}]`);
    case 'css': return root.locator(d.selector);
    case 'within': return locate(root.locator('form').filter({ hasText: d.section }), d.target);
    default: throw new Error(`unsupported descriptor: ${d.by}`);
  }
}

function element(id) {
  const el = handles.get(id);
  if (!el) throw new Error(`element ${id} is detached`);
  return el;
}

async function prune() {
  for (const [id, el] of handles) {
    const attached = await el.evaluate((node) => node.isConnected).catch(() => false);
    if (!attached) {
      handles.delete(id);
      await el.dispose().catch(() => {});
    }
  }
}

async function query(descriptor) {
  await prune();
  const found = await locate(page, descriptor).elementHandles();
  const out = [];
  for (const el of found) {
    const info = await el.evaluate((node, assigned) => {
      if (!node.__careflowId) node.__careflowId = assigned;
      let obscured = false;
      const r = node.getBoundingClientRect();
      const x = r.left + r.width / 2;
      const y = r.top + r.height / 2;
      if (r.width > 0 && r.height > 0 && x >= 0 && y >= 0 && x < window.innerWidth && y < window.innerHeight) {
        const hit = document.elementFromPoint(x, y);
        obscured = !!hit && hit !== node && !node.contains(hit);
      }
      const text = node.getAttribute('aria-label') || node.innerText || node.value || node.getAttribute('placeholder') || '';
      return { id: node.__careflowId, text: text.trim(), obscured };
    }, allocateId());
    let tracked = handles.get(info.id);
    if (tracked) {
      await el.dispose();
    } else {
      tracked = el;
      handles.set(info.id, el);
    }
    out.push({
      handle: info.id,
      text: info.text,
      visible: await tracked.isVisible(),
      enabled: await tracked.isEnabled(),
      obscured: info.obscured,
    });
  }
  return out;
}

async function dispatch(req) {
  switch (req.cmd) {
    case 'goto':
      handles.clear();
      await page.goto(req.url);
      return null;
    case 'url': return page.url();
    case 'query': return query(req.descriptor);
    case 'fill': await element(req.element).fill(req.value); return null;
    case 'click': await element(req.element).click(); return null;
    case 'check': await element(req.element).check(); return null;
    case 'select': await element(req.element).selectOption({ label: req.label }); return null;
    case 'snapshot':
      return { url: page.url(), title: await page.title(), visible_text: await page.innerText('body') };
    case 'screenshot':
      await page.screenshot({ path: path.resolve(req.path), fullPage: true });
      return true;
    case 'close':
      await browser.close();
      return null;
    default: throw new Error(`unknown command: ${req.cmd}`);
  }
}

(async () => {
  browser = await playwright[settings.browser].launch({ headless: settings.headless });
  const context = await browser.newContext({ viewport: settings.viewport });
  page = await context.newPage();
  page.setDefaultTimeout(settings.actionTimeoutMs);
  reply({ ready: true });

  const rl = readline.createInterface({ input: process.stdin });
  for await (const line of rl) {
    if (!line.trim()) continue;
    const req = JSON.parse(line);
    try {
      reply({ id: req.id, ok: true, result: await dispatch(req) });
    } catch (error) {
      reply({ id: req.id, ok: false, error: error.message });
    }
    if (req.cmd === 'close') break;
  }
  process.exit(0);
})().catch((error) => {
  console.error(error.stack || error.message);
  process.exit(1);
});
"#;

#[derive(Serialize)]
struct Request<'a> {
    id: u64,
    #[serde(flatten)]
    command: BridgeCommand<'a>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum BridgeCommand<'a> {
    Goto { url: &'a str },
    Url,
    Query { descriptor: &'a Descriptor },
    Fill { element: &'a str, value: &'a str },
    Click { element: &'a str },
    Check { element: &'a str },
    Select { element: &'a str, label: &'a str },
    Snapshot,
    Screenshot { path: &'a Path },
    Close,
}

impl BridgeCommand<'_> {
    fn name(&self) -> &'static str {
        match self {
            BridgeCommand::Goto { .. } => "goto",
            BridgeCommand::Url => "url",
            BridgeCommand::Query { .. } => "query",
            BridgeCommand::Fill { .. } => "fill",
            BridgeCommand::Click { .. } => "click",
            BridgeCommand::Check { .. } => "check",
            BridgeCommand::Select { .. } => "select",
            BridgeCommand::Snapshot => "snapshot",
            BridgeCommand::Screenshot { .. } => "screenshot",
            BridgeCommand::Close => "close",
        }
    }
}

#[derive(Debug, Deserialize)]
struct Response {
    id: Option<u64>,
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    result: serde_json::Value,
    error: Option<String>,
    #[serde(default)]
    ready: bool,
}

struct BridgeIo {
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

/// A live browser context behind a Node.js Playwright bridge
pub struct PlaywrightDriver {
    io: tokio::sync::Mutex<BridgeIo>,
    child: parking_lot::Mutex<Child>,
    next_id: AtomicU64,
    closed: AtomicBool,
    request_timeout: Duration,
    /// Holds the bridge script for the process lifetime
    _workdir: TempDir,
}

impl PlaywrightDriver {
    /// Start the bridge and wait until the browser is up
    pub async fn launch(config: &PlaywrightConfig) -> E2eResult<Self> {
        Self::check_node_installed(&config.node_binary)?;

        let workdir = tempfile::tempdir()?;
        let script_path = workdir.path().join("careflow-bridge.js");
        std::fs::write(&script_path, config.build_script()?)?;

        debug!("Starting Playwright bridge: {}", script_path.display());

        let mut child = TokioCommand::new(&config.node_binary)
            .arg(&script_path)
            .current_dir(std::env::current_dir()?)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(E2eError::Driver("bridge stdio was not captured".into()));
        };
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "careflow::bridge", "{}", line);
                }
            });
        }

        let mut stdout = BufReader::new(stdout).lines();
        let ready = timeout(config.launch_timeout, async {
            while let Some(line) = stdout.next_line().await? {
                match serde_json::from_str::<Response>(&line) {
                    Ok(response) if response.ready => return Ok(true),
                    _ => debug!(target: "careflow::bridge", "{}", line),
                }
            }
            Ok::<bool, E2eError>(false)
        })
        .await;

        match ready {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => return Err(E2eError::BridgeNotFound),
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                let _ = child.start_kill();
                return Err(E2eError::Driver(format!(
                    "browser did not start within {} ms",
                    config.launch_timeout.as_millis()
                )));
            }
        }

        info!(
            "Playwright {} ready (pid {})",
            config.browser.as_str(),
            child.id().map(|p| p.to_string()).unwrap_or_else(|| "?".into())
        );

        Ok(Self {
            io: tokio::sync::Mutex::new(BridgeIo { stdin, stdout }),
            child: parking_lot::Mutex::new(child),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            request_timeout: config.request_timeout,
            _workdir: workdir,
        })
    }

    fn check_node_installed(node_binary: &str) -> E2eResult<()> {
        let status = Command::new(node_binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::BridgeNotFound),
        }
    }

    /// One request/response round trip. Responses to requests whose caller
    /// gave up are skipped by id.
    async fn request<T: DeserializeOwned>(&self, command: BridgeCommand<'_>) -> E2eResult<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = command.name();
        let mut line = serde_json::to_string(&Request { id, command })?;
        line.push('\n');

        let mut guard = self.io.lock().await;
        let io = &mut *guard;

        let exchange = async {
            io.stdin.write_all(line.as_bytes()).await?;
            io.stdin.flush().await?;
            loop {
                let Some(raw) = io.stdout.next_line().await? else {
                    return Err(E2eError::Driver("bridge exited".into()));
                };
                let response: Response = match serde_json::from_str(&raw) {
                    Ok(r) => r,
                    Err(_) => {
                        debug!(target: "careflow::bridge", "{}", raw);
                        continue;
                    }
                };
                if response.id != Some(id) {
                    debug!("Discarding stale bridge response {:?}", response.id);
                    continue;
                }
                return if response.ok {
                    Ok(serde_json::from_value(response.result)?)
                } else {
                    Err(E2eError::Driver(
                        response.error.unwrap_or_else(|| format!("{name} failed")),
                    ))
                };
            }
        };

        match timeout(self.request_timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(E2eError::Driver(format!(
                "bridge did not answer {} within {} ms",
                name,
                self.request_timeout.as_millis()
            ))),
        }
    }
}

#[async_trait]
impl UiDriver for PlaywrightDriver {
    async fn goto(&self, url: &str) -> E2eResult<()> {
        self.request(BridgeCommand::Goto { url }).await
    }

    async fn current_url(&self) -> E2eResult<String> {
        self.request(BridgeCommand::Url).await
    }

    async fn query(&self, descriptor: &Descriptor) -> E2eResult<Vec<Candidate>> {
        self.request(BridgeCommand::Query { descriptor }).await
    }

    async fn fill(&self, element: &ElementHandle, value: &str) -> E2eResult<()> {
        self.request(BridgeCommand::Fill { element: &element.0, value }).await
    }

    async fn click(&self, element: &ElementHandle) -> E2eResult<()> {
        self.request(BridgeCommand::Click { element: &element.0 }).await
    }

    async fn check(&self, element: &ElementHandle) -> E2eResult<()> {
        self.request(BridgeCommand::Check { element: &element.0 }).await
    }

    async fn select_option(&self, element: &ElementHandle, label: &str) -> E2eResult<()> {
        self.request(BridgeCommand::Select { element: &element.0, label }).await
    }

    async fn snapshot(&self) -> E2eResult<PageSnapshot> {
        self.request(BridgeCommand::Snapshot).await
    }

    async fn screenshot(&self, path: &Path) -> E2eResult<bool> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.request(BridgeCommand::Screenshot { path }).await
    }

    async fn close(&self) -> E2eResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let result = self.request::<()>(BridgeCommand::Close).await;

        let exited = timeout(Duration::from_secs(5), async {
            loop {
                let exited = matches!(self.child.lock().try_wait(), Ok(Some(_)));
                if exited {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        })
        .await;
        if exited.is_err() {
            warn!("Playwright bridge still running after close; killing it");
            let _ = self.child.lock().start_kill();
        }
        result
    }
}

impl Drop for PlaywrightDriver {
    fn drop(&mut self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let child = self.child.get_mut();
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }

        // SIGTERM lets Playwright tear its browsers down
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = child.id() {
                if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok() {
                    return;
                }
            }
        }

        let _ = child.start_kill();
    }
}

/// Opens one fresh bridge (and so one fresh browser context) per run
#[derive(Debug, Clone)]
pub struct PlaywrightFactory {
    config: PlaywrightConfig,
}

impl PlaywrightFactory {
    pub fn new(config: PlaywrightConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DriverFactory for PlaywrightFactory {
    async fn open(&self) -> E2eResult<Arc<dyn UiDriver>> {
        Ok(Arc::new(PlaywrightDriver::launch(&self.config).await?))
    }
}
