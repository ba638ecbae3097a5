//! Browser session management.
//!
//! A [`BrowserContext`] is the handle tools receive through their context. It
//! owns at most one [`BrowserSession`] (a Chrome process plus its CDP
//! connection) and launches it lazily on first use. Contexts are independent:
//! two contexts never share a browser, a ref table or console history.

use async_trait::async_trait;
use selectorfinder_core::{Config, Error, Paths, Result};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::cdp::CdpClient;
use super::snapshot::{assign_refs, parse_ax_tree, AXNode, RefTable};

/// Console messages kept per session; older ones are dropped first.
const CONSOLE_CAPACITY: usize = 1000;

/// Supplies a fresh accessibility tree of the current page.
///
/// `Ok(None)` means the page has no accessible content to offer.
#[async_trait]
pub trait SnapshotProvider: Send {
    async fn capture(&mut self) -> Result<Option<AXNode>>;
}

/// Turns a selector issued for the current snapshot back into a page element.
pub trait ReferenceResolver {
    /// Returns the backend DOM node id, or [`Error::StaleRef`] when the ref
    /// does not belong to the latest snapshot.
    fn resolve(&self, selector: &str) -> Result<i64>;
}

/// Strip the locator prefix from a selector, leaving the bare ref.
/// Bare refs pass through unchanged.
pub fn ref_from_selector<'a>(selector: &'a str, prefix: &str) -> &'a str {
    let selector = selector.trim();
    if prefix.is_empty() {
        return selector;
    }
    selector.strip_prefix(prefix).unwrap_or(selector)
}

/// How to start the browser.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub executable_path: Option<String>,
    pub user_data_dir: PathBuf,
    pub window_size: (u32, u32),
    pub launch_timeout_secs: u64,
    pub navigation_wait: Duration,
    pub action_wait: Duration,
    pub selector_prefix: String,
}

impl LaunchOptions {
    pub fn from_config(config: &Config, paths: &Paths, session_name: &str) -> Self {
        let user_data_dir = config
            .browser
            .user_data_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| paths.session_profile(session_name));
        Self {
            headless: config.browser.headless,
            executable_path: config.browser.executable_path.clone(),
            user_data_dir,
            window_size: config.browser.window_size,
            launch_timeout_secs: config.browser.launch_timeout_secs,
            navigation_wait: Duration::from_millis(config.browser.navigation_wait_ms),
            action_wait: Duration::from_millis(config.browser.action_wait_ms),
            selector_prefix: config.matcher.selector_prefix.clone(),
        }
    }
}

/// A single browser with its Chrome process and CDP client.
pub struct BrowserSession {
    pub name: String,
    chrome_process: Child,
    pub cdp: CdpClient,
    /// Last URL we navigated to; stands in when the page cannot report its own.
    pub current_url: Option<String>,
    pub navigation_wait: Duration,
    pub action_wait: Duration,
    selector_prefix: String,
    /// Number of snapshots taken so far; part of every ref.
    generation: u32,
    refs: RefTable,
    console: Arc<Mutex<VecDeque<String>>>,
    console_task: tokio::task::JoinHandle<()>,
}

impl BrowserSession {
    /// Launch a browser and connect to its first page target.
    pub async fn launch(session_name: &str, options: &LaunchOptions) -> Result<Self> {
        let browser_path = find_browser_binary(options.executable_path.as_deref()).ok_or_else(|| {
            Error::Browser("No Chrome/Chromium/Edge browser found. Install one or set browser.executablePath.".to_string())
        })?;

        std::fs::create_dir_all(&options.user_data_dir)?;
        let debug_port = find_free_port().await?;
        let args = build_browser_args(debug_port, &options.user_data_dir, options.headless, options.window_size);

        info!(
            session = session_name,
            port = debug_port,
            headless = options.headless,
            browser = %browser_path,
            "Launching browser"
        );

        let child = Command::new(&browser_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Browser(format!("Failed to launch {}: {}", browser_path, e)))?;

        wait_for_cdp_ready(debug_port, options.launch_timeout_secs).await?;
        let page_ws_url = get_page_ws_url(debug_port).await?;
        let cdp = CdpClient::connect(&page_ws_url).await?;

        for domain in ["Page", "Runtime", "DOM", "Accessibility"] {
            cdp.enable_domain(domain).await?;
        }

        let console = Arc::new(Mutex::new(VecDeque::new()));
        let console_task = spawn_console_listener(&cdp, console.clone()).await;

        info!(session = session_name, ws_url = %page_ws_url, "CDP connection established");

        Ok(Self {
            name: session_name.to_string(),
            chrome_process: child,
            cdp,
            current_url: None,
            navigation_wait: options.navigation_wait,
            action_wait: options.action_wait,
            selector_prefix: options.selector_prefix.clone(),
            generation: 0,
            refs: RefTable::default(),
            console,
            console_task,
        })
    }

    pub fn selector_prefix(&self) -> &str {
        &self.selector_prefix
    }

    /// Take a snapshot, assign refs for this generation and remember them.
    pub async fn capture_snapshot(&mut self) -> Result<Option<AXNode>> {
        let response = self.cdp.get_accessibility_tree().await?;
        let Some(mut root) = parse_ax_tree(&response) else {
            debug!(session = %self.name, "Accessibility tree is empty");
            self.invalidate_refs();
            return Ok(None);
        };

        self.generation += 1;
        self.refs = assign_refs(&mut root, self.generation);
        debug!(
            session = %self.name,
            generation = self.generation,
            refs = self.refs.len(),
            "Snapshot captured"
        );
        Ok(Some(root))
    }

    /// Forget every ref handed out so far.
    pub fn invalidate_refs(&mut self) {
        self.refs = RefTable::default();
    }

    pub async fn navigate(&mut self, url: &str) -> Result<()> {
        self.invalidate_refs();
        self.cdp.navigate(url).await?;
        self.current_url = Some(url.to_string());
        tokio::time::sleep(self.navigation_wait).await;
        Ok(())
    }

    /// Step through history; `Ok(false)` when there is nothing in that direction.
    pub async fn go_history(&mut self, delta: i64) -> Result<bool> {
        let moved = self.cdp.go_history(delta).await?;
        if moved {
            self.invalidate_refs();
            tokio::time::sleep(self.navigation_wait).await;
            self.current_url = self.page_url().await.ok();
        }
        Ok(moved)
    }

    pub async fn page_url(&self) -> Result<String> {
        let url = self.cdp.evaluate_js("window.location.href").await?;
        Ok(url.as_str().unwrap_or_default().to_string())
    }

    pub async fn page_title(&self) -> Result<String> {
        let title = self.cdp.evaluate_js("document.title").await?;
        Ok(title.as_str().unwrap_or_default().to_string())
    }

    async fn element_center(&self, backend_node_id: i64) -> Result<(f64, f64)> {
        self.cdp.scroll_into_view(backend_node_id).await?;
        self.cdp.element_center(backend_node_id).await
    }

    pub async fn click(&mut self, selector: &str) -> Result<()> {
        let node = self.resolve(selector)?;
        let (x, y) = self.element_center(node).await?;
        self.cdp.dispatch_mouse_event("mouseMoved", x, y, 0, 0).await?;
        self.cdp.dispatch_mouse_event("mousePressed", x, y, 1, 1).await?;
        self.cdp.dispatch_mouse_event("mouseReleased", x, y, 1, 0).await?;
        tokio::time::sleep(self.action_wait).await;
        Ok(())
    }

    pub async fn hover(&mut self, selector: &str) -> Result<()> {
        let node = self.resolve(selector)?;
        let (x, y) = self.element_center(node).await?;
        self.cdp.dispatch_mouse_event("mouseMoved", x, y, 0, 0).await?;
        tokio::time::sleep(self.action_wait).await;
        Ok(())
    }

    /// Replace the element's content with `text`, optionally pressing Enter.
    pub async fn type_text(&mut self, selector: &str, text: &str, submit: bool) -> Result<()> {
        let node = self.resolve(selector)?;
        self.cdp.scroll_into_view(node).await?;
        self.cdp.focus(node).await?;
        self.cdp
            .evaluate_js(
                "(() => { const el = document.activeElement; if (!el) return; \
                 if ('value' in el) el.value = ''; else if (el.isContentEditable) el.textContent = ''; })()",
            )
            .await?;
        self.cdp.insert_text(text).await?;
        self.cdp
            .evaluate_js(
                "document.activeElement && document.activeElement.dispatchEvent(new Event('input', {bubbles: true}))",
            )
            .await?;
        if submit {
            self.press_key("Enter").await?;
        }
        tokio::time::sleep(self.action_wait).await;
        Ok(())
    }

    /// Press on the start element, move to the end element and release.
    pub async fn drag(&mut self, start_selector: &str, end_selector: &str) -> Result<()> {
        let start = self.resolve(start_selector)?;
        let end = self.resolve(end_selector)?;
        let (sx, sy) = self.element_center(start).await?;
        self.cdp.dispatch_mouse_event("mouseMoved", sx, sy, 0, 0).await?;
        self.cdp.dispatch_mouse_event("mousePressed", sx, sy, 1, 1).await?;
        let (ex, ey) = self.element_center(end).await?;
        // intermediate step so drag listeners see movement
        let (mx, my) = ((sx + ex) / 2.0, (sy + ey) / 2.0);
        self.cdp.dispatch_mouse_event("mouseMoved", mx, my, 0, 1).await?;
        self.cdp.dispatch_mouse_event("mouseMoved", ex, ey, 0, 1).await?;
        self.cdp.dispatch_mouse_event("mouseReleased", ex, ey, 1, 0).await?;
        tokio::time::sleep(self.action_wait).await;
        Ok(())
    }

    pub async fn press_key(&mut self, key: &str) -> Result<()> {
        let (key_name, code, modifiers) = parse_key_spec(key);
        self.cdp.dispatch_key_event("keyDown", &key_name, &code, modifiers).await?;
        self.cdp.dispatch_key_event("keyUp", &key_name, &code, modifiers).await?;
        Ok(())
    }

    /// Print the page and write it to `output_dir`. Returns the file path.
    pub async fn save_pdf(&mut self, output_dir: &Path) -> Result<PathBuf> {
        use base64::Engine;

        let data = self.cdp.print_to_pdf().await?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data.as_bytes())
            .map_err(|e| Error::Browser(format!("Invalid PDF data: {}", e)))?;

        std::fs::create_dir_all(output_dir)?;
        let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = output_dir.join(format!("page_{}.pdf", ts));
        std::fs::write(&path, bytes)?;
        Ok(path)
    }

    pub async fn console_messages(&self) -> Vec<String> {
        self.console.lock().await.iter().cloned().collect()
    }

    /// Close the browser session.
    pub async fn close(&mut self) {
        if let Err(e) = self.cdp.send_command("Browser.close", json!({})).await {
            debug!("CDP Browser.close failed (may already be closed): {}", e);
        }
        self.console_task.abort();
        let _ = self.chrome_process.kill().await;
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.console_task.abort();
        let _ = self.chrome_process.start_kill();
    }
}

#[async_trait]
impl SnapshotProvider for BrowserSession {
    async fn capture(&mut self) -> Result<Option<AXNode>> {
        self.capture_snapshot().await
    }
}

impl ReferenceResolver for BrowserSession {
    fn resolve(&self, selector: &str) -> Result<i64> {
        resolve_in(&self.refs, &self.selector_prefix, selector)
    }
}

/// Look `selector` up in one snapshot's ref table.
pub fn resolve_in(refs: &RefTable, prefix: &str, selector: &str) -> Result<i64> {
    let ref_id = ref_from_selector(selector, prefix);
    let entry = refs
        .get(ref_id)
        .ok_or_else(|| Error::StaleRef(ref_id.to_string()))?;
    entry.backend_node_id.ok_or_else(|| {
        Error::Browser(format!(
            "Ref '{}' ({} \"{}\") has no DOM node to act on",
            ref_id, entry.role, entry.name
        ))
    })
}

async fn spawn_console_listener(
    cdp: &CdpClient,
    buffer: Arc<Mutex<VecDeque<String>>>,
) -> tokio::task::JoinHandle<()> {
    let mut rx = cdp.subscribe_event("Runtime.consoleAPICalled").await;
    tokio::spawn(async move {
        while let Some(params) = rx.recv().await {
            let line = format_console_event(&params);
            push_bounded(&mut *buffer.lock().await, line, CONSOLE_CAPACITY);
        }
    })
}

fn push_bounded(lines: &mut VecDeque<String>, line: String, capacity: usize) {
    if lines.len() >= capacity {
        lines.pop_front();
    }
    lines.push_back(line);
}

/// `[level] text` for a `Runtime.consoleAPICalled` event.
pub fn format_console_event(params: &Value) -> String {
    let level = params.get("type").and_then(|v| v.as_str()).unwrap_or("log");
    let text = params
        .get("args")
        .and_then(|v| v.as_array())
        .map(|args| {
            args.iter()
                .map(|arg| match arg.get("value") {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => arg
                        .get("description")
                        .and_then(|d| d.as_str())
                        .unwrap_or("")
                        .to_string(),
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();
    format!("[{}] {}", level, text)
}

/// Parse a key specification like "Enter", "Tab", "Ctrl+A".
/// Returns (key, code, CDP modifier bitmask).
pub fn parse_key_spec(key: &str) -> (String, String, i32) {
    let parts: Vec<&str> = key.split('+').collect();
    let mut modifiers = 0i32;
    let mut main_key = key.to_string();

    if parts.len() > 1 {
        for &part in &parts[..parts.len() - 1] {
            match part.to_lowercase().as_str() {
                "ctrl" | "control" => modifiers |= 2,
                "alt" | "option" => modifiers |= 1,
                "shift" => modifiers |= 8,
                "meta" | "cmd" | "command" => modifiers |= 4,
                _ => {}
            }
        }
        main_key = parts.last().unwrap_or(&key).to_string();
    }

    let mut chars = main_key.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c != ' ' {
            let code = if c.is_ascii_digit() {
                format!("Digit{}", c)
            } else {
                format!("Key{}", c.to_ascii_uppercase())
            };
            return (main_key, code, modifiers);
        }
    }

    let code = match main_key.as_str() {
        "Enter" | "Return" => "Enter",
        "Tab" => "Tab",
        "Escape" | "Esc" => "Escape",
        "Backspace" => "Backspace",
        "Delete" => "Delete",
        "ArrowUp" | "Up" => "ArrowUp",
        "ArrowDown" | "Down" => "ArrowDown",
        "ArrowLeft" | "Left" => "ArrowLeft",
        "ArrowRight" | "Right" => "ArrowRight",
        "Home" => "Home",
        "End" => "End",
        "PageUp" => "PageUp",
        "PageDown" => "PageDown",
        "Space" | " " => "Space",
        other => other,
    }
    .to_string();

    let key_name = match main_key.as_str() {
        "Return" => "Enter".to_string(),
        "Esc" => "Escape".to_string(),
        "Up" | "Down" | "Left" | "Right" => format!("Arrow{}", main_key),
        "Space" => " ".to_string(),
        _ => main_key,
    };

    (key_name, code, modifiers)
}

struct ContextState {
    name: String,
    options: LaunchOptions,
    session: Option<BrowserSession>,
}

/// Explicit handle to one browser lifetime (init → use → close).
///
/// Cloning shares the same browser; create a new context for an isolated one.
#[derive(Clone)]
pub struct BrowserContext {
    inner: Arc<Mutex<ContextState>>,
}

impl BrowserContext {
    pub fn new(name: &str, options: LaunchOptions) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ContextState {
                name: name.to_string(),
                options,
                session: None,
            })),
        }
    }

    pub fn from_config(name: &str, config: &Config, paths: &Paths) -> Self {
        Self::new(name, LaunchOptions::from_config(config, paths, name))
    }

    /// The running session, launching the browser first if needed. The
    /// guard serializes access: one tool call at a time per context.
    pub async fn ensure_session(&self) -> Result<MappedMutexGuard<'_, BrowserSession>> {
        let mut state = self.inner.lock().await;
        if state.session.is_none() {
            let session = BrowserSession::launch(&state.name, &state.options).await?;
            state.session = Some(session);
        }
        MutexGuard::try_map(state, |s| s.session.as_mut())
            .map_err(|_| Error::Browser("browser session unavailable".to_string()))
    }

    pub async fn is_running(&self) -> bool {
        self.inner.lock().await.session.is_some()
    }

    /// Console output of the running session; empty when none is running.
    pub async fn console_messages(&self) -> Vec<String> {
        let state = self.inner.lock().await;
        match state.session.as_ref() {
            Some(session) => session.console_messages().await,
            None => Vec::new(),
        }
    }

    /// Shut the browser down. Returns false if nothing was running.
    pub async fn close(&self) -> bool {
        let mut state = self.inner.lock().await;
        match state.session.take() {
            Some(mut session) => {
                info!(session = %session.name, "Closing browser");
                session.close().await;
                true
            }
            None => false,
        }
    }
}

fn build_browser_args(
    debug_port: u16,
    user_data_dir: &Path,
    headless: bool,
    window_size: (u32, u32),
) -> Vec<String> {
    let mut args = vec![
        format!("--remote-debugging-port={}", debug_port),
        format!("--user-data-dir={}", user_data_dir.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-background-networking".to_string(),
        "--disable-extensions".to_string(),
        "--disable-sync".to_string(),
        "--disable-translate".to_string(),
        "--metrics-recording-only".to_string(),
        "--password-store=basic".to_string(),
    ];
    if headless {
        args.push("--headless=new".to_string());
    }
    args.push(format!("--window-size={},{}", window_size.0, window_size.1));
    args.push("about:blank".to_string());
    args
}

/// Find a CDP-capable browser: the configured path first, then well-known
/// Chrome, Chromium and Edge locations.
pub fn find_browser_binary(configured: Option<&str>) -> Option<String> {
    if let Some(path) = configured {
        if Path::new(path).exists() || which::which(path).is_ok() {
            return Some(path.to_string());
        }
        warn!(path, "Configured browser not found, falling back to discovery");
    }

    let candidates: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
        ]
    } else if cfg!(target_os = "linux") {
        &[
            "google-chrome", "google-chrome-stable",
            "chromium", "chromium-browser",
            "microsoft-edge", "microsoft-edge-stable",
        ]
    } else {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
        ]
    };

    for candidate in candidates {
        if Path::new(candidate).exists() {
            return Some(candidate.to_string());
        }
        if !candidate.contains('/') && !candidate.contains('\\') && which::which(candidate).is_ok() {
            return Some(candidate.to_string());
        }
    }
    None
}

async fn find_free_port() -> Result<u16> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

/// Poll `/json/version` until the browser answers or `timeout_secs` pass.
async fn wait_for_cdp_ready(port: u16, timeout_secs: u64) -> Result<()> {
    let start = Instant::now();
    let timeout = Duration::from_secs(timeout_secs);
    let url = format!("http://127.0.0.1:{}/json/version", port);

    loop {
        if start.elapsed() > timeout {
            return Err(Error::Timeout(format!(
                "Browser CDP not ready after {}s on port {}",
                timeout_secs, port
            )));
        }
        if let Ok(resp) = reqwest::get(&url).await {
            if let Ok(body) = resp.json::<Value>().await {
                if body.get("webSocketDebuggerUrl").and_then(|v| v.as_str()).is_some() {
                    return Ok(());
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// WebSocket URL of the first page target listed on `/json/list`.
async fn get_page_ws_url(port: u16) -> Result<String> {
    let url = format!("http://127.0.0.1:{}/json/list", port);

    for attempt in 0..10 {
        if attempt > 0 {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        let Ok(resp) = reqwest::get(&url).await else {
            continue;
        };
        let Ok(targets) = resp.json::<Vec<Value>>().await else {
            continue;
        };
        let page = targets.iter().find_map(|target| {
            if target.get("type").and_then(|v| v.as_str()) != Some("page") {
                return None;
            }
            target.get("webSocketDebuggerUrl").and_then(|v| v.as_str())
        });
        if let Some(ws_url) = page {
            return Ok(ws_url.to_string());
        }
    }

    Err(Error::Browser("No page target found after retries".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_from_selector() {
        assert_eq!(ref_from_selector("aria-ref=s1e4", "aria-ref="), "s1e4");
        assert_eq!(ref_from_selector("s1e4", "aria-ref="), "s1e4");
        assert_eq!(ref_from_selector(" aria-ref=s2e1 ", "aria-ref="), "s2e1");
        assert_eq!(ref_from_selector("aria-ref=s1e4", ""), "aria-ref=s1e4");
    }

    fn page(generation: u32) -> (AXNode, RefTable) {
        let mut button = AXNode::new("button", "Submit");
        button.backend_node_id = Some(42);
        let mut root = AXNode::new("document", "").with_children(vec![button]);
        let refs = assign_refs(&mut root, generation);
        (root, refs)
    }

    #[test]
    fn test_resolve_in_current_snapshot() {
        let (_, refs) = page(1);
        assert_eq!(resolve_in(&refs, "aria-ref=", "aria-ref=s1e2").unwrap(), 42);
        assert_eq!(resolve_in(&refs, "aria-ref=", "s1e2").unwrap(), 42);
    }

    #[test]
    fn test_resolve_in_rejects_stale_ref() {
        let (_, old) = page(1);
        let (_, new) = page(2);
        assert!(resolve_in(&old, "aria-ref=", "aria-ref=s1e2").is_ok());
        let err = resolve_in(&new, "aria-ref=", "aria-ref=s1e2").unwrap_err();
        assert!(matches!(err, Error::StaleRef(ref r) if r == "s1e2"));
    }

    #[test]
    fn test_resolve_in_node_without_dom() {
        let (_, refs) = page(1);
        // the document node has no backend id
        let err = resolve_in(&refs, "aria-ref=", "aria-ref=s1e1").unwrap_err();
        assert!(matches!(err, Error::Browser(_)));
    }

    #[test]
    fn test_parse_key_spec() {
        assert_eq!(parse_key_spec("Enter"), ("Enter".to_string(), "Enter".to_string(), 0));
        assert_eq!(parse_key_spec("Ctrl+A"), ("A".to_string(), "KeyA".to_string(), 2));
        assert_eq!(parse_key_spec("Ctrl+Shift+Tab"), ("Tab".to_string(), "Tab".to_string(), 10));
        assert_eq!(parse_key_spec("Esc"), ("Escape".to_string(), "Escape".to_string(), 0));
        assert_eq!(parse_key_spec("Down"), ("ArrowDown".to_string(), "ArrowDown".to_string(), 0));
        assert_eq!(parse_key_spec("7"), ("7".to_string(), "Digit7".to_string(), 0));
    }

    #[test]
    fn test_console_history_drops_oldest() {
        let mut lines = VecDeque::new();
        for i in 0..5 {
            push_bounded(&mut lines, format!("[log] {}", i), 3);
        }
        let kept: Vec<&str> = lines.iter().map(String::as_str).collect();
        assert_eq!(kept, vec!["[log] 2", "[log] 3", "[log] 4"]);
    }

    #[test]
    fn test_format_console_event() {
        let params = json!({
            "type": "warning",
            "args": [
                {"type": "string", "value": "disk"},
                {"type": "number", "value": 42},
                {"type": "object", "description": "Object"}
            ]
        });
        assert_eq!(format_console_event(&params), "[warning] disk 42 Object");
        assert_eq!(format_console_event(&json!({})), "[log] ");
    }

    #[test]
    fn test_browser_args() {
        let args = build_browser_args(9222, Path::new("/tmp/profile"), true, (800, 600));
        assert!(args.contains(&"--remote-debugging-port=9222".to_string()));
        assert!(args.contains(&"--user-data-dir=/tmp/profile".to_string()));
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--window-size=800,600".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("about:blank"));

        let headed = build_browser_args(9222, Path::new("/tmp/profile"), false, (800, 600));
        assert!(!headed.iter().any(|a| a.starts_with("--headless")));
    }

    #[test]
    fn test_launch_options_from_config() {
        let mut config = Config::default();
        config.browser.headless = true;
        config.matcher.selector_prefix = "ref=".to_string();
        let paths = Paths::with_base(PathBuf::from("/tmp/sf"));
        let opts = LaunchOptions::from_config(&config, &paths, "default");
        assert!(opts.headless);
        assert_eq!(opts.user_data_dir, PathBuf::from("/tmp/sf/sessions/default"));
        assert_eq!(opts.navigation_wait, Duration::from_millis(1500));
        assert_eq!(opts.selector_prefix, "ref=");
    }

    #[tokio::test]
    async fn test_context_without_session() {
        let paths = Paths::with_base(PathBuf::from("/tmp/sf"));
        let ctx = BrowserContext::from_config("default", &Config::default(), &paths);
        assert!(!ctx.is_running().await);
        assert!(ctx.console_messages().await.is_empty());
        assert!(!ctx.close().await);
    }
}
