//! Browser process management.
//!
//! Launches one Chromium-family browser with remote debugging enabled and
//! connects a CDP client to its first page target.

use crate::cdp::CdpClient;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BrowserEngine {
    Chrome,
    Edge,
}

impl BrowserEngine {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "edge" | "msedge" => Self::Edge,
            _ => Self::Chrome,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Chrome => "chrome",
            Self::Edge => "edge",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub engine: BrowserEngine,
    pub executable: Option<String>,
    pub headless: bool,
    pub no_sandbox: bool,
    pub viewport: (u32, u32),
    pub extra_args: Vec<String>,
    pub user_data_dir: PathBuf,
    pub launch_timeout: Duration,
    pub command_timeout: Duration,
}

pub struct BrowserSession {
    pub engine: BrowserEngine,
    pub debug_port: u16,
    pub cdp: CdpClient,
    pub user_data_dir: PathBuf,
    process: Mutex<Child>,
}

impl BrowserSession {
    pub async fn launch(opts: &LaunchOptions) -> Result<Self, String> {
        let browser_path = match &opts.executable {
            Some(path) if !path.is_empty() => path.clone(),
            _ => find_browser_binary(opts.engine)
                .ok_or_else(|| format!("{} not found. Please install it.", opts.engine.name()))?,
        };

        std::fs::create_dir_all(&opts.user_data_dir)
            .map_err(|e| format!("Failed to create user data dir: {}", e))?;

        let debug_port = find_free_port().await?;
        let args = build_browser_args(opts, debug_port);

        info!(
            port = debug_port,
            headless = opts.headless,
            browser = opts.engine.name(),
            "Launching browser"
        );

        let child = Command::new(&browser_path)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("Failed to launch {}: {}", opts.engine.name(), e))?;

        wait_for_cdp_ready(debug_port, opts.launch_timeout).await?;
        let page_ws_url = get_page_ws_url(debug_port).await?;
        let cdp = CdpClient::connect(&page_ws_url, opts.command_timeout).await?;

        cdp.enable_domain("Page").await?;
        cdp.enable_domain("Runtime").await?;
        cdp.enable_domain("DOM").await?;
        cdp.set_viewport(opts.viewport.0, opts.viewport.1).await?;

        info!(ws_url = %page_ws_url, "CDP connection established");

        Ok(Self {
            engine: opts.engine,
            debug_port,
            cdp,
            user_data_dir: opts.user_data_dir.clone(),
            process: Mutex::new(child),
        })
    }

    /// Graceful `Browser.close`, then kill whatever is left.
    pub async fn close(&self) -> Result<(), String> {
        if let Err(e) = self.cdp.send_command("Browser.close", json!({})).await {
            debug!(error = %e, "Browser.close failed (may already be closed)");
        }
        let mut child = self.process.lock().await;
        match child.try_wait() {
            Ok(Some(_)) => Ok(()),
            _ => child
                .kill()
                .await
                .map_err(|e| format!("Failed to kill browser process: {}", e)),
        }
    }
}

fn build_browser_args(opts: &LaunchOptions, debug_port: u16) -> Vec<String> {
    let mut args = vec![
        format!("--remote-debugging-port={}", debug_port),
        format!("--user-data-dir={}", opts.user_data_dir.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-background-networking".to_string(),
        "--disable-extensions".to_string(),
        "--disable-sync".to_string(),
        "--disable-translate".to_string(),
        "--disable-blink-features=AutomationControlled".to_string(),
        "--password-store=basic".to_string(),
    ];
    if opts.no_sandbox {
        args.push("--no-sandbox".to_string());
        args.push("--disable-setuid-sandbox".to_string());
    }
    if opts.headless {
        args.push("--headless=new".to_string());
    }
    args.push(format!("--window-size={},{}", opts.viewport.0, opts.viewport.1));
    args.extend(opts.extra_args.iter().cloned());
    args.push("about:blank".to_string());
    args
}

/// Find a browser binary on the system for the given engine.
pub fn find_browser_binary(engine: BrowserEngine) -> Option<String> {
    let candidates = match engine {
        BrowserEngine::Chrome => {
            if cfg!(target_os = "macos") {
                vec![
                    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
                    "/Applications/Chromium.app/Contents/MacOS/Chromium",
                ]
            } else if cfg!(target_os = "linux") {
                vec![
                    "google-chrome",
                    "google-chrome-stable",
                    "chromium",
                    "chromium-browser",
                    "/usr/bin/google-chrome",
                    "/usr/bin/chromium",
                ]
            } else {
                vec![
                    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
                    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
                ]
            }
        }
        BrowserEngine::Edge => {
            if cfg!(target_os = "macos") {
                vec!["/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge"]
            } else if cfg!(target_os = "linux") {
                vec!["microsoft-edge", "microsoft-edge-stable", "/usr/bin/microsoft-edge"]
            } else {
                vec![
                    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
                    r"C:\Program Files\Microsoft\Edge\Application\msedge.exe",
                ]
            }
        }
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

pub fn list_available_browsers() -> Vec<(BrowserEngine, String)> {
    [BrowserEngine::Chrome, BrowserEngine::Edge]
        .into_iter()
        .filter_map(|engine| find_browser_binary(engine).map(|path| (engine, path)))
        .collect()
}

async fn find_free_port() -> Result<u16, String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .map_err(|e| format!("Failed to bind to find free port: {}", e))?;
    let port = listener
        .local_addr()
        .map_err(|e| format!("Failed to get local addr: {}", e))?
        .port();
    drop(listener);
    Ok(port)
}

/// Poll /json/version until the debugging endpoint answers.
async fn wait_for_cdp_ready(port: u16, timeout: Duration) -> Result<String, String> {
    let start = std::time::Instant::now();
    let url = format!("http://127.0.0.1:{}/json/version", port);

    loop {
        if start.elapsed() > timeout {
            return Err(format!(
                "Browser CDP not ready after {}s on port {}",
                timeout.as_secs(),
                port
            ));
        }

        if let Ok(resp) = reqwest::get(&url).await {
            if let Ok(body) = resp.json::<Value>().await {
                if let Some(ws_url) = body.get("webSocketDebuggerUrl").and_then(|v| v.as_str()) {
                    return Ok(ws_url.to_string());
                }
            }
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// WebSocket URL of the first "page" target from /json/list. The target
/// may appear a little after the browser endpoint, so this retries.
async fn get_page_ws_url(port: u16) -> Result<String, String> {
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
        if let Some(ws_url) = first_page_ws_url(&targets) {
            return Ok(ws_url);
        }
    }

    Err("No page target found after retries".to_string())
}

fn first_page_ws_url(targets: &[Value]) -> Option<String> {
    targets
        .iter()
        .filter(|t| t.get("type").and_then(|v| v.as_str()) == Some("page"))
        .find_map(|t| t.get("webSocketDebuggerUrl").and_then(|v| v.as_str()))
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> LaunchOptions {
        LaunchOptions {
            engine: BrowserEngine::Chrome,
            executable: None,
            headless: true,
            no_sandbox: true,
            viewport: (1280, 1024),
            extra_args: vec!["--lang=en-US".to_string()],
            user_data_dir: PathBuf::from("/tmp/resume-x/profile"),
            launch_timeout: Duration::from_secs(15),
            command_timeout: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_engine_parse() {
        assert_eq!(BrowserEngine::parse("msedge"), BrowserEngine::Edge);
        assert_eq!(BrowserEngine::parse("Chrome"), BrowserEngine::Chrome);
        assert_eq!(BrowserEngine::parse("anything"), BrowserEngine::Chrome);
    }

    #[test]
    fn test_browser_args_headless_sandboxless() {
        let args = build_browser_args(&opts(), 9333);
        assert_eq!(args[0], "--remote-debugging-port=9333");
        assert!(args.contains(&"--user-data-dir=/tmp/resume-x/profile".to_string()));
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--no-sandbox".to_string()));
        assert!(args.contains(&"--window-size=1280,1024".to_string()));
        assert!(args.contains(&"--lang=en-US".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("about:blank"));
    }

    #[test]
    fn test_browser_args_headed_with_sandbox() {
        let mut o = opts();
        o.headless = false;
        o.no_sandbox = false;
        let args = build_browser_args(&o, 9333);
        assert!(!args.iter().any(|a| a.starts_with("--headless")));
        assert!(!args.contains(&"--no-sandbox".to_string()));
    }

    #[test]
    fn test_first_page_ws_url_skips_workers() {
        let targets = vec![
            json!({"type": "service_worker", "webSocketDebuggerUrl": "ws://w"}),
            json!({"type": "page", "webSocketDebuggerUrl": "ws://p"}),
        ];
        assert_eq!(first_page_ws_url(&targets).as_deref(), Some("ws://p"));
        assert_eq!(first_page_ws_url(&[]), None);
    }

    #[tokio::test]
    async fn test_find_free_port() {
        let port = find_free_port().await.unwrap();
        assert!(port > 0);
    }
}
