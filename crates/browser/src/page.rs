//! The narrow browser capability the pipeline depends on, and its CDP
//! implementation.

use async_trait::async_trait;
use base64::Engine;
use formpilot_core::config::BrowserConfig;
use formpilot_core::{Error, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::locator::Locator;
use crate::session::{BrowserEngine, BrowserSession, LaunchOptions};

/// A live element. `node_id` identifies the DOM node across queries;
/// `object_id` is the backend's handle for acting on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementHandle {
    pub object_id: String,
    pub node_id: i64,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ElementInfo {
    pub tag: String,
    #[serde(rename = "type", default)]
    pub input_type: String,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Select,
    Radio,
    Checkbox,
    File,
    Text,
}

impl ElementInfo {
    pub fn kind(&self) -> ControlKind {
        if self.tag.eq_ignore_ascii_case("select") {
            return ControlKind::Select;
        }
        match self.input_type.to_ascii_lowercase().as_str() {
            "radio" => ControlKind::Radio,
            "checkbox" => ControlKind::Checkbox,
            "file" => ControlKind::File,
            _ => ControlKind::Text,
        }
    }
}

/// Everything the pipeline needs from a browser tab.
#[async_trait]
pub trait Page: Send + Sync {
    /// Load `url` and wait for DOMContentLoaded.
    async fn navigate(&self, url: &str) -> Result<()>;
    /// Evaluate an expression and return its JSON value.
    async fn evaluate(&self, expression: &str) -> Result<Value>;
    /// All elements matching `locator`, in document order.
    /// Handles stay valid until passed to `release`.
    async fn query_all(&self, locator: &Locator) -> Result<Vec<ElementHandle>>;
    /// Drop the backend references behind `elements`.
    async fn release(&self, elements: Vec<ElementHandle>);
    async fn describe(&self, element: &ElementHandle) -> Result<ElementInfo>;
    async fn fill(&self, element: &ElementHandle, value: &str) -> Result<()>;
    async fn select_option(&self, element: &ElementHandle, value: &str) -> Result<()>;
    async fn check(&self, element: &ElementHandle) -> Result<()>;
    /// Assign files directly to a file input.
    async fn upload_files(&self, element: &ElementHandle, files: &[PathBuf]) -> Result<()>;
    /// Click `trigger` and answer the file chooser it opens with `files`.
    async fn upload_via_chooser(
        &self,
        trigger: &ElementHandle,
        files: &[PathBuf],
        timeout: Duration,
    ) -> Result<()>;
    /// PNG bytes.
    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>>;
    /// A4 PDF bytes with 20mm margins and backgrounds.
    async fn pdf(&self) -> Result<Vec<u8>>;
    async fn close(&self) -> Result<()>;
}

/// Creates the one page a pipeline run works with.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// `work_dir` is the run's scratch directory; browser profile data
    /// goes under it so run cleanup removes it.
    async fn launch(&self, work_dir: &Path) -> Result<Box<dyn Page>>;
}

fn cdp_err(e: String) -> Error {
    Error::Browser(e)
}

fn decode_base64(data: &str) -> Result<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| Error::Browser(format!("Invalid base64 from browser: {}", e)))
}

/// Surface a thrown JS exception from a Runtime.* result as an error.
fn check_exception(result: &Value) -> Result<()> {
    if let Some(details) = result.get("exceptionDetails") {
        let text = details
            .get("exception")
            .and_then(|e| e.get("description"))
            .and_then(|v| v.as_str())
            .or_else(|| details.get("text").and_then(|v| v.as_str()))
            .unwrap_or("unknown JavaScript exception");
        return Err(Error::Browser(text.lines().next().unwrap_or(text).to_string()));
    }
    Ok(())
}

fn result_value(result: &Value) -> Value {
    result
        .get("result")
        .and_then(|r| r.get("value"))
        .cloned()
        .unwrap_or(Value::Null)
}

fn extract_center_from_box_model(bm: &Value) -> Option<(f64, f64)> {
    let content = bm.get("model")?.get("content")?.as_array()?;
    if content.len() < 8 {
        return None;
    }
    let x1 = content[0].as_f64()?;
    let y1 = content[1].as_f64()?;
    let x2 = content[4].as_f64()?;
    let y2 = content[5].as_f64()?;
    Some(((x1 + x2) / 2.0, (y1 + y2) / 2.0))
}

fn file_args(files: &[PathBuf]) -> Vec<String> {
    files.iter().map(|f| f.display().to_string()).collect()
}

const PREPARE_EDIT_FN: &str = "function() { \
    if (this.disabled || this.readOnly) throw new Error('element is not editable'); \
    this.scrollIntoView({block: 'center'}); \
    this.focus(); \
    if ('value' in this) { this.value = ''; } else { this.textContent = ''; } \
    return true; }";

const COMMIT_EDIT_FN: &str = "function(v) { \
    if ('value' in this && this.value !== v) { this.value = v; } \
    this.dispatchEvent(new Event('input', {bubbles: true})); \
    this.dispatchEvent(new Event('change', {bubbles: true})); \
    return true; }";

const SELECT_FN: &str = "function(v) { \
    const want = String(v).trim(); \
    const opts = Array.from(this.options || []); \
    const hit = opts.find((o) => o.value === want) \
      || opts.find((o) => (o.textContent || '').trim() === want) \
      || opts.find((o) => (o.textContent || '').trim().toLowerCase() === want.toLowerCase()); \
    if (!hit) throw new Error('no option matching ' + want); \
    if (this.disabled) throw new Error('select is disabled'); \
    this.value = hit.value; \
    this.dispatchEvent(new Event('input', {bubbles: true})); \
    this.dispatchEvent(new Event('change', {bubbles: true})); \
    return hit.value; }";

const CHECK_FN: &str = "function() { \
    if (this.disabled) throw new Error('control is disabled'); \
    this.scrollIntoView({block: 'center'}); \
    if (!this.checked) { this.click(); } \
    return !!this.checked; }";

const DESCRIBE_FN: &str = "function() { return { \
    tag: this.tagName.toLowerCase(), \
    type: (this.getAttribute('type') || this.type || '').toLowerCase(), \
    disabled: !!this.disabled }; }";

/// `Page` backed by a Chromium tab over CDP.
pub struct CdpPage {
    session: BrowserSession,
}

impl CdpPage {
    pub fn new(session: BrowserSession) -> Self {
        Self { session }
    }

    async fn call_on(&self, element: &ElementHandle, function: &str, args: Vec<Value>) -> Result<Value> {
        let result = self
            .session
            .cdp
            .call_function_on(&element.object_id, function, args)
            .await
            .map_err(cdp_err)?;
        check_exception(&result)?;
        Ok(result_value(&result))
    }

    /// Real mouse click at the element centre so the page sees a user
    /// gesture. Falls back to a synthetic click when there is no box.
    async fn click(&self, element: &ElementHandle) -> Result<()> {
        self.call_on(
            element,
            "function() { this.scrollIntoView({block: 'center'}); return true; }",
            vec![],
        )
        .await?;

        let center = self
            .session
            .cdp
            .get_box_model(element.node_id)
            .await
            .ok()
            .and_then(|bm| extract_center_from_box_model(&bm));

        match center {
            Some((x, y)) => {
                let cdp = &self.session.cdp;
                cdp.dispatch_mouse_event("mousePressed", x, y, 1).await.map_err(cdp_err)?;
                cdp.dispatch_mouse_event("mouseReleased", x, y, 1).await.map_err(cdp_err)?;
            }
            None => {
                self.call_on(element, "function() { this.click(); return true; }", vec![])
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Page for CdpPage {
    async fn navigate(&self, url: &str) -> Result<()> {
        let cdp = &self.session.cdp;
        let mut loaded = cdp.subscribe_event("Page.domContentEventFired").await;

        let result = cdp
            .navigate(url)
            .await
            .map_err(|e| Error::Navigation(format!("{}: {}", url, e)))?;
        if let Some(err) = result.get("errorText").and_then(|v| v.as_str()) {
            if !err.is_empty() {
                return Err(Error::Navigation(format!("{}: {}", url, err)));
            }
        }
        // Same-document navigations carry no loaderId and fire no load events.
        if result.get("loaderId").is_none() {
            return Ok(());
        }
        if loaded.recv().await.is_none() {
            return Err(Error::Navigation(format!("{}: browser connection closed", url)));
        }
        debug!(url = %url, "DOMContentLoaded");
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        let result = self.session.cdp.evaluate_js(expression).await.map_err(cdp_err)?;
        check_exception(&result)?;
        Ok(result_value(&result))
    }

    async fn query_all(&self, locator: &Locator) -> Result<Vec<ElementHandle>> {
        let cdp = &self.session.cdp;
        let result = cdp.evaluate_handle(&locator.to_js()).await.map_err(cdp_err)?;
        check_exception(&result)?;
        let Some(array_id) = result
            .get("result")
            .and_then(|r| r.get("objectId"))
            .and_then(|v| v.as_str())
        else {
            return Ok(Vec::new());
        };

        let mut indexed: Vec<(usize, String)> = cdp
            .get_properties(array_id)
            .await
            .map_err(cdp_err)?
            .into_iter()
            .filter_map(|prop| {
                let index = prop.get("name")?.as_str()?.parse::<usize>().ok()?;
                let object_id = prop.get("value")?.get("objectId")?.as_str()?.to_string();
                Some((index, object_id))
            })
            .collect();
        indexed.sort_by_key(|(i, _)| *i);

        let _ = cdp.release_object(array_id).await;

        let mut handles = Vec::with_capacity(indexed.len());
        let mut pending = indexed.into_iter().map(|(_, id)| id);
        while let Some(object_id) = pending.next() {
            match cdp.backend_node_id(&object_id).await {
                Ok(node_id) => handles.push(ElementHandle { object_id, node_id }),
                Err(e) => {
                    let mut orphans: Vec<String> = handles.into_iter().map(|h| h.object_id).collect();
                    orphans.push(object_id);
                    orphans.extend(pending);
                    for id in orphans {
                        let _ = cdp.release_object(&id).await;
                    }
                    return Err(cdp_err(e));
                }
            }
        }
        Ok(handles)
    }

    async fn release(&self, elements: Vec<ElementHandle>) {
        for element in elements {
            if let Err(e) = self.session.cdp.release_object(&element.object_id).await {
                debug!(error = %e, "Failed to release element handle");
            }
        }
    }

    async fn describe(&self, element: &ElementHandle) -> Result<ElementInfo> {
        let value = self.call_on(element, DESCRIBE_FN, vec![]).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn fill(&self, element: &ElementHandle, value: &str) -> Result<()> {
        self.call_on(element, PREPARE_EDIT_FN, vec![]).await?;
        if !value.is_empty() {
            self.session.cdp.insert_text(value).await.map_err(cdp_err)?;
        }
        self.call_on(element, COMMIT_EDIT_FN, vec![json!(value)]).await?;
        Ok(())
    }

    async fn select_option(&self, element: &ElementHandle, value: &str) -> Result<()> {
        self.call_on(element, SELECT_FN, vec![json!(value)]).await?;
        Ok(())
    }

    async fn check(&self, element: &ElementHandle) -> Result<()> {
        let checked = self.call_on(element, CHECK_FN, vec![]).await?;
        if checked.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(Error::Browser("control did not become checked".to_string()))
        }
    }

    async fn upload_files(&self, element: &ElementHandle, files: &[PathBuf]) -> Result<()> {
        self.session
            .cdp
            .set_file_input_files_by_object(file_args(files), &element.object_id)
            .await
            .map_err(cdp_err)
    }

    async fn upload_via_chooser(
        &self,
        trigger: &ElementHandle,
        files: &[PathBuf],
        timeout: Duration,
    ) -> Result<()> {
        let cdp = &self.session.cdp;
        cdp.set_intercept_file_chooser(true).await.map_err(cdp_err)?;
        let mut opened = cdp.subscribe_event("Page.fileChooserOpened").await;

        let outcome = async {
            self.click(trigger).await?;
            let params = tokio::time::timeout(timeout, opened.recv())
                .await
                .map_err(|_| Error::Timeout("file chooser did not open".to_string()))?
                .ok_or_else(|| Error::Browser("browser connection closed".to_string()))?;
            let backend_node_id = params
                .get("backendNodeId")
                .and_then(|v| v.as_i64())
                .ok_or_else(|| Error::Browser("file chooser has no backing input".to_string()))?;
            cdp.set_file_input_files_by_backend(file_args(files), backend_node_id)
                .await
                .map_err(cdp_err)
        }
        .await;

        if let Err(e) = cdp.set_intercept_file_chooser(false).await {
            debug!(error = %e, "Failed to disable file chooser interception");
        }
        outcome
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>> {
        let data = self.session.cdp.screenshot(full_page).await.map_err(cdp_err)?;
        decode_base64(&data)
    }

    async fn pdf(&self) -> Result<Vec<u8>> {
        // A4 in inches; 20mm margins.
        let margin = 20.0 / 25.4;
        let params = json!({
            "printBackground": true,
            "paperWidth": 8.27,
            "paperHeight": 11.69,
            "marginTop": margin,
            "marginBottom": margin,
            "marginLeft": margin,
            "marginRight": margin,
        });
        let data = self.session.cdp.print_to_pdf(params).await.map_err(cdp_err)?;
        decode_base64(&data)
    }

    async fn close(&self) -> Result<()> {
        self.session.close().await.map_err(cdp_err)
    }
}

/// Launches a local Chrome/Edge per run.
pub struct ChromeLauncher {
    config: BrowserConfig,
    command_timeout: Duration,
}

impl ChromeLauncher {
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            command_timeout: Duration::from_secs(30),
        }
    }

    fn launch_options(&self, work_dir: &Path) -> LaunchOptions {
        LaunchOptions {
            engine: BrowserEngine::parse(&self.config.engine),
            executable: self.config.executable.clone(),
            headless: self.config.headless,
            no_sandbox: self.config.no_sandbox,
            viewport: (self.config.viewport_width, self.config.viewport_height),
            extra_args: self.config.extra_args.clone(),
            user_data_dir: work_dir.join("browser-profile"),
            launch_timeout: Duration::from_secs(self.config.launch_timeout_secs),
            command_timeout: self.command_timeout,
        }
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self, work_dir: &Path) -> Result<Box<dyn Page>> {
        let opts = self.launch_options(work_dir);
        let session = BrowserSession::launch(&opts).await.map_err(cdp_err)?;
        info!(port = session.debug_port, engine = session.engine.name(), "Browser ready");
        Ok(Box::new(CdpPage::new(session)))
    }
}
