//! In-memory stand-ins for the browser and the generation service.

use async_trait::async_trait;
use formpilot_browser::{
    BrowserLauncher, ElementHandle, ElementInfo, FileInputHint, Locator, Page,
};
use formpilot_core::types::{ChatMessage, LLMResponse};
use formpilot_core::{Error, FormFieldDescriptor, Result};
use formpilot_providers::Provider;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::scraper::SCRAPE_SCRIPT;

#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    pub tag: String,
    pub input_type: String,
    pub id: String,
    pub name: String,
    pub data_id: String,
    pub placeholder: String,
    pub aria_label: String,
    pub title: String,
    pub class: String,
    pub text: String,
    pub label: String,
    pub required: bool,
    pub hidden: bool,
    pub disabled: bool,
    pub options: Vec<String>,
    /// Inside a `<form>`; only these are scraped.
    pub in_form: bool,
    pub value: String,
    pub checked: bool,
    pub files: Vec<PathBuf>,
    /// Clicking this element opens a file chooser bound to that element.
    pub opens_chooser_for: Option<usize>,
}

impl FakeElement {
    pub fn input(input_type: &str, id: &str) -> Self {
        Self {
            tag: "input".into(),
            input_type: input_type.into(),
            id: id.into(),
            in_form: true,
            ..Default::default()
        }
    }

    pub fn select(id: &str, options: &[&str]) -> Self {
        Self {
            tag: "select".into(),
            input_type: "select-one".into(),
            id: id.into(),
            options: options.iter().map(|o| o.to_string()).collect(),
            in_form: true,
            ..Default::default()
        }
    }

    pub fn button(text: &str) -> Self {
        Self {
            tag: "button".into(),
            text: text.into(),
            ..Default::default()
        }
    }

    fn is_file_input(&self) -> bool {
        self.tag == "input" && self.input_type == "file"
    }

    fn is_form_control(&self) -> bool {
        match self.tag.as_str() {
            "textarea" | "select" => true,
            "input" => !matches!(
                self.input_type.as_str(),
                "hidden" | "submit" | "button" | "file"
            ),
            _ => false,
        }
    }

    fn matches(&self, locator: &Locator) -> bool {
        let ci = |hay: &str, needle: &str| hay.to_lowercase().contains(&needle.to_lowercase());
        match locator {
            Locator::ExactKey(k) => {
                (!k.is_empty()) && (self.id == *k || self.name == *k || self.data_id == *k)
            }
            Locator::PlaceholderContains(t) => {
                matches!(self.tag.as_str(), "input" | "textarea")
                    && !self.placeholder.is_empty()
                    && ci(&self.placeholder, t)
            }
            Locator::AriaContains(t) => {
                (!self.aria_label.is_empty() && ci(&self.aria_label, t))
                    || (!self.title.is_empty() && ci(&self.title, t))
            }
            Locator::FormControl => self.is_form_control(),
            Locator::FileInput(FileInputHint::Resume) => {
                self.is_file_input() && (ci(&self.id, "resume") || ci(&self.name, "resume"))
            }
            Locator::FileInput(FileInputHint::File) => {
                self.is_file_input() && (ci(&self.id, "file") || ci(&self.name, "file"))
            }
            Locator::FileInput(FileInputHint::AnyVisible) => self.is_file_input() && !self.hidden,
            Locator::TagWithText { tag, texts } => {
                self.tag == *tag && texts.iter().any(|t| self.text.contains(t.as_str()))
            }
            Locator::AnyClass(classes) => self
                .class
                .split_whitespace()
                .any(|c| classes.iter().any(|want| want == c)),
        }
    }

    fn descriptor(&self) -> Option<FormFieldDescriptor> {
        if !self.in_form {
            return None;
        }
        let scraped = match self.tag.as_str() {
            "textarea" | "select" => true,
            "input" => !matches!(self.input_type.as_str(), "hidden" | "submit" | "button"),
            _ => false,
        };
        if !scraped {
            return None;
        }
        let control_type = match self.tag.as_str() {
            "textarea" => "textarea".to_string(),
            "select" => "select".to_string(),
            _ => self.input_type.clone(),
        };
        let options: Vec<String> = self
            .options
            .iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();
        let options = (self.tag == "select" && !options.is_empty()).then_some(options);
        let label = [&self.label, &self.aria_label, &self.title]
            .into_iter()
            .find(|l| !l.is_empty())
            .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
            .unwrap_or_default();
        Some(FormFieldDescriptor {
            id: self.id.clone(),
            name: self.name.clone(),
            control_type,
            label,
            placeholder: self.placeholder.clone(),
            required: self.required,
            options,
        })
    }
}

#[derive(Debug, Clone)]
pub struct FakeState {
    pub elements: Vec<FakeElement>,
    /// Result of any non-scrape `evaluate`.
    pub ready: bool,
    pub navigations: Vec<String>,
    pub fail_navigation: bool,
    /// `None` makes `pdf()` fail.
    pub pdf: Option<Vec<u8>>,
    pub fail_screenshot: bool,
    pub screenshots: usize,
    pub closed: bool,
    /// Handles returned by `query_all` and not yet released.
    pub live_handles: usize,
    /// Delay applied to every element interaction.
    pub interaction_delay: Duration,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            elements: Vec::new(),
            ready: true,
            navigations: Vec::new(),
            fail_navigation: false,
            pdf: None,
            fail_screenshot: false,
            screenshots: 0,
            closed: false,
            live_handles: 0,
            interaction_delay: Duration::ZERO,
        }
    }
}

pub const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake";

#[derive(Clone)]
pub struct FakePage {
    state: Arc<Mutex<FakeState>>,
}

impl FakePage {
    pub fn new(state: FakeState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn element(&self, index: usize) -> FakeElement {
        self.state().elements[index].clone()
    }

    async fn pause(&self) {
        let delay = self.state().interaction_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn index(handle: &ElementHandle) -> usize {
        handle.node_id as usize
    }
}

#[async_trait]
impl Page for FakePage {
    async fn navigate(&self, url: &str) -> Result<()> {
        let mut state = self.state();
        if state.fail_navigation {
            return Err(Error::Navigation(format!("{}: net::ERR_NAME_NOT_RESOLVED", url)));
        }
        state.navigations.push(url.to_string());
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        let state = self.state();
        if expression == SCRAPE_SCRIPT {
            let fields: Vec<FormFieldDescriptor> =
                state.elements.iter().filter_map(|e| e.descriptor()).collect();
            return Ok(serde_json::to_value(fields)?);
        }
        Ok(Value::Bool(state.ready))
    }

    async fn query_all(&self, locator: &Locator) -> Result<Vec<ElementHandle>> {
        self.pause().await;
        let mut state = self.state();
        let handles: Vec<ElementHandle> = state
            .elements
            .iter()
            .enumerate()
            .filter(|(_, e)| e.matches(locator))
            .map(|(i, _)| ElementHandle {
                object_id: format!("obj-{}", i),
                node_id: i as i64,
            })
            .collect();
        state.live_handles += handles.len();
        Ok(handles)
    }

    async fn release(&self, elements: Vec<ElementHandle>) {
        let mut state = self.state();
        state.live_handles = state.live_handles.saturating_sub(elements.len());
    }

    async fn describe(&self, element: &ElementHandle) -> Result<ElementInfo> {
        let state = self.state();
        let e = &state.elements[Self::index(element)];
        Ok(ElementInfo {
            tag: e.tag.clone(),
            input_type: e.input_type.clone(),
            disabled: e.disabled,
        })
    }

    async fn fill(&self, element: &ElementHandle, value: &str) -> Result<()> {
        self.pause().await;
        let mut state = self.state();
        let e = &mut state.elements[Self::index(element)];
        if e.disabled {
            return Err(Error::Browser("element is not editable".into()));
        }
        e.value = value.to_string();
        Ok(())
    }

    async fn select_option(&self, element: &ElementHandle, value: &str) -> Result<()> {
        let mut state = self.state();
        let e = &mut state.elements[Self::index(element)];
        let want = value.trim();
        let hit = e
            .options
            .iter()
            .find(|o| o.as_str() == want)
            .or_else(|| e.options.iter().find(|o| o.eq_ignore_ascii_case(want)))
            .cloned();
        match hit {
            Some(option) => {
                e.value = option;
                Ok(())
            }
            None => Err(Error::Browser(format!("no option matching {}", want))),
        }
    }

    async fn check(&self, element: &ElementHandle) -> Result<()> {
        let mut state = self.state();
        let e = &mut state.elements[Self::index(element)];
        if e.disabled {
            return Err(Error::Browser("control is disabled".into()));
        }
        e.checked = true;
        Ok(())
    }

    async fn upload_files(&self, element: &ElementHandle, files: &[PathBuf]) -> Result<()> {
        let mut state = self.state();
        let e = &mut state.elements[Self::index(element)];
        if !e.is_file_input() {
            return Err(Error::Browser("element is not a file input".into()));
        }
        e.files = files.to_vec();
        Ok(())
    }

    async fn upload_via_chooser(
        &self,
        trigger: &ElementHandle,
        files: &[PathBuf],
        _timeout: Duration,
    ) -> Result<()> {
        let mut state = self.state();
        let target = state.elements[Self::index(trigger)].opens_chooser_for;
        match target {
            Some(i) => {
                state.elements[i].files = files.to_vec();
                Ok(())
            }
            None => Err(Error::Timeout("file chooser did not open".into())),
        }
    }

    async fn screenshot(&self, _full_page: bool) -> Result<Vec<u8>> {
        let mut state = self.state();
        if state.fail_screenshot {
            return Err(Error::Browser("screenshot failed".into()));
        }
        state.screenshots += 1;
        Ok(FAKE_PNG.to_vec())
    }

    async fn pdf(&self) -> Result<Vec<u8>> {
        self.state()
            .pdf
            .clone()
            .ok_or_else(|| Error::Browser("printToPDF failed".into()))
    }

    async fn close(&self) -> Result<()> {
        self.state().closed = true;
        Ok(())
    }
}

/// Hands out the same `FakePage` on every launch.
#[derive(Clone)]
pub struct FakeLauncher {
    page: FakePage,
    launches: Arc<AtomicUsize>,
    fail: bool,
}

impl FakeLauncher {
    pub fn new(state: FakeState) -> Self {
        Self {
            page: FakePage::new(state),
            launches: Arc::new(AtomicUsize::new(0)),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(FakeState::default())
        }
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.page.state()
    }

    pub fn page(&self) -> FakePage {
        self.page.clone()
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, _work_dir: &Path) -> Result<Box<dyn Page>> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Browser("no browser binary found".into()));
        }
        Ok(Box::new(self.page.clone()))
    }
}

/// Replies with a canned completion and records what it was sent.
pub struct FakeProvider {
    reply: std::result::Result<String, String>,
    delay: Duration,
    calls: AtomicUsize,
    last_messages: Mutex<Vec<ChatMessage>>,
}

impl FakeProvider {
    pub fn replying(content: &str) -> Self {
        Self {
            reply: Ok(content.to_string()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            last_messages: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: &str) -> Self {
        Self {
            reply: Err(error.to_string()),
            ..Self::replying("")
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_messages(&self) -> Vec<ChatMessage> {
        self.last_messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for FakeProvider {
    async fn chat(&self, messages: &[ChatMessage]) -> Result<LLMResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_messages.lock().unwrap() = messages.to_vec();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.reply {
            Ok(content) => Ok(LLMResponse {
                content: Some(content.clone()),
                finish_reason: "stop".into(),
                ..Default::default()
            }),
            Err(e) => Err(Error::Provider(e.clone())),
        }
    }
}

/// Serve `body` at `path` with `status` and `content_type`; returns the
/// full URL.
pub async fn serve(path: &str, status: u16, content_type: &'static str, body: Vec<u8>) -> String {
    use axum::http::{header, StatusCode};
    use axum::routing::get;

    let code = StatusCode::from_u16(status).unwrap();
    let app = axum::Router::new().route(
        path,
        get(move || {
            let body = body.clone();
            async move { (code, [(header::CONTENT_TYPE, content_type)], body) }
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{}{}", addr, path)
}

/// A one-page PDF with each line drawn in Helvetica.
pub fn minimal_pdf(lines: &[&str]) -> Vec<u8> {
    let escape = |s: &str| {
        s.replace('\\', "\\\\")
            .replace('(', "\\(")
            .replace(')', "\\)")
    };
    let mut content = String::from("BT /F1 12 Tf 72 720 Td 14 TL\n");
    for (i, line) in lines.iter().enumerate() {
        if i > 0 {
            content.push_str("T*\n");
        }
        content.push_str(&format!("({}) Tj\n", escape(line)));
    }
    content.push_str("ET");

    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
         /Resources << /Font << /F1 5 0 R >> >> >>"
            .to_string(),
        format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            content.len(),
            content
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_string(),
    ];

    let mut out = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, body));
    }
    let xref_at = out.len();
    out.push_str(&format!("xref\n0 {}\n", objects.len() + 1));
    out.push_str("0000000000 65535 f \n");
    for offset in offsets {
        out.push_str(&format!("{:010} 00000 n \n", offset));
    }
    out.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_at
    ));
    out.into_bytes()
}
