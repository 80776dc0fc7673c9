//! Structured element-finding strategies.
//!
//! The pipeline describes *what* it is looking for; each `Page` backend
//! decides how to find it. `CdpPage` renders a locator to a JavaScript
//! expression that returns an array of elements.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileInputHint {
    /// id or name contains "resume".
    Resume,
    /// id or name contains "file".
    File,
    /// Any file input without the `hidden` attribute.
    AnyVisible,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Exact `id`, `name` or `data-id` match.
    ExactKey(String),
    /// Case-insensitive substring of an input/textarea placeholder.
    PlaceholderContains(String),
    /// Case-insensitive substring of `aria-label` or `title`.
    AriaContains(String),
    /// Any input/textarea/select, skipping hidden, submit, button and
    /// file inputs. Callers track which ones they already used.
    FormControl,
    FileInput(FileInputHint),
    /// Elements of `tag` whose text contains any of `texts`.
    TagWithText { tag: String, texts: Vec<String> },
    /// Elements carrying any of the given classes.
    AnyClass(Vec<String>),
}

impl Locator {
    /// CSS selector for locators CSS can express.
    pub fn to_css(&self) -> Option<String> {
        match self {
            Self::ExactKey(key) => {
                let k = css_string(key);
                Some(format!("[id={k}], [name={k}], [data-id={k}]"))
            }
            Self::PlaceholderContains(text) => {
                let t = css_string(text);
                Some(format!("input[placeholder*={t} i], textarea[placeholder*={t} i]"))
            }
            Self::AriaContains(text) => {
                let t = css_string(text);
                Some(format!("[aria-label*={t} i], [title*={t} i]"))
            }
            Self::FormControl => Some(
                "input:not([type=hidden]):not([type=submit]):not([type=button]):not([type=file]), \
                 textarea, select"
                    .to_string(),
            ),
            Self::FileInput(FileInputHint::Resume) => Some(
                "input[type=file][id*=\"resume\" i], input[type=file][name*=\"resume\" i]".to_string(),
            ),
            Self::FileInput(FileInputHint::File) => Some(
                "input[type=file][id*=\"file\" i], input[type=file][name*=\"file\" i]".to_string(),
            ),
            Self::FileInput(FileInputHint::AnyVisible) => {
                Some("input[type=file]:not([hidden])".to_string())
            }
            Self::AnyClass(classes) => {
                let parts: Vec<String> = classes
                    .iter()
                    .filter(|c| is_css_ident(c))
                    .map(|c| format!(".{}", c))
                    .collect();
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join(", "))
                }
            }
            Self::TagWithText { .. } => None,
        }
    }

    /// JavaScript expression evaluating to an array of matching elements.
    pub fn to_js(&self) -> String {
        match self {
            Self::TagWithText { tag, texts } => {
                let tag = serde_json::Value::String(tag.clone());
                let texts = serde_json::Value::Array(
                    texts.iter().cloned().map(serde_json::Value::String).collect(),
                );
                format!(
                    "Array.from(document.querySelectorAll({tag})).filter((el) => {{ \
                     const t = el.textContent || ''; return {texts}.some((s) => t.includes(s)); }})"
                )
            }
            other => match other.to_css() {
                Some(css) => format!(
                    "Array.from(document.querySelectorAll({}))",
                    serde_json::Value::String(css)
                ),
                None => "[]".to_string(),
            },
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::ExactKey(k) => format!("exact key '{}'", k),
            Self::PlaceholderContains(t) => format!("placeholder ~ '{}'", t),
            Self::AriaContains(t) => format!("aria/title ~ '{}'", t),
            Self::FormControl => "any form control".to_string(),
            Self::FileInput(hint) => format!("file input ({:?})", hint),
            Self::TagWithText { tag, texts } => format!("<{}> with text {:?}", tag, texts),
            Self::AnyClass(classes) => format!("class in {:?}", classes),
        }
    }
}

/// Quote `raw` as a CSS string literal.
fn css_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    for ch in raw.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\a "),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

fn is_css_ident(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        && !s.starts_with(|c: char| c.is_ascii_digit())
}
