use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// The literal the generation service emits for file-upload fields.
pub const FILE_SENTINEL: &str = "resume.pdf";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: content.to_string(),
        }
    }

    pub fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: Option<String>,
    pub finish_reason: String,
    pub usage: serde_json::Value,
}

impl Default for LLMResponse {
    fn default() -> Self {
        Self {
            content: None,
            finish_reason: String::new(),
            usage: serde_json::Value::Null,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExperienceEntry {
    pub title: String,
    pub company: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EducationEntry {
    pub degree: String,
    pub institution: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
}

/// Best-effort structured view of a résumé. Every field may be empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResumeProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub experience: Vec<ExperienceEntry>,
    #[serde(default)]
    pub education: Vec<EducationEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl ResumeProfile {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.skills.is_empty()
            && self.experience.is_empty()
            && self.education.is_empty()
            && self.summary.is_none()
    }
}

/// Metadata for one fillable control as scraped from the live page.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormFieldDescriptor {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub control_type: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub placeholder: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

impl FormFieldDescriptor {
    /// The key the generation service is asked to use: id, else name.
    pub fn key(&self) -> &str {
        if self.id.is_empty() {
            &self.name
        } else {
            &self.id
        }
    }

    pub fn is_file(&self) -> bool {
        self.control_type.eq_ignore_ascii_case("file")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    /// Attach the acquired résumé file instead of typing text.
    FileAttachment,
}

impl FieldValue {
    pub fn as_wire_str(&self) -> &str {
        match self {
            Self::Text(s) => s,
            Self::FileAttachment => FILE_SENTINEL,
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_wire_str())
    }
}

/// Field key to value, in the order the generation service produced them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldValueMap {
    entries: Vec<(String, FieldValue)>,
}

impl FieldValueMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces. A replaced key keeps its original position.
    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
        let key = key.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for FieldValueMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Terminal record of one pipeline run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status")]
pub enum PipelineResult {
    #[serde(rename = "success", rename_all = "camelCase")]
    Success {
        form_fields: Vec<FormFieldDescriptor>,
        filled_form_data: FieldValueMap,
        screenshot_path: String,
    },
    #[serde(rename = "failed")]
    Failed { error: String },
}

impl PipelineResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}
