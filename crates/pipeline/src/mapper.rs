//! Asks the generation service for one value per scraped field.

use formpilot_core::types::ChatMessage;
use formpilot_core::{
    Error, FieldValue, FieldValueMap, FormFieldDescriptor, Result, ResumeProfile, FILE_SENTINEL,
};
use formpilot_providers::Provider;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::prompts::{FIELD_MAPPING_SYSTEM, FIELD_MAPPING_USER};

pub struct FieldMapper {
    provider: Arc<dyn Provider>,
    timeout: Duration,
}

impl FieldMapper {
    pub fn new(provider: Arc<dyn Provider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Produce a value for each field. Keys come from the service's answer;
    /// unknown keys are kept and simply never match an element.
    pub async fn map(
        &self,
        fields: &[FormFieldDescriptor],
        profile: &ResumeProfile,
    ) -> Result<FieldValueMap> {
        if fields.is_empty() {
            info!("No form fields found, skipping value generation");
            return Ok(FieldValueMap::new());
        }

        let messages = build_messages(fields, profile)?;
        let response = tokio::time::timeout(self.timeout, self.provider.chat(&messages))
            .await
            .map_err(|_| {
                Error::AiProcessing(format!(
                    "no answer within {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| Error::AiProcessing(e.to_string()))?;

        let content = response
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| Error::AiProcessing("empty response".to_string()))?;
        debug!(chars = content.len(), finish_reason = %response.finish_reason, "Received field values");

        let values = parse_value_map(&content, fields)?;
        let missing = fields
            .iter()
            .filter(|f| values.get(f.key()).is_none())
            .count();
        if missing > 0 {
            warn!(missing, "Some fields received no value");
        }
        info!(values = values.len(), "Mapped form values");
        Ok(values)
    }
}

pub fn build_messages(
    fields: &[FormFieldDescriptor],
    profile: &ResumeProfile,
) -> Result<Vec<ChatMessage>> {
    let user = FIELD_MAPPING_USER
        .replace("{profile_json}", &serde_json::to_string_pretty(profile)?)
        .replace("{fields_json}", &serde_json::to_string_pretty(fields)?);
    Ok(vec![
        ChatMessage::system(FIELD_MAPPING_SYSTEM),
        ChatMessage::user(&user),
    ])
}

/// The span from the first `{` to the last `}`, tolerating prose or
/// markdown fences around the object.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn coerce(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items.iter().map(coerce).collect::<Vec<_>>().join(", "),
        Value::Object(_) => value.to_string(),
    }
}

/// Turn the service's reply into typed values. File fields, and any value
/// spelled like the attachment sentinel, become `FileAttachment`.
pub fn parse_value_map(raw: &str, fields: &[FormFieldDescriptor]) -> Result<FieldValueMap> {
    let json = extract_json_object(raw)
        .ok_or_else(|| Error::AiProcessing("response contains no JSON object".to_string()))?;
    let parsed: serde_json::Map<String, Value> = serde_json::from_str(json)
        .map_err(|e| Error::AiProcessing(format!("malformed JSON in response: {}", e)))?;

    let file_keys: HashSet<&str> = fields
        .iter()
        .filter(|f| f.is_file())
        .map(|f| f.key())
        .collect();

    let mut values = FieldValueMap::new();
    for (key, raw_value) in &parsed {
        let text = coerce(raw_value);
        let value = if text.trim().eq_ignore_ascii_case(FILE_SENTINEL)
            || (file_keys.contains(key.as_str()) && !text.trim().is_empty())
        {
            FieldValue::FileAttachment
        } else {
            FieldValue::Text(text)
        };
        values.insert(key.clone(), value);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeProvider;

    fn field(id: &str, control_type: &str) -> FormFieldDescriptor {
        FormFieldDescriptor {
            id: id.to_string(),
            control_type: control_type.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_extract_json_object_strips_fences() {
        let raw = "Sure!\n```json\n{\"a\": \"b\"}\n```\n";
        assert_eq!(extract_json_object(raw), Some("{\"a\": \"b\"}"));
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("} backwards {"), None);
    }

    #[test]
    fn test_values_are_coerced_to_strings() {
        let raw = r#"{"years": 7, "remote": true, "skills": ["Go", "Rust"], "fax": null}"#;
        let map = parse_value_map(raw, &[]).unwrap();
        assert_eq!(map.get("years"), Some(&FieldValue::Text("7".into())));
        assert_eq!(map.get("remote"), Some(&FieldValue::Text("true".into())));
        assert_eq!(map.get("skills"), Some(&FieldValue::Text("Go, Rust".into())));
        assert_eq!(map.get("fax"), Some(&FieldValue::Text(String::new())));
    }

    #[test]
    fn test_sentinel_and_file_fields_become_attachments() {
        let fields = vec![field("cv", "file"), field("name", "text")];
        let raw = r#"{"cv": "my_cv.pdf", "name": "Jane", "other": " Resume.PDF "}"#;
        let map = parse_value_map(raw, &fields).unwrap();
        assert_eq!(map.get("cv"), Some(&FieldValue::FileAttachment));
        assert_eq!(map.get("other"), Some(&FieldValue::FileAttachment));
        assert_eq!(map.get("name"), Some(&FieldValue::Text("Jane".into())));
    }

    #[test]
    fn test_key_order_follows_response() {
        let raw = r#"{"zeta": "1", "alpha": "2", "mid": "3"}"#;
        let map = parse_value_map(raw, &[]).unwrap();
        let keys: Vec<&str> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_malformed_json_is_an_ai_error() {
        let err = parse_value_map("{\"a\": }", &[]).unwrap_err();
        assert_eq!(err.kind(), "ai_processing");
        let err = parse_value_map("I cannot help with that.", &[]).unwrap_err();
        assert_eq!(err.kind(), "ai_processing");
    }

    #[tokio::test]
    async fn test_map_sends_profile_and_fields() {
        let provider = Arc::new(FakeProvider::replying(r#"{"skills": "Go, Rust, C++"}"#));
        let mapper = FieldMapper::new(provider.clone(), Duration::from_secs(5));
        let profile = ResumeProfile {
            skills: vec!["Go".into(), "Rust".into(), "C++".into()],
            ..Default::default()
        };
        let map = mapper.map(&[field("skills", "text")], &profile).await.unwrap();
        assert_eq!(map.get("skills"), Some(&FieldValue::Text("Go, Rust, C++".into())));

        let messages = provider.last_messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert!(messages[1].content.contains("\"C++\""));
        assert!(messages[1].content.contains("\"id\": \"skills\""));
    }

    #[tokio::test]
    async fn test_map_without_fields_skips_the_service() {
        let provider = Arc::new(FakeProvider::replying("{}"));
        let mapper = FieldMapper::new(provider.clone(), Duration::from_secs(5));
        let map = mapper.map(&[], &ResumeProfile::default()).await.unwrap();
        assert!(map.is_empty());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_map_times_out() {
        let provider =
            Arc::new(FakeProvider::replying("{}").with_delay(Duration::from_secs(5)));
        let mapper = FieldMapper::new(provider, Duration::from_millis(20));
        let err = mapper
            .map(&[field("a", "text")], &ResumeProfile::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ai_processing");
    }

    #[tokio::test]
    async fn test_provider_errors_become_ai_errors() {
        let mapper = FieldMapper::new(
            Arc::new(FakeProvider::failing("API error (401)")),
            Duration::from_secs(5),
        );
        let err = mapper
            .map(&[field("a", "text")], &ResumeProfile::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ai_processing");
        assert!(err.to_string().contains("401"));
    }
}
