//! Form field discovery on the loaded job page.

use formpilot_browser::Page;
use formpilot_core::{Error, FormFieldDescriptor, Result};
use serde_json::Value;
use tracing::{debug, info};

/// Collects one descriptor per control inside a `<form>`, skipping hidden,
/// submit and button inputs. Labels come from `label[for]`, then an
/// enclosing label, then `aria-label`, then `title`. Select options keep
/// only non-empty texts and are omitted when none remain.
pub const SCRAPE_SCRIPT: &str = r#"(() => {
  const out = [];
  const controls = document.querySelectorAll('form input, form select, form textarea');
  for (const el of controls) {
    const tag = el.tagName.toLowerCase();
    const type = tag === 'input' ? (el.getAttribute('type') || 'text').toLowerCase() : tag;
    if (type === 'hidden' || type === 'submit' || type === 'button') continue;
    let label = '';
    if (el.id) {
      const forLabel = document.querySelector('label[for="' + CSS.escape(el.id) + '"]');
      if (forLabel) label = forLabel.textContent || '';
    }
    if (!label) {
      const wrap = el.closest('label');
      if (wrap) label = wrap.textContent || '';
    }
    if (!label) label = el.getAttribute('aria-label') || el.getAttribute('title') || '';
    const field = {
      id: el.id || '',
      name: el.getAttribute('name') || '',
      type: type,
      label: label.replace(/\s+/g, ' ').trim(),
      placeholder: el.getAttribute('placeholder') || '',
      required: !!el.required,
    };
    if (tag === 'select') {
      const options = Array.from(el.options)
        .map((o) => (o.textContent || '').trim())
        .filter((t) => t.length > 0);
      if (options.length > 0) field.options = options;
    }
    out.push(field);
  }
  return out;
})()"#;

/// Enumerate the fillable controls on `page`, in document order.
pub async fn scrape_form_fields(page: &dyn Page) -> Result<Vec<FormFieldDescriptor>> {
    let value = page.evaluate(SCRAPE_SCRIPT).await?;
    let fields: Vec<FormFieldDescriptor> = match value {
        Value::Null => Vec::new(),
        Value::Array(_) => serde_json::from_value(value)?,
        other => {
            return Err(Error::Browser(format!(
                "form scrape returned {} instead of an array",
                type_name(&other)
            )))
        }
    };
    for f in &fields {
        debug!(key = %f.key(), control = %f.control_type, required = f.required, "Found field");
    }
    info!(count = fields.len(), "Scraped form fields");
    Ok(fields)
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
