use std::collections::HashSet;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// A message template with `{{variable}}` placeholders.
pub struct MessageTemplate {
    pub template_id: String,
    pub name: String,
    pub content: String,
    /// Variables the template declares; cross-checked against the
    /// placeholders actually present in `content`.
    #[serde(default)]
    pub variables: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One `{{name}}` occurrence located in template content.
pub struct Placeholder {
    pub name: String,
    /// Byte offset of the opening `{{`.
    pub start: usize,
    /// Byte offset one past the closing `}}`.
    pub end: usize,
}

/// Scans template content for `{{name}}` placeholders.
///
/// Names are trimmed, so `{{ first_name }}` and `{{first_name}}` are the
/// same variable. An opening marker without its closing marker, or an empty
/// name, is a malformed template.
pub fn scan_placeholders(content: &str) -> Result<Vec<Placeholder>> {
    let mut placeholders = Vec::new();
    let mut cursor = 0usize;
    while let Some(open_offset) = content[cursor..].find("{{") {
        let start = cursor + open_offset;
        let name_start = start + 2;
        let Some(close_offset) = content[name_start..].find("}}") else {
            bail!(
                "unclosed placeholder at byte {} in template content",
                start
            );
        };
        let name_end = name_start + close_offset;
        let name = content[name_start..name_end].trim();
        if name.is_empty() {
            bail!("empty placeholder at byte {} in template content", start);
        }
        let end = name_end + 2;
        placeholders.push(Placeholder {
            name: name.to_string(),
            start,
            end,
        });
        cursor = end;
    }
    Ok(placeholders)
}

pub fn validate_template(template: &MessageTemplate) -> Result<()> {
    if template.template_id.trim().is_empty() {
        bail!("template_id must be non-empty");
    }
    if template.content.trim().is_empty() {
        bail!("template '{}' content must be non-empty", template.template_id);
    }

    let placeholders = scan_placeholders(&template.content)
        .map_err(|error| anyhow::anyhow!("template '{}': {error}", template.template_id))?;
    let declared: HashSet<&str> = template.variables.iter().map(String::as_str).collect();
    for placeholder in &placeholders {
        if !declared.contains(placeholder.name.as_str()) {
            bail!(
                "template '{}' uses undeclared variable '{}'",
                template.template_id,
                placeholder.name
            );
        }
    }
    Ok(())
}
