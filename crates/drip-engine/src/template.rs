use std::collections::BTreeMap;

use drip_contract::{scan_placeholders, MessageTemplate};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateRenderError {
    /// The lead has no binding for a placeholder; a permanent failure for
    /// this (lead, template) pair since retrying cannot fill the value.
    #[error("template '{template_id}' variable '{name}' has no binding")]
    MissingVariable { template_id: String, name: String },
    #[error("template '{template_id}' is malformed: {detail}")]
    Malformed { template_id: String, detail: String },
}

/// Substitutes `{{variable}}` placeholders with lead bindings.
pub fn render_template(
    template: &MessageTemplate,
    bindings: &BTreeMap<String, String>,
) -> Result<String, TemplateRenderError> {
    let placeholders =
        scan_placeholders(&template.content).map_err(|error| TemplateRenderError::Malformed {
            template_id: template.template_id.clone(),
            detail: error.to_string(),
        })?;

    let mut rendered = String::with_capacity(template.content.len());
    let mut cursor = 0usize;
    for placeholder in placeholders {
        let value =
            bindings
                .get(&placeholder.name)
                .ok_or_else(|| TemplateRenderError::MissingVariable {
                    template_id: template.template_id.clone(),
                    name: placeholder.name.clone(),
                })?;
        rendered.push_str(&template.content[cursor..placeholder.start]);
        rendered.push_str(value);
        cursor = placeholder.end;
    }
    rendered.push_str(&template.content[cursor..]);
    Ok(rendered)
}
