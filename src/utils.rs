use std::collections::HashMap;

use tracing::{debug, warn};

use crate::{
    error::TemplateError,
    models::template::{Template, TemplateContent},
};

/// Renders every part of `template` against `variables`.
pub fn render_template(
    template: &Template,
    variables: &HashMap<&str, String>,
) -> Result<TemplateContent, TemplateError> {
    debug!(
        template_id = %template.id,
        variable_count = variables.len(),
        "Rendering template"
    );

    Ok(TemplateContent {
        subject: render(&template.subject, variables)?,
        text: render(&template.text, variables)?,
        html: render(&template.html, variables)?,
    })
}

/// Replaces `{{name}}` placeholders in one pass.
///
/// Substituted values are never re-scanned, so a value containing `{{...}}` is
/// emitted verbatim. An unterminated `{{` is kept as literal text. A placeholder
/// with no matching variable is an error.
pub fn render(template: &str, variables: &HashMap<&str, String>) -> Result<String, TemplateError> {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };

        output.push_str(&rest[..start]);

        let name = rest[start + 2..start + 2 + len].trim();
        match variables.get(name) {
            Some(value) => output.push_str(value),
            None => {
                warn!(missing_variable = name, "Template contains unknown variable");
                return Err(TemplateError::Render(format!(
                    "Missing variable in template: {{{{{name}}}}}"
                )));
            }
        }

        rest = &rest[start + 2 + len + 2..];
    }

    output.push_str(rest);
    Ok(output)
}
