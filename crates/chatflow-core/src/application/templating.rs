//! URL templating against session variable bindings
//!
//! API node URLs may embed `{{variableName}}` placeholders. Every
//! placeholder must resolve to a stored binding; a missing binding aborts
//! the call rather than producing a partially-templated URL.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::session::SessionStore;
use crate::EngineError;

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.-]+)\s*\}\}").expect("valid placeholder pattern"));

/// Placeholder names embedded in a template, in order of appearance
pub fn placeholders(template: &str) -> Vec<String> {
    PLACEHOLDER_RE
        .captures_iter(template)
        .map(|c| c[1].to_string())
        .collect()
}

/// Substitute every `{{name}}` placeholder from the session's variable
/// bindings. Fails with [`EngineError::MissingTemplateVariable`] on the
/// first unresolvable placeholder.
pub async fn render_url(template: &str, session: &SessionStore<'_>) -> Result<String, EngineError> {
    let mut rendered = template.to_string();

    for name in placeholders(template) {
        let value = session
            .variable(&name)
            .await
            .ok_or_else(|| EngineError::MissingTemplateVariable(name.clone()))?;

        // Re-run the pattern per variable so repeated placeholders with
        // differing inner whitespace all resolve.
        rendered = PLACEHOLDER_RE
            .replace_all(&rendered, |caps: &regex::Captures<'_>| {
                if &caps[1] == name.as_str() {
                    value.clone()
                } else {
                    caps[0].to_string()
                }
            })
            .into_owned();
    }

    Ok(rendered)
}

/// Substitute the sender-identity placeholder in a smart-action template.
/// Unlike [`render_url`] this never touches session state.
pub fn render_sender(template: &str, sender: &str) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &regex::Captures<'_>| {
            if &caps[1] == "sender" {
                sender.to_string()
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(
            placeholders("https://api.example.com/{{city}}/forecast?u={{ units }}"),
            vec!["city".to_string(), "units".to_string()]
        );
        assert!(placeholders("https://api.example.com/static").is_empty());
    }

    #[test]
    fn test_render_sender() {
        assert_eq!(
            render_sender("https://api.example.com/media/{{sender}}", "+5511999"),
            "https://api.example.com/media/+5511999"
        );
        // Unknown placeholders are left for the caller's own resolution
        assert_eq!(
            render_sender("https://api.example.com/{{other}}", "+5511999"),
            "https://api.example.com/{{other}}"
        );
    }
}
