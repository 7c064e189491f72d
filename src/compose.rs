//! Conversation composition helpers used before and after a completion:
//! extra context messages, reply templating, and request-level policies.

use std::collections::HashMap;

use crate::error::{RelayError, Result};
use crate::types::{GenerationConfig, Message};

pub const DEFAULT_MAX_RAG_CHARS: usize = 20_000;
const RAG_PREFIX: &str = "Additional knowledge base context:\n";
const TRUNCATION_MARKER: &str = "\n... (truncated)";
const INSTRUCTIONS_PREFIX: &str = "Special instructions for this response: ";

/// Wrap external reference text as a trailing system message, capped at
/// `max_chars` characters.
pub fn rag_context(text: &str, max_chars: usize) -> Option<Message> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let body = match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    };
    Some(Message::system(format!("{}{}", RAG_PREFIX, body)))
}

/// Per-request instructions from the person asking, as a system message.
pub fn special_instructions(text: &str) -> Option<Message> {
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(Message::system(format!("{}{}", INSTRUCTIONS_PREFIX, text)))
    }
}

/// Expand `{name}` placeholders in a single left-to-right pass.
///
/// `{ai_text}` is always bound to `ai_text`. Unknown placeholders are left
/// as written and substituted values are never expanded again.
pub fn expand_template(template: &str, ai_text: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len() + ai_text.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let name = &after[..close];

        // A nested `{` means this brace was literal text.
        if name.contains('{') {
            out.push('{');
            rest = after;
            continue;
        }

        match lookup(name, ai_text, vars) {
            Some(value) => out.push_str(value),
            None => {
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

/// The final reply as sent to the user: `text` unchanged when `template` is
/// blank, otherwise the expanded template.
pub fn render_reply(template: &str, text: &str, vars: &HashMap<String, String>) -> String {
    let template = template.trim();
    if template.is_empty() {
        text.to_string()
    } else {
        expand_template(template, text, vars)
    }
}

fn lookup<'a>(name: &str, ai_text: &'a str, vars: &'a HashMap<String, String>) -> Option<&'a str> {
    if name == "ai_text" {
        Some(ai_text)
    } else {
        vars.get(name).map(String::as_str)
    }
}

/// Reject settings the target is known to refuse, before any network call.
pub fn validate_generation(config: &GenerationConfig) -> Result<()> {
    if config.model.trim().is_empty() {
        return Err(RelayError::config("Missing model"));
    }
    if config.model.to_ascii_lowercase().contains("gpt-5-nano")
        && (config.temperature - 1.0).abs() > f64::EPSILON
    {
        return Err(RelayError::config("This model only supports temperature=1."));
    }
    Ok(())
}

/// Treat an empty reply as a failure.
pub fn require_text(text: String) -> Result<String> {
    if text.trim().is_empty() {
        Err(RelayError::EmptyResponse)
    } else {
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MessageContent, Role};

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_rag_context() {
        let msg = rag_context("  the manual  ", 100).unwrap();
        assert_eq!(msg.role, Role::System);
        assert_eq!(
            msg.content,
            MessageContent::Text("Additional knowledge base context:\nthe manual".into())
        );
        assert!(rag_context("   ", 100).is_none());
    }

    #[test]
    fn test_rag_context_truncates_on_char_boundary() {
        let msg = rag_context("ééééé", 3).unwrap();
        assert_eq!(
            msg.content.as_text(),
            "Additional knowledge base context:\nééé\n... (truncated)"
        );
        let exact = rag_context("abc", 3).unwrap();
        assert_eq!(exact.content.as_text(), "Additional knowledge base context:\nabc");
    }

    #[test]
    fn test_special_instructions() {
        let msg = special_instructions(" reply in French ").unwrap();
        assert_eq!(
            msg.content.as_text(),
            "Special instructions for this response: reply in French"
        );
        assert!(special_instructions("").is_none());
    }

    #[test]
    fn test_expand_template() {
        let v = vars(&[("user_name", "Ada"), ("agent_name", "Bob")]);
        assert_eq!(
            expand_template("Hi {user_name},\n\n{ai_text}\n\n-- {agent_name}", "Fixed.", &v),
            "Hi Ada,\n\nFixed.\n\n-- Bob"
        );
    }

    #[test]
    fn test_expand_template_edge_cases() {
        let v = vars(&[("a", "{ai_text}")]);
        // Substituted values are not re-expanded.
        assert_eq!(expand_template("{a}", "X", &v), "{ai_text}");
        // Unknown placeholders and stray braces stay literal.
        assert_eq!(expand_template("{nope} {ai_text}", "X", &v), "{nope} X");
        assert_eq!(expand_template("{ {ai_text}", "X", &v), "{ X");
        assert_eq!(expand_template("open { only", "X", &v), "open { only");
        assert_eq!(expand_template("", "X", &v), "");
    }

    #[test]
    fn test_render_reply() {
        let v = vars(&[("ticket_number", "42")]);
        assert_eq!(render_reply("  ", "raw", &v), "raw");
        assert_eq!(
            render_reply("#{ticket_number}: {ai_text}\n", "Done.", &v),
            "#42: Done."
        );
    }

    #[test]
    fn test_validate_generation() {
        assert!(validate_generation(&GenerationConfig::new("gpt-5-nano")).is_ok());
        assert!(validate_generation(&GenerationConfig::new("GPT-5-nano-2025").with_temperature(0.2)).is_err());
        assert!(validate_generation(&GenerationConfig::new("gpt-4o").with_temperature(0.2)).is_ok());
        assert!(validate_generation(&GenerationConfig::new(" ")).is_err());
    }

    #[test]
    fn test_require_text() {
        assert_eq!(require_text("ok".into()).unwrap(), "ok");
        assert!(matches!(require_text(" \n".into()), Err(RelayError::EmptyResponse)));
    }
}
