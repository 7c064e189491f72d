//! Outbound HTTP request description and endpoint URL normalization.

use reqwest::Url;
use serde_json::Value;

/// A fully built provider request: where to POST, which headers, which body.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl ProviderRequest {
    pub fn new(url: String, body: Value) -> Self {
        Self {
            url,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body,
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Path component of the endpoint, used in error messages.
    pub fn endpoint_path(&self) -> String {
        endpoint_path(&self.url)
    }
}

pub fn endpoint_path(url: &str) -> String {
    Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_default()
}

fn trimmed(base_url: &str) -> &str {
    base_url.trim().trim_end_matches('/')
}

/// Append `/chat/completions` unless the URL already names a chat endpoint.
pub fn chat_completions_url(base_url: &str) -> String {
    let url = trimmed(base_url);
    if url.ends_with("/chat/completions") || url.ends_with("/chat/complete") {
        url.to_string()
    } else {
        format!("{}/chat/completions", url)
    }
}

/// Append `/responses` unless already present.
pub fn responses_url(base_url: &str) -> String {
    let url = trimmed(base_url);
    if url.ends_with("/responses") {
        url.to_string()
    } else {
        format!("{}/responses", url)
    }
}

/// Normalize to a Messages endpoint:
/// `/v1/messages` or `/messages` stay, `/v1` gains `/messages`,
/// anything else gains `/v1/messages`.
pub fn anthropic_messages_url(base_url: &str) -> String {
    let url = trimmed(base_url);
    if url.ends_with("/v1/messages") || url.ends_with("/messages") {
        url.to_string()
    } else if url.ends_with("/v1") {
        format!("{}/messages", url)
    } else {
        format!("{}/v1/messages", url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_completions_url() {
        assert_eq!(
            chat_completions_url("https://api.openai.com/v1"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            chat_completions_url("https://api.openai.com/v1/"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            chat_completions_url("https://host/v1/chat/completions"),
            "https://host/v1/chat/completions"
        );
        assert_eq!(
            chat_completions_url("https://host/api/chat/complete"),
            "https://host/api/chat/complete"
        );
    }

    #[test]
    fn test_responses_url() {
        assert_eq!(
            responses_url("https://api.openai.com/v1"),
            "https://api.openai.com/v1/responses"
        );
        assert_eq!(
            responses_url("https://api.openai.com/v1/responses"),
            "https://api.openai.com/v1/responses"
        );
    }

    #[test]
    fn test_anthropic_messages_url() {
        assert_eq!(
            anthropic_messages_url("https://api.anthropic.com"),
            "https://api.anthropic.com/v1/messages"
        );
        assert_eq!(
            anthropic_messages_url("https://api.anthropic.com/v1"),
            "https://api.anthropic.com/v1/messages"
        );
        assert_eq!(
            anthropic_messages_url("https://api.anthropic.com/v1/"),
            "https://api.anthropic.com/v1/messages"
        );
        assert_eq!(
            anthropic_messages_url("https://api.anthropic.com/v1/messages"),
            "https://api.anthropic.com/v1/messages"
        );
        assert_eq!(
            anthropic_messages_url("https://gateway/claude/messages"),
            "https://gateway/claude/messages"
        );
    }

    #[test]
    fn test_endpoint_path() {
        assert_eq!(
            endpoint_path("https://api.anthropic.com/v1/messages"),
            "/v1/messages"
        );
        assert_eq!(endpoint_path("not a url"), "");
    }

    #[test]
    fn test_headers() {
        let req = ProviderRequest::new("https://h/x".into(), json!({}))
            .header("x-api-key", "k");
        assert_eq!(req.header_value("content-type"), Some("application/json"));
        assert_eq!(req.header_value("X-API-KEY"), Some("k"));
        assert_eq!(req.header_value("authorization"), None);
    }
}
