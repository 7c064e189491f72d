//! Wire protocol detection from the endpoint URL and model name.

use crate::types::{Provider, ProviderKind};

/// Decide which wire protocol a base URL / model pair implies.
///
/// First match wins:
/// 1. URL mentions `anthropic.com`
/// 2. model name starts with `claude`
/// 3. URL ends with `/v1/messages`
/// 4. otherwise OpenAI-style
pub fn detect(base_url: &str, model: &str) -> Provider {
    let url = base_url.trim().trim_end_matches('/').to_ascii_lowercase();
    let model = model.trim().to_ascii_lowercase();

    if url.contains("anthropic.com") {
        return Provider::Anthropic;
    }
    if model.starts_with("claude") {
        return Provider::Anthropic;
    }
    if url.ends_with("/v1/messages") {
        return Provider::Anthropic;
    }
    Provider::OpenAi
}

impl ProviderKind {
    /// Resolve an explicit or `Auto` provider to a concrete protocol.
    pub fn resolve(self, base_url: &str, model: &str) -> Provider {
        match self {
            ProviderKind::OpenAi => Provider::OpenAi,
            ProviderKind::Anthropic => Provider::Anthropic,
            ProviderKind::Auto => detect(base_url, model),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_wins() {
        assert_eq!(
            detect("https://api.anthropic.com/v1/messages", "gpt-4"),
            Provider::Anthropic
        );
        assert_eq!(
            detect("https://API.Anthropic.com", "llama3"),
            Provider::Anthropic
        );
    }

    #[test]
    fn test_model_prefix() {
        assert_eq!(
            detect("https://my-llm.local/v1", "claude-3-opus"),
            Provider::Anthropic
        );
        assert_eq!(
            detect("https://my-llm.local/v1", "Claude-Sonnet"),
            Provider::Anthropic
        );
        // Only a prefix counts.
        assert_eq!(
            detect("https://my-llm.local/v1", "not-claude"),
            Provider::OpenAi
        );
    }

    #[test]
    fn test_messages_path() {
        assert_eq!(
            detect("https://proxy.internal/v1/messages", "mystery"),
            Provider::Anthropic
        );
        assert_eq!(
            detect("https://proxy.internal/v1/messages/", "mystery"),
            Provider::Anthropic
        );
    }

    #[test]
    fn test_default_openai() {
        assert_eq!(detect("https://my-llm.local/v1", "gpt-4o"), Provider::OpenAi);
        assert_eq!(detect("", ""), Provider::OpenAi);
    }

    #[test]
    fn test_deterministic() {
        let cases = [
            ("https://api.openai.com/v1", "gpt-4o"),
            ("https://api.anthropic.com", "claude-3-haiku"),
            ("http://localhost:11434/v1", "qwen"),
        ];
        for (url, model) in cases {
            assert_eq!(detect(url, model), detect(url, model));
        }
    }

    #[test]
    fn test_explicit_kind_overrides_detection() {
        assert_eq!(
            ProviderKind::OpenAi.resolve("https://api.anthropic.com", "claude-3"),
            Provider::OpenAi
        );
        assert_eq!(
            ProviderKind::Anthropic.resolve("https://my-llm.local/v1", "gpt-4o"),
            Provider::Anthropic
        );
        assert_eq!(
            ProviderKind::Auto.resolve("https://my-llm.local/v1", "claude-3"),
            Provider::Anthropic
        );
    }
}
