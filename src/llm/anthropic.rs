//! Anthropic (Claude) wire protocol.
//!
//! Key differences from OpenAI:
//! - **Messages API**: `POST <base>/v1/messages`
//! - **Headers**: `x-api-key` instead of a bearer token, plus a mandatory
//!   `anthropic-version`
//! - **System prompt** is a top-level `system` field, not a message
//! - **Token limit** is always `max_tokens`, whatever the configured name
//! - **Streaming** text arrives in `content_block_delta` events
//! - **Response** content is an array of typed content blocks

use serde::Serialize;
use serde_json::Value;

use super::content::{self, TargetShape, WireTurn};
use super::request::{anthropic_messages_url, ProviderRequest};
use super::stream::DeltaDecoder;
use super::WireProtocol;
use crate::error::Result;
use crate::types::{GenerationConfig, Message, Provider};

#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicProtocol;

// --- API Request Types ---

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<WireTurn>,
    temperature: f64,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

impl WireProtocol for AnthropicProtocol {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    fn name(&self) -> &str {
        "Anthropic"
    }

    fn build_request(
        &self,
        base_url: &str,
        api_key: Option<&str>,
        messages: &[Message],
        config: &GenerationConfig,
        stream: bool,
    ) -> Result<ProviderRequest> {
        let translation = content::translate(messages, TargetShape::Anthropic);

        let api_request = ApiRequest {
            model: &config.model,
            messages: translation.turns,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            system: Some(translation.system).filter(|s| !s.is_empty()),
            stream,
        };
        let body = serde_json::to_value(&api_request)?;

        let mut request = ProviderRequest::new(anthropic_messages_url(base_url), body)
            .header("anthropic-version", config.anthropic_version.clone());
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            request = request.header("x-api-key", key);
        }
        Ok(request)
    }

    /// Text blocks joined by newlines; a bare string `content` is accepted too.
    fn extract_text(&self, body: &Value, _raw: &str) -> String {
        match body.get("content") {
            Some(Value::Array(blocks)) => blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string(),
            Some(Value::String(text)) => text.trim().to_string(),
            _ => String::new(),
        }
    }
}

impl DeltaDecoder for AnthropicProtocol {
    fn decode_delta(&self, _event: Option<&str>, payload: &Value) -> Option<String> {
        if payload.get("type").and_then(Value::as_str) != Some("content_block_delta") {
            return None;
        }
        payload
            .get("delta")
            .and_then(|d| d.get("text"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}
