//! OpenAI-compatible wire protocol (Chat Completions and Responses API).

use serde::Serialize;
use serde_json::{json, Value};

use super::content::{self, TargetShape, WireContent, WireTurn};
use super::request::{chat_completions_url, responses_url, ProviderRequest};
use super::stream::DeltaDecoder;
use super::WireProtocol;
use crate::error::Result;
use crate::types::{GenerationConfig, Message, OpenAiApi, Provider, Role, DEFAULT_MAX_TOKENS_PARAM};

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiCompatibleProtocol {
    api: OpenAiApi,
}

// --- API Request Types (OpenAI format) ---

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireTurn>,
    temperature: f64,
}

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: Vec<WireTurn>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<String>,
}

// --- Implementation ---

impl OpenAiCompatibleProtocol {
    pub fn new(api: OpenAiApi) -> Self {
        Self { api }
    }

    fn chat_body(&self, messages: &[Message], config: &GenerationConfig) -> Result<Value> {
        let translation = content::translate(messages, TargetShape::ChatCompletions);

        let mut turns = Vec::with_capacity(translation.turns.len() + 1);
        if !translation.system.is_empty() {
            turns.push(WireTurn {
                role: Role::System,
                content: WireContent::Text(translation.system),
            });
        }
        turns.extend(translation.turns);

        let api_request = ChatRequest {
            model: &config.model,
            messages: turns,
            temperature: config.temperature,
        };
        Ok(serde_json::to_value(&api_request)?)
    }

    fn responses_body(&self, messages: &[Message], config: &GenerationConfig) -> Result<Value> {
        let translation = content::translate(messages, TargetShape::Responses);

        let api_request = ResponsesRequest {
            model: &config.model,
            input: translation.turns,
            temperature: config.temperature,
            instructions: Some(translation.system).filter(|s| !s.is_empty()),
        };
        Ok(serde_json::to_value(&api_request)?)
    }
}

impl WireProtocol for OpenAiCompatibleProtocol {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    fn name(&self) -> &str {
        match self.api {
            OpenAiApi::ChatCompletions => "OpenAI-Compatible",
            OpenAiApi::Responses => "OpenAI-Responses",
        }
    }

    fn build_request(
        &self,
        base_url: &str,
        api_key: Option<&str>,
        messages: &[Message],
        config: &GenerationConfig,
        stream: bool,
    ) -> Result<ProviderRequest> {
        let (url, mut body) = match self.api {
            OpenAiApi::ChatCompletions => {
                (chat_completions_url(base_url), self.chat_body(messages, config)?)
            }
            OpenAiApi::Responses => (responses_url(base_url), self.responses_body(messages, config)?),
        };

        let token_key = match config.max_tokens_param.trim() {
            "" => DEFAULT_MAX_TOKENS_PARAM,
            key => key,
        };
        body[token_key] = json!(config.max_tokens);
        if stream {
            body["stream"] = json!(true);
        }

        let mut request = ProviderRequest::new(url, body);
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            request = request.header("Authorization", format!("Bearer {}", key));
        }
        Ok(request)
    }

    fn extract_text(&self, body: &Value, raw: &str) -> String {
        match self.api {
            OpenAiApi::ChatCompletions => extract_chat_text(body, raw),
            OpenAiApi::Responses => extract_responses_text(body),
        }
    }
}

impl DeltaDecoder for OpenAiCompatibleProtocol {
    fn decode_delta(&self, _event: Option<&str>, payload: &Value) -> Option<String> {
        match self.api {
            OpenAiApi::ChatCompletions => payload
                .pointer("/choices/0/delta/content")
                .and_then(Value::as_str)
                .map(str::to_string),
            OpenAiApi::Responses => {
                if payload.get("type").and_then(Value::as_str) != Some("response.output_text.delta") {
                    return None;
                }
                payload.get("delta").and_then(Value::as_str).map(str::to_string)
            }
        }
    }
}

/// `choices[0].message.content`, then `choices[0].text`, then `output`,
/// then the raw body.
fn extract_chat_text(body: &Value, raw: &str) -> String {
    if let Some(content) = body.pointer("/choices/0/message/content").and_then(Value::as_str) {
        return content.to_string();
    }
    if let Some(text) = body.pointer("/choices/0/text").and_then(Value::as_str) {
        return text.to_string();
    }
    match body.get("output") {
        Some(Value::String(output)) => return output.clone(),
        Some(Value::Null) | None => {}
        Some(other) => return other.to_string(),
    }
    raw.to_string()
}

/// `output_text`, else the `output_text` parts of every `message` output item.
fn extract_responses_text(body: &Value) -> String {
    if let Some(text) = body.get("output_text").and_then(Value::as_str) {
        return text.to_string();
    }

    let Some(items) = body.get("output").and_then(Value::as_array) else {
        return String::new();
    };
    items
        .iter()
        .filter(|item| item.get("type").and_then(Value::as_str) == Some("message"))
        .filter_map(|item| item.get("content").and_then(Value::as_array))
        .flatten()
        .filter(|part| part.get("type").and_then(Value::as_str) == Some("output_text"))
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
