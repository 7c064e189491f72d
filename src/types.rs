//! Core data types used throughout chatbridge.
//!
//! This module defines the provider-agnostic conversation model
//! (messages and content blocks), the per-request generation settings,
//! and the events produced while streaming a reply.

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const DEFAULT_TEMPERATURE: f64 = 1.0;
pub const DEFAULT_MAX_TOKENS: u32 = 512;
pub const DEFAULT_MAX_TOKENS_PARAM: &str = "max_tokens";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";

// --- Message Roles ---

/// The role of a message in the conversation.
///
/// - `System`: instructions to the model; folded into a dedicated field
///   by every wire protocol rather than sent as a turn
/// - `User`: the human's input
/// - `Assistant`: a previous model reply
/// - `Tool`: a tool result; no supported protocol accepts it here, so it is
///   dropped during translation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

// --- Content Blocks ---

/// One typed unit of multimodal message content.
///
/// JSON shapes:
/// - `{"type":"text","text":"..."}`
/// - `{"type":"image","source":{"type":"base64","media_type":"image/png","data":"..."}}`
/// - `{"type":"file","filename":"a.csv","mime_type":"text/csv","data":"..."}`
///
/// Any other shape is preserved as `Other` and dropped by translation.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text {
        text: String,
    },
    /// Inline base64 image; never fetched remotely.
    Image {
        media_type: String,
        data: String,
    },
    /// Attached document with base64 payload.
    File {
        filename: String,
        mime_type: String,
        data: String,
    },
    Other(Value),
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(media_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Image {
            media_type: media_type.into(),
            data: data.into(),
        }
    }

    pub fn file(
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self::File {
            filename: filename.into(),
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Self::Text { text } => json!({ "type": "text", "text": text }),
            Self::Image { media_type, data } => json!({
                "type": "image",
                "source": { "type": "base64", "media_type": media_type, "data": data }
            }),
            Self::File {
                filename,
                mime_type,
                data,
            } => json!({
                "type": "file",
                "filename": filename,
                "mime_type": mime_type,
                "data": data
            }),
            Self::Other(raw) => raw.clone(),
        }
    }

    fn from_value(value: Value) -> Self {
        let str_field = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).map(str::to_string);

        match value.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(text) = str_field(&value, "text") {
                    return Self::Text { text };
                }
            }
            Some("image") => {
                let source = value.get("source").unwrap_or(&Value::Null);
                let media_type = str_field(source, "media_type")
                    .or_else(|| str_field(&value, "media_type"))
                    .unwrap_or_else(|| "image/jpeg".to_string());
                let data = str_field(source, "data").or_else(|| str_field(&value, "data"));
                if let Some(data) = data {
                    return Self::Image { media_type, data };
                }
            }
            Some("file") => {
                if let (Some(filename), Some(data)) =
                    (str_field(&value, "filename"), str_field(&value, "data"))
                {
                    let mime_type = str_field(&value, "mime_type")
                        .unwrap_or_else(|| "application/octet-stream".to_string());
                    return Self::File {
                        filename,
                        mime_type,
                        data,
                    };
                }
            }
            _ => {}
        }
        Self::Other(value)
    }
}

impl Serialize for ContentBlock {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ContentBlock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if !value.is_object() {
            return Err(de::Error::custom("content block must be a JSON object"));
        }
        Ok(Self::from_value(value))
    }
}

// --- Messages ---

/// Message content is either a plain string or an ordered block list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<ContentBlock>> for MessageContent {
    fn from(blocks: Vec<ContentBlock>) -> Self {
        Self::Blocks(blocks)
    }
}

impl MessageContent {
    /// Plain text view of the content: the string itself, or the text
    /// blocks joined by newlines.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A single turn in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn new(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Create a system message (sets the model's behavior/instructions).
    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

// --- Provider selection ---

/// A resolved wire protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAi => write!(f, "openai"),
            Self::Anthropic => write!(f, "anthropic"),
        }
    }
}

/// Requested provider; `Auto` is resolved once per request from the
/// base URL and model name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Auto,
    #[serde(rename = "openai")]
    OpenAi,
    Anthropic,
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Ok(Self::Auto),
            "openai" | "openai_compatible" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            other => Err(format!(
                "Unknown provider: '{}'. Supported: 'auto', 'openai', 'anthropic'",
                other
            )),
        }
    }
}

/// Which OpenAI endpoint family to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenAiApi {
    /// `/chat/completions` with a `messages` array.
    #[default]
    ChatCompletions,
    /// `/responses` with an `input` array and `instructions`.
    Responses,
}

// --- Generation settings ---

/// Request-scoped generation settings, passed explicitly on every call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Literal JSON key for the token limit on OpenAI-style endpoints.
    /// Anthropic always uses `max_tokens`.
    pub max_tokens_param: String,
    pub timeout_secs: u64,
    pub provider: ProviderKind,
    pub anthropic_version: String,
    pub openai_api: OpenAiApi,
}

impl GenerationConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            max_tokens_param: DEFAULT_MAX_TOKENS_PARAM.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            provider: ProviderKind::Auto,
            anthropic_version: DEFAULT_ANTHROPIC_VERSION.to_string(),
            openai_api: OpenAiApi::ChatCompletions,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_max_tokens_param(mut self, name: impl Into<String>) -> Self {
        self.max_tokens_param = name.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_anthropic_version(mut self, version: impl Into<String>) -> Self {
        self.anthropic_version = version.into();
        self
    }

    pub fn with_openai_api(mut self, api: OpenAiApi) -> Self {
        self.openai_api = api;
        self
    }
}

// --- Stream Events ---

/// One event of a streaming reply.
///
/// Zero or more `Chunk`s are followed by exactly one `Done` or `Error`.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// An incremental text delta
    Chunk(String),
    /// The stream finished; carries the concatenation of all chunks
    Done(String),
    /// The request failed; chunks already delivered stay delivered
    Error(String),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Chunk(_))
    }

    /// Render the event as one SSE frame the way a host relays it to a browser.
    pub fn to_sse(&self) -> String {
        let (event, data) = match self {
            Self::Chunk(text) => ("chunk", json!({ "text": text })),
            Self::Done(text) => ("done", json!({ "text": text })),
            Self::Error(message) => ("error", json!({ "message": message })),
        };
        format!("event: {}\ndata: {}\n\n", event, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_plain_string_roundtrip() {
        let msg: Message = serde_json::from_str(r#"{"role":"user","content":"hi"}"#).unwrap();
        assert_eq!(msg, Message::user("hi"));
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"role": "user", "content": "hi"})
        );
    }

    #[test]
    fn test_content_block_shapes() {
        let raw = json!([
            {"type": "text", "text": "look"},
            {"type": "image", "source": {"type": "base64", "media_type": "image/png", "data": "AAAA"}},
            {"type": "file", "filename": "a.csv", "mime_type": "text/csv", "data": "YSxi"},
            {"type": "audio", "data": "zzz"}
        ]);
        let blocks: Vec<ContentBlock> = serde_json::from_value(raw).unwrap();
        assert_eq!(blocks[0], ContentBlock::text("look"));
        assert_eq!(blocks[1], ContentBlock::image("image/png", "AAAA"));
        assert_eq!(blocks[2], ContentBlock::file("a.csv", "text/csv", "YSxi"));
        assert!(matches!(blocks[3], ContentBlock::Other(_)));
    }

    #[test]
    fn test_incomplete_block_is_other() {
        let block: ContentBlock = serde_json::from_value(json!({"type": "image"})).unwrap();
        assert!(matches!(block, ContentBlock::Other(_)));
    }

    #[test]
    fn test_provider_kind_from_str() {
        assert_eq!("AUTO".parse::<ProviderKind>().unwrap(), ProviderKind::Auto);
        assert_eq!(
            "openai_compatible".parse::<ProviderKind>().unwrap(),
            ProviderKind::OpenAi
        );
        assert_eq!(
            "anthropic".parse::<ProviderKind>().unwrap(),
            ProviderKind::Anthropic
        );
        assert!("gemini".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_generation_config_defaults() {
        let config = GenerationConfig::new("gpt-4o");
        assert_eq!(config.temperature, 1.0);
        assert_eq!(config.max_tokens, 512);
        assert_eq!(config.max_tokens_param, "max_tokens");
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.provider, ProviderKind::Auto);
        assert_eq!(config.anthropic_version, "2023-06-01");
        assert_eq!(config.openai_api, OpenAiApi::ChatCompletions);
    }

    #[test]
    fn test_stream_event_sse_frames() {
        assert_eq!(
            StreamEvent::Chunk("Hi".into()).to_sse(),
            "event: chunk\ndata: {\"text\":\"Hi\"}\n\n"
        );
        assert_eq!(
            StreamEvent::Error("boom".into()).to_sse(),
            "event: error\ndata: {\"message\":\"boom\"}\n\n"
        );
        assert!(StreamEvent::Done(String::new()).is_terminal());
        assert!(!StreamEvent::Chunk(String::new()).is_terminal());
    }

    #[test]
    fn test_content_as_text() {
        let content = MessageContent::Blocks(vec![
            ContentBlock::text("a"),
            ContentBlock::image("image/png", "AAAA"),
            ContentBlock::text("b"),
        ]);
        assert_eq!(content.as_text(), "a\nb");
    }
}
