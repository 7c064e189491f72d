//! Completion client: detection, request building and one HTTP exchange.
//!
//! ```text
//! messages + GenerationConfig
//!     |
//!     v
//! resolve provider -> WireProtocol::build_request -> POST
//!                                                     |
//!                         +---------------------------+
//!                         v                           v
//!                 buffered: extract_text     streaming: StreamParser -> sink
//! ```
//!
//! Exactly one request is sent per call; nothing is retried here.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::compose::validate_generation;
use crate::error::{RelayError, Result};
use crate::llm::request::endpoint_path;
use crate::llm::{protocol_for, ProviderRequest, StreamParser, WireProtocol};
use crate::types::{GenerationConfig, Message, Provider, StreamEvent};

/// Trait for anything that can produce a reply for a conversation.
///
/// `ChatClient` is the HTTP implementation; hosts can substitute their own
/// (for tests, caching, or retries layered on top).
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send the request and wait for the entire reply.
    async fn generate(&self, messages: &[Message], config: &GenerationConfig) -> Result<String>;

    /// Stream the reply; `on_chunk` sees every delta in order and the
    /// concatenated text is returned once the stream ends.
    async fn generate_streaming(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
        on_chunk: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> Result<String>;
}

/// HTTP client for one configured endpoint.
#[derive(Debug, Clone)]
pub struct ChatClient {
    base_url: String,
    api_key: Option<String>,
    http: reqwest::Client,
}

struct StreamOutcome {
    text: String,
    detached: bool,
}

/// Collects deltas and forwards them to the consumer until it detaches.
struct Accumulator<F> {
    text: String,
    sink: F,
    attached: bool,
}

impl<F: FnMut(&str) -> bool> Accumulator<F> {
    fn push(&mut self, delta: String) {
        if !self.attached {
            return;
        }
        self.text.push_str(&delta);
        self.attached = (self.sink)(&delta);
    }
}

impl ChatClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve the protocol for this request (once; `auto` is deterministic).
    pub fn resolve_provider(&self, config: &GenerationConfig) -> Provider {
        config.provider.resolve(&self.base_url, &config.model)
    }

    /// Validate settings and build the request without sending it.
    pub fn prepare(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
        stream: bool,
    ) -> Result<(Box<dyn WireProtocol>, ProviderRequest)> {
        validate_generation(config)?;
        if self.base_url.is_empty() {
            return Err(RelayError::config("Missing API URL"));
        }

        let protocol = protocol_for(self.resolve_provider(config), config.openai_api);
        let request = protocol.build_request(
            &self.base_url,
            self.api_key.as_deref(),
            messages,
            config,
            stream,
        )?;
        Ok((protocol, request))
    }

    async fn send(&self, request: &ProviderRequest, timeout_secs: u64) -> Result<reqwest::Response> {
        let mut builder = self
            .http
            .post(&request.url)
            .timeout(Duration::from_secs(timeout_secs.max(1)));
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder.json(&request.body).send().await.map_err(|e| {
            warn!(endpoint = %request.endpoint_path(), error = %e, "transport failure");
            RelayError::Transport(e)
        })
    }

    /// Stream deltas to `sink` until the body ends or `sink` returns false.
    async fn stream_with<F>(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
        sink: F,
    ) -> Result<StreamOutcome>
    where
        F: FnMut(&str) -> bool + Send,
    {
        let (protocol, request) = self.prepare(messages, config, true)?;
        info!(
            protocol = protocol.name(),
            endpoint = %request.endpoint_path(),
            model = %config.model,
            "streaming completion request"
        );

        let response = self.send(&request, config.timeout_secs).await?;
        let status = response.status().as_u16();
        if status >= 400 {
            let raw = response.text().await.unwrap_or_default();
            return Err(http_error(status, &request.url, &raw));
        }

        let mut byte_stream = response.bytes_stream();
        let mut parser = StreamParser::new(protocol.as_ref());
        let mut acc = Accumulator {
            text: String::new(),
            sink,
            attached: true,
        };

        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk?;
            parser.feed(&chunk, &mut |delta| acc.push(delta));
            if !acc.attached {
                debug!("stream consumer detached, closing connection");
                return Ok(StreamOutcome {
                    text: acc.text,
                    detached: true,
                });
            }
        }
        parser.finish(&mut |delta| acc.push(delta));

        debug!(chars = acc.text.len(), "stream finished");
        Ok(StreamOutcome {
            detached: !acc.attached,
            text: acc.text,
        })
    }

    /// Stream the reply as [`StreamEvent`]s over a channel.
    ///
    /// Sends zero or more `Chunk`s followed by one `Done` (full text) or
    /// `Error`. Dropping the receiver aborts the request at once, even while
    /// the body carries no deltas, and no terminal event is sent.
    pub async fn stream_events(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
        tx: mpsc::UnboundedSender<StreamEvent>,
    ) {
        let chunk_tx = tx.clone();
        let streaming = self.stream_with(messages, config, move |delta| {
            chunk_tx.send(StreamEvent::Chunk(delta.to_string())).is_ok()
        });

        let result = tokio::select! {
            result = streaming => result,
            _ = tx.closed() => {
                debug!("stream receiver dropped, closing connection");
                return;
            }
        };

        match result {
            Ok(StreamOutcome { detached: true, .. }) => {}
            Ok(StreamOutcome { text, .. }) => {
                let _ = tx.send(StreamEvent::Done(text));
            }
            Err(e) => {
                let _ = tx.send(StreamEvent::Error(e.to_string()));
            }
        }
    }
}

#[async_trait]
impl ChatBackend for ChatClient {
    async fn generate(&self, messages: &[Message], config: &GenerationConfig) -> Result<String> {
        let (protocol, request) = self.prepare(messages, config, false)?;
        info!(
            protocol = protocol.name(),
            endpoint = %request.endpoint_path(),
            model = %config.model,
            "completion request"
        );

        let response = self.send(&request, config.timeout_secs).await?;
        let status = response.status().as_u16();
        let raw = response.text().await?;
        debug!(status, bytes = raw.len(), "completion response");

        if status >= 400 {
            return Err(http_error(status, &request.url, &raw));
        }

        let body: Value = serde_json::from_str(&raw).unwrap_or(Value::Null);
        Ok(protocol.extract_text(&body, &raw))
    }

    async fn generate_streaming(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
        on_chunk: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> Result<String> {
        let outcome = self
            .stream_with(messages, config, |delta| {
                on_chunk(delta);
                true
            })
            .await?;
        Ok(outcome.text)
    }
}

/// Build the provider failure from a status and raw body, preferring the
/// JSON `error.message` field.
pub fn http_error(status: u16, url: &str, raw: &str) -> RelayError {
    let message = serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|json| {
            json.pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| raw.to_string());

    let endpoint = endpoint_path(url);
    warn!(status, endpoint = %endpoint, "provider returned an error");
    RelayError::ProviderHttp {
        status,
        endpoint,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderKind;

    #[test]
    fn test_http_error_prefers_json_message() {
        let err = http_error(
            401,
            "https://api.anthropic.com/v1/messages",
            r#"{"error":{"message":"bad key"}}"#,
        );
        assert_eq!(
            err.to_string(),
            "API error: HTTP 401 (Endpoint: /v1/messages) bad key"
        );
    }

    #[test]
    fn test_http_error_falls_back_to_raw_body() {
        let err = http_error(502, "http://localhost:8080/v1/chat/completions", "Bad Gateway");
        assert_eq!(
            err.to_string(),
            "API error: HTTP 502 (Endpoint: /v1/chat/completions) Bad Gateway"
        );
    }

    #[test]
    fn test_new_trims_url_and_blank_key() {
        let client = ChatClient::new(" https://api.openai.com/v1/ ", Some("  ".into()));
        assert_eq!(client.base_url(), "https://api.openai.com/v1");
        let (_, req) = client
            .prepare(&[Message::user("hi")], &GenerationConfig::new("gpt-4o"), false)
            .unwrap();
        assert_eq!(req.header_value("authorization"), None);
    }

    #[test]
    fn test_prepare_resolves_once_from_url_and_model() {
        let client = ChatClient::new("https://my-llm.local/v1", Some("k".into()));
        let config = GenerationConfig::new("claude-3-opus");
        assert_eq!(client.resolve_provider(&config), Provider::Anthropic);

        let (protocol, req) = client.prepare(&[Message::user("hi")], &config, false).unwrap();
        assert_eq!(protocol.provider(), Provider::Anthropic);
        assert_eq!(req.url, "https://my-llm.local/v1/messages");

        let forced = config.with_provider(ProviderKind::OpenAi);
        let (protocol, req) = client.prepare(&[Message::user("hi")], &forced, false).unwrap();
        assert_eq!(protocol.provider(), Provider::OpenAi);
        assert_eq!(req.url, "https://my-llm.local/v1/chat/completions");
    }

    #[test]
    fn test_prepare_rejects_invalid_settings() {
        let client = ChatClient::new("https://api.openai.com/v1", None);
        let config = GenerationConfig::new("gpt-5-nano").with_temperature(0.3);
        let err = client.prepare(&[Message::user("hi")], &config, false).err().unwrap();
        assert!(matches!(err, RelayError::Config(_)));

        let empty = ChatClient::new("", None);
        assert!(empty
            .prepare(&[Message::user("hi")], &GenerationConfig::new("gpt-4o"), false)
            .is_err());
    }
}
