//! Wire protocol module.
//!
//! This module defines the `WireProtocol` trait that abstracts over the
//! request/response formats of the supported chat APIs, and provides the
//! concrete implementations.
//!
//! Key concepts:
//! - **Provider detection**: `detect` picks a protocol from the base URL and
//!   model name when the caller asks for `auto`
//! - **Content translation**: `content` maps provider-agnostic messages to
//!   each provider's turn and block shapes
//! - **Stream parsing**: `stream` rebuilds SSE lines from arbitrary byte
//!   chunks; each protocol decodes its own delta events
//! - **Provider pattern**: every protocol implements the same trait so the
//!   client never branches on provider names itself

pub mod anthropic;
pub mod content;
pub mod detect;
pub mod openai_compatible;
pub mod request;
pub mod stream;

use serde_json::Value;

use crate::error::Result;
use crate::types::{GenerationConfig, Message, OpenAiApi, Provider};

pub use anthropic::AnthropicProtocol;
pub use detect::detect;
pub use openai_compatible::OpenAiCompatibleProtocol;
pub use request::ProviderRequest;
pub use stream::{DeltaDecoder, RelayEventDecoder, StreamParser};

/// Trait that every wire protocol implements.
///
/// A protocol knows how to build its request, how to read its streaming
/// deltas (through [`DeltaDecoder`]), and how to pull the reply text out of
/// a buffered response body.
pub trait WireProtocol: DeltaDecoder + Send + Sync {
    fn provider(&self) -> Provider;

    /// Return the protocol's display name (for logging).
    fn name(&self) -> &str;

    /// Build the complete HTTP request. `stream` adds `"stream": true`.
    fn build_request(
        &self,
        base_url: &str,
        api_key: Option<&str>,
        messages: &[Message],
        config: &GenerationConfig,
        stream: bool,
    ) -> Result<ProviderRequest>;

    /// Extract the reply text from a buffered response.
    ///
    /// `body` is `Value::Null` when the raw body was not JSON. An empty
    /// string is a valid result.
    fn extract_text(&self, body: &Value, raw: &str) -> String;
}

/// Pick the protocol implementation for a resolved provider.
pub fn protocol_for(provider: Provider, api: OpenAiApi) -> Box<dyn WireProtocol> {
    match provider {
        Provider::Anthropic => Box::new(AnthropicProtocol),
        Provider::OpenAi => Box::new(OpenAiCompatibleProtocol::new(api)),
    }
}
