//! chatbridge: one interface over OpenAI-style and Anthropic chat APIs.
//!
//! Callers hand over provider-agnostic [`types::Message`]s and a
//! [`types::GenerationConfig`]; [`ChatClient`] detects the wire protocol,
//! translates the conversation, sends one request and returns the reply
//! text, either buffered or as a stream of deltas.

pub mod attachments;
pub mod client;
pub mod compose;
pub mod config;
pub mod error;
pub mod llm;
pub mod types;

pub use client::{ChatBackend, ChatClient};
pub use error::{RelayError, Result};
