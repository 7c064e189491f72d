//! Content translation from the provider-agnostic message list to the
//! turn/block shapes each wire protocol expects.
//!
//! Key differences between the targets:
//! - **Anthropic**: images stay `{type:"image", source:{type:"base64", ...}}`;
//!   files become `document` blocks, with text-like files decoded to raw text
//! - **Chat Completions**: images become `image_url` data URIs
//! - **Responses**: `input_text` / `input_image` blocks, and a turn whose blocks
//!   all drop out is omitted entirely
//!
//! System messages never become turns for any target. They are folded into a
//! single system text which each protocol attaches in its own way.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;

use crate::types::{ContentBlock, Message, MessageContent, Role};

/// MIME types whose payload is sent to Anthropic as a plain-text document.
pub const TEXT_MIME_TYPES: &[&str] = &[
    "text/plain",
    "text/csv",
    "text/html",
    "text/markdown",
    "application/json",
    "application/xml",
    "text/xml",
];

/// Which block vocabulary to translate into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetShape {
    Anthropic,
    ChatCompletions,
    Responses,
}

// --- Wire types ---

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockSource {
    Base64 { media_type: String, data: String },
    Text { media_type: String, data: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

/// A content block in a provider's own vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireBlock {
    Text { text: String },
    Image { source: BlockSource },
    Document { source: BlockSource },
    ImageUrl { image_url: ImageUrl },
    InputText { text: String },
    InputImage { image_url: String },
    InputFile { filename: String, file_data: String },
}

/// Turn content: a plain string, translated blocks, or the caller's
/// original blocks when nothing could be translated.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WireContent {
    Text(String),
    Blocks(Vec<WireBlock>),
    Original(Vec<ContentBlock>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WireTurn {
    pub role: Role,
    pub content: WireContent,
}

/// Output of [`translate`]: folded system text plus the forwarded turns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Translation {
    pub system: String,
    pub turns: Vec<WireTurn>,
}

// --- Translation ---

pub fn translate(messages: &[Message], target: TargetShape) -> Translation {
    let mut system_parts: Vec<String> = Vec::new();
    let mut turns = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => {
                let text = msg.content.as_text();
                let text = text.trim();
                if !text.is_empty() {
                    system_parts.push(text.to_string());
                }
            }
            Role::User | Role::Assistant => {
                if let Some(content) = translate_content(&msg.content, target) {
                    turns.push(WireTurn {
                        role: msg.role,
                        content,
                    });
                }
            }
            Role::Tool => {}
        }
    }

    Translation {
        system: system_parts.join("\n\n").trim().to_string(),
        turns,
    }
}

fn translate_content(content: &MessageContent, target: TargetShape) -> Option<WireContent> {
    let blocks = match content {
        MessageContent::Text(text) => return Some(WireContent::Text(text.clone())),
        MessageContent::Blocks(blocks) => blocks,
    };

    let translated: Vec<WireBlock> = blocks
        .iter()
        .filter_map(|block| translate_block(block, target))
        .collect();

    if !translated.is_empty() {
        return Some(WireContent::Blocks(translated));
    }
    match target {
        TargetShape::Responses => None,
        TargetShape::Anthropic | TargetShape::ChatCompletions => {
            Some(WireContent::Original(blocks.clone()))
        }
    }
}

/// Map one block into the target vocabulary; `None` drops it.
pub fn translate_block(block: &ContentBlock, target: TargetShape) -> Option<WireBlock> {
    match (block, target) {
        (ContentBlock::Text { text }, TargetShape::Responses) => {
            Some(WireBlock::InputText { text: text.clone() })
        }
        (ContentBlock::Text { text }, _) => Some(WireBlock::Text { text: text.clone() }),

        (ContentBlock::Image { media_type, data }, TargetShape::Anthropic) => {
            Some(WireBlock::Image {
                source: BlockSource::Base64 {
                    media_type: media_type.clone(),
                    data: data.clone(),
                },
            })
        }
        (ContentBlock::Image { media_type, data }, TargetShape::ChatCompletions) => {
            Some(WireBlock::ImageUrl {
                image_url: ImageUrl {
                    url: data_uri(media_type, data),
                },
            })
        }
        (ContentBlock::Image { media_type, data }, TargetShape::Responses) => {
            Some(WireBlock::InputImage {
                image_url: data_uri(media_type, data),
            })
        }

        (
            ContentBlock::File {
                mime_type, data, ..
            },
            TargetShape::Anthropic,
        ) => Some(WireBlock::Document {
            source: document_source(mime_type, data),
        }),
        (
            ContentBlock::File {
                filename,
                mime_type,
                data,
            },
            _,
        ) => Some(WireBlock::InputFile {
            filename: filename.clone(),
            file_data: data_uri(mime_type, data),
        }),

        (ContentBlock::Other(_), _) => None,
    }
}

/// Text-like documents go to Anthropic decoded; everything else (and any
/// payload that is not valid base64) stays base64.
fn document_source(mime_type: &str, data: &str) -> BlockSource {
    if is_text_mime(mime_type) {
        if let Some(text) = decode_base64_text(data) {
            return BlockSource::Text {
                media_type: "text/plain".to_string(),
                data: text,
            };
        }
    }
    BlockSource::Base64 {
        media_type: mime_type.to_string(),
        data: data.to_string(),
    }
}

/// Parameters such as `; charset=utf-8` are ignored.
pub fn is_text_mime(mime_type: &str) -> bool {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    TEXT_MIME_TYPES.contains(&essence.as_str())
}

pub fn data_uri(media_type: &str, data: &str) -> String {
    format!("data:{};base64,{}", media_type, data)
}

pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

fn decode_base64_text(data: &str) -> Option<String> {
    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = STANDARD.decode(compact).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}
