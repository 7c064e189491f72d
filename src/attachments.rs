//! Image attachment selection for vision-capable models.
//!
//! Selection is a fold over attachment groups (one group per message) with
//! an explicit [`ImageBudget`] accumulator, so the "stop once count >= max"
//! rule is a pure function of the inputs.

use std::path::Path;

use crate::llm::content::encode_base64;
use crate::types::{ContentBlock, Message, MessageContent, Provider, Role};

pub const SUPPORTED_IMAGE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/gif",
    "image/webp",
];

pub const DEFAULT_MAX_IMAGES: usize = 5;
pub const DEFAULT_MAX_IMAGE_SIZE_MB: f64 = 5.0;
pub const OPENAI_MAX_IMAGES: usize = 10;
pub const ANTHROPIC_MAX_IMAGES: usize = 100;

/// Guess a MIME type from a file extension.
pub fn mime_from_extension(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "txt" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "xml" => "application/xml",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

/// A raw file attached to a message.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub filename: String,
    pub mime_type: String,
    pub data: Vec<u8>,
    /// Embedded in the message body rather than attached explicitly.
    pub inline: bool,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            data,
            inline: false,
        }
    }

    /// Read a file from disk, typing it by extension.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let data = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        Ok(Self::new(filename, mime_from_extension(path), data))
    }

    pub fn is_supported_image(&self) -> bool {
        SUPPORTED_IMAGE_TYPES.contains(&self.mime_type.to_ascii_lowercase().as_str())
    }

    pub fn to_image_block(&self) -> ContentBlock {
        ContentBlock::image(self.mime_type.clone(), encode_base64(&self.data))
    }

    pub fn to_file_block(&self) -> ContentBlock {
        ContentBlock::file(
            self.filename.clone(),
            self.mime_type.clone(),
            encode_base64(&self.data),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisionPolicy {
    pub max_images: usize,
    pub max_image_bytes: u64,
    pub include_inline: bool,
}

impl Default for VisionPolicy {
    fn default() -> Self {
        Self {
            max_images: DEFAULT_MAX_IMAGES,
            max_image_bytes: mb_to_bytes(DEFAULT_MAX_IMAGE_SIZE_MB),
            include_inline: false,
        }
    }
}

impl VisionPolicy {
    /// Clamp `max_images` to what the provider accepts.
    pub fn for_provider(mut self, provider: Provider) -> Self {
        self.max_images = self.max_images.min(provider_image_limit(provider));
        self
    }

    fn accepts(&self, attachment: &Attachment) -> bool {
        (!attachment.inline || self.include_inline)
            && attachment.is_supported_image()
            && attachment.data.len() as u64 <= self.max_image_bytes
    }
}

pub fn mb_to_bytes(mb: f64) -> u64 {
    if mb.is_finite() && mb > 0.0 {
        (mb * 1_048_576.0) as u64
    } else {
        0
    }
}

pub fn provider_image_limit(provider: Provider) -> usize {
    match provider {
        Provider::Anthropic => ANTHROPIC_MAX_IMAGES,
        Provider::OpenAi => OPENAI_MAX_IMAGES,
    }
}

/// Images taken so far across the whole conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBudget {
    pub used: usize,
    pub max: usize,
}

impl ImageBudget {
    pub fn new(max: usize) -> Self {
        Self { used: 0, max }
    }

    pub fn exhausted(&self) -> bool {
        self.used >= self.max
    }

    fn take(self) -> Self {
        Self {
            used: self.used + 1,
            ..self
        }
    }
}

/// Pick the images for one group, returning the updated budget.
pub fn select_group(
    attachments: &[Attachment],
    policy: &VisionPolicy,
    budget: ImageBudget,
) -> (Vec<ContentBlock>, ImageBudget) {
    attachments
        .iter()
        .fold((Vec::new(), budget), |(mut picked, budget), attachment| {
            if budget.exhausted() || !policy.accepts(attachment) {
                return (picked, budget);
            }
            picked.push(attachment.to_image_block());
            (picked, budget.take())
        })
}

/// Select images for every group in order under one shared budget.
pub fn select_images(groups: &[Vec<Attachment>], policy: &VisionPolicy) -> Vec<Vec<ContentBlock>> {
    let (selected, _) = groups.iter().fold(
        (Vec::with_capacity(groups.len()), ImageBudget::new(policy.max_images)),
        |(mut selected, budget), group| {
            let (picked, budget) = select_group(group, policy, budget);
            selected.push(picked);
            (selected, budget)
        },
    );
    selected
}

/// Plain string content without images, otherwise text first then images.
pub fn attach_to_message(role: Role, text: impl Into<String>, images: Vec<ContentBlock>) -> Message {
    let text = text.into();
    if images.is_empty() {
        return Message::new(role, text);
    }
    let mut blocks = Vec::with_capacity(images.len() + 1);
    blocks.push(ContentBlock::text(text));
    blocks.extend(images);
    Message::new(role, MessageContent::Blocks(blocks))
}
