mod cli;

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use chatbridge::attachments::{attach_to_message, select_images, Attachment};
use chatbridge::compose::{rag_context, render_reply, require_text, special_instructions};
use chatbridge::config::AppConfig;
use chatbridge::llm::detect;
use chatbridge::types::{ContentBlock, GenerationConfig, Message, Provider, Role, StreamEvent};
use chatbridge::{ChatBackend, ChatClient};
use cli::{AskArgs, Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Ask(args) => ask(cli.config.as_deref(), args).await,
        Command::Detect { url, model } => {
            println!("{}", detect(&url, &model));
            Ok(())
        }
        Command::Init => {
            let path = AppConfig::save_default(cli.config.as_deref())?;
            println!("[Config] Created default config: {}", path.display());
            println!("[Config] Edit it to set your api_url, model, api_key, etc.");
            Ok(())
        }
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,chatbridge=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn ask(config_path: Option<&Path>, args: AskArgs) -> Result<()> {
    let config = AppConfig::load(config_path)?;
    let generation = config.generation_config()?;
    let client = ChatClient::new(config.api_url()?, config.api_key());
    let provider = client.resolve_provider(&generation);

    let messages = compose_messages(&config, &args, provider)?;
    let vars: HashMap<String, String> = args.vars.iter().cloned().collect();
    let template = config.prompt.response_template.as_str();

    if args.sse {
        return relay_sse(&client, &messages, &generation, |text| {
            render_reply(template, text, &vars)
        })
        .await;
    }

    if args.stream {
        let mut stdout = std::io::stdout();
        let mut on_chunk = |delta: &str| {
            let _ = write!(stdout, "{}", delta);
            let _ = stdout.flush();
        };
        let text = client
            .generate_streaming(&messages, &generation, &mut on_chunk)
            .await?;
        println!();
        require_text(text)?;
        return Ok(());
    }

    let text = require_text(client.generate(&messages, &generation).await?)?;
    println!("{}", render_reply(template, &text, &vars));
    Ok(())
}

/// System prompt, special instructions, prior turns, the prompt with its
/// attachments, then reference context last.
fn compose_messages(config: &AppConfig, args: &AskArgs, provider: Provider) -> Result<Vec<Message>> {
    let mut messages = Vec::new();

    let system_prompt = config.prompt.system_prompt.trim();
    if !system_prompt.is_empty() {
        messages.push(Message::system(system_prompt));
    }
    if let Some(msg) = args.instructions.as_deref().and_then(special_instructions) {
        messages.push(msg);
    }

    if let Some(path) = &args.messages {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read messages file: {}", path.display()))?;
        let prior: Vec<Message> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse messages file: {}", path.display()))?;
        messages.extend(prior);
    }

    let prompt = match &args.prompt {
        Some(p) => p.clone(),
        None => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("Failed to read prompt from stdin")?;
            input
        }
    };
    if prompt.trim().is_empty() && args.attachments.is_empty() {
        bail!("Empty prompt");
    }
    messages.push(attach_to_message(
        Role::User,
        prompt.trim(),
        attachment_blocks(config, &args.attachments, provider)?,
    ));

    if let Some(msg) = rag_context(&config.rag_text()?, config.prompt.max_rag_chars) {
        messages.push(msg);
    }
    Ok(messages)
}

fn attachment_blocks(
    config: &AppConfig,
    paths: &[PathBuf],
    provider: Provider,
) -> Result<Vec<ContentBlock>> {
    let mut images = Vec::new();
    let mut files = Vec::new();
    for path in paths {
        let attachment = Attachment::from_path(path)
            .with_context(|| format!("Failed to read attachment: {}", path.display()))?;
        if attachment.is_supported_image() {
            images.push(attachment);
        } else {
            files.push(attachment.to_file_block());
        }
    }

    let mut blocks = match config.vision_policy() {
        Some(policy) if !images.is_empty() => {
            let policy = policy.for_provider(provider);
            let total = images.len();
            let selected = select_images(&[images], &policy)
                .into_iter()
                .flatten()
                .collect::<Vec<_>>();
            if selected.len() < total {
                tracing::warn!(
                    selected = selected.len(),
                    total,
                    "some images were skipped by the vision policy"
                );
            }
            selected
        }
        Some(_) => Vec::new(),
        None => {
            if !images.is_empty() {
                tracing::warn!(count = images.len(), "vision disabled, images not sent");
            }
            Vec::new()
        }
    };
    blocks.extend(files);
    Ok(blocks)
}

/// Print host-style SSE frames; the `done` frame carries the rendered reply.
async fn relay_sse(
    client: &ChatClient,
    messages: &[Message],
    generation: &GenerationConfig,
    render: impl Fn(&str) -> String,
) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<StreamEvent>();

    let print = async {
        let mut stdout = std::io::stdout();
        let mut failed = None;
        while let Some(event) = rx.recv().await {
            let event = match event {
                StreamEvent::Done(text) => StreamEvent::Done(render(&text)),
                other => other,
            };
            let _ = write!(stdout, "{}", event.to_sse());
            let _ = stdout.flush();
            if let StreamEvent::Error(message) = &event {
                failed = Some(message.clone());
            }
            if event.is_terminal() {
                break;
            }
        }
        failed
    };

    let ((), failed) = tokio::join!(client.stream_events(messages, generation, tx), print);
    match failed {
        Some(message) => bail!(message),
        None => Ok(()),
    }
}
