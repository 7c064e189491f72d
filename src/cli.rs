//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "chatbridge", version, about = "Send conversations to OpenAI or Anthropic chat APIs")]
pub struct Cli {
    /// Config file (defaults to ~/.chatbridge/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send a prompt and print the reply
    Ask(AskArgs),
    /// Print which wire protocol a base URL and model resolve to
    Detect {
        url: String,
        model: String,
    },
    /// Write the default config file
    Init,
}

#[derive(Debug, clap::Args)]
pub struct AskArgs {
    /// User message; read from stdin when omitted
    pub prompt: Option<String>,

    /// Print deltas as they arrive
    #[arg(long)]
    pub stream: bool,

    /// Print `event: chunk|done|error` frames instead of plain text
    #[arg(long, conflicts_with = "stream")]
    pub sse: bool,

    /// Extra instructions for this response only
    #[arg(long)]
    pub instructions: Option<String>,

    /// Attach a file to the prompt (repeatable)
    #[arg(long = "attach", value_name = "FILE")]
    pub attachments: Vec<PathBuf>,

    /// JSON array of prior messages to send before the prompt
    #[arg(long, value_name = "FILE")]
    pub messages: Option<PathBuf>,

    /// Value for a `{key}` placeholder in the response template (repeatable)
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, String)>,
}

fn parse_var(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}
