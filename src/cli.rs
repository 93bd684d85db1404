//! Command-line interface definition for chathook
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for the interactive session, one-shot sends, and
//! chat store management.

use clap::{Parser, Subcommand};

/// chathook - Webhook-backed chat assistant CLI
///
/// Chat with a remote webhook-backed assistant, optionally attaching a
/// screenshot, with multiple named conversations persisted locally.
#[derive(Parser, Debug, Clone)]
#[command(name = "chathook")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "chathook.yaml")]
    pub config: String,

    /// Override the chat store directory
    #[arg(long, env = "CHATHOOK_STORE_PATH")]
    pub store_path: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for chathook
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Resume a specific chat by id instead of the most recent
        #[arg(short, long)]
        resume: Option<String>,

        /// Skip screenshot capture for this session
        #[arg(long)]
        no_screenshot: bool,
    },

    /// Send a single message and print the reply
    Send {
        /// The message to send
        message: String,

        /// Target chat id (defaults to the most recent chat)
        #[arg(long)]
        chat: Option<String>,

        /// Skip screenshot capture for this send
        #[arg(long)]
        no_screenshot: bool,
    },

    /// Manage stored chats
    Chats {
        /// Chat management subcommand
        #[command(subcommand)]
        command: ChatsCommand,
    },
}

/// Chat store management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ChatsCommand {
    /// List all chats, most recently created first
    List,

    /// Print the full message history of a chat
    Show {
        /// Chat id
        id: String,
    },

    /// Create a new empty chat
    New,

    /// Delete a chat
    Delete {
        /// Chat id
        id: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
