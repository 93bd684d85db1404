//! chathook - Webhook-backed chat assistant CLI library
//!
//! Core functionality for chatting with a remote webhook-backed assistant:
//! a persistent multi-chat store over an embedded key-value database, a
//! screenshot capture boundary, a webhook HTTP client with bounded retry,
//! and the interactive session that ties them together.
//!
//! # Architecture
//!
//! - `storage`: key-value adapter and the multi-chat CRUD store
//! - `capture`: screenshot capture boundary and failure classification
//! - `webhook`: HTTP client for the external webhook endpoint
//! - `session`: interactive readline session and session-local state
//! - `config`: configuration management and validation
//! - `error`: error types and result aliases
//! - `cli` / `commands`: command-line interface and handlers

pub mod capture;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod session;
pub mod storage;
pub mod webhook;

// Re-export commonly used types
pub use config::Config;
pub use error::{ChathookError, Result};
pub use session::{ChatSession, SessionContext};
pub use storage::{ChatRecord, ChatStore, KeyValueStore, Message, SledStore};
pub use webhook::{Reply, WebhookClient};
