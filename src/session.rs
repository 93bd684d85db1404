//! Interactive chat session
//!
//! Glue between the chat store, the screenshot capturer, and the webhook
//! client: renders messages, runs the readline loop, and dispatches the
//! session commands. Input is naturally disabled for the duration of one
//! outstanding send because the loop awaits the webhook reply before
//! prompting again.

use crate::capture::{CaptureBackend, ScreenCapturer};
use crate::error::Result;
use crate::storage::types::format_local;
use crate::storage::{AppendOutcome, ChatRecord, ChatStore, KeyValueStore, DEFAULT_HISTORY_LIMIT};
use crate::webhook::WebhookClient;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

/// Session-local UI state
///
/// The current-chat pointer and the list-view flag live here rather than
/// in globals; the pointer is never persisted.
#[derive(Debug, Default)]
pub struct SessionContext {
    /// Chat currently displayed and appended to
    pub current_chat_id: Option<String>,

    /// Whether the chat list is the active view
    pub viewing_chat_list: bool,
}

/// Session commands recognized at the prompt
#[derive(Debug, PartialEq, Eq)]
enum SessionCommand {
    NewChat,
    ListChats,
    LoadChat(String),
    DeleteChat(String),
    Help,
    Exit,
    /// Plain input, sent to the webhook
    None,
}

/// Parse a line of input into a session command
fn parse_command(input: &str) -> SessionCommand {
    let mut parts = input.split_whitespace();
    match parts.next() {
        Some("/new") => SessionCommand::NewChat,
        Some("/chats") => SessionCommand::ListChats,
        Some("/load") => match parts.next() {
            Some(id) => SessionCommand::LoadChat(id.to_string()),
            None => SessionCommand::Help,
        },
        Some("/delete") => match parts.next() {
            Some(id) => SessionCommand::DeleteChat(id.to_string()),
            None => SessionCommand::Help,
        },
        Some("/help") => SessionCommand::Help,
        Some("exit") | Some("quit") => SessionCommand::Exit,
        _ => SessionCommand::None,
    }
}

/// Interactive chat session over a store, capturer, and webhook client
pub struct ChatSession<S: KeyValueStore, B: CaptureBackend> {
    store: ChatStore<S>,
    client: WebhookClient,
    capturer: ScreenCapturer<B>,
    context: SessionContext,
}

impl<S: KeyValueStore, B: CaptureBackend> ChatSession<S, B> {
    /// Create a session; no chat is current until [`Self::initialize`] runs
    pub fn new(store: ChatStore<S>, client: WebhookClient, capturer: ScreenCapturer<B>) -> Self {
        Self {
            store,
            client,
            capturer,
            context: SessionContext::default(),
        }
    }

    /// Prepare the session for input
    ///
    /// An empty store gets one fresh chat; otherwise the most recently
    /// created chat is loaded and its messages replayed. When `resume` is
    /// given, that chat is loaded instead.
    pub fn initialize(&mut self, resume: Option<&str>) -> Result<()> {
        if let Some(id) = resume {
            if self.load_and_render(id)? {
                return Ok(());
            }
            println!("{}", format!("No chat with id {}", id).yellow());
        }

        if self.store.is_empty()? {
            if let Some(chat) = self.store.create_chat(None)? {
                println!("{}", chat.title.bold());
                self.context.current_chat_id = Some(chat.id);
            }
            return Ok(());
        }

        let chats = self.store.list_chats()?;
        if let Some(most_recent) = chats.first() {
            let id = most_recent.id.clone();
            self.load_and_render(&id)?;
        }
        Ok(())
    }

    /// Run the readline loop until exit
    pub async fn run(&mut self) -> Result<()> {
        let mut rl = DefaultEditor::new()?;
        print_welcome();

        loop {
            match rl.readline(">> ") {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    rl.add_history_entry(trimmed)?;

                    match parse_command(trimmed) {
                        SessionCommand::NewChat => self.handle_new_chat()?,
                        SessionCommand::ListChats => self.handle_list_chats()?,
                        SessionCommand::LoadChat(id) => {
                            if !self.load_and_render(&id)? {
                                println!("{}", format!("No chat with id {}", id).yellow());
                            }
                        }
                        SessionCommand::DeleteChat(id) => self.handle_delete_chat(&id)?,
                        SessionCommand::Help => print_help(),
                        SessionCommand::Exit => break,
                        SessionCommand::None => self.handle_send(trimmed).await,
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => {
                    tracing::error!("Readline error: {:?}", err);
                    break;
                }
            }
        }

        println!("Goodbye!");
        Ok(())
    }

    /// Send one message: capture, post, render and store the reply
    ///
    /// Every failure path resolves to an inline assistant-style line; the
    /// session always returns to the prompt.
    async fn handle_send(&mut self, message: &str) {
        let chat_id = match self.context.current_chat_id.clone() {
            Some(id) => id,
            None => {
                println!("{}", "No current chat. Use /new to start one.".yellow());
                return;
            }
        };

        self.record_message(&chat_id, message, true).await;
        render_message(message, true);

        println!("{}", "Thinking...".dimmed());

        let capture = self.capturer.capture().await;
        if let Some(notice) = capture.notice {
            self.record_message(&chat_id, &notice, false).await;
            render_message(&notice, false);
        }

        let history = match self.store.recent_history(&chat_id, DEFAULT_HISTORY_LIMIT) {
            Ok(history) => history,
            Err(e) => {
                tracing::error!("Failed to read chat history: {}", e);
                Vec::new()
            }
        };

        let reply = match self
            .client
            .send_message(message, &chat_id, &history, capture.image)
            .await
        {
            Ok(reply) => reply.reply,
            Err(e) => format!("Error: {}", e),
        };

        self.record_message(&chat_id, &reply, false).await;
        render_message(&reply, false);
    }

    /// Append a message, degrading to an inline error on persist failure
    async fn record_message(&self, chat_id: &str, text: &str, is_user: bool) {
        match self.store.append_message(chat_id, text, is_user).await {
            Ok(AppendOutcome::Appended { new_title, .. }) => {
                if let Some(title) = new_title {
                    println!("{}", title.bold());
                }
            }
            Ok(AppendOutcome::NoSuchChat) => {
                tracing::warn!("Chat {} vanished while appending", chat_id);
            }
            Err(e) => {
                tracing::error!("Error saving message: {}", e);
                render_message("Error saving message. Please try again.", false);
            }
        }
    }

    fn handle_new_chat(&mut self) -> Result<()> {
        match self
            .store
            .create_chat(self.context.current_chat_id.as_deref())?
        {
            Some(chat) => {
                println!("{}", chat.title.bold());
                self.context.current_chat_id = Some(chat.id);
                if self.context.viewing_chat_list {
                    self.handle_list_chats()?;
                }
            }
            None => {
                println!("{}", "Current chat is empty; staying in it.".yellow());
            }
        }
        Ok(())
    }

    fn handle_list_chats(&mut self) -> Result<()> {
        let chats = self.store.list_chats()?;
        if chats.is_empty() {
            println!("{}", "No chats yet".yellow());
        } else {
            for chat in &chats {
                let marker = if Some(&chat.id) == self.context.current_chat_id.as_ref() {
                    "*"
                } else {
                    " "
                };
                println!(
                    "{} {}  {} ({} messages)",
                    marker,
                    chat.id.cyan(),
                    chat.title,
                    chat.messages.len()
                );
            }
        }
        self.context.viewing_chat_list = true;
        Ok(())
    }

    fn handle_delete_chat(&mut self, id: &str) -> Result<()> {
        let outcome = self
            .store
            .delete_chat(id, self.context.current_chat_id.as_deref())?;

        if !outcome.removed {
            println!("{}", format!("No chat with id {}", id).yellow());
            return Ok(());
        }
        println!("{}", format!("Deleted chat {}", id).green());

        if outcome.was_current {
            self.context.current_chat_id = None;
        }

        if let Some(replacement) = outcome.replacement {
            println!("{}", replacement.title.bold());
            self.context.current_chat_id = Some(replacement.id);
        }

        if self.context.viewing_chat_list {
            self.handle_list_chats()?;
        }
        Ok(())
    }

    /// Load a chat, replay its messages, and make it current
    ///
    /// Returns false when the chat does not exist. Replayed messages are
    /// rendered without being re-persisted.
    fn load_and_render(&mut self, id: &str) -> Result<bool> {
        let chat = match self.store.load_chat(id)? {
            Some(chat) => chat,
            None => return Ok(false),
        };

        println!("{}", chat.title.bold());
        replay_messages(&chat);
        self.context.current_chat_id = Some(chat.id);
        self.context.viewing_chat_list = false;
        Ok(true)
    }
}

/// Render an already-stored chat without touching the store
fn replay_messages(chat: &ChatRecord) {
    for msg in &chat.messages {
        render_stored(&msg.text, msg.is_user, &msg.timestamp);
    }
}

/// Render a message stamped with the current time
fn render_message(text: &str, is_user: bool) {
    let now = chrono::Utc::now().to_rfc3339();
    render_stored(text, is_user, &now);
}

fn render_stored(text: &str, is_user: bool, timestamp: &str) {
    let stamp = format_local(timestamp).dimmed();
    if is_user {
        println!("{} {}", "you:".green().bold(), text);
    } else {
        println!("{} {}", "bot:".blue().bold(), text);
    }
    println!("  {}", stamp);
}

fn print_welcome() {
    println!("\n{}", "chathook — webhook chat".bold());
    println!("Type '/help' for commands, 'exit' to quit\n");
}

fn print_help() {
    println!("Commands:");
    println!("  /new           start a new chat");
    println!("  /chats         list chats, most recent first");
    println!("  /load <id>     switch to a chat");
    println!("  /delete <id>   delete a chat");
    println!("  /help          show this help");
    println!("  exit           leave the session");
}
