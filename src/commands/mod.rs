//! Command handlers
//!
//! One submodule per top-level CLI command. Handlers own construction of
//! the store/client/capturer for their command and delegate the real work
//! to the library modules.

use crate::capture::{CommandCapture, ScreenCapturer};
use crate::config::Config;
use crate::error::Result;
use crate::storage::{ChatStore, SledStore};
use crate::webhook::WebhookClient;

/// Open the chat store configured for this invocation
fn open_store(config: &Config) -> Result<ChatStore<SledStore>> {
    let adapter = match &config.storage.path {
        Some(path) if std::env::var("CHATHOOK_STORE_PATH").is_err() => {
            SledStore::new_with_path(path)?
        }
        _ => SledStore::new()?,
    };
    Ok(ChatStore::new(adapter))
}

/// Build the screenshot capturer, honoring a per-invocation disable flag
fn build_capturer(config: &Config, no_screenshot: bool) -> ScreenCapturer<CommandCapture> {
    let backend = if no_screenshot {
        None
    } else {
        CommandCapture::from_config(&config.capture)
    };
    ScreenCapturer::new(backend)
}

// Interactive chat command handler
pub mod chat {
    //! Starts the readline session over the configured store and webhook.

    use super::*;
    use crate::session::ChatSession;

    /// Start interactive chat mode
    pub async fn run_chat(
        config: Config,
        resume: Option<String>,
        no_screenshot: bool,
    ) -> Result<()> {
        let store = open_store(&config)?;
        let client = WebhookClient::new(&config.webhook)?;
        let capturer = build_capturer(&config, no_screenshot);

        let mut session = ChatSession::new(store, client, capturer);
        session.initialize(resume.as_deref())?;
        session.run().await
    }
}

// One-shot send command handler
pub mod send {
    //! Sends one message through the normal store/capture/webhook flow and
    //! prints the reply. Webhook failures become an inline `Error:` reply,
    //! matching the interactive session.

    use super::*;
    use crate::storage::{AppendOutcome, DEFAULT_HISTORY_LIMIT};
    use colored::Colorize;

    /// Send a single message and print the reply
    ///
    /// The target chat is `--chat <id>` when given, otherwise the most
    /// recently created chat; an empty store gets a fresh chat first.
    pub async fn run_send(
        config: Config,
        message: String,
        chat: Option<String>,
        no_screenshot: bool,
    ) -> Result<()> {
        let store = open_store(&config)?;
        let client = WebhookClient::new(&config.webhook)?;
        let capturer = build_capturer(&config, no_screenshot);

        let chat_id = match chat {
            Some(id) => {
                if store.load_chat(&id)?.is_none() {
                    println!("{}", format!("No chat with id {}", id).yellow());
                    return Ok(());
                }
                id
            }
            None => match store.list_chats()?.first() {
                Some(most_recent) => most_recent.id.clone(),
                None => match store.create_chat(None)? {
                    Some(chat) => chat.id,
                    None => unreachable!("create_chat without a current chat always creates"),
                },
            },
        };

        append_or_warn(&store, &chat_id, &message, true).await;

        let capture = capturer.capture().await;
        if let Some(notice) = capture.notice {
            append_or_warn(&store, &chat_id, &notice, false).await;
            eprintln!("{}", notice.yellow());
        }

        let history = store.recent_history(&chat_id, DEFAULT_HISTORY_LIMIT)?;
        let reply = match client
            .send_message(&message, &chat_id, &history, capture.image)
            .await
        {
            Ok(reply) => reply.reply,
            Err(e) => format!("Error: {}", e),
        };

        append_or_warn(&store, &chat_id, &reply, false).await;
        println!("{}", reply);
        Ok(())
    }

    async fn append_or_warn(
        store: &ChatStore<SledStore>,
        chat_id: &str,
        text: &str,
        is_user: bool,
    ) {
        match store.append_message(chat_id, text, is_user).await {
            Ok(AppendOutcome::Appended { .. }) => {}
            Ok(AppendOutcome::NoSuchChat) => {
                tracing::warn!("Chat {} vanished while appending", chat_id)
            }
            Err(e) => tracing::error!("Error saving message: {}", e),
        }
    }
}

// Chat store management handler
pub mod chats {
    //! List/show/new/delete over the chat store, rendered as a table.

    use super::*;
    use crate::cli::ChatsCommand;
    use crate::storage::types::format_local;
    use colored::Colorize;
    use prettytable::{format, Table};

    /// Handle `chathook chats <command>`
    pub fn handle_chats(config: &Config, command: ChatsCommand) -> Result<()> {
        let store = open_store(config)?;

        match command {
            ChatsCommand::List => {
                let chats = store.list_chats()?;

                if chats.is_empty() {
                    println!("{}", "No chats yet".yellow());
                    return Ok(());
                }

                let mut table = Table::new();
                table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
                table.add_row(prettytable::row![
                    "ID".bold(),
                    "Title".bold(),
                    "Messages".bold(),
                    "Created".bold()
                ]);

                for chat in chats {
                    let title = if chat.title.chars().count() > 40 {
                        let prefix: String = chat.title.chars().take(37).collect();
                        format!("{}...", prefix)
                    } else {
                        chat.title
                    };
                    table.add_row(prettytable::row![
                        chat.id.cyan(),
                        title,
                        chat.messages.len(),
                        format_local(&chat.created)
                    ]);
                }

                println!("\nChats:");
                table.printstd();
                println!();
                println!(
                    "Use {} to resume a chat.",
                    "chathook chat --resume <ID>".cyan()
                );
            }
            ChatsCommand::Show { id } => match store.load_chat(&id)? {
                Some(chat) => {
                    println!("{}", chat.title.bold());
                    for msg in &chat.messages {
                        let who = if msg.is_user { "you" } else { "bot" };
                        println!("[{}] {}: {}", format_local(&msg.timestamp), who, msg.text);
                    }
                }
                None => println!("{}", format!("No chat with id {}", id).yellow()),
            },
            ChatsCommand::New => {
                // The most recent chat stands in for the session's current
                // chat, so repeated `chats new` does not pile up empty chats.
                let most_recent = store.list_chats()?.first().map(|chat| chat.id.clone());
                match store.create_chat(most_recent.as_deref())? {
                    Some(chat) => println!("{} {}", "Created".green(), chat.id),
                    None => println!(
                        "{}",
                        "Most recent chat is empty; not creating another".yellow()
                    ),
                }
            }
            ChatsCommand::Delete { id } => {
                let outcome = store.delete_chat(&id, None)?;
                if outcome.removed {
                    println!("{}", format!("Deleted chat {}", id).green());
                } else {
                    println!("{}", format!("No chat with id {}", id).yellow());
                }
                if let Some(replacement) = outcome.replacement {
                    println!("Store was empty; created {}", replacement.id);
                }
            }
        }

        Ok(())
    }
}
