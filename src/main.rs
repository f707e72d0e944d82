use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{error, info, LevelFilter};
use std::env;
use std::sync::{Arc, Mutex};

mod utils;

use haggle::models::UserRef;
use haggle::offers::{classify_message, ClassifyContext, MessageKind};
use haggle::socket::dispatcher::ChatEvent;
use haggle::socket::EventKind;
use haggle::storage::{self, Session};
use haggle::{api::ApiClient, ChatSocket, ConversationList, MessageStore};

/// Command line arguments for Haggle
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Haggle: a marketplace chat client with offer negotiation.",
    long_about = "Haggle is a command-line client for the marketplace messaging service.\n\n\
    Store a session with `haggle login`, then `haggle watch` to stream chat\n\
    events, or `haggle send` to post a message into a conversation."
)]
struct Args {
    /// API origin, e.g. https://market.example.com/api (or set
    /// HAGGLE_API_URL)
    #[arg(long, value_name = "URL")]
    api_url: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    log_file: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store the auth token and profile used by every other command
    Login,
    /// Forget the stored session
    Logout,
    /// List conversations (most recent first)
    Conversations {
        /// Show archived conversations instead of active ones
        #[arg(long)]
        archived: bool,
    },
    /// Send a message into a conversation
    Send {
        conversation_id: String,
        content: String,
    },
    /// Connect the socket, join all conversation rooms and stream events
    Watch,
}

/// Prompts for login details, preferring environment variables
fn prompt_login() -> Result<(String, UserRef)> {
    let token = env::var("HAGGLE_TOKEN").unwrap_or_else(|_| {
        eprintln!("Enter auth token:");
        utils::read_line().unwrap_or_default()
    });
    if token.is_empty() {
        return Err(anyhow!("A token is required to log in"));
    }

    let user_id = env::var("HAGGLE_USER_ID").unwrap_or_else(|_| {
        eprintln!("Enter your user id:");
        utils::read_line().unwrap_or_default()
    });
    let email = env::var("HAGGLE_EMAIL").unwrap_or_else(|_| {
        eprintln!("Enter your email:");
        utils::read_line().unwrap_or_default()
    });

    let mut user = UserRef::new(&user_id);
    if !email.is_empty() {
        user = user.with_email(&email);
    }
    Ok((token, user))
}

fn load_session_or_fail() -> Result<Session> {
    storage::load_session()?.ok_or_else(|| anyhow!("No stored session; run `haggle login` first"))
}

async fn run_conversations(api: &ApiClient, archived: bool) -> Result<()> {
    let conversations = api.list_conversations(archived).await?;
    if conversations.is_empty() {
        println!("No conversations.");
        return Ok(());
    }

    for conversation in &conversations {
        let preview = conversation
            .last_message
            .as_ref()
            .map(|m| m.content.as_str())
            .unwrap_or("<no messages>");
        let marker = if conversation.archived { " [archived]" } else { "" };
        println!(
            "{}{}  unread:{}  {}",
            conversation.id, marker, conversation.unread_count, preview
        );
    }
    Ok(())
}

async fn run_send(api: &ApiClient, session: &Session, conversation_id: &str, content: &str) -> Result<()> {
    let mut store = MessageStore::new();
    let optimistic = store.send_optimistic(conversation_id, &session.user, content);

    match api.send_message(conversation_id, content).await {
        Ok(confirmed) => {
            let id = confirmed.id.clone();
            store.reconcile(&optimistic.id, confirmed);
            println!("Sent message {}", id);

            let kind = classify_message(content, &ClassifyContext::default());
            if let MessageKind::OfferProposal { amount } = kind {
                println!("(offer proposal for ${})", amount);
            }
            Ok(())
        }
        Err(e) => {
            store.rollback(&optimistic.id);
            Err(anyhow!("Failed to send, try again: {}", e))
        }
    }
}

async fn run_watch(api: &ApiClient, session: &Session, api_url: &str) -> Result<()> {
    let conversations = api.list_conversations(false).await?;
    let conversation_ids: Vec<String> = conversations.iter().map(|c| c.id.clone()).collect();

    let list = Arc::new(Mutex::new(ConversationList::new(session.user.clone())));
    list.lock().unwrap().replace(conversations);

    let socket = ChatSocket::new(api_url);

    let list_for_messages = list.clone();
    socket.dispatcher().subscribe(
        EventKind::NewMessage,
        Some("watch-messages"),
        move |event| {
            if let ChatEvent::NewMessage(message) = event {
                println!(
                    "[{}] {}: {}",
                    message.conversation_id, message.sender.id, message.content
                );
                list_for_messages.lock().unwrap().apply_incoming(message);
            }
        },
    );
    socket
        .dispatcher()
        .subscribe(EventKind::TypingStart, Some("watch-typing"), |event| {
            if let ChatEvent::TypingStart {
                user_id,
                conversation_id,
            } = event
            {
                println!("[{}] {} is typing...", conversation_id, user_id);
            }
        });
    socket
        .dispatcher()
        .subscribe(EventKind::Disconnected, Some("watch-status"), |event| {
            if let ChatEvent::Disconnected { reason } = event {
                println!("(disconnected: {})", reason);
            }
        });
    socket
        .dispatcher()
        .subscribe(EventKind::Reconnected, Some("watch-reconnect"), |_| {
            println!("(reconnected)");
        });

    socket.connect(&session.token()).await?;
    socket.join_conversations(&conversation_ids).await?;
    info!("Watching {} conversation(s)", conversation_ids.len());
    println!("Connected. Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    println!("\nShutting down...");
    socket.disconnect().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    utils::setup_logging(args.log_file.as_deref(), level)?;

    let api_url = args
        .api_url
        .clone()
        .or_else(|| env::var("HAGGLE_API_URL").ok())
        .unwrap_or_else(|| "http://localhost:5000/api".to_string());

    match args.command {
        Command::Login => {
            let (token, user) = prompt_login()?;
            storage::save_session(&Session::new(&token, user))?;
            println!("Session stored.");
        }
        Command::Logout => {
            storage::clear_session()?;
            println!("Session cleared.");
        }
        Command::Conversations { archived } => {
            let session = load_session_or_fail()?;
            let api = ApiClient::new(&api_url, &session.token())?;
            run_conversations(&api, archived).await?;
        }
        Command::Send {
            conversation_id,
            content,
        } => {
            let session = load_session_or_fail()?;
            let api = ApiClient::new(&api_url, &session.token())?;
            if let Err(e) = run_send(&api, &session, &conversation_id, &content).await {
                error!("{}", e);
                return Err(e);
            }
        }
        Command::Watch => {
            let session = load_session_or_fail()?;
            let api = ApiClient::new(&api_url, &session.token())?;
            run_watch(&api, &session, &api_url).await?;
        }
    }

    Ok(())
}
