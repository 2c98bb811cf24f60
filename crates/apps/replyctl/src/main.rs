//! replyctl - inspect conversation resolution over a telephony snapshot
//!
//! Runs the engine headless against a SQLite snapshot of the SMS, MMS and
//! contact stores. `watch` replays UI events from stdin through the
//! coordinator and prints every published state as JSON.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use log::{error, info};
use smartreply::{
    ActiveConversation, ActiveConversationCoordinator, ConversationLookup, ConversationState,
    EngineConfig, Message, ScrapedMessage, SmartReplyEngine, SqliteMessageStore, Thread, UiEvent,
    parse_message_description,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(name = "replyctl")]
#[command(about = "Inspect conversation resolution over a telephony snapshot", long_about = None)]
#[command(version)]
struct Cli {
    /// SQLite snapshot of the SMS/MMS/contact stores
    #[arg(long, value_name = "PATH")]
    db: PathBuf,

    /// Engine config file (defaults to ~/.config/smartreply/smartreply.json)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Number of this device; repeat for dual-SIM
    #[arg(long = "self-number", value_name = "NUMBER")]
    self_numbers: Vec<String>,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List threads, newest first
    Threads {
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
    /// Show which thread a conversation title resolves to
    Resolve { title: String },
    /// Print the merged timeline for a conversation title
    Timeline { title: String },
    /// List contacts
    Contacts,
    /// Read UI events from stdin: `title <text>`, `msg <description>|<text>`,
    /// `clear`, `left`, `send <text>`
    Watch,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if let Err(e) = config::init() {
        error!("Failed to initialize config directory: {}", e);
    }

    if let Err(e) = run(Cli::parse()).await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let engine_config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::load()?,
    };
    if !cli.db.exists() {
        bail!("Snapshot database not found: {}", cli.db.display());
    }
    let store = SqliteMessageStore::open(&cli.db)
        .with_context(|| format!("Failed to open snapshot {}", cli.db.display()))?;
    let engine = SmartReplyEngine::new(Arc::new(store), cli.self_numbers.clone(), engine_config);

    match cli.command {
        Command::Threads { limit } => list_threads(&engine, limit, cli.json),
        Command::Resolve { ref title } => resolve(&engine, title, cli.json),
        Command::Timeline { ref title } => timeline(&engine, title, cli.json),
        Command::Contacts => list_contacts(&engine, cli.json),
        Command::Watch => watch(&engine).await,
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn thread_line(thread: &Thread) -> String {
    format!(
        "{:>6}  {}  {:<32} {:>4} msgs  {}",
        thread.thread_id,
        format_time(thread.last_message_at()),
        thread.display_name(),
        thread.message_count,
        thread.last_message_body.replace('\n', " ")
    )
}

fn message_line(message: &Message) -> String {
    let who = if message.is_from_me {
        "me".to_string()
    } else {
        message
            .sender_name
            .clone()
            .unwrap_or_else(|| message.address.clone())
    };
    format!(
        "{}  {:>20}: {}",
        format_time(message.sent_at()),
        who,
        message.body
    )
}

fn list_threads(engine: &SmartReplyEngine, limit: usize, json: bool) -> Result<()> {
    let threads = engine.threads();
    let shown: Vec<&Thread> = threads.iter().take(limit).collect();
    if json {
        return print_json(&shown);
    }
    for thread in &shown {
        println!("{}", thread_line(thread));
    }
    info!("{} of {} threads", shown.len(), threads.len());
    Ok(())
}

fn resolve(engine: &SmartReplyEngine, title: &str, json: bool) -> Result<()> {
    let threads = engine.threads();
    let Some((thread, tier)) = smartreply::resolve_title(&threads, title) else {
        bail!("No thread matches '{title}'");
    };
    if json {
        return print_json(thread);
    }
    println!("{}", thread_line(thread));
    println!("matched by {tier:?}");
    Ok(())
}

fn timeline(engine: &SmartReplyEngine, title: &str, json: bool) -> Result<()> {
    let thread = engine
        .resolve_title(title)
        .with_context(|| format!("No thread matches '{title}'"))?;
    let active = ActiveConversation::new(thread.thread_id.clone(), thread.contact_name.clone(), vec![]);
    let report = engine
        .timeline(&active, Utc::now())
        .with_context(|| format!("Thread {} disappeared", thread.thread_id))?;

    if json {
        return print_json(&report.timeline);
    }
    println!("{}", thread_line(&report.timeline.thread));
    for message in &report.timeline.messages {
        println!("{}", message_line(message));
    }
    if let Some(gap) = report.gap {
        println!("gap: {gap:?} ({})", smartreply::query::format_gap(gap.days()));
    }
    if let Some(topic) = report.topic {
        println!("topic: {topic:?}");
    }
    Ok(())
}

fn list_contacts(engine: &SmartReplyEngine, json: bool) -> Result<()> {
    let contacts = engine.merger().list_contacts();
    if json {
        return print_json(&contacts);
    }
    for contact in &contacts {
        println!("{:<32} {}", contact.name, contact.phone_number);
    }
    Ok(())
}

/// Wait until no lookup is pending, or give up after `limit`
async fn wait_until_settled(
    states: &mut watch::Receiver<ConversationState>,
    limit: Duration,
) -> Result<()> {
    tokio::time::timeout(
        limit,
        states.wait_for(|s| !matches!(s, ConversationState::Resolving { .. })),
    )
    .await
    .with_context(|| format!("Lookup still running after {limit:?}"))?
    .context("Coordinator stopped while resolving")?;
    Ok(())
}

/// How long `watch` waits for a pending lookup at end of input
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

async fn watch(engine: &SmartReplyEngine) -> Result<()> {
    let lookup: Arc<dyn ConversationLookup> = engine.resolver().clone();
    let (coordinator, mut outgoing) =
        ActiveConversationCoordinator::new(lookup, tokio::runtime::Handle::current());

    let mut settled = coordinator.subscribe();
    let mut states = coordinator.subscribe();
    let printer = tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().clone();
            match serde_json::to_string(&state) {
                Ok(line) => println!("{line}"),
                Err(e) => error!("Failed to serialize state: {e}"),
            }
        }
    });
    let sender = tokio::spawn(async move {
        while let Some(out) = outgoing.recv().await {
            println!("-> [{}] {}", out.thread_id, out.text);
        }
    });

    let mut scraped: Vec<ScrapedMessage> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
        match verb {
            "" => {}
            "msg" => match rest.split_once('|') {
                Some((description, text)) => match parse_message_description(description, text) {
                    Some(message) => scraped.push(message),
                    None => error!("Unrecognized message bubble: {rest}"),
                },
                None => error!("Expected `msg <description>|<text>`"),
            },
            "title" => coordinator.handle_event(UiEvent::TitleDetected {
                title: rest.to_string(),
                scraped: std::mem::take(&mut scraped),
            }),
            "clear" => coordinator.handle_event(UiEvent::TitleCleared),
            "left" => coordinator.handle_event(UiEvent::AppLeft),
            "send" => {
                if let Err(e) = coordinator.submit_outgoing(rest) {
                    error!("{e}");
                }
            }
            other => error!("Unknown command '{other}'"),
        }
    }

    // Let a lookup still in flight publish before exiting
    if let Err(e) = wait_until_settled(&mut settled, LOOKUP_TIMEOUT).await {
        error!("{e:#}");
    }
    // Closing the channel lets the printer drain the final state and exit
    drop(coordinator);
    if tokio::time::timeout(LOOKUP_TIMEOUT, printer).await.is_err() {
        error!("State printer did not finish");
    }
    sender.abort();
    Ok(())
}
