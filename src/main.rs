//! Console host for the Tensor bot core.
//!
//! Stands in for the chat-platform layer: reads lines from stdin, routes
//! `/` commands to the moderation store, and sends everything else through
//! the reply pipeline with a rolling history window.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use tensorbot::{
    ChatEngine, Config, KoboldClient, LoggedMessage, MessageLog, ModerationDb, PromptTemplate,
    SamplingParams, StoreError,
};

/// How many history lines are kept for prompt building.
const HISTORY_LINES: usize = 64;

/// The console "user" identity for logging and blacklist checks.
const CONSOLE_USER_ID: i64 = 0;
const CONSOLE_USER_NAME: &str = "You";

/// Warns issued from the console land in this server scope.
const CONSOLE_SERVER_ID: i64 = 0;

struct BotState {
    engine: ChatEngine,
    moderation: ModerationDb,
    message_log: MessageLog,
    /// Stop generation before the model starts speaking for the user.
    stop_sequences: Vec<String>,
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tensor.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    let log_dir = config.log_dir();
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("tensor.log"))
        .expect("Failed to open log file");
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting tensorbot...");
    info!("Loaded config from {config_path}");
    info!("Generation endpoint: {}", config.endpoint);

    let moderation = match ModerationDb::open(&config.moderation_db_path()) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Failed to open moderation database: {e}");
            std::process::exit(1);
        }
    };
    let message_log = match MessageLog::open(&config.message_db_path()) {
        Ok(log) => log,
        Err(e) => {
            eprintln!("Failed to open message log: {e}");
            std::process::exit(1);
        }
    };

    let template = PromptTemplate::default();
    let stop_sequences = vec![
        format!("\n{CONSOLE_USER_NAME}:"),
        "\n### Instruction:".to_string(),
    ];
    let client = KoboldClient::new(config.endpoint.clone(), SamplingParams::default());
    let engine = ChatEngine::new(template, client);

    let state = Arc::new(BotState {
        engine,
        moderation,
        message_log,
        stop_sequences,
    });

    run_console(state).await;
}

async fn run_console(state: Arc<BotState>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut history: Vec<String> = Vec::new();
    let mut line_counter: i64 = 0;

    println!("Talk to {}. /help for commands, /quit to exit.", state.engine.bot_name());

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix('/') {
            if !handle_command(&state, rest) {
                break;
            }
            continue;
        }

        line_counter += 1;
        log_console_message(&state, line_counter, &line);

        match state.moderation.is_blacklisted(CONSOLE_USER_ID) {
            Ok(true) => {
                println!("(you are blacklisted; message ignored)");
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                warn!("Blacklist check failed: {e}");
                continue;
            }
        }

        let input = format!("{CONSOLE_USER_NAME}: {line}");
        let joined = history.join("\n");

        match state
            .engine
            .respond(&joined, &input, Some(&state.stop_sequences))
            .await
        {
            Ok(reply) => {
                println!("{}: {}", state.engine.bot_name(), reply);
                history.push(input);
                history.push(format!("{}: {}", state.engine.bot_name(), reply));
                if history.len() > HISTORY_LINES {
                    let excess = history.len() - HISTORY_LINES;
                    history.drain(..excess);
                }
            }
            Err(e) => {
                warn!("Generation failed: {e}");
                println!("(generation failed: {e})");
            }
        }
    }
}

fn log_console_message(state: &BotState, id: i64, content: &str) {
    let msg = LoggedMessage {
        id,
        guild_id: None,
        channel_id: 0,
        author_id: CONSOLE_USER_ID,
        author_name: CONSOLE_USER_NAME.to_string(),
        author_display_name: CONSOLE_USER_NAME.to_string(),
        content: content.to_string(),
        created_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        edited_at: None,
        jump_url: String::new(),
        mentions: vec![],
        message_type: 0,
        webhook_id: None,
    };
    if let Err(e) = state.message_log.log(&msg) {
        warn!("Failed to log message: {e}");
    }
}

/// Handle a `/` command. Returns false when the loop should exit.
fn handle_command(state: &BotState, command: &str) -> bool {
    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or("");

    match name {
        "quit" | "exit" => return false,
        "help" => {
            println!("/block <user_id>");
            println!("/unblock <user_id>");
            println!("/blacklist");
            println!("/warn <user_id> <reason...>");
            println!("/unwarn <warn_id> <user_id>");
            println!("/warns <user_id>");
            println!("/quit");
        }
        "block" => match parse_id(parts.next()) {
            Some(user_id) => match state.moderation.add_to_blacklist(user_id) {
                Ok(()) => println!("blocked {user_id}"),
                Err(StoreError::AlreadyBlacklisted { .. }) => {
                    println!("{user_id} is already blacklisted")
                }
                Err(e) => warn!("Block failed: {e}"),
            },
            None => println!("usage: /block <user_id>"),
        },
        "unblock" => match parse_id(parts.next()) {
            Some(user_id) => match state.moderation.remove_from_blacklist(user_id) {
                Ok(remaining) => println!("unblocked {user_id}; {remaining} still blacklisted"),
                Err(e) => warn!("Unblock failed: {e}"),
            },
            None => println!("usage: /unblock <user_id>"),
        },
        "blacklist" => match state.moderation.blacklisted_users() {
            Ok(entries) if entries.is_empty() => println!("blacklist is empty"),
            Ok(entries) => {
                for entry in entries {
                    println!("{} (since {})", entry.user_id, entry.created_at);
                }
            }
            Err(e) => warn!("Blacklist listing failed: {e}"),
        },
        "warn" => {
            let user_id = parse_id(parts.next());
            let reason = parts.collect::<Vec<_>>().join(" ");
            match user_id {
                Some(user_id) if !reason.is_empty() => {
                    match state.moderation.add_warn(
                        user_id,
                        CONSOLE_SERVER_ID,
                        CONSOLE_USER_ID,
                        &reason,
                    ) {
                        Ok(warn_id) => println!("warn #{warn_id} recorded for {user_id}"),
                        Err(e) => warn!("Warn failed: {e}"),
                    }
                }
                _ => println!("usage: /warn <user_id> <reason...>"),
            }
        }
        "unwarn" => match (parse_id(parts.next()), parse_id(parts.next())) {
            (Some(warn_id), Some(user_id)) => {
                match state.moderation.remove_warn(warn_id, user_id, CONSOLE_SERVER_ID) {
                    Ok(remaining) => {
                        println!("removed warn #{warn_id}; {remaining} left for {user_id}")
                    }
                    Err(e) => warn!("Unwarn failed: {e}"),
                }
            }
            _ => println!("usage: /unwarn <warn_id> <user_id>"),
        },
        "warns" => match parse_id(parts.next()) {
            Some(user_id) => match state.moderation.warnings(user_id, CONSOLE_SERVER_ID) {
                Ok(warns) if warns.is_empty() => println!("no warnings for {user_id}"),
                Ok(warns) => {
                    for w in warns {
                        println!("#{} by {} at {}: {}", w.warn_id, w.moderator_id, w.created_at, w.reason);
                    }
                }
                Err(e) => warn!("Warn listing failed: {e}"),
            },
            None => println!("usage: /warns <user_id>"),
        },
        _ => println!("unknown command: /{name}"),
    }

    true
}

fn parse_id(arg: Option<&str>) -> Option<i64> {
    arg.and_then(|s| s.parse().ok())
}
