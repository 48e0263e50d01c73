//! # Inbox Harvest CLI (`harvest`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `harvest init` | Create the SQLite database and run schema migrations |
//! | `harvest status` | Show settings, cursor, and catalog counts |
//! | `harvest configure` | Set bot token, chat id, or storage mode |
//! | `harvest inspect` | Count pending messages per chat |
//! | `harvest sync` | Import pending videos from the bot inbox |
//! | `harvest reset` | Rewind the cursor so the next sync replays the inbox |
//! | `harvest catalog` | List the newest catalog entries |
//! | `harvest webhook enable/disable` | Switch between push and pull delivery |
//! | `harvest serve` | Start the HTTP server |
//! | `harvest completions <shell>` | Print shell completions |
//!
//! Logs go to stderr and honour `RUST_LOG` (default `info`).

use anyhow::{anyhow, Result};
use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

use inbox_harvest::admin::{self, SettingsUpdate, SettingsView};
use inbox_harvest::config::{self, Config};
use inbox_harvest::inbox_telegram::TelegramClient;
use inbox_harvest::migrate;
use inbox_harvest::models::{InboxReport, StorageMode, SyncReport};
use inbox_harvest::progress::ProgressMode;
use inbox_harvest::server;
use inbox_harvest::status;
use inbox_harvest::store::sqlite::SqliteStore;
use inbox_harvest::store::Store;
use inbox_harvest::sync::{effective_token, EngineOptions, SyncEngine, SyncOptions};

/// Inbox Harvest: import videos posted to a Telegram bot into a local catalog.
#[derive(Parser)]
#[command(name = "harvest", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/harvest.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Show settings, cursor position, and catalog counts.
    Status,

    /// Update stored settings. Omitted flags keep their current value.
    Configure {
        /// Bot token; "" or "***" leaves the stored token unchanged.
        #[arg(long)]
        bot_token: Option<String>,

        /// Numeric chat id, with or without the leading '-'.
        #[arg(long, allow_hyphen_values = true)]
        chat_id: Option<String>,

        /// download | reference-only
        #[arg(long)]
        mode: Option<StorageMode>,
    },

    /// List chats with pending messages and how many carry video.
    Inspect {
        #[arg(long)]
        json: bool,
    },

    /// Import pending videos from the bot inbox.
    Sync {
        /// Rewind the cursor to 0 before fetching.
        #[arg(long)]
        from_beginning: bool,

        #[arg(long, value_enum, default_value = "auto")]
        progress: ProgressMode,

        /// Print the result as JSON on stdout.
        #[arg(long)]
        json: bool,
    },

    /// Rewind the cursor to 0 without importing anything.
    Reset,

    /// List the newest catalog entries.
    Catalog {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Manage push delivery.
    Webhook {
        #[command(subcommand)]
        action: WebhookAction,
    },

    /// Start the HTTP server (webhook, sync trigger, inspect).
    Serve,

    /// Print shell completions to stdout.
    Completions {
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum WebhookAction {
    /// Register `<url>/webhook` with the Bot API. Pull sync stops working
    /// until the webhook is disabled.
    Enable {
        /// Public base URL of `harvest serve`.
        #[arg(long)]
        url: String,
    },
    /// Remove the webhook so pull sync works again.
    Disable,
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!(e))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "harvest", &mut std::io::stdout());
        return Ok(());
    }

    init_tracing()?;
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Status => {
            status::run_status(&cfg).await?;
        }
        Commands::Configure {
            bot_token,
            chat_id,
            mode,
        } => {
            let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&cfg).await?);
            let defaults = EngineOptions::from_config(&cfg).initial_state;
            let view = if bot_token.is_none() && chat_id.is_none() && mode.is_none() {
                admin::current_settings(store.as_ref(), defaults).await?
            } else {
                let update = SettingsUpdate {
                    bot_token,
                    chat_id,
                    mode,
                };
                admin::configure(store, defaults, update).await?
            };
            print_settings(&view);
        }
        Commands::Inspect { json } => {
            let engine = SyncEngine::from_config(&cfg).await?;
            let report = engine.inspect_inbox().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_inspect(&report);
            }
        }
        Commands::Sync {
            from_beginning,
            progress,
            json,
        } => {
            let engine = SyncEngine::from_config(&cfg).await?;
            let reporter = progress.reporter();
            let report = engine
                .run_sync(SyncOptions { from_beginning }, reporter.as_ref())
                .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_sync(&report);
            }
        }
        Commands::Reset => {
            let store: Arc<dyn Store> = Arc::new(SqliteStore::open(&cfg).await?);
            admin::reset_cursor(store, EngineOptions::from_config(&cfg).initial_state).await?;
            println!("Cursor reset. The next sync replays the whole inbox.");
        }
        Commands::Catalog { limit } => {
            status::run_catalog(&cfg, limit).await?;
        }
        Commands::Webhook { action } => {
            let token = resolve_token(&cfg).await?;
            let client = TelegramClient::new(
                &cfg.telegram.api_base,
                Duration::from_secs(cfg.telegram.timeout_secs),
            )?;
            match action {
                WebhookAction::Enable { url } => {
                    let registered = admin::enable_webhook(
                        &client,
                        &token,
                        &url,
                        cfg.server.webhook_secret.as_deref(),
                    )
                    .await?;
                    println!("Webhook registered: {}", registered);
                }
                WebhookAction::Disable => {
                    admin::disable_webhook(&client, &token).await?;
                    println!("Webhook removed. Pull sync is available again.");
                }
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Completions { .. } => unreachable!("handled before config loading"),
    }

    Ok(())
}

async fn resolve_token(cfg: &Config) -> Result<String> {
    let store = SqliteStore::open(cfg).await?;
    let options = EngineOptions::from_config(cfg);
    let state = store
        .load_state()
        .await?
        .unwrap_or(options.initial_state);
    store.close().await;
    Ok(effective_token(&state, options.fallback_token.as_deref())?)
}

fn print_settings(view: &SettingsView) {
    println!(
        "  Chat:      {}",
        if view.chat_id.is_empty() { "not set" } else { view.chat_id.as_str() }
    );
    println!(
        "  Bot token: {}",
        view.bot_token.as_deref().unwrap_or("not set")
    );
    println!("  Mode:      {}", view.mode);
    println!("  Offset:    {}", view.offset);
}

fn print_inspect(report: &InboxReport) {
    println!("{} pending update(s)", report.total_updates);
    if report.chats.is_empty() {
        return;
    }
    println!();
    println!("  {:<20} {:>8} {:>7}   TITLE", "CHAT ID", "MESSAGES", "VIDEOS");
    println!("  {}", "-".repeat(60));
    for chat in &report.chats {
        println!(
            "  {:<20} {:>8} {:>7}   {}",
            chat.chat_id, chat.message_count, chat.media_count, chat.title
        );
    }
}

fn print_sync(report: &SyncReport) {
    println!(
        "Imported {} video(s) from {} update(s) ({} skipped, {} failed). Offset now {}.",
        report.added_count, report.updates_seen, report.skipped, report.failed, report.offset
    );
    for added in &report.added {
        println!("  + {}  {}", added.id, added.title);
    }
}
