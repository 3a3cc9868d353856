//! tgview CLI - browse static Telegram chat exports

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tgview_core::config::InitialChunk;
use tgview_core::navigate::{NavOutcome, NavTarget};
use tgview_core::render::html_document;
use tgview_core::search::{MediaFilter, media_items};
use tgview_core::{Config, Viewer};
use tracing_subscriber::EnvFilter;

mod pretty;

#[derive(Debug, Parser)]
#[command(
    name = "tgview",
    author,
    version,
    about = "Viewer for static Telegram chat exports",
    propagate_version = true
)]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Export directory or base URL (overrides config)
    #[arg(long, global = true, env = "TGVIEW_ARCHIVE")]
    archive: Option<String>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List chats in the archive
    Chats {
        /// Only chats whose title contains this text
        #[arg(long)]
        filter: Option<String>,
    },

    /// Show a chat
    Show {
        /// Chat ID
        chat: String,

        /// Load this many older chunks after opening
        #[arg(long, default_value = "0")]
        older: usize,

        /// Load this many newer chunks after opening
        #[arg(long, default_value = "0")]
        newer: usize,

        /// Open on this message
        #[arg(long)]
        goto: Option<String>,

        /// Jump to the first message on or after this date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Open on the oldest chunk instead of the newest
        #[arg(long)]
        first: bool,

        /// Write the rendered feed as an HTML document instead of printing it
        #[arg(long)]
        html: Option<PathBuf>,

        /// Print the feed as JSON
        #[arg(long)]
        json: bool,
    },

    /// Follow a deep link fragment (e.g. "#chat_001")
    Open {
        /// Location fragment
        fragment: String,

        /// Message to bring into view
        #[arg(long)]
        goto: Option<String>,
    },

    /// Search messages
    Search {
        /// Search query
        query: String,

        /// Search only this chat
        #[arg(long)]
        chat: Option<String>,

        /// Search every chat (default when no chat is given)
        #[arg(long)]
        all: bool,
    },

    /// List media of a chat
    Media {
        /// Chat ID
        chat: String,

        /// Only this kind (photo, video, voice, file)
        #[arg(long)]
        kind: Option<MediaFilter>,

        /// Load the whole chat instead of the initial chunk
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over -v
    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Load config
    let config_path = cli.config.unwrap_or_else(Config::default_config_path);
    let mut config = Config::ensure_at(&config_path)?;
    if let Some(archive) = cli.archive {
        config.archive = archive;
    }

    match cli.command {
        Command::Chats { filter } => cmd_chats(config, filter.as_deref()).await,
        Command::Show {
            chat,
            older,
            newer,
            goto,
            date,
            first,
            html,
            json,
        } => {
            if first {
                config.pager.initial_chunk = InitialChunk::First;
            }
            let opts = ShowOptions {
                older,
                newer,
                goto,
                date,
                html,
                json,
            };
            cmd_show(config, &chat, opts).await
        }
        Command::Open { fragment, goto } => cmd_open(config, &fragment, goto).await,
        Command::Search { query, chat, all } => match chat {
            Some(chat) if !all => cmd_search_chat(config, &chat, &query).await,
            _ => cmd_search_all(config, &query).await,
        },
        Command::Media { chat, kind, all } => cmd_media(config, &chat, kind, all).await,
    }
}

async fn cmd_chats(config: Config, filter: Option<&str>) -> Result<()> {
    let mut viewer = Viewer::from_config(config)?;
    let manifest = viewer.chats().await?;
    let chats = manifest.filter_chats(filter.unwrap_or_default());
    pretty::print_chats(&chats, manifest.total_messages());
    Ok(())
}

struct ShowOptions {
    older: usize,
    newer: usize,
    goto: Option<String>,
    date: Option<NaiveDate>,
    html: Option<PathBuf>,
    json: bool,
}

async fn cmd_show(config: Config, chat: &str, opts: ShowOptions) -> Result<()> {
    let mut viewer = Viewer::from_config(config)?;
    let target = opts.goto.clone().map(NavTarget::new);
    viewer
        .open_chat(chat, target)
        .await
        .with_context(|| format!("Failed to open chat {chat}"))?;

    for _ in 0..opts.older {
        match viewer.load_older().await {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => {
                eprintln!("  Error loading older messages: {err}");
                break;
            }
        }
    }
    for _ in 0..opts.newer {
        match viewer.load_newer().await {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => {
                eprintln!("  Error loading newer messages: {err}");
                break;
            }
        }
    }

    if let Some(id) = &opts.goto {
        if !viewer.session().feed().contains(id) {
            report(&NavOutcome::Unresolved {
                message_id: id.clone(),
                reason: "not found in the archive".to_string(),
            });
        }
    }
    if let Some(date) = opts.date {
        report(&viewer.jump_to_date(date).await);
    }

    output(&viewer, opts.html.as_deref(), opts.json)
}

async fn cmd_open(config: Config, fragment: &str, goto: Option<String>) -> Result<()> {
    let mut viewer = Viewer::from_config(config)?;
    let outcome = viewer
        .open_fragment(fragment, goto.map(NavTarget::new))
        .await?;
    if let Some(outcome) = &outcome {
        report(outcome);
    }
    if viewer.session().chat_id().is_none() {
        return cmd_chats(viewer.config().clone(), None).await;
    }
    output(&viewer, None, false)
}

async fn cmd_search_chat(config: Config, chat: &str, query: &str) -> Result<()> {
    let mut viewer = Viewer::from_config(config)?;
    viewer.open_chat(chat, None).await?;
    if !viewer.session().has_search_index() {
        // without an index only loaded messages are searchable
        load_everything(&mut viewer).await;
    }
    let hits = viewer.search(query);
    pretty::print_chat_hits(chat, &hits, &viewer.session().cursor().position());
    Ok(())
}

async fn cmd_search_all(config: Config, query: &str) -> Result<()> {
    let mut viewer = Viewer::from_config(config)?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    spinner.set_message(format!("Searching all chats for \"{query}\"..."));
    spinner.enable_steady_tick(Duration::from_millis(100));
    let results = viewer.cross_search(query).await;
    spinner.finish_and_clear();

    pretty::print_global_results(&results?);
    Ok(())
}

async fn cmd_media(
    config: Config,
    chat: &str,
    kind: Option<MediaFilter>,
    all: bool,
) -> Result<()> {
    let mut viewer = Viewer::from_config(config)?;
    viewer.open_chat(chat, None).await?;
    if all {
        load_everything(&mut viewer).await;
    }
    let items = media_items(&viewer.session().store().flatten(), kind);
    pretty::print_media(&items);
    Ok(())
}

/// Load the whole chat; chunks that fail are reported and left out.
async fn load_everything(viewer: &mut Viewer) {
    for e in viewer.load_all().await {
        eprintln!("Skipped a chunk: {e}");
    }
}

fn report(outcome: &NavOutcome) {
    match outcome {
        NavOutcome::Shown { message_id } => println!("Showing {message_id}"),
        NavOutcome::Unresolved { message_id, reason } => {
            eprintln!("Could not show {message_id}: {reason}");
        }
    }
}

fn output(viewer: &Viewer, html: Option<&Path>, json: bool) -> Result<()> {
    let session = viewer.session();
    if let Some(path) = html {
        let title = session.title().or(session.chat_id()).unwrap_or("tgview");
        let document = html_document(title, &session.render_html());
        std::fs::write(path, document)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote {}", path.display());
        return Ok(());
    }
    if json {
        println!("{}", serde_json::to_string_pretty(session.feed())?);
        return Ok(());
    }
    pretty::print_feed(session);
    Ok(())
}
