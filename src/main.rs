//! mangablog - reader client CLI
//!
//! Drives the token manager, response cache and thumbnail resolver from
//! the terminal.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mangablog::config::Config;
use mangablog::models::PostRecord;
use mangablog::App;

#[derive(Parser)]
#[command(name = "mangablog")]
#[command(about = "Reader client for a manga/blog site", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate with the identity provider (device code flow)
    Login {
        /// Force interactive login even if a valid token exists
        #[arg(short, long)]
        force: bool,
    },

    /// Log out and clear stored credentials
    Logout,

    /// Show current authentication status
    Status,

    /// Print a valid access token, refreshing it if needed
    Token,

    /// Force a token refresh
    Refresh,

    /// Show the signed-in user's profile
    Whoami {
        /// Bypass the cached profile
        #[arg(short, long)]
        refresh: bool,
    },

    /// Inspect or edit cached API responses
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Resolve the thumbnail for a post record (JSON file, `-` for stdin)
    Thumbnail {
        file: PathBuf,

        /// Target size in pixels (defaults to config)
        #[arg(short, long)]
        size: Option<u32>,
    },

    /// Manage bookmarks
    Bookmarks {
        #[command(subcommand)]
        action: BookmarkAction,
    },

    /// Manage reading history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached keys
    List,
    /// Print a fresh cached payload
    Get { key: String },
    /// Store a JSON payload
    Set { key: String, json: String },
    /// Remove an entry
    Clear { key: String },
}

#[derive(Subcommand)]
enum BookmarkAction {
    List,
    Add {
        slug: String,
        title: String,
        #[arg(long)]
        url: Option<String>,
    },
    Remove {
        slug: String,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    List,
    Add {
        slug: String,
        title: String,
        #[arg(long)]
        url: Option<String>,
        #[arg(long)]
        chapter: Option<String>,
    },
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = Config::load()?;
    let app = App::init(config)?;
    let result = run(&app, cli.command).await;
    app.dispose();
    result
}

async fn run(app: &App, command: Commands) -> Result<()> {
    match command {
        Commands::Login { force } => {
            tracing::info!("Starting authentication flow...");
            mangablog::auth::login(&app.config.identity, &app.tokens, app.clock.as_ref(), force)
                .await?;
        }
        Commands::Logout => {
            tracing::info!("Logging out...");
            app.tokens.clear_tokens();
            println!("Logged out.");
        }
        Commands::Status => status(app),
        Commands::Token => match app.tokens.get_access_token().await {
            Some(token) => println!("{}", token),
            None => bail!("Not logged in. Run 'mangablog login'."),
        },
        Commands::Refresh => match app.tokens.refresh_access_token().await {
            Some(_) => println!("Token refreshed successfully."),
            None => bail!("Token refresh failed. Run 'mangablog login'."),
        },
        Commands::Whoami { refresh } => match app.profile.current_user(&app.tokens, refresh).await {
            Some(profile) => {
                println!();
                println!("Name:    {}", profile.name.as_deref().unwrap_or("(none)"));
                println!("Email:   {}", profile.email.as_deref().unwrap_or("(none)"));
                println!("Picture: {}", profile.picture.as_deref().unwrap_or("(none)"));
                println!("ID:      {}", profile.sub.as_deref().unwrap_or("(none)"));
            }
            None => bail!("No profile available. Run 'mangablog login'."),
        },
        Commands::Cache { action } => cache(app, action)?,
        Commands::Thumbnail { file, size } => thumbnail(app, &file, size)?,
        Commands::Bookmarks { action } => bookmarks(app, action),
        Commands::History { action } => history(app, action),
    }

    Ok(())
}

fn status(app: &App) {
    match app.tokens.snapshot() {
        Some(tokens) => {
            if tokens.is_expired(app.clock.now_ms()) {
                println!("Access token: expired");
            } else {
                println!("Access token: valid");
            }
            println!("  expires_at: {}", tokens.expires_at);
            if tokens.can_refresh() {
                println!("Refresh tok:  present");
            } else {
                println!("Refresh tok:  none");
            }
        }
        None => {
            println!("Access token: none");
            println!("\nRun 'mangablog login' to authenticate.");
        }
    }

    match app.profile.cached() {
        Some(profile) => println!("Profile:      cached ({})", profile.display_name()),
        None => println!("Profile:      not cached"),
    }
}

fn cache(app: &App, action: CacheAction) -> Result<()> {
    match action {
        CacheAction::List => {
            for key in app.cache.keys() {
                let state = if app.cache.get::<serde_json::Value>(&key).is_some() {
                    "fresh"
                } else {
                    "stale"
                };
                println!("{:<40} {}", key, state);
            }
        }
        CacheAction::Get { key } => match app.cache.get::<serde_json::Value>(&key) {
            Some(payload) => println!("{}", serde_json::to_string_pretty(&payload)?),
            None => bail!("No fresh entry for '{}'", key),
        },
        CacheAction::Set { key, json } => {
            let payload: serde_json::Value =
                serde_json::from_str(&json).context("Payload is not valid JSON")?;
            app.cache.set(&key, &payload);
        }
        CacheAction::Clear { key } => app.cache.clear(&key),
    }
    Ok(())
}

fn thumbnail(app: &App, file: &Path, size: Option<u32>) -> Result<()> {
    let content = if file.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin()).context("Failed to read stdin")?
    } else {
        std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?
    };
    let record: PostRecord = serde_json::from_str(&content).context("Invalid post record")?;
    let cached = app.cache.records();
    tracing::debug!("{} cached records available", cached.len());

    let (source, url) = match size {
        Some(size) => app
            .resolver_for_size(size)
            .resolve_with_source(&record, &cached),
        None => app.thumbnails.resolve_with_source(&record, &cached),
    };
    tracing::debug!("Resolved via {:?}", source);
    println!("{}", url);
    Ok(())
}

fn bookmarks(app: &App, action: BookmarkAction) {
    match action {
        BookmarkAction::List => {
            for b in app.library.bookmarks() {
                println!("{:<32} {}", b.slug, b.title);
            }
        }
        BookmarkAction::Add { slug, title, url } => {
            if app.library.add_bookmark(&slug, &title, url.as_deref()) {
                println!("Bookmarked {}.", slug);
            } else {
                println!("{} is already bookmarked.", slug);
            }
        }
        BookmarkAction::Remove { slug } => {
            if app.library.remove_bookmark(&slug) {
                println!("Removed {}.", slug);
            } else {
                println!("{} was not bookmarked.", slug);
            }
        }
    }
}

fn history(app: &App, action: HistoryAction) {
    match action {
        HistoryAction::List => {
            for h in app.library.history() {
                println!(
                    "{:<32} {} {}",
                    h.slug,
                    h.title,
                    h.chapter.as_deref().unwrap_or("")
                );
            }
        }
        HistoryAction::Add {
            slug,
            title,
            url,
            chapter,
        } => app
            .library
            .record_visit(&slug, &title, url.as_deref(), chapter.as_deref()),
        HistoryAction::Clear => {
            app.library.clear_history();
            println!("History cleared.");
        }
    }
}
