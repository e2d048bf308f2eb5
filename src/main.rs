use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use giveaway_picker::config::Config;
use giveaway_picker::dispatch::{CancelToken, Dispatcher, Progress, ProgressEvent};
use giveaway_picker::format::{Style, format_winners};
use giveaway_picker::messenger::ForumMessenger;
use giveaway_picker::models::{DispatchSession, Winner};
use giveaway_picker::scraper::{Scraper, load_pool_file};
use giveaway_picker::selection::{OsRandom, pick_winners};

#[derive(Parser)]
#[command(
    name = "giveaway-picker",
    version,
    about = "Draw giveaway winners from a forum like list and message them",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Draw winners from a topic's like list
    Pick {
        /// Number of winners to draw
        #[arg(short, long)]
        count: usize,

        /// Output style 1-8 (1: @Name (ID: n) inline ... 8: Name per line)
        #[arg(short, long)]
        style: Option<String>,

        #[command(flatten)]
        source: PoolSource,

        /// Also write the winners as JSON for a later `send`
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Send a private message to every winner in a saved winner file
    Send {
        /// JSON winner file written by `pick --save`
        #[arg(short, long)]
        winners: PathBuf,

        #[arg(long)]
        subject: String,

        #[arg(long)]
        body: String,

        /// CSRF token; fetched from the compose page when omitted
        #[arg(long)]
        csrf: Option<String>,

        /// Seconds to wait between recipients
        #[arg(long)]
        delay: Option<u64>,

        /// Attempts per recipient
        #[arg(long)]
        attempts: Option<u32>,

        /// Seconds to wait before retrying a failed send
        #[arg(long)]
        backoff: Option<u64>,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct PoolSource {
    /// Saved copy of the topic page
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Topic URL to fetch
    #[arg(short, long)]
    topic: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = Config::from_env()?;

    match cli.command {
        Commands::Pick {
            count,
            style,
            source,
            save,
        } => pick(&config, count, style.as_deref(), source, save).await,
        Commands::Send {
            winners,
            subject,
            body,
            csrf,
            delay,
            attempts,
            backoff,
            json,
        } => {
            let mut config = config;
            if let Some(secs) = delay {
                config.dispatch.delay_between_sends = Duration::from_secs(secs);
            }
            if let Some(n) = attempts {
                if n == 0 {
                    bail!("--attempts must be at least 1");
                }
                config.dispatch.max_attempts = n;
            }
            if let Some(secs) = backoff {
                config.dispatch.retry_backoff = Duration::from_secs(secs);
            }

            send(&config, &winners, subject, body, csrf, json).await
        }
    }
}

async fn pick(
    config: &Config,
    count: usize,
    style: Option<&str>,
    source: PoolSource,
    save: Option<PathBuf>,
) -> Result<()> {
    let pool = match (source.file, source.topic) {
        (Some(path), _) => load_pool_file(&path)?,
        (None, Some(url)) => {
            Scraper::new(config, config.session_jar()?)?
                .fetch_topic_pool(&url)
                .await?
        }
        (None, None) => bail!("either --file or --topic is required"),
    };

    let winners = pick_winners(&pool, count, &mut OsRandom)?;
    let style = Style::from_choice(style);

    println!("{}", format_winners(&winners, style));

    if let Some(path) = save {
        let json = serde_json::to_string_pretty(&winners)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Saved {} winner(s) to {}", winners.len(), path.display());
    }

    Ok(())
}

async fn send(
    config: &Config,
    winners_path: &Path,
    subject: String,
    body: String,
    csrf: Option<String>,
    json: bool,
) -> Result<()> {
    let raw = std::fs::read_to_string(winners_path)
        .with_context(|| format!("Failed to read {}", winners_path.display()))?;
    let winners: Vec<Winner> = serde_json::from_str(&raw)?;

    if winners.is_empty() {
        bail!("{} lists no winners", winners_path.display());
    }
    if subject.trim().is_empty() || body.trim().is_empty() {
        bail!("a subject and a message body are required");
    }

    // Shared by the compose-page fetch and every send
    let jar = config.session_jar()?;

    let csrf_token = match csrf {
        Some(token) => token,
        None => {
            Scraper::new(config, jar.clone())?
                .fetch_csrf_token(&config.compose_url())
                .await?
        }
    };

    let session = DispatchSession::new(csrf_token, subject, body);
    let dispatcher = Dispatcher::new(ForumMessenger::new(config, jar)?);

    let cancel = CancelToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current send");
            ctrl_c.cancel();
        }
    });

    let report = dispatcher
        .send_all(&winners, &session, &config.dispatch, &cancel, log_progress)
        .await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{}/{} messages sent successfully. {} failed.",
            report.succeeded, report.total, report.failed
        );
        for target in report.target_reports.iter().filter(|t| !t.succeeded) {
            let reason = if target.interrupted {
                "interrupted".to_string()
            } else if target.error_messages.is_empty() {
                "no response from forum".to_string()
            } else {
                target.error_messages.join("; ")
            };
            println!(
                "  {} ({} attempt(s)): {}",
                target.username, target.attempts, reason
            );
        }
        if report.cancelled {
            println!("Cancelled before every winner was messaged.");
        }
    }

    Ok(())
}

fn log_progress(progress: &Progress) {
    match &progress.event {
        ProgressEvent::Delivered => info!(
            "Sending messages... ({}/{}) delivered to {}",
            progress.completed, progress.total, progress.username
        ),
        ProgressEvent::Retrying { reason } => warn!(
            "Sending messages... ({}/{}) attempt {} for {} failed: {}",
            progress.completed, progress.total, progress.attempt, progress.username, reason
        ),
        ProgressEvent::Rejected { messages } => error!(
            "Sending messages... ({}/{}) {} rejected: {}",
            progress.completed,
            progress.total,
            progress.username,
            messages.join("; ")
        ),
        ProgressEvent::GaveUp { reason } => error!(
            "Sending messages... ({}/{}) gave up on {}: {}",
            progress.completed, progress.total, progress.username, reason
        ),
    }
}
