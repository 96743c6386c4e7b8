mod bot;
mod config;
mod error;
mod images;
mod platform;
mod poster;
mod scheduler;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;

use bot::Bot;
use config::Config;
use error::Error;
use images::selector;
use platform::discord::DiscordClient;
use platform::{OutgoingMessage, Platform};
use scheduler::{Trigger, Triggers};

const PING_TEXT: &str = "テストメッセージ: 画像用チャンネルに投稿できています！";

#[derive(Parser)]
#[command(
    name = "kidsly-bot",
    version,
    about = "Posts a scheduled reminder with a random image from a Discord channel"
)]
struct Cli {
    #[arg(short, long, default_value = "~/.kidsly-bot/config.toml")]
    config: String,
    /// Debug-level logging for this crate
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Stay resident and post on the configured schedule
    Run,
    /// Fetch images, post once and exit
    Once,
    /// Write a config template to ~/.kidsly-bot/
    Init,
    /// List the image candidates the bot would choose from
    Images {
        /// Also scan message text for image URLs
        #[arg(long)]
        inline_links: bool,
        /// Run the selector and print the pick
        #[arg(long)]
        pick: bool,
    },
    /// List visible channels and check the configured ones
    Channels {
        /// Dump this many recent messages from the source channel
        #[arg(long, default_value_t = 0)]
        messages: u8,
    },
    /// Post every image candidate, one message each
    SendTest {
        /// Destination channel (defaults to CHANNEL_ID)
        #[arg(long)]
        channel: Option<String>,
        /// Pause between messages, in milliseconds
        #[arg(long, default_value_t = 1000)]
        delay_ms: u64,
    },
    /// Post a test message
    Ping {
        /// Destination channel (defaults to IMAGE_CHANNEL_ID)
        #[arg(long)]
        channel: Option<String>,
        #[arg(long, default_value = PING_TEXT)]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new("info,kidsly_bot=debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn dispatch(cli: Cli) -> Result<ExitCode> {
    let load = || config::load(&cli.config);
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Init => {
            let path = config::init_config_dir().await?;
            tracing::info!("Config template at {}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run => run(load()?).await,
        Commands::Once => once(load()?).await,
        Commands::Images { inline_links, pick } => list_images(load()?, inline_links, pick).await,
        Commands::Channels { messages } => channels(load()?, messages).await,
        Commands::SendTest { channel, delay_ms } => {
            send_test(load()?, channel, Duration::from_millis(delay_ms)).await
        }
        Commands::Ping { channel, text } => ping(load()?, channel, &text).await,
    }
}

async fn connect(cfg: &Config) -> Result<Arc<dyn Platform>> {
    let client = DiscordClient::new(
        cfg.token()?,
        &cfg.discord.api_base,
        Duration::from_secs(cfg.discord.timeout_secs),
    )?;
    let me = client.current_user().await.context("Login failed")?;
    tracing::info!("Bot is ready! Logged in as {} ({})", me.tag(), me.id);
    Ok(Arc::new(client))
}

async fn run(cfg: Config) -> Result<ExitCode> {
    cfg.validate()?;
    let tz = poster::parse_timezone(&cfg.schedule.timezone)?;
    let refresh = Trigger::new("refresh", &cfg.schedule.refresh, tz)?;
    let post = Trigger::new("post", &cfg.schedule.post, tz)?;

    let platform = connect(&cfg).await?;
    let bot = Arc::new(Bot::new(platform, &cfg)?);
    bot.refresh().await;

    tracing::info!("Scheduled tasks set:");
    tracing::info!("- {refresh}");
    tracing::info!("- {post}");

    let mut triggers = Triggers::new();
    let refresh_bot = Arc::clone(&bot);
    triggers.spawn(refresh, move || {
        let bot = Arc::clone(&refresh_bot);
        async move {
            bot.refresh().await;
        }
    });
    let post_bot = Arc::clone(&bot);
    triggers.spawn(post, move || {
        let bot = Arc::clone(&post_bot);
        async move {
            bot.post_from_store().await;
        }
    });

    match triggers.run_until(signal::ctrl_c()).await {
        Ok(interrupted) => {
            interrupted?;
            tracing::info!("Shutting down");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            tracing::error!("Scheduler stopped unexpectedly: {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn once(cfg: Config) -> Result<ExitCode> {
    cfg.validate()?;
    let platform = connect(&cfg).await?;
    let bot = Bot::new(platform, &cfg)?;

    let outcome = bot.run_once().await;
    if outcome.is_sent() {
        tracing::info!("Daily task completed successfully!");
        Ok(ExitCode::SUCCESS)
    } else {
        tracing::error!("Daily task finished without posting: {outcome:?}");
        Ok(ExitCode::FAILURE)
    }
}

async fn list_images(cfg: Config, inline_links: bool, pick: bool) -> Result<ExitCode> {
    let source = cfg.image_source()?;
    let platform = connect(&cfg).await?;
    let inline = inline_links || cfg.reader.include_inline_links;
    let images =
        images::collect(platform.as_ref(), &source, cfg.reader.window_size, inline).await;

    if images.is_empty() {
        println!("No images found");
        return Ok(ExitCode::SUCCESS);
    }
    for (i, img) in images.iter().enumerate() {
        let size = img
            .size_bytes
            .map(|s| format!(", {s} bytes"))
            .unwrap_or_default();
        println!(
            "Image {}: {} ({}{size}) - {}",
            i + 1,
            img.filename.as_deref().unwrap_or("-"),
            img.source,
            img.url
        );
    }

    if pick {
        let mut rng = selector::rng_from_seed(cfg.selector.seed);
        if let Some(img) = selector::select(&images, &mut rng) {
            println!("Picked: {}", img.url);
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn channels(cfg: Config, messages: u8) -> Result<ExitCode> {
    let platform = connect(&cfg).await?;

    let visible = platform.visible_channels().await?;
    println!("Visible channels ({}):", visible.len());
    for ch in &visible {
        println!("- {} ({}) type {}", ch.display_name(), ch.id, ch.kind);
    }

    let configured = [
        ("CHANNEL_ID", cfg.target_channel().ok()),
        ("IMAGE_CHANNEL_ID", cfg.source_channel().ok()),
    ];
    for (name, id) in configured {
        let Some(id) = id else {
            println!("{name}: not set");
            continue;
        };
        match platform.resolve_channel(id).await {
            Ok(ch) => println!("{name}: {} ({}) type {}", ch.display_name(), ch.id, ch.kind),
            Err(Error::ChannelNotFound { .. }) => println!("{name}: {id} NOT FOUND"),
            Err(e) => println!("{name}: {id} error: {e}"),
        }
    }

    if messages > 0 {
        let id = cfg.source_channel()?;
        let window = platform
            .fetch_recent_messages(id, messages)
            .await
            .with_context(|| format!("Failed to fetch messages from {id}"))?;
        println!("\nFound {} messages in the channel:", window.len());
        for (i, msg) in window.iter().enumerate() {
            let author = msg.author.as_ref().map(|a| a.tag()).unwrap_or_default();
            let content = if msg.content.is_empty() {
                "(no text content)"
            } else {
                msg.content.as_str()
            };
            println!("\n--- Message {} ({}) ---", i + 1, msg.id);
            println!("Author: {author}");
            println!("Content: {content}");
            println!("Attachments: {}", msg.attachments.len());
            for att in &msg.attachments {
                println!(
                    "  {} [{}] {} bytes, image: {} - {}",
                    att.filename,
                    att.content_type.as_deref().unwrap_or("unknown"),
                    att.size.unwrap_or_default(),
                    att.is_image(),
                    att.url
                );
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn send_test(cfg: Config, channel: Option<String>, delay: Duration) -> Result<ExitCode> {
    let target = match channel {
        Some(id) => id,
        None => cfg.target_channel()?.to_string(),
    };
    let source = cfg.image_source()?;
    let platform = connect(&cfg).await?;

    if !resolve_or_report(platform.as_ref(), &target).await? {
        return Ok(ExitCode::FAILURE);
    }

    let images = images::collect(
        platform.as_ref(),
        &source,
        cfg.reader.window_size,
        cfg.reader.include_inline_links,
    )
    .await;
    if images.is_empty() {
        tracing::error!("No images found to send");
        return Ok(ExitCode::FAILURE);
    }

    let total = images.len();
    tracing::info!("Sending {total} test images to channel {target}");
    for (i, img) in images.iter().enumerate() {
        let text = format!("テスト画像 {}/{total}", i + 1);
        platform
            .send_message(&target, &OutgoingMessage::with_image(text, img.to_upload()))
            .await
            .with_context(|| format!("Failed to send test image {}", img.url))?;
        tracing::info!("Sent test image {}/{total}", i + 1);
        if i + 1 < total {
            tokio::time::sleep(delay).await;
        }
    }
    tracing::info!("All test images sent successfully!");
    Ok(ExitCode::SUCCESS)
}

async fn ping(cfg: Config, channel: Option<String>, text: &str) -> Result<ExitCode> {
    let target = match channel {
        Some(id) => id,
        None => cfg.source_channel()?.to_string(),
    };
    let platform = connect(&cfg).await?;

    if !resolve_or_report(platform.as_ref(), &target).await? {
        return Ok(ExitCode::FAILURE);
    }
    platform
        .send_message(&target, &OutgoingMessage::text(text))
        .await
        .context("Failed to send test message")?;
    tracing::info!("Test message sent successfully!");
    Ok(ExitCode::SUCCESS)
}

/// `Ok(false)` when the channel does not resolve; the alternatives are logged.
async fn resolve_or_report(platform: &dyn Platform, channel_id: &str) -> Result<bool> {
    match platform.resolve_channel(channel_id).await {
        Ok(ch) => {
            tracing::info!("Posting to channel: {} ({})", ch.display_name(), ch.id);
            Ok(true)
        }
        Err(Error::ChannelNotFound { .. }) => {
            tracing::error!("Channel not found: {channel_id}");
            platform::log_available_channels(platform).await;
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}
