mod comic;
mod config;
mod dispatcher;
mod fortune;
mod logging;
mod telegram;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use image::DynamicImage;
use panelbot_contracts::events::{payload, EventWriter};
use panelbot_contracts::fortune::{FortuneBook, FortuneStore};
use panelbot_engine::compose::{encode_png, TriPanelLayout, DEFAULT_BORDER, DEFAULT_GAP};
use panelbot_engine::providers::parse_dims;
use panelbot_engine::{HttpTransport, RetryController, TosStorage};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;

use crate::comic::ComicStudio;
use crate::config::{BotConfig, Credentials};
use crate::dispatcher::Dispatcher;
use crate::telegram::TelegramClient;

#[derive(Debug, Parser)]
#[command(name = "panelbot", version, about = "Telegram comic and fortune bot")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Long-poll Telegram and answer commands.
    Serve(ServeArgs),
    /// Write the empty tri-panel page template as PNG.
    Layout(LayoutArgs),
}

#[derive(Debug, Parser)]
struct ServeArgs {
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value = "state")]
    state_dir: PathBuf,
}

#[derive(Debug, Parser)]
struct LayoutArgs {
    #[arg(long, default_value = "tri_panel_layout.png")]
    out: PathBuf,
    #[arg(long, default_value = "2048x1024")]
    top: String,
    #[arg(long, default_value = "1024x1024")]
    bottom: String,
    #[arg(long, default_value_t = DEFAULT_GAP)]
    gap: u32,
    #[arg(long, default_value_t = DEFAULT_BORDER)]
    border: u32,
}

const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(3);

fn main() {
    if let Err(err) = run() {
        eprintln!("panelbot error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging()?;
    match cli.command {
        Command::Serve(args) => run_serve(args),
        Command::Layout(args) => run_layout(args),
    }
}

fn run_serve(args: ServeArgs) -> Result<()> {
    let config = BotConfig::load(args.config.as_deref())?;
    let credentials = Credentials::from_env(&config.storage);
    let Some(token) = credentials.telegram_token.clone() else {
        bail!("TG_BOT_TOKEN / BOT_TOKEN is not set");
    };
    std::fs::create_dir_all(&args.state_dir)
        .with_context(|| format!("failed to create {}", args.state_dir.display()))?;

    let instance = format!("{}-{}", Utc::now().format("%Y%m%dT%H%M%S"), std::process::id());
    let events = EventWriter::new(args.state_dir.join("events.jsonl"), instance);
    let client = TelegramClient::new(
        &config.telegram.api_base,
        token,
        Duration::from_secs(config.telegram.poll_timeout_secs),
    )?;

    let transport = HttpTransport::new();
    let store = TosStorage::new(
        transport.clone(),
        credentials.tos.clone(),
        Duration::from_secs(config.storage.timeout_secs),
    );
    let studio = ComicStudio::new(
        RetryController::with_thread_sleeper(transport),
        store,
        &config,
        &credentials,
    )?;
    let fortunes = FortuneBook::new(
        FortuneStore::new(args.state_dir.join(&config.fortune.store_file)),
        StdRng::from_entropy(),
        config.fortune.utc_offset_hours,
    )?;
    let mut dispatcher = Dispatcher::new(
        client,
        studio,
        fortunes,
        events.clone(),
        config.telegram.bot_username.clone(),
    );

    events.record(
        "bot_started",
        payload([("state_dir", json!(args.state_dir.display().to_string()))]),
    );
    tracing::info!("bot running; commands: /start /fortune /dokaku /dongzhuo");

    let mut offset: Option<i64> = None;
    loop {
        let updates = match dispatcher.chat().get_updates(offset) {
            Ok(updates) => updates,
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "polling failed");
                std::thread::sleep(POLL_ERROR_BACKOFF);
                continue;
            }
        };
        for (update_id, update) in updates {
            offset = Some(update_id + 1);
            let Some(update) = update else {
                continue;
            };
            if let Err(err) = dispatcher.handle(update) {
                tracing::warn!(update_id, error = %format!("{err:#}"), "update handling failed");
            }
        }
    }
}

fn run_layout(args: LayoutArgs) -> Result<()> {
    let Some(top) = parse_dims(&args.top) else {
        bail!("invalid --top size '{}', expected WIDTHxHEIGHT", args.top);
    };
    let Some(bottom) = parse_dims(&args.bottom) else {
        bail!("invalid --bottom size '{}', expected WIDTHxHEIGHT", args.bottom);
    };
    let (width, height) = write_layout_template(&args.out, top, bottom, args.gap, args.border)?;
    println!("wrote {} ({width}x{height})", args.out.display());
    Ok(())
}

fn write_layout_template(
    path: &Path,
    top: (u32, u32),
    bottom: (u32, u32),
    gap: u32,
    border: u32,
) -> Result<(u32, u32)> {
    let layout = TriPanelLayout::new(top, bottom, gap);
    let png = encode_png(&DynamicImage::ImageLuma8(layout.render_template(border)))?;
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, png).with_context(|| format!("failed to write {}", path.display()))?;
    Ok((layout.width, layout.height))
}
