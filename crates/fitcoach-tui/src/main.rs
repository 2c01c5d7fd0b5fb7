use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use fitcoach_core::{ApiClient, Config, Console, FileSettingsStore, MemorySettingsStore, SettingsStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod app;
mod handler;
mod tui;
mod ui;
mod widgets;

use app::App;
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "fitcoach")]
#[command(version, about = "Chat with your training data through Gemini and MCP tools")]
struct Args {
    /// Backend origin, e.g. http://localhost:8080
    #[arg(long, env = "FITCOACH_API_BASE")]
    api_base: Option<String>,

    /// Start with "Include context" switched off
    #[arg(long)]
    no_context: bool,

    /// Keep the model choice in memory only
    #[arg(long)]
    ephemeral: bool,

    /// Log at debug level
    #[arg(long)]
    debug: bool,

    /// Log file (defaults to the cache directory)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

/// Logs go to a file; stderr belongs to the terminal UI.
fn init_logging(args: &Args) -> Result<PathBuf> {
    let path = match &args.log_file {
        Some(path) => path.clone(),
        None => dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("fitcoach")
            .join("fitcoach.log"),
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening log file {}", path.display()))?;

    let default_level = if args.debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("fitcoach={0},fitcoach_core={0}", default_level))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .init();

    Ok(path)
}

fn settings_store(ephemeral: bool) -> Arc<dyn SettingsStore> {
    if ephemeral {
        return Arc::new(MemorySettingsStore::new());
    }
    match FileSettingsStore::default_path() {
        Ok(path) => Arc::new(FileSettingsStore::open(path)),
        Err(e) => {
            tracing::warn!(error = %e, "no settings directory, model choice will not persist");
            Arc::new(MemorySettingsStore::new())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_path = init_logging(&args)?;

    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        Config::new()
    });
    let api_base = config.resolve_api_base(args.api_base.as_deref());
    let include_context = config.include_context && !args.no_context;
    tracing::info!(api_base = %api_base, log = %log_path.display(), "starting fitcoach");

    let backend = Arc::new(ApiClient::new(&api_base));
    let console = Console::new(backend, settings_store(args.ephemeral), include_context);

    // Subscribe before the first fetches so no settle is missed
    let mut events = EventHandler::new();
    events.watch_queries(console.queries().subscribe());
    console.start();

    let mut app = App::new(console, api_base, events.sender());

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let result = run(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event),
            None => break,
        }
    }
    Ok(())
}
