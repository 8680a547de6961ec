use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use pdfchat_core::{Config, ConfigError, QaClient};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod app;
mod handler;
mod markdown;
mod tui;
mod ui;

use app::App;
use tui::{AppEvent, EventHandler, Tui};

#[derive(Parser, Debug)]
#[command(name = "pdfchat", version)]
#[command(about = "Chat with a PDF question-answering backend from the terminal")]
struct Cli {
    /// Absolute URL of the QA endpoint, e.g. http://localhost:8000/chat
    #[arg(short, long, env = "PDFCHAT_ENDPOINT")]
    endpoint: Option<String>,

    /// Give up on a request after this many seconds (default: wait indefinitely)
    #[arg(long, env = "PDFCHAT_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Config file to use instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,

    /// Where to write the diagnostic log
    #[arg(long, env = "PDFCHAT_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Save the resolved endpoint and timeout to the config file
    #[arg(long)]
    save: bool,
}

impl Cli {
    fn overrides(&self) -> Config {
        Config {
            endpoint: self.endpoint.clone(),
            timeout_secs: self.timeout_secs,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env (if present) before clap reads the environment
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(Config::default_path);
    let config = Config::load_or_default(config_path.as_deref())?.merge(cli.overrides());
    let settings = config.resolve()?;

    if cli.save {
        let path = config_path.ok_or(ConfigError::NoConfigDir)?;
        config.save_to(&path)?;
        println!("Saved configuration to {}", path.display());
    }

    let log_path = init_logging(cli.log_file.clone())?;
    info!(endpoint = %settings.endpoint, log = %log_path.display(), "starting pdfchat");

    let client = QaClient::new(&settings).context("failed to build HTTP client")?;
    run(client).await
}

/// Send diagnostics to a file; stderr belongs to the terminal UI.
fn init_logging(path: Option<PathBuf>) -> Result<PathBuf> {
    let path = match path {
        Some(path) => path,
        None => dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("pdfchat")
            .join("pdfchat.log"),
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .init();

    Ok(path)
}

async fn run(client: QaClient) -> Result<()> {
    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();

    // Probe the backend once; the result only feeds the header
    let probe = client.clone();
    let health_tx = events.sender();
    tokio::spawn(async move {
        let online = match probe.health().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "backend health check failed");
                false
            }
        };
        let _ = health_tx.send(AppEvent::Health(online));
    });

    let label = client.endpoint_label();
    let mut app = App::new(Arc::new(client), label, events.sender());

    let result = event_loop(&mut terminal, &mut events, &mut app).await;

    app.shutdown();
    tui::restore()?;
    info!(messages = app.session.len(), "pdfchat exited");
    result
}

async fn event_loop(terminal: &mut Tui, events: &mut EventHandler, app: &mut App) -> Result<()> {
    while !app.should_quit {
        // Redraw after every event so the view always reflects the session
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event),
            None => break,
        }
    }
    Ok(())
}
