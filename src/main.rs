mod api;
mod app;
mod auth;
mod cache;
mod config;
mod error;
mod mock_data;
mod models;
mod parser;
mod routes;
mod seed;
mod server;
mod store;
mod ui;
mod uploads;
mod views;

use anyhow::Context;
use app::App;
use clap::{Parser, Subcommand};
use config::Config;
use crossterm::{
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use models::{Actor, Role};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "taskboard", version, about = "Task assignments for students and mentors")]
struct Cli {
    /// TOML config file. Defaults to <config dir>/taskboard/config.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the REST API.
    Serve {
        /// Where the HTTP API will listen, e.g. 127.0.0.1:4000
        #[arg(long)]
        listen: Option<String>,

        /// JSON document file holding the tasks.
        #[arg(long)]
        data_file: Option<PathBuf>,

        /// Directory for submitted files.
        #[arg(long)]
        upload_dir: Option<PathBuf>,
    },
    /// Open the terminal client.
    Tui {
        #[arg(long)]
        api_url: Option<String>,

        /// User id sent with every request.
        #[arg(long)]
        user: Option<String>,

        #[arg(long)]
        role: Option<Role>,
    },
    /// Reset the document file to the sample tasks.
    Seed {
        #[arg(long)]
        data_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Serve {
            listen,
            data_file,
            upload_dir,
        } => {
            init_stderr_logging();
            if let Some(listen) = listen {
                config.server.listen = listen;
            }
            if let Some(path) = data_file {
                config.server.data_file = path;
            }
            if let Some(path) = upload_dir {
                config.server.upload_dir = path;
            }
            server::serve(&config.server).await
        }
        Command::Seed { data_file } => {
            init_stderr_logging();
            let path = data_file.unwrap_or(config.server.data_file);
            let count = seed::run(&path)
                .await
                .with_context(|| format!("seeding {}", path.display()))?;
            println!("Seeded {} tasks into {}", count, path.display());
            Ok(())
        }
        Command::Tui {
            api_url,
            user,
            role,
        } => {
            if let Some(url) = api_url {
                config.client.api_url = url;
            }
            if let Some(user) = user {
                config.client.user_id = user;
            }
            if let Some(role) = role {
                config.client.role = role;
            }
            init_file_logging()?;
            run_tui(config).await
        }
    }
}

fn init_stderr_logging() {
    fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

// The terminal belongs to the UI, so the client logs to a file.
fn init_file_logging() -> anyhow::Result<()> {
    let dir = config::log_dir();
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join("tui.log");
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening {}", path.display()))?;
    fmt()
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    Ok(())
}

async fn run_tui(config: Config) -> anyhow::Result<()> {
    let actor = Actor {
        id: config.client.user_id,
        role: config.client.role,
    };
    let api = api::ApiClient::new(&config.client.api_url, actor);
    let parser = parser::QuickAddParser::new()?;
    let mentors = mock_data::mentors().context("loading the mentor directory")?;
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let app = App::new(api, parser, mentors, tx);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = ui::run_app(&mut terminal, app, rx).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res.context("terminal client failed")
}
