mod app;
mod catalog;
mod config;
mod input;
mod ledger;
mod lyrics;
mod notifier;
mod persist;
mod player;
mod queue;
mod session;
mod snapshot;
mod storage;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "reprise", version, about = "Multi-platform music player that picks up where you left off")]
struct Cli {
    /// Override config file path.
    #[arg(long)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the interactive player, reading commands from stdin (default).
    Run,
    /// Print the durable play history, most recent first (headless).
    History,
    /// Parse a time-coded lyric file and print its cues (headless).
    Lyrics { path: std::path::PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let cfg = config::load(cli.config.as_deref()).context("load config")?;
            let mut app = app::App::new(cfg)?;
            app.run().await?;
        }
        Command::History => {
            let cfg = config::load(cli.config.as_deref()).context("load config")?;
            let storage = storage::Storage::open(&cfg.database_path())?;
            let records = storage.list()?;
            if records.is_empty() {
                println!("no history");
            }
            for (i, r) in records.iter().enumerate() {
                println!(
                    "{:02}. {} - {}  [{} / {}]  ({})",
                    i + 1,
                    r.name,
                    r.artist,
                    app::format_clock(r.play_time),
                    app::format_clock(r.duration),
                    r.key()
                );
            }
        }
        Command::Lyrics { path } => {
            let raw = std::fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
            for cue in lyrics::parse(&raw) {
                let centis = (cue.time * 100.0).round() as u64;
                println!(
                    "[{:02}:{:02}.{:02}] {}",
                    centis / 6000,
                    centis / 100 % 60,
                    centis % 100,
                    cue.text
                );
            }
        }
    }

    Ok(())
}
