use crate::app::actions::Action;
use crate::app::events::Event;
use anyhow::{Context, bail};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

pub const HELP: &str = "\
commands:
  play <n>            play entry n of the browse list
  queue <n>           play entry n of the history queue
  next | prev         skip forward / back (n / p)
  toggle              play or pause
  seek <secs>         jump to a position; +secs / -secs is relative
  vol <0-100|+|->     set or step the volume
  mode [name]         cycle or set: sequential, single, random
  quality [name]      cycle or set: 128k, 320k, flac, flac24bit
  platform <name>     netease, qq or kuwo (clears the browse list)
  keyword <text>      set the search keyword
  browse <file>       load a JSON track list as the browse list
  playall [file]      replace history with a track list (or the browse list) and play it
  remove <n>          drop entry n from the history
  clear               drop the whole history
  status | history | help | quit";

/// Read commands from stdin, one per line.
pub fn spawn_input_task(tx: mpsc::Sender<Event>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    let _ = tx.send(Event::Input(Action::Quit)).await;
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "stdin closed");
                    break;
                }
            };
            match parse_line(&line) {
                Ok(Some(action)) => {
                    if tx.send(Event::Input(action)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => println!("{e:#}"),
            }
        }
    });
}

/// Parse one command line. Blank lines are `None`. Positions are typed
/// one-based and returned zero-based.
pub fn parse_line(line: &str) -> anyhow::Result<Option<Action>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let (cmd, arg) = match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (line, ""),
    };

    let action = match cmd.to_ascii_lowercase().as_str() {
        "q" | "quit" | "exit" => Action::Quit,
        "?" | "h" | "help" => Action::Help,
        "s" | "status" => Action::Status,
        "history" | "ls" => Action::History,

        "play" => Action::PlayBrowse(position(arg)?),
        "queue" => Action::PlayQueue(position(arg)?),
        "n" | "next" => Action::PlayNext,
        "p" | "prev" | "previous" => Action::PlayPrev,
        "toggle" | "pause" | "resume" => Action::TogglePause,
        "seek" => seek(arg)?,
        "vol" | "volume" => volume(arg)?,

        "mode" if arg.is_empty() => Action::CycleMode,
        "mode" => Action::SetMode(arg.parse()?),
        "quality" if arg.is_empty() => Action::CycleQuality,
        "quality" => Action::SetQuality(arg.parse()?),
        "platform" => Action::SwitchPlatform(arg.parse()?),
        "keyword" => Action::SetKeyword(arg.to_string()),

        "browse" => Action::LoadBrowse(path(arg)?),
        "playall" if arg.is_empty() => Action::PlayAll(None),
        "playall" => Action::PlayAll(Some(PathBuf::from(arg))),
        "remove" | "rm" => Action::QueueRemove(position(arg)?),
        "clear" => Action::QueueClear,

        other => bail!("unknown command `{other}` (try `help`)"),
    };
    Ok(Some(action))
}

fn position(arg: &str) -> anyhow::Result<usize> {
    let n: usize = arg
        .parse()
        .with_context(|| format!("expected a position, got `{arg}`"))?;
    if n == 0 {
        bail!("positions start at 1");
    }
    Ok(n - 1)
}

fn seek(arg: &str) -> anyhow::Result<Action> {
    let secs = |s: &str| {
        s.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .with_context(|| format!("expected seconds, got `{arg}`"))
    };
    if let Some(rest) = arg.strip_prefix('+') {
        Ok(Action::SeekBy(secs(rest)?))
    } else if arg.starts_with('-') {
        Ok(Action::SeekBy(secs(arg)?))
    } else {
        Ok(Action::Seek(secs(arg)?))
    }
}

fn volume(arg: &str) -> anyhow::Result<Action> {
    match arg {
        "+" | "up" => Ok(Action::VolumeUp),
        "-" | "down" => Ok(Action::VolumeDown),
        _ => {
            let v: u16 = arg
                .parse()
                .with_context(|| format!("expected a volume 0-100, got `{arg}`"))?;
            Ok(Action::SetVolume(v.min(100) as u8))
        }
    }
}

fn path(arg: &str) -> anyhow::Result<PathBuf> {
    if arg.is_empty() {
        bail!("expected a file path");
    }
    Ok(PathBuf::from(arg))
}
