use super::{InboundMessage, OutboundMessage};
use crate::app::events::{Event, WindowEvent};
use anyhow::Context;
use std::path::PathBuf;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{UnixListener, UnixStream},
    sync::{broadcast, mpsc},
};

/// JSON-lines socket the detached lyrics window connects to.
#[derive(Debug)]
pub struct WindowChannel {
    socket_path: PathBuf,
    outbound: broadcast::Sender<String>,
}

impl WindowChannel {
    pub fn bind(socket_path: PathBuf, event_tx: mpsc::Sender<Event>) -> anyhow::Result<Self> {
        let _ = std::fs::remove_file(&socket_path);
        let listener = UnixListener::bind(&socket_path)
            .with_context(|| format!("bind window socket {}", socket_path.display()))?;
        let (outbound, _) = broadcast::channel(64);

        tokio::spawn(accept_loop(listener, outbound.clone(), event_tx));
        tracing::info!(path = %socket_path.display(), "lyrics window socket ready");

        Ok(Self {
            socket_path,
            outbound,
        })
    }

    /// Fire and forget. No window attached is not an error.
    pub fn send(&self, msg: &OutboundMessage) {
        match serde_json::to_string(msg) {
            Ok(line) => {
                let _ = self.outbound.send(line);
            }
            Err(e) => tracing::warn!(error = %e, "encode window message"),
        }
    }
}

impl Drop for WindowChannel {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

async fn accept_loop(
    listener: UnixListener,
    outbound: broadcast::Sender<String>,
    event_tx: mpsc::Sender<Event>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                tokio::spawn(serve(stream, outbound.subscribe(), event_tx.clone()));
            }
            Err(e) => {
                tracing::warn!(error = %e, "window socket accept failed");
                break;
            }
        }
    }
}

async fn serve(
    stream: UnixStream,
    mut outbound: broadcast::Receiver<String>,
    event_tx: mpsc::Sender<Event>,
) {
    let (reader, mut writer) = stream.into_split();
    if event_tx.send(Event::Window(WindowEvent::Attached)).await.is_err() {
        return;
    }

    let mut lines = BufReader::new(reader).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => match serde_json::from_str::<InboundMessage>(&line) {
                    Ok(msg) => {
                        if event_tx.send(Event::Window(WindowEvent::Message(msg))).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::debug!(error = %e, "ignoring unrecognised window message"),
                },
                _ => break,
            },
            out = outbound.recv() => match out {
                Ok(mut line) => {
                    line.push('\n');
                    if writer.write_all(line.as_bytes()).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "lyrics window lagging, frames dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    let _ = event_tx.send(Event::Window(WindowEvent::Detached)).await;
}
