//! Relay servers.
//!
//! Two transports with the same semantics: receive a request, merge it over
//! the base configuration, execute it against the shared desk session. The
//! WebSocket variant streams every log line back to the caller in real time;
//! the plain TCP variant is fire-and-forget.
//!
//! Commands serialize on the session mutex: a request arriving while another
//! command is mid-movement waits its turn instead of racing the desk.

use crate::bluetooth::DeskSession;
use crate::config::Config;
use crate::controller::run_command;
use crate::models::LogSink;
use crate::relay::CommandRequest;
use anyhow::Result;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error};

/// Delay before closing a WebSocket connection, so trailing log lines reach
/// the peer.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Message-socket variant: accept WebSocket connections and stream command
/// output back to each caller.
pub async fn run_message_server(session: Arc<Mutex<DeskSession>>, config: Config) -> Result<()> {
    let listener =
        TcpListener::bind((config.server_address.as_str(), config.server_port)).await?;
    println!("Server listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        debug!("Connection from {peer}");
        let session = session.clone();
        let config = config.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_message_client(stream, session, config).await {
                error!("Relay connection error: {e:#}");
            }
        });
    }
}

async fn handle_message_client(
    stream: TcpStream,
    session: Arc<Mutex<DeskSession>>,
    config: Config,
) -> Result<()> {
    let socket = tokio_tungstenite::accept_async(stream).await?;
    let (write, mut read) = socket.split();

    // Exactly one request per connection.
    let request: CommandRequest = loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => break serde_json::from_str(&text)?,
            Some(Ok(Message::Close(_))) | None => return Ok(()),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
        }
    };
    println!("Received command");

    let (tx, lines) = mpsc::unbounded_channel();
    let writer = tokio::spawn(forward_lines(write, lines));
    let sink = LogSink::with_forward(tx);

    let merged = config.merge_request(&request);
    {
        let session = session.lock().await;
        if let Err(e) = run_command(&session, &merged, &sink).await {
            // Errors stay on this connection; other clients are unaffected.
            sink.line(format!("Command failed: {e:#}"));
        }
    }

    time::sleep(CLOSE_GRACE).await;
    drop(sink);
    writer.await?;
    Ok(())
}

/// Push log lines to the peer until the channel closes, then close the
/// socket from our side.
async fn forward_lines(
    mut write: SplitSink<WebSocketStream<TcpStream>, Message>,
    mut lines: mpsc::UnboundedReceiver<String>,
) {
    while let Some(line) = lines.recv().await {
        if write.send(Message::Text(line)).await.is_err() {
            break;
        }
    }
    let _ = write.close().await;
}

/// Streaming-socket variant: read the whole request until the peer closes
/// its write side, execute, write nothing back.
pub async fn run_tcp_server(session: Arc<Mutex<DeskSession>>, config: Config) -> Result<()> {
    let listener =
        TcpListener::bind((config.server_address.as_str(), config.server_port)).await?;
    println!("TCP Server listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        debug!("Connection from {peer}");
        let session = session.clone();
        let config = config.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_tcp_client(stream, session, config).await {
                error!("Relay connection error: {e:#}");
            }
        });
    }
}

async fn handle_tcp_client(
    mut stream: TcpStream,
    session: Arc<Mutex<DeskSession>>,
    config: Config,
) -> Result<()> {
    println!("Received command");
    let mut payload = Vec::new();
    stream.read_to_end(&mut payload).await?;
    let request: CommandRequest = serde_json::from_slice(&payload)?;

    let merged = config.merge_request(&request);
    let session = session.lock().await;
    run_command(&session, &merged, &LogSink::console()).await
}
