//! Relay client: forward a command to a server instance and print the
//! response stream.

use crate::config::Config;
use crate::relay::CommandRequest;
use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tracing::info;

/// Send the locally-specified target height to the configured server and
/// print every streamed line until the server closes the connection. A
/// connection failure ends the run; there is no retry.
pub async fn forward(config: &Config) -> Result<()> {
    let url = format!("ws://{}:{}", config.server_address, config.server_port);
    info!("Forwarding command to {url}");

    let (mut socket, _) = tokio_tungstenite::connect_async(url.as_str()).await?;

    let request = CommandRequest {
        move_to: config.move_to.clone(),
    };
    socket
        .send(Message::Text(serde_json::to_string(&request)?))
        .await?;

    while let Some(message) = socket.next().await {
        match message {
            Ok(Message::Text(text)) => println!("{text}"),
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    let _ = socket.close(None).await;
    Ok(())
}
