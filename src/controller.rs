//! Top-level run loop.
//!
//! Dispatches the selected action, owns the shared desk session, and
//! guarantees Stop + Disconnect on every exit path (success, error, or
//! interrupt) once a connection was established.

use crate::bluetooth::scanner;
use crate::bluetooth::session::{self, DeskSession};
use crate::config::{Action, Config};
use crate::models::LogSink;
use crate::relay;
use crate::units::UnitConverter;
use anyhow::Result;
use btleplug::platform::Manager;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::error;

pub struct Controller {
    config: Config,
}

impl Controller {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn run(&self) -> Result<()> {
        match self.config.action() {
            // Forward and scan don't require a desk connection.
            Action::Forward => report(relay::client::forward(&self.config).await),
            Action::Scan => report(scanner::scan(&self.config).await),
            _ => self.run_connected().await,
        }
    }

    /// Connect, dispatch, and always clean up the connection afterwards.
    async fn run_connected(&self) -> Result<()> {
        let manager = Manager::new().await?;
        let adapter = scanner::find_adapter(&manager, &self.config.adapter_name).await?;
        let session = Arc::new(Mutex::new(DeskSession::new(adapter, &self.config)?));

        // Fatal on failure: nothing below is meaningful without the desk.
        session.lock().await.connect().await?;

        let outcome = tokio::select! {
            result = self.dispatch(&session) => report(result),
            _ = tokio::signal::ctrl_c() => {
                println!("Interrupted...");
                Ok(())
            }
        };

        let mut session = session.lock().await;
        if session.is_connected() {
            println!("Disconnecting");
            let _ = session.stop().await;
            if let Err(e) = session.disconnect().await {
                error!("Disconnect failed: {e:#}");
            } else {
                println!("Disconnected!");
            }
        }

        outcome
    }

    async fn dispatch(&self, session: &Arc<Mutex<DeskSession>>) -> Result<()> {
        match self.config.action() {
            Action::Server => {
                spawn_link_monitor(session);
                relay::server::run_message_server(session.clone(), self.config.clone()).await
            }
            Action::TcpServer => {
                spawn_link_monitor(session);
                relay::server::run_tcp_server(session.clone(), self.config.clone()).await
            }
            _ => {
                let session = session.lock().await;
                run_command(&session, &self.config, &LogSink::console()).await
            }
        }
    }
}

fn spawn_link_monitor(session: &Arc<Mutex<DeskSession>>) {
    let session = session.clone();
    tokio::spawn(async move {
        if let Err(e) = session::monitor_link(session).await {
            error!("Link monitor failed: {e:#}");
        }
    });
}

/// Log an unexpected failure before it unwinds past the cleanup block.
fn report(result: Result<()>) -> Result<()> {
    if let Err(e) = &result {
        error!("Something unexpected went wrong: {e:#}");
    }
    result
}

/// Execute the command selected by `config` against the session, emitting
/// output through `sink`. This is what both the direct run path and the
/// relay servers invoke.
pub async fn run_command(session: &DeskSession, config: &Config, sink: &LogSink) -> Result<()> {
    let converter = session.converter();

    // Always report the current height first.
    let initial = session.read_telemetry().await?;
    sink.line(format!(
        "Height: {:4.0}mm",
        converter.raw_to_mm(i32::from(initial.position))
    ));

    let mut target = None;
    if config.watch {
        sink.line("Watching for changes to desk height and speed");
        let mut samples = session.subscribe_telemetry().await?;
        while let Some(sample) = samples.recv().await {
            sink.line(format!(
                "Height: {:4.0}mm Speed: {:2.0}mm/s",
                converter.raw_to_mm(i32::from(sample.position)),
                UnitConverter::raw_to_speed(sample.speed)
            ));
        }
        session.unsubscribe_telemetry().await;
    } else if let Some(spec) = &config.move_to {
        let mm = match resolve_target(spec, &config.favourites) {
            Some(ResolvedTarget::Favourite(mm)) => {
                sink.line(format!("Moving to favourite height: {spec}"));
                mm
            }
            Some(ResolvedTarget::Height(mm)) => {
                sink.line(format!("Moving to height: {spec}"));
                mm
            }
            None => {
                sink.line(format!("Not a valid height or favourite position: {spec}"));
                return Ok(());
            }
        };

        let raw = converter.mm_to_raw(mm);
        session.move_to(raw, sink).await?;
        target = Some(raw);
    }

    if let Some(raw) = target {
        let sample = session.read_telemetry().await?;
        sink.line(format!(
            "Final height: {:4.0}mm (Target: {:4.0}mm)",
            converter.raw_to_mm(i32::from(sample.position)),
            converter.raw_to_mm(raw)
        ));
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedTarget {
    Favourite(i32),
    Height(i32),
}

/// Map a `--move-to` argument to a height in mm: a favourite name wins over
/// a numeric height; anything else is invalid and causes no movement.
pub fn resolve_target(spec: &str, favourites: &HashMap<String, i32>) -> Option<ResolvedTarget> {
    if let Some(mm) = favourites.get(spec) {
        return Some(ResolvedTarget::Favourite(*mm));
    }
    spec.trim()
        .parse::<i32>()
        .ok()
        .map(ResolvedTarget::Height)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn favourites() -> HashMap<String, i32> {
        HashMap::from([("sit".to_string(), 700), ("stand".to_string(), 1100)])
    }

    #[test]
    fn favourite_name_resolves() {
        assert_eq!(
            resolve_target("sit", &favourites()),
            Some(ResolvedTarget::Favourite(700))
        );
    }

    #[test]
    fn numeric_height_resolves() {
        assert_eq!(
            resolve_target("720", &favourites()),
            Some(ResolvedTarget::Height(720))
        );
        assert_eq!(
            resolve_target(" 100 ", &favourites()),
            Some(ResolvedTarget::Height(100))
        );
    }

    #[test]
    fn favourite_wins_over_number_parse() {
        let favourites = HashMap::from([("100".to_string(), 999)]);
        assert_eq!(
            resolve_target("100", &favourites),
            Some(ResolvedTarget::Favourite(999))
        );
    }

    #[test]
    fn unknown_name_is_invalid() {
        assert_eq!(resolve_target("lounge", &favourites()), None);
        assert_eq!(resolve_target("12.5", &favourites()), None);
        assert_eq!(resolve_target("", &favourites()), None);
    }
}
