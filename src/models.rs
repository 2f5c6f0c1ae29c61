use tokio::sync::mpsc;

/// A decoded position/speed pair from the desk.
///
/// `position` is the raw tick count above the desk's lowest position,
/// `speed` the raw signed movement rate. Use [`crate::units::UnitConverter`]
/// to turn either into millimeters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetrySample {
    pub position: u16,
    pub speed: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Destination for user-facing command output.
///
/// Every line goes to the local console; when a forwarding channel is
/// attached (relay message-socket variant) the same line is also pushed to
/// the remote peer. Sending never blocks the command producing the output.
#[derive(Debug, Clone, Default)]
pub struct LogSink {
    forward: Option<mpsc::UnboundedSender<String>>,
}

impl LogSink {
    /// Console-only sink.
    pub fn console() -> Self {
        Self { forward: None }
    }

    /// Console plus forwarding to a relay peer.
    pub fn with_forward(forward: mpsc::UnboundedSender<String>) -> Self {
        Self {
            forward: Some(forward),
        }
    }

    pub fn line(&self, message: impl Into<String>) {
        let message = message.into();
        println!("{message}");
        if let Some(forward) = &self.forward {
            // Receiver gone means the peer hung up; keep printing locally.
            let _ = forward.send(message);
        }
    }
}
