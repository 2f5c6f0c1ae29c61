//! Desk Session
//!
//! `DeskSession` is the single authoritative holder of the BLE connection.
//! Every movement, stop, wake, and telemetry operation funnels through it;
//! the relay components never touch the peripheral directly. Shared access
//! goes through `Arc<tokio::sync::Mutex<DeskSession>>` so overlapping relay
//! commands serialize against the one physical desk.

use crate::bluetooth::protocol;
use crate::config::Config;
use crate::models::{ConnectionStatus, LogSink, TelemetrySample};
use crate::units::UnitConverter;
use anyhow::{anyhow, Context, Result};
use btleplug::api::{
    BDAddr, Central, CentralEvent, Characteristic, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Peripheral, PeripheralId};
use futures_util::StreamExt;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};

/// Buffered telemetry notifications per subscriber.
const TELEMETRY_CHANNEL_CAPACITY: usize = 32;

/// The three fixed endpoints on the desk, resolved once per connection.
struct Endpoints {
    telemetry: Characteristic,
    command: Characteristic,
    reference_input: Characteristic,
}

impl Endpoints {
    fn resolve(peripheral: &Peripheral) -> Result<Self> {
        let characteristics = peripheral.characteristics();
        Ok(Self {
            telemetry: find_characteristic(&characteristics, protocol::UUID_HEIGHT)?,
            command: find_characteristic(&characteristics, protocol::UUID_COMMAND)?,
            reference_input: find_characteristic(
                &characteristics,
                protocol::UUID_REFERENCE_INPUT,
            )?,
        })
    }
}

fn find_characteristic(
    characteristics: &BTreeSet<Characteristic>,
    uuid: uuid::Uuid,
) -> Result<Characteristic> {
    characteristics
        .iter()
        .find(|characteristic| characteristic.uuid == uuid)
        .cloned()
        .ok_or_else(|| anyhow!("Characteristic {uuid} not found on device"))
}

/// The desk session: owns the connection handle and the resolved endpoints.
pub struct DeskSession {
    adapter: Adapter,
    address: BDAddr,
    peripheral: Option<Peripheral>,
    endpoints: Option<Endpoints>,
    status: ConnectionStatus,
    converter: UnitConverter,
    connection_timeout: u64,
    movement_timeout: u64,
    stall_limit: u32,
}

impl DeskSession {
    pub fn new(adapter: Adapter, config: &Config) -> Result<Self> {
        let address: BDAddr = config
            .mac_address
            .parse()
            .map_err(|e| anyhow!("Invalid mac address {}: {e}", config.mac_address))?;

        Ok(Self {
            adapter,
            address,
            peripheral: None,
            endpoints: None,
            status: ConnectionStatus::Disconnected,
            converter: UnitConverter::new(config.base_height),
            connection_timeout: config.connection_timeout,
            movement_timeout: config.movement_timeout,
            stall_limit: config.stall_limit,
        })
    }

    pub fn converter(&self) -> UnitConverter {
        self.converter
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub fn peripheral_id(&self) -> Option<PeripheralId> {
        self.peripheral.as_ref().map(|peripheral| peripheral.id())
    }

    /// Connect to the desk within the configured connection timeout.
    ///
    /// Discovers services, logs every characteristic (diagnostic only) and
    /// resolves the three fixed endpoints. A failure here is fatal to the
    /// caller: nothing else works without the connection.
    pub async fn connect(&mut self) -> Result<()> {
        self.status = ConnectionStatus::Connecting;
        println!("Connecting");

        let timeout = Duration::from_secs(self.connection_timeout);
        let peripheral = match time::timeout(timeout, self.establish()).await {
            Ok(Ok(peripheral)) => peripheral,
            Ok(Err(e)) => {
                self.status = ConnectionStatus::Disconnected;
                let _ = self.adapter.stop_scan().await;
                println!("Connecting failed");
                error!("{e:#}");
                return Err(e);
            }
            Err(_) => {
                self.status = ConnectionStatus::Disconnected;
                let _ = self.adapter.stop_scan().await;
                println!("Connecting failed");
                return Err(anyhow!(
                    "No connection to {} within {}s",
                    self.address,
                    self.connection_timeout
                ));
            }
        };

        println!("Connected {}", self.address);

        info!("Received the services:");
        for characteristic in peripheral.characteristics() {
            info!(
                "  - {} ({:?})",
                characteristic.uuid, characteristic.properties
            );
        }

        let endpoints = match Endpoints::resolve(&peripheral) {
            Ok(endpoints) => endpoints,
            Err(e) => {
                self.status = ConnectionStatus::Disconnected;
                let _ = peripheral.disconnect().await;
                return Err(e);
            }
        };
        self.peripheral = Some(peripheral);
        self.endpoints = Some(endpoints);
        self.status = ConnectionStatus::Connected;
        Ok(())
    }

    /// Find the peripheral (scanning if this is the first connection) and
    /// open the link.
    async fn establish(&self) -> Result<Peripheral> {
        let peripheral = match &self.peripheral {
            // Reconnect path: reuse the known peripheral.
            Some(peripheral) => peripheral.clone(),
            None => {
                self.adapter.start_scan(ScanFilter::default()).await?;
                let peripheral = loop {
                    let found = self
                        .adapter
                        .peripherals()
                        .await?
                        .into_iter()
                        .find(|peripheral| peripheral.address() == self.address);
                    if let Some(peripheral) = found {
                        break peripheral;
                    }
                    time::sleep(Duration::from_millis(200)).await;
                };
                self.adapter.stop_scan().await?;
                peripheral
            }
        };

        peripheral.connect().await?;
        peripheral.discover_services().await?;
        Ok(peripheral)
    }

    fn peripheral(&self) -> Result<&Peripheral> {
        self.peripheral
            .as_ref()
            .filter(|_| self.status == ConnectionStatus::Connected)
            .ok_or_else(|| anyhow!("Not connected to the desk"))
    }

    fn endpoints(&self) -> Result<&Endpoints> {
        self.endpoints
            .as_ref()
            .ok_or_else(|| anyhow!("Not connected to the desk"))
    }

    /// Read and decode the current position/speed.
    pub async fn read_telemetry(&self) -> Result<TelemetrySample> {
        let data = self
            .peripheral()?
            .read(&self.endpoints()?.telemetry)
            .await?;
        Ok(protocol::decode_telemetry(&data)?)
    }

    /// Subscribe to telemetry notifications.
    ///
    /// Samples are delivered through a bounded channel fed by a background
    /// task; nothing user-provided runs inside the BLE event stream. The
    /// channel closes when the notification stream ends.
    pub async fn subscribe_telemetry(&self) -> Result<mpsc::Receiver<TelemetrySample>> {
        let peripheral = self.peripheral()?.clone();
        let telemetry = self.endpoints()?.telemetry.clone();

        peripheral.subscribe(&telemetry).await?;
        let mut notifications = peripheral.notifications().await?;

        let (tx, rx) = mpsc::channel(TELEMETRY_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid != protocol::UUID_HEIGHT {
                    continue;
                }
                match protocol::decode_telemetry(&notification.value) {
                    Ok(sample) => {
                        if tx.send(sample).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Ignoring malformed telemetry notification: {e}"),
                }
            }
            debug!("Telemetry notification stream ended");
        });

        Ok(rx)
    }

    /// Best-effort cancel of the telemetry subscription. Some platforms
    /// report a missing subscription here; that is swallowed.
    pub async fn unsubscribe_telemetry(&self) {
        if let (Some(peripheral), Some(endpoints)) = (&self.peripheral, &self.endpoints) {
            if let Err(e) = peripheral.unsubscribe(&endpoints.telemetry).await {
                debug!("Unsubscribe failed (ignored): {e}");
            }
        }
    }

    /// Wake the motor controller. It sleeps after inactivity and ignores
    /// movement requests until woken.
    pub async fn wake(&self) -> Result<()> {
        let frame = protocol::command_frame(protocol::WAKE_CODE);
        self.peripheral()?
            .write(&self.endpoints()?.command, &frame, WriteType::WithoutResponse)
            .await?;
        Ok(())
    }

    /// Stop any in-flight movement. Write failures are swallowed: BlueZ on
    /// Raspberry Pis reports "Write acquired" here and movement is
    /// unaffected.
    pub async fn stop(&self) -> Result<()> {
        let frame = protocol::command_frame(protocol::STOP_CODE);
        if let Err(e) = self
            .peripheral()?
            .write(&self.endpoints()?.command, &frame, WriteType::WithoutResponse)
            .await
        {
            debug!("Stop write failed (ignored): {e}");
        }
        Ok(())
    }

    /// Request movement toward a raw target position. The desk moves
    /// autonomously; this does not block until the target is reached.
    pub async fn move_to_target(&self, raw: u16) -> Result<()> {
        let frame = protocol::encode_target(raw);
        self.peripheral()?
            .write(
                &self.endpoints()?.reference_input,
                &frame,
                WriteType::WithoutResponse,
            )
            .await?;
        Ok(())
    }

    /// Move the desk to a raw target position, polling telemetry every
    /// 500 ms and emitting a height/speed line per poll.
    ///
    /// The loop ends when the position reaches the target, when the
    /// configured movement timeout expires, or when `stall_limit`
    /// consecutive polls report zero speed (the desk hit a soft limit or an
    /// obstruction). Timeouts and stalls are logged, not errors: movement is
    /// a request, and the final height is reported by the caller either way.
    pub async fn move_to(&self, target: i32, sink: &LogSink) -> Result<()> {
        let initial = self.read_telemetry().await?;
        if i32::from(initial.position) == target {
            return Ok(());
        }

        self.wake().await?;
        self.stop().await?;

        let deadline = Instant::now() + Duration::from_secs(self.movement_timeout);
        let mut current = i32::from(initial.position);
        let mut zero_speed_polls = 0u32;

        while current < target {
            if Instant::now() >= deadline {
                warn!(
                    "Desk did not reach the target within {}s",
                    self.movement_timeout
                );
                break;
            }

            // Only reachable with 0 <= current < target, so the raw target
            // fits the unsigned wire encoding.
            let raw = u16::try_from(target).context("Target position out of range")?;
            self.move_to_target(raw).await?;
            time::sleep(Duration::from_millis(protocol::MOVE_POLL_INTERVAL_MS)).await;

            let sample = self.read_telemetry().await?;
            sink.line(format!(
                "Height: {:4.0}mm Speed: {:2.0}mm/s",
                self.converter.raw_to_mm(i32::from(sample.position)),
                UnitConverter::raw_to_speed(sample.speed)
            ));

            if self.stall_limit > 0 {
                if sample.speed == 0 {
                    zero_speed_polls += 1;
                } else {
                    zero_speed_polls = 0;
                }
                if zero_speed_polls >= self.stall_limit {
                    warn!("Desk stopped moving before the target; treating the move as stalled");
                    break;
                }
            }

            current = i32::from(sample.position);
        }

        Ok(())
    }

    /// Close the link. Idempotent when already disconnected.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(peripheral) = &self.peripheral {
            if peripheral.is_connected().await.unwrap_or(false) {
                peripheral.disconnect().await?;
            }
        }
        self.endpoints = None;
        self.status = ConnectionStatus::Disconnected;
        Ok(())
    }

    /// Record an unexpected link loss reported by the host.
    fn mark_lost(&mut self) {
        println!("Lost connection with {}", self.address);
        self.endpoints = None;
        self.status = ConnectionStatus::Disconnected;
    }
}

/// Watch adapter events for an unexpected disconnect of the desk and fire a
/// single reconnect attempt per loss event. Runs for the lifetime of the
/// relay server.
pub async fn monitor_link(session: Arc<Mutex<DeskSession>>) -> Result<()> {
    let (adapter, id) = {
        let session = session.lock().await;
        (session.adapter.clone(), session.peripheral_id())
    };
    let Some(id) = id else {
        // Nothing to watch before a connection exists.
        return Ok(());
    };

    let mut events = adapter.events().await?;
    while let Some(event) = events.next().await {
        if let CentralEvent::DeviceDisconnected(peer) = event {
            if peer == id {
                let mut session = session.lock().await;
                session.mark_lost();
                if let Err(e) = session.connect().await {
                    error!("Reconnect failed: {e:#}");
                }
            }
        }
    }

    Ok(())
}
