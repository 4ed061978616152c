//! Bambu Lab printer adapter.
//!
//! MQTT over TLS on port 8883, username `bblp`, password = the printer's LAN
//! access code. Certificate verification is skipped: Bambu printers present
//! a self-signed device certificate, so this transport must only be used on
//! a trusted local network.
//!
//! Each adapter owns an independent client session; a background task drives
//! the event loop, applies status deltas to a shared snapshot, and paces
//! reconnect attempts. Control operations publish fire-and-forget command
//! envelopes and succeed iff the transport accepted the frame.

pub mod commands;
pub mod report;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, TlsConfiguration, Transport,
};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use printhub_core::settings::{MQTT_KEEPALIVE, MQTT_RECONNECT_INTERVAL, PUSHALL_REFRESH_INTERVAL};
use printhub_core::{PrinterSnapshot, PrinterState};
use printhub_proto::types::VENDOR_BAMBU;

use crate::printer::{PrinterAdapter, PrinterError, Result};
use crate::storage::PrinterSlotRecord;

use commands::{report_topic, request_topic, BambuCommand, LED_NODE_CHAMBER, LED_NODE_WORK};

/// Bambu printer connection configuration.
#[derive(Debug, Clone)]
pub struct BambuConfig {
    /// Printer serial number (drives the topic scheme).
    pub serial: String,
    /// User-visible printer name.
    pub name: String,
    /// Printer address on the local network.
    pub host: String,
    /// MQTT port, normally 8883.
    pub port: u16,
    /// LAN access code from the printer's network settings.
    pub access_code: String,
}

/// State shared between the adapter handle and its session task.
struct Shared {
    snapshot: Mutex<PrinterSnapshot>,
    connected: AtomicBool,
    sequence: AtomicU32,
}

impl Shared {
    fn next_sequence(&self) -> u32 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    fn lock_snapshot(&self) -> std::sync::MutexGuard<'_, PrinterSnapshot> {
        self.snapshot.lock().expect("snapshot lock poisoned")
    }
}

/// Adapter for one Bambu printer.
pub struct BambuAdapter {
    config: BambuConfig,
    shared: Arc<Shared>,
    client: Option<AsyncClient>,
    session: Option<JoinHandle<()>>,
}

impl BambuAdapter {
    pub fn new(config: BambuConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared {
                snapshot: Mutex::new(PrinterSnapshot::default()),
                connected: AtomicBool::new(false),
                sequence: AtomicU32::new(0),
            }),
            client: None,
            session: None,
        }
    }

    pub fn from_record(record: &PrinterSlotRecord) -> Self {
        Self::new(BambuConfig {
            serial: record.serial.clone(),
            name: if record.name.is_empty() {
                record.serial.clone()
            } else {
                record.name.clone()
            },
            host: record.address.clone(),
            port: record.port,
            access_code: record.access_code.clone(),
        })
    }

    fn publish(&self, command: &BambuCommand) -> Result<()> {
        if !self.is_connected() {
            return Err(PrinterError::NotConnected);
        }
        let client = self.client.as_ref().ok_or(PrinterError::NotConnected)?;
        let payload = command.to_json(self.shared.next_sequence()).to_string();
        client
            .try_publish(
                request_topic(&self.config.serial),
                QoS::AtMostOnce,
                false,
                payload,
            )
            .map_err(|e| PrinterError::Transport(e.to_string()))
    }
}

#[async_trait]
impl PrinterAdapter for BambuAdapter {
    async fn connect(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }

        let client_id = format!("hub-{:04x}", rand::random::<u16>());
        let mut options = MqttOptions::new(client_id, &self.config.host, self.config.port);
        options.set_credentials("bblp", &self.config.access_code);
        options.set_keep_alive(MQTT_KEEPALIVE);
        options.set_clean_session(true);

        // The printer's certificate is self-signed; accept it as-is.
        let tls = TlsConfiguration::Simple {
            ca: vec![],
            alpn: None,
            client_auth: None,
        };
        options.set_transport(Transport::tls_with_config(tls));

        let (client, event_loop) = AsyncClient::new(options, 64);
        info!(printer = %self.config.serial, host = %self.config.host, "Starting printer session");

        self.client = Some(client.clone());
        self.session = Some(tokio::spawn(session_loop(
            client,
            event_loop,
            Arc::clone(&self.shared),
            self.config.serial.clone(),
        )));
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(client) = self.client.take() {
            let _ = client.try_disconnect();
        }
        if let Some(session) = self.session.take() {
            session.abort();
            info!(printer = %self.config.serial, "Printer session closed");
        }
        self.shared.connected.store(false, Ordering::Relaxed);
        self.shared.lock_snapshot().mark_disconnected();
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Relaxed)
    }

    fn status(&self) -> PrinterSnapshot {
        let mut snapshot = self.shared.lock_snapshot().clone();
        snapshot.connected = self.is_connected();
        if !snapshot.connected
            && !matches!(snapshot.state, PrinterState::Offline | PrinterState::Unknown)
        {
            snapshot.state = PrinterState::Offline;
        }
        snapshot
    }

    fn poll(&self) {
        // Transport I/O lives in the session task; just keep the snapshot
        // consistent with the transport flag.
        if !self.is_connected() {
            let mut snapshot = self.shared.lock_snapshot();
            if snapshot.connected {
                snapshot.mark_disconnected();
            }
        }
    }

    fn pause(&self) -> Result<()> {
        self.publish(&BambuCommand::Pause)
    }

    fn resume(&self) -> Result<()> {
        self.publish(&BambuCommand::Resume)
    }

    fn stop(&self) -> Result<()> {
        self.publish(&BambuCommand::Stop)
    }

    fn send_gcode(&self, line: &str) -> Result<()> {
        self.publish(&BambuCommand::GcodeLine(line.to_string()))
    }

    /// One envelope per LED node; the printer ignores the node it does not
    /// have. Succeeds when at least one publish was accepted.
    fn set_light(&self, on: bool) -> Result<()> {
        let chamber = self.publish(&BambuCommand::Led {
            node: LED_NODE_CHAMBER,
            on,
        });
        let work = self.publish(&BambuCommand::Led {
            node: LED_NODE_WORK,
            on,
        });
        match (chamber, work) {
            (Err(e), Err(_)) => Err(e),
            _ => Ok(()),
        }
    }

    fn type_tag(&self) -> &str {
        VENDOR_BAMBU
    }

    fn display_name(&self) -> &str {
        &self.config.name
    }

    fn stable_id(&self) -> &str {
        &self.config.serial
    }
}

/// Drives one printer session: connection handshake, report parsing, and
/// retry pacing. Runs until the adapter disconnects.
async fn session_loop(
    client: AsyncClient,
    mut event_loop: EventLoop,
    shared: Arc<Shared>,
    serial: String,
) {
    let report = report_topic(&serial);
    let request = request_topic(&serial);
    let mut pushall = tokio::time::interval(PUSHALL_REFRESH_INTERVAL);
    pushall.tick().await; // Skip first immediate tick

    loop {
        tokio::select! {
            event = event_loop.poll() => match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!(printer = %serial, "Printer connected");
                    shared.connected.store(true, Ordering::Relaxed);
                    {
                        let mut snapshot = shared.lock_snapshot();
                        snapshot.connected = true;
                        if snapshot.state == PrinterState::Offline {
                            snapshot.state = PrinterState::Idle;
                        }
                    }
                    if let Err(e) = client.try_subscribe(&report, QoS::AtMostOnce) {
                        warn!(printer = %serial, error = %e, "Report subscribe failed");
                    }
                    // Ask for a full snapshot instead of waiting for deltas.
                    let payload = BambuCommand::PushAll
                        .to_json(shared.next_sequence())
                        .to_string();
                    if let Err(e) = client.try_publish(&request, QoS::AtMostOnce, false, payload) {
                        warn!(printer = %serial, error = %e, "Initial pushall failed");
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if publish.topic == report {
                        match serde_json::from_slice::<Value>(&publish.payload) {
                            Ok(payload) => {
                                let mut snapshot = shared.lock_snapshot();
                                report::apply_report(&mut snapshot, &payload);
                            }
                            Err(e) => {
                                warn!(printer = %serial, error = %e, "Discarding unparseable report");
                            }
                        }
                    } else {
                        debug!(printer = %serial, topic = %publish.topic, "Ignoring unmatched topic");
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    if shared.connected.swap(false, Ordering::Relaxed) {
                        warn!(printer = %serial, error = %e, "Printer connection lost");
                    } else {
                        debug!(printer = %serial, error = %e, "Printer connect attempt failed");
                    }
                    shared.lock_snapshot().mark_disconnected();
                    // Retry no more often than the reconnect interval.
                    tokio::time::sleep(MQTT_RECONNECT_INTERVAL).await;
                }
            },
            _ = pushall.tick() => {
                if shared.connected.load(Ordering::Relaxed) {
                    let payload = BambuCommand::PushAll
                        .to_json(shared.next_sequence())
                        .to_string();
                    if let Err(e) = client.try_publish(&request, QoS::AtMostOnce, false, payload) {
                        debug!(printer = %serial, error = %e, "Periodic pushall failed");
                    }
                }
            }
        }
    }
}
