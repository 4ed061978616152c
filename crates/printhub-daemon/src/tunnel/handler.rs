//! Inbound frame dispatcher.
//!
//! Routes each cloud frame by its `type` and produces the reply frames plus
//! an optional session event for the connection loop. Frames are handled
//! strictly in arrival order, and the ack for one command is emitted before
//! the next frame is dispatched.
//!
//! Ack discipline: every frame carrying a `command_id` yields exactly one
//! `command_ack` — including when the payload body fails to parse. Frames
//! without a `command_id` (`error`, unknown types, malformed JSON) are
//! logged and dropped.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use printhub_core::{PrinterSnapshot, PrinterState};
use printhub_proto::types;
use printhub_proto::{
    CloudError, CommandAck, ConfigurePrinter, Envelope, HubCommand, HubConfigMsg, HubWelcome,
    PrinterCommandMsg, PrinterStatusMsg, Temperatures,
};

use crate::hub::HubContext;
use crate::storage::{PrinterSlotRecord, NS_HUB};

/// Session-level effect of a dispatched frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// `hub_welcome` arrived; the connection loop completes authentication.
    Authenticated,
    /// `hub_command disconnect`; close the socket after the ack drains.
    DisconnectRequested,
}

/// Result of dispatching one inbound text frame.
#[derive(Debug, Default)]
pub struct Dispatch {
    /// Serialized frames to send back, in order.
    pub replies: Vec<String>,
    pub event: Option<SessionEvent>,
}

impl Dispatch {
    fn none() -> Self {
        Self::default()
    }

    fn reply(frame: Option<String>) -> Self {
        Self {
            replies: frame.into_iter().collect(),
            event: None,
        }
    }
}

/// Serialize an outbound frame, logging instead of panicking on the
/// (unreachable) failure path.
fn encode<T: Serialize>(frame: &T) -> Option<String> {
    match serde_json::to_string(frame) {
        Ok(text) => Some(text),
        Err(e) => {
            error!(error = %e, "Failed to encode outbound frame");
            None
        }
    }
}

fn ack_ok(command_id: &str) -> Option<String> {
    encode(&CommandAck::ok(command_id))
}

fn ack_fail(command_id: &str, message: impl Into<String>) -> Option<String> {
    encode(&CommandAck::fail(command_id, message))
}

/// Cloud status vocabulary has no "unknown"; report it as offline, matching
/// the rest of the fleet's behavior for unreadable printers.
fn cloud_status(state: PrinterState) -> &'static str {
    match state {
        PrinterState::Idle => types::STATUS_IDLE,
        PrinterState::Printing => types::STATUS_PRINTING,
        PrinterState::Paused => types::STATUS_PAUSED,
        PrinterState::Error => types::STATUS_ERROR,
        PrinterState::Offline | PrinterState::Unknown => types::STATUS_OFFLINE,
    }
}

/// Build one `printer_status` frame, omitting zero/empty optional fields.
pub fn status_frame(serial: &str, snapshot: &PrinterSnapshot) -> PrinterStatusMsg {
    let mut msg = PrinterStatusMsg::new(
        serial,
        cloud_status(snapshot.state),
        Temperatures {
            nozzle: snapshot.nozzle_temp,
            bed: snapshot.bed_temp,
        },
    );
    if snapshot.progress_percent > 0 {
        msg.progress_percentage = Some(snapshot.progress_percent);
    }
    if snapshot.remaining_seconds > 0 {
        msg.remaining_time_seconds = Some(snapshot.remaining_seconds);
    }
    if snapshot.current_layer > 0 {
        msg.current_layer = Some(snapshot.current_layer);
    }
    if snapshot.total_layers > 0 {
        msg.total_layers = Some(snapshot.total_layers);
    }
    if let Some(message) = &snapshot.error_message {
        if !message.is_empty() {
            msg.error_message = Some(message.clone());
        }
    }
    msg
}

/// Handles inbound tunnel frames by dispatching into the hub context.
pub struct TunnelHandler {
    hub: Arc<HubContext>,
}

impl TunnelHandler {
    pub fn new(hub: Arc<HubContext>) -> Self {
        Self { hub }
    }

    /// Dispatch one inbound text frame.
    pub async fn handle_text(&self, text: &str) -> Dispatch {
        let envelope: Envelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Discarding unparseable frame");
                return Dispatch::none();
            }
        };

        match envelope.msg_type.as_str() {
            types::HUB_WELCOME => self.handle_welcome(text).await,
            types::HUB_CONFIG => self.handle_hub_config(text, envelope.command_id).await,
            types::CONFIGURE_PRINTER => {
                self.handle_configure_printer(text, envelope.command_id).await
            }
            types::PRINTER_COMMAND => self.handle_printer_command(text, envelope.command_id).await,
            types::PRINT_COMMAND => {
                Dispatch::reply(Self::not_implemented("print_command", envelope.command_id))
            }
            types::DISCOVER_PRINTERS => {
                Dispatch::reply(Self::not_implemented("discover_printers", envelope.command_id))
            }
            types::HUB_COMMAND => self.handle_hub_command(text, envelope.command_id).await,
            types::ERROR => {
                let report: CloudError = serde_json::from_str(text).unwrap_or(CloudError {
                    code: None,
                    message: None,
                });
                warn!(
                    code = report.code.as_deref().unwrap_or("unknown"),
                    message = report.message.as_deref().unwrap_or("-"),
                    "Error from cloud"
                );
                Dispatch::none()
            }
            other => {
                warn!(msg_type = %other, "Unknown message type, dropping");
                Dispatch::none()
            }
        }
    }

    /// Snapshot every occupied slot into `printer_status` frames.
    pub async fn build_status_broadcast(&self) -> Vec<String> {
        let statuses = self.hub.fleet.lock().await.statuses();
        statuses
            .iter()
            .filter_map(|(serial, snapshot)| encode(&status_frame(serial, snapshot)))
            .collect()
    }

    fn not_implemented(what: &str, command_id: Option<String>) -> Option<String> {
        debug!(command = what, "Command not implemented");
        ack_fail(command_id.as_deref()?, format!("{what} not implemented"))
    }

    /// Parse a typed payload, falling back to a failure ack when the
    /// envelope carried a `command_id`.
    fn parse_payload<T: DeserializeOwned>(
        text: &str,
        command_id: Option<&str>,
    ) -> Result<T, Dispatch> {
        match serde_json::from_str(text) {
            Ok(payload) => Ok(payload),
            Err(e) => {
                warn!(error = %e, "Malformed command payload");
                Err(match command_id {
                    Some(id) => Dispatch::reply(ack_fail(id, "Invalid payload")),
                    None => Dispatch::none(),
                })
            }
        }
    }

    async fn handle_welcome(&self, text: &str) -> Dispatch {
        let welcome: HubWelcome = match serde_json::from_str(text) {
            Ok(welcome) => welcome,
            Err(e) => {
                warn!(error = %e, "Malformed hub_welcome");
                return Dispatch::none();
            }
        };

        if let Some(name) = welcome.hub_name.as_deref() {
            self.persist_hub_name(name).await;
        }

        Dispatch {
            replies: Vec::new(),
            event: Some(SessionEvent::Authenticated),
        }
    }

    async fn persist_hub_name(&self, name: &str) {
        if name.is_empty() {
            return;
        }
        let ns = self.hub.store.namespace(NS_HUB);
        match ns.get_string("hub_name", "").await {
            Ok(current) if current == name => {}
            Ok(_) => match ns.put_string("hub_name", name).await {
                Ok(()) => info!(hub_name = %name, "Hub name updated"),
                Err(e) => warn!(error = %e, "Failed to persist hub name"),
            },
            Err(e) => warn!(error = %e, "Failed to read hub name"),
        }
    }

    async fn handle_hub_config(&self, text: &str, command_id: Option<String>) -> Dispatch {
        let config: HubConfigMsg = match Self::parse_payload(text, command_id.as_deref()) {
            Ok(config) => config,
            Err(dispatch) => return dispatch,
        };

        if let Some(name) = config.hub_name.as_deref() {
            self.persist_hub_name(name).await;
        }

        match command_id {
            Some(id) => Dispatch::reply(ack_ok(&id)),
            None => Dispatch::none(),
        }
    }

    async fn handle_configure_printer(&self, text: &str, command_id: Option<String>) -> Dispatch {
        let msg: ConfigurePrinter = match Self::parse_payload(text, command_id.as_deref()) {
            Ok(msg) => msg,
            Err(dispatch) => return dispatch,
        };
        let id = msg.command_id.clone();

        let reply = match msg.action.as_str() {
            types::ACTION_ADD => self.configure_add(&msg, &id).await,
            types::ACTION_REMOVE => self.configure_remove(&msg, &id).await,
            types::ACTION_UPDATE => self.configure_update(&msg, &id).await,
            other => ack_fail(&id, format!("Unknown action: {other}")),
        };
        Dispatch::reply(reply)
    }

    fn record_from_payload(msg: &ConfigurePrinter) -> Result<PrinterSlotRecord, String> {
        let printer = msg
            .printer
            .as_ref()
            .ok_or_else(|| "Missing printer object".to_string())?;
        let serial = printer
            .serial_number
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Missing serial_number or connection_type".to_string())?;
        let vendor = printer
            .connection_type
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Missing serial_number or connection_type".to_string())?;

        Ok(PrinterSlotRecord {
            id: printer.id.clone().unwrap_or_else(|| serial.clone()),
            vendor,
            name: printer.name.clone().unwrap_or_else(|| serial.clone()),
            address: printer.ip_address.clone().unwrap_or_default(),
            port: printer
                .port
                .unwrap_or(printhub_core::settings::BAMBU_MQTT_PORT),
            access_code: printer.access_code.clone().unwrap_or_default(),
            serial,
            api_key: printer.api_key.clone().unwrap_or_default(),
            active: true,
        })
    }

    async fn configure_add(&self, msg: &ConfigurePrinter, id: &str) -> Option<String> {
        let record = match Self::record_from_payload(msg) {
            Ok(record) => record,
            Err(message) => return ack_fail(id, message),
        };

        let result = self.hub.fleet.lock().await.add(record).await;
        match result {
            Ok(slot) => {
                info!(slot, "Printer added via cloud");
                ack_ok(id)
            }
            Err(e) => ack_fail(id, e.to_string()),
        }
    }

    async fn configure_remove(&self, msg: &ConfigurePrinter, id: &str) -> Option<String> {
        let serial = msg
            .printer
            .as_ref()
            .and_then(|p| p.serial_number.clone())
            .filter(|s| !s.is_empty());
        let Some(serial) = serial else {
            return ack_fail(id, "Missing serial_number");
        };

        let result = self.hub.fleet.lock().await.remove_by_serial(&serial).await;
        match result {
            Ok(slot) => {
                info!(slot, printer = %serial, "Printer removed via cloud");
                ack_ok(id)
            }
            Err(e) => ack_fail(id, e.to_string()),
        }
    }

    async fn configure_update(&self, msg: &ConfigurePrinter, id: &str) -> Option<String> {
        let record = match Self::record_from_payload(msg) {
            Ok(record) => record,
            Err(message) => return ack_fail(id, message),
        };

        let result = self.hub.fleet.lock().await.update(record).await;
        match result {
            Ok(slot) => {
                info!(slot, "Printer updated via cloud");
                ack_ok(id)
            }
            Err(e) => ack_fail(id, e.to_string()),
        }
    }

    async fn handle_printer_command(&self, text: &str, command_id: Option<String>) -> Dispatch {
        let msg: PrinterCommandMsg = match Self::parse_payload(text, command_id.as_deref()) {
            Ok(msg) => msg,
            Err(dispatch) => return dispatch,
        };
        let id = msg.command_id.clone();

        let fleet = self.hub.fleet.lock().await;
        let Some(adapter) = fleet.adapter_for_serial(&msg.printer_id) else {
            return Dispatch::reply(ack_fail(&id, "Printer not found"));
        };

        if !adapter.is_connected() {
            return Dispatch::reply(ack_fail(&id, "Printer not connected"));
        }

        let result = match msg.action.as_str() {
            types::ACTION_PAUSE => adapter.pause(),
            types::ACTION_RESUME => adapter.resume(),
            types::ACTION_STOP => adapter.stop(),
            // clear_bed is acknowledged without a physical action.
            types::ACTION_CLEAR_BED => {
                debug!(printer = %msg.printer_id, "clear_bed acknowledged (no physical action)");
                Ok(())
            }
            other => {
                return Dispatch::reply(ack_fail(&id, format!("Unknown action: {other}")));
            }
        };

        match result {
            Ok(()) => {
                info!(printer = %msg.printer_id, action = %msg.action, "Printer command dispatched");
                Dispatch::reply(ack_ok(&id))
            }
            Err(e) => {
                warn!(printer = %msg.printer_id, action = %msg.action, error = %e, "Printer command failed");
                Dispatch::reply(ack_fail(&id, e.to_string()))
            }
        }
    }

    async fn handle_hub_command(&self, text: &str, command_id: Option<String>) -> Dispatch {
        let msg: HubCommand = match Self::parse_payload(text, command_id.as_deref()) {
            Ok(msg) => msg,
            Err(dispatch) => return dispatch,
        };
        let id = msg.command_id.clone();

        match msg.action.as_str() {
            types::ACTION_DISCONNECT => {
                info!("Cloud requested disconnect");
                Dispatch {
                    replies: ack_ok(&id).into_iter().collect(),
                    event: Some(SessionEvent::DisconnectRequested),
                }
            }
            types::ACTION_GPIO_SET => match (msg.gpio_pin, msg.gpio_state) {
                (Some(pin), state) => {
                    self.hub.pins.set(pin, state.unwrap_or(false));
                    Dispatch::reply(ack_ok(&id))
                }
                (None, _) => Dispatch::reply(ack_fail(&id, "Invalid GPIO pin")),
            },
            other => {
                warn!(action = %other, "Unknown hub command action");
                Dispatch::reply(ack_fail(&id, "Unknown hub command action"))
            }
        }
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
