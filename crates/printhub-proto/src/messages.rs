//! Serde structs for every frame on the tunnel.
//!
//! Outbound (hub -> cloud) frames serialize a fixed `type` tag; inbound
//! frames are deserialized from the raw text after the generic [`Envelope`]
//! probe has identified the type. Optional numeric fields in
//! `printer_status` are omitted entirely when their value is zero, matching
//! the control plane contract.

use serde::{Deserialize, Serialize};

use crate::types;

/// Minimal probe for any inbound frame: the required `type` plus the
/// optional `command_id` used for acknowledgement.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub command_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Hub -> Cloud
// ---------------------------------------------------------------------------

/// Authentication frame sent immediately after the socket opens.
#[derive(Debug, Clone, Serialize)]
pub struct HubHello {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub hub_id: String,
    pub firmware_version: String,
    pub hardware_version: String,
    pub mac_address: String,
}

impl HubHello {
    pub fn new(
        hub_id: impl Into<String>,
        firmware_version: impl Into<String>,
        hardware_version: impl Into<String>,
        mac_address: impl Into<String>,
    ) -> Self {
        Self {
            msg_type: types::HUB_HELLO,
            hub_id: hub_id.into(),
            firmware_version: firmware_version.into(),
            hardware_version: hardware_version.into(),
            mac_address: mac_address.into(),
        }
    }
}

/// Exactly one ack is emitted per inbound `command_id`. The `error` field is
/// present only on failure.
#[derive(Debug, Clone, Serialize)]
pub struct CommandAck {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub command_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandAck {
    pub fn ok(command_id: impl Into<String>) -> Self {
        Self {
            msg_type: types::COMMAND_ACK,
            command_id: command_id.into(),
            success: true,
            error: None,
        }
    }

    pub fn fail(command_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            msg_type: types::COMMAND_ACK,
            command_id: command_id.into(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Nozzle and bed temperatures, always present in `printer_status`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Temperatures {
    pub nozzle: f64,
    pub bed: f64,
}

/// Per-printer status snapshot pushed upstream on the broadcast cadence.
/// Zero-valued optional fields are omitted.
#[derive(Debug, Clone, Serialize)]
pub struct PrinterStatusMsg {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub printer_id: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percentage: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_time_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_layer: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_layers: Option<u32>,
    pub temperatures: Temperatures,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl PrinterStatusMsg {
    pub fn new(printer_id: impl Into<String>, status: &'static str, temps: Temperatures) -> Self {
        Self {
            msg_type: types::PRINTER_STATUS,
            printer_id: printer_id.into(),
            status,
            progress_percentage: None,
            remaining_time_seconds: None,
            current_layer: None,
            total_layers: None,
            temperatures: temps,
            error_message: None,
        }
    }
}

/// File transfer progress for the print pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct FileProgress {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub printer_id: String,
    pub job_id: String,
    pub stage: &'static str,
    pub progress_percentage: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileProgress {
    pub fn new(
        printer_id: impl Into<String>,
        job_id: impl Into<String>,
        stage: &'static str,
        progress_percentage: u32,
    ) -> Self {
        Self {
            msg_type: types::FILE_PROGRESS,
            printer_id: printer_id.into(),
            job_id: job_id.into(),
            stage,
            progress_percentage,
            error: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Cloud -> Hub
// ---------------------------------------------------------------------------

/// Completes authentication; may rename the hub.
#[derive(Debug, Clone, Deserialize)]
pub struct HubWelcome {
    #[serde(default)]
    pub hub_id: Option<String>,
    #[serde(default)]
    pub hub_name: Option<String>,
}

/// Hub-level settings update.
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfigMsg {
    #[serde(default)]
    pub command_id: Option<String>,
    #[serde(default)]
    pub hub_name: Option<String>,
}

/// Printer description carried by `configure_printer`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrinterPayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub connection_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub access_code: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Slot management command.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigurePrinter {
    pub command_id: String,
    pub action: String,
    #[serde(default)]
    pub printer: Option<PrinterPayload>,
}

/// Control command for a single printer, addressed by serial.
#[derive(Debug, Clone, Deserialize)]
pub struct PrinterCommandMsg {
    pub command_id: String,
    pub printer_id: String,
    pub action: String,
}

/// Hub-level command: `disconnect` or `gpio_set`.
#[derive(Debug, Clone, Deserialize)]
pub struct HubCommand {
    pub command_id: String,
    pub action: String,
    #[serde(default)]
    pub gpio_pin: Option<u32>,
    #[serde(default)]
    pub gpio_state: Option<bool>,
}

/// Error report from the cloud.
#[derive(Debug, Clone, Deserialize)]
pub struct CloudError {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

// ---------------------------------------------------------------------------
// Registration (HTTP, not WebSocket)
// ---------------------------------------------------------------------------

/// Body of `POST /api/v1/hubs/register`.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub hub_id: String,
    pub mac_address: String,
    pub firmware_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_token: Option<String>,
}

/// Registration response body on 2xx.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterResponse {
    #[serde(default)]
    pub hub_id: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub claimed: Option<bool>,
}
