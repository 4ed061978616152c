//! Bambu command envelopes.
//!
//! Every control frame is a JSON object keyed by a command group, carrying a
//! per-adapter monotonic `sequence_id` serialized as a decimal string.

use serde_json::{json, Value};

/// LED node on X1C/P1-series machines.
pub const LED_NODE_CHAMBER: &str = "chamber_light";

/// LED node on A1-series machines.
pub const LED_NODE_WORK: &str = "work_light";

/// Command to send to the printer.
#[derive(Debug, Clone)]
pub enum BambuCommand {
    /// Request a full status push instead of deltas.
    PushAll,
    /// Pause the current print.
    Pause,
    /// Resume a paused print.
    Resume,
    /// Stop the current print.
    Stop,
    /// Send a raw G-code line.
    GcodeLine(String),
    /// Control one LED node.
    Led { node: &'static str, on: bool },
}

impl BambuCommand {
    /// Build the JSON envelope for this command with the given sequence id.
    pub fn to_json(&self, sequence_id: u32) -> Value {
        let seq = sequence_id.to_string();
        match self {
            Self::PushAll => json!({
                "pushing": {
                    "sequence_id": seq,
                    "command": "pushall"
                }
            }),
            Self::Pause => json!({
                "print": {
                    "sequence_id": seq,
                    "command": "pause"
                }
            }),
            Self::Resume => json!({
                "print": {
                    "sequence_id": seq,
                    "command": "resume"
                }
            }),
            Self::Stop => json!({
                "print": {
                    "sequence_id": seq,
                    "command": "stop"
                }
            }),
            Self::GcodeLine(line) => json!({
                "print": {
                    "sequence_id": seq,
                    "command": "gcode_line",
                    "param": line
                }
            }),
            Self::Led { node, on } => json!({
                "system": {
                    "sequence_id": seq,
                    "command": "ledctrl",
                    "led_node": node,
                    "led_mode": if *on { "on" } else { "off" },
                    "led_on_time": 500,
                    "led_off_time": 500,
                    "loop_times": 1,
                    "interval_time": 1000
                }
            }),
        }
    }
}

/// Status topic the printer publishes on.
pub fn report_topic(serial: &str) -> String {
    format!("device/{serial}/report")
}

/// Command topic the hub publishes on.
pub fn request_topic(serial: &str) -> String {
    format!("device/{serial}/request")
}
