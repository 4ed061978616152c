//! Bambu status report parsing.
//!
//! The printer publishes JSON deltas under a `print` object; every field is
//! optional and an absent field must not disturb the previous value.

use serde_json::Value;
use tracing::{debug, warn};

use printhub_core::{monotonic_ms, PrinterSnapshot, PrinterState};

/// Map a Bambu `gcode_state` onto the unified state.
pub fn map_gcode_state(raw: &str) -> PrinterState {
    match raw {
        "IDLE" | "FINISH" => PrinterState::Idle,
        "RUNNING" | "PREPARE" => PrinterState::Printing,
        "PAUSE" => PrinterState::Paused,
        "FAILED" => PrinterState::Error,
        _ => PrinterState::Unknown,
    }
}

/// Apply one report payload to the snapshot. Returns `true` when the frame
/// carried a `print` object and the snapshot was updated.
pub fn apply_report(snapshot: &mut PrinterSnapshot, payload: &Value) -> bool {
    let Some(print) = payload.get("print") else {
        debug!("Report without print object, ignoring");
        return false;
    };

    if let Some(raw) = print.get("gcode_state").and_then(Value::as_str) {
        snapshot.raw_state = raw.to_string();
        snapshot.state = map_gcode_state(raw);
    }

    if let Some(v) = print.get("nozzle_temper").and_then(Value::as_f64) {
        snapshot.nozzle_temp = v;
    }
    if let Some(v) = print.get("nozzle_target_temper").and_then(Value::as_f64) {
        snapshot.nozzle_target = v;
    }
    if let Some(v) = print.get("bed_temper").and_then(Value::as_f64) {
        snapshot.bed_temp = v;
    }
    if let Some(v) = print.get("bed_target_temper").and_then(Value::as_f64) {
        snapshot.bed_target = v;
    }
    if let Some(v) = print.get("chamber_temper").and_then(Value::as_f64) {
        snapshot.chamber_temp = Some(v);
    }

    if let Some(v) = print.get("mc_percent").and_then(Value::as_u64) {
        snapshot.progress_percent = v.min(100) as u32;
    }
    // The printer reports remaining time in minutes.
    if let Some(v) = print.get("mc_remaining_time").and_then(Value::as_u64) {
        snapshot.remaining_seconds = v * 60;
    }
    if let Some(v) = print.get("layer_num").and_then(Value::as_u64) {
        snapshot.current_layer = v as u32;
    }
    if let Some(v) = print.get("total_layer_num").and_then(Value::as_u64) {
        snapshot.total_layers = v as u32;
    }
    if let Some(v) = print.get("gcode_file").and_then(Value::as_str) {
        snapshot.filename = v.to_string();
    }

    if let Some(hms) = print.get("hms").and_then(Value::as_array) {
        if !hms.is_empty() {
            warn!(count = hms.len(), "Printer reported HMS errors");
        }
    }

    snapshot.connected = true;
    snapshot.last_update_ms = monotonic_ms();
    true
}
