//! Vendor-neutral printer status model.
//!
//! Every adapter normalizes its telemetry into [`PrinterSnapshot`] so the
//! fleet manager and the cloud tunnel never see vendor formats. State
//! parsing is total: any string maps to a [`PrinterState`].

use std::sync::OnceLock;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Unified printer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrinterState {
    /// Not connected.
    #[default]
    Offline,
    /// Connected but not printing.
    Idle,
    /// Actively printing.
    Printing,
    /// Print paused.
    Paused,
    /// Error state.
    Error,
    /// Connected, state not recognized.
    Unknown,
}

impl PrinterState {
    /// Stable short lowercase string used for upstream reporting.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Idle => "idle",
            Self::Printing => "printing",
            Self::Paused => "paused",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a raw vendor state string. Total: unrecognized input is
    /// [`PrinterState::Unknown`]. Case-insensitive, surrounding whitespace
    /// ignored.
    pub fn parse_state(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "idle" | "standby" | "ready" | "finish" => Self::Idle,
            "printing" | "running" | "busy" | "prepare" => Self::Printing,
            "paused" | "pause" => Self::Paused,
            "error" | "failed" | "fault" => Self::Error,
            "offline" | "disconnected" => Self::Offline,
            _ => Self::Unknown,
        }
    }
}

/// Snapshot of one printer, updated in place by its adapter.
///
/// Telemetry arrives as deltas: a parser must only touch fields present in
/// the frame, so absent fields keep their previous value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrinterSnapshot {
    /// Transport connection state.
    pub connected: bool,
    /// Derived state. `connected == false` implies Offline or Unknown.
    pub state: PrinterState,
    /// Raw state string as the vendor reported it.
    pub raw_state: String,
    /// Current or last print filename. Empty when none.
    pub filename: String,
    /// Print progress, 0-100.
    pub progress_percent: u32,
    /// Estimated remaining print time in seconds.
    pub remaining_seconds: u64,
    /// Elapsed print time in seconds.
    pub elapsed_seconds: u64,
    /// Nozzle temperature (°C).
    pub nozzle_temp: f64,
    /// Nozzle target temperature.
    pub nozzle_target: f64,
    /// Bed temperature (°C).
    pub bed_temp: f64,
    /// Bed target temperature.
    pub bed_target: f64,
    /// Chamber temperature, if the printer has a chamber sensor.
    pub chamber_temp: Option<f64>,
    /// Current layer number.
    pub current_layer: u32,
    /// Total layer count.
    pub total_layers: u32,
    /// Error message, if any.
    pub error_message: Option<String>,
    /// Monotonic milliseconds of the last successful telemetry parse.
    pub last_update_ms: u64,
}

impl PrinterSnapshot {
    /// Mark the snapshot disconnected, coercing the state so the
    /// `connected == false` invariant holds.
    pub fn mark_disconnected(&mut self) {
        self.connected = false;
        if !matches!(self.state, PrinterState::Offline | PrinterState::Unknown) {
            self.state = PrinterState::Offline;
        }
    }
}

/// Monotonic milliseconds since process start. Used for snapshot timestamps
/// and protocol deadlines; never wall-clock.
pub fn monotonic_ms() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_state_covers_known_strings() {
        for raw in ["idle", "standby", "ready", "finish", "FINISH"] {
            assert_eq!(PrinterState::parse_state(raw), PrinterState::Idle, "{raw}");
        }
        for raw in ["printing", "running", "busy", "RUNNING", "PREPARE"] {
            assert_eq!(
                PrinterState::parse_state(raw),
                PrinterState::Printing,
                "{raw}"
            );
        }
        for raw in ["paused", "pause", "PAUSE"] {
            assert_eq!(PrinterState::parse_state(raw), PrinterState::Paused, "{raw}");
        }
        for raw in ["error", "failed", "fault", "FAILED"] {
            assert_eq!(PrinterState::parse_state(raw), PrinterState::Error, "{raw}");
        }
        for raw in ["offline", "disconnected"] {
            assert_eq!(
                PrinterState::parse_state(raw),
                PrinterState::Offline,
                "{raw}"
            );
        }
    }

    #[test]
    fn parse_state_is_total() {
        assert_eq!(PrinterState::parse_state(""), PrinterState::Unknown);
        assert_eq!(PrinterState::parse_state("warming_up"), PrinterState::Unknown);
        assert_eq!(PrinterState::parse_state("🦀"), PrinterState::Unknown);
    }

    #[test]
    fn parse_state_trims_whitespace() {
        assert_eq!(PrinterState::parse_state("  Idle  "), PrinterState::Idle);
    }

    #[test]
    fn state_strings_are_stable() {
        assert_eq!(PrinterState::Idle.as_str(), "idle");
        assert_eq!(PrinterState::Printing.as_str(), "printing");
        assert_eq!(PrinterState::Paused.as_str(), "paused");
        assert_eq!(PrinterState::Error.as_str(), "error");
        assert_eq!(PrinterState::Offline.as_str(), "offline");
        assert_eq!(PrinterState::Unknown.as_str(), "unknown");
    }

    #[test]
    fn mark_disconnected_coerces_state() {
        let mut snap = PrinterSnapshot {
            connected: true,
            state: PrinterState::Printing,
            ..Default::default()
        };
        snap.mark_disconnected();
        assert!(!snap.connected);
        assert_eq!(snap.state, PrinterState::Offline);

        let mut snap = PrinterSnapshot {
            connected: true,
            state: PrinterState::Unknown,
            ..Default::default()
        };
        snap.mark_disconnected();
        assert_eq!(snap.state, PrinterState::Unknown);
    }

    #[test]
    fn monotonic_clock_advances() {
        let a = monotonic_ms();
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(monotonic_ms() > a);
    }
}
