//! Hub settings and protocol timing constants.
//!
//! Resolution order: built-in defaults, then an optional `settings.json` in
//! the data directory, then `PRINTHUB_*` environment variables. The timing
//! constants are fixed by the cloud and printer protocols and are not
//! configurable at runtime.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Cloud tunnel timing
// ---------------------------------------------------------------------------

/// The cloud must answer `hub_hello` with `hub_welcome` within this window.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// WebSocket ping cadence while connected.
pub const PING_INTERVAL: Duration = Duration::from_secs(25);

/// Force-close the socket after this much inbound silence.
pub const ACTIVITY_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-printer status broadcast cadence while connected.
pub const STATUS_BROADCAST_INTERVAL: Duration = Duration::from_secs(30);

/// First reconnect delay; doubles per attempt up to [`RECONNECT_MAX_DELAY`].
pub const RECONNECT_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Reconnect delay cap.
pub const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Attempts beyond this park the tunnel in FAILED.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// FAILED auto-resets to OFFLINE after this long.
pub const FAILED_RESET_DELAY: Duration = Duration::from_secs(300);

/// Timeout for the one-time registration POST.
pub const REGISTRATION_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Printer transport timing
// ---------------------------------------------------------------------------

/// Bambu MQTT/TLS port.
pub const BAMBU_MQTT_PORT: u16 = 8883;

/// MQTT keepalive sent to the printer.
pub const MQTT_KEEPALIVE: Duration = Duration::from_secs(30);

/// Minimum spacing between printer reconnect attempts.
pub const MQTT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Cadence of the full-state `pushall` refresh while connected.
pub const PUSHALL_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Cadence of the fleet temperature summary log line.
pub const TEMP_SUMMARY_INTERVAL: Duration = Duration::from_secs(5);

/// Printer slot capacity.
pub const MAX_PRINTERS: usize = 5;

/// Hub settings resolved at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Cloud base URL (`ws://` or `wss://`).
    #[serde(default = "default_cloud_url")]
    pub cloud_url: String,
    /// Firmware version reported in `hub_hello` and registration.
    #[serde(default = "default_firmware_version")]
    pub firmware_version: String,
    /// Hardware version reported in `hub_hello`.
    #[serde(default = "default_hardware_version")]
    pub hardware_version: String,
}

fn default_cloud_url() -> String {
    "ws://127.0.0.1:8787".to_string()
}

fn default_firmware_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_hardware_version() -> String {
    format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cloud_url: default_cloud_url(),
            firmware_version: default_firmware_version(),
            hardware_version: default_hardware_version(),
        }
    }
}

impl Settings {
    /// Defaults, overlaid with `settings.json` from the data directory when
    /// present, then with `PRINTHUB_*` environment variables.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let mut settings = Self::default();

        let path = data_dir.join("settings.json");
        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            settings = serde_json::from_str(&content)?;
        }

        settings.apply_env();
        settings.validate()?;
        Ok(settings)
    }

    fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("PRINTHUB_CLOUD_URL") {
            self.cloud_url = val;
        }
        if let Ok(val) = std::env::var("PRINTHUB_HARDWARE_VERSION") {
            self.hardware_version = val;
        }
    }

    fn validate(&self) -> Result<()> {
        let url = &self.cloud_url;
        if !(url.starts_with("ws://")
            || url.starts_with("wss://")
            || url.starts_with("http://")
            || url.starts_with("https://"))
        {
            return Err(Error::Config(format!(
                "Unsupported cloud URL scheme: {url}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cloud_url_is_plain_ws() {
        let settings = Settings::default();
        assert!(settings.cloud_url.starts_with("ws://"));
    }

    #[test]
    fn load_without_file_yields_defaults() {
        let settings = Settings::load(Path::new("/nonexistent/printhub")).unwrap();
        assert_eq!(settings.cloud_url, Settings::default().cloud_url);
    }

    #[test]
    fn partial_settings_file_keeps_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"cloud_url":"wss://cloud.example"}"#).unwrap();
        assert_eq!(settings.cloud_url, "wss://cloud.example");
        assert_eq!(settings.firmware_version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn bad_scheme_is_rejected() {
        let settings = Settings {
            cloud_url: "ftp://h".into(),
            ..Default::default()
        };
        assert!(matches!(settings.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn protocol_timing_matches_cloud_contract() {
        assert_eq!(AUTH_TIMEOUT, Duration::from_secs(10));
        assert_eq!(PING_INTERVAL, Duration::from_secs(25));
        assert_eq!(ACTIVITY_TIMEOUT, Duration::from_secs(60));
        assert_eq!(STATUS_BROADCAST_INTERVAL, Duration::from_secs(30));
        assert!(MAX_PRINTERS >= 5);
    }
}
