//! Tunnel client configuration.

use std::time::Duration;

use printhub_core::settings::{
    self, MAX_RECONNECT_ATTEMPTS, RECONNECT_INITIAL_DELAY, RECONNECT_MAX_DELAY,
};

use crate::storage::HubIdentity;

/// Configuration for the hub's tunnel connection to the control plane.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// Stable hub identifier presented during registration and hello.
    pub hub_id: String,

    /// Hardware address reported to the cloud.
    pub mac_address: String,

    /// Firmware version string.
    pub firmware_version: String,

    /// Hardware version string.
    pub hardware_version: String,

    /// Skip TLS verification on the cloud endpoints (development profile).
    pub accept_invalid_certs: bool,

    /// Reconnection policy.
    pub reconnect: ReconnectPolicy,
}

impl TunnelConfig {
    pub fn new(identity: &HubIdentity, settings: &settings::Settings) -> Self {
        Self {
            hub_id: identity.hub_id.clone(),
            mac_address: identity.mac_address.clone(),
            firmware_version: settings.firmware_version.clone(),
            hardware_version: settings.hardware_version.clone(),
            accept_invalid_certs: true,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Exponential backoff reconnection policy.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Initial delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Maximum delay between reconnect attempts.
    pub max_delay: Duration,
    /// Maximum number of attempts before the tunnel parks in FAILED.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: RECONNECT_INITIAL_DELAY,
            max_delay: RECONNECT_MAX_DELAY,
            max_attempts: MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Delay for a given attempt number (0-indexed): initial * 2^attempt,
    /// capped at the maximum.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as u64;
        let shift = attempt.min(30);
        let delay_ms = base_ms.saturating_mul(1u64 << shift);
        Duration::from_millis(delay_ms.min(self.max_delay.as_millis() as u64))
    }

    /// Whether another attempt should be made.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_delays() {
        let policy = ReconnectPolicy::default();

        // 1s, 2s, 4s, 8s, 16s, 32s, 60s (capped), 60s
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(16));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(32));
        assert_eq!(policy.delay_for_attempt(6), Duration::from_secs(60));
        assert_eq!(policy.delay_for_attempt(7), Duration::from_secs(60));
        assert_eq!(policy.delay_for_attempt(63), Duration::from_secs(60));
    }

    #[test]
    fn retry_stops_past_attempt_cap() {
        let policy = ReconnectPolicy::default();
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(10));
        assert!(!policy.should_retry(11));
    }
}
