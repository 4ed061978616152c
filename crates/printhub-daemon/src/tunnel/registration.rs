//! One-time hub registration with the control plane.
//!
//! The cloud base URL is configured as a WebSocket URL; the registration
//! call maps it back to HTTP. 200/201 and 409 (already registered) are both
//! terminal successes; everything else sends the tunnel back through the
//! reconnect path.

use reqwest::StatusCode;
use tracing::{info, warn};

use printhub_core::settings::REGISTRATION_TIMEOUT;
use printhub_proto::types::REGISTER_PATH;
use printhub_proto::{RegisterRequest, RegisterResponse};

use super::config::TunnelConfig;
use super::error::TunnelError;
use crate::storage::TenantBinding;

/// Registration outcome; both variants persist `registered = true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    AlreadyRegistered,
}

/// Map a WebSocket base URL onto its HTTP counterpart and strip any
/// trailing slash.
pub fn http_base_url(ws_base: &str) -> String {
    let mut base = if let Some(rest) = ws_base.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if let Some(rest) = ws_base.strip_prefix("ws://") {
        format!("http://{rest}")
    } else {
        ws_base.to_string()
    };
    while base.ends_with('/') {
        base.pop();
    }
    base
}

/// Register this hub with the control plane.
pub async fn register_hub(
    config: &TunnelConfig,
    binding: &TenantBinding,
) -> Result<RegisterOutcome, TunnelError> {
    let url = format!("{}{}", http_base_url(&binding.cloud_url), REGISTER_PATH);
    info!(url = %url, hub_id = %config.hub_id, "Registering hub");

    let body = RegisterRequest {
        hub_id: config.hub_id.clone(),
        mac_address: config.mac_address.clone(),
        firmware_version: config.firmware_version.clone(),
        tenant_id: (!binding.tenant_id.is_empty()).then(|| binding.tenant_id.clone()),
        claim_token: (!binding.claim_token.is_empty()).then(|| binding.claim_token.clone()),
    };

    let client = reqwest::Client::builder()
        .timeout(REGISTRATION_TIMEOUT)
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .build()
        .map_err(|e| TunnelError::Registration(e.to_string()))?;

    let response = client
        .post(&url)
        .json(&body)
        .send()
        .await
        .map_err(|e| TunnelError::Registration(e.to_string()))?;

    match response.status() {
        StatusCode::OK | StatusCode::CREATED => {
            match response.json::<RegisterResponse>().await {
                Ok(parsed) => info!(
                    tenant_id = parsed.tenant_id.as_deref().unwrap_or("-"),
                    claimed = parsed.claimed.unwrap_or(false),
                    "Hub registered"
                ),
                Err(e) => warn!(error = %e, "Registered, but response body was unparseable"),
            }
            Ok(RegisterOutcome::Registered)
        }
        StatusCode::CONFLICT => {
            info!("Hub already registered");
            Ok(RegisterOutcome::AlreadyRegistered)
        }
        status => Err(TunnelError::Registration(format!(
            "Registration rejected with HTTP {status}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_schemes_map_to_http() {
        assert_eq!(http_base_url("ws://h:8787"), "http://h:8787");
        assert_eq!(
            http_base_url("wss://cloud.example:443"),
            "https://cloud.example:443"
        );
    }

    #[test]
    fn other_schemes_pass_through() {
        assert_eq!(http_base_url("https://cloud.example"), "https://cloud.example");
    }

    #[test]
    fn trailing_slashes_are_trimmed() {
        assert_eq!(http_base_url("ws://h:8787/"), "http://h:8787");
    }

    #[test]
    fn registration_url_shape() {
        let base = http_base_url("ws://h:8787");
        assert_eq!(
            format!("{base}{REGISTER_PATH}"),
            "http://h:8787/api/v1/hubs/register"
        );
    }
}
