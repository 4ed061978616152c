//! Provisioning payload ingest.
//!
//! The on-device provisioning transport is external; it hands the hub three
//! kinds of JSON payloads: link credentials, printer configuration, and the
//! cloud binding. This module applies them to the store and the fleet.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use printhub_core::settings::BAMBU_MQTT_PORT;
use printhub_proto::types::VENDOR_BAMBU;

use crate::fleet::FleetError;
use crate::hub::HubContext;
use crate::printer::PrinterError;
use crate::storage::models::NS_WIFI;
use crate::storage::{PrinterSlotRecord, StoreError, TenantBinding};

#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    #[error("Invalid provisioning payload: {0}")]
    Invalid(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Fleet(#[from] FleetError),

    #[error(transparent)]
    Printer(#[from] PrinterError),
}

/// Map an HTTP(S) base URL onto its WebSocket counterpart. Applied when the
/// cloud binding is ingested, so the stored URL is always `ws://`/`wss://`.
pub fn normalize_cloud_url(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    }
}

#[derive(Debug, Deserialize)]
struct CloudConfigPayload {
    tenant_id: String,
    claim_token: String,
    api_url: String,
}

/// Apply a cloud binding payload: `{"tenant_id","claim_token","api_url"}`.
/// Rewrites the binding tuple and clears the registration flag when the
/// binding changed.
pub async fn apply_cloud_config(hub: &HubContext, payload: &str) -> Result<(), ProvisioningError> {
    let config: CloudConfigPayload = serde_json::from_str(payload)?;
    if config.tenant_id.is_empty() || config.claim_token.is_empty() || config.api_url.is_empty() {
        return Err(ProvisioningError::Invalid(
            "tenant_id, claim_token and api_url are all required".into(),
        ));
    }

    let binding = TenantBinding {
        tenant_id: config.tenant_id,
        claim_token: config.claim_token,
        cloud_url: normalize_cloud_url(&config.api_url),
    };

    if TenantBinding::load(&hub.store).await?.as_ref() == Some(&binding) {
        return Ok(());
    }

    binding.save(&hub.store).await?;
    hub.set_cloud_disabled(false);
    info!(tenant_id = %binding.tenant_id, cloud_url = %binding.cloud_url, "Cloud binding updated");
    Ok(())
}

#[derive(Debug, Deserialize)]
struct LinkCredentialsPayload {
    #[serde(default)]
    ssid: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    clear: Option<bool>,
}

/// Store or clear link credentials: `{"ssid","password"}` or
/// `{"clear":true}`. Bringing the link up is the external link layer's job.
pub async fn apply_link_credentials(
    hub: &HubContext,
    payload: &str,
) -> Result<(), ProvisioningError> {
    let creds: LinkCredentialsPayload = serde_json::from_str(payload)?;
    let ns = hub.store.namespace(NS_WIFI);

    if creds.clear.unwrap_or(false) {
        ns.clear().await?;
        info!("Link credentials cleared");
        return Ok(());
    }

    let Some(ssid) = creds.ssid.filter(|s| !s.is_empty()) else {
        return Err(ProvisioningError::Invalid("Missing ssid".into()));
    };
    ns.put_string("ssid", &ssid).await?;
    ns.put_string("password", creds.password.as_deref().unwrap_or(""))
        .await?;
    info!(ssid = %ssid, "Link credentials stored");
    Ok(())
}

#[derive(Debug, Deserialize)]
struct PrinterConfigPayload {
    action: String,
    #[serde(rename = "type", default)]
    vendor: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    ip: Option<String>,
    #[serde(rename = "accessCode", default)]
    access_code: Option<String>,
    #[serde(default)]
    serial: Option<String>,
    #[serde(default)]
    slot: Option<usize>,
    #[serde(default)]
    on: Option<bool>,
}

/// Apply a printer configuration payload. Actions: `add`, `remove`, `list`,
/// `light`. Returns a JSON summary for the provisioning transport to relay
/// back.
pub async fn apply_printer_config(
    hub: &HubContext,
    payload: &str,
) -> Result<Value, ProvisioningError> {
    let config: PrinterConfigPayload = serde_json::from_str(payload)?;

    match config.action.as_str() {
        "add" => {
            let serial = config
                .serial
                .filter(|s| !s.is_empty())
                .ok_or_else(|| ProvisioningError::Invalid("Missing serial".into()))?;
            let record = PrinterSlotRecord {
                id: serial.clone(),
                vendor: config.vendor.unwrap_or_else(|| VENDOR_BAMBU.to_string()),
                name: config.name.unwrap_or_else(|| serial.clone()),
                address: config.ip.unwrap_or_default(),
                port: BAMBU_MQTT_PORT,
                access_code: config.access_code.unwrap_or_default(),
                serial,
                api_key: String::new(),
                active: true,
            };
            let slot = hub.fleet.lock().await.add(record).await?;
            Ok(json!({ "ok": true, "slot": slot }))
        }
        "remove" => {
            let slot = config
                .slot
                .ok_or_else(|| ProvisioningError::Invalid("Missing slot".into()))?;
            hub.fleet.lock().await.remove(slot).await?;
            Ok(json!({ "ok": true, "slot": slot }))
        }
        "list" => {
            let fleet = hub.fleet.lock().await;
            let printers: Vec<Value> = (0..fleet.capacity())
                .filter_map(|slot| {
                    fleet.get(slot).map(|occupied| {
                        json!({
                            "slot": slot,
                            "type": occupied.record.vendor,
                            "name": occupied.record.name,
                            "serial": occupied.record.serial,
                            "connected": occupied.adapter.is_connected(),
                        })
                    })
                })
                .collect();
            Ok(json!({ "ok": true, "printers": printers }))
        }
        "light" => {
            let slot = config
                .slot
                .ok_or_else(|| ProvisioningError::Invalid("Missing slot".into()))?;
            let on = config.on.unwrap_or(false);
            let fleet = hub.fleet.lock().await;
            let occupied = fleet
                .get(slot)
                .ok_or_else(|| ProvisioningError::Invalid(format!("Slot {slot} is empty")))?;
            occupied.adapter.set_light(on)?;
            Ok(json!({ "ok": true, "slot": slot, "on": on }))
        }
        other => {
            warn!(action = %other, "Unknown provisioning action");
            Err(ProvisioningError::Invalid(format!(
                "Unknown action: {other}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ConfigStore, NS_TUNNEL};
    use std::sync::Arc;

    async fn hub() -> Arc<HubContext> {
        Arc::new(HubContext::new(ConfigStore::open_in_memory().await.unwrap()))
    }

    #[test]
    fn http_schemes_normalize_to_websocket() {
        assert_eq!(normalize_cloud_url("http://h:8787"), "ws://h:8787");
        assert_eq!(
            normalize_cloud_url("https://cloud.example"),
            "wss://cloud.example"
        );
        assert_eq!(normalize_cloud_url("ws://h:8787"), "ws://h:8787");
    }

    #[tokio::test]
    async fn cloud_config_persists_binding_and_clears_registered() {
        let hub = hub().await;
        let ns = hub.store.namespace(NS_TUNNEL);
        ns.put_bool("registered", true).await.unwrap();

        apply_cloud_config(
            &hub,
            r#"{"tenant_id":"t-1","claim_token":"ct","api_url":"http://h:8787"}"#,
        )
        .await
        .unwrap();

        let binding = TenantBinding::load(&hub.store).await.unwrap().unwrap();
        assert_eq!(binding.cloud_url, "ws://h:8787");
        assert!(!ns.get_bool("registered", false).await.unwrap());
    }

    #[tokio::test]
    async fn unchanged_cloud_config_keeps_registration() {
        let hub = hub().await;
        apply_cloud_config(
            &hub,
            r#"{"tenant_id":"t-1","claim_token":"ct","api_url":"ws://h:8787"}"#,
        )
        .await
        .unwrap();
        let ns = hub.store.namespace(NS_TUNNEL);
        ns.put_bool("registered", true).await.unwrap();

        apply_cloud_config(
            &hub,
            r#"{"tenant_id":"t-1","claim_token":"ct","api_url":"ws://h:8787"}"#,
        )
        .await
        .unwrap();
        assert!(ns.get_bool("registered", false).await.unwrap());
    }

    #[tokio::test]
    async fn incomplete_cloud_config_is_rejected() {
        let hub = hub().await;
        let result = apply_cloud_config(
            &hub,
            r#"{"tenant_id":"","claim_token":"ct","api_url":"ws://h:8787"}"#,
        )
        .await;
        assert!(matches!(result, Err(ProvisioningError::Invalid(_))));
    }

    #[tokio::test]
    async fn printer_add_list_remove_round_trip() {
        let hub = hub().await;

        let added = apply_printer_config(
            &hub,
            r#"{"action":"add","type":"bambu","name":"Shop X1C","ip":"10.0.0.5",
                "accessCode":"12345678","serial":"S1"}"#,
        )
        .await
        .unwrap();
        assert_eq!(added["slot"], 0);

        let listed = apply_printer_config(&hub, r#"{"action":"list"}"#).await.unwrap();
        let printers = listed["printers"].as_array().unwrap();
        assert_eq!(printers.len(), 1);
        assert_eq!(printers[0]["serial"], "S1");
        assert_eq!(printers[0]["connected"], false);

        apply_printer_config(&hub, r#"{"action":"remove","slot":0}"#)
            .await
            .unwrap();
        let listed = apply_printer_config(&hub, r#"{"action":"list"}"#).await.unwrap();
        assert!(listed["printers"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn light_on_empty_slot_fails() {
        let hub = hub().await;
        let result = apply_printer_config(&hub, r#"{"action":"light","slot":0,"on":true}"#).await;
        assert!(matches!(result, Err(ProvisioningError::Invalid(_))));
    }

    #[tokio::test]
    async fn link_credentials_store_and_clear() {
        let hub = hub().await;
        apply_link_credentials(&hub, r#"{"ssid":"shopnet","password":"secret"}"#)
            .await
            .unwrap();
        let ns = hub.store.namespace(NS_WIFI);
        assert_eq!(ns.get_string("ssid", "").await.unwrap(), "shopnet");

        apply_link_credentials(&hub, r#"{"clear":true}"#).await.unwrap();
        assert_eq!(ns.get_string("ssid", "").await.unwrap(), "");
    }
}
