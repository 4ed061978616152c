//! Stored record types: printer slot configuration and the tenant binding.

use serde::{Deserialize, Serialize};

use printhub_core::settings::BAMBU_MQTT_PORT;
use printhub_proto::types::VENDOR_BAMBU;

use super::store::{ConfigStore, Namespace};
use super::StoreError;

/// Namespace holding hub identity and name.
pub const NS_HUB: &str = "hub_config";

/// Namespace holding the tenant binding and registration flag.
pub const NS_TUNNEL: &str = "tunnel";

/// Namespace reserved for link-layer credentials (managed externally).
pub const NS_WIFI: &str = "wifi";

/// Namespace for one printer slot.
pub fn printer_namespace(slot: usize) -> String {
    format!("printer{slot}")
}

/// One printer slot record. A slot with `active == false` (or no record at
/// all) is free.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrinterSlotRecord {
    pub id: String,
    pub vendor: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub access_code: String,
    pub serial: String,
    pub api_key: String,
    pub active: bool,
}

impl PrinterSlotRecord {
    /// Slot invariants: vendor and address non-empty; Bambu additionally
    /// requires access code and serial.
    pub fn validate(&self) -> Result<(), String> {
        if self.vendor.is_empty() {
            return Err("Missing connection type".into());
        }
        if self.address.is_empty() {
            return Err("Missing printer address".into());
        }
        if self.vendor == VENDOR_BAMBU && (self.access_code.is_empty() || self.serial.is_empty()) {
            return Err("Bambu printers require serial_number and access_code".into());
        }
        Ok(())
    }

    /// Load the record from a slot namespace. Returns `None` for a free
    /// slot.
    pub async fn load(ns: &Namespace) -> Result<Option<Self>, StoreError> {
        if !ns.get_bool("active", false).await? {
            return Ok(None);
        }
        Ok(Some(Self {
            id: ns.get_string("id", "").await?,
            vendor: ns.get_string("vendor", "").await?,
            name: ns.get_string("name", "").await?,
            address: ns.get_string("address", "").await?,
            port: ns.get_i64("port", i64::from(BAMBU_MQTT_PORT)).await? as u16,
            access_code: ns.get_string("access_code", "").await?,
            serial: ns.get_string("serial", "").await?,
            api_key: ns.get_string("api_key", "").await?,
            active: true,
        }))
    }

    /// Persist the record into a slot namespace. Key-level atomicity only;
    /// the fleet manager serializes whole-record rewrites.
    pub async fn save(&self, ns: &Namespace) -> Result<(), StoreError> {
        ns.put_string("id", &self.id).await?;
        ns.put_string("vendor", &self.vendor).await?;
        ns.put_string("name", &self.name).await?;
        ns.put_string("address", &self.address).await?;
        ns.put_i64("port", i64::from(self.port)).await?;
        ns.put_string("access_code", &self.access_code).await?;
        ns.put_string("serial", &self.serial).await?;
        ns.put_string("api_key", &self.api_key).await?;
        ns.put_bool("active", self.active).await?;
        Ok(())
    }

    /// Free the slot.
    pub async fn erase(ns: &Namespace) -> Result<(), StoreError> {
        ns.clear().await
    }
}

/// Tenant binding written once during provisioning and read by the tunnel.
/// Incomplete bindings keep the tunnel OFFLINE.
#[derive(Debug, Clone, PartialEq)]
pub struct TenantBinding {
    pub tenant_id: String,
    pub claim_token: String,
    pub cloud_url: String,
}

impl TenantBinding {
    /// Load the binding; `None` when any field is absent.
    pub async fn load(store: &ConfigStore) -> Result<Option<Self>, StoreError> {
        let ns = store.namespace(NS_TUNNEL);
        let tenant_id = ns.get_string("tenant_id", "").await?;
        let claim_token = ns.get_string("claim_token", "").await?;
        let cloud_url = ns.get_string("cloud_url", "").await?;
        if tenant_id.is_empty() || claim_token.is_empty() || cloud_url.is_empty() {
            return Ok(None);
        }
        Ok(Some(Self {
            tenant_id,
            claim_token,
            cloud_url,
        }))
    }

    /// Write the binding and clear the registration flag.
    pub async fn save(&self, store: &ConfigStore) -> Result<(), StoreError> {
        let ns = store.namespace(NS_TUNNEL);
        ns.put_string("tenant_id", &self.tenant_id).await?;
        ns.put_string("claim_token", &self.claim_token).await?;
        ns.put_string("cloud_url", &self.cloud_url).await?;
        ns.put_bool("registered", false).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bambu_record() -> PrinterSlotRecord {
        PrinterSlotRecord {
            id: "p1".into(),
            vendor: "bambu".into(),
            name: "Shop X1C".into(),
            address: "10.0.0.5".into(),
            port: 8883,
            access_code: "12345678".into(),
            serial: "01PXXXXXXXXXX01".into(),
            api_key: String::new(),
            active: true,
        }
    }

    #[test]
    fn validate_rejects_incomplete_records() {
        let mut record = bambu_record();
        record.vendor.clear();
        assert!(record.validate().is_err());

        let mut record = bambu_record();
        record.address.clear();
        assert!(record.validate().is_err());

        let mut record = bambu_record();
        record.access_code.clear();
        assert!(record.validate().is_err());

        let mut record = bambu_record();
        record.serial.clear();
        assert!(record.validate().is_err());

        assert!(bambu_record().validate().is_ok());
    }

    #[test]
    fn validate_only_requires_bambu_credentials_for_bambu() {
        let record = PrinterSlotRecord {
            vendor: "octoprint".into(),
            address: "10.0.0.9".into(),
            api_key: "key".into(),
            active: true,
            ..Default::default()
        };
        assert!(record.validate().is_ok());
    }

    #[tokio::test]
    async fn slot_record_round_trip() {
        let store = ConfigStore::open_in_memory().await.unwrap();
        let ns = store.namespace(&printer_namespace(0));

        assert!(PrinterSlotRecord::load(&ns).await.unwrap().is_none());

        let record = bambu_record();
        record.save(&ns).await.unwrap();
        let loaded = PrinterSlotRecord::load(&ns).await.unwrap().unwrap();
        assert_eq!(loaded, record);

        PrinterSlotRecord::erase(&ns).await.unwrap();
        assert!(PrinterSlotRecord::load(&ns).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn inactive_slot_loads_as_free() {
        let store = ConfigStore::open_in_memory().await.unwrap();
        let ns = store.namespace(&printer_namespace(1));
        let mut record = bambu_record();
        record.active = false;
        record.save(&ns).await.unwrap();
        assert!(PrinterSlotRecord::load(&ns).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn tenant_binding_requires_all_fields() {
        let store = ConfigStore::open_in_memory().await.unwrap();
        assert!(TenantBinding::load(&store).await.unwrap().is_none());

        let ns = store.namespace(NS_TUNNEL);
        ns.put_string("tenant_id", "t-1").await.unwrap();
        ns.put_string("claim_token", "ct").await.unwrap();
        assert!(TenantBinding::load(&store).await.unwrap().is_none());

        ns.put_string("cloud_url", "ws://h:8787").await.unwrap();
        let binding = TenantBinding::load(&store).await.unwrap().unwrap();
        assert_eq!(binding.tenant_id, "t-1");
        assert_eq!(binding.cloud_url, "ws://h:8787");
    }

    #[tokio::test]
    async fn saving_binding_clears_registered() {
        let store = ConfigStore::open_in_memory().await.unwrap();
        let ns = store.namespace(NS_TUNNEL);
        ns.put_bool("registered", true).await.unwrap();

        TenantBinding {
            tenant_id: "t-2".into(),
            claim_token: "ct2".into(),
            cloud_url: "wss://cloud.example".into(),
        }
        .save(&store)
        .await
        .unwrap();

        assert!(!ns.get_bool("registered", false).await.unwrap());
    }
}
