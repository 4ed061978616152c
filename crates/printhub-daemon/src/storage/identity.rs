//! Hub identity: a stable id derived from the hardware address.
//!
//! Resolution order: explicit override in the `tunnel` namespace, then the
//! persisted id in `hub_config`, then first-boot derivation from the
//! device's MAC address (`HUB-<12 hex digits>`). The derived values are
//! persisted so the identity survives interface changes.

use tracing::{info, warn};

use super::models::{NS_HUB, NS_TUNNEL};
use super::store::ConfigStore;
use super::StoreError;

/// Stable hub identity presented to the cloud.
#[derive(Debug, Clone)]
pub struct HubIdentity {
    pub hub_id: String,
    pub mac_address: String,
}

impl HubIdentity {
    /// Load the identity, deriving and persisting it on first use.
    pub async fn load_or_derive(store: &ConfigStore) -> Result<Self, StoreError> {
        let hub_ns = store.namespace(NS_HUB);

        let mac_address = {
            let stored = hub_ns.get_string("mac_address", "").await?;
            if stored.is_empty() {
                let discovered = discover_mac();
                hub_ns.put_string("mac_address", &discovered).await?;
                discovered
            } else {
                stored
            }
        };

        // Explicit override wins over the derived id.
        let override_id = store.namespace(NS_TUNNEL).get_string("hub_id", "").await?;
        if !override_id.is_empty() {
            return Ok(Self {
                hub_id: override_id,
                mac_address,
            });
        }

        let stored_id = hub_ns.get_string("hub_id", "").await?;
        if !stored_id.is_empty() {
            return Ok(Self {
                hub_id: stored_id,
                mac_address,
            });
        }

        let hub_id = format!("HUB-{mac_address}");
        hub_ns.put_string("hub_id", &hub_id).await?;
        info!(hub_id = %hub_id, "Derived hub identity");
        Ok(Self {
            hub_id,
            mac_address,
        })
    }
}

/// First non-loopback hardware address as 12 uppercase hex digits. Falls
/// back to a random address when the host exposes none (containers).
fn discover_mac() -> String {
    match mac_address::get_mac_address() {
        Ok(Some(mac)) => mac
            .bytes()
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<String>(),
        Ok(None) | Err(_) => {
            let random = uuid::Uuid::new_v4();
            let bytes = &random.as_bytes()[..6];
            warn!("No hardware address available, generating a random one");
            bytes.iter().map(|b| format!("{b:02X}")).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identity_is_stable_across_loads() {
        let store = ConfigStore::open_in_memory().await.unwrap();
        let first = HubIdentity::load_or_derive(&store).await.unwrap();
        let second = HubIdentity::load_or_derive(&store).await.unwrap();
        assert_eq!(first.hub_id, second.hub_id);
        assert_eq!(first.mac_address, second.mac_address);
        assert!(first.hub_id.starts_with("HUB-"));
        assert_eq!(first.mac_address.len(), 12);
    }

    #[tokio::test]
    async fn override_takes_precedence() {
        let store = ConfigStore::open_in_memory().await.unwrap();
        store
            .namespace(NS_TUNNEL)
            .put_string("hub_id", "HUB-OVERRIDE")
            .await
            .unwrap();
        let identity = HubIdentity::load_or_derive(&store).await.unwrap();
        assert_eq!(identity.hub_id, "HUB-OVERRIDE");
    }

    #[tokio::test]
    async fn derived_id_matches_mac() {
        let store = ConfigStore::open_in_memory().await.unwrap();
        let identity = HubIdentity::load_or_derive(&store).await.unwrap();
        assert_eq!(identity.hub_id, format!("HUB-{}", identity.mac_address));
    }
}
