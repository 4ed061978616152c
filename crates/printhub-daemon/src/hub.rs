//! Hub context: the coordination object shared by the tunnel, provisioning,
//! and the scheduler.
//!
//! Holds the store, the fleet manager behind a single mutex (slot-table
//! mutation stays serialized), the output pins, and the cloud-disabled
//! flag. Neither the tunnel nor provisioning owns the other; both hold an
//! `Arc<HubContext>`.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;

use crate::fleet::FleetManager;
use crate::gpio::OutputPins;
use crate::storage::ConfigStore;

pub struct HubContext {
    pub store: ConfigStore,
    pub fleet: Mutex<FleetManager>,
    pub pins: OutputPins,
    cloud_disabled: AtomicBool,
}

impl HubContext {
    pub fn new(store: ConfigStore) -> Self {
        let fleet = FleetManager::new(store.clone());
        Self {
            store,
            fleet: Mutex::new(fleet),
            pins: OutputPins::new(),
            cloud_disabled: AtomicBool::new(false),
        }
    }

    /// Set by the `hub_command disconnect` action; keeps the tunnel from
    /// auto-reconnecting until the next boot or provisioning change.
    pub fn cloud_disabled(&self) -> bool {
        self.cloud_disabled.load(Ordering::Relaxed)
    }

    pub fn set_cloud_disabled(&self, disabled: bool) {
        self.cloud_disabled.store(disabled, Ordering::Relaxed);
    }
}
