//! The fleet manager owns the slot table and every live adapter.
//!
//! All mutation goes through this type behind the hub context's mutex, so
//! slot changes and adapter lifecycle stay serialized even though each
//! adapter drives its transport on its own task.

use std::time::Duration;

use tracing::{info, warn};

use printhub_core::settings::{MAX_PRINTERS, TEMP_SUMMARY_INTERVAL};
use printhub_core::{monotonic_ms, PrinterSnapshot};

use crate::printer::{create_adapter, PrinterAdapter, PrinterError};
use crate::storage::{printer_namespace, ConfigStore, PrinterSlotRecord, StoreError};

/// Attempts for persisting a slot record change.
const PERSIST_ATTEMPTS: u32 = 3;

/// Delay between persist attempts.
const PERSIST_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Fleet operation errors, surfaced upstream through command acks.
#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    #[error("No free printer slots")]
    NoFreeSlot,

    #[error("Printer {0} already configured")]
    Duplicate(String),

    #[error("Printer {0} not found")]
    NotFound(String),

    #[error("Invalid printer config: {0}")]
    InvalidConfig(String),

    #[error("Unknown printer vendor: {0}")]
    UnknownVendor(String),

    #[error("Persist failed: {0}")]
    Persist(#[from] StoreError),
}

/// One occupied slot: the persisted record plus its live adapter.
pub struct PrinterSlot {
    pub record: PrinterSlotRecord,
    pub adapter: Box<dyn PrinterAdapter>,
}

/// Slot table of fixed capacity. Slots are never implicitly garbage
/// collected; they are created by `add` and freed by `remove`.
pub struct FleetManager {
    store: ConfigStore,
    slots: Vec<Option<PrinterSlot>>,
    last_summary_ms: u64,
}

impl FleetManager {
    pub fn new(store: ConfigStore) -> Self {
        Self {
            store,
            slots: (0..MAX_PRINTERS).map(|_| None).collect(),
            last_summary_ms: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Instantiate and connect an adapter for every persisted active slot.
    /// Failures are logged and skipped; one bad record must not take down
    /// the rest of the fleet.
    pub async fn load_all(&mut self) {
        for slot in 0..self.slots.len() {
            let ns = self.store.namespace(&printer_namespace(slot));
            let record = match PrinterSlotRecord::load(&ns).await {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    warn!(slot, error = %e, "Failed to load printer slot");
                    continue;
                }
            };

            match create_adapter(&record) {
                Ok(mut adapter) => {
                    info!(slot, printer = %record.serial, vendor = %record.vendor, "Loaded printer slot");
                    if let Err(e) = adapter.connect().await {
                        warn!(slot, printer = %record.serial, error = %e, "Initial connect failed");
                    }
                    self.slots[slot] = Some(PrinterSlot { record, adapter });
                }
                Err(e) => {
                    warn!(slot, vendor = %record.vendor, error = %e, "No adapter for stored slot");
                }
            }
        }
        info!(
            active = self.active_count(),
            capacity = self.slots.len(),
            "Fleet loaded"
        );
    }

    /// Add a printer to the lowest free slot: validate, persist, instantiate,
    /// auto-connect. Returns the slot index.
    pub async fn add(&mut self, mut record: PrinterSlotRecord) -> Result<usize, FleetError> {
        record.active = true;
        record.validate().map_err(FleetError::InvalidConfig)?;

        if self.find_by_serial(&record.serial).is_some() {
            return Err(FleetError::Duplicate(record.serial));
        }

        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(FleetError::NoFreeSlot)?;

        let mut adapter = match create_adapter(&record) {
            Ok(adapter) => adapter,
            Err(PrinterError::UnknownVendor(v)) => return Err(FleetError::UnknownVendor(v)),
            Err(e) => return Err(FleetError::InvalidConfig(e.to_string())),
        };

        self.persist(slot, &record).await?;

        if let Err(e) = adapter.connect().await {
            warn!(slot, printer = %record.serial, error = %e, "Connect after add failed");
        }
        info!(slot, printer = %record.serial, "Printer added");
        self.slots[slot] = Some(PrinterSlot { record, adapter });
        Ok(slot)
    }

    /// Free a slot: disconnect, drop the adapter, erase the stored record.
    pub async fn remove(&mut self, slot: usize) -> Result<(), FleetError> {
        let Some(mut occupied) = self.slots.get_mut(slot).and_then(Option::take) else {
            return Err(FleetError::NotFound(format!("slot {slot}")));
        };
        occupied.adapter.disconnect().await;
        self.erase(slot).await?;
        info!(slot, printer = %occupied.record.serial, "Printer removed");
        Ok(())
    }

    /// Free the slot holding the printer with the given serial.
    pub async fn remove_by_serial(&mut self, serial: &str) -> Result<usize, FleetError> {
        let slot = self
            .find_by_serial(serial)
            .ok_or_else(|| FleetError::NotFound(serial.to_string()))?;
        self.remove(slot).await?;
        Ok(slot)
    }

    /// Replace the configuration of an existing printer in place. The slot
    /// index is preserved; the session is rebuilt with the new settings.
    pub async fn update(&mut self, record: PrinterSlotRecord) -> Result<usize, FleetError> {
        let slot = self
            .find_by_serial(&record.serial)
            .ok_or_else(|| FleetError::NotFound(record.serial.clone()))?;

        if let Some(occupied) = &mut self.slots[slot] {
            occupied.adapter.disconnect().await;
        }
        self.slots[slot] = None;

        let mut record = record;
        record.active = true;
        record.validate().map_err(FleetError::InvalidConfig)?;

        let mut adapter = match create_adapter(&record) {
            Ok(adapter) => adapter,
            Err(PrinterError::UnknownVendor(v)) => return Err(FleetError::UnknownVendor(v)),
            Err(e) => return Err(FleetError::InvalidConfig(e.to_string())),
        };

        self.persist(slot, &record).await?;

        if let Err(e) = adapter.connect().await {
            warn!(slot, printer = %record.serial, error = %e, "Connect after update failed");
        }
        info!(slot, printer = %record.serial, "Printer updated");
        self.slots[slot] = Some(PrinterSlot { record, adapter });
        Ok(slot)
    }

    pub fn get(&self, slot: usize) -> Option<&PrinterSlot> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub fn find_by_serial(&self, serial: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|s| s.record.serial == serial))
    }

    pub fn adapter_for_serial(&self, serial: &str) -> Option<&dyn PrinterAdapter> {
        self.find_by_serial(serial)
            .and_then(|slot| self.get(slot))
            .map(|slot| slot.adapter.as_ref())
    }

    /// (serial, snapshot) pairs for every occupied slot, in slot order.
    pub fn statuses(&self) -> Vec<(String, PrinterSnapshot)> {
        self.slots
            .iter()
            .flatten()
            .map(|slot| (slot.record.serial.clone(), slot.adapter.status()))
            .collect()
    }

    pub fn connected_count(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|slot| slot.adapter.is_connected())
            .count()
    }

    pub fn active_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Disconnect every adapter without touching the persisted records.
    /// Used at daemon shutdown; the slots reload on the next boot.
    pub async fn shutdown(&mut self) {
        for slot in self.slots.iter_mut().flatten() {
            slot.adapter.disconnect().await;
        }
    }

    /// Per-slot housekeeping plus the periodic temperature summary line.
    pub fn poll_all(&mut self) {
        for slot in self.slots.iter().flatten() {
            slot.adapter.poll();
        }

        let now = monotonic_ms();
        if now.saturating_sub(self.last_summary_ms) >= TEMP_SUMMARY_INTERVAL.as_millis() as u64 {
            self.last_summary_ms = now;
            self.log_temperature_summary();
        }
    }

    fn log_temperature_summary(&self) {
        if self.active_count() == 0 {
            return;
        }
        let summary: Vec<String> = self
            .slots
            .iter()
            .flatten()
            .map(|slot| {
                let status = slot.adapter.status();
                if status.connected {
                    format!(
                        "{} nozzle {:.1}/{:.1} bed {:.1}/{:.1}",
                        slot.adapter.display_name(),
                        status.nozzle_temp,
                        status.nozzle_target,
                        status.bed_temp,
                        status.bed_target
                    )
                } else {
                    format!("{} offline", slot.adapter.display_name())
                }
            })
            .collect();
        info!(
            connected = self.connected_count(),
            active = self.active_count(),
            "Fleet temperatures: {}",
            summary.join("; ")
        );
    }

    async fn persist(&self, slot: usize, record: &PrinterSlotRecord) -> Result<(), FleetError> {
        let ns = self.store.namespace(&printer_namespace(slot));
        let mut last_err = None;
        for attempt in 0..PERSIST_ATTEMPTS {
            match record.save(&ns).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(slot, attempt, error = %e, "Slot persist failed");
                    last_err = Some(e);
                    tokio::time::sleep(PERSIST_RETRY_DELAY).await;
                }
            }
        }
        Err(FleetError::Persist(last_err.expect("persist attempted")))
    }

    async fn erase(&self, slot: usize) -> Result<(), FleetError> {
        let ns = self.store.namespace(&printer_namespace(slot));
        let mut last_err = None;
        for attempt in 0..PERSIST_ATTEMPTS {
            match PrinterSlotRecord::erase(&ns).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(slot, attempt, error = %e, "Slot erase failed");
                    last_err = Some(e);
                    tokio::time::sleep(PERSIST_RETRY_DELAY).await;
                }
            }
        }
        Err(FleetError::Persist(last_err.expect("erase attempted")))
    }
}
