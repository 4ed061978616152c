//! Printer adapter layer.
//!
//! Each vendor integration implements [`PrinterAdapter`] and owns its
//! transport session outright; the fleet manager stores adapters by value
//! behind the trait and never sees vendor formats.

pub mod bambu;

use async_trait::async_trait;

use printhub_core::PrinterSnapshot;
use printhub_proto::types::VENDOR_BAMBU;

use crate::storage::PrinterSlotRecord;

/// Adapter-level errors. A failed command is logged by the caller and never
/// forces a reconnect.
#[derive(Debug, thiserror::Error)]
pub enum PrinterError {
    #[error("Printer not connected")]
    NotConnected,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unknown printer vendor: {0}")]
    UnknownVendor(String),
}

pub type Result<T> = std::result::Result<T, PrinterError>;

/// Capability set every vendor adapter implements.
///
/// Control operations fail fast with [`PrinterError::NotConnected`] when the
/// transport is down; otherwise they return `Ok` iff the transport accepted
/// the frame (no round-trip confirmation).
#[async_trait]
pub trait PrinterAdapter: Send + Sync {
    /// Bring up the transport session. Idempotent when already connected.
    async fn connect(&mut self) -> Result<()>;

    /// Tear down the transport session. Idempotent.
    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Snapshot of the last known state. Always returns; the `connected`
    /// field reflects the current transport state.
    fn status(&self) -> PrinterSnapshot;

    /// Cheap per-tick housekeeping. Never blocks; transport I/O is driven
    /// by the adapter's own session task.
    fn poll(&self);

    fn pause(&self) -> Result<()>;
    fn resume(&self) -> Result<()>;
    fn stop(&self) -> Result<()>;
    fn send_gcode(&self, line: &str) -> Result<()>;
    fn set_light(&self, on: bool) -> Result<()>;

    fn type_tag(&self) -> &str;
    fn display_name(&self) -> &str;
    fn stable_id(&self) -> &str;
}

/// Instantiate an adapter for a slot record by vendor tag.
pub fn create_adapter(record: &PrinterSlotRecord) -> Result<Box<dyn PrinterAdapter>> {
    match record.vendor.as_str() {
        VENDOR_BAMBU => Ok(Box::new(bambu::BambuAdapter::from_record(record))),
        other => Err(PrinterError::UnknownVendor(other.to_string())),
    }
}
