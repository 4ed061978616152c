//! Fleet management: the printer slot table and adapter lifecycle.

pub mod manager;

pub use manager::{FleetError, FleetManager, PrinterSlot};
