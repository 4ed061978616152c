//! Persistent configuration storage.
//!
//! Namespaced key-value records over SQLite: hub identity, tenant binding,
//! and one namespace per printer slot. Single-key operations are atomic;
//! multi-key tuples are rewritten by the owning layer.

pub mod identity;
pub mod models;
pub mod store;

pub use identity::HubIdentity;
pub use models::{printer_namespace, PrinterSlotRecord, TenantBinding, NS_HUB, NS_TUNNEL};
pub use store::{ConfigStore, Namespace};

pub use printhub_core::db::StoreError;
