//! Wire schema for the PrintHub cloud tunnel protocol.
//!
//! The hub and the control plane exchange JSON text frames over a single
//! WebSocket. Every frame is an object with a required `type`; frames that
//! represent commands additionally carry a `command_id` which the hub echoes
//! in exactly one `command_ack`. This crate holds the string constants and
//! the serde structs for both directions so the two ends of the tunnel stay
//! in sync without duplicating literals.

pub mod messages;
pub mod types;

pub use messages::{
    CloudError, CommandAck, ConfigurePrinter, Envelope, FileProgress, HubCommand, HubConfigMsg,
    HubHello, HubWelcome, PrinterCommandMsg, PrinterPayload, PrinterStatusMsg, RegisterRequest,
    RegisterResponse, Temperatures,
};
