//! Named constants for the message types, actions, and status strings of the
//! hub <-> cloud protocol. These must match the control plane definitions
//! exactly; a typo here is a silently dropped frame on the other end.

// ---------------------------------------------------------------------------
// Hub -> Cloud message types
// ---------------------------------------------------------------------------

/// Sent immediately after the WebSocket opens to authenticate the hub.
pub const HUB_HELLO: &str = "hub_hello";

/// Periodic per-printer status snapshot.
pub const PRINTER_STATUS: &str = "printer_status";

/// File transfer progress for a print job.
pub const FILE_PROGRESS: &str = "file_progress";

/// Acknowledgement for a cloud command, echoing its `command_id`.
pub const COMMAND_ACK: &str = "command_ack";

/// A printer found by network discovery.
pub const PRINTER_DISCOVERED: &str = "printer_discovered";

// ---------------------------------------------------------------------------
// Cloud -> Hub message types
// ---------------------------------------------------------------------------

/// Welcome response to `hub_hello`; completes authentication.
pub const HUB_WELCOME: &str = "hub_welcome";

/// Hub-level settings update (currently: hub name).
pub const HUB_CONFIG: &str = "hub_config";

/// Add, remove, or update a printer slot.
pub const CONFIGURE_PRINTER: &str = "configure_printer";

/// Start a print job (download file, upload to printer, start).
pub const PRINT_COMMAND: &str = "print_command";

/// Control command for a single printer (pause/resume/stop/clear_bed).
pub const PRINTER_COMMAND: &str = "printer_command";

/// Trigger a network scan for printers.
pub const DISCOVER_PRINTERS: &str = "discover_printers";

/// Hub-level command (disconnect, gpio_set).
pub const HUB_COMMAND: &str = "hub_command";

/// Error report from the cloud. Never acked.
pub const ERROR: &str = "error";

// ---------------------------------------------------------------------------
// Printer status strings carried in `printer_status`
// ---------------------------------------------------------------------------

pub const STATUS_IDLE: &str = "idle";
pub const STATUS_PRINTING: &str = "printing";
pub const STATUS_PAUSED: &str = "paused";
pub const STATUS_MAINTENANCE: &str = "maintenance";
pub const STATUS_OFFLINE: &str = "offline";
pub const STATUS_ERROR: &str = "error";

// ---------------------------------------------------------------------------
// `configure_printer` actions
// ---------------------------------------------------------------------------

pub const ACTION_ADD: &str = "add";
pub const ACTION_REMOVE: &str = "remove";
pub const ACTION_UPDATE: &str = "update";

// ---------------------------------------------------------------------------
// `printer_command` actions
// ---------------------------------------------------------------------------

pub const ACTION_PAUSE: &str = "pause";
pub const ACTION_RESUME: &str = "resume";
pub const ACTION_STOP: &str = "stop";
pub const ACTION_CLEAR_BED: &str = "clear_bed";

// ---------------------------------------------------------------------------
// `hub_command` actions
// ---------------------------------------------------------------------------

pub const ACTION_DISCONNECT: &str = "disconnect";
pub const ACTION_GPIO_SET: &str = "gpio_set";

// ---------------------------------------------------------------------------
// `file_progress` stages
// ---------------------------------------------------------------------------

pub const STAGE_DOWNLOADING: &str = "downloading";
pub const STAGE_UPLOADING: &str = "uploading";
pub const STAGE_COMPLETE: &str = "complete";
pub const STAGE_FAILED: &str = "failed";

// ---------------------------------------------------------------------------
// Printer connection types
// ---------------------------------------------------------------------------

pub const VENDOR_BAMBU: &str = "bambu";
pub const VENDOR_PRUSA: &str = "prusa";
pub const VENDOR_OCTOPRINT: &str = "octoprint";
pub const VENDOR_KLIPPER: &str = "klipper";

/// HTTP path for one-time hub registration, relative to the cloud base URL.
pub const REGISTER_PATH: &str = "/api/v1/hubs/register";

/// WebSocket path prefix; the hub id is appended.
pub const WS_HUB_PATH: &str = "/ws/hub/";
