//! Output-pin registry backing the `hub_command gpio_set` action.
//!
//! The hub records requested pin levels and logs the change; wiring a
//! physical driver is a deployment concern behind this same surface.

use std::collections::BTreeMap;
use std::sync::Mutex;

use tracing::info;

/// Named output pins controllable from the cloud.
#[derive(Debug, Default)]
pub struct OutputPins {
    levels: Mutex<BTreeMap<u32, bool>>,
}

impl OutputPins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a pin level.
    pub fn set(&self, pin: u32, high: bool) {
        let mut levels = self.levels.lock().expect("pin registry poisoned");
        levels.insert(pin, high);
        info!(pin, state = if high { "HIGH" } else { "LOW" }, "Output pin set");
    }

    /// Last requested level, if the pin was ever driven.
    pub fn get(&self, pin: u32) -> Option<bool> {
        self.levels.lock().expect("pin registry poisoned").get(&pin).copied()
    }
}
