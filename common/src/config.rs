use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Number of relay channels on the board. This value should never change
/// for a given board revision.
pub const NUM_RELAY_CHANNELS: u16 = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    pub name: String,
    /// Header pin assignments, one per channel in channel order.
    pub ports: Vec<u8>,
    /// Boards in this family latch a relay on a low pin level.
    pub active_low: bool,
    /// Pause between successive writes in a bulk sweep. Relay coils pull
    /// enough inrush current that slamming every channel at once browns out
    /// the supply.
    pub settle_ms: u64,
    pub tick_secs: u64,
    pub reboot_hold_secs: u64,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            name: "AstroBox Relay Controller".to_string(),
            ports: vec![16, 18, 7, 11, 13, 15, 19, 21, 23, 27, 29, 31, 33, 35, 40, 38],
            active_low: true,
            settle_ms: 200,
            tick_secs: 60,
            reboot_hold_secs: 3,
        }
    }
}

impl BoardConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    pub fn reboot_hold(&self) -> Duration {
        Duration::from_secs(self.reboot_hold_secs)
    }
}
