use std::collections::HashMap;
use std::io;
use std::sync::Mutex;

use tracing::debug;

/// Digital level at a header pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Low,
    High,
}

/// Capability over the GPIO driver. The bank only ever configures pins for
/// output and writes levels; I/O timeout policy lives below this trait.
pub trait PinDriver: Send + Sync {
    fn configure_output(&self, pin: u8) -> io::Result<()>;
    fn write(&self, pin: u8, level: Level) -> io::Result<()>;
}

/// In-memory pin driver for host builds.
///
/// Hardware integration point: replace with the memory-mapped GPIO driver
/// when running on the board itself.
#[derive(Debug, Default)]
pub struct SimulatedPins {
    levels: Mutex<HashMap<u8, Level>>,
}

impl SimulatedPins {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn level(&self, pin: u8) -> Option<Level> {
        self.levels.lock().unwrap().get(&pin).copied()
    }
}

impl PinDriver for SimulatedPins {
    fn configure_output(&self, pin: u8) -> io::Result<()> {
        // Relays in this family release on a high pin.
        self.levels.lock().unwrap().entry(pin).or_insert(Level::High);
        Ok(())
    }

    fn write(&self, pin: u8, level: Level) -> io::Result<()> {
        debug!(pin, ?level, "gpio write");
        self.levels.lock().unwrap().insert(pin, level);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configure_leaves_pin_released() {
        let pins = SimulatedPins::new();
        pins.configure_output(7).unwrap();
        assert_eq!(pins.level(7), Some(Level::High));
    }

    #[test]
    fn write_replaces_the_level() {
        let pins = SimulatedPins::new();
        pins.configure_output(7).unwrap();
        pins.write(7, Level::Low).unwrap();
        assert_eq!(pins.level(7), Some(Level::Low));
    }
}
