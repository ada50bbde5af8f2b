use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use relay_common::{BoardConfig, ChannelStatus, RelayError, RelayState, NUM_RELAY_CHANNELS};

use crate::gpio::{Level, PinDriver};

struct ChannelSlot {
    pin: u8,
    state: RelayState,
}

/// Owns the channel-to-pin mapping and the last-confirmed relay states.
///
/// Every channel sits behind its own lock: the physical write and the cached
/// state update form one critical section, and operations on different
/// channels never contend. The cached state only ever advances on a
/// successful write.
pub struct RelayBank {
    driver: Arc<dyn PinDriver>,
    channels: Vec<Mutex<ChannelSlot>>,
    active_low: bool,
    settle: Duration,
}

impl RelayBank {
    /// Builds the bank and configures every pin for output. Fails when the
    /// configured port list does not cover the board.
    pub fn new(driver: Arc<dyn PinDriver>, config: &BoardConfig) -> Result<Self, RelayError> {
        if config.ports.len() != usize::from(NUM_RELAY_CHANNELS) {
            return Err(RelayError::PortCountMismatch {
                expected: usize::from(NUM_RELAY_CHANNELS),
                actual: config.ports.len(),
            });
        }

        for &pin in &config.ports {
            driver
                .configure_output(pin)
                .map_err(|source| RelayError::WriteFailure { pin, source })?;
        }

        let channels = config
            .ports
            .iter()
            .map(|&pin| {
                Mutex::new(ChannelSlot {
                    pin,
                    state: RelayState::Off,
                })
            })
            .collect();

        Ok(Self {
            driver,
            channels,
            active_low: config.active_low,
            settle: config.settle(),
        })
    }

    pub fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    fn slot(&self, channel: u16) -> Result<&Mutex<ChannelSlot>, RelayError> {
        if channel == 0 || usize::from(channel) > self.channels.len() {
            return Err(RelayError::InvalidChannel(channel));
        }
        Ok(&self.channels[usize::from(channel - 1)])
    }

    fn write_slot(&self, slot: &mut ChannelSlot, state: RelayState) -> Result<(), RelayError> {
        self.driver
            .write(slot.pin, level_for(state, self.active_low))
            .map_err(|source| RelayError::WriteFailure {
                pin: slot.pin,
                source,
            })?;
        slot.state = state;
        Ok(())
    }

    pub async fn set(&self, channel: u16, state: RelayState) -> Result<(), RelayError> {
        let mut slot = self.slot(channel)?.lock().await;
        self.write_slot(&mut slot, state)
    }

    pub async fn status(&self, channel: u16) -> Result<RelayState, RelayError> {
        Ok(self.slot(channel)?.lock().await.state)
    }

    /// Reads the current state and writes the opposite, as one critical
    /// section per channel.
    pub async fn toggle(&self, channel: u16) -> Result<RelayState, RelayError> {
        let mut slot = self.slot(channel)?.lock().await;
        let next = slot.state.toggled();
        self.write_slot(&mut slot, next)?;
        Ok(next)
    }

    /// Drives every listed channel, in order, pausing for the settling delay
    /// between successive writes. The first failure aborts the sweep.
    pub async fn set_all(&self, channels: &[u16], state: RelayState) -> Result<(), RelayError> {
        for (index, &channel) in channels.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.settle).await;
            }
            self.set(channel, state).await?;
        }
        Ok(())
    }

    /// Power-cycles one channel: off, hold, back on. The channel lock is held
    /// across the hold, so same-channel operations queue behind the cycle and
    /// a failed final write leaves the relay off.
    pub async fn reboot(&self, channel: u16, hold: Duration) -> Result<(), RelayError> {
        let mut slot = self.slot(channel)?.lock().await;
        self.write_slot(&mut slot, RelayState::Off)?;
        tokio::time::sleep(hold).await;
        self.write_slot(&mut slot, RelayState::On)
    }

    pub async fn snapshot(&self) -> Vec<ChannelStatus> {
        let mut out = Vec::with_capacity(self.channels.len());
        for (index, slot) in self.channels.iter().enumerate() {
            let state = slot.lock().await.state;
            out.push(ChannelStatus {
                channel: index as u16 + 1,
                state,
            });
        }
        out
    }
}

fn level_for(state: RelayState, active_low: bool) -> Level {
    match (state, active_low) {
        (RelayState::On, true) | (RelayState::Off, false) => Level::Low,
        (RelayState::On, false) | (RelayState::Off, true) => Level::High,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::io;
    use std::sync::Mutex as StdMutex;

    use pretty_assertions::assert_eq;
    use tokio::time::Instant;

    use super::*;

    #[derive(Default)]
    struct RecordingPins {
        writes: StdMutex<Vec<(u8, Level)>>,
        failing: StdMutex<HashSet<(u8, Level)>>,
    }

    impl RecordingPins {
        fn writes(&self) -> Vec<(u8, Level)> {
            self.writes.lock().unwrap().clone()
        }

        fn fail_pin(&self, pin: u8) {
            let mut failing = self.failing.lock().unwrap();
            failing.insert((pin, Level::Low));
            failing.insert((pin, Level::High));
        }

        fn fail_write(&self, pin: u8, level: Level) {
            self.failing.lock().unwrap().insert((pin, level));
        }
    }

    impl PinDriver for RecordingPins {
        fn configure_output(&self, _pin: u8) -> io::Result<()> {
            Ok(())
        }

        fn write(&self, pin: u8, level: Level) -> io::Result<()> {
            if self.failing.lock().unwrap().contains(&(pin, level)) {
                return Err(io::Error::new(io::ErrorKind::Other, "stuck pin"));
            }
            self.writes.lock().unwrap().push((pin, level));
            Ok(())
        }
    }

    fn test_bank() -> (Arc<RecordingPins>, RelayBank) {
        let driver = Arc::new(RecordingPins::default());
        let bank = RelayBank::new(driver.clone(), &BoardConfig::default()).unwrap();
        (driver, bank)
    }

    fn pin_of(channel: u16) -> u8 {
        BoardConfig::default().ports[usize::from(channel - 1)]
    }

    #[test]
    fn rejects_port_count_mismatch() {
        let driver = Arc::new(RecordingPins::default());
        let mut config = BoardConfig::default();
        config.ports.truncate(8);

        let result = RelayBank::new(driver, &config);

        assert!(matches!(
            result,
            Err(RelayError::PortCountMismatch {
                expected: 16,
                actual: 8
            })
        ));
    }

    #[tokio::test]
    async fn out_of_range_channels_are_rejected_without_writes() {
        let (driver, bank) = test_bank();

        assert!(matches!(
            bank.set(0, RelayState::On).await,
            Err(RelayError::InvalidChannel(0))
        ));
        assert!(matches!(
            bank.set(17, RelayState::On).await,
            Err(RelayError::InvalidChannel(17))
        ));
        assert!(matches!(
            bank.status(17).await,
            Err(RelayError::InvalidChannel(17))
        ));
        assert!(matches!(
            bank.toggle(99).await,
            Err(RelayError::InvalidChannel(99))
        ));
        assert!(driver.writes().is_empty());
    }

    #[tokio::test]
    async fn set_confirms_status_after_the_write() {
        let (driver, bank) = test_bank();

        bank.set(3, RelayState::On).await.unwrap();

        assert_eq!(bank.status(3).await.unwrap(), RelayState::On);
        // Active-low board: on is a low level.
        assert_eq!(driver.writes(), vec![(pin_of(3), Level::Low)]);
    }

    #[tokio::test]
    async fn toggle_twice_returns_to_the_starting_state() {
        let (_, bank) = test_bank();
        bank.set(2, RelayState::On).await.unwrap();

        assert_eq!(bank.toggle(2).await.unwrap(), RelayState::Off);
        assert_eq!(bank.toggle(2).await.unwrap(), RelayState::On);
        assert_eq!(bank.status(2).await.unwrap(), RelayState::On);
    }

    #[tokio::test]
    async fn failed_write_leaves_status_at_last_confirmed_state() {
        let (driver, bank) = test_bank();
        bank.set(4, RelayState::On).await.unwrap();

        driver.fail_pin(pin_of(4));
        let result = bank.set(4, RelayState::Off).await;

        assert!(matches!(result, Err(RelayError::WriteFailure { .. })));
        assert_eq!(bank.status(4).await.unwrap(), RelayState::On);
    }

    #[tokio::test(start_paused = true)]
    async fn bulk_sweep_writes_in_order_with_settling_delay() {
        let (driver, bank) = test_bank();

        let started = Instant::now();
        bank.set_all(&[1, 2, 3], RelayState::On).await.unwrap();

        assert_eq!(
            driver.writes(),
            vec![
                (pin_of(1), Level::Low),
                (pin_of(2), Level::Low),
                (pin_of(3), Level::Low),
            ]
        );
        assert_eq!(started.elapsed(), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn bulk_sweep_does_not_delay_other_channels() {
        let (driver, bank) = test_bank();
        let bank = Arc::new(bank);

        let sweep = {
            let bank = bank.clone();
            tokio::spawn(async move { bank.set_all(&[1, 2, 3], RelayState::On).await })
        };

        // Let the sweep write its first channel and park on the settling
        // delay, then hit a channel outside the subset.
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        bank.set(5, RelayState::On).await.unwrap();

        sweep.await.unwrap().unwrap();

        let pins: Vec<u8> = driver.writes().iter().map(|(pin, _)| *pin).collect();
        assert_eq!(pins, vec![pin_of(1), pin_of(5), pin_of(2), pin_of(3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn reboot_cycles_off_then_on_after_the_hold() {
        let (driver, bank) = test_bank();
        bank.set(5, RelayState::On).await.unwrap();

        let started = Instant::now();
        bank.reboot(5, Duration::from_secs(3)).await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert_eq!(bank.status(5).await.unwrap(), RelayState::On);
        assert_eq!(
            driver.writes(),
            vec![
                (pin_of(5), Level::Low),
                (pin_of(5), Level::High),
                (pin_of(5), Level::Low),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reboot_fails_safe_when_the_final_write_fails() {
        let (driver, bank) = test_bank();
        bank.set(5, RelayState::On).await.unwrap();

        // Off (high level) still succeeds; the restoring on-write fails.
        driver.fail_write(pin_of(5), Level::Low);
        let result = bank.reboot(5, Duration::from_secs(3)).await;

        assert!(matches!(result, Err(RelayError::WriteFailure { .. })));
        assert_eq!(bank.status(5).await.unwrap(), RelayState::Off);
    }

    #[tokio::test(start_paused = true)]
    async fn reboot_surfaces_a_failed_off_write_untouched() {
        let (driver, bank) = test_bank();
        bank.set(6, RelayState::On).await.unwrap();

        driver.fail_write(pin_of(6), Level::High);
        let result = bank.reboot(6, Duration::from_secs(1)).await;

        assert!(matches!(result, Err(RelayError::WriteFailure { .. })));
        assert_eq!(bank.status(6).await.unwrap(), RelayState::On);
    }

    #[tokio::test]
    async fn snapshot_reports_every_channel() {
        let (_, bank) = test_bank();
        bank.set(1, RelayState::On).await.unwrap();
        bank.set(16, RelayState::On).await.unwrap();

        let snapshot = bank.snapshot().await;

        assert_eq!(snapshot.len(), 16);
        assert_eq!(snapshot[0].state, RelayState::On);
        assert_eq!(snapshot[1].state, RelayState::Off);
        assert_eq!(snapshot[15].state, RelayState::On);
    }
}
