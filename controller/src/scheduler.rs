use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use relay_common::TimeOfDay;

use crate::bank::RelayBank;
use crate::store::ScheduleStore;

/// Wall-clock capability. The production loop reads the system clock; tests
/// inject fixed times.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// One evaluation pass over all channels: drive every schedule-enabled
/// channel whose on or off time matches the current minute. Failures are
/// logged per channel and never abort the pass.
pub async fn run_tick(bank: &RelayBank, store: &ScheduleStore, now: TimeOfDay) {
    let doc = store.snapshot().await;
    for entry in &doc.channels {
        let Some(state) = entry.transition_at(now) else {
            continue;
        };
        match bank.set(entry.channel, state).await {
            Ok(()) => info!(
                channel = entry.channel,
                state = state.as_str(),
                "schedule transition"
            ),
            Err(err) => warn!(channel = entry.channel, "schedule transition failed: {err}"),
        }
    }
}

/// Spawns the scheduler loop. One pass per tick until the shutdown flag
/// flips; the interval re-anchors each tick, so the cadence does not drift
/// from wall-clock minutes.
pub fn spawn(
    bank: Arc<RelayBank>,
    store: Arc<ScheduleStore>,
    clock: Arc<dyn Clock>,
    tick: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => {
                    info!("scheduler stopping");
                    break;
                }
            }
            let now = TimeOfDay::from_time(clock.now().time());
            run_tick(&bank, &store, now).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    use pretty_assertions::assert_eq;

    use relay_common::{BoardConfig, RelayState, ScheduleUpdate};

    use super::*;
    use crate::gpio::SimulatedPins;

    fn temp_path(tag: &str) -> PathBuf {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let unique = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir()
            .join(format!(
                "relay-scheduler-{}-{tag}-{unique}",
                std::process::id()
            ))
            .join("channels.json")
    }

    async fn fixture(tag: &str) -> (RelayBank, ScheduleStore) {
        let bank = RelayBank::new(
            Arc::new(SimulatedPins::new()),
            &BoardConfig::default(),
        )
        .unwrap();
        let store = ScheduleStore::load(temp_path(tag), bank.channel_count())
            .await
            .unwrap();
        (bank, store)
    }

    fn window(on: &str, off: &str) -> ScheduleUpdate {
        ScheduleUpdate {
            use_schedule: true,
            on_time: Some(on.parse().unwrap()),
            off_time: Some(off.parse().unwrap()),
        }
    }

    fn at(raw: &str) -> TimeOfDay {
        raw.parse().unwrap()
    }

    #[tokio::test]
    async fn transitions_channels_at_their_scheduled_minutes() {
        let (bank, store) = fixture("transitions").await;
        store.update(3, window("07:00", "19:00")).await.unwrap();

        run_tick(&bank, &store, at("07:00")).await;
        assert_eq!(bank.status(3).await.unwrap(), RelayState::On);

        run_tick(&bank, &store, at("19:00")).await;
        assert_eq!(bank.status(3).await.unwrap(), RelayState::Off);
    }

    #[tokio::test]
    async fn a_missed_minute_is_not_caught_up() {
        let (bank, store) = fixture("missed").await;
        store.update(3, window("07:00", "19:00")).await.unwrap();

        run_tick(&bank, &store, at("07:01")).await;

        assert_eq!(bank.status(3).await.unwrap(), RelayState::Off);
    }

    #[tokio::test]
    async fn on_wins_when_both_times_match() {
        let (bank, store) = fixture("tie").await;
        store.update(2, window("12:00", "12:00")).await.unwrap();

        run_tick(&bank, &store, at("12:00")).await;

        assert_eq!(bank.status(2).await.unwrap(), RelayState::On);
    }

    #[tokio::test]
    async fn channels_without_schedules_are_untouched() {
        let (bank, store) = fixture("unscheduled").await;
        store.update(1, window("08:00", "20:00")).await.unwrap();
        bank.set(2, RelayState::On).await.unwrap();

        run_tick(&bank, &store, at("08:00")).await;

        assert_eq!(bank.status(1).await.unwrap(), RelayState::On);
        assert_eq!(bank.status(2).await.unwrap(), RelayState::On);
        assert_eq!(bank.status(3).await.unwrap(), RelayState::Off);
    }

    #[tokio::test]
    async fn a_failing_channel_does_not_stop_the_pass() {
        let bank = {
            // Channel 1's pin rejects writes; the rest succeed.
            struct FlakyPins {
                bad_pin: u8,
            }
            impl crate::gpio::PinDriver for FlakyPins {
                fn configure_output(&self, _pin: u8) -> std::io::Result<()> {
                    Ok(())
                }
                fn write(&self, pin: u8, _level: crate::gpio::Level) -> std::io::Result<()> {
                    if pin == self.bad_pin {
                        return Err(std::io::Error::new(std::io::ErrorKind::Other, "stuck"));
                    }
                    Ok(())
                }
            }
            let config = BoardConfig::default();
            RelayBank::new(
                Arc::new(FlakyPins {
                    bad_pin: config.ports[0],
                }),
                &config,
            )
            .unwrap()
        };
        let store = ScheduleStore::load(temp_path("isolated"), bank.channel_count())
            .await
            .unwrap();
        store.update(1, window("07:00", "19:00")).await.unwrap();
        store.update(2, window("07:00", "19:00")).await.unwrap();

        run_tick(&bank, &store, at("07:00")).await;

        assert_eq!(bank.status(1).await.unwrap(), RelayState::Off);
        assert_eq!(bank.status(2).await.unwrap(), RelayState::On);
    }
}
