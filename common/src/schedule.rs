use std::fmt;
use std::str::FromStr;

use chrono::{NaiveTime, Timelike};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::RelayError;
use crate::types::RelayState;

/// Wall-clock time of day at minute resolution, the unit the relay schedule
/// operates in. Wire format is `"HH:MM"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeOfDay {
    minutes: u16,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self {
                minutes: u16::from(hour) * 60 + u16::from(minute),
            })
        } else {
            None
        }
    }

    /// Truncates a clock reading to the minute.
    pub fn from_time(time: NaiveTime) -> Self {
        Self {
            minutes: (time.hour() * 60 + time.minute()) as u16,
        }
    }

    pub fn hour(self) -> u8 {
        (self.minutes / 60) as u8
    }

    pub fn minute(self) -> u8 {
        (self.minutes % 60) as u8
    }

    pub fn minutes_of_day(self) -> u16 {
        self.minutes
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for TimeOfDay {
    type Err = RelayError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let malformed = || RelayError::Validation(format!("expected HH:MM, got {raw:?}"));
        let (hour, minute) = raw.split_once(':').ok_or_else(malformed)?;
        let hour: u8 = hour.parse().map_err(|_| malformed())?;
        let minute: u8 = minute.parse().map_err(|_| malformed())?;
        Self::new(hour, minute).ok_or_else(malformed)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Persisted configuration for one relay channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSchedule {
    pub channel: u16,
    pub active: bool,
    pub light: bool,
    pub use_schedule: bool,
    #[serde(default)]
    pub on_time: Option<TimeOfDay>,
    #[serde(default)]
    pub off_time: Option<TimeOfDay>,
}

impl ChannelSchedule {
    pub fn new(channel: u16) -> Self {
        Self {
            channel,
            active: true,
            light: false,
            use_schedule: false,
            on_time: None,
            off_time: None,
        }
    }

    /// The state this channel should transition to at `now`, if any.
    /// Matching is exact-minute equality; a skipped minute is not caught up.
    /// When on and off collide on the same minute, on wins.
    pub fn transition_at(&self, now: TimeOfDay) -> Option<RelayState> {
        if !self.use_schedule {
            return None;
        }
        if self.on_time == Some(now) {
            return Some(RelayState::On);
        }
        if self.off_time == Some(now) {
            return Some(RelayState::Off);
        }
        None
    }
}

/// Schedule fields a caller may replace on a channel. Times are required
/// whenever the schedule is enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleUpdate {
    pub use_schedule: bool,
    #[serde(default)]
    pub on_time: Option<TimeOfDay>,
    #[serde(default)]
    pub off_time: Option<TimeOfDay>,
}

impl ScheduleUpdate {
    pub fn validate(&self, channel: u16) -> Result<(), RelayError> {
        if self.use_schedule && (self.on_time.is_none() || self.off_time.is_none()) {
            return Err(RelayError::Validation(format!(
                "channel {channel}: schedule enabled without both on and off times"
            )));
        }
        Ok(())
    }
}

/// One entry of a full-schedule submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelScheduleUpdate {
    pub channel: u16,
    #[serde(flatten)]
    pub fields: ScheduleUpdate,
}

/// The persisted document: one record per channel, keyed by channel id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleDocument {
    pub channels: Vec<ChannelSchedule>,
}

impl ScheduleDocument {
    /// The first-boot document: every channel active, nothing scheduled.
    pub fn default_for(channel_count: u16) -> Self {
        Self {
            channels: (1..=channel_count).map(ChannelSchedule::new).collect(),
        }
    }

    /// A valid document enumerates exactly the board's channel ids.
    pub fn validate(&self, channel_count: u16) -> Result<(), RelayError> {
        let mut seen = vec![false; usize::from(channel_count)];
        for entry in &self.channels {
            if entry.channel == 0 || entry.channel > channel_count {
                return Err(RelayError::CorruptConfig(format!(
                    "unexpected channel id {}",
                    entry.channel
                )));
            }
            let index = usize::from(entry.channel - 1);
            if seen[index] {
                return Err(RelayError::CorruptConfig(format!(
                    "duplicate channel id {}",
                    entry.channel
                )));
            }
            seen[index] = true;
        }
        if let Some(missing) = seen.iter().position(|present| !present) {
            return Err(RelayError::CorruptConfig(format!(
                "missing channel id {}",
                missing + 1
            )));
        }
        Ok(())
    }

    pub fn from_json(raw: &[u8], channel_count: u16) -> Result<Self, RelayError> {
        let doc: Self =
            serde_json::from_slice(raw).map_err(|err| RelayError::CorruptConfig(err.to_string()))?;
        doc.validate(channel_count)?;
        Ok(doc)
    }

    pub fn get(&self, channel: u16) -> Option<&ChannelSchedule> {
        self.channels.iter().find(|entry| entry.channel == channel)
    }

    pub fn get_mut(&mut self, channel: u16) -> Option<&mut ChannelSchedule> {
        self.channels
            .iter_mut()
            .find(|entry| entry.channel == channel)
    }

    /// Channels included in the bulk on/off sweeps, in channel order.
    pub fn active_channels(&self) -> Vec<u16> {
        self.channels
            .iter()
            .filter(|entry| entry.active)
            .map(|entry| entry.channel)
            .collect()
    }

    /// Channels grouped under the lights bulk controls, in channel order.
    pub fn light_channels(&self) -> Vec<u16> {
        self.channels
            .iter()
            .filter(|entry| entry.light)
            .map(|entry| entry.channel)
            .collect()
    }
}
