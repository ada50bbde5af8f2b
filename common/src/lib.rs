pub mod config;
pub mod error;
pub mod schedule;
pub mod types;

pub use config::{BoardConfig, NUM_RELAY_CHANNELS};
pub use error::RelayError;
pub use schedule::{
    ChannelSchedule, ChannelScheduleUpdate, ScheduleDocument, ScheduleUpdate, TimeOfDay,
};
pub use types::{BoardStatus, ChannelStatus, RelayState};
