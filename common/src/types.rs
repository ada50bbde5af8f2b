use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RelayState {
    Off,
    On,
}

impl RelayState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::On => "ON",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Off => Self::On,
            Self::On => Self::Off,
        }
    }

    pub fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}

/// Last-confirmed state of one relay channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelStatus {
    pub channel: u16,
    pub state: RelayState,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardStatus {
    pub name: String,
    pub channels: Vec<ChannelStatus>,
}
