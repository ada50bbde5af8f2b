use std::sync::Arc;
use std::time::Duration;

use relay_common::{
    BoardStatus, ChannelSchedule, ChannelScheduleUpdate, RelayError, RelayState, ScheduleDocument,
    ScheduleUpdate,
};

use crate::bank::RelayBank;
use crate::store::ScheduleStore;

/// The externally invokable operation set. The request-handling layer only
/// ever goes through here; it never touches the bank or the store directly.
#[derive(Clone)]
pub struct ControlSurface {
    bank: Arc<RelayBank>,
    store: Arc<ScheduleStore>,
    board_name: String,
    reboot_hold: Duration,
}

impl ControlSurface {
    pub fn new(
        bank: Arc<RelayBank>,
        store: Arc<ScheduleStore>,
        board_name: String,
        reboot_hold: Duration,
    ) -> Self {
        Self {
            bank,
            store,
            board_name,
            reboot_hold,
        }
    }

    pub async fn status(&self, channel: u16) -> Result<RelayState, RelayError> {
        self.bank.status(channel).await
    }

    pub async fn board_status(&self) -> BoardStatus {
        BoardStatus {
            name: self.board_name.clone(),
            channels: self.bank.snapshot().await,
        }
    }

    pub async fn set_on(&self, channel: u16) -> Result<(), RelayError> {
        self.bank.set(channel, RelayState::On).await
    }

    pub async fn set_off(&self, channel: u16) -> Result<(), RelayError> {
        self.bank.set(channel, RelayState::Off).await
    }

    pub async fn toggle(&self, channel: u16) -> Result<RelayState, RelayError> {
        self.bank.toggle(channel).await
    }

    /// Bulk sweeps cover the active-flagged channels, in channel order.
    pub async fn all_on(&self) -> Result<(), RelayError> {
        let channels = self.store.snapshot().await.active_channels();
        self.bank.set_all(&channels, RelayState::On).await
    }

    pub async fn all_off(&self) -> Result<(), RelayError> {
        let channels = self.store.snapshot().await.active_channels();
        self.bank.set_all(&channels, RelayState::Off).await
    }

    pub async fn lights_on(&self) -> Result<(), RelayError> {
        let channels = self.store.snapshot().await.light_channels();
        self.bank.set_all(&channels, RelayState::On).await
    }

    pub async fn lights_off(&self) -> Result<(), RelayError> {
        let channels = self.store.snapshot().await.light_channels();
        self.bank.set_all(&channels, RelayState::Off).await
    }

    pub async fn reboot(&self, channel: u16, hold_secs: Option<u64>) -> Result<(), RelayError> {
        let hold = hold_secs.map(Duration::from_secs).unwrap_or(self.reboot_hold);
        self.bank.reboot(channel, hold).await
    }

    pub async fn schedule(&self) -> ScheduleDocument {
        self.store.snapshot().await
    }

    pub async fn channel_schedule(&self, channel: u16) -> Result<ChannelSchedule, RelayError> {
        self.store.get(channel).await
    }

    /// Applies one channel's schedule fields and persists before returning.
    /// A persist failure surfaces after the in-memory update took effect, so
    /// the caller knows the change is applied but not saved.
    pub async fn update_schedule(
        &self,
        channel: u16,
        fields: ScheduleUpdate,
    ) -> Result<(), RelayError> {
        self.store.update(channel, fields).await?;
        self.store.persist().await
    }

    /// Applies a full schedule submission and persists before returning.
    pub async fn save_schedule(
        &self,
        entries: &[ChannelScheduleUpdate],
    ) -> Result<(), RelayError> {
        self.store.apply(entries).await?;
        self.store.persist().await
    }
}
