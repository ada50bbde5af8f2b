use std::io::ErrorKind;
use std::path::PathBuf;

use tokio::sync::Mutex;
use tracing::info;

use relay_common::{
    ChannelSchedule, ChannelScheduleUpdate, RelayError, ScheduleDocument, ScheduleUpdate,
};

/// Durable per-channel schedule configuration.
///
/// The in-memory document is the source of truth. `persist` serializes a
/// point-in-time copy and atomically replaces the backing file, so a crash
/// mid-write never leaves a torn document on disk.
pub struct ScheduleStore {
    doc: Mutex<ScheduleDocument>,
    path: PathBuf,
    io_lock: Mutex<()>,
}

impl ScheduleStore {
    /// Loads the schedule document, writing the default when no file exists
    /// yet. A document that fails to parse or does not enumerate exactly the
    /// board's channel ids is corrupt, which is fatal to startup.
    pub async fn load(path: impl Into<PathBuf>, channel_count: u16) -> Result<Self, RelayError> {
        let path = path.into();
        match tokio::fs::read(&path).await {
            Ok(raw) => Ok(Self::with_document(
                ScheduleDocument::from_json(&raw, channel_count)?,
                path,
            )),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(path = %path.display(), "no schedule file, writing defaults");
                let store =
                    Self::with_document(ScheduleDocument::default_for(channel_count), path);
                store.persist().await?;
                Ok(store)
            }
            Err(err) => Err(RelayError::CorruptConfig(err.to_string())),
        }
    }

    fn with_document(doc: ScheduleDocument, path: PathBuf) -> Self {
        Self {
            doc: Mutex::new(doc),
            path,
            io_lock: Mutex::new(()),
        }
    }

    pub async fn get(&self, channel: u16) -> Result<ChannelSchedule, RelayError> {
        self.doc
            .lock()
            .await
            .get(channel)
            .cloned()
            .ok_or(RelayError::InvalidChannel(channel))
    }

    pub async fn snapshot(&self) -> ScheduleDocument {
        self.doc.lock().await.clone()
    }

    /// Replaces one channel's schedule fields in memory. Does not persist.
    pub async fn update(&self, channel: u16, fields: ScheduleUpdate) -> Result<(), RelayError> {
        fields.validate(channel)?;
        let mut doc = self.doc.lock().await;
        let entry = doc
            .get_mut(channel)
            .ok_or(RelayError::InvalidChannel(channel))?;
        entry.use_schedule = fields.use_schedule;
        entry.on_time = fields.on_time;
        entry.off_time = fields.off_time;
        Ok(())
    }

    /// Merges a full schedule submission. Every entry is validated before any
    /// is applied, so a bad entry leaves the document untouched.
    pub async fn apply(&self, entries: &[ChannelScheduleUpdate]) -> Result<(), RelayError> {
        let mut doc = self.doc.lock().await;
        for entry in entries {
            entry.fields.validate(entry.channel)?;
            if doc.get(entry.channel).is_none() {
                return Err(RelayError::Validation(format!(
                    "unknown channel {}",
                    entry.channel
                )));
            }
        }
        for entry in entries {
            if let Some(target) = doc.get_mut(entry.channel) {
                target.use_schedule = entry.fields.use_schedule;
                target.on_time = entry.fields.on_time;
                target.off_time = entry.fields.off_time;
            }
        }
        Ok(())
    }

    /// Writes the current document to disk via a temp file and rename.
    /// Concurrent persists serialize on the I/O lock; updates racing the
    /// snapshot land in the next persist.
    pub async fn persist(&self) -> Result<(), RelayError> {
        let _io = self.io_lock.lock().await;
        let snapshot = self.doc.lock().await.clone();
        let payload = serde_json::to_vec_pretty(&snapshot)
            .map_err(|err| RelayError::Persist(err.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|err| RelayError::Persist(err.to_string()))?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &payload)
            .await
            .map_err(|err| RelayError::Persist(err.to_string()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|err| RelayError::Persist(err.to_string()))?;
        Ok(())
    }
}
