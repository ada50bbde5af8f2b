use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Startup-fatal: the static port list does not match the board size.
    #[error("relay board expects {expected} ports, {actual} configured")]
    PortCountMismatch { expected: usize, actual: usize },

    /// Startup-fatal: the persisted schedule document is unusable.
    #[error("schedule config is corrupt: {0}")]
    CorruptConfig(String),

    #[error("channel {0} is out of range")]
    InvalidChannel(u16),

    #[error("invalid schedule: {0}")]
    Validation(String),

    /// The hardware write did not succeed; the cached channel state still
    /// reflects the last confirmed write.
    #[error("write to pin {pin} failed")]
    WriteFailure {
        pin: u8,
        #[source]
        source: io::Error,
    },

    /// The in-memory state changed but the durable copy did not.
    #[error("failed to persist schedule: {0}")]
    Persist(String),
}
