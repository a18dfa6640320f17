use std::time::Duration;

use thiserror::Error;

/// Why a single update run stopped. Never outlives the run that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    #[error("failed to fetch public address: {0}")]
    Discovery(String),

    #[error("no ip= line in trace response")]
    NoAddress,

    #[error("ip does not match ipv4 format: {0:?}")]
    InvalidAddress(String),

    #[error("failed to find zone id for {zone}: {reason}")]
    ZoneLookup { zone: String, reason: String },

    #[error("failed to list dns records: {0}")]
    ListRecords(String),

    #[error("failed to update dns record {name}: {reason}")]
    Update { name: String, reason: String },

    #[error("update run timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl RunError {
    /// Whether the failure came from the local deadline rather than a remote answer.
    pub fn is_timeout(&self) -> bool {
        matches!(self, RunError::Timeout(_))
    }
}

/// Flattens an `anyhow` chain into one line for a run message.
pub(crate) fn describe(err: &anyhow::Error) -> String {
    format!("{:#}", err)
}
