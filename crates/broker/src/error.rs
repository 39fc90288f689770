//! Broker error types
//!
//! The `Display` form of every broker-level variant is a stable identifier
//! (`invalid_proc`, `nothing_to_reclaim`, ...) so callers can match on the
//! message string across the external boundary.

use proven_kvstore::StoreError;
use thiserror::Error;

/// Result type for broker operations
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Broker errors
#[derive(Debug, Error)]
pub enum BrokerError {
    // Validation errors: rejected before any store access
    #[error("invalid_topic_format")]
    InvalidTopicFormat,

    #[error("invalid_log_format")]
    InvalidLogFormat,

    /// A protocol message that does not decode to any known request
    #[error("invalid_request")]
    InvalidRequest,

    #[error("invalid_range_offset")]
    InvalidRangeOffset,

    #[error("invalid_tone_id_search")]
    InvalidToneIdSearch,

    // State conflicts: current registry state forbids the transition
    #[error("proc_name_not_unique")]
    ProcNameNotUnique,

    #[error("proc_already_disabled")]
    ProcAlreadyDisabled,

    #[error("proc_already_active")]
    ProcAlreadyActive,

    #[error("proc_is_disabled")]
    ProcIsDisabled,

    #[error("nothing_to_reclaim")]
    NothingToReclaim,

    #[error("invalid_proc")]
    InvalidProc,

    #[error("invalid_topic")]
    InvalidTopic,

    #[error("system_proc_exists")]
    SystemProcExists,

    #[error("invalid_system_proc")]
    InvalidSystemProc,

    /// A persisted system key could not be decoded during restoration
    #[error("corrupt_state: {0}")]
    CorruptState(String),

    /// The service task is gone
    #[error("broker_stopped")]
    BrokerStopped,

    /// Storage failure, surfaced as-is
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BrokerError {
    /// Stable machine-matchable code for the error
    pub fn code(&self) -> String {
        match self {
            BrokerError::CorruptState(_) => "corrupt_state".to_string(),
            other => other.to_string(),
        }
    }
}
