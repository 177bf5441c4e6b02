//! Error types for intersection setup and signal messaging.
//!
//! Signal semantics are total and never fail; these errors cover building
//! the intersection, the actor mailboxes behind each signal, and loading
//! configuration.

use crate::shared_data::SignalId;

/// Faults made while wiring the intersection. Fatal at setup time.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("signal id '{0}' is already registered")]
    DuplicateSignalId(SignalId),

    #[error("connect_all called before any signal was registered")]
    NoSignalsRegistered,

    #[error("signals must be connected with connect_all before they are started")]
    NotConnected,

    #[error("the intersection is already running")]
    AlreadyRunning,

    #[error("the topology is frozen once signals are started")]
    TopologyFrozen,

    #[error("signals have not been started")]
    NotStarted,

    #[error("no tokio runtime is available to drive the signals")]
    NoRuntime,

    #[error("tick interval must be greater than zero")]
    InvalidTickInterval,

    #[error("the intersection has been shut down")]
    ShutDown,
}

/// Delivery faults between a caller and a signal's mailbox.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignalError {
    #[error("mailbox of signal '{0}' is closed")]
    MailboxClosed(SignalId),

    #[error("signal '{0}' is not part of the topology")]
    UnknownPeer(SignalId),

    #[error("signal '{0}' dropped the reply")]
    NoReply(SignalId),
}

/// Faults while loading a `SimulationConfig`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {source}")]
    Parse {
        #[from]
        source: serde_json::Error,
    },

    #[error("invalid config: {message}")]
    Invalid { message: String },
}
