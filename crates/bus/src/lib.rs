//! Signals and in-process delivery endpoints
//!
//! A [`Signal`] is the envelope every dispatch adapter delivers. The
//! [`ProcessRegistry`] holds mailboxes addressable by id or registered name,
//! and the [`BusRegistry`] holds named pub/sub buses.

use thiserror::Error;

pub mod process;
pub mod pubsub;
pub mod signal;

pub use process::{
    current_process, with_process, Envelope, Mailbox, Message, MessageFormat, ProcessHandle,
    ProcessId, ProcessRegistry,
};
pub use pubsub::{BusRegistry, PubSub};
pub use signal::Signal;

/// Delivery endpoint errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("PROCESS NOT FOUND: {0}")]
    ProcessNotFound(String),

    #[error("PROCESS NOT ALIVE: {0}")]
    ProcessNotAlive(ProcessId),

    #[error("CALLING SELF: {0}")]
    CallingSelf(ProcessId),

    #[error("TIMED OUT AFTER {0}ms")]
    Timeout(u64),

    #[error("PROCESS {0} DROPPED THE REPLY")]
    NoReply(ProcessId),

    #[error("NAME ALREADY REGISTERED: {0}")]
    NameTaken(String),

    #[error("BUS NOT RUNNING: {0}")]
    BusNotRunning(String),
}

pub type Result<T> = std::result::Result<T, BusError>;
