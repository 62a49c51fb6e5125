//! Process session module.
//!
//! This module spawns external commands on a pseudo-terminal and reports
//! their output and exit status from a background reader thread.

pub mod command;
pub mod pty;

pub use command::Command;
pub use pty::{
    ExitCallback, OutputCallback, ProcessSession, SessionId, SessionOptions, SpawnError,
    READ_BUFFER_SIZE,
};
