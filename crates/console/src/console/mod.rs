//! Console module.
//!
//! The display-side half of the runner: a bridge that owns the process
//! session and the log it feeds.

pub mod bridge;
pub mod log;
pub mod tail;

pub use bridge::{exit_line, ConsoleBridge, ConsoleMessage};
pub use log::{ConsoleLog, DEFAULT_SCROLLBACK};
pub use tail::LogTail;
