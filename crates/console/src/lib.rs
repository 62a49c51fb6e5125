//! # LPIC Console Library
//!
//! Runs the training dashboard's external scripts on a pseudo-terminal and
//! feeds their output to a single-threaded display loop.
//!
//! ## Overview
//!
//! - **Process sessions**: spawn one command at a time on a PTY, stream its
//!   output from a background reader thread, forward input, terminate it
//! - **Console bridge**: owns the session and the visible log, and applies
//!   reader-thread events only on the display loop's thread
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────── display loop (one thread) ────────────────┐
//! │                                                            │
//! │   run / submit_input / stop        pump / apply            │
//! │            │                            ▲                  │
//! │   ┌────────▼─────────┐        ┌─────────┴──────────┐       │
//! │   │  ConsoleBridge   │        │  mpsc channel of   │       │
//! │   │  (log, running)  │        │  ConsoleMessage    │       │
//! │   └────────┬─────────┘        └─────────▲──────────┘       │
//! └────────────┼────────────────────────────┼──────────────────┘
//!              │ start / write / stop       │ on_output / on_exit
//!     ┌────────▼─────────┐        ┌─────────┴──────────┐
//!     │  ProcessSession  │───────▶│   reader thread    │
//!     │  (PTY master)    │        │   (blocking read)  │
//!     └──────────────────┘        └────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lpic_console::{Command, ConsoleBridge};
//!
//! let mut bridge = ConsoleBridge::default();
//! bridge.run(&Command::from_argv(["echo", "hello"]))?;
//!
//! // Once per display tick:
//! bridge.pump();
//! for line in bridge.log().lines() {
//!     println!("{}", line);
//! }
//! # Ok::<(), lpic_console::SpawnError>(())
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`session`]: PTY process sessions and commands
//! - [`console`]: Display-side bridge, log buffer and line-mode tail
//! - [`logging`]: Tracing subscriber setup

pub mod config;
pub mod console;
pub mod logging;
pub mod session;

// Re-export config types for convenience
pub use config::{Config, ConfigError};

// Re-export session types for convenience
pub use session::{Command, ProcessSession, SessionId, SessionOptions, SpawnError};

// Re-export console types for convenience
pub use console::{ConsoleBridge, ConsoleLog, ConsoleMessage, LogTail};
