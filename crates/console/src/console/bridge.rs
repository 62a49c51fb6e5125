//! Bridge between a [`ProcessSession`] and a single-threaded display loop.
//!
//! The reader thread never touches display state. Its callbacks post
//! [`ConsoleMessage`]s on a channel that the display loop drains with
//! [`ConsoleBridge::pump`] (once per tick) or awaits with
//! [`ConsoleBridge::next_message`]; only then is the log updated.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::log::{ConsoleLog, DEFAULT_SCROLLBACK};
use crate::config::Config;
use crate::session::{Command, ProcessSession, SessionId, SessionOptions, SpawnError};

/// Event posted from the reader thread to the display loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleMessage {
    /// A decoded output chunk.
    Output { session: SessionId, text: String },
    /// The session's process exited.
    Exited { session: SessionId, code: i32 },
}

impl ConsoleMessage {
    /// Returns the session that produced this message.
    pub fn session(&self) -> SessionId {
        match self {
            ConsoleMessage::Output { session, .. } | ConsoleMessage::Exited { session, .. } => {
                *session
            }
        }
    }
}

/// Formats the line appended when a process exits.
pub fn exit_line(code: i32) -> String {
    format!("[process exited with code {}]", code)
}

/// Display-side owner of one [`ProcessSession`].
pub struct ConsoleBridge {
    session: ProcessSession,
    messages: mpsc::UnboundedReceiver<ConsoleMessage>,
    log: ConsoleLog,
    /// Contents of the input field.
    input: String,
    running: bool,
    /// Session whose messages are applied; anything else is stale.
    current: Option<SessionId>,
    last_exit_code: Option<i32>,
}

impl ConsoleBridge {
    /// Creates an idle bridge.
    pub fn new(options: SessionOptions, scrollback: usize) -> Self {
        let (tx, messages) = mpsc::unbounded_channel();
        let output_tx = tx.clone();

        // A send only fails once the bridge, and with it the receiver, is gone.
        let session = ProcessSession::new(
            options,
            Arc::new(move |session: SessionId, text: String| {
                let _ = output_tx.send(ConsoleMessage::Output { session, text });
            }),
            Arc::new(move |session: SessionId, code: i32| {
                let _ = tx.send(ConsoleMessage::Exited { session, code });
            }),
        );

        Self {
            session,
            messages,
            log: ConsoleLog::with_capacity(scrollback),
            input: String::new(),
            running: false,
            current: None,
            last_exit_code: None,
        }
    }

    /// Creates a bridge from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            SessionOptions::from(&config.session),
            config.console.scrollback,
        )
    }

    /// Runs `command`, replacing whatever was running.
    ///
    /// Clears the log and echoes the command line. On failure a line
    /// describing the error is logged and the bridge stays idle.
    pub fn run(&mut self, command: &Command) -> Result<SessionId, SpawnError> {
        self.log.clear();
        self.log.push_line(&format!("$ {}", command.display()));
        self.current = None;
        self.last_exit_code = None;
        self.running = true;

        match self.session.start(command) {
            Ok(id) => {
                self.current = Some(id);
                Ok(id)
            }
            Err(e) => {
                tracing::warn!(command = %command.display(), error = %e, "Command failed to start");
                self.log.push_line(&format!("[failed to start: {}]", e));
                self.running = false;
                Err(e)
            }
        }
    }

    /// Sends `line` plus a newline to the running process and clears the
    /// input field. Does nothing if no process is running.
    pub fn submit_input(&mut self, line: &str) {
        self.input.clear();
        if !self.running {
            return;
        }
        let mut data = String::with_capacity(line.len() + 1);
        data.push_str(line);
        data.push('\n');
        self.session.write(data.as_bytes());
    }

    /// Submits the current contents of the input field.
    pub fn submit(&mut self) {
        let line = std::mem::take(&mut self.input);
        self.submit_input(&line);
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut String {
        &mut self.input
    }

    /// Stops the running process.
    pub fn stop(&mut self) {
        self.session.stop();
        self.running = false;
    }

    /// Applies every queued message. Returns how many were applied,
    /// stale ones included.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(message) = self.messages.try_recv() {
            self.apply(message);
            applied += 1;
        }
        applied
    }

    /// Waits for the next message from the reader thread.
    ///
    /// The session holds the senders for the bridge's whole lifetime, so
    /// this does not yield `None` in practice.
    pub async fn next_message(&mut self) -> Option<ConsoleMessage> {
        self.messages.recv().await
    }

    /// Applies one message to display state, on the display loop's thread.
    pub fn apply(&mut self, message: ConsoleMessage) {
        if Some(message.session()) != self.current {
            tracing::trace!(session_id = %message.session(), "Discarding stale console message");
            return;
        }

        match message {
            ConsoleMessage::Output { text, .. } => self.log.push_output(&text),
            ConsoleMessage::Exited { code, .. } => {
                self.log.push_line(&exit_line(code));
                self.last_exit_code = Some(code);
                self.running = false;
            }
        }
    }

    pub fn log(&self) -> &ConsoleLog {
        &self.log
    }

    /// Returns the running indicator shown by the display.
    pub fn running(&self) -> bool {
        self.running
    }

    /// Exit code of the current session once its exit was delivered.
    pub fn last_exit_code(&self) -> Option<i32> {
        self.last_exit_code
    }

    pub fn current_session(&self) -> Option<SessionId> {
        self.current
    }

    /// Returns whether the underlying process is still alive.
    pub fn process_running(&self) -> bool {
        self.session.running()
    }
}

impl Default for ConsoleBridge {
    fn default() -> Self {
        Self::new(SessionOptions::default(), DEFAULT_SCROLLBACK)
    }
}
