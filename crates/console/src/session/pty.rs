//! PTY process session.
//!
//! A [`ProcessSession`] owns at most one child process attached to a
//! pseudo-terminal. Output is drained by a dedicated reader thread and
//! reported through the callbacks supplied at construction; input is
//! written synchronously by the caller.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use portable_pty::{native_pty_system, Child, ChildKiller, MasterPty, PtySize};
use thiserror::Error;
use uuid::Uuid;

use super::command::Command;
use crate::config::SessionConfig;

/// Unique identifier for one spawned process.
pub type SessionId = Uuid;

/// Receives decoded output chunks from the reader thread.
pub type OutputCallback = Arc<dyn Fn(SessionId, String) + Send + Sync>;

/// Receives the exit code of a finished session, exactly once.
pub type ExitCallback = Arc<dyn Fn(SessionId, i32) + Send + Sync>;

/// Errors surfaced synchronously by [`ProcessSession::start`].
#[derive(Error, Debug)]
pub enum SpawnError {
    /// The command has no program.
    #[error("command has no program to run")]
    EmptyCommand,

    /// The working directory does not exist.
    #[error("working directory does not exist: {}", .0.display())]
    WorkingDirectory(PathBuf),

    /// Failed to allocate the pseudo-terminal pair.
    #[error("failed to allocate PTY: {0}")]
    Pty(String),

    /// The executable could not be launched.
    #[error("failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },

    /// The reader thread could not be started.
    #[error("failed to start reader thread: {0}")]
    ReaderThread(#[from] std::io::Error),
}

/// Tunables for spawned sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Size of each read from the PTY master.
    pub read_buffer_size: usize,
    /// How long `stop` waits for the reader thread before detaching it.
    pub stop_grace: Duration,
    pub cols: u16,
    pub rows: u16,
    /// Value of `TERM` in the child environment. Empty leaves it untouched.
    pub term: String,
    /// Working directory for commands that do not set one.
    pub default_cwd: Option<PathBuf>,
}

/// Default size of a single PTY read.
pub const READ_BUFFER_SIZE: usize = 4096;

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for SessionOptions {
    fn from(config: &SessionConfig) -> Self {
        Self {
            read_buffer_size: config.read_buffer_size,
            stop_grace: Duration::from_millis(config.stop_grace_ms),
            cols: config.cols,
            rows: config.rows,
            term: config.term.clone(),
            default_cwd: config.default_cwd.clone(),
        }
    }
}

/// Resources of the live session. Every handle is released exactly once
/// through `Option::take`.
struct ActiveSession {
    id: SessionId,
    pid: Option<u32>,
    master: Option<Box<dyn MasterPty + Send>>,
    writer: Option<Box<dyn Write + Send>>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    running: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
    /// Disconnects when the reader thread returns.
    reader_done: mpsc::Receiver<()>,
}

/// Owner of at most one external process attached to a pseudo-terminal.
pub struct ProcessSession {
    options: SessionOptions,
    on_output: OutputCallback,
    on_exit: ExitCallback,
    active: Option<ActiveSession>,
    /// Exit code slot of the most recent session; survives `stop`.
    exit_code: Option<Arc<Mutex<Option<i32>>>>,
}

impl ProcessSession {
    /// Creates an idle session controller reporting through the given callbacks.
    pub fn new(options: SessionOptions, on_output: OutputCallback, on_exit: ExitCallback) -> Self {
        Self {
            options,
            on_output,
            on_exit,
            active: None,
            exit_code: None,
        }
    }

    /// Returns whether the current child is running.
    ///
    /// True from a successful spawn until the reader observes the exit or
    /// `stop` is called.
    pub fn running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|s| s.running.load(Ordering::SeqCst))
    }

    /// Returns the id of the session whose resources are currently held.
    pub fn session_id(&self) -> Option<SessionId> {
        self.active.as_ref().map(|s| s.id)
    }

    /// Returns the process ID of the current child, if known.
    pub fn pid(&self) -> Option<u32> {
        self.active.as_ref().and_then(|s| s.pid)
    }

    /// Returns the exit code of the most recent session once it is known.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code.as_ref().and_then(|slot| *lock_slot(slot))
    }

    /// Starts `command`, replacing any session that is still held.
    pub fn start(&mut self, command: &Command) -> Result<SessionId, SpawnError> {
        self.replace_running();

        let builder =
            command.to_builder(self.options.default_cwd.as_deref(), &self.options.term)?;
        let program = command.program().unwrap_or_default().to_string();

        let pair = native_pty_system()
            .openpty(PtySize {
                rows: self.options.rows,
                cols: self.options.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| SpawnError::Pty(e.to_string()))?;

        let child = pair
            .slave
            .spawn_command(builder)
            .map_err(|e| SpawnError::Spawn {
                program,
                reason: e.to_string(),
            })?;
        // The parent must not hold the subordinate side, or reads never hit EOF.
        drop(pair.slave);

        let pid = child.process_id();
        let mut killer = child.clone_killer();

        let handles = pair
            .master
            .try_clone_reader()
            .and_then(|reader| Ok((reader, pair.master.take_writer()?)));
        let (reader, writer) = match handles {
            Ok(handles) => handles,
            Err(e) => {
                let _ = killer.kill();
                return Err(SpawnError::Pty(e.to_string()));
            }
        };

        let id = Uuid::new_v4();
        let running = Arc::new(AtomicBool::new(true));
        let exit_slot = Arc::new(Mutex::new(None));
        let (done_tx, done_rx) = mpsc::channel();

        let task = ReaderTask {
            id,
            reader,
            child,
            buffer_size: self.options.read_buffer_size.max(1),
            running: Arc::clone(&running),
            exit_slot: Arc::clone(&exit_slot),
            on_output: Arc::clone(&self.on_output),
            on_exit: Arc::clone(&self.on_exit),
            _done: done_tx,
        };

        let handle = match std::thread::Builder::new()
            .name(format!("pty-reader-{}", id.simple()))
            .spawn(move || task.run())
        {
            Ok(handle) => handle,
            Err(e) => {
                // The task (and with it the child handle) was dropped with the closure.
                let _ = killer.kill();
                return Err(SpawnError::ReaderThread(e));
            }
        };

        tracing::info!(
            session_id = %id,
            pid = ?pid,
            command = %command.display(),
            "Started PTY session"
        );

        self.exit_code = Some(exit_slot);
        self.active = Some(ActiveSession {
            id,
            pid,
            master: Some(pair.master),
            writer: Some(writer),
            killer,
            running,
            reader: Some(handle),
            reader_done: done_rx,
        });

        Ok(id)
    }

    /// Stops whatever session is held so a new one can take its place.
    ///
    /// This is the only path by which `start` affects an existing session;
    /// at most one session is ever alive per `ProcessSession`.
    pub fn replace_running(&mut self) {
        if let Some(id) = self.session_id() {
            tracing::debug!(session_id = %id, "Replacing previous PTY session");
            self.stop();
        }
    }

    /// Writes raw bytes to the child's standard input.
    ///
    /// Silently ignored when nothing is running.
    pub fn write(&mut self, data: &[u8]) {
        let Some(session) = self.active.as_mut() else {
            return;
        };
        if !session.running.load(Ordering::SeqCst) {
            return;
        }
        let Some(writer) = session.writer.as_mut() else {
            return;
        };

        if let Err(e) = writer.write_all(data).and_then(|()| writer.flush()) {
            tracing::debug!(
                session_id = %session.id,
                error = %e,
                "Dropping input for exiting session"
            );
        }
    }

    /// Terminates the current child and releases its resources.
    ///
    /// Sends SIGTERM, closes the master and waits up to the configured grace
    /// period for the reader thread. Calling it with nothing running is a
    /// no-op.
    pub fn stop(&mut self) {
        let Some(mut session) = self.active.take() else {
            return;
        };

        if session.running.swap(false, Ordering::SeqCst) {
            terminate(&mut session);
        }

        session.writer.take();
        session.master.take();

        match session.reader_done.recv_timeout(self.options.stop_grace) {
            Err(mpsc::RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    session_id = %session.id,
                    pid = ?session.pid,
                    "Reader still draining after stop; detaching"
                );
            }
            _ => {
                if let Some(handle) = session.reader.take() {
                    if handle.join().is_err() {
                        tracing::error!(session_id = %session.id, "Reader thread panicked");
                    }
                }
            }
        }

        tracing::info!(session_id = %session.id, "Stopped PTY session");
    }
}

impl Drop for ProcessSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Asks the child to exit. Never force-kills on Unix.
fn terminate(session: &mut ActiveSession) {
    if send_sigterm(session) {
        return;
    }

    if let Err(e) = session.killer.kill() {
        tracing::debug!(session_id = %session.id, error = %e, "Kill failed");
    }
}

#[cfg(unix)]
fn send_sigterm(session: &ActiveSession) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = session.pid else {
        return false;
    };
    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        tracing::debug!(session_id = %session.id, error = %e, "SIGTERM not delivered");
    }
    true
}

#[cfg(not(unix))]
fn send_sigterm(_session: &ActiveSession) -> bool {
    false
}

fn lock_slot(slot: &Mutex<Option<i32>>) -> std::sync::MutexGuard<'_, Option<i32>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// State moved onto the reader thread.
struct ReaderTask {
    id: SessionId,
    reader: Box<dyn Read + Send>,
    child: Box<dyn Child + Send + Sync>,
    buffer_size: usize,
    running: Arc<AtomicBool>,
    exit_slot: Arc<Mutex<Option<i32>>>,
    on_output: OutputCallback,
    on_exit: ExitCallback,
    _done: mpsc::Sender<()>,
}

impl ReaderTask {
    fn run(mut self) {
        let mut buffer = vec![0u8; self.buffer_size];

        loop {
            match self.reader.read(&mut buffer) {
                Ok(0) => {
                    tracing::debug!(session_id = %self.id, "PTY EOF");
                    break;
                }
                Ok(n) => {
                    let text = String::from_utf8_lossy(&buffer[..n]).into_owned();
                    (self.on_output)(self.id, text);
                }
                Err(e) => {
                    // Linux reports EIO once the last subordinate handle closes.
                    tracing::debug!(session_id = %self.id, error = %e, "PTY read ended");
                    break;
                }
            }
        }

        let code = match self.child.wait() {
            Ok(status) => status.exit_code() as i32,
            Err(e) => {
                tracing::warn!(
                    session_id = %self.id,
                    error = %e,
                    "Exit status unavailable; reporting 0"
                );
                0
            }
        };

        *lock_slot(&self.exit_slot) = Some(code);
        self.running.store(false, Ordering::SeqCst);
        tracing::info!(session_id = %self.id, code, "PTY session exited");

        (self.on_exit)(self.id, code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Output(SessionId, String),
        Exit(SessionId, i32),
    }

    fn session_with_events() -> (ProcessSession, mpsc::Receiver<Event>) {
        session_with_options(SessionOptions::default())
    }

    fn session_with_options(options: SessionOptions) -> (ProcessSession, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel();
        let out_tx = Mutex::new(tx.clone());
        let exit_tx = Mutex::new(tx);
        let session = ProcessSession::new(
            options,
            Arc::new(move |id: SessionId, text: String| {
                let _ = out_tx.lock().unwrap().send(Event::Output(id, text));
            }),
            Arc::new(move |id: SessionId, code: i32| {
                let _ = exit_tx.lock().unwrap().send(Event::Exit(id, code));
            }),
        );
        (session, rx)
    }

    /// Collects events until the exit of `id` arrives.
    fn collect_until_exit(rx: &mpsc::Receiver<Event>, id: SessionId) -> (String, Vec<i32>) {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut output = String::new();
        let mut exits = Vec::new();

        while Instant::now() < deadline {
            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(Event::Output(sid, text)) if sid == id => {
                    assert!(exits.is_empty(), "output after exit event");
                    output.push_str(&text);
                }
                Ok(Event::Exit(sid, code)) if sid == id => {
                    exits.push(code);
                    // Give a duplicate exit a chance to show up.
                    if let Ok(Event::Exit(sid, code)) = rx.recv_timeout(Duration::from_millis(200)) {
                        if sid == id {
                            exits.push(code);
                        }
                    }
                    break;
                }
                _ => {}
            }
        }

        (output.replace('\r', ""), exits)
    }

    fn sh(script: &str) -> Command {
        Command::from_argv(["/bin/sh", "-c", script])
    }

    #[test]
    fn test_default_options() {
        let options = SessionOptions::default();
        assert_eq!(options, SessionOptions::from(&SessionConfig::default()));
        assert_eq!(options.read_buffer_size, READ_BUFFER_SIZE);
        assert_eq!(options.stop_grace, Duration::from_millis(500));
        assert_eq!((options.cols, options.rows), (80, 24));
        assert_eq!(options.term, "xterm-256color");
        assert!(options.default_cwd.is_none());
    }

    #[test]
    fn test_idle_session_observers() {
        let (session, _rx) = session_with_events();
        assert!(!session.running());
        assert!(session.session_id().is_none());
        assert!(session.pid().is_none());
        assert!(session.exit_code().is_none());
    }

    #[test]
    fn test_write_before_start_is_ignored() {
        let (mut session, rx) = session_with_events();
        session.write(b"hello\n");
        assert!(!session.running());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_stop_twice_is_harmless() {
        let (mut session, _rx) = session_with_events();
        session.stop();
        assert!(!session.running());
        session.stop();
        assert!(!session.running());
    }

    #[test]
    fn test_echo_output_and_exit() {
        let (mut session, rx) = session_with_events();
        let id = session.start(&Command::from_argv(["echo", "hello"])).unwrap();
        assert_eq!(session.session_id(), Some(id));
        assert!(session.pid().is_some());

        let (output, exits) = collect_until_exit(&rx, id);
        assert_eq!(output, "hello\n");
        assert_eq!(exits, vec![0]);
        assert!(!session.running());
        assert_eq!(session.exit_code(), Some(0));
    }

    #[test]
    fn test_output_in_order_then_single_exit() {
        let (mut session, rx) = session_with_events();
        let id = session
            .start(&sh("printf first; sleep 0.2; printf second; exit 7"))
            .unwrap();

        let (output, exits) = collect_until_exit(&rx, id);
        assert_eq!(output, "firstsecond");
        assert_eq!(exits, vec![7]);
    }

    #[test]
    fn test_small_reads_still_concatenate() {
        let options = SessionOptions {
            read_buffer_size: 3,
            ..SessionOptions::default()
        };
        let (mut session, rx) = session_with_options(options);

        let id = session.start(&sh("printf abcdefghij")).unwrap();
        let (output, exits) = collect_until_exit(&rx, id);
        assert_eq!(output, "abcdefghij");
        assert_eq!(exits, vec![0]);
    }

    #[test]
    fn test_split_multibyte_is_replaced_not_fatal() {
        let options = SessionOptions {
            read_buffer_size: 1,
            ..SessionOptions::default()
        };
        let (mut session, rx) = session_with_options(options);

        // "é" is two bytes; one-byte reads always split it.
        let id = session.start(&sh("printf '\\303\\251'")).unwrap();
        let (output, exits) = collect_until_exit(&rx, id);
        assert!(output.contains(char::REPLACEMENT_CHARACTER));
        assert_eq!(exits, vec![0]);
    }

    #[test]
    fn test_write_reaches_child_stdin() {
        let (mut session, rx) = session_with_events();
        let id = session.start(&sh("read line; echo got:$line")).unwrap();
        session.write(b"ping\n");

        let (output, exits) = collect_until_exit(&rx, id);
        assert!(output.contains("got:ping"), "output was {:?}", output);
        assert_eq!(exits, vec![0]);
    }

    #[test]
    fn test_env_and_cwd_are_applied() {
        let temp = tempfile::TempDir::new().unwrap();
        let dir_name = temp.path().file_name().unwrap().to_string_lossy().to_string();
        let (mut session, rx) = session_with_events();

        let cmd = sh("printf '%s|' \"$LPIC_TEST_VAR\"; pwd")
            .cwd(temp.path())
            .env("LPIC_TEST_VAR", "test_value");
        let id = session.start(&cmd).unwrap();

        let (output, _) = collect_until_exit(&rx, id);
        assert!(output.starts_with("test_value|"), "output was {:?}", output);
        assert!(output.contains(&dir_name), "output was {:?}", output);
    }

    #[test]
    fn test_missing_executable_is_spawn_error() {
        let (mut session, rx) = session_with_events();
        let result = session.start(&Command::new("lpic-definitely-not-a-program"));

        assert!(matches!(result, Err(SpawnError::Spawn { .. })));
        assert!(!session.running());
        assert!(session.session_id().is_none());
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_non_executable_file_is_spawn_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let script = temp.path().join("script.sh");
        std::fs::write(&script, "#!/bin/sh\necho hi\n").unwrap();

        let (mut session, _rx) = session_with_events();
        let result = session.start(&Command::new(script.to_string_lossy()));
        assert!(matches!(result, Err(SpawnError::Spawn { .. })));
        assert!(!session.running());
    }

    #[test]
    fn test_stop_terminates_long_running_child() {
        let (mut session, rx) = session_with_events();
        let id = session.start(&Command::from_argv(["sleep", "5"])).unwrap();
        assert!(session.running());

        let started = Instant::now();
        session.stop();
        assert!(!session.running());
        assert!(session.session_id().is_none());
        assert!(started.elapsed() < Duration::from_secs(2));

        let (_, exits) = collect_until_exit(&rx, id);
        assert_eq!(exits.len(), 1);
        assert_ne!(exits[0], 0);

        // Writing after stop is a no-op.
        session.write(b"late\n");
    }

    #[test]
    fn test_start_replaces_previous_session() {
        let (mut session, rx) = session_with_events();
        let first = session.start(&Command::from_argv(["sleep", "5"])).unwrap();
        let second = session.start(&Command::from_argv(["echo", "done"])).unwrap();
        assert_ne!(first, second);
        assert_eq!(session.session_id(), Some(second));

        let (output, exits) = collect_until_exit(&rx, second);
        assert_eq!(output, "done\n");
        assert_eq!(exits, vec![0]);
    }
}
