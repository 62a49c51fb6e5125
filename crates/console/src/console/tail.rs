//! Incremental line-mode view of a [`ConsoleLog`].
//!
//! Used by front ends that print to a plain stream instead of redrawing a
//! screen: each call to [`LogTail::render`] yields only what changed since
//! the previous call, including the partial line an interactive prompt
//! leaves behind.

use super::log::ConsoleLog;

#[derive(Debug, Default, Clone)]
pub struct LogTail {
    /// `ConsoleLog::completed` at the previous render.
    mark: u64,
    /// Partial line already written to the stream.
    shown_partial: String,
}

impl LogTail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the text to append to the stream to catch up with `log`.
    pub fn render(&mut self, log: &ConsoleLog) -> String {
        let mut out = String::new();

        for line in log.completed_since(self.mark) {
            let shown = std::mem::take(&mut self.shown_partial);
            match line.strip_prefix(shown.as_str()) {
                Some(rest) => out.push_str(rest),
                None => {
                    out.push('\r');
                    out.push_str(line);
                }
            }
            out.push('\n');
        }
        self.mark = log.completed();

        let partial = log.partial().unwrap_or_default();
        if partial != self.shown_partial {
            match partial.strip_prefix(self.shown_partial.as_str()) {
                Some(rest) => out.push_str(rest),
                None => {
                    out.push('\r');
                    out.push_str(partial);
                }
            }
            self.shown_partial = partial.to_string();
        }

        out
    }
}
