//! Bounded line buffer backing the console view.

use std::collections::VecDeque;

/// Default number of lines kept before the oldest are dropped.
pub const DEFAULT_SCROLLBACK: usize = 2000;

/// Line-oriented log of console output.
///
/// Raw terminal text is appended with [`ConsoleLog::push_output`]; chunk
/// boundaries never introduce line breaks. `\r\n` and `\n` end a line, a
/// lone `\r` rewinds the current line.
#[derive(Debug, Clone)]
pub struct ConsoleLog {
    lines: VecDeque<String>,
    /// The last entry in `lines` is still being written.
    open: bool,
    /// A `\r` ended the previous chunk; its meaning depends on the next char.
    pending_cr: bool,
    capacity: usize,
    /// Lines completed since the last clear, including dropped ones.
    completed: u64,
}

impl Default for ConsoleLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_SCROLLBACK)
    }
}

impl ConsoleLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            open: false,
            pending_cr: false,
            capacity: capacity.max(1),
            completed: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.open = false;
        self.pending_cr = false;
        self.completed = 0;
    }

    /// Appends whole lines, terminating any partial line first.
    pub fn push_line(&mut self, text: &str) {
        self.pending_cr = false;
        if self.open {
            self.end_line();
        }
        for line in text.split('\n') {
            self.lines.push_back(line.to_string());
            self.end_line();
        }
    }

    /// Appends a raw output chunk.
    pub fn push_output(&mut self, text: &str) {
        for ch in text.chars() {
            let after_cr = std::mem::take(&mut self.pending_cr);
            if after_cr && ch != '\n' && self.open {
                if let Some(line) = self.lines.back_mut() {
                    line.clear();
                }
            }

            match ch {
                '\r' => self.pending_cr = true,
                '\n' => {
                    if !self.open {
                        self.lines.push_back(String::new());
                    }
                    self.end_line();
                }
                c => self.push_char(c),
            }
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// Number of lines held, including a partial one.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// The line still being written, if any.
    pub fn partial(&self) -> Option<&str> {
        if self.open {
            self.lines.back().map(String::as_str)
        } else {
            None
        }
    }

    /// Count of lines completed since the last clear.
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Completed lines finished after `mark` (a previous [`completed`] value)
    /// that are still held.
    ///
    /// [`completed`]: ConsoleLog::completed
    pub fn completed_since(&self, mark: u64) -> impl Iterator<Item = &str> {
        let held = self.lines.len() - usize::from(self.open);
        let fresh = self.completed.saturating_sub(mark).min(held as u64) as usize;
        self.lines
            .iter()
            .take(held)
            .skip(held - fresh)
            .map(String::as_str)
    }

    /// Full contents, each completed line terminated by `\n`.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for (i, line) in self.lines.iter().enumerate() {
            out.push_str(line);
            if !(self.open && i + 1 == self.lines.len()) {
                out.push('\n');
            }
        }
        out
    }

    fn push_char(&mut self, c: char) {
        if self.open {
            if let Some(line) = self.lines.back_mut() {
                line.push(c);
                return;
            }
        }
        self.lines.push_back(c.to_string());
        self.open = true;
        self.trim();
    }

    fn end_line(&mut self) {
        self.open = false;
        self.completed += 1;
        self.trim();
    }

    fn trim(&mut self) {
        while self.lines.len() > self.capacity {
            self.lines.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_join_into_lines() {
        let mut log = ConsoleLog::default();
        log.push_output("hel");
        log.push_output("lo\nwor");
        assert_eq!(log.partial(), Some("wor"));
        log.push_output("ld\n");

        assert_eq!(log.lines().collect::<Vec<_>>(), vec!["hello", "world"]);
        assert_eq!(log.text(), "hello\nworld\n");
        assert_eq!(log.partial(), None);
    }

    #[test]
    fn test_crlf_split_across_chunks() {
        let mut log = ConsoleLog::default();
        log.push_output("one\r");
        log.push_output("\ntwo\r\n");
        assert_eq!(log.text(), "one\ntwo\n");
    }

    #[test]
    fn test_lone_carriage_return_rewinds() {
        let mut log = ConsoleLog::default();
        log.push_output("10%\r20%\r");
        log.push_output("100%\n");
        assert_eq!(log.text(), "100%\n");
    }

    #[test]
    fn test_blank_lines_are_kept() {
        let mut log = ConsoleLog::default();
        log.push_output("a\n\nb\r\n\r\n");
        assert_eq!(log.lines().collect::<Vec<_>>(), vec!["a", "", "b", ""]);
        assert_eq!(log.completed(), 4);
    }

    #[test]
    fn test_push_line_closes_partial() {
        let mut log = ConsoleLog::default();
        log.push_output("Answer: ");
        log.push_line("[process exited with code 0]");
        assert_eq!(log.text(), "Answer: \n[process exited with code 0]\n");
    }

    #[test]
    fn test_scrollback_drops_oldest() {
        let mut log = ConsoleLog::with_capacity(2);
        log.push_output("1\n2\n3\n");
        assert_eq!(log.lines().collect::<Vec<_>>(), vec!["2", "3"]);
        assert_eq!(log.completed(), 3);
    }

    #[test]
    fn test_completed_since_tracks_new_lines() {
        let mut log = ConsoleLog::default();
        log.push_line("$ echo hi");
        let mark = log.completed();
        log.push_output("hi\npart");

        assert_eq!(log.completed_since(mark).collect::<Vec<_>>(), vec!["hi"]);
        assert_eq!(log.completed_since(0).count(), 2);
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut log = ConsoleLog::default();
        log.push_output("x\r");
        log.clear();
        log.push_output("\ny");
        assert_eq!(log.text(), "\ny");
        assert_eq!(log.completed(), 1);
        assert!(!log.is_empty());
    }
}
