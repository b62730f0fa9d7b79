//! Output channel adapters.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

/// Append-only, line-oriented output channel shared by build callbacks and the owner.
pub trait OutputSink: Send + Sync {
    fn write_line(&self, line: &str);

    /// Bring the channel into view. Calling it repeatedly has no further effect.
    fn show(&self);
}

/// Writes to stdout; a banner is printed the first time the channel is shown.
#[derive(Debug)]
pub struct ConsoleOutput {
    title: String,
    shown: AtomicBool,
    lock: Mutex<()>,
}

impl ConsoleOutput {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            shown: AtomicBool::new(false),
            lock: Mutex::new(()),
        }
    }

    fn emit(&self, line: &str) {
        let _guard = self.lock.lock();
        let mut stdout = io::stdout().lock();
        if let Err(err) = writeln!(stdout, "{line}") {
            tracing::debug!(error = %err, "failed to write output line");
        }
    }
}

impl OutputSink for ConsoleOutput {
    fn write_line(&self, line: &str) {
        self.emit(line);
    }

    fn show(&self) {
        if !self.shown.swap(true, Ordering::SeqCst) {
            self.emit(&format!("------ {} ------", self.title));
        }
    }
}

/// Keeps every line in memory, for embedding hosts and tests.
#[derive(Debug, Default)]
pub struct MemoryOutput {
    lines: Mutex<Vec<String>>,
    show_requests: AtomicUsize,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// How many times `show` was requested.
    pub fn show_requests(&self) -> usize {
        self.show_requests.load(Ordering::SeqCst)
    }
}

impl OutputSink for MemoryOutput {
    fn write_line(&self, line: &str) {
        self.lines.lock().push(line.to_owned());
    }

    fn show(&self) {
        self.show_requests.fetch_add(1, Ordering::SeqCst);
    }
}
