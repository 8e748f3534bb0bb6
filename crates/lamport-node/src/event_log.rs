//! Human-readable event log.
//!
//! Lifecycle events are user-facing output, separate from `tracing`
//! diagnostics: one line per event on stdout, appended to the event log
//! file as well.

use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::Path,
    sync::{Mutex, MutexGuard},
};

use lamport_core::{Event, ledger::AllHistory};

/// Destination for event lines and the final balance report.
pub trait EventSink: Send + Sync {
    /// Write one event line.
    fn record(&self, event: &Event) -> io::Result<()>;

    /// Write the collected balance report.
    fn publish(&self, report: &AllHistory) -> io::Result<()>;
}

/// Production sink: stdout plus an append-only file.
#[derive(Debug)]
pub struct EventLog {
    file: Mutex<File>,
}

impl EventLog {
    /// Open (or create) `path` for appending.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }
}

impl EventSink for EventLog {
    fn record(&self, event: &Event) -> io::Result<()> {
        let line = event.to_string();
        writeln!(io::stdout().lock(), "{line}")?;

        let mut file = lock(&self.file)?;
        writeln!(file, "{line}")?;
        file.flush()
    }

    fn publish(&self, report: &AllHistory) -> io::Result<()> {
        writeln!(io::stdout().lock(), "{report}")
    }
}

/// Sink that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
    reports: Mutex<Vec<AllHistory>>,
}

impl MemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines recorded so far, in recording order.
    pub fn lines(&self) -> Vec<String> {
        lock(&self.lines).map(|lines| lines.clone()).unwrap_or_default()
    }

    /// Reports published so far.
    pub fn reports(&self) -> Vec<AllHistory> {
        lock(&self.reports).map(|reports| reports.clone()).unwrap_or_default()
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: &Event) -> io::Result<()> {
        lock(&self.lines)?.push(event.to_string());
        Ok(())
    }

    fn publish(&self, report: &AllHistory) -> io::Result<()> {
        lock(&self.reports)?.push(report.clone());
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> io::Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| io::Error::other("event sink lock poisoned"))
}
