//! Log sinks for pipeline progress and streamed tool output.
//!
//! Every component takes a `&dyn LogSink` explicitly. Sinks are called from
//! worker threads and process reader threads, so implementations must be
//! `Send + Sync`.

use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Severity attached to each logged line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Plain output, e.g. a line a tool wrote to stdout.
    Normal,
    /// Progress markers emitted by the pipeline itself.
    Info,
    /// Error output, e.g. a line a tool wrote to stderr.
    Error,
    /// Recoverable problems the pipeline continued past.
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Normal => "normal",
            Self::Info => "info",
            Self::Error => "error",
            Self::Warning => "warning",
        };
        f.write_str(label)
    }
}

/// Destination for pipeline log lines.
pub trait LogSink: Send + Sync {
    /// Record one line at the given severity.
    fn log(&self, severity: Severity, message: &str);
}

impl<F> LogSink for F
where
    F: Fn(Severity, &str) + Send + Sync,
{
    fn log(&self, severity: Severity, message: &str) {
        self(severity, message);
    }
}

/// Forwards every line to the `tracing` facade.
///
/// Tool stdout goes out at `info`, stderr at `error`, with a `severity` field
/// so subscribers can tell them apart from pipeline markers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Normal | Severity::Info => {
                tracing::info!(target: "cistep", %severity, "{message}");
            }
            Severity::Warning => tracing::warn!(target: "cistep", %severity, "{message}"),
            Severity::Error => tracing::error!(target: "cistep", %severity, "{message}"),
        }
    }
}

/// Collects lines in memory. Useful for embedding and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(Severity, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every recorded line, in arrival order.
    pub fn lines(&self) -> Vec<(Severity, String)> {
        self.guard().clone()
    }

    /// Recorded messages with the given severity.
    pub fn messages(&self, severity: Severity) -> Vec<String> {
        self.guard()
            .iter()
            .filter(|(s, _)| *s == severity)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Whether any recorded line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.guard().iter().any(|(_, m)| m.contains(needle))
    }

    fn guard(&self) -> MutexGuard<'_, Vec<(Severity, String)>> {
        // A panicking writer cannot leave a half-pushed entry behind.
        match self.lines.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl LogSink for MemorySink {
    fn log(&self, severity: Severity, message: &str) {
        self.guard().push((severity, message.to_owned()));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.log(Severity::Info, "first");
        sink.log(Severity::Error, "second");
        assert_eq!(
            sink.lines(),
            vec![
                (Severity::Info, "first".to_owned()),
                (Severity::Error, "second".to_owned()),
            ]
        );
        assert_eq!(sink.messages(Severity::Error), vec!["second".to_owned()]);
        assert!(sink.contains("fir"));
    }

    #[test]
    fn memory_sink_is_safe_across_threads() {
        let sink = Arc::new(MemorySink::new());
        std::thread::scope(|scope| {
            for i in 0..8 {
                let sink = Arc::clone(&sink);
                scope.spawn(move || {
                    for j in 0..50 {
                        sink.log(Severity::Normal, &format!("{i}-{j}"));
                    }
                });
            }
        });
        assert_eq!(sink.lines().len(), 400);
    }

    #[test]
    fn closures_are_sinks() {
        let count = AtomicUsize::new(0);
        let sink = |_: Severity, _: &str| {
            count.fetch_add(1, Ordering::SeqCst);
        };
        sink.log(Severity::Warning, "a");
        sink.log(Severity::Normal, "b");
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
