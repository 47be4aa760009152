//! Notifications from the coordinator to a presentation layer.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

/// Number of lines a [`LogBuffer`] keeps.
pub const LOG_CAPACITY: usize = 100;

/// How a log line should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Neutral status, e.g. a transfer starting.
    Info,
    /// A transfer completed.
    Success,
    /// Something failed.
    Error,
}

impl LineKind {
    /// Classifies a line by its text: `Error: ...` and `... Completed`.
    #[must_use]
    pub fn classify(text: &str) -> Self {
        if text.starts_with("Error: ") {
            Self::Error
        } else if text.ends_with(" Completed") {
            Self::Success
        } else {
            Self::Info
        }
    }
}

/// Receiver for run notifications.
///
/// Calls may arrive from the coordinator task while transfers are running,
/// so implementations must be thread-safe. All methods default to no-ops.
pub trait ProgressSink: Send + Sync {
    /// A human-readable line for the run log.
    fn on_log_line(&self, _kind: LineKind, _text: &str) {}

    /// Fraction of resources settled, in `0.0..=1.0`.
    fn on_progress(&self, _ratio: f64) {}

    /// The collection listed no resources.
    fn on_no_data_found(&self) {}

    /// A run could not start or its listing failed.
    fn on_error(&self, _message: &str) {}
}

/// A sink that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {}

/// A sink that forwards every notification to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn on_log_line(&self, kind: LineKind, text: &str) {
        match kind {
            LineKind::Error => log::error!("{text}"),
            LineKind::Info | LineKind::Success => log::info!("{text}"),
        }
    }

    fn on_progress(&self, ratio: f64) {
        log::debug!("Progress {:.1}%", ratio * 100.0);
    }

    fn on_no_data_found(&self) {
        log::warn!("No data found");
    }

    fn on_error(&self, message: &str) {
        log::error!("{message}");
    }
}

/// A sink that keeps the most recent log lines and the latest progress.
#[derive(Debug)]
pub struct LogBuffer {
    capacity: usize,
    inner: Mutex<BufferInner>,
}

#[derive(Debug, Default)]
struct BufferInner {
    lines: VecDeque<(LineKind, String)>,
    ratio: f64,
    no_data: bool,
    last_error: Option<String>,
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(LOG_CAPACITY)
    }
}

impl LogBuffer {
    /// Creates a buffer that keeps at most `capacity` lines.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(BufferInner::default()),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut BufferInner) -> T) -> T {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut inner)
    }

    /// Returns the retained lines, oldest first.
    #[must_use]
    pub fn lines(&self) -> Vec<(LineKind, String)> {
        self.with(|inner| inner.lines.iter().cloned().collect())
    }

    /// Returns the last reported progress ratio.
    #[must_use]
    pub fn ratio(&self) -> f64 {
        self.with(|inner| inner.ratio)
    }

    /// Returns true if a run reported an empty collection.
    #[must_use]
    pub fn no_data(&self) -> bool {
        self.with(|inner| inner.no_data)
    }

    /// Returns the last message passed to [`ProgressSink::on_error`].
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.with(|inner| inner.last_error.clone())
    }
}

impl ProgressSink for LogBuffer {
    fn on_log_line(&self, kind: LineKind, text: &str) {
        let capacity = self.capacity;
        self.with(|inner| {
            while inner.lines.len() >= capacity {
                inner.lines.pop_front();
            }
            inner.lines.push_back((kind, text.to_string()));
        });
    }

    fn on_progress(&self, ratio: f64) {
        self.with(|inner| inner.ratio = ratio);
    }

    fn on_no_data_found(&self) {
        self.with(|inner| inner.no_data = true);
    }

    fn on_error(&self, message: &str) {
        self.with(|inner| inner.last_error = Some(message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sinks_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoProgress>();
        assert_send_sync::<LogSink>();
        assert_send_sync::<LogBuffer>();
    }

    #[test]
    fn classify_matches_line_shapes() {
        assert_eq!(LineKind::classify("tile_1.zip Completed"), LineKind::Success);
        assert_eq!(
            LineKind::classify("Error: Failed to download a.zip. Statuscode is: 404."),
            LineKind::Error
        );
        assert_eq!(LineKind::classify("tile_1.zip Downloading"), LineKind::Info);
    }

    #[test]
    fn buffer_drops_oldest_lines() {
        let buffer = LogBuffer::new(3);
        for i in 0..5 {
            buffer.on_log_line(LineKind::Info, &format!("line {i}"));
        }
        let lines: Vec<_> = buffer.lines().into_iter().map(|(_, text)| text).collect();
        assert_eq!(lines, ["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn default_buffer_keeps_one_hundred_lines() {
        let buffer = LogBuffer::default();
        for i in 0..150 {
            buffer.on_log_line(LineKind::Info, &i.to_string());
        }
        let lines = buffer.lines();
        assert_eq!(lines.len(), LOG_CAPACITY);
        assert_eq!(lines[0].1, "50");
    }

    #[test]
    fn buffer_tracks_status() {
        let buffer = LogBuffer::default();
        buffer.on_progress(0.5);
        buffer.on_no_data_found();
        buffer.on_error("boom");
        assert!((buffer.ratio() - 0.5).abs() < f64::EPSILON);
        assert!(buffer.no_data());
        assert_eq!(buffer.last_error().as_deref(), Some("boom"));
    }
}
