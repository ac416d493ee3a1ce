use std::time::{Duration, Instant};

/// Logs how long a scope took when dropped.
pub struct ScopedTimer {
    label: String,
    level: log::Level,
    start: Instant,
}

impl ScopedTimer {
    pub fn new(label: impl Into<String>) -> Self {
        Self::with_level(label, log::Level::Info)
    }

    /// For per-route timings that would flood the info log.
    pub fn debug(label: impl Into<String>) -> Self {
        Self::with_level(label, log::Level::Debug)
    }

    fn with_level(label: impl Into<String>, level: log::Level) -> Self {
        Self {
            label: label.into(),
            level,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        log::log!(self.level, "{} took {:?}", self.label, self.start.elapsed());
    }
}
