//! Logger handle handed to every engine instead of reaching for a global.

use log::{Level, Log, Metadata, Record};
use std::fmt;
use std::sync::Arc;

pub const TARGET: &str = "cpio_patcher";

/// Shared handle to a [`log::Log`] implementation.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<dyn Log>,
}

impl Logger {
    pub fn new(inner: Arc<dyn Log>) -> Self {
        Self { inner }
    }

    /// Forward to whatever logger the process installed (env_logger in the binary).
    pub fn installed() -> Self {
        Self::new(Arc::new(Installed))
    }

    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        let metadata = Metadata::builder().level(level).target(TARGET).build();
        if !self.inner.enabled(&metadata) {
            return;
        }
        self.inner
            .log(&Record::builder().metadata(metadata).args(args).build());
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::installed()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Logger")
    }
}

struct Installed;

impl Log for Installed {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level() && log::logger().enabled(metadata)
    }

    fn log(&self, record: &Record<'_>) {
        log::logger().log(record);
    }

    fn flush(&self) {
        log::logger().flush();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Collects formatted messages at or above `level`.
    pub(crate) struct Capture {
        level: Level,
        pub(crate) lines: Mutex<Vec<String>>,
    }

    impl Capture {
        pub(crate) fn new(level: Level) -> Arc<Self> {
            Arc::new(Self {
                level,
                lines: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }
    }

    impl Log for Capture {
        fn enabled(&self, metadata: &Metadata<'_>) -> bool {
            metadata.level() <= self.level
        }

        fn log(&self, record: &Record<'_>) {
            self.lines
                .lock()
                .unwrap()
                .push(format!("{} {}", record.level(), record.args()));
        }

        fn flush(&self) {}
    }

    #[test]
    fn test_level_filter_applies() {
        let capture = Capture::new(Level::Info);
        let logger = Logger::new(capture.clone());

        logger.log(Level::Info, format_args!("kept {}", 1));
        logger.log(Level::Debug, format_args!("dropped"));

        assert_eq!(capture.lines(), vec!["INFO kept 1".to_string()]);
    }
}
