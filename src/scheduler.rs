//! Fan-out of one [`PatchEngine`] per target file.

use log::Level;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::engine::{EngineOptions, PatchEngine, PatchResult};
use crate::error::PatchError;
use crate::logging::Logger;
use crate::pattern::Pattern;

pub struct Scheduler {
    temp_dir: PathBuf,
    patterns: Arc<[Pattern]>,
    options: EngineOptions,
    logger: Logger,
}

impl Scheduler {
    pub fn new(temp_dir: impl Into<PathBuf>, patterns: Vec<Pattern>, options: EngineOptions) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            patterns: patterns.into(),
            options,
            logger: Logger::installed(),
        }
    }

    /// Logger handed to every engine this scheduler starts.
    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    /// Start one blocking task per path and return the channel results arrive on.
    ///
    /// Exactly one [`PatchResult`] is sent per input path, in completion order.
    /// Side files are named after the base name, so a path whose base name was
    /// already claimed earlier in `paths` is answered with
    /// [`PatchError::DuplicateName`] instead of being run.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn dispatch(&self, paths: Vec<PathBuf>) -> mpsc::UnboundedReceiver<PatchResult> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut claimed: HashMap<OsString, PathBuf> = HashMap::new();

        for path in paths {
            let name = path.file_name().map(OsString::from).unwrap_or_default();
            if let Some(other) = claimed.get(&name) {
                let err = PatchError::DuplicateName {
                    name: name.to_string_lossy().into_owned(),
                    other: other.clone(),
                };
                self.logger
                    .log(Level::Warn, format_args!("{}: {}", path.display(), err));
                let _ = tx.send(PatchResult {
                    path,
                    outcome: Err(err),
                });
                continue;
            }
            claimed.insert(name, path.clone());

            let engine = PatchEngine::new(self.temp_dir.clone(), path, self.options.clone())
                .with_logger(self.logger.clone());
            let logger = self.logger.clone();
            let patterns = Arc::clone(&self.patterns);
            let tx = tx.clone();

            tokio::task::spawn_blocking(move || {
                let result = engine.patch(&patterns);
                if let Some(err) = result.error() {
                    logger.log(Level::Warn, format_args!("{}: {}", result.path.display(), err));
                }
                // The receiver may have been dropped; nothing left to report to.
                let _ = tx.send(result);
            });
        }

        rx
    }

    /// Dispatch all paths and wait for every result.
    pub async fn run(&self, paths: Vec<PathBuf>) -> Vec<PatchResult> {
        let mut rx = self.dispatch(paths);
        let mut results = Vec::new();
        while let Some(result) = rx.recv().await {
            results.push(result);
        }
        results
    }
}
