//! Per-entity log files.
//!
//! With log isolation on (the default), each entity writes its own
//! `<entity>.log` inside its work directory so one noisy county does not
//! drown the console. With isolation off, entity messages go to the normal
//! logger instead.

use std::fs::File;
use std::io::Write as _;
use std::path::Path;
use std::sync::Mutex;

use chrono::Local;

/// A log sink for one entity's pipeline run.
#[derive(Debug)]
pub struct EntityLog {
    file: Option<Mutex<File>>,
}

impl EntityLog {
    /// Opens `<work_dir>/<entity>.log` (truncating any previous run) when
    /// `isolate` is set; otherwise messages route to the console logger.
    /// Failure to open the file degrades to console logging.
    #[must_use]
    pub fn create(work_dir: &Path, entity: &str, isolate: bool) -> Self {
        if !isolate {
            return Self { file: None };
        }

        if let Err(e) = std::fs::create_dir_all(work_dir) {
            log::warn!(
                "Could not create work directory {}: {e}",
                work_dir.display()
            );
        }

        let path = work_dir.join(format!("{entity}.log"));
        match File::create(&path) {
            Ok(file) => Self {
                file: Some(Mutex::new(file)),
            },
            Err(e) => {
                log::warn!("Could not open entity log {}: {e}", path.display());
                Self { file: None }
            }
        }
    }

    /// Logs at debug level.
    pub fn debug(&self, message: &str) {
        self.write("DEBUG", message);
    }

    /// Logs at info level.
    pub fn info(&self, message: &str) {
        self.write("INFO", message);
    }

    /// Logs at warning level.
    pub fn warn(&self, message: &str) {
        self.write("WARNING", message);
    }

    /// Logs at error level.
    pub fn error(&self, message: &str) {
        self.write("ERROR", message);
    }

    fn write(&self, level: &str, message: &str) {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = writeln!(
                    file,
                    "{} - {level} - {message}",
                    Local::now().format("%Y-%m-%d %H:%M:%S")
                );
            }
            return;
        }

        match level {
            "DEBUG" => log::debug!("{message}"),
            "WARNING" => log::warn!("{message}"),
            "ERROR" => log::error!("{message}"),
            _ => log::info!("{message}"),
        }
    }
}
