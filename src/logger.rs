use std::io::Write;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use parking_lot::Mutex;

struct StderrLogger {
    file: Option<Mutex<std::fs::File>>,
    filter: LevelFilter,
    start: Instant,
}

impl StderrLogger {
    fn line(&self, record: &Record) -> String {
        let elapsed = self.start.elapsed().as_secs_f64();
        format!(
            "[{elapsed:.3}s] [{}] {} — {}",
            record.level(),
            record.target(),
            record.args()
        )
    }
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.filter
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = self.line(record);
        let _ = writeln!(std::io::stderr().lock(), "{line}");
        if let Some(ref file) = self.file {
            let _ = writeln!(file.lock(), "{line}");
        }
    }

    fn flush(&self) {
        if let Some(ref file) = self.file {
            let _ = file.lock().flush();
        }
    }
}

/// Level filter from `RUST_LOG`, falling back to `default`.
#[must_use]
pub fn env_filter(default: LevelFilter) -> LevelFilter {
    std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Install the global logger writing to stderr and, if given, to `log_file`.
///
/// # Errors
///
/// Returns `SetLoggerError` if a logger was already installed.
pub fn init(log_file: Option<std::fs::File>, default: LevelFilter) -> Result<(), SetLoggerError> {
    let filter = env_filter(default);
    let logger = StderrLogger {
        file: log_file.map(Mutex::new),
        filter,
        start: Instant::now(),
    };
    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(filter);
    Ok(())
}
