//! Logging backend for the benchmark binary: plain lines on stderr.

use log::{Level, LevelFilter, Metadata, Record};
use std::io::Write;

/// Environment variable holding the level filter, e.g. `debug` or `trace`.
const LEVEL_VAR: &str = "COMPACT_TABLE_LOG";

struct Logger;

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let level_name = match record.level() {
            Level::Error => "error",
            Level::Warn => "warning",
            Level::Info => "info",
            Level::Debug => "debug",
            Level::Trace => "trace",
        };
        let module = record
            .module_path()
            .and_then(|path| path.split("::").last())
            .unwrap_or("unknown");
        //      [module] [level] Text
        let _ = writeln!(
            std::io::stderr().lock(),
            "[{module}] [{level_name}] {}",
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

static LOGGER: Logger = Logger;

/// Installs the stderr logger. Logging stays off unless `COMPACT_TABLE_LOG`
/// names a level.
pub fn init() {
    let level = std::env::var(LEVEL_VAR)
        .ok()
        .and_then(|value| value.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Off);

    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}
