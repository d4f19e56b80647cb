//! Stderr backend for the `log` facade.
//!
//! Installed once by the binary. The level comes from `-v` flags, or from the
//! `SSH_ENABLER_LOG` environment variable when no flag is given. Device transcripts and
//! failure hints go to stdout and the failure log; this backend only carries diagnostics.

use std::io::Write;
use std::str::FromStr;

use chrono::Local;
use log::{LevelFilter, Log, Metadata, Record};

/// Environment variable holding the default log level.
pub const LOG_ENV: &str = "SSH_ENABLER_LOG";

struct StderrLogger {
    level: LevelFilter,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(
            stderr,
            "{} [{}] {}: {}",
            Local::now().format("%H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Maps the number of `-v` flags to a level. Without flags only warnings are shown.
pub fn level_for_verbosity(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Resolves the effective level from flags and environment.
pub fn resolve_level(verbose: u8, env_value: Option<&str>) -> LevelFilter {
    if verbose > 0 {
        return level_for_verbosity(verbose);
    }
    env_value
        .and_then(|value| LevelFilter::from_str(value.trim()).ok())
        .unwrap_or(LevelFilter::Warn)
}

/// Installs the stderr logger. A second call leaves the first logger in place.
pub fn init(verbose: u8) -> LevelFilter {
    let env_value = std::env::var(LOG_ENV).ok();
    let level = resolve_level(verbose, env_value.as_deref());
    if log::set_boxed_logger(Box::new(StderrLogger { level })).is_ok() {
        log::set_max_level(level);
    }
    level
}
