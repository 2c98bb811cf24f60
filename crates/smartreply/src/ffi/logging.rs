//! `log` backend that forwards records to the host through [`LogCallback`]
//!
//! Android apps have no stderr worth reading, so everything the engine logs
//! is handed to Kotlin and written to logcat there.

use std::sync::{Arc, OnceLock, RwLock};

use log::{Level, Log, Metadata, Record, SetLoggerError};

use super::types::{FfiLogLevel, LogCallback};

static FFI_LOGGER: OnceLock<CallbackLogger> = OnceLock::new();

struct CallbackLogger {
    callback: RwLock<Option<Arc<dyn LogCallback>>>,
    max_level: RwLock<Level>,
}

impl CallbackLogger {
    fn new(max_level: Level) -> Self {
        Self {
            callback: RwLock::new(None),
            max_level: RwLock::new(max_level),
        }
    }

    fn set_callback(&self, callback: Option<Arc<dyn LogCallback>>) {
        if let Ok(mut guard) = self.callback.write() {
            *guard = callback;
        }
    }

    fn set_max_level(&self, level: Level) {
        if let Ok(mut guard) = self.max_level.write() {
            *guard = level;
        }
    }

    fn max_level(&self) -> Level {
        self.max_level.read().map(|l| *l).unwrap_or(Level::Info)
    }
}

impl Log for CallbackLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level()
            && self.callback.read().ok().is_some_and(|cb| cb.is_some())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Ok(guard) = self.callback.read() {
            if let Some(callback) = guard.as_ref() {
                // Never log from here; the callback may re-enter the logger
                callback.on_log(
                    FfiLogLevel::from(record.level()),
                    record.target().to_string(),
                    record.args().to_string(),
                );
            }
        }
    }

    fn flush(&self) {}
}

/// Install the callback logger as the global `log` backend
///
/// Fails if another logger (e.g. env_logger in a test binary) is already
/// installed. The callback can be replaced later with [`set_log_callback`].
pub fn install_logger(max_level: Level) -> Result<(), SetLoggerError> {
    let logger = FFI_LOGGER.get_or_init(|| CallbackLogger::new(max_level));
    log::set_logger(logger)?;
    log::set_max_level(max_level.to_level_filter());
    Ok(())
}

/// Replace the callback receiving records; `None` drops them
pub fn set_log_callback(callback: Option<Arc<dyn LogCallback>>) {
    if let Some(logger) = FFI_LOGGER.get() {
        logger.set_callback(callback);
    }
}

/// Route engine logs to `callback`
///
/// Safe to call more than once: later calls swap the callback and level.
#[uniffi::export]
pub fn init_logging(callback: Box<dyn LogCallback>, max_level: FfiLogLevel) {
    let level = Level::from(max_level);
    if FFI_LOGGER.get().is_none() {
        // A second installer racing us only means a logger is already set
        let _ = install_logger(level);
    }
    set_log_callback(Some(Arc::from(callback)));
    set_log_level(max_level);
}

/// Change the maximum level forwarded to the callback
#[uniffi::export]
pub fn set_log_level(max_level: FfiLogLevel) {
    let level = Level::from(max_level);
    if let Some(logger) = FFI_LOGGER.get() {
        logger.set_max_level(level);
        log::set_max_level(level.to_level_filter());
    }
}
