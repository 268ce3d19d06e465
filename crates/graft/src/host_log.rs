//! Bridge from the `log` facade to the host engine's log callback.

use std::ffi::{c_char, CString};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;

use log::{Level, LevelFilter, Log, Metadata, Record};

/// Host log callback: `(level, null-terminated utf-8 message)`.
pub type LogCallback = unsafe extern "system" fn(level: i32, message: *const c_char);

// Host-side log type values.
const LEVEL_ERROR: i32 = 0;
const LEVEL_WARNING: i32 = 2;
const LEVEL_LOG: i32 = 3;

struct HostLogger {
    /// The callback as a usize; 0 means none installed.
    callback: AtomicUsize,
}

static LOGGER: HostLogger = HostLogger { callback: AtomicUsize::new(0) };

impl Log for HostLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        self.callback.load(Ordering::Acquire) != 0
    }

    fn log(&self, record: &Record) {
        let callback = self.callback.load(Ordering::Acquire);
        if callback == 0 {
            return;
        }
        let callback: LogCallback = unsafe { std::mem::transmute(callback) };
        let level = match record.level() {
            Level::Error => LEVEL_ERROR,
            Level::Warn => LEVEL_WARNING,
            _ => LEVEL_LOG,
        };
        if let Ok(message) = CString::new(format!("[graft] {}", record.args())) {
            unsafe { callback(level, message.as_ptr()) };
        }
    }

    fn flush(&self) {}
}

/// Installs (or swaps) the host callback behind the `log` facade. The facade
/// itself is registered on first use and stays registered for the process.
pub fn install(callback: Option<LogCallback>) {
    LOGGER.callback.store(callback.map_or(0, |f| f as usize), Ordering::Release);

    static REGISTER: Once = Once::new();
    REGISTER.call_once(|| {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(LevelFilter::Trace);
        }
    });
}
