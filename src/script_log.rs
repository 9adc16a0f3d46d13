//! Script logging.
//!
//! Backs the `log(message)` capability as well as `print`/`debug`, which are
//! redirected here instead of writing to stdout. Messages go through the `log`
//! facade on the `script` target, capped per frame to prevent spam.

use std::cell::Cell;

/// Default maximum number of log messages allowed per frame.
pub const DEFAULT_MAX_LOGS_PER_FRAME: u32 = 100;

// Per-thread: scripts only run on the thread that drives frames.
thread_local! {
    static MAX_LOGS_PER_FRAME: Cell<u32> = const { Cell::new(DEFAULT_MAX_LOGS_PER_FRAME) };
    /// Messages logged in the current frame.
    static LOG_COUNT: Cell<u32> = const { Cell::new(0) };
    /// Whether we've already warned about exceeding the log limit this frame.
    static WARNED_LIMIT: Cell<bool> = const { Cell::new(false) };
}

/// Log level for script messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Debug,
    Warn,
}

impl LogLevel {
    fn level(&self) -> log::Level {
        match self {
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Warn => log::Level::Warn,
        }
    }
}

/// Reset the per-frame log counter and set the cap for the coming frame.
/// Call this at the start of each frame.
pub fn reset_frame_log_count(limit: u32) {
    MAX_LOGS_PER_FRAME.with(|m| m.set(limit));
    LOG_COUNT.with(|c| c.set(0));
    WARNED_LIMIT.with(|w| w.set(false));
}

/// Check if we can log another message this frame.
fn can_log() -> bool {
    let limit = MAX_LOGS_PER_FRAME.with(Cell::get);
    let count = LOG_COUNT.with(|c| {
        let n = c.get();
        c.set(n.saturating_add(1));
        n
    });
    if count >= limit {
        // Only warn once per frame about exceeding limit
        if !WARNED_LIMIT.with(|w| w.replace(true)) {
            emit_log(
                LogLevel::Warn,
                &format!(
                    "Script log limit exceeded ({} messages/frame). Further logs dropped.",
                    limit
                ),
            );
        }
        false
    } else {
        true
    }
}

fn emit_log(level: LogLevel, message: &str) {
    log::log!(target: "script", level.level(), "{}", message);
}

/// Log a message from a script, respecting the per-frame limit.
pub fn script_log(level: LogLevel, message: &str) {
    if can_log() {
        emit_log(level, message);
    }
}

/// Convert a Rhai Dynamic value to a string safely.
/// Never panics, handles all types gracefully.
pub fn stringify_dynamic(value: &rhai::Dynamic) -> String {
    if let Ok(s) = value.clone().into_string() {
        return s;
    }

    if value.is_array() {
        if let Some(arr) = value.clone().try_cast::<rhai::Array>() {
            let parts: Vec<String> = arr.iter().map(stringify_dynamic).collect();
            return parts.join(" ");
        }
    }

    if value.is_map() {
        if let Some(map) = value.clone().try_cast::<rhai::Map>() {
            let parts: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", k, stringify_dynamic(v)))
                .collect();
            return format!("{{{}}}", parts.join(", "));
        }
    }

    if let Ok(i) = value.as_int() {
        return i.to_string();
    }

    if let Ok(f) = value.as_float() {
        return format!("{}", f);
    }

    if let Ok(b) = value.as_bool() {
        return b.to_string();
    }

    if value.is_unit() {
        return "()".to_string();
    }

    format!("{:?}", value)
}
