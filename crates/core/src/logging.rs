//! Centralized logging configuration for the cartridge subsystem.
//!
//! Bank controllers sit on the hottest path of an emulator (every memory access
//! goes through them), so logging is gated per category and per level with
//! atomics and the message is only formatted once the gate has passed.
//!
//! # Architecture
//!
//! - **LogConfig**: global configuration, one atomic level per category plus a
//!   global fallback level
//! - **LogLevel**: Off < Error < Warn < Info < Debug < Trace
//! - **LogCategory**: Cartridge (bank registers, RAM gating), Rtc, Battery, Bus
//! - **log()**: lazy entry point, rate limited per category
//!
//! Accepted messages are forwarded to the [`log`] crate facade, so whichever
//! logger the frontend installs (`env_logger` for the CLI) decides formatting
//! and destination.
//!
//! # Usage
//!
//! ```rust
//! use gbcart_core::logging::{log, LogCategory, LogLevel};
//!
//! log(LogCategory::Cartridge, LogLevel::Warn, || {
//!     format!("RAM read at {:04X} while disabled", 0xA000)
//! });
//! ```

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

const CATEGORY_COUNT: usize = 4;

/// Log level for controlling verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown log level: {0}")]
pub struct ParseLogLevelError(String);

impl FromStr for LogLevel {
    type Err = ParseLogLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" | "0" => Ok(LogLevel::Off),
            "error" | "err" | "1" => Ok(LogLevel::Error),
            "warn" | "warning" | "2" => Ok(LogLevel::Warn),
            "info" | "3" => Ok(LogLevel::Info),
            "debug" | "4" => Ok(LogLevel::Debug),
            "trace" | "5" => Ok(LogLevel::Trace),
            _ => Err(ParseLogLevelError(s.to_string())),
        }
    }
}

impl LogLevel {
    fn from_u8(val: u8) -> Self {
        match val {
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            5 => LogLevel::Trace,
            _ => LogLevel::Off,
        }
    }

    /// Matching level of the `log` facade, `None` for `Off`.
    fn facade_level(self) -> Option<::log::Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(::log::Level::Error),
            LogLevel::Warn => Some(::log::Level::Warn),
            LogLevel::Info => Some(::log::Level::Info),
            LogLevel::Debug => Some(::log::Level::Debug),
            LogLevel::Trace => Some(::log::Level::Trace),
        }
    }
}

/// Log category for the cartridge components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// Bank register writes, RAM enable gating, variant selection
    Cartridge,
    /// Real-time clock ticks, latching, fast-forward
    Rtc,
    /// Battery file open/load/flush
    Battery,
    /// Accesses routed to the shared I/O dispatcher
    Bus,
}

impl LogCategory {
    pub const ALL: [LogCategory; CATEGORY_COUNT] = [
        LogCategory::Cartridge,
        LogCategory::Rtc,
        LogCategory::Battery,
        LogCategory::Bus,
    ];

    fn index(self) -> usize {
        match self {
            LogCategory::Cartridge => 0,
            LogCategory::Rtc => 1,
            LogCategory::Battery => 2,
            LogCategory::Bus => 3,
        }
    }

    /// Target string handed to the `log` facade.
    pub fn target(self) -> &'static str {
        match self {
            LogCategory::Cartridge => "gbcart::cartridge",
            LogCategory::Rtc => "gbcart::rtc",
            LogCategory::Battery => "gbcart::battery",
            LogCategory::Bus => "gbcart::bus",
        }
    }
}

impl FromStr for LogCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cartridge" | "cart" | "mbc" => Ok(LogCategory::Cartridge),
            "rtc" | "clock" => Ok(LogCategory::Rtc),
            "battery" | "save" => Ok(LogCategory::Battery),
            "bus" | "io" => Ok(LogCategory::Bus),
            other => Err(format!("unknown log category: {}", other)),
        }
    }
}

/// Per-category window state of the rate limiter
#[derive(Default)]
struct Window {
    started: Option<Instant>,
    emitted: usize,
    dropped: usize,
}

/// Fixed one-second window per category.
///
/// Once a category exceeds its budget the rest of the window is dropped and the
/// number of dropped messages is reported when the next window opens.
struct RateLimiter {
    max_per_second: AtomicUsize,
    windows: Mutex<[Window; CATEGORY_COUNT]>,
}

impl RateLimiter {
    fn new(max_per_second: usize) -> Self {
        Self {
            max_per_second: AtomicUsize::new(max_per_second),
            windows: Mutex::new(Default::default()),
        }
    }

    /// Returns whether to emit, and how many messages were dropped in the
    /// window that just closed (if any).
    fn admit(&self, category: LogCategory, now: Instant) -> (bool, Option<usize>) {
        let max = self.max_per_second.load(Ordering::Relaxed);
        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let window = &mut windows[category.index()];

        let mut report = None;
        let expired = window
            .started
            .map_or(true, |start| now.duration_since(start) >= Duration::from_secs(1));
        if expired {
            if window.dropped > 0 {
                report = Some(window.dropped);
            }
            *window = Window {
                started: Some(now),
                emitted: 0,
                dropped: 0,
            };
        }

        if window.emitted < max {
            window.emitted += 1;
            (true, report)
        } else {
            window.dropped += 1;
            (false, report)
        }
    }
}

/// Global logging configuration
pub struct LogConfig {
    global_level: AtomicU8,
    category_levels: [AtomicU8; CATEGORY_COUNT],
    rate_limiter: RateLimiter,
}

impl LogConfig {
    /// Everything off, 60 messages per second per category.
    fn new() -> Self {
        Self {
            global_level: AtomicU8::new(LogLevel::Off as u8),
            category_levels: Default::default(),
            rate_limiter: RateLimiter::new(60),
        }
    }

    /// Get the global singleton instance
    pub fn global() -> &'static Self {
        static INSTANCE: OnceLock<LogConfig> = OnceLock::new();
        INSTANCE.get_or_init(LogConfig::new)
    }

    pub fn set_global_level(&self, level: LogLevel) {
        self.global_level.store(level as u8, Ordering::Relaxed);
    }

    pub fn global_level(&self) -> LogLevel {
        LogLevel::from_u8(self.global_level.load(Ordering::Relaxed))
    }

    pub fn set_level(&self, category: LogCategory, level: LogLevel) {
        self.category_levels[category.index()].store(level as u8, Ordering::Relaxed);
    }

    pub fn level(&self, category: LogCategory) -> LogLevel {
        LogLevel::from_u8(self.category_levels[category.index()].load(Ordering::Relaxed))
    }

    /// A category with its own level ignores the global one; a category left at
    /// `Off` falls back to the global level.
    pub fn should_log(&self, category: LogCategory, level: LogLevel) -> bool {
        if level == LogLevel::Off {
            return false;
        }
        let category_level = self.level(category);
        if category_level != LogLevel::Off {
            level <= category_level
        } else {
            level <= self.global_level()
        }
    }

    pub fn reset(&self) {
        self.set_global_level(LogLevel::Off);
        for category in LogCategory::ALL {
            self.set_level(category, LogLevel::Off);
        }
    }

    pub fn set_rate_limit(&self, max_per_second: usize) {
        self.rate_limiter
            .max_per_second
            .store(max_per_second, Ordering::Relaxed);
    }

    pub fn rate_limit(&self) -> usize {
        self.rate_limiter.max_per_second.load(Ordering::Relaxed)
    }

    fn emit(&self, category: LogCategory, level: LogLevel, message: &str) {
        if let Some(facade_level) = level.facade_level() {
            ::log::log!(target: category.target(), facade_level, "{}", message);
        }
    }
}

/// Log a message with the specified category and level.
///
/// The closure only runs when the category/level gate is open and the rate
/// limiter admits the message.
pub fn log<F>(category: LogCategory, level: LogLevel, message_fn: F)
where
    F: FnOnce() -> String,
{
    let config = LogConfig::global();
    if !config.should_log(category, level) {
        return;
    }

    let (allowed, dropped) = config.rate_limiter.admit(category, Instant::now());
    if let Some(count) = dropped {
        config.emit(
            category,
            LogLevel::Warn,
            &format!(
                "[{:?}] rate limit exceeded, {} message(s) dropped in the last second",
                category, count
            ),
        );
    }
    if allowed {
        config.emit(category, level, &message_fn());
    }
}
