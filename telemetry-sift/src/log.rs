// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::{
    fmt::{self, Display},
    mem,
    str::FromStr,
    sync::atomic::{AtomicUsize, Ordering},
};

static MAX_LOG_LEVEL: AtomicUsize = AtomicUsize::new(LogLevelFilter::Info as usize);

pub fn set_max_level(lvl: LogLevelFilter) {
    MAX_LOG_LEVEL.store(lvl as usize, Ordering::Relaxed)
}

pub fn max_level() -> LogLevelFilter {
    unsafe { mem::transmute(MAX_LOG_LEVEL.load(Ordering::Relaxed)) }
}

#[repr(usize)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd)]
#[non_exhaustive]
/// The level at which the library will log.
///
/// The processor handles log telemetry itself, so its own diagnostics go
/// straight to stdout/stderr instead of through any log pipeline it might be
/// filtering.
pub enum LogLevelFilter {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

impl FromStr for LogLevelFilter {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("debug") {
            Ok(LogLevelFilter::Debug)
        } else if s.eq_ignore_ascii_case("info") {
            Ok(LogLevelFilter::Info)
        } else if s.eq_ignore_ascii_case("warn") {
            Ok(LogLevelFilter::Warn)
        } else if s.eq_ignore_ascii_case("error") {
            Ok(LogLevelFilter::Error)
        } else if s.eq_ignore_ascii_case("off") {
            Ok(LogLevelFilter::Off)
        } else {
            Err("log level should be one of DEBUG, INFO, WARN, ERROR, OFF")
        }
    }
}

impl Display for LogLevelFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let filter = match self {
            LogLevelFilter::Debug => "DEBUG",
            LogLevelFilter::Info => "INFO",
            LogLevelFilter::Warn => "WARN",
            LogLevelFilter::Error => "ERROR",
            LogLevelFilter::Off => "OFF",
        };

        write!(f, "{filter}")
    }
}

#[repr(usize)]
#[derive(Copy, Clone, Debug, Hash)]
pub enum Level {
    Error = 1, // this value must match with LogLevelFilter::Error
    Warn,
    Info,
    Debug,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        };

        write!(f, "{level}")
    }
}

impl PartialEq<LogLevelFilter> for Level {
    #[inline]
    fn eq(&self, other: &LogLevelFilter) -> bool {
        (*self as usize) == (*other as usize)
    }
}

impl PartialOrd<LogLevelFilter> for Level {
    #[inline]
    fn partial_cmp(&self, other: &LogLevelFilter) -> Option<std::cmp::Ordering> {
        Some((*self as usize).cmp(&(*other as usize)))
    }
}

#[macro_export]
macro_rules! sift_debug {
    // sift_debug!("a {} event", "log")
    ($($arg:tt)+) => {
      $crate::sift_log!($crate::log::Level::Debug, $($arg)*)
    };
}

#[macro_export]
macro_rules! sift_info {
  // sift_info!("a {} event", "log")
  ($($arg:tt)+) => {
    $crate::sift_log!($crate::log::Level::Info, $($arg)*)
  };
}

#[macro_export]
macro_rules! sift_warn {
  // sift_warn!("a {} event", "log")
  ($($arg:tt)+) => {
    $crate::sift_log!($crate::log::Level::Warn, $($arg)*)
  };
}

#[macro_export]
macro_rules! sift_error {
  // sift_error!("a {} event", "log")
  ($($arg:tt)+) => {
    $crate::sift_log!($crate::log::Level::Error, $($arg)*)
  };
}

#[macro_export]
macro_rules! sift_log {
    ($lvl:expr, $($arg:tt)+) => {
      let lvl = $lvl;
      if lvl <= $crate::log::max_level() {
        if lvl == $crate::log::LogLevelFilter::Error {
          eprintln!("\x1b[91mERROR\x1b[0m {}:{} - {}", file!(), line!(), format!($($arg)*));
        } else {
          println!("\x1b[93m{}\x1b[0m {}:{} - {}", lvl, file!(), line!(), format!($($arg)*));
        }
      }
    };
}
