//! Structured kernel logging.
//!
//! Formats via `core::fmt`/`format_args!` into a fixed-size stack buffer and
//! forwards the bytes to the active [`crate::console::ConsoleSink`]. This
//! replaces a hand-rolled C-style `printf` over `VaList` (an unstable
//! nightly feature) with a safe, stable formatter that gives the same
//! external contract: an opaque byte sink receiving ASCII/UTF-8 text.

use core::fmt::{self, Write};
use core::sync::atomic::{AtomicU8, Ordering};

use crate::console;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum KlogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl KlogLevel {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => KlogLevel::Error,
            1 => KlogLevel::Warn,
            2 => KlogLevel::Info,
            3 => KlogLevel::Debug,
            _ => KlogLevel::Trace,
        }
    }

    fn tag(self) -> &'static str {
        match self {
            KlogLevel::Error => "ERROR",
            KlogLevel::Warn => "WARN",
            KlogLevel::Info => "INFO",
            KlogLevel::Debug => "DEBUG",
            KlogLevel::Trace => "TRACE",
        }
    }
}

static CURRENT_LEVEL: AtomicU8 = AtomicU8::new(KlogLevel::Info as u8);

pub fn klog_set_level(level: KlogLevel) {
    CURRENT_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn klog_get_level() -> KlogLevel {
    KlogLevel::from_raw(CURRENT_LEVEL.load(Ordering::Relaxed))
}

#[inline]
pub fn klog_is_enabled(level: KlogLevel) -> bool {
    (level as u8) <= CURRENT_LEVEL.load(Ordering::Relaxed)
}

/// Fixed-capacity formatting buffer. A message that overflows it is
/// truncated rather than allocating or panicking, since `klog` must stay
/// usable from the allocator's own error path.
const LINE_BUF_LEN: usize = 256;

struct LineBuf {
    buf: [u8; LINE_BUF_LEN],
    len: usize,
}

impl LineBuf {
    fn new() -> Self {
        Self {
            buf: [0; LINE_BUF_LEN],
            len: 0,
        }
    }

    fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl Write for LineBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let bytes = s.as_bytes();
        let space = LINE_BUF_LEN - self.len;
        let n = bytes.len().min(space);
        self.buf[self.len..self.len + n].copy_from_slice(&bytes[..n]);
        self.len += n;
        Ok(())
    }
}

/// Formats `args` at `level` and writes `"[TAG] <message>\n"` to the active
/// console sink if the level is enabled. Not called directly; use the
/// `klog_error!`/`klog_warn!`/... macros.
pub fn klog_write(level: KlogLevel, args: fmt::Arguments<'_>) {
    if !klog_is_enabled(level) {
        return;
    }
    let mut line = LineBuf::new();
    let _ = write!(line, "[{}] ", level.tag());
    let _ = line.write_fmt(args);
    let _ = line.write_str("\n");
    console::sink().write_bytes(line.as_bytes());
}

#[macro_export]
macro_rules! klog_error {
    ($($arg:tt)*) => {
        $crate::klog::klog_write($crate::klog::KlogLevel::Error, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! klog_warn {
    ($($arg:tt)*) => {
        $crate::klog::klog_write($crate::klog::KlogLevel::Warn, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! klog_info {
    ($($arg:tt)*) => {
        $crate::klog::klog_write($crate::klog::KlogLevel::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! klog_debug {
    ($($arg:tt)*) => {
        $crate::klog::klog_write($crate::klog::KlogLevel::Debug, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! klog_trace {
    ($($arg:tt)*) => {
        $crate::klog::klog_write($crate::klog::KlogLevel::Trace, format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;

    #[test]
    fn level_gating() {
        klog_set_level(KlogLevel::Warn);
        assert!(klog_is_enabled(KlogLevel::Error));
        assert!(klog_is_enabled(KlogLevel::Warn));
        assert!(!klog_is_enabled(KlogLevel::Info));
        klog_set_level(KlogLevel::Info);
    }

    #[test]
    fn truncates_overlong_lines() {
        let mut buf = LineBuf::new();
        let long = "x".repeat(LINE_BUF_LEN * 2);
        let _ = buf.write_str(&long);
        assert_eq!(buf.len, LINE_BUF_LEN);
    }
}
