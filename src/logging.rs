//! Module: logging
//!
//! Purpose: Best-effort event log for the protocol engine.
//!
//! ```text
//! main loop ──tap_info!()──▶ LogRing ──pop()──▶ sink collaborator
//!             never blocks    fixed size         (file, syslog, display)
//! ```
//!
//! The engine's contract with its log sink is strictly best-effort: a push
//! never blocks, a full ring drops the line and counts the drop, and the
//! far end drains at its leisure. Nothing in the capture ISR logs at all;
//! every line here originates on the cooperative main loop.
//!
//! Single-writer rules: `push` is called only from the main loop, `pop`
//! only from the draining collaborator. The ring supports exactly that
//! SPSC shape.
//!
//! Safety: `UnsafeCell` slots are safe under the SPSC discipline: the
//! producer writes a slot before publishing it via `write_idx` (Release),
//! the consumer reads it after observing the index (Acquire).

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU32, Ordering};

/// Longest log line kept; longer text is truncated.
pub const MAX_LINE_LEN: usize = 96;

/// Default ring capacity.
pub const LOG_RING_SIZE: usize = 64;

/// Log severity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

/// One buffered log line.
#[derive(Clone)]
pub struct LogLine {
    /// Milliseconds since boot when the line was pushed.
    pub timestamp_ms: u32,
    pub level: LogLevel,
    pub text: heapless::String<MAX_LINE_LEN>,
}

impl LogLine {
    const EMPTY: Self = Self {
        timestamp_ms: 0,
        level: LogLevel::Info,
        text: heapless::String::new(),
    };
}

/// Fixed-capacity single-producer single-consumer log ring.
///
/// Drop-on-full: the engine never waits for its log sink.
pub struct LogRing<const N: usize = LOG_RING_SIZE> {
    lines: UnsafeCell<[LogLine; N]>,
    write_idx: AtomicU32,
    read_idx: AtomicU32,
    dropped: AtomicU32,
}

// SAFETY: One producer, one consumer, both coordinating through the atomic
// indices with Release/Acquire pairs. A slot is never written and read
// concurrently under that discipline.
unsafe impl<const N: usize> Sync for LogRing<N> {}
unsafe impl<const N: usize> Send for LogRing<N> {}

impl<const N: usize> LogRing<N> {
    const MASK: usize = N - 1;

    pub const fn new() -> Self {
        assert!(N.is_power_of_two(), "Log ring size must be power of 2");

        Self {
            lines: UnsafeCell::new([LogLine::EMPTY; N]),
            write_idx: AtomicU32::new(0),
            read_idx: AtomicU32::new(0),
            dropped: AtomicU32::new(0),
        }
    }

    /// Queue a line. Returns `false` (and counts the drop) when full.
    ///
    /// Never blocks. Truncates `text` to [`MAX_LINE_LEN`].
    pub fn push(&self, timestamp_ms: u32, level: LogLevel, text: &str) -> bool {
        let write = self.write_idx.load(Ordering::Relaxed);
        let read = self.read_idx.load(Ordering::Acquire);

        if write.wrapping_sub(read) >= N as u32 {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let idx = (write as usize) & Self::MASK;
        let mut line = heapless::String::new();
        let take = truncation_boundary(text, MAX_LINE_LEN);
        // Cannot fail: the slice fits the capacity.
        let _ = line.push_str(&text[..take]);

        // SAFETY: Single producer; the consumer will not touch this slot
        // until write_idx is published below.
        unsafe {
            (*self.lines.get())[idx] = LogLine {
                timestamp_ms,
                level,
                text: line,
            };
        }

        self.write_idx.store(write.wrapping_add(1), Ordering::Release);
        true
    }

    /// Take the oldest line, if any. Consumer side.
    pub fn pop(&self) -> Option<LogLine> {
        let read = self.read_idx.load(Ordering::Relaxed);
        let write = self.write_idx.load(Ordering::Acquire);

        if read == write {
            return None;
        }

        let idx = (read as usize) & Self::MASK;
        // SAFETY: Single consumer; the slot was published by the producer's
        // Release store observed above.
        let line = unsafe { (*self.lines.get())[idx].clone() };

        self.read_idx.store(read.wrapping_add(1), Ordering::Release);
        Some(line)
    }

    /// Lines waiting to be drained.
    pub fn pending(&self) -> u32 {
        let read = self.read_idx.load(Ordering::Relaxed);
        let write = self.write_idx.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    /// Lines lost to a full ring since boot.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<const N: usize> Default for LogRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Largest prefix length `<= max` that ends on a char boundary.
fn truncation_boundary(text: &str, max: usize) -> usize {
    if text.len() <= max {
        return text.len();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    end
}

/// Format into a stack buffer, then push. See the `tap_*` macros.
pub struct LineWriter {
    buf: [u8; MAX_LINE_LEN],
    pos: usize,
}

impl LineWriter {
    pub const fn new() -> Self {
        Self {
            buf: [0; MAX_LINE_LEN],
            pos: 0,
        }
    }

    pub fn as_str(&self) -> &str {
        // Only ever filled from write_str with valid UTF-8 prefixes.
        core::str::from_utf8(&self.buf[..self.pos]).unwrap_or("")
    }
}

impl Default for LineWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Write for LineWriter {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let bytes = s.as_bytes();
        let remaining = self.buf.len() - self.pos;
        let take = truncation_boundary(s, remaining.min(bytes.len()));
        self.buf[self.pos..self.pos + take].copy_from_slice(&bytes[..take]);
        self.pos += take;
        Ok(())
    }
}

/// Push a formatted line into a [`LogRing`]; never blocks, may drop.
#[macro_export]
macro_rules! tap_log {
    ($level:expr, $ring:expr, $now_ms:expr, $($arg:tt)*) => {{
        use core::fmt::Write as _;
        let mut w = $crate::logging::LineWriter::new();
        let _ = write!(w, $($arg)*);
        $ring.push($now_ms, $level, w.as_str());
    }};
}

#[macro_export]
macro_rules! tap_info {
    ($ring:expr, $now_ms:expr, $($arg:tt)*) => {
        $crate::tap_log!($crate::logging::LogLevel::Info, $ring, $now_ms, $($arg)*)
    };
}

#[macro_export]
macro_rules! tap_warn {
    ($ring:expr, $now_ms:expr, $($arg:tt)*) => {
        $crate::tap_log!($crate::logging::LogLevel::Warn, $ring, $now_ms, $($arg)*)
    };
}

#[macro_export]
macro_rules! tap_error {
    ($ring:expr, $now_ms:expr, $($arg:tt)*) => {
        $crate::tap_log!($crate::logging::LogLevel::Error, $ring, $now_ms, $($arg)*)
    };
}

#[macro_export]
macro_rules! tap_debug {
    ($ring:expr, $now_ms:expr, $($arg:tt)*) => {
        $crate::tap_log!($crate::logging::LogLevel::Debug, $ring, $now_ms, $($arg)*)
    };
}
