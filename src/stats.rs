//! Module: stats
//!
//! Purpose: Running counters for the protocol engine. Decode failures are
//! absorbed locally by design; the counters keep the evidence so the
//! diagnostics collaborators (HTTP status page, console) can report it.
//!
//! Counters only ever increase. Snapshots are taken from the main loop;
//! increments happen there too, so `Relaxed` ordering is enough.
//!
//! Safety: Safe. Atomics only.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::decoder::DecodeError;

/// Event counters since boot.
pub struct EngineStats {
    frames_decoded: AtomicU32,
    overruns: AtomicU32,
    unrecognized_lengths: AtomicU32,
    parity_failures: AtomicU32,
    transmissions: AtomicU32,
    transmit_rejects: AtomicU32,
    jam_sessions: AtomicU32,
}

impl EngineStats {
    pub const fn new() -> Self {
        Self {
            frames_decoded: AtomicU32::new(0),
            overruns: AtomicU32::new(0),
            unrecognized_lengths: AtomicU32::new(0),
            parity_failures: AtomicU32::new(0),
            transmissions: AtomicU32::new(0),
            transmit_rejects: AtomicU32::new(0),
            jam_sessions: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn record_frame(&self) {
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_decode_error(&self, error: &DecodeError) {
        let counter = match error {
            DecodeError::Overrun(_) => &self.overruns,
            DecodeError::UnrecognizedLength(_) => &self.unrecognized_lengths,
            DecodeError::Parity(_) => &self.parity_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_transmission(&self) {
        self.transmissions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_transmit_reject(&self) {
        self.transmit_rejects.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_jam_session(&self) {
        self.jam_sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            unrecognized_lengths: self.unrecognized_lengths.load(Ordering::Relaxed),
            parity_failures: self.parity_failures.load(Ordering::Relaxed),
            transmissions: self.transmissions.load(Ordering::Relaxed),
            transmit_rejects: self.transmit_rejects.load(Ordering::Relaxed),
            jam_sessions: self.jam_sessions.load(Ordering::Relaxed),
        }
    }
}

impl Default for EngineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Counter values at one point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub frames_decoded: u32,
    pub overruns: u32,
    pub unrecognized_lengths: u32,
    pub parity_failures: u32,
    pub transmissions: u32,
    pub transmit_rejects: u32,
    pub jam_sessions: u32,
}

impl StatsSnapshot {
    /// Total decode failures of any kind.
    pub fn decode_errors(&self) -> u32 {
        self.overruns + self.unrecognized_lengths + self.parity_failures
    }
}
