//! Module: jammer
//!
//! Purpose: Anti-cloning countermeasure. Draining D0 low corrupts every
//! legitimate frame on the shared line: downstream readers see a stream of
//! zero bits folded into whatever the card sends, and nothing decodes.
//!
//! Coordination with the capture path: the monitor is told to ignore D0
//! before the drain is asserted, so the controller's own line manipulation
//! never reads back as bit events. D1 edges still accumulate while
//! draining and fail decode downstream, which is the point.
//!
//! Safety: Safe. State is one atomic, written only from the main loop; the
//! asserted line level is read by hardware, not polled by software.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::hal::DataLine;
use crate::monitor::LineMonitor;

/// Drain controller for the D0 line.
///
/// `enable`/`disable` are idempotent and safe in any order or repetition;
/// the line is always restorable to the released state.
pub struct Jammer {
    draining: AtomicBool,
}

impl Jammer {
    pub const fn new() -> Self {
        Self {
            draining: AtomicBool::new(false),
        }
    }

    /// Assert the drain: suppress D0 capture, then hold the line low.
    ///
    /// Already draining is a no-op. On a line fault the state rolls back
    /// to released so a retry starts clean.
    pub fn enable<L: DataLine>(
        &self,
        d0: &mut L,
        monitor: &LineMonitor,
    ) -> Result<(), L::Error> {
        if self.draining.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        // Suppress before driving: the falling edge we cause must not be
        // captured as a bit.
        monitor.set_suppress_d0(true);
        if let Err(e) = d0.drive_low() {
            monitor.set_suppress_d0(false);
            self.draining.store(false, Ordering::Release);
            return Err(e);
        }
        Ok(())
    }

    /// Release the drain and restore normal input operation.
    ///
    /// Not draining is a no-op.
    pub fn disable<L: DataLine>(
        &self,
        d0: &mut L,
        monitor: &LineMonitor,
    ) -> Result<(), L::Error> {
        if !self.draining.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        if let Err(e) = d0.release() {
            self.draining.store(true, Ordering::Release);
            return Err(e);
        }
        monitor.set_suppress_d0(false);
        Ok(())
    }

    #[inline]
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }
}

impl Default for Jammer {
    fn default() -> Self {
        Self::new()
    }
}
