//! Module: accumulator
//!
//! Purpose: The one piece of state shared between interrupt and main-loop
//! context. Edges append bits here from the ISR; the decoder drains the
//! whole buffer in one copy-and-clear once the line has gone quiet.
//!
//! ```text
//! ISR (on_edge) ──record()──▶ FrameAccumulator ──take_if_quiet()──▶ decoder
//!                              fixed capacity,
//!                              critical-section guarded
//! ```
//!
//! Architecture:
//! - Bits live in a single `u64`, first-arrived bit in the highest occupied
//!   position. Capacity is [`MAX_FRAME_BITS`]; an append past capacity sets
//!   the overrun flag and drops the bit. Memory use is bounded no matter
//!   what arrives on the line.
//! - The buffer itself sits behind `critical_section::Mutex<RefCell<..>>`.
//!   Both sides keep the section to a handful of instructions: the ISR
//!   appends one bit, the drain copies 10 bytes and clears. Decoding never
//!   happens inside the section.
//! - `last_edge_us` / `pending` are atomics so the poll path can answer
//!   "anything to do?" without masking interrupts at all.
//!
//! Safety: No unsafe. Interior mutability is confined to the
//! critical-section mutex and atomics.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use critical_section::Mutex;
use portable_atomic::AtomicU64;

use crate::config::MAX_FRAME_BITS;
use crate::event::BitEvent;

/// The accumulator contents, drained in one atomic copy-and-clear.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSnapshot {
    /// Accumulated bits, first-arrived in the most significant occupied
    /// position (`bits >> (count - 1)` is the first bit on the wire).
    pub bits: u64,

    /// Number of valid bits in `bits`.
    pub count: u8,

    /// More than [`MAX_FRAME_BITS`] arrived before the silence gap.
    pub overflowed: bool,
}

impl FrameSnapshot {
    pub const EMPTY: Self = Self {
        bits: 0,
        count: 0,
        overflowed: false,
    };

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.count == 0 && !self.overflowed
    }

    /// Bit value at arrival-order position `i` (0 = first on the wire).
    ///
    /// # Panics
    ///
    /// Panics if `i >= count`. Callers index within `count`.
    #[inline]
    pub fn bit(&self, i: u8) -> u8 {
        assert!(i < self.count);
        ((self.bits >> (self.count - 1 - i)) & 1) as u8
    }
}

/// Fixed-capacity bit buffer. Only ever touched inside the critical
/// section.
struct BitBuffer {
    bits: u64,
    count: u8,
    overflowed: bool,
}

impl BitBuffer {
    const EMPTY: Self = Self {
        bits: 0,
        count: 0,
        overflowed: false,
    };

    #[inline]
    fn push(&mut self, bit: u8) {
        if self.count >= MAX_FRAME_BITS {
            self.overflowed = true;
            return;
        }
        self.bits = (self.bits << 1) | (bit & 1) as u64;
        self.count += 1;
    }

    #[inline]
    fn take(&mut self) -> FrameSnapshot {
        let snap = FrameSnapshot {
            bits: self.bits,
            count: self.count,
            overflowed: self.overflowed,
        };
        *self = Self::EMPTY;
        snap
    }
}

/// ISR-fed frame buffer with silence-gap draining.
///
/// Single writer rules: `record` is called only from the ISR path,
/// `take_if_quiet`/`clear` only from the main loop. The critical section
/// makes the two sides atomic with respect to each other.
pub struct FrameAccumulator {
    buf: Mutex<RefCell<BitBuffer>>,
    last_edge_us: AtomicU64,
    pending: AtomicBool,
}

impl FrameAccumulator {
    pub const fn new() -> Self {
        Self {
            buf: Mutex::new(RefCell::new(BitBuffer::EMPTY)),
            last_edge_us: AtomicU64::new(0),
            pending: AtomicBool::new(false),
        }
    }

    /// Append one observed edge. ISR path: bounded time, no allocation,
    /// no logging.
    ///
    /// # Timing
    ///
    /// One critical-section entry plus two atomic stores, O(1).
    #[inline]
    pub fn record(&self, event: BitEvent) {
        critical_section::with(|cs| self.buf.borrow_ref_mut(cs).push(event.value()));
        self.last_edge_us.store(event.timestamp_us, Ordering::Release);
        self.pending.store(true, Ordering::Release);
    }

    /// Timestamp of the most recently appended bit.
    #[inline]
    pub fn last_edge_us(&self) -> u64 {
        self.last_edge_us.load(Ordering::Acquire)
    }

    /// True if any bits have arrived since the last drain.
    #[inline]
    pub fn has_bits(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Drain and clear the buffer if the line has been quiet for at least
    /// `silence_us`. Returns `None` while a frame is still arriving or the
    /// buffer is empty.
    ///
    /// The quiet check is re-done inside the critical section so an edge
    /// landing between the cheap pre-check and the drain keeps its frame
    /// intact. `pending` is cleared inside the section too: an edge that
    /// fires right after we leave it re-raises the flag for the next poll.
    pub fn take_if_quiet(&self, now_us: u64, silence_us: u64) -> Option<FrameSnapshot> {
        // Cheap pre-check, no interrupt masking on the idle path.
        if !self.pending.load(Ordering::Acquire) {
            return None;
        }
        if now_us.saturating_sub(self.last_edge_us()) < silence_us {
            return None;
        }

        let snap = critical_section::with(|cs| {
            let last = self.last_edge_us.load(Ordering::Relaxed);
            if now_us.saturating_sub(last) < silence_us {
                return None;
            }
            let snap = self.buf.borrow_ref_mut(cs).take();
            self.pending.store(false, Ordering::Relaxed);
            Some(snap)
        })?;

        if snap.is_empty() {
            None
        } else {
            Some(snap)
        }
    }

    /// Discard everything accumulated so far.
    pub fn clear(&self) {
        critical_section::with(|cs| {
            self.buf.borrow_ref_mut(cs).take();
            self.pending.store(false, Ordering::Relaxed);
        });
    }
}

impl Default for FrameAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Line;

    const SILENCE: u64 = 25_000;

    fn edge(bit: u8, t: u64) -> BitEvent {
        let line = if bit == 1 { Line::D1 } else { Line::D0 };
        BitEvent::new(line, t)
    }

    fn feed(acc: &FrameAccumulator, bits: &[u8], start_us: u64, spacing_us: u64) -> u64 {
        let mut t = start_us;
        for &b in bits {
            acc.record(edge(b, t));
            t += spacing_us;
        }
        t - spacing_us
    }

    #[test]
    fn test_empty_accumulator_yields_nothing() {
        let acc = FrameAccumulator::new();
        assert!(!acc.has_bits());
        assert!(acc.take_if_quiet(1_000_000, SILENCE).is_none());
    }

    #[test]
    fn test_frame_held_until_silence_gap() {
        let acc = FrameAccumulator::new();
        let last = feed(&acc, &[1, 0, 1], 1_000, 2_000);

        // Still inside the gap: nothing drained.
        assert!(acc.take_if_quiet(last + SILENCE - 1, SILENCE).is_none());
        assert!(acc.has_bits());

        // Gap elapsed: whole frame comes out at once.
        let snap = acc.take_if_quiet(last + SILENCE, SILENCE).unwrap();
        assert_eq!(snap.count, 3);
        assert_eq!(snap.bits, 0b101);
        assert!(!snap.overflowed);

        // Drained: polling again does nothing.
        assert!(!acc.has_bits());
        assert!(acc.take_if_quiet(last + 2 * SILENCE, SILENCE).is_none());
    }

    #[test]
    fn test_arrival_order_preserved() {
        let acc = FrameAccumulator::new();
        let last = feed(&acc, &[1, 1, 0, 0, 1], 0, 2_000);
        let snap = acc.take_if_quiet(last + SILENCE, SILENCE).unwrap();

        assert_eq!(snap.count, 5);
        let replay: [u8; 5] = core::array::from_fn(|i| snap.bit(i as u8));
        assert_eq!(replay, [1, 1, 0, 0, 1]);
    }

    #[test]
    fn test_overrun_is_flagged_and_bounded() {
        let acc = FrameAccumulator::new();
        // 40 bits, no gap anywhere: capacity is exceeded, memory is not.
        let mut t = 0;
        for _ in 0..40 {
            acc.record(edge(1, t));
            t += 2_000;
        }

        let snap = acc.take_if_quiet(t + SILENCE, SILENCE).unwrap();
        assert!(snap.overflowed);
        assert_eq!(snap.count, MAX_FRAME_BITS);

        // Cleared by the drain; nothing stale follows.
        assert!(acc.take_if_quiet(t + 2 * SILENCE, SILENCE).is_none());
    }

    #[test]
    fn test_clear_discards_partial_frame() {
        let acc = FrameAccumulator::new();
        feed(&acc, &[1, 0], 0, 2_000);
        acc.clear();
        assert!(!acc.has_bits());
        assert!(acc.take_if_quiet(1_000_000, SILENCE).is_none());
    }

    #[test]
    fn test_concurrent_record_and_drain() {
        use std::sync::Arc;
        use std::thread;

        let acc = Arc::new(FrameAccumulator::new());
        let writer = {
            let acc = Arc::clone(&acc);
            thread::spawn(move || {
                for i in 0..1_000u64 {
                    let line = if i & 1 == 1 { Line::D1 } else { Line::D0 };
                    acc.record(BitEvent::new(line, i));
                }
            })
        };

        // Drain concurrently with a zero silence threshold; every drained
        // snapshot must be internally consistent (count bounded, overrun
        // flagged only at capacity).
        let mut drained = 0u32;
        for now in 0..2_000u64 {
            if let Some(snap) = acc.take_if_quiet(now.wrapping_add(1), 0) {
                assert!(snap.count <= MAX_FRAME_BITS);
                drained += snap.count as u32;
            }
        }
        writer.join().unwrap();

        if let Some(snap) = acc.take_if_quiet(u64::MAX, 0) {
            drained += snap.count as u32;
        }
        assert!(drained > 0);
        assert!(drained <= 1_000);
    }
}
