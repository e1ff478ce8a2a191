//! Module: decoder
//!
//! Purpose: Turns accumulated raw bits into card identifiers. Runs on the
//! cooperative main loop at a sub-10ms cadence; never in interrupt context.
//!
//! A frame has no delimiters on the wire. The decoder infers "frame
//! complete" from the silence gap: once no new bit has arrived for the
//! configured quiet time, whatever accumulated is one frame. The drain is a
//! copy-and-clear under the accumulator's critical section; layout
//! decoding and the decode callback both run outside it, so a callback
//! that re-enters the jammer or transmitter cannot deadlock.
//!
//! Safety: Safe. Pure logic over drained snapshots.

use crate::accumulator::{FrameAccumulator, FrameSnapshot};
use crate::config::ProtocolTiming;
use crate::format::{decode_bits, DecodedFrame};

/// Why a drained frame produced no identifier.
///
/// None of these are fatal: the accumulator is already clear when the error
/// is reported, interrupts stay attached, and the next card presentation
/// starts fresh.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// More bits than the longest recognized layout arrived without a
    /// silence gap.
    Overrun(u8),
    /// The silence gap closed on a bit count no layout claims.
    UnrecognizedLength(u8),
    /// Recognized length, failed parity or complement check.
    Parity(u8),
}

impl DecodeError {
    /// Stable short code, used in logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Overrun(_) => "overrun",
            Self::UnrecognizedLength(_) => "unrecognized-length",
            Self::Parity(_) => "parity-failure",
        }
    }

    /// Bit count observed when the error was raised.
    pub fn bit_count(&self) -> u8 {
        match self {
            Self::Overrun(n) | Self::UnrecognizedLength(n) | Self::Parity(n) => *n,
        }
    }
}

impl core::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} ({} bits)", self.code(), self.bit_count())
    }
}

/// Silence-gap framing plus layout decode.
pub struct FrameDecoder {
    timing: ProtocolTiming,
}

impl FrameDecoder {
    pub const fn new(timing: ProtocolTiming) -> Self {
        Self { timing }
    }

    /// One poll step. Returns `None` while the line is active or idle-empty;
    /// otherwise the completed frame's decode outcome.
    ///
    /// The accumulator is always left empty after a `Some(_)` return, so
    /// polling again with no new bits does nothing.
    pub fn poll(
        &self,
        accumulator: &FrameAccumulator,
        now_us: u64,
    ) -> Option<Result<DecodedFrame, DecodeError>> {
        let snapshot = accumulator.take_if_quiet(now_us, self.timing.silence_timeout_us)?;
        Some(Self::decode(snapshot))
    }

    /// Decode one drained snapshot.
    fn decode(snapshot: FrameSnapshot) -> Result<DecodedFrame, DecodeError> {
        if snapshot.overflowed {
            return Err(DecodeError::Overrun(snapshot.count));
        }
        decode_bits(snapshot.bits, snapshot.count)
    }
}
