//! Module: transmitter
//!
//! Purpose: Reader emulation. Pulses a frame onto the two data lines with
//! protocol-fixed timing: a low pulse on D0 per 0-bit, on D1 per 1-bit,
//! constant pulse width and inter-bit spacing.
//!
//! Transmission blocks the calling context for the whole frame (a 26-bit
//! frame at default timing is ~52ms) and at most one transmission is in
//! flight. Validation happens before any line activity: a rejected request
//! never emits a partial frame.
//!
//! The caller detaches the line monitor around the pulse train; the lines
//! are inputs in normal operation and outputs only for the duration.
//! [`crate::bridge::ReaderBridge::transmit_id`] owns that sequencing.
//!
//! Safety: Safe. The in-flight guard is one atomic.

use core::sync::atomic::{AtomicBool, Ordering};

use embedded_hal::delay::DelayNs;

use crate::config::ProtocolTiming;
use crate::format::{encode_frame, parse_identifier, FrameFormat, WireFrame};
use crate::hal::DataLine;

/// Why a transmission was rejected. All variants are raised before the
/// first pulse except `Line`, which carries a pin fault.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransmitError<E> {
    /// No recognized layout for the requested bit count.
    UnsupportedBitCount(u8),
    /// The identifier does not parse under the requested layout.
    BadIdentifier,
    /// Another transmission is in flight.
    Busy,
    /// A data line reported a fault mid-frame.
    Line(E),
}

impl<E: core::fmt::Debug> core::fmt::Display for TransmitError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::UnsupportedBitCount(n) => write!(f, "unsupported bit count {}", n),
            Self::BadIdentifier => write!(f, "identifier does not fit the layout"),
            Self::Busy => write!(f, "transmission already in flight"),
            Self::Line(e) => write!(f, "line fault: {:?}", e),
        }
    }
}

/// Frame pulse engine.
pub struct Transmitter {
    timing: ProtocolTiming,
    in_flight: AtomicBool,
}

impl Transmitter {
    pub const fn new(timing: ProtocolTiming) -> Self {
        Self {
            timing,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Validate and encode a transmit request without touching the lines.
    pub fn encode<E>(
        &self,
        identifier: &str,
        bit_count: u8,
    ) -> Result<WireFrame, TransmitError<E>> {
        if FrameFormat::from_bit_count(bit_count).is_none() {
            return Err(TransmitError::UnsupportedBitCount(bit_count));
        }
        let frame =
            parse_identifier(identifier, bit_count).ok_or(TransmitError::BadIdentifier)?;
        Ok(encode_frame(&frame))
    }

    /// Emit one frame. Blocks for the frame duration.
    ///
    /// The caller has already validated via [`Self::encode`] and detached
    /// the monitor; this only sequences pulses.
    pub fn send_frame<D0, D1, D>(
        &self,
        frame: WireFrame,
        d0: &mut D0,
        d1: &mut D1,
        delay: &mut D,
    ) -> Result<(), TransmitError<D0::Error>>
    where
        D0: DataLine,
        D1: DataLine<Error = D0::Error>,
        D: DelayNs,
    {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(TransmitError::Busy);
        }

        let result = self.pulse_train(frame, d0, d1, delay);
        self.in_flight.store(false, Ordering::Release);
        result.map_err(TransmitError::Line)
    }

    /// Convenience wrapper: validate, encode and emit in one call.
    pub fn transmit<D0, D1, D>(
        &self,
        identifier: &str,
        bit_count: u8,
        d0: &mut D0,
        d1: &mut D1,
        delay: &mut D,
    ) -> Result<(), TransmitError<D0::Error>>
    where
        D0: DataLine,
        D1: DataLine<Error = D0::Error>,
        D: DelayNs,
    {
        let frame = self.encode(identifier, bit_count)?;
        self.send_frame(frame, d0, d1, delay)
    }

    #[inline]
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn pulse_train<D0, D1, D>(
        &self,
        frame: WireFrame,
        d0: &mut D0,
        d1: &mut D1,
        delay: &mut D,
    ) -> Result<(), D0::Error>
    where
        D0: DataLine,
        D1: DataLine<Error = D0::Error>,
        D: DelayNs,
    {
        for i in 0..frame.count {
            if frame.bit(i) == 0 {
                pulse(d0, delay, self.timing.pulse_width_us)?;
            } else {
                pulse(d1, delay, self.timing.pulse_width_us)?;
            }
            delay.delay_us(self.timing.pulse_idle_us());
        }
        Ok(())
    }
}

#[inline]
fn pulse<L: DataLine, D: DelayNs>(
    line: &mut L,
    delay: &mut D,
    width_us: u32,
) -> Result<(), L::Error> {
    line.drive_low()?;
    delay.delay_us(width_us);
    line.release()
}
