//! Transmit → capture → decode round trips: the emitted pulse train is
//! looped back into the monitor, and the decoder must reproduce the
//! identifier exactly for every supported bit count.

use std::cell::Cell;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;

use linetap::config::ProtocolTiming;
use linetap::decoder::FrameDecoder;
use linetap::event::Line;
use linetap::format::FrameFormat;
use linetap::hal::DataLine;
use linetap::monitor::LineMonitor;
use linetap::transmitter::Transmitter;

const TIMING: ProtocolTiming = ProtocolTiming::DEFAULT;

/// Shared simulated clock: the delay source advances it, the loopback
/// lines read it when an edge fires.
#[derive(Clone)]
struct SimClock(Rc<Cell<u64>>);

impl SimClock {
    fn new() -> Self {
        Self(Rc::new(Cell::new(1_000_000)))
    }

    fn now_us(&self) -> u64 {
        self.0.get()
    }
}

struct SimDelay(SimClock);

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        let clock = &self.0 .0;
        clock.set(clock.get() + (ns as u64) / 1_000);
    }
}

/// A data line whose falling edge is looped straight back into the
/// monitor, the way the panel-side wiring would see it.
struct LoopbackLine<'a> {
    which: Line,
    monitor: &'a LineMonitor,
    clock: SimClock,
    low: bool,
}

impl DataLine for LoopbackLine<'_> {
    type Error = core::convert::Infallible;

    fn drive_low(&mut self) -> Result<(), Self::Error> {
        if !self.low {
            self.low = true;
            self.monitor.on_edge(self.which, self.clock.now_us());
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), Self::Error> {
        self.low = false;
        Ok(())
    }
}

fn round_trip(identifier: &str, bit_count: u8) -> String {
    let monitor = LineMonitor::new(TIMING);
    let clock = SimClock::new();
    let mut delay = SimDelay(clock.clone());
    let mut d0 = LoopbackLine {
        which: Line::D0,
        monitor: &monitor,
        clock: clock.clone(),
        low: false,
    };
    let mut d1 = LoopbackLine {
        which: Line::D1,
        monitor: &monitor,
        clock: clock.clone(),
        low: false,
    };

    let transmitter = Transmitter::new(TIMING);
    transmitter
        .transmit(identifier, bit_count, &mut d0, &mut d1, &mut delay)
        .unwrap();

    let decoder = FrameDecoder::new(TIMING);
    let frame = decoder
        .poll(
            monitor.accumulator(),
            clock.now_us() + TIMING.silence_timeout_us,
        )
        .expect("frame complete after silence gap")
        .expect("loopback frame decodes");

    assert_eq!(frame.bit_count, bit_count);
    frame.render().as_str().to_owned()
}

#[test]
fn round_trip_reproduces_identifier_for_every_supported_count() {
    let cases: &[(&str, u8)] = &[
        ("9", 4),
        ("5", 8),
        ("1:10", 26),
        ("255:65535", 26),
        ("0:0", 26),
        ("deadbeef", 34),
        ("00000001", 34),
        ("91a2b3c4d0", 37),
        ("0000000000", 37),
    ];
    for (identifier, bit_count) in cases {
        assert_eq!(
            round_trip(identifier, *bit_count),
            *identifier,
            "round trip for {} bits",
            bit_count
        );
    }
}

#[test]
fn round_trip_covers_all_supported_formats() {
    // Keep the case table above honest if a layout is ever added.
    assert_eq!(FrameFormat::SUPPORTED_BIT_COUNTS, [4, 8, 26, 34, 37]);
}

#[test]
fn emitted_timing_respects_pulse_constants() {
    let monitor = LineMonitor::new(TIMING);
    let clock = SimClock::new();
    let start = clock.now_us();
    let mut delay = SimDelay(clock.clone());
    let mut d0 = LoopbackLine {
        which: Line::D0,
        monitor: &monitor,
        clock: clock.clone(),
        low: false,
    };
    let mut d1 = LoopbackLine {
        which: Line::D1,
        monitor: &monitor,
        clock: clock.clone(),
        low: false,
    };

    Transmitter::new(TIMING)
        .transmit("1:10", 26, &mut d0, &mut d1, &mut delay)
        .unwrap();

    // 26 bits, each one pulse width plus inter-bit idle.
    let expected = 26 * TIMING.pulse_gap_us as u64;
    assert_eq!(clock.now_us() - start, expected);
}

#[test]
fn zero_frame_survives_round_trip() {
    // All-zero payloads exercise the parity edges of each layout.
    assert_eq!(round_trip("0", 4), "0");
    assert_eq!(round_trip("0", 8), "0");
    assert_eq!(round_trip("00000000", 34), "00000000");
}
