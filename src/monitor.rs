//! Module: monitor
//!
//! Purpose: Edge capture. `on_edge` is the ISR path: timestamp in, one bit
//! appended, return. Everything slower (framing, decode, logging) happens
//! on the main loop from the accumulator this monitor owns.
//!
//! Rules for the ISR path:
//! - no blocking calls
//! - no allocation
//! - no logging
//!
//! Safety: Safe. All shared state is atomics plus the accumulator's own
//! critical section.

use core::sync::atomic::{AtomicBool, Ordering};

use portable_atomic::AtomicU64;

use crate::accumulator::FrameAccumulator;
use crate::config::ProtocolTiming;
use crate::event::{AuxEvent, BitEvent, Line};
use crate::hal::InterruptLines;

/// Debounce window for the aux input, in milliseconds.
const AUX_DEBOUNCE_MS: u64 = 10;

/// Capture front-end for the two data lines.
///
/// `const`-constructible so it can live in a static and be reached from
/// ISR glue. One instance owns one accumulator.
pub struct LineMonitor {
    accumulator: FrameAccumulator,

    /// Per-line timestamp of the last accepted edge. Per-line so that
    /// near-simultaneous pulses on D0 and D1 are both observed; the
    /// debounce only rejects ringing on the same line.
    last_line_edge_us: [AtomicU64; 2],

    /// While the jammer drains D0, its own line manipulation must not read
    /// back as bit events.
    suppress_d0: AtomicBool,

    /// Interrupt binding state, for idempotent attach/detach.
    attached: AtomicBool,

    debounce_us: u64,
}

impl LineMonitor {
    pub const fn new(timing: ProtocolTiming) -> Self {
        Self {
            accumulator: FrameAccumulator::new(),
            last_line_edge_us: [AtomicU64::new(0), AtomicU64::new(0)],
            suppress_d0: AtomicBool::new(false),
            attached: AtomicBool::new(false),
            debounce_us: timing.debounce_us,
        }
    }

    /// ISR entry point: one falling edge on `line` at `now_us`.
    ///
    /// The caller reads the clock exactly once and passes it in; this
    /// function performs no time reads, no blocking and no allocation.
    #[inline]
    pub fn on_edge(&self, line: Line, now_us: u64) {
        if matches!(line, Line::D0) && self.suppress_d0.load(Ordering::Relaxed) {
            return;
        }

        let last = self.last_line_edge_us[line.index()].load(Ordering::Relaxed);
        if last != 0 && now_us.saturating_sub(last) < self.debounce_us {
            return;
        }
        self.last_line_edge_us[line.index()].store(now_us, Ordering::Relaxed);

        self.accumulator.record(BitEvent::new(line, now_us));
    }

    /// The accumulator this monitor feeds; the decoder drains it.
    #[inline]
    pub fn accumulator(&self) -> &FrameAccumulator {
        &self.accumulator
    }

    /// Bind both edge sources. Idempotent: a second attach with the binding
    /// already live is a no-op.
    pub fn attach<I: InterruptLines>(&self, lines: &mut I) -> Result<(), I::Error> {
        if self.attached.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Err(e) = lines.attach_falling() {
            self.attached.store(false, Ordering::Release);
            return Err(e);
        }
        Ok(())
    }

    /// Unbind both edge sources. Idempotent.
    pub fn detach<I: InterruptLines>(&self, lines: &mut I) -> Result<(), I::Error> {
        if !self.attached.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        if let Err(e) = lines.detach() {
            self.attached.store(true, Ordering::Release);
            return Err(e);
        }
        Ok(())
    }

    #[inline]
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    /// Jammer coordination: ignore D0 edges while the drain is asserted.
    pub(crate) fn set_suppress_d0(&self, suppress: bool) {
        self.suppress_d0.store(suppress, Ordering::Release);
    }

    #[cfg(test)]
    pub(crate) fn suppressing_d0(&self) -> bool {
        self.suppress_d0.load(Ordering::Acquire)
    }
}

/// Debounced change detection for the auxiliary input.
///
/// Main-loop only. A change reported within the debounce window of the
/// previous one is ignored. `expect` arms one suppressed transition, so a
/// level change the firmware caused itself is swallowed instead of logged.
pub struct AuxWatcher {
    last_level: bool,
    last_change_ms: u64,
    expected: Option<bool>,
}

impl AuxWatcher {
    pub const fn new(initial_level: bool) -> Self {
        Self {
            last_level: initial_level,
            last_change_ms: 0,
            expected: None,
        }
    }

    /// Announce a level the firmware is about to cause; the matching
    /// observation will not be reported.
    pub fn expect(&mut self, level: bool) {
        self.expected = Some(level);
    }

    /// Feed one sampled level. Returns a debounced change event, if any.
    pub fn sample(&mut self, level: bool, now_ms: u64) -> Option<AuxEvent> {
        if self.expected == Some(level) {
            self.last_level = level;
            self.expected = None;
            return None;
        }

        if level != self.last_level && now_ms.saturating_sub(self.last_change_ms) > AUX_DEBOUNCE_MS
        {
            self.last_change_ms = now_ms;
            self.last_level = level;
            return Some(AuxEvent {
                level,
                timestamp_ms: now_ms,
            });
        }

        None
    }

    #[inline]
    pub fn level(&self) -> bool {
        self.last_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtocolTiming;

    const TIMING: ProtocolTiming = ProtocolTiming::DEFAULT;

    struct FakeLines {
        attached: bool,
        attach_calls: u32,
        detach_calls: u32,
    }

    impl FakeLines {
        fn new() -> Self {
            Self {
                attached: false,
                attach_calls: 0,
                detach_calls: 0,
            }
        }
    }

    impl InterruptLines for FakeLines {
        type Error = core::convert::Infallible;

        fn attach_falling(&mut self) -> Result<(), Self::Error> {
            self.attached = true;
            self.attach_calls += 1;
            Ok(())
        }

        fn detach(&mut self) -> Result<(), Self::Error> {
            self.attached = false;
            self.detach_calls += 1;
            Ok(())
        }
    }

    #[test]
    fn test_edges_accumulate_by_line_value() {
        let monitor = LineMonitor::new(TIMING);
        monitor.on_edge(Line::D1, 1_000);
        monitor.on_edge(Line::D0, 3_000);
        monitor.on_edge(Line::D1, 5_000);

        let snap = monitor
            .accumulator()
            .take_if_quiet(5_000 + TIMING.silence_timeout_us, TIMING.silence_timeout_us)
            .unwrap();
        assert_eq!(snap.count, 3);
        assert_eq!(snap.bits, 0b101);
    }

    #[test]
    fn test_same_line_ringing_debounced() {
        let monitor = LineMonitor::new(TIMING);
        monitor.on_edge(Line::D1, 1_000);
        monitor.on_edge(Line::D1, 1_050); // ringing, 50us later
        monitor.on_edge(Line::D1, 3_000); // real next pulse

        let snap = monitor
            .accumulator()
            .take_if_quiet(3_000 + TIMING.silence_timeout_us, TIMING.silence_timeout_us)
            .unwrap();
        assert_eq!(snap.count, 2);
    }

    #[test]
    fn test_simultaneous_edges_on_both_lines_kept() {
        let monitor = LineMonitor::new(TIMING);
        // Same electrical instant on both lines: both must be observed.
        monitor.on_edge(Line::D0, 1_000);
        monitor.on_edge(Line::D1, 1_000);

        let snap = monitor
            .accumulator()
            .take_if_quiet(1_000 + TIMING.silence_timeout_us, TIMING.silence_timeout_us)
            .unwrap();
        assert_eq!(snap.count, 2);
    }

    #[test]
    fn test_attach_detach_idempotent() {
        let monitor = LineMonitor::new(TIMING);
        let mut lines = FakeLines::new();

        monitor.attach(&mut lines).unwrap();
        monitor.attach(&mut lines).unwrap();
        assert_eq!(lines.attach_calls, 1);
        assert!(monitor.is_attached());

        monitor.detach(&mut lines).unwrap();
        monitor.detach(&mut lines).unwrap();
        assert_eq!(lines.detach_calls, 1);
        assert!(!monitor.is_attached());
        assert!(!lines.attached);
    }

    #[test]
    fn test_d0_suppression_drops_only_d0() {
        let monitor = LineMonitor::new(TIMING);
        monitor.set_suppress_d0(true);

        monitor.on_edge(Line::D0, 1_000);
        monitor.on_edge(Line::D1, 2_000);
        monitor.set_suppress_d0(false);
        monitor.on_edge(Line::D0, 4_000);

        let snap = monitor
            .accumulator()
            .take_if_quiet(4_000 + TIMING.silence_timeout_us, TIMING.silence_timeout_us)
            .unwrap();
        // Suppressed D0 edge dropped; D1 and the post-release D0 kept.
        assert_eq!(snap.count, 2);
        assert_eq!(snap.bits, 0b10);
    }

    #[test]
    fn test_aux_watcher_debounce_and_expectation() {
        let mut aux = AuxWatcher::new(true);

        // Bounce inside the window: single event.
        let ev = aux.sample(false, 100).unwrap();
        assert!(!ev.level);
        assert!(aux.sample(true, 105).is_none());
        assert!(aux.sample(false, 108).is_none());

        // Expected change is swallowed.
        aux.expect(true);
        assert!(aux.sample(true, 200).is_none());
        assert!(aux.level());

        // Next real change reports again.
        let ev = aux.sample(false, 300).unwrap();
        assert_eq!(ev.timestamp_ms, 300);
    }
}
