//! Module: bridge
//!
//! Purpose: Application glue between the protocol engine and the outer
//! firmware. Owns the poll step, the jammer and transmitter, and the
//! decode callback policy: every successfully decoded identifier goes to
//! the display and the external card sink, and the reserved control
//! identifier arms the jammer.
//!
//! The decode callback chain runs synchronously on the main loop, after
//! the accumulator's critical section has been released. Re-entering the
//! jammer or transmitter from inside the chain is therefore safe.
//!
//! Safety: Safe. Everything here is main-loop code.

use embedded_hal::delay::DelayNs;

use crate::config::ReaderConfig;
use crate::decoder::FrameDecoder;
use crate::hal::{DataLine, InterruptLines};
use crate::jammer::Jammer;
use crate::logging::LogRing;
use crate::mode::{ActiveMode, ModeLifecycle};
use crate::monitor::{AuxWatcher, LineMonitor};
use crate::stats::EngineStats;
use crate::transmitter::{TransmitError, Transmitter};
use crate::{tap_error, tap_info, tap_warn};

/// Inbound callback contract: at most one call per successfully decoded
/// frame, never for failed decodes.
pub trait CardSink {
    fn on_card_decoded(&mut self, identifier: &str);
}

/// Best-effort display collaborator; failures are its own problem.
pub trait DisplaySink {
    fn display_string(&mut self, text: &str);
}

/// The reader application: capture → decode → act.
pub struct ReaderBridge<'a, D0, D1, IL, D>
where
    D0: DataLine,
{
    monitor: &'a LineMonitor,
    stats: &'a EngineStats,
    log: &'a LogRing,
    decoder: FrameDecoder,
    transmitter: Transmitter,
    jammer: Jammer,
    lifecycle: ModeLifecycle,
    aux: AuxWatcher,
    control_id: crate::config::IdString,
    d0: D0,
    d1: D1,
    lines: IL,
    delay: D,
    display: &'a mut dyn DisplaySink,
    card_sink: &'a mut dyn CardSink,
}

impl<'a, D0, D1, IL, D> ReaderBridge<'a, D0, D1, IL, D>
where
    D0: DataLine,
    D1: DataLine<Error = D0::Error>,
    IL: InterruptLines<Error = D0::Error>,
    D: DelayNs,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &ReaderConfig,
        monitor: &'a LineMonitor,
        stats: &'a EngineStats,
        log: &'a LogRing,
        d0: D0,
        d1: D1,
        lines: IL,
        delay: D,
        display: &'a mut dyn DisplaySink,
        card_sink: &'a mut dyn CardSink,
    ) -> Self {
        Self {
            monitor,
            stats,
            log,
            decoder: FrameDecoder::new(config.timing),
            transmitter: Transmitter::new(config.timing),
            jammer: Jammer::new(),
            lifecycle: ModeLifecycle::new(config.mode),
            aux: AuxWatcher::new(true),
            control_id: config.control_id.clone(),
            d0,
            d1,
            lines,
            delay,
            display,
            card_sink,
        }
    }

    /// Bind the active mode's interrupts. Call once at startup; safe to
    /// call again after a transmit-time detach went wrong.
    pub fn attach_interrupts(&mut self) -> Result<(), D0::Error> {
        self.lifecycle
            .attach_interrupts(self.monitor, &mut self.lines)
    }

    /// Unbind the active mode's interrupts.
    pub fn detach_interrupts(&mut self) -> Result<(), D0::Error> {
        self.lifecycle
            .detach_interrupts(self.monitor, &mut self.lines)
    }

    /// One main-loop step: drive the decoder, dispatch a completed frame.
    ///
    /// Call at a sub-10ms cadence; one silence-gap inspection per call.
    pub fn poll(&mut self, now_us: u64) {
        let now_ms = (now_us / 1_000) as u32;
        match self.decoder.poll(self.monitor.accumulator(), now_us) {
            None => {}
            Some(Ok(frame)) => {
                self.stats.record_frame();
                let id = frame.render();
                self.handle_card(&id, now_ms);
            }
            Some(Err(error)) => {
                self.stats.record_decode_error(&error);
                // Garbage caused by our own drain is expected; keep the
                // counter, skip the log line.
                if !self.jammer.is_draining() {
                    tap_warn!(self.log, now_ms, "decode failed: {}", error);
                }
            }
        }
    }

    /// Decode callback: display, forward, and check for the control
    /// identifier that arms the jammer.
    fn handle_card(&mut self, identifier: &str, now_ms: u32) {
        self.display.display_string(identifier);
        self.card_sink.on_card_decoded(identifier);

        if !self.control_id.is_empty() && identifier == self.control_id.as_str() {
            match self.jamming_enable() {
                Ok(()) => {
                    tap_warn!(self.log, now_ms, "DoS mode enabled by control card");
                }
                Err(e) => {
                    tap_error!(self.log, now_ms, "jam assert failed: {:?}", e);
                }
            }
        } else {
            tap_info!(self.log, now_ms, "{}", identifier);
        }
    }

    /// Emulate a card presentation toward the panel.
    ///
    /// Dispatches on the active mode the way every line operation does;
    /// a mode without a pulse transmitter ignores the request. Interrupts
    /// are detached for the duration of the frame and re-attached on every
    /// exit path, error included.
    pub fn transmit_id(
        &mut self,
        identifier: &str,
        bit_count: u8,
        now_us: u64,
    ) -> Result<(), TransmitError<D0::Error>> {
        let now_ms = (now_us / 1_000) as u32;
        match self.lifecycle.active() {
            ActiveMode::Wiegand => {}
            ActiveMode::SerialPanel => return Ok(()),
        }

        // Reject before any line activity.
        let frame = match self.transmitter.encode(identifier, bit_count) {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.record_transmit_reject();
                tap_warn!(self.log, now_ms, "transmit rejected: {}", e);
                return Err(e);
            }
        };

        self.monitor
            .detach(&mut self.lines)
            .map_err(TransmitError::Line)?;

        let sent = self
            .transmitter
            .send_frame(frame, &mut self.d0, &mut self.d1, &mut self.delay);

        // Line ownership must survive a failed frame.
        let reattached = self.monitor.attach(&mut self.lines);

        sent?;
        reattached.map_err(TransmitError::Line)?;

        self.stats.record_transmission();
        tap_info!(
            self.log,
            now_ms,
            "transmitted {} ({} bits)",
            identifier,
            bit_count
        );
        Ok(())
    }

    /// Assert the D0 drain. Idempotent.
    pub fn jamming_enable(&mut self) -> Result<(), D0::Error> {
        match self.lifecycle.active() {
            ActiveMode::Wiegand => {}
            ActiveMode::SerialPanel => return Ok(()),
        }
        if self.jammer.is_draining() {
            return Ok(());
        }
        self.jammer.enable(&mut self.d0, self.monitor)?;
        self.stats.record_jam_session();
        Ok(())
    }

    /// Release the D0 drain. Idempotent.
    pub fn jamming_disable(&mut self) -> Result<(), D0::Error> {
        match self.lifecycle.active() {
            ActiveMode::Wiegand => {}
            ActiveMode::SerialPanel => return Ok(()),
        }
        self.jammer.disable(&mut self.d0, self.monitor)
    }

    /// Feed one aux input sample; debounced changes are logged.
    pub fn sample_aux(&mut self, level: bool, now_ms: u64) {
        if let Some(event) = self.aux.sample(level, now_ms) {
            tap_info!(
                self.log,
                event.timestamp_ms as u32,
                "Aux changed to {}",
                event.level as u8
            );
        }
    }

    /// Switch protocol modes; the old mode's interrupts detach first.
    pub fn switch_mode(&mut self, next: ActiveMode) -> Result<(), D0::Error> {
        self.lifecycle.switch(next, self.monitor, &mut self.lines)
    }

    #[inline]
    pub fn active_mode(&self) -> ActiveMode {
        self.lifecycle.active()
    }

    #[inline]
    pub fn is_jamming(&self) -> bool {
        self.jammer.is_draining()
    }
}
