//! Module: mode
//!
//! Purpose: Single point of truth for which protocol engine owns the two
//! physical data lines. Modes are mutually exclusive; interrupt attachment
//! is always re-derived from the active mode, and switching detaches the
//! old mode before the new one attaches so the lines never have two
//! owners.
//!
//! Adding a protocol mode means adding one variant and one dispatch arm in
//! each lifecycle method; existing arms stay untouched.
//!
//! Safety: Safe. Mode changes happen only on the cooperative main loop,
//! which also runs `transmit`: a transmission in flight has always
//! completed its frame before a switch can execute.

use crate::hal::InterruptLines;
use crate::monitor::LineMonitor;

/// Which protocol engine owns the data lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ActiveMode {
    /// Edge-triggered dual-line decoding, this crate's engine.
    #[default]
    Wiegand,
    /// Structured serial protocol for more capable readers. Runs over the
    /// UART elsewhere; it owns no edge interrupts on these lines.
    SerialPanel,
}

impl ActiveMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wiegand => "wiegand",
            Self::SerialPanel => "serial-panel",
        }
    }
}

/// Attach/detach dispatch for the active mode.
pub struct ModeLifecycle {
    active: ActiveMode,
}

impl ModeLifecycle {
    pub const fn new(mode: ActiveMode) -> Self {
        Self { active: mode }
    }

    #[inline]
    pub fn active(&self) -> ActiveMode {
        self.active
    }

    /// Bind the active mode's interrupt sources.
    pub fn attach_interrupts<I: InterruptLines>(
        &self,
        monitor: &LineMonitor,
        lines: &mut I,
    ) -> Result<(), I::Error> {
        match self.active {
            ActiveMode::Wiegand => monitor.attach(lines),
            ActiveMode::SerialPanel => Ok(()),
        }
    }

    /// Unbind the active mode's interrupt sources.
    pub fn detach_interrupts<I: InterruptLines>(
        &self,
        monitor: &LineMonitor,
        lines: &mut I,
    ) -> Result<(), I::Error> {
        match self.active {
            ActiveMode::Wiegand => monitor.detach(lines),
            ActiveMode::SerialPanel => Ok(()),
        }
    }

    /// Switch modes: old mode detaches fully before the new mode attaches,
    /// so the two never compete for the same interrupt source.
    pub fn switch<I: InterruptLines>(
        &mut self,
        next: ActiveMode,
        monitor: &LineMonitor,
        lines: &mut I,
    ) -> Result<(), I::Error> {
        if next == self.active {
            return Ok(());
        }
        self.detach_interrupts(monitor, lines)?;
        self.active = next;
        self.attach_interrupts(monitor, lines)
    }
}
