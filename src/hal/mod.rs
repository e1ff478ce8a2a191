//! Hardware Abstraction Layer for linetap.
//!
//! Thin seams between the protocol engine and the pins. Business logic
//! stays in core modules; implementations of these traits are just I/O.
//!
//! The two data lines are inputs with pull-ups in normal operation and are
//! driven as outputs only while transmitting or jamming. `embedded-hal`
//! has no direction-switch abstraction, so [`DataLine`] models exactly the
//! two things the engine does to a line.

/// A direction-switchable Wiegand data line.
///
/// Idle state is "released": pulled-up input, reading high. Implementations
/// must make `release` after `drive_low` restore input/interrupt-capable
/// operation.
pub trait DataLine {
    type Error: core::fmt::Debug;

    /// Reconfigure as output and hold the line low.
    fn drive_low(&mut self) -> Result<(), Self::Error>;

    /// Restore the pulled-up input state.
    fn release(&mut self) -> Result<(), Self::Error>;
}

/// Falling-edge interrupt binding for the two data lines.
///
/// Implementations route each edge to
/// [`LineMonitor::on_edge`](crate::monitor::LineMonitor::on_edge) with a
/// timestamp read once inside the ISR.
pub trait InterruptLines {
    type Error: core::fmt::Debug;

    /// Bind both lines' falling edges to the monitor.
    fn attach_falling(&mut self) -> Result<(), Self::Error>;

    /// Unbind both lines.
    fn detach(&mut self) -> Result<(), Self::Error>;
}
