//! # linetap
//!
//! Firmware core for an access-control line tap: a device that sits on the
//! Wiegand pair between a card reader and its panel, decodes passing
//! frames, can replay an identifier as an emulated reader, and can drain
//! the line to jam legitimate traffic on demand.
//!
//! ## Architecture
//!
//! ```text
//! D0/D1 edges (ISR) ─▶ LineMonitor ─▶ FrameAccumulator
//!                                          │ silence gap
//! main loop ──poll──▶ FrameDecoder ────────┘
//!                          │ identifier
//!                          ▼
//!                    ReaderBridge ──▶ display / card sink / log
//!                      │        │
//!                 Transmitter  Jammer ──▶ D0 drain
//! ```
//!
//! The ISR path appends timestamped bits and nothing else. Framing is
//! inferred from line silence on the cooperative main loop, and every
//! slow concern (decode, callbacks, logging) runs there. The accumulator
//! is the only state shared across the boundary.
//!
//! The library is hardware-free and fully testable on host; the `esp32`
//! feature builds the on-device binary.

#![cfg_attr(not(test), no_std)]

pub mod accumulator;
pub mod bridge;
pub mod config;
pub mod decoder;
pub mod event;
pub mod format;
pub mod hal;
pub mod jammer;
pub mod logging;
pub mod mode;
pub mod monitor;
pub mod stats;
pub mod transmitter;

pub use accumulator::{FrameAccumulator, FrameSnapshot};
pub use bridge::{CardSink, DisplaySink, ReaderBridge};
pub use config::{ProtocolTiming, ReaderConfig, MAX_FRAME_BITS};
pub use decoder::{DecodeError, FrameDecoder};
pub use event::{BitEvent, Line};
pub use format::{CardData, DecodedFrame, FrameFormat};
pub use jammer::Jammer;
pub use logging::{LogLevel, LogRing};
pub use mode::{ActiveMode, ModeLifecycle};
pub use monitor::{AuxWatcher, LineMonitor};
pub use stats::EngineStats;
pub use transmitter::{TransmitError, Transmitter};
