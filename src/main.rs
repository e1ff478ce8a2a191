//! linetap - ESP32 entry point
//!
//! Wires the protocol engine to the pins:
//! 1. Data lines as pulled-up inputs, falling-edge ISRs into the monitor
//! 2. Cooperative main loop driving the decoder poll at a 5ms cadence
//! 3. Log ring drained to the debug console
//!
//! The network, storage and display collaborators attach elsewhere; from
//! here they are the card sink and display contracts.

use esp_idf_svc::hal::delay::{Ets, FreeRtos};
use esp_idf_svc::sys;

use linetap::bridge::{CardSink, DisplaySink, ReaderBridge};
use linetap::config::{ProtocolTiming, ReaderConfig};
use linetap::event::Line;
use linetap::hal::{DataLine, InterruptLines};
use linetap::logging::LogRing;
use linetap::monitor::LineMonitor;
use linetap::stats::EngineStats;

// ISR-reachable engine state. The monitor is the only piece the interrupt
// path touches; everything else stays on the main loop.
static MONITOR: LineMonitor = LineMonitor::new(ProtocolTiming::DEFAULT);
static STATS: EngineStats = EngineStats::new();
static LOG: LogRing = LogRing::new();

#[inline]
fn now_us() -> u64 {
    // Monotonic since boot; the ISR glue reads it exactly once per edge.
    unsafe { sys::esp_timer_get_time() as u64 }
}

unsafe extern "C" fn d0_isr(_arg: *mut core::ffi::c_void) {
    MONITOR.on_edge(Line::D0, now_us());
}

unsafe extern "C" fn d1_isr(_arg: *mut core::ffi::c_void) {
    MONITOR.on_edge(Line::D1, now_us());
}

/// One Wiegand data line addressed through the GPIO matrix. Input with
/// pull-up at rest; output only while transmitting or jamming.
struct GpioDataLine {
    pin: i32,
}

impl DataLine for GpioDataLine {
    type Error = sys::EspError;

    fn drive_low(&mut self) -> Result<(), Self::Error> {
        unsafe {
            sys::esp!(sys::gpio_set_direction(
                self.pin,
                sys::gpio_mode_t_GPIO_MODE_OUTPUT
            ))?;
            sys::esp!(sys::gpio_set_level(self.pin, 0))
        }
    }

    fn release(&mut self) -> Result<(), Self::Error> {
        unsafe {
            sys::esp!(sys::gpio_set_direction(
                self.pin,
                sys::gpio_mode_t_GPIO_MODE_INPUT
            ))?;
            sys::esp!(sys::gpio_set_pull_mode(
                self.pin,
                sys::gpio_pull_mode_t_GPIO_PULLUP_ONLY
            ))
        }
    }
}

/// Falling-edge ISR binding for both data lines.
struct GpioInterrupts {
    d0: i32,
    d1: i32,
}

impl InterruptLines for GpioInterrupts {
    type Error = sys::EspError;

    fn attach_falling(&mut self) -> Result<(), Self::Error> {
        unsafe {
            sys::esp!(sys::gpio_set_intr_type(
                self.d0,
                sys::gpio_int_type_t_GPIO_INTR_NEGEDGE
            ))?;
            sys::esp!(sys::gpio_set_intr_type(
                self.d1,
                sys::gpio_int_type_t_GPIO_INTR_NEGEDGE
            ))?;
            sys::esp!(sys::gpio_isr_handler_add(
                self.d0,
                Some(d0_isr),
                core::ptr::null_mut()
            ))?;
            sys::esp!(sys::gpio_isr_handler_add(
                self.d1,
                Some(d1_isr),
                core::ptr::null_mut()
            ))
        }
    }

    fn detach(&mut self) -> Result<(), Self::Error> {
        unsafe {
            sys::esp!(sys::gpio_isr_handler_remove(self.d0))?;
            sys::esp!(sys::gpio_isr_handler_remove(self.d1))
        }
    }
}

/// Console display until the LCD collaborator claims the contract.
struct ConsoleDisplay;

impl DisplaySink for ConsoleDisplay {
    fn display_string(&mut self, text: &str) {
        println!("{}", text);
    }
}

/// Card hand-off to the outer application (BLE notify, HTTP log, ...).
struct ConsoleCardSink;

impl CardSink for ConsoleCardSink {
    fn on_card_decoded(&mut self, identifier: &str) {
        println!("card: {}", identifier);
    }
}

fn main() -> Result<(), sys::EspError> {
    sys::link_patches();

    println!("{}", env!("VERSION_STRING"));

    // The persistence collaborator owns loading this; defaults here.
    let config = ReaderConfig::new();

    unsafe {
        sys::esp!(sys::gpio_install_isr_service(0))?;
    }

    let mut d0 = GpioDataLine { pin: config.pin_d0 };
    let mut d1 = GpioDataLine { pin: config.pin_d1 };
    let aux_pin = config.pin_aux;

    // Idle line state: pulled-up inputs.
    d0.release()?;
    d1.release()?;
    unsafe {
        sys::esp!(sys::gpio_set_direction(
            aux_pin,
            sys::gpio_mode_t_GPIO_MODE_INPUT
        ))?;
    }

    let lines = GpioInterrupts {
        d0: config.pin_d0,
        d1: config.pin_d1,
    };

    let mut display = ConsoleDisplay;
    let mut card_sink = ConsoleCardSink;

    let mut bridge = ReaderBridge::new(
        &config, &MONITOR, &STATS, &LOG, d0, d1, lines, Ets, &mut display, &mut card_sink,
    );
    bridge.attach_interrupts()?;

    loop {
        let now = now_us();
        bridge.poll(now);

        let aux_level = unsafe { sys::gpio_get_level(aux_pin) != 0 };
        bridge.sample_aux(aux_level, now / 1_000);

        while let Some(line) = LOG.pop() {
            println!("{} {} {}", line.timestamp_ms, line.level.as_str(), line.text);
        }

        FreeRtos::delay_ms(5);
    }
}
