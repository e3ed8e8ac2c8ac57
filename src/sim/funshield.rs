//! Funshield wiring and the shield-level simulation controller.
//!
//! The funshield carries three pulled-up buttons, four independent
//! active-low LEDs and a four-digit 7-segment display driven through a
//! serial shift register. [`FunshieldController`] registers that wiring with
//! the emulator, attaches the display models and schedules button traffic.

use crate::chain::{
    Aggregator, ConsumerFn, ConsumerKey, Demultiplexer, LedPanel, Recorder, SegDisplay, ValueKind
};
use crate::bitarray::BitArray;
use crate::emulator::pin::PinDir;
use crate::emulator::{Emulator, A1, A2, A3};
use crate::error::Error;
use crate::sim::{Firmware, SimulationController};
use crate::{LogTime, PinId};

pub use crate::chain::{OFF, ON};

/// 7-segment latch pin.
pub const LATCH_PIN: PinId = 4;
/// 7-segment clock pin.
pub const CLOCK_PIN: PinId = 7;
/// 7-segment data pin.
pub const DATA_PIN: PinId = 8;

/// Buzzer pin.
pub const BEEP_PIN: PinId = 3;

/// Trimmer (potentiometer) pin.
pub const TRIMMER_PIN: PinId = crate::emulator::A0;

/// The four independent LEDs, leftmost first (active low).
pub const LED_PINS: [PinId; 4] = [13, 12, 11, 10];

/// The three buttons (pulled up, active low).
pub const BUTTON_PINS: [PinId; 3] = [A1, A2, A3];

/// Number of digits on the 7-segment display.
pub const SEG_DIGITS: u8 = 4;

/// Default demultiplexer window for the LED group.
pub const LED_DEMUX_WINDOW: LogTime = 10_000;
/// Default aggregator window for the LED group.
pub const LED_AGG_WINDOW: LogTime = 50_000;
/// Default demultiplexer window for the 7-segment display.
pub const SEG_DEMUX_WINDOW: LogTime = 15_000;
/// Default aggregator window for the 7-segment display.
pub const SEG_AGG_WINDOW: LogTime = 30_000;

/// Default duration a scheduled click holds the button down.
pub const CLICK_DURATION: LogTime = 100_000;

/// Simulation controller for a funshield attached to the emulated board.
pub struct FunshieldController {
    sim: SimulationController,
    leds: ConsumerKey,
    seg: ConsumerKey,
    /// Delay between two bounce transitions; zero disables bouncing.
    bounce_delay: LogTime
}

impl FunshieldController {
    /// Wires the shield: registers all pins and attaches the LED panel and
    /// the 7-segment display model to their pins.
    pub fn new(emulator: Emulator, firmware: Box<dyn Firmware>) -> Result<Self, Error> {
        let mut sim = SimulationController::new(emulator, firmware);

        for pin in BUTTON_PINS {
            sim.register_pin(pin, Some(PinDir::Input))?;
        }
        for pin in LED_PINS.iter().chain([LATCH_PIN, CLOCK_PIN, DATA_PIN].iter()) {
            sim.register_pin(*pin, Some(PinDir::Output))?;
        }

        let leds = sim
            .emulator_mut()
            .pipeline_mut()
            .insert(LedPanel::new(&LED_PINS)?);
        for pin in LED_PINS {
            sim.attach_pin_events_consumer(pin, leds)?;
        }

        let seg = sim
            .emulator_mut()
            .pipeline_mut()
            .insert(SegDisplay::new(DATA_PIN, CLOCK_PIN, LATCH_PIN, SEG_DIGITS));
        for pin in [DATA_PIN, CLOCK_PIN, LATCH_PIN] {
            sim.attach_pin_events_consumer(pin, seg)?;
        }

        Ok(Self { sim, leds, seg, bounce_delay: 0 })
    }

    /// The underlying board-level controller.
    pub fn arduino(&self) -> &SimulationController {
        &self.sim
    }

    /// Mutable access to the underlying board-level controller.
    pub fn arduino_mut(&mut self) -> &mut SimulationController {
        &mut self.sim
    }

    /// The pipeline node of the LED panel (attach sprouts here).
    pub fn leds_node(&self) -> ConsumerKey {
        self.leds
    }

    /// The pipeline node of the 7-segment display model.
    pub fn seg_node(&self) -> ConsumerKey {
        self.seg
    }

    /// The current reconstructed LED state.
    pub fn leds_state(&self) -> BitArray {
        match self.sim.emulator().pipeline().func(self.leds) {
            Some(ConsumerFn::LedPanel(panel)) => panel.state(),
            _ => BitArray::new()
        }
    }

    /// The current reconstructed 7-segment state.
    pub fn seg_state(&self) -> BitArray {
        match self.sim.emulator().pipeline().func(self.seg) {
            Some(ConsumerFn::SegDisplay(display)) => display.state(),
            _ => BitArray::new()
        }
    }

    /// Enables bounce synthesis with the given delay between transitions
    /// (zero disables it).
    pub fn set_bounce_delay(&mut self, delay: LogTime) {
        self.bounce_delay = delay;
    }

    /// Schedules a button press after the given delay.
    pub fn button_down(&mut self, button: usize, delay: LogTime) -> Result<(), Error> {
        self.button_event(button, 0, delay, true)
    }

    /// Schedules a button release after the given delay.
    pub fn button_up(&mut self, button: usize, delay: LogTime) -> Result<(), Error> {
        self.button_event(button, 1, delay, true)
    }

    /// Schedules a full click: the button goes down after `delay` and up
    /// again `duration` later.
    pub fn button_click(&mut self, button: usize, duration: LogTime, delay: LogTime) -> Result<(), Error> {
        let bouncing = self.bounce_delay > 0 && self.bounce_delay * 10 <= duration;
        self.button_event(button, 0, delay, bouncing)?;
        self.button_event(button, 1, delay + duration, bouncing)
    }

    fn button_event(&mut self, button: usize, value: i32, delay: LogTime, bouncing: bool) -> Result<(), Error> {
        assert!(button < BUTTON_PINS.len(), "button index out of range");
        self.sim.enqueue_pin_change(BUTTON_PINS[button], value, delay)?;

        if bouncing && self.bounce_delay > 0 {
            let mut at = delay;
            for _ in 0..3 {
                at += self.bounce_delay;
                self.button_event(button, value ^ 1, at, false)?;
                at += self.bounce_delay;
                self.button_event(button, value, at, false)?;
            }
        }
        Ok(())
    }

    /// Builds the customary smoothing chain off the LED panel sprout
    /// (demultiplexer, then aggregator, then a recorder) and returns the
    /// recorder's key.
    pub fn smooth_led_log(&mut self, demux_window: LogTime, agg_window: LogTime) -> Result<ConsumerKey, Error> {
        let pipeline = self.sim.emulator_mut().pipeline_mut();
        let demux = pipeline.insert(Demultiplexer::with_window(LED_PINS.len() as u8, demux_window)?);
        let agg = pipeline.insert(Aggregator::new(LED_PINS.len() as u8, agg_window)?);
        let recorder = pipeline.insert(Recorder::new(ValueKind::Bits));
        pipeline.attach_next(demux, agg)?;
        pipeline.attach_next(agg, recorder)?;
        pipeline.attach_sprout(self.leds, demux)?;
        log::debug!("LED smoothing chain: demux {demux_window} us, aggregate {agg_window} us");
        Ok(recorder)
    }

    /// Records raw LED panel states without smoothing.
    pub fn raw_led_log(&mut self) -> Result<ConsumerKey, Error> {
        let pipeline = self.sim.emulator_mut().pipeline_mut();
        let recorder = pipeline.insert(Recorder::new(ValueKind::Bits));
        pipeline.attach_sprout(self.leds, recorder)?;
        Ok(recorder)
    }

    /// Builds the customary smoothing chain off the 7-segment display
    /// sprout and returns the recorder's key.
    pub fn smooth_seg_log(&mut self, demux_window: LogTime, agg_window: LogTime) -> Result<ConsumerKey, Error> {
        let width = SEG_DIGITS * 8;
        let pipeline = self.sim.emulator_mut().pipeline_mut();
        let demux = pipeline.insert(Demultiplexer::with_window(width, demux_window)?);
        let agg = pipeline.insert(Aggregator::new(width, agg_window)?);
        let recorder = pipeline.insert(Recorder::new(ValueKind::Bits));
        pipeline.attach_next(demux, agg)?;
        pipeline.attach_next(agg, recorder)?;
        pipeline.attach_sprout(self.seg, demux)?;
        log::debug!("7-seg smoothing chain: demux {demux_window} us, aggregate {agg_window} us");
        Ok(recorder)
    }

    /// Records raw 7-segment states without smoothing.
    pub fn raw_seg_log(&mut self) -> Result<ConsumerKey, Error> {
        let pipeline = self.sim.emulator_mut().pipeline_mut();
        let recorder = pipeline.insert(Recorder::new(ValueKind::Bits));
        pipeline.attach_sprout(self.seg, recorder)?;
        Ok(recorder)
    }
}
