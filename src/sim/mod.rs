//! Driving tested programs under the virtual clock.
//!
//! [`SimulationController`] is the public façade of the harness: it owns the
//! emulator and the tested [`Firmware`], schedules button and serial inputs
//! ahead of time, and advances the simulation by invoking `setup()` and
//! `loop()` on the firmware.

use std::collections::{BTreeMap, VecDeque};

use crate::chain::{ConsumerKey, InputQueue, ValueKind};
use crate::emulator::pin::{PinDir, PinState};
use crate::emulator::{ApiMethod, Emulator};
use crate::error::Error;
use crate::{LogTime, PinId};

pub mod funshield;

/// The user-program contract: an initialization procedure and a loop body.
///
/// Implementations receive the emulator and talk to it through the
/// Arduino-style API surface, exactly like a sketch talks to the board.
pub trait Firmware {
    /// Called once at the start of the simulation.
    fn setup(&mut self, emulator: &mut Emulator) -> Result<(), Error>;

    /// One iteration of the main loop.
    fn loop_iter(&mut self, emulator: &mut Emulator) -> Result<(), Error>;
}

/// Drives an [`Emulator`] and the tested firmware for one simulation.
pub struct SimulationController {
    emulator: Emulator,
    firmware: Box<dyn Firmware>,
    /// Input buffers (future time series) keyed by the pin they feed.
    input_buffers: BTreeMap<PinId, ConsumerKey>,
    /// Serial strings scheduled for delivery, ordered by time.
    serial_schedule: VecDeque<(LogTime, String)>
}

impl SimulationController {
    /// Takes ownership of the emulator, resets it and enables every API
    /// method.
    pub fn new(mut emulator: Emulator, firmware: Box<dyn Firmware>) -> Self {
        emulator.remove_all_pins();
        emulator.reset();
        for method in ApiMethod::ALL {
            emulator.set_method_enabled(method, true);
        }
        Self {
            emulator,
            firmware,
            input_buffers: BTreeMap::new(),
            serial_schedule: VecDeque::new()
        }
    }

    /// Current simulation (logical) time.
    pub fn current_time(&self) -> LogTime {
        self.emulator.current_time()
    }

    /// The driven emulator.
    pub fn emulator(&self) -> &Emulator {
        &self.emulator
    }

    /// Mutable access to the driven emulator.
    pub fn emulator_mut(&mut self) -> &mut Emulator {
        &mut self.emulator
    }

    /// Enables the named API method.
    pub fn enable_method(&mut self, name: &str) -> Result<(), Error> {
        self.set_method_flag(name, true)
    }

    /// Disables the named API method; the tested code calling it is an
    /// emulator violation.
    pub fn disable_method(&mut self, name: &str) -> Result<(), Error> {
        self.set_method_flag(name, false)
    }

    fn set_method_flag(&mut self, name: &str, enabled: bool) -> Result<(), Error> {
        let method = ApiMethod::from_name(name).ok_or_else(|| Error::UnknownMethod {
            name: name.to_string()
        })?;
        self.emulator.set_method_enabled(method, enabled);
        Ok(())
    }

    /// Registers a new pin with the given wiring.
    pub fn register_pin(&mut self, pin: PinId, wiring: Option<PinDir>) -> Result<(), Error> {
        self.emulator.register_pin(pin, wiring)
    }

    /// Attaches an event consumer to a pin; it receives all events the pin
    /// produces.
    pub fn attach_pin_events_consumer(&mut self, pin: PinId, consumer: ConsumerKey) -> Result<(), Error> {
        self.emulator.attach_pin_events_consumer(pin, consumer)
    }

    /// Current value of a pin.
    pub fn pin_value(&self, pin: PinId) -> Result<i32, Error> {
        Ok(self.emulator.pin(pin)?.value())
    }

    /// Enqueues a change of an input pin at the current time plus `delay`.
    pub fn enqueue_pin_change(&mut self, pin: PinId, value: i32, delay: LogTime) -> Result<(), Error> {
        let time = self.emulator.current_time() + delay;
        let queue = match self.input_buffers.get(&pin) {
            Some(&queue) => queue,
            None => {
                let queue = self.emulator.pipeline_mut().insert(InputQueue::new(ValueKind::Pin));
                self.emulator.register_pin_input(pin, queue)?;
                self.input_buffers.insert(pin, queue);
                queue
            }
        };
        self.emulator.pipeline_mut().schedule(queue, time, PinState::new(pin, value))
    }

    /// Schedules a string to appear on the serial line at the current time
    /// plus `delay`. Serial inputs must be scheduled in order.
    pub fn enqueue_serial_input(&mut self, input: &str, delay: LogTime) -> Result<(), Error> {
        let time = self.emulator.current_time() + delay;
        if let Some(&(last, _)) = self.serial_schedule.back() {
            if last > time {
                return Err(Error::SerialOutOfOrder { last, time });
            }
        }
        self.serial_schedule.push_back((time, input.to_string()));
        Ok(())
    }

    /// The input buffer feeding a pin, if one has been created.
    pub fn input_buffer(&self, pin: PinId) -> Option<ConsumerKey> {
        self.input_buffers.get(&pin).copied()
    }

    /// Clears all events recorded in a pin's chain.
    pub fn clear_pin_events(&mut self, pin: PinId) -> Result<(), Error> {
        let node = self.emulator.pin_node(pin)?;
        self.emulator.pipeline_mut().clear(node);
        Ok(())
    }

    /// Removes all scheduled serial inputs.
    pub fn clear_serial_input(&mut self) {
        self.serial_schedule.clear();
    }

    fn advance_by(&mut self, us: LogTime) -> Result<(), Error> {
        self.emulator.advance_by(us)?;
        let now = self.emulator.current_time();
        while let Some(&(time, _)) = self.serial_schedule.front() {
            if time > now {
                break;
            }
            if let Some((_, text)) = self.serial_schedule.pop_front() {
                self.emulator.add_serial_data(&text);
            }
        }
        Ok(())
    }

    /// Invokes the firmware's `setup()` and advances the clock afterwards.
    pub fn run_setup(&mut self, post_delay: LogTime) -> Result<(), Error> {
        log::debug!("running setup() at t={}", self.current_time());
        self.firmware.setup(&mut self.emulator)?;
        self.advance_by(post_delay)
    }

    /// Invokes one iteration of the firmware's loop body and advances the
    /// clock afterwards.
    pub fn run_single_loop(&mut self, post_delay: LogTime) -> Result<(), Error> {
        self.firmware.loop_iter(&mut self.emulator)?;
        self.advance_by(post_delay)
    }

    /// Runs the loop the given number of times. The callback receives the
    /// time after each iteration; returning `false` stops the driver at the
    /// next loop boundary.
    pub fn run_multiple_loops(
        &mut self,
        count: usize,
        post_delay: LogTime,
        mut callback: impl FnMut(LogTime) -> bool
    ) -> Result<(), Error> {
        for _ in 0..count {
            self.run_single_loop(post_delay)?;
            if !callback(self.current_time()) {
                break;
            }
        }
        Ok(())
    }

    /// Runs loop iterations until the given virtual-time period has passed.
    pub fn run_loops_for_period(
        &mut self,
        period: LogTime,
        post_delay: LogTime,
        mut callback: impl FnMut(LogTime) -> bool
    ) -> Result<(), Error> {
        let end_time = self.current_time() + period;
        log::debug!("running loop() until t={end_time}");
        while self.current_time() < end_time {
            self.run_single_loop(post_delay)?;
            if !callback(self.current_time()) {
                break;
            }
        }
        Ok(())
    }
}
