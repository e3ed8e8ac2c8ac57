//! The emulator core: virtual clock, pin registry and the Arduino-style API.
//!
//! Virtual time advances only as a side-effect of API calls (each entry
//! point charges a fixed cost in microseconds) and of the simulation
//! controller's driver methods. Advancing time walks all scheduled input
//! streams and releases every event whose timestamp has been reached, in
//! chronological order.

use std::collections::{BTreeMap, HashSet, VecDeque};

use crate::chain::{ConsumerKey, ConsumerFn, Pipeline};
use crate::error::Error;
use crate::{LogTime, PinId};

use self::pin::{Pin, PinDir, PinState};

pub mod global;
pub mod pin;

/// Electrical high level.
pub const HIGH: u8 = 0x1;
/// Electrical low level.
pub const LOW: u8 = 0x0;
/// `pinMode` argument selecting input mode.
pub const INPUT: u8 = 0x0;
/// `pinMode` argument selecting output mode.
pub const OUTPUT: u8 = 0x1;
/// The on-board LED pin.
pub const LED_BUILTIN: PinId = 13;

/// Analog pin A0.
pub const A0: PinId = 14;
/// Analog pin A1.
pub const A1: PinId = 15;
/// Analog pin A2.
pub const A2: PinId = 16;
/// Analog pin A3.
pub const A3: PinId = 17;

/// Whether the given pin supports PWM output on the emulated board.
pub fn digital_pin_has_pwm(pin: PinId) -> bool {
    matches!(pin, 3 | 5 | 6 | 9 | 10 | 11)
}

/// Bit order of `shiftOut`/`shiftIn` transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOrder {
    /// Least significant bit first.
    LsbFirst,
    /// Most significant bit first.
    MsbFirst
}

/// All Arduino-style API entry points that can be gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ApiMethod {
    PinMode,
    DigitalWrite,
    DigitalRead,
    AnalogRead,
    AnalogReference,
    AnalogWrite,
    Millis,
    Micros,
    Delay,
    DelayMicroseconds,
    PulseIn,
    PulseInLong,
    ShiftOut,
    ShiftIn,
    Tone,
    NoTone,
    Serial
}

impl ApiMethod {
    /// Every method the gate knows.
    pub const ALL: [ApiMethod; 17] = [
        ApiMethod::PinMode,
        ApiMethod::DigitalWrite,
        ApiMethod::DigitalRead,
        ApiMethod::AnalogRead,
        ApiMethod::AnalogReference,
        ApiMethod::AnalogWrite,
        ApiMethod::Millis,
        ApiMethod::Micros,
        ApiMethod::Delay,
        ApiMethod::DelayMicroseconds,
        ApiMethod::PulseIn,
        ApiMethod::PulseInLong,
        ApiMethod::ShiftOut,
        ApiMethod::ShiftIn,
        ApiMethod::Tone,
        ApiMethod::NoTone,
        ApiMethod::Serial
    ];

    /// The Arduino-style name of the method.
    pub fn name(self) -> &'static str {
        match self {
            ApiMethod::PinMode => "pinMode",
            ApiMethod::DigitalWrite => "digitalWrite",
            ApiMethod::DigitalRead => "digitalRead",
            ApiMethod::AnalogRead => "analogRead",
            ApiMethod::AnalogReference => "analogReference",
            ApiMethod::AnalogWrite => "analogWrite",
            ApiMethod::Millis => "millis",
            ApiMethod::Micros => "micros",
            ApiMethod::Delay => "delay",
            ApiMethod::DelayMicroseconds => "delayMicroseconds",
            ApiMethod::PulseIn => "pulseIn",
            ApiMethod::PulseInLong => "pulseInLong",
            ApiMethod::ShiftOut => "shiftOut",
            ApiMethod::ShiftIn => "shiftIn",
            ApiMethod::Tone => "tone",
            ApiMethod::NoTone => "noTone",
            ApiMethod::Serial => "serial"
        }
    }

    /// Resolves an Arduino-style name back to the method.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }
}

/// Per-method enable flags. All methods except `serial` start enabled.
#[derive(Debug, Clone)]
struct ApiGate {
    disabled: HashSet<ApiMethod>
}

impl Default for ApiGate {
    fn default() -> Self {
        Self { disabled: HashSet::from([ApiMethod::Serial]) }
    }
}

impl ApiGate {
    fn check(&self, method: ApiMethod) -> Result<(), Error> {
        if self.disabled.contains(&method) {
            return Err(Error::MethodDisabled { name: method.name() });
        }
        Ok(())
    }

    fn set_enabled(&mut self, method: ApiMethod, enabled: bool) {
        if enabled {
            self.disabled.remove(&method);
        } else {
            self.disabled.insert(method);
        }
    }

    fn enabled(&self, method: ApiMethod) -> bool {
        !self.disabled.contains(&method)
    }
}

/// The emulated board: virtual clock, pins, input streams and serial buffer.
#[derive(Debug)]
pub struct Emulator {
    time: LogTime,
    pipeline: Pipeline,
    pins: BTreeMap<PinId, ConsumerKey>,
    inputs: BTreeMap<PinId, ConsumerKey>,
    serial_rx: VecDeque<u8>,
    gate: ApiGate,
    read_cost: LogTime,
    write_cost: LogTime,
    mode_cost: LogTime
}

impl Emulator {
    /// Creates an emulator with no pins registered and the documented
    /// default timing costs.
    pub fn new() -> Self {
        Self {
            time: 0,
            pipeline: Pipeline::new(),
            pins: BTreeMap::new(),
            inputs: BTreeMap::new(),
            serial_rx: VecDeque::new(),
            gate: ApiGate::default(),
            read_cost: 20,
            write_cost: 20,
            mode_cost: 100
        }
    }

    /// Current virtual time in microseconds.
    pub fn current_time(&self) -> LogTime {
        self.time
    }

    /// The consumer pipeline all pins and observers live in.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Mutable access to the consumer pipeline.
    pub fn pipeline_mut(&mut self) -> &mut Pipeline {
        &mut self.pipeline
    }

    /// Overrides the virtual-time cost of pin operations.
    pub fn set_pin_op_costs(&mut self, read: LogTime, write: LogTime, mode: LogTime) {
        self.read_cost = read;
        self.write_cost = write;
        self.mode_cost = mode;
    }

    /// Enables or disables an API method.
    pub fn set_method_enabled(&mut self, method: ApiMethod, enabled: bool) {
        self.gate.set_enabled(method, enabled);
    }

    /// Whether an API method is currently enabled.
    pub fn method_enabled(&self, method: ApiMethod) -> bool {
        self.gate.enabled(method)
    }

    // --- pin registry -----------------------------------------------------

    /// Registers a new pin with the given wiring.
    pub fn register_pin(&mut self, pin: PinId, wiring: Option<PinDir>) -> Result<(), Error> {
        if self.pins.contains_key(&pin) {
            return Err(Error::DuplicatePin { pin });
        }
        let key = self.pipeline.insert(Pin::new(pin, wiring));
        self.pins.insert(pin, key);
        Ok(())
    }

    /// Removes all registered pins and their input streams.
    pub fn remove_all_pins(&mut self) {
        for (_, key) in self.pins.iter().chain(self.inputs.iter()) {
            self.pipeline.remove(*key);
        }
        self.pins.clear();
        self.inputs.clear();
    }

    /// The pipeline key of a pin's chain head.
    pub fn pin_node(&self, pin: PinId) -> Result<ConsumerKey, Error> {
        self.pins.get(&pin).copied().ok_or(Error::UnknownPin { pin })
    }

    /// Immutable access to a registered pin.
    pub fn pin(&self, pin: PinId) -> Result<&Pin, Error> {
        let key = self.pin_node(pin)?;
        match self.pipeline.func(key) {
            Some(ConsumerFn::Pin(p)) => Ok(p),
            _ => Err(Error::UnknownPin { pin })
        }
    }

    fn pin_mut(&mut self, pin: PinId) -> Result<&mut Pin, Error> {
        let key = self.pin_node(pin)?;
        match self.pipeline.func_mut(key) {
            Some(ConsumerFn::Pin(p)) => Ok(p),
            _ => Err(Error::UnknownPin { pin })
        }
    }

    /// Attaches an event consumer at the end of a pin's observer chain.
    pub fn attach_pin_events_consumer(&mut self, pin: PinId, consumer: ConsumerKey) -> Result<(), Error> {
        let head = self.pin_node(pin)?;
        let tail = self.pipeline.last_consumer(head);
        self.pipeline.attach_next(tail, consumer)
    }

    /// Registers an event chain as the input stream of a pin. The pin itself
    /// is appended as the terminal consumer of that chain; a previously
    /// registered stream is detached first.
    pub fn register_pin_input(&mut self, pin: PinId, input: ConsumerKey) -> Result<(), Error> {
        let pin_node = self.pin_node(pin)?;
        if self.pin(pin)?.wiring() != Some(PinDir::Input) {
            return Err(Error::NotAnInput { pin });
        }

        if let Some(&old) = self.inputs.get(&pin) {
            // detach the old chain right where it feeds the pin
            let mut cursor = old;
            loop {
                match self.pipeline.next_of(cursor) {
                    Some(next) if next == pin_node => {
                        self.pipeline.detach_next(cursor)?;
                        break;
                    }
                    Some(next) => cursor = next,
                    None => break
                }
            }
        }

        let tail = self.pipeline.last_consumer(input);
        self.pipeline.attach_next(tail, pin_node)?;
        self.inputs.insert(pin, input);
        Ok(())
    }

    /// Restarts the virtual clock and the state of all pins and inputs.
    pub fn reset(&mut self) {
        self.time = 0;
        self.serial_rx.clear();

        let inputs: Vec<ConsumerKey> = self.inputs.values().copied().collect();
        for key in inputs {
            self.pipeline.clear(key);
        }
        let pins: Vec<PinId> = self.pins.keys().copied().collect();
        for pin in pins {
            if let Ok(p) = self.pin_mut(pin) {
                p.reinitialize();
            }
        }
    }

    /// Advances the virtual clock by the given number of microseconds,
    /// releasing all scheduled input events whose time has come.
    pub fn advance_by(&mut self, us: LogTime) -> Result<(), Error> {
        self.time += us;
        let time = self.time;

        let inputs: Vec<ConsumerKey> = self.inputs.values().copied().collect();
        for key in inputs {
            self.pipeline.advance_time(key, time)?;
        }
        let pins: Vec<ConsumerKey> = self.pins.values().copied().collect();
        for key in pins {
            self.pipeline.advance_time(key, time)?;
        }
        Ok(())
    }

    // --- Arduino API: pins ------------------------------------------------

    /// Configures the specified pin to behave either as an input or an
    /// output.
    pub fn pin_mode(&mut self, pin: PinId, mode: u8) -> Result<(), Error> {
        self.gate.check(ApiMethod::PinMode)?;

        let dir = match mode {
            INPUT => PinDir::Input,
            OUTPUT => PinDir::Output,
            _ => return Err(Error::InvalidMode { pin, mode })
        };
        self.pin_mut(pin)?.set_mode(dir)?;
        let cost = self.mode_cost;
        self.advance_by(cost)
    }

    /// Writes a HIGH or a LOW value to a digital pin.
    pub fn digital_write(&mut self, pin: PinId, value: u8) -> Result<(), Error> {
        self.gate.check(ApiMethod::DigitalWrite)?;

        let key = self.pin_node(pin)?;
        self.pin(pin)?.ensure_writable()?;
        let time = self.time;
        self.pipeline.add_event(key, time, PinState::new(pin, i32::from(value)))?;
        let cost = self.write_cost;
        self.advance_by(cost)
    }

    /// Reads the value from a specified digital pin, either HIGH or LOW.
    pub fn digital_read(&mut self, pin: PinId) -> Result<i32, Error> {
        self.gate.check(ApiMethod::DigitalRead)?;

        let value = self.pin(pin)?.read()?;
        let cost = self.read_cost;
        self.advance_by(cost)?;
        Ok(value)
    }

    /// Reads the value from the specified analog pin.
    ///
    /// The emulator has no voltage model; the binary pin value is scaled to
    /// the full ADC range.
    pub fn analog_read(&mut self, pin: PinId) -> Result<i32, Error> {
        self.gate.check(ApiMethod::AnalogRead)?;

        let value = self.pin(pin)?.read()?;
        let cost = self.read_cost;
        self.advance_by(cost)?;
        Ok(value * 1023)
    }

    /// Configures the reference voltage used for analog input.
    pub fn analog_reference(&mut self, _mode: u8) -> Result<(), Error> {
        self.gate.check(ApiMethod::AnalogReference)?;
        Err(Error::Unsupported { name: "analogReference" })
    }

    /// Writes an analog value (PWM wave) to a pin.
    pub fn analog_write(&mut self, pin: PinId, _value: i32) -> Result<(), Error> {
        self.gate.check(ApiMethod::AnalogWrite)?;
        if !digital_pin_has_pwm(pin) {
            return Err(Error::NotPwmPin { pin });
        }
        Err(Error::Unsupported { name: "analogWrite" })
    }

    // --- Arduino API: timing ----------------------------------------------

    /// Milliseconds elapsed since the program started.
    pub fn millis(&self) -> Result<u64, Error> {
        self.gate.check(ApiMethod::Millis)?;
        Ok(self.time / 1000)
    }

    /// Microseconds elapsed since the program started.
    pub fn micros(&self) -> Result<u64, Error> {
        self.gate.check(ApiMethod::Micros)?;
        Ok(self.time)
    }

    /// Pauses the program for the given number of milliseconds.
    pub fn delay(&mut self, ms: u64) -> Result<(), Error> {
        self.gate.check(ApiMethod::Delay)?;
        self.advance_by(1000 * ms)
    }

    /// Pauses the program for the given number of microseconds.
    pub fn delay_microseconds(&mut self, us: u64) -> Result<(), Error> {
        self.gate.check(ApiMethod::DelayMicroseconds)?;
        self.advance_by(us)
    }

    // --- Arduino API: advanced I/O ----------------------------------------

    /// Reads a pulse (either HIGH or LOW) on a pin.
    pub fn pulse_in(&mut self, _pin: PinId, _state: u8, _timeout: LogTime) -> Result<LogTime, Error> {
        self.gate.check(ApiMethod::PulseIn)?;
        Err(Error::Unsupported { name: "pulseIn" })
    }

    /// An alternative to `pulseIn` for long pulses.
    pub fn pulse_in_long(&mut self, _pin: PinId, _state: u8, _timeout: LogTime) -> Result<LogTime, Error> {
        self.gate.check(ApiMethod::PulseInLong)?;
        Err(Error::Unsupported { name: "pulseInLong" })
    }

    /// Shifts out a byte of data one bit at a time.
    ///
    /// Defined in terms of eight digital writes per data bit plus the clock
    /// pulses; no further time is charged.
    pub fn shift_out(&mut self, data_pin: PinId, clock_pin: PinId, order: BitOrder, value: u8) -> Result<(), Error> {
        self.gate.check(ApiMethod::ShiftOut)?;

        let mut value = value;
        for _ in 0..8 {
            match order {
                BitOrder::LsbFirst => {
                    self.digital_write(data_pin, value & 1)?;
                    value >>= 1;
                }
                BitOrder::MsbFirst => {
                    self.digital_write(data_pin, u8::from(value & 128 != 0))?;
                    value <<= 1;
                }
            }
            self.digital_write(clock_pin, HIGH)?;
            self.digital_write(clock_pin, LOW)?;
        }
        Ok(())
    }

    /// Shifts in a byte of data one bit at a time.
    pub fn shift_in(&mut self, data_pin: PinId, clock_pin: PinId, order: BitOrder) -> Result<u8, Error> {
        self.gate.check(ApiMethod::ShiftIn)?;

        let mut value = 0u8;
        for i in 0..8 {
            self.digital_write(clock_pin, HIGH)?;
            let bit = (self.digital_read(data_pin)? & 1) as u8;
            match order {
                BitOrder::LsbFirst => value |= bit << i,
                BitOrder::MsbFirst => value |= bit << (7 - i)
            }
            self.digital_write(clock_pin, LOW)?;
        }
        Ok(value)
    }

    /// Generates a square wave on a pin.
    pub fn tone(&mut self, _pin: PinId, _frequency: u32, _duration: u64) -> Result<(), Error> {
        self.gate.check(ApiMethod::Tone)?;
        Err(Error::Unsupported { name: "tone" })
    }

    /// Stops the square wave triggered by `tone`.
    pub fn no_tone(&mut self, _pin: PinId) -> Result<(), Error> {
        self.gate.check(ApiMethod::NoTone)?;
        Err(Error::Unsupported { name: "noTone" })
    }

    // --- Arduino API: serial ----------------------------------------------

    /// Whether the serial interface is enabled.
    pub fn is_serial_enabled(&self) -> bool {
        self.gate.enabled(ApiMethod::Serial)
    }

    /// Number of bytes waiting in the serial receive buffer.
    pub fn serial_available(&self) -> Result<usize, Error> {
        self.gate.check(ApiMethod::Serial)?;
        Ok(self.serial_rx.len())
    }

    /// The next byte of the serial receive buffer without consuming it.
    pub fn peek_serial(&self) -> Result<Option<u8>, Error> {
        self.gate.check(ApiMethod::Serial)?;
        Ok(self.serial_rx.front().copied())
    }

    /// Consumes and returns the next byte of the serial receive buffer.
    pub fn read_serial(&mut self) -> Result<Option<u8>, Error> {
        self.gate.check(ApiMethod::Serial)?;
        Ok(self.serial_rx.pop_front())
    }

    /// Appends data to the serial receive buffer (harness side).
    pub fn add_serial_data(&mut self, data: &str) {
        self.serial_rx.extend(data.bytes());
    }
}
