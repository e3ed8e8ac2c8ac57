//! A single virtual digital pin.
//!
//! A pin is simultaneously the head of the consumer chain carrying its own
//! state events (observers of an output pin hang off its `next` link) and,
//! when wired as input, the terminal consumer of an externally scheduled
//! input stream.

use crate::chain::{Consumer, Emits, Value, ValueKind};
use crate::error::Error;
use crate::PinId;

/// Direction a pin is wired or configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinDir {
    /// The pin accepts external signals.
    Input,
    /// The pin is driven by the tested program.
    Output
}

/// Records one change of the value of a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PinState {
    /// Pin identifier.
    pub pin: PinId,
    /// New value (either written or received as input).
    pub value: i32
}

impl PinState {
    /// Value of a pin that has not been driven yet.
    pub const UNDEFINED: i32 = -1;

    /// Creates a pin-state record.
    pub fn new(pin: PinId, value: i32) -> Self {
        Self { pin, value }
    }

    /// Helper for tests: attaches the same pin number to a list of values.
    pub fn sequence(pin: PinId, values: impl IntoIterator<Item = i32>) -> Vec<PinState> {
        values.into_iter().map(|value| PinState::new(pin, value)).collect()
    }
}

impl std::fmt::Display for PinState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.pin, self.value)
    }
}

/// One digital pin of the emulated board.
#[derive(Debug)]
pub struct Pin {
    state: PinState,
    wiring: Option<PinDir>,
    mode: Option<PinDir>
}

impl Pin {
    /// Creates a pin with the given hardware wiring (if known up front).
    pub fn new(pin: PinId, wiring: Option<PinDir>) -> Self {
        Self {
            state: PinState::new(pin, PinState::UNDEFINED),
            wiring,
            mode: None
        }
    }

    /// The pin number.
    pub fn id(&self) -> PinId {
        self.state.pin
    }

    /// How the pin is physically wired.
    pub fn wiring(&self) -> Option<PinDir> {
        self.wiring
    }

    /// The operating mode selected by the tested program.
    pub fn mode(&self) -> Option<PinDir> {
        self.mode
    }

    /// The current value (-1 while undefined).
    pub fn value(&self) -> i32 {
        self.state.value
    }

    /// Returns the pin to its pre-`setup()` state. Wiring is hardware and
    /// survives.
    pub(crate) fn reinitialize(&mut self) {
        self.mode = None;
        self.state.value = PinState::UNDEFINED;
    }

    /// Selects the operating mode. This can be done only once (typically in
    /// `setup()`), and an input-wired pin can never become an output.
    pub fn set_mode(&mut self, mode: PinDir) -> Result<(), Error> {
        if self.mode.is_some_and(|m| m != mode) {
            return Err(Error::ModeChange { pin: self.id() });
        }
        if self.wiring == Some(PinDir::Input) && mode == PinDir::Output {
            return Err(Error::WiringConflict { pin: self.id() });
        }

        self.mode = Some(mode);

        // input pins are pulled up
        if self.mode == Some(PinDir::Input) && self.state.value == PinState::UNDEFINED {
            self.state.value = 1;
        }
        Ok(())
    }

    /// Reads the binary value of the pin. Valid only for input pins.
    pub fn read(&self) -> Result<i32, Error> {
        match self.mode {
            None => Err(Error::ModeNotSet { pin: self.id() }),
            Some(PinDir::Output) => Err(Error::ReadFromOutput { pin: self.id() }),
            Some(PinDir::Input) => Ok(self.state.value)
        }
    }

    /// Checks that a write through the API is permitted right now.
    pub(crate) fn ensure_writable(&self) -> Result<(), Error> {
        match self.mode {
            None => Err(Error::ModeNotSet { pin: self.id() }),
            Some(PinDir::Input) => Err(Error::WriteToInput { pin: self.id() }),
            Some(PinDir::Output) => Ok(())
        }
    }
}

impl Consumer for Pin {
    fn input_kind(&self) -> ValueKind {
        ValueKind::Pin
    }

    fn consume(&mut self, time: crate::LogTime, value: Value, out: &mut Emits) -> Result<(), Error> {
        let Some(event) = value.pin() else {
            unreachable!("pin received a non-pin payload");
        };
        if event.pin == self.state.pin {
            self.state.value = event.value;
        }
        out.event_next(time, value);
        Ok(())
    }
}
