//! Deterministic virtual-time emulator and testing harness for small
//! Arduino-style programs driving a funshield (three buttons, four LEDs and
//! a serial-register 7-segment display).
//!
//! A test supplies a timeline of button and serial inputs; the harness runs
//! the tested [`Firmware`] under a virtual clock, records per-pin
//! transitions, reconstructs the peripheral state from the multiplexed
//! output signals and exposes the resulting event logs for assertions.
//!
//! ## The crate notably consists of:
//! - **[`bitarray`]**: fixed-capacity bit vectors and the serial shift register
//! - **[`series`]**: time-ordered event logs with analytical queries
//! - **[`chain`]**: the consumer pipeline events flow through, including the
//!   demultiplexer/aggregator filters and the display models
//! - **[`emulator`]**: the virtual board and its Arduino-style API surface
//! - **[`sim`]**: the simulation controllers driving `setup()`/`loop()`
//! - **[`glyphs`]**: the pure 7-segment interpreter used by assertions
//! - **[`scenario`] and [`export`]**: the input file format and the CSV/JSON
//!   event logs

pub mod bitarray;
pub mod chain;
pub mod emulator;
pub mod error;
pub mod export;
pub mod glyphs;
pub mod scenario;
pub mod series;
pub mod sim;

/// Logical time: microseconds elapsed since the simulation started.
pub type LogTime = u64;

/// Identifier of a digital pin.
pub type PinId = u8;

pub use bitarray::{BitArray, ShiftRegister};
pub use chain::{ConsumerKey, Pipeline, Value, ValueKind, OFF, ON};
pub use emulator::Emulator;
pub use error::Error;
pub use glyphs::SegInterpreter;
pub use scenario::Scenario;
pub use series::{Range, TimeSeries};
pub use sim::funshield::FunshieldController;
pub use sim::{Firmware, SimulationController};
