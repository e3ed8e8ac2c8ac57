//! Display models reconstructing visible state from raw pin events.
//!
//! [`LedPanel`] folds the events of several independently wired LEDs into a
//! single bit-array state. [`SegDisplay`] watches the data/clock/latch pins
//! of the serial shift register driving the 7-segment display and rebuilds
//! the glyph shown on each digit. Both are forked consumers: pin events pass
//! through on `next`, reconstructed states come off the sprout.

use std::collections::BTreeMap;

use crate::bitarray::{BitArray, ShiftRegister};
use crate::chain::{Consumer, Emits, Value, ValueKind, OFF, ON};
use crate::error::Error;
use crate::{LogTime, PinId};

/// A bank of LEDs, each controlled by its own pin, folded into one
/// active-low bit-array state (bit i belongs to the i-th wired pin).
#[derive(Debug)]
pub struct LedPanel {
    state: BitArray,
    wiring: BTreeMap<PinId, u8>
}

impl LedPanel {
    /// Creates a panel over the given pins; pin `wiring[i]` drives LED `i`.
    pub fn new(wiring: &[PinId]) -> Result<Self, Error> {
        let mut map = BTreeMap::new();
        for (index, &pin) in wiring.iter().enumerate() {
            if map.insert(pin, index as u8).is_some() {
                return Err(Error::DuplicatePin { pin });
            }
        }
        Ok(Self {
            state: BitArray::repeat(OFF, wiring.len() as u8),
            wiring: map
        })
    }

    /// The current reconstructed LED state.
    pub fn state(&self) -> BitArray {
        self.state
    }

    /// The pins this panel listens to.
    pub fn pins(&self) -> impl Iterator<Item = PinId> + '_ {
        self.wiring.keys().copied()
    }
}

impl Consumer for LedPanel {
    fn input_kind(&self) -> ValueKind {
        ValueKind::Pin
    }

    fn sprout_kind(&self) -> Option<ValueKind> {
        Some(ValueKind::Bits)
    }

    fn consume(&mut self, time: LogTime, value: Value, out: &mut Emits) -> Result<(), Error> {
        let Some(event) = value.pin() else {
            unreachable!("LED panel received a non-pin payload");
        };

        let Some(&index) = self.wiring.get(&event.pin) else {
            // unknown pins are ignored, but time still advances
            out.advance_next(time);
            out.advance_sprout(time);
            return Ok(());
        };

        let level = if event.value == 0 { ON } else { OFF };
        if self.state.get(index) != Some(level) {
            let _ = self.state.set(index, level);
            out.event_sprout(time, self.state);
        }
        out.event_next(time, value);
        Ok(())
    }

    fn advance(&mut self, time: LogTime, out: &mut Emits) -> Result<(), Error> {
        out.advance_next(time);
        out.advance_sprout(time);
        Ok(())
    }

    fn reset(&mut self) {
        self.state.fill(OFF);
    }
}

/// 7-segment LED display driven through a serial shift register.
///
/// The model consumes pin events of three pins. A bit is shifted in on the
/// clock falling edge using the most recent data-pin sample; on the latch
/// rising edge the register decodes into the visible state: the low byte
/// selects digits, the high byte carries the active-low glyph, digits that
/// are not selected read all-ones (blank).
#[derive(Debug)]
pub struct SegDisplay {
    state: BitArray,
    register: ShiftRegister,
    data_pin: PinId,
    clock_pin: PinId,
    latch_pin: PinId,
    data: bool,
    clock: bool,
    latch: bool,
    digits: u8
}

impl SegDisplay {
    /// Bits the serial register holds: a glyph byte plus up to 8 digit
    /// select bits.
    pub const REGISTER_BITS: usize = 16;

    /// Creates a display with the given control pins and digit count.
    pub fn new(data_pin: PinId, clock_pin: PinId, latch_pin: PinId, digits: u8) -> Self {
        let digits = digits.clamp(1, 8);
        Self {
            state: BitArray::repeat(OFF, digits * 8),
            register: ShiftRegister::new(Self::REGISTER_BITS),
            data_pin,
            clock_pin,
            latch_pin,
            data: false,
            clock: false,
            latch: false,
            digits
        }
    }

    /// The current reconstructed display state (one byte per digit).
    pub fn state(&self) -> BitArray {
        self.state
    }

    /// Number of digits on the display.
    pub fn digits(&self) -> u8 {
        self.digits
    }

    /// The latch pin this display listens to.
    pub fn latch_pin(&self) -> PinId {
        self.latch_pin
    }

    /// Decodes the shift register into the visible state and emits the new
    /// state on the sprout if it changed.
    fn latch_registers(&mut self, time: LogTime, out: &mut Emits) {
        let selected = self.register.get_byte(0);
        let glyph = self.register.get_byte(1);

        let mut state = BitArray::repeat(OFF, self.digits * 8);
        for digit in 0..self.digits {
            if selected >> digit & 1 != 0 {
                state.set_byte(glyph, u32::from(digit));
            }
        }

        if state != self.state {
            self.state = state;
            out.event_sprout(time, self.state);
        }
    }
}

impl Consumer for SegDisplay {
    fn input_kind(&self) -> ValueKind {
        ValueKind::Pin
    }

    fn sprout_kind(&self) -> Option<ValueKind> {
        Some(ValueKind::Bits)
    }

    fn consume(&mut self, time: LogTime, value: Value, out: &mut Emits) -> Result<(), Error> {
        let Some(event) = value.pin() else {
            unreachable!("7-seg display received a non-pin payload");
        };
        let level = event.value == 1;

        if event.pin == self.clock_pin {
            if self.clock && !level {
                // falling clock edge confirms the current data sample
                self.register.push(self.data);
            }
            self.clock = level;
        } else if event.pin == self.data_pin {
            self.data = level;
        } else if event.pin == self.latch_pin {
            if !self.latch && level {
                self.latch_registers(time, out);
            }
            self.latch = level;
        } else {
            return Err(Error::UnknownPin { pin: event.pin });
        }

        out.event_next(time, value);
        // actual state events are emitted on latch, but downstream windows
        // must keep closing on schedule
        out.advance_sprout(time);
        Ok(())
    }

    fn advance(&mut self, time: LogTime, out: &mut Emits) -> Result<(), Error> {
        out.advance_next(time);
        out.advance_sprout(time);
        Ok(())
    }

    fn reset(&mut self) {
        self.state.fill(OFF);
        self.register.reset();
        self.data = false;
        self.clock = false;
        self.latch = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ConsumerKey, Pipeline, Recorder};
    use crate::emulator::pin::PinState;

    const DATA: PinId = 8;
    const CLOCK: PinId = 7;
    const LATCH: PinId = 4;

    struct SegRig {
        pipeline: Pipeline,
        display: ConsumerKey,
        sink: ConsumerKey,
        time: LogTime
    }

    impl SegRig {
        fn new() -> Self {
            let mut pipeline = Pipeline::new();
            let display = pipeline.insert(SegDisplay::new(DATA, CLOCK, LATCH, 4));
            let sink = pipeline.insert(Recorder::new(ValueKind::Bits));
            pipeline.attach_sprout(display, sink).unwrap();
            Self { pipeline, display, sink, time: 0 }
        }

        fn pin(&mut self, pin: PinId, value: i32) {
            self.time += 10;
            self.pipeline
                .add_event(self.display, self.time, PinState::new(pin, value))
                .unwrap();
        }

        /// Emulates shiftOut(): MSB first, one push per falling clock edge.
        fn shift_byte(&mut self, value: u8) {
            for i in (0..8).rev() {
                self.pin(DATA, i32::from(value >> i & 1));
                self.pin(CLOCK, 1);
                self.pin(CLOCK, 0);
            }
        }

        fn latch(&mut self) {
            self.pin(LATCH, 0);
            self.pin(LATCH, 1);
        }

        fn shown(&mut self, glyph: u8, mask: u8) {
            self.shift_byte(glyph);
            self.shift_byte(mask);
            self.latch();
        }

        fn last_state(&self) -> Option<BitArray> {
            let series = self.pipeline.series(self.sink).unwrap();
            series.back().map(|e| e.value.bits().unwrap())
        }

        fn display_state(&self) -> BitArray {
            match self.pipeline.func(self.display).unwrap() {
                crate::chain::ConsumerFn::SegDisplay(seg) => seg.state(),
                _ => unreachable!()
            }
        }
    }

    #[test]
    fn latch_decodes_selected_digits() {
        let mut rig = SegRig::new();
        rig.shown(0xC0, 0b0001); // glyph '0' on digit 0

        let mut expected = BitArray::repeat(OFF, 32);
        expected.set_byte(0xC0, 0);
        assert_eq!(rig.display_state(), expected);
        assert_eq!(rig.last_state(), Some(expected));
    }

    #[test]
    fn unselected_digits_read_blank() {
        let mut rig = SegRig::new();
        rig.shown(0xA4, 0b0110); // glyph '2' on digits 1 and 2

        let mut expected = BitArray::repeat(OFF, 32);
        expected.set_byte(0xA4, 1);
        expected.set_byte(0xA4, 2);
        assert_eq!(rig.display_state(), expected);
        assert_eq!(expected.get_byte(0), 0xFF, "unselected digit is blank");
    }

    #[test]
    fn state_updates_only_on_latch_rising_edge() {
        let mut rig = SegRig::new();
        rig.shift_byte(0xC0);
        rig.shift_byte(0b0001);
        assert_eq!(rig.last_state(), None, "no latch, no state event");

        rig.pin(LATCH, 1);
        assert!(rig.last_state().is_some());

        // holding the latch high does not re-latch
        let events_before = rig.pipeline.series(rig.sink).unwrap().len();
        rig.pin(LATCH, 1);
        assert_eq!(rig.pipeline.series(rig.sink).unwrap().len(), events_before);
    }

    #[test]
    fn identical_latch_is_silent() {
        let mut rig = SegRig::new();
        rig.shown(0xC0, 0b0001);
        let events_before = rig.pipeline.series(rig.sink).unwrap().len();
        rig.shown(0xC0, 0b0001);
        assert_eq!(
            rig.pipeline.series(rig.sink).unwrap().len(),
            events_before,
            "re-latching the same state emits nothing"
        );
    }

    #[test]
    fn unknown_pin_is_rejected() {
        let mut rig = SegRig::new();
        let result = rig
            .pipeline
            .add_event(rig.display, 1000, PinState::new(99, 1));
        assert!(matches!(result, Err(Error::UnknownPin { pin: 99 })));
    }

    mod led_panel {
        use super::*;

        fn rig() -> (Pipeline, ConsumerKey, ConsumerKey) {
            let mut pipeline = Pipeline::new();
            let panel = pipeline.insert(LedPanel::new(&[13, 12, 11, 10]).unwrap());
            let sink = pipeline.insert(Recorder::new(ValueKind::Bits));
            pipeline.attach_sprout(panel, sink).unwrap();
            (pipeline, panel, sink)
        }

        #[test]
        fn duplicate_wiring_is_rejected() {
            assert!(matches!(
                LedPanel::new(&[13, 12, 13]),
                Err(Error::DuplicatePin { pin: 13 })
            ));
        }

        #[test]
        fn pin_writes_update_the_folded_state() {
            let (mut pipeline, panel, sink) = rig();

            // LED on pin 13 drives bit 0, active low
            pipeline.add_event(panel, 10, PinState::new(13, 0)).unwrap();
            let series = pipeline.series(sink).unwrap();
            assert_eq!(series.len(), 1);
            let state = series[0].value.bits().unwrap();
            assert_eq!(state.get(0), Some(ON));
            assert_eq!(state.get(1), Some(OFF));
        }

        #[test]
        fn rewriting_the_same_level_is_silent() {
            let (mut pipeline, panel, sink) = rig();
            pipeline.add_event(panel, 10, PinState::new(13, 0)).unwrap();
            pipeline.add_event(panel, 20, PinState::new(13, 0)).unwrap();
            assert_eq!(pipeline.series(sink).unwrap().len(), 1);
        }

        #[test]
        fn unknown_pins_advance_time_without_events() {
            let (mut pipeline, panel, sink) = rig();
            pipeline.add_event(panel, 50, PinState::new(2, 1)).unwrap();
            assert!(pipeline.series(sink).unwrap().is_empty());
            assert_eq!(pipeline.last_time(sink), Some(50));
        }
    }
}
