//! 7-segment reconstruction end to end: the firmware multiplexes four-letter
//! texts onto the display, the smoothed trace must decode back to them.

use arduinosim_engine::emulator::{BitOrder, Emulator, HIGH, INPUT, LOW, OUTPUT};
use arduinosim_engine::glyphs::{letter_glyph, BLANK};
use arduinosim_engine::sim::funshield::{
    FunshieldController, BUTTON_PINS, CLICK_DURATION, CLOCK_PIN, DATA_PIN, LATCH_PIN,
    SEG_AGG_WINDOW, SEG_DEMUX_WINDOW,
};
use arduinosim_engine::{Error, Firmware, LogTime, SegInterpreter};

/// Shows a fixed text per button, multiplexing one digit per loop.
struct TextWriter {
    glyphs: [u8; 4],
    digit: u8,
    pressed: [bool; 3],
}

impl TextWriter {
    const TEXTS: [&'static str; 3] = ["abcd", "efgh", "ijkl"];

    fn new() -> Box<Self> {
        Box::new(Self { glyphs: [BLANK; 4], digit: 0, pressed: [false; 3] })
    }

    fn select_text(&mut self, index: usize) {
        for (pos, ch) in Self::TEXTS[index].chars().enumerate() {
            self.glyphs[pos] = letter_glyph(ch).unwrap_or(BLANK);
        }
    }
}

impl Firmware for TextWriter {
    fn setup(&mut self, emulator: &mut Emulator) -> Result<(), Error> {
        for pin in BUTTON_PINS {
            emulator.pin_mode(pin, INPUT)?;
        }
        for pin in [LATCH_PIN, CLOCK_PIN, DATA_PIN] {
            emulator.pin_mode(pin, OUTPUT)?;
        }
        Ok(())
    }

    fn loop_iter(&mut self, emulator: &mut Emulator) -> Result<(), Error> {
        for (i, pin) in BUTTON_PINS.iter().enumerate() {
            let down = emulator.digital_read(*pin)? == i32::from(LOW);
            if down && !self.pressed[i] {
                self.select_text(i);
            }
            self.pressed[i] = down;
        }

        emulator.digital_write(LATCH_PIN, LOW)?;
        emulator.shift_out(
            DATA_PIN,
            CLOCK_PIN,
            BitOrder::MsbFirst,
            self.glyphs[usize::from(self.digit)],
        )?;
        emulator.shift_out(DATA_PIN, CLOCK_PIN, BitOrder::MsbFirst, 1 << self.digit)?;
        emulator.digital_write(LATCH_PIN, HIGH)?;
        self.digit = (self.digit + 1) % 4;
        Ok(())
    }
}

#[test]
fn display_texts_decode_from_the_smoothed_trace() {
    const TOLERANCE: LogTime = 200_000;
    let clicks: [(usize, LogTime); 3] = [(0, 3_000_000), (1, 5_000_000), (2, 6_000_000)];

    let mut shield = FunshieldController::new(Emulator::new(), TextWriter::new()).unwrap();
    let log = shield.smooth_seg_log(SEG_DEMUX_WINDOW, SEG_AGG_WINDOW).unwrap();

    for (button, at) in clicks {
        shield.button_click(button, CLICK_DURATION, at).unwrap();
    }

    shield.arduino_mut().run_setup(1).unwrap();
    shield.arduino_mut().run_loops_for_period(8_000_000, 1, |_| true).unwrap();

    let series = shield.arduino().emulator().pipeline().series(log).unwrap();
    assert_eq!(series.len(), 3, "one reconstructed state per text change");

    for ((_, expected_time), (event, text)) in clicks
        .iter()
        .zip(series.iter().zip(TextWriter::TEXTS))
    {
        let delta = event.time.abs_diff(*expected_time);
        assert!(
            delta <= TOLERANCE,
            "state change at {} too far from the click at {expected_time}",
            event.time
        );

        let decoded = SegInterpreter::new(event.value.bits().unwrap());
        assert_eq!(decoded.text('\0'), text);
    }
}

#[test]
fn an_idle_display_stays_silent() {
    let mut shield = FunshieldController::new(Emulator::new(), TextWriter::new()).unwrap();
    let log = shield.smooth_seg_log(SEG_DEMUX_WINDOW, SEG_AGG_WINDOW).unwrap();

    shield.arduino_mut().run_setup(1).unwrap();
    shield.arduino_mut().run_loops_for_period(2_000_000, 1, |_| true).unwrap();

    let series = shield.arduino().emulator().pipeline().series(log).unwrap();
    assert!(
        series.is_empty(),
        "multiplexing blanks must not surface as state changes"
    );
}
