//! Button-driven LED rotation on the funshield: every click moves the
//! single lit LED, the smoothed event log must show exactly one state per
//! click at a steady one-second pace.

use arduinosim_engine::bitarray::BitArray;
use arduinosim_engine::emulator::{Emulator, HIGH, INPUT, LOW, OUTPUT};
use arduinosim_engine::series::Range;
use arduinosim_engine::sim::funshield::{
    FunshieldController, BUTTON_PINS, CLICK_DURATION, LED_AGG_WINDOW, LED_DEMUX_WINDOW, LED_PINS,
    OFF, ON,
};
use arduinosim_engine::{Error, Firmware, LogTime};

/// Rotates the active LED: button 1 by one position, button 2 by three.
struct Rotor {
    active: usize,
    pressed: [bool; 3],
}

impl Rotor {
    fn new() -> Box<Self> {
        Box::new(Self { active: 0, pressed: [false; 3] })
    }
}

impl Firmware for Rotor {
    fn setup(&mut self, emulator: &mut Emulator) -> Result<(), Error> {
        for pin in BUTTON_PINS {
            emulator.pin_mode(pin, INPUT)?;
        }
        for pin in LED_PINS {
            emulator.pin_mode(pin, OUTPUT)?;
        }
        Ok(())
    }

    fn loop_iter(&mut self, emulator: &mut Emulator) -> Result<(), Error> {
        for (i, pin) in BUTTON_PINS.iter().enumerate().take(2) {
            let down = emulator.digital_read(*pin)? == i32::from(LOW);
            if down && !self.pressed[i] {
                self.active = (self.active + if i == 0 { 1 } else { 3 }) % LED_PINS.len();
            }
            self.pressed[i] = down;
        }
        for (i, pin) in LED_PINS.iter().enumerate() {
            emulator.digital_write(*pin, if i == self.active { LOW } else { HIGH })?;
        }
        Ok(())
    }
}

fn single_led(index: usize) -> BitArray {
    let mut state = BitArray::repeat(OFF, LED_PINS.len() as u8);
    state.set(index as u8, ON).unwrap();
    state
}

#[test]
fn clicks_rotate_the_lit_led() {
    let button_sequence = [0, 1, 0, 0, 1, 1, 0, 0, 0, 1, 1, 1, 0, 0, 0, 0, 0, 0, 1, 1, 1];

    let mut shield = FunshieldController::new(Emulator::new(), Rotor::new()).unwrap();
    let log = shield.smooth_led_log(LED_DEMUX_WINDOW, LED_AGG_WINDOW).unwrap();

    // one click per second, and the expected LED after each of them
    let mut expected = vec![0usize];
    let mut time: LogTime = 0;
    let mut active = 0;
    for &button in &button_sequence {
        time += 1_000_000;
        shield.button_click(button, CLICK_DURATION, time).unwrap();
        active = (active + if button == 0 { 1 } else { 3 }) % 4;
        expected.push(active);
    }
    time += 1_000_000;

    shield.arduino_mut().run_setup(1).unwrap();
    shield.arduino_mut().run_loops_for_period(time, 1, |_| true).unwrap();

    let series = shield.arduino().emulator().pipeline().series(log).unwrap();
    assert_eq!(
        series.len(),
        expected.len(),
        "one smoothed event per click (plus the initial state)"
    );
    for (i, event) in series.iter().enumerate() {
        assert_eq!(
            event.value.bits().unwrap(),
            single_led(expected[i]),
            "wrong LED after click {i}"
        );
    }

    let mean = series.deltas_mean(Range::all());
    assert!(
        (990_000.0..=1_010_000.0).contains(&mean),
        "average period off by more than 1%: {mean}"
    );
    let deviation = series.deltas_deviation(Range::all());
    assert!(deviation <= 10_000.0, "LED changes too irregular: {deviation}");
}

#[test]
fn without_clicks_only_the_initial_state_appears() {
    let mut shield = FunshieldController::new(Emulator::new(), Rotor::new()).unwrap();
    let log = shield.smooth_led_log(LED_DEMUX_WINDOW, LED_AGG_WINDOW).unwrap();

    shield.arduino_mut().run_setup(1).unwrap();
    shield.arduino_mut().run_loops_for_period(2_000_000, 1, |_| true).unwrap();

    let series = shield.arduino().emulator().pipeline().series(log).unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].value.bits().unwrap(), single_led(0));
}
