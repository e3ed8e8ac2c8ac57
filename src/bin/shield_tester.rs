//! Generic scenario driver: feeds a button/serial scenario file to a demo
//! firmware running on the emulated funshield and logs the reconstructed
//! events as CSV (or JSON).
//!
//! Exit codes: 0 success, 1 scenario problem, 2 one-latch rule violated,
//! 100 internal error.

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use clap::Parser;

use arduinosim_engine::chain::{Probe, ValueKind};
use arduinosim_engine::emulator::pin::PinState;
use arduinosim_engine::emulator::{global, BitOrder, Emulator, HIGH, INPUT, LOW, OUTPUT};
use arduinosim_engine::export::EventLog;
use arduinosim_engine::glyphs::{digit_glyph, BLANK, DASH};
use arduinosim_engine::sim::funshield::{
    FunshieldController, BUTTON_PINS, CLOCK_PIN, DATA_PIN, LATCH_PIN, LED_AGG_WINDOW,
    LED_DEMUX_WINDOW, LED_PINS, SEG_AGG_WINDOW, SEG_DEMUX_WINDOW,
};
use arduinosim_engine::{Error, Firmware, LogTime, Scenario, TimeSeries, Value};

#[derive(Parser, Debug)]
#[command(name = "shield-tester", about = "Funshield scenario driver")]
struct Args {
    /// Input file with button/serial events ("-" for stdin).
    input: Option<String>,

    /// File the simulation log is saved to (stdout if omitted).
    #[arg(long)]
    save: Option<String>,

    /// Length of the simulation in microseconds (overrides the value from
    /// the input file, required if no input file is provided).
    #[arg(long)]
    simulation_length: Option<LogTime>,

    /// Delay between two loop invocations in microseconds.
    #[arg(long, default_value_t = 100)]
    loop_delay: LogTime,

    /// Add button events to the output log.
    #[arg(long)]
    log_buttons: bool,

    /// Add LED events to the output log.
    #[arg(long)]
    log_leds: bool,

    /// Add 7-segment display events to the output log.
    #[arg(long = "log-7seg")]
    log_7seg: bool,

    /// Deactivate LED event smoothing (demultiplexer and aggregator).
    #[arg(long)]
    raw_leds: bool,

    /// LED demultiplexing window in milliseconds.
    #[arg(long, default_value_t = LED_DEMUX_WINDOW / 1000)]
    leds_demuxer_window: LogTime,

    /// LED aggregation window in milliseconds.
    #[arg(long, default_value_t = LED_AGG_WINDOW / 1000)]
    leds_aggregator_window: LogTime,

    /// Deactivate 7-segment event smoothing.
    #[arg(long = "raw-7seg")]
    raw_7seg: bool,

    /// 7-segment demultiplexing window in milliseconds.
    #[arg(long = "7seg-demuxer-window", default_value_t = SEG_DEMUX_WINDOW / 1000)]
    seg_demuxer_window: LogTime,

    /// 7-segment aggregation window in milliseconds.
    #[arg(long = "7seg-aggregator-window", default_value_t = SEG_AGG_WINDOW / 1000)]
    seg_aggregator_window: LogTime,

    /// Enable the builtin delay() and delayMicroseconds() functions.
    #[arg(long)]
    enable_delay: bool,

    /// Permit only one 7-segment latch activation per loop() invocation.
    #[arg(long)]
    one_latch_loop: bool,

    /// Write the log as JSON instead of CSV.
    #[arg(long)]
    json: bool,
}

/// Built-in demo sketch: button 1 increments a counter, button 2 decrements
/// it, button 3 resets it. The counter is shown on the display (multiplexed
/// one digit per loop) and the active LED rotates with every press.
struct DemoFirmware {
    counter: i32,
    digit: u8,
    active_led: usize,
    pressed: [bool; 3],
}

impl DemoFirmware {
    fn new() -> Box<Self> {
        Box::new(Self {
            counter: 0,
            digit: 0,
            active_led: 0,
            pressed: [false; 3],
        })
    }

    /// Glyph shown at the given position for the current counter value
    /// (right-aligned, dash for the sign, blanks elsewhere).
    fn glyph_at(&self, position: u8) -> u8 {
        let mut glyphs = [BLANK; 4];
        let mut value = self.counter.unsigned_abs();
        let mut idx = glyphs.len();
        loop {
            idx -= 1;
            glyphs[idx] = digit_glyph((value % 10) as u8);
            value /= 10;
            if value == 0 || idx == 0 {
                break;
            }
        }
        if self.counter < 0 && idx > 0 {
            glyphs[idx - 1] = DASH;
        }
        glyphs[usize::from(position)]
    }
}

impl Firmware for DemoFirmware {
    fn setup(&mut self, emulator: &mut Emulator) -> Result<(), Error> {
        for pin in BUTTON_PINS {
            emulator.pin_mode(pin, INPUT)?;
        }
        for pin in LED_PINS {
            emulator.pin_mode(pin, OUTPUT)?;
            emulator.digital_write(pin, HIGH)?;
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
                match i {
                    0 => {
                        self.counter += 1;
                        self.active_led = (self.active_led + 1) % LED_PINS.len();
                    }
                    1 => {
                        self.counter -= 1;
                        self.active_led = (self.active_led + 3) % LED_PINS.len();
                    }
                    _ => self.counter = 0,
                }
            }
            self.pressed[i] = down;
        }

        for (i, pin) in LED_PINS.iter().enumerate() {
            emulator.digital_write(*pin, if i == self.active_led { LOW } else { HIGH })?;
        }

        // multiplex one digit per loop iteration, one latch pulse each
        emulator.digital_write(LATCH_PIN, LOW)?;
        emulator.shift_out(DATA_PIN, CLOCK_PIN, BitOrder::MsbFirst, self.glyph_at(self.digit))?;
        emulator.shift_out(DATA_PIN, CLOCK_PIN, BitOrder::MsbFirst, 1 << self.digit)?;
        emulator.digital_write(LATCH_PIN, HIGH)?;
        self.digit = (self.digit + 1) % 4;
        Ok(())
    }
}

fn load_scenario(args: &Args) -> Result<Option<Scenario>, Error> {
    let Some(path) = &args.input else {
        return Ok(None);
    };
    let scenario = if path == "-" {
        Scenario::parse(io::stdin().lock())
    } else {
        let file = File::open(path).map_err(|e| Error::Scenario {
            line: 0,
            reason: format!("failed to open {path}: {e}"),
        })?;
        Scenario::parse(BufReader::new(file))
    }?;
    Ok(Some(scenario))
}

fn bits_series(recorded: &TimeSeries<Value>) -> TimeSeries<arduinosim_engine::BitArray> {
    let mut series = TimeSeries::new();
    for event in recorded.iter() {
        if let Some(bits) = event.value.bits() {
            // recorded chains are causal already
            let _ = series.append(event.time, bits);
        }
    }
    series
}

fn run(args: &Args) -> Result<ExitCode, Error> {
    global::install(Emulator::new())?;
    let mut shield = FunshieldController::new(global::acquire()?, DemoFirmware::new())?;

    if !args.enable_delay {
        shield.arduino_mut().disable_method("delay")?;
        shield.arduino_mut().disable_method("delayMicroseconds")?;
    }

    let scenario = load_scenario(args)?;
    let simulation_length = match (&scenario, args.simulation_length) {
        (_, Some(length)) => length,
        (Some(scenario), None) => scenario.end_time(),
        (None, None) => {
            return Err(Error::Scenario {
                line: 0,
                reason: "--simulation-length is required when no input file is given".into(),
            })
        }
    };

    let mut log = EventLog::new();
    if let Some(scenario) = &scenario {
        scenario.apply(&mut shield)?;
        if args.log_buttons {
            let [b1, b2, b3] = scenario.button_series();
            log.add("b1", b1);
            log.add("b2", b2);
            log.add("b3", b3);
        }
    }

    let led_log = match (args.log_leds, args.raw_leds) {
        (true, true) => Some(shield.raw_led_log()?),
        (true, false) => Some(shield.smooth_led_log(
            args.leds_demuxer_window * 1000,
            args.leds_aggregator_window * 1000,
        )?),
        (false, _) => None,
    };
    let seg_log = match (args.log_7seg, args.raw_7seg) {
        (true, true) => Some(shield.raw_seg_log()?),
        (true, false) => Some(shield.smooth_seg_log(
            args.seg_demuxer_window * 1000,
            args.seg_aggregator_window * 1000,
        )?),
        (false, _) => None,
    };

    // count latch rising edges per loop to enforce the one-latch rule
    let latch_activations = Arc::new(AtomicUsize::new(0));
    let latch_level = Arc::new(AtomicBool::new(true));
    {
        let activations = latch_activations.clone();
        let level = latch_level.clone();
        let probe = Probe::new(ValueKind::Pin, move |_, value| {
            if let Value::Pin(PinState { pin, value }) = value {
                if *pin == LATCH_PIN {
                    let high = *value == i32::from(HIGH);
                    if high && !level.swap(high, Ordering::Relaxed) {
                        activations.fetch_add(1, Ordering::Relaxed);
                    } else {
                        level.store(high, Ordering::Relaxed);
                    }
                }
            }
        });
        let seg_node = shield.seg_node();
        let pipeline = shield.arduino_mut().emulator_mut().pipeline_mut();
        let probe = pipeline.insert(probe);
        let tail = pipeline.last_consumer(seg_node);
        pipeline.attach_next(tail, probe)?;
    }

    shield.arduino_mut().run_setup(1)?;

    let mut loops = 0usize;
    let mut violated_loops = 0usize;
    shield
        .arduino_mut()
        .run_loops_for_period(simulation_length, args.loop_delay, |_| {
            if latch_activations.swap(0, Ordering::Relaxed) > 1 {
                violated_loops += 1;
            }
            loops += 1;
            true
        })?;
    log::info!("simulation finished after {loops} loop iterations");

    if args.one_latch_loop && violated_loops > 0 {
        eprintln!("The single-latch-activation rule was violated in {violated_loops} loop() invocations.");
        return Ok(ExitCode::from(2));
    }

    let emulator = shield.arduino().emulator();
    if let Some(key) = led_log {
        if let Some(series) = emulator.pipeline().series(key) {
            log.add("leds", bits_series(series));
        }
    }
    if let Some(key) = seg_log {
        if let Some(series) = emulator.pipeline().series(key) {
            log.add("7seg", bits_series(series));
        }
    }

    if log.is_empty() {
        println!("Simulation ended successfully, but no event logging was selected.");
        return Ok(ExitCode::SUCCESS);
    }

    match &args.save {
        Some(path) => write_log(&log, args, &mut File::create(path)?)?,
        None => write_log(&log, args, &mut io::stdout().lock())?,
    }

    Ok(ExitCode::SUCCESS)
}

fn write_log(log: &EventLog, args: &Args, out: &mut dyn Write) -> io::Result<()> {
    if args.json {
        log.write_json(out)
    } else {
        log.write_csv(out, ',')
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(code) => code,
        Err(err @ Error::Scenario { .. }) => {
            eprintln!("Error: {err}");
            ExitCode::from(1)
        }
        Err(err) => {
            eprintln!("Internal error: {err}");
            ExitCode::from(100)
        }
    }
}
