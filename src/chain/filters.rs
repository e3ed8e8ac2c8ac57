//! Window-based reconstruction filters over bit-array events.
//!
//! Multiplexed shield traffic flips pins far faster than the state a human
//! would perceive. [`Demultiplexer`] integrates the active time of every LED
//! over fixed windows and thresholds it into a logically steady state;
//! [`Aggregator`] then debounces residual chatter between windows.

use crate::bitarray::BitArray;
use crate::chain::{Consumer, Emits, Value, ValueKind, OFF, ON};
use crate::error::Error;
use crate::LogTime;

/// Demultiplexes state changes by measuring how long each LED has been lit
/// within consecutive quantization windows.
///
/// An LED is reported lit in the demultiplexed state iff its accumulated
/// active time within the window reaches the threshold. Output events carry
/// the same active-low encoding as the input.
#[derive(Debug)]
pub struct Demultiplexer {
    width: u8,
    window: LogTime,
    threshold: LogTime,
    /// Timestamp at which the currently open window closes.
    marker: LogTime,
    /// How far accumulation has been resolved (window open iff `cursor < marker`).
    cursor: LogTime,
    last_state: BitArray,
    last_demuxed: BitArray,
    active: Vec<LogTime>
}

impl Demultiplexer {
    /// Creates a demultiplexer over `width` LEDs.
    ///
    /// `window` is the quantization interval and `threshold` the minimal
    /// active time within one window for an LED to count as lit
    /// (`1 <= threshold <= window`).
    pub fn new(width: u8, window: LogTime, threshold: LogTime) -> Result<Self, Error> {
        if window == 0 {
            return Err(Error::BadWindow);
        }
        if threshold == 0 || threshold > window {
            return Err(Error::BadThreshold { threshold, window });
        }
        let width = width.clamp(BitArray::MIN_BITSIZE, BitArray::MAX_BITSIZE);
        Ok(Self {
            width,
            window,
            threshold,
            marker: 0,
            cursor: 0,
            last_state: BitArray::repeat(OFF, width),
            last_demuxed: BitArray::repeat(OFF, width),
            active: vec![0; usize::from(width)]
        })
    }

    /// Creates a demultiplexer with the customary threshold of a tenth of
    /// the window.
    pub fn with_window(width: u8, window: LogTime) -> Result<Self, Error> {
        Self::new(width, window, window / 10)
    }

    /// The configured window length.
    pub fn window(&self) -> LogTime {
        self.window
    }

    /// The configured threshold.
    pub fn threshold(&self) -> LogTime {
        self.threshold
    }

    fn window_open(&self) -> bool {
        self.cursor < self.marker
    }

    /// Increases the accumulators of all LEDs lit in the last raw state.
    fn accumulate(&mut self, dt: LogTime) {
        for i in 0..self.width {
            if self.last_state.get(i) == Some(ON) {
                self.active[usize::from(i)] += dt;
            }
        }
    }

    /// Thresholds the accumulators into a demuxed state, resetting them.
    fn demux_state(&mut self) -> BitArray {
        let mut state = BitArray::repeat(OFF, self.width);
        for i in 0..self.width {
            let slot = &mut self.active[usize::from(i)];
            if *slot >= self.threshold {
                let _ = state.set(i, ON);
            }
            *slot = 0;
        }
        state
    }

    /// Closes every window the given timestamp has passed, then accumulates
    /// the trailing fragment of the still-open window (if any).
    fn update_windows(&mut self, time: LogTime, out: &mut Emits) {
        while self.window_open() && time >= self.marker {
            self.accumulate(self.marker - self.cursor);
            self.cursor = self.marker;

            let demuxed = self.demux_state();
            if demuxed != self.last_demuxed {
                self.last_demuxed = demuxed;
                out.event_next(self.marker, demuxed);
                self.marker += self.window;
            } else {
                out.advance_next(self.marker);
                if self.last_state != demuxed {
                    // a change is still pending, keep the window rolling
                    self.marker += self.window;
                }
            }
        }

        if self.window_open() && time > self.cursor {
            self.accumulate(time - self.cursor);
            self.cursor = time;
        }
    }
}

impl Consumer for Demultiplexer {
    fn input_kind(&self) -> ValueKind {
        ValueKind::Bits
    }

    fn consume(&mut self, time: LogTime, value: Value, out: &mut Emits) -> Result<(), Error> {
        let Some(state) = value.bits() else {
            unreachable!("demultiplexer received a non-bits payload");
        };

        self.update_windows(time, out);
        self.last_state = state;
        if !self.window_open() {
            // the event triggers opening of a new window
            self.marker = time + self.window;
        }
        self.cursor = time;
        Ok(())
    }

    fn advance(&mut self, time: LogTime, out: &mut Emits) -> Result<(), Error> {
        self.update_windows(time, out);
        if !self.window_open() {
            // no window is open, time advances pass through as usual
            out.advance_next(time);
        }
        self.cursor = time;
        Ok(())
    }

    fn reset(&mut self) {
        self.marker = self.cursor;
        self.last_state.fill(OFF);
        self.last_demuxed.fill(OFF);
        self.active.fill(0);
    }
}

/// Suppresses state-change events in rapid succession.
///
/// Typically chained after a [`Demultiplexer`] with a larger window: the
/// demuxer separates lit from unlit, the aggregator swallows transitional
/// states that survive demultiplexing. Only the state buffered at window
/// close is compared against the last emission, so consecutive output events
/// are at least one window apart.
#[derive(Debug)]
pub struct Aggregator {
    width: u8,
    window: LogTime,
    marker: LogTime,
    cursor: LogTime,
    last_state: BitArray,
    last_emitted: BitArray
}

impl Aggregator {
    /// Creates an aggregator over `width` LEDs with the given window.
    pub fn new(width: u8, window: LogTime) -> Result<Self, Error> {
        if window == 0 {
            return Err(Error::BadWindow);
        }
        let width = width.clamp(BitArray::MIN_BITSIZE, BitArray::MAX_BITSIZE);
        Ok(Self {
            width,
            window,
            marker: 0,
            cursor: 0,
            last_state: BitArray::repeat(OFF, width),
            last_emitted: BitArray::repeat(OFF, width)
        })
    }

    /// The configured window length.
    pub fn window(&self) -> LogTime {
        self.window
    }

    fn window_open(&self) -> bool {
        self.cursor < self.marker
    }

    fn update_windows(&mut self, time: LogTime, out: &mut Emits) {
        while self.window_open() && time >= self.marker {
            self.cursor = self.marker;
            if self.last_state != self.last_emitted {
                self.last_emitted = self.last_state;
                out.event_next(self.marker, self.last_emitted);
                self.marker += self.window;
            } else {
                out.advance_next(self.marker);
            }
        }
    }
}

impl Consumer for Aggregator {
    fn input_kind(&self) -> ValueKind {
        ValueKind::Bits
    }

    fn consume(&mut self, time: LogTime, value: Value, out: &mut Emits) -> Result<(), Error> {
        let Some(state) = value.bits() else {
            unreachable!("aggregator received a non-bits payload");
        };

        self.update_windows(time, out);
        self.last_state = state;
        if !self.window_open() {
            self.marker = time + self.window;
        }
        self.cursor = time;
        Ok(())
    }

    fn advance(&mut self, time: LogTime, out: &mut Emits) -> Result<(), Error> {
        self.update_windows(time, out);
        if !self.window_open() {
            out.advance_next(time);
        }
        self.cursor = time;
        Ok(())
    }

    fn reset(&mut self) {
        self.marker = self.cursor;
        self.last_state.fill(OFF);
        self.last_emitted.fill(OFF);
    }
}
