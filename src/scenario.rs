//! Parser for the line-based button/serial scenario format.
//!
//! One event per line, blank lines ignored:
//!
//! ```text
//! <timestamp_us>  <button 1..3>  <u|d>
//! <timestamp_us>  S              <free-form string to end of line>
//! <timestamp_us>
//! ```
//!
//! Timestamps are monotonic. A line carrying only a timestamp terminates the
//! scenario and defines its end time; without such a marker the end time is
//! the last event plus 100 ms.

use std::io::BufRead;

use crate::error::Error;
use crate::series::TimeSeries;
use crate::sim::funshield::{FunshieldController, BUTTON_PINS};
use crate::LogTime;

/// Extra simulated time granted after the last event of an open-ended
/// scenario.
pub const TRAILING_TIME: LogTime = 100_000;

/// One scheduled input of a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioEvent {
    /// A button transition (buttons are zero-based here).
    Button {
        /// When the transition happens.
        time: LogTime,
        /// Zero-based button index.
        button: usize,
        /// Whether the button goes down.
        down: bool
    },
    /// A string appearing on the serial line.
    Serial {
        /// When the text arrives.
        time: LogTime,
        /// The payload.
        text: String
    }
}

impl ScenarioEvent {
    fn time(&self) -> LogTime {
        match self {
            ScenarioEvent::Button { time, .. } => *time,
            ScenarioEvent::Serial { time, .. } => *time
        }
    }
}

/// A parsed input scenario: scheduled events plus the simulation end time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    events: Vec<ScenarioEvent>,
    end_time: LogTime
}

impl Scenario {
    /// Parses a scenario from a text stream.
    pub fn parse(reader: impl BufRead) -> Result<Self, Error> {
        let mut events = Vec::new();
        let mut last_time: LogTime = 0;
        let mut button_states = [false; BUTTON_PINS.len()];

        for (number, line) in reader.lines().enumerate() {
            let number = number + 1;
            let line = line.map_err(|e| Error::Scenario {
                line: number,
                reason: e.to_string()
            })?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let (stamp, rest) = match trimmed.split_once(char::is_whitespace) {
                Some((stamp, rest)) => (stamp, rest.trim_start()),
                None => (trimmed, "")
            };
            let time: LogTime = stamp.parse().map_err(|_| Error::Scenario {
                line: number,
                reason: format!("invalid timestamp '{stamp}'")
            })?;
            if time < last_time {
                return Err(Error::Scenario {
                    line: number,
                    reason: format!(
                        "timestamps are not ordered ({time} is lower than the previous {last_time})"
                    )
                });
            }
            last_time = time;

            if rest.is_empty() {
                // a sole timestamp is the end marker
                return Ok(Self { events, end_time: time });
            }

            if let Some(text) = rest.strip_prefix('S') {
                if text.is_empty() || text.starts_with(char::is_whitespace) {
                    events.push(ScenarioEvent::Serial {
                        time,
                        text: text.trim_start().to_string()
                    });
                    continue;
                }
            }

            let mut tokens = rest.split_whitespace();
            let button = tokens.next().and_then(|t| t.parse::<usize>().ok());
            let action = tokens.next();
            let (button, down) = match (button, action, tokens.next()) {
                (Some(b @ 1..=3), Some("d"), None) => (b - 1, true),
                (Some(b @ 1..=3), Some("u"), None) => (b - 1, false),
                _ => {
                    return Err(Error::Scenario {
                        line: number,
                        reason: format!("invalid operation '{rest}'")
                    })
                }
            };

            if button_states[button] == down {
                continue; // no change in state
            }
            button_states[button] = down;
            events.push(ScenarioEvent::Button { time, button, down });
        }

        Ok(Self { events, end_time: last_time + TRAILING_TIME })
    }

    /// The scheduled events in time order.
    pub fn events(&self) -> &[ScenarioEvent] {
        &self.events
    }

    /// How long the simulation should run.
    pub fn end_time(&self) -> LogTime {
        self.end_time
    }

    /// Feeds all events into a funshield controller.
    ///
    /// Must be called while the virtual clock is still at zero, so that the
    /// scenario's absolute timestamps equal scheduling delays.
    pub fn apply(&self, shield: &mut FunshieldController) -> Result<(), Error> {
        log::debug!("scheduling {} scenario events", self.events.len());
        for event in &self.events {
            match event {
                ScenarioEvent::Button { time, button, down: true } => {
                    shield.button_down(*button, *time)?;
                }
                ScenarioEvent::Button { time, button, down: false } => {
                    shield.button_up(*button, *time)?;
                }
                ScenarioEvent::Serial { time, text } => {
                    shield.arduino_mut().enqueue_serial_input(text, *time)?;
                }
            }
        }
        Ok(())
    }

    /// The button transitions as one boolean series per button (`true` =
    /// pressed), e.g. for logging them next to the reconstructed outputs.
    pub fn button_series(&self) -> [TimeSeries<bool>; 3] {
        let mut series = [TimeSeries::new(), TimeSeries::new(), TimeSeries::new()];
        for event in &self.events {
            if let ScenarioEvent::Button { time, button, down } = event {
                // parse() already guarantees causality
                let _ = series[*button].append(*time, *down);
            }
        }
        series
    }

    /// Time of the last scheduled event.
    pub fn last_event_time(&self) -> Option<LogTime> {
        self.events.last().map(ScenarioEvent::time)
    }
}
