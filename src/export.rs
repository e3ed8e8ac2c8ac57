//! Event-log export: merged CSV and JSON renderings of named time series.
//!
//! The CSV layout follows the judge contract: a `timestamp` column first,
//! then one column per series in insertion order; one row per distinct event
//! timestamp across all series, with empty cells where a series has no event
//! at that instant.

use std::io::{self, Write};

use serde::Serialize;

use crate::bitarray::BitArray;
use crate::chain::Value;
use crate::emulator::pin::PinState;
use crate::series::TimeSeries;
use crate::LogTime;

/// A named column source: any time series whose values can be rendered into
/// CSV cells.
pub trait Column {
    /// Number of events in the series.
    fn len(&self) -> usize;

    /// Whether the series holds no events.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Timestamp of the event at `index`.
    fn time_at(&self, index: usize) -> LogTime;

    /// Final cell text of the event at `index` (quoting included where the
    /// value type needs it).
    fn cell(&self, index: usize) -> String;
}

impl Column for TimeSeries<bool> {
    fn len(&self) -> usize {
        TimeSeries::len(self)
    }

    fn time_at(&self, index: usize) -> LogTime {
        self[index].time
    }

    fn cell(&self, index: usize) -> String {
        if self[index].value { "1" } else { "0" }.to_string()
    }
}

impl Column for TimeSeries<BitArray> {
    fn len(&self) -> usize {
        TimeSeries::len(self)
    }

    fn time_at(&self, index: usize) -> LogTime {
        self[index].time
    }

    fn cell(&self, index: usize) -> String {
        Value::Bits(self[index].value).to_string()
    }
}

impl Column for TimeSeries<PinState> {
    fn len(&self) -> usize {
        TimeSeries::len(self)
    }

    fn time_at(&self, index: usize) -> LogTime {
        self[index].time
    }

    fn cell(&self, index: usize) -> String {
        self[index].value.to_string()
    }
}

impl Column for TimeSeries<Value> {
    fn len(&self) -> usize {
        TimeSeries::len(self)
    }

    fn time_at(&self, index: usize) -> LogTime {
        self[index].time
    }

    fn cell(&self, index: usize) -> String {
        self[index].value.to_string()
    }
}

impl Column for TimeSeries<String> {
    fn len(&self) -> usize {
        TimeSeries::len(self)
    }

    fn time_at(&self, index: usize) -> LogTime {
        self[index].time
    }

    fn cell(&self, index: usize) -> String {
        quote(&self[index].value)
    }
}

/// Wraps a string in double quotes, doubling inner quotes (RFC 4180).
pub fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for ch in text.chars() {
        if ch == '"' {
            quoted.push('"');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

#[derive(Serialize)]
struct JsonEvent {
    time: LogTime,
    value: String
}

#[derive(Serialize)]
struct JsonColumn {
    name: String,
    events: Vec<JsonEvent>
}

/// A collection of named event series, exported together.
#[derive(Default)]
pub struct EventLog {
    columns: Vec<(String, Box<dyn Column>)>
}

impl EventLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Default::default()
    }

    /// Appends a named series; columns appear in insertion order.
    pub fn add(&mut self, name: impl Into<String>, column: impl Column + 'static) {
        self.columns.push((name.into(), Box::new(column)));
    }

    /// Whether the log holds no columns at all.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Writes the merged CSV.
    pub fn write_csv(&self, out: &mut dyn Write, delimiter: char) -> io::Result<()> {
        write!(out, "timestamp")?;
        for (name, _) in &self.columns {
            write!(out, "{delimiter}{name}")?;
        }
        writeln!(out)?;

        // walk all series one timestamp at a time
        let mut cursors = vec![0usize; self.columns.len()];
        loop {
            let next = self
                .columns
                .iter()
                .zip(&cursors)
                .filter(|((_, column), &cursor)| cursor < column.len())
                .map(|((_, column), &cursor)| column.time_at(cursor))
                .min();
            let Some(timestamp) = next else {
                break;
            };

            write!(out, "{timestamp}")?;
            for ((_, column), cursor) in self.columns.iter().zip(&mut cursors) {
                write!(out, "{delimiter}")?;
                if *cursor < column.len() && column.time_at(*cursor) == timestamp {
                    write!(out, "{}", column.cell(*cursor))?;
                    *cursor += 1;
                }
            }
            writeln!(out)?;
        }
        Ok(())
    }

    /// Writes the same log as pretty-printed JSON.
    pub fn write_json(&self, out: &mut dyn Write) -> io::Result<()> {
        let columns: Vec<JsonColumn> = self
            .columns
            .iter()
            .map(|(name, column)| JsonColumn {
                name: name.clone(),
                events: (0..column.len())
                    .map(|i| JsonEvent { time: column.time_at(i), value: column.cell(i) })
                    .collect()
            })
            .collect();
        serde_json::to_writer_pretty(out, &columns).map_err(io::Error::from)
    }
}
