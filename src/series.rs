//! Time-ordered event logs and their analytical queries.
//!
//! A [`TimeSeries`] is an append-only queue of `(time, value)` events sorted
//! by time. Test scenarios assert against these logs: mean and deviation of
//! inter-event delays, subsequence searches over the values, and a symmetric
//! divergence measure between two series.

use crate::error::Error;
use crate::LogTime;

/// One recorded event: a timestamp and the new value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event<V> {
    /// When the event happened (virtual microseconds).
    pub time: LogTime,
    /// Associated value of the event (the new state).
    pub value: V
}

/// A range of event indices, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Range {
    start: usize,
    end: usize
}

impl Range {
    /// Creates a range; the bounds are reordered if given backwards.
    pub fn new(start: usize, end: usize) -> Self {
        Self { start: start.min(end), end: start.max(end) }
    }

    /// A range covering any series entirely.
    pub fn all() -> Self {
        Self { start: 0, end: usize::MAX }
    }

    /// Starting index (inclusive).
    pub fn start(&self) -> usize {
        self.start
    }

    /// Terminal index (exclusive).
    pub fn end(&self) -> usize {
        self.end
    }

    /// Number of indices covered.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the range covers nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clamp_to(self, len: usize) -> Self {
        Self { start: self.start.min(len), end: self.end.min(len) }
    }
}

/// An append-only, causality-checked log of `(time, value)` events.
#[derive(Debug, Clone, Default)]
pub struct TimeSeries<V> {
    events: Vec<Event<V>>
}

impl<V: Clone + PartialEq> TimeSeries<V> {
    /// Creates an empty series.
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the series holds no events.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// The event at the given index.
    pub fn get(&self, index: usize) -> Option<&Event<V>> {
        self.events.get(index)
    }

    /// The earliest event.
    pub fn front(&self) -> Option<&Event<V>> {
        self.events.first()
    }

    /// The latest event.
    pub fn back(&self) -> Option<&Event<V>> {
        self.events.last()
    }

    /// Iterates the events in time order.
    pub fn iter(&self) -> std::slice::Iter<'_, Event<V>> {
        self.events.iter()
    }

    /// Appends an event at the back of the series.
    ///
    /// The timestamp must not precede the last recorded event.
    pub fn append(&mut self, time: LogTime, value: V) -> Result<(), Error> {
        if let Some(back) = self.events.last() {
            if time < back.time {
                return Err(Error::Causality { last: back.time, time });
            }
        }
        self.events.push(Event { time, value });
        Ok(())
    }

    /// Inserts an event at an arbitrary time, bubbling it toward the front
    /// until the series is sorted again.
    pub fn insert_raw(&mut self, time: LogTime, value: V) {
        self.events.push(Event { time, value });
        let mut idx = self.events.len() - 1;
        while idx > 0 && self.events[idx - 1].time > self.events[idx].time {
            self.events.swap(idx - 1, idx);
            idx -= 1;
        }
    }

    /// Drops all recorded events. Watermarks held by enclosing consumers are
    /// not affected.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Time between the first and the last event of the given index range.
    pub fn range_duration(&self, range: Range) -> LogTime {
        let range = range.clamp_to(self.len());
        if range.len() < 2 {
            return 0;
        }
        self.events[range.end() - 1].time - self.events[range.start()].time
    }

    /// Mean delay between subsequent events in the given index range.
    ///
    /// Ranges shorter than two events yield zero.
    pub fn deltas_mean(&self, range: Range) -> f64 {
        let range = range.clamp_to(self.len());
        if range.len() < 2 {
            return 0.0;
        }

        let mut deltas: LogTime = 0;
        let mut last = self.events[range.start()].time;
        for event in &self.events[range.start() + 1..range.end()] {
            deltas += event.time - last;
            last = event.time;
        }

        deltas as f64 / (range.len() - 1) as f64
    }

    /// Variance of delays between subsequent events in the given index range.
    pub fn deltas_variance(&self, range: Range) -> f64 {
        let range = range.clamp_to(self.len());
        if range.len() < 2 {
            return 0.0;
        }

        let mut deltas: u128 = 0;
        let mut square_deltas: u128 = 0;
        let mut last = self.events[range.start()].time;
        for event in &self.events[range.start() + 1..range.end()] {
            let dt = u128::from(event.time - last);
            deltas += dt;
            square_deltas += dt * dt;
            last = event.time;
        }

        let count = (range.len() - 1) as f64;
        let mean = deltas as f64 / count;
        (square_deltas as f64 / count) - (mean * mean) // E(X^2) - (EX)^2
    }

    /// Population standard deviation of delays between subsequent events.
    pub fn deltas_deviation(&self, range: Range) -> f64 {
        self.deltas_variance(range).sqrt()
    }

    /// Finds the first occurrence of a continuous value sequence.
    ///
    /// If no full match exists, the earliest range of the longest matching
    /// prefix is returned. An empty needle is an error.
    pub fn find_subsequence(&self, needle: &[V]) -> Result<Range, Error> {
        if needle.is_empty() {
            return Err(Error::EmptyNeedle);
        }
        if self.is_empty() {
            return Ok(Range::new(0, 0));
        }

        let mut best = Range::new(0, 0);
        let mut start = 0;
        while start < self.len() - best.len() {
            let mut len = 0;
            while len < needle.len()
                && start + len < self.len()
                && needle[len] == self.events[start + len].value
            {
                len += 1;
            }
            if len > best.len() {
                best = Range::new(start, start + len);
            }
            start += 1;
        }

        Ok(best)
    }

    /// Finds the longest contiguous run of whole, consecutive copies of the
    /// needle. Returns the earliest range of maximum length.
    pub fn find_repetitive_subsequence(&self, needle: &[V]) -> Result<Range, Error> {
        if needle.is_empty() {
            return Err(Error::EmptyNeedle);
        }
        if needle.len() > self.len() {
            return Ok(Range::new(0, 0));
        }

        // Mark every index where a whole copy of the needle begins.
        let mut is_start = vec![false; self.len()];
        let mut starts = Vec::new();
        for start in 0..=self.len() - needle.len() {
            let matched = needle.iter()
                .zip(&self.events[start..])
                .all(|(n, e)| *n == e.value);
            is_start[start] = matched;
            if matched {
                starts.push(start);
            }
        }

        // Assemble the longest repetition from the collected starting points.
        let mut best = Range::new(0, 0);
        for start in starts {
            let mut len = 0;
            while start + len < self.len() && is_start[start + len] {
                len += needle.len();
            }
            if len > best.len() {
                best = Range::new(start, start + len);
            }
        }

        Ok(best)
    }

    /// Greedy selected-subsequence matcher.
    ///
    /// For each needle value in order, the scan index advances over this
    /// series until an equal value is found. Returns whether every needle
    /// value was consumed, along with the (possibly partial) index mapping.
    pub fn find_selected_subsequence(&self, needle: &TimeSeries<V>) -> (bool, Vec<usize>) {
        let mut mapping = Vec::new();
        let mut pos = 0;
        for event in needle.iter() {
            while pos < self.len() && self.events[pos].value != event.value {
                pos += 1;
            }
            if pos >= self.len() {
                return (false, mapping);
            }
            mapping.push(pos);
            pos += 1;
        }
        (true, mapping)
    }

    /// Total virtual time within `[from, until)` during which this series and
    /// `other` hold different current values.
    ///
    /// The current value of a series at time `t` is the value of its most
    /// recent event with `time <= t`, or `initial` before any event. Events
    /// of both series at the same instant are applied together before any
    /// divergence is accumulated, which makes the operation symmetric.
    pub fn compare(&self, other: &Self, from: LogTime, until: LogTime, initial: V) -> LogTime {
        let mut i = 0;
        let mut j = 0;
        let mut a = initial.clone();
        let mut b = initial;
        let mut cursor = from;
        let mut diverged: LogTime = 0;

        loop {
            let ta = self.events.get(i).map(|e| e.time);
            let tb = other.events.get(j).map(|e| e.time);
            let t = match (ta, tb) {
                (None, None) => break,
                (Some(x), None) => x,
                (None, Some(y)) => y,
                (Some(x), Some(y)) => x.min(y)
            };
            if t >= until {
                break;
            }

            let upto = t.max(from);
            if upto > cursor && a != b {
                diverged += upto - cursor;
            }
            cursor = cursor.max(upto);

            while i < self.events.len() && self.events[i].time == t {
                a = self.events[i].value.clone();
                i += 1;
            }
            while j < other.events.len() && other.events[j].time == t {
                b = other.events[j].value.clone();
                j += 1;
            }
        }

        if until > cursor && a != b {
            diverged += until - cursor;
        }
        diverged
    }
}

impl<V> std::ops::Index<usize> for TimeSeries<V> {
    type Output = Event<V>;

    fn index(&self, index: usize) -> &Self::Output {
        &self.events[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(values: &[i32]) -> TimeSeries<i32> {
        let mut ts = TimeSeries::new();
        let mut time = 0;
        for &v in values {
            time += 100;
            ts.append(time, v).unwrap();
        }
        ts
    }

    fn fill_counter(times: &[LogTime]) -> TimeSeries<i32> {
        let mut ts = TimeSeries::new();
        for (i, &t) in times.iter().enumerate() {
            ts.append(t, i as i32 + 1).unwrap();
        }
        ts
    }

    #[test]
    fn append_checks_causality() {
        let mut ts = TimeSeries::new();
        ts.append(10, 1).unwrap();
        ts.append(10, 2).unwrap();
        assert!(matches!(
            ts.append(9, 3),
            Err(Error::Causality { last: 10, time: 9 })
        ));
        assert_eq!(ts.len(), 2);
    }

    #[test]
    fn insert_raw_restores_order() {
        let mut ts = TimeSeries::new();
        ts.insert_raw(300, 'c');
        ts.insert_raw(100, 'a');
        ts.insert_raw(200, 'b');
        let times: Vec<_> = ts.iter().map(|e| e.time).collect();
        assert_eq!(times, vec![100, 200, 300]);
        assert_eq!(ts[0].value, 'a');
    }

    #[test]
    fn deltas_statistics() {
        let mut ts = TimeSeries::new();
        for t in [100u64, 200, 300, 400] {
            ts.append(t, 0).unwrap();
        }
        assert_eq!(ts.deltas_mean(Range::all()), 100.0);
        assert_eq!(ts.deltas_variance(Range::all()), 0.0);
        assert_eq!(ts.deltas_deviation(Range::all()), 0.0);
        assert_eq!(ts.range_duration(Range::all()), 300);
        assert_eq!(ts.range_duration(Range::new(1, 3)), 100);

        // short ranges yield zero
        assert_eq!(ts.deltas_mean(Range::new(0, 1)), 0.0);
        assert_eq!(ts.deltas_mean(Range::new(2, 2)), 0.0);
        assert_eq!(ts.range_duration(Range::new(0, 1)), 0);
    }

    #[test]
    fn deltas_deviation_of_jittery_series() {
        let mut ts = TimeSeries::new();
        for t in [0u64, 90, 200, 290, 400] {
            ts.append(t, 0).unwrap();
        }
        // deltas: 90, 110, 90, 110 -> mean 100, population deviation 10
        assert_eq!(ts.deltas_mean(Range::all()), 100.0);
        assert!((ts.deltas_deviation(Range::all()) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn find_subsequence_full_match() {
        let ts = fill(&[5, 1, 2, 3, 5]);
        let range = ts.find_subsequence(&[1, 2, 3]).unwrap();
        assert_eq!(range, Range::new(1, 4));
    }

    #[test]
    fn find_subsequence_longest_prefix() {
        let ts = fill(&[1, 2, 9, 1, 2, 3, 9]);
        let range = ts.find_subsequence(&[1, 2, 3, 4]).unwrap();
        assert_eq!(range, Range::new(3, 6), "longest prefix (1,2,3) wins");
    }

    #[test]
    fn find_subsequence_rejects_empty_needle() {
        let ts = fill(&[1, 2, 3]);
        assert!(matches!(
            ts.find_subsequence(&[]),
            Err(Error::EmptyNeedle)
        ));
    }

    #[test]
    fn find_repetitive_subsequence() {
        let ts = fill(&[0, 1, 0, 1, 0, 1, 0, 7]);
        let range = ts.find_repetitive_subsequence(&[0, 1]).unwrap();
        assert_eq!(range, Range::new(0, 6), "three whole copies");

        let none = ts.find_repetitive_subsequence(&[7, 7, 7]).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn find_selected_subsequence_cases() {
        let check = |haystack: &[i32], needle: &[i32], expected: &[usize], complete: bool| {
            let (res, mapping) = fill(haystack).find_selected_subsequence(&fill(needle));
            assert_eq!(res, complete);
            assert_eq!(mapping, expected);
        };

        check(&[10, 20, 30], &[10, 20, 30], &[0, 1, 2], true);
        check(&[10, 20, 30, 40, 50, 60, 70], &[20, 50, 60], &[1, 4, 5], true);
        check(&[10, 20, 30], &[30, 40, 50], &[2], false);
        check(&[10, 20, 30], &[40, 50, 60], &[], false);
        check(
            &[10, 0, 10, 20, 20, 30, 31, 30, 40, 70, 40],
            &[10, 20, 30, 40],
            &[0, 3, 5, 8],
            true
        );
    }

    #[test]
    fn compare_is_symmetric() {
        let cmp = |t1: &[LogTime], t2: &[LogTime], from: LogTime, until: LogTime| {
            let ts1 = fill_counter(t1);
            let ts2 = fill_counter(t2);
            let res = ts1.compare(&ts2, from, until, 0);
            let res2 = ts2.compare(&ts1, from, until, 0);
            assert_eq!(res, res2, "compare() should be symmetric");
            res
        };

        assert_eq!(cmp(&[100, 300, 500, 800], &[100, 300, 500, 800], 0, 1000), 0);
        assert_eq!(cmp(&[100, 300, 501, 800], &[100, 300, 500, 800], 0, 1000), 1);
        assert_eq!(cmp(&[100, 300, 500, 800], &[150, 350, 550, 850], 0, 1000), 200);
        assert_eq!(cmp(&[100, 300, 500, 800], &[50, 250, 450, 750], 0, 1000), 200);
        assert_eq!(
            cmp(&[100, 150, 200, 850, 900], &[300, 400, 500, 800, 850], 0, 1000),
            500
        );
        assert_eq!(
            cmp(
                &[100, 200, 300, 400, 500, 600],
                &[110, 210, 310, 410, 510, 610],
                205,
                605
            ),
            40
        );
        assert_eq!(cmp(&[0, 30, 50, 80, 90], &[100, 300, 500, 800], 0, 1000), 1000);
    }

    #[test]
    fn compare_uses_initial_before_first_event() {
        let empty: TimeSeries<i32> = TimeSeries::new();
        let mut late = TimeSeries::new();
        late.append(600, 1).unwrap();
        // equal (both 0) until 600, diverged afterwards
        assert_eq!(empty.compare(&late, 0, 1000, 0), 400);
    }
}
