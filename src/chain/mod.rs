//! Event-consumer chains for pin and display state reconstruction.
//!
//! This module notably includes:
//! - [`Pipeline`]: the arena holding all consumers and their links
//! - [`Consumer`]: the interface all chain stages implement
//! - [`ConsumerFn`]: the closed enum of supported stage types
//!
//! A consumer receives timestamped events, may transform or swallow them, and
//! forwards results along its `next` link (same payload kind). Forked
//! consumers additionally own a *sprout* link that carries reconstructed
//! events of a possibly different kind. Links are non-owning keys into the
//! pipeline's slotmap and can be attached only once; ownership of all stages
//! rests with the pipeline itself.

use std::collections::{HashSet, VecDeque};

use enum_dispatch::enum_dispatch;
use slotmap::{SlotMap, new_key_type};

use crate::bitarray::BitArray;
use crate::emulator::pin::{Pin, PinState};
use crate::error::Error;
use crate::series::TimeSeries;
use crate::LogTime;

pub use display::{LedPanel, SegDisplay};
pub use filters::{Aggregator, Demultiplexer};

pub mod display;
pub mod filters;

/// Electrical level of a lit LED on the shield (active-low wiring).
pub const ON: bool = false;
/// Electrical level of a dark LED on the shield.
pub const OFF: bool = true;

new_key_type! {
    /// Key type for consumers registered in a [`Pipeline`].
    pub struct ConsumerKey;
}

/// The kind of payload an event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// A single pin state change.
    Pin,
    /// A reconstructed bit-array state.
    Bits
}

/// An event payload travelling through a consumer chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    /// A pin state change.
    Pin(PinState),
    /// A reconstructed bit-array state.
    Bits(BitArray)
}

impl Value {
    /// The kind tag of this payload.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Pin(_) => ValueKind::Pin,
            Value::Bits(_) => ValueKind::Bits
        }
    }

    /// The inner bit array, if this is a bits payload.
    pub fn bits(self) -> Option<BitArray> {
        match self {
            Value::Bits(b) => Some(b),
            Value::Pin(_) => None
        }
    }

    /// The inner pin state, if this is a pin payload.
    pub fn pin(self) -> Option<PinState> {
        match self {
            Value::Pin(p) => Some(p),
            Value::Bits(_) => None
        }
    }
}

impl From<PinState> for Value {
    fn from(value: PinState) -> Self {
        Value::Pin(value)
    }
}
impl From<BitArray> for Value {
    fn from(value: BitArray) -> Self {
        Value::Bits(value)
    }
}

impl std::fmt::Display for Value {
    /// Pin payloads print as `pin:value`; bit arrays as low-byte-first hex.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Pin(p) => write!(f, "{p}"),
            Value::Bits(b) => {
                for i in 0..u32::from(b.len().div_ceil(8)) {
                    write!(f, "{:02x}", b.get_byte(i))?;
                }
                Ok(())
            }
        }
    }
}

/// Which outgoing link of a consumer an emission targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Port {
    Next,
    Sprout
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Op {
    Event(LogTime, Value),
    Advance(LogTime)
}

/// Collects the emissions a stage produces while handling one event or time
/// notification. The pipeline routes them to the stage's links afterwards.
#[derive(Debug, Default)]
pub struct Emits {
    ops: Vec<(Port, Op)>
}

impl Emits {
    /// Pass an event to the next consumer in the chain.
    pub fn event_next(&mut self, time: LogTime, value: impl Into<Value>) {
        self.ops.push((Port::Next, Op::Event(time, value.into())));
    }

    /// Emit a reconstructed event on the sprout.
    pub fn event_sprout(&mut self, time: LogTime, value: impl Into<Value>) {
        self.ops.push((Port::Sprout, Op::Event(time, value.into())));
    }

    /// Notify the next consumer that tempus fugit.
    pub fn advance_next(&mut self, time: LogTime) {
        self.ops.push((Port::Next, Op::Advance(time)));
    }

    /// Notify the sprout consumer that time has advanced.
    pub fn advance_sprout(&mut self, time: LogTime) {
        self.ops.push((Port::Sprout, Op::Advance(time)));
    }
}

/// The interface defining how a chain stage consumes events.
#[enum_dispatch]
pub trait Consumer {
    /// Payload kind accepted on the main input.
    fn input_kind(&self) -> ValueKind;

    /// Payload kind this stage forwards on its `next` link.
    ///
    /// Unless a stage transforms the payload, this equals the input kind.
    fn next_kind(&self) -> ValueKind {
        self.input_kind()
    }

    /// Payload kind emitted on the sprout link, for forked stages only.
    fn sprout_kind(&self) -> Option<ValueKind> {
        None
    }

    /// Handles one incoming event. Emissions are collected in `out`; the
    /// pipeline takes care of causality checks and routing.
    fn consume(&mut self, time: LogTime, value: Value, out: &mut Emits) -> Result<(), Error>;

    /// Handles a time notification without an event. The default is a
    /// transparent throughput to the next consumer.
    fn advance(&mut self, time: LogTime, out: &mut Emits) -> Result<(), Error> {
        out.advance_next(time);
        Ok(())
    }

    /// Drops accumulated stage state (recorded events, window accumulators).
    /// Watermarks are kept by the pipeline and are not affected.
    fn reset(&mut self) {}
}

/// An enum that represents all supported chain stages.
#[enum_dispatch(Consumer)]
#[derive(Debug)]
pub enum ConsumerFn {
    /// A virtual digital pin (producer of its own events, terminal consumer
    /// of a scheduled input stream).
    Pin(Pin),
    /// A time-series sink that records and forwards events.
    Recorder(Recorder),
    /// A future time series releasing scheduled input events.
    InputQueue(InputQueue),
    /// Window-based state demultiplexer.
    Demultiplexer(Demultiplexer),
    /// Debouncing state aggregator.
    Aggregator(Aggregator),
    /// A bank of independent LEDs folded into one bit-array state.
    LedPanel(LedPanel),
    /// The serial-register 7-segment display model.
    SegDisplay(SegDisplay),
    /// A callback observer.
    Probe(Probe)
}

/// One slot of the pipeline arena: the stage, its links and its watermark.
#[derive(Debug)]
struct ConsumerNode {
    func: ConsumerFn,
    next: Option<ConsumerKey>,
    sprout: Option<ConsumerKey>,
    last_time: LogTime
}

impl ConsumerNode {
    fn new(func: ConsumerFn) -> Self {
        Self { func, next: None, sprout: None, last_time: 0 }
    }
}

/// The arena of event consumers and the dispatch engine over them.
#[derive(Debug, Default)]
pub struct Pipeline {
    nodes: SlotMap<ConsumerKey, ConsumerNode>
}

impl Pipeline {
    /// Constructs an empty pipeline.
    pub fn new() -> Self {
        Default::default()
    }

    /// Registers a new stage and returns its key.
    pub fn insert(&mut self, func: impl Into<ConsumerFn>) -> ConsumerKey {
        self.nodes.insert(ConsumerNode::new(func.into()))
    }

    /// Removes a stage from the arena, returning it if it was present.
    /// Links of other consumers pointing at the removed stage go stale.
    pub fn remove(&mut self, key: ConsumerKey) -> Option<ConsumerFn> {
        self.nodes.remove(key).map(|n| n.func)
    }

    /// Immutable access to a stage.
    pub fn func(&self, key: ConsumerKey) -> Option<&ConsumerFn> {
        self.nodes.get(key).map(|n| &n.func)
    }

    /// Mutable access to a stage.
    pub fn func_mut(&mut self, key: ConsumerKey) -> Option<&mut ConsumerFn> {
        self.nodes.get_mut(key).map(|n| &mut n.func)
    }

    /// The `next` link of a consumer, if any.
    pub fn next_of(&self, key: ConsumerKey) -> Option<ConsumerKey> {
        self.nodes.get(key).and_then(|n| n.next)
    }

    /// The sprout link of a consumer, if any.
    pub fn sprout_of(&self, key: ConsumerKey) -> Option<ConsumerKey> {
        self.nodes.get(key).and_then(|n| n.sprout)
    }

    /// The watermark (time of the last event or notification) of a consumer.
    pub fn last_time(&self, key: ConsumerKey) -> Option<LogTime> {
        self.nodes.get(key).map(|n| n.last_time)
    }

    /// Walks the linear chain from `key` to its last consumer.
    pub fn last_consumer(&self, key: ConsumerKey) -> ConsumerKey {
        let mut last = key;
        while let Some(next) = self.next_of(last) {
            last = next;
        }
        last
    }

    /// Attaches `next` right after `at`.
    ///
    /// Fails when the slot is occupied, the payload kinds do not line up, or
    /// the link would close a delivery cycle.
    pub fn attach_next(&mut self, at: ConsumerKey, next: ConsumerKey) -> Result<(), Error> {
        let produced = self.nodes.get(at).ok_or(Error::StaleConsumer)?.func.next_kind();
        let accepted = self.nodes.get(next).ok_or(Error::StaleConsumer)?.func.input_kind();
        if produced != accepted {
            return Err(Error::KindMismatch { expected: accepted, found: produced });
        }
        if self.nodes[at].next.is_some() {
            return Err(Error::NextOccupied);
        }
        if self.reaches(next, at) {
            return Err(Error::WouldCycle);
        }
        self.nodes[at].next = Some(next);
        Ok(())
    }

    /// Detaches and returns the `next` link of `at`.
    pub fn detach_next(&mut self, at: ConsumerKey) -> Result<ConsumerKey, Error> {
        let node = self.nodes.get_mut(at).ok_or(Error::StaleConsumer)?;
        node.next.take().ok_or(Error::NextEmpty)
    }

    /// Attaches a sprout consumer to the forked stage `at`.
    pub fn attach_sprout(&mut self, at: ConsumerKey, sprout: ConsumerKey) -> Result<(), Error> {
        let produced = self
            .nodes
            .get(at)
            .ok_or(Error::StaleConsumer)?
            .func
            .sprout_kind()
            .ok_or(Error::NotForked)?;
        let accepted = self.nodes.get(sprout).ok_or(Error::StaleConsumer)?.func.input_kind();
        if produced != accepted {
            return Err(Error::KindMismatch { expected: accepted, found: produced });
        }
        if self.nodes[at].sprout.is_some() {
            return Err(Error::SproutOccupied);
        }
        if self.reaches(sprout, at) {
            return Err(Error::WouldCycle);
        }
        self.nodes[at].sprout = Some(sprout);
        Ok(())
    }

    /// Detaches and returns the sprout link of `at`.
    pub fn detach_sprout(&mut self, at: ConsumerKey) -> Result<ConsumerKey, Error> {
        let node = self.nodes.get_mut(at).ok_or(Error::StaleConsumer)?;
        if node.func.sprout_kind().is_none() {
            return Err(Error::NotForked);
        }
        node.sprout.take().ok_or(Error::SproutEmpty)
    }

    /// Whether `to` is reachable from `from` over next and sprout links.
    fn reaches(&self, from: ConsumerKey, to: ConsumerKey) -> bool {
        let mut frontier = vec![from];
        let mut seen = HashSet::new();
        while let Some(key) = frontier.pop() {
            if key == to {
                return true;
            }
            if !seen.insert(key) {
                continue;
            }
            if let Some(node) = self.nodes.get(key) {
                frontier.extend(node.next);
                frontier.extend(node.sprout);
            }
        }
        false
    }

    /// Consumes an event at the given consumer and runs the resulting
    /// emission cascade to completion.
    pub fn add_event(&mut self, key: ConsumerKey, time: LogTime, value: impl Into<Value>) -> Result<(), Error> {
        self.run(key, Op::Event(time, value.into()))
    }

    /// Notifies a consumer (and transitively its chain) that time advanced.
    pub fn advance_time(&mut self, key: ConsumerKey, time: LogTime) -> Result<(), Error> {
        self.run(key, Op::Advance(time))
    }

    /// Clears all recorded state downstream of `key` (following next and
    /// sprout links). Logical time watermarks are not reset.
    pub fn clear(&mut self, key: ConsumerKey) {
        let mut frontier = vec![key];
        let mut seen = HashSet::new();
        while let Some(key) = frontier.pop() {
            if !seen.insert(key) {
                continue;
            }
            if let Some(node) = self.nodes.get_mut(key) {
                node.func.reset();
                frontier.extend(node.next);
                frontier.extend(node.sprout);
            }
        }
    }

    /// Schedules a future input event on an [`InputQueue`] stage.
    ///
    /// The event is held back until virtual time reaches it. Future events
    /// may be inserted in any order as long as none is older than the
    /// queue's watermark.
    pub fn schedule(&mut self, key: ConsumerKey, time: LogTime, value: impl Into<Value>) -> Result<(), Error> {
        let node = self.nodes.get_mut(key).ok_or(Error::StaleConsumer)?;
        if time < node.last_time {
            return Err(Error::Causality { last: node.last_time, time });
        }
        match &mut node.func {
            ConsumerFn::InputQueue(queue) => {
                queue.schedule(time, value.into());
                Ok(())
            }
            other => panic!("expected an input queue stage, found {other:?}")
        }
    }

    /// The recorded series of a [`Recorder`] stage.
    pub fn series(&self, key: ConsumerKey) -> Option<&TimeSeries<Value>> {
        match self.func(key)? {
            ConsumerFn::Recorder(recorder) => Some(recorder.series()),
            _ => None
        }
    }

    /// Work-list dispatch: each processed stage may enqueue further
    /// deliveries for its links until the cascade settles.
    fn run(&mut self, key: ConsumerKey, op: Op) -> Result<(), Error> {
        let mut queue = VecDeque::new();
        queue.push_back((key, op));

        while let Some((key, op)) = queue.pop_front() {
            let node = self.nodes.get_mut(key).ok_or(Error::StaleConsumer)?;
            let mut out = Emits::default();
            match op {
                Op::Event(time, value) => {
                    if time < node.last_time {
                        return Err(Error::Causality { last: node.last_time, time });
                    }
                    let expected = node.func.input_kind();
                    if value.kind() != expected {
                        return Err(Error::KindMismatch { expected, found: value.kind() });
                    }
                    node.func.consume(time, value, &mut out)?;
                    node.last_time = time;
                }
                Op::Advance(time) => {
                    if time < node.last_time {
                        return Err(Error::Causality { last: node.last_time, time });
                    }
                    node.func.advance(time, &mut out)?;
                    node.last_time = time;
                }
            }

            let (next, sprout) = (node.next, node.sprout);
            for (port, op) in out.ops {
                let target = match port {
                    Port::Next => next,
                    Port::Sprout => sprout
                };
                if let Some(target) = target {
                    queue.push_back((target, op));
                }
            }
        }

        Ok(())
    }
}

/// A terminal sink that records every event into a [`TimeSeries`] and
/// forwards it unchanged.
#[derive(Debug)]
pub struct Recorder {
    kind: ValueKind,
    series: TimeSeries<Value>
}

impl Recorder {
    /// Creates a recorder accepting the given payload kind.
    pub fn new(kind: ValueKind) -> Self {
        Self { kind, series: TimeSeries::new() }
    }

    /// The recorded events.
    pub fn series(&self) -> &TimeSeries<Value> {
        &self.series
    }
}

impl Consumer for Recorder {
    fn input_kind(&self) -> ValueKind {
        self.kind
    }

    fn consume(&mut self, time: LogTime, value: Value, out: &mut Emits) -> Result<(), Error> {
        self.series.append(time, value)?;
        out.event_next(time, value);
        Ok(())
    }

    fn reset(&mut self) {
        self.series.clear();
    }
}

/// A future time series: events are registered ahead of time and released to
/// the next consumer only once virtual time reaches them.
#[derive(Debug)]
pub struct InputQueue {
    kind: ValueKind,
    series: TimeSeries<Value>,
    consumed: usize
}

impl InputQueue {
    /// Creates an input queue carrying the given payload kind.
    pub fn new(kind: ValueKind) -> Self {
        Self { kind, series: TimeSeries::new(), consumed: 0 }
    }

    /// All scheduled events, released or not.
    pub fn series(&self) -> &TimeSeries<Value> {
        &self.series
    }

    /// Number of events already released downstream.
    pub fn released(&self) -> usize {
        self.consumed
    }

    fn schedule(&mut self, time: LogTime, value: Value) {
        debug_assert!(
            self.consumed == 0 || self.series[self.consumed - 1].time <= time,
            "scheduled event sorts before an already released one"
        );
        self.series.insert_raw(time, value);
    }

    fn release_until(&mut self, time: LogTime, out: &mut Emits) {
        while let Some(event) = self.series.get(self.consumed) {
            if event.time > time {
                break;
            }
            out.event_next(event.time, event.value);
            self.consumed += 1;
        }
    }
}

impl Consumer for InputQueue {
    fn input_kind(&self) -> ValueKind {
        self.kind
    }

    fn consume(&mut self, time: LogTime, value: Value, out: &mut Emits) -> Result<(), Error> {
        self.release_until(time, out);
        // a directly consumed event sorts right after everything already
        // released (scheduled events still pending are all younger) and
        // passes through immediately
        self.series.insert_raw(time, value);
        self.consumed += 1;
        out.event_next(time, value);
        Ok(())
    }

    fn advance(&mut self, time: LogTime, out: &mut Emits) -> Result<(), Error> {
        self.release_until(time, out);
        out.advance_next(time);
        Ok(())
    }

    fn reset(&mut self) {
        self.series.clear();
        self.consumed = 0;
    }
}

/// A transparent observer invoking a callback for every passing event.
pub struct Probe {
    kind: ValueKind,
    hook: Box<dyn FnMut(LogTime, &Value) + Send>
}

impl Probe {
    /// Creates a probe for the given payload kind.
    pub fn new(kind: ValueKind, hook: impl FnMut(LogTime, &Value) + Send + 'static) -> Self {
        Self { kind, hook: Box::new(hook) }
    }
}

impl Consumer for Probe {
    fn input_kind(&self) -> ValueKind {
        self.kind
    }

    fn consume(&mut self, time: LogTime, value: Value, out: &mut Emits) -> Result<(), Error> {
        (self.hook)(time, &value);
        out.event_next(time, value);
        Ok(())
    }
}

impl std::fmt::Debug for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Probe").field("kind", &self.kind).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitarr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn bits(v: u64) -> Value {
        Value::Bits(BitArray::from_bits(v, 4))
    }

    #[test]
    fn recorder_records_and_forwards() {
        let mut pipeline = Pipeline::new();
        let first = pipeline.insert(Recorder::new(ValueKind::Bits));
        let second = pipeline.insert(Recorder::new(ValueKind::Bits));
        pipeline.attach_next(first, second).unwrap();

        pipeline.add_event(first, 10, bits(0b0101)).unwrap();
        pipeline.add_event(first, 20, bits(0b1111)).unwrap();

        assert_eq!(pipeline.series(first).unwrap().len(), 2);
        assert_eq!(pipeline.series(second).unwrap().len(), 2);
        assert_eq!(pipeline.series(second).unwrap()[1].value, bits(0b1111));
    }

    #[test]
    fn add_event_checks_causality() {
        let mut pipeline = Pipeline::new();
        let key = pipeline.insert(Recorder::new(ValueKind::Bits));
        pipeline.add_event(key, 100, bits(1)).unwrap();
        assert!(matches!(
            pipeline.add_event(key, 99, bits(1)),
            Err(Error::Causality { last: 100, time: 99 })
        ));
    }

    #[test]
    fn advance_time_checks_causality() {
        let mut pipeline = Pipeline::new();
        let key = pipeline.insert(Recorder::new(ValueKind::Bits));
        pipeline.advance_time(key, 50).unwrap();
        assert!(pipeline.advance_time(key, 50).is_ok(), "equal time is allowed");
        assert!(matches!(
            pipeline.advance_time(key, 49),
            Err(Error::Causality { .. })
        ));
    }

    #[test]
    fn attach_next_rejects_occupied_slot() {
        let mut pipeline = Pipeline::new();
        let a = pipeline.insert(Recorder::new(ValueKind::Bits));
        let b = pipeline.insert(Recorder::new(ValueKind::Bits));
        let c = pipeline.insert(Recorder::new(ValueKind::Bits));
        pipeline.attach_next(a, b).unwrap();
        assert!(matches!(pipeline.attach_next(a, c), Err(Error::NextOccupied)));
    }

    #[test]
    fn detach_next_rejects_empty_slot() {
        let mut pipeline = Pipeline::new();
        let a = pipeline.insert(Recorder::new(ValueKind::Bits));
        assert!(matches!(pipeline.detach_next(a), Err(Error::NextEmpty)));
    }

    #[test]
    fn attach_next_rejects_kind_mismatch() {
        let mut pipeline = Pipeline::new();
        let a = pipeline.insert(Recorder::new(ValueKind::Bits));
        let b = pipeline.insert(Recorder::new(ValueKind::Pin));
        assert!(matches!(
            pipeline.attach_next(a, b),
            Err(Error::KindMismatch { expected: ValueKind::Pin, found: ValueKind::Bits })
        ));
    }

    #[test]
    fn attach_next_rejects_cycles() {
        let mut pipeline = Pipeline::new();
        let a = pipeline.insert(Recorder::new(ValueKind::Bits));
        let b = pipeline.insert(Recorder::new(ValueKind::Bits));
        pipeline.attach_next(a, b).unwrap();
        assert!(matches!(pipeline.attach_next(b, a), Err(Error::WouldCycle)));
        assert!(matches!(pipeline.attach_next(b, b), Err(Error::WouldCycle)));
    }

    #[test]
    fn sprout_requires_forked_stage() {
        let mut pipeline = Pipeline::new();
        let a = pipeline.insert(Recorder::new(ValueKind::Bits));
        let b = pipeline.insert(Recorder::new(ValueKind::Bits));
        assert!(matches!(pipeline.attach_sprout(a, b), Err(Error::NotForked)));
        assert!(matches!(pipeline.detach_sprout(a), Err(Error::NotForked)));
    }

    #[test]
    fn last_consumer_walks_the_chain() {
        let mut pipeline = Pipeline::new();
        let a = pipeline.insert(Recorder::new(ValueKind::Bits));
        let b = pipeline.insert(Recorder::new(ValueKind::Bits));
        let c = pipeline.insert(Recorder::new(ValueKind::Bits));
        pipeline.attach_next(a, b).unwrap();
        pipeline.attach_next(b, c).unwrap();
        assert_eq!(pipeline.last_consumer(a), c);
        assert_eq!(pipeline.last_consumer(c), c);
    }

    #[test]
    fn input_queue_releases_in_order() {
        let mut pipeline = Pipeline::new();
        let queue = pipeline.insert(InputQueue::new(ValueKind::Bits));
        let sink = pipeline.insert(Recorder::new(ValueKind::Bits));
        pipeline.attach_next(queue, sink).unwrap();

        // scheduled out of order, must come out sorted
        pipeline.schedule(queue, 300, bits(3)).unwrap();
        pipeline.schedule(queue, 100, bits(1)).unwrap();
        pipeline.schedule(queue, 200, bits(2)).unwrap();

        pipeline.advance_time(queue, 150).unwrap();
        assert_eq!(pipeline.series(sink).unwrap().len(), 1);

        pipeline.advance_time(queue, 400).unwrap();
        let recorded = pipeline.series(sink).unwrap();
        let times: Vec<_> = recorded.iter().map(|e| e.time).collect();
        assert_eq!(times, vec![100, 200, 300]);
    }

    #[test]
    fn input_queue_passes_direct_events_through() {
        let mut pipeline = Pipeline::new();
        let queue = pipeline.insert(InputQueue::new(ValueKind::Bits));
        let sink = pipeline.insert(Recorder::new(ValueKind::Bits));
        pipeline.attach_next(queue, sink).unwrap();

        // a scheduled event still lies in the future...
        pipeline.schedule(queue, 900, bits(9)).unwrap();
        // ...when a direct event arrives and must pass through immediately
        pipeline.add_event(queue, 500, bits(5)).unwrap();

        let times: Vec<_> = pipeline.series(sink).unwrap().iter().map(|e| e.time).collect();
        assert_eq!(times, vec![500]);

        pipeline.advance_time(queue, 1000).unwrap();
        let times: Vec<_> = pipeline.series(sink).unwrap().iter().map(|e| e.time).collect();
        assert_eq!(times, vec![500, 900], "the scheduled event is still released");
    }

    #[test]
    fn schedule_rejects_events_before_watermark() {
        let mut pipeline = Pipeline::new();
        let queue = pipeline.insert(InputQueue::new(ValueKind::Bits));
        pipeline.advance_time(queue, 500).unwrap();
        assert!(matches!(
            pipeline.schedule(queue, 400, bits(1)),
            Err(Error::Causality { last: 500, time: 400 })
        ));
    }

    #[test]
    fn clear_propagates_but_keeps_watermark() {
        let mut pipeline = Pipeline::new();
        let a = pipeline.insert(Recorder::new(ValueKind::Bits));
        let b = pipeline.insert(Recorder::new(ValueKind::Bits));
        pipeline.attach_next(a, b).unwrap();

        pipeline.add_event(a, 100, bits(1)).unwrap();
        pipeline.clear(a);

        assert!(pipeline.series(a).unwrap().is_empty());
        assert!(pipeline.series(b).unwrap().is_empty());
        assert_eq!(pipeline.last_time(a), Some(100));
        assert!(matches!(
            pipeline.add_event(a, 50, bits(1)),
            Err(Error::Causality { .. })
        ));
    }

    #[test]
    fn probe_sees_every_event() {
        let count = Arc::new(AtomicUsize::new(0));
        let hooked = count.clone();

        let mut pipeline = Pipeline::new();
        let probe = pipeline.insert(Probe::new(ValueKind::Bits, move |_, _| {
            hooked.fetch_add(1, Ordering::Relaxed);
        }));
        let sink = pipeline.insert(Recorder::new(ValueKind::Bits));
        pipeline.attach_next(probe, sink).unwrap();

        pipeline.add_event(probe, 1, bits(1)).unwrap();
        pipeline.add_event(probe, 2, bits(2)).unwrap();

        assert_eq!(count.load(Ordering::Relaxed), 2);
        assert_eq!(pipeline.series(sink).unwrap().len(), 2);
    }

    #[test]
    fn payload_kind_is_checked_on_delivery() {
        let mut pipeline = Pipeline::new();
        let key = pipeline.insert(Recorder::new(ValueKind::Pin));
        assert!(matches!(
            pipeline.add_event(key, 0, bitarr![1, 0]),
            Err(Error::KindMismatch { .. })
        ));
    }

    #[test]
    fn value_formatting() {
        assert_eq!(bits(0b0101).to_string(), "05");
        let wide = Value::Bits(BitArray::from_bits(0x00FF_C0DE, 32));
        assert_eq!(wide.to_string(), "dec0ff00");
        let pin = Value::Pin(PinState::new(13, 1));
        assert_eq!(pin.to_string(), "13:1");
    }
}
