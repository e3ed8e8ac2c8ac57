//! Error types for the emulator and its event pipeline.
//!
//! All failures raised by the engine are variants of [`Error`]. The taxonomy
//! follows the harness contract: configuration errors (bad wiring, bad chain
//! topology), emulator violations (disabled or misused API calls), framework
//! tampering, causality violations and scenario-file problems. Every variant
//! is terminal for the current test; the engine never retries.

use crate::chain::ValueKind;
use crate::{LogTime, PinId};

/// Errors that can occur during simulation setup or execution.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --- configuration ---
    /// An API method name that the gate does not know.
    #[error("unknown API method '{name}'")]
    UnknownMethod {
        /// The offending name as given in the configuration.
        name: String,
    },

    /// A pin was registered twice.
    #[error("pin {pin} is already registered")]
    DuplicatePin {
        /// The pin identifier.
        pin: PinId,
    },

    /// A pin number that is not present in the registry.
    #[error("pin {pin} is not defined in the emulator")]
    UnknownPin {
        /// The pin identifier.
        pin: PinId,
    },

    /// A mode value outside INPUT/OUTPUT was passed to `pinMode`.
    #[error("invalid mode {mode} for pin {pin}")]
    InvalidMode {
        /// The pin identifier.
        pin: PinId,
        /// The raw mode value.
        mode: u8,
    },

    /// An attempt to flip a pin between input and output at runtime.
    #[error("I/O mode of pin {pin} cannot be changed at runtime")]
    ModeChange {
        /// The pin identifier.
        pin: PinId,
    },

    /// Switching an input-wired pin into output mode (risk of short circuit).
    #[error("pin {pin} is wired as input and cannot become an output")]
    WiringConflict {
        /// The pin identifier.
        pin: PinId,
    },

    /// An input upstream was attached to a pin that is not wired as input.
    #[error("pin {pin} is not wired as input, cannot attach an input stream")]
    NotAnInput {
        /// The pin identifier.
        pin: PinId,
    },

    /// `attach_next` on a consumer whose `next` slot is occupied.
    #[error("next consumer is already attached")]
    NextOccupied,

    /// `detach_next` on a consumer with no `next` link.
    #[error("no next consumer is attached")]
    NextEmpty,

    /// `attach_sprout` on a consumer whose sprout slot is occupied.
    #[error("sprout consumer is already attached")]
    SproutOccupied,

    /// `detach_sprout` on a consumer with no sprout link.
    #[error("no sprout consumer is attached")]
    SproutEmpty,

    /// Sprout operation on a consumer that does not fork.
    #[error("consumer has no sprout (it is not a forked consumer)")]
    NotForked,

    /// Attaching a consumer would close a delivery cycle.
    #[error("attaching here would create a cycle in the consumer chain")]
    WouldCycle,

    /// A consumer key that is no longer (or never was) part of the pipeline.
    #[error("consumer key does not resolve to a live pipeline node")]
    StaleConsumer,

    /// Linking consumers with incompatible event payload types.
    #[error("payload kind mismatch: expected {expected:?}, found {found:?}")]
    KindMismatch {
        /// Kind the receiving consumer accepts.
        expected: ValueKind,
        /// Kind the producer emits.
        found: ValueKind,
    },

    /// A filter window of zero length.
    #[error("filter time window must be greater than 0")]
    BadWindow,

    /// A demultiplexer threshold outside `1..=window`.
    #[error("threshold {threshold} is out of range of the {window} us window")]
    BadThreshold {
        /// The rejected threshold.
        threshold: LogTime,
        /// The window it was checked against.
        window: LogTime,
    },

    // --- emulator violations ---
    /// A gated API method was called while disabled.
    #[error("the {name}() function is disabled in the emulator")]
    MethodDisabled {
        /// Arduino-style method name.
        name: &'static str,
    },

    /// A pin was used before its mode was set.
    #[error("mode of pin {pin} has to be set before the pin is used")]
    ModeNotSet {
        /// The pin identifier.
        pin: PinId,
    },

    /// A read on an output pin.
    #[error("unable to read data from output pin {pin}")]
    ReadFromOutput {
        /// The pin identifier.
        pin: PinId,
    },

    /// A write on an input pin.
    #[error("unable to write data to input pin {pin}")]
    WriteToInput {
        /// The pin identifier.
        pin: PinId,
    },

    /// PWM request on a pin without PWM capability.
    #[error("pin {pin} does not support PWM output")]
    NotPwmPin {
        /// The pin identifier.
        pin: PinId,
    },

    /// An API entry point the emulator does not implement.
    #[error("the {name}() function is not implemented in the emulator")]
    Unsupported {
        /// Arduino-style method name.
        name: &'static str,
    },

    // --- framework tampering ---
    /// The process-wide emulator handle was acquired more than once.
    #[error("emulator instance has been accessed multiple times; someone is tampering with the framework")]
    Tampered,

    /// The process-wide emulator handle was used before installation.
    #[error("no emulator instance has been installed")]
    NotInstalled,

    // --- causality ---
    /// An event or time notification older than the consumer's watermark.
    #[error("causality violated: time {time} is before the last seen time {last}")]
    Causality {
        /// The consumer's watermark.
        last: LogTime,
        /// The offending timestamp.
        time: LogTime,
    },

    /// A serial input scheduled before an already-scheduled entry.
    #[error("serial input at {time} would violate ordering; last event is scheduled at {last}")]
    SerialOutOfOrder {
        /// Timestamp of the latest scheduled entry.
        last: LogTime,
        /// The rejected timestamp.
        time: LogTime,
    },

    // --- series queries ---
    /// An empty needle passed to a subsequence search.
    #[error("empty sequence given as needle for search")]
    EmptyNeedle,

    // --- scenario files ---
    /// A malformed or out-of-order scenario line.
    #[error("scenario error on line {line}: {reason}")]
    Scenario {
        /// One-based line number.
        line: usize,
        /// What went wrong.
        reason: String,
    },

    /// An I/O failure while reading inputs or writing logs.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_disabled_display() {
        let e = Error::MethodDisabled { name: "millis" };
        assert_eq!(
            e.to_string(),
            "the millis() function is disabled in the emulator"
        );
    }

    #[test]
    fn causality_display() {
        let e = Error::Causality {
            last: 100,
            time: 40,
        };
        assert_eq!(
            e.to_string(),
            "causality violated: time 40 is before the last seen time 100"
        );
    }

    #[test]
    fn kind_mismatch_display() {
        let e = Error::KindMismatch {
            expected: ValueKind::Bits,
            found: ValueKind::Pin,
        };
        assert!(e.to_string().contains("payload kind mismatch"));
    }

    #[test]
    fn scenario_display() {
        let e = Error::Scenario {
            line: 7,
            reason: "timestamps are not ordered".into(),
        };
        assert_eq!(
            e.to_string(),
            "scenario error on line 7: timestamps are not ordered"
        );
    }
}
