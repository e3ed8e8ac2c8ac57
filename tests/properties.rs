//! Property-based checks of the engine's quantified invariants.

use proptest::collection::vec;
use proptest::prelude::*;

use arduinosim_engine::bitarray::BitArray;
use arduinosim_engine::chain::{Demultiplexer, Pipeline, Recorder, ValueKind, OFF, ON};
use arduinosim_engine::series::TimeSeries;

fn counter_series(times: &[u64]) -> TimeSeries<i32> {
    let mut sorted = times.to_vec();
    sorted.sort_unstable();
    let mut series = TimeSeries::new();
    for (i, t) in sorted.into_iter().enumerate() {
        series.append(t, i as i32 + 1).unwrap();
    }
    series
}

proptest! {
    /// Writing back what was read never changes the array.
    #[test]
    fn word_get_set_roundtrip(
        data in any::<u64>(),
        len in 1u8..=64,
        offset in 0u32..70,
        count in 0u32..80
    ) {
        let arr = BitArray::from_bits(data, len);
        let mut copy = arr;
        copy.set_word(arr.get_word(offset, count), offset, count);
        prop_assert_eq!(copy, arr);
    }

    /// Divergence time is symmetric in its operands.
    #[test]
    fn compare_is_symmetric(
        t1 in vec(0u64..2000, 0..24),
        t2 in vec(0u64..2000, 0..24),
        from in 0u64..500,
        until in 500u64..2500
    ) {
        let a = counter_series(&t1);
        let b = counter_series(&t2);
        prop_assert_eq!(
            a.compare(&b, from, until, 0),
            b.compare(&a, from, until, 0)
        );
    }

    /// A complete greedy match maps every needle value onto an equal
    /// haystack value, at strictly increasing indices.
    #[test]
    fn selected_subsequence_mapping_is_consistent(
        haystack in vec(0i32..6, 1..40),
        needle in vec(0i32..6, 1..8)
    ) {
        let mut hs = TimeSeries::new();
        for (i, v) in haystack.iter().enumerate() {
            hs.append(i as u64 * 10, *v).unwrap();
        }
        let mut ns = TimeSeries::new();
        for (i, v) in needle.iter().enumerate() {
            ns.append(i as u64 * 10, *v).unwrap();
        }

        let (complete, mapping) = hs.find_selected_subsequence(&ns);
        if complete {
            prop_assert_eq!(mapping.len(), needle.len());
        }
        for window in mapping.windows(2) {
            prop_assert!(window[0] < window[1]);
        }
        for (needle_idx, &haystack_idx) in mapping.iter().enumerate() {
            prop_assert_eq!(haystack[haystack_idx], needle[needle_idx]);
        }
    }

    /// An LED that is continuously lit stays lit in every demuxed state.
    #[test]
    fn demuxer_preserves_steadily_lit_leds(
        raw_states in vec(0u64..16, 1..60),
        window in 10u64..200,
        threshold_divisor in 2u64..10
    ) {
        let threshold = (window / threshold_divisor).max(1);

        let mut pipeline = Pipeline::new();
        let demux = pipeline
            .insert(Demultiplexer::new(4, window, threshold).unwrap());
        let sink = pipeline.insert(Recorder::new(ValueKind::Bits));
        pipeline.attach_next(demux, sink).unwrap();

        let mut time = 0;
        for bits in raw_states {
            time += 7;
            // LED 0 is forced on in every raw state
            let mut state = BitArray::repeat(OFF, 4);
            for i in 1..4u8 {
                if bits >> i & 1 == 0 {
                    state.set(i, ON).unwrap();
                }
            }
            state.set(0, ON).unwrap();
            pipeline.add_event(demux, time, state).unwrap();
        }
        pipeline.advance_time(demux, time + 10 * window).unwrap();

        let series = pipeline.series(sink).unwrap();
        for event in series.iter() {
            prop_assert_eq!(
                event.value.bits().unwrap().get(0),
                Some(ON),
                "steadily lit LED lost at t={}",
                event.time
            );
        }
    }
}
