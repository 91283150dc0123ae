//! Property tests for latency attribution over arbitrary chunk sequences.

use {
    getwork_timing::{ManualClock, Stage, TimingEventKind, TimingInfo, TimingInfosTracker},
    proptest::prelude::*,
};

// (clock reading for the chunk, events as (kind, millis))
type Chunk = (i64, Vec<(TimingEventKind, i64)>);

fn event_kind() -> impl Strategy<Value = TimingEventKind> {
    prop_oneof![
        Just(TimingEventKind::CreationStart),
        Just(TimingEventKind::CreationEnd),
        Just(TimingEventKind::ReceivedByDispatcher),
        Just(TimingEventKind::ForwardedByDispatcher),
        Just(TimingEventKind::Unknown),
    ]
}

fn chunks() -> impl Strategy<Value = Vec<Chunk>> {
    prop::collection::vec(
        (
            0i64..10_000,
            prop::collection::vec((event_kind(), 0i64..10_000), 0..6),
        ),
        0..12,
    )
}

fn infos(events: &[(TimingEventKind, i64)]) -> Vec<TimingInfo> {
    events
        .iter()
        .map(|&(kind, millis)| TimingInfo::new(kind, millis * 1000))
        .collect()
}

fn first(events: &[(TimingEventKind, i64)], kind: TimingEventKind) -> Option<i64> {
    events.iter().find(|(k, _)| *k == kind).map(|&(_, t)| t)
}

// Per-stage durations one chunk contributes, computed independently of the tracker.
fn expected_contributions(now: i64, events: &[(TimingEventKind, i64)]) -> Vec<(Stage, i64)> {
    let end = first(events, TimingEventKind::CreationEnd);
    let received = first(events, TimingEventKind::ReceivedByDispatcher);
    let forwarded = first(events, TimingEventKind::ForwardedByDispatcher);

    let mut out = Vec::new();
    if let (Some(end), Some(received)) = (end, received) {
        out.push((Stage::InTransitToDispatcher, received - end));
    }
    match (forwarded, end) {
        (Some(f), _) if now > f => out.push((Stage::InTransitToUserWorker, now - f)),
        (None, Some(e)) if now > e => out.push((Stage::InTransitToUserWorker, now - e)),
        _ => {}
    }
    out
}

fn replay(chunks: &[Chunk]) -> TimingInfosTracker<ManualClock> {
    let clock = ManualClock::new(0);
    let mut tracker = TimingInfosTracker::new(clock.clone());
    for (now, events) in chunks {
        clock.set(*now);
        tracker.record(&infos(events)).expect("accumulating");
    }
    tracker
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_creation_is_first_complete_pair(chunks in chunks()) {
        let tracker = replay(&chunks);

        let expected = chunks.iter().find_map(|(_, events)| {
            let start = first(events, TimingEventKind::CreationStart)?;
            let end = first(events, TimingEventKind::CreationEnd)?;
            Some(end - start)
        });

        prop_assert_eq!(tracker.creation_attribution().map(|a| a.duration_millis), expected);
    }

    #[test]
    fn prop_aggregation_tracks_sum_and_max(chunks in chunks()) {
        let tracker = replay(&chunks);

        for stage in [Stage::InTransitToDispatcher, Stage::InTransitToUserWorker] {
            let samples: Vec<i64> = chunks
                .iter()
                .flat_map(|(now, events)| expected_contributions(*now, events))
                .filter(|(s, _)| *s == stage)
                .map(|(_, d)| d)
                .collect();

            match tracker.aggregated(stage) {
                None => prop_assert!(samples.is_empty()),
                Some(agg) => {
                    prop_assert_eq!(agg.sum_millis, samples.iter().sum::<i64>());
                    prop_assert_eq!(Some(agg.max_millis), samples.iter().copied().max());
                }
            }
        }
    }

    #[test]
    fn prop_reported_durations_respect_caps(chunks in chunks()) {
        let mut tracker = replay(&chunks);
        let creation_end = tracker.creation_end_millis();
        let last_observed = tracker.last_observed_millis();
        let observed: Vec<(Stage, i64, i64)> =
            [Stage::InTransitToDispatcher, Stage::InTransitToUserWorker]
                .into_iter()
                .filter_map(|s| {
                    tracker
                        .aggregated(s)
                        .map(|agg| (s, agg.sum_millis, agg.max_millis))
                })
                .collect();
        // Clock skew between hosts can make a hop negative, which breaks conservation.
        let non_negative = observed.iter().all(|&(_, sum, _)| sum >= 0);

        let attributions = tracker.finalize();
        let transit: Vec<_> = attributions
            .iter()
            .filter(|a| a.stage != Stage::CreationInUpstream)
            .collect();

        for a in &transit {
            let max = observed
                .iter()
                .find(|(s, _, _)| *s == a.stage)
                .map(|&(_, _, m)| m)
                .expect("reported stage was observed");
            prop_assert!(a.duration_millis <= max);
        }

        if creation_end <= last_observed && non_negative {
            let total: i64 = transit.iter().map(|a| a.duration_millis).sum();
            prop_assert!(total <= last_observed - creation_end);
        }
    }

    #[test]
    fn prop_creation_end_and_last_observed_are_monotonic(chunks in chunks()) {
        let clock = ManualClock::new(0);
        let mut tracker = TimingInfosTracker::new(clock.clone());
        let mut prev_end = tracker.creation_end_millis();
        let mut now = 0;

        for (step, events) in &chunks {
            // Wall clock only moves forward.
            now += step;
            clock.set(now);
            tracker.record(&infos(events)).expect("accumulating");

            prop_assert!(tracker.creation_end_millis() >= prev_end);
            prop_assert_eq!(tracker.last_observed_millis(), now);
            prev_end = tracker.creation_end_millis();
        }
    }

    #[test]
    fn prop_reset_behaves_like_new(chunks in chunks()) {
        let mut tracker = replay(&chunks);
        tracker.finalize();
        tracker.reset();

        prop_assert!(tracker.finalize().is_empty());
        prop_assert_eq!(tracker.creation_end_millis(), 0);
        prop_assert_eq!(tracker.last_observed_millis(), 0);
        prop_assert_eq!(tracker.creation_attribution(), None);
    }
}
