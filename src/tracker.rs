use {
    crate::{
        clock::{MillisClock, SystemClock},
        types::{LatencyAttribution, Stage, TimingEventKind, TimingInfo},
    },
    tracing::debug,
};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TrackerError {
    #[error("timing infos recorded after the tracker was finalized; reset it first")]
    RecordAfterFinalize,
}

pub type Result<T> = std::result::Result<T, TrackerError>;

/// Accumulated evidence for one stage across all chunks of a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatedStageDuration {
    pub sum_millis: i64,
    pub max_millis: i64,
}

impl AggregatedStageDuration {
    const fn first(duration_millis: i64) -> Self {
        Self {
            sum_millis: duration_millis,
            max_millis: duration_millis,
        }
    }

    const fn add(&mut self, duration_millis: i64) {
        self.sum_millis = self.sum_millis.saturating_add(duration_millis);
        if duration_millis > self.max_millis {
            self.max_millis = duration_millis;
        }
    }
}

// First occurrence of each event kind within a single chunk.
#[derive(Debug, Default)]
struct ChunkTimings {
    creation_start: Option<i64>,
    creation_end: Option<i64>,
    received_by_dispatcher: Option<i64>,
    forwarded_by_dispatcher: Option<i64>,
}

impl ChunkTimings {
    fn collect(infos: &[TimingInfo]) -> Self {
        let mut timings = Self::default();
        for info in infos {
            let slot = match info.event {
                TimingEventKind::CreationStart => &mut timings.creation_start,
                TimingEventKind::CreationEnd => &mut timings.creation_end,
                TimingEventKind::ReceivedByDispatcher => &mut timings.received_by_dispatcher,
                TimingEventKind::ForwardedByDispatcher => &mut timings.forwarded_by_dispatcher,
                TimingEventKind::Unknown => continue,
            };
            slot.get_or_insert(info.timestamp_millis());
        }
        timings
    }
}

/// Reconstructs per-stage latency for one work item from timing infos spread
/// over an arbitrary number of response chunks.
///
/// The sum of each transit stage is collected across chunks, then the total
/// elapsed window (creation end in the backend to the last chunk seen by this
/// worker) is split proportionally to those sums. Each stage is capped by the
/// largest duration it was observed to take in a single chunk.
///
/// Not synchronized: a tracker has exactly one owner at a time and is moved,
/// not shared, between whoever feeds it.
#[derive(Debug)]
pub struct TimingInfosTracker<C = SystemClock> {
    clock: C,
    aggregated: [Option<AggregatedStageDuration>; Stage::COUNT],
    creation_end_millis: i64,
    last_observed_millis: i64,
    creation_latency: Option<i64>,
    finalized: bool,
}

impl Default for TimingInfosTracker<SystemClock> {
    fn default() -> Self {
        Self::new(SystemClock)
    }
}

impl<C: MillisClock> TimingInfosTracker<C> {
    pub const fn new(clock: C) -> Self {
        Self {
            clock,
            aggregated: [None; Stage::COUNT],
            creation_end_millis: 0,
            last_observed_millis: 0,
            creation_latency: None,
            finalized: false,
        }
    }

    /// Feed the timing infos carried by one chunk. Samples the clock once.
    pub fn record(&mut self, infos: &[TimingInfo]) -> Result<()> {
        if self.finalized {
            return Err(TrackerError::RecordAfterFinalize);
        }

        let timings = ChunkTimings::collect(infos);

        // A work item is created once, the first complete pair sticks.
        if let (Some(start), Some(end)) = (timings.creation_start, timings.creation_end) {
            self.creation_latency.get_or_insert(end.saturating_sub(start));
        }

        if let Some(end) = timings.creation_end {
            if end > self.creation_end_millis {
                self.creation_end_millis = end;
            }
        }

        if let (Some(end), Some(received)) = (timings.creation_end, timings.received_by_dispatcher)
        {
            self.track(Stage::InTransitToDispatcher, received.saturating_sub(end));
        }

        let now = self.clock.now_millis();
        match (timings.forwarded_by_dispatcher, timings.creation_end) {
            (Some(forwarded), _) => {
                if now > forwarded {
                    self.track(Stage::InTransitToUserWorker, now.saturating_sub(forwarded));
                }
            }
            // Chunk never went through the dispatcher telemetry.
            (None, Some(end)) if now > end => {
                self.track(Stage::InTransitToUserWorker, now.saturating_sub(end));
            }
            _ => {}
        }

        self.last_observed_millis = now;
        Ok(())
    }

    fn track(&mut self, stage: Stage, duration_millis: i64) {
        let slot = &mut self.aggregated[stage.index()];
        match slot.as_mut() {
            Some(aggregated) => aggregated.add(duration_millis),
            None => *slot = Some(AggregatedStageDuration::first(duration_millis)),
        }
    }

    /// Produce the attributions for this work item: the creation stage first
    /// if it was seen, then each observed transit stage in `Stage` order.
    ///
    /// Further `record` calls are rejected until `reset`.
    pub fn finalize(&mut self) -> Vec<LatencyAttribution> {
        self.finalized = true;

        let observed: Vec<(Stage, AggregatedStageDuration)> = Stage::ALL
            .iter()
            .filter_map(|&stage| self.aggregated[stage.index()].map(|agg| (stage, agg)))
            .collect();

        if self.creation_latency.is_none() && observed.is_empty() {
            return Vec::new();
        }

        let mut attributions = Vec::with_capacity(observed.len() + 1);
        if let Some(creation) = self.creation_latency {
            attributions.push(LatencyAttribution::new(Stage::CreationInUpstream, creation));
        }

        // Wire timestamps span the full i64 range, sums clamp instead of wrapping
        let total_sum = observed
            .iter()
            .fold(0i64, |acc, (_, agg)| acc.saturating_add(agg.sum_millis));
        let total_elapsed = if self.creation_end_millis > self.last_observed_millis {
            debug!(
                creation_end_ms = self.creation_end_millis,
                last_observed_ms = self.last_observed_millis,
                "work item creation end is after the last chunk was received, \
                 one or more timing infos are missing; using raw times without scaling"
            );
            total_sum
        } else {
            self.last_observed_millis.saturating_sub(self.creation_end_millis)
        };

        for (stage, agg) in observed {
            let duration = if total_sum == 0 {
                // Nothing to split, skewed negative hops still respect their cap
                agg.max_millis.min(0)
            } else {
                let scaled =
                    (agg.sum_millis as f64 / total_sum as f64 * total_elapsed as f64) as i64;
                agg.max_millis.min(scaled)
            };
            attributions.push(LatencyAttribution::new(stage, duration));
        }

        attributions
    }

    /// Clear all state so the tracker can serve an unrelated work item.
    pub const fn reset(&mut self) {
        self.aggregated = [None; Stage::COUNT];
        self.creation_end_millis = 0;
        self.last_observed_millis = 0;
        self.creation_latency = None;
        self.finalized = false;
    }

    pub const fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn creation_attribution(&self) -> Option<LatencyAttribution> {
        self.creation_latency
            .map(|d| LatencyAttribution::new(Stage::CreationInUpstream, d))
    }

    pub const fn aggregated(&self, stage: Stage) -> Option<AggregatedStageDuration> {
        self.aggregated[stage.index()]
    }

    pub const fn creation_end_millis(&self) -> i64 {
        self.creation_end_millis
    }

    pub const fn last_observed_millis(&self) -> i64 {
        self.last_observed_millis
    }
}
