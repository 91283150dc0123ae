use {
    crate::{
        clock::MillisClock,
        config::CollectorConfig,
        tracker::{TimingInfosTracker, TrackerError},
        types::{ChunkRecord, CompletedWorkItem},
    },
    futures::{Stream, StreamExt},
    std::{collections::HashMap, fmt::Display},
    tracing::{debug, info, warn},
};

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Tracker misuse for work item {work_id}: {source}")]
    Tracker {
        work_id: u64,
        #[source]
        source: TrackerError,
    },
}

pub type Result<T> = std::result::Result<T, CollectorError>;

#[derive(Debug, Default)]
pub struct Collected {
    pub completed: Vec<CompletedWorkItem>,
    // Work items whose last chunk never arrived
    pub abandoned: Vec<u64>,
}

struct InFlight<C> {
    tracker: TimingInfosTracker<C>,
    chunks: usize,
}

/// Routes chunks to the tracker owned for their work item and finalizes it
/// once the last chunk has been seen.
pub struct Collector<C> {
    config: CollectorConfig,
    clock: C,
    in_flight: HashMap<u64, InFlight<C>>,
    pool: Vec<TimingInfosTracker<C>>,
}

impl<C: MillisClock + Clone> Collector<C> {
    pub fn new(config: CollectorConfig, clock: C) -> Self {
        let pool = Vec::with_capacity(config.max_pooled_trackers);
        Self {
            config,
            clock,
            in_flight: HashMap::new(),
            pool,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn pooled(&self) -> usize {
        self.pool.len()
    }

    /// Feed one chunk, returning the finished work item if this was its last chunk.
    pub fn on_chunk(&mut self, chunk: &ChunkRecord) -> Result<Option<CompletedWorkItem>> {
        let pool = &mut self.pool;
        let clock = &self.clock;
        let entry = self
            .in_flight
            .entry(chunk.work_id)
            .or_insert_with(|| InFlight {
                tracker: pool
                    .pop()
                    .unwrap_or_else(|| TimingInfosTracker::new(clock.clone())),
                chunks: 0,
            });

        entry.chunks += 1;
        entry
            .tracker
            .record(&chunk.timing_infos)
            .map_err(|source| CollectorError::Tracker {
                work_id: chunk.work_id,
                source,
            })?;

        if !chunk.last_chunk {
            return Ok(None);
        }

        let Some(InFlight {
            mut tracker,
            chunks,
        }) = self.in_flight.remove(&chunk.work_id)
        else {
            return Ok(None);
        };

        let attributions = tracker.finalize();
        debug!(
            work_id = chunk.work_id,
            chunks,
            attributions = attributions.len(),
            "work item complete"
        );
        self.recycle(tracker);

        Ok(Some(CompletedWorkItem {
            work_id: chunk.work_id,
            chunk_count: chunks,
            attributions,
        }))
    }

    fn recycle(&mut self, mut tracker: TimingInfosTracker<C>) {
        if self.pool.len() < self.config.max_pooled_trackers {
            tracker.reset();
            self.pool.push(tracker);
        }
    }

    // A zero interval turns progress lines off
    const fn progress_due(&self, completed: usize) -> bool {
        self.config.progress_interval > 0 && completed % self.config.progress_interval == 0
    }

    /// Drop every work item still waiting for chunks, returning their ids.
    pub fn abandon_in_flight(&mut self) -> Vec<u64> {
        let mut abandoned = Vec::with_capacity(self.in_flight.len());
        let drained: Vec<(u64, InFlight<C>)> = self.in_flight.drain().collect();
        for (work_id, InFlight { tracker, chunks }) in drained {
            warn!(work_id, chunks, "abandoning work item without last chunk");
            abandoned.push(work_id);
            self.recycle(tracker);
        }
        abandoned.sort_unstable();
        abandoned
    }

    /// Consume chunks until the stream ends or stays idle past the configured
    /// timeout. Work items left unfinished at that point are abandoned.
    pub async fn collect<S, E>(mut self, mut chunks: S) -> Result<Collected>
    where
        S: Stream<Item = std::result::Result<ChunkRecord, E>> + Unpin,
        E: Display,
    {
        let idle_timeout = self.config.idle_timeout.filter(|t| !t.is_zero());
        let mut collected = Collected::default();

        loop {
            let next = match idle_timeout {
                Some(timeout) => match tokio::time::timeout(timeout, chunks.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!("no chunk received for {:?}, stopping collection", timeout);
                        break;
                    }
                },
                None => chunks.next().await,
            };

            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(|e| CollectorError::StreamError(e.to_string()))?;

            if let Some(done) = self.on_chunk(&chunk)? {
                collected.completed.push(done);

                let completed = collected.completed.len();
                if self.progress_due(completed) {
                    info!(
                        "{} work items completed, {} in flight",
                        completed,
                        self.in_flight.len()
                    );
                }
            }
        }

        collected.abandoned = self.abandon_in_flight();

        info!(
            "{} work items completed, {} abandoned",
            collected.completed.len(),
            collected.abandoned.len()
        );

        Ok(collected)
    }
}
