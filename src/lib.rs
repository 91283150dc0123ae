mod clock;
mod collector;
mod config;
mod report;
mod tracker;
mod types;

pub use {
    clock::{ManualClock, MillisClock, SystemClock},
    collector::{Collected, Collector, CollectorError},
    config::{CollectorConfig, Config, ConfigError},
    report::{AttributionReport, Percentiles, Report, StageSummary},
    tracker::{AggregatedStageDuration, TimingInfosTracker, TrackerError},
    types::{
        ChunkRecord, CompletedWorkItem, LatencyAttribution, Stage, TimingEventKind, TimingInfo,
    },
};
