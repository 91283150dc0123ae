use serde::{Deserialize, Serialize};

/// Checkpoint events a backend may attach to a GetWork response chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingEventKind {
    Unknown,
    CreationStart,
    CreationEnd,
    ReceivedByDispatcher,
    ForwardedByDispatcher,
}

impl From<i32> for TimingEventKind {
    fn from(value: i32) -> Self {
        match value {
            1 => Self::CreationStart,
            2 => Self::CreationEnd,
            3 => Self::ReceivedByDispatcher,
            4 => Self::ForwardedByDispatcher,
            _ => Self::Unknown,
        }
    }
}

/// One decoded timing info as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingInfo {
    pub event: TimingEventKind,
    pub timestamp_usec: i64,
}

impl TimingInfo {
    pub const fn new(event: TimingEventKind, timestamp_usec: i64) -> Self {
        Self {
            event,
            timestamp_usec,
        }
    }

    /// Build from raw wire values, unknown event numbers map to `Unknown`.
    pub fn from_wire(event: i32, timestamp_usec: i64) -> Self {
        Self::new(TimingEventKind::from(event), timestamp_usec)
    }

    // Truncates toward zero, the same as the backend does.
    pub const fn timestamp_millis(&self) -> i64 {
        self.timestamp_usec / 1000
    }
}

/// Pipeline segments that receive a latency attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    CreationInUpstream,
    InTransitToDispatcher,
    InTransitToUserWorker,
}

impl Stage {
    pub const COUNT: usize = 3;
    pub const ALL: [Self; Self::COUNT] = [
        Self::CreationInUpstream,
        Self::InTransitToDispatcher,
        Self::InTransitToUserWorker,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    /// Attribution state number used by the protocol.
    pub const fn wire_value(self) -> i32 {
        match self {
            Self::CreationInUpstream => 5,
            Self::InTransitToDispatcher => 6,
            Self::InTransitToUserWorker => 7,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::CreationInUpstream => "creation_in_upstream",
            Self::InTransitToDispatcher => "in_transit_to_dispatcher",
            Self::InTransitToUserWorker => "in_transit_to_user_worker",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyAttribution {
    pub stage: Stage,
    pub duration_millis: i64,
}

impl LatencyAttribution {
    pub const fn new(stage: Stage, duration_millis: i64) -> Self {
        Self {
            stage,
            duration_millis,
        }
    }
}

/// One response fragment for a unit of work, as decoded off the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub work_id: u64,
    #[serde(default)]
    pub timing_infos: Vec<TimingInfo>,
    #[serde(default)]
    pub last_chunk: bool,
    // Only set by recorded captures, live streams read the wall clock
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletedWorkItem {
    pub work_id: u64,
    pub chunk_count: usize,
    pub attributions: Vec<LatencyAttribution>,
}

impl CompletedWorkItem {
    pub fn attribution(&self, stage: Stage) -> Option<i64> {
        self.attributions
            .iter()
            .find(|a| a.stage == stage)
            .map(|a| a.duration_millis)
    }
}
