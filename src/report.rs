use {
    crate::types::{CompletedWorkItem, Stage},
    serde::Serialize,
    std::time::{SystemTime, UNIX_EPOCH},
};

#[derive(Debug, Serialize)]
pub struct AttributionReport {
    pub version: String,
    pub generated_at_ms: u64,
    pub completed_work_items: u64,
    pub abandoned_work_items: u64,
    pub total_chunks: u64,
    pub stages: Vec<StageSummary>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StageSummary {
    pub stage: Stage,
    pub work_items: u64,
    pub latency_ms: Percentiles,
}

#[derive(Debug, Serialize, PartialEq, Eq, Default)]
pub struct Percentiles {
    pub p50: i64,
    pub p90: i64,
    pub p99: i64,
    pub max: i64,
}

pub struct Report;

impl Report {
    pub fn build(items: &[CompletedWorkItem], abandoned: usize) -> AttributionReport {
        let generated_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let stages = Stage::ALL
            .iter()
            .filter_map(|&stage| {
                let values: Vec<i64> = items
                    .iter()
                    .filter_map(|item| item.attribution(stage))
                    .collect();
                if values.is_empty() {
                    return None;
                }
                Some(StageSummary {
                    stage,
                    work_items: values.len() as u64,
                    latency_ms: Self::percentiles(values),
                })
            })
            .collect();

        AttributionReport {
            version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at_ms,
            completed_work_items: items.len() as u64,
            abandoned_work_items: abandoned as u64,
            total_chunks: items.iter().map(|item| item.chunk_count as u64).sum(),
            stages,
        }
    }

    fn percentiles(mut values: Vec<i64>) -> Percentiles {
        if values.is_empty() {
            return Percentiles::default();
        }

        values.sort_unstable();
        let len = values.len();
        let at = |p: usize| values[len.saturating_sub(1).min(len * p / 100)];

        Percentiles {
            p50: at(50),
            p90: at(90),
            p99: at(99),
            max: values[len - 1],
        }
    }
}
