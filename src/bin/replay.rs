use {
    anyhow::{Context, Result},
    clap::Parser,
    futures::StreamExt,
    getwork_timing::{ChunkRecord, Collector, Config, ManualClock, Report},
    std::{convert::Infallible, fs},
    tracing::{error, info},
};

#[derive(Parser)]
#[clap(
    name = "getwork-replay",
    about = "Replay captured GetWork chunks and report per-stage latency attribution"
)]
struct Args {
    /// JSON-lines file with one chunk record per line
    #[clap(long)]
    input: String,

    /// Config file path
    #[clap(long, default_value = "config.toml")]
    config: String,

    /// Output JSON file
    #[clap(long, default_value = "attribution_report.json")]
    output: String,

    /// Log level
    #[clap(long, default_value = "info")]
    log_level: String,
}

fn read_chunks(path: &str) -> Result<Vec<ChunkRecord>> {
    let content = fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("{}:{}: bad chunk record", path, i + 1))
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup tracing
    let filter = args
        .log_level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .unwrap_or(tracing_subscriber::filter::LevelFilter::INFO);

    tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    // Load config or use defaults
    let config = match Config::load(&args.config) {
        Ok(cfg) => {
            info!("Loaded config from {}", args.config);
            cfg
        }
        Err(_) => {
            info!("Using default config");
            Config::default()
        }
    };

    let chunks = read_chunks(&args.input)?;
    info!("Replaying {} chunks from {}", chunks.len(), args.input);

    // Captured arrival times drive the clock, chunks without one keep the last reading
    let clock = ManualClock::default();
    let stream = futures::stream::iter(chunks).map({
        let clock = clock.clone();
        move |chunk| {
            if let Some(received_at) = chunk.received_at_ms {
                clock.set(received_at);
            }
            Ok::<_, Infallible>(chunk)
        }
    });

    let collector = Collector::new(config.collector, clock);
    let collected = match collector.collect(stream).await {
        Ok(collected) => collected,
        Err(e) => {
            error!("Replay failed: {}", e);
            std::process::exit(1);
        }
    };

    let report = Report::build(&collected.completed, collected.abandoned.len());

    let json = serde_json::to_string_pretty(&report)?;
    fs::write(&args.output, json)?;
    info!("Results saved to {}", args.output);

    // Print summary
    info!("\n=== ATTRIBUTION SUMMARY ===");
    info!("Completed work items: {}", report.completed_work_items);
    info!("Abandoned work items: {}", report.abandoned_work_items);
    info!("Total chunks: {}", report.total_chunks);
    for summary in &report.stages {
        info!(
            "{} ({} items): p50={}ms, p90={}ms, p99={}ms, max={}ms",
            summary.stage.name(),
            summary.work_items,
            summary.latency_ms.p50,
            summary.latency_ms.p90,
            summary.latency_ms.p99,
            summary.latency_ms.max
        );
    }

    Ok(())
}
