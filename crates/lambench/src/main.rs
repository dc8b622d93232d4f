//! lambench - concurrent invocation benchmark for AWS Lambda functions

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lambench_core::{
    BenchConfig, BenchError, BenchmarkRunner, InvocationMode, LambdaInvoker, LoadSpec, Result,
    RunReport, DEFAULT_DRAIN_TIMEOUT_MS, DEFAULT_TIMEOUT_MS,
};

#[derive(Parser)]
#[command(name = "lambench")]
#[command(about = "Concurrent invocation benchmark for AWS Lambda functions")]
#[command(version)]
struct Cli {
    /// Lambda function name or ARN
    #[arg(short = 'f', long)]
    function: String,

    /// AWS region to invoke in
    #[arg(short = 'r', long)]
    region: String,

    /// Inline JSON payload
    #[arg(short = 'p', long, default_value = "{}", conflicts_with = "payload_file")]
    payload: String,

    /// Read the JSON payload from a file instead
    #[arg(long)]
    payload_file: Option<PathBuf>,

    /// Invocation mode: sync (RequestResponse) or async (Event)
    #[arg(short = 'm', long, default_value = "sync")]
    mode: String,

    /// Number of concurrent workers
    #[arg(short = 'c', long, default_value = "8")]
    concurrency: usize,

    /// Total number of invocations
    #[arg(short = 'n', long, conflicts_with = "duration")]
    requests: Option<u64>,

    /// Run for this many seconds instead of a fixed count
    #[arg(short = 'd', long)]
    duration: Option<u64>,

    /// Per-invocation timeout in milliseconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Bound on waiting for in-flight invocations at shutdown, in milliseconds
    #[arg(long, default_value_t = DEFAULT_DRAIN_TIMEOUT_MS)]
    drain_timeout_ms: u64,

    /// Pause between invocations per worker, as "min,max" milliseconds
    #[arg(long, value_parser = parse_think_time, default_value = "0,0")]
    think_time: (u64, u64),

    /// Output JSON report to file
    #[arg(short = 'j', long)]
    json_report: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run(cli).await {
        error!("{}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli)?;
    config.validate()?;

    let invoker = LambdaInvoker::connect(&config).await;
    let mut runner = BenchmarkRunner::new(config, invoker)?;

    // First Ctrl-C drains gracefully, a second one abandons in-flight calls
    let stop = runner.stop_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("stop requested, draining");
            stop.request_stop();
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("aborting in-flight invocations");
                stop.abort();
            }
        }
    });

    let report = runner.run().await?;

    if let Some(ref path) = cli.json_report {
        save_report(path, &report)?;
        println!("Report saved to {}", path.display());
    }

    print_summary(&report);

    Ok(())
}

fn build_config(cli: &Cli) -> Result<BenchConfig> {
    let mode = InvocationMode::from_name(&cli.mode).ok_or_else(|| {
        BenchError::Config(format!(
            "unknown invocation mode: '{}'. Use: sync or async",
            cli.mode
        ))
    })?;

    let load = match (cli.requests, cli.duration) {
        (Some(n), None) => LoadSpec::Count(n),
        (None, Some(secs)) => LoadSpec::Duration(Duration::from_secs(secs)),
        (None, None) => LoadSpec::Count(100),
        (Some(_), Some(_)) => {
            return Err(BenchError::Config(
                "--requests and --duration are mutually exclusive".to_string(),
            ));
        }
    };

    Ok(BenchConfig {
        function_name: cli.function.clone(),
        payload: load_payload(cli)?,
        mode,
        region: cli.region.clone(),
        concurrency: cli.concurrency,
        load,
        timeout_ms: cli.timeout_ms,
        drain_timeout_ms: cli.drain_timeout_ms,
        think_time_ms: cli.think_time,
    })
}

fn load_payload(cli: &Cli) -> Result<Vec<u8>> {
    match cli.payload_file {
        Some(ref path) => Ok(std::fs::read(path)?),
        None => Ok(cli.payload.clone().into_bytes()),
    }
}

/// Parse "min,max" into a think-time range
fn parse_think_time(raw: &str) -> std::result::Result<(u64, u64), String> {
    let (min, max) = raw
        .split_once(',')
        .ok_or_else(|| "expected 'min,max' in milliseconds".to_string())?;
    let min = min.trim().parse::<u64>().map_err(|e| e.to_string())?;
    let max = max.trim().parse::<u64>().map_err(|e| e.to_string())?;
    Ok((min, max))
}

#[derive(Serialize)]
struct ReportEnvelope<'a> {
    generated_at: String,
    #[serde(flatten)]
    report: &'a RunReport,
}

fn save_report(path: &Path, report: &RunReport) -> Result<()> {
    let envelope = ReportEnvelope {
        generated_at: chrono::Utc::now().to_rfc3339(),
        report,
    };
    let body = serde_json::to_string_pretty(&envelope)?;
    std::fs::write(path, body)?;
    Ok(())
}

fn print_summary(report: &RunReport) {
    let stats = &report.stats;

    println!("\n=== LAMBENCH RESULTS ===\n");
    println!("Total Invocations: {}", stats.total_invocations);
    println!(
        "Successful:        {} ({:.1}%)",
        stats.successful_invocations,
        stats.success_rate()
    );
    println!("Failed:            {}", stats.failed_invocations);
    if stats.failed_invocations > 0 {
        println!("  Connection:      {}", stats.connection_failures);
        println!("  Timeout:         {}", stats.timeouts);
        println!("  Remote error:    {}", stats.remote_errors);
        println!("  Invalid reply:   {}", stats.invalid_responses);
    }
    println!();
    println!("Latency (P50):     {:.2}ms", stats.latencies.p50_ms());
    println!("Latency (P90):     {:.2}ms", stats.latencies.p90_ms());
    println!("Latency (P99):     {:.2}ms", stats.latencies.p99_ms());
    println!("Latency (Max):     {:.2}ms", stats.latencies.max_ms());
    println!();
    println!("Throughput:        {:.1} invocations/sec", stats.throughput);
    println!("Elapsed Time:      {:.2}s", stats.elapsed.as_secs_f64());

    if report.incomplete_drain {
        println!();
        println!("NOTE: drain deadline exceeded; abandoned calls counted as timeouts");
    }
}
