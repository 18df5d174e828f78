use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use mcurl_common::config::{Defaults, Options};
use mcurl_core::{RepeatController, RunReport, RunStats, StopReason};
use mcurl_transport::HttpTransport;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "mcurl", version, about = "Sends batches of (almost) simultaneous HTTP requests and reports their latency")]
struct Cli {
    /// The HTTP method to use (GET, POST, etc)
    #[arg(short = 'X', long)]
    method: Option<String>,
    /// The URL to work with
    #[arg(short = 'U', long)]
    url: Option<String>,
    /// The number of requests to send in 'parallel' [default: 10]
    #[arg(short = 'n', long)]
    requests: Option<usize>,
    /// The number of batches to run; 0 means endless repeats [default: 1]
    #[arg(short = 'r', long)]
    repeat: Option<u32>,
    /// The data to send within the request body
    #[arg(short = 'd', long, default_value = "")]
    data: String,
    /// The file to read the request body from; overrides --data
    #[arg(short = 'i', long)]
    file: Option<PathBuf>,
    /// A request header, as 'Name: Value'; can be repeated
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,
    /// Verbose + debug mode
    #[arg(short, long)]
    verbose: bool,
    /// The total duration in milliseconds; 0 means no limitation [default: 0]
    #[arg(short = 't', long = "duration", value_name = "MS")]
    duration_ms: Option<u64>,
    /// Pause between two batches, in milliseconds [default: 1000]
    #[arg(long, value_name = "MS")]
    cooldown_ms: Option<u64>,
    /// Per-request timeout in milliseconds; none by default
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,
    /// Print the final report as JSON on stdout
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn into_options(self) -> Options {
        Options {
            method: self.method.unwrap_or_default(),
            url: self.url.unwrap_or_default(),
            requests: self.requests,
            repeat: self.repeat,
            data: self.data,
            file: self.file,
            headers: self.headers,
            verbose: self.verbose,
            duration_ms: self.duration_ms,
            cooldown_ms: self.cooldown_ms,
            timeout_ms: self.timeout_ms,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(cli).await {
        tracing::error!("ERROR: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let json = cli.json;
    let defaults = Defaults::load()?;
    let config = Arc::new(cli.into_options().resolve(&defaults)?);
    let transport = Arc::new(HttpTransport::new(&config).context("invalid request settings")?);

    let controller = RepeatController::new(transport, Arc::clone(&config));
    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_err() {
            // no signal handling available, run until done
            std::future::pending::<()>().await;
        }
        tracing::info!("shutdown signal received");
    };
    let stats = controller.run_until(shutdown).await?;

    summarize(&stats);
    if json {
        let report = serde_json::to_string_pretty(&RunReport::from(&stats)).context("serializing report")?;
        println!("{report}");
    }
    Ok(())
}

fn summarize(stats: &RunStats) {
    match stats.stop {
        StopReason::Completed => {}
        StopReason::DeadlineReached => tracing::info!("duration limit reached, no new batch started"),
        StopReason::Interrupted => tracing::info!("interrupted, unfinished batch discarded"),
    }
    tracing::info!(
        batches = stats.batch_count(),
        requests = stats.requests,
        failures = stats.failures,
        "--- Done in {:?}. Average / Max request time: {:?} / {:?}",
        stats.elapsed,
        stats.average,
        stats.max,
    );
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info,mcurl_core=debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.into()),
    );

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
