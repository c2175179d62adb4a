use std::path::PathBuf;

use clap::Parser;
use spool_core::{SentinelMatcher, StreamBridge};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod generate;

const DEFAULT_LOG_ENV: &str = "spool_cli=info,spool_core=info";

/// Run a scripted generation through the stream bridge.
#[derive(Parser)]
struct Cli {
    /// Token ids the fake model will produce, in order.
    #[arg(long, value_delimiter = ',', required = true)]
    script: Vec<u32>,
    /// Token ids treated as the prompt; excluded from sentinel matching.
    #[arg(long, value_delimiter = ',')]
    prompt: Vec<u32>,
    /// Token subsequence that halts generation early.
    #[arg(long, value_delimiter = ',')]
    sentinel: Vec<u32>,
    /// Load generation parameters from a TOML file.
    #[arg(long)]
    params: Option<PathBuf>,
}

fn setup_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_ENV.into()),
        )
        .with(tracing_subscriber::fmt::layer().pretty())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    setup_tracing();
    let cli = Cli::parse();

    let params = match &cli.params {
        Some(path) => config::load_params(path)?,
        None => config::GenParams::default(),
    };

    let matcher = SentinelMatcher::new(cli.sentinel, cli.prompt.len());
    let prompt = cli.prompt;
    let script = cli.script;

    let mut bridge = StreamBridge::with_completion_hook(
        move |emitter| generate::run_scripted(prompt, script, matcher, params, emitter),
        |summary: &generate::RunSummary| tracing::debug!(?summary, "producer returned"),
    );

    while let Some(token) = bridge.next().await {
        println!("{token}");
    }

    let summary = bridge.join().await?;
    tracing::info!(
        generated = summary.generated,
        stopped_early = summary.stopped_early,
        "run complete"
    );

    Ok(())
}
