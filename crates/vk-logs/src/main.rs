use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use logs_protocol::ExecutionProcess;
use logs_store::LogPipelineConfig;
use logs_stream::{BackendEndpoints, SseTransport, StreamChange};
use logs_view::LogPipeline;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, prelude::*};

mod render;

use render::{RowPrinter, parse_process_arg};

#[derive(Parser, Debug)]
#[command(name = "vk-logs")]
#[command(about = "Tail the merged logs of running execution processes", long_about = None)]
struct Cli {
    /// Backend base URL.
    #[arg(long, env = "VK_BACKEND_URL", default_value = "http://127.0.0.1:3000")]
    base_url: String,

    /// Process to follow, as `<uuid>:<run_reason>`. Repeatable.
    #[arg(long = "process", value_parser = parse_process_arg, required = true)]
    processes: Vec<ExecutionProcess>,

    /// Print every entry on its own line instead of grouping reads and searches.
    #[arg(long)]
    no_aggregate: bool,

    /// Emit rows as JSON lines.
    #[arg(long)]
    json: bool,
}

fn init_tracing() -> Result<()> {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let filter_string = format!(
        "warn,vk_logs={level},logs_view={level},logs_stream={level},logs_store={level},logs_protocol={level}",
        level = log_level
    );
    let env_filter = EnvFilter::try_new(filter_string).context("Failed to create tracing filter")?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(env_filter),
        )
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing()?;

    let config = LogPipelineConfig::from_env();
    let endpoints = BackendEndpoints::new(&cli.base_url)
        .with_context(|| format!("Invalid backend url {}", cli.base_url))?;
    info!(
        base_url = %endpoints.base(),
        processes = cli.processes.len(),
        unified_max_entries = config.unified_max_entries,
        "Following execution process logs"
    );

    let mut pipeline = LogPipeline::new(Arc::new(SseTransport::new()), Arc::new(endpoints), config)
        .with_aggregation(!cli.no_aggregate);
    pipeline.sync(&cli.processes, true);

    let mut printer = RowPrinter::new(cli.json);
    loop {
        let update = tokio::select! {
            update = pipeline.next_update() => update,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, closing log streams");
                break;
            }
        };
        let Some(update) = update else {
            break;
        };

        match update.change {
            StreamChange::Disconnected | StreamChange::UpdateFailed => {
                if let Some(error) = pipeline
                    .manager()
                    .state(update.process_id)
                    .and_then(|state| state.error())
                {
                    warn!(process_id = %update.process_id, "{error}");
                }
            }
            StreamChange::Finished => {
                info!(process_id = %update.process_id, "Process log stream finished");
            }
            StreamChange::Connected | StreamChange::Entries | StreamChange::Session => {}
        }

        for line in printer.settle(&pipeline.unified_view().entries, false) {
            println!("{line}");
        }
    }

    let view = pipeline.unified_view();
    for line in printer.settle(&view.entries, true) {
        println!("{line}");
    }
    pipeline.sync(&[], false);

    if let Some(error) = view.error {
        bail!("log stream ended with an error: {error}");
    }
    Ok(())
}
