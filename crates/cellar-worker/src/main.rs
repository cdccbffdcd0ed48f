//! Cellar worker process.
//!
//! Runs one worker against stdin/stdout using length-prefixed JSON frames.
//! Configuration comes from `CELLAR_*` environment variables. Logs go to
//! stderr; stdout carries only protocol frames.

use cellar_core::ipc::framing::{pump_frames_in, pump_frames_out};
use cellar_core::ipc::{HostEnd, WorkerEnd, channel};
use cellar_core::{RuntimeConfig, Worker};

fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(serve());
    // A blocked stdin read must not keep the process alive once serving is over.
    runtime.shutdown_background();
    result
}

async fn serve() -> anyhow::Result<()> {
    let config = RuntimeConfig::from_env()?;
    tracing::debug!(?config, "worker starting");

    // The host end of this channel is bridged to stdio instead of a gateway.
    let (host, worker_end): (HostEnd, WorkerEnd) = channel(config.channel_capacity);
    let HostEnd { sender, receiver } = host;

    let reader = tokio::spawn(pump_frames_in(
        tokio::io::stdin(),
        sender,
        config.max_frame_len,
    ));
    let writer = tokio::spawn(pump_frames_out(
        receiver,
        tokio::io::stdout(),
        config.max_frame_len,
    ));

    let stats = Worker::new(&config).run(worker_end).await;

    // Every result has been handed to the writer; let it flush them.
    writer.await?;
    reader.abort();

    tracing::debug!(?stats, "worker finished");
    Ok(())
}
