//! Connects the CLI to a worker, in-process or isolated.

use anyhow::Context;
use cellar_core::{HostGateway, RuntimeConfig, Worker, WorkerProcess, WorkerStats};
use tokio::task::JoinHandle;

/// A running worker and the gateway used to reach it.
pub enum Backend {
    InProcess {
        gateway: HostGateway,
        task: JoinHandle<WorkerStats>,
    },
    Isolated(WorkerProcess),
}

impl Backend {
    pub fn start(config: &RuntimeConfig, isolated: bool) -> anyhow::Result<Self> {
        if isolated {
            let process = WorkerProcess::spawn(config)?;
            tracing::debug!(pid = ?process.pid(), "worker process started");
            Ok(Backend::Isolated(process))
        } else {
            let (gateway, task) = Worker::new(config).spawn(config.channel_capacity);
            Ok(Backend::InProcess { gateway, task })
        }
    }

    pub fn gateway(&self) -> &HostGateway {
        match self {
            Backend::InProcess { gateway, .. } => gateway,
            Backend::Isolated(process) => process.gateway(),
        }
    }

    /// Close the channel and wait for the worker to exit.
    pub async fn finish(self) -> anyhow::Result<()> {
        match self {
            Backend::InProcess { gateway, task } => {
                drop(gateway);
                let stats = task.await.context("worker task failed")?;
                tracing::debug!(?stats, "worker finished");
            }
            Backend::Isolated(process) => {
                let status = process.shutdown().await?;
                tracing::debug!(%status, "worker process exited");
            }
        }
        Ok(())
    }
}

/// Build the runtime configuration from the environment plus CLI flags.
pub fn runtime_config(packages: Vec<String>) -> anyhow::Result<RuntimeConfig> {
    let config = RuntimeConfig::from_env()?;
    Ok(if packages.is_empty() {
        config
    } else {
        config.with_packages(packages)
    })
}
