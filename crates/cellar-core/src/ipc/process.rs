//! Running a worker in a separate process.
//!
//! The child speaks the framed protocol on stdin/stdout and logs to stderr.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::RuntimeConfig;
use crate::error::{Error, Result};

use super::channel::HostEnd;
use super::framing::{pump_frames_in, pump_frames_out};
use super::gateway::HostGateway;

const ENV_WORKER_PATH: &str = "CELLAR_WORKER_PATH";

const WORKER_NAME: &str = if cfg!(windows) {
    "cellar-worker.exe"
} else {
    "cellar-worker"
};

/// A `cellar-worker` child process and the gateway connected to it.
///
/// The process is killed when this handle is dropped.
pub struct WorkerProcess {
    child: Child,
    gateway: HostGateway,
    pumps: [JoinHandle<()>; 2],
}

impl WorkerProcess {
    /// Spawn a worker process configured by `config`.
    ///
    /// The binary is looked up by `CELLAR_WORKER_PATH`, next to the current
    /// executable, on `PATH`, then in the workspace's `target` directory.
    pub fn spawn(config: &RuntimeConfig) -> Result<Self> {
        let worker_path = Self::find_worker_binary()?;
        tracing::debug!("spawning worker {}", worker_path.display());

        let mut child = Command::new(&worker_path)
            .envs(config.to_env())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::Ipc(format!(
                    "Failed to spawn worker process '{}': {}",
                    worker_path.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Ipc("Failed to get worker stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Ipc("Failed to get worker stdout".to_string()))?;

        let capacity = config.channel_capacity.max(1);
        let (request_tx, request_rx) = mpsc::channel(capacity);
        let (response_tx, response_rx) = mpsc::channel(capacity);
        let pumps = [
            tokio::spawn(pump_frames_out(request_rx, stdin, config.max_frame_len)),
            tokio::spawn(pump_frames_in(stdout, response_tx, config.max_frame_len)),
        ];
        let gateway = HostGateway::connect(HostEnd {
            sender: request_tx,
            receiver: response_rx,
        });

        Ok(Self {
            child,
            gateway,
            pumps,
        })
    }

    fn find_worker_binary() -> Result<PathBuf> {
        worker_candidates()
            .into_iter()
            .find(|path| path.is_file())
            .ok_or_else(|| {
                Error::Ipc(format!(
                    "Could not find {WORKER_NAME} binary. Set {ENV_WORKER_PATH} or ensure it's in PATH."
                ))
            })
    }

    /// Gateway for submitting requests to this worker.
    pub fn gateway(&self) -> &HostGateway {
        &self.gateway
    }

    /// OS process id, if the process is still running.
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Kill the worker immediately. Pending requests fail with `ChannelClosed`.
    pub async fn kill(&mut self) -> Result<()> {
        self.child.kill().await?;
        Ok(())
    }

    /// Close the worker's stdin and wait for it to finish its queue and exit.
    pub async fn shutdown(self) -> Result<ExitStatus> {
        let Self {
            mut child,
            gateway,
            pumps,
        } = self;
        // Dropping the gateway closes the request channel; the writer pump then
        // drops stdin and the worker sees end of input.
        drop(gateway);
        let [writer, reader] = pumps;
        let _ = writer.await;
        let status = child.wait().await?;
        reader.abort();
        Ok(status)
    }
}

/// Places a `cellar-worker` binary may live, most specific first: the
/// `CELLAR_WORKER_PATH` override, the current executable's directory and its
/// parent (test binaries sit in `deps/`), `PATH`, then the workspace's
/// `target/debug` and `target/release`.
fn worker_candidates() -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = std::env::var_os(ENV_WORKER_PATH)
        .map(PathBuf::from)
        .into_iter()
        .collect();
    if let Ok(exe) = std::env::current_exe() {
        candidates.extend(exe.ancestors().skip(1).take(2).map(|dir| dir.join(WORKER_NAME)));
    }
    candidates.extend(which::which(WORKER_NAME).ok());
    let target = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../target");
    candidates.extend(["debug", "release"].map(|profile| target.join(profile).join(WORKER_NAME)));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_search_beside_the_executable_before_the_target_dir() {
        let exe = std::env::current_exe().unwrap();
        let beside = exe.parent().unwrap().join(WORKER_NAME);
        let built = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../../target/debug")
            .join(WORKER_NAME);
        let candidates = worker_candidates();

        let beside_at = candidates.iter().position(|p| *p == beside).unwrap();
        let built_at = candidates.iter().position(|p| *p == built).unwrap();
        assert!(beside_at < built_at, "{candidates:?}");
    }
}
