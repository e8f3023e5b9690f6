//! Runner child process management and SSE wire plumbing.
//!
//! Runners are the native engines' serving binaries. Janus keeps a 1-hop
//! architecture: adapter → localhost HTTP → runner. Killing the child is the
//! deterministic release of all native resources for a handle.

use std::path::Path;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use janus_core::{Error, Result};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

/// A spawned runner process bound to an ephemeral localhost port.
pub(crate) struct RunnerProcess {
    child: Mutex<Option<Child>>,
    base_url: String,
}

impl RunnerProcess {
    /// Spawns `command` with `args` plus standard `--host`/`--port` flags.
    pub(crate) async fn spawn(command: &Path, args: &[String]) -> Result<Self> {
        let port = ephemeral_port()?;

        let child = Command::new(command)
            .args(args)
            .arg("--host")
            .arg("127.0.0.1")
            .arg("--port")
            .arg(port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::internal(format!(
                    "failed to spawn runner {}: {e}",
                    command.display()
                ))
            })?;

        tracing::info!(
            runner = %command.display(),
            port,
            "Spawned native runner"
        );

        Ok(Self {
            child: Mutex::new(Some(child)),
            base_url: format!("http://127.0.0.1:{port}"),
        })
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Polls `ready_path` until the runner responds 200 or the timeout
    /// elapses. Bails out early if the child exits.
    pub(crate) async fn wait_ready(
        &self,
        client: &reqwest::Client,
        ready_path: &str,
        timeout: Duration,
    ) -> Result<()> {
        let url = format!("{}{}", self.base_url, ready_path);
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if let Some(child) = self.child.lock().await.as_mut() {
                if let Some(status) = child.try_wait().ok().flatten() {
                    return Err(Error::internal(format!(
                        "runner exited during startup with {status}"
                    )));
                }
            }

            match client.get(&url).send().await {
                Ok(response) if response.status().is_success() => return Ok(()),
                _ => {}
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(Error::internal(format!(
                    "runner did not become ready within {timeout:?}"
                )));
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Kills the runner, releasing its native context.
    pub(crate) async fn shutdown(&self) {
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
            tracing::debug!(runner = %self.base_url, "Runner stopped");
        }
    }
}

fn ephemeral_port() -> Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Incremental reader of `data: ...` lines from a runner SSE response.
///
/// Dropping or closing the reader closes the underlying connection, which is
/// how cancellation reaches the runner within one token step.
pub(crate) struct SseLineReader {
    backend: &'static str,
    stream: Option<ByteStream>,
    buf: Vec<u8>,
}

impl SseLineReader {
    pub(crate) fn new(backend: &'static str, response: reqwest::Response) -> Self {
        Self {
            backend,
            stream: Some(Box::pin(response.bytes_stream())),
            buf: Vec::new(),
        }
    }

    /// Returns the next `data:` payload, or `None` when the stream ends.
    pub(crate) async fn next_data(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.buf.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                let line = line.trim();
                if let Some(payload) = line.strip_prefix("data:") {
                    let payload = payload.trim();
                    if !payload.is_empty() {
                        return Ok(Some(payload.to_string()));
                    }
                }
                continue;
            }

            let Some(stream) = self.stream.as_mut() else {
                return Ok(None);
            };
            match stream.next().await {
                Some(Ok(chunk)) => self.buf.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    self.stream = None;
                    return Err(Error::adapter(self.backend, format!("stream error: {e}")));
                }
                None => {
                    self.stream = None;
                    // Flush a final unterminated line, if any.
                    if !self.buf.is_empty() {
                        self.buf.push(b'\n');
                        continue;
                    }
                    return Ok(None);
                }
            }
        }
    }

    /// Closes the connection immediately.
    pub(crate) fn close(&mut self) {
        self.stream = None;
        self.buf.clear();
    }
}
