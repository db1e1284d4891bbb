//! Protocol test client
//!
//! Drives a protocol server running as a child process: spawns it with
//! piped stdin/stdout (diagnostics stay on stderr), correlates responses
//! to requests by id, and enforces per-call and stop timeouts. Built for
//! validating the server's framing and correlation behavior.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, warn};

use crate::{Error, Result};

/// Per-request timeout
pub const CALL_TIMEOUT: Duration = Duration::from_millis(10000);

/// How long `stop` waits for a graceful exit before killing the child
pub const STOP_TIMEOUT: Duration = Duration::from_millis(2000);

#[derive(Debug, Serialize)]
struct ClientRequest {
    jsonrpc: &'static str,
    id: u64,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ClientResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<u64>,
    result: Option<Value>,
    error: Option<ClientRpcError>,
}

#[derive(Debug, Deserialize)]
struct ClientRpcError {
    code: i64,
    message: String,
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<std::result::Result<Value, String>>>>>;

/// Client over a spawned protocol server process
pub struct ProtocolClient {
    child: Arc<Mutex<Child>>,
    stdin: Arc<Mutex<Option<ChildStdin>>>,
    next_id: AtomicU64,
    pending: PendingMap,
}

impl ProtocolClient {
    /// Spawn the server process and start the response reader.
    ///
    /// `envs` is applied on top of the inherited environment, so tests can
    /// select the mock engine and redirect the screenshot directory.
    pub async fn start(
        command: &str,
        args: &[String],
        envs: &[(String, String)],
    ) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        for (key, value) in envs {
            cmd.env(key, value);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::internal(format!("Failed to spawn {}: {}", command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::internal("Child has no stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::internal("Child has no stdout"))?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        tokio::spawn(Self::reader_task(stdout, pending.clone()));

        Ok(Self {
            child: Arc::new(Mutex::new(child)),
            stdin: Arc::new(Mutex::new(Some(stdin))),
            next_id: AtomicU64::new(1),
            pending,
        })
    }

    /// Send one request and wait for the matching response.
    ///
    /// Resolves with the response's `result`, or an error for a JSON-RPC
    /// error response, a timeout, or a dead server process.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = ClientRequest {
            jsonrpc: "2.0",
            id,
            method: method.to_string(),
            params,
        };

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let line = serde_json::to_string(&request)?;
        debug!("client → [{}] {}", id, method);

        {
            let mut stdin = self.stdin.lock().await;
            let stdin = stdin
                .as_mut()
                .ok_or_else(|| Error::internal("Client is stopped"))?;
            stdin.write_all(line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await?;
        }

        match tokio::time::timeout(CALL_TIMEOUT, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(message))) => Err(Error::protocol(message)),
            Ok(Err(_)) => Err(Error::protocol("Server closed before responding")),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(Error::timeout(format!(
                    "No response for request {} within {}ms",
                    id,
                    CALL_TIMEOUT.as_millis()
                )))
            }
        }
    }

    /// Convenience wrapper for `tools/call`
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        self.call(
            "tools/call",
            Some(serde_json::json!({ "name": name, "arguments": arguments })),
        )
        .await
    }

    /// Close the server's input, wait briefly for a graceful exit, then
    /// force-terminate.
    pub async fn stop(self) -> Result<()> {
        // Dropping stdin closes the pipe, which the server treats as
        // end-of-session.
        self.stdin.lock().await.take();

        let mut child = self.child.lock().await;
        match tokio::time::timeout(STOP_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => {
                debug!("Server exited with {}", status);
                Ok(())
            }
            Ok(Err(e)) => Err(Error::internal(format!("Failed to reap server: {}", e))),
            Err(_) => {
                warn!(
                    "Server did not exit within {}ms, killing it",
                    STOP_TIMEOUT.as_millis()
                );
                child
                    .kill()
                    .await
                    .map_err(|e| Error::internal(format!("Failed to kill server: {}", e)))?;
                Ok(())
            }
        }
    }

    /// Read response lines, completing pending calls by id. Responses for
    /// ids with no pending entry are logged and dropped.
    async fn reader_task(stdout: ChildStdout, pending: PendingMap) {
        let mut lines = BufReader::new(stdout).lines();

        loop {
            match lines.next_line().await {
                Ok(Some(line)) if !line.trim().is_empty() => {
                    match serde_json::from_str::<ClientResponse>(&line) {
                        Ok(response) => {
                            let Some(id) = response.id else {
                                debug!("Response without id, dropping");
                                continue;
                            };
                            let Some(tx) = pending.lock().await.remove(&id) else {
                                warn!("Response for unknown id {}, dropping", id);
                                continue;
                            };
                            let payload = match response.error {
                                Some(err) => Err(format!(
                                    "JSON-RPC error {}: {}",
                                    err.code, err.message
                                )),
                                None => Ok(response.result.unwrap_or(Value::Null)),
                            };
                            let _ = tx.send(payload);
                        }
                        Err(e) => {
                            // The protocol stream must only carry JSON
                            // responses; anything else is a server bug.
                            error!("Unparseable response line: {}: {}", e, line);
                        }
                    }
                }
                Ok(Some(_)) => {}
                Ok(None) => {
                    debug!("Server output stream closed");
                    let mut map = pending.lock().await;
                    for (_, tx) in map.drain() {
                        let _ = tx.send(Err("Server process closed its output stream".to_string()));
                    }
                    break;
                }
                Err(e) => {
                    error!("Failed to read from server: {}", e);
                    let mut map = pending.lock().await;
                    for (_, tx) in map.drain() {
                        let _ = tx.send(Err(format!("Read error from server: {}", e)));
                    }
                    break;
                }
            }
        }
    }
}
