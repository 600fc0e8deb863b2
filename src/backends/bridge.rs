//! External-process automation bridge.
//!
//! Speaks a newline-delimited JSON protocol over a helper subprocess's
//! standard streams. Each outbound call carries a monotonically increasing
//! numeric id, a method name, and positional parameters; inbound lines are
//! demultiplexed back to the pending call by id. Readiness/status lines
//! without an id are skipped. Stale calls are failed by a sweep task so a
//! silent helper cannot leak pending futures.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::time::Instant;

use crate::backends::{ActionTarget, AutomationBackend, BackendKind, InitError};
use crate::config::BridgeConfig;
use crate::element::Point;
use crate::errors::{ProbeError, ProbeResult};

struct PendingCall {
    sender: oneshot::Sender<Value>,
    deadline: Instant,
    method: String,
}

type PendingMap = Arc<Mutex<HashMap<u64, PendingCall>>>;

pub struct BridgeBackend {
    config: BridgeConfig,
    next_id: AtomicU64,
    pending: PendingMap,
    stdin: Mutex<Option<ChildStdin>>,
    available: Arc<AtomicBool>,
}

impl BridgeBackend {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            next_id: AtomicU64::new(0),
            pending: Arc::new(Mutex::new(HashMap::new())),
            stdin: Mutex::new(None),
            available: Arc::new(AtomicBool::new(false)),
        }
    }

    /// One request/response round-trip.
    pub async fn call(&self, method: &str, params: Vec<Value>) -> ProbeResult<Value> {
        if !self.is_available() {
            return Err(ProbeError::BackendUnavailable("bridge process not running".into()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let timeout = Duration::from_millis(self.config.call_timeout_ms);
        let (tx, rx) = oneshot::channel();

        self.pending.lock().await.insert(
            id,
            PendingCall {
                sender: tx,
                deadline: Instant::now() + timeout,
                method: method.to_string(),
            },
        );

        let line = json!({ "id": id, "method": method, "params": params }).to_string();
        tracing::trace!(id, method, "bridge request");

        {
            let mut stdin = self.stdin.lock().await;
            let Some(writer) = stdin.as_mut() else {
                drop(stdin);
                self.pending.lock().await.remove(&id);
                return Err(ProbeError::BackendUnavailable("bridge stdin not connected".into()));
            };
            let write = async {
                writer.write_all(line.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await
            };
            if let Err(e) = write.await {
                self.pending.lock().await.remove(&id);
                self.available.store(false, Ordering::SeqCst);
                return Err(ProbeError::BackendUnavailable(format!("bridge write: {e}")));
            }
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => {
                if let Some(message) = response["error"].as_str() {
                    return Err(ProbeError::BackendUnavailable(format!(
                        "bridge '{method}': {message}"
                    )));
                }
                Ok(response.get("result").cloned().unwrap_or(Value::Null))
            }
            // Sender dropped: the sweep task already failed this entry.
            Ok(Err(_)) => Err(ProbeError::BridgeTimeout {
                id,
                method: method.to_string(),
            }),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(ProbeError::BridgeTimeout {
                    id,
                    method: method.to_string(),
                })
            }
        }
    }

    fn positional_target(target: &ActionTarget) -> Vec<Value> {
        if let Some(p) = target.point {
            vec![json!(p.x), json!(p.y)]
        } else if let Some(handle) = &target.handle {
            vec![json!(handle.id)]
        } else {
            Vec::new()
        }
    }
}

/// Reads helper stdout until EOF, routing each line to its pending call.
async fn read_loop(
    stdout: tokio::process::ChildStdout,
    pending: PendingMap,
    available: Arc<AtomicBool>,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                route_line(line, &mut *pending.lock().await);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "bridge stdout read failed");
                break;
            }
        }
    }
    tracing::info!("bridge process stdout closed");
    available.store(false, Ordering::SeqCst);
    // Fail whatever is still in flight.
    pending.lock().await.clear();
}

/// Matches one inbound line to a pending call. Lines that are not JSON
/// objects with a numeric id (readiness banners, status chatter) are skipped.
fn route_line(line: &str, pending: &mut HashMap<u64, PendingCall>) {
    let value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(_) => {
            tracing::trace!(line, "bridge non-JSON line skipped");
            return;
        }
    };
    let Some(id) = value["id"].as_u64() else {
        tracing::trace!("bridge status line skipped");
        return;
    };
    match pending.remove(&id) {
        Some(call) => {
            let _ = call.sender.send(value);
        }
        None => tracing::debug!(id, "bridge response for unknown call"),
    }
}

/// Periodically fails entries whose deadline passed. Holds only a weak
/// reference so the task dies with the backend.
async fn sweep_loop(pending: std::sync::Weak<Mutex<HashMap<u64, PendingCall>>>) {
    let mut tick = tokio::time::interval(Duration::from_millis(500));
    loop {
        tick.tick().await;
        let Some(pending) = pending.upgrade() else {
            break;
        };
        let mut map = pending.lock().await;
        let now = Instant::now();
        let stale: Vec<u64> = map
            .iter()
            .filter(|(_, call)| call.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            if let Some(call) = map.remove(&id) {
                tracing::warn!(id, method = %call.method, "bridge call swept after deadline");
                // Dropping the sender resolves the waiter with a timeout.
            }
        }
    }
}

#[async_trait]
impl AutomationBackend for BridgeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Bridge
    }

    async fn initialize(&self) -> Result<(), InitError> {
        let mut child = Command::new(&self.config.command)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| InitError::Spawn {
                command: self.config.command.clone(),
                message: e.to_string(),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| InitError::Probe(
            "bridge child has no stdout".into(),
        ))?;
        let stdin = child.stdin.take().ok_or_else(|| InitError::Probe(
            "bridge child has no stdin".into(),
        ))?;

        *self.stdin.lock().await = Some(stdin);
        self.available.store(true, Ordering::SeqCst);

        tokio::spawn(read_loop(
            stdout,
            Arc::clone(&self.pending),
            Arc::clone(&self.available),
        ));
        tokio::spawn(sweep_loop(Arc::downgrade(&self.pending)));
        // The child itself only needs to outlive its pipes.
        tokio::spawn(async move {
            let status = child.wait().await;
            tracing::info!(?status, "bridge process exited");
        });

        tracing::info!(command = %self.config.command, "bridge process started");
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn click(&self, target: &ActionTarget) -> ProbeResult<()> {
        self.call("click", Self::positional_target(target)).await.map(|_| ())
    }

    async fn type_text(&self, target: &ActionTarget, text: &str) -> ProbeResult<()> {
        let mut params = Self::positional_target(target);
        params.push(json!(text));
        self.call("type", params).await.map(|_| ())
    }

    async fn press(&self, _target: &ActionTarget, key: &str) -> ProbeResult<()> {
        self.call("press", vec![json!(key)]).await.map(|_| ())
    }

    async fn hover(&self, target: &ActionTarget) -> ProbeResult<()> {
        self.call("moveTo", Self::positional_target(target)).await.map(|_| ())
    }

    async fn scroll(&self, target: &ActionTarget, dx: f64, dy: f64) -> ProbeResult<()> {
        let mut params = Self::positional_target(target);
        params.push(json!(dx));
        params.push(json!(dy));
        self.call("scroll", params).await.map(|_| ())
    }

    async fn drag(&self, target: &ActionTarget, to: Point) -> ProbeResult<()> {
        let mut params = Self::positional_target(target);
        params.push(json!(to.x));
        params.push(json!(to.y));
        self.call("drag", params).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_entry(method: &str) -> (PendingCall, oneshot::Receiver<Value>) {
        let (tx, rx) = oneshot::channel();
        (
            PendingCall {
                sender: tx,
                deadline: Instant::now() + Duration::from_secs(5),
                method: method.to_string(),
            },
            rx,
        )
    }

    #[tokio::test]
    async fn response_line_resolves_exactly_one_pending_call() {
        let mut pending = HashMap::new();
        let (call, mut rx) = pending_entry("click");
        pending.insert(7, call);

        route_line(r#"{"id":7,"result":true}"#, &mut pending);
        assert!(pending.is_empty());
        let value = rx.try_recv().expect("resolved");
        assert_eq!(value["result"], Value::Bool(true));
    }

    #[tokio::test]
    async fn status_lines_without_id_are_skipped() {
        let mut pending = HashMap::new();
        let (call, mut rx) = pending_entry("click");
        pending.insert(1, call);

        route_line("bridge ready", &mut pending);
        route_line(r#"{"status":"ready"}"#, &mut pending);
        assert_eq!(pending.len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_id_is_ignored() {
        let mut pending = HashMap::new();
        route_line(r#"{"id":99,"result":null}"#, &mut pending);
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn call_on_stopped_bridge_fails_unavailable() {
        let backend = BridgeBackend::new(BridgeConfig {
            command: "helper".into(),
            args: vec![],
            call_timeout_ms: 100,
        });
        let err = backend.call("click", vec![]).await.unwrap_err();
        assert!(matches!(err, ProbeError::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn echo_process_round_trip() {
        // `cat` echoes each request line; the echoed object carries the same
        // id, so the demultiplexer resolves the pending call with it.
        let backend = BridgeBackend::new(BridgeConfig {
            command: "cat".into(),
            args: vec![],
            call_timeout_ms: 2_000,
        });
        if backend.initialize().await.is_err() {
            return; // no `cat` on this host; nothing to assert
        }
        let value = backend.call("ping", vec![json!(1)]).await.expect("echo");
        // `cat` echoes the request, which has no result field.
        assert_eq!(value, Value::Null);
        assert!(backend.is_available());
    }
}
