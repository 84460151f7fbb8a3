//! Line-delimited transport over a child process's stdin/stdout.

use super::Transport;
use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use toolbridge_core::{EnvelopeCodec, Frame, RequestId, RpcRequest, RpcResponse, MAX_MESSAGE_BYTES};
use tracing::{debug, error, warn};

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Callers waiting on a response, keyed by request id.
///
/// Once `closed` is set no new waiter may register.
#[derive(Default)]
struct Pending {
    closed: bool,
    waiters: HashMap<RequestId, oneshot::Sender<RpcResponse>>,
}

type SharedPending = Arc<Mutex<Pending>>;

fn lock(pending: &SharedPending) -> std::sync::MutexGuard<'_, Pending> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Removes a registered waiter unless its response arrived, including when
/// the caller drops the `exchange` future.
struct WaiterGuard<'a> {
    pending: &'a SharedPending,
    id: Option<RequestId>,
}

impl WaiterGuard<'_> {
    fn disarm(&mut self) {
        self.id = None;
    }
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            lock(self.pending).waiters.remove(&id);
        }
    }
}

/// Talks to a server over a pair of byte streams, one envelope per line.
///
/// Any number of calls may be in flight; a background reader routes each
/// response line to the caller whose request carried the same id.
pub struct StdioTransport {
    writer: AsyncMutex<FramedWrite<BoxedWriter, EnvelopeCodec>>,
    pending: SharedPending,
    reader: JoinHandle<()>,
    timeout: Option<Duration>,
    _child: Option<Child>,
}

impl StdioTransport {
    /// Spawn `command` and speak to it over its stdin/stdout.
    ///
    /// The child inherits stderr and is killed when the transport is dropped.
    pub fn spawn(command: &str, args: &[String]) -> ClientResult<Self> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ClientError::Transport(format!("Failed to spawn '{}': {}", command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ClientError::Transport("Child stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClientError::Transport("Child stdout unavailable".to_string()))?;

        debug!(command, pid = ?child.id(), "Spawned tool server");

        let mut transport = Self::from_streams(stdout, stdin);
        transport._child = Some(child);
        Ok(transport)
    }

    /// Wrap an already connected reader/writer pair.
    pub fn from_streams<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending = SharedPending::default();
        let reader = tokio::spawn(read_responses(reader, pending.clone()));
        let writer: BoxedWriter = Box::new(writer);

        Self {
            writer: AsyncMutex::new(FramedWrite::new(writer, EnvelopeCodec::new())),
            pending,
            reader,
            timeout: None,
            _child: None,
        }
    }

    /// Fail calls that get no response within `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// True once the server side has closed; every later call fails.
    pub fn is_closed(&self) -> bool {
        lock(&self.pending).closed
    }

    /// Number of calls still waiting on a response
    pub fn in_flight(&self) -> usize {
        lock(&self.pending).waiters.len()
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn exchange(&self, request: RpcRequest) -> ClientResult<RpcResponse> {
        let id = request.id.clone().ok_or_else(|| {
            ClientError::Protocol("Notifications receive no response".to_string())
        })?;
        let line = serde_json::to_string(&request)?;

        // The server answers an oversized line without an id, so it could
        // never be matched to this call.
        if line.len() > MAX_MESSAGE_BYTES {
            return Err(ClientError::Protocol(format!(
                "Request is {} bytes, over the {} byte message limit",
                line.len(),
                MAX_MESSAGE_BYTES
            )));
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = lock(&self.pending);
            if pending.closed {
                return Err(ClientError::Transport("Connection closed".to_string()));
            }
            if pending.waiters.contains_key(&id) {
                return Err(ClientError::Protocol(format!("Request id {} already in flight", id)));
            }
            pending.waiters.insert(id.clone(), tx);
        }
        let mut guard = WaiterGuard {
            pending: &self.pending,
            id: Some(id.clone()),
        };

        debug!(%id, method = %request.method, "Sending request");
        let sent = self.writer.lock().await.send(line).await;
        if let Err(e) = sent {
            error!(%id, error = %e, "Failed to write request");
            return Err(ClientError::Transport(format!("Write failed: {}", e)));
        }

        let received = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    return Err(ClientError::Transport(format!(
                        "No response within {:?}",
                        limit
                    )));
                }
            },
            None => rx.await,
        };

        // Either way the reader already took the waiter out of the map
        guard.disarm();

        // The sender is dropped without a value only when the reader drains
        // waiters on close.
        received.map_err(|_| ClientError::Transport("Connection closed".to_string()))
    }

    fn kind(&self) -> &'static str {
        "stdio"
    }
}

impl Drop for StdioTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Route response lines to their waiters until the stream ends, then fail
/// everything still pending.
async fn read_responses<R>(reader: R, pending: SharedPending)
where
    R: AsyncRead + Send + Unpin,
{
    let mut frames = FramedRead::new(reader, EnvelopeCodec::new());

    while let Some(next) = frames.next().await {
        let line = match next {
            Ok(Frame::Line(line)) => line,
            Ok(Frame::Oversized) => {
                warn!(limit = MAX_MESSAGE_BYTES, "Discarding over-long response line");
                continue;
            }
            Ok(Frame::NotUtf8) => {
                warn!("Discarding response line that is not valid UTF-8");
                continue;
            }
            Err(e) => {
                error!(error = %e, "Read from server failed");
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let response: RpcResponse = match serde_json::from_str(&line) {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Discarding unparseable response line");
                continue;
            }
        };

        let waiter = response
            .id
            .as_ref()
            .and_then(|id| lock(&pending).waiters.remove(id));
        match waiter {
            // The caller may have given up between removal and send.
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => warn!(id = ?response.id, "Response matches no pending request"),
        }
    }

    let mut pending = lock(&pending);
    pending.closed = true;
    let dropped = pending.waiters.len();
    pending.waiters.clear();
    debug!(dropped, "Server stream closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};
    use toolbridge_core::ErrorCode;

    /// Server double that answers each request with its method name, holding
    /// the first `hold` requests back and answering them in reverse order.
    fn scripted_server(hold: usize) -> StdioTransport {
        let (client_io, server_io) = duplex(64 * 1024);
        let (client_read, client_write) = tokio::io::split(client_io);
        let (server_read, mut server_write) = tokio::io::split(server_io);

        tokio::spawn(async move {
            let mut lines = BufReader::new(server_read).lines();
            let mut held = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                let request: Value = serde_json::from_str(&line).unwrap();
                let response = json!({
                    "jsonrpc": "2.0",
                    "id": request["id"],
                    "result": {"echo": request["method"]}
                });
                held.push(response);
                if held.len() >= hold {
                    for response in held.drain(..).rev() {
                        let mut out = response.to_string();
                        out.push('\n');
                        server_write.write_all(out.as_bytes()).await.unwrap();
                    }
                }
            }
        });

        StdioTransport::from_streams(client_read, client_write)
    }

    #[tokio::test]
    async fn test_round_trip() {
        let transport = scripted_server(1);
        let response = transport
            .exchange(RpcRequest::new(1, "ping", None))
            .await
            .unwrap();
        assert_eq!(response.id, Some(RequestId::from(1)));
        assert_eq!(response.into_outcome().unwrap(), json!({"echo": "ping"}));
    }

    #[tokio::test]
    async fn test_out_of_order_responses_reach_their_callers() {
        let transport = Arc::new(scripted_server(3));

        let calls = (1..=3).map(|i| {
            let transport = transport.clone();
            tokio::spawn(async move {
                transport
                    .exchange(RpcRequest::new(i, format!("m{}", i), None))
                    .await
                    .unwrap()
            })
        });
        let responses = futures::future::join_all(calls).await;

        for (i, response) in (1..=3).zip(responses) {
            let response = response.unwrap();
            assert_eq!(response.id, Some(RequestId::from(i)));
            assert_eq!(
                response.into_outcome().unwrap()["echo"],
                format!("m{}", i)
            );
        }
    }

    #[tokio::test]
    async fn test_server_eof_fails_pending_and_later_calls() {
        let (client_io, server_io) = duplex(1024);
        let (client_read, client_write) = tokio::io::split(client_io);
        let transport = Arc::new(StdioTransport::from_streams(client_read, client_write));

        let waiting = {
            let transport = transport.clone();
            tokio::spawn(async move { transport.exchange(RpcRequest::list_tools(1)).await })
        };

        // Read the request, then hang up without answering.
        let (server_read, _server_write) = tokio::io::split(server_io);
        let mut lines = BufReader::new(server_read).lines();
        assert!(lines.next_line().await.unwrap().is_some());
        drop(lines);
        drop(_server_write);

        let err = waiting.await.unwrap().unwrap_err();
        assert!(err.is_transport());
        assert_eq!(err.code(), ErrorCode::TransportError);

        let err = transport
            .exchange(RpcRequest::list_tools(2))
            .await
            .unwrap_err();
        assert!(err.is_transport());
        assert!(transport.is_closed());
    }

    #[tokio::test]
    async fn test_timeout_is_transport_error() {
        let (client_io, _server_io) = duplex(1024);
        let (client_read, client_write) = tokio::io::split(client_io);
        let transport = StdioTransport::from_streams(client_read, client_write)
            .with_timeout(Duration::from_millis(50));

        let err = transport
            .exchange(RpcRequest::list_tools(1))
            .await
            .unwrap_err();
        assert!(err.is_transport());
        assert_eq!(transport.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_callers_leave_no_waiters() {
        let (client_io, _server_io) = duplex(1024 * 1024);
        let (client_read, client_write) = tokio::io::split(client_io);
        let transport = StdioTransport::from_streams(client_read, client_write);

        for i in 0..100 {
            let call = transport.exchange(RpcRequest::list_tools(i));
            assert!(tokio::time::timeout(Duration::from_millis(5), call)
                .await
                .is_err());
        }
        assert_eq!(transport.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_aborted_task_removes_its_waiter() {
        let (client_io, _server_io) = duplex(1024);
        let (client_read, client_write) = tokio::io::split(client_io);
        let transport = Arc::new(StdioTransport::from_streams(client_read, client_write));

        let task = {
            let transport = transport.clone();
            tokio::spawn(async move { transport.exchange(RpcRequest::list_tools(1)).await })
        };
        while transport.in_flight() == 0 {
            tokio::task::yield_now().await;
        }
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert_eq!(transport.in_flight(), 0);

        // The id is free again
        let retry = transport.exchange(RpcRequest::list_tools(1));
        assert!(tokio::time::timeout(Duration::from_millis(5), retry)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_oversized_request_rejected_before_sending() {
        let transport = scripted_server(1);
        let params = json!({"name": "writeFile", "arguments": {"content": "x".repeat(MAX_MESSAGE_BYTES)}});
        let err = transport
            .exchange(RpcRequest::new(1, "callTool", Some(params)))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
        assert_eq!(transport.in_flight(), 0);

        let response = transport
            .exchange(RpcRequest::new(2, "ping", None))
            .await
            .unwrap();
        assert_eq!(response.id, Some(RequestId::from(2)));
    }

    #[tokio::test]
    async fn test_bad_response_lines_do_not_close_transport() {
        let (client_io, server_io) = duplex(4 * 1024 * 1024);
        let (client_read, client_write) = tokio::io::split(client_io);
        let (server_read, mut server_write) = tokio::io::split(server_io);
        let transport = StdioTransport::from_streams(client_read, client_write);

        tokio::spawn(async move {
            let mut lines = BufReader::new(server_read).lines();
            if let Ok(Some(_)) = lines.next_line().await {
                let mut junk = vec![b'x'; MAX_MESSAGE_BYTES + 10];
                junk.push(b'\n');
                server_write.write_all(&junk).await.unwrap();
                server_write.write_all(b"\xff\xfe\n").await.unwrap();
                server_write
                    .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n")
                    .await
                    .unwrap();
            }
            // Keep the stream open until the client is done
            let _ = lines.next_line().await;
        });

        let response = transport
            .exchange(RpcRequest::list_tools(1))
            .await
            .unwrap();
        assert_eq!(response.id, Some(RequestId::from(1)));
        assert!(!transport.is_closed());
    }

    #[tokio::test]
    async fn test_notification_is_rejected() {
        let transport = scripted_server(1);
        let err = transport
            .exchange(RpcRequest::notification("ping", None))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_is_transport_error() {
        let err = StdioTransport::spawn("/nonexistent/toolbridge-server", &[])
            .err()
            .unwrap();
        assert!(err.is_transport());
    }
}
