//! WebSocket JSON-RPC session with a ledger node
//!
//! One socket carries both request/response calls and subscription
//! notifications. A receiver task routes every incoming frame:
//! - responses go to the pending request with the matching `id`
//! - notifications go to the subscription with the matching id
//!
//! A subscription is registered by the receiver task itself when the
//! subscribe response arrives, so no notification can slip past between
//! the response and the registration.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use sminer_core::{BlockHash, ChainError, Result};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::connection::Connector;
use super::rpc::{ChainRpc, NodeHealth, RuntimeVersion, StatusSubscription, TxStatus};

/// Send half of the socket
pub type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Receive half of the socket
pub type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

type Notification = Result<Value>;
type SubscribeReply = oneshot::Sender<Result<(String, mpsc::UnboundedReceiver<Notification>)>>;

enum Pending {
    Call(oneshot::Sender<Result<Value>>),
    Subscribe(SubscribeReply),
}

#[derive(Default)]
struct Routes {
    pending: HashMap<u64, Pending>,
    subscriptions: HashMap<String, mpsc::UnboundedSender<Notification>>,
}

struct Shared {
    url: String,
    sink: Mutex<WsSink>,
    routes: StdMutex<Routes>,
    next_id: AtomicU64,
    request_timeout: Duration,
}

impl Shared {
    fn routes(&self) -> std::sync::MutexGuard<'_, Routes> {
        self.routes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn send(&self, id: u64, method: &str, params: Value) -> Result<()> {
        let frame = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        })
        .to_string();

        self.sink
            .lock()
            .await
            .send(Message::Text(frame))
            .await
            .map_err(|e| ChainError::Transport(format!("failed to send {}: {}", method, e)))
    }

    async fn await_reply<T>(&self, id: u64, method: &str, rx: oneshot::Receiver<Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ChainError::Transport("connection closed".into())),
            Err(_) => {
                self.routes().pending.remove(&id);
                Err(ChainError::Transport(format!(
                    "{} timed out after {:?}",
                    method, self.request_timeout
                )))
            }
        }
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        debug!(id, method, "RPC request");

        let (tx, rx) = oneshot::channel();
        self.routes().pending.insert(id, Pending::Call(tx));
        if let Err(e) = self.send(id, method, params).await {
            self.routes().pending.remove(&id);
            return Err(e);
        }
        self.await_reply(id, method, rx).await
    }

    async fn subscribe(
        &self,
        method: &str,
        params: Value,
    ) -> Result<(String, mpsc::UnboundedReceiver<Notification>)> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        debug!(id, method, "RPC subscribe");

        let (tx, rx) = oneshot::channel();
        self.routes().pending.insert(id, Pending::Subscribe(tx));
        if let Err(e) = self.send(id, method, params).await {
            self.routes().pending.remove(&id);
            return Err(e);
        }
        self.await_reply(id, method, rx).await
    }

    fn handle_frame(&self, text: &str) {
        let frame: Value = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Discarding malformed RPC frame");
                return;
            }
        };

        if let Some(id) = frame.get("id").and_then(Value::as_u64) {
            self.handle_response(id, &frame);
        } else if let Some(params) = frame.get("params") {
            self.handle_notification(params);
        }
    }

    fn handle_response(&self, id: u64, frame: &Value) {
        let result = match frame.get("error") {
            Some(err) => Err(ChainError::Rpc {
                code: err.get("code").and_then(Value::as_i64).unwrap_or_default(),
                message: err
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            }),
            None => Ok(frame.get("result").cloned().unwrap_or(Value::Null)),
        };

        let mut routes = self.routes();
        match routes.pending.remove(&id) {
            Some(Pending::Call(reply)) => {
                let _ = reply.send(result);
            }
            Some(Pending::Subscribe(reply)) => {
                let registered = result.and_then(|value| {
                    let key = subscription_key(&value).ok_or_else(|| {
                        ChainError::Codec(format!("invalid subscription id {}", value))
                    })?;
                    let (tx, rx) = mpsc::unbounded_channel();
                    routes.subscriptions.insert(key.clone(), tx);
                    Ok((key, rx))
                });
                let _ = reply.send(registered);
            }
            None => debug!(id, "Response for unknown request"),
        }
    }

    fn handle_notification(&self, params: &Value) {
        let Some(key) = params.get("subscription").and_then(subscription_key) else {
            return;
        };
        let item = match params.get("error") {
            Some(err) => Err(ChainError::Transport(format!("subscription error: {}", err))),
            None => Ok(params.get("result").cloned().unwrap_or(Value::Null)),
        };
        let routes = self.routes();
        if let Some(tx) = routes.subscriptions.get(&key) {
            let _ = tx.send(item);
        }
    }

    /// Fail everything still waiting on this socket
    fn close_all(&self) {
        let mut routes = self.routes();
        for (id, pending) in routes.pending.drain() {
            debug!(id, "Failing pending request, connection closed");
            let err = ChainError::Transport("connection closed".into());
            match pending {
                Pending::Call(reply) => {
                    let _ = reply.send(Err(err));
                }
                Pending::Subscribe(reply) => {
                    let _ = reply.send(Err(err));
                }
            }
        }
        for (_, tx) in routes.subscriptions.drain() {
            let _ = tx.send(Err(ChainError::Transport("connection closed".into())));
        }
    }
}

fn subscription_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn hex_param(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn hex_result(value: &Value) -> Result<Vec<u8>> {
    let s = value
        .as_str()
        .ok_or_else(|| ChainError::Codec(format!("expected hex string, got {}", value)))?;
    hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| ChainError::Codec(format!("invalid hex in response: {}", e)))
}

async fn receiver_loop(mut stream: WsStream, shared: Arc<Shared>) {
    debug!(url = %shared.url, "Receiver loop started");

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => shared.handle_frame(&text),
            Ok(Message::Binary(data)) => match std::str::from_utf8(&data) {
                Ok(text) => shared.handle_frame(text),
                Err(_) => warn!("Discarding non-UTF-8 binary frame"),
            },
            Ok(Message::Close(frame)) => {
                info!(frame = ?frame, "Node closed connection");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                error!(error = %e, "WebSocket error");
                break;
            }
        }
    }

    debug!(url = %shared.url, "Receiver loop ended");
    shared.close_all();
}

/// JSON-RPC client over one WebSocket
pub struct WsRpcClient {
    shared: Arc<Shared>,
    recv_task: JoinHandle<()>,
}

impl WsRpcClient {
    /// Open a session; fails if the socket cannot be established in time
    pub async fn connect(url: &str, request_timeout: Duration) -> Result<Self> {
        debug!(url, "Connecting to node");

        let (ws, _) = tokio::time::timeout(request_timeout, connect_async(url))
            .await
            .map_err(|_| ChainError::Transport(format!("connect to {} timed out", url)))?
            .map_err(|e| ChainError::Transport(format!("connect to {} failed: {}", url, e)))?;
        let (sink, stream) = ws.split();

        let shared = Arc::new(Shared {
            url: url.to_string(),
            sink: Mutex::new(sink),
            routes: StdMutex::new(Routes::default()),
            next_id: AtomicU64::new(1),
            request_timeout,
        });
        let recv_task = tokio::spawn(receiver_loop(stream, Arc::clone(&shared)));

        info!(url, "Node session established");
        Ok(Self { shared, recv_task })
    }

    pub fn url(&self) -> &str {
        &self.shared.url
    }

    /// Whether the receiver task is still running
    pub fn is_alive(&self) -> bool {
        !self.recv_task.is_finished()
    }
}

impl Drop for WsRpcClient {
    fn drop(&mut self) {
        self.recv_task.abort();
        self.shared.close_all();
        debug!(url = %self.shared.url, "Node session dropped");
    }
}

#[async_trait]
impl ChainRpc for WsRpcClient {
    async fn system_health(&self) -> Result<NodeHealth> {
        let value = self.shared.request("system_health", json!([])).await?;
        serde_json::from_value(value).map_err(|e| ChainError::Codec(format!("system_health: {}", e)))
    }

    async fn metadata(&self) -> Result<Vec<u8>> {
        let value = self.shared.request("state_getMetadata", json!([])).await?;
        hex_result(&value)
    }

    async fn genesis_hash(&self) -> Result<BlockHash> {
        let value = self.shared.request("chain_getBlockHash", json!([0])).await?;
        value
            .as_str()
            .ok_or_else(|| ChainError::Codec(format!("expected block hash, got {}", value)))?
            .parse()
    }

    async fn runtime_version(&self) -> Result<RuntimeVersion> {
        let value = self.shared.request("state_getRuntimeVersion", json!([])).await?;
        serde_json::from_value(value)
            .map_err(|e| ChainError::Codec(format!("state_getRuntimeVersion: {}", e)))
    }

    async fn storage(&self, key: &[u8], at: Option<BlockHash>) -> Result<Option<Vec<u8>>> {
        let params = match at {
            Some(hash) => json!([hex_param(key), hash.to_string()]),
            None => json!([hex_param(key)]),
        };
        let value = self.shared.request("state_getStorage", params).await?;
        if value.is_null() {
            return Ok(None);
        }
        hex_result(&value).map(Some)
    }

    async fn submit_and_watch(&self, extrinsic: &[u8]) -> Result<StatusSubscription> {
        let (sub_id, mut raw) = self
            .shared
            .subscribe("author_submitAndWatchExtrinsic", json!([hex_param(extrinsic)]))
            .await?;

        let (updates_tx, updates) = mpsc::channel(16);
        let (errors_tx, errors) = mpsc::channel(4);
        tokio::spawn(async move {
            while let Some(item) = raw.recv().await {
                let delivered = match item.and_then(|v| TxStatus::from_json(&v)) {
                    Ok(status) => updates_tx.send(status).await.is_ok(),
                    Err(e) => errors_tx.send(e).await.is_ok(),
                };
                if !delivered {
                    break;
                }
            }
        });

        let shared = Arc::clone(&self.shared);
        Ok(StatusSubscription::new(updates, errors, move || {
            shared.routes().subscriptions.remove(&sub_id);
            let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                return;
            };
            runtime.spawn(async move {
                if let Err(e) = shared
                    .request("author_unwatchExtrinsic", json!([sub_id]))
                    .await
                {
                    debug!(error = %e, "Unwatch failed");
                }
            });
        }))
    }
}

/// Opens fresh WebSocket sessions for the connection manager
#[derive(Debug, Clone)]
pub struct WsConnector {
    pub url: String,
    pub request_timeout: Duration,
}

#[async_trait]
impl Connector<WsRpcClient> for WsConnector {
    async fn connect(&self) -> Result<WsRpcClient> {
        WsRpcClient::connect(&self.url, self.request_timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Minimal node: answers `system_health`, and for a submit sends the
    /// subscription id followed by `ready` and `inBlock` notifications.
    async fn spawn_node() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();
            while let Some(Ok(Message::Text(text))) = ws.next().await {
                let req: Value = serde_json::from_str(&text).unwrap();
                let id = req["id"].clone();
                match req["method"].as_str().unwrap() {
                    "system_health" => {
                        let resp = json!({"jsonrpc": "2.0", "id": id,
                            "result": {"peers": 4, "isSyncing": false, "shouldHavePeers": true}});
                        ws.send(Message::Text(resp.to_string())).await.unwrap();
                    }
                    "state_getStorage" => {
                        let resp = json!({"jsonrpc": "2.0", "id": id, "result": null});
                        ws.send(Message::Text(resp.to_string())).await.unwrap();
                    }
                    "author_submitAndWatchExtrinsic" => {
                        let resp = json!({"jsonrpc": "2.0", "id": id, "result": "sub-1"});
                        ws.send(Message::Text(resp.to_string())).await.unwrap();
                        for status in [json!("ready"), json!({"inBlock": format!("0x{}", "22".repeat(32))})] {
                            let note = json!({"jsonrpc": "2.0", "method": "author_extrinsicUpdate",
                                "params": {"subscription": "sub-1", "result": status}});
                            ws.send(Message::Text(note.to_string())).await.unwrap();
                        }
                    }
                    _ => {
                        let resp = json!({"jsonrpc": "2.0", "id": id,
                            "error": {"code": -32601, "message": "Method not found"}});
                        ws.send(Message::Text(resp.to_string())).await.unwrap();
                    }
                }
            }
        });
        format!("ws://{}", addr)
    }

    #[tokio::test]
    async fn test_request_and_subscription_routing() {
        let url = spawn_node().await;
        let client = WsRpcClient::connect(&url, Duration::from_secs(5)).await.unwrap();

        let health = client.system_health().await.unwrap();
        assert_eq!(health.peers, 4);
        assert_eq!(client.storage(&[1, 2], None).await.unwrap(), None);

        let err = client.runtime_version().await.unwrap_err();
        assert!(matches!(err, ChainError::Rpc { code: -32601, .. }));

        let mut sub = client.submit_and_watch(&[0xaa]).await.unwrap();
        assert_eq!(sub.updates.recv().await, Some(TxStatus::Ready));
        assert_eq!(
            sub.updates.recv().await,
            Some(TxStatus::InBlock(BlockHash([0x22; 32])))
        );
    }

    #[tokio::test]
    async fn test_connect_failure_is_transport() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = WsRpcClient::connect(&format!("ws://{}", addr), Duration::from_secs(2)).await;
        assert!(matches!(result, Err(ChainError::Transport(_))));
    }
}
