//! Multiplexed WebSocket progress channel.
//!
//! [`ProgressChannel`] maintains one long-lived connection to the
//! progress endpoint and multiplexes per-job subscriptions over it. The
//! connection is created lazily on first subscribe, reused across jobs,
//! and never torn down mid-process except via [`ProgressChannel::shutdown`].
//! If the connection drops, a background task reconnects with
//! exponential backoff and re-emits `subscribeToJob` for every live
//! subscription.
//!
//! The channel gives no ordering or dedup guarantee for `jobUpdate`
//! frames; consumers must tolerate out-of-order, duplicate, and
//! post-completion stray events.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream};
use tokio_util::sync::CancellationToken;

use crate::messages::{parse_frame, ChannelFrame, ControlFrame, JobUpdate};
use crate::backoff::reestablish;

pub(crate) type WsStream =
    tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Errors from the progress channel layer.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The channel has been shut down.
    #[error("Progress channel is closed")]
    Closed,
}

/// Push-based source of job progress events.
///
/// A trait so the controller can be driven by a fake feed in tests.
#[async_trait]
pub trait ProgressFeed: Send + Sync {
    /// Register interest in a job's progress events.
    async fn subscribe(&self, job_id: &str) -> Result<Subscription, ChannelError>;

    /// Withdraw interest in a job. Idempotent: unsubscribing an id that
    /// is not subscribed is a no-op and emits no control frame.
    async fn unsubscribe(&self, job_id: &str);
}

/// Consumer handle for one job's progress events.
pub struct Subscription {
    job_id: String,
    receiver: mpsc::UnboundedReceiver<JobUpdate>,
}

impl Subscription {
    pub fn new(job_id: String, receiver: mpsc::UnboundedReceiver<JobUpdate>) -> Self {
        Self { job_id, receiver }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Wait for the next progress event. Returns `None` once the
    /// subscription has been removed from the channel.
    pub async fn recv(&mut self) -> Option<JobUpdate> {
        self.receiver.recv().await
    }
}

/// Shared handle to the process-wide progress connection.
///
/// Cheap to clone; all clones multiplex the same connection.
#[derive(Clone)]
pub struct ProgressChannel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    ws_url: String,
    /// Per-job delivery slots. Only ever mutated through
    /// subscribe/unsubscribe, which keep the upstream control frames
    /// strictly balanced with the local entries.
    subscriptions: RwLock<HashMap<String, mpsc::UnboundedSender<JobUpdate>>>,
    conn: Mutex<ConnState>,
    cancel: CancellationToken,
}

struct ConnState {
    outbound: mpsc::UnboundedSender<String>,
    /// Receiver half of the outbound queue, held until the connection
    /// task is spawned on first subscribe.
    pending: Option<mpsc::UnboundedReceiver<String>>,
    /// When false, no network task is ever spawned (test mode).
    network: bool,
}

impl ProgressChannel {
    /// Create a channel handle for the given WebSocket base URL. No
    /// connection is made until the first subscribe.
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self::build(ws_url.into(), true)
    }

    /// Channel that queues outbound frames but never connects. Lets
    /// tests assert on emitted control frames without a server.
    #[cfg(test)]
    fn new_detached(ws_url: impl Into<String>) -> Self {
        Self::build(ws_url.into(), false)
    }

    fn build(ws_url: String, network: bool) -> Self {
        let (outbound, pending) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(ChannelInner {
                ws_url,
                subscriptions: RwLock::new(HashMap::new()),
                conn: Mutex::new(ConnState {
                    outbound,
                    pending: Some(pending),
                    network,
                }),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Register a per-job delivery slot and emit `subscribeToJob`
    /// upstream, lazily connecting first.
    pub async fn subscribe(&self, job_id: &str) -> Result<Subscription, ChannelError> {
        self.ensure_connected().await;

        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut subs = self.inner.subscriptions.write().await;
            if subs.insert(job_id.to_string(), tx).is_some() {
                tracing::warn!(job_id = %job_id, "Replacing existing subscription for job");
            }
        }

        if let Err(e) = self
            .send_control(ControlFrame::SubscribeToJob {
                job_id: job_id.to_string(),
            })
            .await
        {
            self.inner.subscriptions.write().await.remove(job_id);
            return Err(e);
        }

        tracing::debug!(job_id = %job_id, "Subscribed to job progress");
        Ok(Subscription::new(job_id.to_string(), rx))
    }

    /// Remove a job's delivery slot and emit `unsubscribeFromJob`.
    ///
    /// Idempotent: the control frame is emitted at most once per
    /// subscribed id, and unsubscribing an unknown id is a no-op.
    pub async fn unsubscribe(&self, job_id: &str) {
        let removed = self
            .inner
            .subscriptions
            .write()
            .await
            .remove(job_id)
            .is_some();
        if !removed {
            return;
        }

        if let Err(e) = self
            .send_control(ControlFrame::UnsubscribeFromJob {
                job_id: job_id.to_string(),
            })
            .await
        {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to send unsubscribe frame");
        }
        tracing::debug!(job_id = %job_id, "Unsubscribed from job progress");
    }

    /// Cancel the connection task. Queued frames are dropped.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }

    // ---- private helpers ----

    /// Spawn the connection task on first use.
    async fn ensure_connected(&self) {
        let mut conn = self.inner.conn.lock().await;
        if !conn.network {
            return;
        }
        if let Some(outbound_rx) = conn.pending.take() {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(run_connection(inner, outbound_rx));
        }
    }

    async fn send_control(&self, frame: ControlFrame) -> Result<(), ChannelError> {
        let conn = self.inner.conn.lock().await;
        conn.outbound
            .send(frame.encode())
            .map_err(|_| ChannelError::Closed)
    }

    #[cfg(test)]
    async fn take_outbound(&self) -> mpsc::UnboundedReceiver<String> {
        self.inner
            .conn
            .lock()
            .await
            .pending
            .take()
            .expect("outbound receiver already taken")
    }
}

#[async_trait]
impl ProgressFeed for ProgressChannel {
    async fn subscribe(&self, job_id: &str) -> Result<Subscription, ChannelError> {
        ProgressChannel::subscribe(self, job_id).await
    }

    async fn unsubscribe(&self, job_id: &str) {
        ProgressChannel::unsubscribe(self, job_id).await;
    }
}

/// Connect to the progress WebSocket endpoint.
///
/// Generates a unique client id (UUID v4) and appends it as a query
/// parameter so the server can address frames back to this client.
pub(crate) async fn connect_socket(ws_url: &str) -> Result<WsStream, ChannelError> {
    let client_id = uuid::Uuid::new_v4();
    let url = format!("{ws_url}/ws?clientId={client_id}");

    let (stream, _response) = connect_async(&url).await.map_err(|e| {
        ChannelError::Connection(format!(
            "Failed to connect to progress channel at {ws_url}: {e}"
        ))
    })?;

    tracing::info!(client_id = %client_id, "Connected to progress channel at {}", ws_url);
    Ok(stream)
}

/// How a single connection's pump loop ended.
enum PumpExit {
    Shutdown,
    ConnectionLost,
}

/// Connection task: connect, pump frames, reconnect on loss.
async fn run_connection(inner: Arc<ChannelInner>, mut outbound: mpsc::UnboundedReceiver<String>) {
    let mut reconnected = false;

    loop {
        let mut stream = if reconnected {
            match reestablish(&inner.ws_url, &inner.cancel).await {
                Some(stream) => stream,
                None => return,
            }
        } else {
            match connect_socket(&inner.ws_url).await {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Progress channel connect failed, entering retry loop",
                    );
                    match reestablish(&inner.ws_url, &inner.cancel).await {
                        Some(stream) => stream,
                        None => return,
                    }
                }
            }
        };

        if reconnected {
            resubscribe_all(&inner, &mut stream).await;
        }

        match pump(&inner, &mut stream, &mut outbound).await {
            PumpExit::Shutdown => {
                let _ = stream.close(None).await;
                tracing::info!("Progress channel shut down");
                return;
            }
            PumpExit::ConnectionLost => {
                tracing::info!("Progress channel connection lost, reconnecting");
                reconnected = true;
            }
        }
    }
}

/// Forward outbound control frames and dispatch inbound events until
/// the connection drops or the channel is cancelled.
async fn pump(
    inner: &ChannelInner,
    stream: &mut WsStream,
    outbound: &mut mpsc::UnboundedReceiver<String>,
) -> PumpExit {
    loop {
        tokio::select! {
            _ = inner.cancel.cancelled() => return PumpExit::Shutdown,
            frame = outbound.recv() => {
                match frame {
                    Some(text) => {
                        if let Err(e) = stream.send(Message::Text(text)).await {
                            tracing::warn!(error = %e, "Failed to send control frame");
                            return PumpExit::ConnectionLost;
                        }
                    }
                    // Every channel handle has been dropped.
                    None => return PumpExit::Shutdown,
                }
            }
            message = stream.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => dispatch_frame(inner, &text).await,
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        // Handled automatically by tungstenite.
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "Progress channel closed by server");
                        return PumpExit::ConnectionLost;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "Progress channel receive error");
                        return PumpExit::ConnectionLost;
                    }
                    None => return PumpExit::ConnectionLost,
                }
            }
        }
    }
}

/// Route one inbound text frame to the matching subscription.
async fn dispatch_frame(inner: &ChannelInner, text: &str) {
    match parse_frame(text) {
        Ok(ChannelFrame::JobUpdate(update)) => {
            let subs = inner.subscriptions.read().await;
            match subs.get(&update.job_id) {
                Some(tx) => {
                    if tx.send(update.clone()).is_err() {
                        tracing::trace!(job_id = %update.job_id, "Subscriber receiver dropped");
                    }
                }
                None => {
                    tracing::trace!(
                        job_id = %update.job_id,
                        "Dropping update for unsubscribed job",
                    );
                }
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, raw_frame = %text, "Failed to parse progress frame");
        }
    }
}

/// Re-emit `subscribeToJob` for every live subscription after a
/// reconnect, so the new connection resumes delivery.
async fn resubscribe_all(inner: &ChannelInner, stream: &mut WsStream) {
    let job_ids: Vec<String> = inner.subscriptions.read().await.keys().cloned().collect();
    for job_id in job_ids {
        let frame = ControlFrame::SubscribeToJob {
            job_id: job_id.clone(),
        }
        .encode();
        if let Err(e) = stream.send(Message::Text(frame)).await {
            tracing::warn!(job_id = %job_id, error = %e, "Failed to resubscribe after reconnect");
            return;
        }
        tracing::debug!(job_id = %job_id, "Resubscribed after reconnect");
    }
}
