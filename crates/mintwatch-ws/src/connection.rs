//! `StreamConnection` — one subscriber's subscription to the program stream.
//!
//! ```text
//! Disconnected → Connecting → Subscribed → (Receiving ⇄ HeartbeatDue) → Closing → Disconnected
//!                    ▲                                  │
//!                    └──────── Reconnecting ◄───────────┘  (error / unexpected close)
//! ```
//!
//! The connection is driven by [`StreamConnection::next_event`], an explicit
//! receive loop owned by the monitor task. Every suspension point is
//! selected against the stop signal, so a stop is observed promptly and the
//! transport is closed on the way out. Reconnects use a fixed delay and
//! continue indefinitely until stopped.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use mintwatch_core::request::SUBSCRIBE_REQUEST_ID;
use mintwatch_core::{JsonRpcRequest, JsonRpcResponse, LogEventExtractor, StreamError, TokenEvent};
use mintwatch_observability::PipelineMetrics;

use crate::config::StreamConfig;
use crate::transport::{Connector, FrameTransport};

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Subscribe request acknowledged, no frame received yet.
    Subscribed,
    Receiving,
    HeartbeatDue,
    Closing,
    /// Waiting out the fixed delay before the next connect.
    Reconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Subscribed => "subscribed",
            Self::Receiving => "receiving",
            Self::HeartbeatDue => "heartbeat-due",
            Self::Closing => "closing",
            Self::Reconnecting => "reconnecting",
        };
        f.write_str(s)
    }
}

/// An established, subscribed transport.
struct Session {
    transport: Box<dyn FrameTransport>,
    heartbeat: Interval,
    /// Subscription id assigned by the node.
    upstream_id: Option<u64>,
}

enum Step {
    Stop,
    Heartbeat,
    Frame(Option<Result<String, StreamError>>),
}

/// Owns one transport connection for the lifetime of a subscription.
pub struct StreamConnection {
    program_id: String,
    config: Arc<StreamConfig>,
    connector: Arc<dyn Connector>,
    extractor: LogEventExtractor,
    stop: watch::Receiver<bool>,
    state: ConnectionState,
    session: Option<Session>,
    metrics: Arc<PipelineMetrics>,
}

impl StreamConnection {
    /// Create a disconnected connection for `program_id`.
    ///
    /// Sending `true` on (or dropping) the sender half of `stop` ends the
    /// connection permanently.
    pub fn new(
        program_id: impl Into<String>,
        config: Arc<StreamConfig>,
        connector: Arc<dyn Connector>,
        stop: watch::Receiver<bool>,
    ) -> Self {
        let extractor = LogEventExtractor::new(config.extractor.clone());
        Self {
            program_id: program_id.into(),
            config,
            connector,
            extractor,
            stop,
            state: ConnectionState::Disconnected,
            session: None,
            metrics: Arc::new(PipelineMetrics::new()),
        }
    }

    /// Report into a shared metrics handle instead of a private one.
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn program_id(&self) -> &str {
        &self.program_id
    }

    /// Subscription id the node assigned on the current session, if any.
    pub fn upstream_subscription(&self) -> Option<u64> {
        self.session.as_ref().and_then(|s| s.upstream_id)
    }

    /// `true` once stop was signalled or the stop sender is gone.
    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow() || self.stop.has_changed().is_err()
    }

    /// Connect, send `programSubscribe` and wait for the acknowledgment.
    ///
    /// The whole handshake is bounded by the connect timeout. Any previous
    /// session is closed first.
    pub async fn open(&mut self) -> Result<(), StreamError> {
        if self.is_stopped() {
            return Err(StreamError::Cancelled);
        }
        self.close().await;
        self.state = ConnectionState::Connecting;

        let req = JsonRpcRequest::program_subscribe(&self.program_id, &self.config.commitment);
        let request = serde_json::to_string(&req)
            .map_err(|e| StreamError::WebSocket(format!("encode subscribe request: {e}")))?;
        let url = self.config.ws_url.clone();
        let timeout = self.config.connect_timeout();
        let connector = Arc::clone(&self.connector);

        info!(url = %url, program = %self.program_id, "connecting via WebSocket");

        let outcome = tokio::select! {
            biased;
            _ = wait_for_stop(&mut self.stop) => None,
            r = handshake(connector.as_ref(), &url, request, timeout) => Some(r),
        };

        match outcome {
            None => {
                self.state = ConnectionState::Disconnected;
                Err(StreamError::Cancelled)
            }
            Some(Err(e)) => {
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
            Some(Ok((transport, upstream_id))) => {
                let period = self.config.heartbeat_interval();
                let mut heartbeat = time::interval_at(Instant::now() + period, period);
                heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.session = Some(Session {
                    transport,
                    heartbeat,
                    upstream_id,
                });
                self.state = ConnectionState::Subscribed;
                info!(url = %url, upstream_id = ?upstream_id, "subscribed to program");
                Ok(())
            }
        }
    }

    /// Send a keep-alive ping.
    ///
    /// A failed write is only logged: liveness is judged by the receive
    /// side, which reports the broken transport on its next read. The write
    /// is bounded by the connect timeout and abandoned on stop.
    pub async fn heartbeat(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        self.state = ConnectionState::HeartbeatDue;
        let limit = self.config.connect_timeout();
        let sent = tokio::select! {
            biased;
            _ = wait_for_stop(&mut self.stop) => None,
            r = time::timeout(limit, session.transport.ping()) => Some(r),
        };
        match sent {
            None => debug!("heartbeat abandoned, stop signalled"),
            Some(Ok(Ok(()))) => debug!("heartbeat ping sent"),
            Some(Ok(Err(e))) => warn!(error = %e, "heartbeat ping failed"),
            Some(Err(_)) => warn!(timeout_ms = limit.as_millis() as u64, "heartbeat ping stalled"),
        }
        self.state = ConnectionState::Receiving;
    }

    /// Classify one frame. Malformed frames are logged and dropped.
    pub fn on_frame(&self, frame: &str) -> Option<TokenEvent> {
        self.metrics.record_frame();
        match self.extractor.extract(frame, Utc::now()) {
            Ok(Some(event)) => {
                self.metrics.record_event();
                info!(
                    mint = %event.mint_address,
                    signature = %event.signature,
                    "new token mint detected"
                );
                Some(event)
            }
            Ok(None) => None,
            Err(e) => {
                self.metrics.record_malformed();
                warn!(error = %e, len = frame.len(), "dropping frame");
                None
            }
        }
    }

    /// Release the transport handle, if any.
    ///
    /// A close handshake that outlasts the connect timeout is abandoned and
    /// the handle dropped.
    pub async fn close(&mut self) {
        if let Some(mut session) = self.session.take() {
            self.state = ConnectionState::Closing;
            close_within(session.transport.as_mut(), self.config.connect_timeout()).await;
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Run the receive loop until a qualifying event arrives.
    ///
    /// Connect failures, transport errors and closes are absorbed here: the
    /// loop waits the fixed reconnect delay and opens a new session. Returns
    /// `None`, with the transport closed, once stop is signalled or a connect
    /// error is not retryable.
    pub async fn next_event(&mut self) -> Option<TokenEvent> {
        loop {
            if self.is_stopped() {
                self.close().await;
                debug!("connection stopped");
                return None;
            }

            if self.session.is_none() {
                match self.open().await {
                    Ok(()) => {}
                    Err(StreamError::Cancelled) => continue,
                    Err(e) if !e.is_retryable() => {
                        error!(url = %self.config.ws_url, error = %e, "connect failed permanently, giving up");
                        self.metrics.record_connect_failure();
                        return None;
                    }
                    Err(e) => {
                        self.metrics.record_connect_failure();
                        warn!(
                            url = %self.config.ws_url,
                            error = %e,
                            "connect failed, retrying in {:?}",
                            self.config.reconnect_delay()
                        );
                        self.wait_before_reconnect().await;
                        continue;
                    }
                }
            }

            let Some(session) = self.session.as_mut() else {
                continue;
            };
            let step = tokio::select! {
                biased;
                _ = wait_for_stop(&mut self.stop) => Step::Stop,
                _ = session.heartbeat.tick() => Step::Heartbeat,
                frame = session.transport.recv() => Step::Frame(frame),
            };

            match step {
                Step::Stop => continue,
                Step::Heartbeat => self.heartbeat().await,
                Step::Frame(Some(Ok(text))) => {
                    self.state = ConnectionState::Receiving;
                    if let Some(event) = self.on_frame(&text) {
                        return Some(event);
                    }
                }
                Step::Frame(Some(Err(e))) => {
                    warn!(error = %e, "transport error, reconnecting in {:?}", self.config.reconnect_delay());
                    self.close().await;
                    self.metrics.record_reconnect();
                    self.wait_before_reconnect().await;
                }
                Step::Frame(None) => {
                    info!("transport closed, reconnecting in {:?}", self.config.reconnect_delay());
                    self.close().await;
                    self.metrics.record_reconnect();
                    self.wait_before_reconnect().await;
                }
            }
        }
    }

    /// Sleep the fixed reconnect delay, cut short by a stop.
    async fn wait_before_reconnect(&mut self) {
        if self.is_stopped() {
            return;
        }
        self.state = ConnectionState::Reconnecting;
        let delay = self.config.reconnect_delay();
        tokio::select! {
            biased;
            _ = wait_for_stop(&mut self.stop) => {}
            _ = time::sleep(delay) => {}
        }
    }
}

/// Resolves once stop is `true` or the sender has been dropped.
async fn wait_for_stop(stop: &mut watch::Receiver<bool>) {
    loop {
        if *stop.borrow_and_update() {
            return;
        }
        if stop.changed().await.is_err() {
            return;
        }
    }
}

/// Connect and subscribe within `timeout`.
async fn handshake(
    connector: &dyn Connector,
    url: &str,
    request: String,
    timeout: Duration,
) -> Result<(Box<dyn FrameTransport>, Option<u64>), StreamError> {
    let deadline = Instant::now() + timeout;
    let ms = timeout.as_millis() as u64;

    let mut transport = time::timeout_at(deadline, connector.connect(url))
        .await
        .map_err(|_| StreamError::Timeout { ms })??;

    match subscribe(transport.as_mut(), request, deadline, ms).await {
        Ok(upstream_id) => Ok((transport, upstream_id)),
        Err(e) => {
            close_within(transport.as_mut(), timeout).await;
            Err(e)
        }
    }
}

async fn close_within(transport: &mut dyn FrameTransport, limit: Duration) {
    match time::timeout(limit, transport.close()).await {
        Ok(()) => debug!("transport closed"),
        Err(_) => warn!(timeout_ms = limit.as_millis() as u64, "close stalled, dropping transport"),
    }
}

async fn subscribe(
    transport: &mut dyn FrameTransport,
    request: String,
    deadline: Instant,
    ms: u64,
) -> Result<Option<u64>, StreamError> {
    transport.send_text(request).await?;

    loop {
        let frame = time::timeout_at(deadline, transport.recv())
            .await
            .map_err(|_| StreamError::Timeout { ms })?;
        let text = match frame {
            None => return Err(StreamError::Closed),
            Some(Err(e)) => return Err(e),
            Some(Ok(text)) => text,
        };

        let Ok(resp) = serde_json::from_str::<JsonRpcResponse>(&text) else {
            debug!("ignoring frame received before subscription ack");
            continue;
        };
        if !resp.answers(SUBSCRIBE_REQUEST_ID) {
            continue;
        }
        return resp
            .into_result()
            .map(|v| v.as_u64())
            .map_err(StreamError::SubscribeRejected);
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockConnector;
    use serde_json::{json, Value};

    const PROGRAM: &str = "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P";

    fn mint_frame(mint: &str) -> String {
        json!({
            "jsonrpc": "2.0",
            "method": "programNotification",
            "params": {
                "subscription": 24040,
                "result": { "value": {
                    "signature": "sig-1",
                    "transaction": {
                        "meta": { "logMessages": ["Program log: Instruction: InitializeMint2"] },
                        "transaction": { "message": { "accountKeys": [
                            { "pubkey": PROGRAM }, { "pubkey": mint }
                        ] } }
                    }
                } }
            }
        })
        .to_string()
    }

    fn connection(mock: &MockConnector) -> (StreamConnection, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let config = Arc::new(StreamConfig::for_url("wss://mock.invalid"));
        let conn = StreamConnection::new(PROGRAM, config, Arc::new(mock.clone()), rx);
        (conn, tx)
    }

    /// Acks the subscribe request, then never finishes a ping or a close.
    struct StalledTransport {
        acked: bool,
    }

    #[async_trait::async_trait]
    impl FrameTransport for StalledTransport {
        async fn send_text(&mut self, _text: String) -> Result<(), StreamError> {
            Ok(())
        }

        async fn ping(&mut self) -> Result<(), StreamError> {
            std::future::pending().await
        }

        async fn recv(&mut self) -> Option<Result<String, StreamError>> {
            if !self.acked {
                self.acked = true;
                return Some(Ok(json!({ "jsonrpc": "2.0", "id": 1, "result": 7 }).to_string()));
            }
            std::future::pending().await
        }

        async fn close(&mut self) {
            std::future::pending().await
        }
    }

    struct StalledConnector;

    #[async_trait::async_trait]
    impl Connector for StalledConnector {
        async fn connect(&self, _url: &str) -> Result<Box<dyn FrameTransport>, StreamError> {
            Ok(Box::new(StalledTransport { acked: false }))
        }
    }

    fn stalled_connection() -> (StreamConnection, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let config = Arc::new(StreamConfig::for_url("wss://stalled.invalid"));
        (StreamConnection::new(PROGRAM, config, Arc::new(StalledConnector), rx), tx)
    }

    #[tokio::test(start_paused = true)]
    async fn open_sends_confirmed_program_subscribe() {
        let mock = MockConnector::new();
        let _session = mock.open_session();
        let (mut conn, _stop) = connection(&mock);

        conn.open().await.unwrap();

        assert_eq!(conn.state(), ConnectionState::Subscribed);
        assert_eq!(conn.upstream_subscription(), Some(24040));
        let sent: Value = serde_json::from_str(&mock.sent()[0]).unwrap();
        assert_eq!(sent["method"], "programSubscribe");
        assert_eq!(sent["params"][0], PROGRAM);
        assert_eq!(sent["params"][1]["commitment"], "confirmed");
        assert_eq!(sent["params"][1]["encoding"], "jsonParsed");
    }

    #[tokio::test(start_paused = true)]
    async fn retries_connect_failures_with_fixed_delay() {
        let mock = MockConnector::new();
        mock.fail_next("refused");
        mock.fail_next("refused");
        mock.fail_next("refused");
        let session = mock.open_session();
        session.send_frame(mint_frame("MintAddrXYZ"));
        let (mut conn, _stop) = connection(&mock);

        let start = Instant::now();
        let event = conn.next_event().await.expect("event after retries");

        assert_eq!(event.mint_address, "MintAddrXYZ");
        assert_eq!(mock.attempts(), 4);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(15), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(16), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_after_peer_close_and_resumes() {
        let mock = MockConnector::new();
        let first = mock.open_session();
        let second = mock.open_session();
        first.close();
        second.send_frame(mint_frame("MintAfterReconnect"));
        let (mut conn, _stop) = connection(&mock);

        let start = Instant::now();
        let event = conn.next_event().await.unwrap();

        assert_eq!(event.mint_address, "MintAfterReconnect");
        assert_eq!(mock.attempts(), 2);
        assert_eq!(mock.closes(), 1);
        assert_eq!(mock.sent().len(), 2, "resubscribed on the new session");
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(5) && elapsed < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_takes_reconnect_path() {
        let mock = MockConnector::new();
        let first = mock.open_session();
        let second = mock.open_session();
        first.fail("connection reset");
        second.send_frame(mint_frame("MintAddrXYZ"));
        let (mut conn, _stop) = connection(&mock);

        assert!(conn.next_event().await.is_some());
        assert_eq!(mock.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_frame_keeps_connection_open() {
        let mock = MockConnector::new();
        let session = mock.open_session();
        session.send_frame("{not json");
        session.send_frame(json!({"jsonrpc":"2.0","method":"programNotification","params":{"result":{"value":{}}}}).to_string());
        session.send_frame(mint_frame("MintAddrXYZ"));
        let (mut conn, _stop) = connection(&mock);

        let event = conn.next_event().await.unwrap();

        assert_eq!(event.mint_address, "MintAddrXYZ");
        assert_eq!(mock.attempts(), 1);
        assert_eq!(conn.state(), ConnectionState::Receiving);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeout_counts_as_failure() {
        let mock = MockConnector::new();
        mock.hang_next();
        let session = mock.open_session();
        session.send_frame(mint_frame("MintAddrXYZ"));
        let (mut conn, _stop) = connection(&mock);

        let start = Instant::now();
        assert!(conn.next_event().await.is_some());
        assert_eq!(mock.attempts(), 2);
        // 10s timeout + 5s reconnect delay
        assert!(start.elapsed() >= Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_ack_times_out() {
        let mock = MockConnector::new();
        mock.disable_ack();
        let _session = mock.open_session();
        let (mut conn, _stop) = connection(&mock);

        let err = conn.open().await.unwrap_err();

        assert!(matches!(err, StreamError::Timeout { ms: 10_000 }));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(mock.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_pings_on_interval() {
        let mock = MockConnector::new();
        let _session = mock.open_session();
        let (mut conn, stop) = connection(&mock);

        let task = tokio::spawn(async move { conn.next_event().await });
        time::sleep(Duration::from_secs(95)).await;
        stop.send(true).unwrap();

        assert!(task.await.unwrap().is_none());
        assert_eq!(mock.pings(), 3);
        assert_eq!(mock.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_reconnect_wait_terminates() {
        let mock = MockConnector::new(); // every connect fails
        let (mut conn, stop) = connection(&mock);

        let task = tokio::spawn(async move { conn.next_event().await });
        time::sleep(Duration::from_secs(7)).await;
        stop.send(true).unwrap();

        assert!(task.await.unwrap().is_none());
        assert_eq!(mock.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_before_open_never_connects() {
        let mock = MockConnector::new();
        let _session = mock.open_session();
        let (mut conn, stop) = connection(&mock);
        stop.send(true).unwrap();

        assert!(conn.next_event().await.is_none());
        assert_eq!(mock.attempts(), 0);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_stop_sender_counts_as_stop() {
        let mock = MockConnector::new();
        let _session = mock.open_session();
        let (mut conn, stop) = connection(&mock);
        drop(stop);

        assert!(conn.is_stopped());
        assert!(conn.next_event().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_stalled_ping_terminates() {
        let (mut conn, stop) = stalled_connection();

        let task = tokio::spawn(async move { conn.next_event().await });
        // first heartbeat fires at 30s and never completes
        time::sleep(Duration::from_secs(31)).await;
        stop.send(true).unwrap();

        let finished = time::timeout(Duration::from_secs(60), task)
            .await
            .expect("connection should stop despite the stalled ping");
        assert!(finished.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_close_is_abandoned_after_timeout() {
        let (mut conn, stop) = stalled_connection();

        let task = tokio::spawn(async move { conn.next_event().await });
        time::sleep(Duration::from_secs(1)).await;
        let start = Instant::now();
        stop.send(true).unwrap();

        let finished = time::timeout(Duration::from_secs(60), task)
            .await
            .expect("connection should drop a transport that won't close");
        assert!(finished.unwrap().is_none());
        assert!(start.elapsed() >= Duration::from_secs(10));
        assert!(start.elapsed() < Duration::from_secs(11));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_url_is_not_retried() {
        let mock = MockConnector::new();
        mock.reject_url_next("unsupported scheme");
        let _session = mock.open_session();
        let (mut conn, _stop) = connection(&mock);

        let start = Instant::now();
        assert!(conn.next_event().await.is_none());
        assert_eq!(mock.attempts(), 1);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnections_count_lost_sessions_only() {
        let mock = MockConnector::new();
        mock.fail_next("refused");
        mock.fail_next("refused");
        let first = mock.open_session();
        let second = mock.open_session();
        first.close();
        second.send_frame(mint_frame("MintAddrXYZ"));
        let metrics = Arc::new(PipelineMetrics::new());
        let (conn, _stop) = connection(&mock);
        let mut conn = conn.with_metrics(Arc::clone(&metrics));

        assert!(conn.next_event().await.is_some());

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.connect_failures, 2);
        assert_eq!(snapshot.reconnections, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_script_signals_exhaustion() {
        let mock = MockConnector::new();
        let session = mock.open_session();
        session.close();
        let (mut conn, _stop) = connection(&mock);

        let task = tokio::spawn(async move { conn.next_event().await });
        mock.exhausted().await;

        assert_eq!(mock.attempts(), 2);
        task.abort();
    }
}
