//! Scripted in-memory transport.
//!
//! Each call to [`Connector::connect`] consumes the next scripted step:
//! fail, hang, or open a session whose frames are pushed through a
//! [`SessionHandle`]. Subscribe requests are acknowledged automatically.
//! An attempt with nothing left to consume fails and marks the script
//! exhausted.
//! Used by tests and by `mintwatch replay` to run recorded frames through
//! the real pipeline without a network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, Notify};

use mintwatch_core::StreamError;

use crate::transport::{Connector, FrameTransport};

/// One item pushed into an open mock session.
#[derive(Debug, Clone)]
pub enum MockFrame {
    Text(String),
    /// Surface a transport error from `recv`.
    Error(String),
    /// Close the session as if the peer hung up.
    Close,
}

enum Step {
    Fail(String),
    Invalid(String),
    Hang,
    Open(mpsc::UnboundedReceiver<MockFrame>),
}

#[derive(Default)]
struct MockInner {
    script: Mutex<VecDeque<Step>>,
    attempts: AtomicU32,
    sent: Mutex<Vec<String>>,
    pings: AtomicU32,
    closes: AtomicU32,
    no_ack: AtomicBool,
    exhausted: AtomicBool,
    drained: Notify,
}

/// Connector that replays a script. Cheap to clone; clones share the script.
#[derive(Clone, Default)]
pub struct MockConnector {
    inner: Arc<MockInner>,
}

/// Feeds frames into one scripted session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<MockFrame>,
}

impl SessionHandle {
    /// Queue a text frame. Returns `false` once the session is gone.
    pub fn send_frame(&self, text: impl Into<String>) -> bool {
        self.tx.send(MockFrame::Text(text.into())).is_ok()
    }

    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.tx.send(MockFrame::Error(reason.into())).is_ok()
    }

    pub fn close(&self) -> bool {
        self.tx.send(MockFrame::Close).is_ok()
    }
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next connect attempt fails with `StreamError::Connect`.
    pub fn fail_next(&self, reason: impl Into<String>) {
        self.push(Step::Fail(reason.into()));
    }

    /// Next connect attempt fails with the non-retryable
    /// `StreamError::InvalidUrl`.
    pub fn reject_url_next(&self, reason: impl Into<String>) {
        self.push(Step::Invalid(reason.into()));
    }

    /// Next connect attempt never completes.
    pub fn hang_next(&self) {
        self.push(Step::Hang);
    }

    /// Next connect attempt succeeds; frames come from the returned handle.
    /// Dropping every clone of the handle closes the session.
    pub fn open_session(&self) -> SessionHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        self.push(Step::Open(rx));
        SessionHandle { tx }
    }

    /// Stop acknowledging subscribe requests (handshake will time out).
    pub fn disable_ack(&self) {
        self.inner.no_ack.store(true, Ordering::Relaxed);
    }

    /// Connect attempts made so far, successful or not.
    pub fn attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::Relaxed)
    }

    /// Every text frame written by any session, in order.
    pub fn sent(&self) -> Vec<String> {
        self.inner.sent.lock().unwrap().clone()
    }

    pub fn pings(&self) -> u32 {
        self.inner.pings.load(Ordering::Relaxed)
    }

    /// Sessions closed by their owner.
    pub fn closes(&self) -> u32 {
        self.inner.closes.load(Ordering::Relaxed)
    }

    /// Resolves once a connect attempt has found the script empty.
    pub async fn exhausted(&self) {
        loop {
            let drained = self.inner.drained.notified();
            if self.inner.exhausted.load(Ordering::Acquire) {
                return;
            }
            drained.await;
        }
    }

    fn push(&self, step: Step) {
        self.inner.script.lock().unwrap().push_back(step);
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn FrameTransport>, StreamError> {
        self.inner.attempts.fetch_add(1, Ordering::Relaxed);
        let step = self.inner.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Open(rx)) => Ok(Box::new(MockTransport {
                rx,
                pending: VecDeque::new(),
                inner: Arc::clone(&self.inner),
                closed: false,
                released: false,
            })),
            Some(Step::Fail(reason)) => Err(StreamError::Connect {
                url: url.to_string(),
                reason,
            }),
            Some(Step::Invalid(reason)) => Err(StreamError::InvalidUrl {
                url: url.to_string(),
                reason,
            }),
            Some(Step::Hang) => std::future::pending().await,
            None => {
                self.inner.exhausted.store(true, Ordering::Release);
                self.inner.drained.notify_waiters();
                Err(StreamError::Connect {
                    url: url.to_string(),
                    reason: "no scripted session".into(),
                })
            }
        }
    }
}

struct MockTransport {
    rx: mpsc::UnboundedReceiver<MockFrame>,
    /// Acks generated in reply to our own requests, delivered first.
    pending: VecDeque<String>,
    inner: Arc<MockInner>,
    closed: bool,
    released: bool,
}

#[async_trait]
impl FrameTransport for MockTransport {
    async fn send_text(&mut self, text: String) -> Result<(), StreamError> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        if !self.inner.no_ack.load(Ordering::Relaxed) {
            if let Ok(req) = serde_json::from_str::<Value>(&text) {
                if req.get("method").and_then(Value::as_str) == Some("programSubscribe") {
                    let ack = serde_json::json!({
                        "jsonrpc": "2.0",
                        "result": 24040,
                        "id": req.get("id").cloned().unwrap_or(Value::Null),
                    });
                    self.pending.push_back(ack.to_string());
                }
            }
        }
        self.inner.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn ping(&mut self) -> Result<(), StreamError> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        self.inner.pings.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, StreamError>> {
        if self.closed {
            return None;
        }
        if let Some(ack) = self.pending.pop_front() {
            return Some(Ok(ack));
        }
        match self.rx.recv().await {
            Some(MockFrame::Text(text)) => Some(Ok(text)),
            Some(MockFrame::Error(reason)) => Some(Err(StreamError::WebSocket(reason))),
            Some(MockFrame::Close) | None => {
                self.closed = true;
                None
            }
        }
    }

    async fn close(&mut self) {
        self.closed = true;
        self.rx.close();
        if !self.released {
            self.released = true;
            self.inner.closes.fetch_add(1, Ordering::Relaxed);
        }
    }
}
