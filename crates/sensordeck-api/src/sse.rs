//! Server-sent event stream with auto-reconnect.
//!
//! Opens `GET {stream_url}?devices=<expr>` with `Accept: text/event-stream`
//! and translates the connection's life into a typed sequence of
//! [`StreamEvent`]s. Reconnection with exponential backoff + jitter is
//! handled here, so a consumer only ever sees repeated
//! [`StreamEvent::Opened`] / [`StreamEvent::TransportError`] pairs on one
//! logical subscription.
//!
//! # Example
//!
//! ```rust,ignore
//! use futures_util::StreamExt;
//! use sensordeck_api::sse::{ReconnectConfig, SseClient, StreamEvent};
//!
//! let client = SseClient::new("http://localhost:8080/api/stream", &transport, ReconnectConfig::default())?;
//! let mut events = client.subscribe("10-12");
//!
//! while let Some(event) = events.next().await {
//!     if let StreamEvent::Message(data) = event {
//!         println!("{data}");
//!     }
//! }
//! ```

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::{Buf, BytesMut};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

// ── Channel capacity ─────────────────────────────────────────────────

const EVENT_CHANNEL_CAPACITY: usize = 256;

// ── StreamEvent ──────────────────────────────────────────────────────

/// One transport-level occurrence on a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A connection attempt succeeded and the body is streaming.
    Opened,
    /// The `data` of one dispatched server-sent event.
    Message(String),
    /// The connection failed or dropped; a reconnect follows unless the
    /// retry budget is exhausted.
    TransportError(String),
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for stream reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum consecutive failed attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── SseClient ────────────────────────────────────────────────────────

/// Factory for event subscriptions against one stream endpoint.
#[derive(Clone)]
pub struct SseClient {
    http: reqwest::Client,
    stream_url: Url,
    reconnect: ReconnectConfig,
}

impl SseClient {
    pub fn new(
        stream_url: &str,
        transport: &TransportConfig,
        reconnect: ReconnectConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_stream_client()?;
        Self::from_reqwest(stream_url, http, reconnect)
    }

    pub fn from_reqwest(
        stream_url: &str,
        http: reqwest::Client,
        reconnect: ReconnectConfig,
    ) -> Result<Self, Error> {
        Ok(Self {
            http,
            stream_url: Url::parse(stream_url)?,
            reconnect,
        })
    }

    pub fn stream_url(&self) -> &Url {
        &self.stream_url
    }

    /// Spawn the reconnecting reader for `devices` and return its handle.
    ///
    /// Must be called from within a Tokio runtime. The background task
    /// lives until the subscription is dropped or cancelled.
    pub fn subscribe(&self, devices: &str) -> EventSubscription {
        let mut url = self.stream_url.clone();
        url.query_pairs_mut().append_pair("devices", devices);

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        tokio::spawn(sse_loop(
            self.http.clone(),
            url,
            tx,
            self.reconnect.clone(),
            cancel.clone(),
        ));

        EventSubscription {
            rx,
            cancel: cancel.clone(),
            _guard: cancel.drop_guard(),
        }
    }
}

// ── EventSubscription ────────────────────────────────────────────────

/// Receiving end of one logical subscription.
///
/// Implements [`futures_core::Stream`]. Dropping it (or calling
/// [`cancel`](Self::cancel)) tears the connection down exactly once.
pub struct EventSubscription {
    rx: mpsc::Receiver<StreamEvent>,
    cancel: CancellationToken,
    _guard: DropGuard,
}

impl EventSubscription {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl futures_core::Stream for EventSubscription {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.cancel.is_cancelled() {
            return Poll::Ready(None);
        }
        self.rx.poll_recv(cx)
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → read → on drop, report, backoff → reconnect.
async fn sse_loop(
    http: reqwest::Client,
    url: Url,
    tx: mpsc::Sender<StreamEvent>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;
    let mut state = ReadState::default();

    loop {
        state.opened = false;

        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = connect_and_read(&http, &url, &tx, &mut state) => result,
        };

        let err = match result {
            Ok(()) => {
                tracing::debug!("event stream consumer gone");
                break;
            }
            Err(e) => e,
        };

        if state.opened {
            attempt = 0;
        }
        tracing::warn!(error = %err, attempt, "event stream dropped");

        if tx
            .send(StreamEvent::TransportError(err.to_string()))
            .await
            .is_err()
        {
            break;
        }

        if let Some(max) = reconnect.max_retries {
            if attempt >= max {
                tracing::error!(max_retries = max, "event stream retry limit reached, giving up");
                break;
            }
        }

        let delay = state
            .retry
            .unwrap_or_else(|| calculate_backoff(attempt, &reconnect));
        tracing::debug!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt,
            "waiting before reconnect"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }

        attempt = attempt.saturating_add(1);
    }

    tracing::debug!(url = %url, "event stream loop exiting");
}

#[derive(Debug, Default)]
struct ReadState {
    opened: bool,
    /// Server-provided reconnect delay from the last `retry:` field.
    retry: Option<Duration>,
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Run one connection until it drops.
///
/// Returns `Ok(())` only when the receiving side has gone away; every
/// other exit, including a clean end of body, is an error to report.
async fn connect_and_read(
    http: &reqwest::Client,
    url: &Url,
    tx: &mpsc::Sender<StreamEvent>,
    state: &mut ReadState,
) -> Result<(), Error> {
    tracing::debug!(url = %url, "opening event stream");

    let resp = http
        .get(url.clone())
        .header(reqwest::header::ACCEPT, "text/event-stream")
        .header(reqwest::header::CACHE_CONTROL, "no-cache")
        .send()
        .await?;

    let status = resp.status();
    if !status.is_success() {
        return Err(Error::Stream(format!("unexpected status {status}")));
    }

    state.opened = true;
    if tx.send(StreamEvent::Opened).await.is_err() {
        return Ok(());
    }

    let mut parser = SseParser::default();
    let mut body = resp.bytes_stream();

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        for frame in parser.feed(&chunk) {
            match frame {
                SseFrame::Event { data, .. } => {
                    if tx.send(StreamEvent::Message(data)).await.is_err() {
                        return Ok(());
                    }
                }
                SseFrame::Retry(delay) => state.retry = Some(delay),
            }
        }
    }

    Err(Error::Stream("event stream ended".into()))
}

// ── Wire parsing ─────────────────────────────────────────────────────

/// A parsed unit of the `text/event-stream` format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SseFrame {
    Event { name: Option<String>, data: String },
    Retry(Duration),
}

/// Incremental `text/event-stream` parser.
///
/// Bytes arrive in arbitrary chunks; lines are only decoded once their
/// terminating newline has been seen, so multi-byte characters split
/// across chunks survive intact.
#[derive(Debug, Default)]
pub(crate) struct SseParser {
    buf: BytesMut,
    data: String,
    name: Option<String>,
    has_data: bool,
}

impl SseParser {
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let raw = self.buf.split_to(pos);
            self.buf.advance(1);
            let line = String::from_utf8_lossy(&raw);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(frame) = self.process_line(line) {
                frames.push(frame);
            }
        }

        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            // Comment, typically a keep-alive.
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
                None
            }
            "event" => {
                self.name = Some(value.to_owned());
                None
            }
            "retry" => value
                .parse::<u64>()
                .ok()
                .map(|ms| SseFrame::Retry(Duration::from_millis(ms))),
            _ => None,
        }
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let name = self.name.take();
        if !self.has_data {
            return None;
        }
        self.has_data = false;
        Some(SseFrame::Event {
            name,
            data: std::mem::take(&mut self.data),
        })
    }
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * (1 ± 0.25)`
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(20)).unwrap_or(20);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic spread seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn event(data: &str) -> SseFrame {
        SseFrame::Event {
            name: None,
            data: data.to_owned(),
        }
    }

    #[test]
    fn default_reconnect_config() {
        let config = ReconnectConfig::default();
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(30));
        assert!(config.max_retries.is_none());
    }

    #[test]
    fn backoff_increases_exponentially() {
        let config = ReconnectConfig::default();

        let d0 = calculate_backoff(0, &config);
        let d1 = calculate_backoff(1, &config);
        let d2 = calculate_backoff(2, &config);

        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_retries: None,
        };

        let d10 = calculate_backoff(10, &config);
        assert!(
            d10 <= Duration::from_secs(13),
            "delay at attempt 10 ({d10:?}) should be capped near max_delay"
        );
        assert!(calculate_backoff(u32::MAX, &config) <= Duration::from_secs(13));
    }

    #[test]
    fn parses_single_event() {
        let mut parser = SseParser::default();
        let frames = parser.feed(b"data: {\"value\":1}\n\n");
        assert_eq!(frames, vec![event("{\"value\":1}")]);
    }

    #[test]
    fn joins_multiline_data() {
        let mut parser = SseParser::default();
        let frames = parser.feed(b"data: first\ndata: second\n\n");
        assert_eq!(frames, vec![event("first\nsecond")]);
    }

    #[test]
    fn ignores_heartbeat_comments() {
        let mut parser = SseParser::default();
        assert!(parser.feed(b":ka\n\n").is_empty());
        assert!(parser.feed(b": keep-alive\r\n\r\n").is_empty());
    }

    #[test]
    fn handles_chunk_boundaries_and_crlf() {
        let mut parser = SseParser::default();
        assert!(parser.feed(b"da").is_empty());
        assert!(parser.feed(b"ta: 21.5\r").is_empty());
        let frames = parser.feed(b"\n\r\n");
        assert_eq!(frames, vec![event("21.5")]);
    }

    #[test]
    fn keeps_split_utf8_intact() {
        let bytes = "data: 21°C\n\n".as_bytes();
        let split = bytes.iter().position(|b| *b == 0xC2).unwrap() + 1;
        let mut parser = SseParser::default();
        assert!(parser.feed(&bytes[..split]).is_empty());
        assert_eq!(parser.feed(&bytes[split..]), vec![event("21°C")]);
    }

    #[test]
    fn captures_event_name_and_retry() {
        let mut parser = SseParser::default();
        let frames = parser.feed(b"retry: 2500\nevent: reading\ndata: x\n\n");
        assert_eq!(
            frames,
            vec![
                SseFrame::Retry(Duration::from_millis(2500)),
                SseFrame::Event {
                    name: Some("reading".into()),
                    data: "x".into(),
                },
            ]
        );
    }

    #[test]
    fn blank_line_without_data_dispatches_nothing() {
        let mut parser = SseParser::default();
        assert!(parser.feed(b"event: ping\n\n").is_empty());
        assert_eq!(parser.feed(b"data: y\n\n"), vec![event("y")]);
    }
}
