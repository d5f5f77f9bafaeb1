// ── Event ingestion ──
//
// Turns the raw push transport into typed reading events. The stream is
// infinite; the only way out is `close()` or dropping it, and either path
// releases the transport exactly once.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::stream::BoxStream;
use tracing::{debug, trace};

use sensordeck_api::ReadingPayload;

use crate::backend::{EventSource, StreamEvent};
use crate::error::CoreError;
use crate::filter::IntervalSet;
use crate::model::Reading;

/// One item of an [`IngestStream`].
#[derive(Debug, Clone, PartialEq)]
pub enum IngestEvent {
    /// The transport (re)connected.
    Opened,
    Reading(Reading),
    /// A payload arrived but could not be decoded. The stream continues.
    DecodeFailed { payload: String, error: CoreError },
    /// The transport dropped and will reconnect on its own.
    TransportError(String),
}

/// Decode one JSON reading payload.
pub fn decode_reading(payload: &str) -> Result<Reading, CoreError> {
    let raw: ReadingPayload =
        serde_json::from_str(payload).map_err(|e| CoreError::DecodeFailed {
            message: e.to_string(),
        })?;
    Reading::try_from(raw)
}

/// Opens filtered event streams on an [`EventSource`].
#[derive(Clone)]
pub struct EventIngestor {
    source: Arc<dyn EventSource>,
}

impl EventIngestor {
    pub fn new(source: Arc<dyn EventSource>) -> Self {
        Self { source }
    }

    /// Subscribe to readings for the devices in `filter`.
    pub fn open(&self, filter: &IntervalSet) -> IngestStream {
        debug!(filter = %filter, "opening event stream");
        IngestStream {
            inner: Some(self.source.open(filter)),
        }
    }
}

/// Typed, cancellable view over a transport stream.
pub struct IngestStream {
    inner: Option<BoxStream<'static, StreamEvent>>,
}

impl IngestStream {
    /// Release the transport. Later calls are no-ops.
    pub fn close(&mut self) {
        if self.inner.take().is_some() {
            debug!("event stream closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

impl Drop for IngestStream {
    fn drop(&mut self) {
        self.close();
    }
}

impl Stream for IngestStream {
    type Item = IngestEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let Some(inner) = self.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match inner.as_mut().poll_next(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(None) => {
                self.close();
                Poll::Ready(None)
            }
            Poll::Ready(Some(StreamEvent::Opened)) => Poll::Ready(Some(IngestEvent::Opened)),
            Poll::Ready(Some(StreamEvent::TransportError(reason))) => {
                Poll::Ready(Some(IngestEvent::TransportError(reason)))
            }
            Poll::Ready(Some(StreamEvent::Message(payload))) => {
                let event = match decode_reading(&payload) {
                    Ok(reading) => {
                        trace!(entity_id = %reading.entity_id, value = reading.value, "reading");
                        IngestEvent::Reading(reading)
                    }
                    Err(error) => IngestEvent::DecodeFailed { payload, error },
                };
                Poll::Ready(Some(event))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use futures_util::StreamExt;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::SensorKind;

    /// Yields scripted events, then stays pending. Counts drops.
    struct Scripted {
        events: std::vec::IntoIter<StreamEvent>,
        drops: Arc<AtomicUsize>,
    }

    impl Stream for Scripted {
        type Item = StreamEvent;

        fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<StreamEvent>> {
            match self.events.next() {
                Some(event) => Poll::Ready(Some(event)),
                None => Poll::Pending,
            }
        }
    }

    impl Drop for Scripted {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakeSource {
        script: Mutex<Vec<StreamEvent>>,
        drops: Arc<AtomicUsize>,
        opened_with: Mutex<Vec<String>>,
    }

    impl EventSource for FakeSource {
        fn open(&self, filter: &IntervalSet) -> BoxStream<'static, StreamEvent> {
            self.opened_with.lock().unwrap().push(filter.to_string());
            let events = std::mem::take(&mut *self.script.lock().unwrap());
            Box::pin(Scripted {
                events: events.into_iter(),
                drops: Arc::clone(&self.drops),
            })
        }
    }

    fn source(script: Vec<StreamEvent>) -> Arc<FakeSource> {
        Arc::new(FakeSource {
            script: Mutex::new(script),
            drops: Arc::new(AtomicUsize::new(0)),
            opened_with: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn maps_transport_events() {
        let fake = source(vec![
            StreamEvent::Opened,
            StreamEvent::Message(
                r#"{"sensorId":"s1","deviceId":"11","type":"HUMIDITY","ts":"2026-10-19T12:00:00Z","value":"55.5"}"#
                    .into(),
            ),
            StreamEvent::Message("not json".into()),
            StreamEvent::TransportError("reset".into()),
        ]);
        let ingestor = EventIngestor::new(fake.clone());
        let mut stream = ingestor.open(&IntervalSet::parse("10-12"));

        assert_eq!(stream.next().await, Some(IngestEvent::Opened));
        match stream.next().await {
            Some(IngestEvent::Reading(reading)) => {
                assert_eq!(reading.kind, SensorKind::Humidity);
                assert!((reading.value - 55.5).abs() < f64::EPSILON);
            }
            other => panic!("expected reading, got {other:?}"),
        }
        assert!(matches!(
            stream.next().await,
            Some(IngestEvent::DecodeFailed { ref payload, .. }) if payload == "not json"
        ));
        assert_eq!(
            stream.next().await,
            Some(IngestEvent::TransportError("reset".into()))
        );
        assert_eq!(*fake.opened_with.lock().unwrap(), vec!["10-12".to_string()]);
    }

    #[test]
    fn teardown_runs_once() {
        let fake = source(Vec::new());
        let ingestor = EventIngestor::new(fake.clone());

        let mut stream = ingestor.open(&IntervalSet::parse("1"));
        stream.close();
        stream.close();
        assert!(stream.is_closed());
        drop(stream);
        assert_eq!(fake.drops.load(Ordering::SeqCst), 1);

        let stream = ingestor.open(&IntervalSet::parse("1"));
        drop(stream);
        assert_eq!(fake.drops.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn closed_stream_ends() {
        let fake = source(vec![StreamEvent::Opened]);
        let mut stream = EventIngestor::new(fake).open(&IntervalSet::parse("1"));
        stream.close();
        assert_eq!(stream.next().await, None);
    }

    #[test]
    fn quiet_transport_stays_pending() {
        let fake = source(Vec::new());
        let mut stream = EventIngestor::new(fake).open(&IntervalSet::parse("1"));
        let mut next = tokio_test::task::spawn(stream.next());
        tokio_test::assert_pending!(next.poll());
    }

    #[test]
    fn decode_rejects_missing_fields() {
        assert!(decode_reading(r#"{"sensorId":"s1"}"#).is_err());
        let ok = decode_reading(
            r#"{"sensorId":"s1","deviceId":"3","type":"MOTION","ts":1760875200,"value":true}"#,
        )
        .unwrap();
        assert!((ok.value - 1.0).abs() < f64::EPSILON);
    }
}
