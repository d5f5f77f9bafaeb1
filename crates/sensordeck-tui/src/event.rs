//! Terminal input plus housekeeping and frame ticks, merged into one
//! channel by a background task.

use std::time::Duration;

use crossterm::event::{Event as TermEvent, EventStream, KeyEvent, KeyEventKind};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug)]
pub enum Event {
    Key(KeyEvent),
    Resize(u16, u16),
    /// Toast expiry and throbber frames.
    Tick,
    Render,
}

/// Spawn the pump; it stops when `cancel` fires or the receiver drops.
pub fn spawn(
    tick_rate: Duration,
    frame_rate: Duration,
    cancel: CancellationToken,
) -> mpsc::UnboundedReceiver<Event> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(pump(tx, tick_rate, frame_rate, cancel));
    rx
}

async fn pump(
    tx: mpsc::UnboundedSender<Event>,
    tick_rate: Duration,
    frame_rate: Duration,
    cancel: CancellationToken,
) {
    let mut input = EventStream::new();
    let mut housekeeping = interval(tick_rate);
    let mut frames = interval(frame_rate);
    housekeeping.set_missed_tick_behavior(MissedTickBehavior::Skip);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => return,
            _ = housekeeping.tick() => Event::Tick,
            _ = frames.tick() => Event::Render,
            raw = input.next() => match raw {
                Some(Ok(TermEvent::Key(key))) if key.kind == KeyEventKind::Press => Event::Key(key),
                Some(Ok(TermEvent::Resize(w, h))) => Event::Resize(w, h),
                Some(Ok(_)) => continue,
                Some(Err(err)) => {
                    warn!(error = %err, "terminal input error");
                    continue;
                }
                None => return,
            },
        };

        if tx.send(event).is_err() {
            return;
        }
    }
}
