// ── Action bus ──
//
// One ordered command channel. User input and programmatic retries publish
// here; the session runtime and any per-card controls subscribe, each
// optionally narrowed to the command kinds it cares about.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::model::{AddForm, EntityId, SensorKind};

/// Every operation a console can request.
#[derive(Debug, Clone, PartialEq, strum::EnumDiscriminants)]
#[strum_discriminants(name(CommandKind), derive(Hash, strum::Display))]
pub enum Command {
    /// Start a session with the current filter.
    Connect,
    Disconnect,
    /// Re-fetch the registry snapshot.
    Reload,
    Add(AddForm),
    Delete(EntityId),
    Adjust { entity_id: EntityId, delta: f64 },
    /// Persist a new filter expression and restart the session with it.
    ApplyFilter(String),
    /// Show or hide one sensor kind.
    SetKindVisible { kind: SensorKind, visible: bool },
}

/// Cheaply cloneable publishing handle.
///
/// Every subscriber owns an unbounded queue, so a slow consumer delays
/// commands but never loses them.
#[derive(Debug, Clone, Default)]
pub struct ActionBus {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

#[derive(Debug)]
struct Subscriber {
    tx: mpsc::UnboundedSender<Command>,
    kinds: Option<Vec<CommandKind>>,
}

impl Subscriber {
    fn accepts(&self, command: &Command) -> bool {
        self.kinds
            .as_ref()
            .is_none_or(|kinds| kinds.contains(&CommandKind::from(command)))
    }
}

impl ActionBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a command. Returns `false` if nobody is listening.
    ///
    /// Fan-out happens under one lock, so all subscribers observe the
    /// same order even with concurrent publishers.
    pub fn publish(&self, command: Command) -> bool {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|sub| !sub.tx.is_closed());
        for sub in subscribers.iter().filter(|sub| sub.accepts(&command)) {
            let _ = sub.tx.send(command.clone());
        }
        !subscribers.is_empty()
    }

    /// Receive every command, in publish order.
    pub fn subscribe(&self) -> CommandReceiver {
        self.register(None)
    }

    /// Receive only the listed command kinds, in publish order.
    pub fn subscribe_filtered(&self, kinds: &[CommandKind]) -> CommandReceiver {
        self.register(Some(kinds.to_vec()))
    }

    fn register(&self, kinds: Option<Vec<CommandKind>>) -> CommandReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber { tx, kinds });
        CommandReceiver { rx }
    }
}

/// Receiving side of an [`ActionBus`] subscription.
pub struct CommandReceiver {
    rx: mpsc::UnboundedReceiver<Command>,
}

impl CommandReceiver {
    /// Next matching command, or `None` once every bus handle is gone.
    pub async fn recv(&mut self) -> Option<Command> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<Command> {
        self.rx.try_recv().ok()
    }
}
