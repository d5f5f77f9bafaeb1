//! Data bridge: forwards the session's streams into the TUI action channel.

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use sensordeck_core::{Command, CommandKind, SessionController};

use crate::action::Action;

/// Forward view updates, notifications, status, state, filter changes and
/// published deletes as [`Action`]s until cancelled.
pub async fn spawn_data_bridge(
    controller: SessionController,
    action_tx: mpsc::UnboundedSender<Action>,
    cancel: CancellationToken,
) {
    let Some(mut views) = controller.take_view_updates().await else {
        warn!("view updates already claimed; data bridge not started");
        return;
    };
    let mut notifications = controller.subscribe_notifications();
    let mut status = controller.subscribe_status();
    let mut state = controller.subscribe_state();
    let mut filter = controller.subscribe_filter();
    let mut deletes = controller.bus().subscribe_filtered(&[CommandKind::Delete]);

    let _ = action_tx.send(Action::Status(*status.borrow_and_update()));
    let _ = action_tx.send(Action::State(*state.borrow_and_update()));
    let _ = action_tx.send(Action::FilterChanged(filter.borrow_and_update().clone()));

    loop {
        let action = tokio::select! {
            biased;

            () = cancel.cancelled() => break,

            update = views.recv() => match update {
                Some(update) => Action::View(update),
                None => break,
            },

            note = notifications.recv() => match note {
                Ok(note) => Action::Notify(note),
                Err(RecvError::Lagged(n)) => {
                    warn!(skipped = n, "notifications lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },

            Ok(()) = status.changed() => Action::Status(*status.borrow_and_update()),

            Ok(()) = state.changed() => Action::State(*state.borrow_and_update()),

            Ok(()) = filter.changed() => Action::FilterChanged(filter.borrow_and_update().clone()),

            Some(command) = deletes.recv() => match command {
                Command::Delete(entity_id) => Action::DeleteRequested(entity_id),
                _ => continue,
            },
        };

        if action_tx.send(action).is_err() {
            break;
        }
    }

    debug!("data bridge shut down");
}
