//! Connection status dot: ●/◐/○ with color mapping.

use ratatui::style::Style;
use ratatui::text::Span;

use sensordeck_core::ConnectionStatus;

use crate::theme;

pub fn status_span(status: ConnectionStatus) -> Span<'static> {
    let (symbol, color) = match status {
        ConnectionStatus::Online => ("●", theme::OK_GREEN),
        ConnectionStatus::Connecting | ConnectionStatus::Reconnecting => ("◐", theme::AMBER),
        ConnectionStatus::Offline => ("○", theme::ALERT_RED),
    };
    Span::styled(format!("{symbol} {status}"), Style::default().fg(color))
}

/// Whether the throbber should spin next to the indicator.
pub fn is_pending(status: ConnectionStatus) -> bool {
    matches!(
        status,
        ConnectionStatus::Connecting | ConnectionStatus::Reconnecting
    )
}
