//! Stacked notification toasts in the bottom-right corner.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use ratatui::{
    Frame,
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Paragraph},
};

use sensordeck_core::{Notification, NotificationLevel};

use crate::theme;

pub const TOAST_TTL: Duration = Duration::from_secs(4);
const MAX_VISIBLE: usize = 3;

#[derive(Debug, Default)]
pub struct ToastStack {
    toasts: VecDeque<(Notification, Instant)>,
}

impl ToastStack {
    pub fn push(&mut self, note: Notification, now: Instant) {
        self.toasts.push_back((note, now));
        while self.toasts.len() > MAX_VISIBLE {
            self.toasts.pop_front();
        }
    }

    /// Drop toasts older than [`TOAST_TTL`].
    pub fn expire(&mut self, now: Instant) {
        self.toasts
            .retain(|(_, shown)| now.saturating_duration_since(*shown) < TOAST_TTL);
    }

    pub fn clear(&mut self) {
        self.toasts.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.toasts.is_empty()
    }

    #[cfg(test)]
    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.toasts.iter().map(|(n, _)| n.message.as_str())
    }

    /// Newest toast sits lowest, just above the hint bar.
    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let mut bottom = area.y + area.height.saturating_sub(1);
        for (note, _) in self.toasts.iter().rev() {
            let height = 3u16;
            if bottom < area.y + height {
                break;
            }
            let msg_len = u16::try_from(note.message.chars().count()).unwrap_or(u16::MAX);
            let width = msg_len
                .saturating_add(6)
                .clamp(20, 60)
                .min(area.width.saturating_sub(2));
            let x = area.x + area.width.saturating_sub(width + 1);
            let toast_area = Rect::new(x, bottom - height, width, height);
            render_one(frame, toast_area, note);
            bottom -= height;
        }
    }
}

fn render_one(frame: &mut Frame, area: Rect, note: &Notification) {
    let (color, icon) = match note.level {
        NotificationLevel::Info => (theme::OK_GREEN, "✓"),
        NotificationLevel::Warning => (theme::AMBER, "!"),
        NotificationLevel::Error => (theme::ALERT_RED, "✗"),
    };

    frame.render_widget(Clear, area);
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(color))
        .style(Style::default().bg(theme::PANEL_BG));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let line = Line::from(vec![
        Span::styled(format!(" {icon} "), Style::default().fg(color)),
        Span::styled(note.message.as_str(), theme::text()),
    ]);
    frame.render_widget(Paragraph::new(line), inner);
}
