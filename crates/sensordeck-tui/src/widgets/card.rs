//! One sensor card: chart, bias line and a tail of its log.
//!
//! ```text
//! ╭ kitchen · THERMOMETER · dev 11 ──────────╮
//! │ ⣀⡠⠤⠒⠉⠉⠒⠤⣀          (braille line)         │
//! │ bias: 0.50                               │
//! │ [THERMOMETER] 22.4°C @ 2026-…            │
//! ╰──────────────────────────────────────────╯
//! ```

use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Modifier, Style},
    symbols::Marker,
    text::{Line, Span},
    widgets::{Axis, Block, BorderType, Borders, Chart, Dataset, GraphType, Paragraph},
};

use sensordeck_core::{CardLog, Entity, EntityId, SensorKind, SeriesPoint};

use crate::theme;

/// Fixed y range per kind.
pub fn y_bounds(kind: SensorKind) -> [f64; 2] {
    match kind {
        SensorKind::Thermometer => [15.0, 35.0],
        SensorKind::Humidity => [50.0, 70.0],
        SensorKind::Motion => [0.0, 1.2],
    }
}

#[derive(Debug, Clone)]
pub struct Card {
    pub entity_id: EntityId,
    pub kind: SensorKind,
    pub device_id: String,
    pub name: String,
    pub bias: Option<f64>,
    /// `false` while an adjust is waiting on the registry.
    pub bias_confirmed: bool,
    pub deleting: bool,
    /// `(seconds relative to newest point, value)`; x is always <= 0.
    pub points: Vec<(f64, f64)>,
    pub log: CardLog,
}

impl Card {
    pub fn new(
        entity_id: EntityId,
        kind: SensorKind,
        device_id: String,
        name: String,
        max_log_lines: usize,
    ) -> Self {
        Self {
            entity_id,
            kind,
            device_id,
            name,
            bias: None,
            bias_confirmed: true,
            deleting: false,
            points: Vec::new(),
            log: CardLog::new(max_log_lines),
        }
    }

    #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
    pub fn set_points(&mut self, points: &[SeriesPoint]) {
        let Some(newest) = points.last().map(|p| p.t) else {
            self.points.clear();
            return;
        };
        self.points = points
            .iter()
            .map(|p| ((p.t - newest).num_milliseconds() as f64 / 1000.0, p.v))
            .collect();
    }

    /// Refresh metadata from the registry.
    pub fn apply_meta(&mut self, entity: &Entity) {
        self.name.clone_from(&entity.name);
        self.device_id.clone_from(&entity.device_id);
        if entity.bias.is_some() {
            self.bias = entity.bias;
            self.bias_confirmed = true;
        }
    }

    pub fn title(&self) -> String {
        let name = if self.name.is_empty() {
            self.entity_id.as_str()
        } else {
            &self.name
        };
        format!(" {name} · {} · dev {} ", self.kind, self.device_id)
    }

    pub fn bias_line(&self) -> String {
        match (self.bias, self.bias_confirmed) {
            (None, _) => "bias: -".into(),
            (Some(b), true) => format!("bias: {b:.2}"),
            (Some(b), false) => format!("bias: {b:.2} (pending)"),
        }
    }
}

pub fn render_card(frame: &mut Frame, area: Rect, card: &Card, selected: bool, window_secs: f64) {
    let mut title = vec![Span::styled(card.title(), theme::title_style())];
    if card.deleting {
        title.push(Span::styled(" deleting… ", theme::error()));
    }

    let block = Block::default()
        .title(Line::from(title))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(if selected {
            theme::border_selected()
        } else {
            theme::border_default()
        });
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let [chart_area, bias_area, log_area] = Layout::vertical([
        Constraint::Min(3),
        Constraint::Length(1),
        Constraint::Length(3),
    ])
    .areas(inner);

    render_chart(frame, chart_area, card, window_secs);

    let bias_style = if card.bias_confirmed {
        theme::text()
    } else {
        theme::text().add_modifier(Modifier::ITALIC)
    };
    frame.render_widget(Paragraph::new(card.bias_line()).style(bias_style), bias_area);

    let height = usize::from(log_area.height);
    let skip = card.log.len().saturating_sub(height);
    let lines: Vec<Line> = card
        .log
        .lines()
        .skip(skip)
        .map(|l| Line::from(Span::styled(l.to_owned(), theme::muted())))
        .collect();
    frame.render_widget(Paragraph::new(lines), log_area);
}

fn render_chart(frame: &mut Frame, area: Rect, card: &Card, window_secs: f64) {
    let color = theme::kind_color(card.kind);
    let (graph, marker) = match card.kind {
        SensorKind::Motion => (GraphType::Bar, Marker::HalfBlock),
        SensorKind::Thermometer | SensorKind::Humidity => (GraphType::Line, Marker::Braille),
    };

    let dataset = Dataset::default()
        .marker(marker)
        .graph_type(graph)
        .style(Style::default().fg(color))
        .data(&card.points);

    let [y_min, y_max] = y_bounds(card.kind);
    let chart = Chart::new(vec![dataset])
        .x_axis(
            Axis::default()
                .style(theme::muted())
                .bounds([-window_secs, 0.0]),
        )
        .y_axis(
            Axis::default()
                .style(theme::muted())
                .bounds([y_min, y_max])
                .labels([format!("{y_min:.0}"), format!("{y_max:.0}")]),
        );
    frame.render_widget(chart, area);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use ratatui::{Terminal, backend::TestBackend};

    use super::*;

    fn card() -> Card {
        Card::new(
            EntityId::from("s1"),
            SensorKind::Thermometer,
            "11".into(),
            "kitchen".into(),
            10,
        )
    }

    #[test]
    fn points_are_relative_to_the_newest() {
        let mut card = card();
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        card.set_points(&[
            SeriesPoint { t: t0, v: 20.0 },
            SeriesPoint {
                t: t0 + chrono::Duration::milliseconds(1500),
                v: 21.0,
            },
        ]);
        assert_eq!(card.points, vec![(-1.5, 20.0), (0.0, 21.0)]);
    }

    #[test]
    fn bias_line_marks_unconfirmed_values() {
        let mut card = card();
        assert_eq!(card.bias_line(), "bias: -");
        card.bias = Some(0.5);
        card.bias_confirmed = false;
        assert_eq!(card.bias_line(), "bias: 0.50 (pending)");
    }

    #[test]
    fn renders_title_bias_and_latest_log_line() {
        let mut card = card();
        card.bias = Some(1.25);
        card.deleting = true;
        card.log.push("[open] sensor card created".into());
        card.log.push("[THERMOMETER] 22.4°C @ 2026-01-01T00:00:00.000Z".into());

        let mut terminal = Terminal::new(TestBackend::new(64, 12)).unwrap();
        terminal
            .draw(|frame| render_card(frame, frame.area(), &card, true, 60.0))
            .unwrap();

        let buffer = terminal.backend().buffer();
        let text: String = buffer.content().iter().map(|c| c.symbol()).collect();
        assert!(text.contains("kitchen · THERMOMETER · dev 11"));
        assert!(text.contains("deleting"));
        assert!(text.contains("bias: 1.25"));
        assert!(text.contains("[THERMOMETER] 22.4°C"));
    }
}
