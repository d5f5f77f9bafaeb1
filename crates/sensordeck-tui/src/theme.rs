//! Palette and semantic styles.

use ratatui::style::{Color, Modifier, Style};

use sensordeck_core::SensorKind;

// ── Palette ───────────────────────────────────────────────────────────

pub const VIOLET: Color = Color::Rgb(189, 147, 249); // #bd93f9
pub const AQUA: Color = Color::Rgb(128, 255, 234); // #80ffea
pub const ROSE: Color = Color::Rgb(255, 106, 193); // #ff6ac1
pub const AMBER: Color = Color::Rgb(241, 250, 140); // #f1fa8c
pub const OK_GREEN: Color = Color::Rgb(80, 250, 123); // #50fa7b
pub const ALERT_RED: Color = Color::Rgb(255, 99, 99); // #ff6363

pub const TEXT: Color = Color::Rgb(189, 193, 207); // #bdc1cf
pub const MUTED: Color = Color::Rgb(98, 114, 164); // #6272a4
pub const PANEL_BG: Color = Color::Rgb(30, 31, 41); // #1e1f29

/// Series color per sensor kind.
pub fn kind_color(kind: SensorKind) -> Color {
    match kind {
        SensorKind::Thermometer => ROSE,
        SensorKind::Humidity => AQUA,
        SensorKind::Motion => AMBER,
    }
}

// ── Semantic styles ───────────────────────────────────────────────────

pub fn title_style() -> Style {
    Style::default().fg(AQUA).add_modifier(Modifier::BOLD)
}

pub fn border_selected() -> Style {
    Style::default().fg(VIOLET)
}

pub fn border_default() -> Style {
    Style::default().fg(MUTED)
}

pub fn text() -> Style {
    Style::default().fg(TEXT)
}

pub fn muted() -> Style {
    Style::default().fg(MUTED)
}

/// Key hint text (e.g. "q quit  ? help").
pub fn key_hint() -> Style {
    Style::default().fg(MUTED)
}

pub fn key_hint_key() -> Style {
    Style::default().fg(AQUA).add_modifier(Modifier::BOLD)
}

pub fn input_focused() -> Style {
    Style::default().fg(VIOLET).add_modifier(Modifier::BOLD)
}

pub fn error() -> Style {
    Style::default().fg(ALERT_RED).add_modifier(Modifier::BOLD)
}
