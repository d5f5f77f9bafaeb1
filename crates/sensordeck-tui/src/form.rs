//! Overlay forms: "add sensor" and the device filter prompt.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Paragraph},
};

use sensordeck_core::AddForm;

use crate::theme;

/// Result of feeding one key to a form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormOutcome<T> {
    Editing,
    Cancel,
    Submit(T),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Name,
    Kind,
    DeviceId,
    Period,
}

impl Field {
    const ALL: [Self; 4] = [Self::Name, Self::Kind, Self::DeviceId, Self::Period];

    fn label(self) -> &'static str {
        match self {
            Self::Name => "  Name",
            Self::Kind => "  Type (thermometer, humidity, motion)",
            Self::DeviceId => "  Device id",
            Self::Period => "  Period (seconds)",
        }
    }
}

// ── Add sensor ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AddFormState {
    name: String,
    kind: String,
    device_id: String,
    period: String,
    active: Field,
    error: Option<String>,
}

impl Default for AddFormState {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: String::new(),
            device_id: String::new(),
            period: "1".into(),
            active: Field::Name,
            error: None,
        }
    }
}

impl AddFormState {
    pub fn form(&self) -> AddForm {
        AddForm {
            name: self.name.clone(),
            kind: self.kind.clone(),
            device_id: self.device_id.clone(),
            period_secs: self.period.clone(),
        }
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn active_input_mut(&mut self) -> &mut String {
        match self.active {
            Field::Name => &mut self.name,
            Field::Kind => &mut self.kind,
            Field::DeviceId => &mut self.device_id,
            Field::Period => &mut self.period,
        }
    }

    fn value(&self, field: Field) -> &str {
        match field {
            Field::Name => &self.name,
            Field::Kind => &self.kind,
            Field::DeviceId => &self.device_id,
            Field::Period => &self.period,
        }
    }

    fn focus(&mut self, step: isize) {
        let len = Field::ALL.len();
        let pos = Field::ALL.iter().position(|f| *f == self.active).unwrap_or(0);
        let next = (pos + len).saturating_add_signed(step) % len;
        self.active = Field::ALL[next];
    }

    /// Enter validates locally; the form stays open until it passes.
    pub fn handle_key(&mut self, key: KeyEvent) -> FormOutcome<AddForm> {
        match key.code {
            KeyCode::Esc => return FormOutcome::Cancel,
            KeyCode::Tab | KeyCode::Down => self.focus(1),
            KeyCode::BackTab | KeyCode::Up => self.focus(-1),
            KeyCode::Enter => {
                let form = self.form();
                match form.validate() {
                    Ok(_) => return FormOutcome::Submit(form),
                    Err(e) => self.error = Some(format!("check fields: {e}")),
                }
            }
            KeyCode::Backspace => {
                self.error = None;
                self.active_input_mut().pop();
            }
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.active_input_mut().clear();
            }
            KeyCode::Char(c) => {
                self.error = None;
                self.active_input_mut().push(c);
            }
            _ => {}
        }
        FormOutcome::Editing
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let inner = centered_panel(frame, area, " Add sensor ", 56, 20);

        let mut constraints = vec![Constraint::Length(4); Field::ALL.len()];
        constraints.push(Constraint::Length(1));
        constraints.push(Constraint::Min(0));
        constraints.push(Constraint::Length(1));
        let rows = Layout::vertical(constraints).split(inner);

        for (field, row) in Field::ALL.iter().zip(rows.iter()) {
            render_input_field(
                frame,
                *row,
                field.label(),
                self.value(*field),
                *field == self.active,
            );
        }
        if let (Some(err), Some(row)) = (self.error(), rows.get(Field::ALL.len())) {
            frame.render_widget(
                Paragraph::new(Span::styled(format!("  {err}"), theme::error())),
                *row,
            );
        }
        if let Some(row) = rows.last() {
            frame.render_widget(
                Paragraph::new(Span::styled(
                    "Tab next  Shift+Tab prev  Enter add  Esc cancel",
                    theme::key_hint(),
                ))
                .alignment(Alignment::Center),
                *row,
            );
        }
    }
}

// ── Filter prompt ───────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct FilterPrompt {
    input: String,
}

impl FilterPrompt {
    /// Pre-filled with the active expression.
    pub fn new(current: &str) -> Self {
        Self {
            input: current.to_owned(),
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> FormOutcome<String> {
        match key.code {
            KeyCode::Esc => return FormOutcome::Cancel,
            KeyCode::Enter => return FormOutcome::Submit(self.input.trim().to_owned()),
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.input.clear();
            }
            KeyCode::Char(c) => self.input.push(c),
            _ => {}
        }
        FormOutcome::Editing
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        let inner = centered_panel(frame, area, " Device filter ", 50, 8);
        let [field, hint] =
            Layout::vertical([Constraint::Length(4), Constraint::Length(1)]).areas(inner);
        render_input_field(frame, field, "  Ranges, e.g. 10-12,15", &self.input, true);
        frame.render_widget(
            Paragraph::new(Span::styled("Enter apply  Esc cancel", theme::key_hint()))
                .alignment(Alignment::Center),
            hint,
        );
    }
}

// ── Shared rendering ────────────────────────────────────────────────

pub fn centered_panel(frame: &mut Frame, area: Rect, title: &str, width: u16, height: u16) -> Rect {
    let panel_w = width.min(area.width.saturating_sub(4));
    let panel_h = height.min(area.height.saturating_sub(2));
    let x = (area.width.saturating_sub(panel_w)) / 2;
    let y = (area.height.saturating_sub(panel_h)) / 2;
    let panel = Rect::new(area.x + x, area.y + y, panel_w, panel_h);

    frame.render_widget(Clear, panel);
    let block = Block::default()
        .title(Line::from(Span::styled(
            title.to_owned(),
            Style::default()
                .fg(theme::AQUA)
                .add_modifier(Modifier::BOLD),
        )))
        .title_alignment(Alignment::Center)
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(theme::border_selected())
        .style(Style::default().bg(theme::PANEL_BG));

    let inner = block.inner(panel);
    frame.render_widget(block, panel);
    inner
}

fn render_input_field(frame: &mut Frame, area: Rect, label: &str, value: &str, active: bool) {
    if area.height < 3 {
        return;
    }

    let label_style = if active {
        theme::input_focused()
    } else {
        theme::text()
    };
    frame.render_widget(
        Paragraph::new(Span::styled(label.to_owned(), label_style)),
        Rect::new(area.x, area.y, area.width, 1),
    );

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(if active {
            theme::border_selected()
        } else {
            theme::border_default()
        });
    let block_area = Rect::new(area.x, area.y + 1, area.width, 3.min(area.height - 1));
    let inner = block.inner(block_area);
    frame.render_widget(block, block_area);

    let text = if active {
        format!("{value}\u{2588}")
    } else {
        value.to_owned()
    };
    frame.render_widget(
        Paragraph::new(Span::styled(text, Style::default().fg(theme::AQUA))),
        inner,
    );
}

#[cfg(test)]
mod tests {
    use crossterm::event::KeyEventKind;
    use pretty_assertions::assert_eq;

    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_str(form: &mut AddFormState, text: &str) {
        for c in text.chars() {
            form.handle_key(key(KeyCode::Char(c)));
        }
    }

    #[test]
    fn tab_moves_between_fields_and_wraps() {
        let mut form = AddFormState::default();
        type_str(&mut form, "attic");
        form.handle_key(key(KeyCode::Tab));
        type_str(&mut form, "humidity");
        form.handle_key(key(KeyCode::Tab));
        type_str(&mut form, "12");
        form.handle_key(key(KeyCode::BackTab));
        form.handle_key(key(KeyCode::BackTab));
        form.handle_key(key(KeyCode::BackTab));
        form.handle_key(key(KeyCode::Backspace));

        assert_eq!(
            form.form(),
            AddForm {
                name: "attic".into(),
                kind: "humidity".into(),
                device_id: "12".into(),
                period_secs: String::new(),
            }
        );
    }

    #[test]
    fn invalid_submit_keeps_form_open_with_error() {
        let mut form = AddFormState::default();
        type_str(&mut form, "attic");
        form.handle_key(key(KeyCode::Tab));
        type_str(&mut form, "lux");

        assert_eq!(form.handle_key(key(KeyCode::Enter)), FormOutcome::Editing);
        assert!(form.error().unwrap_or_default().starts_with("check fields"));

        form.handle_key(key(KeyCode::Backspace));
        assert_eq!(form.error(), None);
    }

    #[test]
    fn valid_submit_returns_the_raw_form() {
        let mut form = AddFormState::default();
        type_str(&mut form, "attic");
        form.handle_key(key(KeyCode::Tab));
        type_str(&mut form, "motion");
        form.handle_key(key(KeyCode::Tab));
        type_str(&mut form, "40");

        match form.handle_key(key(KeyCode::Enter)) {
            FormOutcome::Submit(f) => {
                assert_eq!(f.kind, "motion");
                assert_eq!(f.period_secs, "1");
            }
            other => panic!("expected submit, got {other:?}"),
        }
    }

    #[test]
    fn filter_prompt_edits_prefilled_value() {
        let mut prompt = FilterPrompt::new("10-12");
        let ctrl_u = KeyEvent {
            code: KeyCode::Char('u'),
            modifiers: KeyModifiers::CONTROL,
            kind: KeyEventKind::Press,
            state: crossterm::event::KeyEventState::NONE,
        };
        prompt.handle_key(ctrl_u);
        for c in " 3-5 ".chars() {
            prompt.handle_key(key(KeyCode::Char(c)));
        }
        assert_eq!(
            prompt.handle_key(key(KeyCode::Enter)),
            FormOutcome::Submit("3-5".into())
        );
        assert_eq!(prompt.handle_key(key(KeyCode::Esc)), FormOutcome::Cancel);
    }
}
