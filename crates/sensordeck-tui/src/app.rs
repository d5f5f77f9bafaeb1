//! Application core: event loop, card state, action dispatch.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use color_eyre::eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use indexmap::IndexMap;
use ratatui::{
    DefaultTerminal, Frame,
    layout::{Alignment, Constraint, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::Paragraph,
};
use strum::IntoEnumIterator;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use sensordeck_core::{
    ConnectionStatus, EntityId, Notification, NotificationKind, SensorKind, SessionController,
    SessionState, ViewUpdate,
};

use crate::action::{Action, Direction};
use crate::event::{self, Event};
use crate::form::{AddFormState, FilterPrompt, FormOutcome, centered_panel};
use crate::theme;
use crate::widgets::card::{Card, render_card};
use crate::widgets::status_indicator::{is_pending, status_span};
use crate::widgets::toast::ToastStack;

const CARD_MIN_WIDTH: u16 = 44;
const CARD_HEIGHT: u16 = 14;

/// Display settings taken from the config file.
#[derive(Debug, Clone, Copy)]
pub struct AppSettings {
    pub adjust_step: f64,
    pub window_secs: f64,
    pub max_log_lines: usize,
    pub frame_interval: Duration,
}

#[derive(Debug)]
enum Overlay {
    None,
    Help,
    AddForm(AddFormState),
    Filter(FilterPrompt),
}

pub struct App {
    controller: SessionController,
    settings: AppSettings,
    /// Cards in creation order, including hidden ones.
    cards: IndexMap<EntityId, Card>,
    /// Index into the visible cards.
    selected: usize,
    hidden: BTreeSet<SensorKind>,
    status: ConnectionStatus,
    state: SessionState,
    filter: String,
    toasts: ToastStack,
    overlay: Overlay,
    throbber: throbber_widgets_tui::ThrobberState,
    running: bool,
    terminal_size: (u16, u16),
    action_tx: mpsc::UnboundedSender<Action>,
    action_rx: mpsc::UnboundedReceiver<Action>,
    data_cancel: CancellationToken,
}

impl App {
    pub fn new(controller: SessionController, settings: AppSettings) -> Self {
        let (action_tx, action_rx) = mpsc::unbounded_channel();
        Self {
            controller,
            settings,
            cards: IndexMap::new(),
            selected: 0,
            hidden: BTreeSet::new(),
            status: ConnectionStatus::Offline,
            state: SessionState::Idle,
            filter: String::new(),
            toasts: ToastStack::default(),
            overlay: Overlay::None,
            throbber: throbber_widgets_tui::ThrobberState::default(),
            running: true,
            terminal_size: (80, 24),
            action_tx,
            action_rx,
            data_cancel: CancellationToken::new(),
        }
    }

    /// Run until the user quits. Connects on startup.
    pub async fn run(&mut self, terminal: &mut DefaultTerminal) -> Result<()> {
        let size = terminal.size()?;
        self.terminal_size = (size.width, size.height);

        let controller = self.controller.clone();
        let cancel = self.data_cancel.clone();
        let tx = self.action_tx.clone();
        tokio::spawn(async move {
            crate::data_bridge::spawn_data_bridge(controller, tx, cancel).await;
        });
        self.controller.connect();

        let mut events = event::spawn(
            Duration::from_millis(250),
            self.settings.frame_interval,
            self.data_cancel.child_token(),
        );

        info!("TUI event loop started");

        while self.running {
            let Some(event) = events.recv().await else {
                break;
            };

            let action = match event {
                Event::Key(key) => self.handle_key_event(key),
                Event::Resize(w, h) => Some(Action::Resize(w, h)),
                Event::Tick => Some(Action::Tick),
                Event::Render => Some(Action::Render),
            };
            if let Some(action) = action {
                self.action_tx.send(action)?;
            }

            while let Ok(action) = self.action_rx.try_recv() {
                let render = matches!(action, Action::Render);
                self.process_action(action);
                if render {
                    terminal.draw(|frame| self.render(frame))?;
                }
            }
        }

        self.data_cancel.cancel();
        info!("TUI event loop ended");
        Ok(())
    }

    // ── Input ────────────────────────────────────────────────────────

    fn handle_key_event(&mut self, key: KeyEvent) -> Option<Action> {
        if key.modifiers == KeyModifiers::CONTROL && key.code == KeyCode::Char('c') {
            return Some(Action::Quit);
        }

        match &mut self.overlay {
            Overlay::AddForm(form) => {
                return match form.handle_key(key) {
                    FormOutcome::Editing => None,
                    FormOutcome::Cancel => Some(Action::CloseOverlay),
                    FormOutcome::Submit(form) => {
                        self.controller.add(form);
                        Some(Action::CloseOverlay)
                    }
                };
            }
            Overlay::Filter(prompt) => {
                return match prompt.handle_key(key) {
                    FormOutcome::Editing => None,
                    FormOutcome::Cancel => Some(Action::CloseOverlay),
                    FormOutcome::Submit(expr) => {
                        self.controller.apply_filter(expr);
                        Some(Action::CloseOverlay)
                    }
                };
            }
            Overlay::Help => {
                return match key.code {
                    KeyCode::Esc | KeyCode::Char('?') => Some(Action::ToggleHelp),
                    KeyCode::Char('q') => Some(Action::Quit),
                    _ => None,
                };
            }
            Overlay::None => {}
        }

        let step = self.settings.adjust_step;
        match key.code {
            KeyCode::Char('q') => Some(Action::Quit),
            KeyCode::Char('?') => Some(Action::ToggleHelp),
            KeyCode::Char('c') => Some(Action::Connect),
            KeyCode::Char('x') => Some(Action::Disconnect),
            KeyCode::Char('r') => Some(Action::Reload),
            KeyCode::Char('a') => Some(Action::OpenAddForm),
            KeyCode::Char('f' | '/') => Some(Action::OpenFilterPrompt),
            KeyCode::Char(c @ '1'..='9') => {
                let n = c.to_digit(10).and_then(|d| usize::try_from(d).ok())?;
                SensorKind::iter().nth(n - 1).map(Action::ToggleKind)
            }
            KeyCode::Char('+' | '=') => Some(Action::AdjustSelected(step)),
            KeyCode::Char('-' | '_') => Some(Action::AdjustSelected(-step)),
            KeyCode::Char('d') | KeyCode::Delete => Some(Action::DeleteSelected),
            KeyCode::Left | KeyCode::Char('h') => Some(Action::Select(Direction::Left)),
            KeyCode::Right | KeyCode::Char('l') => Some(Action::Select(Direction::Right)),
            KeyCode::Up | KeyCode::Char('k') => Some(Action::Select(Direction::Up)),
            KeyCode::Down | KeyCode::Char('j') => Some(Action::Select(Direction::Down)),
            KeyCode::Esc => Some(Action::DismissToasts),
            _ => None,
        }
    }

    // ── Actions ──────────────────────────────────────────────────────

    fn process_action(&mut self, action: Action) {
        match action {
            Action::Quit => self.running = false,
            Action::Tick => {
                self.toasts.expire(Instant::now());
                if is_pending(self.status) {
                    self.throbber.calc_next();
                }
            }
            Action::Render => {}
            Action::Resize(w, h) => self.terminal_size = (w, h),

            Action::View(update) => self.apply_view(update),
            Action::Notify(note) => self.apply_notification(note),
            Action::Status(status) => self.status = status,
            Action::State(state) => self.state = state,
            Action::FilterChanged(filter) => self.filter = filter,
            Action::DeleteRequested(entity_id) => {
                if let Some(card) = self.cards.get_mut(&entity_id) {
                    card.deleting = true;
                }
            }

            Action::Connect => self.controller.connect(),
            Action::Disconnect => self.controller.disconnect(),
            Action::Reload => self.controller.reload(),
            Action::AdjustSelected(delta) => {
                if let Some(id) = self.selected_id() {
                    self.controller.adjust(id, delta);
                }
            }
            Action::DeleteSelected => {
                if let Some(id) = self.selected_id() {
                    self.controller.delete(id);
                }
            }
            Action::ToggleKind(kind) => {
                let visible = self.hidden.contains(&kind);
                self.controller.set_kind_visible(kind, visible);
            }

            Action::Select(direction) => self.move_selection(direction),

            Action::ToggleHelp => {
                self.overlay = match self.overlay {
                    Overlay::Help => Overlay::None,
                    _ => Overlay::Help,
                };
            }
            Action::OpenAddForm => self.overlay = Overlay::AddForm(AddFormState::default()),
            Action::OpenFilterPrompt => self.overlay = Overlay::Filter(FilterPrompt::new(&self.filter)),
            Action::CloseOverlay => self.overlay = Overlay::None,
            Action::DismissToasts => self.toasts.clear(),
        }
    }

    fn apply_view(&mut self, update: ViewUpdate) {
        match update {
            ViewUpdate::CardCreated {
                entity_id,
                kind,
                device_id,
                name,
            } => {
                let max = self.settings.max_log_lines;
                self.cards
                    .entry(entity_id.clone())
                    .or_insert_with(|| Card::new(entity_id, kind, device_id, name, max));
            }
            ViewUpdate::CardMeta { entity } => {
                if let Some(card) = self.cards.get_mut(&entity.id) {
                    card.apply_meta(&entity);
                }
            }
            ViewUpdate::Redraw {
                entity_id, points, ..
            } => {
                if let Some(card) = self.cards.get_mut(&entity_id) {
                    card.set_points(&points);
                }
            }
            ViewUpdate::Log { entity_id, line } => {
                if let Some(card) = self.cards.get_mut(&entity_id) {
                    card.log.push(line);
                }
            }
            ViewUpdate::Bias {
                entity_id,
                bias,
                confirmed,
            } => {
                if let Some(card) = self.cards.get_mut(&entity_id) {
                    card.bias = Some(bias);
                    card.bias_confirmed = confirmed;
                }
            }
            ViewUpdate::CardRemoved { entity_id } => {
                self.cards.shift_remove(&entity_id);
            }
            ViewUpdate::KindFilter { kind, visible } => {
                if visible {
                    self.hidden.remove(&kind);
                } else {
                    self.hidden.insert(kind);
                }
            }
            ViewUpdate::Cleared => {
                self.cards.clear();
                self.selected = 0;
            }
        }
        self.clamp_selection();
    }

    fn apply_notification(&mut self, note: Notification) {
        if note.kind == NotificationKind::DeleteFailed {
            if let Some(card) = note.entity_id.as_ref().and_then(|id| self.cards.get_mut(id)) {
                card.deleting = false;
            }
        }
        debug!(kind = ?note.kind, "{}", note.message);
        self.toasts.push(note, Instant::now());
    }

    // ── Selection ────────────────────────────────────────────────────

    fn visible_cards(&self) -> Vec<&Card> {
        self.cards
            .values()
            .filter(|c| !self.hidden.contains(&c.kind))
            .collect()
    }

    fn selected_id(&self) -> Option<EntityId> {
        self.visible_cards()
            .get(self.selected)
            .map(|c| c.entity_id.clone())
    }

    fn columns(&self) -> usize {
        columns_for(self.terminal_size.0)
    }

    fn move_selection(&mut self, direction: Direction) {
        let count = self.visible_cards().len();
        if count == 0 {
            return;
        }
        let cols = self.columns();
        self.selected = match direction {
            Direction::Left => self.selected.saturating_sub(1),
            Direction::Right => self.selected + 1,
            Direction::Up => self.selected.saturating_sub(cols),
            Direction::Down if self.selected + cols < count => self.selected + cols,
            Direction::Down => self.selected,
        };
        self.clamp_selection();
    }

    fn clamp_selection(&mut self) {
        let count = self.visible_cards().len();
        self.selected = self.selected.min(count.saturating_sub(1));
    }

    // ── Rendering ────────────────────────────────────────────────────

    fn render(&self, frame: &mut Frame) {
        let area = frame.area();
        let [header, content, hints] = Layout::vertical([
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(1),
        ])
        .areas(area);

        self.render_header(frame, header);
        self.render_grid(frame, content);
        render_hints(frame, hints);

        if !self.toasts.is_empty() {
            self.toasts.render(frame, content);
        }

        match &self.overlay {
            Overlay::None => {}
            Overlay::Help => render_help(frame, area),
            Overlay::AddForm(form) => form.render(frame, area),
            Overlay::Filter(prompt) => prompt.render(frame, area),
        }
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let mut spans = vec![
            Span::styled(" SensorDeck ", theme::title_style()),
            Span::raw(" "),
            status_span(self.status),
        ];
        let throbber_area = if is_pending(self.status) {
            spans.push(Span::raw("   "));
            let offset: u16 = spans
                .iter()
                .map(|s| u16::try_from(s.width()).unwrap_or(0))
                .sum();
            Some(Rect::new(area.x + offset.saturating_sub(2), area.y, 1, 1))
        } else {
            None
        };

        let filter = if self.filter.is_empty() {
            "all".to_owned()
        } else {
            self.filter.clone()
        };
        spans.push(Span::styled("  filter: ", theme::muted()));
        spans.push(Span::styled(filter, theme::text()));

        if !self.hidden.is_empty() {
            let hidden: Vec<String> = self.hidden.iter().map(ToString::to_string).collect();
            spans.push(Span::styled("  hidden: ", theme::muted()));
            spans.push(Span::styled(hidden.join(", "), Style::default().fg(theme::AMBER)));
        }

        frame.render_widget(Paragraph::new(Line::from(spans)), area);

        if let Some(rect) = throbber_area.filter(|r| r.right() <= area.right()) {
            let throbber = throbber_widgets_tui::Throbber::default()
                .throbber_style(Style::default().fg(theme::VIOLET));
            frame.render_stateful_widget(throbber, rect, &mut self.throbber.clone());
        }
    }

    fn render_grid(&self, frame: &mut Frame, area: Rect) {
        let visible = self.visible_cards();
        if visible.is_empty() {
            let message = match self.state {
                SessionState::Idle => "Not connected. Press c to connect.",
                SessionState::Connecting => "Loading sensors…",
                _ => "No sensors to show. Press a to add one, f to change the filter.",
            };
            let [_, middle, _] = Layout::vertical([
                Constraint::Fill(1),
                Constraint::Length(1),
                Constraint::Fill(1),
            ])
            .areas(area);
            frame.render_widget(
                Paragraph::new(Span::styled(message, theme::muted())).alignment(Alignment::Center),
                middle,
            );
            return;
        }

        let cols = columns_for(area.width);
        let rows_fit = usize::from((area.height / CARD_HEIGHT).max(1));
        let first_row = (self.selected / cols).saturating_sub(rows_fit - 1);
        let ratio = u32::try_from(cols).unwrap_or(1);
        let column_constraints = vec![Constraint::Ratio(1, ratio); cols];

        let mut y = area.y;
        for (row, chunk) in visible.chunks(cols).enumerate().skip(first_row).take(rows_fit) {
            let height = CARD_HEIGHT.min(area.bottom().saturating_sub(y));
            if height == 0 {
                break;
            }
            let row_area = Rect::new(area.x, y, area.width, height);
            let cells = Layout::horizontal(column_constraints.clone()).split(row_area);
            for (col, (card, cell)) in chunk.iter().zip(cells.iter()).enumerate() {
                let selected = row * cols + col == self.selected;
                render_card(frame, *cell, card, selected, self.settings.window_secs);
            }
            y += height;
        }
    }
}

fn columns_for(width: u16) -> usize {
    usize::from((width / CARD_MIN_WIDTH).max(1))
}

fn render_hints(frame: &mut Frame, area: Rect) {
    let pairs = [
        ("c", "connect"),
        ("x", "disconnect"),
        ("r", "reload"),
        ("a", "add"),
        ("f", "filter"),
        ("1-3", "kinds"),
        ("+/-", "bias"),
        ("d", "delete"),
        ("?", "help"),
        ("q", "quit"),
    ];
    let mut spans = vec![Span::raw(" ")];
    for (key, label) in pairs {
        spans.push(Span::styled(key, theme::key_hint_key()));
        spans.push(Span::styled(format!(" {label}  "), theme::key_hint()));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_help(frame: &mut Frame, area: Rect) {
    let inner = centered_panel(frame, area, " Keyboard Shortcuts ", 54, 20);

    let row = |key: &'static str, label: &'static str| {
        Line::from(vec![
            Span::styled(format!("  {key:<10}"), theme::key_hint_key()),
            Span::styled(label, theme::key_hint()),
        ])
    };
    let section = |title: &'static str| {
        Line::from(Span::styled(format!("  {title}"), Style::default().fg(theme::AQUA)))
    };

    let mut lines = vec![
        section("Session"),
        row("c", "Connect"),
        row("x", "Disconnect"),
        row("r", "Reload sensor metadata"),
        row("f /", "Change device filter"),
        Line::from(""),
        section("Sensors"),
        row("←↓↑→ hjkl", "Select card"),
        row("+ / -", "Adjust bias of selected"),
        row("d", "Delete selected"),
        row("a", "Add a sensor"),
    ];
    for (i, kind) in SensorKind::iter().enumerate() {
        lines.push(Line::from(vec![
            Span::styled(format!("  {:<10}", i + 1), theme::key_hint_key()),
            Span::styled(format!("Show/hide {kind}"), theme::key_hint()),
        ]));
    }
    lines.push(Line::from(""));
    lines.push(row("Esc", "Dismiss toasts / close"));
    lines.push(row("q", "Quit"));

    frame.render_widget(Paragraph::new(lines), inner);
}
