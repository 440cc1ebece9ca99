//! Interactive terminal dashboard over a live session

use std::io;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use crossterm::{
    event::{
        DisableFocusChange, EnableFocusChange, Event, EventStream, KeyCode, KeyEvent,
        KeyEventKind, KeyModifiers,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures_util::StreamExt;
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Tabs},
};

use scriptdeck_core::ansi;
use scriptdeck_core::backend::Backend;
use scriptdeck_core::config::ClientConfig;
use scriptdeck_core::log_view::{LogContent, LogTarget, NO_LOGS_PLACEHOLDER};
use scriptdeck_core::model::{ControlAction, ScriptId};
use scriptdeck_core::reducer::{Session, SessionEvent};
use scriptdeck_core::state::uptime;
use scriptdeck_core::view::{ListView, group_tabs};

use super::styles;
use super::theme::ansi_color;
use crate::runtime::{Request, Runtime};

/// Notification expiry resolution
const TICK: Duration = Duration::from_millis(500);
const PAGE: isize = 10;

fn setup_terminal() -> io::Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableFocusChange)?;
    Terminal::new(CrosstermBackend::new(stdout))
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<io::Stdout>>) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), DisableFocusChange, LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn fit_title(s: &str, width: u16) -> String {
    // borders plus one space either side
    let max = width.saturating_sub(4) as usize;
    if max == 0 {
        return String::new();
    }
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Mode {
    #[default]
    Normal,
    /// Typing into the filter box
    Filter,
}

/// What the loop must do after a key press
#[derive(Debug)]
enum Command {
    Quit,
    Send(Request),
    ShowLogs(LogTarget),
    ScrollLogs(isize),
    LogsToBottom,
    Dismiss,
}

#[derive(Debug, Default)]
struct DashState {
    view: ListView,
    selected: usize,
    mode: Mode,
    filter_input: String,
}

impl DashState {
    fn group_index(&self, groups: &[String]) -> usize {
        self.view
            .group
            .as_ref()
            .and_then(|g| groups.iter().position(|t| t == g))
            .unwrap_or(0)
    }

    fn handle_key(&mut self, key: KeyEvent, rows: &[ScriptId], groups: &[String]) -> Option<Command> {
        if self.mode == Mode::Filter {
            match key.code {
                KeyCode::Enter => self.mode = Mode::Normal,
                KeyCode::Esc => {
                    self.filter_input.clear();
                    self.view.filter.clear();
                    self.mode = Mode::Normal;
                }
                KeyCode::Backspace => {
                    self.filter_input.pop();
                    self.view.filter.set(self.filter_input.clone());
                }
                KeyCode::Char(c) => {
                    self.filter_input.push(c);
                    self.view.filter.set(self.filter_input.clone());
                    self.selected = 0;
                }
                _ => {}
            }
            return None;
        }

        let current = rows.get(self.selected).cloned();
        let control = |action| {
            current
                .clone()
                .map(|id| Command::Send(Request::Control { id, action }))
        };

        match (key.code, key.modifiers) {
            (KeyCode::Char('q'), _) | (KeyCode::Char('c'), KeyModifiers::CONTROL) => {
                Some(Command::Quit)
            }
            (KeyCode::Down, _) | (KeyCode::Char('j'), _) => {
                self.selected = (self.selected + 1).min(rows.len().saturating_sub(1));
                None
            }
            (KeyCode::Up, _) | (KeyCode::Char('k'), _) => {
                self.selected = self.selected.saturating_sub(1);
                None
            }
            (KeyCode::Tab, _) => {
                if !groups.is_empty() {
                    let next = (self.group_index(groups) + 1) % groups.len();
                    self.view.select_group(groups.get(next).cloned());
                    self.selected = 0;
                }
                None
            }
            (KeyCode::Char('s'), _) => control(ControlAction::Start),
            (KeyCode::Char('x'), _) => control(ControlAction::Stop),
            (KeyCode::Char('r'), _) => control(ControlAction::Restart),
            (KeyCode::Char('S'), _) => Some(Command::Send(Request::StartAll)),
            (KeyCode::Char('X'), _) => Some(Command::Send(Request::StopAll)),
            (KeyCode::Enter, _) | (KeyCode::Char('l'), _) => {
                current.clone().map(|id| Command::ShowLogs(LogTarget::Script(id)))
            }
            (KeyCode::Char('m'), _) => Some(Command::ShowLogs(LogTarget::Manager)),
            (KeyCode::PageUp, _) => Some(Command::ScrollLogs(-PAGE)),
            (KeyCode::PageDown, _) => Some(Command::ScrollLogs(PAGE)),
            (KeyCode::Home, _) => Some(Command::ScrollLogs(isize::MIN)),
            (KeyCode::End, _) => Some(Command::LogsToBottom),
            (KeyCode::Char('/'), _) => {
                self.filter_input = self.view.filter.pattern.clone().unwrap_or_default();
                self.mode = Mode::Filter;
                None
            }
            (KeyCode::Esc, _) => {
                self.filter_input.clear();
                self.view.filter.clear();
                None
            }
            (KeyCode::Char('o'), _) => {
                self.view.sort_by(self.view.sort.cycle());
                None
            }
            (KeyCode::Char('O'), _) => {
                self.view.sort_by(self.view.sort);
                None
            }
            (KeyCode::Char('d'), _) => Some(Command::Dismiss),
            _ => None,
        }
    }
}

pub async fn run_dashboard(config: ClientConfig, backend: Arc<dyn Backend>) -> io::Result<()> {
    let mut runtime = Runtime::start(config, backend);
    runtime.emit(SessionEvent::SelectTarget(LogTarget::Manager));

    let mut terminal = setup_terminal()?;
    let result = dashboard_loop(&mut terminal, &mut runtime).await;
    runtime.shutdown();
    restore_terminal(terminal)?;
    result
}

async fn dashboard_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    runtime: &mut Runtime,
) -> io::Result<()> {
    let mut ui = DashState::default();
    let mut events = EventStream::new();
    let mut tick = tokio::time::interval(TICK);

    loop {
        terminal.draw(|f| draw(f, &mut runtime.session, &mut ui))?;

        tokio::select! {
            ev = events.next() => match ev {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    let map = runtime.session.reconciler.map();
                    let rows: Vec<ScriptId> =
                        ui.view.rows(map).into_iter().map(|s| s.id.clone()).collect();
                    let groups = group_tabs(map);
                    match ui.handle_key(key, &rows, &groups) {
                        Some(Command::Quit) => return Ok(()),
                        Some(Command::Send(request)) => runtime.request(request),
                        Some(Command::ShowLogs(target)) => {
                            runtime.emit(SessionEvent::SelectTarget(target))
                        }
                        Some(Command::ScrollLogs(delta)) => {
                            runtime.session.logs.viewport_mut().scroll_by(delta)
                        }
                        Some(Command::LogsToBottom) => {
                            runtime.session.logs.viewport_mut().scroll_to_bottom()
                        }
                        Some(Command::Dismiss) => {
                            runtime.session.notifications.dismiss_latest();
                        }
                        None => {}
                    }
                }
                Some(Ok(Event::FocusGained)) => runtime.emit(SessionEvent::VisibilityChanged(true)),
                Some(Ok(Event::FocusLost)) => runtime.emit(SessionEvent::VisibilityChanged(false)),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e),
                None => return Ok(()),
            },
            env = runtime.recv() => match env {
                Some(env) => runtime.handle(env),
                None => return Ok(()),
            },
            _ = tick.tick() => runtime.emit(SessionEvent::Tick),
        }
    }
}

fn draw(f: &mut Frame, session: &mut Session, ui: &mut DashState) {
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),      // header
            Constraint::Length(1),      // group tabs
            Constraint::Percentage(40), // scripts
            Constraint::Min(5),         // logs
            Constraint::Length(1),      // footer
        ])
        .split(f.area());

    draw_header(f, session, outer[0]);
    draw_tabs(f, session, ui, outer[1]);
    draw_table(f, session, ui, outer[2]);
    draw_logs(f, session, outer[3]);
    draw_footer(f, session, ui, outer[4]);
}

fn draw_header(f: &mut Frame, session: &Session, area: Rect) {
    let agg = session.reconciler.aggregates();
    let state = session.connection_state();
    let line = Line::from(vec![
        Span::styled(" scriptdeck ", styles::accent_bold()),
        Span::styled(format!("● {}", state.label()), styles::connection(state)),
        Span::raw("    "),
        Span::styled(
            format!("{}/{} running", agg.running, agg.total),
            styles::text(),
        ),
        Span::raw("  "),
        Span::styled(format!("CPU {:.1}%", agg.cpu_percent), styles::text_dim()),
        Span::raw("  "),
        Span::styled(format!("MEM {:.1} MB", agg.memory_mb), styles::text_dim()),
    ]);
    f.render_widget(Paragraph::new(line), area);
}

fn draw_tabs(f: &mut Frame, session: &Session, ui: &DashState, area: Rect) {
    let groups = group_tabs(session.reconciler.map());
    let index = ui.group_index(&groups);
    let titles: Vec<Line> = groups.iter().map(|g| Line::from(g.as_str())).collect();
    let tabs = Tabs::new(titles)
        .select(index)
        .style(styles::tab(false))
        .highlight_style(styles::tab(true))
        .divider("|");
    f.render_widget(tabs, area);
}

fn draw_table(f: &mut Frame, session: &Session, ui: &mut DashState, area: Rect) {
    let now = Utc::now();
    let rows = ui.view.rows(session.reconciler.map());
    ui.selected = ui.selected.min(rows.len().saturating_sub(1));

    let dash = || "-".to_string();
    let body: Vec<Row> = rows
        .iter()
        .map(|s| {
            Row::new(vec![
                Cell::from(Span::styled(
                    format!("{} {}", styles::status_icon(s), s.status_label()),
                    styles::status(s),
                )),
                Cell::from(s.name.clone()),
                Cell::from(Span::styled(s.id.clone(), styles::text_dim())),
                Cell::from(s.group.clone()),
                Cell::from(s.pid().map(|p| p.to_string()).unwrap_or_else(dash)),
                Cell::from(s.cpu_percent().map(|c| format!("{:.1}", c)).unwrap_or_else(dash)),
                Cell::from(s.memory_mb().map(|m| format!("{:.1}", m)).unwrap_or_else(dash)),
                Cell::from(uptime(s, now).unwrap_or_else(dash)),
            ])
        })
        .collect();

    let header = Row::new(["STATUS", "NAME", "ID", "GROUP", "PID", "CPU%", "MEM(MB)", "UPTIME"])
        .style(styles::text_dim().add_modifier(Modifier::BOLD));

    let arrow = if ui.view.descending { "↓" } else { "↑" };
    let mut title = format!(" Scripts  sort: {} {} ", ui.view.sort.label(), arrow);
    if let Some(pattern) = &ui.view.filter.pattern {
        title.push_str(&format!(" /{} ", pattern));
    }

    let widths = [
        Constraint::Length(11),
        Constraint::Min(12),
        Constraint::Min(10),
        Constraint::Length(10),
        Constraint::Length(8),
        Constraint::Length(6),
        Constraint::Length(8),
        Constraint::Length(10),
    ];
    let table = Table::new(body, widths)
        .header(header)
        .block(
            Block::default()
                .title(fit_title(&title, area.width))
                .borders(Borders::ALL)
                .border_style(styles::border(true)),
        )
        .row_highlight_style(styles::selection())
        .highlight_symbol("▶ ");

    let mut state = TableState::default();
    if !rows.is_empty() {
        state.select(Some(ui.selected));
    }
    f.render_stateful_widget(table, area, &mut state);
}

/// One styled line per escape-sequence run
fn styled_line(raw: &str) -> Line<'static> {
    let spans: Vec<Span> = ansi::segments(raw)
        .into_iter()
        .map(|seg| {
            let mut style = Style::default();
            if let Some(fg) = seg.fg {
                style = style.fg(ansi_color(fg));
            }
            if let Some(bg) = seg.bg {
                style = style.bg(ansi_color(bg));
            }
            if seg.bold {
                style = style.add_modifier(Modifier::BOLD);
            }
            Span::styled(seg.text, style)
        })
        .collect();
    Line::from(spans)
}

fn draw_logs(f: &mut Frame, session: &mut Session, area: Rect) {
    let target = session.logs.target().clone();
    let label = match &target {
        LogTarget::Manager => "Manager".to_string(),
        LogTarget::Script(id) => session
            .reconciler
            .get(id)
            .map(|s| s.name.clone())
            .unwrap_or_else(|| id.clone()),
    };
    let mut title = format!(" Logs: {} ", label);
    if session.following().is_some() {
        title.push_str("(following) ");
    }

    let mut block = Block::default()
        .title(fit_title(&title, area.width))
        .borders(Borders::ALL)
        .border_style(styles::border(false));
    if let Some(err) = session.logs.error() {
        block = block.title_bottom(Span::styled(
            fit_title(&format!(" {} ", err), area.width),
            styles::error(),
        ));
    }

    let height = area.height.saturating_sub(2) as usize;
    session.logs.viewport_mut().set_client_height(height);

    let lines: Vec<Line> = match session.logs.content() {
        LogContent::Loading => vec![Line::styled("Loading…", styles::text_muted())],
        LogContent::Placeholder => vec![Line::styled(NO_LOGS_PLACEHOLDER, styles::text_muted())],
        LogContent::Lines(all) => {
            let top = session.logs.viewport().scroll_top.min(all.len());
            let end = (top + height).min(all.len());
            all[top..end].iter().map(|l| styled_line(&l.raw)).collect()
        }
    };
    f.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_footer(f: &mut Frame, session: &Session, ui: &DashState, area: Rect) {
    let line = if ui.mode == Mode::Filter {
        Line::from(vec![
            Span::styled("/", styles::key_hint()),
            Span::styled(format!("{}▏", ui.filter_input), styles::text()),
        ])
    } else if let Some(note) = session.notifications.latest() {
        Line::from(vec![
            Span::styled(format!(" {} ", note.severity.label()), styles::severity(note.severity)),
            Span::styled(note.message.clone(), styles::text()),
            Span::styled("  [d] dismiss", styles::text_muted()),
        ])
    } else {
        let mut spans = Vec::new();
        for (key, what) in [
            ("s/x/r", "start/stop/restart"),
            ("S/X", "all"),
            ("enter", "logs"),
            ("m", "manager"),
            ("tab", "group"),
            ("/", "filter"),
            ("o/O", "sort"),
            ("q", "quit"),
        ] {
            spans.push(Span::styled(format!(" {}", key), styles::key_hint()));
            spans.push(Span::styled(format!(" {} ", what), styles::text_muted()));
        }
        Line::from(spans)
    };
    f.render_widget(Paragraph::new(line), area);
}
