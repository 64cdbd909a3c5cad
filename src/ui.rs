use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use metrics_reconciliation::{
    format_number, CellDetails, ReconciliationSession, SelectionResult, Table,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table as TableWidget, TableState},
    Frame, Terminal,
};
use std::io;

/// Period columns visible at once
const VISIBLE_COLUMNS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Grid,
    Candidates,
}

pub struct App {
    pub session: ReconciliationSession,
    pub table: Table,
    pub state: TableState,
    pub column: usize,
    pub focus: Focus,
    pub candidate_state: TableState,
    pub status: Option<String>,
}

impl App {
    pub fn new(session: ReconciliationSession) -> Self {
        let table = session.project();
        let mut state = TableState::default();
        if !table.rows.is_empty() {
            state.select(Some(0));
        }

        Self {
            session,
            table,
            state,
            column: 0,
            focus: Focus::Grid,
            candidate_state: TableState::default(),
            status: None,
        }
    }

    fn refresh(&mut self) {
        self.table = self.session.project();
    }

    pub fn focused_details(&self) -> Option<CellDetails> {
        let row = self.state.selected().and_then(|i| self.table.rows.get(i))?;
        let period = *self.table.periods.get(self.column)?;
        self.session.cell_details(&row.metric_key, period).ok()
    }

    pub fn next(&mut self) {
        match self.focus {
            Focus::Grid => step(&mut self.state, self.table.rows.len(), 1),
            Focus::Candidates => {
                let len = self.focused_details().map(|d| d.candidates.len()).unwrap_or(0);
                step(&mut self.candidate_state, len, 1)
            }
        }
    }

    pub fn previous(&mut self) {
        match self.focus {
            Focus::Grid => step(&mut self.state, self.table.rows.len(), -1),
            Focus::Candidates => {
                let len = self.focused_details().map(|d| d.candidates.len()).unwrap_or(0);
                step(&mut self.candidate_state, len, -1)
            }
        }
    }

    pub fn right(&mut self) {
        if self.focus == Focus::Grid && self.column + 1 < self.table.periods.len() {
            self.column += 1;
        }
    }

    pub fn left(&mut self) {
        if self.focus == Focus::Grid {
            self.column = self.column.saturating_sub(1);
        }
    }

    /// Enter: open the candidate panel, or select the highlighted candidate
    pub fn activate(&mut self) {
        match self.focus {
            Focus::Grid => {
                if let Some(details) = self.focused_details() {
                    self.focus = Focus::Candidates;
                    self.candidate_state.select(details.display_index);
                } else {
                    self.status = Some("No data for this cell".to_string());
                }
            }
            Focus::Candidates => self.select_candidate(),
        }
    }

    pub fn close_panel(&mut self) {
        self.focus = Focus::Grid;
    }

    fn select_candidate(&mut self) {
        let (Some(details), Some(index)) = (self.focused_details(), self.candidate_state.selected()) else {
            return;
        };

        self.status = Some(match self.session.select_observation(&details.metric_key, details.period, index) {
            Ok(SelectionResult::Changed(event)) => format!(
                "{} {}: adopted {} from {}",
                event.metric_key,
                event.period,
                display_number(event.value),
                event.source_label
            ),
            Ok(SelectionResult::Unchanged) => "Already selected".to_string(),
            Err(e) => format!("Selection failed: {}", e),
        });

        self.refresh();
        self.focus = Focus::Grid;
    }

    /// First visible period column, keeping the focused column on screen
    fn column_offset(&self) -> usize {
        (self.column + 1).saturating_sub(VISIBLE_COLUMNS)
    }
}

fn step(state: &mut TableState, len: usize, delta: isize) {
    if len == 0 {
        state.select(None);
        return;
    }
    let current = state.selected().unwrap_or(0) as isize;
    let next = (current + delta).rem_euclid(len as isize) as usize;
    state.select(Some(next));
}

fn display_number(value: Option<f64>) -> String {
    match value {
        Some(v) => format_number(v, true),
        None => "-".to_string(),
    }
}

pub fn run_ui(app: &mut App) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res.map_err(Into::into)
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        if let Event::Key(key) = event::read()? {
            match key.code {
                KeyCode::Char('q') => return Ok(()),
                KeyCode::Esc if app.focus == Focus::Candidates => app.close_panel(),
                KeyCode::Esc => return Ok(()),
                KeyCode::Enter => app.activate(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::Right | KeyCode::Char('l') => app.right(),
                KeyCode::Left | KeyCode::Char('h') => app.left(),
                _ => {}
            }
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(0),    // Grid (+ candidate panel)
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    if app.focus == Focus::Candidates {
        let content_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(chunks[1]);

        render_grid(f, content_chunks[0], app);
        render_candidates(f, content_chunks[1], app);
    } else {
        render_grid(f, chunks[1], app);
    }

    render_status_bar(f, chunks[2], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let project = app.session.project_id().unwrap_or("(no project)").to_string();
    let spans = vec![
        Span::styled(
            "Metrics Reconciliation",
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ),
        Span::raw("  |  "),
        Span::styled(project, Style::default().fg(Color::White)),
        Span::raw("  |  "),
        Span::styled(
            format!("{} metrics", app.table.rows.len()),
            Style::default().fg(Color::White),
        ),
        Span::raw("  "),
        Span::styled(
            format!("⚠ {} conflicts", app.table.conflict_count()),
            Style::default().fg(Color::Red),
        ),
    ];

    let header = Paragraph::new(vec![Line::from(spans)])
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(Color::Cyan)));

    f.render_widget(header, area);
}

fn render_grid(f: &mut Frame, area: Rect, app: &mut App) {
    let offset = app.column_offset();
    let visible: Vec<usize> = (offset..app.table.periods.len()).take(VISIBLE_COLUMNS).collect();

    let mut header_cells = vec![Cell::from("Metric")];
    header_cells.extend(visible.iter().map(|&c| {
        let style = if c == app.column {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        };
        Cell::from(app.table.periods[c].label()).style(style)
    }));
    let header = Row::new(header_cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1);

    let focused_row = app.state.selected();
    let rows = app.table.rows.iter().enumerate().map(|(r, row)| {
        let mut cells = vec![Cell::from(truncate(&row.title, 24))];
        cells.extend(visible.iter().map(|&c| {
            let cell = &row.cells[c];
            let text = if cell.has_data() {
                display_number(cell.value)
            } else {
                String::new()
            };

            let mut style = if cell.selected {
                Style::default().fg(Color::Green)
            } else if cell.is_conflict {
                Style::default().fg(Color::White).bg(Color::Red)
            } else {
                Style::default()
            };
            if focused_row == Some(r) && c == app.column {
                style = style.add_modifier(Modifier::REVERSED);
            }
            Cell::from(text).style(style)
        }));
        Row::new(cells).height(1)
    });

    let mut widths = vec![Constraint::Length(26)];
    widths.extend(visible.iter().map(|_| Constraint::Length(14)));

    let table = TableWidget::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::White))
                .title(" Metrics by Period "),
        )
        .highlight_style(Style::default().add_modifier(Modifier::BOLD))
        .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_candidates(f: &mut Frame, area: Rect, app: &mut App) {
    let Some(details) = app.focused_details() else {
        return;
    };

    let header = Row::new(
        ["", "Value", "Source", "Citation"]
            .iter()
            .map(|h| Cell::from(*h).style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD))),
    )
    .style(Style::default().bg(Color::DarkGray));

    let rows = details.candidates.iter().enumerate().map(|(i, candidate)| {
        let marker = if details.display_index == Some(i) { "●" } else { " " };
        Row::new(vec![
            Cell::from(marker),
            Cell::from(display_number(candidate.value)),
            Cell::from(truncate(&candidate.source_label, 18)),
            Cell::from(truncate(&candidate.source_ref, 30)).style(Style::default().fg(Color::DarkGray)),
        ])
    });

    let title = format!(" {} @ {} ", details.metric_key, details.period);
    let table = TableWidget::new(
        rows,
        [
            Constraint::Length(2),
            Constraint::Length(14),
            Constraint::Length(20),
            Constraint::Min(10),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow))
            .title(title),
    )
    .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.candidate_state);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let mut status_spans = Vec::new();

    if let Some(message) = &app.status {
        status_spans.push(Span::styled(format!(" {} ", message), Style::default().fg(Color::Green)));
        status_spans.push(Span::raw(" | "));
    }

    status_spans.push(Span::styled("Enter", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(if app.focus == Focus::Grid { " Sources | " } else { " Adopt | " }));
    status_spans.push(Span::styled("←/→", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Period | "));
    status_spans.push(Span::styled("↑/↓", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Nav | "));
    status_spans.push(Span::styled("Esc", Style::default().fg(Color::Yellow)));
    status_spans.push(Span::raw(" Back | "));
    status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
    status_spans.push(Span::raw(" Quit"));

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
