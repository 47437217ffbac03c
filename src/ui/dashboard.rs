use chrono::{DateTime, Local, Utc};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{
        Axis, Block, Borders, Cell, Chart, Dataset, GraphType, Paragraph, Row, Table, TableState,
        Wrap,
    },
    Frame,
};

use crate::app::{App, DashboardMode};
use crate::model::{Outcome, Session};
use crate::stats::{outcome_counts, score_stats, session_stats, HistorySummary};
use crate::ui::charting::{balance_series, compute_chart_params, format_label};
use crate::ui::{HORIZONTAL_MARGIN, VERTICAL_MARGIN};
use crate::util::truncate_to_width;

const NAME_COLUMN_WIDTH: usize = 16;

fn short_date(d: &DateTime<Utc>) -> String {
    d.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn balance_style(balance: i64) -> Style {
    match balance {
        b if b > 0 => Style::default().fg(Color::Green),
        b if b < 0 => Style::default().fg(Color::Red),
        _ => Style::default(),
    }
}

pub fn summary_line(username: &str, summary: &HistorySummary) -> Line<'static> {
    Line::from(vec![
        Span::styled(
            format!("Welcome, {}!", username),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(
            "   {} sessions   {} W / {} L   ",
            summary.sessions, summary.victories, summary.defeats
        )),
        Span::styled(
            format!("{:+} balance", summary.balance),
            balance_style(summary.balance),
        ),
        Span::raw(format!("   {:.1}% win rate", summary.win_rate)),
    ])
}

/// Pure presenter for one history table row
pub fn present_history_row(session: &Session) -> Row<'static> {
    let stats = session_stats(session);
    let scores = if session.scores.is_empty() {
        "—".to_string()
    } else {
        let s = score_stats(&session.scores);
        format!("{} (avg {})", format_label(s.total), format_label(s.avg))
    };
    let end = match (&session.end_date, session.is_active) {
        (_, true) => "live".to_string(),
        (Some(d), false) => short_date(d),
        (None, false) => "—".to_string(),
    };

    let row = Row::new(vec![
        Cell::from(session.short_id().to_string()),
        Cell::from(truncate_to_width(&session.name, NAME_COLUMN_WIDTH)),
        Cell::from(short_date(&session.start_date)),
        Cell::from(end),
        Cell::from(stats.victories.to_string()),
        Cell::from(stats.defeats.to_string()),
        Cell::from(format!("{:+}", stats.balance)).style(balance_style(stats.balance)),
        Cell::from(scores),
    ]);

    if session.is_active {
        row.style(Style::default().add_modifier(Modifier::BOLD))
    } else {
        row
    }
}

/// Numbered option tallies for the active session panel
pub fn option_lines(session: &Session) -> Vec<Line<'static>> {
    outcome_counts(session)
        .into_iter()
        .enumerate()
        .map(|(i, o)| {
            let color = match o.outcome {
                Outcome::Victory => Color::Green,
                Outcome::Defeat => Color::Red,
            };
            Line::from(vec![
                Span::styled(
                    format!("({}) ", i + 1),
                    Style::default().add_modifier(Modifier::DIM),
                ),
                Span::styled(format!("{:<20}", o.label), Style::default().fg(color)),
                Span::styled(
                    format!("{:>4}", o.count),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
                Span::styled(
                    format!("  {:>3.0}%", o.share),
                    Style::default().add_modifier(Modifier::DIM),
                ),
            ])
        })
        .collect()
}

pub fn footer_text(mode: &DashboardMode, has_active: bool) -> String {
    match mode {
        DashboardMode::NamingSession(name) => {
            format!("Session name: {}▏  (enter) start  (esc) cancel", name)
        }
        DashboardMode::EnteringScore(value) => {
            format!("Score: {}▏  (enter) add  (esc) cancel", value)
        }
        DashboardMode::Browse if has_active => {
            "(1-9) record  (u)ndo  (#) score  (e)nd  (s)tart new  (d)elete  (l)ogout  (q)uit"
                .to_string()
        }
        DashboardMode::Browse => "(s)tart session  ↑/↓ select  (d)elete  (l)ogout  (q)uit".to_string(),
    }
}

fn render_active_panel(app: &App, session: Option<&Session>, f: &mut Frame, area: Rect) {
    let Some(session) = session else {
        let empty = Paragraph::new(
            "No active session.\nPress (s) to start one and begin counting.",
        )
        .block(Block::default().borders(Borders::ALL).title("Active session"))
        .style(Style::default().fg(Color::Gray))
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
        f.render_widget(empty, area);
        return;
    };

    let block = Block::default().borders(Borders::ALL).title(Span::styled(
        format!("● {} #{}", session.name, session.short_id()),
        Style::default()
            .fg(Color::Green)
            .add_modifier(Modifier::BOLD),
    ));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let options_height = session.options.len() as u16;
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(options_height), // tallies
            Constraint::Length(1),              // stats
            Constraint::Length(1),              // scores
            Constraint::Min(0),                 // chart
        ])
        .split(inner);

    f.render_widget(Paragraph::new(option_lines(session)), chunks[0]);

    let stats = session_stats(session);
    f.render_widget(
        Paragraph::new(Line::from(vec![
            Span::raw(format!(
                "total {}   victories {}   defeats {}   ",
                stats.total, stats.victories, stats.defeats
            )),
            Span::styled(format!("{:+}", stats.balance), balance_style(stats.balance)),
        ])),
        chunks[1],
    );

    if !session.scores.is_empty() {
        let s = score_stats(&session.scores);
        f.render_widget(
            Paragraph::new(format!(
                "scores: total {}  avg {}  max {}  min {}  ({} entries)",
                format_label(s.total),
                format_label(s.avg),
                format_label(s.max),
                format_label(s.min),
                s.count
            ))
            .style(Style::default().fg(Color::Gray)),
            chunks[2],
        );
    }

    let events = app.sessions().session_events(&session.id);
    if events.is_empty() || chunks[3].height < 4 {
        return;
    }
    let points = balance_series(&events);
    let (overall, extent) = compute_chart_params(&points);
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let datasets = vec![Dataset::default()
        .marker(symbols::Marker::Braille)
        .style(Style::default().fg(Color::Magenta))
        .graph_type(GraphType::Line)
        .data(&points)];
    let chart = Chart::new(datasets)
        .x_axis(
            Axis::default()
                .title("events")
                .bounds([0.0, overall])
                .labels(vec![
                    Span::styled("0", bold),
                    Span::styled(format_label(overall), bold),
                ]),
        )
        .y_axis(
            Axis::default()
                .title("balance")
                .bounds([-extent, extent])
                .labels(vec![
                    Span::styled(format_label(-extent), bold),
                    Span::styled("0", bold),
                    Span::styled(format_label(extent), bold),
                ]),
        );
    f.render_widget(chart, chunks[3]);
}

fn render_history(app: &App, sessions: &[Session], f: &mut Frame, area: Rect) {
    let header = Row::new(vec![
        Cell::from("ID"),
        Cell::from("Name"),
        Cell::from("Start"),
        Cell::from("End"),
        Cell::from("W"),
        Cell::from("L"),
        Cell::from("Bal"),
        Cell::from("Scores"),
    ])
    .style(
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    );

    let rows: Vec<Row> = sessions.iter().map(present_history_row).collect();
    let table = Table::new(
        rows,
        &[
            Constraint::Length(7),
            Constraint::Length(NAME_COLUMN_WIDTH as u16),
            Constraint::Length(16),
            Constraint::Length(16),
            Constraint::Length(4),
            Constraint::Length(4),
            Constraint::Length(5),
            Constraint::Min(6),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Session history ({})", sessions.len())),
    )
    .row_highlight_style(Style::default().bg(Color::DarkGray));

    let mut state = TableState::default();
    if !sessions.is_empty() {
        state.select(Some(app.dashboard.selected.min(sessions.len() - 1)));
    }
    f.render_stateful_widget(table, area, &mut state);
}

pub fn render_dashboard(app: &App, f: &mut Frame) {
    let service = app.sessions();
    let username = app
        .current_user()
        .map(|u| u.username)
        .unwrap_or_default();
    let sessions = service.user_sessions();
    let active = sessions.iter().find(|s| s.is_active);
    let summary = crate::stats::history_summary(&sessions);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .horizontal_margin(HORIZONTAL_MARGIN)
        .vertical_margin(VERTICAL_MARGIN)
        .constraints([
            Constraint::Length(3), // summary
            Constraint::Min(8),    // panels
            Constraint::Length(3), // help / input
        ])
        .split(f.area());

    f.render_widget(
        Paragraph::new(summary_line(&username, &summary))
            .block(Block::default().borders(Borders::ALL).title("scorekeep"))
            .alignment(Alignment::Center),
        chunks[0],
    );

    let panels = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(chunks[1]);
    render_active_panel(app, active, f, panels[0]);
    render_history(app, &sessions, f, panels[1]);

    let input_mode = !matches!(app.dashboard.mode, DashboardMode::Browse);
    let footer_style = if input_mode {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
            .fg(Color::Gray)
            .add_modifier(Modifier::ITALIC)
    };
    f.render_widget(
        Paragraph::new(footer_text(&app.dashboard.mode, active.is_some()))
            .block(Block::default().borders(Borders::ALL))
            .style(footer_style)
            .alignment(Alignment::Center),
        chunks[2],
    );
}
