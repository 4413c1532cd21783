//! TUI rendering functions

use super::app::{Row as TraceRow, TuiApp};
use crate::viewer::{BarGeometry, StatusClass};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{
        Block, Borders, Cell, Paragraph, Row, Scrollbar, ScrollbarOrientation, ScrollbarState,
        Table, TableState, Wrap,
    },
    Frame,
};

/// Width of the waterfall column in cells
const WATERFALL_WIDTH: u16 = 32;

/// Draw the TUI
pub fn draw(frame: &mut Frame, app: &TuiApp) {
    let detail_height = if app.show_detail {
        Constraint::Percentage(40)
    } else {
        Constraint::Length(0)
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Connection status
            Constraint::Min(5),    // Request table
            detail_height,         // Selected request
            Constraint::Length(1), // Footer
        ])
        .split(frame.area());

    draw_header(frame, app, chunks[0]);
    draw_requests(frame, app, chunks[1]);
    if app.show_detail {
        draw_detail(frame, app, chunks[2]);
    }
    draw_footer(frame, chunks[3]);
}

/// Draw the connection status line
fn draw_header(frame: &mut Frame, app: &TuiApp, area: Rect) {
    let (status, color) = if app.connected {
        ("connected", Color::Green)
    } else {
        ("connecting...", Color::Yellow)
    };

    let text = Line::from(vec![
        Span::styled(
            format!(" {} ", status),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            truncate_str(&app.endpoint, 60),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled("  │ ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{} open", app.open_requests),
            Style::default().fg(Color::Cyan),
        ),
        Span::styled(" / ", Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("{} shown", app.rows.len()),
            Style::default().fg(Color::White),
        ),
    ]);

    frame.render_widget(Paragraph::new(text), area);
}

/// Draw the request table with the waterfall column
fn draw_requests(frame: &mut Frame, app: &TuiApp, area: Rect) {
    // Fixed columns: Method(7) + Status(16) + Size(10) + Duration(10) + Waterfall + padding
    let fixed_width = 7 + 16 + 10 + 10 + WATERFALL_WIDTH as usize + 8;
    let url_width = (area.width as usize).saturating_sub(fixed_width).max(10);

    let header = Row::new(vec!["Method", "URL", "Status", "Size", "Time", "Waterfall"])
        .style(Style::default().fg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .bottom_margin(0);

    let rows: Vec<Row> = app
        .rows
        .iter()
        .map(|row| request_row(row, url_width))
        .collect();

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(area);

    let table = Table::new(
        rows,
        [
            Constraint::Length(7),
            Constraint::Min(10),
            Constraint::Length(16),
            Constraint::Length(10),
            Constraint::Length(10),
            Constraint::Length(WATERFALL_WIDTH),
        ],
    )
    .header(header)
    .block(
        Block::default()
            .title(" Requests ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    )
    .row_highlight_style(Style::default().bg(Color::Rgb(40, 40, 60)));

    let mut state = TableState::default();
    if !app.rows.is_empty() {
        state.select(Some(app.selected_index));
    }

    frame.render_stateful_widget(table, chunks[0], &mut state);

    if !app.rows.is_empty() {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("▲"))
            .end_symbol(Some("▼"))
            .track_symbol(Some("│"))
            .thumb_symbol("█");

        let mut scrollbar_state = ScrollbarState::new(app.rows.len()).position(app.selected_index);

        frame.render_stateful_widget(scrollbar, chunks[1], &mut scrollbar_state);
    }
}

fn request_row(row: &TraceRow, url_width: usize) -> Row<'static> {
    let summary = &row.entry.summary;

    let status = match (&summary.status, summary.status_class) {
        (Some(status), Some(class)) => {
            Cell::from(truncate_str(status, 16)).style(status_style(class))
        }
        _ => Cell::from(""),
    };

    let duration = match &summary.error {
        Some(message) if summary.duration.is_empty() => truncate_str(message, 10),
        _ => summary.duration.clone(),
    };

    let bar_style = if row.entry.done {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::Yellow)
    };

    let row_style = if row.entry.had_error {
        Style::default().fg(Color::Red)
    } else {
        Style::default()
    };

    Row::new(vec![
        Cell::from(truncate_str(&summary.method, 7)).style(method_style(&summary.method)),
        Cell::from(truncate_str(&summary.url, url_width)),
        status,
        Cell::from(summary.size.clone().unwrap_or_default()),
        Cell::from(duration),
        Cell::from(waterfall_bar(row.bar, WATERFALL_WIDTH as usize)).style(bar_style),
    ])
    .style(row_style)
}

/// Draw the expanded view of the selected request
fn draw_detail(frame: &mut Frame, app: &TuiApp, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    let Some(row) = app.selected() else {
        let paragraph = Paragraph::new(Line::from(Span::styled(
            "waiting for requests...",
            Style::default().fg(Color::DarkGray),
        )))
        .block(block.title(" Details "));
        frame.render_widget(paragraph, area);
        return;
    };

    let summary = &row.entry.summary;
    let mut lines = vec![Line::from(vec![
        Span::styled(summary.method.clone(), method_style(&summary.method)),
        Span::raw(" "),
        Span::styled(summary.url.clone(), Style::default().fg(Color::White)),
    ])];

    if let Some(error) = &summary.error {
        lines.push(Line::from(Span::styled(
            format!("error: {}", error),
            Style::default().fg(Color::Red),
        )));
    }

    lines.extend(
        row.entry
            .detail()
            .lines()
            .into_iter()
            .map(|l| Line::from(Span::raw(l))),
    );

    let paragraph = Paragraph::new(lines)
        .block(block.title(format!(" Details {} ", row.entry.id)))
        .wrap(Wrap { trim: false })
        .scroll((app.detail_scroll, 0));

    frame.render_widget(paragraph, area);
}

/// Draw the footer with key hints
fn draw_footer(frame: &mut Frame, area: Rect) {
    let text = Line::from(vec![
        Span::styled("↑/↓", Style::default().fg(Color::Cyan)),
        Span::styled(" Navigate  ", Style::default().fg(Color::DarkGray)),
        Span::styled("Enter", Style::default().fg(Color::Cyan)),
        Span::styled(" Details  ", Style::default().fg(Color::DarkGray)),
        Span::styled("J/K", Style::default().fg(Color::Cyan)),
        Span::styled(" Scroll  ", Style::default().fg(Color::DarkGray)),
        Span::styled("r", Style::default().fg(Color::Cyan)),
        Span::styled(" Reconnect  ", Style::default().fg(Color::DarkGray)),
        Span::styled("c", Style::default().fg(Color::Cyan)),
        Span::styled(" Clear  ", Style::default().fg(Color::DarkGray)),
        Span::styled("q", Style::default().fg(Color::Cyan)),
        Span::styled(" Quit", Style::default().fg(Color::DarkGray)),
    ]);

    frame.render_widget(Paragraph::new(text), area);
}

/// Render a timing bar into a fixed number of cells
pub fn waterfall_bar(bar: Option<BarGeometry>, width: usize) -> String {
    let Some(bar) = bar else {
        return String::new();
    };
    if width == 0 {
        return String::new();
    }

    let cells = width as f64;
    let start = ((bar.offset_percent / 100.0 * cells).floor().max(0.0) as usize).min(width - 1);
    let len = ((bar.width_percent / 100.0 * cells).round().max(1.0) as usize).min(width - start);

    let mut out = String::with_capacity(width * 3);
    out.push_str(&" ".repeat(start));
    out.push_str(&"█".repeat(len));
    out
}

/// Get style for HTTP method
fn method_style(method: &str) -> Style {
    match method {
        "GET" => Style::default().fg(Color::Green),
        "POST" => Style::default().fg(Color::Yellow),
        "PUT" => Style::default().fg(Color::Blue),
        "PATCH" => Style::default().fg(Color::Magenta),
        "DELETE" => Style::default().fg(Color::Red),
        "HEAD" => Style::default().fg(Color::Cyan),
        _ => Style::default().fg(Color::White),
    }
}

/// Get style for a response status class
fn status_style(class: StatusClass) -> Style {
    match class.0 {
        c if c >= 5 => Style::default().fg(Color::Red),
        4 => Style::default().fg(Color::Yellow),
        3 => Style::default().fg(Color::Cyan),
        2 => Style::default().fg(Color::Green),
        _ => Style::default().fg(Color::White),
    }
}

/// Truncate any string to max length (in characters)
fn truncate_str(s: &str, max_len: usize) -> String {
    let count = s.chars().count();
    if count <= max_len {
        s.to_string()
    } else if max_len > 3 {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    } else {
        s.chars().take(max_len).collect()
    }
}
