use crate::state::{App, Focus, Prompt};
use crate::theme::{self, Theme};
use chrono::{Local, TimeZone, Utc};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span, Text},
    widgets::{BarChart, Block, Borders, Cell, Clear, Paragraph, Row, Table, Wrap},
    Frame,
};

pub fn render(f: &mut Frame, app: &mut App) {
    let theme = theme::theme();
    let area = f.size();
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),
            Constraint::Min(0),
        ])
        .split(area);

    f.render_widget(render_header(app, theme), layout[0]);
    render_body(f, app, theme, layout[1]);

    match &app.prompt {
        Prompt::Broadcast(buffer) => render_prompt(
            f,
            theme,
            "Broadcast",
            &format!("Message: {buffer}_"),
            "Enter send / Esc cancel",
        ),
        Prompt::ConfirmRestart => render_prompt(
            f,
            theme,
            "Restart Server",
            "Restart the game server now?",
            "y confirm / n cancel",
        ),
        Prompt::None => {}
    }

    if app.show_help {
        render_help(f, theme);
    }
}

fn render_header(app: &App, theme: Theme) -> Paragraph<'static> {
    let top = app
        .view
        .top_category
        .as_ref()
        .map(|c| format!("{} ({})", c.category, c.count))
        .unwrap_or_else(|| "—".to_string());
    let server_time = app
        .view
        .server_time
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .map(|at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "—".to_string());
    // Local wall clock is the sink's own display; it never feeds the core.
    let local_time = Local::now().format("%H:%M:%S").to_string();

    let status_line = format!(
        "Users: {}   Online: {}   Top Category: {}   Server Time: {}   Local: {}",
        app.view.total_users, app.view.online_users, top, server_time, local_time
    );
    let channel_line = format!(
        "Chat: {}   Log: {}   Cycles: {}   {}",
        app.chat.state.as_str(),
        app.log.state.as_str(),
        app.cycles,
        app.status_note
            .as_deref()
            .unwrap_or("ready (Tab focus, b broadcast, R restart, ? help, q quit)"),
    );

    Paragraph::new(Text::from(vec![
        Line::from(Span::styled(status_line, Style::default().fg(theme.text))),
        Line::from(Span::styled(
            channel_line,
            Style::default().fg(if app.status_note.is_some() {
                theme.warn
            } else {
                theme.muted
            }),
        )),
    ]))
    .style(Style::default().fg(theme.text).bg(theme.bg))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.border))
            .title(Span::styled("Realm Ops", theme.title_style())),
    )
}

fn render_body(f: &mut Frame, app: &mut App, theme: Theme, area: Rect) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(area);

    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(9)])
        .split(columns[0]);
    render_users(f, app, theme, left[0]);
    render_chart(f, app, theme, left[1]);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage(50),
            Constraint::Length(3),
            Constraint::Min(0),
        ])
        .split(columns[1]);
    render_pane(f, &app.chat, theme, right[0], app.focus == Focus::Chat);
    render_chat_input(f, app, theme, right[1]);
    render_pane(f, &app.log, theme, right[2], app.focus == Focus::Log);
}

fn render_users(f: &mut Frame, app: &mut App, theme: Theme, area: Rect) {
    let header = Row::new(vec!["ID", "Name", "Rating", "Category", "Group", "Status"])
        .style(theme.title_style());
    let rows: Vec<Row> = app
        .view
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let status_style = if row.online {
                theme.online_style()
            } else {
                theme.offline_style()
            };
            Row::new(vec![
                Cell::from(row.record.id.clone()),
                Cell::from(row.record.display_name.clone()),
                Cell::from(format!("{:.0}", row.record.rating)),
                Cell::from(row.record.category.clone()),
                Cell::from(row.record.group.clone().unwrap_or_default()),
                Cell::from(Span::styled(
                    if row.online { "Online" } else { "Offline" },
                    status_style,
                )),
            ])
            .style(theme::zebra_row_style(i))
        })
        .collect();

    let title = format!("Users ({})", app.view.total_users);
    let table = Table::new(
        rows,
        [
            Constraint::Length(8),
            Constraint::Min(10),
            Constraint::Length(7),
            Constraint::Length(10),
            Constraint::Length(12),
            Constraint::Length(8),
        ],
    )
    .header(header)
    .highlight_style(Style::default().add_modifier(Modifier::REVERSED))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(theme.focused_border(app.focus == Focus::Users))
            .title(Span::styled(title, theme.title_style())),
    );
    f.render_stateful_widget(table, area, &mut app.table_state);
}

fn render_chart(f: &mut Frame, app: &App, theme: Theme, area: Rect) {
    let data: Vec<(&str, u64)> = app
        .chart
        .labels
        .iter()
        .map(String::as_str)
        .zip(app.chart.values.iter().copied())
        .collect();
    let chart = BarChart::default()
        .data(&data)
        .bar_width(9)
        .bar_gap(1)
        .bar_style(Style::default().fg(theme.accent))
        .value_style(Style::default().fg(theme.bg).bg(theme.accent))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(theme.border))
                .title(Span::styled("Categories", theme.title_style())),
        );
    f.render_widget(chart, area);
}

fn render_pane(f: &mut Frame, pane: &crate::state::Pane, theme: Theme, area: Rect, focused: bool) {
    let inner_height = area.height.saturating_sub(2) as usize;
    // Window ending at the scroll position, so the latest entry stays in
    // view while following.
    let end = (pane.scroll + 1).min(pane.lines.len());
    let start = end.saturating_sub(inner_height);
    let lines: Vec<Line> = pane.lines[start..end]
        .iter()
        .map(|l| Line::from(Span::styled(l.clone(), Style::default().fg(theme.text))))
        .collect();

    let title = format!("{} [{}]", pane.title, pane.state.as_str());
    let paragraph = Paragraph::new(lines).wrap(Wrap { trim: false }).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(theme.focused_border(focused))
            .title(Span::styled(title, theme.title_style())),
    );
    f.render_widget(paragraph, area);
}

fn render_chat_input(f: &mut Frame, app: &App, theme: Theme, area: Rect) {
    let enabled = app.chat.input_enabled();
    let (content, style) = if enabled {
        (
            format!("> {}_", app.chat_input),
            Style::default().fg(theme.text),
        )
    } else {
        (
            "send disabled (channel not open)".to_string(),
            Style::default().fg(theme.muted),
        )
    };
    let paragraph = Paragraph::new(Line::from(Span::styled(content, style))).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(theme.focused_border(enabled && app.focus == Focus::Chat))
            .title(Span::styled("Send", theme.title_style())),
    );
    f.render_widget(paragraph, area);
}

fn render_prompt(f: &mut Frame, theme: Theme, title: &str, body: &str, hint: &str) {
    let area = centered_rect(50, 5, f.size());
    f.render_widget(Clear, area);
    let paragraph = Paragraph::new(Text::from(vec![
        Line::from(Span::styled(body.to_string(), Style::default().fg(theme.text))),
        Line::from(Span::styled(hint.to_string(), Style::default().fg(theme.muted))),
    ]))
    .wrap(Wrap { trim: true })
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.warn))
            .title(Span::styled(title.to_string(), theme.title_style())),
    );
    f.render_widget(paragraph, area);
}

fn render_help(f: &mut Frame, theme: Theme) {
    let area = centered_rect(44, 12, f.size());
    f.render_widget(Clear, area);
    let lines = vec![
        ("Tab", "Cycle focus (users / chat / log)"),
        ("j / k", "Scroll focused panel"),
        ("Enter", "Send chat (chat focus, channel open)"),
        ("b", "Broadcast a server message"),
        ("R", "Restart the server (confirm)"),
        ("?", "Toggle this help"),
        ("q", "Quit"),
    ];
    let text: Vec<Line> = lines
        .into_iter()
        .map(|(keys, what)| {
            Line::from(vec![
                Span::styled(format!("{keys:<8}"), Style::default().fg(theme.accent)),
                Span::styled(what.to_string(), Style::default().fg(theme.text)),
            ])
        })
        .collect();
    let paragraph = Paragraph::new(text).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.border))
            .title(Span::styled("Help", theme.title_style())),
    );
    f.render_widget(paragraph, area);
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    Rect {
        x,
        y,
        width: width.min(area.width),
        height: height.min(area.height),
    }
}
