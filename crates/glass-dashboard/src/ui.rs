use crate::state::{App, ChannelStatus, Pane};
use crate::theme;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

const COMMAND_PANE_HEIGHT: u16 = 7;

pub fn render(f: &mut Frame, app: &App) {
    let area = f.size();
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(6),
            Constraint::Length(COMMAND_PANE_HEIGHT),
            Constraint::Length(1),
        ])
        .split(area);

    render_header(f, app, outer[0]);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(outer[1]);
    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(columns[1]);

    render_pane(f, app, Pane::Events, columns[0]);
    render_pane(f, app, Pane::Agents, right[0]);
    render_pane(f, app, Pane::Jobs, right[1]);
    render_pane(f, app, Pane::Command, outer[2]);
    render_status(f, app, outer[3]);

    if app.show_help {
        render_help(f, app, centered_rect(60, 60, area));
    }
}

fn render_header(f: &mut Frame, app: &App, area: Rect) {
    let line = Line::from(vec![
        Span::styled(" salt-glass ", theme::HEADER_STYLE),
        Span::styled(format!(" source: {} ", app.source_label), theme::HEADER_STYLE),
        Span::styled(format!(" {} ", app.quit_key.label()), theme::KEY_HINT_STYLE),
        Span::styled(" quit ", theme::HEADER_STYLE),
        Span::styled(" Tab ", theme::KEY_HINT_STYLE),
        Span::styled(" pane ", theme::HEADER_STYLE),
        Span::styled(" Space ", theme::KEY_HINT_STYLE),
        Span::styled(" inspect ", theme::HEADER_STYLE),
        Span::styled(" ? ", theme::KEY_HINT_STYLE),
        Span::styled(" help ", theme::HEADER_STYLE),
    ]);
    f.render_widget(Paragraph::new(line).style(theme::HEADER_STYLE), area);
}

fn render_pane(f: &mut Frame, app: &App, pane: Pane, area: Rect) {
    let model = app.model(pane);
    let border_style = if app.active == pane {
        theme::ACTIVE_BORDER_STYLE
    } else {
        theme::BORDER_STYLE
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style)
        .style(theme::LISTBOX_STYLE)
        .title(format!(" {} ({}) ", pane.title(), model.len()));

    if model.is_empty() {
        let placeholder = match pane.channel().and_then(|kind| app.channel(kind)) {
            Some(state) => match &state.status {
                ChannelStatus::Waiting => "waiting for data...".to_string(),
                ChannelStatus::Failed(message) => format!("unavailable: {message}"),
                ChannelStatus::Closed => "closed".to_string(),
                ChannelStatus::Loaded(_) | ChannelStatus::Streaming(_) => "nothing to show".to_string(),
            },
            None => "select a minion or press Space on a row".to_string(),
        };
        let paragraph = Paragraph::new(Span::styled(placeholder, theme::MUTED_STYLE))
            .block(block)
            .wrap(Wrap { trim: true });
        f.render_widget(paragraph, area);
        return;
    }

    let items: Vec<ListItem> = model
        .items()
        .iter()
        .map(|row| ListItem::new(Line::from(Span::styled(row.text.clone(), theme::tone_style(row.tone)))))
        .collect();
    let list = List::new(items)
        .block(block)
        .highlight_style(theme::FOCUS_STYLE)
        .highlight_symbol("> ");
    let mut state = ListState::default();
    state.select(model.focus());
    f.render_stateful_widget(list, area, &mut state);
}

fn render_status(f: &mut Frame, app: &App, area: Rect) {
    let mut spans = Vec::new();
    for (kind, state) in app.channels() {
        let style = match &state.status {
            ChannelStatus::Failed(_) => theme::ERROR_STYLE,
            ChannelStatus::Loaded(_) | ChannelStatus::Streaming(_) => theme::OK_STYLE,
            ChannelStatus::Waiting | ChannelStatus::Closed => theme::MUTED_STYLE,
        };
        let mut label = format!(" {kind}: {}", state.status.label());
        if state.decode_errors > 0 {
            label.push_str(&format!(" ({} bad frames)", state.decode_errors));
        }
        if let Some(exit) = &state.exit {
            label.push_str(&format!(" [{exit}]"));
        }
        spans.push(Span::styled(label, style));
        spans.push(Span::raw(" "));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_help(f: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title("Help")
        .border_style(Style::default().fg(Color::Yellow));
    let inner_area = block.inner(area);
    f.render_widget(Clear, area);
    f.render_widget(block, area);

    let quit = app.quit_key.label();
    let bindings: [(&str, &str); 9] = [
        ("Tab / S-Tab", "Next / previous pane"),
        ("j / Down", "Next row"),
        ("k / Up", "Previous row"),
        ("PgDn / PgUp", "Move ten rows"),
        ("g / Home", "First row"),
        ("G / End", "Last row"),
        ("Space", "Append focused row to command pane"),
        ("? / F1", "Toggle help, Esc closes"),
        (quit.as_str(), "Quit (Ctrl-C also works)"),
    ];
    let mut text = vec![
        Line::from(Span::styled(
            "Keyboard Shortcuts",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
    ];
    for (keys, action) in bindings {
        text.push(Line::from(vec![
            Span::styled(format!("{keys:<12}"), Color::Cyan),
            Span::raw(action),
        ]));
    }
    f.render_widget(Paragraph::new(text).wrap(Wrap { trim: true }), inner_area);
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
