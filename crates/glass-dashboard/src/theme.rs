use crate::state::Tone;
use glass_core::{EventCategory, KeyCategory};
use ratatui::style::{Color, Modifier, Style};

pub const HEADER_STYLE: Style = Style::new()
    .fg(Color::Black)
    .bg(Color::Cyan)
    .add_modifier(Modifier::BOLD);
pub const KEY_HINT_STYLE: Style = Style::new()
    .fg(Color::Yellow)
    .bg(Color::Blue)
    .add_modifier(Modifier::BOLD);
pub const LISTBOX_STYLE: Style = Style::new().fg(Color::Gray).bg(Color::Black);
pub const FOCUS_STYLE: Style = Style::new().add_modifier(Modifier::REVERSED);
pub const BORDER_STYLE: Style = Style::new().fg(Color::DarkGray);
pub const ACTIVE_BORDER_STYLE: Style = Style::new().fg(Color::Cyan).add_modifier(Modifier::BOLD);
pub const MUTED_STYLE: Style = Style::new().fg(Color::DarkGray);
pub const ERROR_STYLE: Style = Style::new().fg(Color::LightRed).add_modifier(Modifier::BOLD);
pub const OK_STYLE: Style = Style::new().fg(Color::LightGreen);

pub fn key_category_style(category: KeyCategory) -> Style {
    let fg = match category {
        KeyCategory::Accepted => Color::LightGreen,
        KeyCategory::Denied => Color::Red,
        KeyCategory::Pending => Color::Blue,
        KeyCategory::Rejected => Color::LightRed,
        KeyCategory::Local => Color::Gray,
    };
    Style::new().fg(fg).bg(Color::Black)
}

pub fn event_category_style(category: EventCategory) -> Style {
    let fg = match category {
        EventCategory::Job => Color::Cyan,
        EventCategory::Return => Color::Green,
        EventCategory::Run => Color::Magenta,
        EventCategory::Auth => Color::Yellow,
        EventCategory::Key => Color::LightYellow,
        EventCategory::Presence => Color::LightBlue,
        EventCategory::Other => Color::Gray,
    };
    Style::new().fg(fg)
}

pub fn tone_style(tone: Tone) -> Style {
    match tone {
        Tone::Key(category) => key_category_style(category),
        Tone::Job => LISTBOX_STYLE,
        Tone::Event(category) => event_category_style(category),
        Tone::Failure => ERROR_STYLE,
        Tone::Command => Style::new().fg(Color::White),
        Tone::Detail => Style::new().fg(Color::LightCyan),
    }
}
