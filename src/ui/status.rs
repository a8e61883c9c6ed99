use crate::app::{App, View};
use crate::keybindings::Context;
use ratatui::{
    layout::Rect,
    style::{Color, Style},
    widgets::Paragraph,
    Frame,
};
use std::borrow::Cow;

/// Render the status bar
pub fn render(f: &mut Frame, app: &App, area: Rect) {
    // EDGE-001: Guard against zero-width/height areas
    if area.width < 1 || area.height < 1 {
        return;
    }

    let hints: Cow<'_, str> = if let Some((msg, _)) = &app.status_message {
        Cow::Borrowed(msg.as_ref())
    } else if app.input.is_some() {
        Cow::Borrowed("Type your text | ENTER send | ESC cancel")
    } else if app.key_context() == Context::Lightbox {
        Cow::Borrowed("[ / ] previous/next image  z/Esc close")
    } else {
        match app.view {
            View::Home => Cow::Borrowed("[Enter]open [o]pen link [r]efresh [n]ew post [Tab]feed [?]help [q]uit"),
            View::Feed => Cow::Borrowed(
                "[Enter]open [l]ike [ / ]images [v]ideo [z]oom [s]hare [n]ew [Tab]home [?]help",
            ),
            View::Post => Cow::Borrowed(
                "[b]ack [l]ike [c]omment [e]dit [d]elete [s]hare [o]pen [j/k]comments [?]help",
            ),
        }
    };

    let text: Cow<'_, str> = match app.auth.current_session() {
        Some(session) if app.status_message.is_none() => {
            Cow::Owned(format!("{} | {}", session.display_name(), hints))
        }
        _ => hints,
    };

    let style = Style::default().bg(Color::DarkGray).fg(Color::White);

    let paragraph = Paragraph::new(text).style(style);
    f.render_widget(paragraph, area);
}
