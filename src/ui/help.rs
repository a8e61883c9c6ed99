//! Help overlay: keybindings grouped by where they apply.
//!
//! Shows the effective bindings, config overrides included.

use crate::app::App;
use crate::keybindings::{Action, Context};
use ratatui::{
    layout::{Constraint, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Row, Table},
    Frame,
};

const CONTEXT_ORDER: [(Context, &str); 5] = [
    (Context::Global, "Everywhere"),
    (Context::Home, "Home"),
    (Context::Feed, "Feed"),
    (Context::Post, "Post"),
    (Context::Lightbox, "Image viewer"),
];

/// One row of the help table.
#[derive(Debug, PartialEq, Eq)]
enum HelpRow {
    Heading(&'static str),
    Binding { keys: String, description: &'static str },
    Spacer,
}

/// Group bindings by context. Keys bound to the same action in the same
/// context share a row.
fn help_rows(bindings: &[(Context, String, Action, &'static str)]) -> Vec<HelpRow> {
    let mut rows = Vec::new();
    for (ctx, label) in CONTEXT_ORDER {
        let mut merged: Vec<(Action, Vec<&str>, &'static str)> = Vec::new();
        for (_, key, action, description) in bindings.iter().filter(|(c, ..)| *c == ctx) {
            match merged.iter_mut().find(|(a, ..)| a == action) {
                Some((_, keys, _)) => keys.push(key.as_str()),
                None => merged.push((*action, vec![key.as_str()], *description)),
            }
        }
        if merged.is_empty() {
            continue;
        }

        if !rows.is_empty() {
            rows.push(HelpRow::Spacer);
        }
        rows.push(HelpRow::Heading(label));
        rows.extend(merged.into_iter().map(|(_, keys, description)| HelpRow::Binding {
            keys: keys.join(", "),
            description,
        }));
    }
    rows
}

/// Render the help overlay on top of the current view.
pub fn render(f: &mut Frame, app: &App) {
    let overlay = centered_rect(80, 80, f.area());
    if overlay.width < 20 || overlay.height < 6 {
        return;
    }
    f.render_widget(Clear, overlay);

    let rows: Vec<Row> = help_rows(&app.keybindings.all_bindings())
        .into_iter()
        .map(|row| match row {
            HelpRow::Heading(label) => Row::new(vec![
                Line::from(Span::styled(
                    label,
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(""),
            ])
            .style(Style::default().fg(Color::Cyan)),
            HelpRow::Binding { keys, description } => {
                Row::new(vec![format!("  {keys}"), description.to_string()])
            }
            HelpRow::Spacer => Row::new(vec![String::new(), String::new()]),
        })
        .collect();

    let total_rows = rows.len();
    let visible_height = overlay.height.saturating_sub(3) as usize; // borders + header
    let max_scroll = total_rows.saturating_sub(visible_height);
    let scroll = app.help_scroll_offset.min(max_scroll);
    let visible_rows: Vec<Row> = rows.into_iter().skip(scroll).take(visible_height).collect();

    let title = if max_scroll > 0 {
        format!(" Help ({}/{}) ", scroll + 1, max_scroll + 1)
    } else {
        " Help (? to close) ".to_string()
    };

    let table = Table::new(visible_rows, [Constraint::Length(20), Constraint::Min(20)])
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(title),
        )
        .header(
            Row::new(vec!["Key", "Action"])
                .style(
                    Style::default()
                        .add_modifier(Modifier::BOLD)
                        .add_modifier(Modifier::UNDERLINED),
                )
                .bottom_margin(1),
        );
    f.render_widget(table, overlay);

    if scroll < max_scroll {
        let hint_area = Rect {
            x: overlay.x + 1,
            y: overlay.y + overlay.height.saturating_sub(1),
            width: overlay.width.saturating_sub(2),
            height: 1,
        };
        let hint = Span::styled(
            " j/k to scroll, ? or Esc to close ",
            Style::default().fg(Color::DarkGray),
        );
        f.render_widget(Paragraph::new(Line::from(hint)), hint_area);
    }
}

/// Create a centered rectangle with the given percentage of the parent area.
pub(super) fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let width = area.width * percent_x / 100;
    let height = area.height * percent_y / 100;
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width, height)
}
