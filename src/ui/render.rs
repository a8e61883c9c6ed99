//! Render functions for the TUI.
//!
//! Dispatches to the view for the current screen, then draws overlays on
//! top in a fixed order: image viewer, text entry, confirm, share, help.

use crate::app::{App, ConfirmAction, ShareInfo, TextInput, View};
use redeguara::media::Carousel;
use redeguara::util::truncate_to_width;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use super::help::centered_rect;
use super::{help, home, posts, reader, status};

/// Minimum terminal dimensions required for normal operation.
pub(super) const MIN_WIDTH: u16 = 60;
pub(super) const MIN_HEIGHT: u16 = 10;

const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Main render dispatch function.
pub(super) fn render(f: &mut Frame, app: &mut App) {
    let area = f.area();

    // EDGE-001: Guard against zero-width/height to prevent panics
    if area.width < 1 || area.height < 1 {
        return;
    }

    if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
        let msg = if area.height < 3 || area.width < 20 {
            Paragraph::new("Too small")
        } else {
            Paragraph::new(format!(
                "Terminal too small\n\nMinimum: {}x{}\nCurrent: {}x{}",
                MIN_WIDTH, MIN_HEIGHT, area.width, area.height
            ))
            .alignment(Alignment::Center)
        };
        f.render_widget(msg, area);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)])
        .split(area);

    let spinner = SPINNER[app.spinner_frame % SPINNER.len()];
    match app.view {
        View::Home => home::render(f, app, chunks[0], spinner),
        View::Feed => posts::render(f, app, chunks[0]),
        View::Post => reader::render(f, app, chunks[0], spinner),
    }
    status::render(f, app, chunks[1]);

    let lightbox = match app.view {
        View::Home => None,
        View::Feed => app
            .selected_feed_post()
            .and_then(|p| app.carousels.get(&p.id)),
        View::Post => app.post_view.as_ref().map(|v| &v.carousel),
    };
    if let Some(carousel) = lightbox.filter(|c| c.is_lightbox_open()) {
        render_lightbox(f, app, carousel);
    }

    if let Some(input) = &app.input {
        render_input_overlay(f, input);
    }

    if let Some(confirm) = &app.pending_confirm {
        render_confirm_overlay(f, confirm);
    }

    if let Some(share) = &app.share_overlay {
        render_share_overlay(f, share);
    }

    if app.show_help {
        help::render(f, app);
    }
}

/// Full-screen view of the current image.
fn render_lightbox(f: &mut Frame, app: &App, carousel: &Carousel) {
    let overlay = centered_rect(90, 90, f.area());
    if overlay.width < 20 || overlay.height < 5 {
        return;
    }
    f.render_widget(Clear, overlay);

    let width = overlay.width.saturating_sub(4) as usize;
    let url = carousel
        .image_request_url(Some(&app.images))
        .map(|u| u.into_owned())
        .or_else(|| carousel.current_image().map(str::to_string))
        .unwrap_or_default();
    let counter = carousel.counter_label().unwrap_or_default();

    let text = vec![
        Line::from(""),
        Line::from(Span::styled(counter, Style::default().fg(Color::Cyan))),
        Line::from(""),
        Line::from(truncate_to_width(&url, width).into_owned()),
        Line::from(""),
        Line::from(Span::styled(
            "[ / ] previous/next   z or Esc to close",
            Style::default().fg(Color::DarkGray),
        )),
    ];
    let paragraph = Paragraph::new(text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(" Image "),
        )
        .alignment(Alignment::Center);
    f.render_widget(paragraph, overlay);
}

fn render_input_overlay(f: &mut Frame, input: &TextInput) {
    let area = f.area();
    let width = 70u16.min(area.width.saturating_sub(4));
    let height = 12u16.min(area.height.saturating_sub(4));
    let overlay = Rect::new(
        area.x + (area.width.saturating_sub(width)) / 2,
        area.y + (area.height.saturating_sub(height)) / 2,
        width,
        height,
    );
    if overlay.width < 20 || overlay.height < 6 {
        return;
    }
    f.render_widget(Clear, overlay);

    let text = format!(
        "{}_\n\n({} chars)  (Enter) Send  (Esc) Cancel",
        input.buffer,
        input.buffer.chars().count()
    );
    let paragraph = Paragraph::new(text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(format!(" {} ", input.purpose.title())),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(paragraph, overlay);
}

/// Render a confirmation dialog overlay centered on screen.
fn render_confirm_overlay(f: &mut Frame, confirm: &ConfirmAction) {
    let area = f.area();

    let text = match confirm {
        ConfirmAction::DeletePost { .. } => {
            "Delete this post?\n\nIts comments and likes go with it.\n\n(y) Confirm  (n/Esc) Cancel"
        }
        ConfirmAction::DeleteComment { .. } => {
            "Delete this comment?\n\n\n\n(y) Confirm  (n/Esc) Cancel"
        }
    };

    let width = 50u16.min(area.width.saturating_sub(4));
    let height = 7u16.min(area.height.saturating_sub(4));
    let x = area.x + (area.width.saturating_sub(width)) / 2;
    let y = area.y + (area.height.saturating_sub(height)) / 2;
    let overlay = Rect::new(x, y, width, height);

    if overlay.width < 10 || overlay.height < 5 {
        return;
    }

    f.render_widget(Clear, overlay);

    let paragraph = Paragraph::new(text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow))
                .title(" Confirm "),
        )
        .alignment(Alignment::Center);

    f.render_widget(paragraph, overlay);
}

fn render_share_overlay(f: &mut Frame, share: &ShareInfo) {
    let overlay = centered_rect(80, 60, f.area());
    if overlay.width < 20 || overlay.height < 8 {
        return;
    }
    f.render_widget(Clear, overlay);

    let label = Style::default().fg(Color::Cyan);
    let text = vec![
        Line::from(share.text.clone()),
        Line::from(""),
        Line::from(Span::styled("Link", label)),
        Line::from(share.direct_url.clone()),
        Line::from(Span::styled("Preview link", label)),
        Line::from(share.preview_url.clone()),
        Line::from(Span::styled("WhatsApp", label)),
        Line::from(share.whatsapp_url.clone()),
        Line::from(""),
        Line::from(Span::styled("any key to close", Style::default().fg(Color::DarkGray))),
    ];
    let paragraph = Paragraph::new(text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(" Share "),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(paragraph, overlay);
}
