use crate::app::App;
use redeguara::feed::Post;
use redeguara::media::{Carousel, VideoState};
use redeguara::util::{single_line, truncate_to_width, ImageRewriter};
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState},
    Frame,
};

use super::helpers::format_relative_time;

/// Body lines shown per post in the list.
const BODY_PREVIEW_LINES: usize = 3;

/// Render the infinite feed.
pub fn render(f: &mut Frame, app: &mut App, area: Rect) {
    if area.width < 3 || area.height < 3 {
        return;
    }

    // Carousels are created on first render so list items can read them.
    let missing: Vec<Post> = app
        .feed
        .posts()
        .iter()
        .filter(|p| !app.carousels.contains_key(&p.id))
        .cloned()
        .collect();
    for post in &missing {
        app.carousel_for(post);
    }

    let width = area.width.saturating_sub(4) as usize;
    let mut items: Vec<ListItem> = app
        .feed
        .posts()
        .iter()
        .enumerate()
        .map(|(i, post)| {
            let carousel = app.carousels.get(&post.id);
            let mut lines = post_lines(post, carousel, Some(&app.images), width);
            if app.feed.is_like_pending(&post.id) {
                lines.push(Line::from(Span::styled(
                    "  saving like...",
                    Style::default().fg(Color::DarkGray),
                )));
            }
            lines.push(Line::from(""));
            let item = ListItem::new(lines);
            if i == app.feed_selected {
                item.style(Style::default().bg(Color::Rgb(30, 30, 40)))
            } else {
                item
            }
        })
        .collect();

    // Sentinel row: loading, end of feed, or empty
    let cursor = app.feed.cursor();
    let footer = if cursor.is_in_flight() {
        "Loading more posts..."
    } else if !cursor.has_more() && !app.feed.is_empty() {
        "You reached the end"
    } else if app.feed.is_empty() {
        "No posts"
    } else {
        ""
    };
    if !footer.is_empty() {
        items.push(ListItem::new(Line::from(Span::styled(
            footer,
            Style::default().fg(Color::DarkGray),
        ))));
    }

    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(format!("Feed ({})", app.feed.len())),
    );

    let mut state = ListState::default().with_selected(Some(app.feed_selected));
    f.render_stateful_widget(list, area, &mut state);
}

/// Lines for one post in a list: author, body preview, media, counters.
pub(super) fn post_lines(
    post: &Post,
    carousel: Option<&Carousel>,
    rewriter: Option<&ImageRewriter>,
    width: usize,
) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(vec![
        Span::styled(
            post.author.display_name().to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("  {}", format_relative_time(post.created_at)),
            Style::default().fg(Color::DarkGray),
        ),
    ])];

    for line in post.body.lines().filter(|l| !l.trim().is_empty()).take(BODY_PREVIEW_LINES) {
        let line = single_line(line);
        lines.push(Line::from(format!("  {}", truncate_to_width(&line, width))));
    }

    if let Some(media) = carousel.and_then(|c| media_line(c, rewriter, width)) {
        lines.push(media);
    }

    let heart = if post.viewer_has_liked() { "♥" } else { "♡" };
    let heart_style = if post.viewer_has_liked() {
        Style::default().fg(Color::Red)
    } else {
        Style::default().fg(Color::Gray)
    };
    lines.push(Line::from(vec![
        Span::styled(format!("  {} {}", heart, post.like_count()), heart_style),
        Span::styled(
            format!("   💬 {}", post.comment_count),
            Style::default().fg(Color::Gray),
        ),
    ]));
    lines
}

/// `[img 2 / 3] <url>` plus the video placeholder, if any.
pub(super) fn media_line(
    carousel: &Carousel,
    rewriter: Option<&ImageRewriter>,
    width: usize,
) -> Option<Line<'static>> {
    let mut spans = Vec::new();

    if !carousel.is_empty() {
        let label = carousel
            .counter_label()
            .map_or_else(|| "[img]".to_string(), |c| format!("[img {c}]"));
        spans.push(Span::styled(format!("  {label} "), Style::default().fg(Color::Blue)));
        let url = match carousel.image_request_url(rewriter) {
            Some(url) => url.into_owned(),
            None => "(not loaded)".to_string(),
        };
        let room = width.saturating_sub(label.len() + 3);
        spans.push(Span::styled(
            truncate_to_width(&url, room).into_owned(),
            Style::default().fg(Color::DarkGray),
        ));
    }

    if carousel.video().is_some() {
        let label = match carousel.video_state() {
            VideoState::Idle => "  ▶ video (v to play)",
            VideoState::Playing if carousel.loops() => "  ▶ playing (loop)",
            VideoState::Playing => "  ▶ playing",
        };
        spans.push(Span::styled(label, Style::default().fg(Color::Magenta)));
    }

    (!spans.is_empty()).then(|| Line::from(spans))
}
