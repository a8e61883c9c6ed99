use crate::app::{App, CommentsState, PostView, MAX_SCROLL};
use redeguara::backend::Comment;
use redeguara::util::strip_control_chars;
use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};

use super::helpers::format_relative_time;
use super::posts::media_line;

/// Render a single post with its comments.
pub fn render(f: &mut Frame, app: &App, area: Rect, spinner: &str) {
    // EDGE-001: Guard against zero-width/height areas
    if area.width < 3 || area.height < 3 {
        return;
    }

    let Some(view) = app.post_view.as_ref() else {
        let paragraph = Paragraph::new("No post selected")
            .block(Block::default().borders(Borders::ALL).title("Post"));
        f.render_widget(paragraph, area);
        return;
    };

    let width = area.width.saturating_sub(4) as usize;
    let viewer = app.viewer();
    let mut lines = post_section(view, app, width, spinner);
    let mut selected_line = None;

    lines.push(Line::from(Span::styled(
        "Comments",
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    )));
    match &view.comments {
        CommentsState::Loading => lines.push(Line::from(format!("{spinner} Loading comments..."))),
        CommentsState::Failed(error) => lines.push(Line::from(Span::styled(
            format!("Could not load comments: {error}"),
            Style::default().fg(Color::Red),
        ))),
        CommentsState::Loaded(comments) if comments.is_empty() => {
            lines.push(Line::from(Span::styled(
                "No comments yet. Press c to comment.",
                Style::default().fg(Color::DarkGray),
            )));
        }
        CommentsState::Loaded(comments) => {
            for (i, comment) in comments.iter().enumerate() {
                let selected = view.selected_comment == Some(i);
                if selected {
                    selected_line = Some(lines.len());
                }
                let pending = view.pending_comment_edits.contains_key(&comment.id);
                let own = comment.is_authored_by(viewer.as_ref());
                lines.extend(comment_lines(comment, selected, pending, own));
            }
        }
    }

    // Keep the selected comment in the upper third of the panel
    let visible = area.height.saturating_sub(2) as usize;
    let scroll = match selected_line {
        Some(line) => line.saturating_sub(visible / 3),
        None => view.scroll_offset.min(lines.len().saturating_sub(1)),
    };

    let title = if view.selected_comment.is_none() && view.post.is_some() {
        "Post *"
    } else {
        "Post"
    };
    let paragraph = Paragraph::new(Text::from(lines))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(title),
        )
        .wrap(Wrap { trim: false })
        .scroll((scroll.min(MAX_SCROLL) as u16, 0));

    f.render_widget(paragraph, area);
}

fn post_section(view: &PostView, app: &App, width: usize, spinner: &str) -> Vec<Line<'static>> {
    let Some(post) = &view.post else {
        let text = match &view.load_error {
            Some(error) => Line::from(Span::styled(error.clone(), Style::default().fg(Color::Red))),
            None => Line::from(format!("{spinner} Loading post...")),
        };
        return vec![text, Line::from("")];
    };

    let mut lines = vec![
        Line::from(Span::styled(
            post.author.display_name().to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(Span::styled(
            format_relative_time(post.created_at),
            Style::default().fg(Color::DarkGray),
        )),
        Line::from(""),
    ];

    lines.extend(render_markdown(&strip_control_chars(&post.body)));
    if view.pending_body.is_some() {
        lines.push(Line::from(Span::styled("saving...", Style::default().fg(Color::DarkGray))));
    }

    if let Some(media) = media_line(&view.carousel, Some(&app.images), width) {
        lines.push(media);
        lines.push(Line::from(""));
    }

    let liked = post.viewer_has_liked();
    let mut counters = vec![
        Span::styled(
            format!("{} {}", if liked { "♥" } else { "♡" }, post.like_count()),
            Style::default().fg(if liked { Color::Red } else { Color::Gray }),
        ),
        Span::styled(
            format!("   💬 {}", post.comment_count),
            Style::default().fg(Color::Gray),
        ),
    ];
    if view.pending_like.is_some() {
        counters.push(Span::styled("   saving like...", Style::default().fg(Color::DarkGray)));
    }
    lines.push(Line::from(counters));
    lines.push(Line::from(""));
    lines
}

fn comment_lines(comment: &Comment, selected: bool, pending: bool, own: bool) -> Vec<Line<'static>> {
    let marker = if selected { "> " } else { "  " };
    let mut header = vec![
        Span::raw(marker),
        Span::styled(
            comment.author.display_name().to_string(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            format!("  {}", format_relative_time(comment.created_at)),
            Style::default().fg(Color::DarkGray),
        ),
    ];
    if comment.is_edited() {
        header.push(Span::styled(" (edited)", Style::default().fg(Color::DarkGray)));
    }
    if own && selected {
        header.push(Span::styled("  [e]dit [d]elete", Style::default().fg(Color::DarkGray)));
    }
    if pending {
        header.push(Span::styled("  saving...", Style::default().fg(Color::DarkGray)));
    }

    let body_style = if selected {
        Style::default().fg(Color::White)
    } else {
        Style::default()
    };
    let mut lines = vec![Line::from(header)];
    lines.extend(
        strip_control_chars(&comment.body)
            .lines()
            .map(|l| Line::from(Span::styled(format!("    {l}"), body_style))),
    );
    lines.push(Line::from(""));
    lines
}

/// Convert markdown to styled ratatui Lines.
/// Returns owned Lines for caching (PERF-004).
pub fn render_markdown(md: &str) -> Vec<Line<'static>> {
    let parser = Parser::new(md);
    // Estimate: markdown lines roughly map to output lines
    let mut lines: Vec<Line<'static>> = Vec::with_capacity(md.lines().count());
    // Most lines have few styled spans (text, emphasis, code, etc.)
    let mut current_spans: Vec<Span<'static>> = Vec::with_capacity(4);
    let mut in_code_block = false;
    let mut in_heading = false;
    let mut in_emphasis = false;
    let mut in_strong = false;

    for event in parser {
        match event {
            Event::Start(Tag::Heading { .. }) => {
                in_heading = true;
            }
            Event::End(TagEnd::Heading(_)) => {
                if !current_spans.is_empty() {
                    lines.push(Line::from(std::mem::take(&mut current_spans)));
                }
                in_heading = false;
            }
            Event::Start(Tag::Paragraph) => {}
            Event::End(TagEnd::Paragraph) => {
                if !current_spans.is_empty() {
                    lines.push(Line::from(std::mem::take(&mut current_spans)));
                }
                lines.push(Line::from("")); // Blank line after paragraph
            }
            Event::Start(Tag::CodeBlock(_)) => {
                in_code_block = true;
            }
            Event::End(TagEnd::CodeBlock) => {
                in_code_block = false;
                lines.push(Line::from(""));
            }
            Event::Start(Tag::Emphasis) => {
                in_emphasis = true;
            }
            Event::End(TagEnd::Emphasis) => {
                in_emphasis = false;
            }
            Event::Start(Tag::Strong) => {
                in_strong = true;
            }
            Event::End(TagEnd::Strong) => {
                in_strong = false;
            }
            Event::Start(Tag::Link { .. }) => {
                // Links will show URL after text
            }
            Event::End(TagEnd::Link) => {}
            Event::Start(Tag::Image { dest_url, .. }) => {
                current_spans.push(Span::styled(
                    format!("[Image: {}]", dest_url),
                    Style::default().fg(Color::Blue),
                ));
            }
            Event::Text(text) => {
                let style = if in_code_block {
                    Style::default().fg(Color::Yellow).bg(Color::Black)
                } else if in_heading {
                    Style::default()
                        .add_modifier(Modifier::BOLD)
                        .fg(Color::Cyan)
                } else if in_strong {
                    Style::default().add_modifier(Modifier::BOLD)
                } else if in_emphasis {
                    Style::default().add_modifier(Modifier::ITALIC)
                } else {
                    Style::default()
                };
                // PERF-011: CowStr::into_string() is O(1) for Boxed variant (no allocation),
                // vs .to_string() which always allocates
                current_spans.push(Span::styled(text.into_string(), style));
            }
            Event::Code(code) => {
                current_spans.push(Span::styled(
                    format!("`{}`", code),
                    Style::default().fg(Color::Yellow),
                ));
            }
            Event::SoftBreak => {
                current_spans.push(Span::raw(" "));
            }
            Event::HardBreak => {
                if !current_spans.is_empty() {
                    lines.push(Line::from(std::mem::take(&mut current_spans)));
                }
            }
            _ => {}
        }
    }

    // Flush remaining spans
    if !current_spans.is_empty() {
        lines.push(Line::from(current_spans));
    }

    lines
}
