use crate::app::App;
use redeguara::backend::{Banner, BackendError};
use redeguara::home::Section;
use redeguara::util::{single_line, truncate_to_width};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

use super::helpers::format_relative_time;

/// Render the home screen: banners above the post, product and company
/// sections.
pub fn render(f: &mut Frame, app: &App, area: Rect, spinner: &str) {
    if area.width < 3 || area.height < 3 {
        return;
    }

    let Some(data) = &app.home.data else {
        let text = if app.home.loading {
            format!("{spinner} Loading...")
        } else {
            "Press r to load".to_string()
        };
        let paragraph =
            Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("RedeGuara"));
        f.render_widget(paragraph, area);
        return;
    };

    let top = data.top_banners();
    let banner_height = if top.is_empty() { 0 } else { top.len().min(3) as u16 + 2 };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(banner_height), Constraint::Min(0)])
        .split(area);

    if banner_height > 0 {
        let lines: Vec<Line> = top.iter().take(3).map(|b| banner_line(b)).collect();
        let banners = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Destaques"))
            .wrap(Wrap { trim: true });
        f.render_widget(banners, chunks[0]);
    }

    let width = chunks[1].width.saturating_sub(4) as usize;
    let selected = app.home.selected;
    let mut rows: Vec<ListItem> = Vec::new();
    let mut selected_row = None;
    let mut item_index = 0usize;
    let mut push_item = |rows: &mut Vec<ListItem>, line: Line<'static>| {
        let mut item = ListItem::new(line);
        if item_index == selected {
            selected_row = Some(rows.len());
            item = item.style(Style::default().bg(Color::Rgb(30, 30, 40)));
        }
        rows.push(item);
        item_index += 1;
    };

    rows.push(section_header("Recent posts", &data.posts));
    if let Ok(posts) = &data.posts {
        for post in posts {
            let excerpt = single_line(&post.body);
            let line = Line::from(vec![
                Span::styled(
                    post.author.display_name().to_string(),
                    Style::default().add_modifier(Modifier::BOLD),
                ),
                Span::styled(
                    format!(" {} ", format_relative_time(post.created_at)),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::raw(truncate_to_width(&excerpt, width.saturating_sub(30)).into_owned()),
                Span::styled(
                    format!("  ♥ {}", post.like_count()),
                    Style::default().fg(Color::Gray),
                ),
            ]);
            push_item(&mut rows, line);
        }
    }

    for banner in data.intermediate_banners() {
        rows.push(ListItem::new(banner_line(banner)));
    }

    rows.push(section_header("Products", &data.products));
    if let Ok(products) = &data.products {
        for product in products {
            let price = product
                .price
                .map(|p| format!("  R$ {p:.2}"))
                .unwrap_or_default();
            let contact = if product.whatsapp_number.is_some() {
                "  (o: contact seller)"
            } else {
                ""
            };
            let line = Line::from(vec![
                Span::raw(product.name.clone()),
                Span::styled(price, Style::default().fg(Color::Green)),
                Span::styled(contact, Style::default().fg(Color::DarkGray)),
            ]);
            push_item(&mut rows, line);
        }
    }

    rows.push(section_header("Companies", &data.companies));
    if let Ok(companies) = &data.companies {
        for company in companies {
            let category = company
                .category
                .as_deref()
                .map(|c| format!("  [{c}]"))
                .unwrap_or_default();
            let line = Line::from(vec![
                Span::raw(company.name.clone()),
                Span::styled(category, Style::default().fg(Color::DarkGray)),
            ]);
            push_item(&mut rows, line);
        }
    }

    let title = if app.home.loading {
        format!("Home {spinner}")
    } else {
        "Home".to_string()
    };
    let list = List::new(rows).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title(title),
    );
    let mut state = ListState::default().with_selected(selected_row);
    f.render_stateful_widget(list, chunks[1], &mut state);
}

fn banner_line(banner: &Banner) -> Line<'static> {
    let title = banner.title.clone().unwrap_or_else(|| "Banner".to_string());
    let mut spans = vec![Span::styled(
        format!("■ {title}"),
        Style::default().fg(Color::Yellow),
    )];
    if let Some(link) = &banner.link_url {
        spans.push(Span::styled(format!("  {link}"), Style::default().fg(Color::DarkGray)));
    }
    Line::from(spans)
}

/// Section title, or the reason the section is missing.
fn section_header<T>(title: &str, section: &Section<T>) -> ListItem<'static> {
    let style = Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD);
    let line = match section {
        Ok(rows) if rows.is_empty() => Line::from(vec![
            Span::styled(format!("-- {title} --"), style),
            Span::styled("  nothing here yet", Style::default().fg(Color::DarkGray)),
        ]),
        Ok(_) => Line::from(Span::styled(format!("-- {title} --"), style)),
        Err(e) => section_error(title, e, style),
    };
    ListItem::new(line)
}

fn section_error(title: &str, error: &BackendError, style: Style) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("-- {title} --"), style),
        Span::styled(
            format!("  unavailable: {error}"),
            Style::default().fg(Color::Red),
        ),
    ])
}
