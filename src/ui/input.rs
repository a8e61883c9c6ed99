//! Input handling for the TUI.
//!
//! Overlays capture keys first (help, share, confirm, text entry); everything
//! else is resolved through the keybinding registry for the current context.

use crate::app::{App, AppEvent, ConfirmAction, HomeItem, InputPurpose, TextInput, View};
use crate::keybindings::Action as KbAction;
use anyhow::Result;
use crossterm::event::{KeyCode, KeyModifiers};
use redeguara::compose::{validate_text, PostDraft};
use redeguara::feed::Post;
use redeguara::media::Carousel;
use redeguara::util::seller_contact_url;
use redeguara::ActionError;
use tokio::sync::mpsc;

use super::helpers::{
    open_in_browser, spawn_comment_add, spawn_comment_delete, spawn_comment_edit, spawn_feed_page,
    spawn_home_load, spawn_like, spawn_post_delete, spawn_post_edit, spawn_post_load,
    spawn_publish,
};
use super::Action;

/// Cap on text entry so a held key cannot grow the buffer without bound.
const MAX_INPUT_CHARS: usize = 5000;

/// Main input dispatch function.
pub(super) fn handle_input(
    app: &mut App,
    code: KeyCode,
    modifiers: KeyModifiers,
    event_tx: &mpsc::Sender<AppEvent>,
) -> Result<Action> {
    if app.show_help {
        return Ok(handle_help_input(app, code));
    }

    // Any key dismisses the share overlay
    if app.share_overlay.take().is_some() {
        return Ok(Action::Continue);
    }

    if app.pending_confirm.is_some() {
        return Ok(handle_confirm_input(app, code, event_tx));
    }

    if app.input.is_some() {
        return Ok(handle_text_input(app, code, event_tx));
    }

    let context = app.key_context();
    let Some(action) = app.keybindings.action_for_key(code, modifiers, context) else {
        return Ok(Action::Continue);
    };

    match action {
        KbAction::Quit => return Ok(Action::Quit),
        KbAction::NavDown => {
            app.nav_down();
            after_feed_move(app, event_tx);
        }
        KbAction::NavUp => {
            app.nav_up();
            after_feed_move(app, event_tx);
        }
        KbAction::SwitchView => {
            let view = app.switch_view();
            enter_view(app, view, event_tx);
        }
        KbAction::Back => handle_back(app),
        KbAction::OpenPost => handle_open(app, event_tx),
        KbAction::Refresh => handle_refresh(app, event_tx),
        KbAction::ToggleLike => {
            let started = match app.view {
                View::Feed => app.begin_feed_like(),
                View::Post => app.begin_detail_like(),
                View::Home => return Ok(Action::Continue),
            };
            match started {
                Ok(request) => spawn_like(app, request, event_tx),
                Err(e) => app.report(&e),
            }
        }
        KbAction::PrevImage => {
            if let Some(carousel) = focused_carousel(app) {
                carousel.prev();
            }
        }
        KbAction::NextImage => {
            if let Some(carousel) = focused_carousel(app) {
                carousel.next();
            }
        }
        KbAction::PlayVideo => {
            let video = focused_carousel(app).and_then(|c| {
                c.play_video();
                c.video().map(str::to_string)
            });
            match video {
                Some(url) => open_in_browser(app, &url),
                None => app.set_status("This post has no video"),
            }
        }
        KbAction::Lightbox => {
            let opened = focused_carousel(app).is_some_and(Carousel::open_lightbox);
            if !opened {
                app.set_status("No images to show");
            }
        }
        KbAction::NewPost => {
            if app.viewer().is_none() {
                app.report(&ActionError::Unauthenticated);
            } else {
                app.input = Some(TextInput {
                    purpose: InputPurpose::NewPost,
                    buffer: String::new(),
                });
            }
        }
        KbAction::Comment => {
            if app.viewer().is_none() {
                app.report(&ActionError::Unauthenticated);
            } else if app.post_view.as_ref().is_some_and(|v| v.post.is_some()) {
                app.input = Some(TextInput {
                    purpose: InputPurpose::Comment,
                    buffer: String::new(),
                });
            }
        }
        KbAction::Edit => handle_edit(app),
        KbAction::Delete => handle_delete(app),
        KbAction::OpenInBrowser => handle_open_in_browser(app),
        KbAction::Share => {
            if let Some(post) = focused_post(app) {
                let info = app.share_info(post);
                app.share_overlay = Some(info);
            }
        }
        KbAction::ShowHelp => {
            app.show_help = true;
            app.help_scroll_offset = 0;
        }
    }

    Ok(Action::Continue)
}

/// Captures all keys: j/k/Up/Down scroll, Esc/q/? dismiss.
fn handle_help_input(app: &mut App, code: KeyCode) -> Action {
    match code {
        KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('?') => {
            app.show_help = false;
            app.help_scroll_offset = 0;
        }
        KeyCode::Char('j') | KeyCode::Down => {
            app.help_scroll_offset = app.help_scroll_offset.saturating_add(1);
        }
        KeyCode::Char('k') | KeyCode::Up => {
            app.help_scroll_offset = app.help_scroll_offset.saturating_sub(1);
        }
        _ => {}
    }
    Action::Continue
}

fn handle_confirm_input(app: &mut App, code: KeyCode, event_tx: &mpsc::Sender<AppEvent>) -> Action {
    match code {
        KeyCode::Char('y') | KeyCode::Char('Y') => match app.pending_confirm.take() {
            Some(ConfirmAction::DeletePost { post_id }) => {
                app.set_status("Deleting post...");
                spawn_post_delete(app, post_id, event_tx);
            }
            Some(ConfirmAction::DeleteComment { comment_id }) => {
                app.set_status("Deleting comment...");
                spawn_comment_delete(app, comment_id, event_tx);
            }
            None => {}
        },
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
            app.pending_confirm = None;
            app.set_status("Cancelled");
        }
        _ => {}
    }
    Action::Continue
}

fn handle_text_input(app: &mut App, code: KeyCode, event_tx: &mpsc::Sender<AppEvent>) -> Action {
    let Some(mut input) = app.input.take() else {
        return Action::Continue;
    };
    match code {
        KeyCode::Char(c) => {
            if input.buffer.chars().count() < MAX_INPUT_CHARS {
                input.buffer.push(c);
            }
            app.input = Some(input);
        }
        KeyCode::Backspace => {
            input.buffer.pop();
            app.input = Some(input);
        }
        KeyCode::Enter => {
            if let Err(e) = submit_input(app, &input, event_tx) {
                app.report(&e);
                // Keep the text so the user can fix it
                if matches!(e, ActionError::Validation(_)) {
                    app.input = Some(input);
                }
            }
        }
        KeyCode::Esc => {
            // input is already None from take()
        }
        _ => app.input = Some(input),
    }
    Action::Continue
}

fn submit_input(
    app: &mut App,
    input: &TextInput,
    event_tx: &mpsc::Sender<AppEvent>,
) -> Result<(), ActionError> {
    match &input.purpose {
        InputPurpose::NewPost => {
            let draft = PostDraft::new(input.buffer.as_str());
            draft.validate()?;
            app.set_status("Publishing...");
            spawn_publish(app, draft, event_tx);
        }
        InputPurpose::Comment => {
            let body = validate_text(&input.buffer)?.to_string();
            let post_id = app
                .post_view
                .as_ref()
                .map(|v| v.post_id.clone())
                .ok_or_else(|| ActionError::NotFound("post".into()))?;
            if app.viewer().is_none() {
                return Err(ActionError::Unauthenticated);
            }
            spawn_comment_add(app, post_id, body, event_tx);
        }
        InputPurpose::EditPost => {
            let (post_id, body) = app.begin_post_edit(&input.buffer)?;
            spawn_post_edit(app, post_id, body, event_tx);
        }
        InputPurpose::EditComment(comment_id) => {
            let body = app.begin_comment_edit(comment_id, &input.buffer)?;
            spawn_comment_edit(app, comment_id.clone(), body, event_tx);
        }
    }
    Ok(())
}

// ============================================================================
// Navigation
// ============================================================================

/// Moving onto an item in the feed makes it visible.
fn after_feed_move(app: &mut App, event_tx: &mpsc::Sender<AppEvent>) {
    if app.view != View::Feed {
        return;
    }
    if let Some(request) = app.feed_visible() {
        spawn_feed_page(app, request, event_tx);
    }
}

/// First visit to a view loads its data.
fn enter_view(app: &mut App, view: View, event_tx: &mpsc::Sender<AppEvent>) {
    match view {
        View::Home => {
            if app.home.data.is_none() && !app.home.loading {
                spawn_home_load(app, App::home_policy(false), event_tx);
            }
        }
        View::Feed => {
            if app.feed.is_empty() {
                if let Some(request) = app.feed.next_page() {
                    spawn_feed_page(app, request, event_tx);
                }
            } else {
                after_feed_move(app, event_tx);
            }
        }
        View::Post => {}
    }
}

fn handle_back(app: &mut App) {
    if let Some(carousel) = focused_carousel(app) {
        if carousel.is_lightbox_open() {
            carousel.close_lightbox();
            return;
        }
    }
    if app.view == View::Post {
        app.close_post();
    }
}

fn handle_open(app: &mut App, event_tx: &mpsc::Sender<AppEvent>) {
    let post = match app.view {
        View::Home => match app.home.selected_item() {
            Some(HomeItem::Post(_)) => app.home.selected_post().cloned(),
            Some(_) => return handle_open_in_browser(app),
            None => None,
        },
        View::Feed => app.selected_feed_post().cloned(),
        View::Post => None,
    };
    if let Some(post) = post {
        let post_id = post.id.clone();
        let generation = app.open_post(post_id.clone(), Some(post));
        spawn_post_load(app, post_id, generation, event_tx);
    }
}

fn handle_refresh(app: &mut App, event_tx: &mpsc::Sender<AppEvent>) {
    match app.view {
        View::Home => {
            app.set_status("Refreshing...");
            spawn_home_load(app, App::home_policy(true), event_tx);
        }
        View::Feed => {
            if let Some(request) = app.feed.refresh() {
                app.set_status("Refreshing...");
                spawn_feed_page(app, request, event_tx);
            }
        }
        View::Post => {
            if let Some(post_id) = app.post_view.as_ref().map(|v| v.post_id.clone()) {
                let generation = app.post_generation;
                spawn_post_load(app, post_id, generation, event_tx);
            }
        }
    }
}

// ============================================================================
// Edit and delete
// ============================================================================

fn handle_edit(app: &mut App) {
    let viewer = app.viewer();
    let Some(view) = app.post_view.as_ref() else {
        return;
    };

    let input = match view.selected_comment() {
        Some(comment) if comment.is_authored_by(viewer.as_ref()) => TextInput {
            purpose: InputPurpose::EditComment(comment.id.clone()),
            buffer: comment.body.clone(),
        },
        Some(_) => return app.set_status("You can only edit your own comments"),
        None => match &view.post {
            Some(post) if post.is_authored_by(viewer.as_ref()) => TextInput {
                purpose: InputPurpose::EditPost,
                buffer: post.body.clone(),
            },
            Some(_) => return app.set_status("You can only edit your own posts"),
            None => return,
        },
    };
    app.input = Some(input);
}

fn handle_delete(app: &mut App) {
    let viewer = app.viewer();
    let Some(view) = app.post_view.as_ref() else {
        return;
    };

    let confirm = match view.selected_comment() {
        Some(comment) if comment.is_authored_by(viewer.as_ref()) => ConfirmAction::DeleteComment {
            comment_id: comment.id.clone(),
        },
        Some(_) => return app.set_status("You can only delete your own comments"),
        None => match &view.post {
            Some(post) if app.can_remove_post(post) => ConfirmAction::DeletePost {
                post_id: post.id.clone(),
            },
            Some(_) => return app.set_status("You can only delete your own posts"),
            None => return,
        },
    };
    app.pending_confirm = Some(confirm);
}

// ============================================================================
// Focus helpers
// ============================================================================

fn focused_post(app: &App) -> Option<&Post> {
    match app.view {
        View::Home => app.home.selected_post(),
        View::Feed => app.selected_feed_post(),
        View::Post => app.post_view.as_ref()?.post.as_ref(),
    }
}

fn focused_carousel(app: &mut App) -> Option<&mut Carousel> {
    match app.view {
        View::Home => None,
        View::Feed => app.selected_feed_carousel(),
        View::Post => app.post_view.as_mut().map(|v| &mut v.carousel),
    }
}

fn handle_open_in_browser(app: &mut App) {
    let url = match (app.view, app.home.selected_item()) {
        (View::Home, Some(HomeItem::Product(i))) => {
            let product = app
                .home
                .data
                .as_ref()
                .and_then(|d| d.products.as_ref().ok())
                .and_then(|p| p.get(i));
            match product {
                Some(p) => seller_contact_url(p.whatsapp_number.as_deref(), &p.name),
                None => None,
            }
        }
        (View::Home, Some(HomeItem::Company(_))) => None,
        _ => focused_post(app).map(|p| app.share.direct_url(p)),
    };
    match url {
        Some(url) => open_in_browser(app, &url),
        None => app.set_status("No link to open"),
    }
}
