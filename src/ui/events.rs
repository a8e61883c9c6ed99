//! Application event handling.
//!
//! Applies background task results to the app state. Results that belong to
//! a view the user has left are dropped by the generation checks in `App`.

use crate::app::{App, AppEvent, View};
use redeguara::backend::AuthEvent;
use tokio::sync::mpsc;

use super::helpers::{spawn_feed_page, spawn_home_load};

pub(super) fn handle_app_event(app: &mut App, event: AppEvent, event_tx: &mpsc::Sender<AppEvent>) {
    match event {
        AppEvent::HomeLoaded { generation, data } => {
            app.apply_home(generation, data);
        }
        AppEvent::FeedPageLoaded { request, result } => {
            app.apply_feed_page(request, result);
        }
        AppEvent::PostLoaded { generation, result } => {
            app.apply_post_loaded(generation, result);
        }
        AppEvent::CommentsLoaded { generation, result } => {
            app.apply_comments_loaded(generation, result);
        }
        AppEvent::LikeResolved { request, result } => {
            app.resolve_like(request, result);
        }
        AppEvent::PostPublished(result) => {
            app.apply_published(result);
        }
        AppEvent::PostEdited { generation, result } => {
            app.apply_post_edited(generation, result);
        }
        AppEvent::PostDeleted { post_id, result } => {
            app.apply_post_deleted(post_id, result);
        }
        AppEvent::CommentAdded { generation, result } => {
            app.apply_comment_added(generation, result);
        }
        AppEvent::CommentEdited {
            generation,
            comment_id,
            result,
        } => {
            app.apply_comment_edited(generation, comment_id, result);
        }
        AppEvent::CommentDeleted {
            generation,
            comment_id,
            result,
        } => {
            app.apply_comment_deleted(generation, comment_id, result);
        }
        AppEvent::Auth(auth_event) => handle_auth_event(app, auth_event, event_tx),
        AppEvent::SessionRefreshed(result) => app.apply_session_refreshed(result),
        AppEvent::TaskPanicked { task, error } => {
            tracing::error!(task, error, "Background task panicked");
            app.set_status(format!("Internal error in {} task", task));
        }
    }
}

/// Like flags depend on who is signed in, so both lists reload.
fn handle_auth_event(app: &mut App, event: AuthEvent, event_tx: &mpsc::Sender<AppEvent>) {
    tracing::info!(?event, "Auth state changed");
    if !app.on_auth_event(&event) {
        return;
    }
    if let AuthEvent::SignedIn(_) = event {
        if let Some(session) = app.auth.current_session() {
            app.set_status(format!("Signed in as {}", session.display_name()));
        }
    }

    if app.home.data.is_some() || app.view == View::Home {
        spawn_home_load(app, App::home_policy(false), event_tx);
    }
    if !app.feed.is_empty() || app.view == View::Feed {
        if let Some(request) = app.feed.refresh() {
            spawn_feed_page(app, request, event_tx);
        }
    }
}
