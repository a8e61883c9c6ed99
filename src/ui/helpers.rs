//! Helper functions for UI operations.
//!
//! Background task spawning, browser opening and time formatting shared
//! across the UI layer.

use crate::app::{App, AppEvent, LikeRequest};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use redeguara::cache::CachePolicy;
use redeguara::compose::PostDraft;
use redeguara::feed::{CommentId, LikeAction, PageRequest, PostId};
use redeguara::util::validate_url_for_open;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::sync::mpsc;

/// Wraps a future to catch panics and convert them to errors.
///
/// Panics are converted to `Err(String)` containing the panic message
/// instead of the task silently disappearing.
pub(super) async fn catch_task_panic<F, T>(future: F) -> Result<T, String>
where
    F: Future<Output = T>,
{
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .map_err(|panic| {
            if let Some(s) = panic.downcast_ref::<&'static str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else if let Some(e) = panic.downcast_ref::<Box<dyn std::error::Error + Send>>() {
                e.to_string()
            } else {
                format!("Unknown panic: {:?}", (*panic).type_id())
            }
        })
}

/// Run `work` in the background and deliver its event to the loop.
///
/// A panic inside `work` is reported as `AppEvent::TaskPanicked`.
pub(super) fn spawn_task<F>(task: &'static str, tx: &mpsc::Sender<AppEvent>, work: F)
where
    F: Future<Output = AppEvent> + Send + 'static,
{
    let tx = tx.clone();
    tokio::spawn(async move {
        let event = match catch_task_panic(work).await {
            Ok(event) => event,
            Err(panic_msg) => {
                tracing::error!(task, error = %panic_msg, "Background task panicked");
                AppEvent::TaskPanicked {
                    task,
                    error: panic_msg,
                }
            }
        };
        if let Err(e) = tx.send(event).await {
            tracing::warn!(error = %e, task, "Channel send failed (receiver dropped)");
        }
    });
}

// ============================================================================
// Loads
// ============================================================================

pub(super) fn spawn_home_load(app: &mut App, policy: CachePolicy, tx: &mpsc::Sender<AppEvent>) {
    let generation = app.begin_home_load();
    let loader = app.home_loader.clone();
    let viewer = app.viewer();
    tracing::debug!(generation, ?policy, "Loading home sections");

    spawn_task("home_load", tx, async move {
        let data = loader.load(viewer.as_ref(), policy).await;
        AppEvent::HomeLoaded { generation, data }
    });
}

pub(super) fn spawn_feed_page(app: &App, request: PageRequest, tx: &mpsc::Sender<AppEvent>) {
    let backend = app.backend.clone();
    let viewer = app.viewer();
    tracing::debug!(page = request.page_index, offset = request.offset, "Loading feed page");

    spawn_task("feed_page", tx, async move {
        let result = backend.fetch_feed_page(request, viewer.as_ref()).await;
        AppEvent::FeedPageLoaded { request, result }
    });
}

/// Fetch a post and its comments for the view opened at `generation`.
pub(super) fn spawn_post_load(
    app: &App,
    post_id: PostId,
    generation: u64,
    tx: &mpsc::Sender<AppEvent>,
) {
    let backend = app.backend.clone();
    let viewer = app.viewer();
    let id = post_id.clone();
    spawn_task("post_load", tx, async move {
        let result = backend.fetch_post(&id, viewer.as_ref()).await;
        AppEvent::PostLoaded { generation, result }
    });

    let backend = app.backend.clone();
    spawn_task("comments_load", tx, async move {
        let result = backend.fetch_comments(&post_id).await;
        AppEvent::CommentsLoaded { generation, result }
    });
}

// ============================================================================
// Writes
// ============================================================================

pub(super) fn spawn_like(app: &App, request: LikeRequest, tx: &mpsc::Sender<AppEvent>) {
    let backend = app.backend.clone();
    spawn_task("like", tx, async move {
        let result = match request.action {
            LikeAction::Like => backend.create_like(&request.post_id, &request.viewer).await,
            LikeAction::Unlike => backend.delete_like(&request.post_id, &request.viewer).await,
        };
        AppEvent::LikeResolved { request, result }
    });
}

pub(super) fn spawn_publish(app: &App, draft: PostDraft, tx: &mpsc::Sender<AppEvent>) {
    let backend = app.backend.clone();
    let viewer = app.viewer();
    spawn_task("publish", tx, async move {
        let result = draft.publish(&backend, viewer.as_ref()).await;
        AppEvent::PostPublished(result)
    });
}

pub(super) fn spawn_post_edit(
    app: &App,
    post_id: PostId,
    body: String,
    tx: &mpsc::Sender<AppEvent>,
) {
    let backend = app.backend.clone();
    let viewer = app.viewer();
    let generation = app.post_generation;
    spawn_task("post_edit", tx, async move {
        let result = backend.update_post_body(&post_id, &body, viewer.as_ref()).await;
        AppEvent::PostEdited { generation, result }
    });
}

pub(super) fn spawn_post_delete(app: &App, post_id: PostId, tx: &mpsc::Sender<AppEvent>) {
    let backend = app.backend.clone();
    spawn_task("post_delete", tx, async move {
        let result = backend.delete_post(&post_id).await;
        AppEvent::PostDeleted { post_id, result }
    });
}

pub(super) fn spawn_comment_add(
    app: &App,
    post_id: PostId,
    body: String,
    tx: &mpsc::Sender<AppEvent>,
) {
    let Some(viewer) = app.viewer() else {
        return;
    };
    let backend = app.backend.clone();
    let generation = app.post_generation;
    spawn_task("comment_add", tx, async move {
        let result = backend.add_comment(&post_id, &viewer, &body).await;
        AppEvent::CommentAdded { generation, result }
    });
}

pub(super) fn spawn_comment_edit(
    app: &App,
    comment_id: CommentId,
    body: String,
    tx: &mpsc::Sender<AppEvent>,
) {
    let backend = app.backend.clone();
    let generation = app.post_generation;
    spawn_task("comment_edit", tx, async move {
        let result = backend.update_comment(&comment_id, &body).await;
        AppEvent::CommentEdited {
            generation,
            comment_id,
            result,
        }
    });
}

pub(super) fn spawn_comment_delete(app: &App, comment_id: CommentId, tx: &mpsc::Sender<AppEvent>) {
    let backend = app.backend.clone();
    let generation = app.post_generation;
    spawn_task("comment_delete", tx, async move {
        let result = backend.delete_comment(&comment_id).await;
        AppEvent::CommentDeleted {
            generation,
            comment_id,
            result,
        }
    });
}

pub(super) fn spawn_session_refresh(app: &mut App, tx: &mpsc::Sender<AppEvent>) {
    if app.refreshing_session {
        return;
    }
    app.refreshing_session = true;
    let auth = app.auth.clone();
    spawn_task("session_refresh", tx, async move {
        let result = auth.refresh_session().await.map(|_| ());
        AppEvent::SessionRefreshed(result)
    });
}

// ============================================================================
// Browser and formatting
// ============================================================================

/// Open `url` in the system browser after validating it.
pub(super) fn open_in_browser(app: &mut App, url: &str) {
    // SEC: Validate URL before open::that() to prevent command injection
    match validate_url_for_open(url) {
        Err(e) => app.set_status(e.to_string()),
        Ok(url) => {
            if let Err(e) = open::that(url.as_str()) {
                app.set_status(format!("Failed to open browser: {}", e));
            }
        }
    }
}

/// Format a timestamp relative to now: `5m`, `3h`, `2d`, then `Mar 04`.
pub(super) fn format_relative_time(timestamp: DateTime<Utc>) -> String {
    format_relative_time_at(timestamp, Utc::now())
}

fn format_relative_time_at(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = (now - timestamp).num_seconds();

    // Clock skew between client and server
    if diff < 60 {
        return "now".to_string();
    }
    if diff < 3600 {
        return format!("{}m", diff / 60);
    }
    if diff < 86400 {
        return format!("{}h", diff / 3600);
    }
    if diff < 604800 {
        return format!("{}d", diff / 86400);
    }
    timestamp.format("%b %d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[tokio::test]
    async fn test_catch_task_panic_reports_message() {
        let result: Result<(), String> = catch_task_panic(async { panic!("boom") }).await;
        assert_eq!(result.unwrap_err(), "boom");

        let ok = catch_task_panic(async { 7 }).await;
        assert_eq!(ok, Ok(7));
    }

    #[tokio::test]
    async fn test_spawn_task_converts_panic_to_event() {
        let (tx, mut rx) = mpsc::channel(4);
        spawn_task("exploding", &tx, async { panic!("kaboom") });

        match rx.recv().await {
            Some(AppEvent::TaskPanicked { task, error }) => {
                assert_eq!(task, "exploding");
                assert_eq!(error, "kaboom");
            }
            _ => panic!("expected TaskPanicked"),
        }
    }

    #[test]
    fn test_relative_time_buckets() {
        let now = Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap();
        assert_eq!(format_relative_time_at(now, now), "now");
        assert_eq!(format_relative_time_at(now + Duration::minutes(5), now), "now");
        assert_eq!(format_relative_time_at(now - Duration::minutes(5), now), "5m");
        assert_eq!(format_relative_time_at(now - Duration::hours(3), now), "3h");
        assert_eq!(format_relative_time_at(now - Duration::days(2), now), "2d");
        assert_eq!(format_relative_time_at(now - Duration::days(16), now), "Mar 04");
    }
}
