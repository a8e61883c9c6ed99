use crate::keybindings::{Context as KbContext, KeybindingRegistry};
use redeguara::backend::{AuthClient, AuthEvent, Backend, BackendError, Comment};
use redeguara::cache::{CachePolicy, SessionCache};
use redeguara::compose::validate_text;
use redeguara::config::Config;
use redeguara::feed::{
    CommentId, FeedState, LikeAction, LikeState, PageRequest, PendingLike, Post, PostId,
    Transaction, UserId,
};
use redeguara::home::{HomeData, HomeLoader};
use redeguara::media::{Carousel, PlaybackMode};
use redeguara::util::{ImageRewriter, ShareLinks};
use redeguara::ActionError;
use std::borrow::Cow;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Maximum scroll offset for the post view (ratatui u16 limit).
pub const MAX_SCROLL: usize = u16::MAX as usize;

/// How long a status message stays on screen.
const STATUS_TTL_SECS: u64 = 3;

/// Refresh the session this long before the access token expires.
const SESSION_REFRESH_MARGIN_SECS: i64 = 60;

/// Wait between attempts after a failed session refresh.
const SESSION_RETRY_SECS: u64 = 30;

// ============================================================================
// View State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Home,
    Feed,
    Post,
}

/// Selectable rows of the home screen, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomeItem {
    Post(usize),
    Product(usize),
    Company(usize),
}

#[derive(Default)]
pub struct HomeScreen {
    pub data: Option<HomeData>,
    pub loading: bool,
    pub selected: usize,
}

impl HomeScreen {
    pub fn items(&self) -> Vec<HomeItem> {
        let Some(data) = &self.data else {
            return Vec::new();
        };
        let count = |section: Option<usize>| section.unwrap_or(0);
        let posts = count(data.posts.as_ref().ok().map(Vec::len));
        let products = count(data.products.as_ref().ok().map(Vec::len));
        let companies = count(data.companies.as_ref().ok().map(Vec::len));

        (0..posts)
            .map(HomeItem::Post)
            .chain((0..products).map(HomeItem::Product))
            .chain((0..companies).map(HomeItem::Company))
            .collect()
    }

    pub fn selected_item(&self) -> Option<HomeItem> {
        self.items().get(self.selected).copied()
    }

    pub fn selected_post(&self) -> Option<&Post> {
        match self.selected_item()? {
            HomeItem::Post(i) => self.data.as_ref()?.posts.as_ref().ok()?.get(i),
            _ => None,
        }
    }
}

pub enum CommentsState {
    Loading,
    Loaded(Vec<Comment>),
    Failed(String),
}

/// A single post with its comments. Dropped when the user navigates away.
pub struct PostView {
    pub post_id: PostId,
    pub post: Option<Post>,
    pub load_error: Option<String>,
    pub comments: CommentsState,
    pub carousel: Carousel,
    /// `None` selects the post itself; edit and delete act on the selection.
    pub selected_comment: Option<usize>,
    pub pending_like: Option<PendingLike>,
    pub pending_body: Option<Transaction<String>>,
    pub pending_comment_edits: HashMap<CommentId, Transaction<String>>,
    pub return_to: View,
    /// Manual scroll, used while there are no comments to select.
    pub scroll_offset: usize,
}

impl PostView {
    fn new(post_id: PostId, post: Option<Post>, return_to: View) -> Self {
        let carousel = match &post {
            Some(p) => Carousel::new(p.media.clone(), p.video.clone(), PlaybackMode::Eager),
            None => Carousel::new(Vec::new(), None, PlaybackMode::Eager),
        };
        let mut view = Self {
            post_id,
            post,
            load_error: None,
            comments: CommentsState::Loading,
            carousel,
            selected_comment: None,
            pending_like: None,
            pending_body: None,
            pending_comment_edits: HashMap::new(),
            return_to,
            scroll_offset: 0,
        };
        view.carousel.mark_visible();
        view
    }

    pub fn comments(&self) -> &[Comment] {
        match &self.comments {
            CommentsState::Loaded(c) => c,
            _ => &[],
        }
    }

    pub fn selected_comment(&self) -> Option<&Comment> {
        self.comments().get(self.selected_comment?)
    }

    fn comment_mut(&mut self, id: &CommentId) -> Option<&mut Comment> {
        match &mut self.comments {
            CommentsState::Loaded(c) => c.iter_mut().find(|c| &c.id == id),
            _ => None,
        }
    }
}

// ============================================================================
// Dialogs
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputPurpose {
    NewPost,
    Comment,
    EditPost,
    EditComment(CommentId),
}

impl InputPurpose {
    pub fn title(&self) -> &'static str {
        match self {
            InputPurpose::NewPost => "New post",
            InputPurpose::Comment => "Comment",
            InputPurpose::EditPost => "Edit post",
            InputPurpose::EditComment(_) => "Edit comment",
        }
    }
}

/// Single-buffer text entry shown as an overlay.
pub struct TextInput {
    pub purpose: InputPurpose,
    pub buffer: String,
}

/// Pending confirmation for destructive operations.
pub enum ConfirmAction {
    DeletePost { post_id: PostId },
    DeleteComment { comment_id: CommentId },
}

/// Links shown by the share overlay.
pub struct ShareInfo {
    pub text: String,
    pub direct_url: String,
    pub preview_url: String,
    pub whatsapp_url: String,
}

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeOrigin {
    Feed,
    Detail,
}

/// Everything a background task needs to send a like toggle.
#[derive(Debug, Clone)]
pub struct LikeRequest {
    pub origin: LikeOrigin,
    pub generation: u64,
    pub post_id: PostId,
    pub viewer: UserId,
    pub action: LikeAction,
    /// Like state after the local flip.
    pub likes: LikeState,
}

/// Events from background tasks
pub enum AppEvent {
    HomeLoaded {
        generation: u64,
        data: HomeData,
    },
    FeedPageLoaded {
        request: PageRequest,
        result: Result<Vec<Post>, BackendError>,
    },
    PostLoaded {
        generation: u64,
        result: Result<Option<Post>, BackendError>,
    },
    CommentsLoaded {
        generation: u64,
        result: Result<Vec<Comment>, BackendError>,
    },
    LikeResolved {
        request: LikeRequest,
        result: Result<(), BackendError>,
    },
    PostPublished(Result<Post, ActionError>),
    PostEdited {
        generation: u64,
        result: Result<Option<Post>, BackendError>,
    },
    PostDeleted {
        post_id: PostId,
        result: Result<(), BackendError>,
    },
    CommentAdded {
        generation: u64,
        result: Result<Comment, BackendError>,
    },
    CommentEdited {
        generation: u64,
        comment_id: CommentId,
        result: Result<Option<Comment>, BackendError>,
    },
    CommentDeleted {
        generation: u64,
        comment_id: CommentId,
        result: Result<(), BackendError>,
    },
    Auth(AuthEvent),
    SessionRefreshed(Result<(), BackendError>),
    /// A background task panicked.
    TaskPanicked {
        task: &'static str,
        error: String,
    },
}

// ============================================================================
// Application State
// ============================================================================

/// Central application state.
///
/// Owned by the event loop, which is the only place it is mutated.
/// Background tasks receive clones of the backend handles and report back
/// through `AppEvent`.
pub struct App {
    pub backend: Backend,
    pub auth: AuthClient,
    pub home_loader: HomeLoader,
    /// Shared with `home_loader`.
    pub cache: SessionCache,
    pub share: ShareLinks,
    pub images: ImageRewriter,
    pub keybindings: KeybindingRegistry,

    pub view: View,
    pub home: HomeScreen,
    pub feed: FeedState,
    pub feed_selected: usize,
    /// Per-post carousels for the feed list, created on first render.
    pub carousels: HashMap<PostId, Carousel>,
    /// Like toggles started from the feed list, by post.
    pub feed_likes: HashMap<PostId, PendingLike>,
    pub post_view: Option<PostView>,

    pub input: Option<TextInput>,
    pub pending_confirm: Option<ConfirmAction>,
    pub share_overlay: Option<ShareInfo>,
    pub show_help: bool,
    pub help_scroll_offset: usize,

    /// Status message with expiry; Cow avoids allocation for static literals.
    pub status_message: Option<(Cow<'static, str>, Instant)>,
    /// Dirty flag to skip unnecessary frame renders.
    pub needs_redraw: bool,
    pub spinner_frame: usize,
    pub refreshing_session: bool,
    /// No refresh is attempted before this instant after a failure.
    pub session_retry_at: Option<Instant>,

    /// Generation of the latest home load; older results are dropped.
    pub home_generation: u64,
    /// Generation of the open post view; bumped on open and on leave.
    pub post_generation: u64,
}

impl App {
    pub fn new(config: &Config, auth: AuthClient, keybindings: KeybindingRegistry) -> Self {
        let backend = auth.backend().clone();
        let cache = SessionCache::new(config.cache_capacity);
        let images = ImageRewriter::for_project(backend.base_url());

        Self {
            home_loader: HomeLoader::new(backend.clone(), cache.clone(), config.home_cache_ttl()),
            cache,
            share: ShareLinks::new(&config.site_url),
            images,
            backend,
            auth,
            keybindings,
            view: View::Home,
            home: HomeScreen::default(),
            feed: FeedState::new(config.page_size),
            feed_selected: 0,
            carousels: HashMap::new(),
            feed_likes: HashMap::new(),
            post_view: None,
            input: None,
            pending_confirm: None,
            share_overlay: None,
            show_help: false,
            help_scroll_offset: 0,
            status_message: None,
            needs_redraw: true,
            spinner_frame: 0,
            refreshing_session: false,
            session_retry_at: None,
            home_generation: 0,
            post_generation: 0,
        }
    }

    pub fn viewer(&self) -> Option<UserId> {
        self.auth.viewer()
    }

    /// Authors may delete their own posts; admins may delete any.
    pub fn can_remove_post(&self, post: &Post) -> bool {
        match self.auth.current_session() {
            Some(session) => session.is_admin() || post.is_authored_by(Some(&session.user_id)),
            None => false,
        }
    }

    /// Keybinding context for the current view.
    pub fn key_context(&self) -> KbContext {
        match self.view {
            View::Home => KbContext::Home,
            View::Feed => {
                let lightbox = self
                    .selected_feed_post()
                    .and_then(|p| self.carousels.get(&p.id))
                    .is_some_and(Carousel::is_lightbox_open);
                if lightbox {
                    KbContext::Lightbox
                } else {
                    KbContext::Feed
                }
            }
            View::Post => {
                let lightbox = self
                    .post_view
                    .as_ref()
                    .is_some_and(|v| v.carousel.is_lightbox_open());
                if lightbox {
                    KbContext::Lightbox
                } else {
                    KbContext::Post
                }
            }
        }
    }

    /// Set status message (will auto-expire after 3 seconds)
    pub fn set_status(&mut self, msg: impl Into<Cow<'static, str>>) {
        self.status_message = Some((msg.into(), Instant::now()));
    }

    /// Report a failed action without touching the displayed data.
    pub fn report(&mut self, err: &ActionError) {
        if err.needs_sign_in() {
            self.set_status("Sign in to do that (set REDEGUARA_PASSWORD and --email)");
        } else {
            self.set_status(err.to_string());
        }
    }

    /// Clear status message if expired. Returns true if one was cleared.
    pub fn clear_expired_status(&mut self) -> bool {
        if let Some((_, time)) = &self.status_message {
            if time.elapsed().as_secs() >= STATUS_TTL_SECS {
                self.status_message = None;
                return true;
            }
        }
        false
    }

    /// Tab between Home and Feed. Leaving a post goes to its list.
    pub fn switch_view(&mut self) -> View {
        let next = match self.view {
            View::Home => View::Feed,
            View::Feed => View::Home,
            View::Post => self.post_view.as_ref().map_or(View::Home, |v| v.return_to),
        };
        if self.view == View::Post {
            self.close_post();
        }
        self.view = next;
        next
    }

    // ========================================================================
    // Home
    // ========================================================================

    /// Start a home load and return the generation to tag its result with.
    pub fn begin_home_load(&mut self) -> u64 {
        self.home_generation = self.home_generation.wrapping_add(1);
        self.home.loading = true;
        self.home_generation
    }

    /// Install loaded home data unless a newer load has been started since.
    pub fn apply_home(&mut self, generation: u64, data: HomeData) -> bool {
        if generation != self.home_generation {
            tracing::debug!(generation, current = self.home_generation, "Dropping stale home data");
            return false;
        }
        let failed = data.failures().len();
        self.home.data = Some(data);
        self.home.loading = false;
        let len = self.home.items().len();
        self.home.selected = self.home.selected.min(len.saturating_sub(1));
        if failed > 0 {
            self.set_status(format!("{failed} home section(s) failed to load"));
        }
        true
    }

    // ========================================================================
    // Feed
    // ========================================================================

    pub fn selected_feed_post(&self) -> Option<&Post> {
        self.feed.posts().get(self.feed_selected)
    }

    /// Carousel for a feed post, created on first use.
    pub fn carousel_for(&mut self, post: &Post) -> &mut Carousel {
        self.carousels
            .entry(post.id.clone())
            .or_insert_with(|| {
                Carousel::new(post.media.clone(), post.video.clone(), PlaybackMode::Deferred)
            })
    }

    pub fn selected_feed_carousel(&mut self) -> Option<&mut Carousel> {
        let post = self.feed.posts().get(self.feed_selected)?.clone();
        Some(self.carousel_for(&post))
    }

    /// The selected feed item is on screen: decode its media and, at the
    /// end of the list, ask for the next page.
    pub fn feed_visible(&mut self) -> Option<PageRequest> {
        if let Some(carousel) = self.selected_feed_carousel() {
            carousel.mark_visible();
        }
        self.feed.on_visible(self.feed_selected)
    }

    pub fn apply_feed_page(&mut self, request: PageRequest, result: Result<Vec<Post>, BackendError>) {
        match self.feed.apply_page(request, result) {
            Ok(Some(page)) => {
                if request.page_index == 0 {
                    self.feed_selected = 0;
                    self.carousels.clear();
                }
                if page.posts.is_empty() && request.page_index == 0 {
                    self.set_status("No posts yet");
                }
            }
            Ok(None) => {}
            Err(e) => self.report(&e),
        }
        self.feed_selected = self.feed_selected.min(self.feed.len().saturating_sub(1));
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    pub fn nav_up(&mut self) {
        match self.view {
            View::Home => self.home.selected = self.home.selected.saturating_sub(1),
            View::Feed => self.feed_selected = self.feed_selected.saturating_sub(1),
            View::Post => {
                if let Some(view) = self.post_view.as_mut() {
                    view.selected_comment = match view.selected_comment {
                        None | Some(0) => None,
                        Some(i) => Some(i - 1),
                    };
                    if view.comments().is_empty() {
                        view.scroll_offset = view.scroll_offset.saturating_sub(1);
                    }
                }
            }
        }
    }

    pub fn nav_down(&mut self) {
        match self.view {
            View::Home => {
                let max_index = self.home.items().len().saturating_sub(1);
                self.home.selected = self.home.selected.saturating_add(1).min(max_index);
            }
            View::Feed => {
                let max_index = self.feed.len().saturating_sub(1);
                self.feed_selected = self.feed_selected.saturating_add(1).min(max_index);
            }
            View::Post => {
                if let Some(view) = self.post_view.as_mut() {
                    let count = view.comments().len();
                    view.selected_comment = match view.selected_comment {
                        None if count > 0 => Some(0),
                        Some(i) if i + 1 < count => Some(i + 1),
                        other => other,
                    };
                    if count == 0 {
                        view.scroll_offset = view.scroll_offset.saturating_add(1).min(MAX_SCROLL);
                    }
                }
            }
        }
    }

    // ========================================================================
    // Post view
    // ========================================================================

    /// Open a post. Returns the generation its loads must carry.
    pub fn open_post(&mut self, post_id: PostId, known: Option<Post>) -> u64 {
        let return_to = match self.view {
            View::Post => self.post_view.as_ref().map_or(View::Feed, |v| v.return_to),
            other => other,
        };
        self.post_generation = self.post_generation.wrapping_add(1);
        self.post_view = Some(PostView::new(post_id, known, return_to));
        self.view = View::Post;
        self.post_generation
    }

    pub fn close_post(&mut self) {
        self.post_generation = self.post_generation.wrapping_add(1);
        if let Some(view) = self.post_view.take() {
            self.view = view.return_to;
        }
    }

    /// The open post view, if `generation` is still current.
    fn current_post_view(&mut self, generation: u64) -> Option<&mut PostView> {
        if generation != self.post_generation {
            tracing::debug!(generation, current = self.post_generation, "Dropping stale post view result");
            return None;
        }
        self.post_view.as_mut()
    }

    pub fn apply_post_loaded(&mut self, generation: u64, result: Result<Option<Post>, BackendError>) {
        let Some(view) = self.current_post_view(generation) else {
            return;
        };
        match result {
            Ok(Some(post)) => {
                let busy = view.pending_like.is_some() || view.pending_body.is_some();
                if !busy {
                    view.carousel.set_images(post.media.clone());
                    view.post = Some(post);
                    view.load_error = None;
                }
            }
            Ok(None) => {
                view.post = None;
                view.load_error = Some("Post not found".to_string());
            }
            Err(e) => {
                let had_post = view.post.is_some();
                if !had_post {
                    view.load_error = Some(e.to_string());
                }
                self.set_status(format!("Could not load post: {e}"));
            }
        }
    }

    pub fn apply_comments_loaded(&mut self, generation: u64, result: Result<Vec<Comment>, BackendError>) {
        let Some(view) = self.current_post_view(generation) else {
            return;
        };
        view.comments = match result {
            Ok(comments) => CommentsState::Loaded(comments),
            Err(e) => CommentsState::Failed(e.to_string()),
        };
        view.selected_comment = None;
    }

    /// Push a settled post into the feed and drop the cached home posts.
    fn sync_settled_post(&mut self, post: &Post) {
        if !self.feed.is_like_pending(&post.id) {
            self.feed.replace(post.clone());
        }
        self.home_loader.invalidate_posts();
    }

    // ========================================================================
    // Likes
    // ========================================================================

    /// Flip the like on the selected feed post and describe the remote call.
    pub fn begin_feed_like(&mut self) -> Result<LikeRequest, ActionError> {
        let post_id = self
            .selected_feed_post()
            .map(|p| p.id.clone())
            .ok_or_else(|| ActionError::NotFound("post".into()))?;
        let detail_pending = self
            .post_view
            .as_ref()
            .is_some_and(|v| v.post_id == post_id && v.pending_like.is_some());
        if detail_pending {
            return Err(ActionError::Busy);
        }
        let viewer = self.viewer();
        let pending = self.feed.begin_like(&post_id, viewer.as_ref())?;
        let likes = self.feed.post(&post_id).map(|p| p.likes).unwrap_or_default();

        let request = LikeRequest {
            origin: LikeOrigin::Feed,
            generation: 0,
            post_id: post_id.clone(),
            viewer: pending.viewer.clone(),
            action: pending.action,
            likes,
        };
        self.feed_likes.insert(post_id, pending);
        Ok(request)
    }

    /// Flip the like on the open post.
    pub fn begin_detail_like(&mut self) -> Result<LikeRequest, ActionError> {
        let viewer = self.viewer();
        let generation = self.post_generation;
        let view = self
            .post_view
            .as_mut()
            .ok_or_else(|| ActionError::NotFound("post".into()))?;
        let post_id = view.post_id.clone();
        if view.pending_like.is_some() || self.feed.is_like_pending(&post_id) {
            return Err(ActionError::Busy);
        }
        let post = view
            .post
            .as_mut()
            .ok_or_else(|| ActionError::NotFound(format!("post {post_id}")))?;

        let pending = PendingLike::begin(post, viewer.as_ref())?;
        let request = LikeRequest {
            origin: LikeOrigin::Detail,
            generation,
            post_id: post.id.clone(),
            viewer: pending.viewer.clone(),
            action: pending.action,
            likes: post.likes,
        };
        view.pending_like = Some(pending);
        Ok(request)
    }

    pub fn resolve_like(&mut self, request: LikeRequest, result: Result<(), BackendError>) {
        let succeeded = result.is_ok();
        let outcome = match request.origin {
            LikeOrigin::Feed => match self.feed_likes.remove(&request.post_id) {
                Some(pending) => self.feed.finish_like(pending, result),
                None => {
                    tracing::debug!(post_id = %request.post_id, "Dropping abandoned like result");
                    return;
                }
            },
            LikeOrigin::Detail => {
                let generation = request.generation;
                match self.current_post_view(generation) {
                    Some(view) => match view.pending_like.take() {
                        Some(pending) => pending.finish(view.post.as_mut(), result),
                        None => Ok(()),
                    },
                    // The view is gone; only the feed copy is left to settle.
                    None => result.map_err(ActionError::Remote),
                }
            }
        };

        if let Err(e) = outcome {
            self.report(&e);
            return;
        }
        if !succeeded {
            return;
        }

        match request.origin {
            LikeOrigin::Feed => {
                if let Some(view) = self.post_view.as_mut() {
                    if view.post_id == request.post_id && view.pending_like.is_none() {
                        if let Some(post) = view.post.as_mut() {
                            post.likes = request.likes;
                        }
                    }
                }
                self.home_loader.invalidate_posts();
            }
            LikeOrigin::Detail => {
                if !self.feed.is_like_pending(&request.post_id) {
                    if let Some(post) = self.feed.post_mut(&request.post_id) {
                        post.likes = request.likes;
                    }
                }
                self.home_loader.invalidate_posts();
            }
        }
    }

    // ========================================================================
    // Publishing and edits
    // ========================================================================

    pub fn apply_published(&mut self, result: Result<Post, ActionError>) {
        match result {
            Ok(post) => {
                self.feed.prepend_new(post);
                self.feed_selected = 0;
                self.home_loader.invalidate_posts();
                self.set_status("Post published");
            }
            Err(e) => self.report(&e),
        }
    }

    /// Apply a body edit to the open post locally. Returns the trimmed body
    /// to send, or the reason nothing was changed.
    pub fn begin_post_edit(&mut self, body: &str) -> Result<(PostId, String), ActionError> {
        let body = validate_text(body)?.to_string();
        let viewer = self.viewer();
        let view = self
            .post_view
            .as_mut()
            .ok_or_else(|| ActionError::NotFound("post".into()))?;
        let post_id = view.post_id.clone();
        let post = view
            .post
            .as_mut()
            .ok_or_else(|| ActionError::NotFound(format!("post {post_id}")))?;
        if viewer.is_none() {
            return Err(ActionError::Unauthenticated);
        }
        if !post.is_authored_by(viewer.as_ref()) {
            return Err(ActionError::NotAllowed("only the author can edit this post"));
        }
        if view.pending_body.is_some() {
            return Err(ActionError::Busy);
        }
        let new_body = body.clone();
        view.pending_body = Some(Transaction::apply(&mut post.body, move |b| *b = new_body));
        Ok((post.id.clone(), body))
    }

    pub fn apply_post_edited(&mut self, generation: u64, result: Result<Option<Post>, BackendError>) {
        let Some(view) = self.current_post_view(generation) else {
            return;
        };
        let Some(tx) = view.pending_body.take() else {
            return;
        };
        let Some(post) = view.post.as_mut() else {
            return;
        };

        match result {
            Ok(Some(updated)) => {
                tx.commit();
                *post = updated.clone();
                self.sync_settled_post(&updated);
                self.set_status("Post updated");
            }
            Ok(None) => {
                tx.revert(&mut post.body);
                self.set_status("Post no longer exists");
            }
            Err(e) => {
                tx.revert(&mut post.body);
                self.report(&ActionError::Remote(e));
            }
        }
    }

    pub fn apply_post_deleted(&mut self, post_id: PostId, result: Result<(), BackendError>) {
        match result {
            Ok(()) => {
                self.feed.remove(&post_id);
                self.carousels.remove(&post_id);
                self.feed_selected = self.feed_selected.min(self.feed.len().saturating_sub(1));
                self.home_loader.invalidate_posts();
                if self.post_view.as_ref().is_some_and(|v| v.post_id == post_id) {
                    self.close_post();
                }
                self.set_status("Post deleted");
            }
            Err(e) => self.report(&ActionError::Remote(e)),
        }
    }

    pub fn apply_comment_added(&mut self, generation: u64, result: Result<Comment, BackendError>) {
        let comment = match result {
            Ok(c) => c,
            Err(e) => return self.report(&ActionError::Remote(e)),
        };
        let Some(view) = self.current_post_view(generation) else {
            return;
        };
        if let CommentsState::Loaded(comments) = &mut view.comments {
            comments.push(comment);
        } else {
            view.comments = CommentsState::Loaded(vec![comment]);
        }
        if let Some(post) = view.post.as_mut() {
            post.comment_count = post.comment_count.saturating_add(1);
            let post = post.clone();
            self.sync_settled_post(&post);
        }
        self.set_status("Comment added");
    }

    /// Apply a comment edit locally and return the body to send.
    pub fn begin_comment_edit(&mut self, id: &CommentId, body: &str) -> Result<String, ActionError> {
        let body = validate_text(body)?.to_string();
        let viewer = self.viewer();
        let view = self
            .post_view
            .as_mut()
            .ok_or_else(|| ActionError::NotFound("post".into()))?;
        if view.pending_comment_edits.contains_key(id) {
            return Err(ActionError::Busy);
        }
        let comment = view
            .comment_mut(id)
            .ok_or_else(|| ActionError::NotFound(format!("comment {id}")))?;
        if viewer.is_none() {
            return Err(ActionError::Unauthenticated);
        }
        if !comment.is_authored_by(viewer.as_ref()) {
            return Err(ActionError::NotAllowed("only the author can edit this comment"));
        }
        let new_body = body.clone();
        let tx = Transaction::apply(&mut comment.body, move |b| *b = new_body);
        view.pending_comment_edits.insert(id.clone(), tx);
        Ok(body)
    }

    pub fn apply_comment_edited(
        &mut self,
        generation: u64,
        comment_id: CommentId,
        result: Result<Option<Comment>, BackendError>,
    ) {
        let Some(view) = self.current_post_view(generation) else {
            return;
        };
        let Some(tx) = view.pending_comment_edits.remove(&comment_id) else {
            return;
        };
        let Some(comment) = view.comment_mut(&comment_id) else {
            return;
        };
        match result {
            Ok(Some(updated)) => {
                tx.commit();
                *comment = updated;
            }
            Ok(None) => {
                tx.revert(&mut comment.body);
                self.set_status("Comment no longer exists");
            }
            Err(e) => {
                tx.revert(&mut comment.body);
                self.report(&ActionError::Remote(e));
            }
        }
    }

    pub fn apply_comment_deleted(
        &mut self,
        generation: u64,
        comment_id: CommentId,
        result: Result<(), BackendError>,
    ) {
        if let Err(e) = result {
            return self.report(&ActionError::Remote(e));
        }
        let Some(view) = self.current_post_view(generation) else {
            return;
        };
        if let CommentsState::Loaded(comments) = &mut view.comments {
            comments.retain(|c| c.id != comment_id);
            view.selected_comment = view
                .selected_comment
                .filter(|_| !comments.is_empty())
                .map(|i| i.min(comments.len() - 1));
        }
        if let Some(post) = view.post.as_mut() {
            post.comment_count = post.comment_count.saturating_sub(1);
            let post = post.clone();
            self.sync_settled_post(&post);
        }
        self.set_status("Comment deleted");
    }

    // ========================================================================
    // Auth
    // ========================================================================

    /// Like state in every cached list is per viewer, so an auth change
    /// empties the cache and forgets unresolved feed likes. Returns true if
    /// the lists must reload.
    pub fn on_auth_event(&mut self, event: &AuthEvent) -> bool {
        match event {
            AuthEvent::SignedIn(_) | AuthEvent::SignedOut => {
                self.cache.clear();
                self.feed_likes.clear();
                let abandoned = self.feed.abandon_pending_likes();
                if abandoned > 0 {
                    tracing::debug!(abandoned, "Dropped like toggles from the previous viewer");
                }
                self.session_retry_at = None;
                if matches!(event, AuthEvent::SignedOut) {
                    self.set_status("Signed out");
                }
                true
            }
            AuthEvent::TokenRefreshed => false,
        }
    }

    /// True when the session is close to expiry and no refresh is running
    /// or waiting out a failure.
    pub fn session_refresh_due(&self) -> bool {
        if self.refreshing_session || self.session_retry_at.is_some_and(|at| Instant::now() < at) {
            return false;
        }
        self.auth.current_session().is_some_and(|s| {
            s.expires_within(
                chrono::Duration::seconds(SESSION_REFRESH_MARGIN_SECS),
                chrono::Utc::now(),
            )
        })
    }

    pub fn apply_session_refreshed(&mut self, result: Result<(), BackendError>) {
        self.refreshing_session = false;
        let Err(e) = result else {
            self.session_retry_at = None;
            return;
        };
        tracing::warn!(error = %e, "Session refresh failed");
        self.session_retry_at = Some(Instant::now() + Duration::from_secs(SESSION_RETRY_SECS));
        if e.is_client_error() {
            self.set_status("Session expired, signed out");
        } else {
            self.set_status(format!("Session refresh failed: {e}"));
        }
    }

    pub fn share_info(&self, post: &Post) -> ShareInfo {
        ShareInfo {
            text: self.share.share_text(post),
            direct_url: self.share.direct_url(post),
            preview_url: self.share.preview_url(post),
            whatsapp_url: self.share.whatsapp_url(post),
        }
    }

    /// Home load policy for `r` versus a normal visit.
    pub fn home_policy(reload: bool) -> CachePolicy {
        if reload {
            CachePolicy::Reload
        } else {
            CachePolicy::Default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redeguara::feed::Author;
    use redeguara::home::POSTS_KEY;
    use secrecy::SecretString;
    use tokio::time::{self, Duration};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_app() -> App {
        let backend =
            Backend::new("https://abc.supabase.co", SecretString::from("anon".to_string())).unwrap();
        App::new(&Config::default(), AuthClient::new(backend), KeybindingRegistry::new())
    }

    /// An app whose viewer `user` signed in against `server`.
    async fn signed_in_app(server: &MockServer, user: &str, user_type: &str, expires_in: i64) -> App {
        Mock::given(method("POST"))
            .and(path("/auth/v1/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "jwt-abc",
                "refresh_token": "refresh-xyz",
                "expires_in": expires_in,
                "token_type": "bearer",
                "user": {"id": user, "email": "ana@example.com"}
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/profiles"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!([{"user_id": user, "name": "Ana", "user_type": user_type}]),
            ))
            .mount(server)
            .await;

        let backend = Backend::new(&server.uri(), SecretString::from("anon".to_string())).unwrap();
        let auth = AuthClient::new(backend);
        auth.sign_in("ana@example.com", &SecretString::from("pw".to_string()))
            .await
            .unwrap();
        App::new(&Config::default(), auth, KeybindingRegistry::new())
    }

    fn cached_home_posts(app: &App) -> Option<Vec<String>> {
        app.cache.lookup(POSTS_KEY, Duration::from_secs(300))
    }

    fn post(id: &str, likes: u32) -> Post {
        Post {
            id: PostId::new(id),
            author: Author {
                user_id: Some(UserId::new("author")),
                name: Some("Ana".into()),
                avatar_url: None,
            },
            body: format!("post {id}"),
            media: vec![
                "https://cdn.example.com/1.jpg".into(),
                "https://cdn.example.com/2.jpg".into(),
            ],
            video: None,
            created_at: chrono::Utc::now(),
            likes: LikeState {
                like_count: likes,
                viewer_has_liked: false,
            },
            comment_count: 0,
        }
    }

    fn with_feed(app: &mut App, posts: Vec<Post>) {
        let request = app.feed.next_page().unwrap();
        app.apply_feed_page(request, Ok(posts));
    }

    fn empty_home() -> HomeData {
        HomeData {
            banners: Ok(Vec::new()),
            posts: Ok(vec![post("h1", 0)]),
            companies: Ok(Vec::new()),
            products: Ok(Vec::new()),
        }
    }

    #[tokio::test]
    async fn test_status_expires_after_3_seconds() {
        let mut app = test_app();
        time::pause();
        app.set_status("Test message");

        time::advance(Duration::from_secs(2)).await;
        assert!(!app.clear_expired_status());
        assert!(app.status_message.is_some());

        time::advance(Duration::from_secs(2)).await;
        assert!(app.clear_expired_status());
        assert!(app.status_message.is_none());
    }

    #[tokio::test]
    async fn test_stale_home_load_is_dropped() {
        let mut app = test_app();
        let first = app.begin_home_load();
        let second = app.begin_home_load();

        assert!(!app.apply_home(first, empty_home()));
        assert!(app.home.data.is_none());
        assert!(app.apply_home(second, empty_home()));
        assert!(!app.home.loading);
        assert_eq!(app.home.items(), vec![HomeItem::Post(0)]);
    }

    #[tokio::test]
    async fn test_switch_view_toggles_home_and_feed() {
        let mut app = test_app();
        assert_eq!(app.switch_view(), View::Feed);
        assert_eq!(app.switch_view(), View::Home);
    }

    #[tokio::test]
    async fn test_last_item_visibility_requests_next_page() {
        let mut app = test_app();
        let posts = (0..10).map(|i| post(&i.to_string(), 0)).collect();
        with_feed(&mut app, posts);

        app.feed_selected = 3;
        assert!(app.feed_visible().is_none());
        app.feed_selected = 9;
        let request = app.feed_visible().unwrap();
        assert_eq!(request.offset, 10);
        assert!(app.carousels.get(&PostId::new("9")).unwrap().is_visible());
    }

    #[tokio::test]
    async fn test_feed_like_without_viewer_changes_nothing() {
        let mut app = test_app();
        with_feed(&mut app, vec![post("p1", 2)]);
        let err = app.begin_feed_like().unwrap_err();
        assert!(err.needs_sign_in());
        assert_eq!(app.feed.posts()[0].like_count(), 2);
    }

    #[tokio::test]
    async fn test_left_post_view_drops_results() {
        let mut app = test_app();
        app.view = View::Feed;
        let generation = app.open_post(PostId::new("p1"), Some(post("p1", 0)));
        app.close_post();
        assert_eq!(app.view, View::Feed);

        app.apply_comments_loaded(generation, Ok(Vec::new()));
        app.apply_post_loaded(generation, Ok(None));
        assert!(app.post_view.is_none());
    }

    #[tokio::test]
    async fn test_post_not_found_shows_error() {
        let mut app = test_app();
        let generation = app.open_post(PostId::new("gone"), None);
        app.apply_post_loaded(generation, Ok(None));
        let view = app.post_view.as_ref().unwrap();
        assert_eq!(view.load_error.as_deref(), Some("Post not found"));
    }

    #[tokio::test]
    async fn test_detail_carousel_is_eager_and_visible() {
        let mut app = test_app();
        app.open_post(PostId::new("p1"), Some(post("p1", 0)));
        let view = app.post_view.as_ref().unwrap();
        assert_eq!(view.carousel.mode(), PlaybackMode::Eager);
        assert!(view.carousel.image_request_url(Some(&app.images)).is_some());
    }

    #[tokio::test]
    async fn test_published_post_goes_first() {
        let mut app = test_app();
        with_feed(&mut app, vec![post("old", 0)]);
        app.feed_selected = 0;
        app.apply_published(Ok(post("new", 0)));
        assert_eq!(app.feed.posts()[0].id.as_str(), "new");
        assert_eq!(app.feed.len(), 2);
    }

    #[tokio::test]
    async fn test_deleted_post_leaves_feed_and_view() {
        let mut app = test_app();
        with_feed(&mut app, vec![post("p1", 0), post("p2", 0)]);
        app.view = View::Feed;
        app.open_post(PostId::new("p2"), app.feed.posts().get(1).cloned());
        app.feed_selected = 1;

        app.apply_post_deleted(PostId::new("p2"), Ok(()));
        assert_eq!(app.view, View::Feed);
        assert!(app.post_view.is_none());
        assert_eq!(app.feed.len(), 1);
        assert_eq!(app.feed_selected, 0);
    }

    #[tokio::test]
    async fn test_blank_edit_rejected_before_anything_changes() {
        let mut app = test_app();
        app.open_post(PostId::new("p1"), Some(post("p1", 0)));
        let err = app.begin_post_edit("   ").unwrap_err();
        assert!(matches!(err, ActionError::Validation(_)));
        assert!(app.post_view.as_ref().unwrap().pending_body.is_none());
    }

    #[tokio::test]
    async fn test_nav_in_post_view_moves_through_comments() {
        let mut app = test_app();
        let generation = app.open_post(PostId::new("p1"), Some(post("p1", 0)));
        let comment = Comment {
            id: CommentId::new("c1"),
            post_id: PostId::new("p1"),
            author: Author::default(),
            body: "oi".into(),
            created_at: chrono::Utc::now(),
            updated_at: None,
        };
        app.apply_comments_loaded(generation, Ok(vec![comment]));

        app.nav_down();
        assert_eq!(app.post_view.as_ref().unwrap().selected_comment, Some(0));
        app.nav_down();
        assert_eq!(app.post_view.as_ref().unwrap().selected_comment, Some(0));
        app.nav_up();
        assert_eq!(app.post_view.as_ref().unwrap().selected_comment, None);
    }

    #[tokio::test]
    async fn test_feed_like_success_syncs_open_post_and_drops_cached_posts() {
        let server = MockServer::start().await;
        let mut app = signed_in_app(&server, "u1", "member", 3600).await;
        with_feed(&mut app, vec![post("p1", 2)]);
        app.open_post(PostId::new("p1"), Some(post("p1", 2)));
        assert!(app.cache.store(POSTS_KEY, &vec!["p1".to_string()]));

        let request = app.begin_feed_like().unwrap();
        assert_eq!(app.feed.posts()[0].like_count(), 3);
        app.resolve_like(request, Ok(()));

        let view_post = app.post_view.as_ref().unwrap().post.as_ref().unwrap();
        assert_eq!(view_post.likes, LikeState { like_count: 3, viewer_has_liked: true });
        assert!(!app.feed.is_like_pending(&PostId::new("p1")));
        assert!(cached_home_posts(&app).is_none());
    }

    #[tokio::test]
    async fn test_detail_like_success_updates_feed_copy() {
        let server = MockServer::start().await;
        let mut app = signed_in_app(&server, "u1", "member", 3600).await;
        with_feed(&mut app, vec![post("p1", 5)]);
        app.open_post(PostId::new("p1"), Some(post("p1", 5)));

        let request = app.begin_detail_like().unwrap();
        app.resolve_like(request, Ok(()));

        assert_eq!(app.feed.posts()[0].likes, LikeState { like_count: 6, viewer_has_liked: true });
        assert!(app.post_view.as_ref().unwrap().pending_like.is_none());
    }

    #[tokio::test]
    async fn test_failed_detail_like_rolls_back_and_keeps_cache() {
        let server = MockServer::start().await;
        let mut app = signed_in_app(&server, "u1", "member", 3600).await;
        with_feed(&mut app, vec![post("p1", 5)]);
        app.open_post(PostId::new("p1"), Some(post("p1", 5)));
        app.cache.store(POSTS_KEY, &vec!["p1".to_string()]);

        let request = app.begin_detail_like().unwrap();
        app.resolve_like(request, Err(BackendError::Timeout));

        let view_post = app.post_view.as_ref().unwrap().post.as_ref().unwrap();
        assert_eq!(view_post.likes, LikeState { like_count: 5, viewer_has_liked: false });
        assert_eq!(app.feed.posts()[0].like_count(), 5);
        assert!(app.status_message.is_some());
        assert!(cached_home_posts(&app).is_some());
    }

    #[tokio::test]
    async fn test_like_in_flight_in_one_place_blocks_the_other() {
        let server = MockServer::start().await;
        let mut app = signed_in_app(&server, "u1", "member", 3600).await;
        with_feed(&mut app, vec![post("p1", 1)]);
        app.open_post(PostId::new("p1"), Some(post("p1", 1)));

        let feed_request = app.begin_feed_like().unwrap();
        assert!(matches!(app.begin_detail_like(), Err(ActionError::Busy)));
        let view_post = app.post_view.as_ref().unwrap().post.as_ref().unwrap();
        assert_eq!(view_post.like_count(), 1);
        app.resolve_like(feed_request, Ok(()));

        let detail_request = app.begin_detail_like().unwrap();
        assert!(matches!(app.begin_feed_like(), Err(ActionError::Busy)));
        assert_eq!(app.feed.posts()[0].like_count(), 2);
        app.resolve_like(detail_request, Ok(()));
        assert_eq!(app.feed.posts()[0].likes, LikeState { like_count: 1, viewer_has_liked: false });
    }

    #[tokio::test]
    async fn test_auth_change_abandons_unresolved_feed_likes() {
        let server = MockServer::start().await;
        let mut app = signed_in_app(&server, "u1", "member", 3600).await;
        with_feed(&mut app, vec![post("p1", 1)]);

        let stale = app.begin_feed_like().unwrap();
        assert!(app.on_auth_event(&AuthEvent::SignedIn(UserId::new("u1"))));
        assert!(!app.feed.is_like_pending(&PostId::new("p1")));

        app.resolve_like(stale, Ok(()));
        assert!(app.begin_feed_like().is_ok());
    }

    #[tokio::test]
    async fn test_vanished_post_edit_restores_body() {
        let server = MockServer::start().await;
        let mut app = signed_in_app(&server, "author", "member", 3600).await;
        let generation = app.open_post(PostId::new("p1"), Some(post("p1", 0)));

        let (_, body) = app.begin_post_edit("  novo texto ").unwrap();
        assert_eq!(body, "novo texto");
        app.apply_post_edited(generation, Ok(None));

        let view = app.post_view.as_ref().unwrap();
        assert_eq!(view.post.as_ref().unwrap().body, "post p1");
        assert!(view.pending_body.is_none());
        assert!(app.status_message.is_some());
    }

    #[tokio::test]
    async fn test_editing_someone_elses_post_is_not_allowed() {
        let server = MockServer::start().await;
        let mut app = signed_in_app(&server, "u1", "member", 3600).await;
        app.open_post(PostId::new("p1"), Some(post("p1", 0)));

        let err = app.begin_post_edit("meu texto").unwrap_err();
        assert!(matches!(err, ActionError::NotAllowed(_)));
        assert!(!err.needs_sign_in());
        assert_eq!(app.post_view.as_ref().unwrap().post.as_ref().unwrap().body, "post p1");
    }

    #[tokio::test]
    async fn test_only_authors_and_admins_remove_posts() {
        let server = MockServer::start().await;
        let member = signed_in_app(&server, "u1", "member", 3600).await;
        assert!(!member.can_remove_post(&post("p1", 0)));

        let admin_server = MockServer::start().await;
        let admin = signed_in_app(&admin_server, "u9", "admin", 3600).await;
        assert!(admin.can_remove_post(&post("p1", 0)));

        let author_server = MockServer::start().await;
        let author = signed_in_app(&author_server, "author", "member", 3600).await;
        assert!(author.can_remove_post(&post("p1", 0)));

        assert!(!test_app().can_remove_post(&post("p1", 0)));
    }

    #[tokio::test]
    async fn test_failed_session_refresh_waits_before_retrying() {
        let server = MockServer::start().await;
        let mut app = signed_in_app(&server, "u1", "member", 30).await;
        assert!(app.session_refresh_due());

        time::pause();
        app.refreshing_session = true;
        assert!(!app.session_refresh_due());
        app.apply_session_refreshed(Err(BackendError::Timeout));
        assert!(!app.refreshing_session);
        assert!(!app.session_refresh_due());

        time::advance(Duration::from_secs(31)).await;
        assert!(app.session_refresh_due());

        app.apply_session_refreshed(Err(BackendError::HttpStatus {
            status: 400,
            message: "Invalid Refresh Token".into(),
        }));
        let (status, _) = app.status_message.as_ref().unwrap();
        assert_eq!(&**status, "Session expired, signed out");
    }
}
