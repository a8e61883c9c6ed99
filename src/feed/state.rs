use std::collections::HashSet;
use std::future::Future;

use super::composer::{append_page, prepend_new, FeedPage};
use super::cursor::{PageCursor, PageRequest};
use super::ids::{PostId, UserId};
use super::optimistic::{LikeEdges, PendingLike};
use super::post::Post;
use crate::backend::BackendError;
use crate::error::ActionError;

/// Where feed pages come from.
pub trait PostSource {
    fn fetch_feed_page(
        &self,
        request: PageRequest,
        viewer: Option<&UserId>,
    ) -> impl Future<Output = Result<Vec<Post>, BackendError>>;
}

/// The infinite feed: loaded posts, the pagination cursor and the set of
/// posts with a like toggle still waiting for the remote result.
#[derive(Debug, Default)]
pub struct FeedState {
    posts: Vec<Post>,
    cursor: PageCursor,
    pending_likes: HashSet<PostId>,
}

impl FeedState {
    pub fn new(page_size: usize) -> Self {
        Self {
            posts: Vec::new(),
            cursor: PageCursor::new(page_size),
            pending_likes: HashSet::new(),
        }
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn cursor(&self) -> &PageCursor {
        &self.cursor
    }

    pub fn post(&self, id: &PostId) -> Option<&Post> {
        self.posts.iter().find(|p| &p.id == id)
    }

    pub fn post_mut(&mut self, id: &PostId) -> Option<&mut Post> {
        self.posts.iter_mut().find(|p| &p.id == id)
    }

    pub fn is_like_pending(&self, id: &PostId) -> bool {
        self.pending_likes.contains(id)
    }

    // ========================================================================
    // Pagination
    // ========================================================================

    /// Claim the next page to fetch, if any.
    pub fn next_page(&mut self) -> Option<PageRequest> {
        self.cursor.advance()
    }

    /// Visibility trigger: the item at `index` came into view. Only the last
    /// loaded item (the sentinel) asks for more.
    pub fn on_visible(&mut self, index: usize) -> Option<PageRequest> {
        if self.posts.is_empty() || index + 1 >= self.posts.len() {
            self.next_page()
        } else {
            None
        }
    }

    /// Restart at page 0. Loaded posts stay visible until the first page
    /// arrives and replaces them.
    pub fn refresh(&mut self) -> Option<PageRequest> {
        self.cursor.reset();
        self.cursor.advance()
    }

    /// Merge the outcome of `request` into the feed.
    ///
    /// Page 0 replaces the list (initial load or refresh); later pages are
    /// appended with identity dedup. A result for a request the cursor no
    /// longer owns is dropped and reported as `Ok(None)`. A failure leaves
    /// the loaded posts as they were.
    pub fn apply_page(
        &mut self,
        request: PageRequest,
        result: Result<Vec<Post>, BackendError>,
    ) -> Result<Option<FeedPage>, ActionError> {
        let posts = match result {
            Ok(posts) => posts,
            Err(e) => {
                if self.cursor.fail(request) {
                    tracing::warn!(page = request.page_index, error = %e, "Feed page fetch failed");
                }
                return Err(ActionError::Remote(e));
            }
        };

        if !self.cursor.complete(request, posts.len()) {
            return Ok(None);
        }

        let page = FeedPage::new(request, posts);
        if request.page_index == 0 {
            self.posts.clear();
        }
        let appended = append_page(&mut self.posts, page.posts.clone());
        tracing::debug!(
            page = request.page_index,
            returned = page.posts.len(),
            appended,
            has_more = page.has_more,
            "Feed page merged"
        );
        Ok(Some(page))
    }

    /// Fetch the next page from `source` and merge it.
    ///
    /// Returns `Ok(None)` without fetching when a page is already loading or
    /// the feed has ended.
    pub async fn load_next<S: PostSource>(
        &mut self,
        source: &S,
        viewer: Option<&UserId>,
    ) -> Result<Option<FeedPage>, ActionError> {
        let Some(request) = self.next_page() else {
            return Ok(None);
        };
        let result = source.fetch_feed_page(request, viewer).await;
        self.apply_page(request, result)
    }

    // ========================================================================
    // Local edits
    // ========================================================================

    pub fn prepend_new(&mut self, post: Post) {
        prepend_new(&mut self.posts, post);
    }

    /// Swap in a fresher copy of a loaded post, keeping its position.
    pub fn replace(&mut self, post: Post) -> bool {
        match self.post_mut(&post.id) {
            Some(slot) => {
                *slot = post;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &PostId) -> Option<Post> {
        let index = self.posts.iter().position(|p| &p.id == id)?;
        Some(self.posts.remove(index))
    }

    // ========================================================================
    // Likes
    // ========================================================================

    /// Apply a like toggle locally. Rejected with `Busy` while an earlier
    /// toggle on the same post is unresolved.
    pub fn begin_like(
        &mut self,
        id: &PostId,
        viewer: Option<&UserId>,
    ) -> Result<PendingLike, ActionError> {
        if viewer.is_none() {
            return Err(ActionError::Unauthenticated);
        }
        if self.pending_likes.contains(id) {
            return Err(ActionError::Busy);
        }
        let post = self
            .posts
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(|| ActionError::NotFound(format!("post {id}")))?;

        let pending = PendingLike::begin(post, viewer)?;
        self.pending_likes.insert(id.clone());
        Ok(pending)
    }

    /// Settle a toggle started with [`FeedState::begin_like`].
    pub fn finish_like(
        &mut self,
        pending: PendingLike,
        outcome: Result<(), BackendError>,
    ) -> Result<(), ActionError> {
        self.pending_likes.remove(&pending.post_id);
        let post = self.posts.iter_mut().find(|p| p.id == pending.post_id);
        pending.finish(post, outcome)
    }

    /// Forget every unresolved toggle, leaving the posts as they are. For
    /// a change of viewer: the feed reloads and late results are dropped.
    pub fn abandon_pending_likes(&mut self) -> usize {
        let abandoned = self.pending_likes.len();
        self.pending_likes.clear();
        abandoned
    }

    /// Toggle the viewer's like on a loaded post and wait for the remote result.
    pub async fn toggle_like<R: LikeEdges>(
        &mut self,
        id: &PostId,
        viewer: Option<&UserId>,
        remote: &R,
    ) -> Result<(), ActionError> {
        let pending = self.begin_like(id, viewer)?;
        let outcome = pending
            .action
            .send(remote, &pending.post_id, &pending.viewer)
            .await;
        self.finish_like(pending, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::optimistic::fakes::RecordingEdges;
    use crate::feed::post::fixtures::post;
    use crate::feed::post::LikeState;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    /// Serves pages of generated posts; `sizes[i]` is the length of page `i`.
    struct PagedSource {
        sizes: Vec<usize>,
        requests: RefCell<Vec<PageRequest>>,
    }

    impl PostSource for PagedSource {
        async fn fetch_feed_page(
            &self,
            request: PageRequest,
            _viewer: Option<&UserId>,
        ) -> Result<Vec<Post>, BackendError> {
            self.requests.borrow_mut().push(request);
            let n = self.sizes.get(request.page_index).copied().unwrap_or(0);
            Ok((0..n)
                .map(|i| post(&format!("p{}", request.offset + i), 0, false))
                .collect())
        }
    }

    #[tokio::test]
    async fn test_full_then_short_page_stops_fetching() {
        let source = PagedSource {
            sizes: vec![10, 4],
            requests: RefCell::new(Vec::new()),
        };
        let mut feed = FeedState::new(10);

        feed.load_next(&source, None).await.unwrap();
        let second = feed.load_next(&source, None).await.unwrap().unwrap();
        assert!(!second.has_more);

        assert_eq!(feed.len(), 14);
        assert!(!feed.cursor().has_more());
        assert!(feed.load_next(&source, None).await.unwrap().is_none());
        assert_eq!(source.requests.borrow().len(), 2);
    }

    #[test]
    fn test_visibility_trigger_only_on_last_item() {
        let mut feed = FeedState::new(2);
        let first = feed.on_visible(0).unwrap();
        feed.apply_page(first, Ok(vec![post("a", 0, false), post("b", 0, false)]))
            .unwrap();

        assert!(feed.on_visible(0).is_none());
        let second = feed.on_visible(1).unwrap();
        assert_eq!(second.offset, 2);
    }

    #[test]
    fn test_failed_page_keeps_posts_and_allows_retry() {
        let mut feed = FeedState::new(1);
        let first = feed.next_page().unwrap();
        feed.apply_page(first, Ok(vec![post("a", 0, false)])).unwrap();

        let second = feed.next_page().unwrap();
        let err = feed
            .apply_page(
                second,
                Err(BackendError::HttpStatus {
                    status: 502,
                    message: "bad gateway".into(),
                }),
            )
            .unwrap_err();

        assert!(matches!(err, ActionError::Remote(_)));
        assert_eq!(feed.len(), 1);
        assert_eq!(feed.next_page(), Some(second));
    }

    #[test]
    fn test_refresh_replaces_list_with_first_page() {
        let mut feed = FeedState::new(2);
        let first = feed.next_page().unwrap();
        feed.apply_page(first, Ok(vec![post("a", 0, false), post("b", 0, false)]))
            .unwrap();

        let stale = feed.next_page().unwrap();
        let fresh = feed.refresh().unwrap();
        assert_eq!(feed.len(), 2, "posts stay visible while refreshing");

        assert_eq!(feed.apply_page(stale, Ok(vec![post("x", 0, false)])).unwrap(), None);
        feed.apply_page(fresh, Ok(vec![post("c", 0, false)])).unwrap();

        let ids: Vec<&str> = feed.posts().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["c"]);
    }

    #[test]
    fn test_second_toggle_while_pending_is_busy() {
        let mut feed = FeedState::new(10);
        let request = feed.next_page().unwrap();
        feed.apply_page(request, Ok(vec![post("p", 1, false)])).unwrap();
        let viewer = UserId::new("me");
        let id = PostId::new("p");

        let pending = feed.begin_like(&id, Some(&viewer)).unwrap();
        assert!(feed.is_like_pending(&id));
        assert!(matches!(feed.begin_like(&id, Some(&viewer)), Err(ActionError::Busy)));
        assert_eq!(feed.post(&id).unwrap().likes, LikeState { like_count: 2, viewer_has_liked: true });

        feed.finish_like(pending, Ok(())).unwrap();
        assert!(!feed.is_like_pending(&id));
        assert!(feed.begin_like(&id, Some(&viewer)).is_ok());
    }

    #[tokio::test]
    async fn test_failed_toggle_reverts_only_that_post() {
        let mut feed = FeedState::new(2);
        let request = feed.next_page().unwrap();
        feed.apply_page(request, Ok(vec![post("a", 5, true), post("b", 2, false)]))
            .unwrap();
        let viewer = UserId::new("me");
        let id = PostId::new("a");

        // Pages merged while a toggle is in flight survive the revert.
        let pending = feed.begin_like(&id, Some(&viewer)).unwrap();
        let next = feed.next_page().unwrap();
        feed.apply_page(next, Ok(vec![post("c", 0, false)])).unwrap();
        let err = feed
            .finish_like(
                pending,
                Err(BackendError::HttpStatus {
                    status: 500,
                    message: "nope".into(),
                }),
            )
            .unwrap_err();

        assert!(matches!(err, ActionError::Remote(_)));
        assert_eq!(feed.post(&id).unwrap().likes, LikeState { like_count: 5, viewer_has_liked: true });
        assert_eq!(feed.len(), 3);

        let remote = RecordingEdges::default();
        feed.toggle_like(&PostId::new("b"), Some(&viewer), &remote)
            .await
            .unwrap();
        assert_eq!(feed.post(&PostId::new("b")).unwrap().like_count(), 3);
    }

    #[test]
    fn test_abandoned_toggle_no_longer_blocks() {
        let mut feed = FeedState::new(10);
        let request = feed.next_page().unwrap();
        feed.apply_page(request, Ok(vec![post("p", 1, false)])).unwrap();
        let id = PostId::new("p");

        let _pending = feed.begin_like(&id, Some(&UserId::new("me"))).unwrap();
        assert_eq!(feed.abandon_pending_likes(), 1);
        assert!(!feed.is_like_pending(&id));
        assert!(feed.begin_like(&id, Some(&UserId::new("other"))).is_ok());
    }

    #[test]
    fn test_toggle_unknown_post_is_not_found() {
        let mut feed = FeedState::new(10);
        let err = feed
            .begin_like(&PostId::new("missing"), Some(&UserId::new("me")))
            .unwrap_err();
        assert!(matches!(err, ActionError::NotFound(_)));
    }

    #[test]
    fn test_replace_and_remove() {
        let mut feed = FeedState::new(10);
        let request = feed.next_page().unwrap();
        feed.apply_page(request, Ok(vec![post("a", 0, false), post("b", 0, false)]))
            .unwrap();

        let mut edited = post("b", 0, false);
        edited.body = "edited".into();
        assert!(feed.replace(edited));
        assert_eq!(feed.posts()[1].body, "edited");

        assert!(feed.remove(&PostId::new("a")).is_some());
        assert_eq!(feed.len(), 1);
        assert!(feed.remove(&PostId::new("a")).is_none());
    }
}
