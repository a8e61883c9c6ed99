//! Merging fetched pages and newly created posts into the feed array.
//!
//! The feed is append-only in view order: pages are added at the end and only
//! posts the viewer just created are placed at the front. Identity is the
//! post id; a post appears at most once.

use std::collections::HashSet;

use super::cursor::PageRequest;
use super::ids::PostId;
use super::post::Post;

/// One fetched page and where it sits in the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedPage {
    pub posts: Vec<Post>,
    pub offset: usize,
    pub has_more: bool,
}

impl FeedPage {
    /// A page is the last one when it came back shorter than requested.
    pub fn new(request: PageRequest, posts: Vec<Post>) -> Self {
        let has_more = posts.len() == request.limit;
        Self {
            posts,
            offset: request.offset,
            has_more,
        }
    }
}

/// Append `page` to `existing`, skipping posts already present.
///
/// The first occurrence of an id wins, including duplicates inside `page`.
/// Returns how many posts were actually appended.
pub fn append_page(existing: &mut Vec<Post>, page: Vec<Post>) -> usize {
    let mut seen: HashSet<PostId> = existing.iter().map(|p| p.id.clone()).collect();
    let before = existing.len();

    existing.extend(page.into_iter().filter(|p| seen.insert(p.id.clone())));

    let appended = existing.len() - before;
    if appended > 0 {
        tracing::trace!(appended, total = existing.len(), "Appended feed page");
    }
    appended
}

/// Place `post` at the front of the feed, removing any later copy of it.
pub fn prepend_new(existing: &mut Vec<Post>, post: Post) {
    existing.retain(|p| p.id != post.id);
    existing.insert(0, post);
}

/// Drop every repeated id, keeping the first occurrence in place.
pub fn dedup_by_id(posts: &mut Vec<Post>) {
    let mut seen = HashSet::with_capacity(posts.len());
    posts.retain(|p| seen.insert(p.id.clone()));
}
