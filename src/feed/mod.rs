//! Feed state: posts, pages and likes.
//!
//! - [`post`] - The normalized [`Post`] and ingestion from raw rows
//! - [`composer`] - Appending pages and prepending new posts with id dedup
//! - [`cursor`] - Page index, end-of-data flag and in-flight guard
//! - [`optimistic`] - Snapshot/apply/revert transactions and like toggling
//! - [`state`] - [`FeedState`], the infinite feed tying the above together
//!
//! # Example
//!
//! ```ignore
//! use redeguara::feed::FeedState;
//!
//! let mut feed = FeedState::new(10);
//! feed.load_next(&backend, viewer.as_ref()).await?;
//! feed.toggle_like(&post_id, viewer.as_ref(), &backend).await?;
//! ```

pub mod composer;
pub mod cursor;
mod ids;
pub mod optimistic;
pub mod post;
mod state;

pub use composer::{append_page, prepend_new, FeedPage};
pub use cursor::{PageCursor, PageRequest, DEFAULT_PAGE_SIZE};
pub use ids::{CommentId, PostId, UserId};
pub use optimistic::{toggle_like, LikeAction, LikeEdges, PendingLike, Transaction};
pub use post::{normalize, Author, LikeState, Post};
pub use state::{FeedState, PostSource};
