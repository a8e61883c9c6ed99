//! Typed client for the hosted backend.
//!
//! The backend speaks three HTTP dialects under one project URL:
//!
//! - **Data store** (`/rest/v1`): tables `posts`, `post_likes`,
//!   `post_comments`, `profiles`, `products`, `groups` and the `get_random_*`
//!   procedures
//! - **Object storage** (`/storage/v1`): the `post-images` and `post-videos` buckets
//! - **Auth** (`/auth/v1`): email/password sessions
//!
//! [`Backend`] is a cheap-to-clone handle; operations are split across the
//! submodules by table the same way they are grouped in the store.

mod auth;
mod client;
mod comments;
mod directory;
mod error;
mod likes;
mod posts;
pub mod storage;
pub mod types;

pub use auth::{AuthClient, AuthEvent, AuthSubscription, Profile, Session, UserRole};
pub use client::{build_http_client, Backend, REQUEST_TIMEOUT};
pub use error::BackendError;
pub use types::{
    Banner, BannerPosition, Comment, Company, Group, GroupCompany, GroupVisibility, NewPost, Product,
};
