//! Client core for the RedeGuara social network.
//!
//! Persistence, authentication and media storage live in a hosted backend;
//! this crate holds the client-side state that sits between that backend
//! and the screen:
//!
//! - [`cache`] - Session-scoped TTL cache for homepage sections
//! - [`feed`] - Post normalization, page composition, pagination cursor and
//!   optimistic like toggling
//! - [`media`] - Per-post media carousel state
//! - [`backend`] - Typed HTTP client for the data store, storage and auth
//! - [`home`] - Cached homepage loader
//! - [`compose`] - Validation and publication of new posts

pub mod backend;
pub mod cache;
pub mod compose;
pub mod config;
pub mod error;
pub mod feed;
pub mod home;
pub mod media;
pub mod util;

pub use error::ActionError;
