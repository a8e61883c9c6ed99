//! Utility functions shared by the library and the terminal UI.
//!
//! - **URL validation**: project URL policy and safe links for the browser
//! - **Text processing**: terminal width, truncation and control-char stripping
//! - **Images**: resize-endpoint rewriting for storage URLs
//! - **Sharing**: post links, share texts and WhatsApp messages

mod image;
mod share;
mod text;
mod url_validator;

pub use image::{optimize_image_url, ImageRewriter, ImageTransform, ResizeMode, DEFAULT_QUALITY};
pub use share::{seller_contact_url, ShareLinks};
pub use text::{display_width, single_line, strip_control_chars, truncate_chars, truncate_to_width};
pub use url_validator::{validate_project_url, validate_url_for_open, UrlValidationError};
