//! Terminal User Interface module.
//!
//! # Module Structure
//!
//! - `loop_runner` - Main event loop and terminal management
//! - `input` - Keyboard input handling and overlays
//! - `events` - Background task event processing
//! - `render` - View rendering dispatch and overlays
//! - `helpers` - Task spawning, browser opening, time formatting
//! - `home` - Home screen widget
//! - `posts` - Feed list widget
//! - `reader` - Single post view with comments
//! - `status` - Status bar widget
//! - `help` - Keybinding help overlay

mod events;
mod help;
mod helpers;
mod home;
mod input;
mod loop_runner;
mod posts;
pub mod reader;
mod render;
mod status;

pub use loop_runner::run;
use loop_runner::Action;
