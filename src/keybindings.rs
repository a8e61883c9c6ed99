//! Keybinding registry: maps actions to key events with config overrides.
//!
//! Text entry (composer, comment box) and the delete confirmation read keys
//! directly; everything else goes through this registry so it can be
//! remapped from config.toml and listed on the help screen.
use crossterm::event::{KeyCode, KeyModifiers};
use std::collections::HashMap;

// ============================================================================
// Action Enum
// ============================================================================

/// All user-facing actions that can be triggered by keybindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Quit,
    NavDown,
    NavUp,
    SwitchView,
    Back,
    OpenPost,
    Refresh,
    ToggleLike,
    PrevImage,
    NextImage,
    PlayVideo,
    Lightbox,
    NewPost,
    Comment,
    Edit,
    Delete,
    OpenInBrowser,
    Share,
    ShowHelp,
}

impl Action {
    /// Human-readable description for the help screen.
    pub fn describe(self) -> &'static str {
        match self {
            Self::Quit => "Quit application",
            Self::NavDown => "Navigate down",
            Self::NavUp => "Navigate up",
            Self::SwitchView => "Switch Home / Feed",
            Self::Back => "Go back",
            Self::OpenPost => "Open post",
            Self::Refresh => "Refresh (bypass cache)",
            Self::ToggleLike => "Like / unlike",
            Self::PrevImage => "Previous image",
            Self::NextImage => "Next image",
            Self::PlayVideo => "Play video",
            Self::Lightbox => "Full-screen image",
            Self::NewPost => "New post",
            Self::Comment => "Write a comment",
            Self::Edit => "Edit post or comment",
            Self::Delete => "Delete post or comment",
            Self::OpenInBrowser => "Open in browser",
            Self::Share => "Show share link",
            Self::ShowHelp => "Show help",
        }
    }
}

// ============================================================================
// Context Enum
// ============================================================================

/// Dispatch context; determines which bindings are active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Context {
    Global,
    Home,
    Feed,
    Post,
    Lightbox,
}

// ============================================================================
// Key Specification
// ============================================================================

/// A key event: code + modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeySpec {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
}

impl KeySpec {
    pub const fn new(code: KeyCode, modifiers: KeyModifiers) -> Self {
        Self { code, modifiers }
    }

    pub const fn plain(code: KeyCode) -> Self {
        Self::new(code, KeyModifiers::NONE)
    }

    pub const fn ctrl(c: char) -> Self {
        Self::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    const fn char(c: char) -> Self {
        Self::plain(KeyCode::Char(c))
    }
}

/// Parse a key string from config into a KeySpec.
///
/// Supported formats:
/// - Single char: "q", "j", "["
/// - Named keys: "Enter", "Esc", "Tab", "Up", "Down", "Left", "Right", "Space"
/// - Modifier combos: "Ctrl+d"
/// - Function keys: "F1" through "F12"
fn parse_key_string(s: &str) -> Option<KeySpec> {
    let s = s.trim();

    if let Some(rest) = s.strip_prefix("Ctrl+") {
        let mut chars = rest.trim().chars();
        let c = chars.next()?;
        return chars.next().is_none().then(|| KeySpec::ctrl(c));
    }

    match s.to_lowercase().as_str() {
        "enter" | "return" => return Some(KeySpec::plain(KeyCode::Enter)),
        "esc" | "escape" => return Some(KeySpec::plain(KeyCode::Esc)),
        "tab" => return Some(KeySpec::plain(KeyCode::Tab)),
        "up" => return Some(KeySpec::plain(KeyCode::Up)),
        "down" => return Some(KeySpec::plain(KeyCode::Down)),
        "left" => return Some(KeySpec::plain(KeyCode::Left)),
        "right" => return Some(KeySpec::plain(KeyCode::Right)),
        "backspace" => return Some(KeySpec::plain(KeyCode::Backspace)),
        "space" => return Some(KeySpec::char(' ')),
        _ => {}
    }

    if let Some(n) = s.strip_prefix(['F', 'f']).and_then(|n| n.parse::<u8>().ok()) {
        return (1..=12).contains(&n).then(|| KeySpec::plain(KeyCode::F(n)));
    }

    let mut chars = s.chars();
    let c = chars.next()?;
    chars.next().is_none().then(|| KeySpec::char(c))
}

/// Format a KeySpec as a human-readable string for the help screen.
fn format_key(key: &KeySpec) -> String {
    let modifier = if key.modifiers.contains(KeyModifiers::CONTROL) {
        "Ctrl+"
    } else {
        ""
    };

    let key_name = match key.code {
        KeyCode::Char(' ') => "Space".to_string(),
        KeyCode::Char(c) => c.to_string(),
        KeyCode::Enter => "Enter".to_string(),
        KeyCode::Esc => "Esc".to_string(),
        KeyCode::Tab => "Tab".to_string(),
        KeyCode::Up => "Up".to_string(),
        KeyCode::Down => "Down".to_string(),
        KeyCode::Left => "Left".to_string(),
        KeyCode::Right => "Right".to_string(),
        KeyCode::Backspace => "Backspace".to_string(),
        KeyCode::F(n) => format!("F{n}"),
        _ => "?".to_string(),
    };

    format!("{modifier}{key_name}")
}

// ============================================================================
// Keybinding Registry
// ============================================================================

/// Registry of keybindings, supporting default bindings and config overrides.
///
/// The same key can map to different actions in different contexts; lookups
/// fall back to `Context::Global`.
pub struct KeybindingRegistry {
    lookup: HashMap<(Context, KeySpec), Action>,
    /// All bindings in registration order, for the help screen.
    bindings: Vec<(Context, KeySpec, Action)>,
}

impl KeybindingRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            lookup: HashMap::new(),
            bindings: Vec::new(),
        };
        registry.register_defaults();
        registry
    }

    fn bind(&mut self, context: Context, key: KeySpec, action: Action) {
        self.lookup.insert((context, key), action);
        self.bindings.push((context, key, action));
    }

    fn register_defaults(&mut self) {
        use Action::*;
        use Context::{Feed, Global, Home, Post};

        let defaults: &[(Context, KeySpec, Action)] = &[
            (Global, KeySpec::char('q'), Quit),
            (Global, KeySpec::ctrl('c'), Quit),
            (Global, KeySpec::char('j'), NavDown),
            (Global, KeySpec::plain(KeyCode::Down), NavDown),
            (Global, KeySpec::char('k'), NavUp),
            (Global, KeySpec::plain(KeyCode::Up), NavUp),
            (Global, KeySpec::plain(KeyCode::Tab), SwitchView),
            (Global, KeySpec::char('r'), Refresh),
            (Global, KeySpec::char('n'), NewPost),
            (Global, KeySpec::char('?'), ShowHelp),
            // Lists
            (Home, KeySpec::plain(KeyCode::Enter), OpenPost),
            (Home, KeySpec::char('o'), OpenInBrowser),
            (Feed, KeySpec::plain(KeyCode::Enter), OpenPost),
            (Feed, KeySpec::char('l'), ToggleLike),
            (Feed, KeySpec::char('['), PrevImage),
            (Feed, KeySpec::char(']'), NextImage),
            (Feed, KeySpec::char('v'), PlayVideo),
            (Feed, KeySpec::char('z'), Lightbox),
            (Feed, KeySpec::char('o'), OpenInBrowser),
            (Feed, KeySpec::char('s'), Share),
            // Single post
            (Post, KeySpec::char('l'), ToggleLike),
            (Post, KeySpec::char('['), PrevImage),
            (Post, KeySpec::char(']'), NextImage),
            (Post, KeySpec::char('v'), PlayVideo),
            (Post, KeySpec::char('z'), Lightbox),
            (Post, KeySpec::char('c'), Comment),
            (Post, KeySpec::char('e'), Edit),
            (Post, KeySpec::char('d'), Delete),
            (Post, KeySpec::char('o'), OpenInBrowser),
            (Post, KeySpec::char('s'), Share),
            (Post, KeySpec::char('b'), Back),
            (Post, KeySpec::plain(KeyCode::Esc), Back),
            // Lightbox
            (Context::Lightbox, KeySpec::char('['), PrevImage),
            (Context::Lightbox, KeySpec::plain(KeyCode::Left), PrevImage),
            (Context::Lightbox, KeySpec::char(']'), NextImage),
            (Context::Lightbox, KeySpec::plain(KeyCode::Right), NextImage),
            (Context::Lightbox, KeySpec::char('z'), Back),
            (Context::Lightbox, KeySpec::plain(KeyCode::Esc), Back),
        ];

        for &(context, key, action) in defaults {
            self.bind(context, key, action);
        }
    }

    /// Apply user overrides from the config `[keybindings]` table.
    ///
    /// Keys in the map are action names ("quit", "toggle_like"), values are
    /// key strings ("q", "Ctrl+d", "F5"). The new key replaces the action's
    /// old keys in every context the action was bound in.
    ///
    /// Returns a warning for each unknown action name or unparseable key.
    pub fn apply_overrides(&mut self, overrides: &HashMap<String, String>) -> Vec<String> {
        let mut warnings = Vec::new();

        for (action_name, key_str) in overrides {
            let Some(action) = parse_action_name(action_name) else {
                warnings.push(format!("Unknown action '{action_name}', ignoring"));
                continue;
            };

            let Some(key) = parse_key_string(key_str) else {
                warnings.push(format!(
                    "Cannot parse key '{key_str}' for action '{action_name}', ignoring"
                ));
                continue;
            };

            let mut contexts: Vec<Context> = self
                .bindings
                .iter()
                .filter(|(_, _, a)| *a == action)
                .map(|(c, _, _)| *c)
                .collect();
            contexts.dedup();

            self.lookup.retain(|_, a| *a != action);
            self.bindings.retain(|(_, _, a)| *a != action);

            for ctx in contexts {
                self.bind(ctx, key, action);
            }

            tracing::info!(action = %action_name, key = %key_str, "Applied keybinding override");
        }

        warnings
    }

    /// Look up the action for a key, trying `context` first and then `Global`.
    pub fn action_for_key(
        &self,
        code: KeyCode,
        modifiers: KeyModifiers,
        context: Context,
    ) -> Option<Action> {
        let key = KeySpec::new(code, modifiers);

        if let Some(&action) = self.lookup.get(&(context, key)) {
            return Some(action);
        }

        if context != Context::Global {
            return self.lookup.get(&(Context::Global, key)).copied();
        }

        None
    }

    /// (context, key display string, action, description) for the help screen.
    pub fn all_bindings(&self) -> Vec<(Context, String, Action, &'static str)> {
        self.bindings
            .iter()
            .map(|(ctx, key, action)| (*ctx, format_key(key), *action, action.describe()))
            .collect()
    }
}

impl Default for KeybindingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_action_name(name: &str) -> Option<Action> {
    match name.to_lowercase().as_str() {
        "quit" => Some(Action::Quit),
        "nav_down" | "down" => Some(Action::NavDown),
        "nav_up" | "up" => Some(Action::NavUp),
        "switch_view" | "tab" => Some(Action::SwitchView),
        "back" => Some(Action::Back),
        "open_post" | "open" | "enter" => Some(Action::OpenPost),
        "refresh" => Some(Action::Refresh),
        "toggle_like" | "like" => Some(Action::ToggleLike),
        "prev_image" => Some(Action::PrevImage),
        "next_image" => Some(Action::NextImage),
        "play_video" | "play" => Some(Action::PlayVideo),
        "lightbox" => Some(Action::Lightbox),
        "new_post" | "compose" => Some(Action::NewPost),
        "comment" => Some(Action::Comment),
        "edit" => Some(Action::Edit),
        "delete" => Some(Action::Delete),
        "open_in_browser" | "browser" => Some(Action::OpenInBrowser),
        "share" => Some(Action::Share),
        "show_help" | "help" => Some(Action::ShowHelp),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================
