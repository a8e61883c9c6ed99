use std::borrow::Cow;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const ELLIPSIS: &str = "...";

/// Terminal columns occupied by `s` (CJK and emoji count as 2).
pub fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

/// Fit `s` into `max_width` columns, ending with "..." when it had to be cut.
///
/// Widths of 3 or less have no room for the ellipsis, so the text is simply
/// clipped.
///
/// ```
/// use redeguara::util::truncate_to_width;
///
/// assert_eq!(truncate_to_width("Bom dia, Guará", 20), "Bom dia, Guará");
/// assert_eq!(truncate_to_width("Bom dia, Guará", 10), "Bom dia...");
/// assert_eq!(truncate_to_width("Bom dia", 2), "Bo");
/// ```
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if display_width(s) <= max_width {
        return Cow::Borrowed(s);
    }
    if max_width <= ELLIPSIS.len() {
        return Cow::Owned(clip(s, max_width).to_string());
    }
    let kept = clip(s, max_width - ELLIPSIS.len());
    Cow::Owned(format!("{kept}{ELLIPSIS}"))
}

/// Longest prefix of `s` that fits in `width` columns.
fn clip(s: &str, width: usize) -> &str {
    let mut used = 0;
    for (idx, c) in s.char_indices() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w > width {
            return &s[..idx];
        }
        used += w;
    }
    s
}

/// First `max_chars` characters of `s`, followed by "..." when anything was dropped.
///
/// Counts characters, not columns: used for share texts, which are read
/// outside the terminal.
pub fn truncate_chars(s: &str, max_chars: usize) -> Cow<'_, str> {
    match s.char_indices().nth(max_chars) {
        Some((cut, _)) => Cow::Owned(format!("{}{ELLIPSIS}", &s[..cut])),
        None => Cow::Borrowed(s),
    }
}

/// Collapse line breaks and runs of whitespace into single spaces (list previews).
pub fn single_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Remove terminal control characters and escape sequences from user content.
///
/// Posts, comments and names are typed by other users and must not be able
/// to move the cursor, recolor the screen or set the window title. CSI
/// (`ESC [ ... final`) and OSC (`ESC ] ... BEL|ESC \`) sequences are dropped
/// whole; other C0 controls and DEL are dropped; tab, newline and carriage
/// return are kept.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\x1b' => match chars.peek() {
                Some('[') => {
                    chars.next();
                    // Parameters and intermediates run until a final byte in @..=~.
                    for c in chars.by_ref() {
                        if ('\x40'..='\x7e').contains(&c) {
                            break;
                        }
                    }
                }
                Some(']') => {
                    chars.next();
                    while let Some(c) = chars.next() {
                        if c == '\x07' {
                            break;
                        }
                        if c == '\x1b' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            },
            c if is_stripped(c) => {}
            c => out.push(c),
        }
    }

    Cow::Owned(out)
}

fn is_stripped(c: char) -> bool {
    (c.is_ascii_control() && !matches!(c, '\t' | '\n' | '\r')) || c == '\x1b'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_fits_is_borrowed() {
        assert!(matches!(truncate_to_width("curtir", 6), Cow::Borrowed(_)));
    }

    #[test]
    fn test_truncate_wide_chars() {
        // Each CJK char is 2 columns; 7 columns leaves 4 for text.
        assert_eq!(truncate_to_width("你好世界", 7), "你好...");
        assert_eq!(display_width("Oi 🎉"), 5);
    }

    #[test]
    fn test_truncate_narrow_widths() {
        assert_eq!(truncate_to_width("Teste", 0), "");
        assert_eq!(truncate_to_width("Teste", 3), "Tes");
        assert_eq!(truncate_to_width("你好", 1), "");
    }

    #[test]
    fn test_truncate_chars_counts_characters() {
        assert_eq!(truncate_chars("ação", 3), "açã...");
        assert_eq!(truncate_chars("ação", 4), "ação");
        assert_eq!(truncate_chars("", 0), "");
    }

    #[test]
    fn test_single_line_collapses_whitespace() {
        assert_eq!(single_line("  feira\n\nde  sábado\t"), "feira de sábado");
    }

    #[test]
    fn test_strip_clean_text_is_borrowed() {
        assert!(matches!(strip_control_chars("Olá\tmundo\n"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_strip_csi_and_controls() {
        assert_eq!(strip_control_chars("\x1b[31mvermelho\x1b[0m\x07!"), "vermelho!");
        assert_eq!(strip_control_chars("a\x00b\x7fc"), "abc");
    }

    #[test]
    fn test_strip_osc_title_sequences() {
        assert_eq!(strip_control_chars("\x1b]0;pwned\x07ok"), "ok");
        assert_eq!(strip_control_chars("\x1b]0;pwned\x1b\\ok"), "ok");
        assert_eq!(strip_control_chars("fim\x1b"), "fim");
    }
}
