//! Title normalization for use inside a filename.

use crate::consts::{SPACED_SLASH_REGEX, WHITESPACE_REGEX};

/// Characters no common filesystem accepts in a name.
const ILLEGAL: &[char] = &['\\', '?', '*', '<', '>', '|'];

fn unify(c: char) -> Option<&'static str> {
    Some(match c {
        '\u{2010}'..='\u{2015}' | '\u{2212}' => "-",
        '"' | '`' | '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{201C}' | '\u{201D}' | '\u{201E}'
        | '\u{00AB}' | '\u{00BB}' => "'",
        '\u{2026}' => "...",
        '%' => " percent",
        ':' => "",
        _ => return None,
    })
}

/// Produce a single-line, filesystem-safe version of `title`.
pub fn clean_title(title: &str) -> String {
    let title = SPACED_SLASH_REGEX.replace_all(title, " - ");
    let mut out = String::with_capacity(title.len());
    for c in title.chars() {
        if let Some(replacement) = unify(c) {
            out.push_str(replacement);
        } else if c == '/' {
            out.push('-');
        } else if c.is_control() {
            out.push(' ');
        } else if !ILLEGAL.contains(&c) {
            out.push(c);
        }
    }
    let collapsed = WHITESPACE_REGEX.replace_all(&out, " ");
    collapsed.trim().trim_end_matches('.').trim_end().to_string()
}
