//! Bracket- and string-aware scanning over embedded Python snippets.
//!
//! The markup layer has to find delimiters (`}`, ` in `, `:`, `;`) that sit
//! outside any bracket pair or string literal before a snippet is handed to
//! the Python parser.

use std::ops::ControlFlow;

/// Call `f` for every byte that is outside brackets and string literals.
/// Bracket bytes themselves are reported at the depth they open or close to.
pub(crate) fn for_each_top_level(
    s: &str,
    mut f: impl FnMut(usize, u8) -> ControlFlow<()>,
) {
    let bytes = s.as_bytes();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if let Some(q) = quote {
            if c == b'\\' {
                i += 2;
                continue;
            }
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match c {
            b'"' | b'\'' => quote = Some(c),
            b'(' | b'[' | b'{' => {
                if depth == 0 && f(i, c).is_break() {
                    return;
                }
                depth += 1;
            }
            b')' | b']' | b'}' => {
                depth -= 1;
                if depth == 0 && f(i, c).is_break() {
                    return;
                }
            }
            _ => {
                if depth == 0 && f(i, c).is_break() {
                    return;
                }
            }
        }
        i += 1;
    }
}

/// Net bracket depth at the end of `s` (strings ignored). Positive while
/// a bracket is still open.
pub(crate) fn bracket_balance(s: &str) -> i32 {
    let bytes = s.as_bytes();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        match quote {
            Some(_) if c == b'\\' => i += 1,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                b'"' | b'\'' => quote = Some(c),
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' | b'}' => depth -= 1,
                b'#' => break,
                _ => {}
            },
        }
        i += 1;
    }
    depth
}

/// Index of the `}` closing the `{` at `open`, skipping nested braces and
/// string literals.
pub(crate) fn matching_brace(s: &str, open: usize) -> Option<usize> {
    let bytes = s.as_bytes();
    if bytes.get(open) != Some(&b'{') {
        return None;
    }
    let mut depth = 0u32;
    let mut quote: Option<u8> = None;
    let mut i = open;
    while i < bytes.len() {
        let c = bytes[i];
        if let Some(q) = quote {
            if c == b'\\' {
                i += 2;
                continue;
            }
            if c == q {
                quote = None;
            }
        } else {
            match c {
                b'"' | b'\'' => quote = Some(c),
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// Byte index of the first top-level occurrence of `needle`.
pub(crate) fn find_top_level(s: &str, needle: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let first = *needle.as_bytes().first()?;
    let mut found = None;
    for_each_top_level(s, |i, c| {
        if c == first && bytes[i..].starts_with(needle.as_bytes()) {
            found = Some(i);
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    });
    found
}

/// If `value` (trimmed) is exactly one `{...}` group, its inner text.
pub(crate) fn strip_braces(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    let close = matching_brace(trimmed, 0)?;
    (close == trimmed.len() - 1).then(|| &trimmed[1..close])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_top_level_skips_strings_and_brackets() {
        assert_eq!(find_top_level("x in items", " in "), Some(1));
        assert_eq!(find_top_level("f(' in ') in xs", " in "), Some(9));
        assert_eq!(find_top_level("[a in b] in c", " in "), Some(8));
        assert_eq!(find_top_level("abc", ";"), None);
    }

    #[test]
    fn test_bracket_balance() {
        assert_eq!(bracket_balance("!path {"), 1);
        assert_eq!(bracket_balance("'a': '/{id}',"), 0);
        assert_eq!(bracket_balance("}"), -1);
    }

    #[test]
    fn test_matching_brace() {
        assert_eq!(matching_brace("{a}", 0), Some(2));
        assert_eq!(matching_brace("{ {'k': 1}['k'] }", 0), Some(16));
        assert_eq!(matching_brace("{ '}' }", 0), Some(6));
        assert_eq!(matching_brace("{ open", 0), None);
    }

    #[test]
    fn test_strip_braces() {
        assert_eq!(strip_braces(" {count > 0} "), Some("count > 0"));
        assert_eq!(strip_braces("{a} and {b}"), None);
        assert_eq!(strip_braces("plain"), None);
    }
}
