//! Quoting helpers for generated Python and HTML.

/// Render `s` as a Python string literal, preferring single quotes the way
/// Python's own `repr` does.
pub fn py_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };

    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Whether `s` is lexically an identifier (keywords are not rejected here).
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_alphanumeric())
}

/// Whether `s` is a dotted identifier path such as `user.name`.
pub fn is_dotted_identifier(s: &str) -> bool {
    !s.is_empty() && s.split('.').all(is_identifier)
}

/// Escape text content for HTML.
pub fn escape_html(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#39;"),
            _ => result.push(c),
        }
    }
    result
}

/// Escape a double-quoted HTML attribute value.
pub fn escape_html_attr(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '"' => result.push_str("&quot;"),
            _ => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_py_str_plain() {
        assert_eq!(py_str("hello"), "'hello'");
        assert_eq!(py_str(""), "''");
    }

    #[test]
    fn test_py_str_quotes() {
        assert_eq!(py_str("it's"), "\"it's\"");
        assert_eq!(py_str("a'b\"c"), "'a\\'b\"c'");
    }

    #[test]
    fn test_py_str_escapes() {
        assert_eq!(py_str("a\nb\\c\t"), "'a\\nb\\\\c\\t'");
        assert_eq!(py_str("\u{1}"), "'\\x01'");
        assert_eq!(py_str("héllo"), "'héllo'");
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("count"));
        assert!(is_identifier("_private1"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("count += 1"));
        assert!(!is_identifier(""));
        assert!(is_dotted_identifier("user.name"));
        assert!(!is_dotted_identifier("user..name"));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a & b>"), "&lt;a &amp; b&gt;");
    }

    #[test]
    fn test_escape_html_attr() {
        assert_eq!(escape_html_attr("say \"hi\" & <bye>"), "say &quot;hi&quot; &amp; <bye>");
    }
}
