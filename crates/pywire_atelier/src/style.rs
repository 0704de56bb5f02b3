//! Scoped CSS.
//!
//! A `<style scoped>` block is rewritten so that every selector only matches
//! elements of its page: the generator stamps those elements with a
//! `data-pw-<scope>` attribute and [`apply_scoped_css`] appends the matching
//! attribute selector to the last compound of each selector.
//!
//! The runtime deduplicates blocks per request through a style collector;
//! [`StyleCollector`] implements the same contract for build-time bundling.

use pywire_carton::FxHashSet;

/// Attribute name that carries the scope on rendered elements.
pub fn scope_attribute(scope_id: &str) -> String {
    format!("data-pw-{}", scope_id)
}

/// Apply scoped CSS transformation
pub fn apply_scoped_css(css: &str, scope_id: &str) -> String {
    let attr = scope_attribute(scope_id);
    let mut attr_selector = String::with_capacity(attr.len() + 2);
    attr_selector.push('[');
    attr_selector.push_str(&attr);
    attr_selector.push(']');

    let mut output = String::with_capacity(css.len() * 2);
    let mut chars = css.chars().peekable();
    let mut in_selector = true;
    let mut in_string = false;
    let mut string_char = '"';
    let mut in_comment = false;
    let mut in_at_rule = false;
    let mut brace_depth: u32 = 0;
    let mut at_rule_depth: u32 = 0;
    // Depth of an open @keyframes block; its body is copied untouched
    let mut keyframes_depth: Option<u32> = None;
    let mut last_selector_end = 0;
    let mut current = String::new();

    while let Some(c) = chars.next() {
        current.push(c);

        if let Some(depth) = keyframes_depth {
            output.push(c);
            match c {
                '{' => brace_depth += 1,
                '}' => {
                    brace_depth = brace_depth.saturating_sub(1);
                    if brace_depth < depth {
                        keyframes_depth = None;
                        in_selector = true;
                        last_selector_end = current.len();
                        if brace_depth == 0 {
                            at_rule_depth = 0;
                        }
                    }
                }
                _ => {}
            }
            continue;
        }

        if in_comment {
            if c == '*' && chars.peek() == Some(&'/') {
                if let Some(slash) = chars.next() {
                    current.push(slash);
                }
                in_comment = false;
            }
            continue;
        }

        if in_string {
            if c == string_char && !current.ends_with("\\\"") && !current.ends_with("\\'") {
                in_string = false;
            }
            if !in_selector && !in_at_rule {
                output.push(c);
            }
            continue;
        }

        match c {
            '"' | '\'' => {
                in_string = true;
                string_char = c;
                if !in_selector && !in_at_rule {
                    output.push(c);
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                if let Some(star) = chars.next() {
                    current.push(star);
                }
                in_comment = true;
            }
            ';' if in_at_rule => {
                // Statement at-rule such as @import
                output.push_str(current[last_selector_end..].trim());
                in_at_rule = false;
                in_selector = true;
                last_selector_end = current.len();
            }
            '{' => {
                brace_depth += 1;
                if in_at_rule {
                    let header = current[last_selector_end..current.len() - 1].trim();
                    output.push_str(header);
                    output.push('{');
                    in_at_rule = false;
                    last_selector_end = current.len();
                    if header.contains("keyframes") {
                        keyframes_depth = Some(brace_depth);
                        in_selector = false;
                    } else {
                        at_rule_depth = brace_depth;
                        in_selector = true;
                    }
                } else if in_selector
                    && (brace_depth == 1 || (at_rule_depth > 0 && brace_depth > at_rule_depth))
                {
                    let selector_part = &current[last_selector_end..current.len() - 1];
                    output.push_str(&scope_selector(selector_part.trim(), &attr_selector));
                    output.push('{');
                    in_selector = false;
                    last_selector_end = current.len();
                } else {
                    output.push(c);
                }
            }
            '}' => {
                brace_depth = brace_depth.saturating_sub(1);
                output.push(c);
                if brace_depth == 0 {
                    in_selector = true;
                    at_rule_depth = 0;
                    last_selector_end = current.len();
                } else if at_rule_depth > 0 && brace_depth >= at_rule_depth {
                    in_selector = true;
                    last_selector_end = current.len();
                }
            }
            '@' if in_selector => {
                in_at_rule = true;
                in_selector = false;
            }
            _ if in_selector || in_at_rule => {}
            _ => output.push(c),
        }
    }

    if in_selector && !current[last_selector_end..].trim().is_empty() {
        output.push_str(&current[last_selector_end..]);
    }

    output
}

/// Add scope attribute to a selector list
fn scope_selector(selector: &str, attr_selector: &str) -> String {
    selector
        .split(',')
        .map(|s| scope_single_selector(s.trim(), attr_selector))
        .collect::<Vec<_>>()
        .join(", ")
}

fn scope_single_selector(selector: &str, attr_selector: &str) -> String {
    if selector.is_empty() {
        return selector.to_string();
    }
    if selector.contains(":deep(") {
        return transform_deep(selector, attr_selector);
    }
    if selector.contains(":global(") {
        return transform_global(selector);
    }

    let parts: Vec<&str> = selector.split_whitespace().collect();
    let Some((last, init)) = parts.split_last() else {
        return selector.to_string();
    };

    let mut result = String::with_capacity(selector.len() + attr_selector.len());
    for part in init {
        result.push_str(part);
        result.push(' ');
    }
    result.push_str(&add_scope_to_element(last, attr_selector));
    result
}

/// Insert the attribute selector before any pseudo-class or pseudo-element.
fn add_scope_to_element(selector: &str, attr_selector: &str) -> String {
    // Combinators written without spaces (`a>b`) are scoped as one compound
    if matches!(selector, ">" | "+" | "~") {
        return selector.to_string();
    }

    let split_at = selector.find("::").or_else(|| {
        selector
            .rfind(':')
            .filter(|&pos| pos > 0 && !selector[..pos].ends_with('\\'))
    });

    match split_at {
        Some(pos) => {
            let (before, after) = selector.split_at(pos);
            let mut result =
                String::with_capacity(before.len() + attr_selector.len() + after.len());
            result.push_str(before);
            result.push_str(attr_selector);
            result.push_str(after);
            result
        }
        None => {
            let mut result = String::with_capacity(selector.len() + attr_selector.len());
            result.push_str(selector);
            result.push_str(attr_selector);
            result
        }
    }
}

/// `.a :deep(.b)` -> `.a[data-pw-x] .b`
fn transform_deep(selector: &str, attr_selector: &str) -> String {
    let Some(start) = selector.find(":deep(") else {
        return selector.to_string();
    };
    let before = selector[..start].trim();
    let after = &selector[start + 6..];
    let Some(end) = after.find(')') else {
        return selector.to_string();
    };
    let inner = &after[..end];
    let rest = &after[end + 1..];

    let mut result = String::with_capacity(selector.len() + attr_selector.len());
    if !before.is_empty() {
        result.push_str(before);
    }
    result.push_str(attr_selector);
    result.push(' ');
    result.push_str(inner);
    result.push_str(rest);
    result
}

/// `:global(.a)` -> `.a`
fn transform_global(selector: &str) -> String {
    let Some(start) = selector.find(":global(") else {
        return selector.to_string();
    };
    let before = &selector[..start];
    let after = &selector[start + 8..];
    let Some(end) = after.find(')') else {
        return selector.to_string();
    };

    let mut result = String::with_capacity(selector.len());
    result.push_str(before);
    result.push_str(&after[..end]);
    result.push_str(&after[end + 1..]);
    result
}

/// Per-render style deduplication keyed by scope id.
#[derive(Debug, Default)]
pub struct StyleCollector {
    seen: FxHashSet<String>,
    blocks: Vec<String>,
}

impl StyleCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the CSS of a scope. Returns `true` only the first time the
    /// scope is seen; later calls are ignored.
    pub fn add(&mut self, scope_id: &str, css: &str) -> bool {
        if !self.seen.insert(scope_id.to_string()) {
            return false;
        }
        self.blocks.push(css.to_string());
        true
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// One `<style>` block with every collected scope, in insertion order.
    pub fn render(&self) -> String {
        if self.blocks.is_empty() {
            return String::new();
        }
        format!("<style>{}</style>", self.blocks.join("\n"))
    }

    /// Collected CSS without the `<style>` wrapper.
    pub fn css(&self) -> String {
        self.blocks.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ATTR: &str = "[data-pw-123]";

    #[test]
    fn test_scope_simple_selector() {
        assert_eq!(scope_selector(".foo", ATTR), ".foo[data-pw-123]");
    }

    #[test]
    fn test_scope_descendant_selector() {
        assert_eq!(scope_selector(".foo .bar", ATTR), ".foo .bar[data-pw-123]");
    }

    #[test]
    fn test_scope_multiple_selectors() {
        assert_eq!(
            scope_selector(".foo, .bar", ATTR),
            ".foo[data-pw-123], .bar[data-pw-123]"
        );
    }

    #[test]
    fn test_scope_pseudo() {
        assert_eq!(scope_selector("a:hover", ATTR), "a[data-pw-123]:hover");
        assert_eq!(scope_selector("p::before", ATTR), "p[data-pw-123]::before");
    }

    #[test]
    fn test_transform_deep() {
        assert_eq!(transform_deep(":deep(.child)", ATTR), "[data-pw-123] .child");
        assert_eq!(
            transform_deep(".card :deep(.child)", ATTR),
            ".card[data-pw-123] .child"
        );
    }

    #[test]
    fn test_transform_global() {
        assert_eq!(transform_global(":global(.foo)"), ".foo");
    }

    #[test]
    fn test_apply_scoped_css() {
        let css = ".a { color: red; }\nh1, h2 { margin: 0; }";
        assert_eq!(
            apply_scoped_css(css, "123"),
            ".a[data-pw-123]{ color: red; }h1[data-pw-123], h2[data-pw-123]{ margin: 0; }"
        );
    }

    #[test]
    fn test_scope_media_query() {
        let css = "@media (max-width: 768px) { .foo { color: red; } }";
        let result = apply_scoped_css(css, "123");
        assert!(result.contains("@media (max-width: 768px){"), "{}", result);
        assert!(result.contains(".foo[data-pw-123]{"), "{}", result);
        assert!(!result.contains("768px)[data-pw-123]"), "{}", result);
    }

    #[test]
    fn test_keyframes_untouched() {
        let css = "@keyframes spin { from { opacity: 0; } to { opacity: 1; } } .x { color: red; }";
        let result = apply_scoped_css(css, "123");
        assert!(
            result.contains("@keyframes spin{ from { opacity: 0; } to { opacity: 1; } }"),
            "{}",
            result
        );
        assert!(result.contains(".x[data-pw-123]{"), "{}", result);
    }

    #[test]
    fn test_statement_at_rule() {
        let css = "@import url('base.css');\n.x { color: red; }";
        let result = apply_scoped_css(css, "123");
        assert!(result.starts_with("@import url('base.css');"), "{}", result);
        assert!(result.contains(".x[data-pw-123]{"), "{}", result);
    }

    #[test]
    fn test_style_collector_dedupes_by_scope() {
        let mut collector = StyleCollector::new();
        assert!(collector.is_empty());
        assert!(collector.add("abc", ".a[data-pw-abc]{}"));
        assert!(!collector.add("abc", ".a[data-pw-abc]{}"));
        assert!(collector.add("def", ".b[data-pw-def]{}"));
        assert_eq!(
            collector.render(),
            "<style>.a[data-pw-abc]{}\n.b[data-pw-def]{}</style>"
        );
        assert_eq!(collector.render().matches("data-pw-abc").count(), 1);
    }
}
