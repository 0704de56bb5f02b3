//! Static tag tables for the markup scanner and code generator.

use phf::phf_set;

static VOID_TAGS: phf::Set<&'static str> = phf_set! {
    "area", "base", "br", "col", "embed", "hr", "img", "input",
    "link", "meta", "param", "source", "track", "wbr",
};

/// Elements whose content is never parsed as markup nor interpolated.
static RAW_TEXT_TAGS: phf::Set<&'static str> = phf_set! {
    "script", "style",
};

/// Elements whose content is text only, but still interpolated.
static RCDATA_TAGS: phf::Set<&'static str> = phf_set! {
    "textarea", "title",
};

static FORM_FIELD_TAGS: phf::Set<&'static str> = phf_set! {
    "input", "textarea", "select",
};

#[inline]
fn lookup(set: &phf::Set<&'static str>, tag: &str) -> bool {
    if tag.bytes().any(|b| b.is_ascii_uppercase()) {
        set.contains(tag.to_ascii_lowercase().as_str())
    } else {
        set.contains(tag)
    }
}

pub fn is_void_tag(tag: &str) -> bool {
    lookup(&VOID_TAGS, tag)
}

pub fn is_raw_text_tag(tag: &str) -> bool {
    lookup(&RAW_TEXT_TAGS, tag)
}

pub fn is_rcdata_tag(tag: &str) -> bool {
    lookup(&RCDATA_TAGS, tag)
}

pub fn is_form_field_tag(tag: &str) -> bool {
    lookup(&FORM_FIELD_TAGS, tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_void_tags() {
        assert!(is_void_tag("br"));
        assert!(is_void_tag("INPUT"));
        assert!(!is_void_tag("div"));
    }

    #[test]
    fn test_text_tags() {
        assert!(is_raw_text_tag("style"));
        assert!(!is_raw_text_tag("textarea"));
        assert!(is_rcdata_tag("textarea"));
        assert!(is_form_field_tag("select"));
        assert!(!is_form_field_tag("button"));
    }
}
