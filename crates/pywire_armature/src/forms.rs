//! Form validation schema extraction.
//!
//! A `<form>` with an `@submit` handler gets a [`FormValidationSchema`]
//! built from the named fields below it. The schema is stored on the submit
//! [`EventAttribute`](pywire_relief::EventAttribute) so the generator can
//! wrap the handler with validation.

use compact_str::CompactString;

use pywire_carton::is_form_field_tag;
use pywire_relief::{
    walk_elements_mut, ElementNode, FieldRules, FormValidationSchema, SpecialAttribute,
    TemplateNode,
};

/// Attach schemas to every `<form @submit>` in `nodes`.
pub fn attach_form_schemas(nodes: &mut [TemplateNode]) {
    walk_elements_mut(nodes, &mut |el| {
        if el.tag != "form" || el.event("submit").is_none() {
            return;
        }
        let Some(schema) = extract_schema(el) else {
            return;
        };
        for special in &mut el.special_attributes {
            if let SpecialAttribute::Event(event) = special {
                if event.event_type == "submit" {
                    event.schema = Some(schema.clone());
                }
            }
        }
    });
}

/// Schema of one form, `None` when it has no named fields.
pub fn extract_schema(form: &ElementNode) -> Option<FormValidationSchema> {
    let mut fields: Vec<FieldRules> = Vec::new();
    collect_fields(&form.children, &mut fields);
    if fields.is_empty() {
        return None;
    }
    Some(FormValidationSchema {
        fields,
        model_name: form.model_attr().map(|m| m.model_name.clone()),
    })
}

fn collect_fields(nodes: &[TemplateNode], out: &mut Vec<FieldRules>) {
    for node in nodes {
        let TemplateNode::Element(el) = node else {
            continue;
        };
        if is_form_field_tag(&el.tag) {
            if let Some(rules) = field_rules(el) {
                // Radio groups share a name
                match out.iter_mut().find(|f| f.name == rules.name) {
                    Some(existing) => existing.required |= rules.required,
                    None => out.push(rules),
                }
            }
        }
        collect_fields(&el.children, out);
    }
}

fn field_rules(el: &ElementNode) -> Option<FieldRules> {
    let name = el.attr_value("name").map(str::trim).filter(|n| !n.is_empty())?;

    let input_type: CompactString = match el.tag.as_str() {
        "textarea" | "select" => el.tag.clone(),
        _ => el
            .attr_value("type")
            .map(|t| CompactString::from(t.trim().to_ascii_lowercase()))
            .unwrap_or_else(|| CompactString::new("text")),
    };

    let reactive = |attr: &str| {
        el.reactive_attrs()
            .find(|r| r.name == attr)
            .map(|r| r.expr.clone())
    };
    let owned = |attr: &str| el.attr_value(attr).map(str::to_string);

    Some(FieldRules {
        name: name.into(),
        input_type,
        required: el.has_attr("required"),
        pattern: owned("pattern"),
        min_length: el.attr_value("minlength").and_then(|v| v.trim().parse().ok()),
        max_length: el.attr_value("maxlength").and_then(|v| v.trim().parse().ok()),
        min_value: owned("min"),
        max_value: owned("max"),
        step: owned("step"),
        title: owned("title"),
        allowed_types: el
            .attr_value("accept")
            .map(|accept| {
                accept
                    .split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default(),
        max_size: el.attr_value("max-size").and_then(parse_size),
        required_expr: reactive("required"),
        min_expr: reactive("min"),
        max_expr: reactive("max"),
    })
}

/// Parse a size such as `5mb`, `1.5k` or `2048` into bytes.
pub fn parse_size(value: &str) -> Option<u64> {
    let value = value.trim().to_ascii_lowercase();
    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(split);
    let number: f64 = number.parse().ok()?;
    let multiplier: u64 = match unit.trim() {
        "" | "b" => 1,
        "k" | "kb" => 1024,
        "m" | "mb" => 1024 * 1024,
        "g" | "gb" => 1024 * 1024 * 1024,
        _ => return None,
    };
    Some((number * multiplier as f64) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("2048"), Some(2048));
        assert_eq!(parse_size("10kb"), Some(10 * 1024));
        assert_eq!(parse_size("5MB"), Some(5 * 1024 * 1024));
        assert_eq!(parse_size("1.5k"), Some(1536));
        assert_eq!(parse_size("1g"), Some(1024 * 1024 * 1024));
        assert_eq!(parse_size("big"), None);
        assert_eq!(parse_size("3 parsecs"), None);
    }
}
