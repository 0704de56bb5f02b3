//! Layouts and slot fills.
//!
//! A page with `!layout` renders nothing by itself. Its top-level nodes are
//! grouped into slot fills, one method each, and `_init_slots` registers
//! them with the layout the page inherits from. The layout is addressed by
//! `LAYOUT_ID`, the hash of its path, which the child derives lexically from
//! its own path and the directive value.

use pywire_carton::hash::{content_hash, short_hash};
use pywire_carton::{py_str, CodeWriter};
use pywire_relief::{CompileResult, TemplateNode};

use crate::render::{write_render_method, BindingHandler, RenderSettings};

/// Slot receiving `<pywire-head>` content.
pub const HEAD_SLOT: &str = "$head";

/// Content a page provides for one slot of its layout.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotFill {
    pub name: String,
    pub nodes: Vec<TemplateNode>,
}

/// Group top-level nodes by target slot, in order of first appearance.
pub fn group_slot_fills(template: &[TemplateNode]) -> Vec<SlotFill> {
    let mut fills: Vec<SlotFill> = Vec::new();
    let mut push = |name: &str, nodes: Vec<TemplateNode>| {
        match fills.iter().position(|f| f.name == name) {
            Some(i) => fills[i].nodes.extend(nodes),
            None => fills.push(SlotFill {
                name: name.to_string(),
                nodes,
            }),
        }
    };

    for node in template {
        if node.is_blank_text() {
            continue;
        }
        let TemplateNode::Element(el) = node else {
            push("default", vec![node.clone()]);
            continue;
        };
        if el.tag.as_str() == "pywire-head" {
            push(HEAD_SLOT, el.children.clone());
            continue;
        }
        match el.attr_value("slot") {
            Some(slot) => {
                let mut el = el.clone();
                el.attributes.retain(|a| a.name.as_str() != "slot");
                push(slot, vec![TemplateNode::Element(el)]);
            }
            None => push("default", vec![node.clone()]),
        }
    }
    fills
}

/// Lexically resolve `layout_path` against the directory of `file_path`.
pub fn resolve_layout_path(file_path: &str, layout_path: &str) -> String {
    let layout = layout_path.replace('\\', "/");
    let combined = if layout.starts_with('/') {
        layout
    } else {
        let file = file_path.replace('\\', "/");
        match file.rsplit_once('/') {
            Some((dir, _)) => format!("{}/{}", dir, layout),
            None => layout,
        }
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in combined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    let joined = segments.join("/");
    if combined.starts_with('/') {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// `LAYOUT_ID` of the layout a page inherits from.
pub fn parent_layout_id(file_path: &str, layout_path: &str) -> String {
    content_hash(&resolve_layout_path(file_path, layout_path))
}

pub fn fill_method_name(slot: &str, file_path: &str) -> String {
    let safe: String = slot
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!(
        "_render_slot_fill_{}_{}",
        safe.trim_matches('_'),
        short_hash(file_path, 8)
    )
}

/// Write one render method per slot fill followed by `_init_slots`.
pub fn write_slot_fills(
    w: &mut CodeWriter,
    template: &[TemplateNode],
    layout_path: &str,
    settings: &RenderSettings<'_>,
) -> CompileResult<Vec<BindingHandler>> {
    let fills = group_slot_fills(template);
    let parent_id = py_str(&parent_layout_id(settings.file, layout_path));
    let mut bindings = Vec::new();

    for fill in &fills {
        w.blank();
        let method = fill_method_name(&fill.name, settings.file);
        bindings.extend(write_render_method(w, &method, &fill.nodes, settings, false)?);
    }

    w.blank();
    w.line("def _init_slots(self):", None);
    w.indent();
    w.line("if hasattr(super(), '_init_slots'):", None);
    w.indent();
    w.line("super()._init_slots()", None);
    w.dedent();
    for fill in &fills {
        let method = fill_method_name(&fill.name, settings.file);
        let line = fill.nodes.first().map(|n| n.loc().line());
        if fill.name == HEAD_SLOT {
            w.line(
                &format!("self.register_head_slot({}, self.{})", parent_id, method),
                line,
            );
        } else {
            w.line(
                &format!(
                    "self.register_slot({}, {}, self.{})",
                    parent_id,
                    py_str(&fill.name),
                    method
                ),
                line,
            );
        }
    }
    w.dedent();
    Ok(bindings)
}

/// `_init_slots` of a page that fills no layout.
pub fn write_empty_init_slots(w: &mut CodeWriter) {
    w.line("def _init_slots(self):", None);
    w.indent();
    w.line("pass", None);
    w.dedent();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fills(source: &str) -> Vec<SlotFill> {
        let doc = pywire_armature::parse(source, "pages/about.pywire").unwrap();
        group_slot_fills(&doc.template)
    }

    #[test]
    fn test_group_slot_fills() {
        let fills = fills(
            "!layout \"../layouts/base.pywire\"\n<head><title>About</title></head>\n<h1>About</h1>\n<nav slot=\"sidebar\">links</nav>\n<p>More</p>",
        );
        let names: Vec<&str> = fills.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["$head", "default", "sidebar"]);
        assert_eq!(fills[1].nodes.len(), 2);

        let nav = fills[2].nodes[0].as_element().unwrap();
        assert!(!nav.has_attr("slot"));
    }

    #[test]
    fn test_resolve_layout_path() {
        assert_eq!(
            resolve_layout_path("pages/about.pywire", "../layouts/base.pywire"),
            "layouts/base.pywire"
        );
        assert_eq!(
            resolve_layout_path("pages/blog/post.pywire", "./layout.pywire"),
            "pages/blog/layout.pywire"
        );
        assert_eq!(
            resolve_layout_path("post.pywire", "base.pywire"),
            "base.pywire"
        );
        assert_eq!(
            resolve_layout_path("/app/pages/a.pywire", "/app/base.pywire"),
            "/app/base.pywire"
        );
    }

    #[test]
    fn test_parent_id_matches_layout_own_id() {
        assert_eq!(
            parent_layout_id("pages/about.pywire", "../layouts/base.pywire"),
            content_hash("layouts/base.pywire")
        );
    }

    #[test]
    fn test_fill_method_name() {
        let name = fill_method_name("$head", "pages/about.pywire");
        assert!(name.starts_with("_render_slot_fill_head_"), "{}", name);
        assert_eq!(name.len(), "_render_slot_fill_head_".len() + 8);
    }
}
