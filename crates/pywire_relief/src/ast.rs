//! PyWire document AST node types.
//!
//! A parsed page is a plain owned tree: the document owns its directives and
//! template nodes, elements own their children, and nothing points back up.
//! Every node keeps the position it was read from so diagnostics and the
//! generated line map can refer to the user's file.

use compact_str::CompactString;
use pywire_croquis::Module;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Source position in the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Position {
    /// Byte offset from start of file
    pub offset: u32,
    /// 1-indexed line number
    pub line: u32,
    /// 1-indexed column number
    pub column: u32,
}

impl Position {
    pub const fn new(offset: u32, line: u32, column: u32) -> Self {
        Self {
            offset,
            line,
            column,
        }
    }
}

/// Source location span [start, end)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub start: Position,
    pub end: Position,
}

impl Default for SourceLocation {
    fn default() -> Self {
        Self::STUB
    }
}

impl SourceLocation {
    /// Stub location for synthesized nodes
    pub const STUB: Self = Self {
        start: Position {
            offset: 0,
            line: 1,
            column: 1,
        },
        end: Position {
            offset: 0,
            line: 1,
            column: 1,
        },
    };

    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    #[inline]
    pub fn line(&self) -> u32 {
        self.start.line
    }
}

// ============================================================================
// Document
// ============================================================================

/// A fully parsed `.pywire` document.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedDocument {
    /// Path the document was read from (may be empty for inline sources)
    pub file_path: String,
    /// xxh3 hash of the full source text
    pub content_hash: String,
    pub directives: Vec<Directive>,
    pub template: Vec<TemplateNode>,
    pub code: Option<CodeSection>,
}

impl ParsedDocument {
    pub fn path_directive(&self) -> Option<&PathDirective> {
        self.directives.iter().find_map(|d| match d {
            Directive::Path(p) => Some(p),
            _ => None,
        })
    }

    pub fn layout_directive(&self) -> Option<&LayoutDirective> {
        self.directives.iter().find_map(|d| match d {
            Directive::Layout(l) => Some(l),
            _ => None,
        })
    }

    pub fn components(&self) -> impl Iterator<Item = &ComponentDirective> {
        self.directives.iter().filter_map(|d| match d {
            Directive::Component(c) => Some(c),
            _ => None,
        })
    }

    pub fn has_no_spa(&self) -> bool {
        self.directives
            .iter()
            .any(|d| matches!(d, Directive::NoSpa(_)))
    }

    /// Depth-first iterator over every element of the template.
    pub fn elements(&self) -> ElementIter<'_> {
        ElementIter {
            stack: self.template.iter().rev().collect(),
        }
    }
}

/// The embedded code section (between the `---` sentinels).
#[derive(Debug, Clone, Serialize)]
pub struct CodeSection {
    /// Raw text of the section
    pub source: String,
    /// Line of the document on which the first line of `source` sits.
    /// Statement lines in `module` are already absolute.
    pub first_line: u32,
    #[serde(skip)]
    pub module: Module,
}

// ============================================================================
// Template Nodes
// ============================================================================

/// All template node types
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TemplateNode {
    Element(ElementNode),
    Text(TextNode),
}

impl TemplateNode {
    pub fn loc(&self) -> &SourceLocation {
        match self {
            Self::Element(n) => &n.loc,
            Self::Text(n) => &n.loc,
        }
    }

    pub fn as_element(&self) -> Option<&ElementNode> {
        match self {
            Self::Element(el) => Some(el),
            Self::Text(_) => None,
        }
    }

    /// Whitespace-only literal text
    pub fn is_blank_text(&self) -> bool {
        match self {
            Self::Text(t) => t.parts.iter().all(|p| match p {
                InterpolationPart::Literal(s) => s.trim().is_empty(),
                InterpolationPart::Expr(_) => false,
            }),
            Self::Element(_) => false,
        }
    }
}

/// Element node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementNode {
    pub tag: CompactString,
    /// Plain HTML attributes, in source order
    pub attributes: Vec<Attribute>,
    pub special_attributes: Vec<SpecialAttribute>,
    pub children: Vec<TemplateNode>,
    pub is_self_closing: bool,
    pub loc: SourceLocation,
}

impl ElementNode {
    pub fn new(tag: impl Into<CompactString>, loc: SourceLocation) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
            special_attributes: Vec::new(),
            children: Vec::new(),
            is_self_closing: false,
            loc,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Static string value of a plain attribute (`None` when absent or
    /// interpolated).
    pub fn attr_value(&self, name: &str) -> Option<&str> {
        self.attr(name)
            .filter(|a| a.parts.is_none())
            .and_then(|a| a.value.as_deref())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }

    pub fn for_attr(&self) -> Option<&ForAttribute> {
        self.special_attributes.iter().find_map(|a| match a {
            SpecialAttribute::For(f) => Some(f),
            _ => None,
        })
    }

    pub fn if_attr(&self) -> Option<&ConditionAttribute> {
        self.special_attributes.iter().find_map(|a| match a {
            SpecialAttribute::If(c) => Some(c),
            _ => None,
        })
    }

    pub fn show_attr(&self) -> Option<&ConditionAttribute> {
        self.special_attributes.iter().find_map(|a| match a {
            SpecialAttribute::Show(c) => Some(c),
            _ => None,
        })
    }

    pub fn key_attr(&self) -> Option<&KeyAttribute> {
        self.special_attributes.iter().find_map(|a| match a {
            SpecialAttribute::Key(k) => Some(k),
            _ => None,
        })
    }

    pub fn bind_attr(&self) -> Option<&BindAttribute> {
        self.special_attributes.iter().find_map(|a| match a {
            SpecialAttribute::Bind(b) => Some(b),
            _ => None,
        })
    }

    pub fn model_attr(&self) -> Option<&ModelAttribute> {
        self.special_attributes.iter().find_map(|a| match a {
            SpecialAttribute::Model(m) => Some(m),
            _ => None,
        })
    }

    pub fn events(&self) -> impl Iterator<Item = &EventAttribute> {
        self.special_attributes.iter().filter_map(|a| match a {
            SpecialAttribute::Event(e) => Some(e),
            _ => None,
        })
    }

    pub fn event(&self, event_type: &str) -> Option<&EventAttribute> {
        self.events().find(|e| e.event_type == event_type)
    }

    pub fn reactive_attrs(&self) -> impl Iterator<Item = &ReactiveAttribute> {
        self.special_attributes.iter().filter_map(|a| match a {
            SpecialAttribute::Reactive(r) => Some(r),
            _ => None,
        })
    }
}

/// Text node: literal text interleaved with `{expr}` interpolations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextNode {
    pub parts: Vec<InterpolationPart>,
    /// Raw text content (`<script>`, `<style>`, doctype); never interpolated
    /// or escaped.
    pub raw: bool,
    pub loc: SourceLocation,
}

impl TextNode {
    pub fn literal(text: impl Into<String>, raw: bool, loc: SourceLocation) -> Self {
        Self {
            parts: vec![InterpolationPart::Literal(text.into())],
            raw,
            loc,
        }
    }

    /// Concatenated literal text (expressions are skipped).
    pub fn literal_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                InterpolationPart::Literal(s) => Some(s.as_str()),
                InterpolationPart::Expr(_) => None,
            })
            .collect()
    }
}

/// One piece of interpolated text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum InterpolationPart {
    Literal(String),
    Expr(Interpolation),
}

/// `{expression}` or `{expression:format_spec}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interpolation {
    pub expression: String,
    pub format_spec: Option<String>,
    /// Position of the first character of `expression`
    pub pos: Position,
}

/// Plain HTML attribute
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attribute {
    pub name: CompactString,
    /// Raw value; `None` for a bare boolean attribute
    pub value: Option<String>,
    /// Interpolated pieces when the value contains `{...}` spans
    pub parts: Option<Vec<InterpolationPart>>,
    pub loc: SourceLocation,
}

// ============================================================================
// Special attributes
// ============================================================================

/// Compiler-level attribute (`$`, `@` or `:` prefixed).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SpecialAttribute {
    If(ConditionAttribute),
    Show(ConditionAttribute),
    For(ForAttribute),
    Key(KeyAttribute),
    Bind(BindAttribute),
    Reactive(ReactiveAttribute),
    Event(EventAttribute),
    Model(ModelAttribute),
}

impl SpecialAttribute {
    pub fn loc(&self) -> &SourceLocation {
        match self {
            Self::If(a) | Self::Show(a) => &a.loc,
            Self::For(a) => &a.loc,
            Self::Key(a) => &a.loc,
            Self::Bind(a) => &a.loc,
            Self::Reactive(a) => &a.loc,
            Self::Event(a) => &a.loc,
            Self::Model(a) => &a.loc,
        }
    }
}

/// `$if={cond}` / `$show={cond}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConditionAttribute {
    pub condition: String,
    pub value_pos: Position,
    pub loc: SourceLocation,
}

/// `$for={item in items}` / `$for={k, v in items}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForAttribute {
    /// Source text of the loop target (`item`, `k, v`, `(k, v)`)
    pub loop_vars: String,
    pub names: SmallVec<[CompactString; 2]>,
    pub iterable: String,
    /// Set when the attribute sits on a `<template>` element
    pub is_template_tag: bool,
    pub value_pos: Position,
    pub loc: SourceLocation,
}

/// `$key={expr}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyAttribute {
    pub expr: String,
    pub value_pos: Position,
    pub loc: SourceLocation,
}

/// `$bind=name` / `$bind:event={name}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindAttribute {
    /// Bound target (a name or dotted path)
    pub variable: String,
    /// Client event overriding the default for the element
    pub binding_type: Option<CompactString>,
    pub value_pos: Position,
    pub loc: SourceLocation,
}

/// `:name=expr`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReactiveAttribute {
    pub name: CompactString,
    pub expr: String,
    pub value_pos: Position,
    pub loc: SourceLocation,
}

/// `@event.modifier=handler`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventAttribute {
    pub event_type: CompactString,
    pub modifiers: Vec<CompactString>,
    /// Method the client dispatches to. A bare identifier as written, or the
    /// synthesized method name once an inline expression has been promoted.
    pub handler_name: String,
    /// The inline expression a synthesized handler was built from
    pub inline_source: Option<String>,
    /// Render-time argument expressions (`data-arg-N`)
    pub args: Vec<String>,
    /// Validation schema of a `<form @submit>`
    pub schema: Option<FormValidationSchema>,
    pub value_pos: Position,
    pub loc: SourceLocation,
}

impl EventAttribute {
    /// Whether the handler is the result of promoting an inline expression.
    #[inline]
    pub fn is_synthesized(&self) -> bool {
        self.inline_source.is_some()
    }
}

/// `$model="ClassName"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelAttribute {
    pub model_name: CompactString,
    pub loc: SourceLocation,
}

// ============================================================================
// Forms
// ============================================================================

/// Validation rules of one `<form @submit>`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FormValidationSchema {
    /// Fields in document order
    pub fields: Vec<FieldRules>,
    pub model_name: Option<CompactString>,
}

impl FormValidationSchema {
    pub fn field(&self, name: &str) -> Option<&FieldRules> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Rules collected from one named input.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FieldRules {
    pub name: CompactString,
    pub input_type: CompactString,
    pub required: bool,
    pub pattern: Option<String>,
    pub min_length: Option<u32>,
    pub max_length: Option<u32>,
    pub min_value: Option<String>,
    pub max_value: Option<String>,
    pub step: Option<String>,
    pub title: Option<String>,
    /// Accepted file types (`accept`)
    pub allowed_types: Vec<String>,
    /// Maximum upload size in bytes (`max-size`)
    pub max_size: Option<u64>,
    pub required_expr: Option<String>,
    pub min_expr: Option<String>,
    pub max_expr: Option<String>,
}

// ============================================================================
// Directives
// ============================================================================

/// Document-level declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Directive {
    Path(PathDirective),
    Layout(LayoutDirective),
    Component(ComponentDirective),
    NoSpa(NoSpaDirective),
}

impl Directive {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Path(_) => "path",
            Self::Layout(_) => "layout",
            Self::Component(_) => "component",
            Self::NoSpa(_) => "no_spa",
        }
    }

    pub fn loc(&self) -> &SourceLocation {
        match self {
            Self::Path(d) => &d.loc,
            Self::Layout(d) => &d.loc,
            Self::Component(d) => &d.loc,
            Self::NoSpa(d) => &d.loc,
        }
    }
}

/// One named route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub name: CompactString,
    pub pattern: String,
}

/// `!path "/route"` or `!path {'name': '/route'}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathDirective {
    /// Routes in declaration order
    pub routes: Vec<Route>,
    /// Written as a single string (implicit route name `main`)
    pub is_simple_string: bool,
    pub loc: SourceLocation,
}

impl PathDirective {
    pub fn route(&self, name: &str) -> Option<&str> {
        self.routes
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.pattern.as_str())
    }
}

/// `!layout "path"`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayoutDirective {
    pub layout_path: String,
    pub loc: SourceLocation,
}

/// `!component "path" as Name`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentDirective {
    pub path: String,
    pub component_name: CompactString,
    pub loc: SourceLocation,
}

/// `!no_spa`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoSpaDirective {
    pub loc: SourceLocation,
}

// ============================================================================
// Traversal
// ============================================================================

/// Pre-order iterator over elements.
pub struct ElementIter<'a> {
    stack: Vec<&'a TemplateNode>,
}

impl<'a> Iterator for ElementIter<'a> {
    type Item = &'a ElementNode;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            if let TemplateNode::Element(el) = node {
                self.stack.extend(el.children.iter().rev());
                return Some(el);
            }
        }
        None
    }
}

/// Visit every element mutably, parents before children.
pub fn walk_elements_mut(nodes: &mut [TemplateNode], f: &mut dyn FnMut(&mut ElementNode)) {
    for node in nodes {
        if let TemplateNode::Element(el) = node {
            f(el);
            walk_elements_mut(&mut el.children, f);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(tag: &str, children: Vec<TemplateNode>) -> TemplateNode {
        let mut el = ElementNode::new(tag, SourceLocation::STUB);
        el.children = children;
        TemplateNode::Element(el)
    }

    #[test]
    fn test_element_iter_preorder() {
        let doc = ParsedDocument {
            file_path: String::new(),
            content_hash: String::new(),
            directives: Vec::new(),
            template: vec![
                element("div", vec![element("span", vec![]), element("p", vec![])]),
                element("footer", vec![]),
            ],
            code: None,
        };
        let tags: Vec<&str> = doc.elements().map(|e| e.tag.as_str()).collect();
        assert_eq!(tags, vec!["div", "span", "p", "footer"]);
    }

    #[test]
    fn test_blank_text() {
        let blank = TemplateNode::Text(TextNode::literal("  \n ", false, SourceLocation::STUB));
        let text = TemplateNode::Text(TextNode::literal("hi", false, SourceLocation::STUB));
        assert!(blank.is_blank_text());
        assert!(!text.is_blank_text());
    }

    #[test]
    fn test_path_directive_lookup() {
        let path = PathDirective {
            routes: vec![Route {
                name: "main".into(),
                pattern: "/".into(),
            }],
            is_simple_string: false,
            loc: SourceLocation::STUB,
        };
        assert_eq!(path.route("main"), Some("/"));
        assert_eq!(path.route("other"), None);
    }

    #[test]
    fn test_walk_elements_mut() {
        let mut nodes = vec![element("div", vec![element("span", vec![])])];
        let mut count = 0;
        walk_elements_mut(&mut nodes, &mut |el| {
            el.is_self_closing = true;
            count += 1;
        });
        assert_eq!(count, 2);
        assert!(matches!(&nodes[0], TemplateNode::Element(el) if el.is_self_closing));
    }

    #[test]
    fn test_special_attribute_serializes_tagged() {
        let attr = SpecialAttribute::Key(KeyAttribute {
            expr: "item.id".into(),
            value_pos: Position::new(0, 1, 1),
            loc: SourceLocation::STUB,
        });
        let json = serde_json::to_value(&attr).unwrap();
        assert_eq!(json["type"], "key");
        assert_eq!(json["expr"], "item.id");
    }
}
