//! Template tree builder.
//!
//! Drives the tokenizer over the markup buffer and assembles the
//! [`TemplateNode`] forest. This is a fragment parser: any number of
//! top-level siblings and bare text are allowed.

use compact_str::CompactString;

use pywire_carton::{is_raw_text_tag, is_void_tag, LineIndex};
use pywire_relief::{
    Attribute, CompileError, ElementNode, ParserOptions, Position, SourceLocation,
    SpecialAttribute, TemplateNode, TextNode,
};

use crate::attributes::{resolve_attribute, AttributeContext, RawAttribute, Resolved};
use crate::interpolation::split_interpolations;
use crate::tokenizer::{Callbacks, ErrorCode, QuoteType, Tokenizer};

/// Parser context for building the template tree
pub struct Parser<'a> {
    /// Markup buffer (same offsets as the document)
    source: &'a str,
    file: &'a str,
    index: &'a LineIndex,
    options: &'a ParserOptions,
    /// Top-level nodes
    roots: Vec<TemplateNode>,
    /// Open elements
    stack: Vec<ElementNode>,
    /// Current element being parsed
    current_element: Option<CurrentElement>,
    /// Current attribute being parsed
    current_attr: Option<CurrentAttribute>,
    /// Errors collected during parsing
    errors: Vec<CompileError>,
}

/// Current element being parsed
struct CurrentElement {
    tag: CompactString,
    /// Offset of the `<`
    tag_start: usize,
    attributes: Vec<Attribute>,
    special_attributes: Vec<SpecialAttribute>,
}

/// Current attribute being parsed
struct CurrentAttribute {
    name_start: usize,
    name_end: usize,
    value: Option<(usize, usize)>,
}

impl<'a> Parser<'a> {
    pub fn new(
        source: &'a str,
        file: &'a str,
        index: &'a LineIndex,
        options: &'a ParserOptions,
    ) -> Self {
        Self {
            source,
            file,
            index,
            options,
            roots: Vec::new(),
            stack: Vec::new(),
            current_element: None,
            current_attr: None,
            errors: Vec::new(),
        }
    }

    /// Parse the markup. On failure the earliest error is returned.
    pub fn parse(mut self) -> Result<Vec<TemplateNode>, CompileError> {
        let source = self.source;
        let mut tokenizer = Tokenizer::new(source, ParserCallbacks { parser: &mut self });
        tokenizer.tokenize();

        if self.errors.is_empty() {
            return Ok(self.roots);
        }
        let earliest = self
            .errors
            .into_iter()
            .min_by_key(|e| (e.line(), e.column().unwrap_or(0)));
        match earliest {
            Some(err) => Err(err),
            None => Ok(Vec::new()),
        }
    }

    fn get_pos(&self, offset: usize) -> Position {
        let (line, column) = self.index.line_col(offset as u32);
        Position::new(offset as u32, line, column)
    }

    fn create_loc(&self, start: usize, end: usize) -> SourceLocation {
        SourceLocation::new(self.get_pos(start), self.get_pos(end))
    }

    fn error_at(&mut self, offset: usize, message: impl Into<String>) {
        let pos = self.get_pos(offset);
        self.errors
            .push(CompileError::syntax(self.file, pos.line, pos.column, message));
    }

    /// Add child to current context (stack top or root)
    fn add_child(&mut self, child: TemplateNode) {
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(child),
            None => self.roots.push(child),
        }
    }

    fn normalize_tag(&self, raw: &str) -> CompactString {
        let tag = CompactString::from(raw.to_ascii_lowercase());
        if self.options.rename_head && tag == "head" {
            CompactString::new("pywire-head")
        } else {
            tag
        }
    }

    fn on_text_impl(&mut self, start: usize, end: usize) {
        let source = self.source;
        let text = &source[start..end];
        let loc = self.create_loc(start, end);
        let in_raw_text = self
            .stack
            .last()
            .is_some_and(|parent| is_raw_text_tag(&parent.tag));

        if in_raw_text {
            self.add_child(TemplateNode::Text(TextNode::literal(text, true, loc)));
            return;
        }
        // Formatting whitespace between tags
        if text.trim().is_empty() && text.contains('\n') {
            return;
        }

        let parts = split_interpolations(text, start, self.index);
        self.add_child(TemplateNode::Text(TextNode {
            parts,
            raw: false,
            loc,
        }));
    }

    fn on_open_tag_name_impl(&mut self, start: usize, end: usize) {
        let tag = self.normalize_tag(&self.source[start..end]);
        self.current_element = Some(CurrentElement {
            tag,
            tag_start: start.saturating_sub(1),
            attributes: Vec::new(),
            special_attributes: Vec::new(),
        });
    }

    fn on_attrib_end_impl(&mut self, quote: QuoteType, end: usize) {
        let Some(attr) = self.current_attr.take() else {
            return;
        };
        let source = self.source;
        let name = &source[attr.name_start..attr.name_end];
        let (value, value_start) = match attr.value {
            Some((start, stop)) => (Some(&source[start..stop]), start),
            None => (None, end),
        };
        let loc_end = if matches!(
            quote,
            QuoteType::Double | QuoteType::Single | QuoteType::Triple
        ) {
            end + if quote == QuoteType::Triple { 3 } else { 1 }
        } else {
            end
        };
        let raw = RawAttribute {
            name,
            value,
            quote,
            value_start,
            loc: self.create_loc(attr.name_start, loc_end),
        };
        let ctx = AttributeContext {
            file: self.file,
            index: self.index,
        };
        let resolved = resolve_attribute(&raw, &ctx);

        let Some(current) = self.current_element.as_mut() else {
            return;
        };
        match resolved {
            Ok(Resolved::Plain(attr)) => current.attributes.push(attr),
            Ok(Resolved::Special(special)) => {
                let conflict = match &special {
                    SpecialAttribute::For(_) => current
                        .special_attributes
                        .iter()
                        .any(|s| matches!(s, SpecialAttribute::For(_)))
                        .then_some("Only one $for is allowed per element"),
                    SpecialAttribute::If(_) | SpecialAttribute::Show(_) => current
                        .special_attributes
                        .iter()
                        .any(|s| matches!(s, SpecialAttribute::If(_) | SpecialAttribute::Show(_)))
                        .then_some("Only one conditional ($if or $show) is allowed per element"),
                    _ => None,
                };
                match conflict {
                    Some(message) => {
                        let loc = raw.loc;
                        self.errors.push(CompileError::syntax(
                            self.file,
                            loc.start.line,
                            loc.start.column,
                            message,
                        ));
                    }
                    None => current.special_attributes.push(special),
                }
            }
            Err(err) => self.errors.push(err),
        }
    }

    /// Finish the open tag. Void and self-closing elements are complete.
    fn finish_open_tag(&mut self, end: usize, self_closing: bool) {
        let Some(current) = self.current_element.take() else {
            return;
        };
        let loc = self.create_loc(current.tag_start, end + 1);
        let mut element = ElementNode::new(current.tag, loc);
        element.attributes = current.attributes;
        element.special_attributes = current.special_attributes;
        element.is_self_closing = self_closing;

        if element.tag == "template" {
            for special in &mut element.special_attributes {
                if let SpecialAttribute::For(f) = special {
                    f.is_template_tag = true;
                }
            }
        }

        if self_closing || is_void_tag(&element.tag) {
            self.add_child(TemplateNode::Element(element));
        } else {
            self.stack.push(element);
        }
    }

    fn on_close_tag_impl(&mut self, start: usize, end: usize) {
        let tag = self.normalize_tag(&self.source[start..end]);

        match self.stack.iter().rposition(|el| el.tag == tag) {
            Some(i) => {
                let close_end = self.get_pos(end + 1);
                // Elements above the match are closed implicitly
                while self.stack.len() > i {
                    let Some(mut element) = self.stack.pop() else {
                        break;
                    };
                    if self.stack.len() == i {
                        element.loc.end = close_end;
                    }
                    self.add_child(TemplateNode::Element(element));
                }
            }
            None if is_void_tag(&tag) => {}
            None => self.error_at(
                start.saturating_sub(2),
                format!("Unexpected closing tag </{}>", tag),
            ),
        }
    }

    fn on_end_impl(&mut self) {
        let unclosed: Vec<(usize, CompactString)> = self
            .stack
            .iter()
            .map(|el| (el.loc.start.offset as usize, el.tag.clone()))
            .collect();
        for (offset, tag) in unclosed {
            self.error_at(offset, format!("Unclosed element <{}>", tag));
        }
    }
}

/// Wrapper that implements [`Callbacks`] for the parser
struct ParserCallbacks<'p, 'a> {
    parser: &'p mut Parser<'a>,
}

impl Callbacks for ParserCallbacks<'_, '_> {
    fn on_text(&mut self, start: usize, end: usize) {
        self.parser.on_text_impl(start, end);
    }

    fn on_open_tag_name(&mut self, start: usize, end: usize) {
        self.parser.on_open_tag_name_impl(start, end);
    }

    fn on_open_tag_end(&mut self, end: usize) {
        self.parser.finish_open_tag(end, false);
    }

    fn on_self_closing_tag(&mut self, end: usize) {
        self.parser.finish_open_tag(end, true);
    }

    fn on_close_tag(&mut self, start: usize, end: usize) {
        self.parser.on_close_tag_impl(start, end);
    }

    fn on_attrib_name(&mut self, start: usize, end: usize) {
        self.parser.current_attr = Some(CurrentAttribute {
            name_start: start,
            name_end: end,
            value: None,
        });
    }

    fn on_attrib_value(&mut self, _quote: QuoteType, start: usize, end: usize) {
        if let Some(attr) = self.parser.current_attr.as_mut() {
            attr.value = Some((start, end));
        }
    }

    fn on_attrib_end(&mut self, quote: QuoteType, end: usize) {
        self.parser.on_attrib_end_impl(quote, end);
    }

    fn on_comment(&mut self, _start: usize, _end: usize) {}

    fn on_declaration(&mut self, start: usize, end: usize) {
        let loc = self.parser.create_loc(start, end);
        let source = self.parser.source;
        let text = &source[start..end];
        self.parser
            .add_child(TemplateNode::Text(TextNode::literal(text, true, loc)));
    }

    fn on_end(&mut self) {
        self.parser.on_end_impl();
    }

    fn on_error(&mut self, code: ErrorCode, index: usize) {
        self.parser.error_at(index, code.message());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pywire_relief::InterpolationPart;

    fn parse(source: &str) -> Result<Vec<TemplateNode>, CompileError> {
        let index = LineIndex::new(source);
        let options = ParserOptions::default();
        Parser::new(source, "t.pywire", &index, &options).parse()
    }

    fn element(node: &TemplateNode) -> &ElementNode {
        node.as_element().expect("element")
    }

    #[test]
    fn test_fragment_with_siblings_and_text() {
        let nodes = parse("<h1>Title</h1>\n<p>Body</p>\ntrailing").unwrap();
        assert_eq!(nodes.len(), 3);
        assert_eq!(element(&nodes[0]).tag, "h1");
        assert_eq!(element(&nodes[1]).tag, "p");
        assert!(matches!(&nodes[2], TemplateNode::Text(t) if t.literal_text().trim() == "trailing"));
    }

    #[test]
    fn test_void_and_self_closing() {
        let nodes = parse("<div><br><input name=\"a\"><span/></div>").unwrap();
        let div = element(&nodes[0]);
        assert_eq!(div.children.len(), 3);
        assert!(element(&div.children[2]).is_self_closing);
    }

    #[test]
    fn test_text_interpolation_position() {
        let nodes = parse("<p>\n    Value: { 1 / 0 }\n</p>").unwrap();
        let p = element(&nodes[0]);
        let TemplateNode::Text(text) = &p.children[0] else {
            panic!("expected text");
        };
        let InterpolationPart::Expr(expr) = &text.parts[1] else {
            panic!("expected interpolation");
        };
        assert_eq!(expr.expression, "1 / 0");
        assert_eq!(expr.pos.line, 2);
    }

    #[test]
    fn test_script_is_raw() {
        let nodes = parse("<script>const x = {a: 1};</script>").unwrap();
        let script = element(&nodes[0]);
        let TemplateNode::Text(text) = &script.children[0] else {
            panic!("expected text");
        };
        assert!(text.raw);
        assert_eq!(text.literal_text(), "const x = {a: 1};");
    }

    #[test]
    fn test_head_is_renamed() {
        let nodes = parse("<head><title>T</title></head>").unwrap();
        assert_eq!(element(&nodes[0]).tag, "pywire-head");
    }

    #[test]
    fn test_mismatched_close_closes_intervening() {
        let nodes = parse("<div><span>a</div>").unwrap();
        let div = element(&nodes[0]);
        assert_eq!(element(&div.children[0]).tag, "span");
    }

    #[test]
    fn test_unexpected_close_tag() {
        let err = parse("<p></p>\n</div>").unwrap_err();
        assert_eq!(err.line(), 2);
        assert!(err.message().contains("</div>"));
    }

    #[test]
    fn test_unclosed_element() {
        let err = parse("<section>\n<p>hi</p>").unwrap_err();
        assert_eq!(err.message(), "Unclosed element <section>");
        assert_eq!(err.line(), 1);
    }

    #[test]
    fn test_special_attributes_attached() {
        let nodes = parse("<li $for={item in items} $key={item.id} @click={pick(item)}>{item}</li>").unwrap();
        let li = element(&nodes[0]);
        assert_eq!(li.for_attr().map(|f| f.iterable.as_str()), Some("items"));
        assert_eq!(li.key_attr().map(|k| k.expr.as_str()), Some("item.id"));
        assert_eq!(li.event("click").map(|e| e.handler_name.as_str()), Some("pick(item)"));
    }

    #[test]
    fn test_template_for_flag() {
        let nodes = parse("<template $for={x in xs}><b>{x}</b></template>").unwrap();
        assert!(element(&nodes[0]).for_attr().is_some_and(|f| f.is_template_tag));
    }

    #[test]
    fn test_duplicate_conditionals() {
        let err = parse("<p $if={a} $show={b}></p>").unwrap_err();
        assert!(err.message().contains("Only one conditional"));
        assert!(parse("<p $for={a in b} $for={c in d}></p>").is_err());
    }

    #[test]
    fn test_doctype_kept_and_comment_dropped() {
        let nodes = parse("<!DOCTYPE html>\n<!-- note -->\n<html></html>").unwrap();
        assert!(matches!(&nodes[0], TemplateNode::Text(t) if t.raw && t.literal_text() == "<!DOCTYPE html>"));
        assert_eq!(nodes.len(), 2);
    }
}
