//! Template rendering.
//!
//! Lowers template nodes into the body of an async render method. Static
//! markup is accumulated and flushed as one `parts.append('...')` call;
//! everything dynamic is a statement that carries the template line it came
//! from, so a failing `{expr}` reports the user's line.
//!
//! ```text
//! <li $for={item in items} $if={item.visible}>{item.name}</li>
//! ```
//!
//! becomes
//!
//! ```text
//! async for item in ensure_async_iterator(self.items):
//!     if item.visible:
//!         parts.append('<li>')
//!         parts.append(escape_html(item.name))
//!         parts.append('</li>')
//! ```

use tracing::debug;

use pywire_carton::hash::short_hash;
use pywire_carton::{escape_html_attr, is_void_tag, py_str, CodeWriter, FxHashMap};
use pywire_croquis::analysis::insert_awaits_expr;
use pywire_croquis::{parse_expression, parse_for_header, print_expr, Ident, SelfBinder};
use pywire_relief::{
    Attribute, BindAttribute, CompileError, CompileResult, ElementNode, InterpolationPart,
    Position, SpecialAttribute, TemplateNode, TextNode,
};

use crate::forms::wrapper_name;
use crate::scope::PageScope;
use crate::style::{apply_scoped_css, scope_attribute};

/// Page facts the renderer needs while lowering nodes.
pub struct RenderSettings<'a> {
    pub file: &'a str,
    pub scope: &'a PageScope,
    pub console_sink: Option<&'a str>,
    /// Lowercase tag -> component class name
    pub components: &'a FxHashMap<String, String>,
    pub scope_id: Option<&'a str>,
    /// Emit the SPA bootstrap unconditionally
    pub pjax: bool,
}

/// `async def _handle_bind_<hash>(self, event_data)` for one `$bind`.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingHandler {
    pub name: String,
    /// Assignment target, already bound (`self.name`)
    pub target: String,
    pub value_key: &'static str,
    pub line: u32,
}

impl BindingHandler {
    pub fn write(&self, w: &mut CodeWriter) {
        w.line(
            &format!("async def {}(self, event_data):", self.name),
            Some(self.line),
        );
        w.indent();
        w.line(&format!("val = event_data.get({})", py_str(self.value_key)), None);
        w.line("if val is not None:", None);
        w.indent();
        w.line(&format!("{} = val", self.target), Some(self.line));
        w.dedent();
        w.dedent();
    }
}

/// Write `async def <name>(self)` rendering `nodes` and returning the markup.
pub fn write_render_method(
    w: &mut CodeWriter,
    name: &str,
    nodes: &[TemplateNode],
    settings: &RenderSettings<'_>,
    spa_bootstrap: bool,
) -> CompileResult<Vec<BindingHandler>> {
    w.line(&format!("async def {}(self):", name), None);
    w.indent();
    w.line("parts = []", None);

    let mut renderer = Renderer::new(w, settings);
    renderer.render_nodes(nodes)?;
    renderer.flush();
    let bindings = renderer.bindings;

    if spa_bootstrap {
        write_spa_bootstrap(w, settings.pjax);
    }
    w.line("return ''.join(parts)", None);
    w.dedent();

    debug!(method = name, bindings = bindings.len(), "rendered template");
    Ok(bindings)
}

fn write_spa_bootstrap(w: &mut CodeWriter, pjax: bool) {
    if pjax {
        w.line("enable_pjax = True", None);
    } else {
        w.line(
            "enable_pjax = getattr(self.request.app.state, 'enable_pjax', False)",
            None,
        );
    }
    w.line(
        "if (getattr(self, '__spa_enabled__', False) or enable_pjax) and not getattr(self, '__no_spa__', False) and not getattr(self, '__is_component__', False):",
        None,
    );
    w.indent();
    w.line(
        "parts.append('<script id=\"_pywire_spa_meta\" type=\"application/json\">')",
        None,
    );
    w.line(
        "parts.append(json.dumps({'sibling_paths': getattr(self, '__sibling_paths__', []), 'enable_pjax': enable_pjax, 'debug': getattr(self.request.app.state, 'debug', False)}))",
        None,
    );
    w.line("parts.append('</script>')", None);
    w.dedent();
}

struct Renderer<'w, 's> {
    w: &'w mut CodeWriter,
    settings: &'s RenderSettings<'s>,
    /// Static markup not yet flushed
    pending: String,
    /// List the current output is appended to
    target: String,
    /// Loop variables of enclosing `$for`s
    locals: Vec<Vec<Ident>>,
    /// Bound expression of the enclosing `<select $bind>`
    select_value: Option<String>,
    counter: usize,
    bindings: Vec<BindingHandler>,
}

impl<'w, 's> Renderer<'w, 's> {
    fn new(w: &'w mut CodeWriter, settings: &'s RenderSettings<'s>) -> Self {
        Self {
            w,
            settings,
            pending: String::new(),
            target: "parts".to_string(),
            locals: Vec::new(),
            select_value: None,
            counter: 0,
            bindings: Vec::new(),
        }
    }

    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.pending);
        self.w
            .line(&format!("{}.append({})", self.target, py_str(&text)), None);
    }

    fn append(&mut self, expr: &str, line: u32) {
        self.flush();
        self.w
            .line(&format!("{}.append({})", self.target, expr), Some(line));
    }

    fn error(&self, pos: Position, message: String) -> CompileError {
        CompileError::syntax(self.settings.file, pos.line, pos.column, message)
    }

    /// Parse, bind and await-rewrite a template expression.
    fn expr(&self, source: &str, pos: Position) -> CompileResult<String> {
        let mut expr = parse_expression(source, pos.line, pos.column).map_err(|err| {
            CompileError::syntax(
                self.settings.file,
                err.line,
                err.column,
                format!("Invalid expression '{}': {}", source, err.message),
            )
        })?;
        let scope = self.settings.scope;
        let mut binder = SelfBinder::new(&scope.known).with_console_sink(self.settings.console_sink);
        for locals in &self.locals {
            binder.push_scope(locals.iter());
        }
        binder.bind_expr(&mut expr);
        insert_awaits_expr(&mut expr, &scope.async_methods);
        Ok(print_expr(&expr))
    }

    fn next_id(&mut self) -> usize {
        let id = self.counter;
        self.counter += 1;
        id
    }

    fn render_nodes(&mut self, nodes: &[TemplateNode]) -> CompileResult<()> {
        for node in nodes {
            match node {
                TemplateNode::Text(text) => self.text(text)?,
                TemplateNode::Element(el) => self.element(el)?,
            }
        }
        Ok(())
    }

    fn text(&mut self, text: &TextNode) -> CompileResult<()> {
        for part in &text.parts {
            match part {
                InterpolationPart::Literal(s) => self.pending.push_str(s),
                InterpolationPart::Expr(interp) => {
                    let value = self.expr(&interp.expression, interp.pos)?;
                    let value = match &interp.format_spec {
                        Some(spec) => format!("format({}, {})", value, py_str(spec)),
                        None => value,
                    };
                    self.append(&format!("escape_html({})", value), interp.pos.line);
                }
            }
        }
        Ok(())
    }

    /// Control flow first (`$for` outside `$if`), then the element itself.
    fn element(&mut self, el: &ElementNode) -> CompileResult<()> {
        let mut depth = 0;
        let mut pushed_locals = false;

        if let Some(for_attr) = el.for_attr() {
            let header = format!("{} in {}", for_attr.loop_vars, for_attr.iterable);
            let pos = for_attr.value_pos;
            let (target, iter) = parse_for_header(&header, pos.line, pos.column).map_err(|err| {
                self.error(pos, format!("Invalid $for expression '{}': {}", header, err.message))
            })?;
            let iter = self.expr(&print_expr(&iter), pos)?;
            self.flush();
            self.w.line(
                &format!(
                    "async for {} in ensure_async_iterator({}):",
                    print_expr(&target),
                    iter
                ),
                Some(pos.line),
            );
            self.w.indent();
            self.locals.push(for_attr.names.iter().cloned().collect());
            pushed_locals = true;
            depth += 1;
        }

        if let Some(cond) = el.if_attr() {
            let test = self.expr(&cond.condition, cond.value_pos)?;
            self.flush();
            self.w.line(&format!("if {}:", test), Some(cond.value_pos.line));
            self.w.indent();
            depth += 1;
        }

        let tag = el.tag.as_str();
        let has_control = el.for_attr().is_some() || el.if_attr().is_some();
        let result = if tag == "template" && has_control {
            self.render_nodes(&el.children)
        } else if let Some(component) = self.settings.components.get(tag) {
            let component = component.clone();
            self.component(el, &component)
        } else if tag == "slot" {
            self.slot(el)
        } else if tag == "style" && el.has_attr("scoped") && self.settings.scope_id.is_some() {
            self.scoped_style(el);
            Ok(())
        } else {
            self.plain_element(el)
        };
        result?;

        // Static markup keeps accumulating across sibling elements; only a
        // control block has to be closed before the run continues.
        if depth > 0 {
            self.flush();
        }
        for _ in 0..depth {
            self.w.dedent();
        }
        if pushed_locals {
            self.locals.pop();
        }
        Ok(())
    }

    fn is_static(&self, el: &ElementNode) -> bool {
        el.special_attributes
            .iter()
            .all(|a| matches!(a, SpecialAttribute::For(_) | SpecialAttribute::If(_)))
            && el.attributes.iter().all(|a| a.parts.is_none())
            && !(el.tag.as_str() == "option" && self.select_value.is_some())
    }

    fn scope_attr(&self, el: &ElementNode) -> Option<String> {
        let scope_id = self.settings.scope_id?;
        (!matches!(el.tag.as_str(), "script" | "style")).then(|| scope_attribute(scope_id))
    }

    fn plain_element(&mut self, el: &ElementNode) -> CompileResult<()> {
        let tag = el.tag.as_str();
        let line = el.loc.line();

        if self.is_static(el) {
            self.pending.push('<');
            self.pending.push_str(tag);
            for attr in &el.attributes {
                self.pending.push(' ');
                self.pending.push_str(&attr.name);
                if let Some(value) = &attr.value {
                    self.pending.push_str("=\"");
                    self.pending.push_str(&escape_html_attr(value));
                    self.pending.push('"');
                }
            }
            if let Some(scope) = self.scope_attr(el) {
                self.pending.push(' ');
                self.pending.push_str(&scope);
            }
            self.pending.push('>');
            self.render_nodes(&el.children)?;
        } else {
            self.flush();
            self.w.line("attrs = {}", Some(line));
            self.write_attrs(el)?;
            self.w.line(
                &format!(
                    "{}.append(f\"<{}{{render_attrs(attrs)}}>\")",
                    self.target, tag
                ),
                Some(line),
            );
            self.element_children(el)?;
        }

        if !is_void_tag(tag) {
            self.pending.push_str("</");
            self.pending.push_str(tag);
            self.pending.push('>');
        }
        Ok(())
    }

    fn element_children(&mut self, el: &ElementNode) -> CompileResult<()> {
        match (el.tag.as_str(), el.bind_attr()) {
            ("textarea", Some(bind)) => {
                let value = self.expr(&bind.variable, bind.value_pos)?;
                self.append(
                    &format!("escape_html('' if {v} is None else str({v}))", v = value),
                    bind.value_pos.line,
                );
                Ok(())
            }
            ("select", Some(bind)) => {
                let value = self.expr(&bind.variable, bind.value_pos)?;
                let outer = self.select_value.replace(value);
                let result = self.render_nodes(&el.children);
                self.select_value = outer;
                result
            }
            _ => self.render_nodes(&el.children),
        }
    }

    fn set_attr(&mut self, name: &str, value: &str, line: Option<u32>) {
        self.w
            .line(&format!("attrs[{}] = {}", py_str(name), value), line);
    }

    fn write_attrs(&mut self, el: &ElementNode) -> CompileResult<()> {
        for attr in &el.attributes {
            let value = self.attribute_value(attr)?;
            let line = attr.parts.is_some().then(|| attr.loc.line());
            self.set_attr(&attr.name, &value, line);
        }

        for reactive in el.reactive_attrs() {
            let value = self.expr(&reactive.expr, reactive.value_pos)?;
            self.set_attr(
                &reactive.name,
                &format!("_r_val({})", value),
                Some(reactive.value_pos.line),
            );
        }

        for event in el.events() {
            let handler = wrapper_name(event).unwrap_or_else(|| event.handler_name.clone());
            let evt = event.event_type.as_str();
            self.set_attr(&format!("data-on-{}", evt), &py_str(&handler), None);
            if !event.modifiers.is_empty() {
                let modifiers: Vec<&str> = event.modifiers.iter().map(|m| m.as_str()).collect();
                self.set_attr(
                    &format!("data-modifiers-{}", evt),
                    &py_str(&modifiers.join(" ")),
                    None,
                );
            }
            for (i, arg) in event.args.iter().enumerate() {
                let value = self.expr(arg, event.value_pos)?;
                self.set_attr(
                    &format!("data-arg-{}", i),
                    &format!("json.dumps({})", value),
                    Some(event.value_pos.line),
                );
            }
        }

        if let Some(key) = el.key_attr() {
            let value = self.expr(&key.expr, key.value_pos)?;
            self.set_attr("data-key", &format!("str({})", value), Some(key.value_pos.line));
        }

        if let Some(bind) = el.bind_attr() {
            self.binding(el, bind)?;
        }

        if let Some(selected) = self.select_value.clone() {
            if el.tag.as_str() == "option" {
                self.w.line(
                    &format!("if str(attrs.get('value')) == str({}):", selected),
                    None,
                );
                self.w.indent();
                self.set_attr("selected", "''", None);
                self.w.dedent();
            }
        }

        if let Some(show) = el.show_attr() {
            let test = self.expr(&show.condition, show.value_pos)?;
            self.w.line(&format!("if not ({}):", test), Some(show.value_pos.line));
            self.w.indent();
            self.set_attr(
                "style",
                "'; '.join(filter(None, [attrs.get('style'), 'display: none']))",
                None,
            );
            self.w.dedent();
        }

        if let Some(scope) = self.scope_attr(el) {
            self.set_attr(&scope, "''", None);
        }
        Ok(())
    }

    /// Python expression producing a plain attribute's value.
    fn attribute_value(&self, attr: &Attribute) -> CompileResult<String> {
        let Some(parts) = &attr.parts else {
            return Ok(match &attr.value {
                Some(value) => py_str(value),
                None => "''".to_string(),
            });
        };
        let mut pieces = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                InterpolationPart::Literal(s) => pieces.push(py_str(s)),
                InterpolationPart::Expr(interp) => {
                    let value = self.expr(&interp.expression, interp.pos)?;
                    pieces.push(match &interp.format_spec {
                        Some(spec) => format!("format({}, {})", value, py_str(spec)),
                        None => format!("str({})", value),
                    });
                }
            }
        }
        Ok(format!("''.join([{}])", pieces.join(", ")))
    }

    fn binding(&mut self, el: &ElementNode, bind: &BindAttribute) -> CompileResult<()> {
        let value = self.expr(&bind.variable, bind.value_pos)?;
        let tag = el.tag.as_str();
        let input_type = el.attr_value("type").unwrap_or("text");
        let default_event = match (tag, input_type) {
            ("select", _) | ("input", "checkbox" | "radio") => "change",
            _ => "input",
        };
        let event = bind.binding_type.as_deref().unwrap_or(default_event);
        let value_key = match (tag, input_type) {
            ("input", "checkbox") => "checked",
            _ if event == "upload-progress" => "progress",
            _ => "value",
        };
        let pos = bind.value_pos;
        let name = format!(
            "_handle_bind_{}",
            short_hash(&format!("{}:{}:{}", pos.line, pos.column, bind.variable), 8)
        );

        self.set_attr(&format!("data-on-{}", event), &py_str(&name), None);
        match (tag, input_type) {
            ("input", "checkbox") => {
                self.w.line(&format!("if {}:", value), Some(pos.line));
                self.w.indent();
                self.set_attr("checked", "''", None);
                self.w.dedent();
            }
            ("input", "radio") => {
                self.w.line(
                    &format!("if str({}) == str(attrs.get('value')):", value),
                    Some(pos.line),
                );
                self.w.indent();
                self.set_attr("checked", "''", None);
                self.w.dedent();
            }
            ("input", "file") | ("select", _) | ("textarea", _) => {}
            _ => self.set_attr(
                "value",
                &format!("'' if {v} is None else str({v})", v = value),
                Some(pos.line),
            ),
        }

        if !self.bindings.iter().any(|b| b.name == name) {
            self.bindings.push(BindingHandler {
                name,
                target: value,
                value_key,
                line: pos.line,
            });
        }
        Ok(())
    }

    fn scoped_style(&mut self, el: &ElementNode) {
        let css: String = el
            .children
            .iter()
            .filter_map(|child| match child {
                TemplateNode::Text(text) => Some(text.literal_text()),
                TemplateNode::Element(_) => None,
            })
            .collect();
        let scope_id = self.settings.scope_id.unwrap_or_default();
        let scoped = apply_scoped_css(&css, scope_id);
        self.flush();
        self.w.line(
            &format!("self._style_collector.add(self.SCOPE_ID, {})", py_str(&scoped)),
            Some(el.loc.line()),
        );
    }

    /// Render children into a fresh list; returns the list name.
    fn render_into(&mut self, prefix: &str, nodes: &[TemplateNode]) -> CompileResult<String> {
        self.flush();
        let list = format!("{}_{}", prefix, self.next_id());
        self.w.line(&format!("{} = []", list), None);
        let outer = std::mem::replace(&mut self.target, list.clone());
        let result = self.render_nodes(nodes);
        self.flush();
        self.target = outer;
        result.map(|()| list)
    }

    fn component(&mut self, el: &ElementNode, class_name: &str) -> CompileResult<()> {
        let mut props = Vec::new();
        for attr in &el.attributes {
            let value = match (&attr.value, &attr.parts) {
                (None, _) => "True".to_string(),
                _ => self.attribute_value(attr)?,
            };
            props.push(format!("{}: {}", py_str(&attr.name), value));
        }
        for reactive in el.reactive_attrs() {
            let value = self.expr(&reactive.expr, reactive.value_pos)?;
            props.push(format!("{}: {}", py_str(&reactive.name), value));
        }

        let slot = self.render_into("component_slot", &el.children)?;
        self.append(
            &format!(
                "await self.render_component({}, {{{}}}, slot=''.join({}))",
                class_name,
                props.join(", "),
                slot
            ),
            el.loc.line(),
        );
        Ok(())
    }

    fn slot(&mut self, el: &ElementNode) -> CompileResult<()> {
        let name = el.attr_value("name").unwrap_or("default").to_string();
        let fallback = self.render_into("slot_default", &el.children)?;
        self.append(
            &format!(
                "await self.render_slot(self.LAYOUT_ID, {}, default=''.join({}))",
                py_str(&name),
                fallback
            ),
            el.loc.line(),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pywire_relief::ParsedDocument;

    fn render_doc(doc: &ParsedDocument, scope_id: Option<&str>) -> CompileResult<(String, Vec<BindingHandler>)> {
        let scope = PageScope::new(doc.code.as_ref().map(|c| &c.module), &doc.file_path);
        let mut components = FxHashMap::default();
        for c in doc.components() {
            components.insert(
                c.component_name.to_lowercase().to_string(),
                c.component_name.to_string(),
            );
        }
        let settings = RenderSettings {
            file: &doc.file_path,
            scope: &scope,
            console_sink: Some("console"),
            components: &components,
            scope_id,
            pjax: false,
        };
        let mut w = CodeWriter::new();
        let bindings = write_render_method(&mut w, "_render_template", &doc.template, &settings, false)?;
        Ok((w.finish().0, bindings))
    }

    fn render(source: &str) -> String {
        let doc = pywire_armature::parse(source, "page.pywire").unwrap();
        render_doc(&doc, None).unwrap().0
    }

    #[test]
    fn test_static_markup_is_one_append() {
        assert_eq!(
            render("<div class=\"box\"><p>Hello</p><br></div>"),
            "async def _render_template(self):\n    parts = []\n    parts.append('<div class=\"box\"><p>Hello</p><br></div>')\n    return ''.join(parts)\n"
        );
    }

    #[test]
    fn test_static_run_ends_at_control_block() {
        let out = render("<p>a</p><p $if={show}>b</p><hr><p>c</p>");
        assert!(
            out.contains("    parts.append('<p>a</p>')\n    if show:\n        parts.append('<p>b</p>')\n    parts.append('<hr><p>c</p>')\n"),
            "{}",
            out
        );
    }

    #[test]
    fn test_interpolation() {
        let out = render("<p>Count: {count}</p>\n---\ncount = 0\n");
        assert!(out.contains("    parts.append('<p>Count: ')\n    parts.append(escape_html(self.count))\n"), "{}", out);
        assert!(out.contains("parts.append('</p>"), "{}", out);
    }

    #[test]
    fn test_format_spec() {
        let out = render("<p>{price:.2f}</p>\n---\nprice = 1.5\n");
        assert!(out.contains("escape_html(format(self.price, '.2f'))"), "{}", out);
    }

    #[test]
    fn test_for_then_if() {
        let out = render("<ul><li $for={item in items} $if={item.visible}>{item.name}</li></ul>\n---\nitems = []\n");
        assert!(
            out.contains("    async for item in ensure_async_iterator(self.items):\n        if item.visible:\n            parts.append('<li>')\n            parts.append(escape_html(item.name))\n            parts.append('</li>')\n"),
            "{}",
            out
        );
    }

    #[test]
    fn test_tuple_loop_and_template_tag() {
        let out = render("<template $for={k, v in pairs}><b>{k}</b></template>");
        assert!(out.contains("async for (k, v) in ensure_async_iterator(pairs):"), "{}", out);
        assert!(!out.contains("<template"), "{}", out);
    }

    #[test]
    fn test_event_and_reactive_attrs() {
        let out = render("<button @click.prevent={inc} :disabled={busy}>+</button>\n---\nbusy = False\ndef inc():\n    pass\n");
        assert!(out.contains("    attrs = {}\n"), "{}", out);
        assert!(out.contains("attrs['disabled'] = _r_val(self.busy)"), "{}", out);
        assert!(out.contains("attrs['data-on-click'] = 'inc'"), "{}", out);
        assert!(out.contains("attrs['data-modifiers-click'] = 'prevent'"), "{}", out);
        assert!(out.contains("parts.append(f\"<button{render_attrs(attrs)}>\")"), "{}", out);
    }

    #[test]
    fn test_show_and_key() {
        let out = render("<p $for={x in xs} $key={x.id} $show={x.ok}>x</p>");
        assert!(out.contains("attrs['data-key'] = str(x.id)"), "{}", out);
        assert!(out.contains("if not (x.ok):"), "{}", out);
        assert!(out.contains("'display: none'"), "{}", out);
    }

    #[test]
    fn test_interpolated_attribute() {
        let out = render("<a href=\"/users/{uid}\">x</a>\n---\nuid = 1\n");
        assert!(out.contains("attrs['href'] = ''.join(['/users/', str(self.uid)])"), "{}", out);
    }

    #[test]
    fn test_input_binding() {
        let doc = pywire_armature::parse("<input $bind={name}>\n---\nname = ''\n", "page.pywire").unwrap();
        let (out, bindings) = render_doc(&doc, None).unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].target, "self.name");
        assert_eq!(bindings[0].value_key, "value");
        assert!(out.contains(&format!("attrs['data-on-input'] = '{}'", bindings[0].name)), "{}", out);
        assert!(out.contains("attrs['value'] = '' if self.name is None else str(self.name)"), "{}", out);
        assert!(!out.contains("</input>"), "{}", out);

        let mut w = CodeWriter::new();
        bindings[0].write(&mut w);
        let handler = w.finish().0;
        assert!(handler.contains("val = event_data.get('value')"), "{}", handler);
        assert!(handler.contains("        self.name = val\n"), "{}", handler);
    }

    #[test]
    fn test_checkbox_binding() {
        let doc = pywire_armature::parse("<input type=\"checkbox\" $bind={done}>\n---\ndone = False\n", "page.pywire").unwrap();
        let (out, bindings) = render_doc(&doc, None).unwrap();
        assert_eq!(bindings[0].value_key, "checked");
        assert!(out.contains("attrs['data-on-change']"), "{}", out);
        assert!(out.contains("if self.done:"), "{}", out);
    }

    #[test]
    fn test_select_binding_marks_option() {
        let out = render("<select $bind={color}><option value=\"red\">Red</option></select>\n---\ncolor = 'red'\n");
        assert!(out.contains("if str(attrs.get('value')) == str(self.color):"), "{}", out);
    }

    #[test]
    fn test_scoped_style_registered() {
        let doc = pywire_armature::parse("<style scoped>\n.a { color: red; }\n</style>\n<p class=\"a\">x</p>", "page.pywire").unwrap();
        let (out, _) = render_doc(&doc, Some("abcd1234")).unwrap();
        assert!(out.contains("self._style_collector.add(self.SCOPE_ID, '.a[data-pw-abcd1234]{ color: red; }')"), "{}", out);
        assert!(out.contains("<p class=\"a\" data-pw-abcd1234>"), "{}", out);
        assert!(!out.contains("<style"), "{}", out);
    }

    #[test]
    fn test_component_and_slot() {
        let out = render("!component \"components/card.pywire\" as Card\n<Card title=\"Hi\"><b>x</b></Card>\n<slot name=\"side\">none</slot>");
        assert!(out.contains("component_slot_0 = []\n    component_slot_0.append('<b>x</b>')\n"), "{}", out);
        assert!(out.contains("parts.append(await self.render_component(Card, {'title': 'Hi'}, slot=''.join(component_slot_0)))"), "{}", out);
        assert!(out.contains("parts.append(await self.render_slot(self.LAYOUT_ID, 'side', default=''.join(slot_default_1)))"), "{}", out);
    }

    #[test]
    fn test_interpolation_keeps_line() {
        let doc = pywire_armature::parse("<p>\n  Value: { 1 / 0 }\n</p>", "page.pywire").unwrap();
        let scope = PageScope::new(None, "page.pywire");
        let components = FxHashMap::default();
        let settings = RenderSettings {
            file: "page.pywire",
            scope: &scope,
            console_sink: None,
            components: &components,
            scope_id: None,
            pjax: false,
        };
        let mut w = CodeWriter::new();
        write_render_method(&mut w, "_render_template", &doc.template, &settings, false).unwrap();
        let (code, map) = w.finish();
        let line = code.lines().position(|l| l.contains("escape_html(1 / 0)")).unwrap() as u32 + 1;
        assert_eq!(map.source_line(line), Some(2));
    }

    #[test]
    fn test_invalid_condition_is_syntax_error() {
        let doc = pywire_armature::parse("<div>\n<p $if={a ==}>x</p>\n</div>", "page.pywire").unwrap();
        let err = render_doc(&doc, None).unwrap_err();
        assert!(matches!(err, CompileError::Syntax { line: 2, .. }));
    }
}
