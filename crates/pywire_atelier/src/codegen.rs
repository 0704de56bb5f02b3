//! Page module generation.
//!
//! Lays out the generated module in a fixed order:
//!
//! 1. runtime imports, the `_r_val` helper, component and layout loaders
//! 2. user imports, classes and `type` aliases
//! 3. the page class: route metadata, user attributes, methods, synthesized
//!    handlers, form wrappers, the render method (or slot fills), binding
//!    handlers and `_init_slots`
//! 4. `__page_class__`
//!
//! Everything goes through one [`CodeWriter`] so the line map covers the
//! whole module.

use serde::Serialize;
use tracing::{debug, info};

use pywire_carton::hash::{content_hash, short_hash};
use pywire_carton::{py_str, CodeWriter, FxHashMap, LineMap};
use pywire_croquis::{print_function, print_stmt};
use pywire_relief::{
    CompileError, CompileResult, Directive, ElementNode, ParsedDocument, PathDirective,
    TemplateNode,
};

use crate::forms::{write_form_members, HandlerTargets};
use crate::handlers::synthesize_handlers;
use crate::layout::{write_empty_init_slots, write_slot_fills};
use crate::options::CompilerOptions;
use crate::render::{write_render_method, BindingHandler, RenderSettings};
use crate::scope::{class_name, PageScope};
use crate::style::apply_scoped_css;
use crate::user_code::{transform_user_code, UserCode};

/// Handle to the page class defined by a generated module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageHandle {
    pub class_name: String,
    /// `BasePage` or `_LayoutBase`
    pub base_class: String,
}

/// Scoped CSS of a page, already rewritten for its scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopedStyle {
    pub scope_id: String,
    pub css: String,
}

/// Result of generating one page.
#[derive(Debug, Clone, Serialize)]
pub struct CompiledModule {
    /// Python source of the module
    pub code: String,
    /// Generated line -> page line
    pub line_map: LineMap,
    pub page: PageHandle,
    pub styles: Vec<ScopedStyle>,
    /// Names of methods synthesized from inline handlers
    pub handlers: Vec<String>,
}

impl CompiledModule {
    /// Page line a 1-based generated line came from.
    pub fn source_line(&self, generated: u32) -> Option<u32> {
        self.line_map.source_line(generated)
    }
}

/// Generate the page module for a parsed document.
///
/// Inline handlers are promoted in place, so `doc` is updated; generating
/// the same document again yields byte-identical output.
pub fn generate(doc: &mut ParsedDocument, options: &CompilerOptions) -> CompileResult<CompiledModule> {
    let file = doc.file_path.clone();
    let path = single_path_directive(doc)?.cloned();

    let module = doc.code.as_ref().map(|c| &c.module);
    let scope = PageScope::new(module, &file);
    let user_code = transform_user_code(module, &scope, options.console_sink.as_deref());
    let handlers = synthesize_handlers(
        &mut doc.template,
        &scope,
        options.console_sink.as_deref(),
        &file,
    )?;

    let doc: &ParsedDocument = doc;
    let mut components = FxHashMap::default();
    for component in doc.components() {
        components.insert(
            component.component_name.to_lowercase().to_string(),
            component.component_name.to_string(),
        );
    }

    let scope_id = doc
        .elements()
        .any(is_scoped_style)
        .then(|| match file.is_empty() {
            true => doc.content_hash.chars().take(8).collect(),
            false => short_hash(&file, 8),
        });
    let styles = scoped_styles(doc, scope_id.as_deref());

    let settings = RenderSettings {
        file: &file,
        scope: &scope,
        console_sink: options.console_sink.as_deref(),
        components: &components,
        scope_id: scope_id.as_deref(),
        pjax: options.pjax,
    };

    let page = PageHandle {
        class_name: class_name(&file),
        base_class: if doc.layout_directive().is_some() {
            "_LayoutBase".to_string()
        } else {
            "BasePage".to_string()
        },
    };

    let mut w = CodeWriter::new();
    write_prelude(&mut w, doc, options);
    write_hoisted(&mut w, &user_code);

    w.blank();
    w.blank();
    w.line(&format!("class {}({}):", page.class_name, page.base_class), None);
    w.indent();
    write_class_attributes(&mut w, doc, path.as_ref(), &user_code, scope_id.as_deref());
    for stmt in &user_code.attributes {
        print_stmt(&mut w, stmt);
    }

    w.blank();
    w.line(
        "def __init__(self, request, params, query, path=None, url=None, **kwargs):",
        None,
    );
    w.indent();
    w.line(
        "super().__init__(request, params, query, path=path, url=url, **kwargs)",
        None,
    );
    w.line("self._init_slots()", None);
    w.dedent();

    for def in user_code.methods.iter().chain(&user_code.top_level_init) {
        w.blank();
        print_function(&mut w, def);
    }
    for handler in &handlers {
        w.blank();
        print_function(&mut w, &handler.def);
    }

    let targets = HandlerTargets {
        scope: &scope,
        methods: &user_code.methods,
        synthesized: &handlers,
    };
    let forms = write_form_members(&mut w, doc, &targets)?;

    let bindings = match doc.layout_directive() {
        Some(layout) => {
            let bindings =
                write_slot_fills(&mut w, &doc.template, &layout.layout_path, &settings)?;
            write_bindings(&mut w, &bindings);
            bindings
        }
        None => {
            w.blank();
            let bindings =
                write_render_method(&mut w, "_render_template", &doc.template, &settings, true)?;
            write_bindings(&mut w, &bindings);
            w.blank();
            write_empty_init_slots(&mut w);
            bindings
        }
    };
    w.dedent();

    w.blank();
    w.blank();
    w.line(&format!("__page_class__ = {}", page.class_name), None);

    let (code, line_map) = w.finish();
    info!(
        file = %file,
        class = %page.class_name,
        handlers = handlers.len(),
        forms,
        bindings = bindings.len(),
        lines = line_map.len(),
        "generated page module"
    );

    Ok(CompiledModule {
        code,
        line_map,
        page,
        styles,
        handlers: handlers.iter().map(|h| h.name().to_string()).collect(),
    })
}

/// The `!path` directive, rejecting a second one.
fn single_path_directive(doc: &ParsedDocument) -> CompileResult<Option<&PathDirective>> {
    let mut found: Option<&PathDirective> = None;
    for directive in &doc.directives {
        let Directive::Path(path) = directive else {
            continue;
        };
        if found.is_some() {
            return Err(CompileError::codegen(
                &doc.file_path,
                path.loc.line(),
                "Multiple !path directives",
            ));
        }
        found = Some(path);
    }
    Ok(found)
}

fn is_scoped_style(el: &ElementNode) -> bool {
    el.tag.as_str() == "style" && el.has_attr("scoped")
}

fn scoped_styles(doc: &ParsedDocument, scope_id: Option<&str>) -> Vec<ScopedStyle> {
    let Some(scope_id) = scope_id else {
        return Vec::new();
    };
    doc.elements()
        .filter(|el| is_scoped_style(el))
        .map(|el| {
            let css: String = el
                .children
                .iter()
                .filter_map(|child| match child {
                    TemplateNode::Text(text) => Some(text.literal_text()),
                    TemplateNode::Element(_) => None,
                })
                .collect();
            ScopedStyle {
                scope_id: scope_id.to_string(),
                css: apply_scoped_css(&css, scope_id),
            }
        })
        .collect()
}

fn write_prelude(w: &mut CodeWriter, doc: &ParsedDocument, options: &CompilerOptions) {
    let runtime = &options.runtime_module;
    let file = py_str(&doc.file_path);
    let layout = doc.layout_directive();

    w.line(&format!("from {}.page import BasePage", runtime), None);
    w.line(
        &format!(
            "from {}.validation import form_validator, FieldRules, FormValidationSchema",
            runtime
        ),
        None,
    );
    w.line(&format!("from {}.models import validate_with_model", runtime), None);
    w.line(
        &format!(
            "from {}.loader import {}",
            runtime,
            if layout.is_some() {
                "load_component, load_layout"
            } else {
                "load_component"
            }
        ),
        None,
    );
    w.line(
        &format!(
            "from {}.helpers import render_attrs, escape_html, ensure_async_iterator",
            runtime
        ),
        None,
    );
    w.line("import json", None);
    w.line("import asyncio", None);
    w.blank();
    w.blank();
    w.line("def _r_val(value):", None);
    w.indent();
    w.line("if value is True:", None);
    w.indent();
    w.line("return ''", None);
    w.dedent();
    w.line("if value is False or value is None:", None);
    w.indent();
    w.line("return None", None);
    w.dedent();
    w.line("return value", None);
    w.dedent();

    let has_loaders = layout.is_some() || doc.components().next().is_some();
    if has_loaders {
        w.blank();
    }
    for component in doc.components() {
        w.line(
            &format!(
                "{} = load_component({}, {})",
                component.component_name,
                py_str(&component.path),
                file
            ),
            Some(component.loc.line()),
        );
    }
    if let Some(layout) = layout {
        w.line(
            &format!(
                "_LayoutBase = load_layout({}, {})",
                py_str(&layout.layout_path),
                file
            ),
            Some(layout.loc.line()),
        );
    }
}

/// User imports, classes and `type` aliases, at module level.
fn write_hoisted(w: &mut CodeWriter, code: &UserCode) {
    if !code.imports.is_empty() {
        w.blank();
        for stmt in &code.imports {
            print_stmt(w, stmt);
        }
    }
    for stmt in &code.classes {
        w.blank();
        w.blank();
        print_stmt(w, stmt);
    }
}

fn write_class_attributes(
    w: &mut CodeWriter,
    doc: &ParsedDocument,
    path: Option<&PathDirective>,
    code: &UserCode,
    scope_id: Option<&str>,
) {
    if let Some(path) = path {
        let line = Some(path.loc.line());
        let routes: Vec<String> = path
            .routes
            .iter()
            .map(|r| format!("{}: {}", py_str(&r.name), py_str(&r.pattern)))
            .collect();
        w.line(&format!("__routes__ = {{{}}}", routes.join(", ")), line);
        w.line(
            &format!(
                "__path_mode__ = {}",
                py_str(if path.is_simple_string { "string" } else { "dict" })
            ),
            line,
        );
        let first = path.routes.first().map(|r| py_str(&r.pattern));
        w.line(
            &format!("__route__ = {}", first.as_deref().unwrap_or("None")),
            line,
        );

        let spa = !path.is_simple_string && !doc.has_no_spa();
        w.line(
            &format!("__spa_enabled__ = {}", if spa { "True" } else { "False" }),
            line,
        );
        if spa {
            let siblings: Vec<String> = path.routes.iter().map(|r| py_str(&r.pattern)).collect();
            w.line(&format!("__sibling_paths__ = [{}]", siblings.join(", ")), line);
        }
    }

    w.line(&format!("__file_path__ = {}", py_str(&doc.file_path)), None);
    if doc.has_no_spa() {
        w.line("__no_spa__ = True", None);
    }
    if doc.elements().any(is_file_input) {
        w.line("__has_uploads__ = True", None);
    }
    if doc.elements().any(|el| el.tag.as_str() == "slot") {
        w.line(
            &format!("LAYOUT_ID = {}", py_str(&content_hash(&doc.file_path))),
            None,
        );
    }
    if let Some(scope_id) = scope_id {
        w.line(&format!("SCOPE_ID = {}", py_str(scope_id)), None);
    }

    let hooks: Vec<String> = code.init_hooks().into_iter().map(py_str).collect();
    w.line(&format!("INIT_HOOKS = [{}]", hooks.join(", ")), None);
    debug!(hooks = hooks.len(), "wrote class attributes");
}

fn is_file_input(el: &ElementNode) -> bool {
    el.tag.as_str() == "input" && el.attr_value("type") == Some("file")
}

fn write_bindings(w: &mut CodeWriter, bindings: &[BindingHandler]) {
    for binding in bindings {
        w.blank();
        binding.write(w);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate_source(source: &str, file: &str) -> CompileResult<CompiledModule> {
        let mut doc = pywire_armature::parse(source, file)?;
        generate(&mut doc, &CompilerOptions::default())
    }

    #[test]
    fn test_counter_page() {
        let source = "!path '/'\n<button @click={count += 1}>Count: {count}</button>\n---\ncount = 0\n";
        let module = generate_source(source, "pages/counter.pywire").unwrap();
        assert_eq!(module.handlers.len(), 1);
        let code = module.code.replace(&module.handlers[0], "_handler_HASH");
        insta::assert_snapshot!(code);
    }

    #[test]
    fn test_page_handle() {
        let module = generate_source("<p>hi</p>", "pages/user_profile.pywire").unwrap();
        assert_eq!(module.page.class_name, "UserProfilePage");
        assert_eq!(module.page.base_class, "BasePage");
        assert!(module.code.ends_with("__page_class__ = UserProfilePage\n"));
    }

    #[test]
    fn test_route_metadata() {
        let module = generate_source(
            "!path {'main': '/', 'detail': '/items/{id}'}\n<p>x</p>",
            "pages/items.pywire",
        )
        .unwrap();
        assert!(module.code.contains("    __routes__ = {'main': '/', 'detail': '/items/{id}'}\n"));
        assert!(module.code.contains("    __path_mode__ = 'dict'\n"));
        assert!(module.code.contains("    __route__ = '/'\n"));
        assert!(module.code.contains("    __spa_enabled__ = True\n"));
        assert!(module.code.contains("    __sibling_paths__ = ['/', '/items/{id}']\n"));
    }

    #[test]
    fn test_string_path_and_no_spa() {
        let module = generate_source("!path \"/test\"\n!no_spa\n<p>x</p>", "t.pywire").unwrap();
        assert!(module.code.contains("__routes__ = {'main': '/test'}"));
        assert!(module.code.contains("__path_mode__ = 'string'"));
        assert!(module.code.contains("__spa_enabled__ = False"));
        assert!(module.code.contains("__no_spa__ = True"));
    }

    #[test]
    fn test_component_tags_resolve_to_imported_class() {
        let module = generate_source(
            "!component \"components/user_card.pywire\" as UserCard\n<UserCard name=\"a\"></UserCard>",
            "pages/team.pywire",
        )
        .unwrap();
        assert!(
            module.code.contains("await self.render_component(UserCard, {'name': 'a'}"),
            "{}",
            module.code
        );
        assert!(!module.code.contains("<usercard"), "{}", module.code);
    }

    #[test]
    fn test_duplicate_path_rejected() {
        let err = generate_source("!path '/a'\n!path '/b'\n<p>x</p>", "dup.pywire").unwrap_err();
        assert!(matches!(err, CompileError::CodeGeneration { line: 2, .. }));
        assert_eq!(err.message(), "Multiple !path directives");
    }

    #[test]
    fn test_layout_page() {
        let module = generate_source(
            "!layout \"../layouts/base.pywire\"\n<h1>About</h1>",
            "pages/about.pywire",
        )
        .unwrap();
        assert_eq!(module.page.base_class, "_LayoutBase");
        assert!(module.code.contains("from pywire.runtime.loader import load_component, load_layout\n"));
        assert!(module.code.contains("_LayoutBase = load_layout('../layouts/base.pywire', 'pages/about.pywire')\n"));
        assert!(!module.code.contains("_render_template"));
        let parent = content_hash("layouts/base.pywire");
        assert!(module.code.contains(&format!("self.register_slot('{}', 'default', self._render_slot_fill_default_", parent)));
    }

    #[test]
    fn test_layout_id_for_slots() {
        let module = generate_source("<main><slot></slot></main>", "layouts/base.pywire").unwrap();
        assert!(module.code.contains(&format!("    LAYOUT_ID = '{}'\n", content_hash("layouts/base.pywire"))));
    }

    #[test]
    fn test_scoped_style_and_upload_flags() {
        let module = generate_source(
            "<style scoped>.a { color: red; }</style>\n<input type=\"file\" name=\"f\">",
            "pages/up.pywire",
        )
        .unwrap();
        let scope_id = short_hash("pages/up.pywire", 8);
        assert!(module.code.contains(&format!("    SCOPE_ID = '{}'\n", scope_id)));
        assert!(module.code.contains("    __has_uploads__ = True\n"));
        assert_eq!(module.styles.len(), 1);
        assert_eq!(module.styles[0].css, format!(".a[data-pw-{}]{{ color: red; }}", scope_id));
    }

    #[test]
    fn test_mount_hooks_listed() {
        let module = generate_source(
            "<p>x</p>\n---\nready = False\nprint('boot')\n@mount\nasync def load():\n    pass\n",
            "m.pywire",
        )
        .unwrap();
        assert!(module.code.contains("    INIT_HOOKS = ['__top_level_init__', 'load']\n"));
        assert!(module.code.contains("    ready = False\n"));
    }

    #[test]
    fn test_generate_is_idempotent() {
        let source = "<button @click={count += 1}>+</button>\n---\ncount = 0\n";
        let mut doc = pywire_armature::parse(source, "c.pywire").unwrap();
        let options = CompilerOptions::default();
        let first = generate(&mut doc, &options).unwrap();
        let second = generate(&mut doc, &options).unwrap();
        assert_eq!(first.code, second.code);
        assert_eq!(first.line_map, second.line_map);
        assert_eq!(second.code.matches("async def _handler_").count(), 1);
        assert_eq!(first.handlers, second.handlers);
    }
}
