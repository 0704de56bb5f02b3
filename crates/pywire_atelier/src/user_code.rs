//! User code transform.
//!
//! The code section of a page is split by statement kind:
//!
//! - imports, classes and `type` aliases are hoisted to module level
//!   unchanged
//! - top-level assignments become class attributes
//! - functions become methods: `self` is prepended, `global` statements
//!   are dropped and references to page state are bound to `self`
//! - everything else runs once per instance in `__top_level_init__`
//!
//! The transform is purely syntactic. Async functions stay async and every
//! statement keeps its source line.

use tracing::debug;

use pywire_croquis::ast::{Block, FunctionDef, Parameters};
use pywire_croquis::{Expr, Ident, Module, SelfBinder, Stmt, StmtKind};

use crate::scope::PageScope;

/// Name of the synthesized init hook holding loose top-level statements.
pub const TOP_LEVEL_INIT: &str = "__top_level_init__";

/// The code section, split for placement in the generated module.
#[derive(Debug, Default)]
pub struct UserCode {
    pub imports: Vec<Stmt>,
    pub classes: Vec<Stmt>,
    /// Class attribute assignments
    pub attributes: Vec<Stmt>,
    pub methods: Vec<FunctionDef>,
    pub top_level_init: Option<FunctionDef>,
    /// Functions decorated with `@mount`, in source order
    pub mount_hooks: Vec<Ident>,
}

impl UserCode {
    /// Hooks the runtime runs before the first render.
    pub fn init_hooks(&self) -> Vec<&str> {
        self.top_level_init
            .iter()
            .map(|def| def.name.as_str())
            .chain(self.mount_hooks.iter().map(Ident::as_str))
            .collect()
    }
}

pub fn transform_user_code(
    module: Option<&Module>,
    scope: &PageScope,
    console_sink: Option<&str>,
) -> UserCode {
    let mut code = UserCode::default();
    let Some(module) = module else {
        return code;
    };

    let mut loose: Block = Vec::new();
    for stmt in &module.body {
        match &stmt.kind {
            StmtKind::Import(_) | StmtKind::ImportFrom { .. } => code.imports.push(stmt.clone()),
            StmtKind::ClassDef(_) | StmtKind::TypeAlias { .. } => code.classes.push(stmt.clone()),
            StmtKind::Assign { targets, .. } if !targets.iter().any(is_self_attribute) => {
                code.attributes.push(stmt.clone())
            }
            StmtKind::AnnAssign { target, .. } if !is_self_attribute(target) => {
                code.attributes.push(stmt.clone())
            }
            StmtKind::FunctionDef(def) => {
                let mut def = def.as_ref().clone();
                let before = def.decorators.len();
                def.decorators.retain(|d| !matches!(&d.expr, Expr::Name(n) if n.as_str() == "mount"));
                if def.decorators.len() != before {
                    code.mount_hooks.push(def.name.clone());
                }
                code.methods.push(into_method(def, scope, console_sink));
            }
            _ => loose.push(stmt.clone()),
        }
    }

    if !loose.is_empty() {
        let init = FunctionDef {
            name: Ident::new(TOP_LEVEL_INIT),
            params: Parameters::default(),
            body: loose,
            decorators: Vec::new(),
            returns: None,
            type_params: Vec::new(),
            is_async: true,
            line: 0,
        };
        code.top_level_init = Some(into_method(init, scope, console_sink));
    }

    debug!(
        methods = code.methods.len(),
        attributes = code.attributes.len(),
        has_top_level_init = code.top_level_init.is_some(),
        "transformed user code"
    );
    code
}

fn is_self_attribute(target: &Expr) -> bool {
    matches!(target, Expr::Attribute { value, .. } if value.as_name() == Some("self"))
}

/// Turn a module-level function into a method bound to the page instance.
fn into_method(mut def: FunctionDef, scope: &PageScope, console_sink: Option<&str>) -> FunctionDef {
    let mut binder = SelfBinder::new(&scope.known).with_console_sink(console_sink);
    binder.bind_function(&mut def);
    if def.params.first_name().map(Ident::as_str) != Some("self") {
        def.params.prepend("self");
    }
    def
}

#[cfg(test)]
mod tests {
    use super::*;
    use pywire_carton::CodeWriter;
    use pywire_croquis::{parse_module, print_function, print_statements};

    fn transform(src: &str) -> UserCode {
        let module = parse_module(src, 2).unwrap();
        let scope = PageScope::new(Some(&module), "page.pywire");
        transform_user_code(Some(&module), &scope, Some("console"))
    }

    fn method_text(def: &FunctionDef) -> String {
        let mut w = CodeWriter::new();
        print_function(&mut w, def);
        w.finish().0
    }

    #[test]
    fn test_split_by_kind() {
        let code = transform(
            "import os\nclass Item:\n    pass\ncount = 0\nlabel: str = 'x'\ndef inc():\n    count += 1\nprint(count)\n",
        );
        assert_eq!(code.imports.len(), 1);
        assert_eq!(code.classes.len(), 1);
        assert_eq!(print_statements(&code.attributes), "count = 0\nlabel: str = 'x'\n");
        assert_eq!(
            method_text(&code.methods[0]),
            "def inc(self):\n    self.count += 1\n"
        );
        let init = code.top_level_init.as_ref().unwrap();
        assert!(init.is_async);
        assert_eq!(
            method_text(init),
            "async def __top_level_init__(self):\n    self.console.print(self.count)\n"
        );
        assert_eq!(code.init_hooks(), vec!["__top_level_init__"]);
    }

    #[test]
    fn test_global_rewrite_and_async_kind() {
        let code = transform(
            "async def load():\n    global total\n    total = await fetch(total)\n    return total\n",
        );
        assert_eq!(
            method_text(&code.methods[0]),
            "async def load(self):\n    self.total = await fetch(self.total)\n    return self.total\n"
        );
    }

    #[test]
    fn test_mount_hooks_collected() {
        let code = transform("@mount\nasync def setup():\n    pass\n@cached\ndef other():\n    pass\n");
        assert_eq!(code.mount_hooks, vec![Ident::new("setup")]);
        assert!(code.methods[0].decorators.is_empty());
        assert_eq!(code.methods[1].decorators.len(), 1);
        assert_eq!(code.init_hooks(), vec!["setup"]);
    }

    #[test]
    fn test_parameters_shadow_state() {
        let code = transform("count = 0\ndef show(count):\n    return count\n");
        assert_eq!(
            method_text(&code.methods[0]),
            "def show(self, count):\n    return count\n"
        );
    }

    #[test]
    fn test_loose_assignments_promoted() {
        let code = transform("if True:\n    ready = True\nfor i in range(3):\n    pass\n");
        let init = code.top_level_init.as_ref().unwrap();
        let text = method_text(init);
        assert!(text.contains("self.ready = True"), "{}", text);
        assert!(text.contains("for self.i in range(3):"), "{}", text);
    }

    #[test]
    fn test_top_level_match_promotes_assignments() {
        let code = transform(
            "type Mode = str\nmatch path:\n    case 'a' | 'b' as key:\n        mode = key\n    case _:\n        mode = 'none'\n",
        );
        assert_eq!(print_statements(&code.classes), "type Mode = str\n");
        let init = code.top_level_init.as_ref().unwrap();
        assert_eq!(
            method_text(init),
            "async def __top_level_init__(self):\n    match self.path:\n        case 'a' | 'b' as key:\n            self.mode = key\n        case _:\n            self.mode = 'none'\n"
        );
    }

    #[test]
    fn test_method_lines_are_absolute() {
        let code = transform("x = 1\ndef f():\n    raise ValueError('boom')\n");
        let def = &code.methods[0];
        assert_eq!(def.line, 3);
        assert_eq!(def.body[0].line, 4);
    }
}
