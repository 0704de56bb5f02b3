//! Self-binding pass.
//!
//! Rewrites free references to page-level names into attribute access on the
//! page instance (`count` -> `self.count`). The pass is a single traversal
//! over a tracked rename set: a name is rewritten when it is in the known set
//! and not shadowed by an enclosing local scope (parameters, lambda
//! parameters, comprehension targets, nested definitions, local imports).
//!
//! `global NAME` statements are dropped; callers add such names to the known
//! set beforehand (see [`crate::analysis::global_names`]).

use crate::ast::*;
use crate::builtins::is_builtin;
use pywire_carton::FxHashSet;

pub struct SelfBinder<'k> {
    known: &'k FxHashSet<Ident>,
    console_sink: Option<Ident>,
    scopes: Vec<FxHashSet<Ident>>,
}

impl<'k> SelfBinder<'k> {
    pub fn new(known: &'k FxHashSet<Ident>) -> Self {
        Self {
            known,
            console_sink: None,
            scopes: Vec::new(),
        }
    }

    /// Redirect bare `print(...)` calls to `self.<sink>.print(...)`.
    pub fn with_console_sink(mut self, sink: Option<&str>) -> Self {
        self.console_sink = sink.map(Ident::new);
        self
    }

    /// Enter a scope whose names shadow known names (loop variables of the
    /// template, for instance).
    pub fn push_scope<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.scopes
            .push(names.into_iter().map(|n| Ident::new(n.as_ref())).collect());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn is_shadowed(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains(name))
    }

    /// Whether a bare `name` in the current scope refers to page state.
    pub fn binds(&self, name: &str) -> bool {
        name != "self" && self.known.contains(name) && !self.is_shadowed(name)
    }

    fn is_print(&self, func: &Expr) -> bool {
        matches!(func, Expr::Name(n) if n.as_str() == "print")
            && self.console_sink.is_some()
            && !self.binds("print")
            && !self.is_shadowed("print")
    }

    // ---- expressions ----------------------------------------------------

    pub fn bind_expr(&mut self, expr: &mut Expr) {
        match expr {
            Expr::Name(name) => {
                if self.binds(name) {
                    let name = name.clone();
                    *expr = Expr::attr(Expr::name("self"), &name);
                }
            }
            Expr::Constant(_) => {}
            Expr::Str(pieces) => {
                for piece in pieces {
                    if let StrPiece::Formatted(f) = piece {
                        self.bind_fstring_parts(&mut f.parts);
                    }
                }
            }
            Expr::Attribute { value, .. } => self.bind_expr(value),
            Expr::Subscript { value, slice } => {
                self.bind_expr(value);
                self.bind_expr(slice);
            }
            Expr::Slice { lower, upper, step } => {
                for part in [lower, upper, step].into_iter().flatten() {
                    self.bind_expr(part);
                }
            }
            Expr::Call { func, args } => {
                if self.is_print(&**func) {
                    if let Some(sink) = &self.console_sink {
                        **func = Expr::attr(Expr::attr(Expr::name("self"), sink), "print");
                    }
                } else {
                    self.bind_expr(func);
                }
                for arg in args {
                    self.bind_expr(arg.value_mut());
                }
            }
            Expr::Tuple(elts) | Expr::List(elts) | Expr::Set(elts) => {
                for elt in elts {
                    self.bind_expr(elt);
                }
            }
            Expr::Dict(items) => {
                for item in items {
                    match item {
                        DictItem::Pair(k, v) => {
                            self.bind_expr(k);
                            self.bind_expr(v);
                        }
                        DictItem::Unpack(v) => self.bind_expr(v),
                    }
                }
            }
            Expr::ListComp { elt, generators }
            | Expr::SetComp { elt, generators }
            | Expr::GeneratorExp { elt, generators } => {
                self.bind_comprehension(generators, |binder| binder.bind_expr(elt));
            }
            Expr::DictComp {
                key,
                value,
                generators,
            } => {
                self.bind_comprehension(generators, |binder| {
                    binder.bind_expr(key);
                    binder.bind_expr(value);
                });
            }
            Expr::Starred(inner) | Expr::Await(inner) | Expr::YieldFrom(inner) => {
                self.bind_expr(inner)
            }
            Expr::UnaryOp { operand, .. } => self.bind_expr(operand),
            Expr::BinOp { left, right, .. } => {
                self.bind_expr(left);
                self.bind_expr(right);
            }
            Expr::BoolOp { values, .. } => {
                for value in values {
                    self.bind_expr(value);
                }
            }
            Expr::Compare { left, ops } => {
                self.bind_expr(left);
                for (_, right) in ops {
                    self.bind_expr(right);
                }
            }
            Expr::IfExp { test, body, orelse } => {
                self.bind_expr(test);
                self.bind_expr(body);
                self.bind_expr(orelse);
            }
            Expr::Lambda { params, body } => {
                self.bind_param_defaults(params);
                self.push_scope(params.names().cloned().collect::<Vec<_>>());
                self.bind_expr(body);
                self.pop_scope();
            }
            Expr::NamedExpr { value, .. } => self.bind_expr(value),
            Expr::Yield(value) => {
                if let Some(value) = value {
                    self.bind_expr(value);
                }
            }
        }
    }

    fn bind_fstring_parts(&mut self, parts: &mut [FStringPart]) {
        for part in parts {
            if let FStringPart::Field(field) = part {
                self.bind_expr(&mut field.expr);
                if let Some(spec) = &mut field.format_spec {
                    self.bind_fstring_parts(spec);
                }
            }
        }
    }

    fn bind_comprehension(
        &mut self,
        generators: &mut [Comprehension],
        inner: impl FnOnce(&mut Self),
    ) {
        // The first iterable is evaluated in the enclosing scope.
        if let Some(first) = generators.first_mut() {
            self.bind_expr(&mut first.iter);
        }
        let mut names = Vec::new();
        for generator in generators.iter() {
            target_names(&generator.target, &mut names);
        }
        self.push_scope(names);
        for (i, generator) in generators.iter_mut().enumerate() {
            if i > 0 {
                self.bind_expr(&mut generator.iter);
            }
            for cond in &mut generator.ifs {
                self.bind_expr(cond);
            }
        }
        inner(self);
        self.pop_scope();
    }

    fn bind_param_defaults(&mut self, params: &mut Parameters) {
        for item in &mut params.items {
            if let ParamItem::Param(p) | ParamItem::VarArgs(p) | ParamItem::KwArgs(p) = item {
                if let Some(default) = &mut p.default {
                    self.bind_expr(default);
                }
                if let Some(annotation) = &mut p.annotation {
                    self.bind_expr(annotation);
                }
            }
        }
    }

    // ---- statements -----------------------------------------------------

    /// Bind a function body. The function's parameters and the names it
    /// defines locally (imports, nested defs and classes) shadow known names.
    pub fn bind_function(&mut self, def: &mut FunctionDef) {
        for decorator in &mut def.decorators {
            self.bind_expr(&mut decorator.expr);
        }
        self.push_type_params(&mut def.type_params);
        self.bind_param_defaults(&mut def.params);
        if let Some(returns) = &mut def.returns {
            self.bind_expr(returns);
        }

        let mut locals: Vec<Ident> = def.params.names().cloned().collect();
        local_definitions(&def.body, &mut locals);
        self.push_scope(locals);
        self.bind_block(&mut def.body);
        self.pop_scope();
        self.pop_scope();
    }

    /// Bind bounds and defaults, then enter the scope of the parameter
    /// names. Callers pop the scope.
    fn push_type_params(&mut self, params: &mut [TypeParam]) {
        for param in params.iter_mut() {
            for e in [&mut param.bound, &mut param.default].into_iter().flatten() {
                self.bind_expr(e);
            }
        }
        self.push_scope(params.iter().map(|p| p.name.clone()));
    }

    pub fn bind_block(&mut self, body: &mut Block) {
        let had_statements = !body.is_empty();
        body.retain(|stmt| !matches!(stmt.kind, StmtKind::Global(_)));
        if had_statements && body.is_empty() {
            body.push(Stmt::new(StmtKind::Pass, 0));
        }
        for stmt in body.iter_mut() {
            self.bind_stmt(stmt);
        }
    }

    fn bind_optional_block(&mut self, body: &mut Option<Block>) {
        if let Some(body) = body {
            self.bind_block(body);
        }
    }

    pub fn bind_stmt(&mut self, stmt: &mut Stmt) {
        match &mut stmt.kind {
            StmtKind::Expr(e) | StmtKind::Return(Some(e)) => self.bind_expr(e),
            StmtKind::Return(None)
            | StmtKind::Pass
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Global(_)
            | StmtKind::Nonlocal(_)
            | StmtKind::Import(_)
            | StmtKind::ImportFrom { .. } => {}
            StmtKind::Assign { targets, value } => {
                for target in targets {
                    self.bind_expr(target);
                }
                self.bind_expr(value);
            }
            StmtKind::AugAssign { target, value, .. } => {
                self.bind_expr(target);
                self.bind_expr(value);
            }
            StmtKind::AnnAssign {
                target,
                annotation,
                value,
            } => {
                self.bind_expr(target);
                self.bind_expr(annotation);
                if let Some(value) = value {
                    self.bind_expr(value);
                }
            }
            StmtKind::Raise { exc, cause } => {
                for e in [exc, cause].into_iter().flatten() {
                    self.bind_expr(e);
                }
            }
            StmtKind::Delete(targets) => {
                for target in targets {
                    self.bind_expr(target);
                }
            }
            StmtKind::Assert { test, msg } => {
                self.bind_expr(test);
                if let Some(msg) = msg {
                    self.bind_expr(msg);
                }
            }
            StmtKind::If { branches, orelse } => {
                for branch in branches {
                    self.bind_expr(&mut branch.test);
                    self.bind_block(&mut branch.body);
                }
                self.bind_optional_block(orelse);
            }
            StmtKind::While { test, body, orelse } => {
                self.bind_expr(test);
                self.bind_block(body);
                self.bind_optional_block(orelse);
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
                ..
            } => {
                self.bind_expr(target);
                self.bind_expr(iter);
                self.bind_block(body);
                self.bind_optional_block(orelse);
            }
            StmtKind::With { items, body, .. } => {
                for item in items {
                    self.bind_expr(&mut item.context);
                    if let Some(vars) = &mut item.vars {
                        self.bind_expr(vars);
                    }
                }
                self.bind_block(body);
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                self.bind_block(body);
                for handler in handlers {
                    if let Some(typ) = &mut handler.typ {
                        self.bind_expr(typ);
                    }
                    self.bind_block(&mut handler.body);
                }
                self.bind_optional_block(orelse);
                self.bind_optional_block(finalbody);
            }
            StmtKind::Match { subject, cases } => {
                self.bind_expr(subject);
                for case in cases {
                    case.pattern
                        .for_each_value_mut(&mut |e: &mut Expr| self.bind_expr(e));
                    let mut captures = Vec::new();
                    case.pattern.bound_names(&mut captures);
                    self.push_scope(captures);
                    if let Some(guard) = &mut case.guard {
                        self.bind_expr(guard);
                    }
                    self.bind_block(&mut case.body);
                    self.pop_scope();
                }
            }
            StmtKind::TypeAlias {
                type_params, value, ..
            } => {
                self.push_type_params(type_params);
                self.bind_expr(value);
                self.pop_scope();
            }
            StmtKind::FunctionDef(def) => self.bind_function(def),
            StmtKind::ClassDef(class) => {
                for decorator in &mut class.decorators {
                    self.bind_expr(&mut decorator.expr);
                }
                self.push_type_params(&mut class.type_params);
                for base in &mut class.bases {
                    self.bind_expr(base.value_mut());
                }
                let mut locals = Vec::new();
                local_definitions(&class.body, &mut locals);
                self.push_scope(locals);
                self.bind_block(&mut class.body);
                self.pop_scope();
                self.pop_scope();
            }
        }
    }
}

/// Names bound by an assignment target.
pub fn target_names(target: &Expr, out: &mut Vec<Ident>) {
    match target {
        Expr::Name(n) => out.push(n.clone()),
        Expr::Starred(inner) => target_names(inner, out),
        Expr::Tuple(elts) | Expr::List(elts) => {
            for elt in elts {
                target_names(elt, out);
            }
        }
        _ => {}
    }
}

/// Imports, nested functions and classes defined anywhere in `body`
/// (not descending into nested scopes).
fn local_definitions(body: &[Stmt], out: &mut Vec<Ident>) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::Import(names) | StmtKind::ImportFrom { names, .. } => {
                out.extend(
                    names
                        .iter()
                        .filter(|a| a.name != "*")
                        .map(|a| Ident::new(a.bound_name())),
                );
            }
            StmtKind::FunctionDef(def) => out.push(def.name.clone()),
            StmtKind::ClassDef(class) => out.push(class.name.clone()),
            StmtKind::TypeAlias { name, .. } => out.push(name.clone()),
            StmtKind::Match { cases, .. } => {
                for case in cases {
                    local_definitions(&case.body, out);
                }
            }
            StmtKind::If { branches, orelse } => {
                for branch in branches {
                    local_definitions(&branch.body, out);
                }
                if let Some(orelse) = orelse {
                    local_definitions(orelse, out);
                }
            }
            StmtKind::While { body, orelse, .. } | StmtKind::For { body, orelse, .. } => {
                local_definitions(body, out);
                if let Some(orelse) = orelse {
                    local_definitions(orelse, out);
                }
            }
            StmtKind::With { body, .. } => local_definitions(body, out),
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                local_definitions(body, out);
                for handler in handlers {
                    local_definitions(&handler.body, out);
                }
                for block in [orelse, finalbody].into_iter().flatten() {
                    local_definitions(block, out);
                }
            }
            _ => {}
        }
    }
}

/// Free names of `expr` that would need a binding at runtime: names that are
/// not builtins, not shadowed by a lambda or comprehension inside `expr`.
pub fn free_names(expr: &Expr) -> Vec<Ident> {
    let mut collector = FreeNames {
        scopes: Vec::new(),
        out: Vec::new(),
    };
    collector.visit(expr);
    collector.out
}

struct FreeNames {
    scopes: Vec<Vec<Ident>>,
    out: Vec<Ident>,
}

impl FreeNames {
    fn note(&mut self, name: &Ident) {
        if is_builtin(name)
            || self.scopes.iter().any(|s| s.contains(name))
            || self.out.contains(name)
        {
            return;
        }
        self.out.push(name.clone());
    }

    fn visit_generators(&mut self, generators: &[Comprehension], inner: &[&Expr]) {
        if let Some(first) = generators.first() {
            self.visit(&first.iter);
        }
        let mut names = Vec::new();
        for generator in generators {
            target_names(&generator.target, &mut names);
        }
        self.scopes.push(names);
        for (i, generator) in generators.iter().enumerate() {
            if i > 0 {
                self.visit(&generator.iter);
            }
            for cond in &generator.ifs {
                self.visit(cond);
            }
        }
        for expr in inner {
            self.visit(expr);
        }
        self.scopes.pop();
    }

    fn visit_parts(&mut self, parts: &[FStringPart]) {
        for part in parts {
            if let FStringPart::Field(field) = part {
                self.visit(&field.expr);
                if let Some(spec) = &field.format_spec {
                    self.visit_parts(spec);
                }
            }
        }
    }

    fn visit(&mut self, expr: &Expr) {
        match expr {
            Expr::Name(n) => self.note(n),
            Expr::Constant(_) => {}
            Expr::Str(pieces) => {
                for piece in pieces {
                    if let StrPiece::Formatted(f) = piece {
                        self.visit_parts(&f.parts);
                    }
                }
            }
            Expr::Attribute { value, .. } => self.visit(value),
            Expr::Subscript { value, slice } => {
                self.visit(value);
                self.visit(slice);
            }
            Expr::Slice { lower, upper, step } => {
                for part in [lower, upper, step].into_iter().flatten() {
                    self.visit(part);
                }
            }
            Expr::Call { func, args } => {
                self.visit(func);
                for arg in args {
                    self.visit(arg.value());
                }
            }
            Expr::Tuple(elts) | Expr::List(elts) | Expr::Set(elts) => {
                for elt in elts {
                    self.visit(elt);
                }
            }
            Expr::Dict(items) => {
                for item in items {
                    match item {
                        DictItem::Pair(k, v) => {
                            self.visit(k);
                            self.visit(v);
                        }
                        DictItem::Unpack(v) => self.visit(v),
                    }
                }
            }
            Expr::ListComp { elt, generators }
            | Expr::SetComp { elt, generators }
            | Expr::GeneratorExp { elt, generators } => self.visit_generators(generators, &[&**elt]),
            Expr::DictComp {
                key,
                value,
                generators,
            } => self.visit_generators(generators, &[&**key, &**value]),
            Expr::Starred(inner) | Expr::Await(inner) | Expr::YieldFrom(inner) => {
                self.visit(inner)
            }
            Expr::UnaryOp { operand, .. } => self.visit(operand),
            Expr::BinOp { left, right, .. } => {
                self.visit(left);
                self.visit(right);
            }
            Expr::BoolOp { values, .. } => {
                for value in values {
                    self.visit(value);
                }
            }
            Expr::Compare { left, ops } => {
                self.visit(left);
                for (_, right) in ops {
                    self.visit(right);
                }
            }
            Expr::IfExp { test, body, orelse } => {
                self.visit(test);
                self.visit(body);
                self.visit(orelse);
            }
            Expr::Lambda { params, body } => {
                self.scopes.push(params.names().cloned().collect());
                self.visit(body);
                self.scopes.pop();
            }
            Expr::NamedExpr { value, .. } => self.visit(value),
            Expr::Yield(value) => {
                if let Some(value) = value {
                    self.visit(value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_expression, parse_module};
    use crate::printer::{print_expr, print_statements};

    fn known(names: &[&str]) -> FxHashSet<Ident> {
        names.iter().map(|n| Ident::new(n)).collect()
    }

    fn bind_module(src: &str, names: &[&str]) -> String {
        let known = known(names);
        let mut module = parse_module(src, 1).unwrap();
        let mut binder = SelfBinder::new(&known).with_console_sink(Some("console"));
        binder.bind_block(&mut module.body);
        print_statements(&module.body)
    }

    #[test]
    fn test_known_names_are_bound() {
        let known = known(&["count", "items"]);
        let mut expr = parse_expression("count + len(items) + other", 1, 1).unwrap();
        SelfBinder::new(&known).bind_expr(&mut expr);
        assert_eq!(print_expr(&expr), "self.count + len(self.items) + other");
    }

    #[test]
    fn test_attribute_and_keyword_names_untouched() {
        let known = known(&["count", "name"]);
        let mut expr = parse_expression("obj.count(name=name)", 1, 1).unwrap();
        SelfBinder::new(&known).bind_expr(&mut expr);
        assert_eq!(print_expr(&expr), "obj.count(name=self.name)");
    }

    #[test]
    fn test_match_captures_shadow_in_case_body() {
        let out = bind_module(
            "match cmd:\n    case [count, *rest] if count:\n        total = count\n    case Mode.FAST:\n        total = count\n",
            &["cmd", "count", "total", "Mode"],
        );
        assert_eq!(
            out,
            "match self.cmd:\n    case [count, *rest] if count:\n        self.total = count\n    case self.Mode.FAST:\n        self.total = self.count\n"
        );
    }

    #[test]
    fn test_type_params_shadow() {
        let out = bind_module(
            "def first[T](xs: list[T]) -> T:\n    return xs[0]\ntype Alias[T] = dict[Key, T]\n",
            &["T", "Key"],
        );
        assert_eq!(
            out,
            "def first[T](xs: list[T]) -> T:\n    return xs[0]\ntype Alias[T] = dict[self.Key, T]\n"
        );
    }

    #[test]
    fn test_params_shadow() {
        let out = bind_module("def f(count):\n    return count + total\n", &["count", "total"]);
        assert_eq!(out, "def f(count):\n    return count + self.total\n");
    }

    #[test]
    fn test_global_removed_and_store_rewritten() {
        let out = bind_module(
            "def inc():\n    global count\n    count += 1\n",
            &["count", "inc"],
        );
        assert_eq!(out, "def inc():\n    self.count += 1\n");
    }

    #[test]
    fn test_global_only_body_becomes_pass() {
        let out = bind_module("def f():\n    global x\n", &["x"]);
        assert_eq!(out, "def f():\n    pass\n");
    }

    #[test]
    fn test_comprehension_and_lambda_scopes() {
        let known = known(&["x", "xs", "y"]);
        let mut expr = parse_expression("[x for x in xs] + (lambda y: y + x)(1)", 1, 1).unwrap();
        SelfBinder::new(&known).bind_expr(&mut expr);
        assert_eq!(
            print_expr(&expr),
            "[x for x in self.xs] + (lambda y: y + self.x)(1)"
        );
    }

    #[test]
    fn test_local_import_shadows() {
        let out = bind_module("def f():\n    import json\n    return json\n", &["json"]);
        assert_eq!(out, "def f():\n    import json\n    return json\n");
    }

    #[test]
    fn test_console_sink() {
        let out = bind_module("print('hi', count)\n", &["count"]);
        assert_eq!(out, "self.console.print('hi', self.count)\n");
    }

    #[test]
    fn test_console_sink_disabled() {
        let known = known(&[]);
        let mut expr = parse_expression("print(1)", 1, 1).unwrap();
        SelfBinder::new(&known).bind_expr(&mut expr);
        assert_eq!(print_expr(&expr), "print(1)");
    }

    #[test]
    fn test_fstring_fields_bound() {
        let known = known(&["name"]);
        let mut expr = parse_expression("f'hello {name}'", 1, 1).unwrap();
        SelfBinder::new(&known).bind_expr(&mut expr);
        assert_eq!(print_expr(&expr), "f'hello {self.name}'");
    }

    #[test]
    fn test_walrus_target_not_bound() {
        let known = known(&["n"]);
        let mut expr = parse_expression("(n := n + 1)", 1, 1).unwrap();
        SelfBinder::new(&known).bind_expr(&mut expr);
        assert_eq!(print_expr(&expr), "(n := self.n + 1)");
    }

    #[test]
    fn test_free_names() {
        let expr = parse_expression("f(item.id, [y for y in ys], len(z), lambda q: q + w)", 1, 1)
            .unwrap();
        let names: Vec<_> = free_names(&expr).into_iter().map(|n| n.to_string()).collect();
        assert_eq!(names, vec!["f", "item", "ys", "z", "w"]);
    }
}
