//! Queries and small rewrites over syntax trees used by the code generator.

use crate::ast::*;
use crate::binder::{free_names, target_names};
use pywire_carton::FxHashSet;

/// Names declared `global` in any function of `body`, in first-seen order.
pub fn global_names(body: &[Stmt]) -> Vec<Ident> {
    fn walk(body: &[Stmt], out: &mut Vec<Ident>) {
        for stmt in body {
            match &stmt.kind {
                StmtKind::Global(names) => {
                    for name in names {
                        if !out.contains(name) {
                            out.push(name.clone());
                        }
                    }
                }
                StmtKind::FunctionDef(def) => walk(&def.body, out),
                _ => for_each_block(stmt, &mut |block| walk(block, out)),
            }
        }
    }
    let mut out = Vec::new();
    walk(body, &mut out);
    out
}

/// Names bound by assignments, loops and `with` targets in `body`, not
/// descending into function or class bodies.
pub fn assigned_names(body: &[Stmt]) -> Vec<Ident> {
    fn walk(body: &[Stmt], out: &mut Vec<Ident>) {
        for stmt in body {
            let mut names = Vec::new();
            match &stmt.kind {
                StmtKind::Assign { targets, .. } => {
                    for target in targets {
                        target_names(target, &mut names);
                    }
                }
                StmtKind::AugAssign { target, .. } | StmtKind::AnnAssign { target, .. } => {
                    target_names(target, &mut names)
                }
                StmtKind::For { target, .. } => target_names(target, &mut names),
                StmtKind::With { items, .. } => {
                    for item in items {
                        if let Some(vars) = &item.vars {
                            target_names(vars, &mut names);
                        }
                    }
                }
                StmtKind::FunctionDef(_) | StmtKind::ClassDef(_) => continue,
                _ => {}
            }
            for name in names {
                if !out.contains(&name) {
                    out.push(name);
                }
            }
            for_each_block(stmt, &mut |block| walk(block, out));
        }
    }
    let mut out = Vec::new();
    walk(body, &mut out);
    out
}

/// Visit the nested blocks of a compound statement (not function or class
/// bodies).
fn for_each_block<'a>(stmt: &'a Stmt, f: &mut dyn FnMut(&'a [Stmt])) {
    match &stmt.kind {
        StmtKind::If { branches, orelse } => {
            for branch in branches {
                f(&branch.body);
            }
            if let Some(orelse) = orelse {
                f(orelse);
            }
        }
        StmtKind::While { body, orelse, .. } | StmtKind::For { body, orelse, .. } => {
            f(body);
            if let Some(orelse) = orelse {
                f(orelse);
            }
        }
        StmtKind::With { body, .. } => f(body),
        StmtKind::Match { cases, .. } => {
            for case in cases {
                f(&case.body);
            }
        }
        StmtKind::Try {
            body,
            handlers,
            orelse,
            finalbody,
        } => {
            f(body);
            for handler in handlers {
                f(&handler.body);
            }
            for block in [orelse, finalbody].into_iter().flatten() {
                f(block);
            }
        }
        _ => {}
    }
}

/// Visit every expression directly owned by the statements of `body`,
/// recursing into compound statements but not into nested definitions.
pub fn for_each_expr(body: &[Stmt], f: &mut dyn FnMut(&Expr)) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::Expr(e) | StmtKind::Return(Some(e)) => f(e),
            StmtKind::Assign { targets, value } => {
                targets.iter().for_each(&mut *f);
                f(value);
            }
            StmtKind::AugAssign { target, value, .. } => {
                f(target);
                f(value);
            }
            StmtKind::AnnAssign { target, value, .. } => {
                f(target);
                if let Some(value) = value {
                    f(value);
                }
            }
            StmtKind::Raise { exc, cause } => {
                for e in [exc, cause].into_iter().flatten() {
                    f(e);
                }
            }
            StmtKind::Delete(targets) => targets.iter().for_each(&mut *f),
            StmtKind::Assert { test, msg } => {
                f(test);
                if let Some(msg) = msg {
                    f(msg);
                }
            }
            StmtKind::If { branches, orelse } => {
                for branch in branches {
                    f(&branch.test);
                    for_each_expr(&branch.body, f);
                }
                if let Some(orelse) = orelse {
                    for_each_expr(orelse, f);
                }
            }
            StmtKind::While { test, body, orelse } => {
                f(test);
                for_each_expr(body, f);
                if let Some(orelse) = orelse {
                    for_each_expr(orelse, f);
                }
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
                ..
            } => {
                f(target);
                f(iter);
                for_each_expr(body, f);
                if let Some(orelse) = orelse {
                    for_each_expr(orelse, f);
                }
            }
            StmtKind::With { items, body, .. } => {
                for item in items {
                    f(&item.context);
                }
                for_each_expr(body, f);
            }
            StmtKind::Match { subject, cases } => {
                f(subject);
                for case in cases {
                    if let Some(guard) = &case.guard {
                        f(guard);
                    }
                    for_each_expr(&case.body, f);
                }
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                for_each_expr(body, f);
                for handler in handlers {
                    if let Some(typ) = &handler.typ {
                        f(typ);
                    }
                    for_each_expr(&handler.body, f);
                }
                for block in [orelse, finalbody].into_iter().flatten() {
                    for_each_expr(block, f);
                }
            }
            _ => {}
        }
    }
}

/// Whether `name` is referenced as a free variable anywhere in `body`.
pub fn references_name(body: &[Stmt], name: &str) -> bool {
    let mut found = false;
    for_each_expr(body, &mut |expr| {
        if !found {
            found = free_names(expr).iter().any(|n| n.as_str() == name);
        }
    });
    found
}

/// Wrap calls to the named coroutine functions in `await`.
///
/// Both bare calls (`load()`) and bound calls (`self.load()`) are matched.
/// Calls already awaited and calls inside lambdas are left alone.
pub fn insert_awaits(body: &mut [Stmt], async_names: &FxHashSet<Ident>) {
    for stmt in body {
        if !matches!(stmt.kind, StmtKind::FunctionDef(_) | StmtKind::ClassDef(_)) {
            visit_stmt_mut(stmt, &mut |expr| insert_awaits_expr(expr, async_names));
        }
    }
}

fn is_coroutine_call(expr: &Expr, async_names: &FxHashSet<Ident>) -> bool {
    let Expr::Call { func, .. } = expr else {
        return false;
    };
    match func.as_ref() {
        Expr::Name(n) => async_names.contains(n.as_str()),
        Expr::Attribute { value, attr } => {
            matches!(value.as_ref(), Expr::Name(s) if s.as_str() == "self")
                && async_names.contains(attr.as_str())
        }
        _ => false,
    }
}

pub fn insert_awaits_expr(expr: &mut Expr, async_names: &FxHashSet<Ident>) {
    match expr {
        Expr::Lambda { .. } => return,
        Expr::Await(inner) => {
            if is_coroutine_call(inner, async_names) {
                if let Expr::Call { func, args } = inner.as_mut() {
                    insert_awaits_expr(func, async_names);
                    for arg in args {
                        insert_awaits_expr(arg.value_mut(), async_names);
                    }
                }
                return;
            }
        }
        _ => {}
    }

    visit_children_mut(expr, &mut |child| insert_awaits_expr(child, async_names));

    if is_coroutine_call(expr, async_names) {
        let call = std::mem::replace(expr, Expr::Constant(Constant::None));
        *expr = Expr::Await(Box::new(call));
    }
}

/// Apply `f` to every top-level expression of the statements in `body`,
/// recursing into compound statements but not into nested definitions.
pub fn visit_block_exprs_mut(body: &mut [Stmt], f: &mut dyn FnMut(&mut Expr)) {
    for stmt in body {
        if !matches!(stmt.kind, StmtKind::FunctionDef(_) | StmtKind::ClassDef(_)) {
            visit_stmt_mut(stmt, f);
        }
    }
}

fn visit_stmt_mut(stmt: &mut Stmt, f: &mut dyn FnMut(&mut Expr)) {
    fn visit_block(block: &mut [Stmt], f: &mut dyn FnMut(&mut Expr)) {
        for stmt in block.iter_mut() {
            if !matches!(stmt.kind, StmtKind::FunctionDef(_) | StmtKind::ClassDef(_)) {
                visit_stmt_mut(stmt, f);
            }
        }
    }
    match &mut stmt.kind {
        StmtKind::Expr(e) | StmtKind::Return(Some(e)) => f(e),
        StmtKind::Assign { targets, value } => {
            targets.iter_mut().for_each(&mut *f);
            f(value);
        }
        StmtKind::AugAssign { target, value, .. } => {
            f(target);
            f(value);
        }
        StmtKind::AnnAssign { value, .. } => {
            if let Some(value) = value {
                f(value);
            }
        }
        StmtKind::Raise { exc, cause } => {
            for e in [exc, cause].into_iter().flatten() {
                f(e);
            }
        }
        StmtKind::Assert { test, msg } => {
            f(test);
            if let Some(msg) = msg {
                f(msg);
            }
        }
        StmtKind::If { branches, orelse } => {
            for branch in branches {
                f(&mut branch.test);
                visit_block(&mut branch.body, f);
            }
            if let Some(orelse) = orelse {
                visit_block(orelse, f);
            }
        }
        StmtKind::While { test, body, orelse } => {
            f(test);
            visit_block(body, f);
            if let Some(orelse) = orelse {
                visit_block(orelse, f);
            }
        }
        StmtKind::For {
            iter, body, orelse, ..
        } => {
            f(iter);
            visit_block(body, f);
            if let Some(orelse) = orelse {
                visit_block(orelse, f);
            }
        }
        StmtKind::With { items, body, .. } => {
            for item in items {
                f(&mut item.context);
            }
            visit_block(body, f);
        }
        StmtKind::Match { subject, cases } => {
            f(subject);
            for case in cases {
                if let Some(guard) = &mut case.guard {
                    f(guard);
                }
                visit_block(&mut case.body, f);
            }
        }
        StmtKind::Try {
            body,
            handlers,
            orelse,
            finalbody,
        } => {
            visit_block(body, f);
            for handler in handlers {
                visit_block(&mut handler.body, f);
            }
            for block in [orelse, finalbody].into_iter().flatten() {
                visit_block(block, f);
            }
        }
        _ => {}
    }
}

/// Apply `f` to each direct child expression of `expr`.
pub fn visit_children_mut(expr: &mut Expr, f: &mut dyn FnMut(&mut Expr)) {
    match expr {
        Expr::Name(_) | Expr::Constant(_) => {}
        Expr::Str(pieces) => {
            for piece in pieces {
                if let StrPiece::Formatted(fstring) = piece {
                    visit_fstring_parts_mut(&mut fstring.parts, f);
                }
            }
        }
        Expr::Attribute { value, .. } => f(value),
        Expr::Subscript { value, slice } => {
            f(value);
            f(slice);
        }
        Expr::Slice { lower, upper, step } => {
            for part in [lower, upper, step].into_iter().flatten() {
                f(part);
            }
        }
        Expr::Call { func, args } => {
            f(func);
            for arg in args {
                f(arg.value_mut());
            }
        }
        Expr::Tuple(elts) | Expr::List(elts) | Expr::Set(elts) => elts.iter_mut().for_each(f),
        Expr::Dict(items) => {
            for item in items {
                match item {
                    DictItem::Pair(k, v) => {
                        f(k);
                        f(v);
                    }
                    DictItem::Unpack(v) => f(v),
                }
            }
        }
        Expr::ListComp { elt, generators }
        | Expr::SetComp { elt, generators }
        | Expr::GeneratorExp { elt, generators } => {
            f(elt);
            visit_generators_mut(generators, f);
        }
        Expr::DictComp {
            key,
            value,
            generators,
        } => {
            f(key);
            f(value);
            visit_generators_mut(generators, f);
        }
        Expr::Starred(inner) | Expr::Await(inner) | Expr::YieldFrom(inner) => f(inner),
        Expr::UnaryOp { operand, .. } => f(operand),
        Expr::BinOp { left, right, .. } => {
            f(left);
            f(right);
        }
        Expr::BoolOp { values, .. } => values.iter_mut().for_each(f),
        Expr::Compare { left, ops } => {
            f(left);
            for (_, right) in ops {
                f(right);
            }
        }
        Expr::IfExp { test, body, orelse } => {
            f(test);
            f(body);
            f(orelse);
        }
        Expr::Lambda { body, .. } => f(body),
        Expr::NamedExpr { value, .. } => f(value),
        Expr::Yield(value) => {
            if let Some(value) = value {
                f(value);
            }
        }
    }
}

fn visit_generators_mut(generators: &mut [Comprehension], f: &mut dyn FnMut(&mut Expr)) {
    for generator in generators {
        f(&mut generator.iter);
        for cond in &mut generator.ifs {
            f(cond);
        }
    }
}

fn visit_fstring_parts_mut(parts: &mut [FStringPart], f: &mut dyn FnMut(&mut Expr)) {
    for part in parts {
        if let FStringPart::Field(field) = part {
            f(&mut field.expr);
            if let Some(spec) = &mut field.format_spec {
                visit_fstring_parts_mut(spec, f);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_expression, parse_module};
    use crate::printer::{print_expr, print_statements};

    fn names(list: &[&str]) -> FxHashSet<Ident> {
        list.iter().map(|n| Ident::new(n)).collect()
    }

    #[test]
    fn test_global_names() {
        let module = parse_module("def a():\n    global x, y\ndef b():\n    global x\n", 1).unwrap();
        let found: Vec<_> = global_names(&module.body).iter().map(|n| n.to_string()).collect();
        assert_eq!(found, vec!["x", "y"]);
    }

    #[test]
    fn test_assigned_names_skip_functions() {
        let module = parse_module(
            "a = 1\nfor i, j in pairs:\n    b = i\ndef f():\n    c = 2\nwith open(p) as fh:\n    pass\n",
            1,
        )
        .unwrap();
        let found: Vec<_> = assigned_names(&module.body).iter().map(|n| n.to_string()).collect();
        assert_eq!(found, vec!["a", "i", "j", "b", "fh"]);
    }

    #[test]
    fn test_assigned_names_in_match_arms_skip_captures() {
        let module = parse_module(
            "match cmd:\n    case [name, *rest]:\n        mode = name\n    case _:\n        mode = None\n",
            1,
        )
        .unwrap();
        let found: Vec<_> = assigned_names(&module.body).iter().map(|n| n.to_string()).collect();
        assert_eq!(found, vec!["mode"]);
    }

    #[test]
    fn test_insert_awaits_in_match() {
        let mut module =
            parse_module("match load():\n    case 1 if ready():\n        fetch()\n", 1).unwrap();
        insert_awaits(&mut module.body, &names(&["load", "fetch", "ready"]));
        assert_eq!(
            print_statements(&module.body),
            "match await load():\n    case 1 if await ready():\n        await fetch()\n"
        );
    }

    #[test]
    fn test_insert_awaits() {
        let mut module = parse_module("x = self.load(1)\nawait fetch()\ny = sync()\n", 1).unwrap();
        insert_awaits(&mut module.body, &names(&["load", "fetch"]));
        assert_eq!(
            print_statements(&module.body),
            "x = await self.load(1)\nawait fetch()\ny = sync()\n"
        );
    }

    #[test]
    fn test_insert_awaits_nested_argument() {
        let mut expr = parse_expression("show(load())", 1, 1).unwrap();
        insert_awaits_expr(&mut expr, &names(&["load"]));
        assert_eq!(print_expr(&expr), "show(await load())");
    }

    #[test]
    fn test_references_name() {
        let module = parse_module("handle(event.value)\n", 1).unwrap();
        assert!(references_name(&module.body, "event"));
        assert!(!references_name(&module.body, "value"));
    }

    #[test]
    fn test_visit_block_exprs_mut() {
        let mut module = parse_module("a = b\nif c:\n    d(e)\ndef f():\n    g\n", 1).unwrap();
        let mut seen = Vec::new();
        visit_block_exprs_mut(&mut module.body, &mut |expr| seen.push(print_expr(expr)));
        assert_eq!(seen, vec!["a", "b", "c", "d(e)"]);
    }
}
