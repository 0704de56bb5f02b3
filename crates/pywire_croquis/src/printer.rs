//! Source printer.
//!
//! Turns trees back into Python text. Parentheses are re-derived from
//! operator precedence, so a tree built or rewritten by later passes prints
//! correctly without tracking the original grouping. Statements are written
//! through a [`CodeWriter`] so every line keeps its source origin.

use crate::ast::*;
use pywire_carton::CodeWriter;

mod prec {
    pub const YIELD: u8 = 0;
    pub const LAMBDA: u8 = 1;
    pub const IF_EXP: u8 = 2;
    pub const OR: u8 = 3;
    pub const AND: u8 = 4;
    pub const NOT: u8 = 5;
    pub const CMP: u8 = 6;
    pub const BIT_OR: u8 = 7;
    pub const UNARY: u8 = 13;
    pub const AWAIT: u8 = 15;
    pub const PRIMARY: u8 = 16;
    pub const ATOM: u8 = 17;
}

/// Print an expression for use in an argument-like position.
pub fn print_expr(expr: &Expr) -> String {
    print_expr_prec(expr, prec::LAMBDA)
}

/// Print an expression, parenthesizing it if it binds looser than `min`.
pub fn print_expr_prec(expr: &Expr, min: u8) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr, min);
    out
}

fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Yield(_) | Expr::YieldFrom(_) => prec::YIELD,
        Expr::Lambda { .. } => prec::LAMBDA,
        Expr::IfExp { .. } => prec::IF_EXP,
        Expr::BoolOp { op: BoolOp::Or, .. } => prec::OR,
        Expr::BoolOp { op: BoolOp::And, .. } => prec::AND,
        Expr::UnaryOp { op: UnaryOp::Not, .. } => prec::NOT,
        Expr::Compare { .. } => prec::CMP,
        Expr::BinOp { op, .. } => op.precedence(),
        Expr::UnaryOp { .. } => prec::UNARY,
        Expr::Await(_) => prec::AWAIT,
        Expr::Attribute { .. } | Expr::Subscript { .. } | Expr::Call { .. } => prec::PRIMARY,
        _ => prec::ATOM,
    }
}

fn write_expr(out: &mut String, expr: &Expr, min: u8) {
    let wrap = precedence(expr) < min;
    if wrap {
        out.push('(');
    }
    write_expr_inner(out, expr);
    if wrap {
        out.push(')');
    }
}

fn write_comma_separated(out: &mut String, items: &[Expr]) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_expr(out, item, prec::LAMBDA);
    }
}

fn write_expr_inner(out: &mut String, expr: &Expr) {
    match expr {
        Expr::Name(name) => out.push_str(name),
        Expr::Constant(c) => out.push_str(match c {
            Constant::None => "None",
            Constant::True => "True",
            Constant::False => "False",
            Constant::Ellipsis => "...",
            Constant::Number(n) => n,
        }),
        Expr::Str(pieces) => {
            for (i, piece) in pieces.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                match piece {
                    StrPiece::Plain(lit) => out.push_str(&lit.raw),
                    StrPiece::Formatted(f) => write_fstring(out, f),
                }
            }
        }
        Expr::Attribute { value, attr } => {
            if matches!(**value, Expr::Constant(Constant::Number(_))) {
                out.push('(');
                write_expr_inner(out, value);
                out.push(')');
            } else {
                write_expr(out, value, prec::PRIMARY);
            }
            out.push('.');
            out.push_str(attr);
        }
        Expr::Subscript { value, slice } => {
            write_expr(out, value, prec::PRIMARY);
            out.push('[');
            match slice.as_ref() {
                Expr::Tuple(elts) if !elts.is_empty() => {
                    for (i, elt) in elts.iter().enumerate() {
                        if i > 0 {
                            out.push_str(", ");
                        }
                        write_slice_item(out, elt);
                    }
                    if elts.len() == 1 {
                        out.push(',');
                    }
                }
                other => write_slice_item(out, other),
            }
            out.push(']');
        }
        Expr::Slice { .. } => write_slice_item(out, expr),
        Expr::Call { func, args } => {
            write_expr(out, func, prec::PRIMARY);
            out.push('(');
            write_call_args(out, args);
            out.push(')');
        }
        Expr::Tuple(elts) => {
            out.push('(');
            write_comma_separated(out, elts);
            if elts.len() == 1 {
                out.push(',');
            }
            out.push(')');
        }
        Expr::List(elts) => {
            out.push('[');
            write_comma_separated(out, elts);
            out.push(']');
        }
        Expr::Set(elts) => {
            out.push('{');
            write_comma_separated(out, elts);
            out.push('}');
        }
        Expr::Dict(items) => {
            out.push('{');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                match item {
                    DictItem::Pair(k, v) => {
                        write_expr(out, k, prec::LAMBDA);
                        out.push_str(": ");
                        write_expr(out, v, prec::LAMBDA);
                    }
                    DictItem::Unpack(v) => {
                        out.push_str("**");
                        write_expr(out, v, prec::BIT_OR);
                    }
                }
            }
            out.push('}');
        }
        Expr::ListComp { elt, generators } => {
            out.push('[');
            write_expr(out, elt, prec::LAMBDA);
            write_generators(out, generators);
            out.push(']');
        }
        Expr::SetComp { elt, generators } => {
            out.push('{');
            write_expr(out, elt, prec::LAMBDA);
            write_generators(out, generators);
            out.push('}');
        }
        Expr::GeneratorExp { elt, generators } => {
            out.push('(');
            write_expr(out, elt, prec::LAMBDA);
            write_generators(out, generators);
            out.push(')');
        }
        Expr::DictComp {
            key,
            value,
            generators,
        } => {
            out.push('{');
            write_expr(out, key, prec::LAMBDA);
            out.push_str(": ");
            write_expr(out, value, prec::LAMBDA);
            write_generators(out, generators);
            out.push('}');
        }
        Expr::Starred(inner) => {
            out.push('*');
            write_expr(out, inner, prec::BIT_OR);
        }
        Expr::UnaryOp { op, operand } => {
            out.push_str(op.as_str());
            let min = if *op == UnaryOp::Not {
                prec::NOT
            } else {
                prec::UNARY
            };
            write_expr(out, operand, min);
        }
        Expr::BinOp { left, op, right } => {
            let (lmin, rmin) = if *op == BinOp::Pow {
                (prec::AWAIT, prec::UNARY)
            } else {
                (op.precedence(), op.precedence() + 1)
            };
            write_expr(out, left, lmin);
            out.push(' ');
            out.push_str(op.as_str());
            out.push(' ');
            write_expr(out, right, rmin);
        }
        Expr::BoolOp { op, values } => {
            let min = precedence(expr) + 1;
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                    out.push_str(op.as_str());
                    out.push(' ');
                }
                write_expr(out, value, min);
            }
        }
        Expr::Compare { left, ops } => {
            write_expr(out, left, prec::BIT_OR);
            for (op, right) in ops {
                out.push(' ');
                out.push_str(op.as_str());
                out.push(' ');
                write_expr(out, right, prec::BIT_OR);
            }
        }
        Expr::IfExp { test, body, orelse } => {
            write_expr(out, body, prec::OR);
            out.push_str(" if ");
            write_expr(out, test, prec::OR);
            out.push_str(" else ");
            write_expr(out, orelse, prec::LAMBDA);
        }
        Expr::Lambda { params, body } => {
            out.push_str("lambda");
            let params = print_params(params);
            if !params.is_empty() {
                out.push(' ');
                out.push_str(&params);
            }
            out.push_str(": ");
            write_expr(out, body, prec::LAMBDA);
        }
        Expr::NamedExpr { target, value } => {
            out.push('(');
            out.push_str(target);
            out.push_str(" := ");
            write_expr(out, value, prec::LAMBDA);
            out.push(')');
        }
        Expr::Await(inner) => {
            out.push_str("await ");
            write_expr(out, inner, prec::PRIMARY);
        }
        Expr::Yield(value) => {
            out.push_str("yield");
            if let Some(value) = value {
                out.push(' ');
                write_expr(out, value, prec::LAMBDA);
            }
        }
        Expr::YieldFrom(value) => {
            out.push_str("yield from ");
            write_expr(out, value, prec::LAMBDA);
        }
    }
}

fn write_slice_item(out: &mut String, expr: &Expr) {
    let Expr::Slice { lower, upper, step } = expr else {
        write_expr(out, expr, prec::LAMBDA);
        return;
    };
    if let Some(lower) = lower {
        write_expr(out, lower, prec::LAMBDA);
    }
    out.push(':');
    if let Some(upper) = upper {
        write_expr(out, upper, prec::LAMBDA);
    }
    if let Some(step) = step {
        out.push(':');
        write_expr(out, step, prec::LAMBDA);
    }
}

fn write_call_args(out: &mut String, args: &[CallArg]) {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        match arg {
            CallArg::Positional(e) => write_expr(out, e, prec::LAMBDA),
            CallArg::Starred(e) => {
                out.push('*');
                write_expr(out, e, prec::BIT_OR);
            }
            CallArg::Keyword { name, value } => {
                out.push_str(name);
                out.push('=');
                write_expr(out, value, prec::LAMBDA);
            }
            CallArg::DoubleStarred(e) => {
                out.push_str("**");
                write_expr(out, e, prec::BIT_OR);
            }
        }
    }
}

fn write_generators(out: &mut String, generators: &[Comprehension]) {
    for generator in generators {
        out.push_str(if generator.is_async {
            " async for "
        } else {
            " for "
        });
        write_expr(out, &generator.target, prec::BIT_OR);
        out.push_str(" in ");
        write_expr(out, &generator.iter, prec::OR);
        for cond in &generator.ifs {
            out.push_str(" if ");
            write_expr(out, cond, prec::OR);
        }
    }
}

fn write_fstring(out: &mut String, fstring: &FString) {
    out.push_str(&fstring.prefix);
    out.push_str(&fstring.quote);
    write_fstring_parts(out, &fstring.parts);
    out.push_str(&fstring.quote);
}

fn write_fstring_parts(out: &mut String, parts: &[FStringPart]) {
    for part in parts {
        match part {
            FStringPart::Literal(text) => out.push_str(text),
            FStringPart::Field(field) => {
                out.push('{');
                let text = print_expr_prec(&field.expr, prec::IF_EXP);
                if text.starts_with('{') {
                    out.push(' ');
                }
                out.push_str(&text);
                if let Some(debug) = &field.debug {
                    out.push_str(debug);
                }
                if let Some(conversion) = field.conversion {
                    out.push('!');
                    out.push(conversion);
                }
                if let Some(spec) = &field.format_spec {
                    out.push(':');
                    write_fstring_parts(out, spec);
                }
                out.push('}');
            }
        }
    }
}

/// Parameter list without the surrounding parentheses.
pub fn print_params(params: &Parameters) -> String {
    let mut out = String::new();
    for (i, item) in params.items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        match item {
            ParamItem::Param(p) => write_param(&mut out, p),
            ParamItem::PositionalOnly => out.push('/'),
            ParamItem::KeywordOnly => out.push('*'),
            ParamItem::VarArgs(p) => {
                out.push('*');
                write_param(&mut out, p);
            }
            ParamItem::KwArgs(p) => {
                out.push_str("**");
                write_param(&mut out, p);
            }
        }
    }
    out
}

fn write_param(out: &mut String, param: &Param) {
    out.push_str(&param.name);
    if let Some(annotation) = &param.annotation {
        out.push_str(": ");
        write_expr(out, annotation, prec::LAMBDA);
    }
    if let Some(default) = &param.default {
        out.push_str(if param.annotation.is_some() {
            " = "
        } else {
            "="
        });
        write_expr(out, default, prec::LAMBDA);
    }
}

fn origin(line: u32) -> Option<u32> {
    (line > 0).then_some(line)
}

fn join_exprs(exprs: &[Expr], min: u8) -> String {
    exprs
        .iter()
        .map(|e| print_expr_prec(e, min))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Write a block, emitting `pass` for an empty one.
pub fn print_block(w: &mut CodeWriter, body: &[Stmt]) {
    if body.is_empty() {
        w.line("pass", None);
        return;
    }
    for stmt in body {
        print_stmt(w, stmt);
    }
}

fn print_suite(w: &mut CodeWriter, header: &str, line: Option<u32>, body: &[Stmt]) {
    w.line(header, line);
    w.indent();
    print_block(w, body);
    w.dedent();
}

pub fn print_stmt(w: &mut CodeWriter, stmt: &Stmt) {
    let line = origin(stmt.line);
    match &stmt.kind {
        StmtKind::Expr(e) => w.line(&print_expr_prec(e, prec::YIELD), line),
        StmtKind::Assign { targets, value } => {
            let mut text = String::new();
            for target in targets {
                write_expr(&mut text, target, prec::LAMBDA);
                text.push_str(" = ");
            }
            write_expr(&mut text, value, prec::YIELD);
            w.line(&text, line);
        }
        StmtKind::AugAssign { target, op, value } => {
            let text = format!(
                "{} {}= {}",
                print_expr(target),
                op.as_str(),
                print_expr_prec(value, prec::YIELD)
            );
            w.line(&text, line);
        }
        StmtKind::AnnAssign {
            target,
            annotation,
            value,
        } => {
            let mut text = format!("{}: {}", print_expr(target), print_expr(annotation));
            if let Some(value) = value {
                text.push_str(" = ");
                text.push_str(&print_expr_prec(value, prec::YIELD));
            }
            w.line(&text, line);
        }
        StmtKind::Return(value) => match value {
            Some(v) => w.line(&format!("return {}", print_expr(v)), line),
            None => w.line("return", line),
        },
        StmtKind::Raise { exc, cause } => {
            let mut text = String::from("raise");
            if let Some(exc) = exc {
                text.push(' ');
                text.push_str(&print_expr(exc));
            }
            if let Some(cause) = cause {
                text.push_str(" from ");
                text.push_str(&print_expr(cause));
            }
            w.line(&text, line);
        }
        StmtKind::Pass => w.line("pass", line),
        StmtKind::Break => w.line("break", line),
        StmtKind::Continue => w.line("continue", line),
        StmtKind::Global(names) => w.line(&format!("global {}", names.join(", ")), line),
        StmtKind::Nonlocal(names) => w.line(&format!("nonlocal {}", names.join(", ")), line),
        StmtKind::Delete(targets) => {
            w.line(&format!("del {}", join_exprs(targets, prec::BIT_OR)), line)
        }
        StmtKind::Assert { test, msg } => {
            let mut text = format!("assert {}", print_expr(test));
            if let Some(msg) = msg {
                text.push_str(", ");
                text.push_str(&print_expr(msg));
            }
            w.line(&text, line);
        }
        StmtKind::Import(names) => {
            w.line(&format!("import {}", print_aliases(names)), line);
        }
        StmtKind::ImportFrom {
            module,
            names,
            level,
        } => {
            let dots = ".".repeat(*level as usize);
            let module = module.as_deref().unwrap_or("");
            let text = format!("from {}{} import {}", dots, module, print_aliases(names));
            w.line(&text, line);
        }
        StmtKind::If { branches, orelse } => {
            for (i, branch) in branches.iter().enumerate() {
                let keyword = if i == 0 { "if" } else { "elif" };
                let header = format!("{} {}:", keyword, print_expr(&branch.test));
                print_suite(w, &header, origin(branch.line), &branch.body);
            }
            if let Some(orelse) = orelse {
                print_suite(w, "else:", None, orelse);
            }
        }
        StmtKind::While { test, body, orelse } => {
            print_suite(w, &format!("while {}:", print_expr(test)), line, body);
            if let Some(orelse) = orelse {
                print_suite(w, "else:", None, orelse);
            }
        }
        StmtKind::For {
            target,
            iter,
            body,
            orelse,
            is_async,
        } => {
            let header = format!(
                "{}for {} in {}:",
                if *is_async { "async " } else { "" },
                print_expr_prec(target, prec::BIT_OR),
                print_expr(iter)
            );
            print_suite(w, &header, line, body);
            if let Some(orelse) = orelse {
                print_suite(w, "else:", None, orelse);
            }
        }
        StmtKind::With {
            items,
            body,
            is_async,
        } => {
            let items = items
                .iter()
                .map(|item| match &item.vars {
                    Some(vars) => format!("{} as {}", print_expr(&item.context), print_expr(vars)),
                    None => print_expr(&item.context),
                })
                .collect::<Vec<_>>()
                .join(", ");
            let header = format!("{}with {}:", if *is_async { "async " } else { "" }, items);
            print_suite(w, &header, line, body);
        }
        StmtKind::Try {
            body,
            handlers,
            orelse,
            finalbody,
        } => {
            print_suite(w, "try:", line, body);
            for handler in handlers {
                let mut header = String::from(if handler.is_star { "except*" } else { "except" });
                if let Some(typ) = &handler.typ {
                    header.push(' ');
                    header.push_str(&print_expr(typ));
                }
                if let Some(name) = &handler.name {
                    header.push_str(" as ");
                    header.push_str(name);
                }
                header.push(':');
                print_suite(w, &header, origin(handler.line), &handler.body);
            }
            if let Some(orelse) = orelse {
                print_suite(w, "else:", None, orelse);
            }
            if let Some(finalbody) = finalbody {
                print_suite(w, "finally:", None, finalbody);
            }
        }
        StmtKind::Match { subject, cases } => {
            w.line(&format!("match {}:", print_expr(subject)), line);
            w.indent();
            for case in cases {
                let mut header = String::from("case ");
                write_pattern(&mut header, &case.pattern, true);
                if let Some(guard) = &case.guard {
                    header.push_str(" if ");
                    header.push_str(&print_expr(guard));
                }
                header.push(':');
                print_suite(w, &header, origin(case.line), &case.body);
            }
            w.dedent();
        }
        StmtKind::TypeAlias {
            name,
            type_params,
            value,
        } => {
            let text = format!(
                "type {}{} = {}",
                name,
                print_type_params(type_params),
                print_expr(value)
            );
            w.line(&text, line);
        }
        StmtKind::FunctionDef(def) => print_function(w, def),
        StmtKind::ClassDef(class) => {
            for decorator in &class.decorators {
                w.line(&format!("@{}", print_expr(&decorator.expr)), origin(decorator.line));
            }
            let mut header = format!("class {}{}", class.name, print_type_params(&class.type_params));
            if !class.bases.is_empty() {
                let mut args = String::new();
                write_call_args(&mut args, &class.bases);
                header.push('(');
                header.push_str(&args);
                header.push(')');
            }
            header.push(':');
            print_suite(w, &header, origin(class.line), &class.body);
        }
    }
}

/// Write a function definition including its decorators.
pub fn print_function(w: &mut CodeWriter, def: &FunctionDef) {
    for decorator in &def.decorators {
        w.line(&format!("@{}", print_expr(&decorator.expr)), origin(decorator.line));
    }
    let mut header = format!(
        "{}def {}{}({})",
        if def.is_async { "async " } else { "" },
        def.name,
        print_type_params(&def.type_params),
        print_params(&def.params)
    );
    if let Some(returns) = &def.returns {
        header.push_str(" -> ");
        header.push_str(&print_expr(returns));
    }
    header.push(':');
    print_suite(w, &header, origin(def.line), &def.body);
}

/// `[T: bound = default, *Ts, **P]`, or nothing for an empty list.
fn print_type_params(params: &[TypeParam]) -> String {
    if params.is_empty() {
        return String::new();
    }
    let items = params
        .iter()
        .map(|param| {
            let mut text = String::from(match param.kind {
                TypeParamKind::TypeVar => "",
                TypeParamKind::TypeVarTuple => "*",
                TypeParamKind::ParamSpec => "**",
            });
            text.push_str(&param.name);
            if let Some(bound) = &param.bound {
                text.push_str(": ");
                text.push_str(&print_expr(bound));
            }
            if let Some(default) = &param.default {
                text.push_str(" = ");
                text.push_str(&print_expr(default));
            }
            text
        })
        .collect::<Vec<_>>();
    format!("[{}]", items.join(", "))
}

/// `top` allows an open sequence (`case a, b:`) without brackets; nested
/// sequences always print as `[...]`.
fn write_pattern(out: &mut String, pattern: &Pattern, top: bool) {
    match pattern {
        Pattern::Value(value) => write_expr(out, value, prec::BIT_OR + 1),
        Pattern::As { pattern, name } => {
            let name = name.as_deref().unwrap_or("_");
            if let Some(pattern) = pattern {
                let wrap = matches!(**pattern, Pattern::As { pattern: Some(_), .. });
                if wrap {
                    out.push('(');
                }
                write_pattern(out, pattern, false);
                if wrap {
                    out.push(')');
                }
                out.push_str(" as ");
            }
            out.push_str(name);
        }
        Pattern::Star(name) => {
            out.push('*');
            out.push_str(name.as_deref().unwrap_or("_"));
        }
        Pattern::Sequence(items) if top && !items.is_empty() => {
            write_patterns(out, items);
            if items.len() == 1 {
                out.push(',');
            }
        }
        Pattern::Sequence(items) => {
            out.push('[');
            write_patterns(out, items);
            out.push(']');
        }
        Pattern::Mapping { items, rest } => {
            out.push('{');
            for (i, (key, value)) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_expr(out, key, prec::BIT_OR + 1);
                out.push_str(": ");
                write_pattern(out, value, false);
            }
            if let Some(rest) = rest {
                if !items.is_empty() {
                    out.push_str(", ");
                }
                out.push_str("**");
                out.push_str(rest);
            }
            out.push('}');
        }
        Pattern::Class {
            cls,
            patterns,
            keywords,
        } => {
            write_expr(out, cls, prec::PRIMARY);
            out.push('(');
            write_patterns(out, patterns);
            for (i, (name, value)) in keywords.iter().enumerate() {
                if i > 0 || !patterns.is_empty() {
                    out.push_str(", ");
                }
                out.push_str(name);
                out.push('=');
                write_pattern(out, value, false);
            }
            out.push(')');
        }
        Pattern::Or(alternatives) => {
            for (i, alternative) in alternatives.iter().enumerate() {
                if i > 0 {
                    out.push_str(" | ");
                }
                let wrap = matches!(
                    alternative,
                    Pattern::Or(_) | Pattern::As { pattern: Some(_), .. }
                );
                if wrap {
                    out.push('(');
                }
                write_pattern(out, alternative, false);
                if wrap {
                    out.push(')');
                }
            }
        }
    }
}

fn write_patterns(out: &mut String, patterns: &[Pattern]) {
    for (i, pattern) in patterns.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        write_pattern(out, pattern, false);
    }
}

fn print_aliases(names: &[Alias]) -> String {
    names
        .iter()
        .map(|alias| match &alias.asname {
            Some(asname) => format!("{} as {}", alias.name, asname),
            None => alias.name.to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Print statements to a string (no line map).
pub fn print_statements(body: &[Stmt]) -> String {
    let mut w = CodeWriter::new();
    print_block(&mut w, body);
    w.finish().0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_expression, parse_module};

    fn roundtrip_expr(src: &str) -> String {
        print_expr(&parse_expression(src, 1, 1).unwrap())
    }

    fn roundtrip(src: &str) -> String {
        print_statements(&parse_module(src, 1).unwrap().body)
    }

    #[test]
    fn test_precedence_parentheses() {
        assert_eq!(roundtrip_expr("(a + b) * c"), "(a + b) * c");
        assert_eq!(roundtrip_expr("a + b * c"), "a + b * c");
        assert_eq!(roundtrip_expr("a - (b - c)"), "a - (b - c)");
        assert_eq!(roundtrip_expr("(-x) ** 2"), "(-x) ** 2");
        assert_eq!(roundtrip_expr("-x ** 2"), "-x ** 2");
        assert_eq!(roundtrip_expr("not (a and b) or c"), "not (a and b) or c");
        assert_eq!(roundtrip_expr("(a if b else c).d"), "(a if b else c).d");
    }

    #[test]
    fn test_tuples_and_subscripts() {
        assert_eq!(roundtrip_expr("a, b"), "(a, b)");
        assert_eq!(roundtrip_expr("(a,)"), "(a,)");
        assert_eq!(roundtrip_expr("m[1, 2]"), "m[1, 2]");
        assert_eq!(roundtrip_expr("s[1:-1]"), "s[1:-1]");
        assert_eq!(roundtrip_expr("s[::2]"), "s[::2]");
        assert_eq!(roundtrip_expr("1 .real"), "(1).real");
    }

    #[test]
    fn test_calls_and_comprehensions() {
        assert_eq!(
            roundtrip_expr("f(a, *b, c=1, **d)"),
            "f(a, *b, c=1, **d)"
        );
        assert_eq!(roundtrip_expr("sum(x for x in xs)"), "sum((x for x in xs))");
        assert_eq!(
            roundtrip_expr("{k: v for k, v in d.items() if v}"),
            "{k: v for (k, v) in d.items() if v}"
        );
        assert_eq!(roundtrip_expr("(y := 5)"), "(y := 5)");
    }

    #[test]
    fn test_fstring_roundtrip() {
        assert_eq!(roundtrip_expr("f'{a!r:>10} {b}'"), "f'{a!r:>10} {b}'");
        assert_eq!(roundtrip_expr("f'{ {1: 2}[1] }'"), "f'{ {1: 2}[1]}'");
        assert_eq!(roundtrip_expr("'a' 'b'"), "'a' 'b'");
    }

    #[test]
    fn test_statements() {
        let src = "\
@deco
async def f(self, x: int = 1, *args, **kw) -> None:
    global g
    for (a, b) in pairs:
        if a:
            continue
        elif b:
            break
        else:
            pass
    try:
        await g()
    except ValueError as e:
        raise RuntimeError() from e
    finally:
        del x
";
        insta::assert_snapshot!(roundtrip(src));
    }

    #[test]
    fn test_match_roundtrip() {
        let src = "\
match event:
    case Click(position=[x, y]) if x > 0:
        handle(x, y)
    case {'type': 'key', **rest}:
        pass
    case [1 | 2 as n, *_]:
        pass
    case -1 | 1 + 2j | Color.RED:
        pass
    case first, *others:
        pass
    case _:
        pass
";
        assert_eq!(roundtrip(src), src);
    }

    #[test]
    fn test_type_params_roundtrip() {
        let src = "\
type Vec[T: (int, float) = int] = list[T]
def apply[**P, R](f: Callable[P, R], *args: P.args) -> R:
    return f(*args)
class Stack[*Ts](Generic):
    pass
";
        assert_eq!(roundtrip(src), src);
    }

    #[test]
    fn test_parenthesized_with_prints_flat() {
        assert_eq!(
            roundtrip("with (\n    a() as x,\n    b() as y,\n):\n    pass\n"),
            "with a() as x, b() as y:\n    pass\n"
        );
    }

    #[test]
    fn test_line_origins() {
        let module = parse_module("x = 1\n\nif x:\n    y = 2\n", 5).unwrap();
        let mut w = CodeWriter::new();
        print_block(&mut w, &module.body);
        let (code, map) = w.finish();
        assert_eq!(code, "x = 1\nif x:\n    y = 2\n");
        assert_eq!(map.source_line(1), Some(5));
        assert_eq!(map.source_line(2), Some(7));
        assert_eq!(map.source_line(3), Some(8));
    }
}
