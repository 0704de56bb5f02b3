//! Recursive descent parser for the embedded Python subset.
//!
//! Covers the Python 3.12 statement and expression grammar, including the
//! soft-keyword statements (`match`, `type`). Soft keywords are plain names
//! to the lexer; the parser recognises them by lookahead and falls back to
//! an ordinary statement when the lookahead does not fit.

use crate::ast::*;
use crate::builtins::is_keyword;
use crate::error::{PyResult, PySyntaxError};
use crate::lexer::{tokenize, tokenize_expression};
use crate::token::{StringToken, Token, TokenKind};

/// Parse a block of statements starting at absolute line `first_line`.
pub fn parse_module(source: &str, first_line: u32) -> PyResult<Module> {
    let tokens = tokenize(source, first_line)?;
    let mut parser = Parser::new(tokens);
    let body = parser.parse_file()?;
    Ok(Module { body })
}

/// Parse a single expression (a bare tuple is allowed).
pub fn parse_expression(source: &str, line: u32, column: u32) -> PyResult<Expr> {
    let tokens = tokenize_expression(source, line, column)?;
    let mut parser = Parser::new(tokens);
    if !parser.starts_expr() {
        return Err(parser.error("expected an expression"));
    }
    let expr = parser.parse_testlist_star_expr()?;
    parser.expect_eof()?;
    Ok(expr)
}

/// Parse a loop header of the form `target in iterable`.
pub fn parse_for_header(source: &str, line: u32, column: u32) -> PyResult<(Expr, Expr)> {
    let tokens = tokenize_expression(source, line, column)?;
    let mut parser = Parser::new(tokens);
    let target = parser.parse_target_list()?;
    validate_target(&target, line, column)?;
    parser.expect_kw("in")?;
    let iter = parser.parse_testlist_star_expr()?;
    parser.expect_eof()?;
    Ok((target, iter))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    eof: Token,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        let eof = tokens.last().cloned().unwrap_or(Token {
            kind: TokenKind::EndOfFile,
            line: 1,
            column: 1,
        });
        Self {
            tokens,
            pos: 0,
            eof,
        }
    }

    // ---- token helpers -------------------------------------------------

    #[inline]
    fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    #[inline]
    fn peek_at(&self, n: usize) -> &Token {
        self.tokens.get(self.pos + n).unwrap_or(&self.eof)
    }

    fn bump(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    #[inline]
    fn check_op(&self, op: &str) -> bool {
        self.peek().is_op(op)
    }

    #[inline]
    fn check_kw(&self, kw: &str) -> bool {
        self.peek().is_keyword(kw)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.check_op(op) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn eat_kw(&mut self, kw: &str) -> bool {
        if self.check_kw(kw) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> PyResult<Token> {
        if self.check_op(op) {
            Ok(self.bump())
        } else {
            Err(self.error(format!("expected '{}', found {}", op, self.peek().describe())))
        }
    }

    fn expect_kw(&mut self, kw: &str) -> PyResult<Token> {
        if self.check_kw(kw) {
            Ok(self.bump())
        } else {
            Err(self.error(format!("expected '{}', found {}", kw, self.peek().describe())))
        }
    }

    fn expect_name(&mut self) -> PyResult<Ident> {
        match &self.peek().kind {
            TokenKind::Name(n) if !is_keyword(n) => {
                let name = n.clone();
                self.bump();
                Ok(name)
            }
            _ => Err(self.invalid_syntax()),
        }
    }

    fn expect_eof(&self) -> PyResult<()> {
        if matches!(self.peek().kind, TokenKind::EndOfFile) {
            Ok(())
        } else {
            Err(self.invalid_syntax())
        }
    }

    fn error(&self, message: impl Into<String>) -> PySyntaxError {
        let tok = self.peek();
        PySyntaxError::new(tok.line, tok.column, message)
    }

    fn invalid_syntax(&self) -> PySyntaxError {
        self.error("invalid syntax")
    }

    fn keyword(&self) -> Option<Ident> {
        match &self.peek().kind {
            TokenKind::Name(n) if is_keyword(n) => Some(n.clone()),
            _ => None,
        }
    }

    fn at_stmt_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Newline | TokenKind::EndOfFile) || self.check_op(";")
    }

    fn starts_expr(&self) -> bool {
        match &self.peek().kind {
            TokenKind::Name(n) => {
                !is_keyword(n)
                    || matches!(
                        n.as_str(),
                        "None" | "True" | "False" | "not" | "lambda" | "await" | "yield"
                    )
            }
            TokenKind::Number(_) | TokenKind::String(_) => true,
            TokenKind::Op(op) => matches!(*op, "(" | "[" | "{" | "-" | "+" | "~" | "*" | "..."),
            _ => false,
        }
    }

    fn at_comp_for(&self) -> bool {
        self.check_kw("for") || (self.check_kw("async") && self.peek_at(1).is_keyword("for"))
    }

    // ---- statements ----------------------------------------------------

    fn parse_file(&mut self) -> PyResult<Block> {
        let mut body = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::EndOfFile => break,
                TokenKind::Newline => {
                    self.bump();
                }
                TokenKind::Indent => return Err(self.error("unexpected indent")),
                _ => body.extend(self.parse_statement()?),
            }
        }
        Ok(body)
    }

    fn parse_statement(&mut self) -> PyResult<Vec<Stmt>> {
        let line = self.peek().line;
        if let Some(kw) = self.keyword() {
            let stmt = match kw.as_str() {
                "if" => Some(self.parse_if()?),
                "while" => Some(self.parse_while()?),
                "for" => Some(self.parse_for(false, line)?),
                "try" => Some(self.parse_try()?),
                "with" => Some(self.parse_with(false, line)?),
                "def" => Some(self.parse_def(Vec::new(), false)?),
                "class" => Some(self.parse_class(Vec::new())?),
                "async" => {
                    self.bump();
                    if self.check_kw("def") {
                        Some(self.parse_def(Vec::new(), true)?)
                    } else if self.check_kw("for") {
                        Some(self.parse_for(true, line)?)
                    } else if self.check_kw("with") {
                        Some(self.parse_with(true, line)?)
                    } else {
                        return Err(self.invalid_syntax());
                    }
                }
                _ => None,
            };
            if let Some(stmt) = stmt {
                return Ok(vec![stmt]);
            }
        }
        if self.check_kw("match") {
            if let Some(stmt) = self.parse_match()? {
                return Ok(vec![stmt]);
            }
        }
        if self.check_op("@") {
            return Ok(vec![self.parse_decorated()?]);
        }
        self.parse_simple_statements()
    }

    fn parse_simple_statements(&mut self) -> PyResult<Vec<Stmt>> {
        let mut stmts = vec![self.parse_small_statement()?];
        while self.eat_op(";") {
            if matches!(self.peek().kind, TokenKind::Newline | TokenKind::EndOfFile) {
                break;
            }
            stmts.push(self.parse_small_statement()?);
        }
        match self.peek().kind {
            TokenKind::Newline => {
                self.bump();
            }
            TokenKind::EndOfFile => {}
            _ => return Err(self.invalid_syntax()),
        }
        Ok(stmts)
    }

    fn parse_small_statement(&mut self) -> PyResult<Stmt> {
        let line = self.peek().line;
        let kind = match self.keyword().as_deref() {
            Some("pass") => {
                self.bump();
                StmtKind::Pass
            }
            Some("break") => {
                self.bump();
                StmtKind::Break
            }
            Some("continue") => {
                self.bump();
                StmtKind::Continue
            }
            Some("return") => {
                self.bump();
                let value = if self.at_stmt_end() {
                    None
                } else {
                    Some(self.parse_testlist_star_expr()?)
                };
                StmtKind::Return(value)
            }
            Some("raise") => {
                self.bump();
                if self.at_stmt_end() {
                    StmtKind::Raise {
                        exc: None,
                        cause: None,
                    }
                } else {
                    let exc = self.parse_test()?;
                    let cause = if self.eat_kw("from") {
                        Some(self.parse_test()?)
                    } else {
                        None
                    };
                    StmtKind::Raise {
                        exc: Some(exc),
                        cause,
                    }
                }
            }
            Some("global") => {
                self.bump();
                StmtKind::Global(self.parse_name_list()?)
            }
            Some("nonlocal") => {
                self.bump();
                StmtKind::Nonlocal(self.parse_name_list()?)
            }
            Some("del") => {
                self.bump();
                let mut targets = vec![self.parse_bitor()?];
                while self.eat_op(",") {
                    if self.at_stmt_end() {
                        break;
                    }
                    targets.push(self.parse_bitor()?);
                }
                StmtKind::Delete(targets)
            }
            Some("assert") => {
                self.bump();
                let test = self.parse_test()?;
                let msg = if self.eat_op(",") {
                    Some(self.parse_test()?)
                } else {
                    None
                };
                StmtKind::Assert { test, msg }
            }
            Some("import") => {
                self.bump();
                let mut names = vec![self.parse_alias(true)?];
                while self.eat_op(",") {
                    names.push(self.parse_alias(true)?);
                }
                StmtKind::Import(names)
            }
            Some("from") => self.parse_from_import()?,
            _ if self.at_type_alias() => self.parse_type_alias()?,
            _ => self.parse_expr_statement()?,
        };
        Ok(Stmt::new(kind, line))
    }

    /// `type` followed by a name and `=` or `[`.
    fn at_type_alias(&self) -> bool {
        self.check_kw("type")
            && matches!(&self.peek_at(1).kind, TokenKind::Name(n) if !is_keyword(n))
            && (self.peek_at(2).is_op("=") || self.peek_at(2).is_op("["))
    }

    fn parse_type_alias(&mut self) -> PyResult<StmtKind> {
        self.bump();
        let name = self.expect_name()?;
        let type_params = self.parse_type_params()?;
        self.expect_op("=")?;
        let value = self.parse_test()?;
        Ok(StmtKind::TypeAlias {
            name,
            type_params,
            value,
        })
    }

    /// Optional `[T, *Ts, **P]` after a definition name.
    fn parse_type_params(&mut self) -> PyResult<Vec<TypeParam>> {
        if !self.eat_op("[") {
            return Ok(Vec::new());
        }
        let mut params = Vec::new();
        while !self.check_op("]") {
            let kind = if self.eat_op("**") {
                TypeParamKind::ParamSpec
            } else if self.eat_op("*") {
                TypeParamKind::TypeVarTuple
            } else {
                TypeParamKind::TypeVar
            };
            let name = self.expect_name()?;
            let bound = if kind == TypeParamKind::TypeVar && self.eat_op(":") {
                Some(self.parse_test()?)
            } else {
                None
            };
            let default = if self.eat_op("=") {
                Some(self.parse_test()?)
            } else {
                None
            };
            params.push(TypeParam {
                kind,
                name,
                bound,
                default,
            });
            if !self.eat_op(",") {
                break;
            }
        }
        if params.is_empty() {
            return Err(self.error("type parameter list cannot be empty"));
        }
        self.expect_op("]")?;
        Ok(params)
    }

    fn parse_name_list(&mut self) -> PyResult<Vec<Ident>> {
        let mut names = vec![self.expect_name()?];
        while self.eat_op(",") {
            names.push(self.expect_name()?);
        }
        Ok(names)
    }

    fn parse_dotted_name(&mut self) -> PyResult<Ident> {
        let mut name = self.expect_name()?;
        while self.eat_op(".") {
            name.push('.');
            name.push_str(&self.expect_name()?);
        }
        Ok(name)
    }

    fn parse_alias(&mut self, dotted: bool) -> PyResult<Alias> {
        let name = if dotted {
            self.parse_dotted_name()?
        } else {
            self.expect_name()?
        };
        let asname = if self.eat_kw("as") {
            Some(self.expect_name()?)
        } else {
            None
        };
        Ok(Alias { name, asname })
    }

    fn parse_from_import(&mut self) -> PyResult<StmtKind> {
        self.bump();
        let mut level = 0;
        loop {
            if self.eat_op(".") {
                level += 1;
            } else if self.eat_op("...") {
                level += 3;
            } else {
                break;
            }
        }
        let module = if self.check_kw("import") {
            None
        } else {
            Some(self.parse_dotted_name()?)
        };
        if module.is_none() && level == 0 {
            return Err(self.invalid_syntax());
        }
        self.expect_kw("import")?;

        let names = if self.eat_op("*") {
            vec![Alias {
                name: Ident::new("*"),
                asname: None,
            }]
        } else {
            let parenthesized = self.eat_op("(");
            let mut names = vec![self.parse_alias(false)?];
            while self.eat_op(",") {
                if parenthesized && self.check_op(")") {
                    break;
                }
                names.push(self.parse_alias(false)?);
            }
            if parenthesized {
                self.expect_op(")")?;
            }
            names
        };

        Ok(StmtKind::ImportFrom {
            module,
            names,
            level,
        })
    }

    fn parse_expr_statement(&mut self) -> PyResult<StmtKind> {
        let first = if self.check_kw("yield") {
            self.parse_yield()?
        } else {
            self.parse_testlist_star_expr()?
        };

        if self.check_op(":") {
            let (line, column) = (self.peek().line, self.peek().column);
            self.bump();
            validate_target(&first, line, column)?;
            let annotation = self.parse_test()?;
            let value = if self.eat_op("=") {
                Some(self.parse_assign_value()?)
            } else {
                None
            };
            return Ok(StmtKind::AnnAssign {
                target: first,
                annotation,
                value,
            });
        }

        let aug = match &self.peek().kind {
            TokenKind::Op(op) if op.len() > 1 => BinOp::from_augmented(op),
            _ => None,
        };
        if let Some(op) = aug {
            let (line, column) = (self.peek().line, self.peek().column);
            self.bump();
            if matches!(first, Expr::Tuple(_) | Expr::List(_) | Expr::Starred(_)) {
                return Err(PySyntaxError::new(
                    line,
                    column,
                    "illegal expression for augmented assignment",
                ));
            }
            validate_target(&first, line, column)?;
            let value = self.parse_assign_value()?;
            return Ok(StmtKind::AugAssign {
                target: first,
                op,
                value,
            });
        }

        if self.check_op("=") {
            let mut targets = vec![first];
            let value = loop {
                let (line, column) = (self.peek().line, self.peek().column);
                self.expect_op("=")?;
                if let Some(last) = targets.last() {
                    validate_target(last, line, column)?;
                }
                let value = self.parse_assign_value()?;
                if self.check_op("=") {
                    targets.push(value);
                } else {
                    break value;
                }
            };
            return Ok(StmtKind::Assign { targets, value });
        }

        Ok(StmtKind::Expr(first))
    }

    fn parse_assign_value(&mut self) -> PyResult<Expr> {
        if self.check_kw("yield") {
            self.parse_yield()
        } else {
            self.parse_testlist_star_expr()
        }
    }

    fn parse_block(&mut self) -> PyResult<Block> {
        self.expect_op(":")?;
        if !matches!(self.peek().kind, TokenKind::Newline) {
            return self.parse_simple_statements();
        }
        self.bump();
        if !matches!(self.peek().kind, TokenKind::Indent) {
            return Err(self.error("expected an indented block"));
        }
        self.bump();

        let mut body = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::Dedent => {
                    self.bump();
                    break;
                }
                TokenKind::EndOfFile => break,
                TokenKind::Newline => {
                    self.bump();
                }
                TokenKind::Indent => return Err(self.error("unexpected indent")),
                _ => body.extend(self.parse_statement()?),
            }
        }
        Ok(body)
    }

    fn parse_else_block(&mut self) -> PyResult<Option<Block>> {
        if self.eat_kw("else") {
            Ok(Some(self.parse_block()?))
        } else {
            Ok(None)
        }
    }

    fn parse_if(&mut self) -> PyResult<Stmt> {
        let line = self.bump().line;
        let test = self.parse_namedexpr_test()?;
        let body = self.parse_block()?;
        let mut branches = vec![IfBranch { test, body, line }];
        let mut orelse = None;
        loop {
            if self.check_kw("elif") {
                let line = self.bump().line;
                let test = self.parse_namedexpr_test()?;
                let body = self.parse_block()?;
                branches.push(IfBranch { test, body, line });
            } else {
                if self.check_kw("else") {
                    orelse = self.parse_else_block()?;
                }
                break;
            }
        }
        Ok(Stmt::new(StmtKind::If { branches, orelse }, line))
    }

    fn parse_while(&mut self) -> PyResult<Stmt> {
        let line = self.bump().line;
        let test = self.parse_namedexpr_test()?;
        let body = self.parse_block()?;
        let orelse = self.parse_else_block()?;
        Ok(Stmt::new(StmtKind::While { test, body, orelse }, line))
    }

    fn parse_for(&mut self, is_async: bool, line: u32) -> PyResult<Stmt> {
        self.expect_kw("for")?;
        let (tline, tcol) = (self.peek().line, self.peek().column);
        let target = self.parse_target_list()?;
        validate_target(&target, tline, tcol)?;
        self.expect_kw("in")?;
        let iter = self.parse_testlist_star_expr()?;
        let body = self.parse_block()?;
        let orelse = self.parse_else_block()?;
        Ok(Stmt::new(
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
                is_async,
            },
            line,
        ))
    }

    fn parse_try(&mut self) -> PyResult<Stmt> {
        let line = self.bump().line;
        let body = self.parse_block()?;
        let mut handlers = Vec::new();
        while self.check_kw("except") {
            let hline = self.bump().line;
            let is_star = self.eat_op("*");
            let (typ, name) = if self.check_op(":") {
                (None, None)
            } else {
                let typ = self.parse_test()?;
                let name = if self.eat_kw("as") {
                    Some(self.expect_name()?)
                } else {
                    None
                };
                (Some(typ), name)
            };
            let body = self.parse_block()?;
            handlers.push(ExceptHandler {
                typ,
                name,
                body,
                is_star,
                line: hline,
            });
        }
        let orelse = if handlers.is_empty() {
            None
        } else {
            self.parse_else_block()?
        };
        let finalbody = if self.eat_kw("finally") {
            Some(self.parse_block()?)
        } else {
            None
        };
        if handlers.is_empty() && finalbody.is_none() {
            return Err(self.error("expected 'except' or 'finally' block"));
        }
        Ok(Stmt::new(
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            },
            line,
        ))
    }

    fn parse_with(&mut self, is_async: bool, line: u32) -> PyResult<Stmt> {
        self.expect_kw("with")?;
        let items = match self.parse_parenthesized_with_items() {
            Some(items) => items,
            None => self.parse_with_items(false)?,
        };
        let body = self.parse_block()?;
        Ok(Stmt::new(
            StmtKind::With {
                items,
                body,
                is_async,
            },
            line,
        ))
    }

    fn parse_with_items(&mut self, parenthesized: bool) -> PyResult<Vec<WithItem>> {
        let mut items = Vec::new();
        loop {
            let context = self.parse_test()?;
            let vars = if self.eat_kw("as") {
                let (tline, tcol) = (self.peek().line, self.peek().column);
                let target = self.parse_star_or_bitor()?;
                validate_target(&target, tline, tcol)?;
                Some(target)
            } else {
                None
            };
            items.push(WithItem { context, vars });
            if !self.eat_op(",") || (parenthesized && self.check_op(")")) {
                break;
            }
        }
        Ok(items)
    }

    /// `with (a as x, b as y):`. Returns `None`, with the position restored,
    /// when the parenthesis belongs to the first context expression instead
    /// (`with (a) as x:`).
    fn parse_parenthesized_with_items(&mut self) -> Option<Vec<WithItem>> {
        if !self.check_op("(") {
            return None;
        }
        let start = self.pos;
        self.bump();
        match self.parse_with_items(true) {
            Ok(items) if self.check_op(")") && self.peek_at(1).is_op(":") => {
                self.bump();
                Some(items)
            }
            _ => {
                self.pos = start;
                None
            }
        }
    }

    /// `match subject:` followed by an indented block of `case` arms.
    /// Returns `None`, with the position restored, when `match` is an
    /// ordinary name (`match = re.match(...)`).
    fn parse_match(&mut self) -> PyResult<Option<Stmt>> {
        let start = self.pos;
        let line = self.bump().line;
        let subject = match self.parse_testlist_star_expr() {
            Ok(subject)
                if self.check_op(":") && matches!(self.peek_at(1).kind, TokenKind::Newline) =>
            {
                subject
            }
            _ => {
                self.pos = start;
                return Ok(None);
            }
        };
        self.bump();
        self.bump();
        if !matches!(self.peek().kind, TokenKind::Indent) {
            return Err(self.error("expected an indented block"));
        }
        self.bump();

        let mut cases = Vec::new();
        loop {
            match self.peek().kind {
                TokenKind::Dedent => {
                    self.bump();
                    break;
                }
                TokenKind::EndOfFile => break,
                TokenKind::Newline => {
                    self.bump();
                }
                _ if self.check_kw("case") => cases.push(self.parse_case()?),
                _ => return Err(self.error("expected 'case' block")),
            }
        }
        if cases.is_empty() {
            return Err(self.error("expected 'case' block"));
        }
        Ok(Some(Stmt::new(StmtKind::Match { subject, cases }, line)))
    }

    fn parse_case(&mut self) -> PyResult<MatchCase> {
        let line = self.bump().line;
        let pattern = self.parse_open_sequence_pattern()?;
        let guard = if self.eat_kw("if") {
            Some(self.parse_namedexpr_test()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(MatchCase {
            pattern,
            guard,
            body,
            line,
        })
    }

    // ---- patterns ------------------------------------------------------

    /// Top-level `case` pattern, where `case a, *rest:` is a sequence.
    fn parse_open_sequence_pattern(&mut self) -> PyResult<Pattern> {
        let first = self.parse_maybe_star_pattern()?;
        if !self.check_op(",") {
            return Ok(match first {
                Pattern::Star(_) => Pattern::Sequence(vec![first]),
                other => other,
            });
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.check_op(":") || self.check_kw("if") {
                break;
            }
            items.push(self.parse_maybe_star_pattern()?);
        }
        Ok(Pattern::Sequence(items))
    }

    fn parse_maybe_star_pattern(&mut self) -> PyResult<Pattern> {
        if self.eat_op("*") {
            let name = self.expect_name()?;
            return Ok(Pattern::Star((name != "_").then_some(name)));
        }
        self.parse_as_pattern()
    }

    fn parse_as_pattern(&mut self) -> PyResult<Pattern> {
        let pattern = self.parse_or_pattern()?;
        if !self.eat_kw("as") {
            return Ok(pattern);
        }
        if self.check_kw("_") {
            return Err(self.error("cannot use '_' as a target"));
        }
        let name = self.expect_name()?;
        Ok(Pattern::As {
            pattern: Some(Box::new(pattern)),
            name: Some(name),
        })
    }

    fn parse_or_pattern(&mut self) -> PyResult<Pattern> {
        let first = self.parse_closed_pattern()?;
        if !self.check_op("|") {
            return Ok(first);
        }
        let mut alternatives = vec![first];
        while self.eat_op("|") {
            alternatives.push(self.parse_closed_pattern()?);
        }
        Ok(Pattern::Or(alternatives))
    }

    fn parse_closed_pattern(&mut self) -> PyResult<Pattern> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Op("-") | TokenKind::Number(_) => {
                self.parse_number_pattern().map(Pattern::Value)
            }
            TokenKind::String(_) => self.parse_atom().map(Pattern::Value),
            TokenKind::Name(name) => match name.as_str() {
                "None" | "True" | "False" => self.parse_atom().map(Pattern::Value),
                _ if is_keyword(&name) => Err(self.invalid_syntax()),
                _ => {
                    self.bump();
                    let mut value = Expr::Name(name.clone());
                    let mut dotted = false;
                    while self.eat_op(".") {
                        let attr = self.expect_name()?;
                        value = Expr::Attribute {
                            value: Box::new(value),
                            attr,
                        };
                        dotted = true;
                    }
                    if self.eat_op("(") {
                        return self.parse_class_pattern(value);
                    }
                    Ok(if dotted {
                        Pattern::Value(value)
                    } else {
                        Pattern::As {
                            pattern: None,
                            name: (name != "_").then(|| name.clone()),
                        }
                    })
                }
            },
            TokenKind::Op("(") => {
                self.bump();
                if self.eat_op(")") {
                    return Ok(Pattern::Sequence(Vec::new()));
                }
                let first = self.parse_maybe_star_pattern()?;
                if self.eat_op(")") {
                    return Ok(first);
                }
                let mut items = vec![first];
                while self.eat_op(",") {
                    if self.check_op(")") {
                        break;
                    }
                    items.push(self.parse_maybe_star_pattern()?);
                }
                self.expect_op(")")?;
                Ok(Pattern::Sequence(items))
            }
            TokenKind::Op("[") => {
                self.bump();
                let mut items = Vec::new();
                while !self.check_op("]") {
                    items.push(self.parse_maybe_star_pattern()?);
                    if !self.eat_op(",") {
                        break;
                    }
                }
                self.expect_op("]")?;
                Ok(Pattern::Sequence(items))
            }
            TokenKind::Op("{") => {
                self.bump();
                self.parse_mapping_pattern()
            }
            _ => Err(self.invalid_syntax()),
        }
    }

    /// Signed number or complex literal (`-1`, `1 + 2j`).
    fn parse_number_pattern(&mut self) -> PyResult<Expr> {
        let negative = self.eat_op("-");
        let mut value = self.parse_number_atom()?;
        if negative {
            value = Expr::UnaryOp {
                op: UnaryOp::USub,
                operand: Box::new(value),
            };
        }
        let op = if self.check_op("+") {
            BinOp::Add
        } else if self.check_op("-") {
            BinOp::Sub
        } else {
            return Ok(value);
        };
        self.bump();
        let imaginary = self.parse_number_atom()?;
        Ok(Expr::BinOp {
            left: Box::new(value),
            op,
            right: Box::new(imaginary),
        })
    }

    fn parse_number_atom(&mut self) -> PyResult<Expr> {
        let TokenKind::Number(n) = &self.peek().kind else {
            return Err(self.invalid_syntax());
        };
        let value = Expr::Constant(Constant::Number(n.clone()));
        self.bump();
        Ok(value)
    }

    fn parse_mapping_pattern(&mut self) -> PyResult<Pattern> {
        let mut items = Vec::new();
        let mut rest = None;
        while !self.check_op("}") {
            if self.eat_op("**") {
                rest = Some(self.expect_name()?);
            } else {
                let key = match self.parse_closed_pattern()? {
                    Pattern::Value(key) => key,
                    _ => {
                        return Err(self.error(
                            "mapping pattern keys may only match literals and attribute lookups",
                        ))
                    }
                };
                self.expect_op(":")?;
                items.push((key, self.parse_as_pattern()?));
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op("}")?;
        Ok(Pattern::Mapping { items, rest })
    }

    /// Arguments of `Cls(...)` after the opening parenthesis.
    fn parse_class_pattern(&mut self, cls: Expr) -> PyResult<Pattern> {
        let mut patterns = Vec::new();
        let mut keywords = Vec::new();
        while !self.check_op(")") {
            if matches!(&self.peek().kind, TokenKind::Name(n) if !is_keyword(n))
                && self.peek_at(1).is_op("=")
            {
                let name = self.expect_name()?;
                self.bump();
                keywords.push((name, self.parse_as_pattern()?));
            } else if keywords.is_empty() {
                patterns.push(self.parse_as_pattern()?);
            } else {
                return Err(self.error("positional patterns follow keyword patterns"));
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        Ok(Pattern::Class {
            cls,
            patterns,
            keywords,
        })
    }

    fn parse_decorated(&mut self) -> PyResult<Stmt> {
        let mut decorators = Vec::new();
        while self.check_op("@") {
            let line = self.bump().line;
            let expr = self.parse_namedexpr_test()?;
            match self.peek().kind {
                TokenKind::Newline => {
                    self.bump();
                }
                _ => return Err(self.invalid_syntax()),
            }
            decorators.push(Decorator { expr, line });
        }
        if self.eat_kw("async") {
            return self.parse_def(decorators, true);
        }
        if self.check_kw("def") {
            self.parse_def(decorators, false)
        } else if self.check_kw("class") {
            self.parse_class(decorators)
        } else {
            Err(self.invalid_syntax())
        }
    }

    fn parse_def(&mut self, decorators: Vec<Decorator>, is_async: bool) -> PyResult<Stmt> {
        let line = self.expect_kw("def")?.line;
        let name = self.expect_name()?;
        let type_params = self.parse_type_params()?;
        self.expect_op("(")?;
        let params = self.parse_params(true, ")")?;
        self.expect_op(")")?;
        let returns = if self.eat_op("->") {
            Some(self.parse_test()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(Stmt::new(
            StmtKind::FunctionDef(Box::new(FunctionDef {
                name,
                params,
                body,
                decorators,
                returns,
                type_params,
                is_async,
                line,
            })),
            line,
        ))
    }

    fn parse_class(&mut self, decorators: Vec<Decorator>) -> PyResult<Stmt> {
        let line = self.expect_kw("class")?.line;
        let name = self.expect_name()?;
        let type_params = self.parse_type_params()?;
        let bases = if self.eat_op("(") {
            self.parse_call_args()?
        } else {
            Vec::new()
        };
        let body = self.parse_block()?;
        Ok(Stmt::new(
            StmtKind::ClassDef(Box::new(ClassDef {
                name,
                type_params,
                bases,
                body,
                decorators,
                line,
            })),
            line,
        ))
    }

    fn parse_params(&mut self, typed: bool, closer: &str) -> PyResult<Parameters> {
        let mut items = Vec::new();
        while !self.check_op(closer) {
            if self.eat_op("/") {
                items.push(ParamItem::PositionalOnly);
            } else if self.eat_op("**") {
                items.push(ParamItem::KwArgs(self.parse_param(typed, false)?));
            } else if self.eat_op("*") {
                if self.check_op(",") || self.check_op(closer) {
                    items.push(ParamItem::KeywordOnly);
                } else {
                    items.push(ParamItem::VarArgs(self.parse_param(typed, false)?));
                }
            } else {
                items.push(ParamItem::Param(self.parse_param(typed, true)?));
            }
            if !self.eat_op(",") {
                break;
            }
        }
        Ok(Parameters { items })
    }

    fn parse_param(&mut self, typed: bool, allow_default: bool) -> PyResult<Param> {
        let name = self.expect_name()?;
        let annotation = if typed && self.eat_op(":") {
            Some(self.parse_test()?)
        } else {
            None
        };
        let default = if allow_default && self.eat_op("=") {
            Some(self.parse_test()?)
        } else {
            None
        };
        Ok(Param {
            name,
            annotation,
            default,
        })
    }

    // ---- expressions ---------------------------------------------------

    fn parse_testlist_star_expr(&mut self) -> PyResult<Expr> {
        let first = self.parse_test_or_star()?;
        if !self.check_op(",") {
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.eat_op(",") {
            if !self.starts_expr() {
                break;
            }
            elts.push(self.parse_test_or_star()?);
        }
        Ok(Expr::Tuple(elts))
    }

    fn parse_test_or_star(&mut self) -> PyResult<Expr> {
        if self.eat_op("*") {
            return Ok(Expr::Starred(Box::new(self.parse_bitor()?)));
        }
        self.parse_namedexpr_test()
    }

    fn parse_star_or_bitor(&mut self) -> PyResult<Expr> {
        if self.eat_op("*") {
            return Ok(Expr::Starred(Box::new(self.parse_bitor()?)));
        }
        self.parse_bitor()
    }

    fn parse_target_list(&mut self) -> PyResult<Expr> {
        let first = self.parse_star_or_bitor()?;
        if !self.check_op(",") {
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.eat_op(",") {
            if !self.starts_expr() || self.check_kw("in") {
                break;
            }
            elts.push(self.parse_star_or_bitor()?);
        }
        Ok(Expr::Tuple(elts))
    }

    fn parse_namedexpr_test(&mut self) -> PyResult<Expr> {
        if let TokenKind::Name(n) = &self.peek().kind {
            if !is_keyword(n) && self.peek_at(1).is_op(":=") {
                let target = n.clone();
                self.bump();
                self.bump();
                let value = self.parse_test()?;
                return Ok(Expr::NamedExpr {
                    target,
                    value: Box::new(value),
                });
            }
        }
        self.parse_test()
    }

    fn parse_test(&mut self) -> PyResult<Expr> {
        if self.check_kw("lambda") {
            return self.parse_lambda();
        }
        let body = self.parse_or_test()?;
        if !self.check_kw("if") {
            return Ok(body);
        }
        self.bump();
        let test = self.parse_or_test()?;
        self.expect_kw("else")?;
        let orelse = self.parse_test()?;
        Ok(Expr::IfExp {
            test: Box::new(test),
            body: Box::new(body),
            orelse: Box::new(orelse),
        })
    }

    fn parse_lambda(&mut self) -> PyResult<Expr> {
        self.bump();
        let params = self.parse_params(false, ":")?;
        self.expect_op(":")?;
        let body = self.parse_test()?;
        Ok(Expr::Lambda {
            params: Box::new(params),
            body: Box::new(body),
        })
    }

    fn parse_yield(&mut self) -> PyResult<Expr> {
        self.expect_kw("yield")?;
        if self.eat_kw("from") {
            return Ok(Expr::YieldFrom(Box::new(self.parse_test()?)));
        }
        if !self.starts_expr() {
            return Ok(Expr::Yield(None));
        }
        Ok(Expr::Yield(Some(Box::new(self.parse_testlist_star_expr()?))))
    }

    fn parse_or_test(&mut self) -> PyResult<Expr> {
        let first = self.parse_and_test()?;
        if !self.check_kw("or") {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_kw("or") {
            values.push(self.parse_and_test()?);
        }
        Ok(Expr::BoolOp {
            op: BoolOp::Or,
            values,
        })
    }

    fn parse_and_test(&mut self) -> PyResult<Expr> {
        let first = self.parse_not_test()?;
        if !self.check_kw("and") {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_kw("and") {
            values.push(self.parse_not_test()?);
        }
        Ok(Expr::BoolOp {
            op: BoolOp::And,
            values,
        })
    }

    fn parse_not_test(&mut self) -> PyResult<Expr> {
        if self.eat_kw("not") {
            let operand = self.parse_not_test()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn comparison_op(&self) -> Option<(CmpOp, usize)> {
        let tok = self.peek();
        let op = match &tok.kind {
            TokenKind::Op("==") => CmpOp::Eq,
            TokenKind::Op("!=") => CmpOp::NotEq,
            TokenKind::Op("<") => CmpOp::Lt,
            TokenKind::Op("<=") => CmpOp::LtE,
            TokenKind::Op(">") => CmpOp::Gt,
            TokenKind::Op(">=") => CmpOp::GtE,
            TokenKind::Name(n) if n.as_str() == "in" => CmpOp::In,
            TokenKind::Name(n) if n.as_str() == "not" && self.peek_at(1).is_keyword("in") => {
                return Some((CmpOp::NotIn, 2))
            }
            TokenKind::Name(n) if n.as_str() == "is" => {
                if self.peek_at(1).is_keyword("not") {
                    return Some((CmpOp::IsNot, 2));
                }
                CmpOp::Is
            }
            _ => return None,
        };
        Some((op, 1))
    }

    fn parse_comparison(&mut self) -> PyResult<Expr> {
        let left = self.parse_bitor()?;
        let mut ops = Vec::new();
        while let Some((op, width)) = self.comparison_op() {
            for _ in 0..width {
                self.bump();
            }
            ops.push((op, self.parse_bitor()?));
        }
        if ops.is_empty() {
            return Ok(left);
        }
        Ok(Expr::Compare {
            left: Box::new(left),
            ops,
        })
    }

    fn parse_bitor(&mut self) -> PyResult<Expr> {
        self.parse_binary(7)
    }

    fn parse_binary(&mut self, prec: u8) -> PyResult<Expr> {
        if prec > 12 {
            return self.parse_factor();
        }
        let mut left = self.parse_binary(prec + 1)?;
        loop {
            let op = match &self.peek().kind {
                TokenKind::Op(o) => BinOp::from_op(o).filter(|b| b.precedence() == prec),
                _ => None,
            };
            let Some(op) = op else { break };
            self.bump();
            let right = self.parse_binary(prec + 1)?;
            left = Expr::BinOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> PyResult<Expr> {
        let op = match &self.peek().kind {
            TokenKind::Op("-") => Some(UnaryOp::USub),
            TokenKind::Op("+") => Some(UnaryOp::UAdd),
            TokenKind::Op("~") => Some(UnaryOp::Invert),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let operand = self.parse_factor()?;
            return Ok(Expr::UnaryOp {
                op,
                operand: Box::new(operand),
            });
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> PyResult<Expr> {
        let base = if self.eat_kw("await") {
            Expr::Await(Box::new(self.parse_primary()?))
        } else {
            self.parse_primary()?
        };
        if self.eat_op("**") {
            let exponent = self.parse_factor()?;
            return Ok(Expr::BinOp {
                left: Box::new(base),
                op: BinOp::Pow,
                right: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> PyResult<Expr> {
        let mut expr = self.parse_atom()?;
        loop {
            if self.eat_op("(") {
                let args = self.parse_call_args()?;
                expr = Expr::Call {
                    func: Box::new(expr),
                    args,
                };
            } else if self.eat_op("[") {
                let slice = self.parse_subscript_list()?;
                self.expect_op("]")?;
                expr = Expr::Subscript {
                    value: Box::new(expr),
                    slice: Box::new(slice),
                };
            } else if self.eat_op(".") {
                let attr = self.expect_name()?;
                expr = Expr::Attribute {
                    value: Box::new(expr),
                    attr,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    /// Arguments after an opening `(`, consuming the closing `)`.
    fn parse_call_args(&mut self) -> PyResult<Vec<CallArg>> {
        let mut args = Vec::new();
        while !self.check_op(")") {
            if self.eat_op("*") {
                args.push(CallArg::Starred(self.parse_test()?));
            } else if self.eat_op("**") {
                args.push(CallArg::DoubleStarred(self.parse_test()?));
            } else if matches!(&self.peek().kind, TokenKind::Name(n) if !is_keyword(n))
                && self.peek_at(1).is_op("=")
            {
                let name = self.expect_name()?;
                self.bump();
                let value = self.parse_test()?;
                args.push(CallArg::Keyword { name, value });
            } else {
                let mut value = self.parse_namedexpr_test()?;
                if self.at_comp_for() {
                    let generators = self.parse_comp_for()?;
                    value = Expr::GeneratorExp {
                        elt: Box::new(value),
                        generators,
                    };
                }
                args.push(CallArg::Positional(value));
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        Ok(args)
    }

    fn parse_subscript_list(&mut self) -> PyResult<Expr> {
        let first = self.parse_subscript_item()?;
        if !self.check_op(",") {
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.eat_op(",") {
            if self.check_op("]") {
                break;
            }
            elts.push(self.parse_subscript_item()?);
        }
        Ok(Expr::Tuple(elts))
    }

    fn parse_subscript_item(&mut self) -> PyResult<Expr> {
        let lower = if self.check_op(":") {
            None
        } else {
            let expr = self.parse_test_or_star()?;
            if !self.check_op(":") {
                return Ok(expr);
            }
            Some(Box::new(expr))
        };
        self.expect_op(":")?;
        let slice_end = |p: &Self| p.check_op(":") || p.check_op("]") || p.check_op(",");
        let upper = if slice_end(self) {
            None
        } else {
            Some(Box::new(self.parse_test()?))
        };
        let step = if self.eat_op(":") && !slice_end(self) {
            Some(Box::new(self.parse_test()?))
        } else {
            None
        };
        Ok(Expr::Slice { lower, upper, step })
    }

    fn parse_comp_for(&mut self) -> PyResult<Vec<Comprehension>> {
        let mut generators = Vec::new();
        while self.at_comp_for() {
            let is_async = self.eat_kw("async");
            self.expect_kw("for")?;
            let (line, column) = (self.peek().line, self.peek().column);
            let target = self.parse_target_list()?;
            validate_target(&target, line, column)?;
            self.expect_kw("in")?;
            let iter = self.parse_or_test()?;
            let mut ifs = Vec::new();
            while self.eat_kw("if") {
                ifs.push(self.parse_or_test()?);
            }
            generators.push(Comprehension {
                target,
                iter,
                ifs,
                is_async,
            });
        }
        Ok(generators)
    }

    fn parse_atom(&mut self) -> PyResult<Expr> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Name(name) => {
                let expr = match name.as_str() {
                    "None" => Expr::Constant(Constant::None),
                    "True" => Expr::Constant(Constant::True),
                    "False" => Expr::Constant(Constant::False),
                    _ if is_keyword(&name) => return Err(self.invalid_syntax()),
                    _ => Expr::Name(name),
                };
                self.bump();
                Ok(expr)
            }
            TokenKind::Number(n) => {
                self.bump();
                Ok(Expr::Constant(Constant::Number(n)))
            }
            TokenKind::String(_) => {
                let mut pieces = Vec::new();
                while let TokenKind::String(s) = &self.peek().kind {
                    let (line, column) = (self.peek().line, self.peek().column);
                    pieces.push(string_piece(s, line, column)?);
                    self.bump();
                }
                Ok(Expr::Str(pieces))
            }
            TokenKind::Op("(") => {
                self.bump();
                self.parse_paren()
            }
            TokenKind::Op("[") => {
                self.bump();
                self.parse_list()
            }
            TokenKind::Op("{") => {
                self.bump();
                self.parse_brace()
            }
            TokenKind::Op("...") => {
                self.bump();
                Ok(Expr::Constant(Constant::Ellipsis))
            }
            _ => Err(self.invalid_syntax()),
        }
    }

    fn parse_paren(&mut self) -> PyResult<Expr> {
        if self.eat_op(")") {
            return Ok(Expr::Tuple(Vec::new()));
        }
        if self.check_kw("yield") {
            let expr = self.parse_yield()?;
            self.expect_op(")")?;
            return Ok(expr);
        }
        let first = self.parse_test_or_star()?;
        if self.at_comp_for() {
            let generators = self.parse_comp_for()?;
            self.expect_op(")")?;
            return Ok(Expr::GeneratorExp {
                elt: Box::new(first),
                generators,
            });
        }
        if self.eat_op(")") {
            return Ok(first);
        }
        let mut elts = vec![first];
        while self.eat_op(",") {
            if self.check_op(")") {
                break;
            }
            elts.push(self.parse_test_or_star()?);
        }
        self.expect_op(")")?;
        Ok(Expr::Tuple(elts))
    }

    fn parse_list(&mut self) -> PyResult<Expr> {
        if self.eat_op("]") {
            return Ok(Expr::List(Vec::new()));
        }
        let first = self.parse_test_or_star()?;
        if self.at_comp_for() {
            let generators = self.parse_comp_for()?;
            self.expect_op("]")?;
            return Ok(Expr::ListComp {
                elt: Box::new(first),
                generators,
            });
        }
        let mut elts = vec![first];
        while self.eat_op(",") {
            if self.check_op("]") {
                break;
            }
            elts.push(self.parse_test_or_star()?);
        }
        self.expect_op("]")?;
        Ok(Expr::List(elts))
    }

    fn parse_brace(&mut self) -> PyResult<Expr> {
        if self.eat_op("}") {
            return Ok(Expr::Dict(Vec::new()));
        }

        let first_item = if self.eat_op("**") {
            DictItem::Unpack(self.parse_bitor()?)
        } else {
            let first = self.parse_test_or_star()?;
            if !self.eat_op(":") {
                return self.parse_set_rest(first);
            }
            let value = self.parse_test()?;
            if self.at_comp_for() {
                let generators = self.parse_comp_for()?;
                self.expect_op("}")?;
                return Ok(Expr::DictComp {
                    key: Box::new(first),
                    value: Box::new(value),
                    generators,
                });
            }
            DictItem::Pair(first, value)
        };

        let mut items = vec![first_item];
        while self.eat_op(",") {
            if self.check_op("}") {
                break;
            }
            if self.eat_op("**") {
                items.push(DictItem::Unpack(self.parse_bitor()?));
            } else {
                let key = self.parse_test()?;
                self.expect_op(":")?;
                let value = self.parse_test()?;
                items.push(DictItem::Pair(key, value));
            }
        }
        self.expect_op("}")?;
        Ok(Expr::Dict(items))
    }

    fn parse_set_rest(&mut self, first: Expr) -> PyResult<Expr> {
        if self.at_comp_for() {
            let generators = self.parse_comp_for()?;
            self.expect_op("}")?;
            return Ok(Expr::SetComp {
                elt: Box::new(first),
                generators,
            });
        }
        let mut elts = vec![first];
        while self.eat_op(",") {
            if self.check_op("}") {
                break;
            }
            elts.push(self.parse_test_or_star()?);
        }
        self.expect_op("}")?;
        Ok(Expr::Set(elts))
    }
}

fn validate_target(expr: &Expr, line: u32, column: u32) -> PyResult<()> {
    let what = match expr {
        Expr::Name(_) | Expr::Attribute { .. } | Expr::Subscript { .. } => return Ok(()),
        Expr::Starred(inner) => return validate_target(inner, line, column),
        Expr::Tuple(elts) | Expr::List(elts) => {
            return elts
                .iter()
                .try_for_each(|e| validate_target(e, line, column))
        }
        Expr::Call { .. } => "function call",
        Expr::Constant(_) | Expr::Str(_) => "literal",
        _ => "expression",
    };
    Err(PySyntaxError::new(
        line,
        column,
        format!("cannot assign to {}", what),
    ))
}

// ---- f-strings -------------------------------------------------------------

fn string_piece(tok: &StringToken, line: u32, column: u32) -> PyResult<StrPiece> {
    if !tok.is_fstring() {
        return Ok(StrPiece::Plain(StrLiteral {
            raw: tok.raw.clone(),
            prefix: tok.prefix.clone(),
            quote_len: tok.quote_len,
        }));
    }
    let body_column = column + tok.prefix.len() as u32 + tok.quote_len as u32;
    let mut cursor = FStringCursor {
        body: tok.body(),
        pos: 0,
        line,
        column: body_column,
    };
    let parts = cursor.parse_parts(false)?;
    Ok(StrPiece::Formatted(FString {
        prefix: tok.prefix.clone(),
        quote: tok.quote().into(),
        parts,
    }))
}

struct FStringCursor<'a> {
    body: &'a str,
    pos: usize,
    line: u32,
    column: u32,
}

impl FStringCursor<'_> {
    fn location(&self, offset: usize) -> (u32, u32) {
        let before = &self.body.as_bytes()[..offset];
        match before.iter().rposition(|b| *b == b'\n') {
            Some(nl) => {
                let lines = before.iter().filter(|b| **b == b'\n').count() as u32;
                (self.line + lines, (offset - nl) as u32)
            }
            None => (self.line, self.column + offset as u32),
        }
    }

    fn error(&self, message: &str) -> PySyntaxError {
        let (line, column) = self.location(self.pos.min(self.body.len()));
        PySyntaxError::new(line, column, format!("f-string: {}", message))
    }

    fn byte(&self, at: usize) -> Option<u8> {
        self.body.as_bytes().get(at).copied()
    }

    fn parse_parts(&mut self, in_spec: bool) -> PyResult<Vec<FStringPart>> {
        let mut parts = Vec::new();
        let mut literal_start = self.pos;

        while let Some(b) = self.byte(self.pos) {
            match b {
                b'{' if !in_spec && self.byte(self.pos + 1) == Some(b'{') => self.pos += 2,
                b'}' if !in_spec && self.byte(self.pos + 1) == Some(b'}') => self.pos += 2,
                b'}' if in_spec => break,
                b'{' => {
                    if literal_start < self.pos {
                        parts.push(FStringPart::Literal(
                            self.body[literal_start..self.pos].to_string(),
                        ));
                    }
                    self.pos += 1;
                    parts.push(FStringPart::Field(self.parse_field()?));
                    literal_start = self.pos;
                }
                b'}' => return Err(self.error("single '}' is not allowed")),
                b'\\' => self.pos = (self.pos + 2).min(self.body.len()),
                _ => self.pos += 1,
            }
        }

        if literal_start < self.pos {
            parts.push(FStringPart::Literal(
                self.body[literal_start..self.pos].to_string(),
            ));
        }
        Ok(parts)
    }

    fn skip_nested_string(&mut self, quote: u8) {
        let triple = self.byte(self.pos + 1) == Some(quote) && self.byte(self.pos + 2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };
        while let Some(b) = self.byte(self.pos) {
            if b == b'\\' {
                self.pos += 2;
                continue;
            }
            if b == quote {
                if !triple {
                    self.pos += 1;
                    return;
                }
                if self.byte(self.pos + 1) == Some(quote) && self.byte(self.pos + 2) == Some(quote) {
                    self.pos += 3;
                    return;
                }
            }
            self.pos += 1;
        }
    }

    fn is_debug_marker(&self) -> bool {
        let prev = self.pos.checked_sub(1).and_then(|p| self.byte(p));
        if matches!(prev, Some(b'=' | b'!' | b'<' | b'>')) || self.byte(self.pos + 1) == Some(b'=') {
            return false;
        }
        let mut at = self.pos + 1;
        while matches!(self.byte(at), Some(b' ' | b'\t' | b'\n')) {
            at += 1;
        }
        matches!(self.byte(at), Some(b'}' | b'!' | b':'))
    }

    fn parse_field(&mut self) -> PyResult<FormattedValue> {
        let start = self.pos;
        let mut depth = 0u32;
        let mut debug_start = None;

        while let Some(b) = self.byte(self.pos) {
            match b {
                b'(' | b'[' | b'{' => depth += 1,
                b')' | b']' => depth = depth.saturating_sub(1),
                b'}' if depth > 0 => depth -= 1,
                b'\'' | b'"' => {
                    self.skip_nested_string(b);
                    continue;
                }
                b'}' | b':' if depth == 0 => break,
                b'!' if depth == 0 && self.byte(self.pos + 1) != Some(b'=') => break,
                b'=' if depth == 0 && self.is_debug_marker() => {
                    debug_start = Some(self.pos);
                    self.pos += 1;
                    while matches!(self.byte(self.pos), Some(b' ' | b'\t' | b'\n')) {
                        self.pos += 1;
                    }
                    break;
                }
                _ => {}
            }
            self.pos += 1;
        }

        if self.pos >= self.body.len() {
            return Err(self.error("expecting '}'"));
        }

        let expr_end = debug_start.unwrap_or(self.pos);
        let text = &self.body[start..expr_end];
        if text.trim().is_empty() {
            return Err(self.error("valid expression required before '}'"));
        }
        let (line, column) = self.location(start);
        let expr = crate::parser::parse_expression(text, line, column)?;

        let debug = debug_start.map(|at| {
            let trailing_ws = text.len() - text.trim_end().len();
            format!("{}{}", &text[text.len() - trailing_ws..], &self.body[at..self.pos])
        });

        let mut conversion = None;
        if self.byte(self.pos) == Some(b'!') {
            match self.byte(self.pos + 1) {
                Some(c @ (b's' | b'r' | b'a')) => conversion = Some(c as char),
                _ => {
                    self.pos += 1;
                    return Err(self.error("invalid conversion character"));
                }
            }
            self.pos += 2;
        }

        let mut format_spec = None;
        if self.byte(self.pos) == Some(b':') {
            self.pos += 1;
            format_spec = Some(self.parse_parts(true)?);
        }

        if self.byte(self.pos) != Some(b'}') {
            return Err(self.error("expecting '}'"));
        }
        self.pos += 1;

        Ok(FormattedValue {
            expr: Box::new(expr),
            debug,
            conversion,
            format_spec,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(src: &str) -> Block {
        parse_module(src, 1).unwrap().body
    }

    #[test]
    fn test_assignment_targets() {
        let body = module("a = b = 1\n");
        match &body[0].kind {
            StmtKind::Assign { targets, value } => {
                assert_eq!(targets.len(), 2);
                assert_eq!(*value, Expr::Constant(Constant::Number("1".into())));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_statement_lines_are_absolute() {
        let body = parse_module("x = 1\n\ndef f():\n    return x\n", 7).unwrap().body;
        assert_eq!(body[0].line, 7);
        assert_eq!(body[1].line, 9);
        let StmtKind::FunctionDef(def) = &body[1].kind else {
            panic!("expected def");
        };
        assert_eq!(def.body[0].line, 10);
    }

    #[test]
    fn test_if_elif_else() {
        let body = module("if a:\n    x\nelif b:\n    y\nelse:\n    z\n");
        let StmtKind::If { branches, orelse } = &body[0].kind else {
            panic!("expected if");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[1].line, 3);
        assert!(orelse.is_some());
    }

    #[test]
    fn test_decorated_async_def() {
        let body = module("@mount\nasync def load(self, x: int = 1, *args, **kw) -> None:\n    pass\n");
        let StmtKind::FunctionDef(def) = &body[0].kind else {
            panic!("expected def");
        };
        assert!(def.is_async);
        assert!(def.has_decorator("mount"));
        assert_eq!(def.line, 2);
        assert_eq!(def.params.names().count(), 4);
        assert!(def.params.has_kwargs());
    }

    #[test]
    fn test_comprehensions_and_lambda() {
        let expr = parse_expression("[f(x) for x in xs if x]", 1, 1).unwrap();
        assert!(matches!(expr, Expr::ListComp { .. }));
        let expr = parse_expression("{k: v for k, v in d.items()}", 1, 1).unwrap();
        assert!(matches!(expr, Expr::DictComp { .. }));
        let expr = parse_expression("lambda a, b=2: a + b", 1, 1).unwrap();
        assert!(matches!(expr, Expr::Lambda { .. }));
    }

    #[test]
    fn test_comparison_chain() {
        let expr = parse_expression("a < b is not c not in d", 1, 1).unwrap();
        let Expr::Compare { ops, .. } = expr else {
            panic!("expected compare");
        };
        let ops: Vec<_> = ops.iter().map(|(op, _)| *op).collect();
        assert_eq!(ops, vec![CmpOp::Lt, CmpOp::IsNot, CmpOp::NotIn]);
    }

    #[test]
    fn test_for_header() {
        let (target, iter) = parse_for_header("k, v in items.items()", 3, 10).unwrap();
        assert!(matches!(target, Expr::Tuple(ref t) if t.len() == 2));
        assert!(matches!(iter, Expr::Call { .. }));
    }

    #[test]
    fn test_for_header_requires_in() {
        let err = parse_for_header("item items", 3, 10).unwrap_err();
        assert_eq!(err.line, 3);
    }

    #[test]
    fn test_fstring_fields() {
        let expr = parse_expression("f'{name!r:>{width}} and {x=}'", 1, 1).unwrap();
        let Expr::Str(pieces) = expr else {
            panic!("expected string");
        };
        let StrPiece::Formatted(fstring) = &pieces[0] else {
            panic!("expected f-string");
        };
        let fields: Vec<_> = fstring
            .parts
            .iter()
            .filter_map(|p| match p {
                FStringPart::Field(f) => Some(f),
                _ => None,
            })
            .collect();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].conversion, Some('r'));
        assert!(fields[0].format_spec.is_some());
        assert_eq!(fields[1].debug.as_deref(), Some("="));
    }

    #[test]
    fn test_fstring_error_position() {
        let err = parse_module("x = f'{}'\n", 4).unwrap_err();
        assert_eq!(err.line, 4);
        assert!(err.message.starts_with("f-string"));
    }

    #[test]
    fn test_invalid_target() {
        let err = parse_module("f() = 1\n", 1).unwrap_err();
        assert_eq!(err.message, "cannot assign to function call");
    }

    #[test]
    fn test_unexpected_indent() {
        let err = parse_module("x = 1\n    y = 2\n", 1).unwrap_err();
        assert_eq!(err.message, "unexpected indent");
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_semicolon_statements() {
        let body = module("a = 1; b += 2\n");
        assert_eq!(body.len(), 2);
        assert!(matches!(body[1].kind, StmtKind::AugAssign { op: BinOp::Add, .. }));
    }

    #[test]
    fn test_try_except_finally() {
        let body = module("try:\n    x()\nexcept (A, B) as e:\n    pass\nelse:\n    y\nfinally:\n    z\n");
        let StmtKind::Try {
            handlers,
            orelse,
            finalbody,
            ..
        } = &body[0].kind
        else {
            panic!("expected try");
        };
        assert_eq!(handlers[0].name.as_deref(), Some("e"));
        assert!(orelse.is_some() && finalbody.is_some());
    }

    #[test]
    fn test_from_import() {
        let body = module("from ..pkg import (a as b, c,)\n");
        let StmtKind::ImportFrom { level, names, .. } = &body[0].kind else {
            panic!("expected import");
        };
        assert_eq!(*level, 2);
        assert_eq!(names[0].bound_name(), "b");
    }

    #[test]
    fn test_match_statement() {
        let body = module(concat!(
            "match command.split():\n",
            "    case [\"go\", direction] if direction:\n",
            "        move(direction)\n",
            "    case Point(x=0, y=py) | Point(x=py, y=0):\n",
            "        pass\n",
            "    case {\"id\": -1, **rest}:\n",
            "        pass\n",
            "    case (1 | 2) as n, *_:\n",
            "        pass\n",
            "    case _:\n",
            "        pass\n",
        ));
        let StmtKind::Match { subject, cases } = &body[0].kind else {
            panic!("expected match");
        };
        assert!(matches!(subject, Expr::Call { .. }));
        assert_eq!(cases.len(), 5);
        assert_eq!(cases[1].line, 4);
        assert!(cases[0].guard.is_some());

        let mut names = Vec::new();
        cases[0].pattern.bound_names(&mut names);
        assert_eq!(names, ["direction"]);

        let Pattern::Or(alternatives) = &cases[1].pattern else {
            panic!("expected or-pattern");
        };
        assert!(matches!(&alternatives[0], Pattern::Class { keywords, .. } if keywords.len() == 2));

        let Pattern::Mapping { items, rest } = &cases[2].pattern else {
            panic!("expected mapping pattern");
        };
        assert_eq!(items.len(), 1);
        assert_eq!(rest.as_deref(), Some("rest"));

        let Pattern::Sequence(items) = &cases[3].pattern else {
            panic!("expected open sequence");
        };
        assert!(matches!(&items[1], Pattern::Star(None)));

        assert_eq!(
            cases[4].pattern,
            Pattern::As {
                pattern: None,
                name: None
            }
        );
    }

    #[test]
    fn test_match_as_plain_name() {
        let body = module("match = pattern.match(text)\nmatch.group(1)\n");
        assert!(matches!(body[0].kind, StmtKind::Assign { .. }));
        assert!(matches!(body[1].kind, StmtKind::Expr(_)));
    }

    #[test]
    fn test_match_requires_case_blocks() {
        assert!(parse_module("match x:\n    pass\n", 1).is_err());
    }

    #[test]
    fn test_type_alias_statement() {
        let body = module("type Pair[T: int = int] = tuple[T, T]\ntype = 3\n");
        let StmtKind::TypeAlias {
            name, type_params, ..
        } = &body[0].kind
        else {
            panic!("expected type alias");
        };
        assert_eq!(name, "Pair");
        assert!(type_params[0].bound.is_some() && type_params[0].default.is_some());
        assert!(matches!(body[1].kind, StmtKind::Assign { .. }));
    }

    #[test]
    fn test_generic_def_and_class() {
        let body = module("def first[T, *Ts, **P](xs: list[T]) -> T:\n    return xs[0]\nclass Box[T](Base):\n    pass\n");
        let StmtKind::FunctionDef(def) = &body[0].kind else {
            panic!("expected def");
        };
        let kinds: Vec<_> = def.type_params.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            [
                TypeParamKind::TypeVar,
                TypeParamKind::TypeVarTuple,
                TypeParamKind::ParamSpec
            ]
        );
        let StmtKind::ClassDef(class) = &body[1].kind else {
            panic!("expected class");
        };
        assert_eq!(class.type_params[0].name, "T");
        assert_eq!(class.bases.len(), 1);
        assert!(parse_module("def f[](): pass\n", 1).is_err());
    }

    #[test]
    fn test_parenthesized_with_items() {
        let body = module("with (\n    open(a) as f,\n    open(b) as g,\n):\n    pass\nwith (lock) as held:\n    pass\n");
        let StmtKind::With { items, .. } = &body[0].kind else {
            panic!("expected with");
        };
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|item| item.vars.is_some()));
        let StmtKind::With { items, .. } = &body[1].kind else {
            panic!("expected with");
        };
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0].context, Expr::Name(_)));
    }
}
