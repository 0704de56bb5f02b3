//! Syntax tree for the embedded Python subset.
//!
//! Statements carry the absolute document line they start on so that the
//! printer can keep a line map back to the source file. Literal text
//! (numbers and strings) is kept exactly as written.

use compact_str::CompactString;

pub type Ident = CompactString;
pub type Block = Vec<Stmt>;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: u32,
}

impl Stmt {
    pub fn new(kind: StmtKind, line: u32) -> Self {
        Self { kind, line }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Expr(Expr),
    Assign {
        targets: Vec<Expr>,
        value: Expr,
    },
    AugAssign {
        target: Expr,
        op: BinOp,
        value: Expr,
    },
    AnnAssign {
        target: Expr,
        annotation: Expr,
        value: Option<Expr>,
    },
    Return(Option<Expr>),
    Raise {
        exc: Option<Expr>,
        cause: Option<Expr>,
    },
    Pass,
    Break,
    Continue,
    Global(Vec<Ident>),
    Nonlocal(Vec<Ident>),
    Delete(Vec<Expr>),
    Assert {
        test: Expr,
        msg: Option<Expr>,
    },
    Import(Vec<Alias>),
    ImportFrom {
        module: Option<Ident>,
        names: Vec<Alias>,
        level: u32,
    },
    If {
        branches: Vec<IfBranch>,
        orelse: Option<Block>,
    },
    While {
        test: Expr,
        body: Block,
        orelse: Option<Block>,
    },
    For {
        target: Expr,
        iter: Expr,
        body: Block,
        orelse: Option<Block>,
        is_async: bool,
    },
    With {
        items: Vec<WithItem>,
        body: Block,
        is_async: bool,
    },
    Try {
        body: Block,
        handlers: Vec<ExceptHandler>,
        orelse: Option<Block>,
        finalbody: Option<Block>,
    },
    FunctionDef(Box<FunctionDef>),
    ClassDef(Box<ClassDef>),
    Match {
        subject: Expr,
        cases: Vec<MatchCase>,
    },
    /// `type Name[T] = value`
    TypeAlias {
        name: Ident,
        type_params: Vec<TypeParam>,
        value: Expr,
    },
}

/// `if` / `elif` arm. `line` is the line of the keyword.
#[derive(Debug, Clone, PartialEq)]
pub struct IfBranch {
    pub test: Expr,
    pub body: Block,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExceptHandler {
    pub typ: Option<Expr>,
    pub name: Option<Ident>,
    pub body: Block,
    pub is_star: bool,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithItem {
    pub context: Expr,
    pub vars: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
    pub name: Ident,
    pub asname: Option<Ident>,
}

impl Alias {
    /// Name bound in the importing scope.
    pub fn bound_name(&self) -> &str {
        match &self.asname {
            Some(as_name) => as_name,
            None => self.name.split('.').next().unwrap_or(&self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decorator {
    pub expr: Expr,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: Ident,
    pub params: Parameters,
    pub body: Block,
    pub decorators: Vec<Decorator>,
    pub returns: Option<Expr>,
    pub type_params: Vec<TypeParam>,
    pub is_async: bool,
    pub line: u32,
}

impl FunctionDef {
    /// True when decorated with `@name` or `@name(...)`, dotted forms included.
    pub fn has_decorator(&self, name: &str) -> bool {
        self.decorators.iter().any(|d| {
            let target = match &d.expr {
                Expr::Call { func, .. } => func.as_ref(),
                other => other,
            };
            match target {
                Expr::Name(n) => n.as_str() == name,
                Expr::Attribute { attr, .. } => attr.as_str() == name,
                _ => false,
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: Ident,
    pub type_params: Vec<TypeParam>,
    pub bases: Vec<CallArg>,
    pub body: Block,
    pub decorators: Vec<Decorator>,
    pub line: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeParamKind {
    /// `T`, `T: bound`
    TypeVar,
    /// `*Ts`
    TypeVarTuple,
    /// `**P`
    ParamSpec,
}

/// One entry of a `[T, *Ts, **P]` type parameter list.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeParam {
    pub kind: TypeParamKind,
    pub name: Ident,
    pub bound: Option<Expr>,
    pub default: Option<Expr>,
}

/// `case <pattern> if <guard>:` arm. `line` is the line of `case`.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCase {
    pub pattern: Pattern,
    pub guard: Option<Expr>,
    pub body: Block,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    /// Literal or dotted-name value.
    Value(Expr),
    /// Capture (`name`), wildcard (`_`) or `pattern as name`.
    As {
        pattern: Option<Box<Pattern>>,
        name: Option<Ident>,
    },
    /// `*rest` inside a sequence; `None` for `*_`.
    Star(Option<Ident>),
    Sequence(Vec<Pattern>),
    Mapping {
        items: Vec<(Expr, Pattern)>,
        rest: Option<Ident>,
    },
    Class {
        cls: Expr,
        patterns: Vec<Pattern>,
        keywords: Vec<(Ident, Pattern)>,
    },
    Or(Vec<Pattern>),
}

impl Pattern {
    /// Names the pattern binds on a successful match, in source order.
    pub fn bound_names(&self, out: &mut Vec<Ident>) {
        match self {
            Pattern::Value(_) => {}
            Pattern::As { pattern, name } => {
                if let Some(pattern) = pattern {
                    pattern.bound_names(out);
                }
                out.extend(name.iter().cloned());
            }
            Pattern::Star(name) => out.extend(name.iter().cloned()),
            Pattern::Sequence(items) => items.iter().for_each(|p| p.bound_names(out)),
            Pattern::Mapping { items, rest } => {
                for (_, pattern) in items {
                    pattern.bound_names(out);
                }
                out.extend(rest.iter().cloned());
            }
            Pattern::Class {
                patterns, keywords, ..
            } => {
                patterns.iter().for_each(|p| p.bound_names(out));
                for (_, pattern) in keywords {
                    pattern.bound_names(out);
                }
            }
            // Every alternative binds the same names.
            Pattern::Or(alternatives) => {
                if let Some(first) = alternatives.first() {
                    first.bound_names(out);
                }
            }
        }
    }

    /// Apply `f` to the value expressions the pattern evaluates (literals,
    /// dotted names, mapping keys and class references).
    pub fn for_each_value_mut(&mut self, f: &mut dyn FnMut(&mut Expr)) {
        match self {
            Pattern::Value(value) => f(value),
            Pattern::As { pattern, .. } => {
                if let Some(pattern) = pattern {
                    pattern.for_each_value_mut(f);
                }
            }
            Pattern::Star(_) => {}
            Pattern::Sequence(items) | Pattern::Or(items) => {
                items.iter_mut().for_each(|p| p.for_each_value_mut(f))
            }
            Pattern::Mapping { items, .. } => {
                for (key, pattern) in items {
                    f(key);
                    pattern.for_each_value_mut(f);
                }
            }
            Pattern::Class {
                cls,
                patterns,
                keywords,
            } => {
                f(cls);
                patterns.iter_mut().for_each(|p| p.for_each_value_mut(f));
                for (_, pattern) in keywords {
                    pattern.for_each_value_mut(f);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Parameters {
    pub items: Vec<ParamItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamItem {
    Param(Param),
    /// `/`
    PositionalOnly,
    /// bare `*`
    KeywordOnly,
    VarArgs(Param),
    KwArgs(Param),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub annotation: Option<Expr>,
    pub default: Option<Expr>,
}

impl Param {
    pub fn named(name: &str) -> Self {
        Self {
            name: Ident::new(name),
            annotation: None,
            default: None,
        }
    }
}

impl Parameters {
    pub fn names(&self) -> impl Iterator<Item = &Ident> {
        self.items.iter().filter_map(|item| match item {
            ParamItem::Param(p) | ParamItem::VarArgs(p) | ParamItem::KwArgs(p) => Some(&p.name),
            _ => None,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names().any(|n| n.as_str() == name)
    }

    pub fn first_name(&self) -> Option<&Ident> {
        self.items.iter().find_map(|item| match item {
            ParamItem::Param(p) => Some(&p.name),
            _ => None,
        })
    }

    pub fn has_kwargs(&self) -> bool {
        self.items.iter().any(|i| matches!(i, ParamItem::KwArgs(_)))
    }

    /// Insert a plain positional parameter at the front.
    pub fn prepend(&mut self, name: &str) {
        self.items.insert(0, ParamItem::Param(Param::named(name)));
    }

    /// Append a parameter before any `*args` / `**kwargs` / keyword-only marker
    /// so the result stays valid Python.
    pub fn push_positional(&mut self, param: Param) {
        let at = self
            .items
            .iter()
            .position(|i| {
                matches!(
                    i,
                    ParamItem::VarArgs(_) | ParamItem::KwArgs(_) | ParamItem::KeywordOnly
                )
            })
            .unwrap_or(self.items.len());
        self.items.insert(at, ParamItem::Param(param));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Name(Ident),
    Constant(Constant),
    /// One or more adjacent string literals (implicit concatenation).
    Str(Vec<StrPiece>),
    Attribute {
        value: Box<Expr>,
        attr: Ident,
    },
    Subscript {
        value: Box<Expr>,
        slice: Box<Expr>,
    },
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<CallArg>,
    },
    Tuple(Vec<Expr>),
    List(Vec<Expr>),
    Set(Vec<Expr>),
    Dict(Vec<DictItem>),
    ListComp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    SetComp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    GeneratorExp {
        elt: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    DictComp {
        key: Box<Expr>,
        value: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    Starred(Box<Expr>),
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    BinOp {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    BoolOp {
        op: BoolOp,
        values: Vec<Expr>,
    },
    Compare {
        left: Box<Expr>,
        ops: Vec<(CmpOp, Expr)>,
    },
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    Lambda {
        params: Box<Parameters>,
        body: Box<Expr>,
    },
    NamedExpr {
        target: Ident,
        value: Box<Expr>,
    },
    Await(Box<Expr>),
    Yield(Option<Box<Expr>>),
    YieldFrom(Box<Expr>),
}

impl Expr {
    pub fn name(id: &str) -> Self {
        Expr::Name(Ident::new(id))
    }

    /// `value.attr`
    pub fn attr(value: Expr, attr: &str) -> Self {
        Expr::Attribute {
            value: Box::new(value),
            attr: Ident::new(attr),
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Expr::Name(n) => Some(n),
            _ => None,
        }
    }

    /// Decoded value of a plain (non-f, non-bytes) string literal.
    pub fn as_str_value(&self) -> Option<String> {
        let Expr::Str(pieces) = self else {
            return None;
        };
        let mut out = String::new();
        for piece in pieces {
            match piece {
                StrPiece::Plain(lit) if !lit.prefix.contains('b') => out.push_str(&lit.decoded()),
                _ => return None,
            }
        }
        Some(out)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    None,
    True,
    False,
    Ellipsis,
    /// Source text of a numeric literal.
    Number(CompactString),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StrPiece {
    Plain(StrLiteral),
    Formatted(FString),
}

/// A non-formatted string literal, stored as written.
#[derive(Debug, Clone, PartialEq)]
pub struct StrLiteral {
    pub raw: String,
    pub prefix: CompactString,
    pub quote_len: u8,
}

impl StrLiteral {
    pub fn body(&self) -> &str {
        let start = self.prefix.len() + self.quote_len as usize;
        let end = self.raw.len() - self.quote_len as usize;
        &self.raw[start..end]
    }

    /// Resolve the common backslash escapes. Raw literals are returned as is.
    pub fn decoded(&self) -> String {
        let body = self.body();
        if self.prefix.contains('r') {
            return body.to_string();
        }
        let mut out = String::with_capacity(body.len());
        let mut chars = body.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('0') => out.push('\0'),
                Some('\\') => out.push('\\'),
                Some('\'') => out.push('\''),
                Some('"') => out.push('"'),
                Some('\n') => {}
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        }
        out
    }
}

/// An f-string literal: prefix, quote and the parsed replacement fields.
#[derive(Debug, Clone, PartialEq)]
pub struct FString {
    pub prefix: CompactString,
    pub quote: CompactString,
    pub parts: Vec<FStringPart>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    /// Literal text exactly as written (doubled braces preserved).
    Literal(String),
    Field(FormattedValue),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormattedValue {
    pub expr: Box<Expr>,
    /// The `=` of a self-documenting field (`{x = }`) with its whitespace.
    pub debug: Option<String>,
    pub conversion: Option<char>,
    pub format_spec: Option<Vec<FStringPart>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallArg {
    Positional(Expr),
    Starred(Expr),
    Keyword { name: Ident, value: Expr },
    DoubleStarred(Expr),
}

impl CallArg {
    pub fn value(&self) -> &Expr {
        match self {
            CallArg::Positional(e)
            | CallArg::Starred(e)
            | CallArg::DoubleStarred(e)
            | CallArg::Keyword { value: e, .. } => e,
        }
    }

    pub fn value_mut(&mut self) -> &mut Expr {
        match self {
            CallArg::Positional(e)
            | CallArg::Starred(e)
            | CallArg::DoubleStarred(e)
            | CallArg::Keyword { value: e, .. } => e,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DictItem {
    Pair(Expr, Expr),
    Unpack(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    pub target: Expr,
    pub iter: Expr,
    pub ifs: Vec<Expr>,
    pub is_async: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mult,
    MatMult,
    Div,
    Mod,
    Pow,
    LShift,
    RShift,
    BitOr,
    BitXor,
    BitAnd,
    FloorDiv,
}

impl BinOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mult => "*",
            BinOp::MatMult => "@",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
            BinOp::LShift => "<<",
            BinOp::RShift => ">>",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::BitAnd => "&",
            BinOp::FloorDiv => "//",
        }
    }

    pub fn from_op(op: &str) -> Option<Self> {
        Some(match op {
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            "*" => BinOp::Mult,
            "@" => BinOp::MatMult,
            "/" => BinOp::Div,
            "%" => BinOp::Mod,
            "**" => BinOp::Pow,
            "<<" => BinOp::LShift,
            ">>" => BinOp::RShift,
            "|" => BinOp::BitOr,
            "^" => BinOp::BitXor,
            "&" => BinOp::BitAnd,
            "//" => BinOp::FloorDiv,
            _ => return None,
        })
    }

    /// `+=` and friends.
    pub fn from_augmented(op: &str) -> Option<Self> {
        op.strip_suffix('=').and_then(Self::from_op)
    }

    pub fn precedence(self) -> u8 {
        match self {
            BinOp::BitOr => 7,
            BinOp::BitXor => 8,
            BinOp::BitAnd => 9,
            BinOp::LShift | BinOp::RShift => 10,
            BinOp::Add | BinOp::Sub => 11,
            BinOp::Mult | BinOp::MatMult | BinOp::Div | BinOp::Mod | BinOp::FloorDiv => 12,
            BinOp::Pow => 14,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Invert,
    UAdd,
    USub,
}

impl UnaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Not => "not ",
            UnaryOp::Invert => "~",
            UnaryOp::UAdd => "+",
            UnaryOp::USub => "-",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

impl BoolOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BoolOp::And => "and",
            BoolOp::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Is,
    IsNot,
    In,
    NotIn,
}

impl CmpOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
            CmpOp::Lt => "<",
            CmpOp::LtE => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtE => ">=",
            CmpOp::Is => "is",
            CmpOp::IsNot => "is not",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(raw: &str, prefix: &str) -> StrLiteral {
        StrLiteral {
            raw: raw.to_string(),
            prefix: prefix.into(),
            quote_len: 1,
        }
    }

    #[test]
    fn test_str_literal_decoding() {
        assert_eq!(lit(r"'a\nb'", "").decoded(), "a\nb");
        assert_eq!(lit(r"r'a\nb'", "r").decoded(), r"a\nb");
        assert_eq!(lit(r#"'it\'s'"#, "").decoded(), "it's");
    }

    #[test]
    fn test_push_positional_before_varargs() {
        let mut params = Parameters {
            items: vec![
                ParamItem::Param(Param::named("self")),
                ParamItem::KwArgs(Param::named("kwargs")),
            ],
        };
        params.push_positional(Param::named("event"));
        let names: Vec<_> = params.names().map(|n| n.as_str()).collect();
        assert_eq!(names, vec!["self", "event", "kwargs"]);
    }

    #[test]
    fn test_alias_bound_name() {
        let a = Alias {
            name: "os.path".into(),
            asname: None,
        };
        assert_eq!(a.bound_name(), "os");
    }
}
