//! Tokenizer for embedded Python.
//!
//! Produces the token stream the parser consumes, including `Newline`,
//! `Indent` and `Dedent` tokens. Inside brackets newlines are implicit line
//! joins. Expression mode (used for interpolations, conditions and loop
//! headers) ignores newlines and indentation entirely.

use crate::error::{PyResult, PySyntaxError};
use crate::token::{StringToken, Token, TokenKind};
use compact_str::CompactString;

const OPS3: [&str; 5] = ["**=", "//=", ">>=", "<<=", "..."];

const OPS2: [&str; 19] = [
    "->", ":=", "**", "//", ">>", "<<", "<=", ">=", "==", "!=", "+=", "-=", "*=", "/=", "%=",
    "&=", "|=", "^=", "@=",
];

const STRING_PREFIXES: [&str; 8] = ["r", "u", "b", "f", "br", "rb", "fr", "rf"];

fn op1(b: u8) -> Option<&'static str> {
    Some(match b {
        b'+' => "+",
        b'-' => "-",
        b'*' => "*",
        b'/' => "/",
        b'%' => "%",
        b'@' => "@",
        b'&' => "&",
        b'|' => "|",
        b'^' => "^",
        b'~' => "~",
        b'<' => "<",
        b'>' => ">",
        b'(' => "(",
        b')' => ")",
        b'[' => "[",
        b']' => "]",
        b'{' => "{",
        b'}' => "}",
        b',' => ",",
        b':' => ":",
        b';' => ";",
        b'.' => ".",
        b'=' => "=",
        _ => return None,
    })
}

#[inline]
fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

#[inline]
fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

/// Tokenize a module (statements with indentation).
pub fn tokenize(source: &str, first_line: u32) -> PyResult<Vec<Token>> {
    Lexer::new(source, first_line, 1, false).run()
}

/// Tokenize a single expression; newlines are insignificant.
pub fn tokenize_expression(source: &str, first_line: u32, first_column: u32) -> PyResult<Vec<Token>> {
    Lexer::new(source, first_line, first_column, true).run()
}

struct Lexer<'s> {
    src: &'s str,
    bytes: &'s [u8],
    pos: usize,
    line: u32,
    line_start: usize,
    first_line: u32,
    column_base: u32,
    expression_mode: bool,
    indent_stack: Vec<u32>,
    brackets: Vec<(u8, u32, u32)>,
    tokens: Vec<Token>,
}

impl<'s> Lexer<'s> {
    fn new(src: &'s str, first_line: u32, first_column: u32, expression_mode: bool) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: first_line,
            line_start: 0,
            first_line,
            column_base: first_column.saturating_sub(1),
            expression_mode,
            indent_stack: vec![0],
            brackets: Vec::new(),
            tokens: Vec::with_capacity(src.len() / 3 + 4),
        }
    }

    #[inline]
    fn column(&self, pos: usize) -> u32 {
        let col = (pos - self.line_start) as u32 + 1;
        if self.line == self.first_line {
            col + self.column_base
        } else {
            col
        }
    }

    #[inline]
    fn peek(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    fn error(&self, pos: usize, message: impl Into<String>) -> PySyntaxError {
        PySyntaxError::new(self.line, self.column(pos), message)
    }

    fn push(&mut self, kind: TokenKind, line: u32, column: u32) {
        self.tokens.push(Token { kind, line, column });
    }

    fn consume_newline(&mut self) {
        if self.peek(0) == Some(b'\r') && self.peek(1) == Some(b'\n') {
            self.pos += 2;
        } else {
            self.pos += 1;
        }
        self.line += 1;
        self.line_start = self.pos;
    }

    fn run(mut self) -> PyResult<Vec<Token>> {
        let mut at_line_start = !self.expression_mode;

        loop {
            if at_line_start {
                if self.handle_indentation()? {
                    continue;
                }
                at_line_start = false;
            }

            while matches!(self.peek(0), Some(b' ' | b'\t' | b'\x0c')) {
                self.pos += 1;
            }

            let Some(b) = self.peek(0) else {
                return self.finish();
            };

            match b {
                b'#' => self.skip_comment(),
                b'\\' => {
                    if matches!(self.peek(1), Some(b'\n' | b'\r')) {
                        self.pos += 1;
                        self.consume_newline();
                    } else {
                        return Err(self.error(
                            self.pos,
                            "unexpected character after line continuation character",
                        ));
                    }
                }
                b'\n' | b'\r' => {
                    let (line, column) = (self.line, self.column(self.pos));
                    self.consume_newline();
                    if self.brackets.is_empty() && !self.expression_mode {
                        self.push(TokenKind::Newline, line, column);
                        at_line_start = true;
                    }
                }
                b'\'' | b'"' => self.lex_string(self.pos, 0)?,
                b'0'..=b'9' => self.lex_number()?,
                b'.' if matches!(self.peek(1), Some(b'0'..=b'9')) => self.lex_number()?,
                _ if b >= 0x80 || b == b'_' || b.is_ascii_alphabetic() => self.lex_name()?,
                _ => self.lex_operator()?,
            }
        }
    }

    /// Measure indentation at the start of a physical line. Returns `true`
    /// when the line was blank (or comment only) and has been consumed.
    fn handle_indentation(&mut self) -> PyResult<bool> {
        let mut width = 0u32;
        while let Some(b) = self.peek(0) {
            match b {
                b' ' => width += 1,
                b'\t' => width = (width / 8 + 1) * 8,
                b'\x0c' => width = 0,
                _ => break,
            }
            self.pos += 1;
        }

        match self.peek(0) {
            None => return Ok(false),
            Some(b'#') => {
                self.skip_comment();
                if self.peek(0).is_some() {
                    self.consume_newline();
                }
                return Ok(true);
            }
            Some(b'\n' | b'\r') => {
                self.consume_newline();
                return Ok(true);
            }
            _ => {}
        }

        let current = self.indent_stack.last().copied().unwrap_or(0);
        let column = self.column(self.pos);
        if width > current {
            self.indent_stack.push(width);
            self.push(TokenKind::Indent, self.line, column);
        } else if width < current {
            while self.indent_stack.last().is_some_and(|w| *w > width) {
                self.indent_stack.pop();
                self.push(TokenKind::Dedent, self.line, column);
            }
            if self.indent_stack.last().copied().unwrap_or(0) != width {
                return Err(self.error(
                    self.pos,
                    "unindent does not match any outer indentation level",
                ));
            }
        }
        Ok(false)
    }

    fn skip_comment(&mut self) {
        while let Some(b) = self.peek(0) {
            if b == b'\n' || b == b'\r' {
                break;
            }
            self.pos += 1;
        }
    }

    fn finish(mut self) -> PyResult<Vec<Token>> {
        if let Some((open, line, column)) = self.brackets.last().copied() {
            return Err(PySyntaxError::new(
                line,
                column,
                format!("'{}' was never closed", open as char),
            ));
        }

        let column = self.column(self.pos);
        if !self.expression_mode {
            let needs_newline = !matches!(
                self.tokens.last().map(|t| &t.kind),
                None | Some(TokenKind::Newline | TokenKind::Dedent)
            );
            if needs_newline {
                self.push(TokenKind::Newline, self.line, column);
            }
            while self.indent_stack.len() > 1 {
                self.indent_stack.pop();
                self.push(TokenKind::Dedent, self.line, column);
            }
        }
        self.push(TokenKind::EndOfFile, self.line, column);
        Ok(self.tokens)
    }

    fn lex_name(&mut self) -> PyResult<()> {
        let start = self.pos;
        let src = self.src;
        let rest = &src[start..];
        let mut chars = rest.char_indices();
        match chars.next() {
            Some((_, c)) if is_ident_start(c) => {}
            Some((_, c)) => return Err(self.error(start, format!("invalid character '{}'", c))),
            None => return Ok(()),
        }
        let mut end = rest.len();
        for (i, c) in chars {
            if !is_ident_continue(c) {
                end = i;
                break;
            }
        }
        self.pos = start + end;

        let word = &src[start..self.pos];
        if matches!(self.peek(0), Some(b'\'' | b'"'))
            && STRING_PREFIXES
                .iter()
                .any(|p| p.eq_ignore_ascii_case(word))
        {
            self.pos = start + word.len();
            return self.lex_string(start, word.len());
        }

        let column = self.column(start);
        self.push(TokenKind::Name(CompactString::new(word)), self.line, column);
        Ok(())
    }

    fn lex_number(&mut self) -> PyResult<()> {
        let start = self.pos;
        let column = self.column(start);

        let digits = |lexer: &mut Self, hex: bool| {
            while let Some(b) = lexer.peek(0) {
                if b.is_ascii_digit() || b == b'_' || (hex && b.is_ascii_hexdigit()) {
                    lexer.pos += 1;
                } else {
                    break;
                }
            }
        };

        if self.peek(0) == Some(b'0') && matches!(self.peek(1), Some(b'x' | b'X' | b'o' | b'O' | b'b' | b'B'))
        {
            self.pos += 2;
            digits(self, true);
        } else {
            digits(self, false);
            if self.peek(0) == Some(b'.') {
                self.pos += 1;
                digits(self, false);
            }
            if matches!(self.peek(0), Some(b'e' | b'E')) {
                let sign = usize::from(matches!(self.peek(1), Some(b'+' | b'-')));
                if self.peek(1 + sign).is_some_and(|b| b.is_ascii_digit()) {
                    self.pos += 1 + sign;
                    digits(self, false);
                }
            }
            if matches!(self.peek(0), Some(b'j' | b'J')) {
                self.pos += 1;
            }
        }

        if let Some(c) = self.src[self.pos..].chars().next() {
            if is_ident_continue(c) {
                return Err(self.error(self.pos, "invalid decimal literal"));
            }
        }

        let text = CompactString::new(&self.src[start..self.pos]);
        self.push(TokenKind::Number(text), self.line, column);
        Ok(())
    }

    fn lex_string(&mut self, start: usize, prefix_len: usize) -> PyResult<()> {
        let line = self.line;
        let column = self.column(start);
        let prefix = CompactString::new(self.src[start..start + prefix_len].to_ascii_lowercase());
        let is_f = prefix.contains('f');

        let Some(quote) = self.peek(0) else {
            return Err(self.error(start, "unterminated string literal"));
        };
        let triple = self.peek(1) == Some(quote) && self.peek(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        self.scan_string_body(quote, triple, is_f, line, column)?;

        let token = StringToken {
            raw: self.src[start..self.pos].to_string(),
            prefix,
            quote_len: if triple { 3 } else { 1 },
            end_line: self.line,
        };
        self.push(TokenKind::String(token), line, column);
        Ok(())
    }

    fn scan_string_body(
        &mut self,
        quote: u8,
        triple: bool,
        is_f: bool,
        start_line: u32,
        start_column: u32,
    ) -> PyResult<()> {
        let mut depth = 0u32;

        loop {
            let Some(b) = self.peek(0) else {
                let message = if triple {
                    "unterminated triple-quoted string literal"
                } else {
                    "unterminated string literal"
                };
                return Err(PySyntaxError::new(
                    start_line,
                    start_column,
                    format!("{} (detected at line {})", message, self.line),
                ));
            };

            match b {
                b'\\' => {
                    self.pos += 1;
                    match self.peek(0) {
                        Some(b'\n' | b'\r') => self.consume_newline(),
                        Some(_) => self.pos += 1,
                        None => {}
                    }
                }
                b'\n' | b'\r' => {
                    if !triple && depth == 0 {
                        return Err(PySyntaxError::new(
                            start_line,
                            start_column,
                            format!("unterminated string literal (detected at line {})", self.line),
                        ));
                    }
                    self.consume_newline();
                }
                _ if b == quote && depth == 0 => {
                    if !triple {
                        self.pos += 1;
                        return Ok(());
                    }
                    if self.peek(1) == Some(quote) && self.peek(2) == Some(quote) {
                        self.pos += 3;
                        return Ok(());
                    }
                    self.pos += 1;
                }
                b'{' if is_f => {
                    if depth == 0 && self.peek(1) == Some(b'{') {
                        self.pos += 2;
                    } else {
                        depth += 1;
                        self.pos += 1;
                    }
                }
                b'}' if is_f => {
                    if depth == 0 {
                        self.pos += if self.peek(1) == Some(b'}') { 2 } else { 1 };
                    } else {
                        depth -= 1;
                        self.pos += 1;
                    }
                }
                b'\'' | b'"' if depth > 0 => {
                    let nested_triple = self.peek(1) == Some(b) && self.peek(2) == Some(b);
                    let (line, column) = (self.line, self.column(self.pos));
                    self.pos += if nested_triple { 3 } else { 1 };
                    self.scan_string_body(b, nested_triple, false, line, column)?;
                }
                _ => self.pos += 1,
            }
        }
    }

    fn lex_operator(&mut self) -> PyResult<()> {
        let start = self.pos;
        let column = self.column(start);
        let rest = &self.bytes[start..];

        let op = OPS3
            .iter()
            .chain(OPS2.iter())
            .find(|op| rest.starts_with(op.as_bytes()))
            .copied()
            .or_else(|| op1(rest[0]));

        let Some(op) = op else {
            let c = self.src[start..].chars().next().unwrap_or('?');
            return Err(self.error(start, format!("invalid character '{}'", c)));
        };

        match op {
            "(" | "[" | "{" => self.brackets.push((op.as_bytes()[0], self.line, column)),
            ")" | "]" | "}" => {
                let expected = match op {
                    ")" => b'(',
                    "]" => b'[',
                    _ => b'{',
                };
                match self.brackets.pop() {
                    Some((open, _, _)) if open == expected => {}
                    Some((open, _, _)) => {
                        return Err(self.error(
                            start,
                            format!(
                                "closing parenthesis '{}' does not match opening parenthesis '{}'",
                                op, open as char
                            ),
                        ))
                    }
                    None => return Err(self.error(start, format!("unmatched '{}'", op))),
                }
            }
            _ => {}
        }

        self.pos += op.len();
        self.push(TokenKind::Op(op), self.line, column);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src, 1).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_simple_assignment() {
        let k = kinds("x = 1\n");
        assert_eq!(
            k,
            vec![
                TokenKind::Name("x".into()),
                TokenKind::Op("="),
                TokenKind::Number("1".into()),
                TokenKind::Newline,
                TokenKind::EndOfFile,
            ]
        );
    }

    #[test]
    fn test_indent_dedent() {
        let k = kinds("def f():\n    return 1\nx = 2");
        assert!(k.contains(&TokenKind::Indent));
        assert!(k.contains(&TokenKind::Dedent));
        assert_eq!(k.last(), Some(&TokenKind::EndOfFile));
    }

    #[test]
    fn test_blank_lines_and_comments_are_skipped() {
        let toks = tokenize("# header\n\nx = 1  # trailing\n", 10).unwrap();
        assert_eq!(toks[0].kind, TokenKind::Name("x".into()));
        assert_eq!(toks[0].line, 12);
    }

    #[test]
    fn test_implicit_line_joining() {
        let k = kinds("f(1,\n  2)\n");
        let newlines = k.iter().filter(|k| **k == TokenKind::Newline).count();
        assert_eq!(newlines, 1);
    }

    #[test]
    fn test_string_prefixes() {
        let toks = tokenize("rb'x' f\"{a}\"", 1).unwrap();
        match &toks[0].kind {
            TokenKind::String(s) => {
                assert_eq!(s.prefix, "rb");
                assert_eq!(s.body(), "x");
            }
            other => panic!("unexpected {:?}", other),
        }
        match &toks[1].kind {
            TokenKind::String(s) => assert!(s.is_fstring()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_fstring_nested_quotes() {
        let toks = tokenize("f\"{d[\"k\"]}\"", 1).unwrap();
        assert!(matches!(&toks[0].kind, TokenKind::String(s) if s.body() == "{d[\"k\"]}"));
    }

    #[test]
    fn test_triple_quoted_tracks_lines() {
        let toks = tokenize("s = '''a\nb'''\ny = 1", 1).unwrap();
        let y = toks
            .iter()
            .find(|t| t.kind == TokenKind::Name("y".into()))
            .unwrap();
        assert_eq!(y.line, 3);
    }

    #[test]
    fn test_numbers() {
        let k = kinds("0xff 1_000 3.14 1e-3 2j .5");
        let numbers: Vec<_> = k
            .iter()
            .filter_map(|k| match k {
                TokenKind::Number(n) => Some(n.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(numbers, vec!["0xff", "1_000", "3.14", "1e-3", "2j", ".5"]);
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("x = 'abc\n", 4).unwrap_err();
        assert_eq!(err.line, 4);
        assert!(err.message.starts_with("unterminated string literal"));
    }

    #[test]
    fn test_unclosed_bracket() {
        let err = tokenize("x = (1,\n2", 1).unwrap_err();
        assert_eq!(err.message, "'(' was never closed");
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_bad_dedent() {
        let err = tokenize("if x:\n    a\n  b\n", 1).unwrap_err();
        assert!(err.message.contains("unindent"));
        assert_eq!(err.line, 3);
    }

    #[test]
    fn test_expression_mode_ignores_newlines() {
        let toks = tokenize_expression("a +\n b", 5, 10).unwrap();
        assert_eq!(toks.len(), 4);
        assert_eq!(toks[0].column, 10);
        assert_eq!(toks[2].line, 6);
    }

    #[test]
    fn test_invalid_character() {
        let err = tokenize("x = $event", 1).unwrap_err();
        assert!(err.message.contains("invalid character"));
    }
}
