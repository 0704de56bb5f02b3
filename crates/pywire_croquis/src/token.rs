//! Token definitions.

use compact_str::CompactString;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Name(CompactString),
    Number(CompactString),
    String(StringToken),
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    EndOfFile,
}

/// A string literal exactly as written, prefix and quotes included.
#[derive(Debug, Clone, PartialEq)]
pub struct StringToken {
    pub raw: String,
    /// Lowercased prefix (`""`, `"r"`, `"f"`, `"rb"`, ...).
    pub prefix: CompactString,
    /// 1 or 3.
    pub quote_len: u8,
    /// Line on which the literal ends (differs for triple-quoted text).
    pub end_line: u32,
}

impl StringToken {
    #[inline]
    pub fn is_fstring(&self) -> bool {
        self.prefix.contains('f')
    }

    #[inline]
    pub fn is_raw(&self) -> bool {
        self.prefix.contains('r')
    }

    /// The text between the quotes.
    pub fn body(&self) -> &str {
        let start = self.prefix.len() + self.quote_len as usize;
        let end = self.raw.len() - self.quote_len as usize;
        &self.raw[start..end]
    }

    /// Opening quote sequence (`'`, `"`, `'''` or `"""`).
    pub fn quote(&self) -> &str {
        let start = self.prefix.len();
        &self.raw[start..start + self.quote_len as usize]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
    pub column: u32,
}

impl Token {
    #[inline]
    pub fn is_op(&self, op: &str) -> bool {
        matches!(&self.kind, TokenKind::Op(o) if *o == op)
    }

    #[inline]
    pub fn is_keyword(&self, kw: &str) -> bool {
        matches!(&self.kind, TokenKind::Name(n) if n.as_str() == kw)
    }

    /// Short description used in error messages.
    pub fn describe(&self) -> String {
        match &self.kind {
            TokenKind::Name(n) => format!("'{}'", n),
            TokenKind::Number(n) => format!("'{}'", n),
            TokenKind::String(_) => "string literal".to_string(),
            TokenKind::Op(op) => format!("'{}'", op),
            TokenKind::Newline => "end of line".to_string(),
            TokenKind::Indent => "indent".to_string(),
            TokenKind::Dedent => "dedent".to_string(),
            TokenKind::EndOfFile => "end of input".to_string(),
        }
    }
}
