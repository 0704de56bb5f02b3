//! Markup tokenizer for PyWire templates.
//!
//! A byte state machine in the htmlparser2 tradition: it never allocates and
//! reports spans through [`Callbacks`]. Compared with a browser tokenizer it
//! knows two PyWire specifics: attribute values may be a brace-balanced
//! `{...}` expression, and quoted values may be triple-quoted and span
//! several lines.

/// Character codes for fast comparison
pub mod char_codes {
    pub const TAB: u8 = 0x09;
    pub const NEWLINE: u8 = 0x0A;
    pub const FORM_FEED: u8 = 0x0C;
    pub const CARRIAGE_RETURN: u8 = 0x0D;
    pub const SPACE: u8 = 0x20;
    pub const EXCLAMATION_MARK: u8 = 0x21;
    pub const DOUBLE_QUOTE: u8 = 0x22;
    pub const SINGLE_QUOTE: u8 = 0x27;
    pub const DASH: u8 = 0x2D;
    pub const SLASH: u8 = 0x2F;
    pub const LT: u8 = 0x3C;
    pub const EQ: u8 = 0x3D;
    pub const GT: u8 = 0x3E;
    pub const QUESTION_MARK: u8 = 0x3F;
    pub const UPPER_A: u8 = 0x41;
    pub const UPPER_Z: u8 = 0x5A;
    pub const BACKSLASH: u8 = 0x5C;
    pub const LOWER_A: u8 = 0x61;
    pub const LOWER_Z: u8 = 0x7A;
    pub const LEFT_BRACE: u8 = 0x7B;
    pub const RIGHT_BRACE: u8 = 0x7D;
}

use char_codes::*;

/// All the states the tokenizer can be in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum State {
    Text = 1,

    // Tags
    BeforeTagName,
    InTagName,
    InSelfClosingTag,
    BeforeClosingTagName,
    InClosingTagName,
    AfterClosingTagName,

    // Attributes
    BeforeAttrName,
    InAttrName,
    AfterAttrName,
    BeforeAttrValue,
    InAttrValueDq,
    InAttrValueSq,
    InAttrValueTripleDq,
    InAttrValueTripleSq,
    InAttrValueNq,
    InAttrValueBrace,

    // Declarations and comments
    BeforeDeclaration,
    InDeclaration,
    InProcessingInstruction,
    BeforeComment,
    InCommentLike,

    // Content of <script>, <style>, <textarea>, <title>
    InRawText,
}

/// Quote type for attribute values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum QuoteType {
    NoValue = 0,
    Unquoted = 1,
    Single = 2,
    Double = 3,
    /// `"""..."""` or `'''...'''`
    Triple = 4,
    /// `{...}`; the reported span includes the braces
    Brace = 5,
}

/// Tokenizer error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    EofInTag,
    EofInAttributeValue,
    EofInBraceValue,
    EofInComment,
    MissingEndTagName,
}

impl ErrorCode {
    pub fn message(&self) -> &'static str {
        match self {
            Self::EofInTag => "Unterminated tag",
            Self::EofInAttributeValue => "Unterminated attribute value",
            Self::EofInBraceValue => "Unterminated '{' in attribute value",
            Self::EofInComment => "Unterminated comment",
            Self::MissingEndTagName => "Missing end tag name",
        }
    }
}

/// Tokenizer callbacks
pub trait Callbacks {
    fn on_text(&mut self, start: usize, end: usize);

    fn on_open_tag_name(&mut self, start: usize, end: usize);
    fn on_open_tag_end(&mut self, end: usize);
    fn on_self_closing_tag(&mut self, end: usize);
    fn on_close_tag(&mut self, start: usize, end: usize);

    fn on_attrib_name(&mut self, start: usize, end: usize);
    /// Value span without quotes (with braces for [`QuoteType::Brace`]).
    fn on_attrib_value(&mut self, quote: QuoteType, start: usize, end: usize);
    fn on_attrib_end(&mut self, quote: QuoteType, end: usize);

    fn on_comment(&mut self, start: usize, end: usize);
    /// `<!DOCTYPE ...>` and other declarations; the span covers `<!` to `>`.
    fn on_declaration(&mut self, start: usize, end: usize);

    fn on_end(&mut self);
    fn on_error(&mut self, code: ErrorCode, index: usize);
}

/// Check if character is a tag start character (a-z, A-Z)
#[inline]
pub fn is_tag_start_char(c: u8) -> bool {
    (LOWER_A..=LOWER_Z).contains(&c) || (UPPER_A..=UPPER_Z).contains(&c)
}

/// Check if character is whitespace
#[inline]
pub fn is_whitespace(c: u8) -> bool {
    c == SPACE || c == NEWLINE || c == TAB || c == FORM_FEED || c == CARRIAGE_RETURN
}

/// Check if character ends a tag section
#[inline]
pub fn is_end_of_tag_section(c: u8) -> bool {
    c == SLASH || c == GT || is_whitespace(c)
}

/// Markup tokenizer
pub struct Tokenizer<'a, C: Callbacks> {
    /// Input source
    input: &'a [u8],
    /// Current state
    state: State,
    /// Buffer start position
    section_start: usize,
    /// Position of the `<` that opened the current tag or declaration
    tag_start: usize,
    /// Current index
    index: usize,
    /// Callbacks
    callbacks: C,
    /// Name of the raw-text element whose content is being read
    raw_tag: Option<(usize, usize)>,
    /// Tag name of the element currently being opened
    open_tag: (usize, usize),
    /// Nesting depth inside a brace value
    brace_depth: u32,
    /// Open string quote inside a brace value
    brace_quote: Option<u8>,
}

impl<'a, C: Callbacks> Tokenizer<'a, C> {
    /// Create a new tokenizer
    pub fn new(input: &'a str, callbacks: C) -> Self {
        Self {
            input: input.as_bytes(),
            state: State::Text,
            section_start: 0,
            tag_start: 0,
            index: 0,
            callbacks,
            raw_tag: None,
            open_tag: (0, 0),
            brace_depth: 0,
            brace_quote: None,
        }
    }

    /// Consume the tokenizer and hand back the callbacks
    pub fn into_callbacks(self) -> C {
        self.callbacks
    }

    /// Tokenize the input
    pub fn tokenize(&mut self) {
        while self.index < self.input.len() {
            let c = self.input[self.index];

            match self.state {
                State::Text => self.state_text(c),
                State::BeforeTagName => self.state_before_tag_name(c),
                State::InTagName => self.state_in_tag_name(c),
                State::InSelfClosingTag => self.state_in_self_closing_tag(c),
                State::BeforeClosingTagName => self.state_before_closing_tag_name(c),
                State::InClosingTagName => self.state_in_closing_tag_name(c),
                State::AfterClosingTagName => self.state_after_closing_tag_name(c),
                State::BeforeAttrName => self.state_before_attr_name(c),
                State::InAttrName => self.state_in_attr_name(c),
                State::AfterAttrName => self.state_after_attr_name(c),
                State::BeforeAttrValue => self.state_before_attr_value(c),
                State::InAttrValueDq => self.state_in_attr_value_quoted(c, DOUBLE_QUOTE),
                State::InAttrValueSq => self.state_in_attr_value_quoted(c, SINGLE_QUOTE),
                State::InAttrValueTripleDq => self.state_in_attr_value_triple(c, DOUBLE_QUOTE),
                State::InAttrValueTripleSq => self.state_in_attr_value_triple(c, SINGLE_QUOTE),
                State::InAttrValueNq => self.state_in_attr_value_nq(c),
                State::InAttrValueBrace => self.state_in_attr_value_brace(c),
                State::BeforeDeclaration => self.state_before_declaration(c),
                State::InDeclaration => self.state_in_declaration(c),
                State::InProcessingInstruction => self.state_in_processing_instruction(c),
                State::BeforeComment => self.state_before_comment(c),
                State::InCommentLike => self.state_in_comment_like(c),
                State::InRawText => self.state_in_raw_text(c),
            }

            self.index += 1;
        }

        // Handle remaining content
        self.cleanup();
        self.callbacks.on_end();
    }

    fn cleanup(&mut self) {
        match self.state {
            State::Text | State::InRawText => {
                if self.section_start < self.index {
                    self.callbacks.on_text(self.section_start, self.index);
                }
            }
            // A lone `<` at the very end is text
            State::BeforeTagName => {
                self.callbacks.on_text(self.section_start, self.index);
            }
            State::InAttrValueDq
            | State::InAttrValueSq
            | State::InAttrValueTripleDq
            | State::InAttrValueTripleSq => {
                self.callbacks
                    .on_error(ErrorCode::EofInAttributeValue, self.section_start);
            }
            State::InAttrValueBrace => {
                self.callbacks
                    .on_error(ErrorCode::EofInBraceValue, self.section_start);
            }
            State::InCommentLike | State::BeforeComment => {
                self.callbacks.on_error(ErrorCode::EofInComment, self.tag_start);
            }
            State::InTagName
            | State::InSelfClosingTag
            | State::BeforeClosingTagName
            | State::InClosingTagName
            | State::AfterClosingTagName
            | State::BeforeAttrName
            | State::InAttrName
            | State::AfterAttrName
            | State::BeforeAttrValue
            | State::InAttrValueNq
            | State::BeforeDeclaration
            | State::InDeclaration
            | State::InProcessingInstruction => {
                self.callbacks.on_error(ErrorCode::EofInTag, self.tag_start);
            }
        }
    }

    #[inline]
    fn peek(&self, n: usize) -> Option<u8> {
        self.input.get(self.index + n).copied()
    }

    // ========== State handlers ==========

    fn state_text(&mut self, c: u8) {
        if c == LT {
            if self.index > self.section_start {
                self.callbacks.on_text(self.section_start, self.index);
            }
            self.state = State::BeforeTagName;
            self.section_start = self.index;
            self.tag_start = self.index;
        }
    }

    fn state_before_tag_name(&mut self, c: u8) {
        if c == EXCLAMATION_MARK {
            self.state = State::BeforeDeclaration;
            self.section_start = self.index + 1;
        } else if c == QUESTION_MARK {
            self.state = State::InProcessingInstruction;
            self.section_start = self.index + 1;
        } else if is_tag_start_char(c) {
            self.section_start = self.index;
            self.state = State::InTagName;
        } else if c == SLASH {
            self.state = State::BeforeClosingTagName;
        } else {
            // Not a tag: the `<` stays part of the text
            self.state = State::Text;
            self.state_text(c);
        }
    }

    fn state_in_tag_name(&mut self, c: u8) {
        if is_end_of_tag_section(c) {
            self.callbacks
                .on_open_tag_name(self.section_start, self.index);
            self.open_tag = (self.section_start, self.index);
            self.section_start = self.index;
            self.state = State::BeforeAttrName;
            self.state_before_attr_name(c);
        }
    }

    fn state_in_self_closing_tag(&mut self, c: u8) {
        if c == GT {
            self.callbacks.on_self_closing_tag(self.index);
            self.state = State::Text;
            self.section_start = self.index + 1;
        } else if !is_whitespace(c) {
            self.state = State::BeforeAttrName;
            self.state_before_attr_name(c);
        }
    }

    fn state_before_closing_tag_name(&mut self, c: u8) {
        if is_whitespace(c) {
            // Skip
        } else if c == GT {
            self.callbacks
                .on_error(ErrorCode::MissingEndTagName, self.index);
            self.state = State::Text;
            self.section_start = self.index + 1;
        } else {
            self.state = State::InClosingTagName;
            self.section_start = self.index;
        }
    }

    fn state_in_closing_tag_name(&mut self, c: u8) {
        if c == GT || is_whitespace(c) {
            self.callbacks.on_close_tag(self.section_start, self.index);
            self.section_start = self.index + 1;
            self.state = if c == GT {
                State::Text
            } else {
                State::AfterClosingTagName
            };
        }
    }

    fn state_after_closing_tag_name(&mut self, c: u8) {
        if c == GT {
            self.state = State::Text;
            self.section_start = self.index + 1;
        }
    }

    fn state_before_attr_name(&mut self, c: u8) {
        if c == GT {
            self.callbacks.on_open_tag_end(self.index);
            self.section_start = self.index + 1;
            self.state = if self.enter_raw_text() {
                State::InRawText
            } else {
                State::Text
            };
        } else if c == SLASH {
            self.state = State::InSelfClosingTag;
        } else if !is_whitespace(c) {
            self.state = State::InAttrName;
            self.section_start = self.index;
        }
    }

    /// Whether the tag just opened holds raw text.
    fn enter_raw_text(&mut self) -> bool {
        let (start, end) = self.open_tag;
        let name = &self.input[start..end];
        let is_raw = [
            b"script".as_slice(),
            b"style".as_slice(),
            b"textarea".as_slice(),
            b"title".as_slice(),
        ]
        .iter()
        .any(|raw| name.eq_ignore_ascii_case(raw));
        self.raw_tag = if is_raw { Some((start, end)) } else { None };
        is_raw
    }

    fn state_in_attr_name(&mut self, c: u8) {
        if c == EQ || is_end_of_tag_section(c) {
            self.callbacks
                .on_attrib_name(self.section_start, self.index);
            self.section_start = self.index;
            self.state = State::AfterAttrName;
            self.state_after_attr_name(c);
        }
    }

    fn state_after_attr_name(&mut self, c: u8) {
        if c == EQ {
            self.state = State::BeforeAttrValue;
        } else if c == SLASH || c == GT {
            self.callbacks.on_attrib_end(QuoteType::NoValue, self.index);
            self.state = State::BeforeAttrName;
            self.state_before_attr_name(c);
        } else if !is_whitespace(c) {
            self.callbacks.on_attrib_end(QuoteType::NoValue, self.index);
            self.state = State::InAttrName;
            self.section_start = self.index;
        }
    }

    fn state_before_attr_value(&mut self, c: u8) {
        if c == DOUBLE_QUOTE || c == SINGLE_QUOTE {
            if self.peek(1) == Some(c) && self.peek(2) == Some(c) {
                self.state = if c == DOUBLE_QUOTE {
                    State::InAttrValueTripleDq
                } else {
                    State::InAttrValueTripleSq
                };
                self.section_start = self.index + 3;
                self.index += 2;
            } else {
                self.state = if c == DOUBLE_QUOTE {
                    State::InAttrValueDq
                } else {
                    State::InAttrValueSq
                };
                self.section_start = self.index + 1;
            }
        } else if c == LEFT_BRACE {
            self.state = State::InAttrValueBrace;
            self.section_start = self.index;
            self.brace_depth = 1;
            self.brace_quote = None;
        } else if !is_whitespace(c) {
            self.section_start = self.index;
            self.state = State::InAttrValueNq;
            self.state_in_attr_value_nq(c);
        }
    }

    fn state_in_attr_value_quoted(&mut self, c: u8, quote: u8) {
        if c == quote {
            let quote_type = if quote == DOUBLE_QUOTE {
                QuoteType::Double
            } else {
                QuoteType::Single
            };
            self.emit_attr_value(quote_type, self.index);
            self.section_start = self.index + 1;
        }
    }

    fn state_in_attr_value_triple(&mut self, c: u8, quote: u8) {
        if c == quote && self.peek(1) == Some(quote) && self.peek(2) == Some(quote) {
            self.emit_attr_value(QuoteType::Triple, self.index);
            self.index += 2;
            self.section_start = self.index + 1;
        }
    }

    fn state_in_attr_value_nq(&mut self, c: u8) {
        if is_whitespace(c) || c == GT {
            self.emit_attr_value(QuoteType::Unquoted, self.index);
            self.section_start = self.index;
            self.state_before_attr_name(c);
        } else if c == SLASH && self.peek(1) == Some(GT) {
            self.emit_attr_value(QuoteType::Unquoted, self.index);
            self.section_start = self.index;
            self.state = State::InSelfClosingTag;
        }
    }

    fn state_in_attr_value_brace(&mut self, c: u8) {
        if let Some(quote) = self.brace_quote {
            if c == BACKSLASH {
                self.index += 1;
            } else if c == quote {
                self.brace_quote = None;
            }
            return;
        }
        match c {
            DOUBLE_QUOTE | SINGLE_QUOTE => self.brace_quote = Some(c),
            LEFT_BRACE => self.brace_depth += 1,
            RIGHT_BRACE => {
                self.brace_depth -= 1;
                if self.brace_depth == 0 {
                    self.emit_attr_value(QuoteType::Brace, self.index + 1);
                    self.section_start = self.index + 1;
                }
            }
            _ => {}
        }
    }

    fn emit_attr_value(&mut self, quote: QuoteType, end: usize) {
        self.callbacks
            .on_attrib_value(quote, self.section_start, end);
        self.callbacks.on_attrib_end(quote, end);
        self.state = State::BeforeAttrName;
    }

    fn state_before_declaration(&mut self, c: u8) {
        if c == DASH && self.peek(1) == Some(DASH) {
            self.state = State::BeforeComment;
        } else {
            self.state = State::InDeclaration;
        }
    }

    fn state_in_declaration(&mut self, c: u8) {
        if c == GT {
            self.callbacks
                .on_declaration(self.tag_start, self.index + 1);
            self.state = State::Text;
            self.section_start = self.index + 1;
        }
    }

    fn state_in_processing_instruction(&mut self, c: u8) {
        if c == GT {
            self.state = State::Text;
            self.section_start = self.index + 1;
        }
    }

    fn state_before_comment(&mut self, _c: u8) {
        // Second dash of `<!--`
        self.state = State::InCommentLike;
        self.section_start = self.index + 1;
    }

    fn state_in_comment_like(&mut self, c: u8) {
        if c == DASH && self.peek(1) == Some(DASH) && self.peek(2) == Some(GT) {
            self.callbacks.on_comment(self.section_start, self.index);
            self.index += 2;
            self.state = State::Text;
            self.section_start = self.index + 1;
        }
    }

    fn state_in_raw_text(&mut self, c: u8) {
        if c != LT || self.peek(1) != Some(SLASH) {
            return;
        }
        let Some((start, end)) = self.raw_tag else {
            return;
        };
        let name = &self.input[start..end];
        let after = self.index + 2;
        let candidate = self.input.get(after..after + name.len());
        let terminated = self
            .input
            .get(after + name.len())
            .map_or(true, |c| is_end_of_tag_section(*c));
        if candidate.is_some_and(|s| s.eq_ignore_ascii_case(name)) && terminated {
            if self.index > self.section_start {
                self.callbacks.on_text(self.section_start, self.index);
            }
            self.raw_tag = None;
            self.tag_start = self.index;
            self.section_start = after;
            self.state = State::InClosingTagName;
            self.index += 1;
        }
    }
}
