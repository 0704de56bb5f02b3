//! Indentation-aware output buffer.
//!
//! Every line written carries an optional origin: the line in the user's
//! source file it was generated from. The resulting [`LineMap`] is what lets
//! the loader translate a traceback line in generated code back to the
//! user's file.

use serde::{Deserialize, Serialize};

const INDENT: &str = "    ";

/// Generated line -> source line table.
///
/// `lines[i]` is the source line of generated line `i + 1`; `0` means the
/// line is synthetic and has no source counterpart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineMap {
    lines: Vec<u32>,
}

impl LineMap {
    /// Source line for a 1-based generated line.
    pub fn source_line(&self, generated: u32) -> Option<u32> {
        if generated == 0 {
            return None;
        }
        match self.lines.get(generated as usize - 1) {
            Some(0) | None => None,
            Some(line) => Some(*line),
        }
    }

    /// All `(generated, source)` pairs that have an origin.
    pub fn mappings(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.lines
            .iter()
            .enumerate()
            .filter(|(_, src)| **src != 0)
            .map(|(i, src)| (i as u32 + 1, *src))
    }

    /// Number of generated lines covered.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Output buffer for generated Python source.
#[derive(Debug, Default)]
pub struct CodeWriter {
    code: String,
    indent_level: u32,
    lines: Vec<u32>,
}

impl CodeWriter {
    pub fn new() -> Self {
        Self {
            code: String::with_capacity(4096),
            indent_level: 0,
            lines: Vec::with_capacity(128),
        }
    }

    #[inline]
    pub fn indent(&mut self) {
        self.indent_level += 1;
    }

    #[inline]
    pub fn dedent(&mut self) {
        self.indent_level = self.indent_level.saturating_sub(1);
    }

    #[inline]
    pub fn indent_level(&self) -> u32 {
        self.indent_level
    }

    /// 1-based number of the line the next `line()` call will write.
    #[inline]
    pub fn next_line(&self) -> u32 {
        self.lines.len() as u32 + 1
    }

    /// Write one logical line at the current indentation.
    ///
    /// Embedded newlines (triple-quoted strings) are written verbatim and
    /// every physical line they cover maps to the same origin.
    pub fn line(&mut self, text: &str, origin: Option<u32>) {
        for _ in 0..self.indent_level {
            self.code.push_str(INDENT);
        }
        self.code.push_str(text);
        self.code.push('\n');

        let origin = origin.unwrap_or(0);
        let physical = 1 + text.bytes().filter(|b| *b == b'\n').count();
        self.lines.extend(std::iter::repeat(origin).take(physical));
    }

    /// Write an empty line.
    pub fn blank(&mut self) {
        self.code.push('\n');
        self.lines.push(0);
    }

    pub fn finish(self) -> (String, LineMap) {
        (self.code, LineMap { lines: self.lines })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indentation() {
        let mut w = CodeWriter::new();
        w.line("class A:", None);
        w.indent();
        w.line("x = 1", Some(3));
        w.dedent();
        w.line("y = 2", None);
        let (code, _) = w.finish();
        assert_eq!(code, "class A:\n    x = 1\ny = 2\n");
    }

    #[test]
    fn test_line_map() {
        let mut w = CodeWriter::new();
        w.line("a", None);
        w.blank();
        w.line("b", Some(10));
        let (_, map) = w.finish();
        assert_eq!(map.source_line(1), None);
        assert_eq!(map.source_line(2), None);
        assert_eq!(map.source_line(3), Some(10));
        assert_eq!(map.source_line(4), None);
        assert_eq!(map.mappings().collect::<Vec<_>>(), vec![(3, 10)]);
    }

    #[test]
    fn test_multiline_text_maps_every_line() {
        let mut w = CodeWriter::new();
        w.line("s = '''one\ntwo'''", Some(5));
        w.line("t = 1", Some(7));
        assert_eq!(w.next_line(), 4);
        let (_, map) = w.finish();
        assert_eq!(map.source_line(2), Some(5));
        assert_eq!(map.source_line(3), Some(7));
    }

    #[test]
    fn test_line_map_serializes() {
        let mut w = CodeWriter::new();
        w.line("x", Some(2));
        let (_, map) = w.finish();
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"lines":[2]}"#);
    }
}
