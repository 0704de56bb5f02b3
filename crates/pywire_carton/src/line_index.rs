//! Offset to line/column lookup.
//!
//! The table stores the byte offset of every `\n` in the source; a lookup is
//! a binary search over it. Lines and columns are 1-based and columns count
//! bytes, like the positions produced by the markup tokenizer.

use memchr::memchr_iter;

/// Newline table for one source text.
#[derive(Debug, Clone, Default)]
pub struct LineIndex {
    newlines: Vec<u32>,
    len: u32,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let newlines = memchr_iter(b'\n', source.as_bytes())
            .map(|i| i as u32)
            .collect();
        Self {
            newlines,
            len: source.len() as u32,
        }
    }

    /// Line and column (both 1-based) of a byte offset.
    pub fn line_col(&self, offset: u32) -> (u32, u32) {
        let offset = offset.min(self.len);
        let line = match self.newlines.binary_search(&offset) {
            Ok(i) => i + 1,
            Err(i) => i + 1,
        };

        let column = if line == 1 {
            offset + 1
        } else {
            offset - self.newlines[line - 2]
        };

        (line as u32, column)
    }

    /// Byte offset where the given 1-based line starts.
    pub fn line_start(&self, line: u32) -> u32 {
        match line {
            0 | 1 => 0,
            n => self
                .newlines
                .get(n as usize - 2)
                .map(|nl| nl + 1)
                .unwrap_or(self.len),
        }
    }

    /// Number of lines in the source (a trailing newline opens a new line).
    pub fn line_count(&self) -> u32 {
        self.newlines.len() as u32 + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_line() {
        let index = LineIndex::new("hello\nworld");
        assert_eq!(index.line_col(0), (1, 1));
        assert_eq!(index.line_col(4), (1, 5));
    }

    #[test]
    fn test_following_lines() {
        let index = LineIndex::new("a\nbc\n\nd");
        assert_eq!(index.line_col(2), (2, 1));
        assert_eq!(index.line_col(3), (2, 2));
        assert_eq!(index.line_col(6), (4, 1));
    }

    #[test]
    fn test_newline_belongs_to_its_line() {
        let index = LineIndex::new("ab\ncd");
        assert_eq!(index.line_col(2), (1, 3));
    }

    #[test]
    fn test_line_start() {
        let index = LineIndex::new("ab\ncd\nef");
        assert_eq!(index.line_start(1), 0);
        assert_eq!(index.line_start(2), 3);
        assert_eq!(index.line_start(3), 6);
        assert_eq!(index.line_start(9), 8);
        assert_eq!(index.line_count(), 3);
    }
}
