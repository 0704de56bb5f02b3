//! Errors raised by the embedded code front end.

use serde::{Deserialize, Serialize};

/// A syntax error in embedded Python.
///
/// `line` is absolute in the document being compiled (the tokenizer is told
/// where the code starts), `column` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} (line {line}, column {column})")]
pub struct PySyntaxError {
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl PySyntaxError {
    pub fn new(line: u32, column: u32, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

pub type PyResult<T> = Result<T, PySyntaxError>;
