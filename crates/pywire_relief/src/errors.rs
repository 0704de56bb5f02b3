//! Compiler errors.
//!
//! Every failure carries the file and the 1-based line it refers to, so the
//! runtime can point the user at their own source.

use pywire_croquis::PySyntaxError;
use serde::Serialize;
use thiserror::Error;

/// Errors that abort a parse or a generate call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CompileError {
    /// Malformed dialect construct (directive, special attribute, section)
    #[error("{file}:{line}:{column}: {message}")]
    Syntax {
        file: String,
        line: u32,
        column: u32,
        message: String,
    },

    /// A valid document that cannot be lowered
    #[error("{file}:{line}: {message}")]
    CodeGeneration {
        file: String,
        line: u32,
        message: String,
    },

    /// Invalid Python in the code section or in an embedded expression
    #[error("{file}:{line}:{column}: {message}")]
    EmbeddedCode {
        file: String,
        line: u32,
        column: u32,
        message: String,
    },
}

pub type CompileResult<T> = Result<T, CompileError>;

impl CompileError {
    pub fn syntax(file: &str, line: u32, column: u32, message: impl Into<String>) -> Self {
        Self::Syntax {
            file: file.to_string(),
            line,
            column,
            message: message.into(),
        }
    }

    pub fn codegen(file: &str, line: u32, message: impl Into<String>) -> Self {
        Self::CodeGeneration {
            file: file.to_string(),
            line,
            message: message.into(),
        }
    }

    /// Wrap a Python front end error. Its line is already absolute.
    pub fn embedded(file: &str, err: PySyntaxError) -> Self {
        Self::EmbeddedCode {
            file: file.to_string(),
            line: err.line,
            column: err.column,
            message: err.message,
        }
    }

    pub fn file(&self) -> &str {
        match self {
            Self::Syntax { file, .. }
            | Self::CodeGeneration { file, .. }
            | Self::EmbeddedCode { file, .. } => file,
        }
    }

    pub fn line(&self) -> u32 {
        match self {
            Self::Syntax { line, .. }
            | Self::CodeGeneration { line, .. }
            | Self::EmbeddedCode { line, .. } => *line,
        }
    }

    pub fn column(&self) -> Option<u32> {
        match self {
            Self::Syntax { column, .. } | Self::EmbeddedCode { column, .. } => Some(*column),
            Self::CodeGeneration { .. } => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Syntax { message, .. }
            | Self::CodeGeneration { message, .. }
            | Self::EmbeddedCode { message, .. } => message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_column() {
        let err = CompileError::syntax("pages/index.pywire", 3, 7, "Unknown directive '!foo'");
        assert_eq!(
            err.to_string(),
            "pages/index.pywire:3:7: Unknown directive '!foo'"
        );
    }

    #[test]
    fn test_display_without_column() {
        let err = CompileError::codegen("a.pywire", 2, "Multiple !path directives");
        assert_eq!(err.to_string(), "a.pywire:2: Multiple !path directives");
        assert_eq!(err.column(), None);
    }

    #[test]
    fn test_embedded_keeps_absolute_line() {
        let err = CompileError::embedded("a.pywire", PySyntaxError::new(12, 5, "invalid syntax"));
        assert!(matches!(err, CompileError::EmbeddedCode { line: 12, .. }));
        assert_eq!(err.message(), "invalid syntax");
        assert_eq!(err.file(), "a.pywire");
    }
}
