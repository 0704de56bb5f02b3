//! Reserved words and builtin names.

use phf::phf_set;

static KEYWORDS: phf::Set<&'static str> = phf_set! {
    "False", "None", "True", "and", "as", "assert", "async", "await",
    "break", "class", "continue", "def", "del", "elif", "else", "except",
    "finally", "for", "from", "global", "if", "import", "in", "is",
    "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
};

static BUILTINS: phf::Set<&'static str> = phf_set! {
    "abs", "aiter", "all", "anext", "any", "ascii", "bin", "bool",
    "breakpoint", "bytearray", "bytes", "callable", "chr", "classmethod",
    "compile", "complex", "delattr", "dict", "dir", "divmod", "enumerate",
    "eval", "exec", "filter", "float", "format", "frozenset", "getattr",
    "globals", "hasattr", "hash", "help", "hex", "id", "input", "int",
    "isinstance", "issubclass", "iter", "len", "list", "locals", "map",
    "max", "memoryview", "min", "next", "object", "oct", "open", "ord",
    "pow", "print", "property", "range", "repr", "reversed", "round",
    "set", "setattr", "slice", "sorted", "staticmethod", "str", "sum",
    "super", "tuple", "type", "vars", "zip", "__import__", "__name__",
    "__file__", "__doc__", "NotImplemented", "Ellipsis",
    "Exception", "BaseException", "ArithmeticError", "AssertionError",
    "AttributeError", "EOFError", "ImportError", "IndexError", "KeyError",
    "KeyboardInterrupt", "LookupError", "MemoryError", "NameError",
    "NotImplementedError", "OSError", "OverflowError", "RecursionError",
    "RuntimeError", "StopIteration", "StopAsyncIteration", "SyntaxError",
    "SystemExit", "TypeError", "UnicodeError", "ValueError",
    "ZeroDivisionError", "TimeoutError", "PermissionError",
    "FileNotFoundError", "ConnectionError",
};

/// Hard keywords. Soft keywords (`match`, `case`, `type`, `_`) are names.
#[inline]
pub fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(name)
}

#[inline]
pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords() {
        assert!(is_keyword("lambda"));
        assert!(is_keyword("None"));
        assert!(!is_keyword("match"));
        assert!(!is_keyword("print"));
    }

    #[test]
    fn test_builtins() {
        assert!(is_builtin("len"));
        assert!(is_builtin("ValueError"));
        assert!(!is_builtin("count"));
    }
}
