//! Code generator options.

use pywire_relief::ParserOptions;
use serde::{Deserialize, Serialize};

/// Compiler options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerOptions {
    /// Instance attribute that bare `print(...)` calls are routed to
    /// (`print(x)` -> `self.console.print(x)`). `None` keeps `print`.
    #[serde(default = "default_console_sink")]
    pub console_sink: Option<String>,

    /// Emit the SPA bootstrap on every page, not only multi-route ones
    #[serde(default)]
    pub pjax: bool,

    /// Package the generated module imports its runtime helpers from
    #[serde(default = "default_runtime_module")]
    pub runtime_module: String,

    /// Options forwarded to the parser by [`crate::compile`]
    #[serde(default)]
    pub parser: ParserOptions,
}

fn default_console_sink() -> Option<String> {
    Some("console".to_string())
}

fn default_runtime_module() -> String {
    "pywire.runtime".to_string()
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            console_sink: default_console_sink(),
            pjax: false,
            runtime_module: default_runtime_module(),
            parser: ParserOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = CompilerOptions::default();
        assert_eq!(opts.console_sink.as_deref(), Some("console"));
        assert!(!opts.pjax);
        assert_eq!(opts.runtime_module, "pywire.runtime");
        assert!(opts.parser.rename_head);
    }

    #[test]
    fn test_deserialize_camel_case() {
        let opts: CompilerOptions =
            serde_json::from_str(r#"{"consoleSink": null, "pjax": true}"#).unwrap();
        assert!(opts.console_sink.is_none());
        assert!(opts.pjax);
        assert_eq!(opts.runtime_module, "pywire.runtime");
    }
}
