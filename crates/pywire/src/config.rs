//! Configuration file loading for pywire.
//!
//! Reads `pywire.config.json` from the current working directory.
//! Also provides the JSON Schema for editor autocompletion.

use pywire_atelier::CompilerOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "pywire.config.json";

/// Top-level pywire configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PywireConfig {
    /// JSON Schema reference (for editor autocompletion).
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Build command configuration.
    #[serde(default)]
    pub build: BuildConfig,

    /// Code generator options, including parser options under `parser`.
    #[serde(default)]
    pub compiler: CompilerOptions,

    /// `error`, `warn`, `info`, `debug` or `trace`. Overridden by `-v`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

/// Configuration for the `build` command.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    /// Output directory used when `--output` is not given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_dir: Option<PathBuf>,

    /// Patterns used when none are given on the command line.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<String>,
}

/// Load `pywire.config.json` from the given directory (or CWD if None).
///
/// A missing file yields the defaults; an unreadable or invalid one yields
/// the defaults with a warning.
pub fn load_config(dir: Option<&Path>) -> PywireConfig {
    let base = dir
        .map(|d| d.to_path_buf())
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
    let config_path = base.join(CONFIG_FILE);

    if !config_path.exists() {
        return PywireConfig::default();
    }

    // Logging is configured from this file, so warnings go straight to stderr
    match std::fs::read_to_string(&config_path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                eprintln!(
                    "Warning: Failed to parse {}: {}",
                    config_path.display(),
                    e
                );
                PywireConfig::default()
            }
        },
        Err(e) => {
            eprintln!(
                "Warning: Failed to read {}: {}",
                config_path.display(),
                e
            );
            PywireConfig::default()
        }
    }
}

/// JSON Schema for `pywire.config.json`.
pub const PYWIRE_CONFIG_SCHEMA: &str = r#"{
  "$schema": "http://json-schema.org/draft-07/schema#",
  "title": "PyWire Configuration",
  "description": "Configuration file for pywire - compiler for .pywire pages",
  "type": "object",
  "properties": {
    "$schema": {
      "type": "string",
      "description": "JSON Schema reference for editor autocompletion"
    },
    "build": {
      "type": "object",
      "description": "Build command configuration",
      "properties": {
        "outDir": {
          "type": "string",
          "description": "Output directory for generated modules"
        },
        "patterns": {
          "type": "array",
          "description": "Glob patterns of pages to compile",
          "items": { "type": "string" },
          "examples": [["pages/**/*.pywire"]]
        }
      },
      "additionalProperties": false
    },
    "compiler": {
      "type": "object",
      "description": "Code generator options",
      "properties": {
        "consoleSink": {
          "type": ["string", "null"],
          "description": "Instance attribute bare print() calls are routed to; null keeps print"
        },
        "pjax": {
          "type": "boolean",
          "description": "Emit the SPA bootstrap on every page"
        },
        "runtimeModule": {
          "type": "string",
          "description": "Package generated modules import runtime helpers from"
        },
        "parser": {
          "type": "object",
          "properties": {
            "detectUnfencedCode": { "type": "boolean" },
            "unfencedCodeMinLine": { "type": "integer", "minimum": 0 },
            "renameHead": { "type": "boolean" }
          },
          "additionalProperties": false
        }
      },
      "additionalProperties": false
    },
    "logLevel": {
      "type": "string",
      "enum": ["error", "warn", "info", "debug", "trace"]
    }
  },
  "additionalProperties": false
}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(dir.path()));
        assert!(config.build.patterns.is_empty());
        assert_eq!(config.compiler, CompilerOptions::default());
    }

    #[test]
    fn test_load_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{
                "build": { "outDir": "out", "patterns": ["pages/**/*.pywire"] },
                "compiler": { "consoleSink": null, "parser": { "renameHead": false } },
                "logLevel": "debug"
            }"#,
        )
        .unwrap();
        let config = load_config(Some(dir.path()));
        assert_eq!(config.build.out_dir, Some(PathBuf::from("out")));
        assert_eq!(config.build.patterns, vec!["pages/**/*.pywire"]);
        assert_eq!(config.compiler.console_sink, None);
        assert!(!config.compiler.parser.rename_head);
        assert!(config.compiler.parser.detect_unfenced_code);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_invalid_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{ not json").unwrap();
        let config = load_config(Some(dir.path()));
        assert!(config.build.out_dir.is_none());
    }

    #[test]
    fn test_schema_is_valid_json() {
        let schema: serde_json::Value = serde_json::from_str(PYWIRE_CONFIG_SCHEMA).unwrap();
        assert_eq!(schema["title"], "PyWire Configuration");
    }
}
