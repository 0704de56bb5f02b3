//! Parser options.

use serde::{Deserialize, Serialize};

/// Parser options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParserOptions {
    /// Reject Python statements that appear in the markup without a `---`
    /// separator
    pub detect_unfenced_code: bool,
    /// Lines before this one are never reported as unfenced code
    pub unfenced_code_min_line: u32,
    /// Rename `<head>` to `<pywire-head>` so layouts can slot it
    pub rename_head: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            detect_unfenced_code: true,
            unfenced_code_min_line: 5,
            rename_head: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = ParserOptions::default();
        assert!(opts.detect_unfenced_code);
        assert_eq!(opts.unfenced_code_min_line, 5);
        assert!(opts.rename_head);
    }

    #[test]
    fn test_deserialize_partial() {
        let opts: ParserOptions = serde_json::from_str(r#"{"renameHead": false}"#).unwrap();
        assert!(!opts.rename_head);
        assert!(opts.detect_unfenced_code);
    }
}
