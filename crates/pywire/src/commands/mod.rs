//! Subcommands and the page discovery they share.

pub mod build;
pub mod check;
pub mod inspect;

use glob::{MatchOptions, Pattern};
use ignore::Walk;
use std::path::{Component, Path, PathBuf};

pub const PAGE_EXTENSION: &str = "pywire";
pub const DEFAULT_PATTERN: &str = "./**/*.pywire";

/// Command-line patterns, else the configured ones, else the default.
pub fn effective_patterns(cli: &[String], configured: &[String]) -> Vec<String> {
    if !cli.is_empty() {
        cli.to_vec()
    } else if !configured.is_empty() {
        configured.to_vec()
    } else {
        vec![DEFAULT_PATTERN.to_string()]
    }
}

/// Every `.pywire` file matched by `patterns`, sorted and deduplicated.
/// Walking honours `.gitignore`.
pub fn collect_files(patterns: &[String]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for pattern in patterns {
        let (root, glob_pattern) = parse_pattern(pattern);
        let matcher = Pattern::new(&normalize(&glob_pattern)).ok();

        for entry in Walk::new(&root).flatten() {
            let path = entry.path();
            if !path.extension().is_some_and(|ext| ext == PAGE_EXTENSION) {
                continue;
            }
            let matched = match &matcher {
                Some(matcher) => matcher.matches_with(&normalize(&path.to_string_lossy()), MATCH),
                None => true,
            };
            if matched {
                files.push(path.to_path_buf());
            }
        }
    }

    files.sort();
    files.dedup();
    files
}

const MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Split a pattern into the directory to walk and the glob to match.
fn parse_pattern(pattern: &str) -> (String, String) {
    if let Some(pos) = pattern.find(['*', '?', '[']) {
        let root_part = &pattern[..pos];
        let root = match root_part.rfind('/') {
            Some(last_slash) => &pattern[..last_slash],
            None => ".",
        };
        let root = if root.is_empty() { "." } else { root };
        return (root.to_string(), pattern.to_string());
    }

    let path = Path::new(pattern);
    if path.is_dir() {
        let dir = pattern.trim_end_matches('/');
        return (dir.to_string(), format!("{}/**/*.{}", dir, PAGE_EXTENSION));
    }

    let parent = path
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| ".".to_string());
    (parent, pattern.to_string())
}

/// Forward slashes, no leading `./`.
fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/");
    let mut rest = path.as_str();
    while let Some(stripped) = rest.strip_prefix("./") {
        rest = stripped;
    }
    rest.to_string()
}

/// Path handed to the compiler as the page's file path. It feeds class
/// names and hashes, so it is kept stable across platforms.
pub fn page_path(path: &Path) -> String {
    normalize(&path.to_string_lossy())
}

/// `path` with `.`, `..` and root components removed, for placing output
/// under another directory.
pub fn relative_output_path(path: &Path) -> PathBuf {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, rel: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "<p>x</p>").unwrap();
    }

    #[test]
    fn test_effective_patterns() {
        assert_eq!(effective_patterns(&[], &[]), vec![DEFAULT_PATTERN]);
        assert_eq!(
            effective_patterns(&[], &["pages/*.pywire".to_string()]),
            vec!["pages/*.pywire"]
        );
        assert_eq!(
            effective_patterns(&["a.pywire".to_string()], &["b".to_string()]),
            vec!["a.pywire"]
        );
    }

    #[test]
    fn test_parse_pattern() {
        assert_eq!(
            parse_pattern("pages/**/*.pywire"),
            ("pages".to_string(), "pages/**/*.pywire".to_string())
        );
        assert_eq!(
            parse_pattern("*.pywire"),
            (".".to_string(), "*.pywire".to_string())
        );
        assert_eq!(
            parse_pattern("pages/index.pywire"),
            ("pages".to_string(), "pages/index.pywire".to_string())
        );
    }

    #[test]
    fn test_collect_files_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "pages/index.pywire");
        touch(dir.path(), "pages/blog/post.pywire");
        touch(dir.path(), "pages/notes.txt");

        let root = dir.path().join("pages");
        let files = collect_files(&[root.to_string_lossy().into_owned()]);
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.extension().is_some_and(|e| e == "pywire")));
    }

    #[test]
    fn test_relative_output_path() {
        assert_eq!(
            relative_output_path(Path::new("./pages/../pages/index.pywire")),
            PathBuf::from("pages/pages/index.pywire")
        );
        assert_eq!(
            relative_output_path(Path::new("pages/index.pywire")),
            PathBuf::from("pages/index.pywire")
        );
    }

    #[test]
    fn test_page_path() {
        assert_eq!(page_path(Path::new("./pages/index.pywire")), "pages/index.pywire");
    }
}
