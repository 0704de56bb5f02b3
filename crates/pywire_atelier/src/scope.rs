//! Page-level name resolution.
//!
//! Decides which bare names in user code and template expressions refer to
//! page state (and are rewritten to `self.NAME`), which functions are
//! coroutines, and what the generated class is called.

use pywire_carton::{is_identifier, FxHashSet};
use pywire_croquis::analysis::{assigned_names, global_names};
use pywire_croquis::ast::Alias;
use pywire_croquis::{is_keyword, target_names, Ident, Module, StmtKind};

/// Request variables every page instance carries.
pub const IMPLICIT_NAMES: [&str; 8] = [
    "path",
    "params",
    "query",
    "url",
    "request",
    "error_code",
    "error_detail",
    "error_trace",
];

/// Names visible to the code of one page.
#[derive(Debug, Default)]
pub struct PageScope {
    /// Names rewritten to `self.NAME`
    pub known: FxHashSet<Ident>,
    /// Top-level functions, which become methods
    pub methods: FxHashSet<Ident>,
    /// Top-level `async def` functions
    pub async_methods: FxHashSet<Ident>,
    /// Names bound by top-level imports; never rewritten
    pub imports: FxHashSet<Ident>,
}

impl PageScope {
    pub fn new(module: Option<&Module>, file_path: &str) -> Self {
        let mut scope = Self::default();
        scope.known.extend(IMPLICIT_NAMES.iter().map(|n| Ident::new(n)));
        scope.known.extend(route_params(file_path));

        let Some(module) = module else {
            return scope;
        };

        for stmt in &module.body {
            match &stmt.kind {
                StmtKind::FunctionDef(def) => {
                    scope.methods.insert(def.name.clone());
                    if def.is_async {
                        scope.async_methods.insert(def.name.clone());
                    }
                }
                StmtKind::Assign { targets, .. } => {
                    let mut names = Vec::new();
                    for target in targets {
                        target_names(target, &mut names);
                    }
                    scope.known.extend(names);
                }
                StmtKind::AnnAssign { target, .. } => {
                    let mut names = Vec::new();
                    target_names(target, &mut names);
                    scope.known.extend(names);
                }
                StmtKind::Import(names) | StmtKind::ImportFrom { names, .. } => {
                    scope.imports.extend(import_names(names));
                }
                _ => {}
            }
        }

        // Names assigned by statements that run in `__top_level_init__`
        scope.known.extend(assigned_names(&module.body));
        scope.known.extend(global_names(&module.body));
        scope.known.extend(scope.methods.iter().cloned());

        let imports = &scope.imports;
        scope.known.retain(|name| !imports.contains(name));
        scope
    }

    /// Whether a bare name resolves to something the page or Python defines.
    pub fn resolves(&self, name: &str) -> bool {
        self.known.contains(name) || self.imports.contains(name)
    }
}

fn import_names(names: &[Alias]) -> impl Iterator<Item = Ident> + '_ {
    names
        .iter()
        .filter(|alias| alias.name != "*")
        .map(|alias| Ident::new(alias.bound_name()))
}

/// `[param]` segments of a file path (`pages/users/[id].pywire` -> `id`).
pub fn route_params(file_path: &str) -> Vec<Ident> {
    file_path
        .split(['/', '\\'])
        .filter_map(|segment| {
            let segment = segment.strip_suffix(".pywire").unwrap_or(segment);
            let inner = segment.strip_prefix('[')?.strip_suffix(']')?;
            let inner = inner.trim_start_matches("...");
            (is_identifier(inner) && !is_keyword(inner)).then(|| Ident::new(inner))
        })
        .collect()
}

/// Class name for a page file: `user_profile.pywire` -> `UserProfilePage`.
pub fn class_name(file_path: &str) -> String {
    let file_name = file_path.rsplit(['/', '\\']).next().unwrap_or_default();
    let stem = match file_name.rfind('.') {
        Some(dot) if dot > 0 => &file_name[..dot],
        _ => file_name,
    };

    let mut name = String::with_capacity(stem.len() + 4);
    for word in stem.split(|c: char| !c.is_alphanumeric()) {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            name.extend(first.to_uppercase());
            name.extend(chars.flat_map(char::to_lowercase));
        }
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name.push_str("Page");
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use pywire_croquis::parse_module;

    fn names(set: &FxHashSet<Ident>) -> Vec<String> {
        let mut out: Vec<String> = set.iter().map(|n| n.to_string()).collect();
        out.sort();
        out
    }

    #[test]
    fn test_class_name() {
        assert_eq!(class_name("pages/index.pywire"), "IndexPage");
        assert_eq!(class_name("user_profile.pywire"), "UserProfilePage");
        assert_eq!(class_name("pages/blog-post.pywire"), "BlogPostPage");
        assert_eq!(class_name("pages/[id].pywire"), "IdPage");
        assert_eq!(class_name("404.pywire"), "_404Page");
        assert_eq!(class_name(""), "Page");
    }

    #[test]
    fn test_route_params() {
        let params = route_params("pages/users/[user_id]/posts/[slug].pywire");
        assert_eq!(params, vec![Ident::new("user_id"), Ident::new("slug")]);
        assert!(route_params("pages/index.pywire").is_empty());
    }

    #[test]
    fn test_page_scope() {
        let module = parse_module(
            "import os\nfrom x import y as z\ncount = 0\nlabel: str = 'a'\nasync def load():\n    global total\ndef inc():\n    pass\nfor i in range(2):\n    seen = i\n",
            1,
        )
        .unwrap();
        let scope = PageScope::new(Some(&module), "pages/[id].pywire");

        let known = names(&scope.known);
        for expected in ["count", "label", "load", "inc", "total", "i", "seen", "id", "path"] {
            assert!(known.contains(&expected.to_string()), "missing {}", expected);
        }
        assert!(!known.contains(&"os".to_string()));
        assert!(!known.contains(&"z".to_string()));
        assert_eq!(names(&scope.async_methods), vec!["load"]);
        assert!(scope.resolves("z"));
        assert!(!scope.resolves("item"));
    }
}
