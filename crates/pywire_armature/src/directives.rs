//! Directive resolvers.
//!
//! The directive set is closed, so resolution is an ordered list of
//! [`DirectiveKind`]s, each with a `can_parse` prefix test and a `parse`
//! step. The first kind whose prefix matches owns the line.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use pywire_carton::{is_identifier, LineIndex};
use pywire_croquis::ast::DictItem;
use pywire_croquis::{is_keyword, parse_expression, Expr};
use pywire_relief::{
    CompileError, CompileResult, ComponentDirective, Directive, LayoutDirective, NoSpaDirective,
    PathDirective, Position, Route, SourceLocation,
};

use crate::sections::DirectiveSource;

static COMPONENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^!component\s+(?:"([^"]*)"|'([^']*)')\s+as\s+(\S+)\s*$"#).unwrap()
});

/// Directive kinds in resolution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    Path,
    Layout,
    Component,
    NoSpa,
}

pub const DIRECTIVE_RESOLVERS: [DirectiveKind; 4] = [
    DirectiveKind::Path,
    DirectiveKind::Layout,
    DirectiveKind::Component,
    DirectiveKind::NoSpa,
];

impl DirectiveKind {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Path => "!path",
            Self::Layout => "!layout",
            Self::Component => "!component",
            Self::NoSpa => "!no_spa",
        }
    }

    /// The line starts with this directive's keyword as a whole word.
    pub fn can_parse(self, text: &str) -> bool {
        let keyword = self.keyword();
        text.starts_with(keyword)
            && text[keyword.len()..]
                .chars()
                .next()
                .map_or(true, |c| c.is_whitespace() || c == '{' || c == '"' || c == '\'')
    }

    pub fn parse(self, src: &DirectiveSource, ctx: &DirectiveContext<'_>) -> CompileResult<Directive> {
        let loc = ctx.loc(src);
        let argument = src.text[self.keyword().len()..].trim();
        match self {
            Self::Path => parse_path(argument, src, ctx, loc),
            Self::Layout => {
                let layout_path = literal_string(argument, src).ok_or_else(|| {
                    ctx.error(src, "!layout expects a quoted path: !layout \"layouts/base.pywire\"")
                })?;
                Ok(Directive::Layout(LayoutDirective { layout_path, loc }))
            }
            Self::Component => parse_component(src, ctx, loc),
            Self::NoSpa => {
                if !argument.is_empty() {
                    return Err(ctx.error(src, "!no_spa takes no arguments"));
                }
                Ok(Directive::NoSpa(NoSpaDirective { loc }))
            }
        }
    }
}

/// Shared state for resolving the directives of one document
pub struct DirectiveContext<'a> {
    pub file: &'a str,
    pub index: &'a LineIndex,
}

impl DirectiveContext<'_> {
    fn loc(&self, src: &DirectiveSource) -> SourceLocation {
        let start = Position::new(src.offset, src.line, src.column);
        let end_offset = src.offset + src.text.len() as u32;
        let (line, column) = self.index.line_col(end_offset);
        SourceLocation::new(start, Position::new(end_offset, line, column))
    }

    fn error(&self, src: &DirectiveSource, message: impl Into<String>) -> CompileError {
        CompileError::syntax(self.file, src.line, src.column, message)
    }
}

/// Resolve every directive line of a document.
pub fn resolve_directives(
    sources: &[DirectiveSource],
    ctx: &DirectiveContext<'_>,
) -> CompileResult<Vec<Directive>> {
    let mut directives: Vec<Directive> = Vec::with_capacity(sources.len());
    for src in sources {
        let kind = DIRECTIVE_RESOLVERS
            .iter()
            .find(|kind| kind.can_parse(&src.text))
            .ok_or_else(|| {
                let word = src.text.split_whitespace().next().unwrap_or("!");
                ctx.error(src, format!("Unknown directive '{}'", word))
            })?;
        let directive = kind.parse(src, ctx)?;

        match &directive {
            Directive::Layout(_) if directives.iter().any(|d| matches!(d, Directive::Layout(_))) => {
                return Err(ctx.error(src, "Only one !layout directive is allowed"));
            }
            Directive::Component(c) => {
                let duplicate = directives.iter().any(|d| {
                    matches!(d, Directive::Component(o) if o.component_name == c.component_name)
                });
                if duplicate {
                    return Err(ctx.error(
                        src,
                        format!("Component '{}' is already declared", c.component_name),
                    ));
                }
            }
            _ => {}
        }

        debug!(directive = directive.name(), line = src.line, "resolved directive");
        directives.push(directive);
    }
    Ok(directives)
}

fn literal_string(argument: &str, src: &DirectiveSource) -> Option<String> {
    parse_expression(argument, src.line, src.column)
        .ok()
        .and_then(|expr| expr.as_str_value())
        .filter(|path| !path.is_empty())
}

fn parse_path(
    argument: &str,
    src: &DirectiveSource,
    ctx: &DirectiveContext<'_>,
    loc: SourceLocation,
) -> CompileResult<Directive> {
    if argument.is_empty() {
        return Err(ctx.error(src, "!path expects a route string or a mapping of routes"));
    }
    let expr = parse_expression(argument, src.line, src.column)
        .map_err(|err| ctx.error(src, format!("Invalid !path value: {}", err.message)))?;

    match &expr {
        Expr::Str(_) => {
            let pattern = expr
                .as_str_value()
                .ok_or_else(|| ctx.error(src, "!path routes must be literal strings"))?;
            Ok(Directive::Path(PathDirective {
                routes: vec![Route {
                    name: "main".into(),
                    pattern,
                }],
                is_simple_string: true,
                loc,
            }))
        }
        Expr::Dict(items) => {
            let mut routes: Vec<Route> = Vec::with_capacity(items.len());
            for item in items {
                let DictItem::Pair(key, value) = item else {
                    return Err(ctx.error(src, "!path mappings cannot unpack other mappings"));
                };
                let (Some(name), Some(pattern)) = (key.as_str_value(), value.as_str_value())
                else {
                    return Err(ctx.error(
                        src,
                        "!path route names and values must be literal strings",
                    ));
                };
                if routes.iter().any(|r| r.name.as_str() == name) {
                    return Err(ctx.error(src, format!("Duplicate route name '{}' in !path", name)));
                }
                routes.push(Route {
                    name: name.into(),
                    pattern,
                });
            }
            if routes.is_empty() {
                return Err(ctx.error(src, "!path mapping must declare at least one route"));
            }
            Ok(Directive::Path(PathDirective {
                routes,
                is_simple_string: false,
                loc,
            }))
        }
        _ => Err(ctx.error(
            src,
            "!path expects a route string or a mapping of literal routes",
        )),
    }
}

fn parse_component(
    src: &DirectiveSource,
    ctx: &DirectiveContext<'_>,
    loc: SourceLocation,
) -> CompileResult<Directive> {
    let caps = COMPONENT.captures(&src.text).ok_or_else(|| {
        ctx.error(src, "!component expects: !component \"path/to/file.pywire\" as Name")
    })?;
    let path = caps
        .get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    let alias = caps.get(3).map(|m| m.as_str()).unwrap_or_default();
    if !is_identifier(alias) || is_keyword(alias) {
        return Err(ctx.error(
            src,
            format!("Invalid component name '{}': expected an identifier", alias),
        ));
    }
    if path.is_empty() {
        return Err(ctx.error(src, "!component path cannot be empty"));
    }
    Ok(Directive::Component(ComponentDirective {
        path,
        component_name: alias.into(),
        loc,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(lines: &[&str]) -> CompileResult<Vec<Directive>> {
        let sources: Vec<DirectiveSource> = lines
            .iter()
            .enumerate()
            .map(|(i, text)| DirectiveSource {
                text: text.to_string(),
                line: i as u32 + 1,
                column: 1,
                offset: 0,
            })
            .collect();
        let joined = lines.join("\n");
        let index = LineIndex::new(&joined);
        let ctx = DirectiveContext {
            file: "page.pywire",
            index: &index,
        };
        resolve_directives(&sources, &ctx)
    }

    #[test]
    fn test_path_string() {
        let directives = resolve(&["!path \"/test\""]).unwrap();
        let Directive::Path(path) = &directives[0] else {
            panic!("expected path directive");
        };
        assert!(path.is_simple_string);
        assert_eq!(path.route("main"), Some("/test"));
    }

    #[test]
    fn test_path_mapping() {
        let directives = resolve(&["!path {'main': '/', 'detail': '/items/{id}'}"]).unwrap();
        let Directive::Path(path) = &directives[0] else {
            panic!("expected path directive");
        };
        assert!(!path.is_simple_string);
        assert_eq!(path.route("main"), Some("/"));
        assert_eq!(path.route("detail"), Some("/items/{id}"));
    }

    #[test]
    fn test_path_rejects_dynamic_values() {
        let err = resolve(&["!path {'main': base + '/x'}"]).unwrap_err();
        assert!(err.message().contains("literal strings"));
        assert!(resolve(&["!path some_var"]).is_err());
        assert!(resolve(&["!path f'/x/{y}'"]).is_err());
    }

    #[test]
    fn test_path_duplicate_route_name() {
        let err = resolve(&["!path {'a': '/', 'a': '/x'}"]).unwrap_err();
        assert!(err.message().contains("Duplicate route name 'a'"));
    }

    #[test]
    fn test_layout_and_duplicate() {
        let directives = resolve(&["!layout \"layouts/base.pywire\""]).unwrap();
        assert!(matches!(&directives[0], Directive::Layout(l) if l.layout_path == "layouts/base.pywire"));
        assert!(resolve(&["!layout 'a.pywire'", "!layout 'b.pywire'"]).is_err());
    }

    #[test]
    fn test_component() {
        let directives = resolve(&["!component 'components/card.pywire' as Card"]).unwrap();
        let Directive::Component(c) = &directives[0] else {
            panic!("expected component directive");
        };
        assert_eq!(c.path, "components/card.pywire");
        assert_eq!(c.component_name.as_str(), "Card");
    }

    #[test]
    fn test_component_errors() {
        assert!(resolve(&["!component 'a.pywire' as 1Bad"]).is_err());
        assert!(resolve(&["!component 'a.pywire'"]).is_err());
        let err = resolve(&[
            "!component 'a.pywire' as Card",
            "!component 'b.pywire' as Card",
        ])
        .unwrap_err();
        assert_eq!(err.line(), 2);
    }

    #[test]
    fn test_no_spa_and_unknown() {
        let directives = resolve(&["!no_spa"]).unwrap();
        assert!(matches!(directives[0], Directive::NoSpa(_)));
        let err = resolve(&["!bogus value"]).unwrap_err();
        assert_eq!(err.message(), "Unknown directive '!bogus'");
        // `!pathx` is not `!path`
        assert!(resolve(&["!pathx '/'"]).is_err());
    }
}
