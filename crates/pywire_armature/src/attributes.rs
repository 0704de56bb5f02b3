//! Attribute resolvers.
//!
//! Every attribute of a tag is offered to the resolvers in priority order
//! (bind, conditional, loop, key, reactive, event, model). The first one
//! whose `can_parse` accepts the name produces the typed attribute. Names
//! are claimed by exact match or by prefix (`$`, `:`, `@`), so no two kinds
//! can accept the same name. Anything unclaimed is a plain HTML attribute.

use compact_str::CompactString;
use smallvec::SmallVec;

use pywire_carton::{is_dotted_identifier, is_identifier, LineIndex};
use pywire_croquis::is_keyword;
use pywire_relief::{
    Attribute, BindAttribute, CompileError, CompileResult, ConditionAttribute, EventAttribute,
    ForAttribute, InterpolationPart, KeyAttribute, ModelAttribute, Position, ReactiveAttribute,
    SourceLocation, SpecialAttribute,
};

use crate::interpolation::{has_expressions, split_interpolations};
use crate::scan::{find_top_level, strip_braces};
use crate::tokenizer::QuoteType;

/// One attribute as read by the tokenizer.
#[derive(Debug, Clone, Copy)]
pub struct RawAttribute<'s> {
    pub name: &'s str,
    /// Value without quotes; brace values keep their braces
    pub value: Option<&'s str>,
    pub quote: QuoteType,
    /// Byte offset of `value`
    pub value_start: usize,
    pub loc: SourceLocation,
}

/// A resolved attribute
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Special(SpecialAttribute),
    Plain(Attribute),
}

/// Attribute kinds in resolution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Bind,
    Conditional,
    Loop,
    Key,
    Reactive,
    Event,
    Model,
}

pub const ATTRIBUTE_RESOLVERS: [AttributeKind; 7] = [
    AttributeKind::Bind,
    AttributeKind::Conditional,
    AttributeKind::Loop,
    AttributeKind::Key,
    AttributeKind::Reactive,
    AttributeKind::Event,
    AttributeKind::Model,
];

/// Shared state for resolving the attributes of one document
pub struct AttributeContext<'a> {
    pub file: &'a str,
    pub index: &'a LineIndex,
}

impl AttributeContext<'_> {
    fn position(&self, offset: usize) -> Position {
        let (line, column) = self.index.line_col(offset as u32);
        Position::new(offset as u32, line, column)
    }

    fn error(&self, raw: &RawAttribute<'_>, message: impl Into<String>) -> CompileError {
        CompileError::syntax(self.file, raw.loc.start.line, raw.loc.start.column, message)
    }
}

impl AttributeKind {
    pub fn can_parse(self, name: &str) -> bool {
        match self {
            Self::Bind => name == "$bind" || name.starts_with("$bind:"),
            Self::Conditional => name == "$if" || name == "$show",
            Self::Loop => name == "$for",
            Self::Key => name == "$key",
            Self::Reactive => name.len() > 1 && name.starts_with(':'),
            Self::Event => name.len() > 1 && name.starts_with('@'),
            Self::Model => name == "$model",
        }
    }

    pub fn parse(
        self,
        raw: &RawAttribute<'_>,
        ctx: &AttributeContext<'_>,
    ) -> CompileResult<SpecialAttribute> {
        match self {
            Self::Bind => parse_bind(raw, ctx),
            Self::Conditional => {
                let (condition, value_pos) = required_braces(raw, ctx)?;
                let attr = ConditionAttribute {
                    condition,
                    value_pos,
                    loc: raw.loc,
                };
                Ok(if raw.name == "$if" {
                    SpecialAttribute::If(attr)
                } else {
                    SpecialAttribute::Show(attr)
                })
            }
            Self::Loop => parse_for(raw, ctx),
            Self::Key => {
                let (expr, value_pos) = required_braces(raw, ctx)?;
                Ok(SpecialAttribute::Key(KeyAttribute {
                    expr,
                    value_pos,
                    loc: raw.loc,
                }))
            }
            Self::Reactive => {
                let (expr, value_pos) = optional_braces(raw, ctx);
                if expr.is_empty() {
                    return Err(ctx.error(
                        raw,
                        format!("Reactive attribute '{}' needs an expression", raw.name),
                    ));
                }
                Ok(SpecialAttribute::Reactive(ReactiveAttribute {
                    name: raw.name[1..].into(),
                    expr,
                    value_pos,
                    loc: raw.loc,
                }))
            }
            Self::Event => parse_event(raw, ctx),
            Self::Model => {
                let model_name = raw.value.map(str::trim).unwrap_or_default();
                if !is_identifier(model_name) || is_keyword(model_name) {
                    return Err(ctx.error(
                        raw,
                        format!("$model expects a class name, got '{}'", model_name),
                    ));
                }
                Ok(SpecialAttribute::Model(ModelAttribute {
                    model_name: model_name.into(),
                    loc: raw.loc,
                }))
            }
        }
    }
}

/// Resolve one attribute.
pub fn resolve_attribute(raw: &RawAttribute<'_>, ctx: &AttributeContext<'_>) -> CompileResult<Resolved> {
    if let Some(kind) = ATTRIBUTE_RESOLVERS.iter().find(|k| k.can_parse(raw.name)) {
        return kind.parse(raw, ctx).map(Resolved::Special);
    }
    if raw.name.starts_with('$') {
        return Err(ctx.error(raw, format!("Unknown special attribute '{}'", raw.name)));
    }
    resolve_plain(raw, ctx)
}

fn resolve_plain(raw: &RawAttribute<'_>, ctx: &AttributeContext<'_>) -> CompileResult<Resolved> {
    let Some(value) = raw.value else {
        return Ok(Resolved::Plain(Attribute {
            name: raw.name.into(),
            value: None,
            parts: None,
            loc: raw.loc,
        }));
    };

    // `name={expr}` is always an expression
    if raw.quote == QuoteType::Brace {
        let (expr, value_pos) = optional_braces(raw, ctx);
        if expr.is_empty() {
            return Err(ctx.error(raw, format!("Attribute '{}' has an empty expression", raw.name)));
        }
        return Ok(Resolved::Special(SpecialAttribute::Reactive(ReactiveAttribute {
            name: raw.name.into(),
            expr,
            value_pos,
            loc: raw.loc,
        })));
    }

    let parts = split_interpolations(value, raw.value_start, ctx.index);
    if let [InterpolationPart::Expr(interp)] = parts.as_slice() {
        if interp.format_spec.is_none() && strip_braces(value).is_some() {
            return Ok(Resolved::Special(SpecialAttribute::Reactive(ReactiveAttribute {
                name: raw.name.into(),
                expr: interp.expression.clone(),
                value_pos: interp.pos,
                loc: raw.loc,
            })));
        }
    }

    let parts = has_expressions(&parts).then_some(parts);
    Ok(Resolved::Plain(Attribute {
        name: raw.name.into(),
        value: Some(value.to_string()),
        parts,
        loc: raw.loc,
    }))
}

/// `{...}` content of a value that must be braced, with the position of its
/// first non-blank character.
fn required_braces(raw: &RawAttribute<'_>, ctx: &AttributeContext<'_>) -> CompileResult<(String, Position)> {
    let value = raw.value.unwrap_or_default();
    let Some(inner) = strip_braces(value) else {
        return Err(ctx.error(
            raw,
            format!("Value for '{}' must be wrapped in braces: {}={{...}}", raw.name, raw.name),
        ));
    };
    let body = inner.trim();
    if body.is_empty() {
        return Err(ctx.error(raw, format!("Value for '{}' cannot be empty", raw.name)));
    }
    Ok((body.to_string(), ctx.position(inner_offset(raw, value, inner))))
}

/// Value with optional surrounding braces removed.
fn optional_braces(raw: &RawAttribute<'_>, ctx: &AttributeContext<'_>) -> (String, Position) {
    let value = raw.value.unwrap_or_default();
    match strip_braces(value) {
        Some(inner) => (
            inner.trim().to_string(),
            ctx.position(inner_offset(raw, value, inner)),
        ),
        None => {
            let leading = value.len() - value.trim_start().len();
            (
                value.trim().to_string(),
                ctx.position(raw.value_start + leading),
            )
        }
    }
}

/// Absolute offset of the first non-blank character of `inner`, a
/// subslice of `value`.
fn inner_offset(raw: &RawAttribute<'_>, value: &str, inner: &str) -> usize {
    let inner_start = inner.as_ptr() as usize - value.as_ptr() as usize;
    let leading = inner.len() - inner.trim_start().len();
    raw.value_start + inner_start + leading
}

fn parse_for(raw: &RawAttribute<'_>, ctx: &AttributeContext<'_>) -> CompileResult<SpecialAttribute> {
    let (body, value_pos) = required_braces(raw, ctx)?;
    let Some(split) = find_top_level(&body, " in ") else {
        return Err(ctx.error(
            raw,
            format!("Invalid $for value '{}': expected 'item in iterable'", body),
        ));
    };
    let loop_vars = body[..split].trim();
    let iterable = body[split + 4..].trim();
    if iterable.is_empty() {
        return Err(ctx.error(raw, "$for is missing the iterable after 'in'"));
    }

    let unwrapped = loop_vars
        .strip_prefix('(')
        .and_then(|v| v.strip_suffix(')'))
        .unwrap_or(loop_vars);
    let mut names: SmallVec<[CompactString; 2]> = SmallVec::new();
    for name in unwrapped.split(',').map(str::trim) {
        if name.is_empty() && !names.is_empty() {
            continue;
        }
        if !is_identifier(name) || is_keyword(name) {
            return Err(ctx.error(
                raw,
                format!("Invalid loop variable '{}' in $for", name),
            ));
        }
        names.push(name.into());
    }

    Ok(SpecialAttribute::For(ForAttribute {
        loop_vars: loop_vars.to_string(),
        names,
        iterable: iterable.to_string(),
        is_template_tag: false,
        value_pos,
        loc: raw.loc,
    }))
}

fn parse_bind(raw: &RawAttribute<'_>, ctx: &AttributeContext<'_>) -> CompileResult<SpecialAttribute> {
    let (variable, value_pos) = optional_braces(raw, ctx);
    if !is_dotted_identifier(&variable) {
        return Err(ctx.error(
            raw,
            format!("$bind expects a variable name, got '{}'", variable),
        ));
    }
    let binding_type = raw
        .name
        .strip_prefix("$bind:")
        .filter(|evt| !evt.is_empty())
        .map(CompactString::from);
    Ok(SpecialAttribute::Bind(BindAttribute {
        variable,
        binding_type,
        value_pos,
        loc: raw.loc,
    }))
}

fn parse_event(raw: &RawAttribute<'_>, ctx: &AttributeContext<'_>) -> CompileResult<SpecialAttribute> {
    let mut segments = raw.name[1..].split('.');
    let event_type = segments.next().unwrap_or_default();
    if event_type.is_empty() {
        return Err(ctx.error(raw, format!("Missing event name in '{}'", raw.name)));
    }
    let modifiers: Vec<CompactString> = segments
        .filter(|m| !m.is_empty())
        .map(CompactString::from)
        .collect();

    let (handler, value_pos) = optional_braces(raw, ctx);
    if handler.is_empty() {
        return Err(ctx.error(
            raw,
            format!("Event handler for '@{}' cannot be empty", event_type),
        ));
    }

    Ok(SpecialAttribute::Event(EventAttribute {
        event_type: event_type.into(),
        modifiers,
        handler_name: handler,
        inline_source: None,
        args: Vec::new(),
        schema: None,
        value_pos,
        loc: raw.loc,
    }))
}
