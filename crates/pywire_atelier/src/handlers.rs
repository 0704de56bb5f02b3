//! Inline handler promotion.
//!
//! `@click={count += 1}` cannot be wired to the client as-is: the client
//! sends the name of a method to call. Every event attribute whose handler is
//! not a bare name is promoted to a synthesized method and the attribute is
//! repointed at it.
//!
//! Names are `_handler_<hash>` where the hash covers the attribute position
//! and the inline text. The inline text stays on the attribute, so running the
//! pass again produces the same method under the same name instead of
//! promoting the synthesized name a second time.
//!
//! Call arguments that mention template-only names (loop variables, mostly)
//! cannot be evaluated inside the method. They are lifted into parameters
//! `arg0..argN` and their source text is recorded on the attribute so the
//! render method can serialize their values into `data-arg-N`.

use tracing::{debug, warn};

use pywire_carton::hash::short_hash;
use pywire_carton::{is_identifier, FxHashSet};
use pywire_croquis::analysis::{
    assigned_names, insert_awaits, references_name, visit_block_exprs_mut, visit_children_mut,
};
use pywire_croquis::ast::{CallArg, Constant, FunctionDef, Param, Parameters};
use pywire_croquis::{
    free_names, parse_module, print_expr, Block, Expr, Ident, SelfBinder,
};
use pywire_relief::{
    walk_elements_mut, CompileError, CompileResult, EventAttribute, SpecialAttribute,
    TemplateNode,
};

use crate::scope::PageScope;

/// A method generated from an inline event expression.
#[derive(Debug, Clone)]
pub struct SynthesizedHandler {
    pub def: FunctionDef,
    /// Whether the body reads the client event payload
    pub takes_event: bool,
}

impl SynthesizedHandler {
    pub fn name(&self) -> &str {
        &self.def.name
    }
}

/// Promote every inline event handler in `template`.
pub fn synthesize_handlers(
    template: &mut [TemplateNode],
    scope: &PageScope,
    console_sink: Option<&str>,
    file: &str,
) -> CompileResult<Vec<SynthesizedHandler>> {
    let mut handlers = Vec::new();
    let mut failure = None;

    walk_elements_mut(template, &mut |el| {
        if failure.is_some() {
            return;
        }
        for attr in &mut el.special_attributes {
            let SpecialAttribute::Event(event) = attr else {
                continue;
            };
            if event.inline_source.is_none() && is_identifier(&event.handler_name) {
                if !scope.methods.contains(event.handler_name.as_str())
                    && !scope.resolves(&event.handler_name)
                {
                    warn!(
                        file,
                        line = event.value_pos.line,
                        handler = %event.handler_name,
                        "@{} handler does not name a page function",
                        event.event_type
                    );
                }
                continue;
            }
            match promote(event, scope, console_sink, file) {
                Ok(handler) => handlers.push(handler),
                Err(err) => {
                    failure = Some(err);
                    return;
                }
            }
        }
    });

    if let Some(err) = failure {
        return Err(err);
    }
    debug!(file, count = handlers.len(), "synthesized inline handlers");
    Ok(handlers)
}

fn promote(
    event: &mut EventAttribute,
    scope: &PageScope,
    console_sink: Option<&str>,
    file: &str,
) -> CompileResult<SynthesizedHandler> {
    let source = event
        .inline_source
        .clone()
        .unwrap_or_else(|| event.handler_name.clone());
    let line = event.value_pos.line;
    let column = event.value_pos.column;

    let code = normalize_source(&source.replace("$event", "event"));
    let mut body = parse_module(&code, line)
        .map_err(|err| {
            CompileError::syntax(
                file,
                err.line,
                err.column,
                format!("invalid @{} handler: {}", event.event_type, err.message),
            )
        })?
        .body;

    let mut lifter = ArgLifter {
        scope,
        locals: assigned_names(&body).into_iter().collect(),
        lifted: Vec::new(),
    };
    visit_block_exprs_mut(&mut body, &mut |expr| lifter.visit(expr));
    let lifted = lifter.lifted;

    let takes_event = references_name(&body, "event");
    let arg_names: Vec<String> = (0..lifted.len()).map(|i| format!("arg{}", i)).collect();

    let mut binder = SelfBinder::new(&scope.known).with_console_sink(console_sink);
    binder.push_scope(std::iter::once("event".to_string()).chain(arg_names.iter().cloned()));
    binder.bind_block(&mut body);
    binder.pop_scope();
    insert_awaits(&mut body, &scope.async_methods);

    let mut params = Parameters::default();
    params.push_positional(Param::named("self"));
    for name in &arg_names {
        params.push_positional(Param::named(name));
    }
    if takes_event {
        params.push_positional(Param {
            name: Ident::new("event"),
            annotation: None,
            default: Some(Expr::Constant(Constant::None)),
        });
    }

    let name = format!(
        "_handler_{}",
        short_hash(&format!("{}:{}:{}", line, column, source), 8)
    );
    event.handler_name = name.clone();
    event.args = lifted;
    event.inline_source = Some(source);

    Ok(SynthesizedHandler {
        def: FunctionDef {
            name: Ident::new(&name),
            params,
            body: non_empty(body),
            decorators: Vec::new(),
            returns: None,
            type_params: Vec::new(),
            is_async: true,
            line,
        },
        takes_event,
    })
}

/// Strip the indentation a multi-line handler inherits from the markup.
///
/// The first line starts right after the attribute's opening quote. The
/// remaining lines are dedented to a common margin unless the first line
/// opens a block, in which case their indentation is the block's.
fn normalize_source(source: &str) -> String {
    let mut lines = source.lines();
    let Some(first) = lines.next() else {
        return String::new();
    };
    let first = first.trim();
    let rest: Vec<&str> = lines.collect();
    if rest.is_empty() {
        return first.to_string();
    }
    if first.ends_with(':') {
        let mut out = first.to_string();
        for line in rest {
            out.push('\n');
            out.push_str(line);
        }
        return out;
    }

    let margin = rest
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    let mut out = first.to_string();
    for line in rest {
        out.push('\n');
        out.push_str(line.get(margin..).unwrap_or_else(|| line.trim_start()));
    }
    out
}

fn non_empty(body: Block) -> Block {
    if body.is_empty() {
        vec![pywire_croquis::Stmt::new(pywire_croquis::StmtKind::Pass, 0)]
    } else {
        body
    }
}

struct ArgLifter<'a> {
    scope: &'a PageScope,
    /// Names the handler assigns itself
    locals: FxHashSet<Ident>,
    lifted: Vec<String>,
}

impl ArgLifter<'_> {
    fn needs_lift(&self, expr: &Expr) -> bool {
        free_names(expr).iter().any(|name| {
            !matches!(name.as_str(), "event" | "self")
                && !self.scope.resolves(name)
                && !self.locals.contains(name)
        })
    }

    fn visit(&mut self, expr: &mut Expr) {
        match expr {
            Expr::Lambda { .. } => {}
            Expr::Call { func, args } => {
                self.visit(func);
                for arg in args {
                    let value = match arg {
                        CallArg::Positional(value) | CallArg::Keyword { value, .. } => value,
                        other => {
                            self.visit(other.value_mut());
                            continue;
                        }
                    };
                    if self.needs_lift(value) {
                        let name = format!("arg{}", self.lifted.len());
                        self.lifted.push(print_expr(value));
                        *value = Expr::name(&name);
                    } else {
                        self.visit(value);
                    }
                }
            }
            _ => visit_children_mut(expr, &mut |child| self.visit(child)),
        }
    }
}
