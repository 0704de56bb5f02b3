//! Form validation wrappers.
//!
//! For a `<form @submit=...>` with named fields, the page gets two members:
//!
//! ```text
//! _form_schema_<h> = FormValidationSchema(fields={...}, model_name=...)
//!
//! async def _form_submit_<h>(self, **kwargs):
//!     ...validate kwargs['formData'] against the schema...
//!     ...call the user's handler with the cleaned data...
//! ```
//!
//! and the form's `data-on-submit` points at the wrapper instead of the user
//! handler. Expression-valued rules (`:required={strict}`) are kept as bound
//! source text and evaluated by the validator against the page instance.

use pywire_carton::hash::short_hash;
use pywire_carton::{py_str, CodeWriter};
use pywire_croquis::ast::{FunctionDef, ParamItem};
use pywire_croquis::{parse_expression, print_expr, SelfBinder};
use pywire_relief::{
    CompileError, CompileResult, EventAttribute, FieldRules, FormValidationSchema,
    ParsedDocument,
};

use crate::handlers::SynthesizedHandler;
use crate::scope::PageScope;

/// Hash suffix shared by the schema attribute and the wrapper method, or
/// `None` when the event needs no wrapper.
pub fn form_key(event: &EventAttribute) -> Option<String> {
    let schema = event.schema.as_ref()?;
    if event.event_type.as_str() != "submit" || schema.fields.is_empty() {
        return None;
    }
    Some(short_hash(
        &format!("form:{}:{}", event.value_pos.line, event.value_pos.column),
        8,
    ))
}

/// Method the client calls on submit.
pub fn wrapper_name(event: &EventAttribute) -> Option<String> {
    form_key(event).map(|key| format!("_form_submit_{}", key))
}

/// What the page defines that a submit handler can be called as.
pub struct HandlerTargets<'a> {
    pub scope: &'a PageScope,
    pub methods: &'a [FunctionDef],
    pub synthesized: &'a [SynthesizedHandler],
}

/// Write the schema attribute and wrapper method of every validated form.
/// Returns the number of forms written.
pub fn write_form_members(
    w: &mut CodeWriter,
    doc: &ParsedDocument,
    targets: &HandlerTargets<'_>,
) -> CompileResult<usize> {
    let mut count = 0;
    for el in doc.elements() {
        for event in el.events() {
            let (Some(key), Some(schema)) = (form_key(event), event.schema.as_ref()) else {
                continue;
            };
            let line = event.value_pos.line;
            let schema_attr = format!("_form_schema_{}", key);

            w.blank();
            let schema_expr = schema_constructor(schema, targets.scope, line, &doc.file_path)?;
            w.line(&format!("{} = {}", schema_attr, schema_expr), Some(el.loc.line()));

            w.blank();
            w.line(
                &format!("async def _form_submit_{}(self, **kwargs):", key),
                Some(el.loc.line()),
            );
            w.indent();
            w.line("form_data = kwargs.get('formData', {})", None);
            w.line("def get_state(expr):", None);
            w.indent();
            w.line("return eval(expr, globals(), {'self': self})", None);
            w.dedent();
            w.line(
                &format!(
                    "cleaned_data, self.errors = form_validator.validate_form(form_data, self.{}.fields, get_state)",
                    schema_attr
                ),
                None,
            );
            if let Some(model) = &schema.model_name {
                w.line("if not self.errors:", None);
                w.indent();
                w.line("nested_data = form_validator.parse_nested_data(cleaned_data)", None);
                w.line(
                    &format!(
                        "model_instance, model_errors = validate_with_model(nested_data, {})",
                        model
                    ),
                    el.model_attr().map(|m| m.loc.line()),
                );
                w.line("if model_errors:", None);
                w.indent();
                w.line("self.errors = model_errors", None);
                w.dedent();
                w.line("else:", None);
                w.indent();
                w.line("cleaned_data = model_instance", None);
                w.dedent();
                w.dedent();
            }
            w.line("if self.errors:", None);
            w.indent();
            w.line("return", None);
            w.dedent();
            w.line(&handler_call(event, targets), Some(line));
            w.dedent();
            count += 1;
        }
    }
    Ok(count)
}

fn handler_call(event: &EventAttribute, targets: &HandlerTargets<'_>) -> String {
    let name = &event.handler_name;
    if let Some(handler) = targets.synthesized.iter().find(|h| h.name() == name.as_str()) {
        return if handler.takes_event {
            format!("await self.{}(event=cleaned_data)", name)
        } else {
            format!("await self.{}()", name)
        };
    }

    let method = targets.methods.iter().find(|m| m.name.as_str() == name.as_str());
    let accepts_data = method.map_or(true, |m| {
        m.params.names().count() > 1
            || m
                .params
                .items
                .iter()
                .any(|p| matches!(p, ParamItem::VarArgs(_) | ParamItem::KwArgs(_)))
    });
    let args = if accepts_data { "cleaned_data" } else { "" };
    if targets.scope.async_methods.contains(name.as_str()) {
        format!("await self.{}({})", name, args)
    } else {
        format!("self.{}({})", name, args)
    }
}

fn schema_constructor(
    schema: &FormValidationSchema,
    scope: &PageScope,
    line: u32,
    file: &str,
) -> CompileResult<String> {
    let mut fields = Vec::with_capacity(schema.fields.len());
    for rules in &schema.fields {
        fields.push(format!(
            "{}: {}",
            py_str(&rules.name),
            field_rules(rules, scope, line, file)?
        ));
    }
    let model = match &schema.model_name {
        Some(model) => py_str(model),
        None => "None".to_string(),
    };
    Ok(format!(
        "FormValidationSchema(fields={{{}}}, model_name={})",
        fields.join(", "),
        model
    ))
}

fn field_rules(
    rules: &FieldRules,
    scope: &PageScope,
    line: u32,
    file: &str,
) -> CompileResult<String> {
    let mut args: Vec<String> = Vec::new();
    let bound = |expr: &str| bind_rule_expr(expr, scope, line, file);

    if rules.required {
        args.push("required=True".to_string());
    }
    if let Some(expr) = &rules.required_expr {
        args.push(format!("required_expr={}", bound(expr)?));
    }
    if let Some(pattern) = &rules.pattern {
        args.push(format!("pattern={}", py_str(pattern)));
    }
    if let Some(n) = rules.min_length {
        args.push(format!("minlength={}", n));
    }
    if let Some(n) = rules.max_length {
        args.push(format!("maxlength={}", n));
    }
    if let Some(v) = &rules.min_value {
        args.push(format!("min_value={}", py_str(v)));
    }
    if let Some(expr) = &rules.min_expr {
        args.push(format!("min_expr={}", bound(expr)?));
    }
    if let Some(v) = &rules.max_value {
        args.push(format!("max_value={}", py_str(v)));
    }
    if let Some(expr) = &rules.max_expr {
        args.push(format!("max_expr={}", bound(expr)?));
    }
    if let Some(step) = &rules.step {
        args.push(format!("step={}", py_str(step)));
    }
    if rules.input_type.as_str() != "text" {
        args.push(format!("input_type={}", py_str(&rules.input_type)));
    }
    if let Some(title) = &rules.title {
        args.push(format!("title={}", py_str(title)));
    }
    if let Some(size) = rules.max_size {
        args.push(format!("max_size={}", size));
    }
    if !rules.allowed_types.is_empty() {
        let types: Vec<String> = rules.allowed_types.iter().map(|t| py_str(t)).collect();
        args.push(format!("allowed_types=[{}]", types.join(", ")));
    }
    Ok(format!("FieldRules({})", args.join(", ")))
}

/// `strict` -> `'self.strict'`, evaluated later by the validator.
fn bind_rule_expr(expr: &str, scope: &PageScope, line: u32, file: &str) -> CompileResult<String> {
    let mut parsed = parse_expression(expr, line, 1).map_err(|err| {
        CompileError::syntax(file, err.line, err.column, format!("invalid rule expression: {}", err.message))
    })?;
    SelfBinder::new(&scope.known).bind_expr(&mut parsed);
    Ok(py_str(&print_expr(&parsed)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user_code::transform_user_code;

    fn render(source: &str) -> String {
        let doc = pywire_armature::parse(source, "form.pywire").unwrap();
        let module = doc.code.as_ref().map(|c| &c.module);
        let scope = PageScope::new(module, &doc.file_path);
        let code = transform_user_code(module, &scope, None);
        let targets = HandlerTargets {
            scope: &scope,
            methods: &code.methods,
            synthesized: &[],
        };
        let mut w = CodeWriter::new();
        write_form_members(&mut w, &doc, &targets).unwrap();
        w.finish().0
    }

    #[test]
    fn test_number_field_schema() {
        let out = render(
            "<form @submit={save}>\n  <input name=\"n1\" type=\"number\" min=\"0\" max=\"100\" step=\"5\">\n</form>\n---\nasync def save(data):\n    pass\n",
        );
        assert!(
            out.contains("fields={'n1': FieldRules(min_value='0', max_value='100', step='5', input_type='number')}, model_name=None)"),
            "{}",
            out
        );
        assert!(out.contains("    await self.save(cleaned_data)\n"), "{}", out);
        assert!(out.contains("async def _form_submit_"), "{}", out);
    }

    #[test]
    fn test_model_validation_branch() {
        let out = render(
            "<form @submit={save} $model=\"Profile\">\n  <input name=\"user\" required>\n</form>\n---\ndef save():\n    pass\n",
        );
        assert!(out.contains("model_name='Profile'"), "{}", out);
        assert!(
            out.contains("model_instance, model_errors = validate_with_model(nested_data, Profile)"),
            "{}",
            out
        );
        assert!(out.contains("FieldRules(required=True)"), "{}", out);
        assert!(out.contains("    self.save()\n"), "{}", out);
    }

    #[test]
    fn test_reactive_rule_bound() {
        let out = render(
            "<form @submit={save}>\n  <input name=\"age\" type=\"number\" :min={minimum}>\n</form>\n---\nminimum = 18\ndef save(data):\n    pass\n",
        );
        assert!(out.contains("min_expr='self.minimum'"), "{}", out);
    }

    #[test]
    fn test_wrapper_name_is_stable() {
        let doc = pywire_armature::parse(
            "<form @submit={save}><input name=\"a\"></form>",
            "form.pywire",
        )
        .unwrap();
        let form = doc.template[0].as_element().unwrap();
        let event = form.event("submit").unwrap();
        let name = wrapper_name(event).unwrap();
        assert_eq!(Some(name), wrapper_name(event));
    }

    #[test]
    fn test_no_wrapper_without_fields() {
        let doc = pywire_armature::parse("<form @submit={go}><button>Go</button></form>", "f.pywire").unwrap();
        let form = doc.template[0].as_element().unwrap();
        assert!(wrapper_name(form.event("submit").unwrap()).is_none());
    }
}
