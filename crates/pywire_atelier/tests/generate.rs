//! End-to-end generation tests: page source in, Python module out.

use pywire_atelier::{compile, generate, CompilerOptions, StyleCollector};
use pywire_relief::CompileError;

fn compile_page(source: &str, file: &str) -> pywire_atelier::CompiledModule {
    compile(source, file, &CompilerOptions::default()).unwrap()
}

/// 1-based generated line of the first line containing `needle`.
fn line_of(code: &str, needle: &str) -> u32 {
    code.lines()
        .position(|l| l.contains(needle))
        .map(|i| i as u32 + 1)
        .unwrap_or_else(|| panic!("{:?} not found in:\n{}", needle, code))
}

mod line_map {
    use super::*;

    #[test]
    fn test_code_section_raise_maps_to_page_line() {
        let module = compile_page(
            "---\nraise ValueError(\"Boom\")\n---\n<h1>Test</h1>",
            "boom.pywire",
        );
        let line = line_of(&module.code, "raise ValueError(\"Boom\")");
        assert_eq!(module.source_line(line), Some(2));
    }

    #[test]
    fn test_interpolation_maps_to_page_line() {
        let module = compile_page("<div>\n  <p>{1 / 0}</p>\n</div>", "zero.pywire");
        let line = line_of(&module.code, "escape_html(1 / 0)");
        assert_eq!(module.source_line(line), Some(2));
    }

    #[test]
    fn test_method_lines_follow_code_section() {
        let module = compile_page(
            "<p>{total()}</p>\n---\nitems = [1, 2]\n\ndef total():\n    return sum(items)\n",
            "sum.pywire",
        );
        let line = line_of(&module.code, "return sum(self.items)");
        assert_eq!(module.source_line(line), Some(6));
        assert!(module.code.contains("parts.append(escape_html(self.total()))"));
    }

    #[test]
    fn test_synthetic_lines_unmapped() {
        let module = compile_page("<p>x</p>", "plain.pywire");
        let line = line_of(&module.code, "def _r_val(value):");
        assert_eq!(module.source_line(line), None);
    }
}

mod template {
    use super::*;

    #[test]
    fn test_for_over_literal() {
        let module = compile_page("<ul><li $for={item in [1, 2, 3]}>{item}</li></ul>", "list.pywire");
        assert!(module
            .code
            .contains("async for item in ensure_async_iterator([1, 2, 3]):"));
        assert!(module.code.contains("parts.append(escape_html(item))"));
    }

    #[test]
    fn test_async_method_awaited_in_template() {
        let module = compile_page(
            "<p>{await_me()}</p>\n---\nasync def await_me():\n    return 1\n",
            "aw.pywire",
        );
        assert!(module.code.contains("parts.append(escape_html(await self.await_me()))"));
    }

    #[test]
    fn test_console_sink_option() {
        let options = CompilerOptions {
            console_sink: None,
            ..CompilerOptions::default()
        };
        let module = compile("<p>x</p>\n---\ndef hi():\n    print('hi')\n", "p.pywire", &options).unwrap();
        assert!(module.code.contains("        print('hi')\n"));

        let module = compile_page("<p>x</p>\n---\ndef hi():\n    print('hi')\n", "p.pywire");
        assert!(module.code.contains("        self.console.print('hi')\n"));
    }

    #[test]
    fn test_pjax_bootstrap() {
        let options = CompilerOptions {
            pjax: true,
            ..CompilerOptions::default()
        };
        let module = compile("<p>x</p>", "p.pywire", &options).unwrap();
        assert!(module.code.contains("        enable_pjax = True\n"));
    }

    #[test]
    fn test_component_loader() {
        let module = compile_page(
            "!component \"components/card.pywire\" as Card\n<Card></Card>",
            "pages/index.pywire",
        );
        assert!(module
            .code
            .contains("Card = load_component('components/card.pywire', 'pages/index.pywire')\n"));
    }
}

mod handlers {
    use super::*;

    #[test]
    fn test_regeneration_is_byte_identical() {
        let source = "<button @click={count += 1}>+</button>\n<p>{count}</p>\n---\ncount = 0\n";
        let mut doc = pywire_armature::parse(source, "counter.pywire").unwrap();
        let options = CompilerOptions::default();
        let first = generate(&mut doc, &options).unwrap();
        let second = generate(&mut doc, &options).unwrap();
        assert_eq!(first.code, second.code);
        assert_eq!(second.code.matches("def _handler_").count(), 1);
    }

    #[test]
    fn test_handler_with_loop_argument() {
        let module = compile_page(
            "<ul><li $for={item in items}><button @click={remove(item)}>x</button></li></ul>\n---\nitems = []\ndef remove(x):\n    items.remove(x)\n",
            "todo.pywire",
        );
        assert_eq!(module.handlers.len(), 1);
        let name = &module.handlers[0];
        assert!(module.code.contains(&format!("async def {}(self, arg0):", name)));
        assert!(module.code.contains("self.remove(arg0)"));
        assert!(module.code.contains("attrs['data-arg-0'] = json.dumps(item)"));
    }

    #[test]
    fn test_invalid_handler_reports_line() {
        let err = compile(
            "<div>\n  <button @click={count +=}>x</button>\n</div>",
            "bad.pywire",
            &CompilerOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::Syntax { line: 2, .. }), "{:?}", err);
    }
}

mod forms {
    use super::*;

    #[test]
    fn test_submit_wrapper_replaces_handler() {
        let module = compile_page(
            "<form @submit={save}>\n  <input name=\"email\" type=\"email\" required>\n</form>\n---\nasync def save(data):\n    pass\n",
            "signup.pywire",
        );
        let wrapper_line = line_of(&module.code, "async def _form_submit_");
        assert_eq!(module.source_line(wrapper_line), Some(1));
        assert!(module.code.contains("attrs['data-on-submit'] = '_form_submit_"));
        assert!(module
            .code
            .contains("FieldRules(required=True, input_type='email')"));
        assert!(module.code.contains("        await self.save(cleaned_data)\n"));
    }
}

mod page {
    use super::*;

    #[test]
    fn test_duplicate_path_directive() {
        let err = compile(
            "!path '/a'\n!path '/b'\n<p>x</p>",
            "dup.pywire",
            &CompilerOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.line(), 2);
        assert_eq!(err.message(), "Multiple !path directives");
    }

    #[test]
    fn test_route_params_are_page_state() {
        let module = compile_page("<p>{id}</p>", "pages/items/[id].pywire");
        assert!(module.code.contains("parts.append(escape_html(self.id))"));
    }

    #[test]
    fn test_scoped_styles_collect_once() {
        let a = compile_page("<style scoped>p { margin: 0; }</style><p>a</p>", "a.pywire");
        let b = compile_page("<style scoped>p { margin: 0; }</style><p>b</p>", "b.pywire");
        assert_ne!(a.styles[0].scope_id, b.styles[0].scope_id);

        let mut collector = StyleCollector::new();
        assert!(collector.add(&a.styles[0].scope_id, &a.styles[0].css));
        assert!(!collector.add(&a.styles[0].scope_id, &a.styles[0].css));
        assert!(collector.add(&b.styles[0].scope_id, &b.styles[0].css));
        assert_eq!(collector.css().lines().count(), 2);

        let attr = format!("data-pw-{}", a.styles[0].scope_id);
        assert!(a.code.contains(&format!("<p {}>a</p>", attr)));
    }
}

mod code_section {
    use super::*;

    #[test]
    fn test_modern_statements_compile() {
        let module = compile_page(
            concat!(
                "<p>{mode}</p>\n",
                "---\n",
                "type Pair[T] = tuple[T, T]\n",
                "mode = 0\n",
                "def first[T](xs: list[T]) -> T:\n",
                "    return xs[0]\n",
                "with (open('a') as f, open('b') as g):\n",
                "    pass\n",
                "match path:\n",
                "    case {'name': name}:\n",
                "        mode = name\n",
                "    case _:\n",
                "        mode = 1\n",
            ),
            "modern.pywire",
        );
        let code = &module.code;
        assert!(code.contains("\ntype Pair[T] = tuple[T, T]\n"), "{}", code);
        assert!(code.contains("def first[T](self, xs: list[T]) -> T:"), "{}", code);
        assert!(code.contains("with open('a') as self.f, open('b') as self.g:"), "{}", code);
        assert!(code.contains("match self.path:\n"), "{}", code);
        assert!(code.contains("case {'name': name}:\n"), "{}", code);
        assert!(code.contains("self.mode = name\n"), "{}", code);

        let line = line_of(code, "self.mode = 1");
        assert_eq!(module.source_line(line), Some(13));
    }
}
