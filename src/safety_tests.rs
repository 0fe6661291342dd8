//! Safety Gate Tests for the sandbox boundary
//!
//! These tests verify the invariants untrusted code must never break:
//! - the capability namespace is a closed allow-list
//! - code cannot leave the synthesized factory
//! - rendering always terminates and never emits event handlers
//! - allocation and recursion stay inside the configured limits

#[cfg(test)]
mod tests {
    use crate::component::compile;
    use crate::error::{ErrorKind, StageError};
    use crate::kit::standard_namespace;
    use crate::options::EngineOptions;
    use crate::source::SourceFile;

    fn page(content: &str) -> SourceFile {
        SourceFile::new("app/page.tsx", content)
    }

    fn bind_error(content: &str) -> String {
        let err = compile(&page(content), &standard_namespace(), &EngineOptions::default())
            .expect_err("compilation must fail");
        assert_eq!(err.cause.kind(), ErrorKind::Binding, "{}", err);
        err.cause.to_string()
    }

    fn render_html(content: &str, options: &EngineOptions) -> Result<String, StageError> {
        let component = compile(&page(content), &standard_namespace(), options).map_err(|e| e.cause)?;
        component.render(None).map(|n| n.to_html()).map_err(|e| e.cause)
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // CLOSED ALLOW-LIST
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_ambient_globals_are_unbound() {
        for global in ["eval", "require", "window", "globalThis", "process", "document", "fetch"] {
            let source = format!(
                "export default function Home() {{ return <p>{{String({})}}</p>; }}",
                global
            );
            let message = bind_error(&source);
            assert!(message.contains(&format!("`{}`", global)), "{}", message);
        }
    }

    #[test]
    fn test_unknown_component_is_unbound() {
        let message = bind_error("export default function Home() { return <Carousel />; }");
        assert!(message.contains("`Carousel` is not bound"), "{}", message);
    }

    #[test]
    fn test_import_does_not_bind_names() {
        let message = bind_error(
            "import { Carousel } from '@/components/ui/carousel';\n\
export default function Home() { return <Carousel />; }",
        );
        assert!(message.contains("`Carousel`"), "{}", message);
    }

    #[test]
    fn test_only_host_constructors_can_be_instantiated() {
        let html = render_html(
            "export default function Home() { return <p>{new Date(2024, 0, 15).getFullYear()}</p>; }",
            &EngineOptions::default(),
        )
        .unwrap();
        assert_eq!(html, "<p>2024</p>");

        let err = render_html(
            "export default function Home() { function Widget() {} return <p>{String(new Widget())}</p>; }",
            &EngineOptions::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            StageError::render(
                "TypeError: `Widget` is not a constructor; only host-provided constructors support `new`"
            )
        );

        let message = bind_error("export default function Home() { return <p>{this.props}</p>; }");
        assert!(message.contains("unsupported syntax: `this`"), "{}", message);
    }

    #[test]
    fn test_builtin_methods_are_not_values() {
        let html = render_html(
            "export default function Home() { const f = [].map; return <p>{typeof f}</p>; }",
            &EngineOptions::default(),
        )
        .unwrap();
        assert_eq!(html, "<p>undefined</p>");

        let err = render_html(
            "export default function Home() { return <p>{[].map.constructor('return 1')()}</p>; }",
            &EngineOptions::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            StageError::render("TypeError: cannot read properties of undefined (reading 'constructor')")
        );
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // TERMINATION
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_infinite_loop_hits_step_budget() {
        let options = EngineOptions {
            max_steps: 10_000,
            ..EngineOptions::default()
        };
        let err = render_html(
            "export default function Home() { while (true) {} return <p />; }",
            &options,
        )
        .unwrap_err();
        assert_eq!(err, StageError::render("step budget of 10000 exceeded"));
    }

    #[test]
    fn test_module_level_loop_fails_binding() {
        let options = EngineOptions {
            max_steps: 10_000,
            ..EngineOptions::default()
        };
        let err = render_html(
            "for (;;) {}\nexport default function Home() { return <p />; }",
            &options,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Binding);
    }

    #[test]
    fn test_recursive_component_hits_depth_limit() {
        let options = EngineOptions {
            max_call_depth: 64,
            ..EngineOptions::default()
        };
        let err = render_html(
            "export default function Home() { const f = (n) => f(n + 1); return <p>{f(0)}</p>; }",
            &options,
        )
        .unwrap_err();
        assert_eq!(err, StageError::render("call depth limit of 64 exceeded"));
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // RESOURCE LIMITS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_huge_strings_are_range_errors() {
        for expr in ["'x'.repeat(2 ** 62)", "'x'.padStart(2 ** 62, 'ab')", "'x'.padEnd(2 ** 62)"] {
            let source = format!("export default function Home() {{ return <p>{{{}}}</p>; }}", expr);
            let err = render_html(&source, &EngineOptions::default()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Render, "{}", expr);
            assert!(err.to_string().contains("RangeError: invalid string length"), "{}", err);
        }
    }

    #[test]
    fn test_huge_arrays_are_range_errors() {
        for statement in ["a.length = 2 ** 60", "a[2 ** 40] = 1", "a.length = -1"] {
            let source = format!(
                "export default function Home() {{ const a = []; {}; return <p>{{a.length}}</p>; }}",
                statement
            );
            let err = render_html(&source, &EngineOptions::default()).unwrap_err();
            assert!(err.to_string().contains("RangeError: invalid array length"), "{}", err);
        }
    }

    #[test]
    fn test_range_errors_can_be_caught() {
        let html = render_html(
            "export default function Home() {
  let label;
  try { label = 'ab'.repeat(1e9); } catch (e) { label = e.name; }
  return <p>{label}</p>;
}",
            &EngineOptions::default(),
        )
        .unwrap();
        assert_eq!(html, "<p>RangeError</p>");
    }

    #[test]
    fn test_string_limit_follows_options() {
        let options = EngineOptions {
            max_string_length: 8,
            ..EngineOptions::default()
        };
        let source = |n: usize| {
            format!("export default function Home() {{ return <p>{{'ab'.repeat({})}}</p>; }}", n)
        };
        assert_eq!(render_html(&source(4), &options).unwrap(), "<p>abababab</p>");
        assert!(render_html(&source(5), &options).is_err());
    }

    #[test]
    fn test_doubling_string_exhausts_budget_not_memory() {
        let err = render_html(
            "export default function Home() {
  let s = 'x';
  while (true) { s = s + s; }
  return <p>{s}</p>;
}",
            &EngineOptions::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("RangeError: invalid string length"), "{}", err);
    }

    #[test]
    fn test_deeply_nested_source_is_binding_error() {
        let source = format!(
            "export default function Home() {{ const x = {}1{}; return <p>{{x.length}}</p>; }}",
            "[".repeat(1_000),
            "]".repeat(1_000)
        );
        let message = bind_error(&source);
        assert!(message.contains("nested deeper than 512 levels"), "{}", message);

        let source = format!(
            "export default function Home() {{ const x = {}1{}; return <p>{{x.length}}</p>; }}",
            "[".repeat(300),
            "]".repeat(300)
        );
        assert_eq!(render_html(&source, &EngineOptions::default()).unwrap(), "<p>1</p>");
    }

    #[test]
    fn test_recursion_through_array_callbacks_stops_at_call_depth() {
        let source = |n: usize| {
            format!(
                "export default function Home() {{
  const f = (n) => (n <= 0 ? 0 : [1].map(() => f(n - 1))[0] + 1);
  return <p>{{f({})}}</p>;
}}",
                n
            )
        };
        assert_eq!(render_html(&source(120), &EngineOptions::default()).unwrap(), "<p>120</p>");
        assert_eq!(
            render_html(&source(1_000), &EngineOptions::default()).unwrap_err(),
            StageError::render("call depth limit of 256 exceeded")
        );
    }

    #[test]
    fn test_deeply_nested_children_hit_nesting_limit() {
        let err = render_html(
            "export default function Home() {
  let a = [];
  for (let i = 0; i < 20000; i++) { a = [a]; }
  return <p>{a}</p>;
}",
            &EngineOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err, StageError::render("nesting depth limit of 4096 exceeded"));
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // OUTPUT HYGIENE
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_event_handlers_and_markup_are_neutralized() {
        let html = render_html(
            "export default function Home() {\n\
  const label = '<script>alert(1)</script>';\n\
  return <button onClick={() => alert(label)} title={'\"x\"'}>{label}</button>;\n\
}",
            &EngineOptions::default(),
        );
        // `alert` is not bound, so the handler body never even binds.
        assert!(html.is_err());

        let html = render_html(
            "export default function Home() {\n\
  const label = '<script>x</script>';\n\
  return <button onClick={() => null} title={'\"x\"'}>{label}</button>;\n\
}",
            &EngineOptions::default(),
        )
        .unwrap();
        assert_eq!(
            html,
            "<button title=\"&quot;x&quot;\">&lt;script&gt;x&lt;/script&gt;</button>"
        );
    }

    #[test]
    fn test_object_child_is_render_error() {
        let err = render_html(
            "export default function Home() { return <div>{{ a: 1 }}</div>; }",
            &EngineOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Render);
    }
}
