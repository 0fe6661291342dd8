//! Restricted interpreter that hosts untrusted component code.
//!
//! Code enters as an oxc AST, is lowered into an owned IR with every
//! identifier resolved lexically (see [`lower`]) and runs on a metered
//! [`Machine`]. Nothing outside the capability object handed to the factory
//! is reachable from inside.

pub mod builtins;
pub mod ir;
pub mod lower;
pub mod machine;
pub mod stack;
pub mod value;

pub use lower::{collect_binding_names, lower_factory, LowerError};
pub use machine::{Limits, Machine, RuntimeError, Scope};
pub use value::{Element, Function, NativeFn, Object, Value};

#[cfg(test)]
mod tests {
    use super::*;
    use oxc_allocator::Allocator;
    use oxc_ast::ast::Statement;
    use oxc_parser::Parser;
    use oxc_span::SourceType;

    /// Parses `source` (which must declare `function main(input)`), lowers it
    /// and calls it with `input`.
    fn run_with_limits(source: &str, input: Value, limits: Limits) -> Result<Value, String> {
        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, source, SourceType::default().with_module(true)).parse();
        assert!(ret.errors.is_empty(), "parse errors: {:?}", ret.errors);
        let Some(Statement::FunctionDeclaration(func)) = ret.program.body.first() else {
            panic!("expected a function declaration");
        };
        let def = lower_factory(func).map_err(|e| e.to_string())?;
        let mut machine = Machine::new(limits);
        let main = Machine::instantiate(&def, &Scope::root());
        machine.call(&main, &[input]).map_err(|e| e.to_string())
    }

    fn run(source: &str) -> Result<Value, String> {
        run_with_limits(source, Value::Undefined, Limits::default())
    }

    fn eval_string(source: &str) -> String {
        run(source).unwrap().to_js_string()
    }

    #[test]
    fn test_closures_and_hoisting() {
        let out = eval_string(
            "function main() {
                const add = (a) => (b) => a + b;
                return twice(add(2)(3));
                function twice(n) { return n * 2; }
            }",
        );
        assert_eq!(out, "10");
    }

    #[test]
    fn test_destructuring_defaults_and_rest() {
        let out = eval_string(
            "function main() {
                const { a, b = 5, ...rest } = { a: 1, c: 3, d: 4 };
                const [x, , y = 9, ...tail] = [10, 20, undefined, 40, 50];
                return [a, b, Object_keys(rest), x, y, tail.length].join('|');
                function Object_keys(o) { let out = []; for (const k in o) out.push(k); return out.join(','); }
            }",
        );
        assert_eq!(out, "1|5|c,d|10|9|2");
    }

    #[test]
    fn test_loops_switch_and_try() {
        let out = eval_string(
            "function main() {
                let log = [];
                for (let i = 0; i < 5; i++) {
                    if (i === 1) continue;
                    if (i === 4) break;
                    log.push(i);
                }
                for (const ch of 'ab') log.push(ch);
                switch (log.length) {
                    case 4: log.push('four');
                    case 5: log.push('fell'); break;
                    default: log.push('none');
                }
                try { null.x; } catch (e) { log.push(e.name); } finally { log.push('done'); }
                return log.join(',');
            }",
        );
        assert_eq!(out, "0,2,3,a,b,fell,TypeError,done");
    }

    #[test]
    fn test_optional_chaining_and_nullish() {
        let out = eval_string(
            "function main() {
                const o = { inner: null, f: null };
                return [o.inner?.deep.deeper, o.f?.(), o.missing ?? 'fallback', o?.inner].join(',');
            }",
        );
        assert_eq!(out, ",,fallback,");
    }

    #[test]
    fn test_var_is_function_scoped() {
        let out = eval_string(
            "function main() {
                if (true) { var hoisted = 'yes'; }
                return hoisted;
            }",
        );
        assert_eq!(out, "yes");
    }

    #[test]
    fn test_unbound_references_are_all_reported() {
        let err = run("function main() { eval('1'); return require('fs') + window; }").unwrap_err();
        assert_eq!(err, "`eval`, `require`, `window` are not bound in the sandbox");
    }

    #[test]
    fn test_block_scoped_names_do_not_leak() {
        let err = run("function main() { { const inner = 1; } return inner; }").unwrap_err();
        assert_eq!(err, "`inner` is not bound in the sandbox");
    }

    #[test]
    fn test_unsupported_syntax_is_rejected() {
        assert_eq!(
            run("function main() { return class {}; }").unwrap_err(),
            "unsupported syntax: classes"
        );
        assert_eq!(
            run("function main() { function* g() {} return g; }").unwrap_err(),
            "unsupported syntax: generator functions"
        );
        assert_eq!(
            run("function main() { return this; }").unwrap_err(),
            "unsupported syntax: `this`"
        );
    }

    #[test]
    fn test_step_budget_stops_infinite_loop() {
        let err = run_with_limits(
            "function main() { while (true) {} }",
            Value::Undefined,
            Limits {
                max_steps: 500,
                max_call_depth: 16,
                ..Limits::default()
            },
        )
        .unwrap_err();
        assert_eq!(err, "step budget of 500 exceeded");
    }

    #[test]
    fn test_budget_errors_are_not_catchable() {
        let err = run_with_limits(
            "function main() { function f() { return f(); } try { f(); } catch (e) { return 'caught'; } }",
            Value::Undefined,
            Limits {
                max_steps: 100_000,
                max_call_depth: 32,
                ..Limits::default()
            },
        )
        .unwrap_err();
        assert_eq!(err, "call depth limit of 32 exceeded");
    }

    #[test]
    fn test_const_reassignment_fails_at_runtime() {
        let err = run("function main() { const x = 1; x = 2; }").unwrap_err();
        assert_eq!(err, "TypeError: assignment to constant variable `x`");
    }

    #[test]
    fn test_rest_parameters_collect_remaining_arguments() {
        let out = eval_string(
            "function main() {
                const sum = (first, ...rest) => rest.reduce((a, b) => a + b, first);
                function tail(_, ...xs) { return xs.length; }
                function pair(...[a, b]) { return a + b; }
                return [sum(1, 2, 3), sum(4), tail(), tail(1, 2, 3), pair('x', 'y', 'z')].join(',');
            }",
        );
        assert_eq!(out, "6,4,0,2,xy");
    }

    #[test]
    fn test_async_functions_settle_synchronously() {
        let out = eval_string(
            "function main() {
                const double = async (n) => (await n) * 2;
                async function label(x) {
                    const value = await double(x);
                    return `#${value}`;
                }
                return [double(4), label(5)].join(',');
            }",
        );
        assert_eq!(out, "8,#10");
    }

    #[test]
    fn test_new_only_instantiates_host_constructors() {
        let mut input = Object::new();
        input.set(
            "Box",
            Value::native("Box", |_, args| {
                let mut boxed = Object::new();
                boxed.set("value", args.first().cloned().unwrap_or(Value::Undefined));
                Ok(Value::object(boxed))
            }),
        );
        let out = run_with_limits(
            "function main({ Box }) { return new Box(3).value + new Box(...[4]).value; }",
            Value::object(input),
            Limits::default(),
        )
        .unwrap();
        assert_eq!(out.to_number(), 7.0);

        assert_eq!(
            run("function main() { function Point() {} return new Point(); }").unwrap_err(),
            "TypeError: `Point` is not a constructor; only host-provided constructors support `new`"
        );
        assert_eq!(
            run("function main() { const x = 1; return new x(); }").unwrap_err(),
            "TypeError: 1 is not a constructor"
        );
        assert_eq!(
            eval_string(
                "function main() {
                    function Point() {}
                    try { new Point(); } catch (e) { return e.name; }
                }"
            ),
            "TypeError"
        );
    }

    #[test]
    fn test_let_loop_binds_per_iteration() {
        let out = eval_string(
            "function main() {
                const fns = [];
                for (let i = 0; i < 3; i++) {
                    if (i === 1) { fns.push(() => i * 10); continue; }
                    fns.push(() => i);
                }
                return fns.map((f) => f()).join(',');
            }",
        );
        assert_eq!(out, "0,10,2");

        let out = eval_string(
            "function main() {
                const fns = [];
                for (var i = 0; i < 3; i++) { fns.push(() => i); }
                return fns.map((f) => f()).join(',');
            }",
        );
        assert_eq!(out, "3,3,3");
    }

    /// Runs on the sandbox stack, as compiled components do.
    fn run_deep(source: &str) -> Result<String, String> {
        stack::with_sandbox_stack(|| run(source).map(|v| v.to_js_string())).unwrap()
    }

    fn nested_array_source(depth: usize) -> String {
        format!(
            "function main() {{ const x = {}1{}; return x.flat({}).length; }}",
            "[".repeat(depth),
            "]".repeat(depth),
            depth
        )
    }

    #[test]
    fn test_deeply_nested_literals_are_rejected_while_lowering() {
        assert_eq!(run_deep(&nested_array_source(300)).unwrap(), "1");
        assert_eq!(
            run_deep(&nested_array_source(1_000)).unwrap_err(),
            "code is nested deeper than 512 levels"
        );
    }

    #[test]
    fn test_recursion_through_callbacks_reports_call_depth() {
        let source = |n: usize| {
            format!(
                "function main() {{
                    function f(n) {{ return n <= 0 ? 0 : [1].map(() => f(n - 1))[0] + 1; }}
                    return f({});
                }}",
                n
            )
        };
        assert_eq!(run_deep(&source(120)).unwrap(), "120");
        assert_eq!(run_deep(&source(200)).unwrap_err(), "call depth limit of 256 exceeded");
        assert_eq!(
            run_deep("function main() { function f(n) { return f(n + 1); } return f(0); }").unwrap_err(),
            "call depth limit of 256 exceeded"
        );
    }

    #[test]
    fn test_joining_deeply_nested_arrays_is_a_range_error() {
        let err = run_deep(
            "function main() {
                let a = [];
                for (let i = 0; i < 20000; i++) { a = [a]; }
                return '' + a;
            }",
        )
        .unwrap_err();
        assert!(err.starts_with("RangeError: invalid string length"), "{}", err);
    }

    #[test]
    fn test_input_is_passed_through() {
        let mut obj = Object::new();
        obj.set("n", Value::Number(21.0));
        let out = run_with_limits(
            "function main({ n }) { return `n*2=${n * 2}`; }",
            Value::object(obj),
            Limits::default(),
        )
        .unwrap();
        assert_eq!(out.to_js_string(), "n*2=42");
    }
}
