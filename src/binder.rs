//! Capability binding.
//!
//! `materialize` is the only place untrusted code becomes callable. The
//! executable code is wrapped in a factory function, re-parsed, checked
//! against the namespace, lowered into the sandbox IR (which rejects every
//! free identifier) and finally evaluated with the namespace object.

use std::collections::BTreeSet;

use oxc_allocator::Allocator;
use oxc_ast::ast::{BindingPattern, Expression, Function, PropertyKey, Statement};
use oxc_parser::Parser;

use crate::capability::{is_valid_identifier, CapabilityNamespace, FACTORY_NAME, SCOPE_PARAM};
use crate::error::StageError;
use crate::normalize::{describe_errors, source_type};
use crate::options::EngineOptions;
use crate::sandbox::{lower_factory, Limits, Machine, Scope, Value};
use crate::scope;

pub fn limits(options: &EngineOptions) -> Limits {
    Limits {
        max_steps: options.max_steps,
        max_call_depth: options.max_call_depth,
        max_nesting_depth: options.max_nesting_depth,
        max_string_length: options.max_string_length,
        max_array_length: options.max_array_length,
    }
}

/// `function __factory(__scope) { <code> return <name>; }`
pub fn synthesize_factory(code: &str, component_name: &str) -> String {
    format!(
        "function {}({}) {{\n{}\nreturn {};\n}}",
        FACTORY_NAME, SCOPE_PARAM, code, component_name
    )
}

/// Turns executable code into the component value it defines.
pub fn materialize(
    namespace: &CapabilityNamespace,
    code: &str,
    component_name: &str,
    options: &EngineOptions,
) -> Result<Value, StageError> {
    if !is_valid_identifier(component_name) {
        return Err(StageError::binding(format!(
            "`{}` is not a valid component name",
            component_name
        )));
    }

    let source = synthesize_factory(code, component_name);
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, &source, source_type()).parse();
    if ret.panicked || !ret.errors.is_empty() {
        return Err(StageError::binding(format!(
            "factory does not parse: {}",
            describe_errors(&ret.errors)
        )));
    }

    let factory = single_factory(&ret.program.body)?;
    let statements: &[Statement<'_>] = match &factory.body {
        Some(body) => &body.statements,
        None => &[],
    };

    let preamble_index = statements.iter().position(is_preamble);
    if let Some(index) = preamble_index {
        let missing: Vec<String> = preamble_keys(&statements[index])
            .into_iter()
            .filter(|key| !namespace.contains(key))
            .collect();
        if !missing.is_empty() {
            return Err(StageError::binding(format!(
                "missing from the capability namespace: {}",
                quote_list(&missing)
            )));
        }
    }

    let user_statements: Vec<&Statement<'_>> = statements
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != preamble_index)
        .map(|(_, stmt)| stmt)
        .collect();
    let declared = user_declarations(&user_statements);
    if !declared.contains(component_name) {
        return Err(StageError::binding(format!(
            "`{}` is not declared at the top level of the component module",
            component_name
        )));
    }

    let def = lower_factory(factory).map_err(|e| StageError::binding(e.to_string()))?;

    let mut machine = Machine::new(limits(options));
    let factory_value = Machine::instantiate(&def, &Scope::root());
    let component = machine
        .call(&factory_value, &[namespace.scope_object()])
        .map_err(|e| StageError::binding(format!("evaluating the module failed: {}", e)))?;

    if !component.is_function() {
        return Err(StageError::binding(format!(
            "`{}` is a {}, not a component",
            component_name,
            component.type_of()
        )));
    }

    tracing::debug!(component = component_name, steps = machine.steps(), "materialized component");
    Ok(component)
}

/// The synthesized program must be exactly the factory declaration.
fn single_factory<'p, 'a>(body: &'p [Statement<'a>]) -> Result<&'p Function<'a>, StageError> {
    match body {
        [Statement::FunctionDeclaration(func)]
            if func.id.as_ref().is_some_and(|id| id.name == FACTORY_NAME) =>
        {
            Ok(&**func)
        }
        _ => Err(StageError::binding(
            "executable code escapes the factory boundary",
        )),
    }
}

/// `const { … } = __scope;`
fn is_preamble(stmt: &Statement<'_>) -> bool {
    let Statement::VariableDeclaration(decl) = stmt else {
        return false;
    };
    decl.declarations.iter().any(|d| {
        matches!(&d.init, Some(Expression::Identifier(ident)) if ident.name == SCOPE_PARAM)
            && matches!(d.id, BindingPattern::ObjectPattern(_))
    })
}

fn preamble_keys(stmt: &Statement<'_>) -> Vec<String> {
    let Statement::VariableDeclaration(decl) = stmt else {
        return Vec::new();
    };
    let mut keys = Vec::new();
    for declarator in &decl.declarations {
        let BindingPattern::ObjectPattern(pattern) = &declarator.id else {
            continue;
        };
        for prop in &pattern.properties {
            match &prop.key {
                PropertyKey::StaticIdentifier(key) => keys.push(key.name.to_string()),
                PropertyKey::StringLiteral(key) => keys.push(key.value.to_string()),
                _ => {}
            }
        }
    }
    keys
}

fn user_declarations(statements: &[&Statement<'_>]) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for stmt in statements {
        names.extend(scope::top_level_declarations(std::slice::from_ref(*stmt)));
    }
    names
}

fn quote_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| format!("`{}`", n))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capability;
    use crate::render::{render_value, Node};
    use crate::sandbox::Object;

    fn namespace() -> CapabilityNamespace {
        CapabilityNamespace::new()
            .with("h", Capability::ElementFactory)
            .unwrap()
            .with("Fragment", Capability::Fragment)
            .unwrap()
    }

    fn bind(code: &str, name: &str) -> Result<Value, StageError> {
        materialize(&namespace(), code, name, &EngineOptions::default())
    }

    fn message(err: StageError) -> String {
        match err {
            StageError::Binding { message } => message,
            other => panic!("expected a binding error, got {:?}", other),
        }
    }

    #[test]
    fn test_materialize_returns_callable_component() {
        let component = bind(
            "const { Fragment, h } = __scope;\nfunction Page({ children }) { return h(\"p\", null, \"hi \", children); }",
            "Page",
        )
        .unwrap();
        let mut machine = Machine::new(Limits::default());
        let mut props = Object::new();
        props.set("children", Value::string("there"));
        let out = machine.call(&component, &[Value::object(props)]).unwrap();
        let nodes = render_value(&mut machine, &out).unwrap();
        assert_eq!(Node::from_children(nodes).to_html(), "<p>hi there</p>");
    }

    #[test]
    fn test_preamble_key_missing_from_namespace() {
        let err = bind(
            "const { Button, h } = __scope;\nfunction Page() { return h(Button, null); }",
            "Page",
        )
        .unwrap_err();
        assert_eq!(message(err), "missing from the capability namespace: `Button`");
    }

    #[test]
    fn test_unbound_identifiers_are_named() {
        let err = bind(
            "const { h } = __scope;\nfunction Page() { return h(\"p\", null, window.location, require(\"fs\")); }",
            "Page",
        )
        .unwrap_err();
        assert_eq!(message(err), "`require`, `window` are not bound in the sandbox");
    }

    #[test]
    fn test_factory_escape_is_rejected() {
        let err = bind(
            "function Page() { return null; }\nreturn Page;\n}\nfunction escape() {",
            "Page",
        )
        .unwrap_err();
        assert_eq!(message(err), "executable code escapes the factory boundary");
    }

    #[test]
    fn test_component_must_be_declared_at_top_level() {
        let err = bind("{ function Page() { return null; } }", "Page").unwrap_err();
        assert_eq!(
            message(err),
            "`Page` is not declared at the top level of the component module"
        );

        let err = bind("function Page() { return null; }", "Page; evil()").unwrap_err();
        assert_eq!(message(err), "`Page; evil()` is not a valid component name");
    }

    #[test]
    fn test_non_function_component_is_rejected() {
        let err = bind("const Page = 42;", "Page").unwrap_err();
        assert_eq!(message(err), "`Page` is a number, not a component");
    }

    #[test]
    fn test_module_level_throw_is_binding_error() {
        let err = bind("const Page = () => null;\nthrow 'boom';", "Page").unwrap_err();
        assert!(message(err).starts_with("evaluating the module failed"));
    }
}
