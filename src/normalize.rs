//! Source normalization.
//!
//! Turns a generated module into a flat function body: imports are cut,
//! export modifiers are removed, and the exported component's parameters are
//! rewritten so it receives `children`. All edits are span splices on the
//! original text, so everything outside the touched ranges stays byte-exact.

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    BindingPattern, Declaration, ExportDefaultDeclarationKind, Expression, FormalParameters,
    Function, PropertyKey, Statement, VariableDeclaration,
};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType};
use serde::{Deserialize, Serialize};

use crate::error::StageError;
use crate::scope;

/// Parameter list given to components declared without parameters.
pub const CHILDREN_PARAMS: &str = "({ children }: { children?: ReactNode })";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedSource {
    pub component_name: String,
    pub body: String,
}

/// A pending `(start, end, replacement)` splice, in source byte offsets.
type Edit = (u32, u32, String);

pub(crate) fn source_type() -> SourceType {
    SourceType::default()
        .with_typescript(true)
        .with_jsx(true)
        .with_module(true)
}

pub(crate) fn describe_errors<E: std::fmt::Display>(errors: &[E]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn normalize(source: &str) -> Result<NormalizedSource, StageError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, source_type()).parse();
    if ret.panicked || !ret.errors.is_empty() {
        return Err(StageError::transpile(describe_errors(&ret.errors)));
    }
    let body = &ret.program.body;

    let body_start = body
        .iter()
        .filter_map(|stmt| match stmt {
            Statement::ImportDeclaration(import) => Some(import.span.end),
            _ => None,
        })
        .max()
        .unwrap_or(0);

    let (component_name, component_edits) = locate_component(body)?;

    let mut edits = component_edits;
    for stmt in body.iter() {
        export_edits(stmt, &mut edits);
    }

    edits.retain(|(start, _, _)| *start >= body_start);
    edits.sort_by(|a, b| b.0.cmp(&a.0));
    edits.dedup_by(|a, b| a.0 == b.0 && a.1 == b.1);

    let mut result = source.to_string();
    for (start, end, replacement) in edits {
        result.replace_range((start as usize)..(end as usize), &replacement);
    }

    tracing::debug!(component = %component_name, "normalized source");
    Ok(NormalizedSource {
        component_name,
        body: result[body_start as usize..].trim().to_string(),
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPONENT DISCOVERY
// ═══════════════════════════════════════════════════════════════════════════════

/// Finds the exported component and the edits that turn its declaration into
/// a plain one taking `children`.
fn locate_component(body: &[Statement<'_>]) -> Result<(String, Vec<Edit>), StageError> {
    for stmt in body {
        match stmt {
            Statement::ExportNamedDeclaration(export) => match &export.declaration {
                Some(Declaration::FunctionDeclaration(func)) => {
                    return function_component(func);
                }
                Some(Declaration::VariableDeclaration(decl)) => {
                    return variable_component(decl);
                }
                _ => {}
            },
            Statement::ExportDefaultDeclaration(export) => match &export.declaration {
                ExportDefaultDeclarationKind::FunctionDeclaration(func) => {
                    return function_component(func);
                }
                kind => {
                    if let Some(
                        Expression::ArrowFunctionExpression(_) | Expression::FunctionExpression(_),
                    ) = kind.as_expression()
                    {
                        return Err(StageError::UnresolvableComponentName {
                            reason: "the default export is an anonymous function".to_string(),
                        });
                    }
                }
            },
            _ => {}
        }
    }

    // `function Page() {…}` followed by `export default Page;`
    let declared = scope::top_level_declarations(body);
    for stmt in body {
        let Statement::ExportDefaultDeclaration(export) = stmt else {
            continue;
        };
        let Some(Expression::Identifier(ident)) = export.declaration.as_expression() else {
            continue;
        };
        let name = ident.name.as_str();
        if !declared.contains(name) {
            continue;
        }
        for candidate in body {
            match candidate {
                Statement::FunctionDeclaration(func)
                    if func.id.as_ref().is_some_and(|id| id.name == name) =>
                {
                    return function_component(func);
                }
                Statement::VariableDeclaration(decl)
                    if declares(decl, name) =>
                {
                    return variable_component(decl);
                }
                _ => {}
            }
        }
    }

    Err(StageError::NoExportedComponent)
}

fn declares(decl: &VariableDeclaration<'_>, name: &str) -> bool {
    decl.declarations.first().is_some_and(|d| {
        matches!(&d.id, BindingPattern::BindingIdentifier(id) if id.name == name)
    })
}

fn function_component(func: &Function<'_>) -> Result<(String, Vec<Edit>), StageError> {
    let Some(id) = &func.id else {
        return Err(StageError::UnresolvableComponentName {
            reason: "the exported function has no name".to_string(),
        });
    };
    let mut edits = Vec::new();
    children_edit(&func.params, &mut edits);
    Ok((id.name.to_string(), edits))
}

fn variable_component(decl: &VariableDeclaration<'_>) -> Result<(String, Vec<Edit>), StageError> {
    let Some(declarator) = decl.declarations.first() else {
        return Err(StageError::NoExportedComponent);
    };
    let BindingPattern::BindingIdentifier(id) = &declarator.id else {
        return Err(StageError::UnresolvableComponentName {
            reason: "the exported declaration binds a destructuring pattern".to_string(),
        });
    };

    let mut edits = Vec::new();
    match &declarator.init {
        Some(Expression::ArrowFunctionExpression(arrow)) => {
            children_edit(&arrow.params, &mut edits)
        }
        Some(Expression::FunctionExpression(func)) => children_edit(&func.params, &mut edits),
        _ => {}
    }
    Ok((id.name.to_string(), edits))
}

/// Makes the parameter list destructure `children`.
fn children_edit(params: &FormalParameters<'_>, edits: &mut Vec<Edit>) {
    if params.items.is_empty() && params.rest.is_none() {
        edits.push((params.span.start, params.span.end, CHILDREN_PARAMS.to_string()));
        return;
    }
    let Some(first) = params.items.first() else {
        return;
    };
    let BindingPattern::ObjectPattern(pattern) = &first.pattern else {
        return;
    };
    let has_children = pattern.properties.iter().any(|prop| match &prop.key {
        PropertyKey::StaticIdentifier(key) => key.name == "children",
        PropertyKey::StringLiteral(key) => key.value == "children",
        _ => false,
    });
    if !has_children {
        let open = pattern.span.start + 1;
        edits.push((open, open, " children,".to_string()));
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPORT STRIPPING
// ═══════════════════════════════════════════════════════════════════════════════

fn export_edits(stmt: &Statement<'_>, edits: &mut Vec<Edit>) {
    match stmt {
        Statement::ExportNamedDeclaration(export) => match &export.declaration {
            Some(declaration) => {
                edits.push((export.span.start, declaration.span().start, String::new()));
            }
            None => edits.push((export.span.start, export.span.end, String::new())),
        },
        Statement::ExportDefaultDeclaration(export) => match &export.declaration {
            ExportDefaultDeclarationKind::FunctionDeclaration(func) => {
                edits.push((export.span.start, func.span.start, String::new()));
            }
            ExportDefaultDeclarationKind::ClassDeclaration(class) => {
                edits.push((export.span.start, class.span.start, String::new()));
            }
            _ => edits.push((export.span.start, export.span.end, String::new())),
        },
        Statement::ExportAllDeclaration(export) => {
            edits.push((export.span.start, export.span.end, String::new()));
        }
        Statement::TSExportAssignment(export) => {
            edits.push((export.span.start, export.span.end, String::new()));
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ok(source: &str) -> NormalizedSource {
        normalize(source).unwrap()
    }

    #[test]
    fn test_strips_imports_and_export_default() {
        let out = ok("import { Button } from '@/components/ui/button';\n\
import React from 'react';\n\
\n\
export default function Home() {\n  return <Button>Hi</Button>;\n}\n");
        assert_eq!(out.component_name, "Home");
        assert_eq!(
            out.body,
            "function Home({ children }: { children?: ReactNode }) {\n  return <Button>Hi</Button>;\n}"
        );
    }

    #[test]
    fn test_object_pattern_gains_children() {
        let out = ok("export default function BlogLayout({ title }: { title: string }) { return <div>{title}</div>; }");
        assert_eq!(
            out.body,
            "function BlogLayout({ children, title }: { title: string }) { return <div>{title}</div>; }"
        );
    }

    #[test]
    fn test_existing_children_and_identifier_params_untouched() {
        let out = ok("export function Layout({ children }) { return children; }");
        assert_eq!(out.body, "function Layout({ children }) { return children; }");

        let out = ok("export const Card = (props) => <div>{props.children}</div>;");
        assert_eq!(out.component_name, "Card");
        assert_eq!(out.body, "const Card = (props) => <div>{props.children}</div>;");
    }

    #[test]
    fn test_arrow_without_params() {
        let out = ok("export const Page = () => <main />;");
        assert_eq!(
            out.body,
            "const Page = ({ children }: { children?: ReactNode }) => <main />;"
        );
    }

    #[test]
    fn test_first_exported_declaration_wins() {
        let out = ok("const helper = 1;\nexport const First = () => null;\nexport function Second() { return null; }");
        assert_eq!(out.component_name, "First");
        assert!(out.body.contains("function Second()"));
        assert!(!out.body.contains("export"));
    }

    #[test]
    fn test_default_export_of_identifier() {
        let out = ok("function Page() { return <p />; }\nexport default Page;");
        assert_eq!(out.component_name, "Page");
        assert_eq!(
            out.body,
            "function Page({ children }: { children?: ReactNode }) { return <p />; }"
        );
    }

    #[test]
    fn test_wrapped_initializer_kept_verbatim() {
        let out = ok("export const Page = memo(function Inner() { return null; });");
        assert_eq!(out.component_name, "Page");
        assert_eq!(out.body, "const Page = memo(function Inner() { return null; });");
    }

    #[test]
    fn test_missing_export_fails() {
        assert_eq!(
            normalize("function Page() { return null; }"),
            Err(StageError::NoExportedComponent)
        );
    }

    #[test]
    fn test_destructured_export_is_unresolvable() {
        assert!(matches!(
            normalize("export const { Page } = components;"),
            Err(StageError::UnresolvableComponentName { .. })
        ));
        assert!(matches!(
            normalize("export default function () { return null; }"),
            Err(StageError::UnresolvableComponentName { .. })
        ));
    }

    #[test]
    fn test_syntax_error_is_transpile_error() {
        assert!(matches!(
            normalize("export default function Page( { return <div>; }"),
            Err(StageError::Transpile { .. })
        ));
    }
}
