//! Top-level binding collection.
//!
//! Used by the normalizer to resolve `export default Name;`, by the
//! transpiler to let module declarations shadow capabilities, and by the
//! binder to check that the component a module claims to define is really
//! declared at its top level (and not merely referenced, or nested in a block).

use oxc_ast::ast::{
    ArrowFunctionExpression, BindingIdentifier, Class, Declaration, Function, Statement,
};
use oxc_ast_visit::Visit;
use oxc_syntax::scope::ScopeFlags;
use std::collections::BTreeSet;

/// Collects the names a statement binds in its enclosing scope. Nested
/// function and class bodies are not entered.
pub struct BindingCollector<'s> {
    pub symbols: &'s mut BTreeSet<String>,
}

impl<'a, 's> Visit<'a> for BindingCollector<'s> {
    fn visit_binding_identifier(&mut self, ident: &BindingIdentifier<'a>) {
        self.symbols.insert(ident.name.to_string());
    }

    fn visit_function(&mut self, func: &Function<'a>, _flags: ScopeFlags) {
        if let Some(id) = &func.id {
            self.symbols.insert(id.name.to_string());
        }
    }

    fn visit_arrow_function_expression(&mut self, _func: &ArrowFunctionExpression<'a>) {}

    fn visit_class(&mut self, class: &Class<'a>) {
        if let Some(id) = &class.id {
            self.symbols.insert(id.name.to_string());
        }
    }
}

/// Value bindings declared by `declaration`. Type-only declarations bind
/// nothing at runtime and are skipped.
pub fn declaration_names(declaration: &Declaration<'_>, out: &mut BTreeSet<String>) {
    let mut collector = BindingCollector { symbols: out };
    match declaration {
        Declaration::VariableDeclaration(decl) => {
            for declarator in &decl.declarations {
                collector.visit_binding_pattern(&declarator.id);
            }
        }
        Declaration::FunctionDeclaration(func) => {
            collector.visit_function(func, ScopeFlags::Function);
        }
        Declaration::ClassDeclaration(class) => collector.visit_class(class),
        _ => {}
    }
}

/// Names declared directly in `statements` (`const`/`let`/`var`, functions,
/// classes), including declarations behind `export`.
pub fn top_level_declarations(statements: &[Statement<'_>]) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for stmt in statements {
        match stmt {
            Statement::VariableDeclaration(decl) => {
                let mut collector = BindingCollector { symbols: &mut names };
                for declarator in &decl.declarations {
                    collector.visit_binding_pattern(&declarator.id);
                }
            }
            Statement::FunctionDeclaration(func) => {
                if let Some(id) = &func.id {
                    names.insert(id.name.to_string());
                }
            }
            Statement::ClassDeclaration(class) => {
                if let Some(id) = &class.id {
                    names.insert(id.name.to_string());
                }
            }
            Statement::ExportNamedDeclaration(export) => {
                if let Some(declaration) = &export.declaration {
                    declaration_names(declaration, &mut names);
                }
            }
            _ => {}
        }
    }
    names
}
