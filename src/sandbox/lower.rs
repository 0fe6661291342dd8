//! oxc AST → sandbox IR.
//!
//! Lowering resolves every identifier against the lexical scopes of the
//! program being lowered. There is no global object: a reference that no
//! enclosing declaration binds is recorded as unbound, and the whole program
//! is rejected once lowering completes. `undefined`, `NaN` and `Infinity`
//! lower to literals unless shadowed.

use std::collections::{BTreeSet, HashSet};
use std::rc::Rc;

use oxc_ast::ast::*;
use oxc_syntax::operator::{
    AssignmentOperator, BinaryOperator, LogicalOperator, UnaryOperator, UpdateOperator,
};
use thiserror::Error;

use super::ir;
use super::value::format_number;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LowerError {
    #[error("{} not bound in the sandbox", describe_unbound(.0))]
    Unbound(Vec<String>),

    #[error("unsupported syntax: {0}")]
    Unsupported(String),

    #[error("code is nested deeper than {0} levels")]
    TooDeep(usize),
}

fn describe_unbound(names: &[String]) -> String {
    let quoted: Vec<String> = names.iter().map(|n| format!("`{}`", n)).collect();
    if quoted.len() == 1 {
        format!("{} is", quoted[0])
    } else {
        format!("{} are", quoted.join(", "))
    }
}

fn unsupported(what: &str) -> LowerError {
    LowerError::Unsupported(what.to_string())
}

type Result<T> = std::result::Result<T, LowerError>;

/// Statements, expressions and patterns nested inside one another.
pub const MAX_LOWERING_DEPTH: usize = 512;

/// Lowers a function declaration (the synthesised factory) with no
/// enclosing scope. Every unbound reference is reported at once.
pub fn lower_factory(func: &Function<'_>) -> Result<Rc<ir::FunctionDef>> {
    let mut lowerer = Lowerer::default();
    let def = lowerer.lower_function(func, None)?;
    if lowerer.unbound.is_empty() {
        Ok(def)
    } else {
        Err(LowerError::Unbound(lowerer.unbound.into_iter().collect()))
    }
}

#[derive(Default)]
struct Lowerer {
    scopes: Vec<HashSet<String>>,
    unbound: BTreeSet<String>,
    depth: usize,
}

impl Lowerer {
    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_LOWERING_DEPTH {
            return Err(LowerError::TooDeep(MAX_LOWERING_DEPTH));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn is_bound(&self, name: &str) -> bool {
        self.scopes.iter().rev().any(|scope| scope.contains(name))
    }

    fn in_scope<T>(&mut self, names: HashSet<String>, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.scopes.push(names);
        let result = f(self);
        self.scopes.pop();
        result
    }

    fn reference(&mut self, name: &str) -> ir::Expr {
        if self.is_bound(name) {
            return ir::Expr::Ident(name.to_string());
        }
        match name {
            "undefined" => ir::Expr::Undefined,
            "NaN" => ir::Expr::Number(f64::NAN),
            "Infinity" => ir::Expr::Number(f64::INFINITY),
            _ => {
                self.unbound.insert(name.to_string());
                ir::Expr::Undefined
            }
        }
    }

    fn target_ident(&mut self, name: &str) -> ir::Target {
        if !self.is_bound(name) {
            self.unbound.insert(name.to_string());
        }
        ir::Target::Ident(name.to_string())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // FUNCTIONS
    // ═══════════════════════════════════════════════════════════════════════════

    fn lower_function(&mut self, func: &Function<'_>, name_hint: Option<&str>) -> Result<Rc<ir::FunctionDef>> {
        if func.generator {
            return Err(unsupported("generator functions"));
        }
        let (name, self_binding) = match &func.id {
            Some(id) => (
                Some(id.name.to_string()),
                matches!(func.r#type, FunctionType::FunctionExpression),
            ),
            None => (name_hint.map(str::to_string), false),
        };
        let statements: &[Statement<'_>] = match &func.body {
            Some(body) => &body.statements,
            None => &[],
        };
        self.lower_callable(name, self_binding, &func.params, statements, false)
    }

    fn lower_arrow(
        &mut self,
        arrow: &ArrowFunctionExpression<'_>,
        name_hint: Option<&str>,
    ) -> Result<Rc<ir::FunctionDef>> {
        self.lower_callable(
            name_hint.map(str::to_string),
            false,
            &arrow.params,
            &arrow.body.statements,
            arrow.expression,
        )
    }

    fn lower_callable(
        &mut self,
        name: Option<String>,
        self_binding: bool,
        params: &FormalParameters<'_>,
        statements: &[Statement<'_>],
        expression_body: bool,
    ) -> Result<Rc<ir::FunctionDef>> {
        let rest = params.rest.as_ref().map(|rest| &rest.rest.argument);
        let mut var_names = Vec::new();
        collect_var_names(statements, &mut var_names);

        let mut frame: HashSet<String> = var_names.iter().cloned().collect();
        for param in &params.items {
            let mut names = Vec::new();
            collect_binding_names(&param.pattern, &mut names);
            frame.extend(names);
        }
        if let Some(rest) = rest {
            let mut names = Vec::new();
            collect_binding_names(rest, &mut names);
            frame.extend(names);
        }
        if self_binding {
            frame.extend(name.clone());
        }

        self.in_scope(frame, |this| {
            let params = params
                .items
                .iter()
                .map(|param| this.lower_pattern(&param.pattern))
                .collect::<Result<Vec<_>>>()?;
            let rest = rest.map(|pattern| this.lower_pattern(pattern)).transpose()?;

            let body = match (expression_body, statements.first()) {
                (true, Some(Statement::ExpressionStatement(stmt))) => {
                    ir::FunctionBody::Expression(this.lower_expr(&stmt.expression)?)
                }
                _ => ir::FunctionBody::Block(this.lower_block(statements)?),
            };

            Ok(Rc::new(ir::FunctionDef {
                name,
                self_binding,
                params,
                rest,
                var_names,
                body,
            }))
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STATEMENTS
    // ═══════════════════════════════════════════════════════════════════════════

    fn lower_block(&mut self, statements: &[Statement<'_>]) -> Result<ir::Block> {
        let (lexical, names) = lexical_declarations(statements);
        let stmts = self.in_scope(names, |this| {
            statements
                .iter()
                .map(|stmt| this.lower_stmt(stmt))
                .collect::<Result<Vec<_>>>()
        })?;
        Ok(ir::Block { lexical, stmts })
    }

    fn lower_stmt(&mut self, stmt: &Statement<'_>) -> Result<ir::Stmt> {
        self.nested(|this| this.lower_stmt_inner(stmt))
    }

    fn lower_stmt_inner(&mut self, stmt: &Statement<'_>) -> Result<ir::Stmt> {
        Ok(match stmt {
            Statement::BlockStatement(block) => ir::Stmt::Block(self.lower_block(&block.body)?),
            Statement::VariableDeclaration(decl) => self.lower_declaration(decl)?,
            Statement::FunctionDeclaration(func) => ir::Stmt::Function(self.lower_function(func, None)?),
            Statement::ExpressionStatement(stmt) => ir::Stmt::Expr(self.lower_expr(&stmt.expression)?),
            Statement::ReturnStatement(ret) => ir::Stmt::Return(
                ret.argument
                    .as_ref()
                    .map(|arg| self.lower_expr(arg))
                    .transpose()?,
            ),
            Statement::IfStatement(stmt) => ir::Stmt::If {
                test: self.lower_expr(&stmt.test)?,
                consequent: Box::new(self.lower_stmt(&stmt.consequent)?),
                alternate: match &stmt.alternate {
                    Some(alt) => Some(Box::new(self.lower_stmt(alt)?)),
                    None => None,
                },
            },
            Statement::ForStatement(stmt) => self.lower_for(stmt)?,
            Statement::ForOfStatement(stmt) => {
                if stmt.r#await {
                    return Err(unsupported("for await"));
                }
                let (kind, pattern, names) = self.lower_loop_head(&stmt.left)?;
                let iterable = self.lower_expr(&stmt.right)?;
                let body = self.in_scope(names, |this| this.lower_stmt(&stmt.body))?;
                ir::Stmt::ForOf {
                    kind,
                    pattern,
                    iterable,
                    body: Box::new(body),
                }
            }
            Statement::ForInStatement(stmt) => {
                let (kind, pattern, names) = self.lower_loop_head(&stmt.left)?;
                let object = self.lower_expr(&stmt.right)?;
                let body = self.in_scope(names, |this| this.lower_stmt(&stmt.body))?;
                ir::Stmt::ForIn {
                    kind,
                    pattern,
                    object,
                    body: Box::new(body),
                }
            }
            Statement::WhileStatement(stmt) => ir::Stmt::While {
                test: self.lower_expr(&stmt.test)?,
                body: Box::new(self.lower_stmt(&stmt.body)?),
            },
            Statement::DoWhileStatement(stmt) => ir::Stmt::DoWhile {
                body: Box::new(self.lower_stmt(&stmt.body)?),
                test: self.lower_expr(&stmt.test)?,
            },
            Statement::SwitchStatement(stmt) => {
                let discriminant = self.lower_expr(&stmt.discriminant)?;
                let mut lexical = Vec::new();
                let mut names = HashSet::new();
                for case in &stmt.cases {
                    let (case_lexical, case_names) = lexical_declarations(&case.consequent);
                    lexical.extend(case_lexical);
                    names.extend(case_names);
                }
                let cases = self.in_scope(names, |this| {
                    stmt.cases
                        .iter()
                        .map(|case| {
                            Ok(ir::SwitchCase {
                                test: case.test.as_ref().map(|t| this.lower_expr(t)).transpose()?,
                                body: case
                                    .consequent
                                    .iter()
                                    .map(|s| this.lower_stmt(s))
                                    .collect::<Result<Vec<_>>>()?,
                            })
                        })
                        .collect::<Result<Vec<_>>>()
                })?;
                ir::Stmt::Switch {
                    discriminant,
                    lexical,
                    cases,
                }
            }
            Statement::TryStatement(stmt) => {
                let block = self.lower_block(&stmt.block.body)?;
                let handler = match &stmt.handler {
                    Some(clause) => {
                        let mut names = Vec::new();
                        if let Some(param) = &clause.param {
                            collect_binding_names(&param.pattern, &mut names);
                        }
                        Some(self.in_scope(names.into_iter().collect(), |this| {
                            Ok(ir::CatchHandler {
                                param: clause
                                    .param
                                    .as_ref()
                                    .map(|p| this.lower_pattern(&p.pattern))
                                    .transpose()?,
                                body: this.lower_block(&clause.body.body)?,
                            })
                        })?)
                    }
                    None => None,
                };
                let finalizer = match &stmt.finalizer {
                    Some(block) => Some(self.lower_block(&block.body)?),
                    None => None,
                };
                ir::Stmt::Try {
                    block,
                    handler,
                    finalizer,
                }
            }
            Statement::ThrowStatement(stmt) => ir::Stmt::Throw(self.lower_expr(&stmt.argument)?),
            Statement::BreakStatement(stmt) => {
                if stmt.label.is_some() {
                    return Err(unsupported("labeled break"));
                }
                ir::Stmt::Break
            }
            Statement::ContinueStatement(stmt) => {
                if stmt.label.is_some() {
                    return Err(unsupported("labeled continue"));
                }
                ir::Stmt::Continue
            }
            Statement::EmptyStatement(_)
            | Statement::DebuggerStatement(_)
            | Statement::TSTypeAliasDeclaration(_)
            | Statement::TSInterfaceDeclaration(_) => ir::Stmt::Empty,
            Statement::ClassDeclaration(_) => return Err(unsupported("classes")),
            Statement::LabeledStatement(_) => return Err(unsupported("labeled statements")),
            Statement::WithStatement(_) => return Err(unsupported("`with`")),
            Statement::ImportDeclaration(_) => return Err(unsupported("import declarations")),
            _ => return Err(unsupported("module or TypeScript declarations")),
        })
    }

    fn lower_declaration(&mut self, decl: &VariableDeclaration<'_>) -> Result<ir::Stmt> {
        let kind = decl_kind(decl.kind)?;
        let mut declarations = Vec::with_capacity(decl.declarations.len());
        for declarator in &decl.declarations {
            let hint = match &declarator.id {
                BindingPattern::BindingIdentifier(id) => Some(id.name.to_string()),
                _ => None,
            };
            let init = match &declarator.init {
                Some(init) => Some(self.lower_named_expr(init, hint.as_deref())?),
                None => None,
            };
            declarations.push((self.lower_pattern(&declarator.id)?, init));
        }
        Ok(ir::Stmt::Declare { kind, declarations })
    }

    fn lower_for(&mut self, stmt: &ForStatement<'_>) -> Result<ir::Stmt> {
        let mut names = HashSet::new();
        if let Some(ForStatementInit::VariableDeclaration(decl)) = &stmt.init {
            if !matches!(decl.kind, VariableDeclarationKind::Var) {
                for declarator in &decl.declarations {
                    let mut found = Vec::new();
                    collect_binding_names(&declarator.id, &mut found);
                    names.extend(found);
                }
            }
        }

        self.in_scope(names, |this| {
            let init = match &stmt.init {
                Some(ForStatementInit::VariableDeclaration(decl)) => {
                    Some(Box::new(this.lower_declaration(decl)?))
                }
                Some(init) => match init.as_expression() {
                    Some(expr) => Some(Box::new(ir::Stmt::Expr(this.lower_expr(expr)?))),
                    None => return Err(unsupported("loop initializer")),
                },
                None => None,
            };
            Ok(ir::Stmt::For {
                init,
                test: stmt.test.as_ref().map(|t| this.lower_expr(t)).transpose()?,
                update: stmt.update.as_ref().map(|u| this.lower_expr(u)).transpose()?,
                body: Box::new(this.lower_stmt(&stmt.body)?),
            })
        })
    }

    /// Left side of `for…of` / `for…in`, plus the names it introduces.
    fn lower_loop_head(
        &mut self,
        left: &ForStatementLeft<'_>,
    ) -> Result<(ir::DeclKind, ir::Pattern, HashSet<String>)> {
        match left {
            ForStatementLeft::VariableDeclaration(decl) => {
                let kind = decl_kind(decl.kind)?;
                let Some(declarator) = decl.declarations.first() else {
                    return Err(unsupported("empty loop declaration"));
                };
                let mut found = Vec::new();
                collect_binding_names(&declarator.id, &mut found);
                let names = if kind == ir::DeclKind::Var {
                    HashSet::new()
                } else {
                    found.into_iter().collect()
                };
                let pattern = self.in_scope(names.clone(), |this| this.lower_pattern(&declarator.id))?;
                Ok((kind, pattern, names))
            }
            ForStatementLeft::AssignmentTargetIdentifier(id) => {
                let ir::Target::Ident(name) = self.target_ident(&id.name) else {
                    return Err(unsupported("loop target"));
                };
                Ok((ir::DeclKind::Var, ir::Pattern::Ident(name), HashSet::new()))
            }
            _ => Err(unsupported("member expressions as loop targets")),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PATTERNS
    // ═══════════════════════════════════════════════════════════════════════════

    fn lower_pattern(&mut self, pattern: &BindingPattern<'_>) -> Result<ir::Pattern> {
        self.nested(|this| this.lower_pattern_inner(pattern))
    }

    fn lower_pattern_inner(&mut self, pattern: &BindingPattern<'_>) -> Result<ir::Pattern> {
        Ok(match pattern {
            BindingPattern::BindingIdentifier(id) => ir::Pattern::Ident(id.name.to_string()),
            BindingPattern::ObjectPattern(obj) => {
                let mut properties = Vec::with_capacity(obj.properties.len());
                for prop in &obj.properties {
                    let key = self.lower_property_key(&prop.key, prop.computed)?;
                    properties.push((key, self.lower_pattern(&prop.value)?));
                }
                let rest = match &obj.rest {
                    Some(rest) => Some(Box::new(self.lower_pattern(&rest.argument)?)),
                    None => None,
                };
                ir::Pattern::Object { properties, rest }
            }
            BindingPattern::ArrayPattern(arr) => {
                let mut elements = Vec::with_capacity(arr.elements.len());
                for element in &arr.elements {
                    elements.push(match element {
                        Some(p) => Some(self.lower_pattern(p)?),
                        None => None,
                    });
                }
                let rest = match &arr.rest {
                    Some(rest) => Some(Box::new(self.lower_pattern(&rest.argument)?)),
                    None => None,
                };
                ir::Pattern::Array { elements, rest }
            }
            BindingPattern::AssignmentPattern(assign) => ir::Pattern::Default {
                target: Box::new(self.lower_pattern(&assign.left)?),
                default: self.lower_expr(&assign.right)?,
            },
        })
    }

    fn lower_property_key(&mut self, key: &PropertyKey<'_>, computed: bool) -> Result<ir::PropertyKey> {
        if !computed {
            match key {
                PropertyKey::StaticIdentifier(id) => return Ok(ir::PropertyKey::Static(id.name.to_string())),
                PropertyKey::StringLiteral(s) => return Ok(ir::PropertyKey::Static(s.value.to_string())),
                PropertyKey::NumericLiteral(n) => return Ok(ir::PropertyKey::Static(format_number(n.value))),
                _ => {}
            }
        }
        match key.as_expression() {
            Some(expr) => Ok(ir::PropertyKey::Computed(Box::new(self.lower_expr(expr)?))),
            None => Err(unsupported("private names")),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EXPRESSIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Lowers `expr`, naming anonymous functions after the binding they initialise.
    fn lower_named_expr(&mut self, expr: &Expression<'_>, name: Option<&str>) -> Result<ir::Expr> {
        match expr {
            Expression::ArrowFunctionExpression(arrow) => Ok(ir::Expr::Function(self.lower_arrow(arrow, name)?)),
            Expression::FunctionExpression(func) => Ok(ir::Expr::Function(self.lower_function(func, name)?)),
            other => self.lower_expr(other),
        }
    }

    fn lower_box(&mut self, expr: &Expression<'_>) -> Result<Box<ir::Expr>> {
        self.lower_expr(expr).map(Box::new)
    }

    fn lower_expr(&mut self, expr: &Expression<'_>) -> Result<ir::Expr> {
        self.nested(|this| this.lower_expr_inner(expr))
    }

    fn lower_expr_inner(&mut self, expr: &Expression<'_>) -> Result<ir::Expr> {
        Ok(match expr {
            Expression::BooleanLiteral(b) => ir::Expr::Bool(b.value),
            Expression::NullLiteral(_) => ir::Expr::Null,
            Expression::NumericLiteral(n) => ir::Expr::Number(n.value),
            Expression::StringLiteral(s) => ir::Expr::String(Rc::from(s.value.as_str())),
            Expression::TemplateLiteral(tpl) => ir::Expr::Template {
                quasis: tpl
                    .quasis
                    .iter()
                    .map(|q| match &q.value.cooked {
                        Some(cooked) => cooked.to_string(),
                        None => q.value.raw.to_string(),
                    })
                    .collect(),
                exprs: tpl
                    .expressions
                    .iter()
                    .map(|e| self.lower_expr(e))
                    .collect::<Result<Vec<_>>>()?,
            },
            Expression::Identifier(id) => self.reference(&id.name),
            Expression::ArrayExpression(arr) => {
                let mut items = Vec::with_capacity(arr.elements.len());
                for element in &arr.elements {
                    items.push(match element {
                        ArrayExpressionElement::SpreadElement(spread) => {
                            ir::ArrayItem::Spread(self.lower_expr(&spread.argument)?)
                        }
                        ArrayExpressionElement::Elision(_) => ir::ArrayItem::Hole,
                        other => match other.as_expression() {
                            Some(expr) => ir::ArrayItem::Expr(self.lower_expr(expr)?),
                            None => return Err(unsupported("array element")),
                        },
                    });
                }
                ir::Expr::Array(items)
            }
            Expression::ObjectExpression(obj) => {
                let mut items = Vec::with_capacity(obj.properties.len());
                for prop in &obj.properties {
                    items.push(match prop {
                        ObjectPropertyKind::ObjectProperty(p) => {
                            if !matches!(p.kind, PropertyKind::Init) {
                                return Err(unsupported("getters and setters"));
                            }
                            let key = self.lower_property_key(&p.key, p.computed)?;
                            let hint = match &key {
                                ir::PropertyKey::Static(name) => Some(name.clone()),
                                ir::PropertyKey::Computed(_) => None,
                            };
                            let value = self.lower_named_expr(&p.value, hint.as_deref())?;
                            ir::ObjectItem::Property(key, value)
                        }
                        ObjectPropertyKind::SpreadProperty(spread) => {
                            ir::ObjectItem::Spread(self.lower_expr(&spread.argument)?)
                        }
                    });
                }
                ir::Expr::Object(items)
            }
            Expression::ArrowFunctionExpression(arrow) => ir::Expr::Function(self.lower_arrow(arrow, None)?),
            Expression::FunctionExpression(func) => ir::Expr::Function(self.lower_function(func, None)?),
            Expression::UnaryExpression(unary) => ir::Expr::Unary {
                op: unary_op(unary.operator)?,
                arg: self.lower_box(&unary.argument)?,
            },
            Expression::BinaryExpression(bin) => ir::Expr::Binary {
                op: binary_op(bin.operator)?,
                left: self.lower_box(&bin.left)?,
                right: self.lower_box(&bin.right)?,
            },
            Expression::LogicalExpression(logical) => ir::Expr::Logical {
                op: logical_op(logical.operator),
                left: self.lower_box(&logical.left)?,
                right: self.lower_box(&logical.right)?,
            },
            Expression::ConditionalExpression(cond) => ir::Expr::Conditional {
                test: self.lower_box(&cond.test)?,
                consequent: self.lower_box(&cond.consequent)?,
                alternate: self.lower_box(&cond.alternate)?,
            },
            Expression::AssignmentExpression(assign) => ir::Expr::Assign {
                op: assign_op(assign.operator)?,
                target: self.lower_assignment_target(&assign.left)?,
                value: self.lower_box(&assign.right)?,
            },
            Expression::UpdateExpression(update) => ir::Expr::Update {
                increment: matches!(update.operator, UpdateOperator::Increment),
                prefix: update.prefix,
                target: self.lower_simple_target(&update.argument)?,
            },
            Expression::StaticMemberExpression(member) => self.lower_static_member(member)?,
            Expression::ComputedMemberExpression(member) => self.lower_computed_member(member)?,
            Expression::CallExpression(call) => self.lower_call(call)?,
            Expression::ChainExpression(chain) => ir::Expr::Chain(Box::new(match &chain.expression {
                ChainElement::CallExpression(call) => self.lower_call(call)?,
                ChainElement::StaticMemberExpression(member) => self.lower_static_member(member)?,
                ChainElement::ComputedMemberExpression(member) => self.lower_computed_member(member)?,
                ChainElement::TSNonNullExpression(e) => self.lower_expr(&e.expression)?,
                _ => return Err(unsupported("private fields")),
            })),
            Expression::SequenceExpression(seq) => ir::Expr::Sequence(
                seq.expressions
                    .iter()
                    .map(|e| self.lower_expr(e))
                    .collect::<Result<Vec<_>>>()?,
            ),
            Expression::ParenthesizedExpression(paren) => self.lower_expr(&paren.expression)?,
            Expression::TSAsExpression(e) => self.lower_expr(&e.expression)?,
            Expression::TSSatisfiesExpression(e) => self.lower_expr(&e.expression)?,
            Expression::TSNonNullExpression(e) => self.lower_expr(&e.expression)?,
            Expression::TSTypeAssertion(e) => self.lower_expr(&e.expression)?,
            Expression::JSXElement(_) | Expression::JSXFragment(_) => {
                return Err(unsupported("untranspiled JSX"))
            }
            Expression::ThisExpression(_) => return Err(unsupported("`this`")),
            Expression::NewExpression(new) => ir::Expr::New {
                callee: self.lower_box(&new.callee)?,
                args: self.lower_arguments(&new.arguments)?,
            },
            Expression::AwaitExpression(expr) => ir::Expr::Await(self.lower_box(&expr.argument)?),
            Expression::YieldExpression(_) => return Err(unsupported("`yield`")),
            Expression::ClassExpression(_) => return Err(unsupported("classes")),
            Expression::RegExpLiteral(_) => return Err(unsupported("regular expressions")),
            Expression::BigIntLiteral(_) => return Err(unsupported("BigInt literals")),
            Expression::TaggedTemplateExpression(_) => return Err(unsupported("tagged templates")),
            Expression::ImportExpression(_) => return Err(unsupported("dynamic import")),
            _ => return Err(unsupported("expression")),
        })
    }

    fn lower_static_member(&mut self, member: &StaticMemberExpression<'_>) -> Result<ir::Expr> {
        Ok(ir::Expr::Member {
            object: self.lower_box(&member.object)?,
            property: ir::PropertyKey::Static(member.property.name.to_string()),
            optional: member.optional,
        })
    }

    fn lower_computed_member(&mut self, member: &ComputedMemberExpression<'_>) -> Result<ir::Expr> {
        Ok(ir::Expr::Member {
            object: self.lower_box(&member.object)?,
            property: ir::PropertyKey::Computed(self.lower_box(&member.expression)?),
            optional: member.optional,
        })
    }

    fn lower_arguments(&mut self, arguments: &[Argument<'_>]) -> Result<Vec<ir::ArrayItem>> {
        let mut args = Vec::with_capacity(arguments.len());
        for arg in arguments {
            args.push(match arg {
                Argument::SpreadElement(spread) => ir::ArrayItem::Spread(self.lower_expr(&spread.argument)?),
                other => match other.as_expression() {
                    Some(expr) => ir::ArrayItem::Expr(self.lower_expr(expr)?),
                    None => return Err(unsupported("call argument")),
                },
            });
        }
        Ok(args)
    }

    fn lower_call(&mut self, call: &CallExpression<'_>) -> Result<ir::Expr> {
        Ok(ir::Expr::Call {
            callee: self.lower_box(&call.callee)?,
            args: self.lower_arguments(&call.arguments)?,
            optional: call.optional,
        })
    }

    fn lower_assignment_target(&mut self, target: &AssignmentTarget<'_>) -> Result<ir::Target> {
        match target {
            AssignmentTarget::AssignmentTargetIdentifier(id) => Ok(self.target_ident(&id.name)),
            AssignmentTarget::StaticMemberExpression(member) => Ok(ir::Target::Member {
                object: self.lower_box(&member.object)?,
                property: ir::PropertyKey::Static(member.property.name.to_string()),
            }),
            AssignmentTarget::ComputedMemberExpression(member) => Ok(ir::Target::Member {
                object: self.lower_box(&member.object)?,
                property: ir::PropertyKey::Computed(self.lower_box(&member.expression)?),
            }),
            _ => Err(unsupported("destructuring assignment")),
        }
    }

    fn lower_simple_target(&mut self, target: &SimpleAssignmentTarget<'_>) -> Result<ir::Target> {
        match target {
            SimpleAssignmentTarget::AssignmentTargetIdentifier(id) => Ok(self.target_ident(&id.name)),
            SimpleAssignmentTarget::StaticMemberExpression(member) => Ok(ir::Target::Member {
                object: self.lower_box(&member.object)?,
                property: ir::PropertyKey::Static(member.property.name.to_string()),
            }),
            SimpleAssignmentTarget::ComputedMemberExpression(member) => Ok(ir::Target::Member {
                object: self.lower_box(&member.object)?,
                property: ir::PropertyKey::Computed(self.lower_box(&member.expression)?),
            }),
            _ => Err(unsupported("update target")),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DECLARATION SCANNING
// ═══════════════════════════════════════════════════════════════════════════════

pub fn collect_binding_names(pattern: &BindingPattern<'_>, out: &mut Vec<String>) {
    match pattern {
        BindingPattern::BindingIdentifier(id) => out.push(id.name.to_string()),
        BindingPattern::ObjectPattern(obj) => {
            for prop in &obj.properties {
                collect_binding_names(&prop.value, out);
            }
            if let Some(rest) = &obj.rest {
                collect_binding_names(&rest.argument, out);
            }
        }
        BindingPattern::ArrayPattern(arr) => {
            for element in arr.elements.iter().flatten() {
                collect_binding_names(element, out);
            }
            if let Some(rest) = &arr.rest {
                collect_binding_names(&rest.argument, out);
            }
        }
        BindingPattern::AssignmentPattern(assign) => collect_binding_names(&assign.left, out),
    }
}

/// `let`/`const` declarations and function declarations directly in `statements`.
fn lexical_declarations(statements: &[Statement<'_>]) -> (Vec<ir::LexicalName>, HashSet<String>) {
    let mut lexical = Vec::new();
    let mut names = HashSet::new();
    for stmt in statements {
        match stmt {
            Statement::VariableDeclaration(decl) if !matches!(decl.kind, VariableDeclarationKind::Var) => {
                let mutable = matches!(decl.kind, VariableDeclarationKind::Let);
                for declarator in &decl.declarations {
                    let mut found = Vec::new();
                    collect_binding_names(&declarator.id, &mut found);
                    for name in found {
                        names.insert(name.clone());
                        lexical.push(ir::LexicalName { name, mutable });
                    }
                }
            }
            Statement::FunctionDeclaration(func) => {
                if let Some(id) = &func.id {
                    names.insert(id.name.to_string());
                }
            }
            _ => {}
        }
    }
    (lexical, names)
}

/// `var` names of a function body, not descending into nested functions.
fn collect_var_names(statements: &[Statement<'_>], out: &mut Vec<String>) {
    for stmt in statements {
        collect_var_names_in(stmt, out);
    }
}

fn collect_var_declaration(decl: &VariableDeclaration<'_>, out: &mut Vec<String>) {
    if matches!(decl.kind, VariableDeclarationKind::Var) {
        for declarator in &decl.declarations {
            collect_binding_names(&declarator.id, out);
        }
    }
}

fn collect_var_names_in(stmt: &Statement<'_>, out: &mut Vec<String>) {
    match stmt {
        Statement::VariableDeclaration(decl) => collect_var_declaration(decl, out),
        Statement::BlockStatement(block) => collect_var_names(&block.body, out),
        Statement::IfStatement(stmt) => {
            collect_var_names_in(&stmt.consequent, out);
            if let Some(alt) = &stmt.alternate {
                collect_var_names_in(alt, out);
            }
        }
        Statement::ForStatement(stmt) => {
            if let Some(ForStatementInit::VariableDeclaration(decl)) = &stmt.init {
                collect_var_declaration(decl, out);
            }
            collect_var_names_in(&stmt.body, out);
        }
        Statement::ForOfStatement(stmt) => {
            if let ForStatementLeft::VariableDeclaration(decl) = &stmt.left {
                collect_var_declaration(decl, out);
            }
            collect_var_names_in(&stmt.body, out);
        }
        Statement::ForInStatement(stmt) => {
            if let ForStatementLeft::VariableDeclaration(decl) = &stmt.left {
                collect_var_declaration(decl, out);
            }
            collect_var_names_in(&stmt.body, out);
        }
        Statement::WhileStatement(stmt) => collect_var_names_in(&stmt.body, out),
        Statement::DoWhileStatement(stmt) => collect_var_names_in(&stmt.body, out),
        Statement::SwitchStatement(stmt) => {
            for case in &stmt.cases {
                collect_var_names(&case.consequent, out);
            }
        }
        Statement::TryStatement(stmt) => {
            collect_var_names(&stmt.block.body, out);
            if let Some(handler) = &stmt.handler {
                collect_var_names(&handler.body.body, out);
            }
            if let Some(finalizer) = &stmt.finalizer {
                collect_var_names(&finalizer.body, out);
            }
        }
        _ => {}
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATORS
// ═══════════════════════════════════════════════════════════════════════════════

fn decl_kind(kind: VariableDeclarationKind) -> Result<ir::DeclKind> {
    match kind {
        VariableDeclarationKind::Var => Ok(ir::DeclKind::Var),
        VariableDeclarationKind::Let => Ok(ir::DeclKind::Let),
        VariableDeclarationKind::Const => Ok(ir::DeclKind::Const),
        _ => Err(unsupported("`using` declarations")),
    }
}

fn unary_op(op: UnaryOperator) -> Result<ir::UnaryOp> {
    Ok(match op {
        UnaryOperator::LogicalNot => ir::UnaryOp::Not,
        UnaryOperator::UnaryNegation => ir::UnaryOp::Minus,
        UnaryOperator::UnaryPlus => ir::UnaryOp::Plus,
        UnaryOperator::BitwiseNot => ir::UnaryOp::BitNot,
        UnaryOperator::Typeof => ir::UnaryOp::TypeOf,
        UnaryOperator::Void => ir::UnaryOp::Void,
        UnaryOperator::Delete => return Err(unsupported("`delete`")),
    })
}

fn binary_op(op: BinaryOperator) -> Result<ir::BinaryOp> {
    Ok(match op {
        BinaryOperator::Addition => ir::BinaryOp::Add,
        BinaryOperator::Subtraction => ir::BinaryOp::Sub,
        BinaryOperator::Multiplication => ir::BinaryOp::Mul,
        BinaryOperator::Division => ir::BinaryOp::Div,
        BinaryOperator::Remainder => ir::BinaryOp::Rem,
        BinaryOperator::Exponential => ir::BinaryOp::Exp,
        BinaryOperator::Equality => ir::BinaryOp::Eq,
        BinaryOperator::Inequality => ir::BinaryOp::NotEq,
        BinaryOperator::StrictEquality => ir::BinaryOp::StrictEq,
        BinaryOperator::StrictInequality => ir::BinaryOp::StrictNotEq,
        BinaryOperator::LessThan => ir::BinaryOp::Lt,
        BinaryOperator::LessEqualThan => ir::BinaryOp::LtEq,
        BinaryOperator::GreaterThan => ir::BinaryOp::Gt,
        BinaryOperator::GreaterEqualThan => ir::BinaryOp::GtEq,
        BinaryOperator::In => ir::BinaryOp::In,
        BinaryOperator::BitwiseAnd => ir::BinaryOp::BitAnd,
        BinaryOperator::BitwiseOR => ir::BinaryOp::BitOr,
        BinaryOperator::BitwiseXOR => ir::BinaryOp::BitXor,
        BinaryOperator::ShiftLeft => ir::BinaryOp::Shl,
        BinaryOperator::ShiftRight => ir::BinaryOp::Shr,
        BinaryOperator::ShiftRightZeroFill => ir::BinaryOp::UShr,
        BinaryOperator::Instanceof => return Err(unsupported("`instanceof`")),
    })
}

fn logical_op(op: LogicalOperator) -> ir::LogicalOp {
    match op {
        LogicalOperator::And => ir::LogicalOp::And,
        LogicalOperator::Or => ir::LogicalOp::Or,
        LogicalOperator::Coalesce => ir::LogicalOp::Coalesce,
    }
}

fn assign_op(op: AssignmentOperator) -> Result<ir::AssignOp> {
    use ir::{AssignOp, BinaryOp};
    Ok(match op {
        AssignmentOperator::Assign => AssignOp::Assign,
        AssignmentOperator::Addition => AssignOp::Binary(BinaryOp::Add),
        AssignmentOperator::Subtraction => AssignOp::Binary(BinaryOp::Sub),
        AssignmentOperator::Multiplication => AssignOp::Binary(BinaryOp::Mul),
        AssignmentOperator::Division => AssignOp::Binary(BinaryOp::Div),
        AssignmentOperator::Remainder => AssignOp::Binary(BinaryOp::Rem),
        AssignmentOperator::Exponential => AssignOp::Binary(BinaryOp::Exp),
        AssignmentOperator::ShiftLeft => AssignOp::Binary(BinaryOp::Shl),
        AssignmentOperator::ShiftRight => AssignOp::Binary(BinaryOp::Shr),
        AssignmentOperator::ShiftRightZeroFill => AssignOp::Binary(BinaryOp::UShr),
        AssignmentOperator::BitwiseOR => AssignOp::Binary(BinaryOp::BitOr),
        AssignmentOperator::BitwiseXOR => AssignOp::Binary(BinaryOp::BitXor),
        AssignmentOperator::BitwiseAnd => AssignOp::Binary(BinaryOp::BitAnd),
        AssignmentOperator::LogicalAnd => AssignOp::Logical(ir::LogicalOp::And),
        AssignmentOperator::LogicalOr => AssignOp::Logical(ir::LogicalOp::Or),
        AssignmentOperator::LogicalNullish => AssignOp::Logical(ir::LogicalOp::Coalesce),
    })
}
