//! Tree-walking evaluator for the lowered IR.
//!
//! Every interpreter step is metered against [`Limits::max_steps`], every
//! call against [`Limits::max_call_depth`] and every level of evaluator
//! recursion against [`Limits::max_nesting_depth`]. Strings and arrays are
//! length-checked before they are built, and building them costs steps in
//! proportion to their size. Budget errors are never catchable from inside
//! the sandbox.
//!
//! The depth limits assume the machine runs on a thread with
//! [`SANDBOX_STACK_SIZE`](super::stack::SANDBOX_STACK_SIZE) of stack.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;

use super::builtins;
use super::ir::{
    ArrayItem, AssignOp, BinaryOp, Block, DeclKind, Expr, FunctionBody, FunctionDef, LexicalName,
    LogicalOp, ObjectItem, Pattern, PropertyKey, Stmt, Target, UnaryOp,
};
use super::value::{format_number, Function, Object, Value};

/// Elements or bytes of allocation that cost one step.
const WORK_UNITS_PER_STEP: u64 = 32;

// ═══════════════════════════════════════════════════════════════════════════════
// ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("TypeError: {0}")]
    Type(String),

    #[error("ReferenceError: {0}")]
    Reference(String),

    #[error("RangeError: {0}")]
    Range(String),

    #[error("uncaught {}", describe_thrown(.0))]
    Thrown(Value),

    #[error("step budget of {0} exceeded")]
    StepBudgetExceeded(u64),

    #[error("call depth limit of {0} exceeded")]
    CallDepthExceeded(usize),

    #[error("nesting depth limit of {0} exceeded")]
    NestingTooDeep(usize),
}

impl RuntimeError {
    pub fn type_error(message: impl Into<String>) -> Self {
        RuntimeError::Type(message.into())
    }

    /// Budget violations propagate through `try`/`catch`.
    pub(crate) fn is_catchable(&self) -> bool {
        !matches!(
            self,
            RuntimeError::StepBudgetExceeded(_)
                | RuntimeError::CallDepthExceeded(_)
                | RuntimeError::NestingTooDeep(_)
        )
    }

    fn into_thrown_value(self) -> Value {
        let (name, message) = match self {
            RuntimeError::Thrown(value) => return value,
            RuntimeError::Type(message) => ("TypeError", message),
            RuntimeError::Reference(message) => ("ReferenceError", message),
            RuntimeError::Range(message) => ("RangeError", message),
            other => ("Error", other.to_string()),
        };
        let mut obj = Object::new();
        obj.set("name", Value::string(name));
        obj.set("message", Value::string(message));
        Value::object(obj)
    }
}

fn describe_thrown(value: &Value) -> String {
    if let Value::Object(obj) = value {
        let obj = obj.borrow();
        if let Some(message) = obj.get("message") {
            let name = obj
                .get("name")
                .map(Value::to_js_string)
                .unwrap_or_else(|| "Error".to_string());
            return format!("{}: {}", name, message.to_js_string());
        }
    }
    value.to_js_string()
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCOPES
// ═══════════════════════════════════════════════════════════════════════════════

struct Binding {
    /// `None` while in the temporal dead zone.
    value: Option<Value>,
    mutable: bool,
}

pub struct Scope {
    bindings: RefCell<HashMap<String, Binding>>,
    parent: Option<Rc<Scope>>,
}

impl Scope {
    pub fn root() -> Rc<Scope> {
        Rc::new(Scope {
            bindings: RefCell::new(HashMap::new()),
            parent: None,
        })
    }

    pub fn child(parent: &Rc<Scope>) -> Rc<Scope> {
        Rc::new(Scope {
            bindings: RefCell::new(HashMap::new()),
            parent: Some(Rc::clone(parent)),
        })
    }

    /// Creates an uninitialized binding unless one already exists here.
    pub fn declare(&self, name: &str, mutable: bool) {
        self.bindings
            .borrow_mut()
            .entry(name.to_string())
            .or_insert(Binding {
                value: None,
                mutable,
            });
    }

    pub fn define(&self, name: &str, value: Value, mutable: bool) {
        self.bindings.borrow_mut().insert(
            name.to_string(),
            Binding {
                value: Some(value),
                mutable,
            },
        );
    }

    /// Initializes a binding of this scope, keeping its declared mutability.
    pub fn initialize(&self, name: &str, value: Value) {
        let mut bindings = self.bindings.borrow_mut();
        match bindings.get_mut(name) {
            Some(binding) => binding.value = Some(value),
            None => {
                bindings.insert(
                    name.to_string(),
                    Binding {
                        value: Some(value),
                        mutable: true,
                    },
                );
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Result<Value, RuntimeError> {
        let mut current = Some(self);
        while let Some(scope) = current {
            if let Some(binding) = scope.bindings.borrow().get(name) {
                return binding.value.clone().ok_or_else(|| {
                    RuntimeError::Reference(format!(
                        "cannot access `{}` before initialization",
                        name
                    ))
                });
            }
            current = scope.parent.as_deref();
        }
        Err(RuntimeError::Reference(format!("{} is not defined", name)))
    }

    pub fn assign(&self, name: &str, value: Value) -> Result<(), RuntimeError> {
        let mut current = Some(self);
        while let Some(scope) = current {
            if let Some(binding) = scope.bindings.borrow_mut().get_mut(name) {
                if binding.value.is_none() {
                    return Err(RuntimeError::Reference(format!(
                        "cannot access `{}` before initialization",
                        name
                    )));
                }
                if !binding.mutable {
                    return Err(RuntimeError::type_error(format!(
                        "assignment to constant variable `{}`",
                        name
                    )));
                }
                binding.value = Some(value);
                return Ok(());
            }
            current = scope.parent.as_deref();
        }
        Err(RuntimeError::Reference(format!("{} is not defined", name)))
    }

    /// A sibling scope holding copies of this scope's bindings. `for (let …)`
    /// moves to a fork between iterations so closures keep their own copy.
    fn fork(&self) -> Rc<Scope> {
        let bindings = self
            .bindings
            .borrow()
            .iter()
            .map(|(name, binding)| {
                let copy = Binding {
                    value: binding.value.clone(),
                    mutable: binding.mutable,
                };
                (name.clone(), copy)
            })
            .collect();
        Rc::new(Scope {
            bindings: RefCell::new(bindings),
            parent: self.parent.clone(),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MACHINE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub max_steps: u64,
    pub max_call_depth: usize,
    /// Statements, expressions and rendered children nested inside one another.
    pub max_nesting_depth: usize,
    /// Longest string sandboxed code may build, in UTF-8 bytes.
    pub max_string_length: usize,
    pub max_array_length: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_steps: 1_000_000,
            max_call_depth: 256,
            max_nesting_depth: 4096,
            max_string_length: 1 << 20,
            max_array_length: 100_000,
        }
    }
}

enum Completion {
    Normal,
    Return(Value),
    Break,
    Continue,
}

#[derive(Clone, Copy)]
enum BindMode {
    /// `let`/`const` declaration of a name hoisted into the current scope.
    Initialize,
    /// `var` declaration or assignment to an existing binding.
    Assign,
    /// Fresh binding (parameters, loop heads, catch clauses).
    Define { mutable: bool },
}

enum Callee {
    Value(Value),
    Method { receiver: Value, key: String },
}

pub struct Machine {
    limits: Limits,
    steps: u64,
    /// Allocation and scanning work, charged against the step budget.
    work: u64,
    depth: usize,
    nesting: usize,
}

impl Machine {
    pub fn new(limits: Limits) -> Self {
        Self {
            limits,
            steps: 0,
            work: 0,
            depth: 0,
            nesting: 0,
        }
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Steps used so far, including charged work.
    pub fn steps(&self) -> u64 {
        self.steps.saturating_add(self.work / WORK_UNITS_PER_STEP)
    }

    fn check_budget(&self) -> Result<(), RuntimeError> {
        if self.steps() > self.limits.max_steps {
            return Err(RuntimeError::StepBudgetExceeded(self.limits.max_steps));
        }
        Ok(())
    }

    pub fn tick(&mut self) -> Result<(), RuntimeError> {
        self.steps += 1;
        self.check_budget()
    }

    /// Meters work proportional to `units` elements or bytes.
    pub fn charge(&mut self, units: usize) -> Result<(), RuntimeError> {
        self.work = self.work.saturating_add(units as u64);
        self.check_budget()
    }

    /// Runs `f` one level deeper in the evaluator.
    pub fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, RuntimeError>,
    ) -> Result<T, RuntimeError> {
        if self.nesting >= self.limits.max_nesting_depth {
            return Err(RuntimeError::NestingTooDeep(self.limits.max_nesting_depth));
        }
        self.nesting += 1;
        let result = f(self);
        self.nesting -= 1;
        result
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ALLOCATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Admits growing a string of `current` bytes by `additional` bytes.
    pub fn grow_string(&mut self, current: usize, additional: usize) -> Result<(), RuntimeError> {
        match current.checked_add(additional) {
            Some(len) if len <= self.limits.max_string_length => self.charge(additional),
            _ => Err(RuntimeError::Range(format!(
                "invalid string length: strings are limited to {} bytes",
                self.limits.max_string_length
            ))),
        }
    }

    pub fn reserve_string(&mut self, len: usize) -> Result<(), RuntimeError> {
        self.grow_string(0, len)
    }

    /// Admits growing an array of `current` elements by `additional` elements.
    pub fn grow_array(&mut self, current: usize, additional: usize) -> Result<(), RuntimeError> {
        match current.checked_add(additional) {
            Some(len) if len <= self.limits.max_array_length => self.charge(additional),
            _ => Err(RuntimeError::Range(format!(
                "invalid array length: arrays are limited to {} elements",
                self.limits.max_array_length
            ))),
        }
    }

    pub fn reserve_array(&mut self, len: usize) -> Result<(), RuntimeError> {
        self.grow_array(0, len)
    }

    /// `String(value)`, length-checked and charged.
    pub fn stringify(&mut self, value: &Value) -> Result<String, RuntimeError> {
        let text = match value {
            Value::String(s) => {
                self.charge(s.len())?;
                return Ok(s.to_string());
            }
            Value::Array(_) => value
                .to_js_string_within(self.limits.max_string_length)
                .ok_or_else(|| {
                    RuntimeError::Range(format!(
                        "invalid string length: array joins past {} bytes or nests too deeply",
                        self.limits.max_string_length
                    ))
                })?,
            other => other.to_js_string(),
        };
        self.charge(text.len())?;
        Ok(text)
    }

    /// Arrays become their joined string; every other value is already as
    /// primitive as operators need it.
    pub fn to_primitive(&mut self, value: Value) -> Result<Value, RuntimeError> {
        match value {
            Value::Array(_) => Ok(Value::string(self.stringify(&value)?)),
            other => Ok(other),
        }
    }

    /// Property read that pays for scanning string receivers.
    fn read_property(&mut self, object: &Value, key: &str) -> Result<Value, RuntimeError> {
        if let Value::String(s) = object {
            self.charge(s.len())?;
        }
        builtins::get_property(object, key)
    }

    fn iterate(&mut self, value: &Value) -> Result<Vec<Value>, RuntimeError> {
        let items = builtins::iterate(value)?;
        self.charge(items.len())?;
        Ok(items)
    }

    fn own_keys(&mut self, value: &Value) -> Result<Vec<String>, RuntimeError> {
        let keys = builtins::own_keys(value);
        self.charge(keys.len())?;
        Ok(keys)
    }

    /// Wraps a function definition into a closure over `env`.
    pub fn instantiate(def: &Rc<FunctionDef>, env: &Rc<Scope>) -> Value {
        Value::Function(Rc::new(Function::Closure {
            def: Rc::clone(def),
            env: Rc::clone(env),
        }))
    }

    pub fn call(&mut self, callee: &Value, args: &[Value]) -> Result<Value, RuntimeError> {
        let Value::Function(func) = callee else {
            return Err(RuntimeError::type_error(format!(
                "{} is not a function",
                callee.to_js_string()
            )));
        };

        self.tick()?;
        self.depth += 1;
        if self.depth > self.limits.max_call_depth {
            self.depth -= 1;
            return Err(RuntimeError::CallDepthExceeded(self.limits.max_call_depth));
        }

        let result = match func.as_ref() {
            Function::Native { func, .. } => func(self, args),
            Function::Closure { def, env } => self.call_closure(callee, def, env, args),
        };

        self.depth -= 1;
        result
    }

    fn call_closure(
        &mut self,
        callee: &Value,
        def: &Rc<FunctionDef>,
        env: &Rc<Scope>,
        args: &[Value],
    ) -> Result<Value, RuntimeError> {
        let scope = if def.self_binding {
            let outer = Scope::child(env);
            if let Some(name) = &def.name {
                outer.define(name, callee.clone(), false);
            }
            Scope::child(&outer)
        } else {
            Scope::child(env)
        };

        for (i, param) in def.params.iter().enumerate() {
            let arg = args.get(i).cloned().unwrap_or(Value::Undefined);
            self.bind(param, arg, &scope, BindMode::Define { mutable: true })?;
        }
        if let Some(rest) = &def.rest {
            let tail = args.get(def.params.len()..).unwrap_or(&[]).to_vec();
            self.bind(rest, Value::array(tail), &scope, BindMode::Define { mutable: true })?;
        }
        for name in &def.var_names {
            if !scope.bindings.borrow().contains_key(name) {
                scope.define(name, Value::Undefined, true);
            }
        }

        match &def.body {
            FunctionBody::Expression(expr) => self.eval(expr, &scope),
            FunctionBody::Block(block) => match self.exec_block(block, &scope)? {
                Completion::Return(value) => Ok(value),
                _ => Ok(Value::Undefined),
            },
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STATEMENTS
    // ═══════════════════════════════════════════════════════════════════════════

    fn hoist(&mut self, lexical: &[LexicalName], stmts: &[Stmt], scope: &Rc<Scope>) {
        for name in lexical {
            scope.declare(&name.name, name.mutable);
        }
        for stmt in stmts {
            if let Stmt::Function(def) = stmt {
                if let Some(name) = &def.name {
                    scope.define(name, Machine::instantiate(def, scope), true);
                }
            }
        }
    }

    fn exec_block(&mut self, block: &Block, scope: &Rc<Scope>) -> Result<Completion, RuntimeError> {
        self.hoist(&block.lexical, &block.stmts, scope);
        self.exec_list(&block.stmts, scope)
    }

    fn exec_list(&mut self, stmts: &[Stmt], scope: &Rc<Scope>) -> Result<Completion, RuntimeError> {
        for stmt in stmts {
            match self.exec(stmt, scope)? {
                Completion::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Completion::Normal)
    }

    fn exec(&mut self, stmt: &Stmt, scope: &Rc<Scope>) -> Result<Completion, RuntimeError> {
        self.nested(|m| m.exec_stmt(stmt, scope))
    }

    fn exec_stmt(&mut self, stmt: &Stmt, scope: &Rc<Scope>) -> Result<Completion, RuntimeError> {
        self.tick()?;
        match stmt {
            Stmt::Declare { kind, declarations } => {
                for (pattern, init) in declarations {
                    let value = match init {
                        Some(expr) => self.eval(expr, scope)?,
                        // `var x;` leaves an existing value alone.
                        None if *kind == DeclKind::Var => continue,
                        None => Value::Undefined,
                    };
                    let mode = match kind {
                        DeclKind::Var => BindMode::Assign,
                        DeclKind::Let | DeclKind::Const => BindMode::Initialize,
                    };
                    self.bind(pattern, value, scope, mode)?;
                }
                Ok(Completion::Normal)
            }
            Stmt::Function(_) | Stmt::Empty => Ok(Completion::Normal),
            Stmt::Expr(expr) => {
                self.eval(expr, scope)?;
                Ok(Completion::Normal)
            }
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::Undefined,
                };
                Ok(Completion::Return(value))
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, scope)?.truthy() {
                    self.exec(consequent, scope)
                } else if let Some(alternate) = alternate {
                    self.exec(alternate, scope)
                } else {
                    Ok(Completion::Normal)
                }
            }
            Stmt::Block(block) => self.exec_block(block, &Scope::child(scope)),
            Stmt::ForOf {
                kind,
                pattern,
                iterable,
                body,
            } => {
                let iterable = self.eval(iterable, scope)?;
                let items = self.iterate(&iterable)?;
                self.run_for_each(items, *kind, pattern, body, scope)
            }
            Stmt::ForIn {
                kind,
                pattern,
                object,
                body,
            } => {
                let object = self.eval(object, scope)?;
                let keys = self
                    .own_keys(&object)?
                    .into_iter()
                    .map(Value::string)
                    .collect();
                self.run_for_each(keys, *kind, pattern, body, scope)
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => {
                let per_iteration = matches!(
                    init.as_deref(),
                    Some(Stmt::Declare {
                        kind: DeclKind::Let,
                        ..
                    })
                );
                let mut iteration = Scope::child(scope);
                if let Some(init) = init {
                    self.exec(init, &iteration)?;
                }
                if per_iteration {
                    iteration = iteration.fork();
                }
                loop {
                    self.tick()?;
                    if let Some(test) = test {
                        if !self.eval(test, &iteration)?.truthy() {
                            break;
                        }
                    }
                    match self.exec(body, &iteration)? {
                        Completion::Break => break,
                        Completion::Return(value) => return Ok(Completion::Return(value)),
                        Completion::Normal | Completion::Continue => {}
                    }
                    if per_iteration {
                        iteration = iteration.fork();
                    }
                    if let Some(update) = update {
                        self.eval(update, &iteration)?;
                    }
                }
                Ok(Completion::Normal)
            }
            Stmt::While { test, body } => {
                loop {
                    self.tick()?;
                    if !self.eval(test, scope)?.truthy() {
                        break;
                    }
                    match self.exec(body, scope)? {
                        Completion::Break => break,
                        Completion::Return(value) => return Ok(Completion::Return(value)),
                        Completion::Normal | Completion::Continue => {}
                    }
                }
                Ok(Completion::Normal)
            }
            Stmt::DoWhile { body, test } => {
                loop {
                    self.tick()?;
                    match self.exec(body, scope)? {
                        Completion::Break => break,
                        Completion::Return(value) => return Ok(Completion::Return(value)),
                        Completion::Normal | Completion::Continue => {}
                    }
                    if !self.eval(test, scope)?.truthy() {
                        break;
                    }
                }
                Ok(Completion::Normal)
            }
            Stmt::Switch {
                discriminant,
                lexical,
                cases,
            } => {
                let value = self.eval(discriminant, scope)?;
                let case_scope = Scope::child(scope);
                for name in lexical {
                    case_scope.declare(&name.name, name.mutable);
                }
                for case in cases {
                    self.hoist(&[], &case.body, &case_scope);
                }

                let mut start = None;
                for (i, case) in cases.iter().enumerate() {
                    if let Some(test) = &case.test {
                        if self.eval(test, &case_scope)?.strict_equals(&value) {
                            start = Some(i);
                            break;
                        }
                    }
                }
                let start = start.or_else(|| cases.iter().position(|c| c.test.is_none()));

                if let Some(start) = start {
                    for case in &cases[start..] {
                        match self.exec_list(&case.body, &case_scope)? {
                            Completion::Normal => {}
                            Completion::Break => break,
                            other => return Ok(other),
                        }
                    }
                }
                Ok(Completion::Normal)
            }
            Stmt::Try {
                block,
                handler,
                finalizer,
            } => {
                let mut outcome = self.exec_block(block, &Scope::child(scope));

                if let Some(handler) = handler {
                    outcome = match outcome {
                        Err(err) if err.is_catchable() => {
                            let catch_scope = Scope::child(scope);
                            match &handler.param {
                                Some(param) => self
                                    .bind(
                                        param,
                                        err.into_thrown_value(),
                                        &catch_scope,
                                        BindMode::Define { mutable: true },
                                    )
                                    .and_then(|_| self.exec_block(&handler.body, &catch_scope)),
                                None => self.exec_block(&handler.body, &catch_scope),
                            }
                        }
                        other => other,
                    };
                }

                if let Some(finalizer) = finalizer {
                    if matches!(&outcome, Err(err) if !err.is_catchable()) {
                        return outcome;
                    }
                    match self.exec_block(finalizer, &Scope::child(scope))? {
                        Completion::Normal => {}
                        other => return Ok(other),
                    }
                }
                outcome
            }
            Stmt::Throw(expr) => Err(RuntimeError::Thrown(self.eval(expr, scope)?)),
            Stmt::Break => Ok(Completion::Break),
            Stmt::Continue => Ok(Completion::Continue),
        }
    }

    fn run_for_each(
        &mut self,
        items: Vec<Value>,
        kind: DeclKind,
        pattern: &Pattern,
        body: &Stmt,
        scope: &Rc<Scope>,
    ) -> Result<Completion, RuntimeError> {
        for item in items {
            self.tick()?;
            let iteration = Scope::child(scope);
            let mode = match kind {
                DeclKind::Var => BindMode::Assign,
                DeclKind::Let => BindMode::Define { mutable: true },
                DeclKind::Const => BindMode::Define { mutable: false },
            };
            self.bind(pattern, item, &iteration, mode)?;
            match self.exec(body, &iteration)? {
                Completion::Break => break,
                Completion::Return(value) => return Ok(Completion::Return(value)),
                Completion::Normal | Completion::Continue => {}
            }
        }
        Ok(Completion::Normal)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PATTERNS
    // ═══════════════════════════════════════════════════════════════════════════

    fn bind(
        &mut self,
        pattern: &Pattern,
        value: Value,
        scope: &Rc<Scope>,
        mode: BindMode,
    ) -> Result<(), RuntimeError> {
        match pattern {
            Pattern::Ident(name) => match mode {
                BindMode::Initialize => {
                    scope.initialize(name, value);
                    Ok(())
                }
                BindMode::Assign => scope.assign(name, value),
                BindMode::Define { mutable } => {
                    scope.define(name, value, mutable);
                    Ok(())
                }
            },
            Pattern::Default { target, default } => {
                let value = match value {
                    Value::Undefined => self.eval(default, scope)?,
                    other => other,
                };
                self.bind(target, value, scope, mode)
            }
            Pattern::Object { properties, rest } => {
                if value.is_nullish() {
                    return Err(RuntimeError::type_error(format!(
                        "cannot destructure `{}`",
                        value.to_js_string()
                    )));
                }
                let mut used = Vec::with_capacity(properties.len());
                for (key, target) in properties {
                    let key = self.property_key(key, scope)?;
                    let item = self.read_property(&value, &key)?;
                    self.bind(target, item, scope, mode)?;
                    used.push(key);
                }
                if let Some(rest) = rest {
                    let mut remaining = Object::new();
                    for key in self.own_keys(&value)? {
                        if !used.contains(&key) {
                            let item = builtins::get_property(&value, &key)?;
                            remaining.set(key, item);
                        }
                    }
                    self.bind(rest, Value::object(remaining), scope, mode)?;
                }
                Ok(())
            }
            Pattern::Array { elements, rest } => {
                let items = self.iterate(&value)?;
                for (i, element) in elements.iter().enumerate() {
                    if let Some(target) = element {
                        let item = items.get(i).cloned().unwrap_or(Value::Undefined);
                        self.bind(target, item, scope, mode)?;
                    }
                }
                if let Some(rest) = rest {
                    let tail = items.into_iter().skip(elements.len()).collect();
                    self.bind(rest, Value::array(tail), scope, mode)?;
                }
                Ok(())
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EXPRESSIONS
    // ═══════════════════════════════════════════════════════════════════════════

    fn property_key(&mut self, key: &PropertyKey, scope: &Rc<Scope>) -> Result<String, RuntimeError> {
        match key {
            PropertyKey::Static(name) => Ok(name.clone()),
            PropertyKey::Computed(expr) => {
                let key = self.eval(expr, scope)?;
                Ok(to_property_key(&self.to_primitive(key)?))
            }
        }
    }

    fn eval_items(&mut self, items: &[ArrayItem], scope: &Rc<Scope>) -> Result<Vec<Value>, RuntimeError> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item {
                ArrayItem::Expr(expr) => out.push(self.eval(expr, scope)?),
                ArrayItem::Spread(expr) => {
                    let value = self.eval(expr, scope)?;
                    let spread = self.iterate(&value)?;
                    self.grow_array(out.len(), spread.len())?;
                    out.extend(spread);
                }
                ArrayItem::Hole => out.push(Value::Undefined),
            }
        }
        Ok(out)
    }

    pub(super) fn eval(&mut self, expr: &Expr, scope: &Rc<Scope>) -> Result<Value, RuntimeError> {
        self.nested(|m| m.eval_expr(expr, scope))
    }

    fn eval_expr(&mut self, expr: &Expr, scope: &Rc<Scope>) -> Result<Value, RuntimeError> {
        match expr {
            Expr::Undefined => Ok(Value::Undefined),
            Expr::Null => Ok(Value::Null),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::String(s) => Ok(Value::String(Rc::clone(s))),
            Expr::Template { quasis, exprs } => {
                let mut out = String::new();
                for (i, quasi) in quasis.iter().enumerate() {
                    out.push_str(quasi);
                    if let Some(expr) = exprs.get(i) {
                        let value = self.eval(expr, scope)?;
                        let text = self.stringify(&value)?;
                        self.grow_string(out.len(), text.len())?;
                        out.push_str(&text);
                    }
                }
                Ok(Value::string(out))
            }
            Expr::Ident(name) => scope.lookup(name),
            Expr::Array(items) => Ok(Value::array(self.eval_items(items, scope)?)),
            Expr::Object(items) => {
                let mut obj = Object::new();
                for item in items {
                    match item {
                        ObjectItem::Property(key, value) => {
                            let key = self.property_key(key, scope)?;
                            let value = self.eval(value, scope)?;
                            obj.set(key, value);
                        }
                        ObjectItem::Spread(expr) => {
                            let source = self.eval(expr, scope)?;
                            for key in self.own_keys(&source)? {
                                let value = builtins::get_property(&source, &key)?;
                                obj.set(key, value);
                            }
                        }
                    }
                }
                Ok(Value::object(obj))
            }
            Expr::Function(def) => Ok(Machine::instantiate(def, scope)),
            Expr::Unary { op, arg } => {
                let value = self.eval(arg, scope)?;
                let value = match op {
                    UnaryOp::Minus | UnaryOp::Plus | UnaryOp::BitNot => self.to_primitive(value)?,
                    _ => value,
                };
                Ok(match op {
                    UnaryOp::Not => Value::Bool(!value.truthy()),
                    UnaryOp::Minus => Value::Number(-value.to_number()),
                    UnaryOp::Plus => Value::Number(value.to_number()),
                    UnaryOp::BitNot => Value::Number(f64::from(!to_int32(value.to_number()))),
                    UnaryOp::TypeOf => Value::string(value.type_of()),
                    UnaryOp::Void => Value::Undefined,
                })
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                self.apply_binary(*op, left, right)
            }
            Expr::Logical { op, left, right } => {
                let left = self.eval(left, scope)?;
                if short_circuits(*op, &left) {
                    Ok(left)
                } else {
                    self.eval(right, scope)
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => {
                if self.eval(test, scope)?.truthy() {
                    self.eval(consequent, scope)
                } else {
                    self.eval(alternate, scope)
                }
            }
            Expr::Assign { op, target, value } => self.eval_assign(*op, target, value, scope),
            Expr::Update {
                increment,
                prefix,
                target,
            } => {
                let (current, place) = self.read_target(target, scope)?;
                let old = self.to_primitive(current)?.to_number();
                let new = if *increment { old + 1.0 } else { old - 1.0 };
                self.write_target(&place, Value::Number(new), scope)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            Expr::Member { .. } | Expr::Call { .. } => {
                Ok(self.eval_chain(expr, scope)?.unwrap_or(Value::Undefined))
            }
            Expr::Chain(inner) => Ok(self.eval_chain(inner, scope)?.unwrap_or(Value::Undefined)),
            Expr::New { callee, args } => {
                let constructor = self.eval(callee, scope)?;
                let args = self.eval_items(args, scope)?;
                match &constructor {
                    Value::Function(func) if matches!(func.as_ref(), Function::Native { .. }) => {
                        self.call(&constructor, &args)
                    }
                    Value::Function(func) => Err(RuntimeError::type_error(format!(
                        "`{}` is not a constructor; only host-provided constructors support `new`",
                        func.name()
                    ))),
                    other => Err(RuntimeError::type_error(format!(
                        "{} is not a constructor",
                        other.to_js_string()
                    ))),
                }
            }
            Expr::Await(inner) => self.eval(inner, scope),
            Expr::Sequence(exprs) => {
                let mut last = Value::Undefined;
                for expr in exprs {
                    last = self.eval(expr, scope)?;
                }
                Ok(last)
            }
        }
    }

    /// Evaluates a member/call chain. `None` means an optional link short-circuited.
    fn eval_chain(&mut self, expr: &Expr, scope: &Rc<Scope>) -> Result<Option<Value>, RuntimeError> {
        match expr {
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let Some(object) = self.eval_chain(object, scope)? else {
                    return Ok(None);
                };
                if *optional && object.is_nullish() {
                    return Ok(None);
                }
                let key = self.property_key(property, scope)?;
                self.read_property(&object, &key).map(Some)
            }
            Expr::Call {
                callee,
                args,
                optional,
            } => {
                let callee = match callee.as_ref() {
                    Expr::Member {
                        object,
                        property,
                        optional: member_optional,
                    } => {
                        let Some(receiver) = self.eval_chain(object, scope)? else {
                            return Ok(None);
                        };
                        if *member_optional && receiver.is_nullish() {
                            return Ok(None);
                        }
                        let key = self.property_key(property, scope)?;
                        if builtins::has_intrinsic_methods(&receiver) {
                            Callee::Method { receiver, key }
                        } else {
                            Callee::Value(self.read_property(&receiver, &key)?)
                        }
                    }
                    other => match self.eval_chain(other, scope)? {
                        Some(value) => Callee::Value(value),
                        None => return Ok(None),
                    },
                };

                if *optional {
                    if let Callee::Value(value) = &callee {
                        if value.is_nullish() {
                            return Ok(None);
                        }
                    }
                }

                let args = self.eval_items(args, scope)?;
                let result = match callee {
                    Callee::Value(func) => self.call(&func, &args)?,
                    Callee::Method { receiver, key } => {
                        builtins::call_method(self, &receiver, &key, &args)?
                    }
                };
                Ok(Some(result))
            }
            Expr::Chain(inner) => self.eval_chain(inner, scope),
            other => self.eval(other, scope).map(Some),
        }
    }

    fn eval_assign(
        &mut self,
        op: AssignOp,
        target: &Target,
        value: &Expr,
        scope: &Rc<Scope>,
    ) -> Result<Value, RuntimeError> {
        match op {
            AssignOp::Assign => {
                let place = self.resolve_target(target, scope)?;
                let value = self.eval(value, scope)?;
                self.write_target(&place, value.clone(), scope)?;
                Ok(value)
            }
            AssignOp::Binary(op) => {
                let (current, place) = self.read_target(target, scope)?;
                let rhs = self.eval(value, scope)?;
                let value = self.apply_binary(op, current, rhs)?;
                self.write_target(&place, value.clone(), scope)?;
                Ok(value)
            }
            AssignOp::Logical(op) => {
                let (current, place) = self.read_target(target, scope)?;
                if short_circuits(op, &current) {
                    return Ok(current);
                }
                let value = self.eval(value, scope)?;
                self.write_target(&place, value.clone(), scope)?;
                Ok(value)
            }
        }
    }

    fn resolve_target(&mut self, target: &Target, scope: &Rc<Scope>) -> Result<Place, RuntimeError> {
        match target {
            Target::Ident(name) => Ok(Place::Binding(name.clone())),
            Target::Member { object, property } => {
                let object = self.eval(object, scope)?;
                let key = self.property_key(property, scope)?;
                Ok(Place::Property(object, key))
            }
        }
    }

    fn read_target(
        &mut self,
        target: &Target,
        scope: &Rc<Scope>,
    ) -> Result<(Value, Place), RuntimeError> {
        let place = self.resolve_target(target, scope)?;
        let current = match &place {
            Place::Binding(name) => scope.lookup(name)?,
            Place::Property(object, key) => self.read_property(object, key)?,
        };
        Ok((current, place))
    }

    fn write_target(&mut self, place: &Place, value: Value, scope: &Rc<Scope>) -> Result<(), RuntimeError> {
        match place {
            Place::Binding(name) => scope.assign(name, value),
            Place::Property(object, key) => builtins::set_property(self, object, key, value),
        }
    }

    /// Binary operators with arrays reduced to strings and string work charged.
    fn apply_binary(&mut self, op: BinaryOp, left: Value, right: Value) -> Result<Value, RuntimeError> {
        let (left, right) = match op {
            BinaryOp::StrictEq | BinaryOp::StrictNotEq => (left, right),
            BinaryOp::In => (self.to_primitive(left)?, right),
            BinaryOp::Eq | BinaryOp::NotEq if is_reference(&left) && is_reference(&right) => {
                (left, right)
            }
            _ => (self.to_primitive(left)?, self.to_primitive(right)?),
        };
        self.charge(text_len(&left) + text_len(&right))?;
        let result = binary(op, &left, &right)?;
        if let Value::String(s) = &result {
            self.reserve_string(s.len())?;
        }
        Ok(result)
    }
}

enum Place {
    Binding(String),
    Property(Value, String),
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPERATORS
// ═══════════════════════════════════════════════════════════════════════════════

fn short_circuits(op: LogicalOp, left: &Value) -> bool {
    match op {
        LogicalOp::And => !left.truthy(),
        LogicalOp::Or => left.truthy(),
        LogicalOp::Coalesce => !left.is_nullish(),
    }
}

pub(super) fn to_property_key(value: &Value) -> String {
    match value {
        Value::Number(n) => format_number(*n),
        other => other.to_js_string(),
    }
}

pub(super) fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    let m = n.trunc().rem_euclid(4_294_967_296.0);
    if m >= 2_147_483_648.0 {
        (m - 4_294_967_296.0) as i32
    } else {
        m as i32
    }
}

fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() {
        return 0;
    }
    n.trunc().rem_euclid(4_294_967_296.0) as u32
}

fn is_reference(value: &Value) -> bool {
    matches!(
        value,
        Value::Array(_) | Value::Object(_) | Value::Function(_) | Value::Element(_) | Value::Node(_)
    )
}

fn text_len(value: &Value) -> usize {
    match value {
        Value::String(s) => s.len(),
        _ => 0,
    }
}

fn is_primitive(value: &Value) -> bool {
    matches!(
        value,
        Value::Undefined | Value::Null | Value::Bool(_) | Value::Number(_)
    )
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    if !is_primitive(left) && !is_primitive(right) {
        return Some(left.to_js_string().cmp(&right.to_js_string()));
    }
    left.to_number().partial_cmp(&right.to_number())
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    let num = |f: fn(f64, f64) -> f64| Value::Number(f(left.to_number(), right.to_number()));
    let int = |f: fn(i32, i32) -> i32| {
        Value::Number(f64::from(f(
            to_int32(left.to_number()),
            to_int32(right.to_number()),
        )))
    };
    let cmp = |accept: fn(Ordering) -> bool| Value::Bool(compare(left, right).is_some_and(accept));

    Ok(match op {
        BinaryOp::Add => {
            if is_primitive(left) && is_primitive(right) {
                Value::Number(left.to_number() + right.to_number())
            } else {
                Value::string(format!("{}{}", left.to_js_string(), right.to_js_string()))
            }
        }
        BinaryOp::Sub => num(|a, b| a - b),
        BinaryOp::Mul => num(|a, b| a * b),
        BinaryOp::Div => num(|a, b| a / b),
        BinaryOp::Rem => num(|a, b| a % b),
        BinaryOp::Exp => num(f64::powf),
        BinaryOp::Eq => Value::Bool(left.loose_equals(right)),
        BinaryOp::NotEq => Value::Bool(!left.loose_equals(right)),
        BinaryOp::StrictEq => Value::Bool(left.strict_equals(right)),
        BinaryOp::StrictNotEq => Value::Bool(!left.strict_equals(right)),
        BinaryOp::Lt => cmp(|o| o == Ordering::Less),
        BinaryOp::LtEq => cmp(|o| o != Ordering::Greater),
        BinaryOp::Gt => cmp(|o| o == Ordering::Greater),
        BinaryOp::GtEq => cmp(|o| o != Ordering::Less),
        BinaryOp::In => {
            if is_primitive(right) || matches!(right, Value::String(_)) {
                return Err(RuntimeError::type_error(format!(
                    "cannot use `in` to search for `{}` in {}",
                    left.to_js_string(),
                    right.to_js_string()
                )));
            }
            let key = to_property_key(left);
            Value::Bool(builtins::own_keys(right).contains(&key))
        }
        BinaryOp::BitAnd => int(|a, b| a & b),
        BinaryOp::BitOr => int(|a, b| a | b),
        BinaryOp::BitXor => int(|a, b| a ^ b),
        BinaryOp::Shl => int(|a, b| a.wrapping_shl(b as u32 & 31)),
        BinaryOp::Shr => int(|a, b| a.wrapping_shr(b as u32 & 31)),
        BinaryOp::UShr => {
            let shift = to_uint32(right.to_number()) & 31;
            Value::Number(f64::from(to_uint32(left.to_number()) >> shift))
        }
    })
}
