//! Owned, resolved program representation executed by the [`Machine`](super::Machine).
//!
//! Produced by [`lower`](super::lower) from the oxc AST. Every identifier in
//! here was resolved against a lexical scope or the capability preamble at
//! lowering time; the machine never consults an ambient global scope.

use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Var,
    Let,
    Const,
}

#[derive(Debug)]
pub struct FunctionDef {
    pub name: Option<String>,
    /// Binds `name` inside the body (named function expressions).
    pub self_binding: bool,
    pub params: Vec<Pattern>,
    /// `...rest`, bound to an array of the remaining arguments.
    pub rest: Option<Pattern>,
    /// `var` names hoisted to function scope.
    pub var_names: Vec<String>,
    pub body: FunctionBody,
}

#[derive(Debug)]
pub enum FunctionBody {
    Block(Block),
    Expression(Expr),
}

/// Names pre-declared (uninitialized) when a block is entered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexicalName {
    pub name: String,
    pub mutable: bool,
}

#[derive(Debug, Default)]
pub struct Block {
    pub lexical: Vec<LexicalName>,
    pub stmts: Vec<Stmt>,
}

#[derive(Debug)]
pub enum Stmt {
    Declare {
        kind: DeclKind,
        declarations: Vec<(Pattern, Option<Expr>)>,
    },
    /// Hoisted: initialized on block entry, a no-op when reached.
    Function(Rc<FunctionDef>),
    Expr(Expr),
    Return(Option<Expr>),
    If {
        test: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
    },
    Block(Block),
    ForOf {
        kind: DeclKind,
        pattern: Pattern,
        iterable: Expr,
        body: Box<Stmt>,
    },
    ForIn {
        kind: DeclKind,
        pattern: Pattern,
        object: Expr,
        body: Box<Stmt>,
    },
    For {
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
    },
    While {
        test: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        test: Expr,
    },
    Switch {
        discriminant: Expr,
        lexical: Vec<LexicalName>,
        cases: Vec<SwitchCase>,
    },
    Try {
        block: Block,
        handler: Option<CatchHandler>,
        finalizer: Option<Block>,
    },
    Throw(Expr),
    Break,
    Continue,
    Empty,
}

#[derive(Debug)]
pub struct SwitchCase {
    pub test: Option<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug)]
pub struct CatchHandler {
    pub param: Option<Pattern>,
    pub body: Block,
}

#[derive(Debug)]
pub enum Pattern {
    Ident(String),
    Object {
        properties: Vec<(PropertyKey, Pattern)>,
        rest: Option<Box<Pattern>>,
    },
    Array {
        elements: Vec<Option<Pattern>>,
        rest: Option<Box<Pattern>>,
    },
    Default {
        target: Box<Pattern>,
        default: Expr,
    },
}

#[derive(Debug)]
pub enum PropertyKey {
    Static(String),
    Computed(Box<Expr>),
}

#[derive(Debug)]
pub enum Expr {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Template {
        quasis: Vec<String>,
        exprs: Vec<Expr>,
    },
    Ident(String),
    Array(Vec<ArrayItem>),
    Object(Vec<ObjectItem>),
    Function(Rc<FunctionDef>),
    Unary {
        op: UnaryOp,
        arg: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Assign {
        op: AssignOp,
        target: Target,
        value: Box<Expr>,
    },
    Update {
        increment: bool,
        prefix: bool,
        target: Target,
    },
    Member {
        object: Box<Expr>,
        property: PropertyKey,
        optional: bool,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<ArrayItem>,
        optional: bool,
    },
    /// Only host-supplied constructors may be instantiated.
    New {
        callee: Box<Expr>,
        args: Vec<ArrayItem>,
    },
    /// Operands are already settled, so `await` yields them unchanged.
    Await(Box<Expr>),
    Sequence(Vec<Expr>),
    /// Boundary of an optional chain; a short-circuit inside yields `undefined`.
    Chain(Box<Expr>),
}

#[derive(Debug)]
pub enum ArrayItem {
    Expr(Expr),
    Spread(Expr),
    Hole,
}

#[derive(Debug)]
pub enum ObjectItem {
    Property(PropertyKey, Expr),
    Spread(Expr),
}

#[derive(Debug)]
pub enum Target {
    Ident(String),
    Member {
        object: Box<Expr>,
        property: PropertyKey,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Minus,
    Plus,
    BitNot,
    TypeOf,
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Exp,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Coalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Binary(BinaryOp),
    Logical(LogicalOp),
}
