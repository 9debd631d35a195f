//! Syntax tree consumed by the evaluator. Producing it is the parser's job;
//! the constructors here keep hand-built trees short.

mod cmd;
pub use cmd::*;

use std::rc::Rc;

use crate::Int;

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(Int),
    Real(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    In,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::In => "in",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    BitNot,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),
    Identifier(String),
    Binary(BinaryOp, Box<Expression>, Box<Expression>),
    Unary(UnaryOp, Box<Expression>),
    Array(Vec<Expression>),
    Tuple(Vec<Expression>),
    Map(Vec<(Expression, Expression)>),
    Index(Box<Expression>, Box<Expression>),
    Attribute(Box<Expression>, String),
    Call(Box<Expression>, Vec<Expression>),
    /// `$(cmd)`: evaluates to the captured standard output.
    CmdSubst(Box<CmdFull>),
}

impl Expression {
    pub fn null() -> Self {
        Expression::Literal(Literal::Null)
    }

    pub fn bool(b: bool) -> Self {
        Expression::Literal(Literal::Bool(b))
    }

    pub fn int(i: Int) -> Self {
        Expression::Literal(Literal::Int(i))
    }

    pub fn real(r: f64) -> Self {
        Expression::Literal(Literal::Real(r))
    }

    pub fn string(s: impl Into<String>) -> Self {
        Expression::Literal(Literal::String(s.into()))
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Expression::Identifier(name.into())
    }

    pub fn binary(op: BinaryOp, lhs: Expression, rhs: Expression) -> Self {
        Expression::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn unary(op: UnaryOp, operand: Expression) -> Self {
        Expression::Unary(op, Box::new(operand))
    }

    pub fn index(target: Expression, index: Expression) -> Self {
        Expression::Index(Box::new(target), Box::new(index))
    }

    pub fn attr(target: Expression, name: impl Into<String>) -> Self {
        Expression::Attribute(Box::new(target), name.into())
    }

    pub fn call(func: Expression, args: Vec<Expression>) -> Self {
        Expression::Call(Box::new(func), args)
    }

    pub fn cmd_subst(cmd: CmdFull) -> Self {
        Expression::CmdSubst(Box::new(cmd))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    Name(String),
    Index(Expression, Expression),
    Attribute(Expression, String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Statement>,
}

impl FuncDecl {
    pub fn new(name: impl Into<String>, params: &[&str], body: Vec<Statement>) -> Self {
        Self {
            name: name.into(),
            params: params.iter().map(|p| p.to_string()).collect(),
            body,
        }
    }
}

/// Class body: methods plus class-level assignments.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Expr(Expression),
    Assign {
        target: AssignTarget,
        value: Expression,
        global: bool,
        constant: bool,
    },
    Del(Expression, Expression),
    Block(Vec<Statement>),
    If {
        cond: Expression,
        then: Vec<Statement>,
        otherwise: Vec<Statement>,
    },
    While {
        cond: Expression,
        body: Vec<Statement>,
    },
    For {
        var: String,
        iterable: Expression,
        body: Vec<Statement>,
    },
    Break,
    Continue,
    Return(Option<Expression>),
    FuncDecl(Rc<FuncDecl>),
    ClassDecl(Rc<ClassDecl>),
    Cmd(CmdFull),
}

impl Statement {
    pub fn assign(name: impl Into<String>, value: Expression) -> Self {
        Statement::Assign {
            target: AssignTarget::Name(name.into()),
            value,
            global: false,
            constant: false,
        }
    }

    pub fn global(name: impl Into<String>, value: Expression) -> Self {
        Statement::Assign {
            target: AssignTarget::Name(name.into()),
            value,
            global: true,
            constant: false,
        }
    }

    pub fn constant(name: impl Into<String>, value: Expression) -> Self {
        Statement::Assign {
            target: AssignTarget::Name(name.into()),
            value,
            global: false,
            constant: true,
        }
    }

    pub fn func(decl: FuncDecl) -> Self {
        Statement::FuncDecl(Rc::new(decl))
    }

    pub fn class(name: impl Into<String>, body: Vec<Statement>) -> Self {
        Statement::ClassDecl(Rc::new(ClassDecl {
            name: name.into(),
            body,
        }))
    }
}
