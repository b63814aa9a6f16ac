//! AST for scoring equations.
//!
//! A program is a sequence of statements separated by semicolons or
//! newlines; its value is the value of the last statement.

use serde::{Deserialize, Serialize};

/// Byte span in the original source, for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicOp {
    And,
    Or,
    Xor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Number(f64),
    Null,
    /// `{qN}`: the N-th item of the owning construct.
    ItemRef {
        number: u32,
        span: Span,
    },
    Var {
        name: String,
        span: Span,
    },
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logic {
        op: LogicOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
        span: Span,
    },
    /// `if c1 then e1 elif c2 then e2 ... else e`, an expression.
    If {
        arms: Vec<(Expr, Expr)>,
        else_expr: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Assign {
        name: String,
        span: Span,
        expr: Expr,
    },
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

impl Program {
    /// Item numbers referenced anywhere in the program.
    pub fn referenced_items(&self) -> Vec<u32> {
        let mut out = Vec::new();
        for stmt in &self.statements {
            let expr = match stmt {
                Stmt::Assign { expr, .. } => expr,
                Stmt::Expr(expr) => expr,
            };
            collect_item_refs(expr, &mut out);
        }
        out.sort_unstable();
        out.dedup();
        out
    }
}

fn collect_item_refs(expr: &Expr, out: &mut Vec<u32>) {
    match expr {
        Expr::Number(_) | Expr::Null | Expr::Var { .. } => {}
        Expr::ItemRef { number, .. } => out.push(*number),
        Expr::Neg(inner) => collect_item_refs(inner, out),
        Expr::Binary { left, right, .. }
        | Expr::Compare { left, right, .. }
        | Expr::Logic { left, right, .. } => {
            collect_item_refs(left, out);
            collect_item_refs(right, out);
        }
        Expr::Call { args, .. } => {
            for arg in args {
                collect_item_refs(arg, out);
            }
        }
        Expr::If { arms, else_expr } => {
            for (cond, body) in arms {
                collect_item_refs(cond, out);
                collect_item_refs(body, out);
            }
            collect_item_refs(else_expr, out);
        }
    }
}
