use serde::{Deserialize, Serialize};

use crate::expr::Expr;

/// One atom position of a flattened instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Item {
    /// Opcode name or modifier token.
    Name(String),
    /// Opening bracket of a nested sub-instruction.
    SubStart,
    SubEnd,
    Expr(Expr),
}

impl Item {
    pub fn name(s: &str) -> Self {
        Item::Name(s.to_string())
    }

    pub fn expr(e: Expr) -> Self {
        Item::Expr(e)
    }

    pub fn num(n: u64) -> Self {
        Item::Expr(Expr::Num(n))
    }

    pub fn reg(s: &str) -> Self {
        Item::Expr(Expr::reg(s))
    }

    pub fn label(s: &str) -> Self {
        Item::Expr(Expr::label(s))
    }
}

/// A line of the program handed over by the front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Line {
    Insn(Vec<Item>),
    Label(String),
    Directive {
        name: String,
        #[serde(default)]
        args: Vec<Expr>,
    },
}

impl Line {
    pub fn insn(items: Vec<Item>) -> Self {
        Line::Insn(items)
    }

    pub fn label(name: &str) -> Self {
        Line::Label(name.to_string())
    }

    pub fn directive(name: &str, args: Vec<Expr>) -> Self {
        Line::Directive { name: name.to_string(), args }
    }
}
