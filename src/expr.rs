use serde::{Deserialize, Serialize};

use crate::error::ExprError;
use crate::labels::LabelTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Shl,
    Shr,
    And,
    Xor,
    Or,
}

/// Increment attached to a memory operand.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Incr {
    #[default]
    None,
    /// `[addr]++e`
    PostAdd(Box<Expr>),
    /// `[addr]--e`
    PostSub(Box<Expr>),
    /// `[++e addr]`
    PreAdd(Box<Expr>),
    /// `[--e addr]`
    PreSub(Box<Expr>),
}

/// `space[addr]`, e.g. `g[$r1+0x10]` or `c3[$a2]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemRef {
    pub space: String,
    pub addr: Box<Expr>,
    #[serde(default)]
    pub incr: Incr,
}

/// Operand expression as produced by the front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Num(u64),
    Label(String),
    Reg(String),
    Mem(MemRef),
    /// Register list; empty for `()`.
    Vec(Vec<Expr>),
    Discard,
    /// Raw bit range `start:end`.
    Range(u64, u64),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn num(n: u64) -> Self {
        Expr::Num(n)
    }

    pub fn label(name: &str) -> Self {
        Expr::Label(name.to_string())
    }

    pub fn reg(name: &str) -> Self {
        Expr::Reg(name.to_string())
    }

    pub fn bin(op: BinOp, a: Expr, b: Expr) -> Self {
        Expr::Bin(op, Box::new(a), Box::new(b))
    }

    pub fn neg(e: Expr) -> Self {
        Expr::Neg(Box::new(e))
    }

    pub fn mem(space: &str, addr: Expr) -> Self {
        Expr::Mem(MemRef { space: space.to_string(), addr: Box::new(addr), incr: Incr::None })
    }

    pub fn mem_incr(space: &str, addr: Expr, incr: Incr) -> Self {
        Expr::Mem(MemRef { space: space.to_string(), addr: Box::new(addr), incr })
    }

    /// True for arithmetic over numbers and labels only.
    pub fn is_imm(&self) -> bool {
        match self {
            Expr::Num(_) | Expr::Label(_) => true,
            Expr::Neg(e) | Expr::Not(e) => e.is_imm(),
            Expr::Bin(_, a, b) => a.is_imm() && b.is_imm(),
            Expr::Reg(_) | Expr::Mem(_) | Expr::Vec(_) | Expr::Discard | Expr::Range(..) => false,
        }
    }

    /// Value of an immediate that needs no labels.
    pub fn const_value(&self) -> Option<u64> {
        self.eval(&LabelTable::default()).ok()
    }

    /// Evaluates with 64-bit wrapping arithmetic. Over-wide shifts give 0.
    pub fn eval(&self, labels: &LabelTable) -> Result<u64, ExprError> {
        match self {
            Expr::Num(n) => Ok(*n),
            Expr::Label(name) => labels
                .get(name)
                .ok_or_else(|| ExprError::UndefinedLabel(name.clone())),
            Expr::Neg(e) => Ok(e.eval(labels)?.wrapping_neg()),
            Expr::Not(e) => Ok(!e.eval(labels)?),
            Expr::Bin(op, a, b) => {
                let a = a.eval(labels)?;
                let b = b.eval(labels)?;
                let sh = u32::try_from(b).ok();
                Ok(match op {
                    BinOp::Add => a.wrapping_add(b),
                    BinOp::Sub => a.wrapping_sub(b),
                    BinOp::Mul => a.wrapping_mul(b),
                    BinOp::Div => a.checked_div(b).ok_or(ExprError::DivisionByZero)?,
                    BinOp::Shl => sh.and_then(|s| a.checked_shl(s)).unwrap_or(0),
                    BinOp::Shr => sh.and_then(|s| a.checked_shr(s)).unwrap_or(0),
                    BinOp::And => a & b,
                    BinOp::Xor => a ^ b,
                    BinOp::Or => a | b,
                })
            }
            Expr::Reg(_) | Expr::Mem(_) | Expr::Vec(_) | Expr::Discard | Expr::Range(..) => {
                Err(ExprError::NotImmediate)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_wraps_like_u64() {
        let e = Expr::bin(BinOp::Sub, Expr::num(1), Expr::num(3));
        assert_eq!(e.const_value(), Some((-2i64) as u64));
        let e = Expr::Not(Box::new(Expr::num(0)));
        assert_eq!(e.const_value(), Some(!0));
        let e = Expr::bin(BinOp::Shl, Expr::num(1), Expr::num(70));
        assert_eq!(e.const_value(), Some(0));
        let e = Expr::bin(
            BinOp::Or,
            Expr::bin(BinOp::And, Expr::num(0xF0), Expr::num(0x3C)),
            Expr::bin(BinOp::Xor, Expr::num(1), Expr::num(3)),
        );
        assert_eq!(e.const_value(), Some(0x32));
    }

    #[test]
    fn labels_and_errors() {
        let mut labels = LabelTable::default();
        labels.define("L", 0x40, 1).unwrap();
        let e = Expr::bin(BinOp::Div, Expr::label("L"), Expr::num(4));
        assert_eq!(e.eval(&labels), Ok(0x10));
        assert!(e.is_imm());
        assert_eq!(e.const_value(), None);

        let e = Expr::bin(BinOp::Div, Expr::num(4), Expr::bin(BinOp::Sub, Expr::label("L"), Expr::num(0x40)));
        assert_eq!(e.eval(&labels), Err(ExprError::DivisionByZero));
        assert_eq!(Expr::label("M").eval(&labels), Err(ExprError::UndefinedLabel("M".into())));
        assert_eq!(Expr::reg("$r1").eval(&labels), Err(ExprError::NotImmediate));
        assert!(!Expr::bin(BinOp::Add, Expr::reg("$r1"), Expr::num(1)).is_imm());
    }
}
