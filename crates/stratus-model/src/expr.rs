//! Expression IR for guards, updates, and distribution parameters.
//!
//! Expressions are immutable trees shared via `Arc`: constant
//! substitution returns the original node when nothing below it
//! changed, and a freshly allocated replacement otherwise.

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Expression evaluation error.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("undefined variable at index {0}")]
    UndefinedVariable(usize),

    #[error("unresolved constant at index {0}")]
    UnresolvedConstant(usize),

    #[error("division by zero")]
    DivisionByZero,
}

pub type EvalResult<T> = Result<T, EvalError>;

/// Binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    // Logical
    And,
    Or,
    Implies,
    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// Unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// A compiled expression over integer state variables.
///
/// Booleans are represented as integers: zero is false, anything else
/// is true. Comparison and logical operators evaluate to 0 or 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// Integer literal.
    Int(i64),
    /// State variable (by index).
    Var(usize),
    /// Named model constant (by index), resolved away at model build time.
    Const(usize),
    /// Binary operation.
    Binary {
        op: BinOp,
        left: Arc<Expr>,
        right: Arc<Expr>,
    },
    /// Unary operation.
    Unary { op: UnaryOp, operand: Arc<Expr> },
}

impl Expr {
    pub fn int(n: i64) -> Arc<Expr> {
        Arc::new(Expr::Int(n))
    }

    pub fn var(idx: usize) -> Arc<Expr> {
        Arc::new(Expr::Var(idx))
    }

    pub fn constant(idx: usize) -> Arc<Expr> {
        Arc::new(Expr::Const(idx))
    }

    pub fn binary(op: BinOp, left: Arc<Expr>, right: Arc<Expr>) -> Arc<Expr> {
        Arc::new(Expr::Binary { op, left, right })
    }

    pub fn unary(op: UnaryOp, operand: Arc<Expr>) -> Arc<Expr> {
        Arc::new(Expr::Unary { op, operand })
    }

    /// The constant `true` (1).
    pub fn truth() -> Arc<Expr> {
        Expr::int(1)
    }

    /// Substitute constant values into the expression.
    ///
    /// Returns the receiver unchanged (shared) when no `Const` node
    /// occurs below it, so fully resolved subtrees are never copied.
    pub fn resolve_constants(self: &Arc<Expr>, consts: &[i64]) -> EvalResult<Arc<Expr>> {
        match self.as_ref() {
            Expr::Int(_) | Expr::Var(_) => Ok(Arc::clone(self)),
            Expr::Const(idx) => {
                let value = consts
                    .get(*idx)
                    .copied()
                    .ok_or(EvalError::UnresolvedConstant(*idx))?;
                Ok(Expr::int(value))
            }
            Expr::Binary { op, left, right } => {
                let new_left = left.resolve_constants(consts)?;
                let new_right = right.resolve_constants(consts)?;
                if Arc::ptr_eq(&new_left, left) && Arc::ptr_eq(&new_right, right) {
                    Ok(Arc::clone(self))
                } else {
                    Ok(Expr::binary(*op, new_left, new_right))
                }
            }
            Expr::Unary { op, operand } => {
                let new_operand = operand.resolve_constants(consts)?;
                if Arc::ptr_eq(&new_operand, operand) {
                    Ok(Arc::clone(self))
                } else {
                    Ok(Expr::unary(*op, new_operand))
                }
            }
        }
    }
}

/// Evaluate an expression against a state variable vector.
pub fn eval(expr: &Expr, values: &[i64]) -> EvalResult<i64> {
    match expr {
        Expr::Int(n) => Ok(*n),
        Expr::Var(idx) => values
            .get(*idx)
            .copied()
            .ok_or(EvalError::UndefinedVariable(*idx)),
        Expr::Const(idx) => Err(EvalError::UnresolvedConstant(*idx)),
        Expr::Binary { op, left, right } => {
            // Logical operators short-circuit.
            match op {
                BinOp::And => return Ok(bool_to_int(eval_bool(left, values)? && eval_bool(right, values)?)),
                BinOp::Or => return Ok(bool_to_int(eval_bool(left, values)? || eval_bool(right, values)?)),
                BinOp::Implies => {
                    return Ok(bool_to_int(!eval_bool(left, values)? || eval_bool(right, values)?))
                }
                _ => {}
            }
            let l = eval(left, values)?;
            let r = eval(right, values)?;
            match op {
                BinOp::Eq => Ok(bool_to_int(l == r)),
                BinOp::Ne => Ok(bool_to_int(l != r)),
                BinOp::Lt => Ok(bool_to_int(l < r)),
                BinOp::Le => Ok(bool_to_int(l <= r)),
                BinOp::Gt => Ok(bool_to_int(l > r)),
                BinOp::Ge => Ok(bool_to_int(l >= r)),
                BinOp::Add => Ok(l.wrapping_add(r)),
                BinOp::Sub => Ok(l.wrapping_sub(r)),
                BinOp::Mul => Ok(l.wrapping_mul(r)),
                BinOp::Div => {
                    if r == 0 {
                        Err(EvalError::DivisionByZero)
                    } else {
                        Ok(l / r)
                    }
                }
                BinOp::Mod => {
                    if r == 0 {
                        Err(EvalError::DivisionByZero)
                    } else {
                        Ok(l % r)
                    }
                }
                BinOp::And | BinOp::Or | BinOp::Implies => unreachable!("handled above"),
            }
        }
        Expr::Unary { op, operand } => match op {
            UnaryOp::Not => Ok(bool_to_int(!eval_bool(operand, values)?)),
            UnaryOp::Neg => Ok(-eval(operand, values)?),
        },
    }
}

/// Evaluate an expression as a boolean (nonzero is true).
pub fn eval_bool(expr: &Expr, values: &[i64]) -> EvalResult<bool> {
    Ok(eval(expr, values)? != 0)
}

#[inline]
fn bool_to_int(b: bool) -> i64 {
    i64::from(b)
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Int(n) => write!(f, "{}", n),
            Expr::Var(idx) => write!(f, "v{}", idx),
            Expr::Const(idx) => write!(f, "c{}", idx),
            Expr::Binary { op, left, right } => {
                let sym = match op {
                    BinOp::And => "&",
                    BinOp::Or => "|",
                    BinOp::Implies => "=>",
                    BinOp::Eq => "==",
                    BinOp::Ne => "!=",
                    BinOp::Lt => "<",
                    BinOp::Le => "<=",
                    BinOp::Gt => ">",
                    BinOp::Ge => ">=",
                    BinOp::Add => "+",
                    BinOp::Sub => "-",
                    BinOp::Mul => "*",
                    BinOp::Div => "/",
                    BinOp::Mod => "%",
                };
                write!(f, "({} {} {})", left, sym, right)
            }
            Expr::Unary { op, operand } => match op {
                UnaryOp::Not => write!(f, "!{}", operand),
                UnaryOp::Neg => write!(f, "-{}", operand),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_arithmetic() {
        // (v0 + 2) * v1
        let e = Expr::binary(
            BinOp::Mul,
            Expr::binary(BinOp::Add, Expr::var(0), Expr::int(2)),
            Expr::var(1),
        );
        assert_eq!(eval(&e, &[3, 5]).unwrap(), 25);
    }

    #[test]
    fn test_eval_comparison_and_logic() {
        // v0 < 4 & v1 >= 2
        let e = Expr::binary(
            BinOp::And,
            Expr::binary(BinOp::Lt, Expr::var(0), Expr::int(4)),
            Expr::binary(BinOp::Ge, Expr::var(1), Expr::int(2)),
        );
        assert!(eval_bool(&e, &[3, 2]).unwrap());
        assert!(!eval_bool(&e, &[4, 2]).unwrap());
    }

    #[test]
    fn test_short_circuit_guards_division() {
        // v0 != 0 & (10 / v0) > 1 must not divide when v0 == 0
        let e = Expr::binary(
            BinOp::And,
            Expr::binary(BinOp::Ne, Expr::var(0), Expr::int(0)),
            Expr::binary(
                BinOp::Gt,
                Expr::binary(BinOp::Div, Expr::int(10), Expr::var(0)),
                Expr::int(1),
            ),
        );
        assert!(!eval_bool(&e, &[0]).unwrap());
        assert!(eval_bool(&e, &[5]).unwrap());
    }

    #[test]
    fn test_division_by_zero() {
        let e = Expr::binary(BinOp::Div, Expr::int(1), Expr::var(0));
        assert!(matches!(eval(&e, &[0]), Err(EvalError::DivisionByZero)));
    }

    #[test]
    fn test_resolve_constants_shares_unchanged() {
        // v0 + 1 contains no constants: same node back
        let e = Expr::binary(BinOp::Add, Expr::var(0), Expr::int(1));
        let resolved = e.resolve_constants(&[7]).unwrap();
        assert!(Arc::ptr_eq(&e, &resolved));

        // v0 + c0 changes the right child only
        let e = Expr::binary(BinOp::Add, Expr::var(0), Expr::constant(0));
        let resolved = e.resolve_constants(&[7]).unwrap();
        assert!(!Arc::ptr_eq(&e, &resolved));
        assert_eq!(eval(&resolved, &[2]).unwrap(), 9);
    }

    #[test]
    fn test_unresolved_constant_is_error() {
        let e = Expr::constant(3);
        assert!(matches!(
            eval(&e, &[]),
            Err(EvalError::UnresolvedConstant(3))
        ));
    }
}
