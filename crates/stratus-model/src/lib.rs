//! Compiled stochastic models for statistical model checking.

pub mod distribution;
pub mod expr;
pub mod model;

pub use distribution::{Delay, Param};
pub use expr::{eval, eval_bool, BinOp, EvalError, EvalResult, Expr, UnaryOp};
pub use model::{Command, CompiledModel, Update, VarDecl};
