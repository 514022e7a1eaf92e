//! Guarded probabilistic commands and the compiled model.

use crate::distribution::Delay;
use crate::expr::{eval, EvalResult, Expr};
use std::sync::Arc;

/// A state variable declaration.
#[derive(Debug, Clone)]
pub struct VarDecl {
    /// Variable name.
    pub name: String,
    /// Variable index.
    pub index: usize,
    /// Inclusive lower bound.
    pub low: i64,
    /// Inclusive upper bound.
    pub high: i64,
    /// Initial value.
    pub init: i64,
}

/// One variable assignment applied when a command fires.
#[derive(Debug, Clone)]
pub struct Update {
    /// Target variable index.
    pub variable: usize,
    /// New value, evaluated against the pre-transition state.
    pub expr: Arc<Expr>,
}

/// A guarded command with a probabilistic firing delay.
#[derive(Debug, Clone)]
pub struct Command {
    /// Command name, for traces and logging.
    pub name: String,
    /// Enabling condition.
    pub guard: Arc<Expr>,
    /// Firing-delay distribution.
    pub delay: Delay,
    /// Assignments applied on firing.
    pub updates: Vec<Update>,
}

/// A compiled stochastic model: an ordered set of commands over a
/// fixed vector of integer state variables.
///
/// Immutable once built; shared across a verification run via `Arc`.
#[derive(Debug, Clone)]
pub struct CompiledModel {
    variables: Vec<VarDecl>,
    commands: Vec<Command>,
}

impl CompiledModel {
    pub fn new(variables: Vec<VarDecl>, commands: Vec<Command>) -> Self {
        Self {
            variables,
            commands,
        }
    }

    pub fn variables(&self) -> &[VarDecl] {
        &self.variables
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Look up a variable index by name.
    pub fn variable_index(&self, name: &str) -> Option<usize> {
        self.variables.iter().find(|v| v.name == name).map(|v| v.index)
    }

    /// Initial variable values in declaration order.
    pub fn initial_values(&self) -> Vec<i64> {
        self.variables.iter().map(|v| v.init).collect()
    }

    /// Fold constant values into all guards, updates, and delay
    /// parameters, producing a model free of `Const` references.
    pub fn resolve_constants(&self, consts: &[i64]) -> EvalResult<CompiledModel> {
        let commands = self
            .commands
            .iter()
            .map(|cmd| {
                Ok(Command {
                    name: cmd.name.clone(),
                    guard: cmd.guard.resolve_constants(consts)?,
                    delay: cmd.delay.resolve_constants(consts)?,
                    updates: cmd
                        .updates
                        .iter()
                        .map(|u| {
                            Ok(Update {
                                variable: u.variable,
                                expr: u.expr.resolve_constants(consts)?,
                            })
                        })
                        .collect::<EvalResult<Vec<_>>>()?,
                })
            })
            .collect::<EvalResult<Vec<_>>>()?;
        Ok(CompiledModel {
            variables: self.variables.clone(),
            commands,
        })
    }

    /// Upper bound on the total exit rate: the sum of every command's
    /// inverse-mean delay. Used by the effort estimator to convert a
    /// time horizon into an expected step count. Parameters that
    /// depend on state are evaluated in the initial state.
    pub fn exit_rate_bound(&self) -> EvalResult<f64> {
        let values = self.initial_values();
        let mut q = 0.0;
        for cmd in &self.commands {
            q += cmd.delay.rate_estimate(&values)?;
        }
        Ok(q)
    }

    /// Does any enabled command exist in the given state?
    pub fn any_enabled(&self, values: &[i64]) -> EvalResult<bool> {
        for cmd in &self.commands {
            if eval(&cmd.guard, values)? != 0 {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
