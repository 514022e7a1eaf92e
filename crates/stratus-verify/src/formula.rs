//! CSL property trees.
//!
//! A state formula is evaluated against a single state; a path formula is
//! evaluated against a trajectory drawn from that state. Probabilistic
//! operators bridge the two: `P{>= theta}[pre U[a,b] post]` holds in a state
//! iff the probability of the path formula holding on trajectories from that
//! state meets the threshold.

use std::fmt;
use std::sync::Arc;

use stratus_model::{EvalResult, Expr};

/// Comparison operator for atomic state propositions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn apply(self, left: i64, right: i64) -> bool {
        match self {
            CmpOp::Eq => left == right,
            CmpOp::Ne => left != right,
            CmpOp::Lt => left < right,
            CmpOp::Le => left <= right,
            CmpOp::Gt => left > right,
            CmpOp::Ge => left >= right,
        }
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        };
        f.write_str(s)
    }
}

/// A CSL state formula.
#[derive(Debug, Clone)]
pub enum StateFormula {
    Conjunction(Vec<StateFormula>),
    Disjunction(Vec<StateFormula>),
    Negation(Box<StateFormula>),
    Implication(Box<StateFormula>, Box<StateFormula>),
    Probabilistic {
        /// Probability threshold `theta`.
        threshold: f64,
        /// Strict (`>`) rather than non-strict (`>=`) comparison.
        strict: bool,
        path: Box<PathFormula>,
        /// Index into the session's per-operator memoization caches.
        /// Assigned by [`Property::new`]; unindexed formulas carry
        /// `usize::MAX`.
        cache_id: usize,
    },
    Comparison {
        op: CmpOp,
        left: Arc<Expr>,
        right: Arc<Expr>,
    },
}

/// A CSL path formula. Time-bounded until is the only primitive; eventually
/// is derived via [`PathFormula::eventually`].
#[derive(Debug, Clone)]
pub enum PathFormula {
    Until {
        pre: StateFormula,
        post: StateFormula,
        min_time: f64,
        max_time: f64,
    },
}

impl StateFormula {
    pub fn comparison(op: CmpOp, left: Arc<Expr>, right: Arc<Expr>) -> Self {
        StateFormula::Comparison { op, left, right }
    }

    pub fn negation(operand: StateFormula) -> Self {
        StateFormula::Negation(Box::new(operand))
    }

    pub fn implication(antecedent: StateFormula, consequent: StateFormula) -> Self {
        StateFormula::Implication(Box::new(antecedent), Box::new(consequent))
    }

    pub fn probabilistic(threshold: f64, strict: bool, path: PathFormula) -> Self {
        StateFormula::Probabilistic {
            threshold,
            strict,
            path: Box::new(path),
            cache_id: usize::MAX,
        }
    }

    /// A formula that holds in every state.
    pub fn truth() -> Self {
        StateFormula::Comparison {
            op: CmpOp::Eq,
            left: Expr::int(0),
            right: Expr::int(0),
        }
    }

    /// Whether any probabilistic operator occurs in this formula.
    pub fn has_probabilistic(&self) -> bool {
        match self {
            StateFormula::Conjunction(children) | StateFormula::Disjunction(children) => {
                children.iter().any(StateFormula::has_probabilistic)
            }
            StateFormula::Negation(operand) => operand.has_probabilistic(),
            StateFormula::Implication(antecedent, consequent) => {
                antecedent.has_probabilistic() || consequent.has_probabilistic()
            }
            StateFormula::Probabilistic { .. } => true,
            StateFormula::Comparison { .. } => false,
        }
    }

    /// Rewrites named constants into literals throughout the formula.
    pub fn resolve_constants(&self, consts: &[i64]) -> EvalResult<StateFormula> {
        Ok(match self {
            StateFormula::Conjunction(children) => StateFormula::Conjunction(
                children
                    .iter()
                    .map(|c| c.resolve_constants(consts))
                    .collect::<EvalResult<_>>()?,
            ),
            StateFormula::Disjunction(children) => StateFormula::Disjunction(
                children
                    .iter()
                    .map(|c| c.resolve_constants(consts))
                    .collect::<EvalResult<_>>()?,
            ),
            StateFormula::Negation(operand) => {
                StateFormula::negation(operand.resolve_constants(consts)?)
            }
            StateFormula::Implication(antecedent, consequent) => StateFormula::implication(
                antecedent.resolve_constants(consts)?,
                consequent.resolve_constants(consts)?,
            ),
            StateFormula::Probabilistic {
                threshold,
                strict,
                path,
                cache_id,
            } => StateFormula::Probabilistic {
                threshold: *threshold,
                strict: *strict,
                path: Box::new(path.resolve_constants(consts)?),
                cache_id: *cache_id,
            },
            StateFormula::Comparison { op, left, right } => StateFormula::Comparison {
                op: *op,
                left: left.resolve_constants(consts)?,
                right: right.resolve_constants(consts)?,
            },
        })
    }

    fn assign_cache_ids(&mut self, next: &mut usize) {
        match self {
            StateFormula::Conjunction(children) | StateFormula::Disjunction(children) => {
                for child in children {
                    child.assign_cache_ids(next);
                }
            }
            StateFormula::Negation(operand) => operand.assign_cache_ids(next),
            StateFormula::Implication(antecedent, consequent) => {
                antecedent.assign_cache_ids(next);
                consequent.assign_cache_ids(next);
            }
            StateFormula::Probabilistic { path, cache_id, .. } => {
                *cache_id = *next;
                *next += 1;
                let PathFormula::Until { pre, post, .. } = path.as_mut();
                pre.assign_cache_ids(next);
                post.assign_cache_ids(next);
            }
            StateFormula::Comparison { .. } => {}
        }
    }
}

impl PathFormula {
    pub fn until(pre: StateFormula, post: StateFormula, min_time: f64, max_time: f64) -> Self {
        PathFormula::Until {
            pre,
            post,
            min_time,
            max_time,
        }
    }

    /// `F[a,b] post`, sugar for `true U[a,b] post`.
    pub fn eventually(post: StateFormula, min_time: f64, max_time: f64) -> Self {
        PathFormula::until(StateFormula::truth(), post, min_time, max_time)
    }

    pub fn has_probabilistic(&self) -> bool {
        let PathFormula::Until { pre, post, .. } = self;
        pre.has_probabilistic() || post.has_probabilistic()
    }

    pub fn resolve_constants(&self, consts: &[i64]) -> EvalResult<PathFormula> {
        let PathFormula::Until {
            pre,
            post,
            min_time,
            max_time,
        } = self;
        Ok(PathFormula::Until {
            pre: pre.resolve_constants(consts)?,
            post: post.resolve_constants(consts)?,
            min_time: *min_time,
            max_time: *max_time,
        })
    }
}

/// A state formula with cache slots assigned to every probabilistic
/// operator, ready for verification.
#[derive(Debug, Clone)]
pub struct Property {
    formula: StateFormula,
    num_probabilistic: usize,
}

impl Property {
    pub fn new(mut formula: StateFormula) -> Property {
        let mut next = 0;
        formula.assign_cache_ids(&mut next);
        Property {
            formula,
            num_probabilistic: next,
        }
    }

    pub fn formula(&self) -> &StateFormula {
        &self.formula
    }

    /// Number of probabilistic operators, and thus memoization caches,
    /// in the property.
    pub fn num_probabilistic(&self) -> usize {
        self.num_probabilistic
    }

    /// The probabilistic operator with the given cache id, if any. Cache
    /// ids double as property indices on the wire, so sampling workers use
    /// this to locate the operator a server asks them to sample.
    pub fn find_probabilistic(&self, cache_id: usize) -> Option<&StateFormula> {
        fn walk(f: &StateFormula, cache_id: usize) -> Option<&StateFormula> {
            match f {
                StateFormula::Conjunction(children) | StateFormula::Disjunction(children) => {
                    children.iter().find_map(|c| walk(c, cache_id))
                }
                StateFormula::Negation(operand) => walk(operand, cache_id),
                StateFormula::Implication(antecedent, consequent) => {
                    walk(antecedent, cache_id).or_else(|| walk(consequent, cache_id))
                }
                StateFormula::Probabilistic { path, cache_id: id, .. } => {
                    if *id == cache_id {
                        return Some(f);
                    }
                    let PathFormula::Until { pre, post, .. } = path.as_ref();
                    walk(pre, cache_id).or_else(|| walk(post, cache_id))
                }
                StateFormula::Comparison { .. } => None,
            }
        }
        walk(&self.formula, cache_id)
    }
}

impl fmt::Display for StateFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateFormula::Conjunction(children) => {
                write!(f, "(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " & ")?;
                    }
                    write!(f, "{child}")?;
                }
                write!(f, ")")
            }
            StateFormula::Disjunction(children) => {
                write!(f, "(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{child}")?;
                }
                write!(f, ")")
            }
            StateFormula::Negation(operand) => write!(f, "!{operand}"),
            StateFormula::Implication(antecedent, consequent) => {
                write!(f, "({antecedent} => {consequent})")
            }
            StateFormula::Probabilistic {
                threshold,
                strict,
                path,
                ..
            } => {
                let cmp = if *strict { ">" } else { ">=" };
                write!(f, "P{{{cmp}{threshold}}}[{path}]")
            }
            StateFormula::Comparison { op, left, right } => write!(f, "{left} {op} {right}"),
        }
    }
}

impl fmt::Display for PathFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let PathFormula::Until {
            pre,
            post,
            min_time,
            max_time,
        } = self;
        write!(f, "{pre} U[{min_time},{max_time}] {post}")
    }
}
