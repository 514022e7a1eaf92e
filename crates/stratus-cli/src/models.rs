//! Built-in benchmark models.
//!
//! Two classic continuous-time benchmarks, parameterized by a size knob:
//! a tandem queueing network and a cyclic polling system. The polling
//! system uses a Weibull service delay, exercising the general-distribution
//! trigger bookkeeping in the simulator.

use std::sync::Arc;

use stratus_model::{BinOp, Command, CompiledModel, Delay, Expr, Param, Update, VarDecl};
use stratus_verify::{CmpOp, PathFormula, Property, StateFormula};

/// A named CSL property over a built-in model.
pub struct NamedProperty {
    pub name: String,
    pub property: Property,
}

fn var_decl(name: &str, index: usize, low: i64, high: i64, init: i64) -> VarDecl {
    VarDecl {
        name: name.into(),
        index,
        low,
        high,
        init,
    }
}

fn guard_eq(var: usize, value: i64) -> Arc<Expr> {
    Expr::binary(BinOp::Eq, Expr::var(var), Expr::int(value))
}

fn and(left: Arc<Expr>, right: Arc<Expr>) -> Arc<Expr> {
    Expr::binary(BinOp::And, left, right)
}

fn set(variable: usize, value: i64) -> Update {
    Update {
        variable,
        expr: Expr::int(value),
    }
}

/// Two M/M/1 queues in series with capacity `capacity` each. Customers
/// arrive at the first queue, move to the second when it has room, and
/// leave from there.
pub fn tandem(capacity: i64) -> (CompiledModel, Vec<NamedProperty>) {
    const Q1: usize = 0;
    const Q2: usize = 1;
    let vars = vec![
        var_decl("q1", Q1, 0, capacity, 0),
        var_decl("q2", Q2, 0, capacity, 0),
    ];

    let inc = |v: usize| Update {
        variable: v,
        expr: Expr::binary(BinOp::Add, Expr::var(v), Expr::int(1)),
    };
    let dec = |v: usize| Update {
        variable: v,
        expr: Expr::binary(BinOp::Sub, Expr::var(v), Expr::int(1)),
    };

    let commands = vec![
        Command {
            name: "arrive".into(),
            guard: Expr::binary(BinOp::Lt, Expr::var(Q1), Expr::int(capacity)),
            delay: Delay::Exponential {
                rate: Param::Value(4.0),
            },
            updates: vec![inc(Q1)],
        },
        Command {
            name: "route".into(),
            guard: and(
                Expr::binary(BinOp::Gt, Expr::var(Q1), Expr::int(0)),
                Expr::binary(BinOp::Lt, Expr::var(Q2), Expr::int(capacity)),
            ),
            delay: Delay::Exponential {
                rate: Param::Value(2.0),
            },
            updates: vec![dec(Q1), inc(Q2)],
        },
        Command {
            name: "depart".into(),
            guard: Expr::binary(BinOp::Gt, Expr::var(Q2), Expr::int(0)),
            delay: Delay::Exponential {
                rate: Param::Value(2.0),
            },
            updates: vec![dec(Q2)],
        },
    ];

    let full = StateFormula::Conjunction(vec![
        StateFormula::comparison(CmpOp::Eq, Expr::var(Q1), Expr::int(capacity)),
        StateFormula::comparison(CmpOp::Eq, Expr::var(Q2), Expr::int(capacity)),
    ]);
    let busy = StateFormula::comparison(CmpOp::Ge, Expr::var(Q1), Expr::int(1));

    let properties = vec![
        NamedProperty {
            name: "full".into(),
            property: Property::new(StateFormula::probabilistic(
                0.5,
                false,
                PathFormula::eventually(full, 0.0, 10.0),
            )),
        },
        NamedProperty {
            name: "busy".into(),
            property: Property::new(StateFormula::probabilistic(
                0.9,
                false,
                PathFormula::eventually(busy, 0.0, 2.0),
            )),
        },
    ];

    (CompiledModel::new(vars, commands), properties)
}

/// A cyclic polling system with `stations` stations and one server. The
/// server walks the ring, serving a station when a message is waiting.
/// Service times are Weibull distributed.
pub fn polling(stations: i64) -> (CompiledModel, Vec<NamedProperty>) {
    let n = stations.max(2);
    // Variable 0 is the station the server attends, 1 is the serving
    // flag, 2.. are the per-station message flags.
    const STATION: usize = 0;
    const SERVING: usize = 1;
    let message = |i: i64| 2 + i as usize;

    let mut vars = vec![
        var_decl("s", STATION, 1, n, 1),
        var_decl("serving", SERVING, 0, 1, 0),
    ];
    for i in 0..n {
        vars.push(var_decl(&format!("m{}", i + 1), message(i), 0, 1, 0));
    }

    let mut commands = Vec::new();
    for i in 0..n {
        let station = i + 1;
        let next = (i + 1) % n + 1;
        let here_idle = and(guard_eq(STATION, station), guard_eq(SERVING, 0));

        commands.push(Command {
            name: format!("arrive{station}"),
            guard: guard_eq(message(i), 0),
            delay: Delay::Exponential {
                rate: Param::Value(0.2),
            },
            updates: vec![set(message(i), 1)],
        });
        commands.push(Command {
            name: format!("walk{station}"),
            guard: and(here_idle.clone(), guard_eq(message(i), 0)),
            delay: Delay::Exponential {
                rate: Param::Value(5.0),
            },
            updates: vec![set(STATION, next)],
        });
        commands.push(Command {
            name: format!("serve{station}"),
            guard: and(here_idle, guard_eq(message(i), 1)),
            delay: Delay::Weibull {
                scale: Param::Value(0.5),
                shape: Param::Value(2.0),
            },
            updates: vec![set(SERVING, 1)],
        });
        commands.push(Command {
            name: format!("done{station}"),
            guard: and(guard_eq(STATION, station), guard_eq(SERVING, 1)),
            delay: Delay::Exponential {
                rate: Param::Value(1.0),
            },
            updates: vec![set(message(i), 0), set(SERVING, 0), set(STATION, next)],
        });
    }

    let first_served = StateFormula::Conjunction(vec![
        StateFormula::comparison(CmpOp::Eq, Expr::var(STATION), Expr::int(1)),
        StateFormula::comparison(CmpOp::Eq, Expr::var(SERVING), Expr::int(1)),
    ]);
    let first_waiting = StateFormula::comparison(CmpOp::Eq, Expr::var(message(0)), Expr::int(1));

    let properties = vec![
        NamedProperty {
            name: "poll1".into(),
            property: Property::new(StateFormula::probabilistic(
                0.5,
                false,
                PathFormula::eventually(first_served, 0.0, 10.0),
            )),
        },
        NamedProperty {
            name: "wait1".into(),
            property: Property::new(StateFormula::probabilistic(
                0.4,
                false,
                PathFormula::until(
                    StateFormula::truth(),
                    first_waiting,
                    0.0,
                    5.0,
                ),
            )),
        },
    ];

    (CompiledModel::new(vars, commands), properties)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratus_sim::State;

    #[test]
    fn test_tandem_initially_enabled() {
        let (model, properties) = tandem(5);
        assert_eq!(model.variables().len(), 2);
        assert!(model.any_enabled(&model.initial_values()).unwrap());
        assert_eq!(properties.len(), 2);
        assert_eq!(properties[0].property.num_probabilistic(), 1);
    }

    #[test]
    fn test_polling_has_weibull_service() {
        let (model, _) = polling(3);
        assert_eq!(model.variables().len(), 5);
        assert!(model
            .commands()
            .iter()
            .any(|c| matches!(c.delay, Delay::Weibull { .. })));
    }

    #[test]
    fn test_polling_simulates_without_deadlock() {
        use rand::SeedableRng;

        let (model, _) = polling(2);
        let mut rng = rand::rngs::StdRng::seed_from_u64(9);
        let mut state = State::initial(&model);
        for _ in 0..200 {
            state = stratus_sim::next_state(&model, &state, &mut rng).unwrap();
            assert!(!state.is_deadlocked());
        }
    }
}
