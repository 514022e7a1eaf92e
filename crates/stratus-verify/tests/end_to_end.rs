//! End-to-end verification runs against small continuous-time models.

use stratus_model::{BinOp, Command, CompiledModel, Delay, Expr, Param, Update, VarDecl};
use stratus_sim::State;
use stratus_stats::SingleSamplingPlan;
use stratus_verify::{
    Algorithm, CmpOp, PathFormula, Property, SamplingParams, Session, StateFormula,
};

/// A single exponential clock incrementing a counter.
fn counter_model(rate: f64) -> CompiledModel {
    let vars = vec![VarDecl {
        name: "n".into(),
        index: 0,
        low: 0,
        high: i64::MAX,
        init: 0,
    }];
    let commands = vec![Command {
        name: "tick".into(),
        guard: Expr::truth(),
        delay: Delay::Exponential {
            rate: Param::Value(rate),
        },
        updates: vec![Update {
            variable: 0,
            expr: Expr::binary(BinOp::Add, Expr::var(0), Expr::int(1)),
        }],
    }];
    CompiledModel::new(vars, commands)
}

/// Two exponential commands racing to claim a flag. The faster one wins
/// with probability `fast / (fast + slow)`.
fn race_model(slow: f64, fast: f64) -> CompiledModel {
    let vars = vec![VarDecl {
        name: "winner".into(),
        index: 0,
        low: 0,
        high: 2,
        init: 0,
    }];
    let unclaimed = Expr::binary(BinOp::Eq, Expr::var(0), Expr::int(0));
    let commands = vec![
        Command {
            name: "slow".into(),
            guard: unclaimed.clone(),
            delay: Delay::Exponential {
                rate: Param::Value(slow),
            },
            updates: vec![Update {
                variable: 0,
                expr: Expr::int(1),
            }],
        },
        Command {
            name: "fast".into(),
            guard: unclaimed,
            delay: Delay::Exponential {
                rate: Param::Value(fast),
            },
            updates: vec![Update {
                variable: 0,
                expr: Expr::int(2),
            }],
        },
    ];
    CompiledModel::new(vars, commands)
}

fn params(algorithm: Algorithm, delta: f64) -> SamplingParams {
    SamplingParams {
        algorithm,
        delta,
        ..SamplingParams::default()
    }
}

#[test]
fn test_ssp_accepts_with_early_termination() {
    // P(an event in [0,1]) = 1 - e^-5, far above the 0.5 threshold, so
    // the plan should accept as soon as c + 1 successes are in.
    let model = counter_model(5.0);
    let state = State::initial(&model);
    let property = Property::new(StateFormula::probabilistic(
        0.5,
        false,
        PathFormula::eventually(
            StateFormula::comparison(CmpOp::Ge, Expr::var(0), Expr::int(1)),
            0.0,
            1.0,
        ),
    ));
    let mut session = Session::new(params(Algorithm::Ssp, 0.01), 1, 101);
    let accept = property
        .verify(&model, &state, 0.01, 0.01, &mut session)
        .unwrap();
    assert!(accept);

    let plan = SingleSamplingPlan::create(0.51, 0.49, 0.01, 0.01).unwrap();
    let drawn = session.stats.sample_size.mean();
    assert!(drawn >= (plan.c + 1) as f64);
    assert!(drawn < plan.n as f64, "no early termination: {drawn}");
}

#[test]
fn test_sprt_decides_race_on_both_sides() {
    // The fast command wins with probability 3/5.
    let model = race_model(2.0, 3.0);
    let state = State::initial(&model);
    let won = StateFormula::comparison(CmpOp::Eq, Expr::var(0), Expr::int(2));

    let below = Property::new(StateFormula::probabilistic(
        0.5,
        false,
        PathFormula::eventually(won.clone(), 0.0, 10.0),
    ));
    let mut session = Session::new(params(Algorithm::Sprt, 0.01), 1, 202);
    assert!(below
        .verify(&model, &state, 0.01, 0.01, &mut session)
        .unwrap());

    let above = Property::new(StateFormula::probabilistic(
        0.7,
        false,
        PathFormula::eventually(won, 0.0, 10.0),
    ));
    let mut session = Session::new(params(Algorithm::Sprt, 0.01), 1, 202);
    assert!(!above
        .verify(&model, &state, 0.01, 0.01, &mut session)
        .unwrap());
}

#[test]
fn test_sprt_race_deterministic_for_fixed_seed() {
    let model = race_model(2.0, 3.0);
    let state = State::initial(&model);
    let property = Property::new(StateFormula::probabilistic(
        0.55,
        false,
        PathFormula::eventually(
            StateFormula::comparison(CmpOp::Eq, Expr::var(0), Expr::int(2)),
            0.0,
            10.0,
        ),
    ));
    let mut counts = Vec::new();
    for _ in 0..2 {
        let mut session = Session::new(params(Algorithm::Sprt, 0.01), 1, 77);
        property
            .verify(&model, &state, 0.01, 0.01, &mut session)
            .unwrap();
        counts.push(session.stats.sample_size.mean());
    }
    assert_eq!(counts[0], counts[1]);
}

#[test]
fn test_nested_probabilistic_operator() {
    // The inner operator holds in every state (an event in any half unit
    // of time is near certain), so the outer one reduces to certainty.
    let model = counter_model(5.0);
    let state = State::initial(&model);
    let inner = StateFormula::probabilistic(
        0.5,
        false,
        PathFormula::eventually(
            StateFormula::comparison(CmpOp::Ge, Expr::var(0), Expr::int(1)),
            0.0,
            0.5,
        ),
    );
    let property = Property::new(StateFormula::probabilistic(
        0.3,
        false,
        PathFormula::eventually(inner, 0.0, 1.0),
    ));
    assert_eq!(property.num_probabilistic(), 2);

    let mut session = Session::new(params(Algorithm::Sprt, 0.05), 2, 303);
    let accept = property
        .verify(&model, &state, 0.05, 0.05, &mut session)
        .unwrap();
    assert!(accept);
}

#[test]
fn test_trials_reuse_session_statistics() {
    let model = race_model(2.0, 3.0);
    let state = State::initial(&model);
    let property = Property::new(StateFormula::probabilistic(
        0.5,
        false,
        PathFormula::eventually(
            StateFormula::comparison(CmpOp::Eq, Expr::var(0), Expr::int(2)),
            0.0,
            10.0,
        ),
    ));
    let mut session = Session::new(params(Algorithm::Sprt, 0.01), 1, 404);
    for _ in 0..5 {
        property
            .verify(&model, &state, 0.01, 0.01, &mut session)
            .unwrap();
    }
    assert_eq!(session.stats.sample_size.count(), 5);
    assert_eq!(session.stats.elapsed.count(), 5);
    assert!(session.stats.path_length.count() >= 5);
    assert!(session.stats.sample_size.stddev() >= 0.0);
}
