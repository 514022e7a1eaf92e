//! Statistical verification of CSL formulas.
//!
//! Compound state formulas split their error budget across children and
//! short-circuit; probabilistic operators run an acceptance-sampling test
//! over simulated trajectories. All tests guarantee that the probability of
//! accepting a false formula is at most `alpha` and of rejecting a true one
//! at most `beta`, provided the true probability lies outside the
//! indifference region around the threshold.

use std::time::Instant;

use tracing::debug;

use stratus_model::{eval, CompiledModel};
use stratus_sim::{next_state, State};
use stratus_stats::{tinv, SingleSamplingPlan};

use crate::effort::{error_bounds, optimal_nested_error};
use crate::formula::{PathFormula, Property, StateFormula};
use crate::session::{
    Algorithm, CacheEntry, LocalSampler, SampleSource, Session, VerifyResult,
};

impl Property {
    /// Verifies the property in `state`, recording elapsed time in the
    /// session statistics.
    pub fn verify(
        &self,
        model: &CompiledModel,
        state: &State,
        alpha: f64,
        beta: f64,
        session: &mut Session,
    ) -> VerifyResult<bool> {
        let start = Instant::now();
        let accept = self.formula().verify(model, state, alpha, beta, session)?;
        session
            .stats
            .elapsed
            .add_observation(start.elapsed().as_secs_f64());
        Ok(accept)
    }
}

impl StateFormula {
    pub fn verify(
        &self,
        model: &CompiledModel,
        state: &State,
        alpha: f64,
        beta: f64,
        session: &mut Session,
    ) -> VerifyResult<bool> {
        match self {
            StateFormula::Conjunction(children) => {
                let n = children.len().max(1) as f64;
                for child in children.iter().rev() {
                    if !child.verify(model, state, alpha / n, beta / n, session)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            StateFormula::Disjunction(children) => {
                let n = children.len().max(1) as f64;
                for child in children.iter().rev() {
                    if child.verify(model, state, alpha / n, beta / n, session)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            StateFormula::Negation(operand) => {
                Ok(!operand.verify(model, state, beta, alpha, session)?)
            }
            StateFormula::Implication(antecedent, consequent) => {
                // a => b is !a | b: test the negated antecedent first on
                // half the budget, the consequent on the other half.
                if !antecedent.verify(model, state, beta / 2.0, alpha / 2.0, session)? {
                    return Ok(true);
                }
                consequent.verify(model, state, alpha / 2.0, beta / 2.0, session)
            }
            StateFormula::Comparison { op, left, right } => {
                let l = eval(left, &state.values)?;
                let r = eval(right, &state.values)?;
                Ok(op.apply(l, r))
            }
            StateFormula::Probabilistic {
                threshold,
                strict,
                path,
                cache_id,
            } => {
                session.depth += 1;
                let result = run_probabilistic(
                    *threshold, *strict, path, *cache_id, model, state, alpha, beta, session,
                );
                session.depth -= 1;
                result
            }
        }
    }
}

impl PathFormula {
    /// Simulates one trajectory from `init` and decides whether it satisfies
    /// the path formula. Nested state formulas are verified with error
    /// bounds `alpha` and `beta`.
    pub fn sample(
        &self,
        model: &CompiledModel,
        init: &State,
        alpha: f64,
        beta: f64,
        session: &mut Session,
    ) -> VerifyResult<bool> {
        let PathFormula::Until {
            pre,
            post,
            min_time,
            max_time,
        } = self;
        let mut state = init.restarted();
        let mut length: u64 = 0;
        let accept = loop {
            if length > session.params.max_path_length {
                break false;
            }
            if state.time >= *min_time {
                if post.verify(model, &state, alpha, beta, session)? {
                    break true;
                }
                if !pre.verify(model, &state, beta, alpha, session)? {
                    break false;
                }
            } else {
                if !pre.verify(model, &state, beta, alpha, session)? {
                    break false;
                }
                if post.verify(model, &state, alpha, beta, session)? {
                    // The trajectory holds its state until the next
                    // transition, so the postcondition is satisfied at
                    // min_time itself if no transition intervenes.
                    let next = next_state(model, &state, &mut session.rng)?;
                    length += 1;
                    if *min_time < next.time {
                        break true;
                    }
                    state = next;
                    continue;
                }
            }
            let next = next_state(model, &state, &mut session.rng)?;
            length += 1;
            if next.time > *max_time {
                break false;
            }
            state = next;
        };
        if session.depth == 1 {
            session.stats.path_length.add_observation(length as f64);
        }
        Ok(accept)
    }
}

#[allow(clippy::too_many_arguments)]
fn run_probabilistic(
    threshold: f64,
    strict: bool,
    path: &PathFormula,
    cache_id: usize,
    model: &CompiledModel,
    state: &State,
    alpha: f64,
    beta: f64,
    session: &mut Session,
) -> VerifyResult<bool> {
    let algorithm = session.params.algorithm;
    let delta = session.params.delta;
    let nested = if path.has_probabilistic() {
        optimal_nested_error(
            path,
            threshold,
            model.exit_rate_bound()?,
            delta,
            alpha,
            beta,
            algorithm,
        )
    } else {
        0.0
    };
    let (p0, p1) = error_bounds(threshold, delta, nested);

    // Only the outermost operator draws from the session's sample source;
    // nested verifications always simulate locally since their start states
    // are not known to remote workers.
    let outermost = session.depth == 1;
    let mut remote = if outermost {
        let mut source = std::mem::replace(&mut session.source, Box::new(LocalSampler));
        if let Err(err) = source.start(cache_id) {
            session.source = source;
            return Err(err);
        }
        Some(source)
    } else {
        None
    };
    let mut fallback = LocalSampler;
    let source: &mut dyn SampleSource = match remote.as_mut() {
        Some(boxed) => boxed.as_mut(),
        None => &mut fallback,
    };

    let result = run_test(
        threshold, strict, path, cache_id, model, state, alpha, beta, p0, p1, nested, session,
        source,
    );

    if let Some(mut source) = remote {
        let stopped = source.stop();
        session.source = source;
        let accept = result?;
        stopped?;
        Ok(accept)
    } else {
        result
    }
}

#[allow(clippy::too_many_arguments)]
fn run_test(
    threshold: f64,
    strict: bool,
    path: &PathFormula,
    cache_id: usize,
    model: &CompiledModel,
    state: &State,
    alpha: f64,
    beta: f64,
    p0: f64,
    p1: f64,
    nested: f64,
    session: &mut Session,
    source: &mut dyn SampleSource,
) -> VerifyResult<bool> {
    let algorithm = session.params.algorithm;
    let cached = session.cached(cache_id, &state.values);
    let mut count = cached.count;
    let mut new_draws: u64 = 0;

    let mut draw = |session: &mut Session| -> VerifyResult<bool> {
        let mut local = || path.sample(model, state, nested, nested, session);
        source.next_sample(&mut local)
    };

    let (accept, stat) = match algorithm {
        Algorithm::Fixed => {
            let n = session.params.fixed_sample_size;
            let mut successes = cached.stat as u64;
            while count < n {
                if draw(session)? {
                    successes += 1;
                }
                count += 1;
                new_draws += 1;
            }
            let proportion = successes as f64 / count as f64;
            let accept = if strict {
                proportion > threshold
            } else {
                proportion >= threshold
            };
            (accept, successes as f64)
        }
        Algorithm::Estimate => {
            let mut successes = cached.stat as u64;
            loop {
                if count >= 2 {
                    let p = successes as f64 / count as f64;
                    let variance = p * (1.0 - p) * count as f64 / (count - 1) as f64;
                    let t = tinv(1.0 - alpha / 2.0, count - 1);
                    if t * t * variance / count as f64 <= delta_squared(session) {
                        break;
                    }
                }
                if draw(session)? {
                    successes += 1;
                }
                count += 1;
                new_draws += 1;
            }
            let proportion = successes as f64 / count as f64;
            let accept = if strict {
                proportion > threshold
            } else {
                proportion >= threshold
            };
            (accept, successes as f64)
        }
        Algorithm::Ssp => {
            let plan = SingleSamplingPlan::create(p0, p1, alpha, beta)?;
            let mut successes = cached.stat as u64;
            let accept = loop {
                if successes > plan.c {
                    break true;
                }
                if successes + plan.n.saturating_sub(count) <= plan.c {
                    break false;
                }
                if draw(session)? {
                    successes += 1;
                }
                count += 1;
                new_draws += 1;
            };
            (accept, successes as f64)
        }
        Algorithm::Sprt => {
            let log_a = -alpha.ln() + if p1 > 0.0 { (1.0 - beta).ln() } else { 0.0 };
            let log_b = beta.ln() - if p0 < 1.0 { (1.0 - alpha).ln() } else { 0.0 };
            let success_step = (p1 / p0).ln();
            let failure_step = ((1.0 - p1) / (1.0 - p0)).ln();
            let mut llr = cached.stat;
            while log_b < llr && llr < log_a {
                let step = if draw(session)? {
                    success_step
                } else {
                    failure_step
                };
                if step.is_infinite() {
                    llr = step;
                } else {
                    llr += step;
                }
                count += 1;
                new_draws += 1;
            }
            (llr <= log_b, llr)
        }
    };

    session.store(cache_id, &state.values, CacheEntry { count, stat });
    if session.depth == 1 {
        session.stats.sample_size.add_observation(new_draws as f64);
    }
    debug!(
        %algorithm,
        samples = new_draws,
        cached = cached.count,
        accept,
        "sampling campaign finished"
    );
    Ok(accept)
}

fn delta_squared(session: &Session) -> f64 {
    session.params.delta * session.params.delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::CmpOp;
    use crate::session::SamplingParams;
    use stratus_model::{Command, Delay, Expr, Param, Update, VarDecl};

    fn single_command_model(rate: f64) -> CompiledModel {
        // One counter driven by an exponential clock.
        let vars = vec![VarDecl {
            name: "n".into(),
            index: 0,
            low: 0,
            high: 1_000_000,
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
                expr: Expr::binary(
                    stratus_model::BinOp::Add,
                    Expr::var(0),
                    Expr::int(1),
                ),
            }],
        }];
        CompiledModel::new(vars, commands)
    }

    fn session(algorithm: Algorithm, seed: u64) -> Session {
        let params = SamplingParams {
            algorithm,
            ..SamplingParams::default()
        };
        Session::new(params, 4, seed)
    }

    fn eventually_tick(threshold: f64) -> Property {
        // P{>= threshold}[ F[0,1] n >= 1 ]
        Property::new(StateFormula::probabilistic(
            threshold,
            false,
            PathFormula::eventually(
                StateFormula::comparison(CmpOp::Ge, Expr::var(0), Expr::int(1)),
                0.0,
                1.0,
            ),
        ))
    }

    #[test]
    fn test_comparison_is_exact() {
        let model = single_command_model(1.0);
        let state = State::initial(&model);
        let f = StateFormula::comparison(CmpOp::Eq, Expr::var(0), Expr::int(0));
        let mut session = session(Algorithm::Ssp, 1);
        assert!(f.verify(&model, &state, 0.01, 0.01, &mut session).unwrap());
        assert_eq!(session.stats.sample_size.count(), 0);
    }

    #[test]
    fn test_sprt_accepts_likely_property() {
        // With rate 5 the chance of no event in [0,1] is e^-5, so
        // P >= 0.5 of an event is comfortably true.
        let model = single_command_model(5.0);
        let state = State::initial(&model);
        let property = eventually_tick(0.5);
        let mut session = session(Algorithm::Sprt, 7);
        let accept = property
            .verify(&model, &state, 0.01, 0.01, &mut session)
            .unwrap();
        assert!(accept);
    }

    #[test]
    fn test_sprt_rejects_unlikely_property() {
        // P >= 0.99 of an event with rate 0.1 in [0,1] is false.
        let model = single_command_model(0.1);
        let state = State::initial(&model);
        let property = eventually_tick(0.99);
        let mut session = session(Algorithm::Sprt, 7);
        let accept = property
            .verify(&model, &state, 0.01, 0.01, &mut session)
            .unwrap();
        assert!(!accept);
    }

    #[test]
    fn test_sprt_saturates_on_degenerate_p1() {
        // threshold - delta <= 0 pushes p1 to 0, making a single success
        // decisive. The log likelihood ratio must pin at -inf rather than
        // wander back.
        let model = single_command_model(5.0);
        let state = State::initial(&model);
        let params = SamplingParams {
            algorithm: Algorithm::Sprt,
            delta: 0.01,
            ..SamplingParams::default()
        };
        let mut session = Session::new(params, 1, 3);
        let property = eventually_tick(0.005);
        let accept = property
            .verify(&model, &state, 0.01, 0.01, &mut session)
            .unwrap();
        assert!(accept);
        // One success ends the test.
        assert!(session.stats.sample_size.max() <= 40.0);
    }

    #[test]
    fn test_fixed_uses_exactly_configured_samples() {
        let model = single_command_model(5.0);
        let state = State::initial(&model);
        let params = SamplingParams {
            algorithm: Algorithm::Fixed,
            fixed_sample_size: 200,
            ..SamplingParams::default()
        };
        let mut session = Session::new(params, 1, 11);
        let property = eventually_tick(0.5);
        let accept = property
            .verify(&model, &state, 0.01, 0.01, &mut session)
            .unwrap();
        assert!(accept);
        assert_eq!(session.stats.sample_size.mean(), 200.0);
    }

    #[test]
    fn test_estimate_stops_and_accepts() {
        let model = single_command_model(5.0);
        let state = State::initial(&model);
        let params = SamplingParams {
            algorithm: Algorithm::Estimate,
            delta: 0.05,
            ..SamplingParams::default()
        };
        let mut session = Session::new(params, 1, 13);
        let property = eventually_tick(0.5);
        let accept = property
            .verify(&model, &state, 0.05, 0.05, &mut session)
            .unwrap();
        assert!(accept);
        assert!(session.stats.sample_size.mean() >= 2.0);
    }

    #[test]
    fn test_memoization_skips_resampling() {
        let model = single_command_model(5.0);
        let state = State::initial(&model);
        let params = SamplingParams {
            algorithm: Algorithm::Ssp,
            memoization: true,
            ..SamplingParams::default()
        };
        let mut session = Session::new(params, 1, 17);
        let property = eventually_tick(0.5);

        let first = property
            .verify(&model, &state, 0.01, 0.01, &mut session)
            .unwrap();
        let drawn = session.stats.sample_size.mean();
        assert!(first);
        assert!(drawn > 0.0);

        let second = property
            .verify(&model, &state, 0.01, 0.01, &mut session)
            .unwrap();
        assert!(second);
        // The cached tally already decided the test.
        assert_eq!(session.stats.sample_size.min(), 0.0);
        assert_eq!(session.stats.sample_size.count(), 2);

        session.clear_cache();
        let third = property
            .verify(&model, &state, 0.01, 0.01, &mut session)
            .unwrap();
        assert!(third);
        assert!(session.stats.sample_size.min() == 0.0);
        assert!(session.stats.sample_size.max() > 0.0);
    }

    #[test]
    fn test_negation_flips_result() {
        let model = single_command_model(5.0);
        let state = State::initial(&model);
        let property = Property::new(StateFormula::negation(StateFormula::probabilistic(
            0.5,
            false,
            PathFormula::eventually(
                StateFormula::comparison(CmpOp::Ge, Expr::var(0), Expr::int(1)),
                0.0,
                1.0,
            ),
        )));
        let mut session = session(Algorithm::Sprt, 19);
        let accept = property
            .verify(&model, &state, 0.01, 0.01, &mut session)
            .unwrap();
        assert!(!accept);
    }

    #[test]
    fn test_implication_short_circuits_on_false_antecedent() {
        let model = single_command_model(5.0);
        let state = State::initial(&model);
        // Antecedent is statically false, so the probabilistic consequent
        // must never sample.
        let property = Property::new(StateFormula::implication(
            StateFormula::comparison(CmpOp::Eq, Expr::var(0), Expr::int(7)),
            eventually_tick(0.5).formula().clone(),
        ));
        let mut session = session(Algorithm::Sprt, 23);
        let accept = property
            .verify(&model, &state, 0.01, 0.01, &mut session)
            .unwrap();
        assert!(accept);
        assert_eq!(session.stats.sample_size.count(), 0);
    }

    #[test]
    fn test_path_lengths_recorded_at_top_level() {
        let model = single_command_model(5.0);
        let state = State::initial(&model);
        let property = eventually_tick(0.5);
        let mut session = session(Algorithm::Sprt, 29);
        property
            .verify(&model, &state, 0.01, 0.01, &mut session)
            .unwrap();
        assert!(session.stats.path_length.count() > 0);
        assert!(session.stats.path_length.mean() >= 0.0);
    }

    #[test]
    fn test_until_rejects_on_failed_precondition() {
        // pre: n = 0, post: n >= 3. The first tick breaks pre before
        // post can hold, so every sample rejects and P >= 0.4 fails.
        let model = single_command_model(5.0);
        let state = State::initial(&model);
        let property = Property::new(StateFormula::probabilistic(
            0.4,
            false,
            PathFormula::until(
                StateFormula::comparison(CmpOp::Eq, Expr::var(0), Expr::int(0)),
                StateFormula::comparison(CmpOp::Ge, Expr::var(0), Expr::int(3)),
                0.0,
                10.0,
            ),
        ));
        let mut session = session(Algorithm::Sprt, 31);
        let accept = property
            .verify(&model, &state, 0.01, 0.01, &mut session)
            .unwrap();
        assert!(!accept);
    }

    #[test]
    fn test_deterministic_given_seed() {
        let model = single_command_model(2.0);
        let state = State::initial(&model);
        let property = eventually_tick(0.8);
        let mut a = session(Algorithm::Sprt, 42);
        let mut b = session(Algorithm::Sprt, 42);
        let ra = property.verify(&model, &state, 0.01, 0.01, &mut a).unwrap();
        let rb = property.verify(&model, &state, 0.01, 0.01, &mut b).unwrap();
        assert_eq!(ra, rb);
        assert_eq!(
            a.stats.sample_size.mean(),
            b.stats.sample_size.mean()
        );
    }
}
