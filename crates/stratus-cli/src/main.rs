//! Command-line statistical model checker.
//!
//! Verifies a CSL property of a built-in model by acceptance sampling.
//! With `--port` the process also serves as a sample broker that remote
//! workers can join; with `--host` it runs as a worker for a remote
//! verifier instead of verifying anything itself.

mod models;

use clap::{Parser, ValueEnum};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use stratus_model::CompiledModel;
use stratus_net::{run_client, NetError, SampleBroker};
use stratus_sim::State;
use stratus_verify::{
    optimal_nested_error, Algorithm, SamplingParams, Session, StateFormula, VerifyError,
};

use models::NamedProperty;

#[derive(Debug, Error)]
enum CliError {
    #[error("verification failed: {0}")]
    Verify(#[from] VerifyError),

    #[error("network error: {0}")]
    Net(#[from] NetError),

    #[error("unsupported engine: {0}")]
    UnknownEngine(String),

    #[error("no property named {0}")]
    UnknownProperty(String),
}

type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SamplingAlgorithm {
    Fixed,
    Estimate,
    Ssp,
    Sprt,
}

impl From<SamplingAlgorithm> for Algorithm {
    fn from(value: SamplingAlgorithm) -> Algorithm {
        match value {
            SamplingAlgorithm::Fixed => Algorithm::Fixed,
            SamplingAlgorithm::Estimate => Algorithm::Estimate,
            SamplingAlgorithm::Ssp => Algorithm::Ssp,
            SamplingAlgorithm::Sprt => Algorithm::Sprt,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModelKind {
    Tandem,
    Polling,
}

#[derive(Parser)]
#[command(name = "stratus", version)]
#[command(about = "Statistical CSL model checker", long_about = None)]
struct Cli {
    /// Verification engine
    #[arg(long, default_value = "sampling")]
    engine: String,

    /// Probability of a false positive
    #[arg(long, default_value_t = 1e-2)]
    alpha: f64,

    /// Probability of a false negative
    #[arg(long, default_value_t = 1e-2)]
    beta: f64,

    /// Half-width of the indifference region
    #[arg(long, default_value_t = 1e-2)]
    delta: f64,

    /// Sample size for the fixed algorithm
    #[arg(long, default_value_t = 1000)]
    fixed_sample_size: u64,

    /// Acceptance-sampling algorithm
    #[arg(long, value_enum, default_value_t = SamplingAlgorithm::Sprt)]
    sampling_algorithm: SamplingAlgorithm,

    /// Reuse sample tallies across repeated states
    #[arg(long)]
    memoization: bool,

    /// Reject trajectories longer than this
    #[arg(long, default_value_t = 1_000_000)]
    max_path_length: u64,

    /// Serve samples to remote workers on this port while verifying
    #[arg(long)]
    port: Option<u16>,

    /// Run as a sampling worker for the verifier at this address
    #[arg(long, value_name = "HOST:PORT")]
    host: Option<String>,

    /// Number of independent verification runs
    #[arg(long, default_value_t = 1)]
    trials: u32,

    /// Seed for the random number generator
    #[arg(long)]
    seed: Option<u64>,

    /// Built-in model to check
    #[arg(long, value_enum, default_value_t = ModelKind::Tandem)]
    model: ModelKind,

    /// Model size: queue capacity or number of stations
    #[arg(long, default_value_t = 3)]
    size: i64,

    /// Property to verify (defaults to the model's first)
    #[arg(long)]
    property: Option<String>,

    /// Show verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();

    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> CliResult<()> {
    if cli.engine != "sampling" {
        return Err(CliError::UnknownEngine(cli.engine));
    }

    let (model, properties) = match cli.model {
        ModelKind::Tandem => models::tandem(cli.size),
        ModelKind::Polling => models::polling(cli.size),
    };
    let selected = select_property(&properties, cli.property.as_deref())?;

    let params = SamplingParams {
        algorithm: cli.sampling_algorithm.into(),
        delta: cli.delta,
        fixed_sample_size: cli.fixed_sample_size,
        memoization: cli.memoization,
        max_path_length: cli.max_path_length,
    };
    let seed = cli.seed.unwrap_or_else(rand::random);

    let property = &properties[selected];
    if let Some(host) = &cli.host {
        return serve_samples(host, &model, property, params, seed, cli.alpha, cli.beta);
    }

    info!(model = ?cli.model, property = %property.name, seed, "verifying");
    println!("{}", property.property.formula());

    let mut session = match cli.port {
        Some(port) => {
            let broker = SampleBroker::serve(&format!("0.0.0.0:{port}"))?;
            Session::with_source(
                params,
                property.property.num_probabilistic(),
                seed,
                Box::new(broker),
            )
        }
        None => Session::new(params, property.property.num_probabilistic(), seed),
    };

    let state = State::initial(&model);
    for trial in 0..cli.trials {
        let accept = property
            .property
            .verify(&model, &state, cli.alpha, cli.beta, &mut session)?;
        let verdict = if accept { "accepted" } else { "rejected" };
        println!("trial {}: property {verdict}", trial + 1);
        session.clear_cache();
    }

    let stats = &session.stats;
    println!("samples:     {}", stats.sample_size);
    println!("path length: {}", stats.path_length);
    println!("time (s):    {}", stats.elapsed);
    Ok(())
}

fn select_property(properties: &[NamedProperty], name: Option<&str>) -> CliResult<usize> {
    match name {
        None => Ok(0),
        Some(name) => properties
            .iter()
            .position(|p| p.name == name)
            .ok_or_else(|| CliError::UnknownProperty(name.into())),
    }
}

/// Worker role: simulate path samples for the operator indices a remote
/// verifier asks for. Both sides are launched with the same model,
/// property, and sampling flags, so the operator table and the nested
/// error bounds computed here match the server's.
fn serve_samples(
    host: &str,
    model: &CompiledModel,
    property: &NamedProperty,
    params: SamplingParams,
    seed: u64,
    alpha: f64,
    beta: f64,
) -> CliResult<()> {
    let algorithm = params.algorithm;
    let delta = params.delta;
    let mut session = Session::new(params, property.property.num_probabilistic(), seed);
    let state = State::initial(model);
    let exit_rate = model
        .exit_rate_bound()
        .map_err(VerifyError::from)?;

    run_client(host, |index| {
        let node = property
            .property
            .find_probabilistic(index as usize)
            .ok_or_else(|| NetError::Protocol(format!("no operator with index {index}")))?;
        let StateFormula::Probabilistic {
            threshold, path, ..
        } = node
        else {
            return Err(NetError::Protocol(format!(
                "index {index} is not a probabilistic operator"
            )));
        };
        let nested =
            optimal_nested_error(path, *threshold, exit_rate, delta, alpha, beta, algorithm);
        path.sample(model, &state, nested, nested, &mut session)
            .map_err(|err| NetError::Sample(err.to_string()))
    })?;
    Ok(())
}
