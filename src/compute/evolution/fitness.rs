//! Fitness oracle contract, result aggregation and timeout-contained calls.
//!
//! The oracle is an external collaborator: it turns a probability genome into
//! concrete heuristics, runs them on a problem and reports costs. The engine
//! only sees the tagged [`FitnessResult`] and reduces it to one scalar.

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::schema::{AggregationStrategy, InnerSample, ProbabilityGenome};

/// A heuristic reported by the oracle together with its cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Human-readable heuristic description.
    pub heuristic: String,
    /// Cost (or score) of the heuristic on the problem.
    pub cost: f64,
}

impl Sample {
    pub fn new(heuristic: impl Into<String>, cost: f64) -> Self {
        Self {
            heuristic: heuristic.into(),
            cost,
        }
    }
}

/// Oracle output. Sample lists are ordered best-first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum FitnessResult {
    /// A single fitness value.
    Scalar(f64),
    /// Several scored heuristics.
    SampleList(Vec<Sample>),
    /// Best heuristics plus the oracle's per-inner-generation history.
    HistoryRecord {
        best: Vec<Sample>,
        history: Vec<Vec<Sample>>,
    },
}

impl FitnessResult {
    /// Reduce the result to one finite scalar.
    pub fn aggregate(&self, strategy: &AggregationStrategy) -> Result<f64, AggregationError> {
        let samples = match self {
            Self::Scalar(value) => return finite(*value),
            Self::SampleList(samples) => samples,
            Self::HistoryRecord { best, .. } => best,
        };

        let first = samples.first().ok_or(AggregationError::EmptySamples)?;
        for sample in samples {
            finite(sample.cost)?;
        }

        let value = match strategy {
            AggregationStrategy::Identity => first.cost,
            AggregationStrategy::Mean => {
                samples.iter().map(|s| s.cost).sum::<f64>() / samples.len() as f64
            }
            AggregationStrategy::Min => samples
                .iter()
                .map(|s| s.cost)
                .fold(f64::INFINITY, f64::min),
            AggregationStrategy::Discounted { decay, depth } => {
                let mut weight = 1.0;
                let mut total = 0.0;
                let mut norm = 0.0;
                for sample in samples.iter().take(*depth) {
                    total += weight * sample.cost;
                    norm += weight;
                    weight *= decay;
                }
                total / norm
            }
        };

        finite(value)
    }

    /// Flatten the inner history into rows, if the oracle reported one.
    pub fn history(&self) -> Vec<InnerSample> {
        let Self::HistoryRecord { history, .. } = self else {
            return Vec::new();
        };
        history
            .iter()
            .enumerate()
            .flat_map(|(inner_generation, samples)| {
                samples.iter().map(move |s| InnerSample {
                    inner_generation,
                    heuristic: s.heuristic.clone(),
                    cost: s.cost,
                })
            })
            .collect()
    }
}

/// Combine the per-call scalars of a multi-sample member.
///
/// `Min` keeps the best call; every other strategy averages.
pub fn combine_samples(
    values: &[f64],
    strategy: &AggregationStrategy,
) -> Result<f64, AggregationError> {
    if values.is_empty() {
        return Err(AggregationError::EmptySamples);
    }
    let value = match strategy {
        AggregationStrategy::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
        _ => values.iter().sum::<f64>() / values.len() as f64,
    };
    finite(value)
}

fn finite(value: f64) -> Result<f64, AggregationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(AggregationError::NonFinite(value))
    }
}

/// Per-call inputs handed to the oracle.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    /// Outer generation index.
    pub generation: usize,
    /// Population index of the member being evaluated.
    pub member: usize,
    /// Sample index when a member is evaluated several times.
    pub sample: usize,
    /// Seed for the oracle's own randomness.
    pub seed: u64,
    /// Time the oracle may spend.
    pub budget: Duration,
}

/// Black-box fitness evaluator.
///
/// Calls may be slow and non-deterministic. Each call runs on its own thread,
/// so implementations must be shareable across threads.
pub trait FitnessOracle: Send + Sync + 'static {
    /// Opaque problem instance passed through from the [`ProblemSource`].
    type Problem: Send + Sync + 'static;

    /// Score one genome on one problem.
    fn evaluate(
        &self,
        problem: &Self::Problem,
        genome: &ProbabilityGenome,
        ctx: &EvaluationContext,
    ) -> Result<FitnessResult, OracleError>;
}

/// Loader for named problem instances.
pub trait ProblemSource {
    type Problem;

    fn load_problem(&self, name: &str) -> Result<Self::Problem, OracleError>;
}

/// Failure reported by an oracle or problem source.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct OracleError {
    message: String,
}

impl OracleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Oracle payload that cannot be reduced to a fitness value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AggregationError {
    #[error("Oracle returned no samples")]
    EmptySamples,
    #[error("Oracle returned a non-finite value ({0})")]
    NonFinite(f64),
}

/// Result of one bounded oracle call.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Completed(FitnessResult),
    TimedOut,
}

/// Run one oracle call on a dedicated thread and wait at most `timeout`.
///
/// A call that overruns is detached: its thread is never joined and keeps
/// running until the oracle returns, so an oracle that never returns leaks
/// one OS thread per timed-out call. Its eventual result is dropped. A
/// panicking oracle surfaces as an [`OracleError`].
pub fn evaluate_with_timeout<O: FitnessOracle>(
    oracle: &Arc<O>,
    problem: &Arc<O::Problem>,
    genome: &ProbabilityGenome,
    ctx: EvaluationContext,
    timeout: Duration,
) -> Result<Outcome, OracleError> {
    let (tx, rx) = mpsc::channel();
    let name = format!("oracle-g{}-m{}-s{}", ctx.generation, ctx.member, ctx.sample);
    let oracle = Arc::clone(oracle);
    let problem = Arc::clone(problem);
    let genome = genome.clone();

    thread::Builder::new()
        .name(name)
        .spawn(move || {
            let result = oracle.evaluate(&problem, &genome, &ctx);
            // The receiver is gone if the call already timed out.
            let _ = tx.send(result);
        })
        .map_err(|e| OracleError::new(format!("failed to spawn oracle thread: {e}")))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result.map(Outcome::Completed),
        Err(RecvTimeoutError::Timeout) => Ok(Outcome::TimedOut),
        Err(RecvTimeoutError::Disconnected) => Err(OracleError::new("oracle thread panicked")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Grammar;

    fn samples(costs: &[f64]) -> Vec<Sample> {
        costs
            .iter()
            .enumerate()
            .map(|(i, &c)| Sample::new(format!("h{i}"), c))
            .collect()
    }

    fn ctx() -> EvaluationContext {
        EvaluationContext {
            generation: 0,
            member: 0,
            sample: 0,
            seed: 7,
            budget: Duration::from_millis(10),
        }
    }

    #[test]
    fn test_scalar_passes_through() {
        let result = FitnessResult::Scalar(3.5);
        for strategy in [
            AggregationStrategy::Identity,
            AggregationStrategy::Mean,
            AggregationStrategy::Min,
            AggregationStrategy::Discounted {
                decay: 0.8,
                depth: 10,
            },
        ] {
            assert_eq!(result.aggregate(&strategy), Ok(3.5));
        }
    }

    #[test]
    fn test_sample_list_strategies() {
        let result = FitnessResult::SampleList(samples(&[2.0, 4.0, 9.0]));
        assert_eq!(result.aggregate(&AggregationStrategy::Identity), Ok(2.0));
        assert_eq!(result.aggregate(&AggregationStrategy::Mean), Ok(5.0));
        assert_eq!(result.aggregate(&AggregationStrategy::Min), Ok(2.0));

        let discounted = result
            .aggregate(&AggregationStrategy::Discounted {
                decay: 0.5,
                depth: 2,
            })
            .unwrap();
        // (1.0 * 2 + 0.5 * 4) / 1.5
        assert!((discounted - 4.0 / 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_history_record_uses_best() {
        let result = FitnessResult::HistoryRecord {
            best: samples(&[1.0, 3.0]),
            history: vec![samples(&[5.0, 6.0]), samples(&[1.0])],
        };
        assert_eq!(result.aggregate(&AggregationStrategy::Mean), Ok(2.0));

        let rows = result.history();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].inner_generation, 1);
        assert_eq!(rows[2].cost, 1.0);
    }

    #[test]
    fn test_unusable_payloads() {
        let empty = FitnessResult::SampleList(Vec::new());
        assert_eq!(
            empty.aggregate(&AggregationStrategy::Mean),
            Err(AggregationError::EmptySamples)
        );

        let nan = FitnessResult::SampleList(samples(&[1.0, f64::NAN]));
        assert!(matches!(
            nan.aggregate(&AggregationStrategy::Identity),
            Err(AggregationError::NonFinite(_))
        ));

        let inf = FitnessResult::Scalar(f64::INFINITY);
        assert!(inf.aggregate(&AggregationStrategy::Mean).is_err());
    }

    #[test]
    fn test_combine_samples() {
        assert_eq!(
            combine_samples(&[3.0, 1.0, 2.0], &AggregationStrategy::Min),
            Ok(1.0)
        );
        assert_eq!(
            combine_samples(&[3.0, 1.0, 2.0], &AggregationStrategy::Identity),
            Ok(2.0)
        );
        assert_eq!(
            combine_samples(&[], &AggregationStrategy::Mean),
            Err(AggregationError::EmptySamples)
        );
    }

    #[test]
    fn test_result_serialization() {
        let result = FitnessResult::SampleList(samples(&[1.5]));
        let json = serde_json::to_string(&result).unwrap();
        let parsed: FitnessResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, result);
    }

    enum Behavior {
        Return(f64),
        Sleep(Duration),
        Fail,
        Panic,
    }

    struct StubOracle(Behavior);

    impl FitnessOracle for StubOracle {
        type Problem = ();

        fn evaluate(
            &self,
            _problem: &(),
            _genome: &ProbabilityGenome,
            _ctx: &EvaluationContext,
        ) -> Result<FitnessResult, OracleError> {
            match &self.0 {
                Behavior::Return(v) => Ok(FitnessResult::Scalar(*v)),
                Behavior::Sleep(d) => {
                    thread::sleep(*d);
                    Ok(FitnessResult::Scalar(0.0))
                }
                Behavior::Fail => Err(OracleError::new("solver crashed")),
                Behavior::Panic => panic!("oracle bug"),
            }
        }
    }

    fn call(behavior: Behavior, timeout: Duration) -> Result<Outcome, OracleError> {
        let genome = ProbabilityGenome::uniform(&Grammar::default()).unwrap();
        evaluate_with_timeout(
            &Arc::new(StubOracle(behavior)),
            &Arc::new(()),
            &genome,
            ctx(),
            timeout,
        )
    }

    #[test]
    fn test_completed_call() {
        let outcome = call(Behavior::Return(4.0), Duration::from_secs(5)).unwrap();
        assert_eq!(outcome, Outcome::Completed(FitnessResult::Scalar(4.0)));
    }

    #[test]
    fn test_slow_call_times_out() {
        let outcome = call(
            Behavior::Sleep(Duration::from_millis(500)),
            Duration::from_millis(20),
        )
        .unwrap();
        assert_eq!(outcome, Outcome::TimedOut);
    }

    #[test]
    fn test_timed_out_thread_outlives_call() {
        let oracle = Arc::new(StubOracle(Behavior::Sleep(Duration::from_millis(200))));
        let genome = ProbabilityGenome::uniform(&Grammar::default()).unwrap();
        let outcome = evaluate_with_timeout(
            &oracle,
            &Arc::new(()),
            &genome,
            ctx(),
            Duration::from_millis(10),
        )
        .unwrap();
        assert_eq!(outcome, Outcome::TimedOut);
        // The detached thread still holds the oracle.
        assert_eq!(Arc::strong_count(&oracle), 2);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while Arc::strong_count(&oracle) > 1 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(Arc::strong_count(&oracle), 1);
    }

    #[test]
    fn test_failures_are_errors() {
        let err = call(Behavior::Fail, Duration::from_secs(5)).unwrap_err();
        assert_eq!(err.message(), "solver crashed");

        let err = call(Behavior::Panic, Duration::from_secs(5)).unwrap_err();
        assert_eq!(err.message(), "oracle thread panicked");
    }
}
