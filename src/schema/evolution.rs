//! Evolution configuration types for probability-genome search.
//!
//! The configuration is an immutable value handed to the engine at
//! construction; nothing in the loop reads global state.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Grammar, InvalidGenomeError};

/// Top-level configuration for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionConfig {
    /// Problem identifier passed through to the problem source.
    #[serde(default = "default_problem")]
    pub problem: String,
    /// Number of genomes in the population.
    #[serde(default = "default_population_size")]
    pub population_size: usize,
    /// Per-weight mutation probability (0.0-1.0).
    #[serde(default = "default_mutation_probability")]
    pub mutation_probability: f64,
    /// How a selected weight is perturbed.
    #[serde(default)]
    pub mutation: MutationKind,
    /// How parent weights are combined.
    #[serde(default)]
    pub crossover: CrossoverKind,
    /// Oracle invocation settings.
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    /// When the run stops.
    #[serde(default)]
    pub termination: Termination,
    /// Random seed for reproducibility.
    #[serde(default)]
    pub random_seed: Option<u64>,
    /// Start from uniform distributions instead of random ones.
    #[serde(default)]
    pub uniform_initialization: bool,
    /// Whether oracle values are costs or rewards.
    #[serde(default)]
    pub selection_convention: SelectionConvention,
    /// Reduction of oracle output to one scalar.
    #[serde(default)]
    pub aggregation: AggregationStrategy,
    /// Two-tier smoothing; `None` selects on raw per-generation fitness.
    #[serde(default)]
    pub smoothing: Option<SmoothingConfig>,
    /// Replace the population each generation. When false the run only
    /// evaluates and logs the initial population.
    #[serde(default = "default_evolve")]
    pub evolve: bool,
    /// Grammar symbol sets.
    #[serde(default)]
    pub grammar: Grammar,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            problem: default_problem(),
            population_size: default_population_size(),
            mutation_probability: default_mutation_probability(),
            mutation: MutationKind::default(),
            crossover: CrossoverKind::default(),
            evaluation: EvaluationConfig::default(),
            termination: Termination::default(),
            random_seed: None,
            uniform_initialization: false,
            selection_convention: SelectionConvention::default(),
            aggregation: AggregationStrategy::default(),
            smoothing: None,
            evolve: default_evolve(),
            grammar: Grammar::default(),
        }
    }
}

fn default_problem() -> String {
    "maze2".to_string()
}
fn default_population_size() -> usize {
    50
}
fn default_mutation_probability() -> f64 {
    0.1
}
fn default_evolve() -> bool {
    true
}

/// Weight perturbation applied by mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum MutationKind {
    /// Add Gaussian noise and reflect at zero.
    Gaussian {
        #[serde(default = "default_mutation_strength")]
        strength: f64,
    },
    /// Replace the weight with a fresh uniform draw.
    Resample,
}

impl Default for MutationKind {
    fn default() -> Self {
        Self::Gaussian {
            strength: default_mutation_strength(),
        }
    }
}

fn default_mutation_strength() -> f64 {
    0.1
}

/// Per-symbol combination rule for crossover.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum CrossoverKind {
    /// Arithmetic mean of both parents.
    #[default]
    Mean,
    /// Random convex combination drawn per symbol.
    Blend,
}

/// Oracle invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Budget handed to the oracle for each call, in seconds.
    #[serde(default = "default_oracle_budget")]
    pub oracle_budget_secs: f64,
    /// Extra time allowed past the budget before a call counts as timed out.
    #[serde(default = "default_timeout_grace")]
    pub timeout_grace_secs: f64,
    /// Oracle calls per member per generation.
    #[serde(default = "default_samples_per_member")]
    pub samples_per_member: usize,
    /// Worker threads for evaluation (defaults to available cores).
    #[serde(default)]
    pub workers: Option<usize>,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            oracle_budget_secs: default_oracle_budget(),
            timeout_grace_secs: default_timeout_grace(),
            samples_per_member: default_samples_per_member(),
            workers: None,
        }
    }
}

fn default_oracle_budget() -> f64 {
    30.0
}
fn default_timeout_grace() -> f64 {
    0.0
}
fn default_samples_per_member() -> usize {
    1
}

impl EvaluationConfig {
    /// Budget passed to the oracle.
    pub fn oracle_budget(&self) -> Duration {
        Duration::try_from_secs_f64(self.oracle_budget_secs).unwrap_or_default()
    }

    /// Extra time allowed past the budget.
    pub fn timeout_grace(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_grace_secs).unwrap_or_default()
    }

    /// Hard per-call timeout enforced by the engine. Equal to the budget
    /// unless a grace period is configured.
    pub fn hard_timeout(&self) -> Duration {
        self.oracle_budget().saturating_add(self.timeout_grace())
    }
}

/// Termination rule, checked before each evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Termination {
    /// Stop after a fixed number of generations.
    MaxGenerations { generations: usize },
    /// Stop once the elapsed wall-clock time exceeds the budget.
    WallClock { seconds: f64 },
}

impl Default for Termination {
    fn default() -> Self {
        Self::MaxGenerations { generations: 100 }
    }
}

/// Mapping from raw oracle values to selection weights.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionConvention {
    /// Larger values are better; used as weights directly.
    HigherIsBetter,
    /// Values are costs; inverted with `max + min - f` before sampling.
    #[default]
    LowerIsBetter,
}

impl SelectionConvention {
    /// Whether `a` is strictly better than `b`.
    pub fn is_better(self, a: f64, b: f64) -> bool {
        match self {
            Self::HigherIsBetter => a > b,
            Self::LowerIsBetter => a < b,
        }
    }
}

/// Reduction of a multi-sample oracle result to one scalar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "type")]
pub enum AggregationStrategy {
    /// Scalars pass through; sample lists use their first (best) entry.
    Identity,
    /// Mean over samples.
    #[default]
    Mean,
    /// Minimum over samples.
    Min,
    /// Weighted mean of the first `depth` samples with weights `decay^i`.
    Discounted {
        #[serde(default = "default_discount_decay")]
        decay: f64,
        #[serde(default = "default_discount_depth")]
        depth: usize,
    },
}

fn default_discount_decay() -> f64 {
    0.8
}
fn default_discount_depth() -> usize {
    10
}

/// Exponential smoothing of fitness across generations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SmoothingConfig {
    /// Weight on the previous estimate (0.0-1.0, exclusive of 1).
    #[serde(default = "default_gamma")]
    pub gamma: f64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            gamma: default_gamma(),
        }
    }
}

fn default_gamma() -> f64 {
    0.5
}

// ============================================================================
// Validation
// ============================================================================

/// Evolution configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Population size must be at least 1")]
    PopulationTooSmall,
    #[error("Mutation probability {0} must be in [0, 1]")]
    InvalidMutationProbability(f64),
    #[error("Mutation strength {0} must be positive")]
    InvalidMutationStrength(f64),
    #[error("Oracle budget {0}s must be a positive representable duration")]
    InvalidBudget(f64),
    #[error("Timeout grace {0}s must be non-negative and fit alongside the budget")]
    InvalidGrace(f64),
    #[error("At least one oracle sample per member is required")]
    InvalidSamples,
    #[error("Worker count must be positive")]
    InvalidWorkers,
    #[error("Invalid termination: {0}")]
    InvalidTermination(String),
    #[error("Invalid aggregation: {0}")]
    InvalidAggregation(String),
    #[error("Smoothing gamma {0} must be in [0, 1)")]
    InvalidGamma(f64),
    #[error("Invalid grammar: {0}")]
    Grammar(#[from] InvalidGenomeError),
}

impl EvolutionConfig {
    /// Validate evolution configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size == 0 {
            return Err(ConfigError::PopulationTooSmall);
        }

        if !(0.0..=1.0).contains(&self.mutation_probability) {
            return Err(ConfigError::InvalidMutationProbability(
                self.mutation_probability,
            ));
        }

        if let MutationKind::Gaussian { strength } = self.mutation
            && !(strength.is_finite() && strength > 0.0)
        {
            return Err(ConfigError::InvalidMutationStrength(strength));
        }

        let eval = &self.evaluation;
        let budget = match Duration::try_from_secs_f64(eval.oracle_budget_secs) {
            Ok(budget) if !budget.is_zero() => budget,
            _ => return Err(ConfigError::InvalidBudget(eval.oracle_budget_secs)),
        };
        let grace = Duration::try_from_secs_f64(eval.timeout_grace_secs)
            .map_err(|_| ConfigError::InvalidGrace(eval.timeout_grace_secs))?;
        if budget.checked_add(grace).is_none() {
            return Err(ConfigError::InvalidGrace(eval.timeout_grace_secs));
        }
        if eval.samples_per_member == 0 {
            return Err(ConfigError::InvalidSamples);
        }
        if eval.workers == Some(0) {
            return Err(ConfigError::InvalidWorkers);
        }

        match self.termination {
            Termination::MaxGenerations { generations: 0 } => {
                return Err(ConfigError::InvalidTermination(
                    "generation count must be positive".to_string(),
                ));
            }
            Termination::WallClock { seconds } if !(seconds.is_finite() && seconds > 0.0) => {
                return Err(ConfigError::InvalidTermination(format!(
                    "wall-clock budget {seconds}s must be positive"
                )));
            }
            _ => {}
        }

        if let AggregationStrategy::Discounted { decay, depth } = self.aggregation {
            if !(decay.is_finite() && decay > 0.0) {
                return Err(ConfigError::InvalidAggregation(format!(
                    "decay {decay} must be positive"
                )));
            }
            if depth == 0 {
                return Err(ConfigError::InvalidAggregation(
                    "depth must be positive".to_string(),
                ));
            }
        }

        if let Some(smoothing) = &self.smoothing
            && !(0.0..1.0).contains(&smoothing.gamma)
        {
            return Err(ConfigError::InvalidGamma(smoothing.gamma));
        }

        self.grammar.validate()?;

        Ok(())
    }
}
