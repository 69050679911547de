//! Evolutionary search over grammar probability distributions.
//!
//! # Overview
//!
//! The evolutionary search system consists of:
//!
//! - **Genome Operations** (`genome`): Random generation, crossover, and mutation
//! - **Fitness Oracle** (`fitness`): Oracle contract, aggregation and bounded calls
//! - **Selection** (`selection`): Fitness-proportionate parent sampling
//! - **Meta Individuals** (`meta`): Members with an exponentially smoothed fitness
//! - **Search Loop** (`search`): The generational state machine
//! - **Run Ledger** (`ledger`): Per-generation record sinks
//! - **Synthetic Oracle** (`synthetic`): Reference oracle for runs without a solver
//!
//! # Example
//!
//! ```rust,no_run
//! use heuristic_evolution::schema::{EvolutionConfig, Grammar};
//! use heuristic_evolution::compute::evolution::{
//!     EvolutionEngine, MemoryLedger, SyntheticOracle, SyntheticProblems,
//! };
//!
//! let config = EvolutionConfig::default();
//! let oracle = SyntheticOracle::manhattan(&Grammar::default()).unwrap();
//! let mut engine =
//!     EvolutionEngine::from_source(config, oracle, &SyntheticProblems::default()).unwrap();
//!
//! let mut ledger = MemoryLedger::new();
//! let result = engine
//!     .run_with_callback(&mut ledger, |progress| {
//!         println!("Generation {}: champion = {:?}",
//!             progress.generation, progress.champion_fitness);
//!     })
//!     .unwrap();
//!
//! println!("Generations: {}", result.stats.generations);
//! ```
//!
//! # Selection Conventions
//!
//! - `LowerIsBetter`: oracle values are costs, inverted before sampling
//! - `HigherIsBetter`: oracle values are used as weights directly

mod fitness;
mod genome;
mod ledger;
mod meta;
mod search;
mod selection;
mod synthetic;

pub use fitness::{
    AggregationError, EvaluationContext, FitnessOracle, FitnessResult, OracleError, Outcome,
    ProblemSource, Sample, combine_samples, evaluate_with_timeout,
};
pub use genome::{GenomeRng, genome_distance, population_diversity};
pub use ledger::{FileLedger, LedgerError, MemoryLedger, RunLedger, write_summary};
pub use meta::MetaIndividual;
pub use search::{EvolutionEngine, EvolutionError};
pub use selection::{InvalidFitnessError, select_indices, select_parents, selection_weights};
pub use synthetic::{SyntheticOracle, SyntheticProblem, SyntheticProblems, sample_expression};
