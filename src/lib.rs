//! Heuristic Evolution - Genetic search over heuristic-grammar distributions.
//!
//! This crate evolves the probability distributions that parameterize a
//! grammar for synthesizing search heuristics. Fitness comes from an external
//! black-box oracle (an inner heuristic search over a problem); the crate
//! covers the genome, the evolutionary operators, the generational loop and
//! the logging of each generation.
//!
//! # Architecture
//!
//! The crate is split into two main modules:
//!
//! - `schema`: Genome, configuration and record types
//! - `compute`: Evolutionary operators, oracle invocation and the search loop
//!
//! # Example
//!
//! ```rust,no_run
//! use heuristic_evolution::{
//!     schema::{EvolutionConfig, Termination},
//!     compute::evolution::{EvolutionEngine, MemoryLedger, SyntheticOracle, SyntheticProblems},
//! };
//!
//! let config = EvolutionConfig {
//!     population_size: 20,
//!     termination: Termination::MaxGenerations { generations: 10 },
//!     random_seed: Some(42),
//!     ..Default::default()
//! };
//!
//! let oracle = SyntheticOracle::manhattan(&config.grammar).unwrap();
//! let mut engine =
//!     EvolutionEngine::from_source(config, oracle, &SyntheticProblems::default()).unwrap();
//!
//! let mut ledger = MemoryLedger::new();
//! let result = engine.run(&mut ledger).unwrap();
//!
//! if let Some(champion) = result.champion {
//!     println!("Best cost {} in generation {}", champion.fitness, champion.generation);
//! }
//! ```

pub mod compute;
pub mod schema;

// Re-export commonly used types
pub use compute::evolution::{EvolutionEngine, EvolutionError, FitnessOracle, FitnessResult};
pub use schema::{EvolutionConfig, Grammar, ProbabilityGenome};
