//! Quick evolution performance test

use heuristic_evolution::{
    EvolutionConfig, EvolutionEngine,
    compute::evolution::{MemoryLedger, SyntheticOracle, SyntheticProblems},
    schema::{EvaluationConfig, SmoothingConfig, Termination},
};
use std::time::Instant;

fn main() {
    println!("=== Evolution Performance Test ===\n");

    // Test single-tier against two-tier selection
    for smoothing in [None, Some(SmoothingConfig::default())] {
        println!(
            "Smoothing: {}",
            smoothing
                .as_ref()
                .map_or("off".to_string(), |s| format!("gamma={}", s.gamma))
        );

        let config = EvolutionConfig {
            population_size: 20,
            termination: Termination::MaxGenerations { generations: 30 },
            smoothing,
            random_seed: Some(42),
            ..Default::default()
        };

        let oracle = SyntheticOracle::manhattan(&config.grammar).unwrap();
        let start = Instant::now();
        let mut engine =
            EvolutionEngine::from_source(config, oracle, &SyntheticProblems::default()).unwrap();
        let result = engine.run(&mut MemoryLedger::new()).unwrap();
        let elapsed = start.elapsed();

        let total_evals = result.stats.total_evaluations;
        let evals_per_sec = total_evals as f64 / elapsed.as_secs_f64();

        println!("  Generations:    {}", result.stats.generations);
        println!("  Evaluations:    {}", total_evals);
        println!("  Elapsed:        {:.2}s", elapsed.as_secs_f64());
        println!("  Evals/sec:      {:.1}", evals_per_sec);
        if let Some(champion) = &result.champion {
            println!("  Best cost:      {:.4}", champion.fitness);
        }
        println!();
    }

    println!("=== Scalability Test (synthetic oracle) ===\n");

    // Test different population sizes
    for pop_size in [10, 20, 40, 80] {
        let config = EvolutionConfig {
            population_size: pop_size,
            termination: Termination::MaxGenerations { generations: 5 },
            evaluation: EvaluationConfig {
                samples_per_member: 2,
                ..Default::default()
            },
            random_seed: Some(42),
            ..Default::default()
        };

        let oracle = SyntheticOracle::manhattan(&config.grammar).unwrap();
        let start = Instant::now();
        let mut engine =
            EvolutionEngine::from_source(config, oracle, &SyntheticProblems::default()).unwrap();
        let result = engine.run(&mut MemoryLedger::new()).unwrap();
        let elapsed = start.elapsed();

        let total_evals = result.stats.total_evaluations;
        let evals_per_sec = total_evals as f64 / elapsed.as_secs_f64();

        println!(
            "Population {}: {} evals in {:.2}s ({:.1} evals/sec)",
            pop_size,
            total_evals,
            elapsed.as_secs_f64(),
            evals_per_sec
        );
    }
}
