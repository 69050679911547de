//! Heuristic Evolution CLI - Run a genetic search from JSON configuration.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use heuristic_evolution::{
    compute::evolution::{
        EvolutionEngine, FileLedger, SyntheticOracle, SyntheticProblems, write_summary,
    },
    schema::{Category, EvolutionConfig, Termination},
};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <config.json> [output_dir]", args[0]);
        eprintln!();
        eprintln!("Evolve heuristic-grammar distributions from JSON configuration.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  config.json  Path to evolution configuration file");
        eprintln!("  output_dir   Directory for run logs (default: output)");
        eprintln!();
        eprintln!("Example configuration is generated with --example flag.");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_config();
        return;
    }

    let config_path = PathBuf::from(&args[1]);
    let output_dir = args
        .get(2)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("output"));

    // Load configuration
    let config_str = fs::read_to_string(&config_path).unwrap_or_else(|e| {
        eprintln!("Error reading config file: {}", e);
        std::process::exit(1);
    });

    let config: EvolutionConfig = serde_json::from_str(&config_str).unwrap_or_else(|e| {
        eprintln!("Error parsing config: {}", e);
        std::process::exit(1);
    });

    let oracle = SyntheticOracle::manhattan(&config.grammar).unwrap_or_else(|e| {
        eprintln!("Error building oracle: {}", e);
        std::process::exit(1);
    });

    println!("Heuristic Evolution");
    println!("===================");
    println!("Problem: {}", config.problem);
    println!("Population: {}", config.population_size);
    println!("Mutation probability: {}", config.mutation_probability);
    match config.termination {
        Termination::MaxGenerations { generations } => println!("Generations: {}", generations),
        Termination::WallClock { seconds } => println!("Wall clock: {}s", seconds),
    }
    println!(
        "Smoothing: {}",
        config
            .smoothing
            .as_ref()
            .map_or("off".to_string(), |s| format!("gamma={}", s.gamma))
    );
    println!("Output: {}", output_dir.display());
    println!();

    let mut engine =
        EvolutionEngine::from_source(config.clone(), oracle, &SyntheticProblems::default())
            .unwrap_or_else(|e| {
                eprintln!("Error creating engine: {}", e);
                std::process::exit(1);
            });

    let mut ledger = FileLedger::create(&output_dir).unwrap_or_else(|e| {
        eprintln!("Error creating output directory: {}", e);
        std::process::exit(1);
    });

    println!("Seed: {}", engine.seed());
    println!("Running evolution...");
    let start = Instant::now();

    let result = engine
        .run_with_callback(&mut ledger, |progress| {
            if let Some(last) = &progress.last {
                println!(
                    "  Generation {}: best={:.4}, mean={:.4}, diversity={:.4}, timeouts={}",
                    last.generation,
                    last.best_fitness,
                    last.mean_fitness,
                    last.diversity,
                    last.timeouts
                );
            }
        })
        .unwrap_or_else(|e| {
            eprintln!("Evolution failed: {}", e);
            std::process::exit(1);
        });

    let summary_path = write_summary(&output_dir, &config, &result).unwrap_or_else(|e| {
        eprintln!("Error writing summary: {}", e);
        std::process::exit(1);
    });

    println!();
    println!(
        "Stopped: {:?} after {} generations",
        result.stats.stop_reason, result.stats.generations
    );
    println!(
        "Evaluations: {} ({} timed out)",
        result.stats.total_evaluations, result.stats.total_timeouts
    );

    if let Some(champion) = &result.champion {
        println!(
            "Champion: cost {:.4} (generation {}, member {})",
            champion.fitness, champion.generation, champion.member
        );
        for category in Category::ALL {
            let weights: Vec<String> = champion
                .genome
                .distribution(category)
                .iter()
                .map(|(symbol, weight)| format!("{}={:.3}", symbol, weight))
                .collect();
            println!("  {}: {}", category, weights.join(" "));
        }
        println!("  number: {:.3}", champion.genome.number_weight());
    }

    println!();
    println!("Summary: {}", summary_path.display());
    println!("Time: {:.2}s", start.elapsed().as_secs_f32());
}

fn print_example_config() {
    let config = EvolutionConfig {
        population_size: 20,
        termination: Termination::MaxGenerations { generations: 25 },
        random_seed: Some(42),
        ..Default::default()
    };

    match serde_json::to_string_pretty(&config) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing example config: {}", e);
            std::process::exit(1);
        }
    }
}
