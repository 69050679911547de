//! Benchmarks for genome operators and selection.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use heuristic_evolution::{
    compute::evolution::{GenomeRng, population_diversity, select_indices},
    schema::{CrossoverKind, Grammar, MutationKind},
};

/// Grammar with `n` symbols per category.
fn grammar(n: usize) -> Grammar {
    let symbols = |prefix: &str| (0..n).map(|i| format!("{prefix}{i}")).collect();
    Grammar {
        binaries: symbols("b"),
        unaries: symbols("u"),
        terminals: symbols("t"),
    }
}

fn bench_operators(c: &mut Criterion) {
    let mut group = c.benchmark_group("genome_operators");

    for size in [6, 32, 128] {
        let grammar = grammar(size);
        let mut rng = GenomeRng::new(42);
        let a = rng.random_genome(&grammar, false).unwrap();
        let b = rng.random_genome(&grammar, false).unwrap();
        let mutation = MutationKind::default();

        group.bench_with_input(BenchmarkId::new("crossover", size), &size, |bench, _| {
            bench.iter(|| rng.crossover(black_box(&a), black_box(&b), CrossoverKind::Blend));
        });

        group.bench_with_input(BenchmarkId::new("mutate", size), &size, |bench, _| {
            bench.iter(|| rng.mutate(black_box(&a), 0.1, &mutation));
        });
    }

    group.finish();
}

fn bench_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("selection");

    for population in [20, 100, 500] {
        let weights: Vec<f64> = (1..=population).map(|i| i as f64).collect();
        let mut rng = GenomeRng::new(7);

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_members", population)),
            &population,
            |b, &n| {
                b.iter(|| select_indices(rng.rng_mut(), black_box(&weights), n).unwrap());
            },
        );
    }

    group.finish();
}

fn bench_diversity(c: &mut Criterion) {
    let grammar = grammar(6);
    let mut rng = GenomeRng::new(3);
    let population: Vec<_> = (0..50)
        .map(|_| rng.random_genome(&grammar, false).unwrap())
        .collect();

    c.bench_function("population_diversity_50", |b| {
        b.iter(|| population_diversity(black_box(&population)));
    });
}

criterion_group!(benches, bench_operators, bench_selection, bench_diversity);
criterion_main!(benches);
