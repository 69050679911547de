//! Genome manipulation utilities for evolutionary search.
//!
//! Provides random generation, crossover, and mutation operations. Every
//! operator returns a new genome whose categorical distributions sum to one.

use std::collections::{BTreeMap, BTreeSet};

use rand::prelude::*;
use rand_distr::{Exp1, StandardNormal};

use crate::schema::{
    Category, CrossoverKind, Distribution, Grammar, InvalidGenomeError, MutationKind,
    ProbabilityGenome,
};

/// Random number generator wrapper for genome operations.
pub struct GenomeRng {
    rng: StdRng,
}

impl GenomeRng {
    /// Create from seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Create with random seed.
    pub fn random() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Underlying generator, for parent selection.
    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Generate a genome over the grammar.
    ///
    /// Uniform genomes put `1/|category|` on every symbol; random ones draw a
    /// flat Dirichlet sample per category.
    pub fn random_genome(
        &mut self,
        grammar: &Grammar,
        uniform: bool,
    ) -> Result<ProbabilityGenome, InvalidGenomeError> {
        if uniform {
            return ProbabilityGenome::uniform(grammar);
        }
        grammar.validate()?;

        let binaries = self.random_distribution(Category::Binary, &grammar.binaries)?;
        let unaries = self.random_distribution(Category::Unary, &grammar.unaries)?;
        let terminals = self.random_distribution(Category::Terminal, &grammar.terminals)?;
        let number_weight = self.rng.r#gen::<f64>();

        Ok(ProbabilityGenome::from_parts(
            binaries,
            unaries,
            terminals,
            number_weight,
        ))
    }

    /// Exponential draws normalized to sum to one.
    fn random_distribution(
        &mut self,
        category: Category,
        symbols: &[String],
    ) -> Result<Distribution, InvalidGenomeError> {
        let weights: BTreeMap<String, f64> = symbols
            .iter()
            .map(|s| (s.clone(), self.rng.sample::<f64, _>(Exp1)))
            .collect();
        Distribution::normalized(category, weights)
    }

    /// Perform crossover between two genomes.
    pub fn crossover(
        &mut self,
        parent1: &ProbabilityGenome,
        parent2: &ProbabilityGenome,
        kind: CrossoverKind,
    ) -> ProbabilityGenome {
        let binaries = self.crossover_distribution(parent1.binaries(), parent2.binaries(), kind);
        let unaries = self.crossover_distribution(parent1.unaries(), parent2.unaries(), kind);
        let terminals =
            self.crossover_distribution(parent1.terminals(), parent2.terminals(), kind);

        let t = self.mix(kind);
        let number_weight = blend(parent1.number_weight(), parent2.number_weight(), t);

        ProbabilityGenome::from_parts(binaries, unaries, terminals, number_weight.clamp(0.0, 1.0))
    }

    /// Combine one category; a symbol missing from a parent counts as zero.
    fn crossover_distribution(
        &mut self,
        d1: &Distribution,
        d2: &Distribution,
        kind: CrossoverKind,
    ) -> Distribution {
        let mut combined: BTreeMap<String, f64> = BTreeMap::new();
        for symbol in d1.symbols().chain(d2.symbols()) {
            if combined.contains_key(symbol) {
                continue;
            }
            let t = self.mix(kind);
            combined.insert(
                symbol.to_string(),
                blend(d1.weight(symbol), d2.weight(symbol), t),
            );
        }
        Distribution::renormalize(combined)
    }

    /// Blend factor for one crossover site.
    fn mix(&mut self, kind: CrossoverKind) -> f64 {
        match kind {
            CrossoverKind::Mean => 0.5,
            CrossoverKind::Blend => self.rng.r#gen::<f64>(),
        }
    }

    /// Mutate a genome.
    ///
    /// Each weight is perturbed with independent probability `probability`.
    /// Only categories with a perturbed weight are renormalized, so a zero
    /// probability returns an identical genome.
    pub fn mutate(
        &mut self,
        genome: &ProbabilityGenome,
        probability: f64,
        kind: &MutationKind,
    ) -> ProbabilityGenome {
        let binaries = self.mutate_distribution(genome.binaries(), probability, kind);
        let unaries = self.mutate_distribution(genome.unaries(), probability, kind);
        let terminals = self.mutate_distribution(genome.terminals(), probability, kind);

        let mut number_weight = genome.number_weight();
        if self.rng.r#gen::<f64>() < probability {
            number_weight = fold_unit(self.perturb(number_weight, kind));
        }

        ProbabilityGenome::from_parts(binaries, unaries, terminals, number_weight)
    }

    /// Mutate one category.
    fn mutate_distribution(
        &mut self,
        dist: &Distribution,
        probability: f64,
        kind: &MutationKind,
    ) -> Distribution {
        let mut weights = dist.to_map();
        let mut touched = false;
        for w in weights.values_mut() {
            if self.rng.r#gen::<f64>() < probability {
                *w = self.perturb(*w, kind);
                touched = true;
            }
        }

        if touched {
            Distribution::renormalize(weights)
        } else {
            dist.clone()
        }
    }

    /// Perturb a single non-negative weight.
    fn perturb(&mut self, value: f64, kind: &MutationKind) -> f64 {
        match kind {
            MutationKind::Gaussian { strength } => self.gaussian_mutate(value, *strength),
            MutationKind::Resample => self.rng.r#gen::<f64>(),
        }
    }

    /// Gaussian mutation: add noise and reflect at zero.
    pub fn gaussian_mutate(&mut self, value: f64, strength: f64) -> f64 {
        let noise: f64 = self.rng.sample(StandardNormal);
        (value + noise * strength).abs()
    }

    /// Generate next u64 for seeding oracle calls.
    pub fn next_seed(&mut self) -> u64 {
        self.rng.r#gen()
    }
}

/// Linear blend between two values.
fn blend(a: f64, b: f64, t: f64) -> f64 {
    a * (1.0 - t) + b * t
}

/// Reflect a non-negative value into [0, 1].
fn fold_unit(value: f64) -> f64 {
    let r = value.abs() % 2.0;
    if r > 1.0 { 2.0 - r } else { r }
}

/// Compute genetic distance between two genomes.
///
/// Mean absolute weight difference over the union of symbols plus the
/// number weight.
pub fn genome_distance(g1: &ProbabilityGenome, g2: &ProbabilityGenome) -> f64 {
    let mut distance = 0.0;
    let mut count = 0;

    for category in Category::ALL {
        let d1 = g1.distribution(category);
        let d2 = g2.distribution(category);
        let symbols: BTreeSet<&str> = d1.symbols().chain(d2.symbols()).collect();
        for symbol in symbols {
            distance += (d1.weight(symbol) - d2.weight(symbol)).abs();
            count += 1;
        }
    }

    distance += (g1.number_weight() - g2.number_weight()).abs();
    count += 1;

    distance / count as f64
}

/// Mean pairwise genome distance.
pub fn population_diversity<'a, I>(genomes: I) -> f64
where
    I: IntoIterator<Item = &'a ProbabilityGenome>,
{
    let genomes: Vec<&ProbabilityGenome> = genomes.into_iter().collect();
    if genomes.len() < 2 {
        return 0.0;
    }

    let mut total = 0.0;
    let mut count = 0;
    for i in 0..genomes.len() {
        for j in (i + 1)..genomes.len() {
            total += genome_distance(genomes[i], genomes[j]);
            count += 1;
        }
    }
    total / count as f64
}
