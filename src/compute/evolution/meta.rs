//! Population members carrying a smoothed fitness estimate.

use serde::{Deserialize, Serialize};

use crate::schema::{CrossoverKind, MutationKind, ProbabilityGenome};

use super::genome::GenomeRng;

/// A genome plus its exponentially smoothed fitness.
///
/// The fitness is `None` until the first update. Subsequent updates apply
/// `fitness = gamma * fitness + (1 - gamma) * raw`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaIndividual {
    pub genome: ProbabilityGenome,
    pub fitness: Option<f64>,
}

impl MetaIndividual {
    pub fn new(genome: ProbabilityGenome) -> Self {
        Self {
            genome,
            fitness: None,
        }
    }

    pub fn with_fitness(genome: ProbabilityGenome, fitness: f64) -> Self {
        Self {
            genome,
            fitness: Some(fitness),
        }
    }

    /// Fold a raw fitness value into the estimate and return the new estimate.
    pub fn update_fitness(&mut self, raw: f64, gamma: f64) -> f64 {
        let smoothed = match self.fitness {
            Some(previous) => gamma * previous + (1.0 - gamma) * raw,
            None => raw,
        };
        self.fitness = Some(smoothed);
        smoothed
    }

    /// Cross the wrapped genomes. The child inherits the parents' mean fitness.
    pub fn crossover(
        &self,
        other: &MetaIndividual,
        rng: &mut GenomeRng,
        kind: CrossoverKind,
    ) -> MetaIndividual {
        let genome = rng.crossover(&self.genome, &other.genome, kind);
        let fitness = match (self.fitness, other.fitness) {
            (Some(a), Some(b)) => Some((a + b) / 2.0),
            (Some(f), None) | (None, Some(f)) => Some(f),
            (None, None) => None,
        };
        MetaIndividual { genome, fitness }
    }

    /// Mutate the wrapped genome, keeping the fitness estimate.
    pub fn mutate(
        &self,
        probability: f64,
        rng: &mut GenomeRng,
        kind: &MutationKind,
    ) -> MetaIndividual {
        MetaIndividual {
            genome: rng.mutate(&self.genome, probability, kind),
            fitness: self.fitness,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Grammar;

    fn genome() -> ProbabilityGenome {
        ProbabilityGenome::uniform(&Grammar::default()).unwrap()
    }

    #[test]
    fn test_smoothing_sequence() {
        let mut member = MetaIndividual::new(genome());
        assert_eq!(member.update_fitness(10.0, 0.5), 10.0);
        assert_eq!(member.update_fitness(20.0, 0.5), 15.0);
        assert_eq!(member.fitness, Some(15.0));
    }

    #[test]
    fn test_zero_gamma_tracks_raw() {
        let mut member = MetaIndividual::with_fitness(genome(), 100.0);
        assert_eq!(member.update_fitness(3.0, 0.0), 3.0);
    }

    #[test]
    fn test_crossover_fitness_inheritance() {
        let mut rng = GenomeRng::new(1);
        let a = MetaIndividual::with_fitness(genome(), 2.0);
        let b = MetaIndividual::with_fitness(genome(), 6.0);
        let none = MetaIndividual::new(genome());

        assert_eq!(a.crossover(&b, &mut rng, CrossoverKind::Mean).fitness, Some(4.0));
        assert_eq!(a.crossover(&none, &mut rng, CrossoverKind::Mean).fitness, Some(2.0));
        assert_eq!(none.crossover(&none, &mut rng, CrossoverKind::Mean).fitness, None);
    }

    #[test]
    fn test_mutation_keeps_fitness() {
        let mut rng = GenomeRng::new(2);
        let member = MetaIndividual::with_fitness(genome(), 7.5);
        let child = member.mutate(1.0, &mut rng, &MutationKind::default());
        assert_eq!(child.fitness, Some(7.5));
        assert_ne!(child.genome, member.genome);
    }
}
