//! Fitness-proportionate parent selection.
//!
//! Raw fitness is first mapped to non-negative weights by the run's
//! [`SelectionConvention`]; sampling then draws `k` independent indices
//! with replacement.

use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};

use crate::schema::SelectionConvention;

/// Map raw fitness values to selection weights.
///
/// Costs (`LowerIsBetter`) are inverted with `max + min - f`, which gives
/// the best cost the largest weight and preserves rank. Higher-is-better
/// values pass through unchanged.
pub fn selection_weights(fitness: &[f64], convention: SelectionConvention) -> Vec<f64> {
    match convention {
        SelectionConvention::HigherIsBetter => fitness.to_vec(),
        SelectionConvention::LowerIsBetter => {
            let max = fitness.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let min = fitness.iter().copied().fold(f64::INFINITY, f64::min);
            fitness.iter().map(|f| max + min - f).collect()
        }
    }
}

/// Draw `k` indices proportionally to `weights`, with replacement.
pub fn select_indices<R: Rng + ?Sized>(
    rng: &mut R,
    weights: &[f64],
    k: usize,
) -> Result<Vec<usize>, InvalidFitnessError> {
    check_weights(weights)?;
    let dist = WeightedIndex::new(weights).map_err(|_| InvalidFitnessError::AllZero)?;
    Ok((0..k).map(|_| dist.sample(&mut *rng)).collect())
}

/// Draw `k` members proportionally to `fitnesses`, with replacement.
pub fn select_parents<'a, T, R: Rng + ?Sized>(
    rng: &mut R,
    population: &'a [T],
    fitnesses: &[f64],
    k: usize,
) -> Result<Vec<&'a T>, InvalidFitnessError> {
    if population.len() != fitnesses.len() {
        return Err(InvalidFitnessError::LengthMismatch {
            population: population.len(),
            fitnesses: fitnesses.len(),
        });
    }
    let indices = select_indices(rng, fitnesses, k)?;
    Ok(indices.into_iter().map(|i| &population[i]).collect())
}

fn check_weights(weights: &[f64]) -> Result<(), InvalidFitnessError> {
    if weights.is_empty() {
        return Err(InvalidFitnessError::Empty);
    }
    for (index, &value) in weights.iter().enumerate() {
        if !value.is_finite() {
            return Err(InvalidFitnessError::NonFinite { index, value });
        }
        if value < 0.0 {
            return Err(InvalidFitnessError::Negative { index, value });
        }
    }
    if weights.iter().all(|&w| w == 0.0) {
        return Err(InvalidFitnessError::AllZero);
    }
    Ok(())
}

/// Degenerate selection input.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidFitnessError {
    #[error("No fitness values to select from")]
    Empty,
    #[error("Population has {population} members but {fitnesses} fitness values")]
    LengthMismatch { population: usize, fitnesses: usize },
    #[error("Fitness at index {index} is not finite ({value})")]
    NonFinite { index: usize, value: f64 },
    #[error("Fitness at index {index} is negative ({value})")]
    Negative { index: usize, value: f64 },
    #[error("All fitness values are zero")]
    AllZero,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_rejects_all_zero() {
        let mut rng = StdRng::seed_from_u64(0);
        let population = ["a", "b", "c"];
        let result = select_parents(&mut rng, &population, &[0.0, 0.0, 0.0], 4);
        assert_eq!(result, Err(InvalidFitnessError::AllZero));
    }

    #[test]
    fn test_rejects_negative_and_nan() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(
            select_indices(&mut rng, &[1.0, -0.5], 1),
            Err(InvalidFitnessError::Negative {
                index: 1,
                value: -0.5
            })
        );
        assert!(matches!(
            select_indices(&mut rng, &[f64::NAN, 1.0], 1),
            Err(InvalidFitnessError::NonFinite { index: 0, .. })
        ));
        assert_eq!(
            select_indices(&mut rng, &[], 1),
            Err(InvalidFitnessError::Empty)
        );
    }

    #[test]
    fn test_single_nonzero_always_selected() {
        let mut rng = StdRng::seed_from_u64(11);
        let population = ["first", "second", "third"];
        for k in [1, 5, 50] {
            let parents = select_parents(&mut rng, &population, &[1.0, 0.0, 0.0], k).unwrap();
            assert_eq!(parents.len(), k);
            assert!(parents.iter().all(|p| **p == "first"));
        }
    }

    #[test]
    fn test_equal_weights_are_uniform() {
        let mut rng = StdRng::seed_from_u64(5);
        let indices = select_indices(&mut rng, &[2.0; 4], 4000).unwrap();
        let mut counts = [0usize; 4];
        for i in indices {
            counts[i] += 1;
        }
        assert!(counts.iter().all(|&c| (800..1200).contains(&c)), "{counts:?}");
    }

    #[test]
    fn test_length_mismatch() {
        let mut rng = StdRng::seed_from_u64(0);
        let result = select_parents(&mut rng, &[1, 2], &[1.0], 1);
        assert!(matches!(
            result,
            Err(InvalidFitnessError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_lower_is_better_inversion() {
        let weights = selection_weights(&[1.0, 2.0, 3.0, 4.0], SelectionConvention::LowerIsBetter);
        assert_eq!(weights, vec![4.0, 3.0, 2.0, 1.0]);

        let weights = selection_weights(&[3.0, 0.0], SelectionConvention::LowerIsBetter);
        assert_eq!(weights, vec![0.0, 3.0]);

        let passthrough = selection_weights(&[0.5, 2.0], SelectionConvention::HigherIsBetter);
        assert_eq!(passthrough, vec![0.5, 2.0]);
    }
}
