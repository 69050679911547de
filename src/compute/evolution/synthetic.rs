//! Synthetic reference oracle.
//!
//! Scores a genome by its distance to a fixed target distribution, scaled per
//! problem and perturbed with seeded noise. Heuristic labels are sampled from
//! the genome itself, so the inner history looks like real solver output.

use std::collections::BTreeMap;

use rand::prelude::*;
use rand_distr::StandardNormal;

use crate::schema::{Category, Distribution, Grammar, InvalidGenomeError, ProbabilityGenome};

use super::fitness::{
    EvaluationContext, FitnessOracle, FitnessResult, OracleError, ProblemSource, Sample,
};
use super::genome::genome_distance;

/// Cost floor so that a perfect genome still has a positive cost.
const BASE_COST: f64 = 0.1;

/// Maximum depth of sampled heuristic expressions.
const MAX_DEPTH: usize = 3;

/// A named problem with a cost scale.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticProblem {
    pub name: String,
    pub scale: f64,
}

/// Problem source with a fixed table of scales.
#[derive(Debug, Clone)]
pub struct SyntheticProblems {
    scales: BTreeMap<String, f64>,
}

impl Default for SyntheticProblems {
    fn default() -> Self {
        let scales = [("maze1", 50.0), ("maze2", 100.0), ("maze3", 200.0)]
            .into_iter()
            .map(|(name, scale)| (name.to_string(), scale))
            .collect();
        Self { scales }
    }
}

impl SyntheticProblems {
    /// Register an extra problem.
    pub fn with_problem(mut self, name: impl Into<String>, scale: f64) -> Self {
        self.scales.insert(name.into(), scale);
        self
    }
}

impl ProblemSource for SyntheticProblems {
    type Problem = SyntheticProblem;

    fn load_problem(&self, name: &str) -> Result<SyntheticProblem, OracleError> {
        self.scales
            .get(name)
            .map(|&scale| SyntheticProblem {
                name: name.to_string(),
                scale,
            })
            .ok_or_else(|| OracleError::new(format!("unknown problem {name:?}")))
    }
}

/// Distance-to-target oracle.
#[derive(Debug, Clone)]
pub struct SyntheticOracle {
    target: ProbabilityGenome,
    noise: f64,
    samples: usize,
    inner_generations: usize,
}

impl SyntheticOracle {
    pub fn new(target: ProbabilityGenome) -> Self {
        Self {
            target,
            noise: 0.1,
            samples: 4,
            inner_generations: 2,
        }
    }

    /// Target that favours the difference terminals and `max`, roughly a
    /// Manhattan-style heuristic.
    pub fn manhattan(grammar: &Grammar) -> Result<Self, InvalidGenomeError> {
        let favoured = ["max", "abs", "deltaX", "deltaY"];
        let weights = |symbols: &[String]| -> BTreeMap<String, f64> {
            symbols
                .iter()
                .map(|s| {
                    let w = if favoured.contains(&s.as_str()) { 4.0 } else { 1.0 };
                    (s.clone(), w)
                })
                .collect()
        };
        let target = ProbabilityGenome::from_parts(
            Distribution::normalized(Category::Binary, weights(&grammar.binaries))?,
            Distribution::normalized(Category::Unary, weights(&grammar.unaries))?,
            Distribution::normalized(Category::Terminal, weights(&grammar.terminals))?,
            0.1,
        );
        Ok(Self::new(target))
    }

    /// Relative noise amplitude.
    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise.max(0.0);
        self
    }

    /// Heuristics sampled per inner generation.
    pub fn with_samples(mut self, samples: usize) -> Self {
        self.samples = samples.max(1);
        self
    }

    pub fn with_inner_generations(mut self, inner_generations: usize) -> Self {
        self.inner_generations = inner_generations.max(1);
        self
    }

    pub fn target(&self) -> &ProbabilityGenome {
        &self.target
    }

    /// Noise-free cost of a genome on a problem.
    pub fn expected_cost(&self, problem: &SyntheticProblem, genome: &ProbabilityGenome) -> f64 {
        problem.scale * (BASE_COST + genome_distance(genome, &self.target))
    }
}

impl FitnessOracle for SyntheticOracle {
    type Problem = SyntheticProblem;

    fn evaluate(
        &self,
        problem: &SyntheticProblem,
        genome: &ProbabilityGenome,
        ctx: &EvaluationContext,
    ) -> Result<FitnessResult, OracleError> {
        let mut rng = StdRng::seed_from_u64(ctx.seed);
        let expected = self.expected_cost(problem, genome);

        let mut history = Vec::with_capacity(self.inner_generations);
        for _ in 0..self.inner_generations {
            let generation: Vec<Sample> = (0..self.samples)
                .map(|_| {
                    let noise: f64 = rng.sample(StandardNormal);
                    let cost = expected * (1.0 + self.noise * noise.abs());
                    Sample::new(sample_expression(genome, &mut rng, MAX_DEPTH), cost)
                })
                .collect();
            history.push(generation);
        }

        let mut best: Vec<Sample> = history.iter().flatten().cloned().collect();
        best.sort_by(|a, b| a.cost.total_cmp(&b.cost));
        best.truncate(self.samples);

        Ok(FitnessResult::HistoryRecord { best, history })
    }
}

/// Draw a heuristic expression in prefix notation from the genome.
pub fn sample_expression<R: Rng + ?Sized>(
    genome: &ProbabilityGenome,
    rng: &mut R,
    depth: usize,
) -> String {
    if depth > 0 {
        let r = rng.r#gen::<f64>();
        if r < 0.4 {
            let op = pick(genome.binaries(), rng);
            let lhs = sample_expression(genome, rng, depth - 1);
            let rhs = sample_expression(genome, rng, depth - 1);
            return format!("({op} {lhs} {rhs})");
        }
        if r < 0.6 {
            let op = pick(genome.unaries(), rng);
            let arg = sample_expression(genome, rng, depth - 1);
            return format!("({op} {arg})");
        }
    }

    if rng.r#gen::<f64>() < genome.number_weight() {
        format!("{:.2}", rng.gen_range(0.0..10.0))
    } else {
        pick(genome.terminals(), rng).to_string()
    }
}

/// Roulette draw over one distribution.
fn pick<'a, R: Rng + ?Sized>(dist: &'a Distribution, rng: &mut R) -> &'a str {
    let target = rng.r#gen::<f64>() * dist.sum();
    let mut cumulative = 0.0;
    let mut last = "";
    for (symbol, weight) in dist.iter() {
        cumulative += weight;
        last = symbol;
        if cumulative > target {
            return symbol;
        }
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AggregationStrategy;
    use std::time::Duration;

    fn ctx(seed: u64) -> EvaluationContext {
        EvaluationContext {
            generation: 0,
            member: 0,
            sample: 0,
            seed,
            budget: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_problem_source() {
        let problems = SyntheticProblems::default().with_problem("tiny", 1.0);
        assert_eq!(problems.load_problem("maze2").unwrap().scale, 100.0);
        assert_eq!(problems.load_problem("tiny").unwrap().scale, 1.0);
        assert!(problems.load_problem("missing").is_err());
    }

    #[test]
    fn test_deterministic_given_seed() {
        let grammar = Grammar::default();
        let oracle = SyntheticOracle::manhattan(&grammar).unwrap();
        let problem = SyntheticProblems::default().load_problem("maze1").unwrap();
        let genome = ProbabilityGenome::uniform(&grammar).unwrap();

        let a = oracle.evaluate(&problem, &genome, &ctx(3)).unwrap();
        let b = oracle.evaluate(&problem, &genome, &ctx(3)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_target_scores_better() {
        let grammar = Grammar::default();
        let oracle = SyntheticOracle::manhattan(&grammar).unwrap().with_noise(0.0);
        let problem = SyntheticProblems::default().load_problem("maze2").unwrap();
        let uniform = ProbabilityGenome::uniform(&grammar).unwrap();

        let near = oracle
            .evaluate(&problem, oracle.target(), &ctx(1))
            .unwrap()
            .aggregate(&AggregationStrategy::Min)
            .unwrap();
        let far = oracle
            .evaluate(&problem, &uniform, &ctx(1))
            .unwrap()
            .aggregate(&AggregationStrategy::Min)
            .unwrap();

        assert!((near - 100.0 * BASE_COST).abs() < 1e-9);
        assert!(far > near);
    }

    #[test]
    fn test_best_is_sorted_and_history_shaped() {
        let grammar = Grammar::default();
        let oracle = SyntheticOracle::manhattan(&grammar)
            .unwrap()
            .with_samples(3)
            .with_inner_generations(2);
        let problem = SyntheticProblems::default().load_problem("maze3").unwrap();
        let genome = ProbabilityGenome::uniform(&grammar).unwrap();

        let FitnessResult::HistoryRecord { best, history } =
            oracle.evaluate(&problem, &genome, &ctx(9)).unwrap()
        else {
            panic!("expected a history record");
        };
        assert_eq!(best.len(), 3);
        assert!(best.windows(2).all(|w| w[0].cost <= w[1].cost));
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|g| g.len() == 3));
    }

    #[test]
    fn test_sampled_expressions_use_grammar() {
        let grammar = Grammar::default();
        let genome = ProbabilityGenome::uniform(&grammar).unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..20 {
            let expr = sample_expression(&genome, &mut rng, 0);
            let is_terminal = grammar.terminals.contains(&expr);
            let is_number = expr.parse::<f64>().is_ok();
            assert!(is_terminal || is_number, "{expr}");
        }
    }
}
