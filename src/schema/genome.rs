//! Probability genome types: the distributions that parameterize heuristic synthesis.
//!
//! A genome holds three categorical distributions over the grammar's symbol
//! sets (binary operators, unary operators, terminals) plus the probability
//! mass given to numeric literals. Genomes are immutable values; the
//! evolutionary operators in `compute::evolution` always return new ones.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Tolerance used when validating that a distribution sums to one.
pub const SUM_TOLERANCE: f64 = 1e-6;

/// Term category of the heuristic grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Two-argument operators (`+`, `max`, ...).
    Binary,
    /// One-argument operators (`abs`, `sqrt`, ...).
    Unary,
    /// Leaf symbols (`deltaX`, `x1`, ...).
    Terminal,
}

impl Category {
    /// All categorical distributions, in logging order.
    pub const ALL: [Category; 3] = [Category::Binary, Category::Unary, Category::Terminal];

    /// Name used in logs and mappings.
    pub fn name(self) -> &'static str {
        match self {
            Category::Binary => "binary",
            Category::Unary => "unary",
            Category::Terminal => "terminal",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Symbol sets of the heuristic grammar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grammar {
    /// Binary operator symbols.
    #[serde(default = "default_binaries")]
    pub binaries: Vec<String>,
    /// Unary operator symbols.
    #[serde(default = "default_unaries")]
    pub unaries: Vec<String>,
    /// Terminal symbols.
    #[serde(default = "default_terminals")]
    pub terminals: Vec<String>,
}

impl Default for Grammar {
    fn default() -> Self {
        Self {
            binaries: default_binaries(),
            unaries: default_unaries(),
            terminals: default_terminals(),
        }
    }
}

fn symbols(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn default_binaries() -> Vec<String> {
    symbols(&["+", "-", "*", "/", "max", "min"])
}
fn default_unaries() -> Vec<String> {
    symbols(&["neg", "abs", "sqrt", "sqr"])
}
fn default_terminals() -> Vec<String> {
    symbols(&["x1", "x2", "y1", "y2", "deltaX", "deltaY"])
}

impl Grammar {
    /// Symbols of one category.
    pub fn symbols(&self, category: Category) -> &[String] {
        match category {
            Category::Binary => &self.binaries,
            Category::Unary => &self.unaries,
            Category::Terminal => &self.terminals,
        }
    }

    /// Total number of symbols across the three categories.
    pub fn term_count(&self) -> usize {
        self.binaries.len() + self.unaries.len() + self.terminals.len()
    }

    /// Reject empty categories and repeated symbols.
    pub fn validate(&self) -> Result<(), InvalidGenomeError> {
        for category in Category::ALL {
            let symbols = self.symbols(category);
            if symbols.is_empty() {
                return Err(InvalidGenomeError::EmptyCategory { category });
            }
            let mut seen = std::collections::BTreeSet::new();
            for symbol in symbols {
                if !seen.insert(symbol.as_str()) {
                    return Err(InvalidGenomeError::DuplicateSymbol {
                        category,
                        symbol: symbol.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// A categorical distribution over grammar symbols.
///
/// Weights are non-negative, finite and sum to one. Symbols are kept in
/// sorted order so that iteration (and seeded RNG consumption) is stable.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Distribution {
    weights: BTreeMap<String, f64>,
}

impl Distribution {
    /// Validate an explicit distribution.
    pub fn new(
        category: Category,
        weights: BTreeMap<String, f64>,
    ) -> Result<Self, InvalidGenomeError> {
        check_weights(category, &weights)?;
        let sum: f64 = weights.values().sum();
        if (sum - 1.0).abs() > SUM_TOLERANCE {
            return Err(InvalidGenomeError::NotNormalized { category, sum });
        }
        Ok(Self { weights })
    }

    /// Equal weight on every symbol.
    pub fn uniform(category: Category, symbols: &[String]) -> Result<Self, InvalidGenomeError> {
        if symbols.is_empty() {
            return Err(InvalidGenomeError::EmptyCategory { category });
        }
        let p = 1.0 / symbols.len() as f64;
        Ok(Self {
            weights: symbols.iter().map(|s| (s.clone(), p)).collect(),
        })
    }

    /// Validate non-negative raw weights and scale them to sum to one.
    ///
    /// All-zero weights fall back to the uniform distribution.
    pub fn normalized(
        category: Category,
        weights: BTreeMap<String, f64>,
    ) -> Result<Self, InvalidGenomeError> {
        check_weights(category, &weights)?;
        Ok(Self::renormalize(weights))
    }

    /// Scale weights already known to be finite and non-negative.
    pub(crate) fn renormalize(mut weights: BTreeMap<String, f64>) -> Self {
        debug_assert!(weights.values().all(|w| w.is_finite() && *w >= 0.0));
        let sum: f64 = weights.values().sum();
        if sum > 0.0 && sum.is_finite() {
            for w in weights.values_mut() {
                *w /= sum;
            }
        } else if !weights.is_empty() {
            let p = 1.0 / weights.len() as f64;
            for w in weights.values_mut() {
                *w = p;
            }
        }
        Self { weights }
    }

    /// Weight of a symbol (zero when the symbol is absent).
    pub fn weight(&self, symbol: &str) -> f64 {
        self.weights.get(symbol).copied().unwrap_or(0.0)
    }

    /// Iterate `(symbol, weight)` pairs in symbol order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(s, w)| (s.as_str(), *w))
    }

    /// Iterate symbols in order.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.weights.keys().map(String::as_str)
    }

    /// Number of symbols.
    pub fn len(&self) -> usize {
        self.weights.len()
    }

    /// Whether the distribution has no symbols.
    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Sum of all weights.
    pub fn sum(&self) -> f64 {
        self.weights.values().sum()
    }

    /// Copy of the underlying map.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        self.weights.clone()
    }
}

fn check_weights(
    category: Category,
    weights: &BTreeMap<String, f64>,
) -> Result<(), InvalidGenomeError> {
    if weights.is_empty() {
        return Err(InvalidGenomeError::EmptyCategory { category });
    }
    for (symbol, &value) in weights {
        if !value.is_finite() {
            return Err(InvalidGenomeError::NonFiniteWeight {
                category,
                symbol: symbol.clone(),
                value,
            });
        }
        if value < 0.0 {
            return Err(InvalidGenomeError::NegativeWeight {
                category,
                symbol: symbol.clone(),
                value,
            });
        }
    }
    Ok(())
}

/// Category name → symbol → weight, used for logging.
pub type TermMapping = BTreeMap<Category, BTreeMap<String, f64>>;

/// The evolved individual: probability distributions over grammar symbols.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GenomeRepr", into = "GenomeRepr")]
pub struct ProbabilityGenome {
    binaries: Distribution,
    unaries: Distribution,
    terminals: Distribution,
    number_weight: f64,
}

impl ProbabilityGenome {
    /// Build a genome from explicit weights, rejecting invalid input.
    pub fn new(
        binaries: BTreeMap<String, f64>,
        unaries: BTreeMap<String, f64>,
        terminals: BTreeMap<String, f64>,
        number_weight: f64,
    ) -> Result<Self, InvalidGenomeError> {
        let binaries = Distribution::new(Category::Binary, binaries)?;
        let unaries = Distribution::new(Category::Unary, unaries)?;
        let terminals = Distribution::new(Category::Terminal, terminals)?;
        check_number_weight(number_weight)?;
        Ok(Self::from_parts(binaries, unaries, terminals, number_weight))
    }

    /// Uniform genome over a grammar.
    pub fn uniform(grammar: &Grammar) -> Result<Self, InvalidGenomeError> {
        grammar.validate()?;
        Ok(Self::from_parts(
            Distribution::uniform(Category::Binary, &grammar.binaries)?,
            Distribution::uniform(Category::Unary, &grammar.unaries)?,
            Distribution::uniform(Category::Terminal, &grammar.terminals)?,
            0.5,
        ))
    }

    pub(crate) fn from_parts(
        binaries: Distribution,
        unaries: Distribution,
        terminals: Distribution,
        number_weight: f64,
    ) -> Self {
        Self {
            binaries,
            unaries,
            terminals,
            number_weight,
        }
    }

    /// Distribution of one category.
    pub fn distribution(&self, category: Category) -> &Distribution {
        match category {
            Category::Binary => &self.binaries,
            Category::Unary => &self.unaries,
            Category::Terminal => &self.terminals,
        }
    }

    pub fn binaries(&self) -> &Distribution {
        &self.binaries
    }

    pub fn unaries(&self) -> &Distribution {
        &self.unaries
    }

    pub fn terminals(&self) -> &Distribution {
        &self.terminals
    }

    /// Probability mass given to numeric literals.
    pub fn number_weight(&self) -> f64 {
        self.number_weight
    }

    /// Number of categorical weights (excludes the number weight).
    pub fn term_count(&self) -> usize {
        self.binaries.len() + self.unaries.len() + self.terminals.len()
    }

    /// Nested category → symbol → weight mapping for logging.
    pub fn to_mapping(&self) -> TermMapping {
        Category::ALL
            .iter()
            .map(|&c| (c, self.distribution(c).to_map()))
            .collect()
    }
}

fn check_number_weight(value: f64) -> Result<(), InvalidGenomeError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(InvalidGenomeError::NumberWeightOutOfRange(value))
    }
}

/// Serialized form; validated on the way in.
#[derive(Serialize, Deserialize)]
struct GenomeRepr {
    binaries: BTreeMap<String, f64>,
    unaries: BTreeMap<String, f64>,
    terminals: BTreeMap<String, f64>,
    number_weight: f64,
}

impl TryFrom<GenomeRepr> for ProbabilityGenome {
    type Error = InvalidGenomeError;

    fn try_from(repr: GenomeRepr) -> Result<Self, Self::Error> {
        Self::new(
            repr.binaries,
            repr.unaries,
            repr.terminals,
            repr.number_weight,
        )
    }
}

impl From<ProbabilityGenome> for GenomeRepr {
    fn from(genome: ProbabilityGenome) -> Self {
        Self {
            binaries: genome.binaries.weights,
            unaries: genome.unaries.weights,
            terminals: genome.terminals.weights,
            number_weight: genome.number_weight,
        }
    }
}

/// Genome construction errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidGenomeError {
    #[error("{category} distribution has no symbols")]
    EmptyCategory { category: Category },
    #[error("{category} weight for {symbol:?} is not finite ({value})")]
    NonFiniteWeight {
        category: Category,
        symbol: String,
        value: f64,
    },
    #[error("{category} weight for {symbol:?} is negative ({value})")]
    NegativeWeight {
        category: Category,
        symbol: String,
        value: f64,
    },
    #[error("{category} weights sum to {sum}, expected 1")]
    NotNormalized { category: Category, sum: f64 },
    #[error("Number weight {0} is outside [0, 1]")]
    NumberWeightOutOfRange(f64),
    #[error("Symbol {symbol:?} appears twice in the {category} category")]
    DuplicateSymbol { category: Category, symbol: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weights(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(s, w)| (s.to_string(), *w)).collect()
    }

    #[test]
    fn test_uniform_genome() {
        let grammar = Grammar::default();
        let genome = ProbabilityGenome::uniform(&grammar).unwrap();

        assert_eq!(genome.term_count(), grammar.term_count());
        assert!((genome.binaries().weight("max") - 1.0 / 6.0).abs() < 1e-12);
        assert!((genome.unaries().weight("abs") - 0.25).abs() < 1e-12);
        assert_eq!(genome.terminals().weight("missing"), 0.0);
    }

    #[test]
    fn test_rejects_empty_category() {
        let err = ProbabilityGenome::new(
            BTreeMap::new(),
            weights(&[("abs", 1.0)]),
            weights(&[("x1", 1.0)]),
            0.5,
        )
        .unwrap_err();
        assert_eq!(
            err,
            InvalidGenomeError::EmptyCategory {
                category: Category::Binary
            }
        );
    }

    #[test]
    fn test_rejects_negative_and_nan() {
        let negative = ProbabilityGenome::new(
            weights(&[("+", 1.5), ("-", -0.5)]),
            weights(&[("abs", 1.0)]),
            weights(&[("x1", 1.0)]),
            0.5,
        );
        assert!(matches!(
            negative,
            Err(InvalidGenomeError::NegativeWeight { .. })
        ));

        let nan = ProbabilityGenome::new(
            weights(&[("+", 1.0)]),
            weights(&[("abs", f64::NAN)]),
            weights(&[("x1", 1.0)]),
            0.5,
        );
        assert!(matches!(
            nan,
            Err(InvalidGenomeError::NonFiniteWeight { .. })
        ));
    }

    #[test]
    fn test_rejects_unnormalized() {
        let result = ProbabilityGenome::new(
            weights(&[("+", 0.4), ("-", 0.4)]),
            weights(&[("abs", 1.0)]),
            weights(&[("x1", 1.0)]),
            0.5,
        );
        assert!(matches!(
            result,
            Err(InvalidGenomeError::NotNormalized {
                category: Category::Binary,
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_number_weight_out_of_range() {
        let result = ProbabilityGenome::new(
            weights(&[("+", 1.0)]),
            weights(&[("abs", 1.0)]),
            weights(&[("x1", 1.0)]),
            1.5,
        );
        assert_eq!(result, Err(InvalidGenomeError::NumberWeightOutOfRange(1.5)));
    }

    #[test]
    fn test_zero_sum_falls_back_to_uniform() {
        let dist =
            Distribution::normalized(Category::Unary, weights(&[("abs", 0.0), ("neg", 0.0)]))
                .unwrap();
        assert_eq!(dist.weight("abs"), 0.5);
        assert_eq!(dist.weight("neg"), 0.5);
    }

    #[test]
    fn test_to_mapping() {
        let genome = ProbabilityGenome::uniform(&Grammar::default()).unwrap();
        let mapping = genome.to_mapping();

        assert_eq!(mapping.len(), 3);
        assert_eq!(mapping[&Category::Unary].len(), 4);
        assert_eq!(mapping[&Category::Terminal]["deltaY"], 1.0 / 6.0);
    }

    #[test]
    fn test_grammar_validation() {
        let mut grammar = Grammar::default();
        grammar.unaries.push("abs".to_string());
        assert!(matches!(
            grammar.validate(),
            Err(InvalidGenomeError::DuplicateSymbol { .. })
        ));

        grammar.unaries.clear();
        assert!(matches!(
            grammar.validate(),
            Err(InvalidGenomeError::EmptyCategory { .. })
        ));
    }

    #[test]
    fn test_serialization_validates() {
        let genome = ProbabilityGenome::uniform(&Grammar::default()).unwrap();
        let json = serde_json::to_string(&genome).unwrap();
        let parsed: ProbabilityGenome = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, genome);

        let bad = r#"{"binaries":{"+":0.7},"unaries":{"abs":1.0},"terminals":{"x1":1.0},"number_weight":0.5}"#;
        assert!(serde_json::from_str::<ProbabilityGenome>(bad).is_err());
    }
}
