//! Per-generation records, progress snapshots and run results.

use serde::{Deserialize, Serialize};

use super::{Category, ProbabilityGenome, TermMapping};

/// Outcome of a member's oracle calls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    /// The oracle returned a result.
    Evaluated,
    /// The call exceeded its hard timeout and received the worst-case fitness.
    TimedOut,
}

impl EvaluationStatus {
    /// Marker written to the fitness log.
    pub fn marker(self) -> &'static str {
        match self {
            Self::Evaluated => "ok",
            Self::TimedOut => "timeout",
        }
    }
}

/// One inner-search sample reported by a history-shaped oracle result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InnerSample {
    /// Index of the oracle's internal generation.
    pub inner_generation: usize,
    /// Heuristic description.
    pub heuristic: String,
    /// Cost of the heuristic.
    pub cost: f64,
}

/// Snapshot of one population member within a generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberRecord {
    /// Position in the population.
    pub member: usize,
    /// Term probabilities at evaluation time.
    pub probabilities: TermMapping,
    /// Numeric literal weight at evaluation time.
    pub number_weight: f64,
    /// Aggregated oracle value (worst case if timed out).
    pub raw_fitness: f64,
    /// Smoothed estimate after this generation (two-tier runs only).
    pub smoothed_fitness: Option<f64>,
    /// Value handed to selection before the convention is applied.
    pub aggregated_fitness: f64,
    /// Non-negative selection weight after the convention.
    pub selection_weight: f64,
    /// Whether the oracle finished.
    pub status: EvaluationStatus,
    /// Inner history rows, if the oracle reported any.
    pub history: Vec<InnerSample>,
}

/// Everything emitted for one generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRecord {
    /// Generation index.
    pub generation: usize,
    /// Members in population order.
    pub members: Vec<MemberRecord>,
}

/// `generation | member | category | symbol | weight`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityRow {
    pub generation: usize,
    pub member: usize,
    pub category: Category,
    pub symbol: String,
    pub weight: f64,
}

/// `generation | member | aggregated_fitness | status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitnessRow {
    pub generation: usize,
    pub member: usize,
    pub aggregated_fitness: f64,
    pub status: EvaluationStatus,
}

/// `generation | member | inner_generation | heuristic | cost`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRow {
    pub generation: usize,
    pub member: usize,
    pub inner_generation: usize,
    pub heuristic: String,
    pub cost: f64,
}

impl GenerationRecord {
    /// Flatten term probabilities into rows.
    pub fn probability_rows(&self) -> Vec<ProbabilityRow> {
        let mut rows = Vec::new();
        for m in &self.members {
            for (category, weights) in &m.probabilities {
                for (symbol, weight) in weights {
                    rows.push(ProbabilityRow {
                        generation: self.generation,
                        member: m.member,
                        category: *category,
                        symbol: symbol.clone(),
                        weight: *weight,
                    });
                }
            }
        }
        rows
    }

    /// One fitness row per member.
    pub fn fitness_rows(&self) -> Vec<FitnessRow> {
        self.members
            .iter()
            .map(|m| FitnessRow {
                generation: self.generation,
                member: m.member,
                aggregated_fitness: m.aggregated_fitness,
                status: m.status,
            })
            .collect()
    }

    /// Inner history rows of every member.
    pub fn history_rows(&self) -> Vec<HistoryRow> {
        self.members
            .iter()
            .flat_map(|m| {
                m.history.iter().map(move |s| HistoryRow {
                    generation: self.generation,
                    member: m.member,
                    inner_generation: s.inner_generation,
                    heuristic: s.heuristic.clone(),
                    cost: s.cost,
                })
            })
            .collect()
    }
}

// ============================================================================
// Progress and Result Types
// ============================================================================

/// Current phase of the generational state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum EvolutionPhase {
    /// Building the initial population.
    #[default]
    Initializing,
    /// Calling the oracle for every member.
    Evaluating,
    /// Reducing oracle output to selection fitness.
    Aggregating,
    /// Drawing parents.
    Selecting,
    /// Crossing over parent pairs.
    Recombining,
    /// Mutating children.
    Mutating,
    /// Emitting the generation record.
    Logging,
    /// Budget exhausted.
    Terminated,
}

/// Summary statistics for one completed generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSummary {
    /// Generation index.
    pub generation: usize,
    /// Best raw aggregated fitness this generation.
    pub best_fitness: f64,
    /// Mean raw aggregated fitness this generation.
    pub mean_fitness: f64,
    /// Member that achieved the best fitness.
    pub best_member: usize,
    /// Number of timed-out members.
    pub timeouts: usize,
    /// Mean pairwise genome distance.
    pub diversity: f64,
}

/// Best member observed over the whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Champion {
    /// Generation it was evaluated in.
    pub generation: usize,
    /// Population index at that time.
    pub member: usize,
    /// Raw aggregated fitness.
    pub fitness: f64,
    /// The genome.
    pub genome: ProbabilityGenome,
}

/// Per-generation statistics for plotting.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EvolutionHistory {
    /// Best raw fitness per generation.
    pub best_fitness: Vec<f64>,
    /// Mean raw fitness per generation.
    pub mean_fitness: Vec<f64>,
    /// Diversity per generation.
    pub diversity: Vec<f64>,
    /// Timed-out evaluations per generation.
    pub timeouts: Vec<usize>,
}

impl EvolutionHistory {
    pub(crate) fn push(&mut self, summary: &GenerationSummary) {
        self.best_fitness.push(summary.best_fitness);
        self.mean_fitness.push(summary.mean_fitness);
        self.diversity.push(summary.diversity);
        self.timeouts.push(summary.timeouts);
    }
}

/// Progress update passed to run callbacks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionProgress {
    /// Generations completed.
    pub generation: usize,
    /// Current phase.
    pub phase: EvolutionPhase,
    /// Seconds since the run started.
    pub elapsed_seconds: f64,
    /// Latest generation summary.
    pub last: Option<GenerationSummary>,
    /// Best fitness seen so far.
    pub champion_fitness: Option<f64>,
}

/// Reason evolution stopped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum StopReason {
    /// Reached the configured generation count.
    MaxGenerations,
    /// Wall-clock budget exhausted.
    WallClockBudget,
}

/// Statistics from an evolution run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionStats {
    /// Generations completed.
    pub generations: usize,
    /// Oracle calls issued.
    pub total_evaluations: u64,
    /// Oracle calls that timed out.
    pub total_timeouts: u64,
    /// Time taken (in seconds).
    pub elapsed_seconds: f64,
    /// Seed the run used.
    pub random_seed: u64,
    /// Reason for stopping.
    pub stop_reason: StopReason,
}

/// Final result of an evolution run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionResult {
    /// Best member seen across all generations.
    pub champion: Option<Champion>,
    /// Population at termination.
    pub final_population: Vec<ProbabilityGenome>,
    /// Per-generation history.
    pub history: EvolutionHistory,
    /// Run statistics.
    pub stats: EvolutionStats,
}
