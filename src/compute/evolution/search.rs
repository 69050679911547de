//! Generational evolution loop over probability genomes.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info, warn};
use rayon::prelude::*;

use crate::schema::{
    Champion, ConfigError, EvaluationStatus, EvolutionConfig, EvolutionHistory, EvolutionPhase,
    EvolutionProgress, EvolutionResult, EvolutionStats, GenerationRecord, GenerationSummary,
    InnerSample, InvalidGenomeError, MemberRecord, ProbabilityGenome, SelectionConvention,
    StopReason, Termination,
};

use super::fitness::{
    AggregationError, EvaluationContext, FitnessOracle, FitnessResult, OracleError, Outcome,
    ProblemSource, combine_samples, evaluate_with_timeout,
};
use super::genome::{GenomeRng, population_diversity};
use super::ledger::{LedgerError, RunLedger};
use super::meta::MetaIndividual;
use super::selection::{InvalidFitnessError, select_parents, selection_weights};

/// Fitness assigned to timed-out members when no member of the generation
/// finished.
const DEFAULT_WORST_FITNESS: f64 = 1.0;

/// Oracle output for one member.
struct MemberEvaluation {
    results: Vec<FitnessResult>,
    timed_out: bool,
}

/// Evolution engine that runs the search.
pub struct EvolutionEngine<O: FitnessOracle> {
    config: EvolutionConfig,
    rng: GenomeRng,
    seed: u64,
    oracle: Arc<O>,
    problem: Arc<O::Problem>,
    pool: rayon::ThreadPool,
    population: Vec<MetaIndividual>,
    history: EvolutionHistory,
    generation: usize,
    phase: EvolutionPhase,
    last: Option<GenerationSummary>,
    champion: Option<Champion>,
    start: Instant,
    total_evaluations: u64,
    total_timeouts: u64,
}

impl<O: FitnessOracle> EvolutionEngine<O> {
    /// Create a new evolution engine with an initialized population.
    pub fn new(
        config: EvolutionConfig,
        oracle: O,
        problem: O::Problem,
    ) -> Result<Self, EvolutionError> {
        config.validate()?;

        let seed = config.random_seed.unwrap_or_else(rand::random);
        info!("Random seed: {seed}");

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.evaluation.workers.unwrap_or(0))
            .thread_name(|i| format!("evaluator-{i}"))
            .build()?;

        let mut engine = Self {
            config,
            rng: GenomeRng::new(seed),
            seed,
            oracle: Arc::new(oracle),
            problem: Arc::new(problem),
            pool,
            population: Vec::new(),
            history: EvolutionHistory::default(),
            generation: 0,
            phase: EvolutionPhase::Initializing,
            last: None,
            champion: None,
            start: Instant::now(),
            total_evaluations: 0,
            total_timeouts: 0,
        };
        engine.initialize()?;
        Ok(engine)
    }

    /// Load the configured problem from `source`, then build the engine.
    pub fn from_source<S>(config: EvolutionConfig, oracle: O, source: &S) -> Result<Self, EvolutionError>
    where
        S: ProblemSource<Problem = O::Problem>,
    {
        let problem = source
            .load_problem(&config.problem)
            .map_err(|err| EvolutionError::Problem {
                name: config.problem.clone(),
                source: err,
            })?;
        Self::new(config, oracle, problem)
    }

    /// Reset to a fresh random population at generation 0.
    pub fn initialize(&mut self) -> Result<(), EvolutionError> {
        self.phase = EvolutionPhase::Initializing;
        self.population = (0..self.config.population_size)
            .map(|_| {
                self.rng
                    .random_genome(&self.config.grammar, self.config.uniform_initialization)
                    .map(MetaIndividual::new)
            })
            .collect::<Result<_, _>>()?;

        self.generation = 0;
        self.history = EvolutionHistory::default();
        self.last = None;
        self.champion = None;
        self.start = Instant::now();
        self.total_evaluations = 0;
        self.total_timeouts = 0;

        self.check_population(&self.population)
    }

    /// Run one full generation and hand its record to `ledger`.
    ///
    /// A ledger failure is reported after the new population is installed,
    /// so the engine can keep going.
    pub fn step<L>(&mut self, ledger: &mut L) -> Result<GenerationSummary, EvolutionError>
    where
        L: RunLedger + ?Sized,
    {
        let generation = self.generation;
        let n = self.config.population_size;
        let convention = self.config.selection_convention;

        self.enter(EvolutionPhase::Evaluating);
        self.check_population(&self.population)?;
        let evaluations = self.evaluate_population()?;

        self.enter(EvolutionPhase::Aggregating);
        let raw = self.aggregate(&evaluations)?;
        let worst = worst_case(&raw, convention);
        let raw_fitness: Vec<f64> = raw.iter().map(|r| r.unwrap_or(worst)).collect();

        let aggregated: Vec<f64> = match &self.config.smoothing {
            Some(smoothing) => self
                .population
                .iter_mut()
                .zip(&raw_fitness)
                .map(|(member, &f)| member.update_fitness(f, smoothing.gamma))
                .collect(),
            None => self
                .population
                .iter_mut()
                .zip(&raw_fitness)
                .map(|(member, &f)| {
                    member.fitness = Some(f);
                    f
                })
                .collect(),
        };
        let weights = selection_weights(&aggregated, convention);

        let summary = self.summarize(&raw_fitness, &evaluations);
        self.update_champion(&raw);
        let record = self.build_record(&raw_fitness, &aggregated, &weights, evaluations);
        self.check_population(&self.population)?;

        if self.config.evolve {
            self.enter(EvolutionPhase::Selecting);
            let rng = self.rng.rng_mut();
            let first = select_parents(&mut *rng, &self.population, &weights, n);
            let second = select_parents(&mut *rng, &self.population, &weights, n);
            let (first, second) = match (first, second) {
                (Ok(first), Ok(second)) => (first, second),
                (Err(source), _) | (_, Err(source)) => {
                    return Err(EvolutionError::InvalidFitness { generation, source });
                }
            };

            // `first` and `second` borrow the population, so only the phase
            // field is touched here.
            self.phase = EvolutionPhase::Recombining;
            debug!("Generation {generation}: {:?}", self.phase);
            let crossover = self.config.crossover;
            let children: Vec<MetaIndividual> = first
                .iter()
                .zip(&second)
                .map(|(a, b)| a.crossover(b, &mut self.rng, crossover))
                .collect();
            self.check_population(&children)?;

            self.enter(EvolutionPhase::Mutating);
            let probability = self.config.mutation_probability;
            let mutation = self.config.mutation.clone();
            let children: Vec<MetaIndividual> = children
                .iter()
                .map(|child| child.mutate(probability, &mut self.rng, &mutation))
                .collect();
            self.check_population(&children)?;

            self.population = children;
        }

        self.enter(EvolutionPhase::Logging);
        self.generation += 1;
        self.history.push(&summary);
        self.last = Some(summary.clone());

        info!(
            "Generation {}: best={:.4} (member {}) mean={:.4} diversity={:.4} timeouts={}",
            summary.generation,
            summary.best_fitness,
            summary.best_member,
            summary.mean_fitness,
            summary.diversity,
            summary.timeouts
        );

        if let Err(source) = ledger.record(&record) {
            error!("Ledger failed for generation {generation}: {source}");
            return Err(EvolutionError::Ledger { generation, source });
        }

        Ok(summary)
    }

    /// Evaluate all members in parallel, each call under a hard timeout.
    fn evaluate_population(&mut self) -> Result<Vec<MemberEvaluation>, EvolutionError> {
        let generation = self.generation;
        let samples = self.config.evaluation.samples_per_member;
        let budget = self.config.evaluation.oracle_budget();
        let timeout = self.config.evaluation.hard_timeout();

        // Seeds are drawn before the parallel section so results do not
        // depend on scheduling.
        let seeds: Vec<Vec<u64>> = (0..self.population.len())
            .map(|_| (0..samples).map(|_| self.rng.next_seed()).collect())
            .collect();

        let oracle = &self.oracle;
        let problem = &self.problem;
        let population = &self.population;

        let results: Vec<Result<MemberEvaluation, EvolutionError>> = self.pool.install(|| {
            population
                .par_iter()
                .zip(seeds.par_iter())
                .enumerate()
                .map(|(member, (individual, seeds))| {
                    let mut evaluation = MemberEvaluation {
                        results: Vec::with_capacity(seeds.len()),
                        timed_out: false,
                    };
                    for (sample, &seed) in seeds.iter().enumerate() {
                        let ctx = EvaluationContext {
                            generation,
                            member,
                            sample,
                            seed,
                            budget,
                        };
                        let outcome =
                            evaluate_with_timeout(oracle, problem, &individual.genome, ctx, timeout)
                                .map_err(|source| EvolutionError::Oracle {
                                    generation,
                                    member,
                                    source,
                                })?;
                        match outcome {
                            Outcome::Completed(result) => {
                                debug!("Generation {generation} member {member} sample {sample}: {result:?}");
                                evaluation.results.push(result);
                            }
                            Outcome::TimedOut => {
                                warn!(
                                    "Generation {generation} member {member} timed out after {:.1}s",
                                    timeout.as_secs_f64()
                                );
                                evaluation.timed_out = true;
                                break;
                            }
                        }
                    }
                    Ok(evaluation)
                })
                .collect()
        });

        let evaluations: Vec<MemberEvaluation> = results.into_iter().collect::<Result<_, _>>()?;
        let calls: usize = evaluations
            .iter()
            .map(|e| e.results.len() + usize::from(e.timed_out))
            .sum();
        self.total_evaluations += calls as u64;
        self.total_timeouts += evaluations.iter().filter(|e| e.timed_out).count() as u64;
        Ok(evaluations)
    }

    /// Scalarize each member; `None` marks a timeout.
    fn aggregate(
        &self,
        evaluations: &[MemberEvaluation],
    ) -> Result<Vec<Option<f64>>, EvolutionError> {
        let strategy = &self.config.aggregation;
        evaluations
            .iter()
            .enumerate()
            .map(|(member, evaluation)| {
                if evaluation.timed_out {
                    return Ok(None);
                }
                let wrap = |source| EvolutionError::Aggregation {
                    generation: self.generation,
                    member,
                    source,
                };
                let values = evaluation
                    .results
                    .iter()
                    .map(|r| r.aggregate(strategy))
                    .collect::<Result<Vec<f64>, AggregationError>>()
                    .map_err(wrap)?;
                combine_samples(&values, strategy).map(Some).map_err(wrap)
            })
            .collect()
    }

    fn summarize(&self, raw_fitness: &[f64], evaluations: &[MemberEvaluation]) -> GenerationSummary {
        let convention = self.config.selection_convention;
        let mut best_member = 0;
        for (i, &f) in raw_fitness.iter().enumerate() {
            if convention.is_better(f, raw_fitness[best_member]) {
                best_member = i;
            }
        }

        GenerationSummary {
            generation: self.generation,
            best_fitness: raw_fitness[best_member],
            mean_fitness: raw_fitness.iter().sum::<f64>() / raw_fitness.len() as f64,
            best_member,
            timeouts: evaluations.iter().filter(|e| e.timed_out).count(),
            diversity: population_diversity(self.population.iter().map(|m| &m.genome)),
        }
    }

    /// Track the best evaluated member of the run. Timed-out members never
    /// become champion.
    fn update_champion(&mut self, raw: &[Option<f64>]) {
        let convention = self.config.selection_convention;
        for (member, fitness) in raw.iter().enumerate() {
            let Some(fitness) = *fitness else { continue };
            let better = match &self.champion {
                Some(champion) => convention.is_better(fitness, champion.fitness),
                None => true,
            };
            if better {
                self.champion = Some(Champion {
                    generation: self.generation,
                    member,
                    fitness,
                    genome: self.population[member].genome.clone(),
                });
            }
        }
    }

    fn build_record(
        &self,
        raw_fitness: &[f64],
        aggregated: &[f64],
        weights: &[f64],
        evaluations: Vec<MemberEvaluation>,
    ) -> GenerationRecord {
        let smoothed = self.config.smoothing.is_some();
        let members = self
            .population
            .iter()
            .zip(evaluations)
            .enumerate()
            .map(|(member, (individual, evaluation))| MemberRecord {
                member,
                probabilities: individual.genome.to_mapping(),
                number_weight: individual.genome.number_weight(),
                raw_fitness: raw_fitness[member],
                smoothed_fitness: if smoothed {
                    Some(aggregated[member])
                } else {
                    None
                },
                aggregated_fitness: aggregated[member],
                selection_weight: weights[member],
                status: if evaluation.timed_out {
                    EvaluationStatus::TimedOut
                } else {
                    EvaluationStatus::Evaluated
                },
                history: evaluation
                    .results
                    .iter()
                    .flat_map(|r| r.history())
                    .collect::<Vec<InnerSample>>(),
            })
            .collect();

        GenerationRecord {
            generation: self.generation,
            members,
        }
    }

    fn enter(&mut self, phase: EvolutionPhase) {
        debug!("Generation {}: {:?}", self.generation, phase);
        self.phase = phase;
    }

    fn check_population(&self, members: &[MetaIndividual]) -> Result<(), EvolutionError> {
        if members.len() != self.config.population_size {
            return Err(EvolutionError::PopulationSize {
                phase: self.phase,
                expected: self.config.population_size,
                actual: members.len(),
            });
        }
        Ok(())
    }

    /// Check if evolution should stop.
    pub fn should_stop(&self) -> Option<StopReason> {
        match self.config.termination {
            Termination::MaxGenerations { generations } if self.generation >= generations => {
                Some(StopReason::MaxGenerations)
            }
            Termination::WallClock { seconds } if self.start.elapsed().as_secs_f64() >= seconds => {
                Some(StopReason::WallClockBudget)
            }
            _ => None,
        }
    }

    /// Get current progress.
    pub fn progress(&self) -> EvolutionProgress {
        EvolutionProgress {
            generation: self.generation,
            phase: self.phase,
            elapsed_seconds: self.start.elapsed().as_secs_f64(),
            last: self.last.clone(),
            champion_fitness: self.champion.as_ref().map(|c| c.fitness),
        }
    }

    /// Run evolution with progress callback.
    pub fn run_with_callback<L, F>(
        &mut self,
        ledger: &mut L,
        mut callback: F,
    ) -> Result<EvolutionResult, EvolutionError>
    where
        L: RunLedger + ?Sized,
        F: FnMut(&EvolutionProgress),
    {
        let stop_reason = loop {
            if let Some(reason) = self.should_stop() {
                break reason;
            }
            self.step(ledger)?;
            callback(&self.progress());
        };

        self.enter(EvolutionPhase::Terminated);
        ledger
            .finish()
            .map_err(|source| EvolutionError::Ledger {
                generation: self.generation,
                source,
            })?;

        let result = self.result(stop_reason);
        info!(
            "Stopped after {} generations ({:?}), {} evaluations, {} timeouts, {:.1}s",
            result.stats.generations,
            result.stats.stop_reason,
            result.stats.total_evaluations,
            result.stats.total_timeouts,
            result.stats.elapsed_seconds
        );
        Ok(result)
    }

    /// Run evolution (blocking).
    pub fn run<L>(&mut self, ledger: &mut L) -> Result<EvolutionResult, EvolutionError>
    where
        L: RunLedger + ?Sized,
    {
        self.run_with_callback(ledger, |_| {})
    }

    fn result(&self, stop_reason: StopReason) -> EvolutionResult {
        EvolutionResult {
            champion: self.champion.clone(),
            final_population: self.genomes().cloned().collect(),
            history: self.history.clone(),
            stats: EvolutionStats {
                generations: self.generation,
                total_evaluations: self.total_evaluations,
                total_timeouts: self.total_timeouts,
                elapsed_seconds: self.start.elapsed().as_secs_f64(),
                random_seed: self.seed,
                stop_reason,
            },
        }
    }

    pub fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    pub fn population(&self) -> &[MetaIndividual] {
        &self.population
    }

    pub fn genomes(&self) -> impl Iterator<Item = &ProbabilityGenome> {
        self.population.iter().map(|m| &m.genome)
    }

    /// Generations completed.
    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn phase(&self) -> EvolutionPhase {
        self.phase
    }

    pub fn champion(&self) -> Option<&Champion> {
        self.champion.as_ref()
    }

    pub fn history(&self) -> &EvolutionHistory {
        &self.history
    }

    /// Seed the run was started with.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

/// Value given to timed-out members: the worst finite value of the
/// generation, or [`DEFAULT_WORST_FITNESS`] if nothing finished.
fn worst_case(raw: &[Option<f64>], convention: SelectionConvention) -> f64 {
    let finished = raw.iter().flatten().copied();
    let worst = match convention {
        SelectionConvention::LowerIsBetter => finished.fold(f64::NEG_INFINITY, f64::max),
        SelectionConvention::HigherIsBetter => finished.fold(f64::INFINITY, f64::min),
    };
    if worst.is_finite() {
        worst
    } else {
        DEFAULT_WORST_FITNESS
    }
}

/// Evolution errors. All of them end the run.
#[derive(Debug, thiserror::Error)]
pub enum EvolutionError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Invalid genome: {0}")]
    Genome(#[from] InvalidGenomeError),
    #[error("Failed to load problem {name:?}: {source}")]
    Problem { name: String, source: OracleError },
    #[error("Oracle failed in generation {generation} for member {member}: {source}")]
    Oracle {
        generation: usize,
        member: usize,
        source: OracleError,
    },
    #[error("Unusable oracle result in generation {generation} for member {member}: {source}")]
    Aggregation {
        generation: usize,
        member: usize,
        source: AggregationError,
    },
    #[error("Selection failed in generation {generation}: {source}")]
    InvalidFitness {
        generation: usize,
        source: InvalidFitnessError,
    },
    #[error("Population has {actual} members during {phase:?}, expected {expected}")]
    PopulationSize {
        phase: EvolutionPhase,
        expected: usize,
        actual: usize,
    },
    #[error("Ledger failed after generation {generation}: {source}")]
    Ledger {
        generation: usize,
        source: LedgerError,
    },
    #[error("Failed to build evaluation pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
