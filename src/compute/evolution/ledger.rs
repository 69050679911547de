//! Record sinks for generation output.
//!
//! The engine hands each [`GenerationRecord`] to a [`RunLedger`] once the
//! generation is fully installed. [`FileLedger`] writes pipe-separated logs,
//! [`MemoryLedger`] keeps the records for inspection.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::schema::{
    EvolutionConfig, EvolutionResult, FitnessRow, GenerationRecord, HistoryRow, ProbabilityRow,
};

/// Sink for per-generation records.
pub trait RunLedger {
    /// Append one generation.
    fn record(&mut self, record: &GenerationRecord) -> Result<(), LedgerError>;

    /// Called once when the run terminates.
    fn finish(&mut self) -> Result<(), LedgerError> {
        Ok(())
    }
}

/// Ledger errors.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: Vec<GenerationRecord>,
    finished: bool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[GenerationRecord] {
        &self.records
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn probability_rows(&self) -> Vec<ProbabilityRow> {
        self.records
            .iter()
            .flat_map(|r| r.probability_rows())
            .collect()
    }

    pub fn fitness_rows(&self) -> Vec<FitnessRow> {
        self.records.iter().flat_map(|r| r.fitness_rows()).collect()
    }

    pub fn history_rows(&self) -> Vec<HistoryRow> {
        self.records.iter().flat_map(|r| r.history_rows()).collect()
    }
}

impl RunLedger for MemoryLedger {
    fn record(&mut self, record: &GenerationRecord) -> Result<(), LedgerError> {
        self.records.push(record.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), LedgerError> {
        self.finished = true;
        Ok(())
    }
}

/// Escape a free-text field so it cannot break the ` | ` column layout.
///
/// Backslashes, pipes and line breaks are written as `\\`, `\|`, `\n`
/// and `\r`.
fn escape_field(field: &str) -> String {
    let mut escaped = String::with_capacity(field.len());
    for c in field.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '|' => escaped.push_str("\\|"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Writes three pipe-separated logs under an output directory.
pub struct FileLedger {
    dir: PathBuf,
    probabilities: BufWriter<File>,
    fitness: BufWriter<File>,
    heuristics: BufWriter<File>,
}

impl FileLedger {
    pub const PROBABILITIES_FILE: &'static str = "probabilities.log";
    pub const FITNESS_FILE: &'static str = "fitness.log";
    pub const HEURISTICS_FILE: &'static str = "heuristics.log";

    /// Create the directory and the log files, writing a header line to each.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut probabilities = BufWriter::new(File::create(dir.join(Self::PROBABILITIES_FILE))?);
        writeln!(probabilities, "generation | member | category | symbol | weight")?;

        let mut fitness = BufWriter::new(File::create(dir.join(Self::FITNESS_FILE))?);
        writeln!(fitness, "generation | member | aggregated_fitness | status")?;

        let mut heuristics = BufWriter::new(File::create(dir.join(Self::HEURISTICS_FILE))?);
        writeln!(
            heuristics,
            "generation | member | inner_generation | heuristic | cost"
        )?;

        Ok(Self {
            dir,
            probabilities,
            fitness,
            heuristics,
        })
    }

    /// Output directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn flush(&mut self) -> Result<(), LedgerError> {
        self.probabilities.flush()?;
        self.fitness.flush()?;
        self.heuristics.flush()?;
        Ok(())
    }
}

impl RunLedger for FileLedger {
    fn record(&mut self, record: &GenerationRecord) -> Result<(), LedgerError> {
        for row in record.probability_rows() {
            writeln!(
                self.probabilities,
                "{} | {} | {} | {} | {}",
                row.generation, row.member, row.category, row.symbol, row.weight
            )?;
        }
        for row in record.fitness_rows() {
            writeln!(
                self.fitness,
                "{} | {} | {} | {}",
                row.generation,
                row.member,
                row.aggregated_fitness,
                row.status.marker()
            )?;
        }
        for row in record.history_rows() {
            writeln!(
                self.heuristics,
                "{} | {} | {} | {} | {}",
                row.generation,
                row.member,
                row.inner_generation,
                escape_field(&row.heuristic),
                row.cost
            )?;
        }
        // Keep the logs complete up to the last generation.
        self.flush()
    }

    fn finish(&mut self) -> Result<(), LedgerError> {
        self.flush()
    }
}

#[derive(Serialize)]
struct RunSummary<'a> {
    config: &'a EvolutionConfig,
    result: &'a EvolutionResult,
}

/// Write the configuration and run result to `summary.json`.
pub fn write_summary(
    dir: impl AsRef<Path>,
    config: &EvolutionConfig,
    result: &EvolutionResult,
) -> Result<PathBuf, LedgerError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let path = dir.join("summary.json");
    let json = serde_json::to_string_pretty(&RunSummary { config, result })?;
    fs::write(&path, json)?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{
        EvaluationStatus, EvolutionHistory, EvolutionStats, Grammar, InnerSample, MemberRecord,
        ProbabilityGenome, StopReason,
    };
    use tempfile::TempDir;

    fn record(generation: usize) -> GenerationRecord {
        let genome = ProbabilityGenome::uniform(&Grammar::default()).unwrap();
        let members = (0..3)
            .map(|member| MemberRecord {
                member,
                probabilities: genome.to_mapping(),
                number_weight: genome.number_weight(),
                raw_fitness: 1.5,
                smoothed_fitness: None,
                aggregated_fitness: 1.5,
                selection_weight: 1.5,
                status: if member == 2 {
                    EvaluationStatus::TimedOut
                } else {
                    EvaluationStatus::Evaluated
                },
                history: vec![InnerSample {
                    inner_generation: 0,
                    heuristic: "(max deltaX deltaY)".to_string(),
                    cost: 12.0,
                }],
            })
            .collect();
        GenerationRecord {
            generation,
            members,
        }
    }

    #[test]
    fn test_memory_ledger() {
        let mut ledger = MemoryLedger::new();
        ledger.record(&record(0)).unwrap();
        ledger.record(&record(1)).unwrap();
        ledger.finish().unwrap();

        assert!(ledger.is_finished());
        assert_eq!(ledger.records().len(), 2);
        assert_eq!(ledger.fitness_rows().len(), 6);
        assert_eq!(ledger.probability_rows().len(), 2 * 3 * 16);
        assert_eq!(ledger.history_rows().len(), 6);
    }

    #[test]
    fn test_file_ledger_rows() {
        let dir = TempDir::new().unwrap();
        let mut ledger = FileLedger::create(dir.path().join("run")).unwrap();
        ledger.record(&record(0)).unwrap();
        ledger.finish().unwrap();

        let fitness = fs::read_to_string(dir.path().join("run/fitness.log")).unwrap();
        let lines: Vec<&str> = fitness.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "generation | member | aggregated_fitness | status");
        assert_eq!(lines[1], "0 | 0 | 1.5 | ok");
        assert_eq!(lines[3], "0 | 2 | 1.5 | timeout");

        let probabilities = fs::read_to_string(dir.path().join("run/probabilities.log")).unwrap();
        assert_eq!(probabilities.lines().count(), 1 + 3 * 16);
        assert!(probabilities.contains("0 | 1 | terminal | deltaX | "));

        let heuristics = fs::read_to_string(dir.path().join("run/heuristics.log")).unwrap();
        assert_eq!(
            heuristics.lines().nth(1),
            Some("0 | 0 | 0 | (max deltaX deltaY) | 12")
        );
    }

    #[test]
    fn test_heuristic_labels_are_escaped() {
        let dir = TempDir::new().unwrap();
        let mut record = record(0);
        record.members[0].history[0].heuristic = "a | b\\c\nd".to_string();
        let mut ledger = FileLedger::create(dir.path()).unwrap();
        ledger.record(&record).unwrap();
        ledger.finish().unwrap();

        let heuristics = fs::read_to_string(dir.path().join("heuristics.log")).unwrap();
        assert_eq!(heuristics.lines().count(), 1 + 3);
        let row = heuristics.lines().nth(1).unwrap();
        assert_eq!(row, "0 | 0 | 0 | a \\| b\\\\c\\nd | 12");
        assert!(
            heuristics
                .lines()
                .all(|line| line.split(" | ").count() == 5)
        );
    }

    #[test]
    fn test_write_summary() {
        let dir = TempDir::new().unwrap();
        let config = EvolutionConfig::default();
        let result = EvolutionResult {
            champion: None,
            final_population: vec![ProbabilityGenome::uniform(&config.grammar).unwrap()],
            history: EvolutionHistory::default(),
            stats: EvolutionStats {
                generations: 0,
                total_evaluations: 0,
                total_timeouts: 0,
                elapsed_seconds: 0.0,
                random_seed: 42,
                stop_reason: StopReason::MaxGenerations,
            },
        };

        let path = write_summary(dir.path(), &config, &result).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["config"]["population_size"], 50);
        assert_eq!(json["result"]["stats"]["random_seed"], 42);
    }
}
