//! Compute module - Evolutionary search over probability genomes.

pub mod evolution;
