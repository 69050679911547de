//! Schema module - Genome, configuration and record types for heuristic evolution.

mod evolution;
mod genome;
mod record;

pub use evolution::*;
pub use genome::*;
pub use record::*;
