//! Dividend trend screener
//!
//! Resolves a symbol universe, pulls bulk and per-symbol market data, fits a
//! price trend per symbol and keeps steady dividend payers, ranked by a
//! bounded composite score.

pub mod acquisition;
pub mod aggregator;
pub mod filters;
pub mod pipeline;
pub mod scoring;
pub mod universe;

pub use aggregator::{build_output, write_output};
pub use filters::Gate;
pub use pipeline::{AbsentReason, Pipeline, Providers, RunSummary, TaskOutcome};
pub use universe::{explicit_universe, UniverseResolver, SEED_SYMBOLS};
