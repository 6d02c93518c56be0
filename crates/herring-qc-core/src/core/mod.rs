//! Herring QC Core
//!
//! Quality-control rule engine and its settings.

pub mod qc;
pub mod settings;

// Re-export common types
mod types;
pub use types::*;

mod error;
pub use error::*;

#[cfg(test)]
mod tests_scenarios;
