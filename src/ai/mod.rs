//! Decision heuristics
//!
//! Handles the spending decisions made on every menu visit.

pub mod economy;

pub use economy::{EconomyActions, EconomyPlanner, EconomyState, PlanOutcome};
