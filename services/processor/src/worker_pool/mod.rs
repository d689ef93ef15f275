//! Worker pool for transaction processing
//!
//! A fixed set of workers share one bounded input queue. Every processed
//! transaction goes to the result listener for persistence, and hard failures
//! are additionally routed to the error listener.

mod listeners;
mod pool;
pub mod simulation;
mod worker;

// Re-export the main interface
pub use pool::WorkerPool;

// Re-export components that might be useful for testing
pub use listeners::{ErrorListener, ResultListener};
pub use simulation::{
    clock_seeded_factory, decide, seeded_factory, sequence_factory, Outcome, RandomSource,
    RngFactory, SequenceSource,
};
pub use worker::{Worker, WorkerSettings};
