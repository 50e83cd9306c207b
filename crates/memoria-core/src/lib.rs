pub mod clock;
pub mod config;
pub mod error;
pub mod model;
pub mod predicate;
pub mod stats;

pub use clock::{age_days, now_ms};
pub use config::*;
pub use error::MemoriaError;
pub use model::*;
pub use predicate::{validate_id, PredicateBuilder};
pub use stats::MemoryStats;
