pub mod dedup;
pub mod extractor;
pub mod manager;
pub mod retriever;
pub mod scorer;

pub use dedup::{DedupDecision, Deduplicator, MergedText};
pub use extractor::{ExtractedMemory, Extractor, Turn};
pub use manager::{
    BuildContextOptions, ExportPayload, Manager, ManagerDeps, RecallOptions, StoreOptions,
};
pub use retriever::{build_context, sanitize_markup, RetrievalOptions, RetrievalResult, Retriever, ScoredMemory};
pub use scorer::{ScoreBreakdown, ScoreInputs};
