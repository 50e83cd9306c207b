pub mod backend;
pub mod error;
pub mod json_backend;
pub mod lexical;
pub mod serializer;

#[cfg(feature = "lancedb-backend")]
pub mod lancedb_backend;

pub use backend::{ListFilter, LexicalHit, OrderBy, OrderDir, StorageBackend, VectorHit};
pub use error::StorageError;
pub use json_backend::LocalJsonBackend;
pub use serializer::WriteSerializer;

#[cfg(feature = "lancedb-backend")]
pub use lancedb_backend::LanceDbBackend;
