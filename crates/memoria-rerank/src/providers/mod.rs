pub mod cohere;
pub mod jina;
pub mod pinecone;

pub use cohere::CohereRerankProvider;
pub use jina::JinaRerankProvider;
pub use pinecone::PineconeRerankProvider;
