//! Vector index and retrieval

mod retriever;
mod search;

pub use retriever::Retriever;
pub use search::SqliteVectorStore;
