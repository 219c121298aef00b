//! In-memory vector index and durable, Qdrant-backed session storage.

pub mod session_store;
pub mod vector_index;

pub use session_store::{QdrantSessionStore, SessionStore};
pub use vector_index::VectorIndex;
