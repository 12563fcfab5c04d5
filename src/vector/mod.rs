//! Pinecone vector index integration.

pub mod client;
pub mod types;

pub use client::{PineconeIndex, PineconeSettings, VectorRetriever};
pub use types::RetrievedPassage;
