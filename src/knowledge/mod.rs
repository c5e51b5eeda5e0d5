//! Retrieval-augmented question answering over uploaded university documents.
//!
//! A question flows through [`resolver`] (which universities it is about),
//! [`retriever`] (which chunks answer it), [`context`] (bounded context text)
//! and [`answer`] (generated or extractive answer). [`manager`] ties the
//! stages together and also owns ingestion.

pub mod answer;
pub mod chunker;
pub mod context;
pub mod entities;
pub mod formatting;
pub mod manager;
pub mod memory_store;
pub mod resolver;
pub mod retriever;
pub mod store;
pub mod types;

#[cfg(test)]
mod retriever_tests;

pub use manager::{ContextOutcome, KnowledgeManager};
pub use memory_store::MemoryDocumentStore;
pub use store::{DocumentStore, LanceKnowledgeStore};
