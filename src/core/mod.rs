//! Core data types shared by the agent, stores, and CLI.

pub mod chunk;
pub mod filter;

pub use chunk::{ScoredChunk, SearchMode, SearchRequest, render_context};
pub use filter::{DocumentRef, DocumentSource, SearchFilter};
