//! # quill-core
//!
//! Core types, traits, and abstractions for the quill clustering engine.
//!
//! This crate provides the foundational data structures and trait definitions
//! that other quill crates depend on: domain models (notes, embeddings,
//! clusters, tasks), the error taxonomy, clustering policy configuration,
//! and the repository/backend traits implemented by `quill-db` and
//! `quill-inference`.

pub mod config;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use config::ClusteringConfig;
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;
