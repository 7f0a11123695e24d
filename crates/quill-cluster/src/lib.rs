//! # quill-cluster
//!
//! The incremental semantic clustering engine: streaming nearest-centroid
//! assignment with split/merge maintenance, a full-corpus rebuild, and the
//! bulk LLM-tag batch classification path.
//!
//! - [`vector`]: pure similarity/centroid math
//! - [`naming`]: heuristic cluster names from member text
//! - [`engine`]: [`ClassificationEngine`] for classify, cleanup, reclassify
//! - [`batch`]: [`BatchClassifier`] for resumable bulk tagging and grouping
//! - [`pause`]: cooperative pause signal for the batch runner

pub mod batch;
pub mod engine;
pub mod naming;
pub mod pause;
pub mod vector;

pub use batch::{merge_and_group_results, BatchClassifier};
pub use engine::ClassificationEngine;
pub use naming::derive_cluster_name;
pub use pause::PauseToken;
pub use vector::{
    centroid, cosine_similarity, find_nearest_cluster, find_similar_notes, NearestCluster,
};
