//! Episode construction primitives for few-shot and continual meta-learning.
//!
//! Everything here operates on plain label and index sequences rather than
//! tensor types, so the same machinery serves any backend. Provides label
//! randomization,
//! interleaved support/query indexing, the class-incremental curriculum
//! partition, and an N-way/K-shot episode sampler over a labeled dataset.

pub mod curriculum;
pub mod labels;
pub mod sampler;

pub use curriculum::{class_batches, unique_labels};
pub use labels::{interleaved_indexes, randomize_labels};
pub use sampler::{EpisodePlan, EpisodeSampler};
