//! Gradient-based meta-learning for spoken-word classification.
//!
//! Implements the per-episode inner/outer loop orchestration for four
//! algorithm variants (VanillaMAML, Reptile, and the class-incremental
//! continual learners FSCL and OML) over any model implementing the
//! [`model::EpisodicModel`] contract. Episode index construction lives in
//! the `episodes` crate; this crate owns the tensor side: batch splitting,
//! loss/accuracy, fast-weight adaptation, parameter snapshots, and the
//! outer training loop with checkpointing.

pub mod algorithms;
pub mod batch;
pub mod loss;
pub mod metrics;
pub mod model;
pub mod trainer;
