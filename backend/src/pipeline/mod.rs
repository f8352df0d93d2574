//! Batch pipeline: per-image transform, archive assembly and the orchestrator
//! tying them to the task pool.

pub mod archive;
pub mod error;
pub mod geometry;
pub mod orchestrator;
pub mod transform;
