//! Pipeline orchestration for relayscout.
//!
//! This crate ties together discovery, geo filtering, liveness probing, and
//! playlist assembly into the end-to-end run (`run_pipeline`).

pub mod assembler;
pub mod filter;
pub mod pipeline;
pub mod probe;
