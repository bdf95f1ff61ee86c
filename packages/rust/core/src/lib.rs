//! Core splitting logic and pipeline orchestration for papersplit.
//!
//! This crate ties together source resolution, Markdown conversion, section
//! tree building and output materialization into end-to-end workflows
//! (e.g., [`pipeline::split_source`] and [`pipeline::run_batch`]).

pub mod appendix;
pub mod assembler;
pub mod figures;
pub mod outline;
pub mod pipeline;
