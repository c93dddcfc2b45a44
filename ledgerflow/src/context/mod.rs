//! Run context construction and validation.

mod run_context;

pub use run_context::PipelineContext;
