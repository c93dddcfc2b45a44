//! Pipeline scheduling.
//!
//! Schedules are declarative entries (`Manual`, `OnStartup`, `Scheduled`);
//! the [`Scheduler`] turns them into independent cancellable loops over a
//! shared [`crate::runner::PipelineRunner`].

mod policy;
mod scheduler;

pub use policy::{ExecutionPolicy, PipelineSchedule};
pub use scheduler::{LoopReport, Scheduler, SchedulerReport};
