//! Session orchestration: task decomposition, the supervisor loop and its
//! control handle.

pub mod control;
pub mod coordinator;
pub mod launcher;
pub mod tasks;

pub use control::SessionHandle;
pub use coordinator::{
    Coordinator, CoordinatorSettings, ProcessWorkerFactory, TickReport, WorkerFactory,
};
pub use launcher::{SessionLauncher, resolve_target_dir};
pub use tasks::{Complexity, TaskAssignment, TaskBreakdown, decompose_task, format_prompt};
