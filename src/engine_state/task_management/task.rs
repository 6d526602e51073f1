//! # Task System Core Trait
//!
//! A `Task` is a self-contained unit of work executed on a worker thread. Tasks own
//! everything they need (typically an `Arc<Chunk>` plus shared context) and report
//! their outcome through the chunk they were handed and the pipeline counters, not
//! through a return value.
//!
//! ## Task Lifecycle
//! 1. A task is created and published via [`TaskQueue::try_publish`](super::TaskQueue::try_publish)
//! 2. A worker thread of the owning [`WorkerPool`](super::WorkerPool) pulls it
//! 3. The worker calls `process()`, consuming the task
//!
//! ## Thread Safety
//! - `Task` must be `Send` to be transferred to the worker
//! - Shared state reached through the task must provide its own synchronization

/// A unit of work that can be executed asynchronously.
///
/// # Implementation Guidelines
/// - Should be relatively coarse-grained to amortize scheduling overhead
/// - Should handle its own errors; a task that panics is logged and discarded
/// - Should re-check the state of whatever it was handed, since it may have sat in the
///   queue while the world moved on
pub trait Task: Send {
    /// Performs the work, consuming the task.
    fn process(self: Box<Self>);

    /// Short label used in logs.
    fn label(&self) -> String {
        String::from("task")
    }
}
