//! # Task Management System
//!
//! This module provides the worker pools that run the generation and meshing stages of
//! the chunk pipeline.
//!
//! ## Architecture Overview
//!
//! - [`WorkerPool`]: a fixed set of named OS threads sharing one bounded queue
//! - [`TaskQueue`]: the cloneable producer side of that queue
//! - [`Task`]: a unit of work executed on a worker
//!
//! Queues are bounded `crossbeam-channel` channels, so both the manager and other
//! workers can publish without locks, and producers never block: a full queue hands
//! the task back to the caller, who decides whether to retry later or drop it.
//!
//! ## Worker Loop
//!
//! Each worker blocks in `select!` on its task queue and a shutdown channel; there is
//! no polling interval. Shutdown is signalled by dropping the shutdown sender, which
//! wakes every worker at once. A worker finishes the task it is running before it
//! exits, so no task is abandoned halfway through a write.
//!
//! ## Accounting
//!
//! A task counts as pending from the moment it is accepted by the queue until a worker
//! has finished processing it. The pending count is what the manager uses to decide
//! whether the pipeline is idle.

pub mod task;

use std::{
    any::Any,
    io,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{bounded, select, Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{error, info, warn};
use task::Task;
use web_time::Instant;

/// Extracts the message from a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Producer side of a worker pool's queue.
#[derive(Clone)]
pub struct TaskQueue {
    sender: Sender<Box<dyn Task>>,
    pending: Arc<AtomicUsize>,
}

impl TaskQueue {
    /// Offers a task to the pool without blocking.
    ///
    /// # Returns
    /// - `Ok(())` if the task was queued
    /// - `Err(task)` if the queue is full or the pool has shut down
    pub fn try_publish(&self, task: Box<dyn Task>) -> Result<(), Box<dyn Task>> {
        self.pending.fetch_add(1, Ordering::AcqRel);
        match self.sender.try_send(task) {
            Ok(()) => Ok(()),
            Err(error) => {
                self.pending.fetch_sub(1, Ordering::AcqRel);
                Err(error.into_inner())
            }
        }
    }

    /// Number of tasks waiting in the queue.
    pub fn len(&self) -> usize {
        self.sender.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }

    /// Maximum number of waiting tasks.
    pub fn capacity(&self) -> usize {
        self.sender.capacity().unwrap_or(usize::MAX)
    }

    /// Tasks accepted but not yet finished, queued and running combined.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

/// A fixed-size pool of worker threads fed by one bounded queue.
pub struct WorkerPool {
    name: String,
    queue: TaskQueue,
    shutdown: Option<Sender<()>>,
    exited: Receiver<()>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `workers` threads named `"{name}-{index}"`.
    ///
    /// # Arguments
    /// * `name` - Pool name, used for thread names and logs
    /// * `workers` - Number of worker threads
    /// * `capacity` - Maximum number of queued tasks
    ///
    /// # Returns
    /// The running pool, or the OS error if a thread could not be spawned. Threads that
    /// were already started are shut down before the error is returned.
    pub fn new(name: &str, workers: usize, capacity: usize) -> io::Result<Self> {
        let (task_tx, task_rx) = bounded::<Box<dyn Task>>(capacity);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let (exit_tx, exit_rx) = bounded::<()>(0);
        let pending = Arc::new(AtomicUsize::new(0));

        let mut pool = WorkerPool {
            name: name.to_string(),
            queue: TaskQueue {
                sender: task_tx,
                pending: pending.clone(),
            },
            shutdown: Some(shutdown_tx),
            exited: exit_rx,
            handles: Vec::with_capacity(workers),
        };

        for index in 0..workers {
            let worker = Worker {
                name: format!("{name}-{index}"),
                tasks: task_rx.clone(),
                shutdown: shutdown_rx.clone(),
                pending: pending.clone(),
                _exit: exit_tx.clone(),
            };
            let spawned = thread::Builder::new()
                .name(worker.name.clone())
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => pool.handles.push(handle),
                Err(error) => {
                    drop(exit_tx);
                    pool.shutdown(Instant::now());
                    return Err(error);
                }
            }
        }

        info!("Started {} pool with {} workers", name, workers);
        Ok(pool)
    }

    /// A producer handle for this pool's queue.
    pub fn queue(&self) -> TaskQueue {
        self.queue.clone()
    }

    /// Number of tasks waiting in the queue.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Tasks accepted but not yet finished.
    pub fn pending(&self) -> usize {
        self.queue.pending()
    }

    /// Number of worker threads still attached to the pool.
    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Signals every worker to stop and waits for them until `deadline`.
    ///
    /// Workers finish the task they are running; queued tasks are dropped. Workers that
    /// have not exited by the deadline are detached and left to finish on their own.
    ///
    /// # Returns
    /// `true` if every worker exited in time.
    pub fn shutdown(&mut self, deadline: Instant) -> bool {
        if self.shutdown.take().is_none() {
            return self.handles.is_empty();
        }

        // Each worker owns an exit sender; the channel disconnects once all are gone.
        let finished = loop {
            match self.exited.recv_deadline(deadline) {
                Ok(()) => continue,
                Err(RecvTimeoutError::Disconnected) => break true,
                Err(RecvTimeoutError::Timeout) => break false,
            }
        };

        if finished {
            for handle in self.handles.drain(..) {
                if handle.join().is_err() {
                    error!("A {} worker panicked during shutdown", self.name);
                }
            }
            info!("Stopped {} pool", self.name);
        } else {
            warn!(
                "{} pool did not stop before the deadline; detaching {} workers",
                self.name,
                self.handles.len()
            );
            self.handles.clear();
        }
        finished
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if self.shutdown.is_some() {
            self.shutdown(Instant::now() + Duration::from_secs(1));
        }
    }
}

struct Worker {
    name: String,
    tasks: Receiver<Box<dyn Task>>,
    shutdown: Receiver<()>,
    pending: Arc<AtomicUsize>,
    // Dropped when the worker thread ends, including by panic.
    _exit: Sender<()>,
}

impl Worker {
    fn run(self) {
        info!("Worker {} started", self.name);
        loop {
            // Shutdown wins over queued work.
            if !matches!(self.shutdown.try_recv(), Err(TryRecvError::Empty)) {
                break;
            }
            select! {
                recv(self.shutdown) -> _ => break,
                recv(self.tasks) -> task => match task {
                    Ok(task) => self.execute(task),
                    Err(_) => break,
                },
            }
        }
        info!("Worker {} stopped", self.name);
    }

    fn execute(&self, task: Box<dyn Task>) {
        let label = task.label();
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task.process())) {
            error!(
                "Worker {} recovered from a panic in {}: {}",
                self.name,
                label,
                panic_message(payload.as_ref())
            );
        }
        self.pending.fetch_sub(1, Ordering::AcqRel);
    }
}
