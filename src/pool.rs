//! Fixed-size worker pool shared by the fetch, decompress and index stages.
//!
//! Tasks go into one channel up front; `workers` scoped threads drain it until
//! it is empty, so a fast worker simply takes more tasks than a slow one. The
//! call returns once every thread has joined.

use std::any::Any;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel::Receiver;
use tracing::debug;

use crate::error::{SeqidxError, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// First failure stops queued tasks and interrupts streaming copies.
    CancelSiblings,
    /// Every task runs; failures are collected.
    RunToCompletion,
}

/// Shared stop signal for one pool run.
#[derive(Debug, Default)]
pub struct CancelFlag(AtomicBool);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Maps an error seen while cancelled to `Cancelled`, so the task is
    /// reported as unfinished rather than failed.
    pub fn classify(&self, err: SeqidxError) -> SeqidxError {
        if self.is_cancelled() {
            SeqidxError::Cancelled
        } else {
            err
        }
    }
}

/// Writer that refuses further bytes once the pool is cancelled.
pub struct Cancellable<'a, W> {
    inner: W,
    flag: &'a CancelFlag,
}

impl<'a, W: Write> Cancellable<'a, W> {
    pub fn new(inner: W, flag: &'a CancelFlag) -> Self {
        Self { inner, flag }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for Cancellable<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.flag.is_cancelled() {
            return Err(io::Error::other("cancelled"));
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

pub struct PoolOutcome<T, R> {
    pub completed: Vec<(T, R)>,
    pub failures: Vec<SeqidxError>,
    pub incomplete: Vec<T>,
}

impl<T, R> PoolOutcome<T, R> {
    fn new() -> Self {
        Self {
            completed: Vec::new(),
            failures: Vec::new(),
            incomplete: Vec::new(),
        }
    }

    fn merge(&mut self, other: PoolOutcome<T, R>) {
        self.completed.extend(other.completed);
        self.failures.extend(other.failures);
        self.incomplete.extend(other.incomplete);
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.incomplete.is_empty()
    }

    /// Collapses the outcome into the completed tasks or one stage error
    /// naming every failed and unfinished task.
    pub fn into_result<L>(self, stage: Stage, label: L) -> Result<Vec<(T, R)>, SeqidxError>
    where
        L: Fn(&T) -> String,
    {
        if self.is_success() {
            return Ok(self.completed);
        }
        Err(SeqidxError::StageFailed {
            stage,
            failures: self.failures,
            incomplete: self.incomplete.iter().map(label).collect(),
        })
    }
}

pub fn run_pool<T, R, F>(
    tasks: Vec<T>,
    workers: usize,
    policy: FailurePolicy,
    work: F,
) -> PoolOutcome<T, R>
where
    T: Send,
    R: Send,
    F: Fn(&T, &CancelFlag) -> Result<R, SeqidxError> + Sync,
{
    let (sender, receiver) = crossbeam_channel::unbounded();
    for task in tasks {
        if sender.send(task).is_err() {
            break;
        }
    }
    // Workers stop once the queue is drained.
    drop(sender);

    let cancel = CancelFlag::default();
    let work = &work;
    let flag = &cancel;

    thread::scope(|scope| {
        let handles = (0..workers.max(1))
            .map(|worker_id| {
                let receiver = receiver.clone();
                scope.spawn(move || drain(worker_id, receiver, work, flag, policy))
            })
            .collect::<Vec<_>>();

        let mut outcome = PoolOutcome::new();
        for handle in handles {
            match handle.join() {
                Ok(part) => outcome.merge(part),
                Err(panic) => {
                    cancel.cancel();
                    outcome
                        .failures
                        .push(SeqidxError::WorkerPanic(decipher_panic(panic)));
                }
            }
        }
        // Anything still queued belonged to a worker that panicked.
        outcome.incomplete.extend(receiver.try_iter());
        outcome
    })
}

fn drain<T, R, F>(
    worker_id: usize,
    receiver: Receiver<T>,
    work: &F,
    cancel: &CancelFlag,
    policy: FailurePolicy,
) -> PoolOutcome<T, R>
where
    F: Fn(&T, &CancelFlag) -> Result<R, SeqidxError>,
{
    let mut outcome = PoolOutcome::new();
    for task in receiver.iter() {
        if cancel.is_cancelled() {
            outcome.incomplete.push(task);
            continue;
        }
        match work(&task, cancel) {
            Ok(value) => outcome.completed.push((task, value)),
            Err(SeqidxError::Cancelled) => outcome.incomplete.push(task),
            Err(err) => {
                debug!(worker_id, error = %err, "task failed");
                if policy == FailurePolicy::CancelSiblings {
                    cancel.cancel();
                }
                outcome.failures.push(err);
            }
        }
    }
    outcome
}

fn decipher_panic(panic: Box<dyn Any + Send>) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
