//! Cooperative cancellation and off-thread execution
//!
//! A running script polls its [`ExecutionControlToken`] at every call and
//! every backward jump. Cancelling the token makes the next safepoint fail
//! with [`ScriptError::Cancelled`] and wakes a script blocked in `sleep`.
//!
//! [`ExecutionPort`] abstracts where asynchronous executions run;
//! [`ScriptTask`] is the handle to their outcome.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use core_types::{ScriptError, Value};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, TryRecvError};
use parking_lot::{Condvar, Mutex};

#[derive(Default)]
struct TokenState {
    cancelled: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

/// Cancellation handle shared between a host and the executions it starts
///
/// # Examples
///
/// ```
/// use interpreter::ExecutionControlToken;
///
/// let token = ExecutionControlToken::new();
/// let observer = token.clone();
/// token.cancel();
/// assert!(observer.is_cancelled());
/// assert!(observer.check().is_err());
/// ```
#[derive(Clone, Default)]
pub struct ExecutionControlToken {
    inner: Arc<TokenState>,
}

impl ExecutionControlToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake any sleeping script
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        let _guard = self.inner.lock.lock();
        self.inner.wake.notify_all();
    }

    /// True once [`cancel`](Self::cancel) was called
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Safepoint check
    pub fn check(&self) -> Result<(), ScriptError> {
        if self.is_cancelled() {
            Err(ScriptError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Block for `duration` or until cancelled; returns true when woken by
    /// cancellation
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut guard = self.inner.lock.lock();
        while !self.is_cancelled() {
            if self.inner.wake.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        self.is_cancelled()
    }
}

impl std::fmt::Debug for ExecutionControlToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionControlToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// A unit of work handed to an [`ExecutionPort`]
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Where asynchronous script executions run
pub trait ExecutionPort: Send + Sync {
    /// Run `job`, now or later, on some thread
    fn spawn(&self, job: Job);
}

/// Runs jobs immediately on the calling thread
#[derive(Debug, Clone, Copy, Default)]
pub struct InlinePort;

impl ExecutionPort for InlinePort {
    fn spawn(&self, job: Job) {
        job();
    }
}

/// Native stack of a [`ThreadPort`] worker
pub const WORKER_STACK_SIZE: usize = 16 * 1024 * 1024;

/// Runs every job on a fresh worker thread
#[derive(Debug, Clone, Default)]
pub struct ThreadPort {
    name: Option<String>,
}

impl ThreadPort {
    /// Port whose worker threads carry `name`
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}

impl ExecutionPort for ThreadPort {
    fn spawn(&self, job: Job) {
        let mut builder = thread::Builder::new().stack_size(WORKER_STACK_SIZE);
        if let Some(name) = &self.name {
            builder = builder.name(name.clone());
        }
        if let Err(err) = builder.spawn(job) {
            log::error!("failed to start script worker thread: {}", err);
        }
    }
}

/// Handle to the outcome of an asynchronous execution
pub struct ScriptTask<T = Value> {
    receiver: Receiver<Result<T, ScriptError>>,
    token: ExecutionControlToken,
}

impl<T: Send + 'static> ScriptTask<T> {
    /// Run `job` on `port` under `token`
    pub fn spawn<F>(port: &dyn ExecutionPort, token: ExecutionControlToken, job: F) -> Self
    where
        F: FnOnce(&ExecutionControlToken) -> Result<T, ScriptError> + Send + 'static,
    {
        let (sender, receiver) = channel::bounded(1);
        let job_token = token.clone();
        port.spawn(Box::new(move || {
            // the receiver may already be gone; nobody is waiting then
            let _ = sender.send(job(&job_token));
        }));
        Self { receiver, token }
    }

    /// A task that already finished with `result`
    pub fn ready(result: Result<T, ScriptError>) -> Self {
        let (sender, receiver) = channel::bounded(1);
        let _ = sender.send(result);
        Self {
            receiver,
            token: ExecutionControlToken::new(),
        }
    }

    /// Token controlling the execution
    pub fn token(&self) -> &ExecutionControlToken {
        &self.token
    }

    /// Request cancellation of the execution
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Block until the execution finishes
    pub fn wait(self) -> Result<T, ScriptError> {
        self.receiver.recv().unwrap_or_else(|_| Err(abandoned()))
    }

    /// Block for at most `timeout`; `None` if the execution is still running
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T, ScriptError>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(abandoned())),
        }
    }

    /// The outcome if the execution already finished
    pub fn try_result(&self) -> Option<Result<T, ScriptError>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(abandoned())),
        }
    }
}

fn abandoned() -> ScriptError {
    ScriptError::runtime("script task ended without producing a result")
}
