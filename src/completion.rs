//! Single-fire delivery of the outcome of a pending transport write.
//!
//! A write can finish normally, fail on the transport, or outlive its deadline,
//! and each of these is reported from a different place (the I/O callback, the
//! timer) possibly on different threads. [`CompletionGuard`] lets all of them
//! report freely while the caller's sink hears about exactly one.
//!
//! # Examples
//!
//! ```
//! use connector_mime::completion::{CompletionGuard, Resolution, WriteResult};
//!
//! # async fn run() {
//! let (tx, rx) = tokio::sync::oneshot::channel::<WriteResult>();
//! let guard = CompletionGuard::arm(tx);
//!
//! let timer = guard.clone();
//! assert_eq!(guard.report_success(), Resolution::Delivered);
//! assert_eq!(timer.report_timeout("deadline passed"), Resolution::AlreadyResolved);
//!
//! assert!(rx.await.unwrap().is_ok());
//! # }
//! # tokio::runtime::Runtime::new().unwrap().block_on(run());
//! ```

use spin::Mutex;
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result delivered to a [`CompletionSink`].
pub type WriteResult = Result<(), WriteError>;

/// Why a write did not complete.
#[non_exhaustive]
pub enum WriteError {
    /// The write did not complete within its deadline.
    Timeout { cause: BoxError },

    /// The transport reported a failure.
    Transport { cause: BoxError },
}

impl WriteError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, WriteError::Timeout { .. })
    }

    pub fn cause(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        match self {
            WriteError::Timeout { cause } | WriteError::Transport { cause } => cause.as_ref(),
        }
    }
}

impl Display for WriteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            WriteError::Timeout { cause } => write!(f, "write timed out: {}", cause),
            WriteError::Transport { cause } => write!(f, "write failed: {}", cause),
        }
    }
}

impl Debug for WriteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl std::error::Error for WriteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.cause())
    }
}

/// Cause attached by [`CompletionGuard::spawn_timeout`] when the deadline passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteTimeoutError {
    pub deadline: Duration,
}

impl Display for WriteTimeoutError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "write did not complete within {:?}", self.deadline)
    }
}

impl std::error::Error for WriteTimeoutError {}

/// Receives the terminal result of a pending write.
///
/// `complete` may be called from a thread other than the one that armed the
/// guard. It returns the result back when the receiving side is gone.
pub trait CompletionSink: Send {
    fn complete(self, result: WriteResult) -> Result<(), WriteResult>;
}

impl CompletionSink for oneshot::Sender<WriteResult> {
    fn complete(self, result: WriteResult) -> Result<(), WriteResult> {
        self.send(result)
    }
}

impl CompletionSink for mpsc::Sender<WriteResult> {
    fn complete(self, result: WriteResult) -> Result<(), WriteResult> {
        self.send(result).map_err(|err| err.0)
    }
}

/// What happened to a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// This report won and its result reached the sink.
    Delivered,
    /// Another report already won; this one was ignored.
    AlreadyResolved,
    /// This report won but the sink no longer accepts results.
    SinkClosed,
}

struct Inner<S> {
    completed: AtomicBool,
    sink: Mutex<Option<S>>,
}

/// Handle to one pending write. Clones share the same completion flag.
pub struct CompletionGuard<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for CompletionGuard<S> {
    fn clone(&self) -> Self {
        CompletionGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> CompletionGuard<S> {
    /// Whether some report already won.
    pub fn is_resolved(&self) -> bool {
        self.inner.completed.load(Ordering::Acquire)
    }
}

impl<S> Debug for CompletionGuard<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionGuard")
            .field("completed", &self.is_resolved())
            .finish()
    }
}

impl<S: CompletionSink> CompletionGuard<S> {
    /// Registers `sink` for a new pending write.
    pub fn arm(sink: S) -> Self {
        CompletionGuard {
            inner: Arc::new(Inner {
                completed: AtomicBool::new(false),
                sink: Mutex::new(Some(sink)),
            }),
        }
    }

    pub fn report_success(&self) -> Resolution {
        self.resolve("success", Ok(()))
    }

    pub fn report_timeout<E: Into<BoxError>>(&self, cause: E) -> Resolution {
        self.resolve("timeout", Err(WriteError::Timeout { cause: cause.into() }))
    }

    pub fn report_error<E: Into<BoxError>>(&self, cause: E) -> Resolution {
        self.resolve("error", Err(WriteError::Transport { cause: cause.into() }))
    }

    fn resolve(&self, kind: &str, result: WriteResult) -> Resolution {
        if self
            .inner
            .completed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::warn!("ignoring {} report for an already resolved write", kind);
            return Resolution::AlreadyResolved;
        }

        // Only the winner of the exchange gets here, so the sink is still present.
        let sink = self.inner.sink.lock().take();

        match sink.map(|sink| sink.complete(result)) {
            Some(Ok(())) => {
                log::trace!("write resolved with {}", kind);
                Resolution::Delivered
            }
            Some(Err(_)) | None => {
                log::error!("completion sink closed before the write {} could be delivered", kind);
                Resolution::SinkClosed
            }
        }
    }
}

impl<S: CompletionSink + 'static> CompletionGuard<S> {
    /// Reports a timeout once `deadline` elapses, unless something else resolves
    /// the write first. Must be called within a tokio runtime.
    pub fn spawn_timeout(&self, deadline: Duration) -> JoinHandle<Resolution> {
        let guard = self.clone();

        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;

            if guard.is_resolved() {
                return Resolution::AlreadyResolved;
            }

            guard.report_timeout(WriteTimeoutError { deadline })
        })
    }
}
