// lib/src/context.rs
// Clock and per-request deadline/cancellation plumbing. Services never read
// the wall clock directly; they are handed a `Clock` at construction.

use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::Instant;

use models::errors::{PlannerError, PlannerResult};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Arc::new(RwLock::new(now)) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.write() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut guard) = self.now.write() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Trips the cancellation signal of every context cloned from its pair.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Deadline and cancellation token carried by every planner operation.
#[derive(Debug, Clone)]
pub struct RequestContext {
    deadline: Option<Instant>,
    cancelled: watch::Receiver<bool>,
    // Keeps the channel open for contexts built without a handle.
    _keepalive: Option<Arc<watch::Sender<bool>>>,
}

impl RequestContext {
    /// A context that never expires and cannot be cancelled.
    pub fn background() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            deadline: None,
            cancelled: rx,
            _keepalive: Some(Arc::new(tx)),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::background().deadline_at(Instant::now() + timeout)
    }

    /// A cancellable context plus the handle that cancels it.
    pub fn cancellable() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let tx = Arc::new(tx);
        let ctx = Self {
            deadline: None,
            cancelled: rx,
            _keepalive: Some(tx.clone()),
        };
        (ctx, CancelHandle { tx })
    }

    pub fn deadline_at(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fails with `Cancelled` once the deadline passed or the handle fired.
    /// Called between batches and before writes.
    pub fn ensure_active(&self) -> PlannerResult<()> {
        if *self.cancelled.borrow() {
            return Err(PlannerError::Cancelled("request cancelled".to_string()));
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(PlannerError::Cancelled("deadline exceeded".to_string()));
        }
        Ok(())
    }

    /// Drives `fut` until it completes, the deadline elapses or the request is cancelled.
    pub async fn run<T, F>(&self, fut: F) -> PlannerResult<T>
    where
        F: Future<Output = PlannerResult<T>>,
    {
        self.ensure_active()?;
        let mut cancelled = self.cancelled.clone();
        let cancel_signal = async move {
            loop {
                if *cancelled.borrow_and_update() {
                    return;
                }
                if cancelled.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
        };

        match self.deadline {
            Some(deadline) => tokio::select! {
                res = tokio::time::timeout_at(deadline, fut) => res?,
                _ = cancel_signal => Err(PlannerError::Cancelled("request cancelled".to_string())),
            },
            None => tokio::select! {
                res = fut => res,
                _ = cancel_signal => Err(PlannerError::Cancelled("request cancelled".to_string())),
            },
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::background()
    }
}
