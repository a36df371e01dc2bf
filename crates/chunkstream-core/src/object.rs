//! Object Lifecycle Status
//!
//! Every stateful component (writers, readers, encoders, decoders) is a
//! state machine over four states:
//!
//! ```text
//! Open(Healthy) --fail(msg)--> Open(Failed)
//!      |                           |
//!    close                       close
//!      v                           v
//! Closed(Successful)         Closed(Failed)
//! ```
//!
//! The state lives in an atomic word so `fail` is a one-shot compare-and-swap
//! (first writer wins) and `healthy()` is a cheap load on the hot path. The
//! failure message is allocated once on the side; later `fail` calls keep the
//! first message. Closing is idempotent and preserves the failed-or-successful
//! outcome.
//!
//! Only `fail` and status queries are safe to race (for observability); the
//! owning component itself is single-threaded.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

use crate::error::{Error, Result};

const HEALTHY: u8 = 0;
const FAILED: u8 = 1;
const CLOSED_OK: u8 = 2;
const CLOSED_FAILED: u8 = 3;

/// Atomic four-state lifecycle word with a side-allocated failure message.
#[derive(Debug, Default)]
pub struct ObjectStatus {
    state: AtomicU8,
    message: OnceLock<String>,
}

impl ObjectStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while open and not failed.
    pub fn healthy(&self) -> bool {
        self.state.load(Ordering::Acquire) == HEALTHY
    }

    pub fn closed(&self) -> bool {
        matches!(
            self.state.load(Ordering::Acquire),
            CLOSED_OK | CLOSED_FAILED
        )
    }

    /// Latches a failure. The first message wins; later calls are no-ops.
    ///
    /// May be called from any thread. Failing a closed object keeps the
    /// closed flag but records the failure state for queries.
    pub fn fail(&self, message: impl Into<String>) {
        let _ = self.message.set(message.into());
        let _ = self
            .state
            .compare_exchange(HEALTHY, FAILED, Ordering::AcqRel, Ordering::Acquire);
        let _ = self.state.compare_exchange(
            CLOSED_OK,
            CLOSED_FAILED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Latches a failure whose message chains an inner object's message:
    /// `"<outer>: <inner>"`.
    pub fn fail_from(&self, outer: &str, inner: &ObjectStatus) {
        match inner.message.get() {
            Some(inner_msg) => self.fail(format!("{outer}: {inner_msg}")),
            None => self.fail(outer.to_string()),
        }
    }

    /// The latched failure message, if any.
    pub fn message(&self) -> Option<&str> {
        match self.state.load(Ordering::Acquire) {
            FAILED | CLOSED_FAILED => self.message.get().map(String::as_str),
            _ => None,
        }
    }

    /// Marks the object closed, keeping a prior failure. Idempotent.
    ///
    /// Returns true when the object closes (or already closed) successfully.
    pub fn mark_closed(&self) -> bool {
        loop {
            let state = self.state.load(Ordering::Acquire);
            let (next, ok) = match state {
                HEALTHY => (CLOSED_OK, true),
                FAILED => (CLOSED_FAILED, false),
                CLOSED_OK => return true,
                _ => return false,
            };
            if self
                .state
                .compare_exchange(state, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return ok;
            }
        }
    }

    /// Short-circuit check used at the top of every operation: `Ok(())` only
    /// when open and healthy, otherwise the latched error.
    pub fn check(&self) -> Result<()> {
        match self.state.load(Ordering::Acquire) {
            HEALTHY => Ok(()),
            FAILED | CLOSED_FAILED => Err(Error::Failed(
                self.message
                    .get()
                    .cloned()
                    .unwrap_or_else(|| "object failed".to_string()),
            )),
            _ => Err(Error::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_new_is_healthy() {
        let status = ObjectStatus::new();
        assert!(status.healthy());
        assert!(!status.closed());
        assert!(status.check().is_ok());
    }

    #[test]
    fn test_fail_latches_first_message() {
        let status = ObjectStatus::new();
        status.fail("first");
        status.fail("second");
        assert!(!status.healthy());
        assert_eq!(status.message(), Some("first"));
        match status.check() {
            Err(Error::Failed(m)) => assert_eq!(m, "first"),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn test_close_healthy_succeeds() {
        let status = ObjectStatus::new();
        assert!(status.mark_closed());
        assert!(status.closed());
        assert!(matches!(status.check(), Err(Error::Closed)));
        // Idempotent, outcome preserved.
        assert!(status.mark_closed());
    }

    #[test]
    fn test_close_failed_reports_failure() {
        let status = ObjectStatus::new();
        status.fail("broken sink");
        assert!(!status.mark_closed());
        assert!(status.closed());
        assert_eq!(status.message(), Some("broken sink"));
        assert!(!status.mark_closed());
    }

    #[test]
    fn test_fail_from_chains_messages() {
        let inner = ObjectStatus::new();
        inner.fail("disk full");
        let outer = ObjectStatus::new();
        outer.fail_from("writing chunk", &inner);
        assert_eq!(outer.message(), Some("writing chunk: disk full"));
    }

    #[test]
    fn test_concurrent_fail_first_writer_wins() {
        let status = Arc::new(ObjectStatus::new());
        let mut handles = Vec::new();
        for i in 0..8 {
            let status = Arc::clone(&status);
            handles.push(std::thread::spawn(move || {
                status.fail(format!("failure-{i}"));
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        let message = status.message().unwrap().to_string();
        assert!(message.starts_with("failure-"));
        // Whatever won, it stays.
        status.fail("latecomer");
        assert_eq!(status.message(), Some(message.as_str()));
    }
}
