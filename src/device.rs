//! Device capability: the polymorphic download contract every backend
//! implements.
//!
//! # Lifecycle
//! 1. The caller connects a transport and hands it to a backend `open`
//! 2. `set_fingerprint` optionally installs the incremental-sync anchor
//! 3. `foreach` pumps the transport and delivers dives newest-first
//! 4. `close` releases the transport; later calls fail with `InvalidArgs`
//!
//! # Cancellation
//! Every device shares a [`CancelToken`] that another thread may trip. The
//! flag is checked at transport boundaries and between dives; the pending
//! operation then unwinds with `Error::Cancelled`. There is no mid-read
//! preemption, so latency is bounded by the transport timeout.

use crate::error::{Error, Result};
use crate::event::{DeviceEvent, EventSink, Progress};
use crate::types::DiveDateTime;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag, clonable across threads.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation of the ongoing operation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Per-dive payload handed to the [`Device::foreach`] callback.
///
/// Both slices are borrowed for the duration of the callback only. The
/// fingerprint is the dive's stable identity across downloads; callers store
/// the newest one they have seen and pass it to `set_fingerprint` on the
/// next sync.
#[derive(Debug, Clone, Copy)]
pub struct DiveData<'a> {
    pub data: &'a [u8],
    pub fingerprint: &'a [u8],
}

/// Dive callback: return `false` to halt enumeration.
pub type DiveCallback<'a> = dyn FnMut(DiveData<'_>) -> bool + 'a;

/// Polymorphic handle over one connected dive computer.
///
/// All operations are synchronous and blocking on the transport. Errors
/// follow the crate-wide taxonomy and propagate unchanged.
pub trait Device {
    /// Store `data` as the incremental-sync anchor; empty input clears it.
    /// Fails with `InvalidArgs` when the length does not match the backend's
    /// fingerprint width.
    fn set_fingerprint(&mut self, data: &[u8]) -> Result<()>;

    /// Read the full device memory into `buffer`, emitting progress events.
    fn dump(&mut self, _buffer: &mut Vec<u8>) -> Result<()> {
        Err(Error::Unsupported("dump"))
    }

    /// Enumerate dives newest-first. Stops early when the callback returns
    /// `false`, when a dive matches the stored fingerprint (that dive is not
    /// delivered), or when cancellation is requested.
    fn foreach(&mut self, callback: &mut DiveCallback<'_>) -> Result<()>;

    /// Set the device clock.
    fn timesync(&mut self, _time: &DiveDateTime) -> Result<()> {
        Err(Error::Unsupported("timesync"))
    }

    /// Release the transport. Safe to call exactly once.
    fn close(&mut self) -> Result<()>;

    /// Cancellation flag shared with this device.
    fn cancel_token(&self) -> CancelToken;
}

/// State common to every backend: fingerprint anchor, event sink,
/// cancellation flag and lifecycle.
pub struct DeviceBase {
    fingerprint: Vec<u8>,
    events: Option<EventSink>,
    cancel: CancelToken,
    closed: bool,
}

impl DeviceBase {
    pub fn new(events: Option<EventSink>) -> Self {
        Self { fingerprint: Vec::new(), events, cancel: CancelToken::new(), closed: false }
    }

    /// Implements the shared fingerprint rule: empty clears, otherwise the
    /// length must equal the backend's fingerprint width.
    pub fn set_fingerprint(&mut self, data: &[u8], width: usize) -> Result<()> {
        self.ensure_open()?;
        if !data.is_empty() && data.len() != width {
            return Err(Error::InvalidArgs("fingerprint size mismatch"));
        }
        self.fingerprint.clear();
        self.fingerprint.extend_from_slice(data);
        Ok(())
    }

    /// The stored anchor; empty when cleared.
    pub fn fingerprint(&self) -> &[u8] {
        &self.fingerprint
    }

    /// True when `candidate` matches the stored anchor.
    pub fn fingerprint_matches(&self, candidate: &[u8]) -> bool {
        !self.fingerprint.is_empty() && self.fingerprint == candidate
    }

    /// Emit one event to the sink, if any.
    pub fn emit(&mut self, event: &DeviceEvent<'_>) {
        if let Some(sink) = self.events.as_mut() {
            sink(event);
        }
    }

    /// Emit the current progress counters.
    pub fn emit_progress(&mut self, progress: &Progress) {
        self.emit(&progress.event());
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Convert a pending cancellation request into an error.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Fail with `InvalidArgs` once the device is closed.
    pub fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::InvalidArgs("device is closed"));
        }
        Ok(())
    }

    /// Transition to the terminal closed state. Returns an error when
    /// already closed, so `close` stays safe to call exactly once.
    pub fn mark_closed(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_width_is_enforced() {
        let mut base = DeviceBase::new(None);
        assert!(base.set_fingerprint(&[1, 2, 3], 4).is_err());
        base.set_fingerprint(&[1, 2, 3, 4], 4).unwrap();
        assert!(base.fingerprint_matches(&[1, 2, 3, 4]));
        // Empty clears the anchor; nothing matches afterwards.
        base.set_fingerprint(&[], 4).unwrap();
        assert!(!base.fingerprint_matches(&[]));
        assert!(!base.fingerprint_matches(&[1, 2, 3, 4]));
    }

    #[test]
    fn test_closed_device_rejects_operations() {
        let mut base = DeviceBase::new(None);
        base.mark_closed().unwrap();
        assert!(base.ensure_open().is_err());
        assert!(base.mark_closed().is_err());
        assert!(base.set_fingerprint(&[0; 4], 4).is_err());
    }

    #[test]
    fn test_cancel_token_is_shared() {
        let base = DeviceBase::new(None);
        let token = base.cancel_token();
        assert!(base.check_cancelled().is_ok());
        token.cancel();
        assert!(matches!(base.check_cancelled(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_events_reach_the_sink() {
        let seen = Arc::new(AtomicBool::new(false));
        let seen_inner = seen.clone();
        let mut base = DeviceBase::new(Some(Box::new(move |event| {
            if matches!(event, DeviceEvent::Progress { current: 2, maximum: 10 }) {
                seen_inner.store(true, Ordering::Relaxed);
            }
        })));
        base.emit(&DeviceEvent::Progress { current: 2, maximum: 10 });
        assert!(seen.load(Ordering::Relaxed));
    }
}
