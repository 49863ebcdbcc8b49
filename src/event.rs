//! Device event bus: progress, device info, clock and vendor events.
//!
//! Emission is synchronous and fire-and-forget; the sink closure is stored
//! when the device is opened and invoked inline from the download path. The
//! library never retains an event payload after the sink returns.

/// Typed events emitted by a device during downloads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeviceEvent<'a> {
    /// Download progress. `maximum` is a dive count or a byte budget; it may
    /// be refined while the transfer is running.
    Progress { current: u32, maximum: u32 },
    /// Model, firmware and serial as reported by the device.
    DevInfo { model: u32, firmware: u32, serial: u32 },
    /// Host time (unix seconds) paired with the device's own clock reading,
    /// for drift correction by the caller.
    Clock { systime: i64, devtime: u32 },
    /// Backend-specific payload, borrowed for the duration of the call.
    Vendor(&'a [u8]),
}

/// Event sink stored at device-open time.
pub type EventSink = Box<dyn FnMut(&DeviceEvent<'_>)>;

/// Progress accumulator shared by the download loops.
///
/// Mirrors the emit-early, refine-later pattern: backends emit an initial
/// `0/0` event before the budget is known, then update both fields as the
/// transfer advances.
#[derive(Debug, Clone, Copy, Default)]
pub struct Progress {
    pub current: u32,
    pub maximum: u32,
}

impl Progress {
    pub fn event(&self) -> DeviceEvent<'static> {
        DeviceEvent::Progress { current: self.current, maximum: self.maximum }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_event_reflects_counters() {
        let mut progress = Progress::default();
        progress.maximum = 12;
        progress.current = 3;
        assert_eq!(progress.event(), DeviceEvent::Progress { current: 3, maximum: 12 });
    }
}
