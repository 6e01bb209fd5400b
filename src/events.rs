/*
    FluxRescue
    https://github.com/dbalsom/fluxrescue

    Copyright 2025 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    src/events.rs

    Typed progress events and the cooperative cancel token. The engine never
    reaches into a UI; orchestrators emit events into an `EventSink`
    capability supplied by the caller.
*/
use crate::{sector_map::StatusCounts, DiskCh, DiskChs, SectorStatus};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
    Mutex,
};

/// Progress events emitted by the scan orchestrator and recovery
/// controller. Track events are strictly monotonic in (cylinder, head)
/// within a scan; pass events are numbered and ordered.
#[derive(Clone, Debug)]
pub enum EngineEvent {
    TrackStarted {
        ch: DiskCh,
    },
    SectorDecoded {
        chs: DiskChs,
        status: SectorStatus,
    },
    TrackCompleted {
        ch: DiskCh,
        counts: StatusCounts,
    },
    PassCompleted {
        pass: u32,
        bad_count: usize,
    },
    Converged {
        pass: u32,
        plateau: bool,
    },
    ScanCompleted {
        counts: StatusCounts,
    },
}

/// Event sink capability. Implementations must be cheap; events fire from
/// the middle of hardware-facing loops.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: EngineEvent);
}

/// Discards every event.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn on_event(&self, _event: EngineEvent) {}
}

/// Buffers events for later inspection. Used by tests and the CLI's verbose
/// mode.
#[derive(Default)]
pub struct CollectingEventSink {
    events: Mutex<Vec<EngineEvent>>,
}

impl CollectingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for CollectingEventSink {
    fn on_event(&self, event: EngineEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Cooperative cancellation. Checked at track boundaries and before every
/// hardware operation; an in-flight operation always completes so a write
/// is never torn.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingEventSink::new();
        sink.on_event(EngineEvent::TrackStarted { ch: DiskCh::new(0, 0) });
        sink.on_event(EngineEvent::PassCompleted { pass: 1, bad_count: 3 });
        assert_eq!(sink.events().len(), 2);
    }
}
