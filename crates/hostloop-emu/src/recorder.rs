//! Bus observer that keeps every frame it sees

use crate::bus::{BusObserver, PortId};
use crate::stack::Frame;
use parking_lot::Mutex;

/// A frame seen on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedFrame {
    /// Port that transmitted the frame
    pub source: PortId,
    /// Frame bytes
    pub frame: Frame,
    /// Whether the filters let it through
    pub forwarded: bool,
}

/// Records frames in the order the bus handled them
#[derive(Debug, Default)]
pub struct FrameRecorder {
    frames: Mutex<Vec<RecordedFrame>>,
}

impl FrameRecorder {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far
    pub fn frames(&self) -> Vec<RecordedFrame> {
        self.frames.lock().clone()
    }

    /// Frames that were forwarded
    pub fn forwarded(&self) -> Vec<Frame> {
        self.frames
            .lock()
            .iter()
            .filter(|record| record.forwarded)
            .map(|record| Frame::clone(&record.frame))
            .collect()
    }

    /// Number of recorded frames
    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    /// Forget everything recorded so far
    pub fn clear(&self) {
        self.frames.lock().clear();
    }
}

impl BusObserver for FrameRecorder {
    fn on_frame(&self, source: &PortId, frame: &Frame, forwarded: bool) {
        self.frames.lock().push(RecordedFrame {
            source: source.clone(),
            frame: Frame::clone(frame),
            forwarded,
        });
    }
}
