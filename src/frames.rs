use log::debug;

use crate::{channel::FrameKind, control::PerceptionMode};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    /// Arrival order across all frames, strictly increasing
    pub seq: u64,
    /// Encoded image, opaque to the console
    pub data: Vec<u8>,
}

/// Holds the latest frame of the active perception mode.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    current: Option<Frame>,
    next_seq: u64,
    discarded: u64,
}

impl FrameBuffer {
    /// Stores `data` if it belongs to the active mode. Frames for any other mode are late
    /// arrivals from before a mode switch and are dropped.
    pub fn on_frame(&mut self, kind: FrameKind, data: Vec<u8>, active: &PerceptionMode) -> bool {
        if active.frame_kind() != Some(kind) {
            self.discarded += 1;
            debug!("Discarding {:?} frame while {}", kind, active);
            return false;
        }
        self.next_seq += 1;
        self.current = Some(Frame {
            kind,
            seq: self.next_seq,
            data,
        });
        true
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.current.as_ref()
    }

    /// Drops the held frame, called whenever the perception mode changes.
    pub fn on_mode_change(&mut self) {
        self.current = None;
    }

    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}
