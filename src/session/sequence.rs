//! Resume point and acknowledgement tracking.
//!
//! The resume point is the highest sequence number observed for the bound
//! session. It only moves forward while the session stays the same and is
//! reset to zero when a different session is bound.

use super::frame::InboundFrame;

/// What the client must do after observing one inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameDisposition {
    /// Resume point moved forward; a debounced status flush is due
    pub advanced: bool,
    /// Send `ACK` with this cursor
    pub ack: Option<u64>,
}

#[derive(Debug, Default)]
pub struct SequenceTracker {
    session_id: Option<String>,
    resume_point: u64,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind to `session_id`. Returns true (and resets to zero) if it differs
    /// from the current binding.
    pub fn bind(&mut self, session_id: &str) -> bool {
        if self.session_id.as_deref() == Some(session_id) {
            return false;
        }
        self.session_id = Some(session_id.to_string());
        self.resume_point = 0;
        true
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    #[inline]
    pub fn resume_point(&self) -> u64 {
        self.resume_point
    }

    pub fn observe(&mut self, frame: &InboundFrame) -> FrameDisposition {
        let advanced = match frame.tracked_seq() {
            Some(seq) if seq > self.resume_point => {
                self.resume_point = seq;
                true
            }
            _ => false,
        };

        FrameDisposition {
            advanced,
            ack: frame.wants_ack().then_some(self.resume_point),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(seq: Option<u64>, event_id: Option<&str>, ack: bool) -> InboundFrame {
        InboundFrame {
            frame_type: "EVENT".into(),
            payload: None,
            seq,
            server_event_id: event_id.map(String::from),
            ack_required: Some(ack),
        }
    }

    #[test]
    fn test_resume_point_is_running_max() {
        let mut t = SequenceTracker::new();
        t.bind("s1");
        for seq in [3, 1, 7, 7, 2, 9, 4] {
            t.observe(&frame(Some(seq), Some("e"), false));
        }
        assert_eq!(t.resume_point(), 9);
    }

    #[test]
    fn test_advance_only_on_new_high() {
        let mut t = SequenceTracker::new();
        t.bind("s1");
        assert!(t.observe(&frame(Some(2), Some("e2"), false)).advanced);
        assert!(!t.observe(&frame(Some(2), Some("e2"), false)).advanced);
        assert!(!t.observe(&frame(Some(1), Some("e1"), false)).advanced);
        assert!(!t.observe(&frame(Some(5), None, false)).advanced);
        assert_eq!(t.resume_point(), 2);
    }

    #[test]
    fn test_ack_carries_current_resume_point() {
        let mut t = SequenceTracker::new();
        t.bind("s1");
        t.observe(&frame(Some(10), Some("e10"), false));

        // A replayed older frame still gets acked, with the high-water mark
        let d = t.observe(&frame(Some(4), Some("e4"), true));
        assert!(!d.advanced);
        assert_eq!(d.ack, Some(10));

        let d = t.observe(&frame(Some(1), Some("e1"), false));
        assert_eq!(d.ack, None);
    }

    #[test]
    fn test_rebind_same_session_keeps_resume_point() {
        let mut t = SequenceTracker::new();
        assert!(t.bind("s1"));
        t.observe(&frame(Some(6), Some("e"), false));
        assert!(!t.bind("s1"));
        assert_eq!(t.resume_point(), 6);

        assert!(t.bind("s2"));
        assert_eq!(t.resume_point(), 0);
        assert_eq!(t.session_id(), Some("s2"));
    }
}
