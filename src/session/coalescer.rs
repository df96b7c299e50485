//! Single-slot in-flight request coalescer.
//!
//! At most one connection attempt runs at a time. A request that arrives
//! while one is running is folded into a single pending restart, so no
//! request is lost and no second attempt starts in parallel.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Caller owns the attempt and must call [`AttemptCoalescer::finish`]
    Start,
    /// Another attempt is running; it will restart once when done
    Coalesced,
}

#[derive(Debug, Default)]
pub struct AttemptCoalescer {
    connecting: bool,
    pending: bool,
}

impl AttemptCoalescer {
    pub fn try_begin(&mut self) -> Admission {
        if self.connecting {
            self.pending = true;
            Admission::Coalesced
        } else {
            self.connecting = true;
            self.pending = false;
            Admission::Start
        }
    }

    /// End the running attempt; returns whether it should run once more
    pub fn finish(&mut self) -> bool {
        self.connecting = false;
        std::mem::take(&mut self.pending)
    }

    /// Drop any queued restart (the running attempt, if any, still finishes)
    pub fn clear_pending(&mut self) {
        self.pending = false;
    }
}
