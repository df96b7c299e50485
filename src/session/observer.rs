//! Observer interface for status and frame delivery.

use tokio::sync::mpsc;

use super::frame::InboundFrame;
use super::status::ConnectionStatus;

/// Receives everything the UI is allowed to see.
///
/// Notifications are queued in state order under the client's lock and
/// delivered one at a time after it is released, so callbacks see frames in
/// arrival order and may call back into the client (`status()`, sends,
/// `disconnect()`). After `disconnect()` returns no further callback starts,
/// apart from the `disconnected` status it reports. Callbacks run on whichever
/// task produced the event; keep them short or forward into a channel (see the
/// `UnboundedSender<SessionEvent>` impl).
pub trait SessionObserver: Send + Sync {
    fn on_status(&self, status: &ConnectionStatus);
    fn on_frame(&self, frame: &InboundFrame);
}

/// Channel form of the observer callbacks
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Status(ConnectionStatus),
    Frame(InboundFrame),
}

impl SessionObserver for mpsc::UnboundedSender<SessionEvent> {
    fn on_status(&self, status: &ConnectionStatus) {
        let _ = self.send(SessionEvent::Status(status.clone()));
    }

    fn on_frame(&self, frame: &InboundFrame) {
        let _ = self.send(SessionEvent::Frame(frame.clone()));
    }
}

/// Discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {
    fn on_status(&self, _status: &ConnectionStatus) {}
    fn on_frame(&self, _frame: &InboundFrame) {}
}
