//! Transport channel abstraction.
//!
//! A [`ChannelHandle`] stands in for one live WebSocket connection: a
//! bounded outbound queue consumed by the socket write task, plus a state
//! machine `Connecting -> Open -> Closing -> Closed`. Sends are accepted
//! only while Open and fail immediately otherwise; the channel never queues
//! across reconnects (pull-on-reconnect is the recovery path).

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use crmpilot_types::error::ChannelError;
use crmpilot_types::protocol::OutboundEnvelope;

/// Lifecycle state of a transport channel. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ChannelState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ChannelState::Connecting,
            1 => ChannelState::Open,
            2 => ChannelState::Closing,
            _ => ChannelState::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ChannelState::Connecting => 0,
            ChannelState::Open => 1,
            ChannelState::Closing => 2,
            ChannelState::Closed => 3,
        }
    }
}

/// Handle to one live connection's outbound side.
///
/// Cloneable; all clones share the same state and queue. The socket write
/// task holds the matching [`mpsc::Receiver`] and watches [`Self::closed`]
/// to shut down when the registry supersedes this channel on rebind.
#[derive(Clone)]
pub struct ChannelHandle {
    id: Uuid,
    tx: mpsc::Sender<OutboundEnvelope>,
    state: Arc<AtomicU8>,
    cancel: CancellationToken,
}

impl ChannelHandle {
    /// Create a channel in `Connecting` state with a bounded outbound queue.
    /// Returns the handle and the receiver for the socket write task.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<OutboundEnvelope>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = Self {
            id: Uuid::now_v7(),
            tx,
            state: Arc::new(AtomicU8::new(ChannelState::Connecting.as_u8())),
            cancel: CancellationToken::new(),
        };
        (handle, rx)
    }

    /// Unique identity of this physical connection, used by the registry to
    /// ignore unbind requests from superseded sockets.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.state() == ChannelState::Open
    }

    /// Transition `Connecting -> Open`. No-op from any other state.
    pub fn open(&self) {
        let _ = self.state.compare_exchange(
            ChannelState::Connecting.as_u8(),
            ChannelState::Open.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Transition `Open -> Closing`. Sends already fail in this state while
    /// the socket task drains its queue.
    pub fn begin_close(&self) {
        let _ = self.state.compare_exchange(
            ChannelState::Open.as_u8(),
            ChannelState::Closing.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Terminal transition to `Closed`, cancelling the socket task.
    pub fn close(&self) {
        self.state
            .store(ChannelState::Closed.as_u8(), Ordering::Release);
        self.cancel.cancel();
    }

    /// Token the socket task awaits to learn it has been superseded.
    pub fn closed(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Queue an envelope for delivery.
    ///
    /// Fails immediately unless the channel is Open. A send that finds the
    /// receiver gone marks the channel Closed.
    pub async fn send(&self, envelope: OutboundEnvelope) -> Result<(), ChannelError> {
        if !self.is_open() {
            return Err(ChannelError::Closed);
        }
        self.tx.send(envelope).await.map_err(|_| {
            self.close();
            ChannelError::Closed
        })
    }
}

impl std::fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crmpilot_types::protocol::OutboundFrame;
    use crmpilot_types::session::SessionId;

    fn envelope() -> OutboundEnvelope {
        OutboundEnvelope::now(
            SessionId::from("s1"),
            OutboundFrame::StatusUpdate {
                status: "connected".to_string(),
                message: "hello".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn send_before_open_fails() {
        let (handle, _rx) = ChannelHandle::new(4);
        assert_eq!(handle.state(), ChannelState::Connecting);
        assert!(handle.send(envelope()).await.is_err());
    }

    #[tokio::test]
    async fn send_while_open_delivers() {
        let (handle, mut rx) = ChannelHandle::new(4);
        handle.open();
        handle.send(envelope()).await.unwrap();
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn close_is_terminal_and_cancels() {
        let (handle, _rx) = ChannelHandle::new(4);
        handle.open();
        handle.close();
        assert_eq!(handle.state(), ChannelState::Closed);
        assert!(handle.closed().is_cancelled());
        // Reopening a closed channel is not possible.
        handle.open();
        assert_eq!(handle.state(), ChannelState::Closed);
        assert!(handle.send(envelope()).await.is_err());
    }

    #[tokio::test]
    async fn dropped_receiver_closes_channel_on_send() {
        let (handle, rx) = ChannelHandle::new(4);
        handle.open();
        drop(rx);
        assert!(handle.send(envelope()).await.is_err());
        assert_eq!(handle.state(), ChannelState::Closed);
    }

    #[tokio::test]
    async fn begin_close_stops_sends() {
        let (handle, _rx) = ChannelHandle::new(4);
        handle.open();
        handle.begin_close();
        assert_eq!(handle.state(), ChannelState::Closing);
        assert!(handle.send(envelope()).await.is_err());
    }
}
