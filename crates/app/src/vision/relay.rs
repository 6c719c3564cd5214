//! Hand-off of encoded frames from the producer to stream consumers.
//!
//! The relay keeps exactly one pending frame. Publishing overwrites it
//! (drop-oldest) and never blocks; every consumer holds its own cursor, so a
//! slow viewer only skips frames for itself and can never stall the producer
//! or other viewers.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use actix_web::web::Bytes;
use thiserror::Error;
use tokio::sync::watch;

use crate::vision::data::EncodedFrame;

/// Frames buffered per consumer view.
pub const RELAY_CAPACITY: usize = 1;

#[derive(Clone, Debug, Default)]
struct Slot {
    frame: Option<Arc<EncodedFrame>>,
    closed: bool,
}

/// Why [`RelayConsumer::consume`] returned without a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ConsumeError {
    #[error("no frame published within the timeout")]
    TimedOut,
    #[error("frame relay closed")]
    Closed,
}

/// Producer side; cheap to clone.
#[derive(Clone)]
pub struct FrameRelay {
    slot: Arc<watch::Sender<Slot>>,
    sequence: Arc<AtomicU64>,
}

impl Default for FrameRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameRelay {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Slot::default());
        Self {
            slot: Arc::new(tx),
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Replace the pending frame and wake waiting consumers. Returns the
    /// sequence number assigned to the frame.
    pub fn publish(&self, jpeg: impl Into<Bytes>, timestamp_ms: i64) -> u64 {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let frame = Arc::new(EncodedFrame {
            sequence,
            jpeg: jpeg.into(),
            timestamp_ms,
        });
        self.slot.send_modify(|slot| slot.frame = Some(frame));
        sequence
    }

    /// Mark the relay closed; consumers drain nothing further and observe
    /// [`ConsumeError::Closed`].
    pub fn close(&self) {
        self.slot.send_modify(|slot| slot.closed = true);
    }

    pub fn is_closed(&self) -> bool {
        self.slot.borrow().closed
    }

    /// Number of frames published so far.
    pub fn published(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Sequence of the pending frame, if any.
    pub fn pending_sequence(&self) -> Option<u64> {
        self.slot.borrow().frame.as_ref().map(|frame| frame.sequence)
    }

    /// Open a new consumer view. The currently pending frame, if any, is
    /// delivered on its first read.
    pub fn subscribe(&self) -> RelayConsumer {
        RelayConsumer {
            rx: self.slot.subscribe(),
            last_sequence: 0,
        }
    }
}

/// Consumer side of the relay, owned by one stream.
pub struct RelayConsumer {
    rx: watch::Receiver<Slot>,
    last_sequence: u64,
}

impl RelayConsumer {
    /// Take the pending frame if it is newer than the last one delivered.
    pub fn try_consume(&mut self) -> Option<Arc<EncodedFrame>> {
        let slot = self.rx.borrow_and_update();
        let frame = slot.frame.as_ref()?;
        if frame.sequence <= self.last_sequence {
            return None;
        }
        self.last_sequence = frame.sequence;
        Some(frame.clone())
    }

    /// Wait up to `timeout` for a frame newer than the last one delivered.
    pub async fn consume(&mut self, timeout: Duration) -> Result<Arc<EncodedFrame>, ConsumeError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(frame) = self.try_consume() {
                return Ok(frame);
            }
            if self.rx.borrow().closed {
                return Err(ConsumeError::Closed);
            }
            match tokio::time::timeout_at(deadline, self.rx.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => return Err(ConsumeError::Closed),
                Err(_) => return Err(ConsumeError::TimedOut),
            }
        }
    }

    /// Sequence of the last frame handed to this consumer.
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }
}
