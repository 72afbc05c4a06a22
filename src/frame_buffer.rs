use crate::frame::FrameData;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, trace};

/// Bounded hand-off queue between a capture loop and a processing loop.
///
/// The buffer prioritizes freshness over completeness: `push` never blocks
/// the producer and evicts the oldest frame when the buffer is full, so the
/// consumer always sees the most recent frames the camera produced.
pub struct FrameBuffer {
    slots: Mutex<VecDeque<FrameData>>,
    notify: Notify,
    capacity: usize,
    stats: FrameBufferStats,
}

/// Statistics for frame buffer monitoring
#[derive(Debug)]
pub struct FrameBufferStats {
    /// Total frames pushed into the buffer
    pub frames_pushed: AtomicU64,
    /// Total frames handed to the consumer
    pub frames_popped: AtomicU64,
    /// Frames evicted because the buffer was full
    pub frames_dropped: AtomicU64,
}

impl FrameBufferStats {
    fn new() -> Self {
        Self {
            frames_pushed: AtomicU64::new(0),
            frames_popped: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
        }
    }

    /// Get current statistics as a snapshot
    pub fn snapshot(&self) -> FrameBufferStatsSnapshot {
        FrameBufferStatsSnapshot {
            frames_pushed: self.frames_pushed.load(Ordering::Relaxed),
            frames_popped: self.frames_popped.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of frame buffer statistics
#[derive(Debug, Clone)]
pub struct FrameBufferStatsSnapshot {
    pub frames_pushed: u64,
    pub frames_popped: u64,
    pub frames_dropped: u64,
}

impl FrameBuffer {
    /// Create a new frame buffer with the given capacity.
    ///
    /// # Panics
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        if capacity == 0 {
            panic!("Frame buffer capacity must be greater than 0");
        }

        debug!("Created frame buffer with capacity {}", capacity);

        Self {
            slots: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            capacity,
            stats: FrameBufferStats::new(),
        }
    }

    /// Push a frame without blocking, evicting the oldest entry when full.
    pub fn push(&self, frame: FrameData) {
        {
            let mut slots = self.slots.lock();
            if slots.len() == self.capacity {
                slots.pop_front();
                self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                trace!("Frame buffer full, dropped oldest frame");
            }
            slots.push_back(frame);
        }
        self.stats.frames_pushed.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();
    }

    /// Wait up to `wait` for a frame; `None` on timeout is non-fatal and the
    /// caller simply retries on its next iteration.
    pub async fn pop(&self, wait: Duration) -> Option<FrameData> {
        let waiter = tokio::time::timeout(wait, async {
            loop {
                if let Some(frame) = self.take() {
                    return frame;
                }
                self.notify.notified().await;
            }
        });

        match waiter.await {
            Ok(frame) => Some(frame),
            // A frame may have landed between the timeout firing and now
            Err(_) => self.take(),
        }
    }

    /// Non-blocking pop of the oldest frame.
    pub fn try_pop(&self) -> Option<FrameData> {
        self.take()
    }

    fn take(&self) -> Option<FrameData> {
        let frame = self.slots.lock().pop_front();
        if frame.is_some() {
            self.stats.frames_popped.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    /// Number of frames currently buffered.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Get the configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get current buffer statistics
    pub fn stats(&self) -> FrameBufferStatsSnapshot {
        self.stats.snapshot()
    }
}
