use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::capture::CaptureSource;
use crate::segmentation::types::Encoding;
use crate::segmentation::Mask;

/// Frames waiting between capture and processing. A newer frame replaces a
/// pending one instead of queueing behind it.
const QUEUE_DEPTH: usize = 1;

/// Raw image as carried by the transport
#[derive(Debug, Clone)]
pub struct ImageMessage {
    /// Monotonic per-source sequence number
    pub seq: u64,
    pub width: u32,
    pub height: u32,
    /// Pixel layout name, e.g. `bgr8`, `rgb8`, `mono8`
    pub encoding: String,
    /// Row stride in bytes
    pub step: u32,
    pub data: Vec<u8>,
    pub captured_at: Instant,
}

impl ImageMessage {
    /// Re-encode a mask for publication as `mono8`
    pub fn from_mask(seq: u64, captured_at: Instant, mask: Mask) -> Self {
        let (width, height) = mask.dimensions();
        Self {
            seq,
            width,
            height,
            encoding: Encoding::Mono8.as_str().to_string(),
            step: width,
            data: mask.into_raw(),
            captured_at,
        }
    }
}

/// Producer half of a keep-latest frame queue
#[derive(Clone)]
pub struct FramePublisher {
    tx: Sender<ImageMessage>,
    // Held so the producer can evict a frame the consumer has not taken yet
    evict: Receiver<ImageMessage>,
    dropped: Arc<AtomicU64>,
}

impl FramePublisher {
    /// Hand a frame to the consumer without blocking.
    ///
    /// If a frame is still pending it is discarded and counted as dropped.
    pub fn publish(&self, mut msg: ImageMessage) {
        loop {
            match self.tx.try_send(msg) {
                Ok(()) => return,
                Err(TrySendError::Full(returned)) => {
                    if let Ok(stale) = self.evict.try_recv() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!("Dropping stale frame {} for {}", stale.seq, returned.seq);
                    }
                    msg = returned;
                }
                // Unreachable while `evict` is alive
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

/// Consumer half of a keep-latest frame queue
pub struct FrameReceiver {
    rx: Receiver<ImageMessage>,
    dropped: Arc<AtomicU64>,
}

impl FrameReceiver {
    /// Wait up to `timeout` for the next frame.
    ///
    /// Returns `Ok(None)` on timeout and an error once every publisher is gone.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<ImageMessage>> {
        match self.rx.recv_timeout(timeout) {
            Ok(msg) => Ok(Some(msg)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => anyhow::bail!("frame source disconnected"),
        }
    }

    /// Frames evicted before processing since the queue was created
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

pub fn channel() -> (FramePublisher, FrameReceiver) {
    let (tx, rx) = crossbeam_channel::bounded(QUEUE_DEPTH);
    let dropped = Arc::new(AtomicU64::new(0));
    let publisher = FramePublisher {
        tx,
        evict: rx.clone(),
        dropped: Arc::clone(&dropped),
    };
    (publisher, FrameReceiver { rx, dropped })
}

/// A running capture thread feeding a keep-latest queue
pub struct Subscription {
    pub frames: FrameReceiver,
    worker: JoinHandle<Result<()>>,
}

impl Subscription {
    /// Wait for the capture thread and surface its error, if any
    pub fn join(self) -> Result<()> {
        match self.worker.join() {
            Ok(result) => result,
            Err(_) => anyhow::bail!("capture thread panicked"),
        }
    }
}

/// Start a capture thread.
///
/// The source is built on the capture thread by `open`, so it need not be
/// `Send`. The thread stops when the source ends or fails, or when
/// `shutdown` is raised.
pub fn subscribe<S, F>(open: F, shutdown: Arc<AtomicBool>) -> Result<Subscription>
where
    S: CaptureSource,
    F: FnOnce() -> Result<S> + Send + 'static,
{
    let (publisher, frames) = channel();

    let worker = thread::Builder::new()
        .name("capture".into())
        .spawn(move || -> Result<()> {
            let mut source = open()?;
            let (width, height) = source.resolution();
            tracing::info!("Capture thread running at {}x{}", width, height);

            while !shutdown.load(Ordering::Relaxed) {
                match source.capture_frame().context("Failed to capture frame")? {
                    Some(msg) => publisher.publish(msg),
                    None => {
                        tracing::info!("Frame source exhausted");
                        break;
                    }
                }
            }
            Ok(())
        })
        .context("Failed to spawn capture thread")?;

    Ok(Subscription { frames, worker })
}
