//! Background thread that runs wallpaper updates.
//!
//! - One worker thread per provider
//! - Requests that pile up while an update runs are merged into one
//! - Progress is sent back over flume and applied by the owner thread

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use flume::{Receiver, Sender};
use tracing::{debug, error, trace, warn};

use super::pipeline::{UpdateContext, UpdateEvent};
use crate::error::{BlurError, Result};

/// How often an idle worker checks for shutdown.
const IDLE_POLL_MS: u64 = 100;

/// Messages from the worker to the owner thread.
#[derive(Debug)]
pub enum WorkerMessage {
    Event(UpdateEvent),
    /// The update ended. `Ok(false)` means the feature was disabled.
    Finished(Result<bool>),
}

pub struct UpdateWorker {
    /// Wakes the worker; the payload carries nothing.
    request_tx: Sender<()>,
    /// Events and completions, in the order the worker produced them.
    message_rx: Receiver<WorkerMessage>,
    /// Worker thread handle (taken on shutdown).
    handle: Option<JoinHandle<()>>,
    /// Set to stop the worker at its next poll.
    shutdown: Arc<AtomicBool>,
}

impl UpdateWorker {
    pub fn spawn(context: Arc<UpdateContext>) -> Result<Self> {
        let (request_tx, request_rx) = flume::unbounded();
        let (message_tx, message_rx) = flume::unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));

        let handle = {
            let shutdown = Arc::clone(&shutdown);
            thread::Builder::new()
                .name("wallblur-update".into())
                .spawn(move || worker_loop(&context, &request_rx, &message_tx, &shutdown))
                .map_err(BlurError::Spawn)?
        };

        debug!("Started wallpaper update worker");

        Ok(Self {
            request_tx,
            message_rx,
            handle: Some(handle),
            shutdown,
        })
    }

    /// Ask for an update.
    pub fn request(&self) -> Result<()> {
        self.request_tx.send(()).map_err(|_| BlurError::WorkerGone)
    }

    /// Messages ready right now (non-blocking).
    pub fn try_recv(&self) -> Result<Option<WorkerMessage>> {
        match self.message_rx.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(flume::TryRecvError::Empty) => Ok(None),
            Err(flume::TryRecvError::Disconnected) => Err(BlurError::WorkerGone),
        }
    }

    /// Wait up to `timeout` for the next message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<WorkerMessage>> {
        match self.message_rx.recv_timeout(timeout) {
            Ok(message) => Ok(Some(message)),
            Err(flume::RecvTimeoutError::Timeout) => Ok(None),
            Err(flume::RecvTimeoutError::Disconnected) => Err(BlurError::WorkerGone),
        }
    }

    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Wallpaper update worker panicked");
            }
            debug!("Wallpaper update worker stopped");
        }
    }
}

impl Drop for UpdateWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    context: &UpdateContext,
    requests: &Receiver<()>,
    messages: &Sender<WorkerMessage>,
    shutdown: &AtomicBool,
) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        match requests.recv_timeout(Duration::from_millis(IDLE_POLL_MS)) {
            Ok(()) => {
                let merged = requests.try_iter().count();
                if merged > 0 {
                    trace!(merged, "Merged queued update requests");
                }

                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    context.run(|event| {
                        // The owner may already be gone; nothing to do then.
                        let _ = messages.send(WorkerMessage::Event(event));
                    })
                }))
                .unwrap_or_else(|payload| {
                    let reason = panic_reason(payload.as_ref());
                    error!(reason, "Wallpaper update panicked");
                    Err(BlurError::Panicked(reason.to_string()))
                });
                if messages.send(WorkerMessage::Finished(result)).is_err() {
                    break;
                }
            }
            Err(flume::RecvTimeoutError::Timeout) => continue,
            Err(flume::RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
