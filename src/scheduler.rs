//! Debounced preview rendering.
//!
//! [`PreviewScheduler`] owns one worker thread. Every [`update`] restarts a
//! quiet window; once no update has arrived for the whole window the newest
//! parameters are rendered to a PNG preview. Intermediate parameter sets are
//! dropped without rendering, and a render that has started always runs to
//! completion.
//!
//! A successful render replaces the stored [`Preview`] in one step. A failed
//! render leaves the previous preview in place and records the error.
//!
//! [`update`]: PreviewScheduler::update

use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::encoder::EncodedImage;
use crate::engine::WatermarkEngine;
use crate::error::Result;
use crate::params::WatermarkParameters;
use crate::raster::RasterImage;

/// Quiet window between the last parameter change and the preview render.
pub const PREVIEW_DEBOUNCE: Duration = Duration::from_millis(300);

/// A rendered preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    /// Lossless PNG of the watermarked image.
    pub image: EncodedImage,
    /// Sequence number of the [`PreviewScheduler::update`] call it reflects, from 1.
    pub generation: u64,
}

#[derive(Debug, Default)]
struct State {
    preview: Option<Arc<Preview>>,
    last_error: Option<String>,
    requested: u64,
    settled: u64,
    renders: u64,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    settled: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

type Request = (u64, WatermarkParameters);

/// Re-renders a preview of one source image as parameters change.
#[derive(Debug)]
pub struct PreviewScheduler {
    tx: Option<mpsc::Sender<Request>>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl PreviewScheduler {
    /// Start a scheduler with the default [`PREVIEW_DEBOUNCE`] window.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if the worker thread cannot be spawned.
    pub fn new(engine: Arc<WatermarkEngine>, image: Arc<RasterImage>) -> Result<Self> {
        Self::with_debounce(engine, image, PREVIEW_DEBOUNCE)
    }

    /// Start a scheduler with a custom quiet window.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::Error::Io) if the worker thread cannot be spawned.
    pub fn with_debounce(
        engine: Arc<WatermarkEngine>,
        image: Arc<RasterImage>,
        debounce: Duration,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Request>();
        let shared = Arc::new(Shared::default());
        let worker_shared = Arc::clone(&shared);

        let worker = std::thread::Builder::new()
            .name("watermark-preview".to_string())
            .spawn(move || run(&rx, &engine, &image, &worker_shared, debounce))?;

        Ok(Self {
            tx: Some(tx),
            shared,
            worker: Some(worker),
        })
    }

    /// Submit new parameters. Returns the generation they will render as.
    pub fn update(&self, params: WatermarkParameters) -> u64 {
        let mut state = self.shared.lock();
        state.requested += 1;
        let seq = state.requested;
        drop(state);

        if let Some(tx) = &self.tx {
            if tx.send((seq, params)).is_err() {
                tracing::warn!(generation = seq, "preview worker is gone");
            }
        }
        seq
    }

    /// The most recent successful preview.
    #[must_use]
    pub fn latest(&self) -> Option<Arc<Preview>> {
        self.shared.lock().preview.clone()
    }

    /// Message of the most recent failed render, cleared by the next success.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.shared.lock().last_error.clone()
    }

    /// Renders attempted so far, successful or not.
    #[must_use]
    pub fn renders(&self) -> u64 {
        self.shared.lock().renders
    }

    /// Block until the newest update has been rendered or `timeout` elapses.
    ///
    /// Returns `true` when no update is pending.
    pub fn wait_settled(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        while state.settled < state.requested {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self
                .shared
                .settled
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

impl Drop for PreviewScheduler {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("preview worker panicked");
            }
        }
    }
}

fn run(
    rx: &mpsc::Receiver<Request>,
    engine: &WatermarkEngine,
    image: &RasterImage,
    shared: &Shared,
    debounce: Duration,
) {
    while let Ok(mut pending) = rx.recv() {
        loop {
            match rx.recv_timeout(debounce) {
                Ok(newer) => pending = newer,
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }

        let (generation, params) = pending;
        let result = engine.preview(image, &params);

        let mut state = shared.lock();
        state.renders += 1;
        state.settled = state.settled.max(generation);
        match result {
            Ok(image) => {
                tracing::debug!(generation, bytes = image.bytes.len(), "preview ready");
                state.preview = Some(Arc::new(Preview { image, generation }));
                state.last_error = None;
            }
            Err(e) => {
                tracing::warn!(generation, error = %e, "preview render failed");
                state.last_error = Some(e.to_string());
            }
        }
        drop(state);
        shared.settled.notify_all();
    }
}
