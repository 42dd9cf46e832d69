//! Position Source: permission-gated, cancellable streams of position samples.
//!
//! A [`LocationProvider`] wraps the platform location stack. A
//! [`PositionSource`] asks the provider for permission, runs its watch loop on
//! a background task and hands the consumer a [`SampleStream`]. Stopping the
//! stream releases the provider subscription exactly once, and a stopped
//! stream never yields another event.

pub mod simulated;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::geo::Coordinate;

pub use simulated::SimulatedProvider;

/// Capacity of the channel between a provider and its stream.
const SAMPLE_BUFFER: usize = 16;

/// Message shown when foreground location access is refused.
pub const PERMISSION_REQUIRED_MESSAGE: &str = "Location permission is required.";

/// Desired accuracy tier for position fixes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accuracy {
    /// Coarse, low power.
    Low,
    /// Block-level accuracy.
    Balanced,
    /// Best available accuracy.
    #[default]
    High,
}

impl Accuracy {
    /// Nominal horizontal accuracy radius for this tier.
    #[must_use]
    pub fn radius_meters(self) -> f64 {
        match self {
            Self::Low => 1000.0,
            Self::Balanced => 100.0,
            Self::High => 10.0,
        }
    }
}

impl std::fmt::Display for Accuracy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Balanced => write!(f, "balanced"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Options for a location watch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    /// Desired accuracy tier.
    pub accuracy: Accuracy,
    /// Minimum time between samples.
    pub time_interval: Duration,
    /// Minimum distance between delivered samples, if any.
    pub distance_interval_meters: Option<f64>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            accuracy: Accuracy::High,
            time_interval: Duration::from_millis(5000),
            distance_interval_meters: None,
        }
    }
}

impl WatchOptions {
    /// Check that the options describe a usable watch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a zero interval or a negative or
    /// non-finite distance interval.
    pub fn validate(&self) -> Result<()> {
        if self.time_interval.is_zero() {
            return Err(Error::invalid_input("time interval must be greater than 0"));
        }
        if let Some(distance) = self.distance_interval_meters {
            if !distance.is_finite() || distance < 0.0 {
                return Err(Error::invalid_input(format!(
                    "distance interval must be a non-negative number of meters, got {distance}"
                )));
            }
        }
        Ok(())
    }
}

/// One position report from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    /// Where the device was.
    pub coordinate: Coordinate,
    /// When the fix was captured.
    pub captured_at: DateTime<Utc>,
    /// Horizontal accuracy radius, if the platform reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy_meters: Option<f64>,
}

impl PositionSample {
    /// A sample captured now.
    #[must_use]
    pub fn new(coordinate: Coordinate) -> Self {
        Self {
            coordinate,
            captured_at: Utc::now(),
            accuracy_meters: None,
        }
    }
}

/// An item on a location watch.
#[derive(Debug, Clone, PartialEq)]
pub enum PositionEvent {
    /// A new position.
    Sample(PositionSample),
    /// The platform failed to produce a fix this time.
    Unavailable {
        /// Why no fix was produced.
        reason: String,
    },
}

/// Answer to a foreground location permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    /// Access granted.
    Granted,
    /// Access refused.
    Denied,
}

impl PermissionStatus {
    /// Whether access was granted.
    #[must_use]
    pub fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// A platform location stack.
///
/// Implementors deliver events in capture order and must return from
/// `watch` once `handle` is stopped or `tx` is closed.
#[async_trait::async_trait]
pub trait LocationProvider: Send + Sync + std::fmt::Debug {
    /// The name of this provider (for logging/debugging).
    fn name(&self) -> &'static str;

    /// Ask for foreground location access.
    async fn request_permission(&self) -> PermissionStatus;

    /// Produce a single fix.
    ///
    /// # Errors
    ///
    /// Returns an error if permission is missing or no fix is available.
    async fn current_position(&self, accuracy: Accuracy) -> Result<PositionSample>;

    /// Emit events through `tx` until stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying watch fails to start.
    async fn watch(
        &self,
        options: WatchOptions,
        tx: mpsc::Sender<PositionEvent>,
        handle: WatchHandle,
    ) -> Result<()>;
}

#[derive(Debug)]
struct WatchInner {
    stopped: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// A cancellation token for one location watch.
///
/// Cloneable; all clones share the same stop state.
#[derive(Debug, Clone)]
pub struct WatchHandle {
    inner: Arc<WatchInner>,
}

impl WatchHandle {
    fn new() -> Self {
        Self {
            inner: Arc::new(WatchInner {
                stopped: AtomicBool::new(false),
                task: Mutex::new(None),
            }),
        }
    }

    /// Stop the watch and release the provider subscription.
    ///
    /// Safe to call any number of times from any task. Returns `true` only
    /// for the call that actually released the subscription.
    pub fn stop(&self) -> bool {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return false;
        }
        let task = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
        debug!("Location subscription released");
        true
    }

    /// Check if the watch has been stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    fn attach(&self, task: JoinHandle<()>) {
        let mut slot = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_stopped() {
            task.abort();
        } else {
            *slot = Some(task);
        }
    }
}

/// The consumer side of a location watch.
///
/// Dropping the stream stops the watch.
#[derive(Debug)]
pub struct SampleStream {
    rx: mpsc::Receiver<PositionEvent>,
    handle: WatchHandle,
    distance_interval_meters: Option<f64>,
    last_delivered: Option<Coordinate>,
}

impl SampleStream {
    /// Wait for the next event.
    ///
    /// Returns `None` once the watch is stopped or the provider has ended.
    /// Samples closer than the distance interval to the previously delivered
    /// sample are skipped.
    pub async fn next(&mut self) -> Option<PositionEvent> {
        loop {
            if self.handle.is_stopped() {
                return None;
            }
            let event = self.rx.recv().await?;
            if self.handle.is_stopped() {
                return None;
            }

            if let PositionEvent::Sample(sample) = &event {
                if self.within_distance_interval(&sample.coordinate) {
                    trace!(
                        coordinate = %sample.coordinate,
                        "Sample within distance interval, skipping"
                    );
                    continue;
                }
                self.last_delivered = Some(sample.coordinate);
            }
            return Some(event);
        }
    }

    fn within_distance_interval(&self, coordinate: &Coordinate) -> bool {
        match (self.distance_interval_meters, self.last_delivered) {
            (Some(min), Some(last)) if min > 0.0 => last.haversine_distance(coordinate) < min,
            _ => false,
        }
    }

    /// Stop the watch. Idempotent.
    pub fn stop(&self) {
        self.handle.stop();
    }

    /// A handle that can stop this stream from another task.
    #[must_use]
    pub fn handle(&self) -> WatchHandle {
        self.handle.clone()
    }
}

impl Drop for SampleStream {
    fn drop(&mut self) {
        self.handle.stop();
    }
}

/// Permission-gated access to a [`LocationProvider`].
#[derive(Debug)]
pub struct PositionSource {
    provider: Arc<dyn LocationProvider>,
    active: Option<WatchHandle>,
}

impl PositionSource {
    /// Create a source over `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn LocationProvider>) -> Self {
        Self {
            provider,
            active: None,
        }
    }

    /// The underlying provider's name.
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Check if a watch started by this source is still running.
    #[must_use]
    pub fn is_watching(&self) -> bool {
        self.active.as_ref().is_some_and(|h| !h.is_stopped())
    }

    async fn ensure_permission(&self) -> Result<()> {
        let status = self.provider.request_permission().await;
        info!(
            provider = self.provider.name(),
            granted = status.is_granted(),
            "Location permission requested"
        );
        if status.is_granted() {
            Ok(())
        } else {
            Err(Error::permission_denied(PERMISSION_REQUIRED_MESSAGE))
        }
    }

    /// Start watching the device position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyWatching`] if a previous watch is still
    /// active, [`Error::PermissionDenied`] if access is refused (no sample
    /// is ever produced in that case), or [`Error::InvalidInput`] for bad
    /// options.
    pub async fn start(&mut self, options: WatchOptions) -> Result<SampleStream> {
        if self.is_watching() {
            return Err(Error::AlreadyWatching);
        }
        options.validate()?;
        self.ensure_permission().await?;

        let (tx, rx) = mpsc::channel(SAMPLE_BUFFER);
        let handle = WatchHandle::new();

        debug!(
            provider = self.provider.name(),
            accuracy = %options.accuracy,
            interval_ms = options.time_interval.as_millis(),
            distance_interval = ?options.distance_interval_meters,
            "Starting location watch"
        );

        let provider = Arc::clone(&self.provider);
        let task_handle = handle.clone();
        let task = tokio::spawn(async move {
            match provider.watch(options, tx, task_handle).await {
                Ok(()) => debug!("Location watch ended"),
                Err(e) => warn!(error = %e, "Location watch failed"),
            }
        });
        handle.attach(task);
        self.active = Some(handle.clone());

        Ok(SampleStream {
            rx,
            handle,
            distance_interval_meters: options.distance_interval_meters,
            last_delivered: None,
        })
    }

    /// Stop the active watch, if any. Idempotent.
    pub fn stop(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.stop();
        }
    }

    /// Take a single permission-gated fix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PermissionDenied`] or [`Error::LocationUnavailable`].
    pub async fn current_position(&self, accuracy: Accuracy) -> Result<PositionSample> {
        self.ensure_permission().await?;
        self.provider.current_position(accuracy).await
    }
}

impl Drop for PositionSource {
    fn drop(&mut self) {
        self.stop();
    }
}
