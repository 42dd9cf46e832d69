//! Timed position emission.
//!
//! The service replays a [`Route`] at a fixed interval, sending one [`Fix`]
//! per tick through a channel until it is stopped or the receiver goes away.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, trace, warn};

use crate::permissions::{PermissionGate, PermissionStatus};
use crate::route::{Route, RoutePlayer};

/// Errors that can occur in the simulated location service.
#[derive(Debug, Error)]
pub enum SimError {
    /// Location permission has not been granted.
    #[error("location permission not granted")]
    PermissionDenied,

    /// The service is already watching.
    #[error("location watch already running")]
    AlreadyRunning,
}

/// Result type for simulated location operations.
pub type Result<T> = std::result::Result<T, SimError>;

/// A single position report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Horizontal accuracy radius in meters.
    pub accuracy_meters: f64,
    /// When the fix was taken.
    pub timestamp: DateTime<Utc>,
}

/// Clears the running flag when the watch loop exits, including on drop.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Simulated device location service.
#[derive(Debug)]
pub struct SimulatedLocationService {
    permissions: PermissionGate,
    player: Mutex<RoutePlayer>,
    running: Arc<AtomicBool>,
}

impl SimulatedLocationService {
    /// Create a service that replays `route` and grants permission.
    #[must_use]
    pub fn new(route: Route) -> Self {
        Self::with_permissions(route, PermissionGate::granting())
    }

    /// Create a service with an explicit permission gate.
    #[must_use]
    pub fn with_permissions(route: Route, permissions: PermissionGate) -> Self {
        Self {
            permissions,
            player: Mutex::new(route.player()),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Ask for foreground location access.
    pub fn request_permission(&self) -> PermissionStatus {
        self.permissions.request()
    }

    /// Check if the watch loop is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Report the current position without advancing the route.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::PermissionDenied`] if permission has not been granted.
    pub fn current_fix(&self, accuracy_meters: f64) -> Result<Fix> {
        if !self.permissions.check().is_granted {
            return Err(SimError::PermissionDenied);
        }
        let waypoint = self
            .player
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .peek();
        Ok(Fix {
            latitude: waypoint.latitude,
            longitude: waypoint.longitude,
            accuracy_meters,
            timestamp: Utc::now(),
        })
    }

    fn next_fix(&self, accuracy_meters: f64) -> Fix {
        let waypoint = self
            .player
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_waypoint();
        Fix {
            latitude: waypoint.latitude,
            longitude: waypoint.longitude,
            accuracy_meters,
            timestamp: Utc::now(),
        }
    }

    /// Emit one fix per `period` through `tx`.
    ///
    /// This runs until `stop()` is called or the receiver is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if permission has not been granted or a watch is
    /// already running.
    pub async fn watch_position(
        &self,
        period: Duration,
        accuracy_meters: f64,
        tx: mpsc::Sender<Fix>,
    ) -> Result<()> {
        if !self.permissions.check().is_granted {
            return Err(SimError::PermissionDenied);
        }
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Location watch already running");
            return Err(SimError::AlreadyRunning);
        }
        let _guard = RunningGuard(Arc::clone(&self.running));

        debug!(
            interval_ms = period.as_millis(),
            accuracy_meters, "Starting simulated location watch"
        );

        let mut ticker = interval(period);

        while self.running.load(Ordering::SeqCst) {
            ticker.tick().await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            let fix = self.next_fix(accuracy_meters);
            trace!(
                latitude = fix.latitude,
                longitude = fix.longitude,
                "Emitting simulated fix"
            );
            if tx.send(fix).await.is_err() {
                debug!("Fix channel closed, stopping watch");
                break;
            }
        }

        debug!("Simulated location watch stopped");
        Ok(())
    }

    /// Stop the watch loop.
    pub fn stop(&self) {
        debug!("Stopping simulated location watch");
        self.running.store(false, Ordering::SeqCst);
    }

    /// Get a handle that can stop the watch loop from another task.
    #[must_use]
    pub fn stop_handle(&self) -> ServiceHandle {
        ServiceHandle {
            running: Arc::clone(&self.running),
        }
    }
}

/// A handle to control a running watch loop.
#[derive(Debug, Clone)]
pub struct ServiceHandle {
    running: Arc<AtomicBool>,
}

impl ServiceHandle {
    /// Stop the associated watch loop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the watch loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::Waypoint;

    fn two_point_route() -> Route {
        Route::new(vec![Waypoint::new(10.0, 106.0), Waypoint::new(10.0, 106.01)]).unwrap()
    }

    #[test]
    fn test_current_fix_requires_permission() {
        let service = SimulatedLocationService::new(two_point_route());
        assert!(matches!(
            service.current_fix(5.0),
            Err(SimError::PermissionDenied)
        ));

        assert!(service.request_permission().is_granted);
        let fix = service.current_fix(5.0).unwrap();
        assert_eq!(fix.latitude, 10.0);
        assert_eq!(fix.longitude, 106.0);
        assert_eq!(fix.accuracy_meters, 5.0);
    }

    #[test]
    fn test_current_fix_does_not_advance() {
        let service = SimulatedLocationService::new(two_point_route());
        service.request_permission();
        let first = service.current_fix(5.0).unwrap();
        let second = service.current_fix(5.0).unwrap();
        assert_eq!(first.longitude, second.longitude);
    }

    #[tokio::test]
    async fn test_watch_denied() {
        let service = SimulatedLocationService::with_permissions(
            two_point_route(),
            PermissionGate::denying(),
        );
        service.request_permission();
        let (tx, _rx) = mpsc::channel(4);
        let result = service
            .watch_position(Duration::from_millis(5), 5.0, tx)
            .await;
        assert!(matches!(result, Err(SimError::PermissionDenied)));
        assert!(!service.is_running());
    }

    #[tokio::test]
    async fn test_watch_emits_route_in_order() {
        let service = Arc::new(SimulatedLocationService::new(two_point_route()));
        service.request_permission();
        let (tx, mut rx) = mpsc::channel(4);

        let watcher = Arc::clone(&service);
        let task = tokio::spawn(async move {
            watcher
                .watch_position(Duration::from_millis(5), 5.0, tx)
                .await
        });

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        let third = rx.recv().await.unwrap();
        assert_eq!(first.longitude, 106.0);
        assert_eq!(second.longitude, 106.01);
        assert_eq!(third.longitude, 106.01);
        assert!(service.is_running());

        service.stop();
        drop(rx);
        assert!(task.await.unwrap().is_ok());
        assert!(!service.is_running());
    }

    #[tokio::test]
    async fn test_watch_stops_when_receiver_dropped() {
        let service = SimulatedLocationService::new(two_point_route());
        service.request_permission();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let result = service
            .watch_position(Duration::from_millis(5), 5.0, tx)
            .await;
        assert!(result.is_ok());
        assert!(!service.is_running());
    }

    #[tokio::test]
    async fn test_watch_rejects_second_watch() {
        let service = Arc::new(SimulatedLocationService::new(two_point_route()));
        service.request_permission();
        let (tx, mut rx) = mpsc::channel(4);

        let watcher = Arc::clone(&service);
        let task = tokio::spawn(async move {
            watcher
                .watch_position(Duration::from_millis(5), 5.0, tx)
                .await
        });
        rx.recv().await.unwrap();

        let (tx2, _rx2) = mpsc::channel(4);
        let second = service
            .watch_position(Duration::from_millis(5), 5.0, tx2)
            .await;
        assert!(matches!(second, Err(SimError::AlreadyRunning)));

        service.stop_handle().stop();
        drop(rx);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_running_flag_cleared_when_future_dropped() {
        let service = Arc::new(SimulatedLocationService::new(two_point_route()));
        service.request_permission();
        let (tx, mut rx) = mpsc::channel(4);

        let watcher = Arc::clone(&service);
        let task = tokio::spawn(async move {
            watcher
                .watch_position(Duration::from_millis(5), 5.0, tx)
                .await
        });
        rx.recv().await.unwrap();
        assert!(service.stop_handle().is_running());

        task.abort();
        let _ = task.await;
        assert!(!service.is_running());
    }

    #[test]
    fn test_sim_error_display() {
        assert!(SimError::PermissionDenied.to_string().contains("permission"));
        assert!(SimError::AlreadyRunning
            .to_string()
            .contains("already running"));
    }
}
