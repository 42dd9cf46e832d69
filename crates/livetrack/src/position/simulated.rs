//! [`LocationProvider`] backed by the simulated platform service.

use std::sync::Arc;

use async_trait::async_trait;
use livetrack_sim::{Fix, SimError, SimulatedLocationService};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{
    Accuracy, LocationProvider, PermissionStatus, PositionEvent, PositionSample, WatchHandle,
    WatchOptions, PERMISSION_REQUIRED_MESSAGE,
};
use crate::error::{Error, Result};
use crate::geo::Coordinate;

/// Adapts [`SimulatedLocationService`] fixes into position events.
#[derive(Debug, Clone)]
pub struct SimulatedProvider {
    service: Arc<SimulatedLocationService>,
}

impl SimulatedProvider {
    /// Wrap a simulated service.
    #[must_use]
    pub fn new(service: SimulatedLocationService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }

    /// The wrapped service.
    #[must_use]
    pub fn service(&self) -> &SimulatedLocationService {
        &self.service
    }
}

fn map_sim_error(err: SimError) -> Error {
    match err {
        SimError::PermissionDenied => Error::permission_denied(PERMISSION_REQUIRED_MESSAGE),
        SimError::AlreadyRunning => Error::AlreadyWatching,
    }
}

fn fix_to_event(fix: Fix) -> PositionEvent {
    match Coordinate::new(fix.latitude, fix.longitude) {
        Ok(coordinate) => PositionEvent::Sample(PositionSample {
            coordinate,
            captured_at: fix.timestamp,
            accuracy_meters: Some(fix.accuracy_meters),
        }),
        Err(e) => PositionEvent::Unavailable {
            reason: e.to_string(),
        },
    }
}

#[async_trait]
impl LocationProvider for SimulatedProvider {
    fn name(&self) -> &'static str {
        livetrack_sim::platform_name()
    }

    async fn request_permission(&self) -> PermissionStatus {
        if self.service.request_permission().is_granted {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        }
    }

    async fn current_position(&self, accuracy: Accuracy) -> Result<PositionSample> {
        let fix = self
            .service
            .current_fix(accuracy.radius_meters())
            .map_err(map_sim_error)?;
        match fix_to_event(fix) {
            PositionEvent::Sample(sample) => Ok(sample),
            PositionEvent::Unavailable { reason } => Err(Error::location_unavailable(reason)),
        }
    }

    async fn watch(
        &self,
        options: WatchOptions,
        tx: mpsc::Sender<PositionEvent>,
        handle: WatchHandle,
    ) -> Result<()> {
        let (fix_tx, mut fix_rx) = mpsc::channel(4);
        let producer = self.service.watch_position(
            options.time_interval,
            options.accuracy.radius_meters(),
            fix_tx,
        );
        tokio::pin!(producer);

        loop {
            tokio::select! {
                result = &mut producer => {
                    return result.map_err(map_sim_error);
                }
                fix = fix_rx.recv() => {
                    let Some(fix) = fix else { break };
                    if handle.is_stopped() {
                        break;
                    }
                    let event = fix_to_event(fix);
                    if let PositionEvent::Unavailable { reason } = &event {
                        warn!(reason = %reason, "Simulated fix rejected");
                    }
                    if tx.send(event).await.is_err() {
                        debug!("Position channel closed, stopping simulated watch");
                        break;
                    }
                }
            }
        }

        self.service.stop();
        Ok(())
    }
}
