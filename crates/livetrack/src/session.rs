//! A live tracking session.
//!
//! The session owns the local track, the distance total and the latest
//! presence snapshot. Position samples and presence updates arrive on one
//! `select!` loop, so they never run concurrently, and after each one the
//! session hands a fresh [`RenderFrame`] to its [`FrameSink`].

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::distance::DistanceAccumulator;
use crate::error::{Error, Result};
use crate::geo::{Coordinate, Region};
use crate::position::{PositionEvent, PositionSample, PositionSource, SampleStream, WatchOptions};
use crate::presence::{
    Identity, PresencePublisher, PresenceSubscriber, PresenceUpdate, PublishOutcome,
    SharedSnapshot, SnapshotStream,
};
use crate::store::SharedStore;
use crate::track::{Track, TrackRecorder};

/// Everything the renderer needs for one tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderFrame {
    /// Viewport to show.
    pub region: Region,
    /// This device's route, oldest first.
    pub track: Track,
    /// Everyone's presence.
    pub snapshot: SharedSnapshot,
    /// Distance travelled this session.
    pub distance_meters: f64,
    /// A status line, if something went wrong.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Consumes render frames.
pub trait FrameSink {
    /// Draw one frame.
    fn render(&mut self, frame: &RenderFrame);
}

impl<F> FrameSink for F
where
    F: FnMut(&RenderFrame),
{
    fn render(&mut self, frame: &RenderFrame) {
        self(frame);
    }
}

/// Totals reported when a session ends.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionSummary {
    /// Samples received from the position source.
    pub samples: usize,
    /// Distance travelled in meters.
    pub distance_meters: f64,
    /// Points in the local track.
    pub track_points: usize,
    /// Successful publishes.
    pub published: usize,
    /// Publishes where a store write failed.
    pub publish_failures: usize,
    /// Users in the last snapshot.
    pub users_in_snapshot: usize,
}

#[derive(Debug, Clone)]
struct Status {
    message: String,
    transient: bool,
}

impl From<&Error> for Status {
    fn from(err: &Error) -> Self {
        Self {
            message: err.status_message(),
            transient: err.is_transient(),
        }
    }
}

/// Local tracking plus optional presence sharing.
#[derive(Debug)]
pub struct TrackingSession {
    region: Region,
    distance: DistanceAccumulator,
    track: TrackRecorder,
    snapshot: SharedSnapshot,
    status: Option<Status>,
    publisher: Option<PresencePublisher>,
    subscriber: Option<PresenceSubscriber>,
    samples: usize,
    published: usize,
    publish_failures: usize,
}

impl TrackingSession {
    /// A session that tracks locally and shares nothing.
    #[must_use]
    pub fn solo(initial_region: Region) -> Self {
        Self {
            region: initial_region,
            distance: DistanceAccumulator::new(),
            track: TrackRecorder::new(),
            snapshot: SharedSnapshot::default(),
            status: None,
            publisher: None,
            subscriber: None,
            samples: 0,
            published: 0,
            publish_failures: 0,
        }
    }

    /// A session that publishes as `identity` and observes everyone.
    #[must_use]
    pub fn shared(
        initial_region: Region,
        store: Arc<dyn SharedStore>,
        identity: Identity,
        follow_when_anonymous: bool,
    ) -> Self {
        let publisher = PresencePublisher::new(Arc::clone(&store), identity.clone());
        let subscriber =
            PresenceSubscriber::new(store, identity).with_follow(follow_when_anonymous);
        Self {
            publisher: Some(publisher),
            subscriber: Some(subscriber),
            ..Self::solo(initial_region)
        }
    }

    /// Check whether this session talks to a shared store.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.subscriber.is_some()
    }

    /// Handle one position sample.
    ///
    /// Updates the distance and track, moves the viewport and publishes the
    /// sample once. A failed publish only changes the status line. Returns
    /// the cumulative distance in meters.
    pub async fn apply_sample(&mut self, sample: &PositionSample) -> f64 {
        self.samples += 1;
        let total = self.distance.on_sample(sample);
        self.track.append(sample.coordinate);
        self.region = self.region.recentered(sample.coordinate);
        self.clear_transient_status();

        if let Some(publisher) = &self.publisher {
            match publisher.publish(sample.coordinate).await {
                Ok(PublishOutcome::Published { .. }) => self.published += 1,
                Ok(PublishOutcome::Skipped) => {}
                Err(e) => {
                    self.publish_failures += 1;
                    self.set_status(&e);
                }
            }
        }
        total
    }

    /// Note that the platform could not produce a fix.
    pub fn apply_unavailable(&mut self, reason: &str) {
        self.set_status(&Error::location_unavailable(reason));
    }

    /// Take a presence rebuild, or keep the last snapshot if it failed.
    pub fn apply_update(&mut self, update: Result<PresenceUpdate>) {
        match update {
            Ok(update) => {
                if let Some(center) = update.recenter {
                    self.recenter(center);
                }
                self.snapshot = update.snapshot;
                self.clear_transient_status();
            }
            Err(e) => {
                warn!(error = %e, "Keeping last presence snapshot");
                self.set_status(&e);
            }
        }
    }

    fn recenter(&mut self, center: Coordinate) {
        debug!(%center, "Recentering on another user");
        self.region = self.region.recentered(center);
    }

    fn set_status(&mut self, err: &Error) {
        self.status = Some(Status::from(err));
    }

    fn clear_transient_status(&mut self) {
        if self.status.as_ref().is_some_and(|s| s.transient) {
            self.status = None;
        }
    }

    /// The current render frame.
    #[must_use]
    pub fn frame(&self) -> RenderFrame {
        RenderFrame {
            region: self.region,
            track: self.track.snapshot(),
            snapshot: self.snapshot.clone(),
            distance_meters: self.distance.total_meters(),
            status: self.status.as_ref().map(|s| s.message.clone()),
        }
    }

    /// Totals so far.
    #[must_use]
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            samples: self.samples,
            distance_meters: self.distance.total_meters(),
            track_points: self.track.len(),
            published: self.published,
            publish_failures: self.publish_failures,
            users_in_snapshot: self.snapshot.len(),
        }
    }

    /// Run until `shutdown` resolves or there is nothing left to watch.
    ///
    /// If location permission is refused the session keeps observing
    /// presence and shows the refusal as its status line. Both the location
    /// watch and the presence listener are released before this returns.
    pub async fn run<S>(
        mut self,
        source: &mut PositionSource,
        options: WatchOptions,
        sink: &mut dyn FrameSink,
        shutdown: S,
    ) -> SessionSummary
    where
        S: Future<Output = ()>,
    {
        let mut samples = match source.start(options).await {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!(error = %e, "Location watch not started");
                self.set_status(&e);
                None
            }
        };
        let mut presence = self.subscriber.as_ref().map(PresenceSubscriber::snapshot_stream);

        info!(
            shared = self.is_shared(),
            watching = samples.is_some(),
            "Tracking session started"
        );
        sink.render(&self.frame());

        tokio::pin!(shutdown);
        while samples.is_some() || presence.is_some() {
            tokio::select! {
                biased;

                () = &mut shutdown => {
                    debug!("Tracking session shutdown requested");
                    break;
                }
                event = next_event(&mut samples) => match event {
                    Some(PositionEvent::Sample(sample)) => {
                        self.apply_sample(&sample).await;
                    }
                    Some(PositionEvent::Unavailable { reason }) => self.apply_unavailable(&reason),
                    None => {
                        debug!("Location stream ended");
                        samples = None;
                        continue;
                    }
                },
                update = next_update(&mut presence) => match update {
                    Some(update) => self.apply_update(update),
                    None => {
                        debug!("Presence stream ended");
                        presence = None;
                        continue;
                    }
                },
            }
            sink.render(&self.frame());
        }

        drop(samples);
        drop(presence);
        source.stop();

        let summary = self.summary();
        info!(
            samples = summary.samples,
            distance_meters = summary.distance_meters,
            users = summary.users_in_snapshot,
            "Tracking session ended"
        );
        summary
    }
}

async fn next_event(stream: &mut Option<SampleStream>) -> Option<PositionEvent> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn next_update(stream: &mut Option<SnapshotStream>) -> Option<Result<PresenceUpdate>> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}
