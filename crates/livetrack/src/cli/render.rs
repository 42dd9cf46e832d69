//! Plain-text rendering for terminal output.

use std::fmt::Write;

use crate::presence::SharedSnapshot;
use crate::session::{FrameSink, RenderFrame, SessionSummary};
use crate::store::StoreStats;

/// One status line for a frame.
#[must_use]
pub fn frame_line(frame: &RenderFrame) -> String {
    let mut line = format!(
        "center {:.6},{:.6} | {:.2} km | track {} | users {}",
        frame.region.center.latitude,
        frame.region.center.longitude,
        frame.distance_meters / 1000.0,
        frame.track.len(),
        frame.snapshot.len(),
    );
    if let Some(status) = &frame.status {
        let _ = write!(line, " | {status}");
    }
    line
}

/// A table of users, their locations and route lengths.
#[must_use]
pub fn snapshot_table(snapshot: &SharedSnapshot) -> String {
    if snapshot.is_empty() {
        return "No users are sharing their location.\n".to_string();
    }

    let mut out = format!(
        "{:<20} {:>12} {:>12} {:>8}\n",
        "USER", "LATITUDE", "LONGITUDE", "ROUTE"
    );
    for (user_id, record) in snapshot.iter() {
        let _ = writeln!(
            out,
            "{:<20} {:>12.6} {:>12.6} {:>8}",
            user_id,
            record.location.latitude,
            record.location.longitude,
            record.route_coordinates.len()
        );
    }
    out
}

/// End-of-session totals.
#[must_use]
pub fn summary_text(summary: &SessionSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Session summary");
    let _ = writeln!(out, "---------------");
    let _ = writeln!(out, "Samples:          {}", summary.samples);
    let _ = writeln!(out, "Distance:         {:.2} km", summary.distance_meters / 1000.0);
    let _ = writeln!(out, "Track points:     {}", summary.track_points);
    let _ = writeln!(out, "Published:        {}", summary.published);
    if summary.publish_failures > 0 {
        let _ = writeln!(out, "Publish failures: {}", summary.publish_failures);
    }
    let _ = writeln!(out, "Users visible:    {}", summary.users_in_snapshot);
    out
}

/// Store statistics.
#[must_use]
pub fn stats_text(stats: &StoreStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Users:         {}", stats.users);
    let _ = writeln!(out, "With location: {}", stats.located_users);
    let _ = writeln!(out, "Route points:  {}", stats.route_points);
    let _ = writeln!(out, "Database size: {} bytes", stats.db_size_bytes);
    out
}

/// Prints each frame to stdout, either as text or one JSON object per line.
#[derive(Debug, Default)]
pub struct TerminalSink {
    json: bool,
    last_line: Option<String>,
}

impl TerminalSink {
    /// A sink printing text (`json == false`) or JSON lines.
    #[must_use]
    pub fn new(json: bool) -> Self {
        Self {
            json,
            last_line: None,
        }
    }
}

impl FrameSink for TerminalSink {
    fn render(&mut self, frame: &RenderFrame) {
        let line = if self.json {
            match serde_json::to_string(frame) {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to serialize frame");
                    return;
                }
            }
        } else {
            frame_line(frame)
        };

        // Presence rebuilds often repeat the previous frame exactly.
        if self.last_line.as_deref() != Some(line.as_str()) {
            println!("{line}");
            self.last_line = Some(line);
        }
    }
}
