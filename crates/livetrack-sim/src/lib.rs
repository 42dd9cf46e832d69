//! Simulated platform location services for livetrack.
//!
//! This crate stands in for a device's location stack: a foreground
//! permission gate, a source of positions (a replayed route or a synthetic
//! walk), and a watcher that emits timed fixes through a channel.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod permissions;
pub mod route;
pub mod service;

pub use permissions::{PermissionGate, PermissionStatus};
pub use route::{Route, RouteError, RoutePlayer, Waypoint};
pub use service::{Fix, ServiceHandle, SimError, SimulatedLocationService};

/// Get the platform name.
#[must_use]
pub fn platform_name() -> &'static str {
    "simulated"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_name() {
        assert_eq!(platform_name(), "simulated");
    }

    #[test]
    fn test_exports() {
        let gate = PermissionGate::granting();
        assert!(gate.request().is_granted);

        let service = SimulatedLocationService::new(Route::stationary(Waypoint::new(1.0, 2.0)));
        assert!(!service.is_running());
    }
}
