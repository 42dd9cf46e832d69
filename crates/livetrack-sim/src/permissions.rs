//! Foreground location permission handling.
//!
//! A real device asks the user once and remembers the answer. The simulated
//! gate is configured with the answer up front and records whether it has
//! been asked, so callers can verify that sampling is gated on a request.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

/// Information about the current location permission status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionStatus {
    /// Whether foreground location access is granted.
    pub is_granted: bool,

    /// Human-readable description of the status.
    pub description: String,
}

impl PermissionStatus {
    /// Create a new granted status.
    #[must_use]
    pub fn granted() -> Self {
        Self {
            is_granted: true,
            description: "Location permission is granted".to_string(),
        }
    }

    /// Create a new denied status.
    #[must_use]
    pub fn denied() -> Self {
        Self {
            is_granted: false,
            description: "Location permission is required.".to_string(),
        }
    }
}

/// A foreground location permission prompt with a scripted answer.
#[derive(Debug)]
pub struct PermissionGate {
    grant: bool,
    requested: AtomicBool,
}

impl PermissionGate {
    /// Create a gate that answers every request with `grant`.
    #[must_use]
    pub fn new(grant: bool) -> Self {
        Self {
            grant,
            requested: AtomicBool::new(false),
        }
    }

    /// Create a gate that grants access.
    #[must_use]
    pub fn granting() -> Self {
        Self::new(true)
    }

    /// Create a gate that refuses access.
    #[must_use]
    pub fn denying() -> Self {
        Self::new(false)
    }

    /// Ask for foreground location access.
    pub fn request(&self) -> PermissionStatus {
        self.requested.store(true, Ordering::SeqCst);
        debug!(granted = self.grant, "Location permission requested");
        self.check()
    }

    /// Check the current status without prompting.
    #[must_use]
    pub fn check(&self) -> PermissionStatus {
        if self.grant && self.was_requested() {
            PermissionStatus::granted()
        } else {
            PermissionStatus::denied()
        }
    }

    /// Whether `request` has been called at least once.
    #[must_use]
    pub fn was_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}
