//! HTTP client - user interface collaborators.
//!
//! The client never talks to a user interface directly. Instead it calls into these traits, so
//! that an application can plug in its own toast, alert and routing implementations.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{error, warn};

/// Surface failure messages to the user.
pub trait Notifier: Send + Sync {
    /// Show non-blocking notification, like a toast.
    fn warning(&self, message: &str);

    /// Show blocking alert.
    fn alert(&self, message: &str);
}

/// Notifier which only writes log events.
#[derive(Clone, Copy, Debug, Default)]
#[non_exhaustive]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn warning(&self, message: &str) {
        warn!(text = message, "request failed");
    }

    fn alert(&self, message: &str) {
        error!(text = message, "request error");
    }
}

/// Application router.
pub trait Navigator: Send + Sync {
    /// Full path of the current location, including query string.
    fn current_path(&self) -> String;

    /// Replace current location.
    fn replace(&self, location: &str);
}

/// Navigator keeping the current location in memory.
#[derive(Debug)]
pub struct MemoryNavigator {
    current: Mutex<String>,
}

impl Default for MemoryNavigator {
    fn default() -> Self {
        Self::new("/")
    }
}

impl MemoryNavigator {
    /// Create navigator positioned at `path`.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            current: Mutex::new(path.into()),
        }
    }
}

impl Navigator for MemoryNavigator {
    fn current_path(&self) -> String {
        self.current.lock().clone()
    }

    fn replace(&self, location: &str) {
        *self.current.lock() = location.to_owned();
    }
}

/// Source of network connectivity state.
pub trait NetworkStatus: Send + Sync {
    /// Whether the network is believed to be available.
    fn is_online(&self) -> bool;
}

/// Always reports the network as available.
#[derive(Clone, Copy, Debug, Default)]
#[non_exhaustive]
pub struct AlwaysOnline;

impl NetworkStatus for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Connectivity flag which can be toggled by the application.
#[derive(Debug)]
pub struct OnlineFlag(AtomicBool);

impl Default for OnlineFlag {
    fn default() -> Self {
        Self::new(true)
    }
}

impl OnlineFlag {
    /// Create flag with initial state.
    #[must_use]
    pub fn new(online: bool) -> Self {
        Self(AtomicBool::new(online))
    }

    /// Update connectivity state.
    pub fn set(&self, online: bool) {
        self.0.store(online, Ordering::Release);
    }
}

impl NetworkStatus for OnlineFlag {
    fn is_online(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
