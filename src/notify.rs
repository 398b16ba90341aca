use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use crate::error::ResolveError;

/// User-facing notification hooks the core invokes on resolver health
/// changes. The UI layer provides the real implementation.
pub trait Notifier: Send + Sync {
    fn notify_failing_resolvers(&self, err: &ResolveError);
    fn reset_failing_resolvers(&self);
    /// Result of the platform self-check; gates the failing notification.
    fn self_check_is_failing(&self) -> bool;
}

/// Log-only notifier used when no UI is attached.
#[derive(Default)]
pub struct LogNotifier {
    active: AtomicBool,
    self_check_failing: AtomicBool,
}

impl LogNotifier {
    pub fn set_self_check_failing(&self, failing: bool) {
        self.self_check_failing.store(failing, Ordering::Relaxed);
    }

    /// Whether the failing-resolvers notification is currently raised.
    pub fn notification_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }
}

impl Notifier for LogNotifier {
    fn notify_failing_resolvers(&self, err: &ResolveError) {
        if !self.active.swap(true, Ordering::Relaxed) {
            warn!("configured resolvers are failing: {}", err);
        }
    }

    fn reset_failing_resolvers(&self) {
        if self.active.swap(false, Ordering::Relaxed) {
            info!("configured resolvers recovered");
        }
    }

    fn self_check_is_failing(&self) -> bool {
        self.self_check_failing.load(Ordering::Relaxed)
    }
}
