//! Background reclamation of idle and expired sessions.

use std::sync::Weak;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use super::record::SessionRecord;
use super::registry::{Registry, WeakRegistry};
use crate::error::{Result, SessionError};

/// Periodic sweep task evicting records idle for a whole interval.
///
/// The task holds only a weak reference to the registry and stops on
/// [`GarbageCollector::shutdown`], on drop, or once the registry is gone.
#[derive(Debug)]
pub struct GarbageCollector {
    shutdown: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl GarbageCollector {
    /// Start sweeping `registry` every `interval` on the current runtime.
    pub fn spawn(registry: &Registry, interval: Duration) -> Result<Self> {
        let runtime =
            Handle::try_current().map_err(|e| SessionError::RuntimeUnavailable(e.to_string()))?;
        let (shutdown, rx) = watch::channel(false);
        let handle = runtime.spawn(run(registry.downgrade(), interval, rx));

        debug!(interval_secs = interval.as_secs_f64(), "session collector started");
        Ok(Self {
            shutdown,
            handle: Some(handle),
        })
    }

    /// Signal the task to stop without waiting for it.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Stop the task and wait for it to exit.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for GarbageCollector {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(registry: WeakRegistry, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => break,
        }

        let Some(registry) = registry.upgrade() else {
            break;
        };
        let evicted = registry.sweep(interval);
        if evicted > 0 {
            debug!(evicted, remaining = registry.len(), "swept idle sessions");
        }
    }
    debug!("session collector stopped");
}

/// Destroy `record` once its lifetime has passed.
///
/// Re-reads the lifetime after every sleep, so a shifted expiration simply
/// extends the wait. Does nothing if the record was replaced or removed
/// in the meantime.
pub(crate) async fn expire_when_due(registry: WeakRegistry, record: Weak<SessionRecord>) {
    loop {
        let remaining = match record.upgrade() {
            Some(record) => record.lifetime().remaining(),
            None => return,
        };
        match remaining {
            None => return,
            Some(left) if left.is_zero() => break,
            Some(left) => tokio::time::sleep(left).await,
        }
    }

    if let (Some(registry), Some(record)) = (registry.upgrade(), record.upgrade()) {
        if registry.destroy_record(&record) {
            debug!(session = %record.id(), "session expired");
        }
    }
}
