//! Live-reload notifications
//!
//! Tasks never talk to browsers directly. They hold an
//! `Arc<dyn ReloadNotifier>` and fire events at it; the dev server turns
//! those into server-sent events for every connected page.

use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::broadcast;

/// A message pushed to connected browsers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReloadEvent {
    /// Full page refresh
    Reload,
    /// Output files were rewritten; stylesheet-only changes are hot-swapped
    Changed { paths: Vec<String> },
    /// A compile error worth showing in the page overlay
    Error { task: String, message: String },
}

impl ReloadEvent {
    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            ReloadEvent::Reload => "reload",
            ReloadEvent::Changed { .. } => "changed",
            ReloadEvent::Error { .. } => "error",
        }
    }

    /// Build a `Changed` event from output paths, relative to the output root
    pub fn changed(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        ReloadEvent::Changed {
            paths: paths
                .into_iter()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .collect(),
        }
    }
}

/// Sink for reload events
pub trait ReloadNotifier: Send + Sync {
    fn notify(&self, event: ReloadEvent);
}

/// Notifier for one-shot builds where nobody is listening
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReload;

impl ReloadNotifier for NoReload {
    fn notify(&self, event: ReloadEvent) {
        tracing::trace!(event = event.name(), "reload event dropped (no server)");
    }
}

/// Broadcast hub shared by the dev server and the task context
#[derive(Debug, Clone)]
pub struct LiveReload {
    tx: broadcast::Sender<ReloadEvent>,
}

impl LiveReload {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    /// New receiver for one browser connection
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadEvent> {
        self.tx.subscribe()
    }

    /// Number of connected browsers
    pub fn clients(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for LiveReload {
    fn default() -> Self {
        Self::new()
    }
}

impl ReloadNotifier for LiveReload {
    fn notify(&self, event: ReloadEvent) {
        let name = event.name();
        // Err only means no browser is connected right now
        match self.tx.send(event) {
            Ok(n) => tracing::debug!(event = name, clients = n, "live-reload sent"),
            Err(_) => tracing::debug!(event = name, "live-reload sent, no clients"),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_every_client() {
        let hub = LiveReload::new();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();
        assert_eq!(hub.clients(), 2);

        hub.notify(ReloadEvent::Reload);

        assert_eq!(a.recv().await.unwrap(), ReloadEvent::Reload);
        assert_eq!(b.recv().await.unwrap(), ReloadEvent::Reload);
    }

    #[test]
    fn test_notify_without_clients_is_fine() {
        let hub = LiveReload::new();
        hub.notify(ReloadEvent::Reload);
        assert_eq!(hub.clients(), 0);
    }

    #[test]
    fn test_changed_event_serializes_with_forward_slashes() {
        let event = ReloadEvent::changed([PathBuf::from("css").join("style.css")]);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "changed");
        assert_eq!(json["paths"][0], "css/style.css");
    }
}
