//! Recording transport for tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::trace;

use crate::message::{ClientRequest, SubscriptionId};
use crate::transport::{Transport, TransportError};

/// A [`Transport`] that records every request and goes nowhere.
///
/// Tests drive the engine by injecting [`crate::RelayMessage`]s on the
/// stream they constructed it with, and assert on what was requested here.
/// Connectivity is scripted with [`set_connected`].
///
/// [`set_connected`]: RecordingTransport::set_connected
#[derive(Default)]
pub struct RecordingTransport {
    requests: Mutex<Vec<ClientRequest>>,
    connected: AtomicBool,
}

impl RecordingTransport {
    /// Starts connected.
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        }
    }

    pub fn set_connected(&self, up: bool) {
        self.connected.store(up, Ordering::SeqCst);
    }

    /// Everything sent so far.
    pub fn requests(&self) -> Vec<ClientRequest> {
        self.lock().clone()
    }

    /// Ids of subscriptions opened so far, in order.
    pub fn subscribed_ids(&self) -> Vec<SubscriptionId> {
        self.lock()
            .iter()
            .filter_map(|r| match r {
                ClientRequest::Subscribe { id, .. } => Some(id.clone()),
                ClientRequest::Close { .. } => None,
            })
            .collect()
    }

    /// Ids of subscriptions closed so far, in order.
    pub fn closed_ids(&self) -> Vec<SubscriptionId> {
        self.lock()
            .iter()
            .filter_map(|r| match r {
                ClientRequest::Close { id } => Some(id.clone()),
                ClientRequest::Subscribe { .. } => None,
            })
            .collect()
    }

    /// Drop the recorded history.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ClientRequest>> {
        match self.requests.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, request: ClientRequest) -> Result<(), TransportError> {
        trace!(sub = %request.subscription_id(), "recorded request");
        self.lock().push(request);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;

    #[tokio::test]
    async fn records_in_order() {
        let transport = RecordingTransport::new();
        transport
            .send(ClientRequest::subscribe("a".into(), vec![Filter::global([1].into())]))
            .await
            .unwrap();
        transport
            .send(ClientRequest::Close { id: "a".into() })
            .await
            .unwrap();

        assert_eq!(transport.subscribed_ids(), vec!["a".to_string()]);
        assert_eq!(transport.closed_ids(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn connectivity_is_scripted() {
        let transport = RecordingTransport::new();
        assert!(transport.is_connected());
        transport.set_connected(false);
        assert!(!transport.is_connected());
    }
}
