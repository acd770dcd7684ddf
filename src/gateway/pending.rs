//! In-flight request table

use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::oneshot;

use super::error::{GatewayError, GatewayResult};
use crate::protocol::ResponseFrame;

pub(crate) type Completion = oneshot::Sender<GatewayResult<Value>>;

/// Requests awaiting a response, keyed by request id.
///
/// Each entry completes exactly once: either by its matching response or by
/// [`PendingRequests::reject_all`] when the connection drops.
#[derive(Default)]
pub(crate) struct PendingRequests {
    inflight: HashMap<String, Completion>,
}

impl PendingRequests {
    pub fn insert(&mut self, id: String, completion: Completion) {
        self.inflight.insert(id, completion);
    }

    /// Complete the request a response belongs to. Returns false for
    /// unknown ids, which are dropped.
    pub fn resolve(&mut self, response: ResponseFrame) -> bool {
        let Some(completion) = self.inflight.remove(&response.id) else {
            tracing::debug!(id = %response.id, "Response for unknown request dropped");
            return false;
        };
        let result = response.into_result().map_err(GatewayError::from);
        // The caller may have given up waiting
        let _ = completion.send(result);
        true
    }

    /// Reject every pending request with `ConnectionClosed`
    pub fn reject_all(&mut self) -> usize {
        let count = self.inflight.len();
        for (_, completion) in self.inflight.drain() {
            let _ = completion.send(Err(GatewayError::ConnectionClosed));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.inflight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_matches_by_id() {
        let mut pending = PendingRequests::default();
        let (tx, mut rx) = oneshot::channel();
        pending.insert("a".to_string(), tx);

        assert!(pending.resolve(ResponseFrame::ok("a", json!({"n": 1}))));
        assert_eq!(rx.try_recv().unwrap().unwrap(), json!({"n": 1}));
        assert_eq!(pending.len(), 0);

        // Second response for the same id is unknown now
        assert!(!pending.resolve(ResponseFrame::ok("a", json!(null))));
    }

    #[test]
    fn test_error_response_becomes_rpc_error() {
        let mut pending = PendingRequests::default();
        let (tx, mut rx) = oneshot::channel();
        pending.insert("a".to_string(), tx);

        pending.resolve(ResponseFrame::err("a", "BAD", "nope"));
        match rx.try_recv().unwrap() {
            Err(GatewayError::Rpc { code, message }) => {
                assert_eq!(code.as_deref(), Some("BAD"));
                assert_eq!(message, "nope");
            }
            other => panic!("Expected Rpc error, got {:?}", other),
        }
    }

    #[test]
    fn test_reject_all() {
        let mut pending = PendingRequests::default();
        let mut receivers = Vec::new();
        for id in ["a", "b", "c"] {
            let (tx, rx) = oneshot::channel();
            pending.insert(id.to_string(), tx);
            receivers.push(rx);
        }

        assert_eq!(pending.reject_all(), 3);
        for mut rx in receivers {
            assert!(matches!(rx.try_recv(), Ok(Err(GatewayError::ConnectionClosed))));
        }

        // Late responses find nothing to complete
        assert!(!pending.resolve(ResponseFrame::ok("a", json!(null))));
    }
}
