//! Collector transport seam.
//!
//! The engine never speaks HTTP itself; hosts supply a [`Transport`] that
//! maps the uniform verb/path/body shape onto their HTTP stack. Every call
//! resolves to an [`ApiResponse`]: a transport failure or timeout is just
//! `ok == false` with status 0, never a propagated error.

use serde_json::Value;
use tempo_protocol::{ApiMethod, ApiResponse};

/// Network boundary used by delivery, heartbeats, flow sessions, and
/// account calls. Implementations must not block the interactive thread of
/// the host; how they achieve that (worker thread, async bridge) is the
/// host's concern.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        method: ApiMethod,
        path: &str,
        body: Option<Value>,
        auth_token: Option<&str>,
    ) -> ApiResponse;

    /// Cheap reachability probe. Unreachable is a normal per-tick skip for
    /// scheduled work, not an error.
    fn is_reachable(&self) -> bool;
}

/// Transport for hosts without a collector connection: every call fails
/// fast, so payloads spool into the offline queue until a real transport
/// drains them.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineTransport;

impl Transport for OfflineTransport {
    fn send(
        &self,
        _method: ApiMethod,
        _path: &str,
        _body: Option<Value>,
        _auth_token: Option<&str>,
    ) -> ApiResponse {
        ApiResponse::error(0)
    }

    fn is_reachable(&self) -> bool {
        false
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_transport_always_fails() {
        let transport = OfflineTransport;
        let resp = transport.send(ApiMethod::Post, "/v1/heartbeat", None, None);
        assert!(!resp.ok);
        assert_eq!(resp.status, 0);
        assert!(!transport.is_reachable());
    }

    #[test]
    fn mock_transport_pops_scripted_responses_in_order() {
        let transport = testing::MockTransport::new();
        transport.script(ApiResponse::error(503));
        transport.script(ApiResponse::ok(201, serde_json::json!({"id": 1})));

        assert!(!transport.send(ApiMethod::Post, "/a", None, None).ok);
        assert!(transport.send(ApiMethod::Post, "/a", None, None).ok);
        assert_eq!(transport.calls_to("/a"), 2);
    }
}
