//! Payload delivery: immediate send with offline fallback.
//!
//! `submit` is called with a closed, non-empty aggregate. A failed send is
//! never fatal to the editing session: the payload is upserted into the
//! offline queue under its stable identity and retried by the scheduled
//! drain. Draining walks oldest-first and stops at the first failure so
//! deliveries are never reordered and an unreachable server is not hammered.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use tempo_protocol::ApiMethod;

use crate::aggregate::SessionAggregate;
use crate::kv::KvStore;
use crate::net::Transport;
use crate::queue::{OfflineQueue, QueueEntry};

pub const SESSION_SUMMARY_PATH: &str = "/v1/session_summaries";

/// Kv key holding the collector auth token.
pub const AUTH_TOKEN_KEY: &str = "jwt";

/// Stable payload identity used for queue deduplication: the same session
/// closed twice (a boundary/flush race) maps to the same entry.
pub fn payload_identity(aggregate: &SessionAggregate) -> String {
    let source = format!(
        "{}|{}|{}",
        aggregate.project.directory, aggregate.start, aggregate.end
    );
    format!("{:x}", md5::compute(source))
}

pub struct DeliveryManager {
    queue: OfflineQueue,
    transport: Arc<dyn Transport>,
    kv: KvStore,
}

impl DeliveryManager {
    pub fn new(queue: OfflineQueue, transport: Arc<dyn Transport>, kv: KvStore) -> Self {
        Self {
            queue,
            transport,
            kv,
        }
    }

    pub fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    /// Attempts an immediate send; on failure the payload is spooled. Never
    /// raises to the caller.
    pub fn submit(&self, aggregate: &SessionAggregate, now: DateTime<Utc>) {
        let id = payload_identity(aggregate);
        let payload = match serde_json::to_value(aggregate) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "Failed to serialize session payload, dropping");
                return;
            }
        };

        let token = self.kv.get_string(AUTH_TOKEN_KEY);
        let response = self.transport.send(
            ApiMethod::Post,
            SESSION_SUMMARY_PATH,
            Some(payload.clone()),
            token.as_deref(),
        );

        if response.ok {
            debug!(id = %id, "Session payload delivered");
            return;
        }

        debug!(id = %id, status = response.status, "Send failed, spooling payload");
        if let Err(err) = self.queue.append(QueueEntry::new(id, now, payload), now) {
            // The aggregate snapshot is already serialized into `payload`;
            // the caller keeps nothing, so this loss is worth a loud log.
            warn!(error = %err, "Failed to spool session payload");
        }
    }

    /// Sends queued payloads oldest-first, removing each on success and
    /// stopping at the first failure. Returns the number delivered.
    pub fn drain(&self) -> usize {
        let token = self.kv.get_string(AUTH_TOKEN_KEY);
        let mut delivered = 0;

        for entry in self.queue.list_oldest_first() {
            let response = self.transport.send(
                ApiMethod::Post,
                SESSION_SUMMARY_PATH,
                Some(entry.payload.clone()),
                token.as_deref(),
            );

            if !response.ok {
                debug!(
                    id = %entry.id,
                    status = response.status,
                    delivered,
                    "Drain stopped at first failure"
                );
                break;
            }

            if let Err(err) = self.queue.remove(&entry.id) {
                // Delivered but not dequeued; the next drain will resend and
                // the collector dedups by payload identity.
                warn!(error = %err, id = %entry.id, "Failed to remove delivered entry");
                break;
            }
            delivered += 1;
        }

        delivered
    }
}
