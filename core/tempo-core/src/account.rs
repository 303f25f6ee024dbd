//! Collector account and identity state.
//!
//! Every window starts anonymous: the first reachable window onboards an
//! anonymous identity and stores the returned auth token in the shared kv
//! store. Registration is external (browser signup); this module only polls
//! for its completion and mirrors the result locally. Every network failure
//! here is a skip; identity work retries on later ticks.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info};

use tempo_protocol::ApiMethod;

use crate::delivery::AUTH_TOKEN_KEY;
use crate::host::host_identity;
use crate::kv::KvStore;
use crate::net::Transport;

/// Kv key holding the registered account name (email). Present iff the user
/// completed signup.
pub const ACCOUNT_NAME_KEY: &str = "name";

/// Preference keys mirrored from the server.
pub const DISABLE_GIT_PREF: &str = "disableGitData";

pub const ONBOARD_PATH: &str = "/plugins/onboard";
pub const USER_STATE_PATH: &str = "/users/plugin/state";
pub const USER_ME_PATH: &str = "/users/me";

pub struct AccountManager {
    kv: KvStore,
    transport: Arc<dyn Transport>,
    plugin_version: String,
    utc_offset_secs: i64,
}

impl AccountManager {
    pub fn new(
        kv: KvStore,
        transport: Arc<dyn Transport>,
        plugin_version: String,
        utc_offset_secs: i64,
    ) -> Self {
        Self {
            kv,
            transport,
            plugin_version,
            utc_offset_secs,
        }
    }

    pub fn auth_token(&self) -> Option<String> {
        self.kv.get_string(AUTH_TOKEN_KEY)
    }

    /// Registered means the user finished signup and we learned their name.
    pub fn is_registered(&self) -> bool {
        self.kv.get_string(ACCOUNT_NAME_KEY).is_some()
    }

    /// Whether the local identity state is intact: the session file exists
    /// and carries an auth token.
    pub fn session_state_present(&self) -> bool {
        self.kv.file_exists() && self.auth_token().is_some()
    }

    /// Onboards an anonymous identity. Returns true when a fresh token was
    /// created and stored.
    pub fn create_anonymous_user(&self) -> bool {
        if self.auth_token().is_some() {
            return false;
        }

        let host = host_identity();
        let body = json!({
            "hostname": host.hostname,
            "os": host.os,
            "plugin_version": self.plugin_version,
            "timezone_offset_secs": self.utc_offset_secs,
        });

        let response = self
            .transport
            .send(ApiMethod::Post, ONBOARD_PATH, Some(body), None);
        if !response.ok {
            debug!(status = response.status, "Anonymous onboarding skipped");
            return false;
        }

        let Some(token) = response
            .data
            .as_ref()
            .and_then(|data| data.get("jwt"))
            .and_then(Value::as_str)
        else {
            debug!("Onboard response carried no token");
            return false;
        };

        if self.kv.set(AUTH_TOKEN_KEY, json!(token)).is_err() {
            return false;
        }
        info!("Created anonymous collector identity");
        true
    }

    /// Polls registration state. Stores the account name (and any rotated
    /// token) when the user has registered; returns whether they have.
    pub fn refresh_registration_state(&self) -> bool {
        let Some(token) = self.auth_token() else {
            return false;
        };

        let response =
            self.transport
                .send(ApiMethod::Get, USER_STATE_PATH, None, Some(&token));
        if !response.ok {
            return self.is_registered();
        }

        let Some(user) = response.data.as_ref().and_then(|data| data.get("user")) else {
            return self.is_registered();
        };

        if let Some(rotated) = user.get("plugin_jwt").and_then(Value::as_str) {
            let _ = self.kv.set(AUTH_TOKEN_KEY, json!(rotated));
        }

        let registered = user.get("registered").and_then(Value::as_i64) == Some(1);
        if registered {
            if let Some(email) = user.get("email").and_then(Value::as_str) {
                if self.kv.get_string(ACCOUNT_NAME_KEY).as_deref() != Some(email) {
                    info!("Collector account registered");
                    let _ = self.kv.set(ACCOUNT_NAME_KEY, json!(email));
                }
            }
        }

        registered
    }

    /// Mirrors server-side preferences into the kv store, falling back to
    /// defaults when the user or preferences are unavailable.
    pub fn initialize_preferences(&self) {
        let mut threshold = crate::boundary::DEFAULT_SESSION_THRESHOLD_SECS;
        let mut disable_git = false;

        if let Some(token) = self.auth_token() {
            let response = self
                .transport
                .send(ApiMethod::Get, USER_ME_PATH, None, Some(&token));
            if response.ok {
                if let Some(prefs) = response
                    .data
                    .as_ref()
                    .and_then(|data| data.get("user"))
                    .and_then(|user| user.get("preferences"))
                {
                    if let Some(value) = prefs
                        .get(crate::boundary::SESSION_THRESHOLD_PREF)
                        .and_then(Value::as_i64)
                    {
                        threshold = value;
                    }
                    disable_git = prefs
                        .get(DISABLE_GIT_PREF)
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                }
            }
        }

        let _ = self
            .kv
            .set(crate::boundary::SESSION_THRESHOLD_PREF, json!(threshold));
        let _ = self.kv.set(DISABLE_GIT_PREF, json!(disable_git));
    }
}
