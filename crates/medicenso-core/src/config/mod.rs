//! Runtime configuration for the sync engine and the remote store.
//!
//! `RemoteConfig` only carries safe-to-ship public endpoints and keys plus
//! the caller's session token. Nothing here is persisted by the core.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::remote::{RemoteError, RemoteResult};
use crate::util::{is_http_url, normalize_text_option};

const DEFAULT_SYNC_INTERVAL_SECS: u64 = 5;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

pub const SUPABASE_URL_ENV: &str = "SUPABASE_URL";
pub const SUPABASE_ANON_KEY_ENV: &str = "SUPABASE_ANON_KEY";
pub const ACCESS_TOKEN_ENV: &str = "MEDICENSO_ACCESS_TOKEN";

/// Timing of background sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Period of the background drain while the queue is non-empty
    pub interval: Duration,
    /// Per-request timeout for remote calls; a timeout counts as a failure
    pub request_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Connection settings for the Supabase-hosted remote store.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    pub supabase_url: String,
    pub anon_key: String,
    /// Session token of the signed-in user; the anon key is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl std::fmt::Debug for RemoteConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RemoteConfig")
            .field("supabase_url", &self.supabase_url)
            .field("anon_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl RemoteConfig {
    /// Build a validated config.
    pub fn new(
        supabase_url: impl Into<String>,
        anon_key: impl Into<String>,
        access_token: Option<String>,
    ) -> RemoteResult<Self> {
        Self {
            supabase_url: supabase_url.into(),
            anon_key: anon_key.into(),
            access_token,
        }
        .normalized()
    }

    /// Read `SUPABASE_URL`, `SUPABASE_ANON_KEY` and `MEDICENSO_ACCESS_TOKEN`.
    ///
    /// Returns `Ok(None)` when neither the URL nor the key is set.
    pub fn from_env() -> RemoteResult<Option<Self>> {
        let supabase_url = normalize_text_option(std::env::var(SUPABASE_URL_ENV).ok());
        let anon_key = normalize_text_option(std::env::var(SUPABASE_ANON_KEY_ENV).ok());
        let access_token = normalize_text_option(std::env::var(ACCESS_TOKEN_ENV).ok());

        match (supabase_url, anon_key) {
            (None, None) => Ok(None),
            (Some(url), Some(key)) => Self::new(url, key, access_token).map(Some),
            (None, Some(_)) => Err(RemoteError::InvalidConfiguration(format!(
                "{SUPABASE_ANON_KEY_ENV} is set but {SUPABASE_URL_ENV} is missing"
            ))),
            (Some(_), None) => Err(RemoteError::InvalidConfiguration(format!(
                "{SUPABASE_URL_ENV} is set but {SUPABASE_ANON_KEY_ENV} is missing"
            ))),
        }
    }

    /// Trim values, require an http(s) URL and strip its trailing slash.
    pub fn normalized(self) -> RemoteResult<Self> {
        let supabase_url = normalize_text_option(Some(self.supabase_url)).ok_or_else(|| {
            RemoteError::InvalidConfiguration("supabase_url must not be empty".to_string())
        })?;
        if !is_http_url(&supabase_url) {
            return Err(RemoteError::InvalidConfiguration(
                "supabase_url must include http:// or https://".to_string(),
            ));
        }
        let anon_key = normalize_text_option(Some(self.anon_key)).ok_or_else(|| {
            RemoteError::InvalidConfiguration("anon_key must not be empty".to_string())
        })?;

        Ok(Self {
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            anon_key,
            access_token: normalize_text_option(self.access_token),
        })
    }

    /// Bearer token sent with every request.
    pub fn bearer_token(&self) -> &str {
        self.access_token.as_deref().unwrap_or(&self.anon_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn default_sync_config_uses_five_second_interval() {
        let config = SyncConfig::default();
        assert_eq!(config.interval, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(15));
    }

    #[test]
    fn new_normalizes_url_and_token() {
        let config = RemoteConfig::new(
            " https://project.supabase.co/ ",
            " anon ",
            Some("  ".to_string()),
        )
        .unwrap();

        assert_eq!(config.supabase_url, "https://project.supabase.co");
        assert_eq!(config.anon_key, "anon");
        assert_eq!(config.access_token, None);
        assert_eq!(config.bearer_token(), "anon");
    }

    #[test]
    fn new_rejects_invalid_values() {
        assert!(RemoteConfig::new("project.supabase.co", "anon", None).is_err());
        assert!(RemoteConfig::new("https://project.supabase.co", " ", None).is_err());
        assert!(RemoteConfig::new("", "anon", None).is_err());
    }

    #[test]
    fn access_token_takes_precedence_for_bearer() {
        let config = RemoteConfig::new(
            "https://project.supabase.co",
            "anon",
            Some("session".to_string()),
        )
        .unwrap();
        assert_eq!(config.bearer_token(), "session");
    }

    #[test]
    fn debug_redacts_keys() {
        let config = RemoteConfig::new(
            "https://project.supabase.co",
            "anon-secret",
            Some("token-secret".to_string()),
        )
        .unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("anon-secret"));
        assert!(!debug.contains("token-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn parse_rejects_unknown_fields() {
        let payload = r#"{"supabase_url": "https://x.supabase.co", "anon_key": "a", "extra": 1}"#;
        let error = serde_json::from_str::<RemoteConfig>(payload).unwrap_err();
        assert!(error.to_string().contains("unknown field"));
    }
}
