//! NextPVR session handshake and token lifetime
//!
//! A session is negotiated with `session.initiate` (returns `sid` and `salt`)
//! followed by `session.login` with the salted PIN digest. Tokens are
//! renegotiated once older than the freshness window, or as soon as they are
//! marked stale after a transport failure or an offline report.

use super::signing::login_digest;
use super::{ApiOutcome, NextPvrApi};
use crate::error::{NextPvrError, Result};
use crate::models::BackendDefaults;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Session token and the instant it was obtained
///
/// `obtained_at == None` with a token means the token is stale and must be
/// renegotiated before its next use.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub token: Option<String>,
    pub obtained_at: Option<Instant>,
}

impl Session {
    /// Returns the token when it can be used right now
    pub fn usable_token(&self, freshness: Duration) -> Option<&str> {
        match (&self.token, self.obtained_at) {
            (Some(token), Some(at)) if at.elapsed() < freshness => Some(token),
            _ => None,
        }
    }
}

impl NextPvrApi {
    fn check_configuration(&self) -> Result<()> {
        if self.base_url().trim().is_empty() {
            return Err(NextPvrError::Configuration {
                setting: "web_service_url",
            });
        }
        if self.settings().pin.is_empty() {
            return Err(NextPvrError::Configuration { setting: "pin" });
        }
        Ok(())
    }

    /// Guarantees a fresh session token, running the handshake when needed
    ///
    /// Concurrent callers wait on the same handshake and reuse its token.
    pub async fn ensure_connection(&self, cancel: &CancellationToken) -> Result<String> {
        self.check_configuration()?;
        let freshness = self.settings().session_freshness;

        if let Some(token) = self.session.read().await.usable_token(freshness) {
            return Ok(token.to_string());
        }

        let _gate = tokio::select! {
            _ = cancel.cancelled() => return Err(NextPvrError::Cancelled),
            gate = self.handshake_gate.lock() => gate,
        };

        // Another caller may have logged in while we were waiting
        if let Some(token) = self.session.read().await.usable_token(freshness) {
            return Ok(token.to_string());
        }

        self.handshake(cancel).await
    }

    async fn handshake(&self, cancel: &CancellationToken) -> Result<String> {
        info!(url = %self.base_url(), "Opening NextPVR session");

        let initiate = self
            .call(
                "session.initiate",
                &[
                    ("ver", "1.0".to_string()),
                    ("device", self.settings().device_name.clone()),
                ],
                cancel,
            )
            .await?;

        let (sid, salt) = match initiate {
            ApiOutcome::Ok(json) => {
                let sid = json.get("sid").and_then(Value::as_str).filter(|s| !s.is_empty());
                let salt = json.get("salt").and_then(Value::as_str);
                match (sid, salt) {
                    (Some(sid), Some(salt)) => (sid.to_string(), salt.to_string()),
                    _ => {
                        return Err(NextPvrError::Unauthorized(
                            "session.initiate returned no sid/salt, check NextPVR version".into(),
                        ))
                    }
                }
            }
            ApiOutcome::BackendError(reason) => return Err(NextPvrError::Unauthorized(reason)),
        };

        let digest = login_digest(&self.settings().pin, &salt);
        let login = self
            .call("session.login", &[("md5", digest), ("sid", sid.clone())], cancel)
            .await?;

        match login {
            ApiOutcome::Ok(json) if super::is_ok(&json) => {}
            ApiOutcome::Ok(_) => {
                warn!("NextPVR rejected the configured PIN");
                return Err(NextPvrError::Unauthorized(
                    "PIN rejected by NextPVR, check the pin setting".into(),
                ));
            }
            ApiOutcome::BackendError(reason) => {
                warn!("NextPVR login failed: {}", reason);
                return Err(NextPvrError::Unauthorized(reason));
            }
        }

        {
            let mut session = self.session.write().await;
            session.token = Some(sid.clone());
            session.obtained_at = Some(Instant::now());
        }
        info!("NextPVR session established");

        match self.load_backend_defaults(&sid, cancel).await {
            Ok(defaults) => {
                debug!(?defaults, "NextPVR defaults loaded");
                *self.defaults.write().await = Some(defaults);
            }
            Err(err) => warn!("Could not load NextPVR defaults: {}", err),
        }

        Ok(sid)
    }

    /// True once a session token has been obtained, even if it is stale
    pub async fn is_active(&self) -> bool {
        self.session.read().await.token.is_some()
    }

    /// Forces a handshake before the next authenticated call
    pub async fn mark_stale(&self) {
        let mut session = self.session.write().await;
        if session.obtained_at.take().is_some() {
            debug!("NextPVR session marked stale");
        }
    }

    /// Extends the freshness window after a successful keep-alive check
    ///
    /// A stale session stays stale.
    pub async fn renew(&self) {
        let mut session = self.session.write().await;
        if session.token.is_some() && session.obtained_at.is_some() {
            session.obtained_at = Some(Instant::now());
        }
    }

    /// Defaults fetched during the last successful handshake
    pub async fn backend_defaults(&self) -> Option<BackendDefaults> {
        self.defaults.read().await.clone()
    }

    /// Whether the backend supplies program artwork itself
    pub async fn artwork_from_backend(&self) -> bool {
        self.defaults
            .read()
            .await
            .as_ref()
            .is_some_and(|d| d.artwork_from_backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_token_expires_after_freshness_window() {
        let freshness = Duration::from_secs(300);
        let session = Session {
            token: Some("sid".into()),
            obtained_at: Some(Instant::now()),
        };
        assert_eq!(session.usable_token(freshness), Some("sid"));

        tokio::time::advance(Duration::from_secs(301)).await;
        assert_eq!(session.usable_token(freshness), None);
    }

    #[test]
    fn test_stale_or_missing_token_is_unusable() {
        let freshness = Duration::from_secs(300);
        assert_eq!(Session::default().usable_token(freshness), None);
        let stale = Session {
            token: Some("sid".into()),
            obtained_at: None,
        };
        assert_eq!(stale.usable_token(freshness), None);
    }

    #[tokio::test]
    async fn test_missing_settings_fail_fast() {
        let api = NextPvrApi::new(crate::NextPvrSettings {
            pin: String::new(),
            ..Default::default()
        })
        .unwrap();
        let err = api
            .ensure_connection(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, NextPvrError::Configuration { setting: "pin" }));

        let api = NextPvrApi::new(crate::NextPvrSettings {
            web_service_url: String::new(),
            ..Default::default()
        })
        .unwrap();
        let err = api
            .ensure_connection(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NextPvrError::Configuration {
                setting: "web_service_url"
            }
        ));
    }

    #[tokio::test]
    async fn test_mark_stale_and_renew() {
        let api = NextPvrApi::new(crate::NextPvrSettings::default()).unwrap();
        assert!(!api.is_active().await);

        {
            let mut session = api.session.write().await;
            session.token = Some("abc".into());
            session.obtained_at = Some(Instant::now());
        }
        assert!(api.is_active().await);

        api.mark_stale().await;
        api.renew().await;
        let session = api.session.read().await;
        assert!(session.obtained_at.is_none());
        assert_eq!(session.token.as_deref(), Some("abc"));
    }
}
