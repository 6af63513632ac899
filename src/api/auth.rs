use super::pkce;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::{Credential, PendingAuthorization};
use crate::store::{CredentialStore, KvStore, SessionStore};
use chrono::Utc;
use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

/// Token endpoint reply. The relay forwards the authorization server's JSON
/// unchanged, so error detail may arrive in either field.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Owns the authorization-code-with-PKCE flow: start, callback exchange,
/// refresh, logout. Every credential write in the crate happens here; other
/// components only read through `valid_token()`.
pub struct AuthManager {
    http: Client,
    client_id: String,
    redirect_uri: String,
    scopes: Vec<String>,
    authorize_url: String,
    token_url: String,
    creds: CredentialStore,
    session: SessionStore,
    // serializes the check-then-refresh step so concurrent callers cannot
    // trigger two refreshes
    refresh_gate: tokio::sync::Mutex<()>,
}

impl AuthManager {
    pub fn new(cfg: &Config, store: Arc<dyn KvStore>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;
        let token_url = if cfg.token_url.trim().is_empty() {
            format!("{}/api/token", cfg.auth_base)
        } else {
            cfg.token_url.clone()
        };
        Ok(Self {
            http,
            client_id: cfg.client_id.clone(),
            redirect_uri: cfg.redirect_uri.clone(),
            scopes: cfg.scopes.clone(),
            authorize_url: format!("{}/authorize", cfg.auth_base),
            token_url,
            creds: CredentialStore::new(store.clone()),
            session: SessionStore::new(store),
            refresh_gate: tokio::sync::Mutex::new(()),
        })
    }

    /// Start a new authorization attempt: store a fresh verifier and state
    /// nonce, then hand back the URL the user must open in a browser.
    pub async fn begin_authorization(&self) -> Result<Url> {
        let verifier = pkce::generate_code_verifier();
        let state = pkce::generate_state_nonce();
        let challenge = pkce::code_challenge_s256(&verifier);
        self.save_pending(PendingAuthorization {
            code_verifier: verifier,
            state: state.clone(),
        })
        .await?;

        let mut url = Url::parse(&self.authorize_url)
            .map_err(|e| Error::InvalidInput(format!("bad authorize url: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("code_challenge_method", "S256")
            .append_pair("code_challenge", &challenge)
            .append_pair("state", &state);
        debug!("authorization attempt started (state {})", state);
        Ok(url)
    }

    /// Finish the flow with the `code` and `state` from the callback URL.
    /// The state check runs first and fails closed; the pending entry is
    /// consumed only on a successful exchange.
    pub async fn complete_authorization(
        &self,
        code: &str,
        returned_state: &str,
    ) -> Result<Credential> {
        match self.pending_state().await? {
            Some(stored) if stored == returned_state => {}
            _ => return Err(Error::StateMismatch),
        }
        let verifier = self
            .pending_verifier()
            .await?
            .ok_or(Error::MissingVerifier)?;

        let params = [
            ("client_id", self.client_id.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("code_verifier", verifier.as_str()),
        ];
        let resp = self.http.post(&self.token_url).form(&params).send().await?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        let parsed: Option<TokenResponse> = serde_json::from_str(&text).ok();

        if !status.is_success() {
            let detail = parsed
                .as_ref()
                .and_then(|t| t.error_description.clone().or_else(|| t.error.clone()))
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(Error::ExchangeFailed(detail));
        }
        let token = parsed
            .ok_or_else(|| Error::ExchangeFailed("unreadable token response".to_string()))?;
        let access_token = token
            .access_token
            .ok_or_else(|| Error::ExchangeFailed("no access_token in response".to_string()))?;

        let cred = Credential {
            access_token,
            refresh_token: token.refresh_token,
            expires_at_ms: Utc::now().timestamp_millis() + token.expires_in.unwrap_or(3600) * 1000,
        };
        self.save_credential(cred.clone()).await?;
        self.clear_pending().await?;
        info!("authorization complete, credential stored");
        Ok(cred)
    }

    /// Current access token, refreshing once if expired. Returns None when
    /// not authenticated. A failed refresh clears the stored credential so a
    /// stale token is never retried.
    pub async fn valid_token(&self) -> Option<String> {
        let _gate = self.refresh_gate.lock().await;
        let cred = match self.load_credential().await {
            Ok(Some(c)) => c,
            Ok(None) => return None,
            Err(e) => {
                warn!("could not load stored credential: {}", e);
                if let Err(e) = self.clear_credential().await {
                    warn!("could not clear credential store: {}", e);
                }
                return None;
            }
        };
        if !cred.is_expired(Utc::now().timestamp_millis()) {
            return Some(cred.access_token);
        }
        debug!("access token expired, attempting refresh");
        match self.refresh(&cred).await {
            Ok(new_cred) => Some(new_cred.access_token),
            Err(e) => {
                warn!("token refresh failed, dropping credentials: {}", e);
                if let Err(e) = self.clear_credential().await {
                    warn!("could not clear credential store: {}", e);
                }
                None
            }
        }
    }

    /// Drop the stored credential and any pending authorization. Idempotent.
    pub async fn logout(&self) -> Result<()> {
        self.clear_credential().await?;
        self.clear_pending().await?;
        info!("logged out, stored credentials cleared");
        Ok(())
    }

    /// Raw stored credential, for status displays. May be expired.
    pub async fn credential(&self) -> Result<Option<Credential>> {
        self.load_credential().await
    }

    async fn refresh(&self, cur: &Credential) -> Result<Credential> {
        let refresh_token = cur.refresh_token.clone().ok_or(Error::AuthExpired)?;
        let params = [
            ("client_id", self.client_id.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.as_str()),
        ];
        let resp = self.http.post(&self.token_url).form(&params).send().await?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        let parsed: Option<TokenResponse> = serde_json::from_str(&text).ok();

        if !status.is_success() {
            let detail = parsed
                .as_ref()
                .and_then(|t| t.error_description.clone().or_else(|| t.error.clone()))
                .unwrap_or_else(|| format!("status {}", status));
            return Err(Error::ExchangeFailed(detail));
        }
        let token = parsed
            .ok_or_else(|| Error::InvalidResponse("unreadable token response".to_string()))?;
        let access_token = token
            .access_token
            .ok_or_else(|| Error::InvalidResponse("no access_token in refresh response".to_string()))?;

        let cred = Credential {
            access_token,
            // the authorization server may rotate the refresh token; keep
            // the old one when the response omits it
            refresh_token: token.refresh_token.or(Some(refresh_token)),
            expires_at_ms: Utc::now().timestamp_millis() + token.expires_in.unwrap_or(3600) * 1000,
        };
        self.save_credential(cred.clone()).await?;
        debug!("token refreshed, new expiry at {}", cred.expires_at_ms);
        Ok(cred)
    }

    // Store access goes through spawn_blocking: the SQLite impl does file IO.

    async fn load_credential(&self) -> Result<Option<Credential>> {
        let store = self.creds.clone();
        tokio::task::spawn_blocking(move || store.load()).await?
    }

    async fn save_credential(&self, cred: Credential) -> Result<()> {
        let store = self.creds.clone();
        tokio::task::spawn_blocking(move || store.save(&cred)).await?
    }

    async fn clear_credential(&self) -> Result<()> {
        let store = self.creds.clone();
        tokio::task::spawn_blocking(move || store.clear()).await?
    }

    async fn save_pending(&self, pending: PendingAuthorization) -> Result<()> {
        let store = self.session.clone();
        tokio::task::spawn_blocking(move || store.save_pending(&pending)).await?
    }

    async fn pending_state(&self) -> Result<Option<String>> {
        let store = self.session.clone();
        tokio::task::spawn_blocking(move || store.stored_state()).await?
    }

    async fn pending_verifier(&self) -> Result<Option<String>> {
        let store = self.session.clone();
        tokio::task::spawn_blocking(move || store.stored_verifier()).await?
    }

    async fn clear_pending(&self) -> Result<()> {
        let store = self.session.clone();
        tokio::task::spawn_blocking(move || store.clear_pending()).await?
    }
}

#[async_trait::async_trait]
impl super::TokenSource for AuthManager {
    async fn valid_token(&self) -> Option<String> {
        AuthManager::valid_token(self).await
    }
}
