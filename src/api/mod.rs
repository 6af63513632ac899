pub mod auth;
pub mod catalog;
pub mod client;
pub mod pkce;

/// Source of bearer tokens for the catalog client.
/// Implementations: auth::AuthManager in production, client::StaticTokenSource in tests.
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    /// A currently valid access token, or None when not authenticated.
    /// Fetched immediately before every request, never cached by callers.
    async fn valid_token(&self) -> Option<String>;
}
