//! OAuth2 authorization-code flow against an external identity provider.
//!
//! [`OAuthProvider`] is the seam the login controller talks to; [`GoogleOAuth`]
//! is the production implementation. Pending logins (CSRF state and PKCE
//! verifier) live in a [`LoginStateStore`] between the redirect and the
//! callback.

mod google;
mod state;

use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

pub use google::GoogleOAuth;
pub use state::{LoginStateStore, PendingLogin, PgLoginStateStore};
#[cfg(test)]
pub use state::MemoryLoginStateStore;

/// Profile returned by the provider's userinfo endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ExternalProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub picture: Option<String>,
}

/// Provider access token. Never logged.
#[derive(Clone)]
pub struct ProviderToken(String);

impl ProviderToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ProviderToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProviderToken([redacted])")
    }
}

#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Provider URL the browser is redirected to. Requests offline access and
    /// the email/profile scopes, bound to `state` and an S256 PKCE challenge
    /// derived from `pkce_verifier`.
    fn authorization_url(&self, state: &str, pkce_verifier: &str) -> Url;

    async fn exchange_code(&self, code: &str, pkce_verifier: &str)
        -> anyhow::Result<ProviderToken>;

    async fn fetch_profile(&self, token: &ProviderToken) -> anyhow::Result<ExternalProfile>;
}
