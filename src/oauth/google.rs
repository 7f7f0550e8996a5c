use anyhow::Context;
use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use tracing::debug;
use url::Url;

use super::{ExternalProfile, OAuthProvider, ProviderToken};
use crate::config::GoogleConfig;

const SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
];

/// oauth2 client with the authorization and token endpoints set.
type ConfiguredClient = oauth2::Client<
    oauth2::basic::BasicErrorResponse,
    oauth2::basic::BasicTokenResponse,
    oauth2::basic::BasicTokenIntrospectionResponse,
    oauth2::StandardRevocableToken,
    oauth2::basic::BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

pub struct GoogleOAuth {
    client: ConfiguredClient,
    http: reqwest::Client,
    userinfo_url: Url,
}

impl GoogleOAuth {
    pub fn new(config: &GoogleConfig) -> anyhow::Result<Self> {
        let client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.clone()))
            .set_auth_uri(AuthUrl::new(config.auth_url.clone()).context("GOOGLE_AUTH_URL")?)
            .set_token_uri(TokenUrl::new(config.token_url.clone()).context("GOOGLE_TOKEN_URL")?)
            .set_redirect_uri(
                RedirectUrl::new(config.redirect_url.clone()).context("GOOGLE_REDIRECT_URL")?,
            );

        // Following redirects on the token endpoint opens SSRF holes.
        let http = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("build OAuth http client")?;

        let userinfo_url = Url::parse(&config.userinfo_url).context("GOOGLE_USERINFO_URL")?;

        Ok(Self {
            client,
            http,
            userinfo_url,
        })
    }
}

#[async_trait]
impl OAuthProvider for GoogleOAuth {
    fn authorization_url(&self, state: &str, pkce_verifier: &str) -> Url {
        let verifier = PkceCodeVerifier::new(pkce_verifier.to_string());
        let challenge = PkceCodeChallenge::from_code_verifier_sha256(&verifier);
        let state = state.to_string();

        let (url, _) = self
            .client
            .authorize_url(move || CsrfToken::new(state))
            .add_scopes(SCOPES.iter().map(|s| Scope::new(s.to_string())))
            .add_extra_param("access_type", "offline")
            .set_pkce_challenge(challenge)
            .url();
        url
    }

    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: &str,
    ) -> anyhow::Result<ProviderToken> {
        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| anyhow::anyhow!("token exchange: {e}"))?;
        debug!("google code exchanged");
        Ok(ProviderToken::new(token.access_token().secret().clone()))
    }

    async fn fetch_profile(&self, token: &ProviderToken) -> anyhow::Result<ExternalProfile> {
        let profile = self
            .http
            .get(self.userinfo_url.clone())
            .bearer_auth(token.secret())
            .send()
            .await
            .context("userinfo request")?
            .error_for_status()
            .context("userinfo status")?
            .json::<ExternalProfile>()
            .await
            .context("decode userinfo body")?;
        debug!(provider_id = %profile.id, "google profile fetched");
        Ok(profile)
    }
}
