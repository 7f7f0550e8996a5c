use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use crate::{auth::claims::Claims, config::JwtConfig, error::AuthError, state::AppState};

/// Signs and verifies session tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            ttl: Duration::seconds(config.ttl_hours.saturating_mul(3600)),
        }
    }

    pub fn issue(&self, email: &str, role: &str) -> Result<String, AuthError> {
        self.issue_at(email, role, OffsetDateTime::now_utc())
    }

    pub fn issue_at(
        &self,
        email: &str,
        role: &str,
        issued_at: OffsetDateTime,
    ) -> Result<String, AuthError> {
        let exp = issued_at
            .checked_add(self.ttl)
            .ok_or_else(|| AuthError::Internal("token expiry out of range".into()))?;
        let claims = Claims {
            email: email.to_string(),
            role: role.to_string(),
            iat: issued_at.unix_timestamp().max(0) as usize,
            exp: exp.unix_timestamp().max(0) as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(email = %email, role = %role, "session token signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken,
            }
        })?;
        Ok(data.claims)
    }
}

impl FromRef<AppState> for TokenIssuer {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}

/// Verified claims of the request's bearer token.
pub struct AuthUser(pub Claims);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    TokenIssuer: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let issuer = TokenIssuer::from_ref(state);
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer ").or_else(|| h.strip_prefix("bearer ")))
            .ok_or(AuthError::MissingToken)?;

        let claims = issuer.verify(token).map_err(|e| {
            warn!(error = %e, "rejected bearer token");
            e
        })?;
        Ok(AuthUser(claims))
    }
}
