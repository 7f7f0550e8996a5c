#[cfg(test)]
use std::collections::HashMap;

use anyhow::Context;
use async_trait::async_trait;
use oauth2::{CsrfToken, PkceCodeChallenge};
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
#[cfg(test)]
use tokio::sync::Mutex;

/// How long a login may sit between redirect and callback.
pub const PENDING_LOGIN_TTL: Duration = Duration::minutes(10);

/// A login started at the provider and not yet completed.
#[derive(Debug, Clone)]
pub struct PendingLogin {
    pub state: String,
    pub pkce_verifier: String,
    pub expires_at: OffsetDateTime,
}

impl PendingLogin {
    /// Fresh random CSRF state and PKCE verifier.
    pub fn generate() -> Self {
        Self::generate_at(OffsetDateTime::now_utc())
    }

    pub fn generate_at(now: OffsetDateTime) -> Self {
        let (_, verifier) = PkceCodeChallenge::new_random_sha256();
        Self {
            state: CsrfToken::new_random().secret().clone(),
            pkce_verifier: verifier.secret().clone(),
            expires_at: now + PENDING_LOGIN_TTL,
        }
    }
}

/// Single-use storage of pending logins.
#[async_trait]
pub trait LoginStateStore: Send + Sync {
    async fn save(&self, pending: &PendingLogin) -> anyhow::Result<()>;

    /// Removes the entry for `state` and returns its PKCE verifier if it had
    /// not expired. A second call for the same state returns `None`.
    async fn take(&self, state: &str) -> anyhow::Result<Option<String>>;
}

#[derive(Clone)]
pub struct PgLoginStateStore {
    db: PgPool,
}

impl PgLoginStateStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LoginStateStore for PgLoginStateStore {
    async fn save(&self, pending: &PendingLogin) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM oauth_states WHERE expires_at <= NOW()")
            .execute(&self.db)
            .await
            .context("purge expired oauth states")?;

        sqlx::query(
            r#"
            INSERT INTO oauth_states (state, pkce_verifier, expires_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(&pending.state)
        .bind(&pending.pkce_verifier)
        .bind(pending.expires_at)
        .execute(&self.db)
        .await
        .context("insert oauth state")?;
        Ok(())
    }

    async fn take(&self, state: &str) -> anyhow::Result<Option<String>> {
        let verifier = sqlx::query_scalar::<_, String>(
            r#"
            DELETE FROM oauth_states
            WHERE state = $1 AND expires_at > NOW()
            RETURNING pkce_verifier
            "#,
        )
        .bind(state)
        .fetch_optional(&self.db)
        .await
        .context("consume oauth state")?;
        Ok(verifier)
    }
}

#[cfg(test)]
#[derive(Default)]
pub struct MemoryLoginStateStore {
    pending: Mutex<HashMap<String, PendingLogin>>,
}

#[cfg(test)]
impl MemoryLoginStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
#[async_trait]
impl LoginStateStore for MemoryLoginStateStore {
    async fn save(&self, pending: &PendingLogin) -> anyhow::Result<()> {
        let now = OffsetDateTime::now_utc();
        let mut map = self.pending.lock().await;
        map.retain(|_, p| p.expires_at > now);
        map.insert(pending.state.clone(), pending.clone());
        Ok(())
    }

    async fn take(&self, state: &str) -> anyhow::Result<Option<String>> {
        let now = OffsetDateTime::now_utc();
        let entry = self.pending.lock().await.remove(state);
        Ok(entry
            .filter(|p| p.expires_at > now)
            .map(|p| p.pkce_verifier))
    }
}
