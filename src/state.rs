use std::sync::Arc;

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::info;

use crate::auth::TokenIssuer;
use crate::config::AppConfig;
use crate::oauth::{GoogleOAuth, LoginStateStore, OAuthProvider, PgLoginStateStore};
use crate::users::{PgUserStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub tokens: TokenIssuer,
    pub users: Arc<dyn UserStore>,
    pub login_states: Arc<dyn LoginStateStore>,
    pub oauth: Arc<dyn OAuthProvider>,
}

impl AppState {
    /// Connects to the database (failing fast when it is unreachable), runs
    /// migrations and builds the OAuth client.
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let db = connect(&config).await?;

        sqlx::migrate!("./migrations")
            .run(&db)
            .await
            .context("run database migrations")?;

        let oauth = GoogleOAuth::new(&config.google).context("configure Google OAuth")?;

        Ok(Self::from_parts(
            Arc::new(config),
            Arc::new(PgUserStore::new(db.clone())),
            Arc::new(PgLoginStateStore::new(db)),
            Arc::new(oauth),
        ))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        login_states: Arc<dyn LoginStateStore>,
        oauth: Arc<dyn OAuthProvider>,
    ) -> Self {
        Self {
            tokens: TokenIssuer::new(&config.jwt),
            config,
            users,
            login_states,
            oauth,
        }
    }
}

async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    let db = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.connect_timeout())
        .connect(&config.database.url)
        .await
        .context("connect to database")?;

    sqlx::query("SELECT 1")
        .execute(&db)
        .await
        .context("ping database")?;
    info!("database connected");
    Ok(db)
}
