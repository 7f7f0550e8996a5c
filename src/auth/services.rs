use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};
use url::Url;

use crate::{
    auth::{
        claims::Claims,
        dto::{AuthResponse, LoginRequest, SignupRequest},
        password,
    },
    error::AuthError,
    oauth::PendingLogin,
    state::AppState,
    users::{InsertOutcome, Role, User},
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Creates a local account and returns a session token for it.
pub async fn signup(state: &AppState, req: SignupRequest) -> Result<AuthResponse, AuthError> {
    let email = req.email.trim().to_string();
    if !is_valid_email(&email) {
        return Err(AuthError::Validation("Invalid email".into()));
    }
    let role: Role = req
        .role
        .parse()
        .map_err(|_| AuthError::Validation("Role must be 'teacher' or 'student'".into()))?;
    if req.password != req.confirm_password {
        return Err(AuthError::Validation("Passwords do not match".into()));
    }

    if state
        .users
        .find_by_email(&email)
        .await
        .map_err(AuthError::Storage)?
        .is_some()
    {
        warn!(email = %email, "signup for existing email");
        return Err(AuthError::Conflict("Email already in use".into()));
    }

    let hash = password::hash(&req.password)?;
    let user = User::local(req.full_name.trim().to_string(), email, role, hash);

    match state.users.insert(&user).await.map_err(AuthError::Storage)? {
        InsertOutcome::Created => {}
        InsertOutcome::AlreadyExists => {
            warn!(email = %user.email, "lost signup race for email");
            return Err(AuthError::Conflict("Email already in use".into()));
        }
    }

    let token = state.tokens.issue(&user.email, user.role.as_str())?;
    info!(user_id = %user.id, email = %user.email, role = %user.role, "user signed up");
    Ok(AuthResponse { token, user })
}

/// Password login for accounts created through signup.
pub async fn login(state: &AppState, req: LoginRequest) -> Result<AuthResponse, AuthError> {
    let email = req.email.trim();
    let user = state
        .users
        .find_by_email(email)
        .await
        .map_err(AuthError::Storage)?
        .ok_or(AuthError::InvalidCredentials)?;

    // OAuth-created accounts have no password to check against.
    let Some(stored) = user.password_hash.as_deref() else {
        warn!(email = %email, "password login for OAuth-only account");
        return Err(AuthError::InvalidCredentials);
    };
    if !password::verify(&req.password, stored)? {
        warn!(email = %email, "login invalid password");
        return Err(AuthError::InvalidCredentials);
    }

    let token = state.tokens.issue(&user.email, user.role.as_str())?;
    info!(user_id = %user.id, email = %user.email, "user logged in");
    Ok(AuthResponse { token, user })
}

/// Starts a provider login: records a pending login and returns the URL to
/// redirect the browser to.
pub async fn begin_provider_login(state: &AppState) -> Result<Url, AuthError> {
    let pending = PendingLogin::generate();
    state
        .login_states
        .save(&pending)
        .await
        .map_err(AuthError::Storage)?;
    Ok(state
        .oauth
        .authorization_url(&pending.state, &pending.pkce_verifier))
}

/// Completes a provider login and returns the frontend URL carrying the
/// session token.
pub async fn complete_provider_login(
    state: &AppState,
    code: &str,
    csrf_state: &str,
) -> Result<Url, AuthError> {
    let verifier = state
        .login_states
        .take(csrf_state)
        .await
        .map_err(AuthError::Storage)?
        .ok_or(AuthError::InvalidOAuthState)?;

    let token = state
        .oauth
        .exchange_code(code, &verifier)
        .await
        .map_err(|e| {
            warn!(error = %e, "oauth exchange failed");
            AuthError::OAuthExchange(e.to_string())
        })?;

    let profile = state.oauth.fetch_profile(&token).await.map_err(|e| {
        warn!(error = %e, "oauth profile fetch failed");
        AuthError::ProfileFetch(e.to_string())
    })?;

    let existing = match state.users.find_by_email(&profile.email).await {
        Ok(found) => found,
        Err(e) => {
            warn!(error = %e, email = %profile.email, "lookup failed, trying insert");
            None
        }
    };

    let role = match existing {
        Some(user) => user.role,
        None => {
            let user = User::from_profile(&profile);
            match state.users.insert(&user).await.map_err(AuthError::Storage)? {
                InsertOutcome::Created => {
                    info!(user_id = %user.id, email = %user.email, "user created from oauth profile");
                    user.role
                }
                InsertOutcome::AlreadyExists => stored_role_or_student(state, &profile.email).await,
            }
        }
    };

    let session = state.tokens.issue(&profile.email, role.as_str())?;
    let mut target = Url::parse(&state.config.frontend_url)
        .map_err(|e| AuthError::Internal(format!("frontend url: {e}")))?;
    target.query_pairs_mut().append_pair("token", &session);
    Ok(target)
}

async fn stored_role_or_student(state: &AppState, email: &str) -> Role {
    match state.users.find_by_email(email).await {
        Ok(Some(user)) => user.role,
        _ => Role::Student,
    }
}

/// Resolves a verified token to its stored user.
pub async fn current_user(state: &AppState, claims: &Claims) -> Result<User, AuthError> {
    state
        .users
        .find_by_email(&claims.email)
        .await
        .map_err(AuthError::Storage)?
        .ok_or(AuthError::UserNotFound)
}
