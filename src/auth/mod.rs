use crate::state::AppState;
use axum::Router;

mod claims;
mod dto;
pub mod handlers;
mod jwt;
mod password;
pub mod services;

pub use claims::Claims;
pub use dto::{AuthResponse, LoginRequest, SignupRequest};
pub use jwt::{AuthUser, TokenIssuer};

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::me_routes())
}
