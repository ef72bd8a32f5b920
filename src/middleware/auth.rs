use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::auth::{authenticate, AuthError};
use crate::response::AppError;
use crate::state::AppState;

pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    match authenticate(req.headers(), state.config().jwt_secret.as_deref()) {
        Ok(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Err(AuthError::MissingToken) => {
            AppError::unauthorized("You are not authorized").into_response()
        }
        Err(AuthError::MissingSecret) => {
            tracing::warn!("JWT_SECRET is not configured, rejecting authenticated request");
            AppError::unauthorized("You are not authorized").into_response()
        }
        Err(err) => {
            tracing::debug!(error = %err, "token verification failed");
            AppError::unauthorized("You are not authorized").into_response()
        }
    }
}
