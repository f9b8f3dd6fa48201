//! Login, signup and logout on top of `AuthService` and `SessionContext`.

use thiserror::Error;

use crate::client::{AuthResponse, AuthService, ServiceError};
use crate::models::SessionState;
use crate::pipeline::ValidationError;
use crate::session::{SessionContext, SessionError};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

fn require<'a>(value: &'a str, field: &'static str) -> Result<&'a str, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ValidationError::MissingCredentials(field))
    } else {
        Ok(trimmed)
    }
}

/// Authenticate and persist the returned user.
pub async fn login(
    service: &dyn AuthService,
    session: &SessionContext,
    email: &str,
    password: &str,
) -> Result<SessionState, AuthError> {
    let email = require(email, "email")?;
    if password.is_empty() {
        return Err(ValidationError::MissingCredentials("password").into());
    }

    let response = service.login(email, password).await.map_err(|e| {
        tracing::warn!(error = %e, "Login failed");
        e
    })?;
    adopt(session, response)
}

/// Create an account and sign in as it.
pub async fn signup(
    service: &dyn AuthService,
    session: &SessionContext,
    username: &str,
    email: &str,
    password: &str,
) -> Result<SessionState, AuthError> {
    let username = require(username, "username")?;
    let email = require(email, "email")?;
    if password.is_empty() {
        return Err(ValidationError::MissingCredentials("password").into());
    }

    let response = service
        .signup(username, email, password)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Signup failed");
            e
        })?;
    adopt(session, response)
}

pub fn logout(session: &SessionContext) -> Result<(), AuthError> {
    session.logout()?;
    tracing::info!("Signed out");
    Ok(())
}

fn adopt(session: &SessionContext, response: AuthResponse) -> Result<SessionState, AuthError> {
    let user = response.user;
    session.sign_in(user.clone(), response.token)?;
    tracing::info!(user_id = %user.id, "Signed in");
    Ok(user)
}
