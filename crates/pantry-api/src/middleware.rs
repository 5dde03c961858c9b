use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};

use pantry_types::api::Claims;

use crate::auth::AppState;
use crate::error::ApiError;

/// Extract and validate the session token from the Authorization
/// header, injecting the claims as a request extension.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(ApiError::Unauthorized)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized)?;

    req.extensions_mut().insert(token_data.claims);
    Ok(next.run(req).await)
}

/// Staff-only actions are enforced here, not by hiding buttons: the
/// server cannot assume a well-behaved client.
pub fn ensure_staff(claims: &Claims) -> Result<(), ApiError> {
    if claims.role.is_staff() {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pantry_types::models::Role;

    fn claims(role: Role) -> Claims {
        Claims {
            sub: "EMP001".into(),
            name: "P".into(),
            role,
            exp: 0,
        }
    }

    #[test]
    fn staff_and_admin_pass() {
        assert!(ensure_staff(&claims(Role::Staff)).is_ok());
        assert!(ensure_staff(&claims(Role::Admin)).is_ok());
    }

    #[test]
    fn regular_employees_are_rejected() {
        assert!(ensure_staff(&claims(Role::User)).is_err());
    }
}
