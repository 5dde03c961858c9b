use std::sync::Arc;
use std::time::Duration;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use uuid::Uuid;

use pantry_db::Database;
use pantry_gateway::dispatcher::Dispatcher;
use pantry_types::api::{
    Claims, EmployeeLoginRequest, LoginOutcome, RequestStatusResponse, Session, SignInRequest,
    SignUpRequest,
};
use pantry_types::events::{ChangeOp, GatewayEvent, TableName};
use pantry_types::models::{Employee, Role};

use crate::approval;
use crate::blocking;
use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
    /// How long a pending login request waits for staff before the
    /// timer approves it.
    pub auto_approve_after: Duration,
}

const SESSION_TTL_HOURS: i64 = 24;

/// Staff account signup (identity contract `signUp`). Regular employees
/// never need one of these — they go through `login` instead.
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<SignUpRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = validate_email(&req.email)?;
    validate_password(&req.password)?;
    let full_name = validate_name(&req.full_name)?;
    let employee_id = match &req.employee_id {
        Some(raw) => validate_employee_id(raw)?,
        None => format!("EMP{}", &Uuid::new_v4().simple().to_string()[..6].to_uppercase()),
    };

    // Hash with Argon2id before touching the store
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ApiError::Store(anyhow::anyhow!("password hash failed: {}", e)))?
        .to_string();

    let employee = {
        let state = state.clone();
        let employee_id = employee_id.clone();
        blocking(move || {
            if state.db.get_account_by_email(&email)?.is_some() {
                return Ok(Err(ApiError::Conflict("email already registered".into())));
            }
            if state.db.get_account_by_employee(&employee_id)?.is_some() {
                return Ok(Err(ApiError::Conflict(
                    "employee id already has an account".into(),
                )));
            }

            // Link to the existing employee record (and its role) when
            // one exists — this is how the seeded staff identity gets
            // its account — otherwise create a fresh non-staff one.
            let employee = match state.db.get_employee(&employee_id)? {
                Some(row) => row.into_employee()?,
                None => {
                    let id = Uuid::new_v4().to_string();
                    state
                        .db
                        .create_employee(&id, &employee_id, &full_name, Role::User.as_str())?;
                    state
                        .db
                        .get_employee(&employee_id)?
                        .ok_or_else(|| anyhow::anyhow!("employee vanished after insert"))?
                        .into_employee()?
                }
            };

            state.db.create_account(
                &Uuid::new_v4().to_string(),
                &email,
                &password_hash,
                &employee_id,
            )?;
            Ok(Ok(employee))
        })
        .await??
    };

    let session = session_for(&state, &employee)?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// Identity contract `signInWithPassword`.
pub async fn signin(
    State(state): State<AppState>,
    Json(req): Json<SignInRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_string();

    let (account, employee) = {
        let state = state.clone();
        blocking(move || {
            let Some(account) = state.db.get_account_by_email(&email)? else {
                return Ok(None);
            };
            let employee = state
                .db
                .get_employee(&account.employee_id)?
                .ok_or_else(|| anyhow::anyhow!("account without employee: {}", account.employee_id))?
                .into_employee()?;
            Ok(Some((account, employee)))
        })
        .await?
        .ok_or(ApiError::Unauthorized)?
    };

    let parsed_hash = PasswordHash::new(&account.password)
        .map_err(|e| ApiError::Store(anyhow::anyhow!("bad stored hash: {}", e)))?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    let session = session_for(&state, &employee)?;
    Ok(Json(session))
}

/// Employee entry point. Staff are granted a session immediately;
/// everyone else gets a pending login request and a bounded wait.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<EmployeeLoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let employee_id = validate_employee_id(&req.employee_id)?;
    let name = validate_name(&req.name)?;

    let employee = {
        let state = state.clone();
        let employee_id = employee_id.clone();
        blocking(move || {
            match state.db.get_employee(&employee_id)? {
                Some(row) => row.into_employee(),
                None => {
                    // First sight of this employee id: create it, non-staff
                    let id = Uuid::new_v4().to_string();
                    state
                        .db
                        .create_employee(&id, &employee_id, &name, Role::User.as_str())?;
                    state
                        .db
                        .get_employee(&employee_id)?
                        .ok_or_else(|| anyhow::anyhow!("employee vanished after insert"))?
                        .into_employee()
                }
            }
        })
        .await?
    };

    // Staff bypass the approval workflow entirely
    if employee.role.is_staff() {
        let session = session_for(&state, &employee)?;
        return Ok(Json(LoginOutcome::Granted { session }));
    }

    let (request, created) = {
        let state = state.clone();
        let employee_id = employee.employee_id.clone();
        blocking(move || {
            let (row, created) = state
                .db
                .create_login_request(&Uuid::new_v4().to_string(), &employee_id)?;
            Ok((row.into_request()?, created))
        })
        .await?
    };

    let expires_in = approval::remaining_wait(state.auto_approve_after, request.requested_at);

    if created {
        state.dispatcher.broadcast(GatewayEvent::change(
            TableName::LoginRequests,
            ChangeOp::Insert,
            &request,
        ));
        approval::spawn_watcher(state.clone(), request.id, state.auto_approve_after);
    }

    Ok(Json(LoginOutcome::Pending {
        request_id: request.id,
        expires_in_secs: expires_in.as_secs(),
    }))
}

/// Requester poll/exchange: once the request grants a session, the
/// response carries the token.
pub async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let request = {
        let state = state.clone();
        blocking(move || {
            state
                .db
                .get_login_request(&id.to_string())?
                .map(|row| row.into_request())
                .transpose()
        })
        .await?
        .ok_or(ApiError::NotFound("login request"))?
    };

    let session = if request.status.grants_session() {
        let employee = {
            let state = state.clone();
            let employee_id = request.employee_id.clone();
            blocking(move || {
                state
                    .db
                    .get_employee(&employee_id)?
                    .ok_or_else(|| anyhow::anyhow!("request for unknown employee: {}", employee_id))?
                    .into_employee()
            })
            .await?
        };
        Some(session_for(&state, &employee)?)
    } else {
        None
    };

    Ok(Json(RequestStatusResponse { request, session }))
}

/// Identity contract `getCurrentUser`: echo the session claims.
pub async fn me(Extension(claims): Extension<Claims>) -> Json<Claims> {
    Json(claims)
}

pub fn session_for(state: &AppState, employee: &Employee) -> Result<Session, ApiError> {
    let token = create_token(&state.jwt_secret, employee)
        .map_err(|e| ApiError::Store(anyhow::anyhow!("token creation failed: {}", e)))?;
    Ok(Session {
        employee_id: employee.employee_id.clone(),
        name: employee.name.clone(),
        role: employee.role,
        token,
    })
}

fn create_token(secret: &str, employee: &Employee) -> anyhow::Result<String> {
    let claims = Claims {
        sub: employee.employee_id.clone(),
        name: employee.name.clone(),
        role: employee.role,
        exp: (chrono::Utc::now() + chrono::Duration::hours(SESSION_TTL_HOURS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Employee ids are uppercase alphanumerics with dashes/underscores,
/// at most 20 chars. Input is trimmed and uppercased first.
pub fn validate_employee_id(raw: &str) -> Result<String, ApiError> {
    let id = raw.trim().to_uppercase();
    if id.is_empty() || id.len() > 20 {
        return Err(ApiError::Validation(
            "employee id must be 1-20 characters".into(),
        ));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(ApiError::Validation(
            "employee id can only contain letters, numbers, dashes, and underscores".into(),
        ));
    }
    Ok(id)
}

pub fn validate_name(raw: &str) -> Result<String, ApiError> {
    let name = raw.trim().to_string();
    if name.is_empty() || name.len() > 100 {
        return Err(ApiError::Validation("name must be 1-100 characters".into()));
    }
    Ok(name)
}

fn validate_email(raw: &str) -> Result<String, ApiError> {
    let email = raw.trim().to_string();
    let well_formed = email.len() <= 255
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !well_formed {
        return Err(ApiError::Validation("invalid email address".into()));
    }
    Ok(email)
}

fn validate_password(raw: &str) -> Result<(), ApiError> {
    if raw.len() < 6 {
        return Err(ApiError::Validation(
            "password must be at least 6 characters".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn employee_id_is_normalized() {
        assert_eq!(validate_employee_id(" emp001 ").unwrap(), "EMP001");
        assert_eq!(validate_employee_id("a-b_9").unwrap(), "A-B_9");
    }

    #[test]
    fn employee_id_rejects_bad_input() {
        assert!(validate_employee_id("").is_err());
        assert!(validate_employee_id("   ").is_err());
        assert!(validate_employee_id("EMP 01").is_err());
        assert!(validate_employee_id("EMP#01").is_err());
        assert!(validate_employee_id(&"X".repeat(21)).is_err());
    }

    #[test]
    fn name_bounds() {
        assert_eq!(validate_name("  Ada Lovelace ").unwrap(), "Ada Lovelace");
        assert!(validate_name("").is_err());
        assert!(validate_name(&"x".repeat(101)).is_err());
    }

    #[test]
    fn email_shape() {
        assert!(validate_email("staff@example.com").is_ok());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@nodot").is_err());
    }

    #[test]
    fn password_minimum() {
        assert!(validate_password("secret").is_ok());
        assert!(validate_password("short").is_err());
    }
}
