// [apps/control-plane/src/handlers/auth.rs]
/*!
 * APARATO: AUTH HANDLERS (ESTRATO L3-API)
 * RESPONSABILIDAD: REGISTRO Y LOGIN CON SOBRE FIRMADO HS256
 */

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use helios_domain_models::{audit::actions, ActorType, UserStatus};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::errors::ApiError;
use crate::extractors::ValidatedJson;
use crate::security::{hash_password, issue_bearer_token, verify_password};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginPayload {
    pub email: String,
    pub password: String,
}

/// POST /api/auth/register
#[instrument(skip(application_state, payload), fields(email = %payload.email))]
pub async fn handle_register(
    State(application_state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<RegisterPayload>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.email.trim().is_empty() || !payload.email.contains('@') {
        return Err(ApiError::validation("a valid email is required"));
    }
    if payload.password.len() < 8 {
        return Err(ApiError::validation("password must be at least 8 characters"));
    }

    let password_hash = hash_password(&payload.password)?;
    let user = application_state
        .users
        .create_user(&payload.email, &payload.name, &password_hash, UserStatus::Active)
        .await?;

    let token = issue_bearer_token(
        &application_state.config.jwt_secret,
        &user.id,
        &user.email,
        application_state.config.jwt_expires_hours,
    )?;

    application_state
        .audit_best_effort(
            None,
            Some(&user.id),
            ActorType::User,
            actions::USER_REGISTERED,
            "user",
            &user.id,
            json!({ "email": user.email }),
        )
        .await;

    Ok((StatusCode::CREATED, Json(json!({ "token": token, "user": user }))))
}

/// POST /api/auth/login
#[instrument(skip(application_state, payload), fields(email = %payload.email))]
pub async fn handle_login(
    State(application_state): State<AppState>,
    ValidatedJson(payload): ValidatedJson<LoginPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let user = application_state
        .users
        .find_by_email(&payload.email)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("unknown credentials".into()))?;

    if !verify_password(&user.password_hash, &payload.password) {
        return Err(ApiError::Unauthorized("unknown credentials".into()));
    }
    if user.status == UserStatus::Suspended {
        return Err(ApiError::Forbidden("account suspended".into()));
    }

    let memberships = application_state.users.memberships_for_user(&user.id).await?;
    let token = issue_bearer_token(
        &application_state.config.jwt_secret,
        &user.id,
        &user.email,
        application_state.config.jwt_expires_hours,
    )?;

    Ok(Json(json!({ "token": token, "user": user, "memberships": memberships })))
}
