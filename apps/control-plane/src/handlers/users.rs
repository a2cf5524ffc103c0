// [apps/control-plane/src/handlers/users.rs]
/*!
 * APARATO: USER GOVERNANCE HANDLERS (ESTRATO L3-API)
 * RESPONSABILIDAD: INVITACIONES Y CAMBIOS DE ROL DENTRO DEL TENANT
 */

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use helios_domain_models::{audit::actions, ActorType, Role, UserStatus};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::errors::ApiError;
use crate::extractors::{TenantScope, ValidatedJson};
use crate::security::hash_password;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitePayload {
    pub email: String,
    pub name: String,
    pub role: Role,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolePatchPayload {
    pub role: Role,
}

/// POST /api/users/invite (PA | TENANT_ADMIN, con tenant activo)
#[instrument(skip(application_state, scope, payload), fields(email = %payload.email))]
pub async fn handle_invite_user(
    State(application_state): State<AppState>,
    scope: TenantScope,
    ValidatedJson(payload): ValidatedJson<InvitePayload>,
) -> Result<impl IntoResponse, ApiError> {
    scope.require_role(&[Role::TenantAdmin])?;
    let tenant_id = scope.require_tenant()?.to_string();

    // Solo un PLATFORM_ADMIN puede otorgar PLATFORM_ADMIN.
    if payload.role == Role::PlatformAdmin && !scope.is_platform_admin {
        return Err(ApiError::Forbidden("cannot grant platform administrator".into()));
    }

    // Reutiliza el principal si el email ya existe; si no, lo invita.
    let user = match application_state.users.find_by_email(&payload.email).await? {
        Some(existing_user) => existing_user,
        None => {
            let provisional_password = payload
                .password
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let password_hash = hash_password(&provisional_password)?;
            application_state
                .users
                .create_user(&payload.email, &payload.name, &password_hash, UserStatus::Invited)
                .await?
        }
    };

    let membership = application_state
        .users
        .create_membership(&user.id, &tenant_id, payload.role)
        .await?;

    application_state
        .audit_best_effort(
            Some(&tenant_id),
            Some(&scope.user.user_id),
            ActorType::User,
            actions::USER_INVITED,
            "user",
            &user.id,
            json!({ "email": user.email, "role": payload.role }),
        )
        .await;

    Ok((StatusCode::CREATED, Json(json!({ "user": user, "membership": membership }))))
}

/// PATCH /api/users/:userId/role (PA | TENANT_ADMIN, con tenant activo)
#[instrument(skip(application_state, scope, payload))]
pub async fn handle_patch_user_role(
    State(application_state): State<AppState>,
    scope: TenantScope,
    Path(user_id): Path<String>,
    ValidatedJson(payload): ValidatedJson<RolePatchPayload>,
) -> Result<impl IntoResponse, ApiError> {
    scope.require_role(&[Role::TenantAdmin])?;
    let tenant_id = scope.require_tenant()?.to_string();

    if payload.role == Role::PlatformAdmin && !scope.is_platform_admin {
        return Err(ApiError::Forbidden("cannot grant platform administrator".into()));
    }

    let membership = application_state
        .users
        .update_membership_role(&user_id, &tenant_id, payload.role)
        .await?;

    application_state
        .audit_best_effort(
            Some(&tenant_id),
            Some(&scope.user.user_id),
            ActorType::User,
            actions::USER_ROLE_CHANGED,
            "membership",
            &membership.id,
            json!({ "userId": user_id, "role": payload.role }),
        )
        .await;

    Ok(Json(membership))
}
