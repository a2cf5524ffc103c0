// [apps/control-plane/src/handlers/tenants.rs]
/*!
 * APARATO: TENANT HANDLERS (ESTRATO L3-API)
 * RESPONSABILIDAD: ALTA (PLATFORM_ADMIN) Y VISTA ACOTADA POR MEMBRESÍAS
 */

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use helios_domain_models::{audit::actions, ActorType, TenantType};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::errors::ApiError;
use crate::extractors::{TenantScope, ValidatedJson};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTenantPayload {
    pub name: String,
    #[serde(rename = "type")]
    pub tenant_type: TenantType,
}

/// POST /api/tenants (solo PLATFORM_ADMIN)
#[instrument(skip(application_state, scope, payload))]
pub async fn handle_create_tenant(
    State(application_state): State<AppState>,
    scope: TenantScope,
    ValidatedJson(payload): ValidatedJson<CreateTenantPayload>,
) -> Result<impl IntoResponse, ApiError> {
    scope.require_platform_admin()?;

    if payload.name.trim().is_empty() {
        return Err(ApiError::validation("tenant name is required"));
    }

    let tenant = application_state.tenants.create(&payload.name, payload.tenant_type).await?;

    application_state
        .audit_best_effort(
            Some(&tenant.id),
            Some(&scope.user.user_id),
            ActorType::User,
            actions::TENANT_CREATED,
            "tenant",
            &tenant.id,
            json!({ "name": tenant.name, "type": tenant.tenant_type }),
        )
        .await;

    Ok((StatusCode::CREATED, Json(tenant)))
}

/// GET /api/tenants — PLATFORM_ADMIN ve todo; el resto, sus membresías.
#[instrument(skip(application_state, scope))]
pub async fn handle_list_tenants(
    State(application_state): State<AppState>,
    scope: TenantScope,
) -> Result<impl IntoResponse, ApiError> {
    let tenants = if scope.is_platform_admin {
        application_state.tenants.list_all().await?
    } else {
        let member_tenant_ids: Vec<String> = scope
            .user
            .memberships
            .iter()
            .map(|membership| membership.tenant_id.clone())
            .collect();
        application_state.tenants.list_by_ids(&member_tenant_ids).await?
    };

    Ok(Json(tenants))
}
