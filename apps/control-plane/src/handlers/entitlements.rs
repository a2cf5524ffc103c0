// [apps/control-plane/src/handlers/entitlements.rs]
/*!
 * APARATO: ENTITLEMENT HANDLERS (ESTRATO L3-API)
 * RESPONSABILIDAD: UPSERT DE BANDERAS (PA|TA) Y LISTADO POR TENANT
 */

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use helios_domain_models::{audit::actions, ActorType, EntitlementKey, EntitlementScope, Role};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::errors::ApiError;
use crate::extractors::{TenantScope, ValidatedJson};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertEntitlementPayload {
    pub scope: EntitlementScope,
    pub device_id: Option<String>,
    pub key: EntitlementKey,
    pub enabled: bool,
}

/// PUT /api/entitlements (PA | TA)
#[instrument(skip(application_state, scope, payload))]
pub async fn handle_upsert_entitlement(
    State(application_state): State<AppState>,
    scope: TenantScope,
    ValidatedJson(payload): ValidatedJson<UpsertEntitlementPayload>,
) -> Result<impl IntoResponse, ApiError> {
    scope.require_role(&[Role::TenantAdmin])?;
    let tenant_id = scope.require_tenant()?.to_string();

    // device_id poblado si y solo si el alcance es DEVICE.
    let device_id = match payload.scope {
        EntitlementScope::Device => {
            let device_id = payload
                .device_id
                .as_deref()
                .ok_or_else(|| ApiError::validation("deviceId required for DEVICE scope"))?;
            application_state
                .devices
                .find_by_id_in_tenant(&tenant_id, device_id)
                .await?
                .ok_or(ApiError::NotFound)?;
            Some(device_id.to_string())
        }
        EntitlementScope::Tenant => {
            if payload.device_id.is_some() {
                return Err(ApiError::validation("deviceId must be absent for TENANT scope"));
            }
            None
        }
    };

    let entitlement = application_state
        .entitlements
        .upsert(&tenant_id, payload.scope, device_id.as_deref(), payload.key, payload.enabled)
        .await?;

    application_state
        .audit_best_effort(
            Some(&tenant_id),
            Some(&scope.user.user_id),
            ActorType::User,
            actions::ENTITLEMENT_SET,
            "entitlement",
            &entitlement.id,
            json!({ "key": entitlement.key, "enabled": entitlement.enabled,
                    "deviceId": entitlement.device_id }),
        )
        .await;

    Ok(Json(entitlement))
}

/// GET /api/entitlements
#[instrument(skip(application_state, scope))]
pub async fn handle_list_entitlements(
    State(application_state): State<AppState>,
    scope: TenantScope,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = scope.require_tenant()?;
    let entitlements = application_state.entitlements.list_by_tenant(tenant_id).await?;
    Ok(Json(entitlements))
}
