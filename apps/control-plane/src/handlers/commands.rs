// [apps/control-plane/src/handlers/commands.rs]
/*!
 * =================================================================
 * APARATO: COMMAND HANDLERS (V3.4 - QUEUE GATEWAY)
 * CLASIFICACIÓN: API ADAPTER (ESTRATO L3-API)
 * RESPONSABILIDAD: CREACIÓN COMPUERTA, POLL DE UNIDAD Y ACUSE
 *
 * # Logic:
 * La creación exige el entitlement BASIC_REMOTE_BOOST resuelto sobre
 * (tenant, unidad); una unidad fuera del tenant activo responde 404
 * (aislamiento). El poll y el acuse exigen identidad propia de la
 * unidad (403 en disonancia de ruta).
 * =================================================================
 */

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use helios_domain_models::{audit::actions, ActorType, CommandStatus, CommandType, EntitlementKey, Role};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::errors::ApiError;
use crate::extractors::{DeviceIdentity, TenantScope, ValidatedJson};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommandPayload {
    #[serde(rename = "type")]
    pub command_type: CommandType,
    pub payload: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckPayload {
    pub status: String,
    pub error_msg: Option<String>,
}

/// POST /api/devices/:deviceId/commands (cualquier rol con membresía)
#[instrument(skip(application_state, scope, payload))]
pub async fn handle_create_command(
    State(application_state): State<AppState>,
    scope: TenantScope,
    Path(device_id): Path<String>,
    ValidatedJson(payload): ValidatedJson<CreateCommandPayload>,
) -> Result<impl IntoResponse, ApiError> {
    scope.require_role(&[
        Role::TenantAdmin,
        Role::Installer,
        Role::SupportAgent,
        Role::EndUser,
    ])?;
    let tenant_id = scope.require_tenant()?.to_string();

    // Aislamiento: unidad ajena al tenant activo = inexistente.
    application_state
        .devices
        .find_by_id_in_tenant(&tenant_id, &device_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    // Compuerta de entitlement con precedencia device > tenant.
    let boost_enabled = application_state
        .entitlements
        .resolve(&tenant_id, EntitlementKey::BasicRemoteBoost, Some(&device_id))
        .await?;
    if !boost_enabled {
        return Err(ApiError::FeatureDisabled("BASIC_REMOTE_BOOST is disabled".into()));
    }

    let command = application_state
        .commands
        .create(
            &tenant_id,
            &device_id,
            payload.command_type,
            payload.payload.unwrap_or_else(|| json!({})),
            &scope.user.user_id,
        )
        .await?;

    application_state
        .audit_best_effort(
            Some(&tenant_id),
            Some(&scope.user.user_id),
            ActorType::User,
            actions::COMMAND_CREATED,
            "command",
            &command.id,
            json!({ "deviceId": device_id, "type": command.command_type }),
        )
        .await;

    Ok((StatusCode::CREATED, Json(command)))
}

/// GET /api/devices/:deviceId/commands — historial (camino humano).
#[instrument(skip(application_state, scope))]
pub async fn handle_list_device_commands(
    State(application_state): State<AppState>,
    scope: TenantScope,
    Path(device_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = scope.require_tenant()?;

    application_state
        .devices
        .find_by_id_in_tenant(tenant_id, &device_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let commands = application_state
        .commands
        .list_for_device(tenant_id, &device_id, 100)
        .await?;
    Ok(Json(commands))
}

/// GET /api/devices/:deviceId/commands/pending (unidad, identidad propia)
#[instrument(skip(application_state, identity))]
pub async fn handle_poll_pending_commands(
    State(application_state): State<AppState>,
    identity: DeviceIdentity,
    Path(device_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    identity.require_self(&device_id)?;

    // Marca-y-devuelve atómico: las filas salen ya DELIVERED.
    let delivered = application_state.commands.poll_and_deliver(&device_id).await?;
    Ok(Json(delivered))
}

/// POST /api/devices/:deviceId/commands/:commandId/ack (unidad propia)
#[instrument(skip(application_state, identity, payload))]
pub async fn handle_ack_command(
    State(application_state): State<AppState>,
    identity: DeviceIdentity,
    Path((device_id, command_id)): Path<(String, String)>,
    ValidatedJson(payload): ValidatedJson<AckPayload>,
) -> Result<impl IntoResponse, ApiError> {
    identity.require_self(&device_id)?;

    let final_status = match payload.status.as_str() {
        "ACKED" => CommandStatus::Acked,
        "FAILED" => CommandStatus::Failed,
        other => {
            return Err(ApiError::validation(format!(
                "ack status must be ACKED or FAILED, got '{other}'"
            )))
        }
    };

    let command = application_state
        .commands
        .acknowledge(&device_id, &command_id, final_status, payload.error_msg.clone())
        .await?;

    let audit_action = match final_status {
        CommandStatus::Acked => actions::COMMAND_ACKED,
        _ => actions::COMMAND_FAILED,
    };
    application_state
        .audit_best_effort(
            Some(&command.tenant_id),
            None,
            ActorType::Device,
            audit_action,
            "command",
            &command.id,
            json!({ "deviceId": device_id, "errorMsg": payload.error_msg }),
        )
        .await;

    Ok(Json(command))
}
