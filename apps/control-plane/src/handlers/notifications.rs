// [apps/control-plane/src/handlers/notifications.rs]
/*!
 * APARATO: NOTIFICATION CHANNEL HANDLERS (ESTRATO L3-API)
 * RESPONSABILIDAD: ALTA Y LISTADO DE CANALES POR TENANT (PA|TA)
 */

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use helios_domain_models::{ChannelType, Role};
use serde::Deserialize;
use tracing::instrument;

use crate::errors::ApiError;
use crate::extractors::{TenantScope, ValidatedJson};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChannelPayload {
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    pub config: serde_json::Value,
    pub enabled: Option<bool>,
}

/// POST /api/notifications/channels (PA | TA)
#[instrument(skip(application_state, scope, payload))]
pub async fn handle_create_channel(
    State(application_state): State<AppState>,
    scope: TenantScope,
    ValidatedJson(payload): ValidatedJson<CreateChannelPayload>,
) -> Result<impl IntoResponse, ApiError> {
    scope.require_role(&[Role::TenantAdmin])?;
    let tenant_id = scope.require_tenant()?.to_string();

    // Configuración mínima por tipo; el contenido sigue siendo opaco.
    let required_config_key = match payload.channel_type {
        ChannelType::Email => "to",
        ChannelType::Sms => "phone",
        ChannelType::Webhook => "url",
    };
    if payload.config.get(required_config_key).and_then(|v| v.as_str()).is_none() {
        return Err(ApiError::validation(format!(
            "{} channel config requires '{required_config_key}'",
            payload.channel_type.as_str()
        )));
    }

    let channel = application_state
        .notifications
        .create_channel(&tenant_id, payload.channel_type, payload.config, payload.enabled.unwrap_or(true))
        .await?;

    Ok((StatusCode::CREATED, Json(channel)))
}

/// GET /api/notifications/channels
#[instrument(skip(application_state, scope))]
pub async fn handle_list_channels(
    State(application_state): State<AppState>,
    scope: TenantScope,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = scope.require_tenant()?;
    let channels = application_state.notifications.list_channels_by_tenant(tenant_id).await?;
    Ok(Json(channels))
}
