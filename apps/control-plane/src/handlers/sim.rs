// [apps/control-plane/src/handlers/sim.rs]
/*!
 * APARATO: SIM ACTION HANDLER (ESTRATO L3-API)
 * RESPONSABILIDAD: ÓRDENES CONTRA EL OPERADOR SIM (ADAPTADOR ESTRECHO)
 */

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use helios_domain_models::{audit::actions, ActorType, Role};
use helios_infra_integrations::SimAction;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::errors::ApiError;
use crate::extractors::{TenantScope, ValidatedJson};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimActionPayload {
    pub action: SimAction,
}

/// POST /api/sim/:iccid/actions (PA | TA)
#[instrument(skip(application_state, scope, payload))]
pub async fn handle_sim_action(
    State(application_state): State<AppState>,
    scope: TenantScope,
    Path(iccid): Path<String>,
    ValidatedJson(payload): ValidatedJson<SimActionPayload>,
) -> Result<impl IntoResponse, ApiError> {
    scope.require_role(&[Role::TenantAdmin])?;
    let tenant_id = scope.require_tenant()?.to_string();

    let outcome = application_state
        .sim_carrier
        .execute_action(&iccid, payload.action)
        .await
        .map_err(|carrier_fault| ApiError::validation(carrier_fault.to_string()))?;

    application_state
        .audit_best_effort(
            Some(&tenant_id),
            Some(&scope.user.user_id),
            ActorType::User,
            actions::SIM_ACTION_EXECUTED,
            "sim",
            &iccid,
            json!({ "action": outcome.action, "carrierReference": outcome.carrier_reference }),
        )
        .await;

    Ok(Json(outcome))
}
