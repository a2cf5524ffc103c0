// [apps/control-plane/src/handlers/audit.rs]
/*!
 * APARATO: AUDIT VIEWER HANDLER (ESTRATO L3-API)
 * RESPONSABILIDAD: LECTURA FILTRADA DEL REGISTRO SOLO-ANEXO (PA|TA)
 */

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use helios_domain_models::Role;
use helios_infra_db::repositories::audit::AuditFilter;
use serde::Deserialize;
use tracing::instrument;

use crate::errors::ApiError;
use crate::extractors::TenantScope;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    pub action: Option<String>,
    pub entity_type: Option<String>,
    pub limit: Option<i64>,
}

/// GET /api/audit (PA | TA)
#[instrument(skip(application_state, scope, query))]
pub async fn handle_list_audit(
    State(application_state): State<AppState>,
    scope: TenantScope,
    Query(query): Query<AuditQuery>,
) -> Result<impl IntoResponse, ApiError> {
    scope.require_role(&[Role::TenantAdmin])?;
    let tenant_id = scope.require_tenant()?;

    let records = application_state
        .audit
        .list_by_tenant(
            tenant_id,
            &AuditFilter {
                action: query.action,
                entity_type: query.entity_type,
                limit: query.limit.unwrap_or(100).clamp(1, 500),
            },
        )
        .await?;

    Ok(Json(records))
}
