// [apps/control-plane/src/handlers/dashboard.rs]
/*!
 * APARATO: DASHBOARD & HEALTH HANDLERS (ESTRATO L3-API)
 * RESPONSABILIDAD: BUNDLE DE KPIs POR TENANT Y LIVENESS DEL PROCESO
 */

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use helios_domain_models::{AlertEventStatus, DeviceStatus};
use helios_infra_db::repositories::alert::AlertEventFilter;
use helios_infra_db::repositories::device::DeviceListFilter;
use serde_json::json;
use tracing::instrument;

use crate::errors::ApiError;
use crate::extractors::TenantScope;
use crate::state::AppState;

/// GET /api/tenants/:tenantId/dashboard/summary
#[instrument(skip(application_state, scope))]
pub async fn handle_dashboard_summary(
    State(application_state): State<AppState>,
    scope: TenantScope,
    Path(tenant_id_in_path): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    // El extractor ya resolvió el tenant desde la ruta y validó membresía.
    let tenant_id = scope.require_tenant()?;
    debug_assert_eq!(tenant_id, tenant_id_in_path);

    let (_, total_devices) = application_state
        .devices
        .list_by_tenant(tenant_id, &DeviceListFilter { limit: 1, ..Default::default() })
        .await?;

    let (_, active_devices) = application_state
        .devices
        .list_by_tenant(
            tenant_id,
            &DeviceListFilter { status: Some(DeviceStatus::Active), limit: 1, ..Default::default() },
        )
        .await?;

    let (_, open_alerts) = application_state
        .alerts
        .list_events(
            tenant_id,
            &AlertEventFilter { status: Some(AlertEventStatus::Open), limit: 1, ..Default::default() },
        )
        .await?;

    let sites = application_state.sites.list_by_tenant(tenant_id).await?;

    Ok(Json(json!({
        "tenantId": tenant_id,
        "devices": { "total": total_devices, "active": active_devices },
        "sites": { "total": sites.len() },
        "alerts": { "open": open_alerts },
    })))
}

/// GET /api/health — abierto, sin autenticación.
pub async fn handle_health(State(application_state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "uptimeSeconds": application_state.booted_at.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
