// [apps/control-plane/src/routes.rs]
/*!
 * =================================================================
 * APARATO: CONTROL PLANE ROUTING MATRIX (V4.0 - DUAL GATEWAY)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L3-API)
 * RESPONSABILIDAD: TOPOLOGÍA DE RUTAS, CORS Y ESCUDO DE AUTENTICACIÓN
 *
 * # Logic:
 * /api/health y /api/auth/ (cualquier subruta) quedan fuera del escudo; todo lo demás
 * exige ciudadanía (humana o de dispositivo) vía el guardia dual.
 * =================================================================
 */

use std::time::Duration;

use axum::http::{header, Method};
use axum::middleware;
use axum::routing::{get, patch, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{
    alerts, audit, auth, commands, dashboard, devices, entitlements, notifications, ota, sim,
    sites, telemetry, tenants, users,
};
use crate::middleware::auth_guard;
use crate::state::AppState;

/// Tope del cuerpo de petición (cubre la carga CSV masiva).
const REQUEST_BODY_LIMIT_BYTES: usize = 4 * 1024 * 1024;

pub fn create_control_plane_router(application_shared_state: AppState) -> Router {
    // Escudo de red para el dashboard y herramientas de operación.
    let network_security_shield = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::PUT, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    // ESTRATO ORGANIZACIONAL: tenants, usuarios y tablero.
    let organization_stratum = Router::new()
        .route("/tenants", post(tenants::handle_create_tenant).get(tenants::handle_list_tenants))
        .route("/tenants/:tenantId/dashboard/summary", get(dashboard::handle_dashboard_summary))
        .route("/users/invite", post(users::handle_invite_user))
        .route("/users/:userId/role", patch(users::handle_patch_user_role));

    // ESTRATO FÍSICO: sitios y clima.
    let site_stratum = Router::new()
        .route("/sites", post(sites::handle_create_site).get(sites::handle_list_sites))
        .route("/sites/:siteId", get(sites::handle_get_site))
        .route("/sites/:siteId/location", patch(sites::handle_patch_site_location))
        .route("/sites/:siteId/weather", get(sites::handle_get_site_weather));

    // ESTRATO DE FLOTA: inventario, gemelo, comandos y mapa.
    let fleet_stratum = Router::new()
        .route("/devices", post(devices::handle_create_device).get(devices::handle_list_devices))
        .route("/devices/bulk", post(devices::handle_bulk_create_devices))
        .route("/devices/:deviceId", patch(devices::handle_patch_device))
        .route("/devices/:deviceId/twin", get(devices::handle_get_twin))
        .route("/devices/:deviceId/rotate-token", post(devices::handle_rotate_device_token))
        .route("/devices/:deviceId/rollups", get(devices::handle_list_device_rollups))
        .route(
            "/devices/:deviceId/commands",
            post(commands::handle_create_command).get(commands::handle_list_device_commands),
        )
        .route("/devices/:deviceId/commands/pending", get(commands::handle_poll_pending_commands))
        .route("/devices/:deviceId/commands/:commandId/ack", post(commands::handle_ack_command))
        .route("/map/devices", get(devices::handle_map_devices))
        .route("/ingest/telemetry", post(telemetry::handle_ingest_telemetry));

    // ESTRATO DE POLÍTICA: alertas, entitlements y auditoría.
    let policy_stratum = Router::new()
        .route("/alerts/rules", post(alerts::handle_create_rule).get(alerts::handle_list_rules))
        .route("/alerts/rules/:ruleId", patch(alerts::handle_patch_rule))
        .route("/alerts", get(alerts::handle_list_events))
        .route("/alerts/:eventId/ack", post(alerts::handle_ack_event))
        .route("/alerts/:eventId/close", post(alerts::handle_close_event))
        .route(
            "/entitlements",
            put(entitlements::handle_upsert_entitlement).get(entitlements::handle_list_entitlements),
        )
        .route(
            "/notifications/channels",
            post(notifications::handle_create_channel).get(notifications::handle_list_channels),
        )
        .route("/audit", get(audit::handle_list_audit));

    // ESTRATO DE DESPLIEGUE: firmware, trabajos OTA y SIM.
    let rollout_stratum = Router::new()
        .route("/ota/firmware", post(ota::handle_register_firmware).get(ota::handle_list_firmware))
        .route("/ota/jobs", post(ota::handle_schedule_job).get(ota::handle_list_jobs))
        .route("/ota/jobs/:jobId/cancel", post(ota::handle_cancel_job))
        .route("/ota/devices/:deviceId/ota/pending", get(ota::handle_device_pull))
        .route("/ota/devices/:deviceId/ota/report", post(ota::handle_device_report))
        .route("/sim/:iccid/actions", post(sim::handle_sim_action));

    // COMPOSICIÓN PROTEGIDA (Escudo Dual de Autenticación).
    let protected_api = Router::new()
        .merge(organization_stratum)
        .merge(site_stratum)
        .merge(fleet_stratum)
        .merge(policy_stratum)
        .merge(rollout_stratum)
        .layer(middleware::from_fn_with_state(application_shared_state.clone(), auth_guard));

    // ESTRATO ABIERTO: salud del proceso y forja de sesiones.
    let public_api = Router::new()
        .route("/health", get(dashboard::handle_health))
        .route("/auth/register", post(auth::handle_register))
        .route("/auth/login", post(auth::handle_login));

    // COMPOSICIÓN GLOBAL (Root Topology).
    Router::new()
        .nest("/api", public_api.merge(protected_api))
        .layer(RequestBodyLimitLayer::new(REQUEST_BODY_LIMIT_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(network_security_shield)
        .with_state(application_shared_state)
}
