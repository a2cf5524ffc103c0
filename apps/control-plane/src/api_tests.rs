// [apps/control-plane/src/api_tests.rs]
/*!
 * =================================================================
 * APARATO: CONTROL PLANE PROVING GROUNDS (V4.0 - END TO END)
 * CLASIFICACIÓN: INTEGRATION EVIDENCE (ESTRATO L1-APP)
 * RESPONSABILIDAD: CERTIFICACIÓN DE AISLAMIENTO, INGESTA, COMANDOS,
 *                  ENTITLEMENTS, BARRIDOS Y AUTENTICACIÓN DUAL
 * =================================================================
 */

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{NaiveTime, Utc};
use helios_domain_models::Role;
use helios_infra_db::TursoClient;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::config::RuntimeConfig;
use crate::routes::create_control_plane_router;
use crate::security::mint_device_token;
use crate::services::{alert_evaluator, analytics_roller, notification_dispatcher, weather_sync};
use crate::state::AppState;

const TEST_JWT_SECRET: &str = "proving-grounds-jwt-secret";
const TEST_DEVICE_SECRET: &str = "proving-grounds-device-secret";

fn test_config(database_url: &str) -> RuntimeConfig {
    RuntimeConfig {
        port: 0,
        database_url: database_url.to_string(),
        turso_auth_token: None,
        jwt_secret: TEST_JWT_SECRET.to_string(),
        jwt_expires_hours: 24,
        device_hmac_secret: TEST_DEVICE_SECRET.to_string(),
        alert_eval_interval_minutes: 5,
        no_telemetry_threshold_minutes: 30,
        over_temp_threshold_c: 85.0,
        sensor_out_of_range_repeat_count: 3,
        rollup_time_utc: NaiveTime::from_hms_opt(2, 0, 0).unwrap(),
        weather_time_utc: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
    }
}

async fn proving_grounds() -> (AppState, Router, tempfile::TempDir) {
    let scratch_directory = tempfile::tempdir().expect("scratch dir");
    let database_path = scratch_directory.path().join("proving.db");
    let database_url = database_path.to_str().unwrap().to_string();

    let client = TursoClient::connect(&database_url, None).await.expect("ledger ignition");
    let state = AppState::new(client, test_config(&database_url));
    let router = create_control_plane_router(state.clone());

    (state, router, scratch_directory)
}

/// Petición JSON genérica contra el router en memoria.
async fn send_request(
    router: &Router,
    method: Method,
    uri: &str,
    bearer: Option<&str>,
    tenant_header: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request_builder = Request::builder().method(method).uri(uri);

    if let Some(token) = bearer {
        request_builder = request_builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    if let Some(tenant_id) = tenant_header {
        request_builder = request_builder.header("x-tenant-id", tenant_id);
    }

    let request = match body {
        Some(json_body) => request_builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json_body.to_string()))
            .unwrap(),
        None => request_builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.expect("router response");
    let status = response.status();
    let raw_bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let parsed_body = if raw_bytes.is_empty() {
        json!(null)
    } else {
        serde_json::from_slice(&raw_bytes).unwrap_or(json!(null))
    };

    (status, parsed_body)
}

/// Registra un usuario vía API y le siembra una membresía directa.
async fn seed_member(
    state: &AppState,
    router: &Router,
    email: &str,
    tenant_id: Option<(&str, Role)>,
) -> (String, String) {
    let (status, body) = send_request(
        router,
        Method::POST,
        "/api/auth/register",
        None,
        None,
        Some(json!({ "email": email, "password": "proving-grounds-pass", "name": "Operator" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "register failed: {body}");

    let token = body["token"].as_str().unwrap().to_string();
    let user_id = body["user"]["id"].as_str().unwrap().to_string();

    if let Some((tenant, role)) = tenant_id {
        state.users.create_membership(&user_id, tenant, role).await.unwrap();
    }

    (user_id, token)
}

async fn provision_device(
    router: &Router,
    admin_token: &str,
    tenant_id: &str,
    serial: &str,
) -> (String, String) {
    let (status, body) = send_request(
        router,
        Method::POST,
        "/api/devices",
        Some(admin_token),
        Some(tenant_id),
        Some(json!({ "serialNumber": serial, "model": "HELIOS-200L" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "device provisioning failed: {body}");

    let device_id = body["device"]["id"].as_str().unwrap().to_string();
    let device_token = body["deviceToken"].as_str().unwrap().to_string();
    (device_id, device_token)
}

// =================================================================
// ESCENARIO S1: AISLAMIENTO DE TENANT
// =================================================================

#[tokio::test]
async fn certify_tenant_isolation_forbids_foreign_context() {
    let (state, router, _guard) = proving_grounds().await;

    let tenant_a = state.tenants.create("Tenant A", helios_domain_models::TenantType::Installer).await.unwrap();
    let tenant_b = state.tenants.create("Tenant B", helios_domain_models::TenantType::Retailer).await.unwrap();

    // Unidad en A, usuario con membresía SOLO en B.
    let (_, admin_a_token) =
        seed_member(&state, &router, "admin-a@helios.example", Some((&tenant_a.id, Role::TenantAdmin))).await;
    let (foreign_device_id, _) =
        provision_device(&router, &admin_a_token, &tenant_a.id, "SN-ISO-1").await;

    let (_, user_b_token) =
        seed_member(&state, &router, "user-b@helios.example", Some((&tenant_b.id, Role::EndUser))).await;

    // Contexto ajeno: FORBIDDEN.
    let (status, body) = send_request(
        &router, Method::GET, "/api/devices", Some(&user_b_token), Some(&tenant_a.id), None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    // Contexto propio: 200 sin rastro de la unidad ajena.
    let (status, body) = send_request(
        &router, Method::GET, "/api/devices", Some(&user_b_token), Some(&tenant_b.id), None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], json!(0));
    assert!(!body.to_string().contains(&foreign_device_id));

    // Lectura puntual cruzada (admin de A apuntando a su propio tenant
    // pero unidad inexistente allí): NOT_FOUND, jamás la entidad.
    let (status, _) = send_request(
        &router,
        Method::GET,
        &format!("/api/devices/{foreign_device_id}/twin"),
        Some(&user_b_token),
        Some(&tenant_b.id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =================================================================
// ESCENARIO S2: TELEMETRÍA -> GEMELO
// =================================================================

#[tokio::test]
async fn certify_telemetry_ingest_derives_twin() {
    let (state, router, _guard) = proving_grounds().await;

    let tenant = state.tenants.create("Twin Org", helios_domain_models::TenantType::Installer).await.unwrap();
    let (_, admin_token) =
        seed_member(&state, &router, "twin-admin@helios.example", Some((&tenant.id, Role::TenantAdmin))).await;
    let (device_id, device_token) =
        provision_device(&router, &admin_token, &tenant.id, "SN-TWIN-1").await;

    let (status, body) = send_request(
        &router,
        Method::POST,
        "/api/ingest/telemetry",
        Some(&device_token),
        None,
        Some(json!({
            "deviceId": device_id,
            "ts": "2026-02-10T10:00:00Z",
            "metrics": {
                "tankTempC": 58.2, "rssiDbm": -88, "batteryPct": 92,
                "heaterOn": true, "powerW": 1800
            }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "ingest failed: {body}");
    assert!(body["id"].is_string());
    assert!(body.get("warnings").is_none());

    let (status, twin) = send_request(
        &router,
        Method::GET,
        &format!("/api/devices/{device_id}/twin"),
        Some(&admin_token),
        Some(&tenant.id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(twin["derivedState"]["isOnline"], json!(true));
    assert_eq!(twin["derivedState"]["lastTankTempC"], json!(58.2));
    assert_eq!(twin["derivedState"]["healthScore"], json!(100));

    // Métrica fuera de la tabla de plausibilidad: advertencia no fatal.
    let (status, body) = send_request(
        &router,
        Method::POST,
        "/api/ingest/telemetry",
        Some(&device_token),
        None,
        Some(json!({
            "deviceId": device_id,
            "ts": "2026-02-10T10:05:00Z",
            "metrics": { "tankTempC": 140.0 }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["warnings"][0].as_str().unwrap().starts_with("tankTempC=140"));
}

#[tokio::test]
async fn certify_ingest_identity_mismatch_is_validation_error() {
    let (state, router, _guard) = proving_grounds().await;

    let tenant = state.tenants.create("Mismatch Org", helios_domain_models::TenantType::Installer).await.unwrap();
    let (_, admin_token) =
        seed_member(&state, &router, "mm-admin@helios.example", Some((&tenant.id, Role::TenantAdmin))).await;
    let (_, device_token) = provision_device(&router, &admin_token, &tenant.id, "SN-MM-1").await;

    let (status, body) = send_request(
        &router,
        Method::POST,
        "/api/ingest/telemetry",
        Some(&device_token),
        None,
        Some(json!({ "deviceId": "some-other-device", "ts": "2026-02-10T10:00:00Z", "metrics": {} })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

// =================================================================
// ESCENARIO S4: CICLO DE VIDA DE COMANDOS + ENTITLEMENT
// =================================================================

#[tokio::test]
async fn certify_command_lifecycle_with_entitlement_gate() {
    let (state, router, _guard) = proving_grounds().await;

    let tenant = state.tenants.create("Cmd Org", helios_domain_models::TenantType::Installer).await.unwrap();
    let (_, admin_token) =
        seed_member(&state, &router, "cmd-admin@helios.example", Some((&tenant.id, Role::TenantAdmin))).await;
    let (device_id, device_token) =
        provision_device(&router, &admin_token, &tenant.id, "SN-CMD-9").await;

    // BASIC_REMOTE_BOOST es verdadero por defecto: la creación procede.
    let (status, command) = send_request(
        &router,
        Method::POST,
        &format!("/api/devices/{device_id}/commands"),
        Some(&admin_token),
        Some(&tenant.id),
        Some(json!({ "type": "REMOTE_BOOST_SET", "payload": { "minutes": 30 } })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(command["status"], "QUEUED");
    let command_id = command["id"].as_str().unwrap().to_string();

    // Poll de la unidad: llega DELIVERED y no resucita.
    let (status, delivered) = send_request(
        &router,
        Method::GET,
        &format!("/api/devices/{device_id}/commands/pending"),
        Some(&device_token),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(delivered[0]["id"], json!(command_id));
    assert_eq!(delivered[0]["status"], "DELIVERED");

    let (_, repoll) = send_request(
        &router,
        Method::GET,
        &format!("/api/devices/{device_id}/commands/pending"),
        Some(&device_token),
        None,
        None,
    )
    .await;
    assert_eq!(repoll.as_array().unwrap().len(), 0);

    // Acuse ACKED con sello temporal.
    let (status, acked) = send_request(
        &router,
        Method::POST,
        &format!("/api/devices/{device_id}/commands/{command_id}/ack"),
        Some(&device_token),
        None,
        Some(json!({ "status": "ACKED" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(acked["status"], "ACKED");
    assert!(acked["ackAt"].is_string());

    // Entitlement apagado a nivel tenant: FEATURE_DISABLED.
    let (status, _) = send_request(
        &router,
        Method::PUT,
        "/api/entitlements",
        Some(&admin_token),
        Some(&tenant.id),
        Some(json!({ "scope": "TENANT", "key": "BASIC_REMOTE_BOOST", "enabled": false })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send_request(
        &router,
        Method::POST,
        &format!("/api/devices/{device_id}/commands"),
        Some(&admin_token),
        Some(&tenant.id),
        Some(json!({ "type": "REMOTE_BOOST_SET", "payload": {} })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FEATURE_DISABLED");
}

#[tokio::test]
async fn certify_device_poll_requires_own_identity() {
    let (state, router, _guard) = proving_grounds().await;

    let tenant = state.tenants.create("Self Org", helios_domain_models::TenantType::Installer).await.unwrap();
    let (_, admin_token) =
        seed_member(&state, &router, "self-admin@helios.example", Some((&tenant.id, Role::TenantAdmin))).await;
    let (_device_a, token_a) = provision_device(&router, &admin_token, &tenant.id, "SN-SELF-A").await;
    let (device_b, _token_b) = provision_device(&router, &admin_token, &tenant.id, "SN-SELF-B").await;

    // La unidad A intenta drenar la cola de B: FORBIDDEN.
    let (status, body) = send_request(
        &router,
        Method::GET,
        &format!("/api/devices/{device_b}/commands/pending"),
        Some(&token_a),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
}

// =================================================================
// ESCENARIO S6: AUTENTICACIÓN DE DISPOSITIVO (MAC)
// =================================================================

#[tokio::test]
async fn certify_device_authentication_rejects_forged_digests() {
    let (state, router, _guard) = proving_grounds().await;

    let tenant = state.tenants.create("Mac Org", helios_domain_models::TenantType::Installer).await.unwrap();
    let (_, admin_token) =
        seed_member(&state, &router, "mac-admin@helios.example", Some((&tenant.id, Role::TenantAdmin))).await;
    let (device_id, device_token) =
        provision_device(&router, &admin_token, &tenant.id, "SN-MAC-1").await;

    // El token acuñado coincide con la derivación canónica.
    assert_eq!(device_token, mint_device_token(TEST_DEVICE_SECRET, &device_id));

    // Digest falsificado: UNAUTHORIZED.
    let forged_token = format!(
        "{device_id}:{}",
        "0".repeat(64)
    );
    let (status, body) = send_request(
        &router,
        Method::POST,
        "/api/ingest/telemetry",
        Some(&forged_token),
        None,
        Some(json!({ "deviceId": device_id, "ts": "2026-02-10T10:00:00Z", "metrics": {} })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    // Cabecera ausente: UNAUTHORIZED.
    let (status, _) =
        send_request(&router, Method::GET, "/api/devices", None, Some(&tenant.id), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// =================================================================
// BARRIDOS: EVALUADOR, NOTIFICACIONES, ROLLUP, CLIMA
// =================================================================

#[tokio::test]
async fn certify_alert_sweep_dedupes_and_suppresses_notifications() {
    let (state, router, _guard) = proving_grounds().await;

    let tenant = state.tenants.create("Sweep Org", helios_domain_models::TenantType::Installer).await.unwrap();
    let (_, admin_token) =
        seed_member(&state, &router, "sweep-admin@helios.example", Some((&tenant.id, Role::TenantAdmin))).await;
    let (device_id, _) = provision_device(&router, &admin_token, &tenant.id, "SN-SWEEP-1").await;

    // La unidad debe ser elegible (ACTIVE) y estar en silencio.
    state
        .devices
        .apply_patch(
            &tenant.id,
            &device_id,
            helios_infra_db::repositories::device::DevicePatch {
                status: Some(helios_domain_models::DeviceStatus::Active),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Regla NO_TELEMETRY con severidad INFO + canales EMAIL y WEBHOOK.
    state
        .alerts
        .create_rule(&tenant.id, "Silence watch", "NO_TELEMETRY", json!({}),
                     helios_domain_models::AlertSeverity::Info, true)
        .await
        .unwrap();
    state
        .notifications
        .create_channel(&tenant.id, helios_domain_models::ChannelType::Email,
                        json!({"to": "ops@helios.example"}), true)
        .await
        .unwrap();
    state
        .notifications
        .create_channel(&tenant.id, helios_domain_models::ChannelType::Webhook,
                        json!({"url": "https://hooks.example/alerts"}), true)
        .await
        .unwrap();

    // Primera pasada: abre exactamente un evento; INFO suprime EMAIL,
    // WEBHOOK recibe. Una sola notificación encolada.
    let first_sweep = alert_evaluator::run_sweep(&state).await.unwrap();
    assert_eq!(first_sweep.events_opened, 1);
    assert_eq!(first_sweep.notifications_enqueued, 1);

    // Segunda pasada sin cambio de estado: idempotente, cero nuevos.
    let second_sweep = alert_evaluator::run_sweep(&state).await.unwrap();
    assert_eq!(second_sweep.events_opened, 0);

    // Drenaje del outbox: la señal WEBHOOK sale SENT.
    let drain = notification_dispatcher::drain_once(&state).await.unwrap();
    assert_eq!(drain.drained, 1);
    assert_eq!(drain.sent, 1);
    assert_eq!(drain.failed, 0);

    // El evento es visible por la API con su clave viva.
    let (status, events) = send_request(
        &router, Method::GET, "/api/alerts?status=OPEN", Some(&admin_token), Some(&tenant.id), None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(events["total"], json!(1));
    assert_eq!(events["events"][0]["dedupeKey"],
        json!(format!("{device_id}:{}", events["events"][0]["ruleId"].as_str().unwrap())));
}

#[tokio::test]
async fn certify_daily_rollup_pass_is_idempotent() {
    let (state, router, _guard) = proving_grounds().await;

    let tenant = state.tenants.create("Roll Org", helios_domain_models::TenantType::Installer).await.unwrap();
    let (_, admin_token) =
        seed_member(&state, &router, "roll-admin@helios.example", Some((&tenant.id, Role::TenantAdmin))).await;
    let (device_id, device_token) =
        provision_device(&router, &admin_token, &tenant.id, "SN-ROLL-1").await;

    state
        .devices
        .apply_patch(
            &tenant.id,
            &device_id,
            helios_infra_db::repositories::device::DevicePatch {
                status: Some(helios_domain_models::DeviceStatus::Active),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Tres lecturas del 10-feb-2026 separadas 10 minutos.
    for (minute, power) in [(0, 1800.0), (10, 1200.0), (20, 600.0)] {
        let (status, _) = send_request(
            &router,
            Method::POST,
            "/api/ingest/telemetry",
            Some(&device_token),
            None,
            Some(json!({
                "deviceId": device_id,
                "ts": format!("2026-02-10T08:{minute:02}:00Z"),
                "metrics": { "powerW": power, "heaterOn": true }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let target_day = chrono::NaiveDate::from_ymd_opt(2026, 2, 10).unwrap();
    let first_pass = analytics_roller::run_for_day(&state, target_day).await.unwrap();
    assert_eq!(first_pass, 1);

    let first_row = state.rollups.find_day(&device_id, target_day).await.unwrap().unwrap();
    // energía = 1.8*(5/60) + 1.2*(10/60) + 0.6*(10/60) = 0.45
    assert_eq!(first_row.energy_kwh, 0.45);
    assert_eq!(first_row.heater_on_minutes, 25);

    // Segunda pasada: misma fila, sin duplicados.
    let second_pass = analytics_roller::run_for_day(&state, target_day).await.unwrap();
    assert_eq!(second_pass, 1);
    let second_row = state.rollups.find_day(&device_id, target_day).await.unwrap().unwrap();
    assert_eq!(first_row.id, second_row.id);
    assert_eq!(first_row.energy_kwh, second_row.energy_kwh);
}

#[tokio::test]
async fn certify_weather_pull_covers_located_sites() {
    let (state, _router, _guard) = proving_grounds().await;

    let tenant = state.tenants.create("Sky Org", helios_domain_models::TenantType::Installer).await.unwrap();
    let located_site = state
        .sites
        .create(helios_infra_db::repositories::site::NewSite {
            tenant_id: tenant.id.clone(),
            name: "Rooftop".into(),
            address_line: None,
            city: None,
            postal_code: None,
            country: None,
            lat: Some(37.975),
            lon: Some(23.735),
            location_lock: false,
        })
        .await
        .unwrap();

    // Sitio sin coordenadas: fuera del barrido.
    state
        .sites
        .create(helios_infra_db::repositories::site::NewSite {
            tenant_id: tenant.id.clone(),
            name: "Unlocated".into(),
            address_line: None,
            city: None,
            postal_code: None,
            country: None,
            lat: None,
            lon: None,
            location_lock: false,
        })
        .await
        .unwrap();

    let pulled = weather_sync::run_once(&state).await.unwrap();
    assert_eq!(pulled, 1);

    let today = Utc::now().date_naive();
    let observation = state.weather.find_observation(&located_site.id, today).await.unwrap();
    assert!(observation.is_some());

    // Repetición idempotente sobre la clave (sitio, fecha).
    let repeated = weather_sync::run_once(&state).await.unwrap();
    assert_eq!(repeated, 1);
}

// =================================================================
// PROPIEDAD END_USER SOBRE UBICACIÓN DE SITIO
// =================================================================

#[tokio::test]
async fn certify_end_user_location_patch_requires_owned_device() {
    let (state, router, _guard) = proving_grounds().await;

    let tenant = state.tenants.create("Own Org", helios_domain_models::TenantType::Installer).await.unwrap();
    let (_, admin_token) =
        seed_member(&state, &router, "own-admin@helios.example", Some((&tenant.id, Role::TenantAdmin))).await;
    let (end_user_id, end_user_token) =
        seed_member(&state, &router, "own-user@helios.example", Some((&tenant.id, Role::EndUser))).await;

    // Dos sitios del tenant; el usuario final solo posee una unidad en el primero.
    let (status, owned_site) = send_request(
        &router,
        Method::POST,
        "/api/sites",
        Some(&admin_token),
        Some(&tenant.id),
        Some(json!({ "name": "Rooftop A" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let owned_site_id = owned_site["id"].as_str().unwrap().to_string();

    let (status, foreign_site) = send_request(
        &router,
        Method::POST,
        "/api/sites",
        Some(&admin_token),
        Some(&tenant.id),
        Some(json!({ "name": "Rooftop B" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let foreign_site_id = foreign_site["id"].as_str().unwrap().to_string();

    let (status, _) = send_request(
        &router,
        Method::POST,
        "/api/devices",
        Some(&admin_token),
        Some(&tenant.id),
        Some(json!({
            "serialNumber": "SN-OWN-9",
            "model": "HELIOS-200L",
            "siteId": owned_site_id,
            "ownerUserId": end_user_id,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let location_patch = json!({
        "lat": 38.01, "lon": 23.79, "source": "MOBILE_GPS", "accuracyM": 15.0
    });

    // Sitio sin unidad propia: FORBIDDEN, la ubicación no se mueve.
    let (status, body) = send_request(
        &router,
        Method::PATCH,
        &format!("/api/sites/{foreign_site_id}/location"),
        Some(&end_user_token),
        Some(&tenant.id),
        Some(location_patch.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let (_, untouched) = send_request(
        &router,
        Method::GET,
        &format!("/api/sites/{foreign_site_id}"),
        Some(&admin_token),
        Some(&tenant.id),
        None,
    )
    .await;
    assert_eq!(untouched["lat"], json!(null));

    // Sitio con unidad propia: el parche procede y queda con procedencia.
    let (status, patched) = send_request(
        &router,
        Method::PATCH,
        &format!("/api/sites/{owned_site_id}/location"),
        Some(&end_user_token),
        Some(&tenant.id),
        Some(location_patch),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "owner patch failed: {patched}");
    assert_eq!(patched["lat"], json!(38.01));
    assert_eq!(patched["lon"], json!(23.79));
    assert_eq!(patched["locationSource"], "MOBILE_GPS");
    assert_eq!(patched["locationUpdatedByUserId"], json!(end_user_id));
}
