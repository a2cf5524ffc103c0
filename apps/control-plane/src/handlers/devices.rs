// [apps/control-plane/src/handlers/devices.rs]
/*!
 * =================================================================
 * APARATO: DEVICE INVENTORY HANDLERS (V4.3 - FLEET GATEWAY)
 * CLASIFICACIÓN: API ADAPTER (ESTRATO L3-API)
 * RESPONSABILIDAD: ALTA (CON TOKEN MAC), ALTA MASIVA CSV, INVENTARIO,
 *                  GEMELO, MAPA, ROLLUPS Y ROTACIÓN DE CREDENCIAL
 * =================================================================
 */

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::NaiveDate;
use helios_domain_models::{audit::actions, ActorType, DeviceStatus, Role};
use helios_infra_db::repositories::device::{DeviceListFilter, DevicePatch, NewDevice};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::errors::ApiError;
use crate::extractors::{TenantScope, ValidatedJson};
use crate::security::{derive_device_digest, mint_device_token};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDevicePayload {
    pub serial_number: String,
    pub model: String,
    pub name: Option<String>,
    pub site_id: Option<String>,
    pub owner_user_id: Option<String>,
    pub notes: Option<String>,
    pub tags: Option<serde_json::Value>,
    pub sim_iccid: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceListQuery {
    pub status: Option<String>,
    pub site_id: Option<String>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePatchPayload {
    pub name: Option<String>,
    pub notes: Option<String>,
    /// Presente con null = desvincular; ausente = sin cambio.
    #[serde(default, with = "serde_double_option")]
    pub site_id: Option<Option<String>>,
    #[serde(default, with = "serde_double_option")]
    pub owner_user_id: Option<Option<String>>,
    pub status: Option<DeviceStatus>,
    pub tags: Option<serde_json::Value>,
}

/// Distingue "campo ausente" de "campo presente con null" en parches.
mod serde_double_option {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer).map(Some)
    }
}

#[derive(Debug, Deserialize)]
pub struct MapQuery {
    pub bbox: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RollupRangeQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

fn provisioning_roles() -> [Role; 2] {
    [Role::TenantAdmin, Role::Installer]
}

/// POST /api/devices — responde {device, deviceToken}.
#[instrument(skip(application_state, scope, payload), fields(serial = %payload.serial_number))]
pub async fn handle_create_device(
    State(application_state): State<AppState>,
    scope: TenantScope,
    ValidatedJson(payload): ValidatedJson<CreateDevicePayload>,
) -> Result<impl IntoResponse, ApiError> {
    scope.require_role(&provisioning_roles())?;
    let tenant_id = scope.require_tenant()?.to_string();

    if payload.serial_number.trim().is_empty() || payload.model.trim().is_empty() {
        return Err(ApiError::validation("serialNumber and model are required"));
    }

    // El sitio, si viene, debe vivir en el mismo tenant.
    if let Some(site_id) = &payload.site_id {
        application_state
            .sites
            .find_by_id_in_tenant(&tenant_id, site_id)
            .await?
            .ok_or(ApiError::NotFound)?;
    }

    // El id se acuña aquí para que el digest MAC quede sellado en la
    // misma transacción que la fila de la unidad.
    let device_id = uuid::Uuid::new_v4().to_string();
    let device_digest =
        derive_device_digest(&application_state.config.device_hmac_secret, &device_id);
    let device_token = mint_device_token(&application_state.config.device_hmac_secret, &device_id);

    let new_device = NewDevice {
        id: device_id,
        tenant_id: tenant_id.clone(),
        serial_number: payload.serial_number.trim().to_string(),
        model: payload.model,
        name: payload.name,
        site_id: payload.site_id,
        owner_user_id: payload.owner_user_id,
        notes: payload.notes,
        tags: payload.tags.unwrap_or_else(|| json!({})),
        sim_iccid: payload.sim_iccid,
    };

    let device = application_state
        .devices
        .create_with_secret(new_device, &device_digest)
        .await?;

    application_state
        .audit_best_effort(
            Some(&tenant_id),
            Some(&scope.user.user_id),
            ActorType::User,
            actions::DEVICE_CREATED,
            "device",
            &device.id,
            json!({ "serialNumber": device.serial_number, "model": device.model }),
        )
        .await;

    Ok((StatusCode::CREATED, Json(json!({ "device": device, "deviceToken": device_token }))))
}

/// POST /api/devices/bulk — cuerpo text/csv con cabecera
/// serialNumber,model,name,siteId,ownerUserId. Resultados por fila.
#[instrument(skip(application_state, scope, csv_body))]
pub async fn handle_bulk_create_devices(
    State(application_state): State<AppState>,
    scope: TenantScope,
    csv_body: String,
) -> Result<impl IntoResponse, ApiError> {
    scope.require_role(&[Role::TenantAdmin])?;
    let tenant_id = scope.require_tenant()?.to_string();

    if csv_body.trim().is_empty() {
        return Err(ApiError::validation("missing CSV upload"));
    }

    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(csv_body.as_bytes());

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct BulkRow {
        serial_number: String,
        model: String,
        name: Option<String>,
        site_id: Option<String>,
        owner_user_id: Option<String>,
    }

    let mut row_results = Vec::new();

    for (row_index, parsed_row) in csv_reader.deserialize::<BulkRow>().enumerate() {
        let row_number = row_index + 1;
        let row = match parsed_row {
            Ok(row) => row,
            Err(parse_fault) => {
                row_results.push(json!({
                    "row": row_number,
                    "ok": false,
                    "error": format!("CSV_ROW_MALFORMED: {parse_fault}"),
                }));
                continue;
            }
        };

        if row.serial_number.is_empty() || row.model.is_empty() {
            row_results.push(json!({
                "row": row_number,
                "ok": false,
                "error": "serialNumber and model are required",
            }));
            continue;
        }

        let device_id = uuid::Uuid::new_v4().to_string();
        let device_digest =
            derive_device_digest(&application_state.config.device_hmac_secret, &device_id);
        let device_token =
            mint_device_token(&application_state.config.device_hmac_secret, &device_id);

        let creation = application_state
            .devices
            .create_with_secret(
                NewDevice {
                    id: device_id,
                    tenant_id: tenant_id.clone(),
                    serial_number: row.serial_number.clone(),
                    model: row.model,
                    name: row.name,
                    site_id: row.site_id.filter(|s| !s.is_empty()),
                    owner_user_id: row.owner_user_id.filter(|s| !s.is_empty()),
                    notes: None,
                    tags: json!({}),
                    sim_iccid: None,
                },
                &device_digest,
            )
            .await;

        match creation {
            Ok(device) => {
                row_results.push(json!({
                    "row": row_number,
                    "ok": true,
                    "deviceId": device.id,
                    "deviceToken": device_token,
                }));
            }
            Err(creation_fault) => {
                let api_fault: ApiError = creation_fault.into();
                row_results.push(json!({
                    "row": row_number,
                    "ok": false,
                    "error": api_fault.to_string(),
                }));
            }
        }
    }

    Ok((StatusCode::CREATED, Json(json!({ "results": row_results }))))
}

/// GET /api/devices — inventario con filtros y total.
#[instrument(skip(application_state, scope, query))]
pub async fn handle_list_devices(
    State(application_state): State<AppState>,
    scope: TenantScope,
    Query(query): Query<DeviceListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = scope.require_tenant()?;

    let status = match query.status.as_deref() {
        Some(raw) => Some(
            DeviceStatus::parse(raw)
                .ok_or_else(|| ApiError::validation(format!("unknown device status '{raw}'")))?,
        ),
        None => None,
    };

    let (devices, total) = application_state
        .devices
        .list_by_tenant(
            tenant_id,
            &DeviceListFilter {
                status,
                site_id: query.site_id,
                search: query.search,
                limit: query.limit.unwrap_or(50).clamp(1, 500),
                offset: query.offset.unwrap_or(0).max(0),
            },
        )
        .await?;

    Ok(Json(json!({ "devices": devices, "total": total })))
}

/// PATCH /api/devices/:deviceId
#[instrument(skip(application_state, scope, payload))]
pub async fn handle_patch_device(
    State(application_state): State<AppState>,
    scope: TenantScope,
    Path(device_id): Path<String>,
    ValidatedJson(payload): ValidatedJson<DevicePatchPayload>,
) -> Result<impl IntoResponse, ApiError> {
    scope.require_role(&provisioning_roles())?;
    let tenant_id = scope.require_tenant()?.to_string();

    if let Some(Some(site_id)) = &payload.site_id {
        application_state
            .sites
            .find_by_id_in_tenant(&tenant_id, site_id)
            .await?
            .ok_or(ApiError::NotFound)?;
    }

    let device = application_state
        .devices
        .apply_patch(
            &tenant_id,
            &device_id,
            DevicePatch {
                name: payload.name,
                notes: payload.notes,
                site_id: payload.site_id,
                owner_user_id: payload.owner_user_id,
                status: payload.status,
                tags: payload.tags,
            },
        )
        .await?;

    application_state
        .audit_best_effort(
            Some(&tenant_id),
            Some(&scope.user.user_id),
            ActorType::User,
            actions::DEVICE_UPDATED,
            "device",
            &device.id,
            json!({ "status": device.status }),
        )
        .await;

    Ok(Json(device))
}

/// GET /api/devices/:deviceId/twin
#[instrument(skip(application_state, scope))]
pub async fn handle_get_twin(
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

    let twin = application_state
        .telemetry
        .find_twin(&device_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(twin))
}

/// POST /api/devices/:deviceId/rotate-token — re-ancla el digest tras
/// una rotación del secreto de despliegue.
#[instrument(skip(application_state, scope))]
pub async fn handle_rotate_device_token(
    State(application_state): State<AppState>,
    scope: TenantScope,
    Path(device_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    scope.require_role(&provisioning_roles())?;
    let tenant_id = scope.require_tenant()?.to_string();

    application_state
        .devices
        .find_by_id_in_tenant(&tenant_id, &device_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let device_digest =
        derive_device_digest(&application_state.config.device_hmac_secret, &device_id);
    let device_token = mint_device_token(&application_state.config.device_hmac_secret, &device_id);
    application_state.devices.repin_mac_digest(&device_id, &device_digest).await?;

    application_state
        .audit_best_effort(
            Some(&tenant_id),
            Some(&scope.user.user_id),
            ActorType::User,
            actions::DEVICE_TOKEN_ROTATED,
            "device",
            &device_id,
            json!({}),
        )
        .await;

    Ok(Json(json!({ "deviceId": device_id, "deviceToken": device_token })))
}

/// GET /api/map/devices?bbox=minLon,minLat,maxLon,maxLat
#[instrument(skip(application_state, scope, query))]
pub async fn handle_map_devices(
    State(application_state): State<AppState>,
    scope: TenantScope,
    Query(query): Query<MapQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = scope.require_tenant()?;

    let raw_bbox = query
        .bbox
        .as_deref()
        .ok_or_else(|| ApiError::validation("bbox query parameter is required"))?;

    let bbox_parts: Vec<f64> = raw_bbox
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| ApiError::validation("bbox must be minLon,minLat,maxLon,maxLat"))?;

    let &[min_lon, min_lat, max_lon, max_lat] = bbox_parts.as_slice() else {
        return Err(ApiError::validation("bbox must carry exactly four numbers"));
    };
    if min_lon > max_lon || min_lat > max_lat {
        return Err(ApiError::validation("bbox minima must not exceed maxima"));
    }

    let devices = application_state
        .devices
        .list_in_bbox(tenant_id, min_lon, min_lat, max_lon, max_lat)
        .await?;

    let markers: Vec<serde_json::Value> = devices
        .iter()
        .map(|device| {
            json!({
                "deviceId": device.id,
                "name": device.name,
                "serialNumber": device.serial_number,
                "lat": device.reported_lat,
                "lon": device.reported_lon,
                "status": device.status,
                "lastSeenAt": device.last_seen_at,
            })
        })
        .collect();

    Ok(Json(json!({ "markers": markers })))
}

/// GET /api/devices/:deviceId/rollups?from=YYYY-MM-DD&to=YYYY-MM-DD
#[instrument(skip(application_state, scope, query))]
pub async fn handle_list_device_rollups(
    State(application_state): State<AppState>,
    scope: TenantScope,
    Path(device_id): Path<String>,
    Query(query): Query<RollupRangeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = scope.require_tenant()?;

    application_state
        .devices
        .find_by_id_in_tenant(tenant_id, &device_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let parse_bound = |raw: Option<&str>, fallback_days_ago: i64| -> Result<NaiveDate, ApiError> {
        match raw {
            Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map_err(|_| ApiError::validation("dates must be YYYY-MM-DD")),
            None => Ok((chrono::Utc::now() - chrono::Duration::days(fallback_days_ago))
                .date_naive()),
        }
    };

    let from = parse_bound(query.from.as_deref(), 30)?;
    let to = parse_bound(query.to.as_deref(), 0)?;

    let rollups = application_state
        .rollups
        .list_for_device_between(&device_id, from, to)
        .await?;

    Ok(Json(rollups))
}
