// [apps/control-plane/src/handlers/telemetry.rs]
/*!
 * =================================================================
 * APARATO: TELEMETRY INGEST HANDLER (V5.1 - DEVICE GATEWAY)
 * CLASIFICACIÓN: API ADAPTER (ESTRATO L3-API)
 * RESPONSABILIDAD: VALIDACIÓN DE INGESTA Y DELEGACIÓN TRANSACCIONAL
 *
 * # Logic:
 * El deviceId del cuerpo DEBE calzar con la identidad sellada en el
 * token MAC (VALIDATION_ERROR en disonancia). Las métricas fuera de la
 * tabla de plausibilidad generan advertencias no fatales que viajan
 * junto al 201.
 * =================================================================
 */

use std::collections::BTreeMap;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use helios_domain_models::telemetry::validate_metric_ranges;
use helios_domain_models::{GeoFix, MetricValue};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::errors::ApiError;
use crate::extractors::{DeviceIdentity, ValidatedJson};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestPayload {
    pub device_id: String,
    pub ts: DateTime<Utc>,
    pub metrics: BTreeMap<String, MetricValue>,
    pub geo: Option<GeoFix>,
}

/// POST /api/ingest/telemetry (autenticación de dispositivo)
#[instrument(skip(application_state, identity, payload), fields(device = %identity.device_id))]
pub async fn handle_ingest_telemetry(
    State(application_state): State<AppState>,
    identity: DeviceIdentity,
    ValidatedJson(payload): ValidatedJson<IngestPayload>,
) -> Result<impl IntoResponse, ApiError> {
    // 1. PARIDAD DE IDENTIDAD: cuerpo vs token sellado.
    if payload.device_id != identity.device_id {
        return Err(ApiError::validation("payload deviceId does not match token identity"));
    }

    // 2. EXISTENCIA DE LA UNIDAD.
    let device = application_state
        .devices
        .find_by_id(&identity.device_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    // 3. PLAUSIBILIDAD: advertencias no fatales.
    let warnings = validate_metric_ranges(&payload.metrics);

    // 4. ABANICO TRANSACCIONAL (fila + last_seen + gemelo + sitio).
    let outcome = application_state
        .telemetry
        .ingest_reading(&device, payload.ts, &payload.metrics, payload.geo.as_ref())
        .await?;

    let mut response_body = json!({ "id": outcome.telemetry_id });
    if !warnings.is_empty() {
        response_body["warnings"] = json!(warnings);
    }

    Ok((StatusCode::CREATED, Json(response_body)))
}
