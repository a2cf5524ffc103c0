// [libs/domain/models/src/device.rs]
/*!
 * =================================================================
 * APARATO: DEVICE & TWIN CONTRACTS (V4.2 - SHADOW DERIVATION)
 * CLASIFICACIÓN: DOMAIN ENTITY (ESTRATO L2)
 * RESPONSABILIDAD: UNIDAD GESTIONADA, SOMBRA DERIVADA Y SALUD DE SILICIO
 *
 * # Logic:
 * El gemelo (DeviceTwin) refleja SIEMPRE la última telemetría escrita.
 * La derivación superpone espejos 'last_<métrica>' sobre el estado
 * previo, actualiza los campos distinguidos cuando la lectura los trae
 * y recalcula 'healthScore' exclusivamente con la lectura entrante.
 * =================================================================
 */

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::site::LocationSource;
use crate::telemetry::{GeoFix, MetricValue};

/// Ciclo de vida operativo de una unidad de la flota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceStatus {
    Provisioned,
    Installed,
    Active,
    Suspended,
    Retired,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provisioned => "PROVISIONED",
            Self::Installed => "INSTALLED",
            Self::Active => "ACTIVE",
            Self::Suspended => "SUSPENDED",
            Self::Retired => "RETIRED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PROVISIONED" => Some(Self::Provisioned),
            "INSTALLED" => Some(Self::Installed),
            "ACTIVE" => Some(Self::Active),
            "SUSPENDED" => Some(Self::Suspended),
            "RETIRED" => Some(Self::Retired),
            _ => None,
        }
    }

    /// Estados sobre los que barren el evaluador de alertas y el rodillo analítico.
    pub fn is_alert_eligible(&self) -> bool {
        matches!(self, Self::Active | Self::Installed)
    }
}

/**
 * Unidad gestionada bajo un tenant, opcionalmente ligada a un sitio
 * y a un usuario propietario. El serial es único dentro del tenant.
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub tenant_id: String,
    pub site_id: Option<String>,
    pub owner_user_id: Option<String>,
    pub serial_number: String,
    pub model: String,
    pub name: Option<String>,
    pub notes: Option<String>,
    /// Mapa de etiquetas de forma libre persistido como JSON.
    pub tags: serde_json::Value,
    pub status: DeviceStatus,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub firmware_version: Option<String>,
    pub sim_iccid: Option<String>,
    pub reported_lat: Option<f64>,
    pub reported_lon: Option<f64>,
    pub reported_location_source: Option<LocationSource>,
    pub reported_location_accuracy_m: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Sombra por dispositivo: última marca temporal y estado derivado.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceTwin {
    pub device_id: String,
    pub last_ts: DateTime<Utc>,
    pub derived_state: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/**
 * Puntuación de salud de la lectura entrante. Parte de 100 y descuenta:
 * 20 si rssiDbm < -100, 30 si batteryPct < 20, 20 si tankTempC > 85.
 * Piso en 0.
 */
pub fn compute_health_score(metrics: &BTreeMap<String, MetricValue>) -> i64 {
    let mut health_score: i64 = 100;

    if metrics.get("rssiDbm").and_then(MetricValue::as_f64).is_some_and(|v| v < -100.0) {
        health_score -= 20;
    }
    if metrics.get("batteryPct").and_then(MetricValue::as_f64).is_some_and(|v| v < 20.0) {
        health_score -= 30;
    }
    if metrics.get("tankTempC").and_then(MetricValue::as_f64).is_some_and(|v| v > 85.0) {
        health_score -= 20;
    }

    health_score.max(0)
}

/**
 * Recalcula el mapa de estado derivado del gemelo a partir del estado
 * previo y de la lectura entrante (métricas + geo opcional).
 */
pub fn recompute_derived_state(
    prior_state: Option<&Value>,
    metrics: &BTreeMap<String, MetricValue>,
    geo: Option<&GeoFix>,
) -> Value {
    let mut derived_state: Map<String, Value> = prior_state
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    // 1. ESPEJOS: cada métrica entrante k=v se copia como last_k=v.
    for (metric_name, metric_value) in metrics {
        let mirrored_value = serde_json::to_value(metric_value).unwrap_or(Value::Null);
        derived_state.insert(format!("last_{metric_name}"), mirrored_value);
    }

    // 2. CAMPOS DISTINGUIDOS: se actualizan solo si la lectura los trae;
    //    en ausencia, el valor previo persiste por la clonación inicial.
    let distinguished_numeric_fields = [
        ("tankTempC", "lastTankTempC"),
        ("ambientTempC", "lastAmbientTempC"),
        ("powerW", "lastPowerW"),
        ("rssiDbm", "lastRssi"),
    ];
    for (metric_name, derived_field) in distinguished_numeric_fields {
        if let Some(value) = metrics.get(metric_name).and_then(MetricValue::as_f64) {
            derived_state.insert(derived_field.to_string(), json!(value));
        }
    }
    if let Some(heater_flag) = metrics.get("heaterOn").and_then(MetricValue::as_bool) {
        derived_state.insert("heaterOn".to_string(), json!(heater_flag));
    }

    // 3. VITALIDAD Y SALUD
    derived_state.insert("isOnline".to_string(), json!(true));
    derived_state.insert("healthScore".to_string(), json!(compute_health_score(metrics)));

    // 4. RASTRO GEOGRÁFICO DE LA LECTURA
    if let Some(geo_fix) = geo {
        derived_state.insert("lastGeoLat".to_string(), json!(geo_fix.lat));
        derived_state.insert("lastGeoLon".to_string(), json!(geo_fix.lon));
        derived_state.insert("lastGeoSource".to_string(), json!(geo_fix.source.as_str()));
    }

    Value::Object(derived_state)
}
