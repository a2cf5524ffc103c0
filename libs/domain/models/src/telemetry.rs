// [libs/domain/models/src/telemetry.rs]
/*!
 * =================================================================
 * APARATO: TELEMETRY CONTRACTS & PLAUSIBILITY TABLE (V3.0)
 * CLASIFICACIÓN: DOMAIN ENTITY (ESTRATO L2)
 * RESPONSABILIDAD: LECTURAS PUNTUALES, MÉTRICAS LIBRES Y VALIDACIÓN DE RANGO
 *
 * # Logic:
 * Las métricas son bolsas sin esquema (número | booleano | texto).
 * Las claves numéricas distinguidas se contrastan contra la tabla de
 * plausibilidad fija; los valores fuera de rango generan advertencias
 * NO fatales que acompañan la respuesta de ingesta.
 * =================================================================
 */

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::site::LocationSource;

/// Tabla fija de plausibilidad física: (métrica, mínimo, máximo).
pub const METRIC_PLAUSIBILITY_TABLE: &[(&str, f64, f64)] = &[
    ("tankTempC", -10.0, 120.0),
    ("ambientTempC", -50.0, 70.0),
    ("humidityPct", 0.0, 100.0),
    ("lux", 0.0, 200_000.0),
    ("flowLpm", 0.0, 50.0),
    ("powerW", 0.0, 10_000.0),
    ("batteryPct", 0.0, 100.0),
    ("rssiDbm", -130.0, 0.0),
];

/// Valor de métrica sin esquema: variante etiquetada sobre los tres
/// escalares que el protocolo de dispositivo transporta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Flag(bool),
    Number(f64),
    Text(String),
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Flag(value) => Some(*value),
            _ => None,
        }
    }
}

/// Fijación geográfica reportada por el propio dispositivo.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoFix {
    pub lat: f64,
    pub lon: f64,
    pub source: LocationSource,
    pub accuracy_m: Option<f64>,
}

/**
 * Lectura puntual de un dispositivo: el 'ts' lo aporta el emisor y es
 * la autoridad temporal; el orden de recepción NO ordena la serie.
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryReading {
    pub id: String,
    pub device_id: String,
    pub ts: DateTime<Utc>,
    pub metrics: BTreeMap<String, MetricValue>,
    pub geo: Option<GeoFix>,
    pub created_at: DateTime<Utc>,
}

/**
 * Contrasta las métricas numéricas contra la tabla de plausibilidad.
 * Devuelve una advertencia por cada valor fuera de [min, max]; las
 * claves desconocidas se dejan intactas y sin opinión.
 */
pub fn validate_metric_ranges(metrics: &BTreeMap<String, MetricValue>) -> Vec<String> {
    let mut range_warnings = Vec::new();

    for (metric_name, lower_bound, upper_bound) in METRIC_PLAUSIBILITY_TABLE {
        if let Some(reported_value) = metrics.get(*metric_name).and_then(MetricValue::as_f64) {
            if reported_value < *lower_bound || reported_value > *upper_bound {
                range_warnings.push(format!(
                    "{metric_name}={reported_value} outside plausible range [{lower_bound}, {upper_bound}]"
                ));
            }
        }
    }

    range_warnings
}
