// [libs/domain/models/src/alert.rs]
/*!
 * =================================================================
 * APARATO: ALERT RULES & PREDICATE ENGINE (V5.1 - DEDUPE SEALED)
 * CLASIFICACIÓN: DOMAIN POLICY (ESTRATO L2)
 * RESPONSABILIDAD: REGLAS CERRADAS, PREDICADOS PUROS Y CLAVE DE DEDUPE
 *
 * # Logic:
 * Los cuatro predicados forman un conjunto cerrado modelado como
 * variante etiquetada. Cada variante aporta únicamente
 * 'should_fire(contexto) -> Option<detalles>'; la consulta de la clave
 * de deduplicación vive centralizada en el evaluador.
 * =================================================================
 */

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::device::{Device, DeviceTwin};
use crate::telemetry::{MetricValue, TelemetryReading};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "INFO" => Some(Self::Info),
            "WARNING" => Some(Self::Warning),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertEventStatus {
    Open,
    Acknowledged,
    Closed,
}

impl AlertEventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Acknowledged => "ACKNOWLEDGED",
            Self::Closed => "CLOSED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "OPEN" => Some(Self::Open),
            "ACKNOWLEDGED" => Some(Self::Acknowledged),
            "CLOSED" => Some(Self::Closed),
            _ => None,
        }
    }
}

/// Regla de alerta con alcance de tenant; los parámetros viven como JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub enabled: bool,
    pub rule_type: String,
    pub params: Value,
    pub severity: AlertSeverity,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Instancia abierta por el evaluador, con clave de dedupe única.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    pub id: String,
    pub tenant_id: String,
    pub device_id: String,
    pub rule_id: String,
    pub severity: AlertSeverity,
    pub status: AlertEventStatus,
    pub dedupe_key: Option<String>,
    pub details: Value,
    pub opened_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Clave de deduplicación por par (dispositivo, regla).
pub fn dedupe_key_for(device_id: &str, rule_id: &str) -> String {
    format!("{device_id}:{rule_id}")
}

/// Umbrales por defecto de despliegue para los parámetros omitidos.
#[derive(Debug, Clone, Copy)]
pub struct RuleDefaults {
    pub no_telemetry_threshold_minutes: i64,
    pub over_temp_threshold_c: f64,
    pub sensor_out_of_range_repeat_count: usize,
}

impl Default for RuleDefaults {
    fn default() -> Self {
        Self {
            no_telemetry_threshold_minutes: 30,
            over_temp_threshold_c: 85.0,
            sensor_out_of_range_repeat_count: 3,
        }
    }
}

/// Contexto inmutable que el evaluador entrega a cada predicado.
/// 'recent_readings' llega ordenado por 'ts' DESCENDENTE (la más nueva primero).
pub struct RuleEvaluationContext<'a> {
    pub now: DateTime<Utc>,
    pub device: &'a Device,
    pub twin: Option<&'a DeviceTwin>,
    pub recent_readings: &'a [TelemetryReading],
}

/// Conjunto cerrado de predicados de alerta con parámetros tipados.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertRuleKind {
    NoTelemetry { threshold_minutes: i64 },
    OverTemp { threshold_c: f64 },
    PossibleLeak { lookback_minutes: i64 },
    SensorOutOfRange { metric: String, min: f64, max: f64, repeat_count: usize },
}

impl AlertRuleKind {
    /**
     * Interpreta (tipo, params) de una regla persistida, completando los
     * parámetros omitidos con los defaults del despliegue.
     */
    pub fn from_rule(rule_type: &str, params: &Value, defaults: &RuleDefaults) -> Option<Self> {
        match rule_type {
            "NO_TELEMETRY" => Some(Self::NoTelemetry {
                threshold_minutes: params
                    .get("thresholdMinutes")
                    .and_then(Value::as_i64)
                    .unwrap_or(defaults.no_telemetry_threshold_minutes),
            }),
            "OVER_TEMP" => Some(Self::OverTemp {
                threshold_c: params
                    .get("thresholdC")
                    .and_then(Value::as_f64)
                    .unwrap_or(defaults.over_temp_threshold_c),
            }),
            "POSSIBLE_LEAK" => Some(Self::PossibleLeak {
                lookback_minutes: params.get("lookbackMinutes").and_then(Value::as_i64).unwrap_or(60),
            }),
            "SENSOR_OUT_OF_RANGE" => Some(Self::SensorOutOfRange {
                metric: params
                    .get("metric")
                    .and_then(Value::as_str)
                    .unwrap_or("tankTempC")
                    .to_string(),
                min: params.get("min").and_then(Value::as_f64).unwrap_or(-10.0),
                max: params.get("max").and_then(Value::as_f64).unwrap_or(120.0),
                repeat_count: params
                    .get("repeatCount")
                    .and_then(Value::as_u64)
                    .map(|count| count as usize)
                    .unwrap_or(defaults.sensor_out_of_range_repeat_count),
            }),
            _ => None,
        }
    }

    /**
     * Evalúa el predicado sobre el contexto. Devuelve el mapa de detalles
     * del evento cuando la condición dispara; None en caso contrario.
     */
    pub fn should_fire(&self, ctx: &RuleEvaluationContext<'_>) -> Option<Value> {
        match self {
            Self::NoTelemetry { threshold_minutes } => {
                let silence_horizon = ctx.now - Duration::minutes(*threshold_minutes);
                let is_silent = match ctx.device.last_seen_at {
                    None => true,
                    Some(last_seen_at) => last_seen_at < silence_horizon,
                };
                is_silent.then(|| {
                    json!({
                        "thresholdMinutes": threshold_minutes,
                        "lastSeenAt": ctx.device.last_seen_at.map(|ts| ts.to_rfc3339()),
                    })
                })
            }

            Self::OverTemp { threshold_c } => {
                let last_tank_temp = ctx
                    .twin
                    .and_then(|twin| twin.derived_state.get("lastTankTempC"))
                    .and_then(Value::as_f64)?;
                // Comparación estricta: el umbral exacto NO dispara.
                (last_tank_temp > *threshold_c).then(|| {
                    json!({ "thresholdC": threshold_c, "lastTankTempC": last_tank_temp })
                })
            }

            Self::PossibleLeak { lookback_minutes } => {
                let window_start = ctx.now - Duration::minutes(*lookback_minutes);
                let window_readings: Vec<&TelemetryReading> = ctx
                    .recent_readings
                    .iter()
                    .filter(|reading| reading.ts >= window_start)
                    .take(10)
                    .collect();

                let continuous_flow = window_readings.len() >= 5
                    && window_readings.iter().all(|reading| {
                        reading
                            .metrics
                            .get("flowLpm")
                            .and_then(MetricValue::as_f64)
                            .is_some_and(|flow| flow > 0.1)
                    });

                continuous_flow.then(|| {
                    json!({
                        "lookbackMinutes": lookback_minutes,
                        "samples": window_readings.len(),
                    })
                })
            }

            Self::SensorOutOfRange { metric, min, max, repeat_count } => {
                let latest_samples: Vec<&TelemetryReading> =
                    ctx.recent_readings.iter().take(*repeat_count).collect();

                if latest_samples.len() < *repeat_count {
                    return None;
                }

                // Todas las muestras deben estar definidas y ESTRICTAMENTE
                // fuera de [min, max]; el borde exacto cuenta como en rango.
                let all_implausible = latest_samples.iter().all(|reading| {
                    reading
                        .metrics
                        .get(metric)
                        .and_then(MetricValue::as_f64)
                        .is_some_and(|value| value < *min || value > *max)
                });

                all_implausible.then(|| {
                    json!({
                        "metric": metric,
                        "min": min,
                        "max": max,
                        "repeatCount": repeat_count,
                    })
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceStatus;
    use std::collections::BTreeMap;

    fn device_fixture(last_seen_at: Option<DateTime<Utc>>) -> Device {
        Device {
            id: "dev-1".into(),
            tenant_id: "tn-1".into(),
            site_id: None,
            owner_user_id: None,
            serial_number: "SN-001".into(),
            model: "HELIOS-200L".into(),
            name: None,
            notes: None,
            tags: json!({}),
            status: DeviceStatus::Active,
            last_seen_at,
            firmware_version: None,
            sim_iccid: None,
            reported_lat: None,
            reported_lon: None,
            reported_location_source: None,
            reported_location_accuracy_m: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn twin_fixture(derived_state: Value) -> DeviceTwin {
        DeviceTwin {
            device_id: "dev-1".into(),
            last_ts: Utc::now(),
            derived_state,
            updated_at: Utc::now(),
        }
    }

    fn reading_at(minutes_ago: i64, metrics: &[(&str, f64)]) -> TelemetryReading {
        let metric_map: BTreeMap<String, MetricValue> = metrics
            .iter()
            .map(|(name, value)| (name.to_string(), MetricValue::Number(*value)))
            .collect();
        TelemetryReading {
            id: format!("tel-{minutes_ago}"),
            device_id: "dev-1".into(),
            ts: Utc::now() - Duration::minutes(minutes_ago),
            metrics: metric_map,
            geo: None,
            created_at: Utc::now(),
        }
    }

    fn ctx<'a>(
        device: &'a Device,
        twin: Option<&'a DeviceTwin>,
        readings: &'a [TelemetryReading],
    ) -> RuleEvaluationContext<'a> {
        RuleEvaluationContext { now: Utc::now(), device, twin, recent_readings: readings }
    }

    #[test]
    fn certify_no_telemetry_fires_on_silence_and_on_never_seen() {
        let kind = AlertRuleKind::NoTelemetry { threshold_minutes: 30 };

        let never_seen = device_fixture(None);
        assert!(kind.should_fire(&ctx(&never_seen, None, &[])).is_some());

        let stale = device_fixture(Some(Utc::now() - Duration::minutes(45)));
        assert!(kind.should_fire(&ctx(&stale, None, &[])).is_some());

        let fresh = device_fixture(Some(Utc::now() - Duration::minutes(5)));
        assert!(kind.should_fire(&ctx(&fresh, None, &[])).is_none());
    }

    #[test]
    fn certify_over_temp_threshold_is_strict() {
        let kind = AlertRuleKind::OverTemp { threshold_c: 85.0 };
        let device = device_fixture(Some(Utc::now()));

        let at_threshold = twin_fixture(json!({ "lastTankTempC": 85.0 }));
        assert!(kind.should_fire(&ctx(&device, Some(&at_threshold), &[])).is_none());

        let above_threshold = twin_fixture(json!({ "lastTankTempC": 85.1 }));
        let details = kind.should_fire(&ctx(&device, Some(&above_threshold), &[])).unwrap();
        assert_eq!(details["lastTankTempC"], json!(85.1));

        let undefined = twin_fixture(json!({}));
        assert!(kind.should_fire(&ctx(&device, Some(&undefined), &[])).is_none());
        assert!(kind.should_fire(&ctx(&device, None, &[])).is_none());
    }

    #[test]
    fn certify_possible_leak_requires_five_continuous_samples() {
        let kind = AlertRuleKind::PossibleLeak { lookback_minutes: 60 };
        let device = device_fixture(Some(Utc::now()));

        // Cuatro muestras con flujo: insuficiente.
        let four: Vec<TelemetryReading> =
            (0..4).map(|i| reading_at(i * 10, &[("flowLpm", 1.2)])).collect();
        assert!(kind.should_fire(&ctx(&device, None, &four)).is_none());

        // Cinco muestras, todas con flujo > 0.1: dispara.
        let five: Vec<TelemetryReading> =
            (0..5).map(|i| reading_at(i * 10, &[("flowLpm", 0.4)])).collect();
        assert!(kind.should_fire(&ctx(&device, None, &five)).is_some());

        // Una muestra sin flujo rompe la continuidad.
        let mut broken = five.clone();
        broken[2] = reading_at(20, &[("flowLpm", 0.0)]);
        assert!(kind.should_fire(&ctx(&device, None, &broken)).is_none());

        // Muestras fuera de la ventana no cuentan.
        let outside: Vec<TelemetryReading> =
            (0..5).map(|i| reading_at(70 + i * 10, &[("flowLpm", 1.2)])).collect();
        assert!(kind.should_fire(&ctx(&device, None, &outside)).is_none());
    }

    #[test]
    fn certify_sensor_out_of_range_bounds_are_inclusive() {
        let kind = AlertRuleKind::SensorOutOfRange {
            metric: "tankTempC".into(),
            min: -10.0,
            max: 120.0,
            repeat_count: 3,
        };
        let device = device_fixture(Some(Utc::now()));

        // Tres lecturas estrictamente fuera de rango: dispara.
        let implausible: Vec<TelemetryReading> =
            (0..3).map(|i| reading_at(i, &[("tankTempC", 130.0)])).collect();
        assert!(kind.should_fire(&ctx(&device, None, &implausible)).is_some());

        // El borde exacto (max) cuenta como EN rango: no dispara.
        let mut boundary = implausible.clone();
        boundary[1] = reading_at(1, &[("tankTempC", 120.0)]);
        assert!(kind.should_fire(&ctx(&device, None, &boundary)).is_none());

        // Con menos lecturas que repeatCount no hay veredicto.
        assert!(kind.should_fire(&ctx(&device, None, &implausible[..2])).is_none());

        // Una lectura sin la métrica definida bloquea el disparo.
        let mut undefined = implausible;
        undefined[0] = reading_at(0, &[("ambientTempC", 25.0)]);
        assert!(kind.should_fire(&ctx(&device, None, &undefined)).is_none());
    }

    #[test]
    fn certify_rule_parsing_applies_deployment_defaults() {
        let defaults = RuleDefaults::default();

        let parsed = AlertRuleKind::from_rule("NO_TELEMETRY", &json!({}), &defaults).unwrap();
        assert_eq!(parsed, AlertRuleKind::NoTelemetry { threshold_minutes: 30 });

        let parsed =
            AlertRuleKind::from_rule("OVER_TEMP", &json!({ "thresholdC": 90.5 }), &defaults).unwrap();
        assert_eq!(parsed, AlertRuleKind::OverTemp { threshold_c: 90.5 });

        let parsed = AlertRuleKind::from_rule("SENSOR_OUT_OF_RANGE", &json!({}), &defaults).unwrap();
        assert_eq!(
            parsed,
            AlertRuleKind::SensorOutOfRange {
                metric: "tankTempC".into(),
                min: -10.0,
                max: 120.0,
                repeat_count: 3,
            }
        );

        assert!(AlertRuleKind::from_rule("UNKNOWN_RULE", &json!({}), &defaults).is_none());
    }

    #[test]
    fn certify_dedupe_key_shape() {
        assert_eq!(dedupe_key_for("dev-9", "rule-4"), "dev-9:rule-4");
    }
}
