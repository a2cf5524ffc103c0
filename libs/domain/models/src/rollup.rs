// [libs/domain/models/src/rollup.rs]
/*!
 * =================================================================
 * APARATO: DAILY ROLLUP MATH (V2.3 - INTERVAL WEIGHTED)
 * CLASIFICACIÓN: DOMAIN POLICY (ESTRATO L2)
 * RESPONSABILIDAD: AGREGACIÓN DIARIA POR DISPOSITIVO DESDE TELEMETRÍA CRUDA
 *
 * # Logic:
 * El intervalo ponderado de cada lectura es la distancia en minutos a
 * la lectura anterior (5 para la primera del día). La energía integra
 * powerW sobre ese intervalo; el agua integra flowLpm; los minutos de
 * calentador suman el intervalo cuando heaterOn es verdadero.
 * =================================================================
 */

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::telemetry::{MetricValue, TelemetryReading};

/// Intervalo atribuido a la primera lectura de la ventana (minutos).
const FIRST_READING_INTERVAL_MINUTES: f64 = 5.0;

/// Agregado por (dispositivo, fecha calendario); clave de upsert única.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRollup {
    pub id: String,
    pub device_id: String,
    pub day_date: NaiveDate,
    pub energy_kwh: f64,
    pub water_liters: f64,
    pub heater_on_minutes: i64,
    pub tank_temp_min: Option<f64>,
    pub tank_temp_max: Option<f64>,
    pub ambient_temp_avg: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn round_to_hundredth(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Resultado puro de la agregación, sin identidad ni marcas de persistencia.
#[derive(Debug, Clone, PartialEq)]
pub struct RollupFigures {
    pub energy_kwh: f64,
    pub water_liters: f64,
    pub heater_on_minutes: i64,
    pub tank_temp_min: Option<f64>,
    pub tank_temp_max: Option<f64>,
    pub ambient_temp_avg: Option<f64>,
}

/**
 * Computa las cifras del día a partir de las lecturas de la ventana,
 * ordenadas por 'ts' ASCENDENTE. Devuelve None si la ventana está vacía.
 */
pub fn compute_rollup_figures(readings_ascending: &[TelemetryReading]) -> Option<RollupFigures> {
    if readings_ascending.is_empty() {
        return None;
    }

    let mut energy_kwh = 0.0_f64;
    let mut water_liters = 0.0_f64;
    let mut heater_on_minutes = 0.0_f64;
    let mut tank_temp_min: Option<f64> = None;
    let mut tank_temp_max: Option<f64> = None;
    let mut ambient_sum = 0.0_f64;
    let mut ambient_samples = 0_usize;

    let mut previous_ts: Option<DateTime<Utc>> = None;

    for reading in readings_ascending {
        let interval_minutes = match previous_ts {
            None => FIRST_READING_INTERVAL_MINUTES,
            Some(prior) => (reading.ts - prior).num_seconds() as f64 / 60.0,
        };
        previous_ts = Some(reading.ts);

        if let Some(power_w) = reading.metrics.get("powerW").and_then(MetricValue::as_f64) {
            energy_kwh += (power_w / 1000.0) * (interval_minutes / 60.0);
        }
        if let Some(flow_lpm) = reading.metrics.get("flowLpm").and_then(MetricValue::as_f64) {
            water_liters += flow_lpm * interval_minutes;
        }
        if reading.metrics.get("heaterOn").and_then(MetricValue::as_bool) == Some(true) {
            heater_on_minutes += interval_minutes;
        }
        if let Some(tank_temp) = reading.metrics.get("tankTempC").and_then(MetricValue::as_f64) {
            tank_temp_min = Some(tank_temp_min.map_or(tank_temp, |m: f64| m.min(tank_temp)));
            tank_temp_max = Some(tank_temp_max.map_or(tank_temp, |m: f64| m.max(tank_temp)));
        }
        if let Some(ambient) = reading.metrics.get("ambientTempC").and_then(MetricValue::as_f64) {
            ambient_sum += ambient;
            ambient_samples += 1;
        }
    }

    Some(RollupFigures {
        energy_kwh: round_to_hundredth(energy_kwh),
        water_liters: round_to_hundredth(water_liters),
        heater_on_minutes: heater_on_minutes.round() as i64,
        tank_temp_min: tank_temp_min.map(round_to_hundredth),
        tank_temp_max: tank_temp_max.map(round_to_hundredth),
        ambient_temp_avg: (ambient_samples > 0)
            .then(|| round_to_tenth(ambient_sum / ambient_samples as f64)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::collections::BTreeMap;

    fn reading(ts: DateTime<Utc>, metrics: &[(&str, MetricValue)]) -> TelemetryReading {
        TelemetryReading {
            id: format!("tel-{}", ts.timestamp()),
            device_id: "dev-1".into(),
            ts,
            metrics: metrics.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            geo: None,
            created_at: ts,
        }
    }

    #[test]
    fn certify_empty_window_yields_nothing() {
        assert_eq!(compute_rollup_figures(&[]), None);
    }

    #[test]
    fn certify_interval_weighted_integration() {
        let day_start = Utc.with_ymd_and_hms(2026, 2, 10, 0, 0, 0).unwrap();

        // Tres lecturas separadas 10 min; la primera pondera 5 min.
        let readings = vec![
            reading(
                day_start,
                &[
                    ("powerW", MetricValue::Number(1800.0)),
                    ("flowLpm", MetricValue::Number(2.0)),
                    ("heaterOn", MetricValue::Flag(true)),
                    ("tankTempC", MetricValue::Number(55.0)),
                    ("ambientTempC", MetricValue::Number(21.0)),
                ],
            ),
            reading(
                day_start + Duration::minutes(10),
                &[
                    ("powerW", MetricValue::Number(1200.0)),
                    ("flowLpm", MetricValue::Number(1.0)),
                    ("heaterOn", MetricValue::Flag(false)),
                    ("tankTempC", MetricValue::Number(58.0)),
                    ("ambientTempC", MetricValue::Number(22.0)),
                ],
            ),
            reading(
                day_start + Duration::minutes(20),
                &[
                    ("powerW", MetricValue::Number(600.0)),
                    ("heaterOn", MetricValue::Flag(true)),
                    ("tankTempC", MetricValue::Number(52.0)),
                ],
            ),
        ];

        let figures = compute_rollup_figures(&readings).unwrap();

        // energía = 1.8*(5/60) + 1.2*(10/60) + 0.6*(10/60) = 0.15 + 0.2 + 0.1
        assert_eq!(figures.energy_kwh, 0.45);
        // agua = 2*5 + 1*10 = 20
        assert_eq!(figures.water_liters, 20.0);
        // calentador = 5 (primera) + 10 (tercera)
        assert_eq!(figures.heater_on_minutes, 15);
        assert_eq!(figures.tank_temp_min, Some(52.0));
        assert_eq!(figures.tank_temp_max, Some(58.0));
        // ambiente = (21 + 22) / 2 = 21.5
        assert_eq!(figures.ambient_temp_avg, Some(21.5));
    }

    #[test]
    fn certify_rollup_is_idempotent_over_same_window() {
        let day_start = Utc.with_ymd_and_hms(2026, 2, 10, 6, 0, 0).unwrap();
        let readings: Vec<TelemetryReading> = (0..6)
            .map(|i| {
                reading(
                    day_start + Duration::minutes(i * 15),
                    &[("powerW", MetricValue::Number(1500.0))],
                )
            })
            .collect();

        let first_pass = compute_rollup_figures(&readings).unwrap();
        let second_pass = compute_rollup_figures(&readings).unwrap();
        assert_eq!(first_pass, second_pass);
    }

    #[test]
    fn certify_missing_metrics_contribute_nothing() {
        let ts = Utc.with_ymd_and_hms(2026, 2, 10, 12, 0, 0).unwrap();
        let figures =
            compute_rollup_figures(&[reading(ts, &[("rssiDbm", MetricValue::Number(-80.0))])])
                .unwrap();

        assert_eq!(figures.energy_kwh, 0.0);
        assert_eq!(figures.water_liters, 0.0);
        assert_eq!(figures.heater_on_minutes, 0);
        assert_eq!(figures.tank_temp_min, None);
        assert_eq!(figures.ambient_temp_avg, None);
    }
}
