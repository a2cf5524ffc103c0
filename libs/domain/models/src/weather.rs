// [libs/domain/models/src/weather.rs]
/*!
 * APARATO: WEATHER OBSERVATION CONTRACT (ESTRATO L2)
 * RESPONSABILIDAD: OBSERVACIÓN DIARIA POR SITIO (INTEGRACIÓN EXTERNA)
 */

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Observación diaria por (sitio, fecha); clave de upsert única.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherObservation {
    pub id: String,
    pub site_id: String,
    pub date: NaiveDate,
    pub temp_min_c: Option<f64>,
    pub temp_max_c: Option<f64>,
    pub irradiance_kwh_m2: Option<f64>,
    pub cloud_cover_pct: Option<f64>,
    pub created_at: DateTime<Utc>,
}
