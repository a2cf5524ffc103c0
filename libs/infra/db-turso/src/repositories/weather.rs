// [libs/infra/db-turso/src/repositories/weather.rs]
/*!
 * APARATO: WEATHER DATA REPOSITORY (ESTRATO L3)
 * RESPONSABILIDAD: OBSERVACIONES DIARIAS POR SITIO (UPSERT IDEMPOTENTE)
 */

use crate::errors::DbError;
use crate::repositories::mappers;
use crate::TursoClient;
use chrono::{NaiveDate, Utc};
use helios_domain_models::WeatherObservation;
use libsql::{params, Row};
use tracing::instrument;
use uuid::Uuid;

pub struct WeatherRepository {
    database_client: TursoClient,
}

const WEATHER_COLUMNS: &str =
    "id, site_id, date, temp_min_c, temp_max_c, irradiance_kwh_m2, cloud_cover_pct, created_at";

fn map_weather_row(row: &Row) -> Result<WeatherObservation, DbError> {
    Ok(WeatherObservation {
        id: row.get(0)?,
        site_id: row.get(1)?,
        date: mappers::get_date(row, 2)?,
        temp_min_c: row.get(3)?,
        temp_max_c: row.get(4)?,
        irradiance_kwh_m2: row.get(5)?,
        cloud_cover_pct: row.get(6)?,
        created_at: mappers::get_timestamp(row, 7)?,
    })
}

impl WeatherRepository {
    #[must_use]
    pub fn new(database_client: TursoClient) -> Self {
        Self { database_client }
    }

    /// Upsert sobre la clave (sitio, fecha); el barrido diario es idempotente.
    #[instrument(skip(self))]
    pub async fn upsert_observation(
        &self,
        site_id: &str,
        date: NaiveDate,
        temp_min_c: Option<f64>,
        temp_max_c: Option<f64>,
        irradiance_kwh_m2: Option<f64>,
        cloud_cover_pct: Option<f64>,
    ) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;

        connection
            .execute(
                "INSERT INTO weather_data (id, site_id, date, temp_min_c, temp_max_c,
                                           irradiance_kwh_m2, cloud_cover_pct, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(site_id, date) DO UPDATE SET
                     temp_min_c = excluded.temp_min_c,
                     temp_max_c = excluded.temp_max_c,
                     irradiance_kwh_m2 = excluded.irradiance_kwh_m2,
                     cloud_cover_pct = excluded.cloud_cover_pct",
                params![
                    Uuid::new_v4().to_string(),
                    site_id,
                    date.format("%Y-%m-%d").to_string(),
                    temp_min_c,
                    temp_max_c,
                    irradiance_kwh_m2,
                    cloud_cover_pct,
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(DbError::from_engine)?;

        Ok(())
    }

    pub async fn find_observation(
        &self,
        site_id: &str,
        date: NaiveDate,
    ) -> Result<Option<WeatherObservation>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!(
                    "SELECT {WEATHER_COLUMNS} FROM weather_data WHERE site_id = ?1 AND date = ?2"
                ),
                params![site_id, date.format("%Y-%m-%d").to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(map_weather_row(&row)?)),
            None => Ok(None),
        }
    }
}
