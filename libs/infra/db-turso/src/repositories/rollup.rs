// [libs/infra/db-turso/src/repositories/rollup.rs]
/*!
 * APARATO: DAILY ROLLUP REPOSITORY (ESTRATO L3)
 * RESPONSABILIDAD: UPSERT DE AGREGADOS SOBRE (DISPOSITIVO, FECHA)
 */

use crate::errors::DbError;
use crate::repositories::mappers;
use crate::TursoClient;
use chrono::{NaiveDate, Utc};
use helios_domain_models::rollup::RollupFigures;
use helios_domain_models::DailyRollup;
use libsql::{params, Row};
use tracing::instrument;
use uuid::Uuid;

pub struct RollupRepository {
    database_client: TursoClient,
}

const ROLLUP_COLUMNS: &str = "id, device_id, day_date, energy_kwh, water_liters, \
     heater_on_minutes, tank_temp_min, tank_temp_max, ambient_temp_avg, created_at, updated_at";

fn map_rollup_row(row: &Row) -> Result<DailyRollup, DbError> {
    Ok(DailyRollup {
        id: row.get(0)?,
        device_id: row.get(1)?,
        day_date: mappers::get_date(row, 2)?,
        energy_kwh: row.get(3)?,
        water_liters: row.get(4)?,
        heater_on_minutes: row.get(5)?,
        tank_temp_min: row.get(6)?,
        tank_temp_max: row.get(7)?,
        ambient_temp_avg: row.get(8)?,
        created_at: mappers::get_timestamp(row, 9)?,
        updated_at: mappers::get_timestamp(row, 10)?,
    })
}

impl RollupRepository {
    #[must_use]
    pub fn new(database_client: TursoClient) -> Self {
        Self { database_client }
    }

    /// Upsert idempotente sobre (device_id, day_date): correr el día dos
    /// veces produce filas idénticas.
    #[instrument(skip(self, figures))]
    pub async fn upsert_day(
        &self,
        device_id: &str,
        day_date: NaiveDate,
        figures: &RollupFigures,
    ) -> Result<DailyRollup, DbError> {
        let connection = self.database_client.get_connection()?;
        let now = Utc::now();

        connection
            .execute(
                "INSERT INTO daily_rollups (id, device_id, day_date, energy_kwh, water_liters,
                                            heater_on_minutes, tank_temp_min, tank_temp_max,
                                            ambient_temp_avg, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
                 ON CONFLICT(device_id, day_date) DO UPDATE SET
                     energy_kwh = excluded.energy_kwh,
                     water_liters = excluded.water_liters,
                     heater_on_minutes = excluded.heater_on_minutes,
                     tank_temp_min = excluded.tank_temp_min,
                     tank_temp_max = excluded.tank_temp_max,
                     ambient_temp_avg = excluded.ambient_temp_avg,
                     updated_at = excluded.updated_at",
                params![
                    Uuid::new_v4().to_string(),
                    device_id,
                    day_date.format("%Y-%m-%d").to_string(),
                    figures.energy_kwh,
                    figures.water_liters,
                    figures.heater_on_minutes,
                    figures.tank_temp_min,
                    figures.tank_temp_max,
                    figures.ambient_temp_avg,
                    now.to_rfc3339()
                ],
            )
            .await
            .map_err(DbError::from_engine)?;

        self.find_day(device_id, day_date).await?.ok_or(DbError::NotFound)
    }

    pub async fn find_day(
        &self,
        device_id: &str,
        day_date: NaiveDate,
    ) -> Result<Option<DailyRollup>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!(
                    "SELECT {ROLLUP_COLUMNS} FROM daily_rollups
                     WHERE device_id = ?1 AND day_date = ?2"
                ),
                params![device_id, day_date.format("%Y-%m-%d").to_string()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(map_rollup_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_for_device_between(
        &self,
        device_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyRollup>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!(
                    "SELECT {ROLLUP_COLUMNS} FROM daily_rollups
                     WHERE device_id = ?1 AND day_date >= ?2 AND day_date <= ?3
                     ORDER BY day_date ASC"
                ),
                params![
                    device_id,
                    from.format("%Y-%m-%d").to_string(),
                    to.format("%Y-%m-%d").to_string()
                ],
            )
            .await?;

        let mut rollups = Vec::new();
        while let Some(row) = rows.next().await? {
            rollups.push(map_rollup_row(&row)?);
        }
        Ok(rollups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_client() -> (TursoClient, tempfile::TempDir) {
        let scratch_directory = tempfile::tempdir().expect("scratch dir");
        let database_path = scratch_directory.path().join("proving.db");
        let client = TursoClient::connect(database_path.to_str().unwrap(), None)
            .await
            .expect("ledger ignition");
        (client, scratch_directory)
    }

    #[tokio::test]
    async fn certify_day_upsert_is_idempotent() {
        let (client, _guard) = test_client().await;
        let rollups = RollupRepository::new(client);

        let day = NaiveDate::from_ymd_opt(2026, 2, 10).unwrap();
        let figures = RollupFigures {
            energy_kwh: 3.25,
            water_liters: 142.5,
            heater_on_minutes: 95,
            tank_temp_min: Some(41.2),
            tank_temp_max: Some(63.9),
            ambient_temp_avg: Some(21.4),
        };

        let first = rollups.upsert_day("dev-1", day, &figures).await.unwrap();
        let second = rollups.upsert_day("dev-1", day, &figures).await.unwrap();

        // Misma fila tras dos pasadas: idempotencia sobre la clave (device, día).
        assert_eq!(first.id, second.id);
        assert_eq!(second.energy_kwh, 3.25);
        assert_eq!(second.heater_on_minutes, 95);

        let listed = rollups
            .list_for_device_between("dev-1", day, day)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
    }
}
