// [libs/infra/db-turso/src/repositories/ota.rs]
/*!
 * =================================================================
 * APARATO: OTA REPOSITORY (V3.0 - ROLLOUT AUTHORITY)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: CATÁLOGO DE FIRMWARE Y TRABAJOS DE DESPLIEGUE
 *
 * # Logic:
 * El pull de dispositivo devuelve el trabajo más temprano del tenant
 * en estado SCHEDULED | IN_PROGRESS cuyo objetivo calce (DEVICE con id
 * igual, o GROUP). Un reporte SUCCESS escribe la versión del firmware
 * en la unidad que reporta, dentro de la misma transacción.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::mappers;
use crate::TursoClient;
use chrono::{DateTime, Utc};
use helios_domain_models::{FirmwarePackage, OtaJob, OtaJobStatus, OtaTargetType};
use libsql::{params, Row};
use tracing::{info, instrument};
use uuid::Uuid;

pub struct OtaRepository {
    database_client: TursoClient,
}

/// Reporte de progreso emitido por la unidad.
#[derive(Debug, Clone)]
pub struct DeviceOtaReport {
    pub job_id: String,
    pub status: OtaJobStatus,
    pub progress: Option<serde_json::Value>,
    pub error_msg: Option<String>,
}

const FIRMWARE_COLUMNS: &str = "id, version, download_url, checksum, release_notes, created_at";

const JOB_COLUMNS: &str = "id, tenant_id, target_type, device_id, group_filter_json, firmware_id, \
     status, scheduled_at, started_at, finished_at, progress_json, created_at, updated_at";

fn map_firmware_row(row: &Row) -> Result<FirmwarePackage, DbError> {
    Ok(FirmwarePackage {
        id: row.get(0)?,
        version: row.get(1)?,
        download_url: row.get(2)?,
        checksum: row.get(3)?,
        release_notes: row.get(4)?,
        created_at: mappers::get_timestamp(row, 5)?,
    })
}

fn map_job_row(row: &Row) -> Result<OtaJob, DbError> {
    let target_type_raw: String = row.get(2)?;
    let status_raw: String = row.get(6)?;
    let group_filter_raw: Option<String> = row.get(4)?;
    let group_filter = match group_filter_raw {
        Some(raw) => Some(
            serde_json::from_str(&raw)
                .map_err(|fault| DbError::MappingError(format!("GROUP_FILTER_DRIFT: {fault}")))?,
        ),
        None => None,
    };

    Ok(OtaJob {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        target_type: mappers::decode_enum(&target_type_raw, OtaTargetType::parse, "OtaTargetType")?,
        device_id: row.get(3)?,
        group_filter,
        firmware_id: row.get(5)?,
        status: mappers::decode_enum(&status_raw, OtaJobStatus::parse, "OtaJobStatus")?,
        scheduled_at: mappers::get_timestamp(row, 7)?,
        started_at: mappers::get_opt_timestamp(row, 8)?,
        finished_at: mappers::get_opt_timestamp(row, 9)?,
        progress: mappers::get_json(row, 10)?,
        created_at: mappers::get_timestamp(row, 11)?,
        updated_at: mappers::get_timestamp(row, 12)?,
    })
}

impl OtaRepository {
    #[must_use]
    pub fn new(database_client: TursoClient) -> Self {
        Self { database_client }
    }

    // --- CATÁLOGO DE FIRMWARE ---

    /**
     * Registra un paquete; la versión porta unicidad global.
     */
    #[instrument(skip(self))]
    pub async fn register_firmware(
        &self,
        version: &str,
        download_url: &str,
        checksum: &str,
        release_notes: Option<String>,
    ) -> Result<FirmwarePackage, DbError> {
        let connection = self.database_client.get_connection()?;
        let now = Utc::now();
        let firmware_id = Uuid::new_v4().to_string();

        connection
            .execute(
                "INSERT INTO firmware_packages (id, version, download_url, checksum, release_notes, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    firmware_id.clone(),
                    version,
                    download_url,
                    checksum,
                    release_notes,
                    now.to_rfc3339()
                ],
            )
            .await
            .map_err(DbError::from_engine)?;

        info!("📦 [OTA]: Firmware {} registered as {}.", version, firmware_id);

        self.find_firmware(&firmware_id).await?.ok_or(DbError::NotFound)
    }

    pub async fn find_firmware(&self, firmware_id: &str) -> Result<Option<FirmwarePackage>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!("SELECT {FIRMWARE_COLUMNS} FROM firmware_packages WHERE id = ?1"),
                params![firmware_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(map_firmware_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_firmware(&self) -> Result<Vec<FirmwarePackage>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!("SELECT {FIRMWARE_COLUMNS} FROM firmware_packages ORDER BY created_at DESC"),
                (),
            )
            .await?;

        let mut packages = Vec::new();
        while let Some(row) = rows.next().await? {
            packages.push(map_firmware_row(&row)?);
        }
        Ok(packages)
    }

    // --- TRABAJOS DE DESPLIEGUE ---

    #[instrument(skip(self, group_filter))]
    pub async fn schedule_job(
        &self,
        tenant_id: &str,
        target_type: OtaTargetType,
        device_id: Option<String>,
        group_filter: Option<serde_json::Value>,
        firmware_id: &str,
        scheduled_at: DateTime<Utc>,
    ) -> Result<OtaJob, DbError> {
        let connection = self.database_client.get_connection()?;
        let now = Utc::now();
        let job_id = Uuid::new_v4().to_string();

        connection
            .execute(
                "INSERT INTO ota_jobs (id, tenant_id, target_type, device_id, group_filter_json,
                                       firmware_id, status, scheduled_at, progress_json,
                                       created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, '{}', ?9, ?10)",
                params![
                    job_id.clone(),
                    tenant_id,
                    target_type.as_str(),
                    device_id,
                    group_filter.map(|f| f.to_string()),
                    firmware_id,
                    OtaJobStatus::Scheduled.as_str(),
                    scheduled_at.to_rfc3339(),
                    now.to_rfc3339(),
                    now.to_rfc3339()
                ],
            )
            .await
            .map_err(DbError::from_engine)?;

        info!("🚀 [OTA]: Job {} scheduled for tenant {}.", job_id, tenant_id);

        self.find_job(tenant_id, &job_id).await?.ok_or(DbError::NotFound)
    }

    pub async fn find_job(&self, tenant_id: &str, job_id: &str) -> Result<Option<OtaJob>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!("SELECT {JOB_COLUMNS} FROM ota_jobs WHERE id = ?1 AND tenant_id = ?2"),
                params![job_id, tenant_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(map_job_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_jobs_by_tenant(&self, tenant_id: &str) -> Result<Vec<OtaJob>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM ota_jobs WHERE tenant_id = ?1
                     ORDER BY scheduled_at ASC"
                ),
                params![tenant_id],
            )
            .await?;

        let mut jobs = Vec::new();
        while let Some(row) = rows.next().await? {
            jobs.push(map_job_row(&row)?);
        }
        Ok(jobs)
    }

    /**
     * Pull de dispositivo: el trabajo elegible más temprano del tenant
     * de la unidad, con objetivo DEVICE coincidente o GROUP.
     */
    pub async fn pull_pending_for_device(
        &self,
        tenant_id: &str,
        device_id: &str,
    ) -> Result<Option<OtaJob>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM ota_jobs
                     WHERE tenant_id = ?1
                       AND status IN ('SCHEDULED', 'IN_PROGRESS')
                       AND (
                            (target_type = 'DEVICE' AND device_id = ?2)
                         OR target_type = 'GROUP'
                       )
                     ORDER BY scheduled_at ASC LIMIT 1"
                ),
                params![tenant_id, device_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(map_job_row(&row)?)),
            None => Ok(None),
        }
    }

    /**
     * Aplica el reporte de una unidad. SUCCESS escribe la versión del
     * firmware del trabajo en 'devices.firmware_version' dentro de la
     * misma transacción.
     */
    #[instrument(skip(self, report), fields(job = %report.job_id))]
    pub async fn apply_device_report(
        &self,
        tenant_id: &str,
        reporting_device_id: &str,
        report: DeviceOtaReport,
    ) -> Result<OtaJob, DbError> {
        let current = self
            .find_job(tenant_id, &report.job_id)
            .await?
            .ok_or(DbError::NotFound)?;

        let now = Utc::now();
        let connection = self.database_client.get_connection()?;
        let report_transaction = connection.transaction().await.map_err(DbError::QueryError)?;

        match report.status {
            OtaJobStatus::InProgress => {
                if current.status == OtaJobStatus::Scheduled {
                    report_transaction
                        .execute(
                            "UPDATE ota_jobs SET status = 'IN_PROGRESS', started_at = ?2,
                                    progress_json = COALESCE(?3, progress_json), updated_at = ?2
                             WHERE id = ?1",
                            params![
                                report.job_id.clone(),
                                now.to_rfc3339(),
                                report.progress.as_ref().map(|p| p.to_string())
                            ],
                        )
                        .await?;
                } else {
                    // Progreso incremental sobre un trabajo ya iniciado.
                    report_transaction
                        .execute(
                            "UPDATE ota_jobs SET progress_json = COALESCE(?2, progress_json),
                                    updated_at = ?3
                             WHERE id = ?1",
                            params![
                                report.job_id.clone(),
                                report.progress.as_ref().map(|p| p.to_string()),
                                now.to_rfc3339()
                            ],
                        )
                        .await?;
                }
            }
            OtaJobStatus::Success | OtaJobStatus::Failed => {
                // El errorMsg reportado viaja dentro del mapa de progreso.
                let mut effective_progress = report.progress.clone();
                if let Some(error_text) = &report.error_msg {
                    let mut progress_map = effective_progress
                        .as_ref()
                        .and_then(serde_json::Value::as_object)
                        .cloned()
                        .unwrap_or_default();
                    progress_map
                        .insert("errorMsg".to_string(), serde_json::Value::String(error_text.clone()));
                    effective_progress = Some(serde_json::Value::Object(progress_map));
                }

                report_transaction
                    .execute(
                        "UPDATE ota_jobs SET status = ?2, finished_at = ?3,
                                progress_json = COALESCE(?4, progress_json), updated_at = ?3
                         WHERE id = ?1",
                        params![
                            report.job_id.clone(),
                            report.status.as_str(),
                            now.to_rfc3339(),
                            effective_progress.as_ref().map(|p| p.to_string())
                        ],
                    )
                    .await?;

                if report.status == OtaJobStatus::Success {
                    let mut firmware_rows = report_transaction
                        .query(
                            "SELECT version FROM firmware_packages WHERE id = ?1",
                            params![current.firmware_id.clone()],
                        )
                        .await?;

                    if let Some(firmware_row) = firmware_rows.next().await? {
                        let firmware_version: String = firmware_row.get(0)?;
                        report_transaction
                            .execute(
                                "UPDATE devices SET firmware_version = ?2, updated_at = ?3
                                 WHERE id = ?1",
                                params![reporting_device_id, firmware_version, now.to_rfc3339()],
                            )
                            .await?;
                    }
                }
            }
            _ => return Err(DbError::InvalidState),
        }

        report_transaction.commit().await.map_err(DbError::QueryError)?;

        self.find_job(tenant_id, &report.job_id).await?.ok_or(DbError::NotFound)
    }

    /// Transición administrativa CANCELED; sella 'finished_at'.
    #[instrument(skip(self))]
    pub async fn cancel_job(&self, tenant_id: &str, job_id: &str) -> Result<OtaJob, DbError> {
        let connection = self.database_client.get_connection()?;
        let now = Utc::now();

        let updated_rows = connection
            .execute(
                "UPDATE ota_jobs SET status = 'CANCELED', finished_at = ?3, updated_at = ?3
                 WHERE id = ?1 AND tenant_id = ?2 AND status IN ('SCHEDULED', 'IN_PROGRESS')",
                params![job_id, tenant_id, now.to_rfc3339()],
            )
            .await?;

        if updated_rows == 0 {
            return match self.find_job(tenant_id, job_id).await? {
                Some(_) => Err(DbError::InvalidState),
                None => Err(DbError::NotFound),
            };
        }

        self.find_job(tenant_id, job_id).await?.ok_or(DbError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::device::{DeviceRepository, NewDevice};
    use crate::repositories::tenant::TenantRepository;
    use chrono::Duration;
    use helios_domain_models::TenantType;

    async fn test_client() -> (TursoClient, tempfile::TempDir) {
        let scratch_directory = tempfile::tempdir().expect("scratch dir");
        let database_path = scratch_directory.path().join("proving.db");
        let client = TursoClient::connect(database_path.to_str().unwrap(), None)
            .await
            .expect("ledger ignition");
        (client, scratch_directory)
    }

    #[tokio::test]
    async fn certify_firmware_version_is_globally_unique() {
        let (client, _guard) = test_client().await;
        let ota = OtaRepository::new(client);

        ota.register_firmware("2.4.0", "https://fw.helios.example/2.4.0.bin", "abc123", None)
            .await
            .unwrap();

        let duplicate = ota
            .register_firmware("2.4.0", "https://fw.helios.example/dup.bin", "def456", None)
            .await;
        assert!(matches!(duplicate, Err(DbError::UniqueViolation(_))));
    }

    #[tokio::test]
    async fn certify_success_report_writes_device_firmware_version() {
        let (client, _guard) = test_client().await;
        let tenants = TenantRepository::new(client.clone());
        let devices = DeviceRepository::new(client.clone());
        let ota = OtaRepository::new(client);

        let tenant = tenants.create("Ota Org", TenantType::Manufacturer).await.unwrap();
        let device = devices
            .create_with_secret(
                NewDevice {
                    id: Uuid::new_v4().to_string(),
                    tenant_id: tenant.id.clone(),
                    serial_number: "SN-OTA-1".into(),
                    model: "HELIOS-200L".into(),
                    name: None,
                    site_id: None,
                    owner_user_id: None,
                    notes: None,
                    tags: serde_json::json!({}),
                    sim_iccid: None,
                },
                "digest",
            )
            .await
            .unwrap();

        let firmware = ota
            .register_firmware("3.1.0", "https://fw.helios.example/3.1.0.bin", "cafe01", None)
            .await
            .unwrap();

        let job = ota
            .schedule_job(
                &tenant.id,
                OtaTargetType::Device,
                Some(device.id.clone()),
                None,
                &firmware.id,
                Utc::now() + Duration::minutes(5),
            )
            .await
            .unwrap();

        // Pull: el trabajo es visible para la unidad objetivo.
        let pulled = ota.pull_pending_for_device(&tenant.id, &device.id).await.unwrap();
        assert_eq!(pulled.unwrap().id, job.id);

        // Y NO para otra unidad.
        let foreign = ota.pull_pending_for_device(&tenant.id, "other-dev").await.unwrap();
        assert!(foreign.is_none());

        // IN_PROGRESS desde SCHEDULED sella started_at.
        let in_progress = ota
            .apply_device_report(&tenant.id, &device.id, DeviceOtaReport {
                job_id: job.id.clone(),
                status: OtaJobStatus::InProgress,
                progress: Some(serde_json::json!({"pct": 10})),
                error_msg: None,
            })
            .await
            .unwrap();
        assert_eq!(in_progress.status, OtaJobStatus::InProgress);
        assert!(in_progress.started_at.is_some());

        // SUCCESS termina el trabajo y escribe la versión en la unidad.
        let success = ota
            .apply_device_report(&tenant.id, &device.id, DeviceOtaReport {
                job_id: job.id.clone(),
                status: OtaJobStatus::Success,
                progress: Some(serde_json::json!({"pct": 100})),
                error_msg: None,
            })
            .await
            .unwrap();
        assert_eq!(success.status, OtaJobStatus::Success);
        assert!(success.finished_at.is_some());

        let flashed = devices.find_by_id(&device.id).await.unwrap().unwrap();
        assert_eq!(flashed.firmware_version.as_deref(), Some("3.1.0"));
    }

    #[tokio::test]
    async fn certify_cancel_is_administrative_and_terminal() {
        let (client, _guard) = test_client().await;
        let tenants = TenantRepository::new(client.clone());
        let ota = OtaRepository::new(client);

        let tenant = tenants.create("Ota Org", TenantType::Manufacturer).await.unwrap();
        let firmware = ota
            .register_firmware("4.0.0", "https://fw.helios.example/4.0.0.bin", "beef02", None)
            .await
            .unwrap();

        let job = ota
            .schedule_job(&tenant.id, OtaTargetType::Group, None,
                          Some(serde_json::json!({"model": "HELIOS-200L"})),
                          &firmware.id, Utc::now())
            .await
            .unwrap();

        let canceled = ota.cancel_job(&tenant.id, &job.id).await.unwrap();
        assert_eq!(canceled.status, OtaJobStatus::Canceled);
        assert!(canceled.finished_at.is_some());

        // Cancelar dos veces es transición inválida.
        let twice = ota.cancel_job(&tenant.id, &job.id).await;
        assert!(matches!(twice, Err(DbError::InvalidState)));
    }
}
