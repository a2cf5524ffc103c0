// [libs/infra/db-turso/src/repositories/device.rs]
/*!
 * =================================================================
 * APARATO: DEVICE REPOSITORY (V4.0 - FLEET INVENTORY)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: UNIDADES GESTIONADAS, SECRETOS MAC E INVENTARIO
 *
 * # Logic:
 * El alta de dispositivo y el anclado de su digest MAC se sellan en
 * una única transacción: un dispositivo jamás existe sin identidad.
 * El serial porta unicidad por tenant.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::mappers;
use crate::TursoClient;
use chrono::Utc;
use helios_domain_models::{Device, DeviceStatus, LocationSource};
use libsql::{params, Row, Value};
use tracing::{info, instrument};
use uuid::Uuid;

pub struct DeviceRepository {
    database_client: TursoClient,
}

/// Datos de alta de una unidad. El llamador acuña el identificador
/// para poder derivar el digest MAC antes del sellado transaccional.
#[derive(Debug, Clone)]
pub struct NewDevice {
    pub id: String,
    pub tenant_id: String,
    pub serial_number: String,
    pub model: String,
    pub name: Option<String>,
    pub site_id: Option<String>,
    pub owner_user_id: Option<String>,
    pub notes: Option<String>,
    pub tags: serde_json::Value,
    pub sim_iccid: Option<String>,
}

/// Parche parcial del inventario (camino PATCH de usuario).
#[derive(Debug, Clone, Default)]
pub struct DevicePatch {
    pub name: Option<String>,
    pub notes: Option<String>,
    pub site_id: Option<Option<String>>,
    pub owner_user_id: Option<Option<String>>,
    pub status: Option<DeviceStatus>,
    pub tags: Option<serde_json::Value>,
}

/// Filtros de listado de inventario.
#[derive(Debug, Clone, Default)]
pub struct DeviceListFilter {
    pub status: Option<DeviceStatus>,
    pub site_id: Option<String>,
    pub search: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

const DEVICE_COLUMNS: &str = "id, tenant_id, site_id, owner_user_id, serial_number, model, name, \
     notes, tags_json, status, last_seen_at, firmware_version, sim_iccid, reported_lat, \
     reported_lon, reported_location_source, reported_location_accuracy_m, created_at, updated_at";

pub(crate) fn map_device_row(row: &Row) -> Result<Device, DbError> {
    let status_raw: String = row.get(9)?;
    let reported_source_raw: Option<String> = row.get(15)?;
    let reported_location_source = match reported_source_raw {
        Some(raw) => Some(mappers::decode_enum(&raw, LocationSource::parse, "LocationSource")?),
        None => None,
    };

    Ok(Device {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        site_id: row.get(2)?,
        owner_user_id: row.get(3)?,
        serial_number: row.get(4)?,
        model: row.get(5)?,
        name: row.get(6)?,
        notes: row.get(7)?,
        tags: mappers::get_json(row, 8)?,
        status: mappers::decode_enum(&status_raw, DeviceStatus::parse, "DeviceStatus")?,
        last_seen_at: mappers::get_opt_timestamp(row, 10)?,
        firmware_version: row.get(11)?,
        sim_iccid: row.get(12)?,
        reported_lat: row.get(13)?,
        reported_lon: row.get(14)?,
        reported_location_source,
        reported_location_accuracy_m: row.get(16)?,
        created_at: mappers::get_timestamp(row, 17)?,
        updated_at: mappers::get_timestamp(row, 18)?,
    })
}

impl DeviceRepository {
    #[must_use]
    pub fn new(database_client: TursoClient) -> Self {
        Self { database_client }
    }

    /**
     * Alta atómica: fila de dispositivo + digest MAC anclado.
     *
     * # Errors:
     * - `DbError::UniqueViolation`: serial duplicado dentro del tenant.
     */
    #[instrument(skip(self, new_device, mac_digest_hex), fields(tenant = %new_device.tenant_id))]
    pub async fn create_with_secret(
        &self,
        new_device: NewDevice,
        mac_digest_hex: &str,
    ) -> Result<Device, DbError> {
        let connection = self.database_client.get_connection()?;
        let provisioning_transaction = connection.transaction().await.map_err(DbError::QueryError)?;

        let now = Utc::now();
        let device_id = new_device.id.clone();

        provisioning_transaction
            .execute(
                "INSERT INTO devices (id, tenant_id, site_id, owner_user_id, serial_number, model,
                                      name, notes, tags_json, status, sim_iccid, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    device_id.clone(),
                    new_device.tenant_id.clone(),
                    new_device.site_id.clone(),
                    new_device.owner_user_id.clone(),
                    new_device.serial_number.clone(),
                    new_device.model.clone(),
                    new_device.name.clone(),
                    new_device.notes.clone(),
                    new_device.tags.to_string(),
                    DeviceStatus::Provisioned.as_str(),
                    new_device.sim_iccid.clone(),
                    now.to_rfc3339(),
                    now.to_rfc3339()
                ],
            )
            .await
            .map_err(DbError::from_engine)?;

        provisioning_transaction
            .execute(
                "INSERT INTO device_secrets (device_id, mac_digest_hex, created_at)
                 VALUES (?1, ?2, ?3)",
                params![device_id.clone(), mac_digest_hex, now.to_rfc3339()],
            )
            .await
            .map_err(DbError::from_engine)?;

        provisioning_transaction.commit().await.map_err(DbError::QueryError)?;

        info!("🔆 [DEVICES]: Unit {} provisioned with sealed identity.", device_id);

        self.find_by_id(&device_id).await?.ok_or(DbError::NotFound)
    }

    /// Lectura sin filtro de tenant: reservada al camino autenticado por
    /// dispositivo, cuyo id viene sellado en el token MAC.
    pub async fn find_by_id(&self, device_id: &str) -> Result<Option<Device>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE id = ?1"),
                params![device_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(map_device_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn find_by_id_in_tenant(
        &self,
        tenant_id: &str,
        device_id: &str,
    ) -> Result<Option<Device>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE id = ?1 AND tenant_id = ?2"),
                params![device_id, tenant_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(map_device_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Inventario paginado con filtros; devuelve (página, total).
    pub async fn list_by_tenant(
        &self,
        tenant_id: &str,
        filter: &DeviceListFilter,
    ) -> Result<(Vec<Device>, i64), DbError> {
        let connection = self.database_client.get_connection()?;

        // Predicados y parámetros se construyen en paralelo para mantener
        // la numeración de placeholders alineada con el vector de binding.
        let mut predicates = String::from("tenant_id = ?1");
        let mut bound_values: Vec<Value> = vec![Value::from(tenant_id.to_string())];

        if let Some(status) = filter.status {
            bound_values.push(Value::from(status.as_str().to_string()));
            predicates.push_str(&format!(" AND status = ?{}", bound_values.len()));
        }
        if let Some(site_id) = &filter.site_id {
            bound_values.push(Value::from(site_id.clone()));
            predicates.push_str(&format!(" AND site_id = ?{}", bound_values.len()));
        }
        if let Some(needle) = &filter.search {
            bound_values.push(Value::from(format!("%{needle}%")));
            let placeholder = bound_values.len();
            predicates.push_str(&format!(
                " AND (serial_number LIKE ?{placeholder} OR name LIKE ?{placeholder} OR model LIKE ?{placeholder})"
            ));
        }

        let page_limit = if filter.limit > 0 { filter.limit } else { 50 };
        let mut page_values = bound_values.clone();
        page_values.push(Value::from(page_limit));
        let limit_placeholder = page_values.len();
        page_values.push(Value::from(filter.offset));
        let offset_placeholder = page_values.len();

        let mut rows = connection
            .query(
                &format!(
                    "SELECT {DEVICE_COLUMNS} FROM devices WHERE {predicates}
                     ORDER BY created_at ASC LIMIT ?{limit_placeholder} OFFSET ?{offset_placeholder}"
                ),
                page_values,
            )
            .await?;

        let mut devices = Vec::new();
        while let Some(row) = rows.next().await? {
            devices.push(map_device_row(&row)?);
        }

        let mut count_rows = connection
            .query(
                &format!("SELECT COUNT(*) FROM devices WHERE {predicates}"),
                bound_values,
            )
            .await?;

        let total = match count_rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };

        Ok((devices, total))
    }

    #[instrument(skip(self, patch))]
    pub async fn apply_patch(
        &self,
        tenant_id: &str,
        device_id: &str,
        patch: DevicePatch,
    ) -> Result<Device, DbError> {
        let connection = self.database_client.get_connection()?;
        let now = Utc::now();

        let current = self
            .find_by_id_in_tenant(tenant_id, device_id)
            .await?
            .ok_or(DbError::NotFound)?;

        let next_site = patch.site_id.unwrap_or(current.site_id);
        let next_owner = patch.owner_user_id.unwrap_or(current.owner_user_id);
        let next_status = patch.status.unwrap_or(current.status);
        let next_tags = patch.tags.unwrap_or(current.tags);

        connection
            .execute(
                "UPDATE devices SET
                     name = COALESCE(?3, name),
                     notes = COALESCE(?4, notes),
                     site_id = ?5,
                     owner_user_id = ?6,
                     status = ?7,
                     tags_json = ?8,
                     updated_at = ?9
                 WHERE id = ?1 AND tenant_id = ?2",
                params![
                    device_id,
                    tenant_id,
                    patch.name.clone(),
                    patch.notes.clone(),
                    next_site,
                    next_owner,
                    next_status.as_str(),
                    next_tags.to_string(),
                    now.to_rfc3339()
                ],
            )
            .await?;

        self.find_by_id_in_tenant(tenant_id, device_id)
            .await?
            .ok_or(DbError::NotFound)
    }

    /// Re-ancla el digest MAC tras una rotación del secreto de despliegue.
    #[instrument(skip(self, mac_digest_hex))]
    pub async fn repin_mac_digest(
        &self,
        device_id: &str,
        mac_digest_hex: &str,
    ) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        let now = Utc::now();

        let updated_rows = connection
            .execute(
                "UPDATE device_secrets SET mac_digest_hex = ?2, rotated_at = ?3 WHERE device_id = ?1",
                params![device_id, mac_digest_hex, now.to_rfc3339()],
            )
            .await?;

        if updated_rows == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Unidades elegibles para barridos (estado ACTIVE o INSTALLED).
    pub async fn list_alert_eligible(&self, tenant_id: &str) -> Result<Vec<Device>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!(
                    "SELECT {DEVICE_COLUMNS} FROM devices
                     WHERE tenant_id = ?1 AND status IN ('ACTIVE', 'INSTALLED')"
                ),
                params![tenant_id],
            )
            .await?;

        let mut devices = Vec::new();
        while let Some(row) = rows.next().await? {
            devices.push(map_device_row(&row)?);
        }
        Ok(devices)
    }

    /// Marcadores del mapa: unidades con coordenadas reportadas dentro
    /// del rectángulo pedido, filtradas por tenant.
    pub async fn list_in_bbox(
        &self,
        tenant_id: &str,
        min_lon: f64,
        min_lat: f64,
        max_lon: f64,
        max_lat: f64,
    ) -> Result<Vec<Device>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!(
                    "SELECT {DEVICE_COLUMNS} FROM devices
                     WHERE tenant_id = ?1
                       AND reported_lat IS NOT NULL AND reported_lon IS NOT NULL
                       AND reported_lat BETWEEN ?2 AND ?3
                       AND reported_lon BETWEEN ?4 AND ?5"
                ),
                params![tenant_id, min_lat, max_lat, min_lon, max_lon],
            )
            .await?;

        let mut devices = Vec::new();
        while let Some(row) = rows.next().await? {
            devices.push(map_device_row(&row)?);
        }
        Ok(devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::tenant::TenantRepository;
    use helios_domain_models::TenantType;

    async fn test_client() -> (TursoClient, tempfile::TempDir) {
        let scratch_directory = tempfile::tempdir().expect("scratch dir");
        let database_path = scratch_directory.path().join("proving.db");
        let client = TursoClient::connect(database_path.to_str().unwrap(), None)
            .await
            .expect("ledger ignition");
        (client, scratch_directory)
    }

    fn new_device(tenant_id: &str, serial: &str) -> NewDevice {
        NewDevice {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            serial_number: serial.to_string(),
            model: "HELIOS-200L".into(),
            name: None,
            site_id: None,
            owner_user_id: None,
            notes: None,
            tags: serde_json::json!({}),
            sim_iccid: None,
        }
    }

    #[tokio::test]
    async fn certify_serial_unique_within_tenant_only() {
        let (client, _guard) = test_client().await;
        let tenants = TenantRepository::new(client.clone());
        let devices = DeviceRepository::new(client);

        let tenant_a = tenants.create("Alpha", TenantType::Installer).await.unwrap();
        let tenant_b = tenants.create("Beta", TenantType::Retailer).await.unwrap();

        devices
            .create_with_secret(new_device(&tenant_a.id, "SN-100"), "digest-a")
            .await
            .unwrap();

        // Mismo serial dentro del mismo tenant: colisión.
        let collision = devices
            .create_with_secret(new_device(&tenant_a.id, "SN-100"), "digest-b")
            .await;
        assert!(matches!(collision, Err(DbError::UniqueViolation(_))));

        // Mismo serial en OTRO tenant: permitido.
        devices
            .create_with_secret(new_device(&tenant_b.id, "SN-100"), "digest-c")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn certify_tenant_scoped_lookup_excludes_foreign_devices() {
        let (client, _guard) = test_client().await;
        let tenants = TenantRepository::new(client.clone());
        let devices = DeviceRepository::new(client);

        let tenant_a = tenants.create("Alpha", TenantType::Installer).await.unwrap();
        let tenant_b = tenants.create("Beta", TenantType::Retailer).await.unwrap();

        let foreign = devices
            .create_with_secret(new_device(&tenant_a.id, "SN-200"), "digest")
            .await
            .unwrap();

        // Punto de vista del tenant B: la unidad de A no existe.
        let shielded = devices.find_by_id_in_tenant(&tenant_b.id, &foreign.id).await.unwrap();
        assert!(shielded.is_none());

        let (listed, total) = devices
            .list_by_tenant(&tenant_b.id, &DeviceListFilter { limit: 50, ..Default::default() })
            .await
            .unwrap();
        assert!(listed.is_empty());
        assert_eq!(total, 0);
    }
}
