// [libs/infra/db-turso/src/repositories/site.rs]
/*!
 * =================================================================
 * APARATO: SITE REPOSITORY (V2.5 - LOCATION GOVERNANCE)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: UBICACIONES FÍSICAS Y PROCEDENCIA GEOGRÁFICA
 *
 * # Logic:
 * Las únicas mutaciones de Site originadas en dispositivos ocurren en
 * la transacción de ingesta (TelemetryRepository); este repositorio
 * sirve el camino humano (creación, parcheo manual con candado).
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::mappers;
use crate::TursoClient;
use chrono::Utc;
use helios_domain_models::{LocationSource, Site};
use libsql::{params, Row};
use tracing::{info, instrument};
use uuid::Uuid;

pub struct SiteRepository {
    database_client: TursoClient,
}

/// Datos de alta de un sitio; las coordenadas son opcionales.
#[derive(Debug, Clone)]
pub struct NewSite {
    pub tenant_id: String,
    pub name: String,
    pub address_line: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub location_lock: bool,
}

/// Parche manual de ubicación (camino de usuario autenticado).
#[derive(Debug, Clone)]
pub struct ManualLocationPatch {
    pub lat: f64,
    pub lon: f64,
    pub source: LocationSource,
    pub accuracy_m: Option<f64>,
    pub lock: Option<bool>,
    pub address_line: Option<String>,
    pub updated_by_user_id: String,
}

const SITE_COLUMNS: &str = "id, tenant_id, name, address_line, city, postal_code, country, \
     lat, lon, location_source, location_accuracy_m, location_confidence, \
     location_updated_at, location_updated_by_user_id, location_lock, created_at, updated_at";

pub(crate) fn map_site_row(row: &Row) -> Result<Site, DbError> {
    let location_source_raw: Option<String> = row.get(9)?;
    let location_source = match location_source_raw {
        Some(raw) => Some(mappers::decode_enum(&raw, LocationSource::parse, "LocationSource")?),
        None => None,
    };

    Ok(Site {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        address_line: row.get(3)?,
        city: row.get(4)?,
        postal_code: row.get(5)?,
        country: row.get(6)?,
        lat: row.get(7)?,
        lon: row.get(8)?,
        location_source,
        location_accuracy_m: row.get(10)?,
        location_confidence: row.get(11)?,
        location_updated_at: mappers::get_opt_timestamp(row, 12)?,
        location_updated_by_user_id: row.get(13)?,
        location_lock: mappers::get_bool(row, 14)?,
        created_at: mappers::get_timestamp(row, 15)?,
        updated_at: mappers::get_timestamp(row, 16)?,
    })
}

impl SiteRepository {
    #[must_use]
    pub fn new(database_client: TursoClient) -> Self {
        Self { database_client }
    }

    #[instrument(skip(self, new_site), fields(tenant = %new_site.tenant_id))]
    pub async fn create(&self, new_site: NewSite) -> Result<Site, DbError> {
        let connection = self.database_client.get_connection()?;
        let now = Utc::now();
        let site_id = Uuid::new_v4().to_string();

        connection
            .execute(
                "INSERT INTO sites (id, tenant_id, name, address_line, city, postal_code, country,
                                    lat, lon, location_lock, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    site_id.clone(),
                    new_site.tenant_id.clone(),
                    new_site.name.clone(),
                    new_site.address_line.clone(),
                    new_site.city.clone(),
                    new_site.postal_code.clone(),
                    new_site.country.clone(),
                    new_site.lat,
                    new_site.lon,
                    new_site.location_lock as i64,
                    now.to_rfc3339(),
                    now.to_rfc3339()
                ],
            )
            .await
            .map_err(DbError::from_engine)?;

        info!("📍 [SITES]: Site {} crystallized under tenant {}.", site_id, new_site.tenant_id);

        self.find_by_id_in_tenant(&new_site.tenant_id, &site_id)
            .await?
            .ok_or(DbError::NotFound)
    }

    pub async fn find_by_id_in_tenant(
        &self,
        tenant_id: &str,
        site_id: &str,
    ) -> Result<Option<Site>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!("SELECT {SITE_COLUMNS} FROM sites WHERE id = ?1 AND tenant_id = ?2"),
                params![site_id, tenant_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(map_site_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_by_tenant(&self, tenant_id: &str) -> Result<Vec<Site>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!(
                    "SELECT {SITE_COLUMNS} FROM sites WHERE tenant_id = ?1 ORDER BY created_at ASC"
                ),
                params![tenant_id],
            )
            .await?;

        let mut sites = Vec::new();
        while let Some(row) = rows.next().await? {
            sites.push(map_site_row(&row)?);
        }
        Ok(sites)
    }

    /**
     * Parche manual de ubicación. El candado solo muta cuando el parche
     * lo trae explícito; la procedencia y el autor quedan registrados.
     */
    #[instrument(skip(self, patch))]
    pub async fn apply_manual_location(
        &self,
        tenant_id: &str,
        site_id: &str,
        patch: ManualLocationPatch,
    ) -> Result<Site, DbError> {
        let connection = self.database_client.get_connection()?;
        let now = Utc::now();

        let updated_rows = connection
            .execute(
                "UPDATE sites SET
                     lat = ?3,
                     lon = ?4,
                     location_source = ?5,
                     location_accuracy_m = ?6,
                     location_lock = COALESCE(?7, location_lock),
                     address_line = COALESCE(?8, address_line),
                     location_updated_at = ?9,
                     location_updated_by_user_id = ?10,
                     updated_at = ?9
                 WHERE id = ?1 AND tenant_id = ?2",
                params![
                    site_id,
                    tenant_id,
                    patch.lat,
                    patch.lon,
                    patch.source.as_str(),
                    patch.accuracy_m,
                    patch.lock.map(|flag| flag as i64),
                    patch.address_line.clone(),
                    now.to_rfc3339(),
                    patch.updated_by_user_id.clone()
                ],
            )
            .await?;

        if updated_rows == 0 {
            return Err(DbError::NotFound);
        }

        self.find_by_id_in_tenant(tenant_id, site_id)
            .await?
            .ok_or(DbError::NotFound)
    }

    /// Verificación de propiedad END_USER: ¿algún dispositivo del sitio
    /// pertenece al usuario?
    pub async fn has_device_owned_by(
        &self,
        site_id: &str,
        user_id: &str,
    ) -> Result<bool, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT COUNT(*) FROM devices WHERE site_id = ?1 AND owner_user_id = ?2",
                params![site_id, user_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)? > 0),
            None => Ok(false),
        }
    }

    /// Sitios con coordenadas cristalizadas (barrido climático SYSTEM,
    /// sin filtro de tenant).
    pub async fn list_with_coordinates(&self) -> Result<Vec<Site>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!(
                    "SELECT {SITE_COLUMNS} FROM sites WHERE lat IS NOT NULL AND lon IS NOT NULL"
                ),
                (),
            )
            .await?;

        let mut sites = Vec::new();
        while let Some(row) = rows.next().await? {
            sites.push(map_site_row(&row)?);
        }
        Ok(sites)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::device::{DeviceRepository, NewDevice};
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

    fn site_fixture(tenant_id: &str, name: &str) -> NewSite {
        NewSite {
            tenant_id: tenant_id.to_string(),
            name: name.to_string(),
            address_line: None,
            city: None,
            postal_code: None,
            country: None,
            lat: None,
            lon: None,
            location_lock: false,
        }
    }

    fn device_fixture(
        tenant_id: &str,
        serial: &str,
        site_id: Option<String>,
        owner_user_id: Option<String>,
    ) -> NewDevice {
        NewDevice {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            serial_number: serial.to_string(),
            model: "HELIOS-200L".into(),
            name: None,
            site_id,
            owner_user_id,
            notes: None,
            tags: serde_json::json!({}),
            sim_iccid: None,
        }
    }

    #[tokio::test]
    async fn certify_end_user_ownership_is_per_site() {
        let (client, _guard) = test_client().await;
        let tenants = TenantRepository::new(client.clone());
        let sites = SiteRepository::new(client.clone());
        let devices = DeviceRepository::new(client);

        let tenant = tenants.create("Own Org", TenantType::Installer).await.unwrap();
        let occupied_site = sites.create(site_fixture(&tenant.id, "Rooftop A")).await.unwrap();
        let empty_site = sites.create(site_fixture(&tenant.id, "Rooftop B")).await.unwrap();

        // Unidad del sitio A con propietario + otra sin propietario.
        devices
            .create_with_secret(
                device_fixture(&tenant.id, "SN-OWN-1", Some(occupied_site.id.clone()),
                               Some("owner-user".into())),
                "digest-a",
            )
            .await
            .unwrap();
        devices
            .create_with_secret(
                device_fixture(&tenant.id, "SN-OWN-2", Some(occupied_site.id.clone()), None),
                "digest-b",
            )
            .await
            .unwrap();

        // El propietario califica en el sitio A.
        assert!(sites.has_device_owned_by(&occupied_site.id, "owner-user").await.unwrap());

        // Un extraño no califica aunque el sitio tenga unidades.
        assert!(!sites.has_device_owned_by(&occupied_site.id, "stranger").await.unwrap());

        // La propiedad NO se propaga a otros sitios del mismo tenant.
        assert!(!sites.has_device_owned_by(&empty_site.id, "owner-user").await.unwrap());
    }

    #[tokio::test]
    async fn certify_manual_patch_is_tenant_scoped() {
        let (client, _guard) = test_client().await;
        let tenants = TenantRepository::new(client.clone());
        let sites = SiteRepository::new(client);

        let tenant_a = tenants.create("A", TenantType::Installer).await.unwrap();
        let tenant_b = tenants.create("B", TenantType::Retailer).await.unwrap();
        let site = sites.create(site_fixture(&tenant_a.id, "Rooftop")).await.unwrap();

        let patch = ManualLocationPatch {
            lat: 37.98,
            lon: 23.72,
            source: LocationSource::Manual,
            accuracy_m: None,
            lock: None,
            address_line: None,
            updated_by_user_id: "user-1".into(),
        };

        // Desde el tenant ajeno la fila no existe.
        let foreign = sites.apply_manual_location(&tenant_b.id, &site.id, patch.clone()).await;
        assert!(matches!(foreign, Err(DbError::NotFound)));

        let patched = sites.apply_manual_location(&tenant_a.id, &site.id, patch).await.unwrap();
        assert_eq!(patched.lat, Some(37.98));
        assert_eq!(patched.location_source, Some(LocationSource::Manual));
        assert_eq!(patched.location_updated_by_user_id.as_deref(), Some("user-1"));
    }
}
