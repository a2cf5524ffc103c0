// [libs/infra/db-turso/src/repositories/tenant.rs]
/*!
 * APARATO: TENANT REPOSITORY (ESTRATO L3)
 * RESPONSABILIDAD: PERSISTENCIA DE ORGANIZACIONES ARRENDATARIAS
 */

use crate::errors::DbError;
use crate::repositories::mappers;
use crate::TursoClient;
use chrono::Utc;
use helios_domain_models::{Tenant, TenantStatus, TenantType};
use libsql::{params, Row};
use tracing::{info, instrument};
use uuid::Uuid;

pub struct TenantRepository {
    database_client: TursoClient,
}

const TENANT_COLUMNS: &str =
    "id, name, tenant_type, status, settings_json, created_at, updated_at";

fn map_tenant_row(row: &Row) -> Result<Tenant, DbError> {
    let tenant_type_raw: String = row.get(2)?;
    let status_raw: String = row.get(3)?;

    Ok(Tenant {
        id: row.get(0)?,
        name: row.get(1)?,
        tenant_type: mappers::decode_enum(&tenant_type_raw, TenantType::parse, "TenantType")?,
        status: mappers::decode_enum(&status_raw, TenantStatus::parse, "TenantStatus")?,
        settings: mappers::get_json(row, 4)?,
        created_at: mappers::get_timestamp(row, 5)?,
        updated_at: mappers::get_timestamp(row, 6)?,
    })
}

impl TenantRepository {
    #[must_use]
    pub fn new(database_client: TursoClient) -> Self {
        Self { database_client }
    }

    #[instrument(skip(self))]
    pub async fn create(&self, name: &str, tenant_type: TenantType) -> Result<Tenant, DbError> {
        let connection = self.database_client.get_connection()?;
        let now = Utc::now();

        let tenant = Tenant {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            tenant_type,
            status: TenantStatus::Active,
            settings: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        };

        connection
            .execute(
                "INSERT INTO tenants (id, name, tenant_type, status, settings_json, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    tenant.id.clone(),
                    tenant.name.clone(),
                    tenant.tenant_type.as_str(),
                    tenant.status.as_str(),
                    tenant.settings.to_string(),
                    now.to_rfc3339(),
                    now.to_rfc3339()
                ],
            )
            .await
            .map_err(DbError::from_engine)?;

        info!("🏢 [TENANTS]: Organization {} crystallized.", tenant.id);
        Ok(tenant)
    }

    pub async fn find_by_id(&self, tenant_id: &str) -> Result<Option<Tenant>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE id = ?1"),
                params![tenant_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(map_tenant_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Vista global: reservada al rol PLATFORM_ADMIN.
    pub async fn list_all(&self) -> Result<Vec<Tenant>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!("SELECT {TENANT_COLUMNS} FROM tenants ORDER BY created_at ASC"),
                (),
            )
            .await?;

        let mut tenants = Vec::new();
        while let Some(row) = rows.next().await? {
            tenants.push(map_tenant_row(&row)?);
        }
        Ok(tenants)
    }

    /// Vista acotada a las membresías del llamador.
    pub async fn list_by_ids(&self, tenant_ids: &[String]) -> Result<Vec<Tenant>, DbError> {
        let mut tenants = Vec::with_capacity(tenant_ids.len());
        for tenant_id in tenant_ids {
            if let Some(tenant) = self.find_by_id(tenant_id).await? {
                tenants.push(tenant);
            }
        }
        Ok(tenants)
    }
}
