// [libs/infra/db-turso/src/repositories/entitlement.rs]
/*!
 * =================================================================
 * APARATO: ENTITLEMENT REPOSITORY (V2.2 - PRECEDENCE LEDGER)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: FILAS DE BANDERA CON UPSERT SOBRE CLAVE TERNARIA
 *
 * # Logic:
 * La unicidad (tenant, clave, dispositivo) se materializa con un
 * centinela '' para las filas de alcance TENANT, porque SQLite trata
 * cada NULL como distinto en los índices únicos.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::mappers;
use crate::TursoClient;
use chrono::Utc;
use helios_domain_models::entitlement::resolve_entitlement;
use helios_domain_models::{Entitlement, EntitlementKey, EntitlementScope};
use libsql::{params, Row};
use tracing::{info, instrument};
use uuid::Uuid;

pub struct EntitlementRepository {
    database_client: TursoClient,
}

const ENTITLEMENT_COLUMNS: &str =
    "id, tenant_id, scope, device_id, feature_key, enabled, created_at, updated_at";

fn map_entitlement_row(row: &Row) -> Result<Entitlement, DbError> {
    let scope_raw: String = row.get(2)?;
    let device_sentinel: String = row.get(3)?;
    let key_raw: String = row.get(4)?;

    Ok(Entitlement {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        scope: mappers::decode_enum(&scope_raw, EntitlementScope::parse, "EntitlementScope")?,
        device_id: (!device_sentinel.is_empty()).then_some(device_sentinel),
        key: mappers::decode_enum(&key_raw, EntitlementKey::parse, "EntitlementKey")?,
        enabled: mappers::get_bool(row, 5)?,
        created_at: mappers::get_timestamp(row, 6)?,
        updated_at: mappers::get_timestamp(row, 7)?,
    })
}

impl EntitlementRepository {
    #[must_use]
    pub fn new(database_client: TursoClient) -> Self {
        Self { database_client }
    }

    /**
     * Upsert idempotente sobre la clave ternaria (tenant, clave, device).
     */
    #[instrument(skip(self))]
    pub async fn upsert(
        &self,
        tenant_id: &str,
        scope: EntitlementScope,
        device_id: Option<&str>,
        key: EntitlementKey,
        enabled: bool,
    ) -> Result<Entitlement, DbError> {
        let connection = self.database_client.get_connection()?;
        let now = Utc::now();
        let device_sentinel = device_id.unwrap_or("");

        connection
            .execute(
                "INSERT INTO entitlements (id, tenant_id, scope, device_id, feature_key, enabled,
                                           created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
                 ON CONFLICT(tenant_id, feature_key, device_id) DO UPDATE SET
                     scope = excluded.scope,
                     enabled = excluded.enabled,
                     updated_at = excluded.updated_at",
                params![
                    Uuid::new_v4().to_string(),
                    tenant_id,
                    scope.as_str(),
                    device_sentinel,
                    key.as_str(),
                    enabled as i64,
                    now.to_rfc3339()
                ],
            )
            .await
            .map_err(DbError::from_engine)?;

        info!(
            "🎚️ [ENTITLEMENTS]: {} = {} for tenant {} (device: {}).",
            key.as_str(),
            enabled,
            tenant_id,
            if device_sentinel.is_empty() { "-" } else { device_sentinel }
        );

        self.find_row(tenant_id, key, device_id).await?.ok_or(DbError::NotFound)
    }

    pub async fn find_row(
        &self,
        tenant_id: &str,
        key: EntitlementKey,
        device_id: Option<&str>,
    ) -> Result<Option<Entitlement>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!(
                    "SELECT {ENTITLEMENT_COLUMNS} FROM entitlements
                     WHERE tenant_id = ?1 AND feature_key = ?2 AND device_id = ?3"
                ),
                params![tenant_id, key.as_str(), device_id.unwrap_or("")],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(map_entitlement_row(&row)?)),
            None => Ok(None),
        }
    }

    /**
     * Resolución completa: fila DEVICE si hay dispositivo, fila TENANT,
     * y la tabla de defaults como último recurso (función pura L2).
     */
    pub async fn resolve(
        &self,
        tenant_id: &str,
        key: EntitlementKey,
        device_id: Option<&str>,
    ) -> Result<bool, DbError> {
        let device_row = match device_id {
            Some(device_id) => self.find_row(tenant_id, key, Some(device_id)).await?,
            None => None,
        };
        let tenant_row = self.find_row(tenant_id, key, None).await?;

        Ok(resolve_entitlement(key, device_row.as_ref(), tenant_row.as_ref()))
    }

    pub async fn list_by_tenant(&self, tenant_id: &str) -> Result<Vec<Entitlement>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!(
                    "SELECT {ENTITLEMENT_COLUMNS} FROM entitlements
                     WHERE tenant_id = ?1 ORDER BY created_at ASC"
                ),
                params![tenant_id],
            )
            .await?;

        let mut entitlements = Vec::new();
        while let Some(row) = rows.next().await? {
            entitlements.push(map_entitlement_row(&row)?);
        }
        Ok(entitlements)
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

    #[tokio::test]
    async fn certify_device_row_wins_over_tenant_row() {
        let (client, _guard) = test_client().await;
        let tenants = TenantRepository::new(client.clone());
        let entitlements = EntitlementRepository::new(client);

        let tenant = tenants.create("Flag Org", TenantType::Retailer).await.unwrap();

        // Sin filas: el default de BASIC_REMOTE_BOOST es verdadero.
        assert!(entitlements
            .resolve(&tenant.id, EntitlementKey::BasicRemoteBoost, Some("dev-1"))
            .await
            .unwrap());

        // Fila TENANT en falso la apaga.
        entitlements
            .upsert(&tenant.id, EntitlementScope::Tenant, None, EntitlementKey::BasicRemoteBoost, false)
            .await
            .unwrap();
        assert!(!entitlements
            .resolve(&tenant.id, EntitlementKey::BasicRemoteBoost, Some("dev-1"))
            .await
            .unwrap());

        // Fila DEVICE en verdadero gana sobre la fila TENANT.
        entitlements
            .upsert(&tenant.id, EntitlementScope::Device, Some("dev-1"),
                    EntitlementKey::BasicRemoteBoost, true)
            .await
            .unwrap();
        assert!(entitlements
            .resolve(&tenant.id, EntitlementKey::BasicRemoteBoost, Some("dev-1"))
            .await
            .unwrap());

        // Otra unidad sin fila DEVICE sigue viendo la fila TENANT.
        assert!(!entitlements
            .resolve(&tenant.id, EntitlementKey::BasicRemoteBoost, Some("dev-2"))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn certify_upsert_is_idempotent_on_ternary_key() {
        let (client, _guard) = test_client().await;
        let tenants = TenantRepository::new(client.clone());
        let entitlements = EntitlementRepository::new(client);

        let tenant = tenants.create("Flag Org", TenantType::Retailer).await.unwrap();

        let first = entitlements
            .upsert(&tenant.id, EntitlementScope::Tenant, None,
                    EntitlementKey::SmartHomeIntegration, true)
            .await
            .unwrap();
        let second = entitlements
            .upsert(&tenant.id, EntitlementScope::Tenant, None,
                    EntitlementKey::SmartHomeIntegration, false)
            .await
            .unwrap();

        // Misma fila, enabled actualizado: sin duplicados.
        assert_eq!(first.id, second.id);
        assert!(!second.enabled);

        let all_rows = entitlements.list_by_tenant(&tenant.id).await.unwrap();
        assert_eq!(all_rows.len(), 1);
    }
}
