// [libs/infra/db-turso/src/repositories/audit.rs]
/*!
 * APARATO: AUDIT TRAIL REPOSITORY (ESTRATO L3)
 * RESPONSABILIDAD: REGISTRO SOLO-ANEXO DEL PLANO DE CONTROL
 *
 * # Logic:
 * Las filas jamás se mutan ni se borran. El camino best-effort vive en
 * el estrato de aplicación: un fallo aquí se registra y no se propaga.
 */

use crate::errors::DbError;
use crate::repositories::mappers;
use crate::TursoClient;
use chrono::Utc;
use helios_domain_models::{ActorType, AuditRecord};
use libsql::{params, Row, Value};
use tracing::instrument;
use uuid::Uuid;

pub struct AuditRepository {
    database_client: TursoClient,
}

/// Filtros del visor de auditoría.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub action: Option<String>,
    pub entity_type: Option<String>,
    pub limit: i64,
}

const AUDIT_COLUMNS: &str = "id, tenant_id, actor_user_id, actor_type, action, entity_type, \
     entity_id, metadata_json, created_at";

fn map_audit_row(row: &Row) -> Result<AuditRecord, DbError> {
    let actor_type_raw: String = row.get(3)?;
    Ok(AuditRecord {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        actor_user_id: row.get(2)?,
        actor_type: mappers::decode_enum(&actor_type_raw, ActorType::parse, "ActorType")?,
        action: row.get(4)?,
        entity_type: row.get(5)?,
        entity_id: row.get(6)?,
        metadata: mappers::get_json(row, 7)?,
        created_at: mappers::get_timestamp(row, 8)?,
    })
}

impl AuditRepository {
    #[must_use]
    pub fn new(database_client: TursoClient) -> Self {
        Self { database_client }
    }

    #[instrument(skip(self, metadata))]
    pub async fn append(
        &self,
        tenant_id: Option<&str>,
        actor_user_id: Option<&str>,
        actor_type: ActorType,
        action: &str,
        entity_type: &str,
        entity_id: &str,
        metadata: serde_json::Value,
    ) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;

        connection
            .execute(
                "INSERT INTO audit_logs (id, tenant_id, actor_user_id, actor_type, action,
                                         entity_type, entity_id, metadata_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    Uuid::new_v4().to_string(),
                    tenant_id,
                    actor_user_id,
                    actor_type.as_str(),
                    action,
                    entity_type,
                    entity_id,
                    metadata.to_string(),
                    Utc::now().to_rfc3339()
                ],
            )
            .await
            .map_err(DbError::from_engine)?;

        Ok(())
    }

    pub async fn list_by_tenant(
        &self,
        tenant_id: &str,
        filter: &AuditFilter,
    ) -> Result<Vec<AuditRecord>, DbError> {
        let connection = self.database_client.get_connection()?;

        let mut predicates = String::from("tenant_id = ?1");
        let mut bound_values: Vec<Value> = vec![Value::from(tenant_id.to_string())];

        if let Some(action) = &filter.action {
            bound_values.push(Value::from(action.clone()));
            predicates.push_str(&format!(" AND action = ?{}", bound_values.len()));
        }
        if let Some(entity_type) = &filter.entity_type {
            bound_values.push(Value::from(entity_type.clone()));
            predicates.push_str(&format!(" AND entity_type = ?{}", bound_values.len()));
        }

        let page_limit = if filter.limit > 0 { filter.limit } else { 100 };
        bound_values.push(Value::from(page_limit));
        let limit_placeholder = bound_values.len();

        let mut rows = connection
            .query(
                &format!(
                    "SELECT {AUDIT_COLUMNS} FROM audit_logs WHERE {predicates}
                     ORDER BY created_at DESC LIMIT ?{limit_placeholder}"
                ),
                bound_values,
            )
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(map_audit_row(&row)?);
        }
        Ok(records)
    }
}
