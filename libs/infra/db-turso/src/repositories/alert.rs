// [libs/infra/db-turso/src/repositories/alert.rs]
/*!
 * =================================================================
 * APARATO: ALERT REPOSITORY (V4.1 - DEDUPE AUTHORITY)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: REGLAS POR TENANT Y EVENTOS CON CLAVE ÚNICA
 *
 * # Logic:
 * La clave de dedupe porta un índice único en el almacén. La inserción
 * concurrente duplicada NO es un fallo del barrido: se detecta como
 * UniqueViolation y se degrada a no-op benigno.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::mappers;
use crate::TursoClient;
use chrono::Utc;
use helios_domain_models::{
    AlertEvent, AlertEventStatus, AlertRule, AlertSeverity,
};
use libsql::{params, Row, Value};
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub struct AlertRepository {
    database_client: TursoClient,
}

/// Filtros de listado de eventos.
#[derive(Debug, Clone, Default)]
pub struct AlertEventFilter {
    pub status: Option<AlertEventStatus>,
    pub severity: Option<AlertSeverity>,
    pub device_id: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

const RULE_COLUMNS: &str =
    "id, tenant_id, name, enabled, rule_type, params_json, severity, created_at, updated_at";

const EVENT_COLUMNS: &str = "id, tenant_id, device_id, rule_id, severity, status, dedupe_key, \
     details_json, opened_at, acknowledged_at, closed_at";

fn map_rule_row(row: &Row) -> Result<AlertRule, DbError> {
    let severity_raw: String = row.get(6)?;
    Ok(AlertRule {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        enabled: mappers::get_bool(row, 3)?,
        rule_type: row.get(4)?,
        params: mappers::get_json(row, 5)?,
        severity: mappers::decode_enum(&severity_raw, AlertSeverity::parse, "AlertSeverity")?,
        created_at: mappers::get_timestamp(row, 7)?,
        updated_at: mappers::get_timestamp(row, 8)?,
    })
}

fn map_event_row(row: &Row) -> Result<AlertEvent, DbError> {
    let severity_raw: String = row.get(4)?;
    let status_raw: String = row.get(5)?;
    Ok(AlertEvent {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        device_id: row.get(2)?,
        rule_id: row.get(3)?,
        severity: mappers::decode_enum(&severity_raw, AlertSeverity::parse, "AlertSeverity")?,
        status: mappers::decode_enum(&status_raw, AlertEventStatus::parse, "AlertEventStatus")?,
        dedupe_key: row.get(6)?,
        details: mappers::get_json(row, 7)?,
        opened_at: mappers::get_timestamp(row, 8)?,
        acknowledged_at: mappers::get_opt_timestamp(row, 9)?,
        closed_at: mappers::get_opt_timestamp(row, 10)?,
    })
}

impl AlertRepository {
    #[must_use]
    pub fn new(database_client: TursoClient) -> Self {
        Self { database_client }
    }

    // --- REGLAS ---

    #[instrument(skip(self, params_map))]
    pub async fn create_rule(
        &self,
        tenant_id: &str,
        name: &str,
        rule_type: &str,
        params_map: serde_json::Value,
        severity: AlertSeverity,
        enabled: bool,
    ) -> Result<AlertRule, DbError> {
        let connection = self.database_client.get_connection()?;
        let now = Utc::now();
        let rule_id = Uuid::new_v4().to_string();

        connection
            .execute(
                "INSERT INTO alert_rules (id, tenant_id, name, enabled, rule_type, params_json,
                                          severity, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    rule_id.clone(),
                    tenant_id,
                    name,
                    enabled as i64,
                    rule_type,
                    params_map.to_string(),
                    severity.as_str(),
                    now.to_rfc3339(),
                    now.to_rfc3339()
                ],
            )
            .await
            .map_err(DbError::from_engine)?;

        self.find_rule(tenant_id, &rule_id).await?.ok_or(DbError::NotFound)
    }

    pub async fn find_rule(
        &self,
        tenant_id: &str,
        rule_id: &str,
    ) -> Result<Option<AlertRule>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!("SELECT {RULE_COLUMNS} FROM alert_rules WHERE id = ?1 AND tenant_id = ?2"),
                params![rule_id, tenant_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(map_rule_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_rules_by_tenant(&self, tenant_id: &str) -> Result<Vec<AlertRule>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!(
                    "SELECT {RULE_COLUMNS} FROM alert_rules WHERE tenant_id = ?1
                     ORDER BY created_at ASC"
                ),
                params![tenant_id],
            )
            .await?;

        let mut rules = Vec::new();
        while let Some(row) = rows.next().await? {
            rules.push(map_rule_row(&row)?);
        }
        Ok(rules)
    }

    /// Reglas habilitadas de toda la plataforma (barrido SYSTEM).
    pub async fn list_enabled_rules(&self) -> Result<Vec<AlertRule>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!("SELECT {RULE_COLUMNS} FROM alert_rules WHERE enabled = 1"),
                (),
            )
            .await?;

        let mut rules = Vec::new();
        while let Some(row) = rows.next().await? {
            rules.push(map_rule_row(&row)?);
        }
        Ok(rules)
    }

    #[instrument(skip(self, params_map))]
    pub async fn update_rule(
        &self,
        tenant_id: &str,
        rule_id: &str,
        name: Option<String>,
        enabled: Option<bool>,
        params_map: Option<serde_json::Value>,
        severity: Option<AlertSeverity>,
    ) -> Result<AlertRule, DbError> {
        let connection = self.database_client.get_connection()?;

        let updated_rows = connection
            .execute(
                "UPDATE alert_rules SET
                     name = COALESCE(?3, name),
                     enabled = COALESCE(?4, enabled),
                     params_json = COALESCE(?5, params_json),
                     severity = COALESCE(?6, severity),
                     updated_at = ?7
                 WHERE id = ?1 AND tenant_id = ?2",
                params![
                    rule_id,
                    tenant_id,
                    name,
                    enabled.map(|flag| flag as i64),
                    params_map.map(|p| p.to_string()),
                    severity.map(|s| s.as_str().to_string()),
                    Utc::now().to_rfc3339()
                ],
            )
            .await?;

        if updated_rows == 0 {
            return Err(DbError::NotFound);
        }

        self.find_rule(tenant_id, rule_id).await?.ok_or(DbError::NotFound)
    }

    // --- EVENTOS ---

    /// ¿Existe un evento vivo (OPEN | ACKNOWLEDGED) para la clave?
    /// Los CLOSED no bloquean una nueva apertura.
    pub async fn has_live_event_for_dedupe(&self, dedupe_key: &str) -> Result<bool, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                "SELECT COUNT(*) FROM alert_events
                 WHERE dedupe_key = ?1 AND status IN ('OPEN', 'ACKNOWLEDGED')",
                params![dedupe_key],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(row.get::<i64>(0)? > 0),
            None => Ok(false),
        }
    }

    /**
     * Apertura de evento bajo el índice único de dedupe. La colisión
     * concurrente se degrada a no-op benigno (Ok(None)).
     */
    #[instrument(skip(self, details))]
    pub async fn open_event(
        &self,
        tenant_id: &str,
        device_id: &str,
        rule_id: &str,
        severity: AlertSeverity,
        dedupe_key: &str,
        details: serde_json::Value,
    ) -> Result<Option<AlertEvent>, DbError> {
        let connection = self.database_client.get_connection()?;
        let now = Utc::now();
        let event_id = Uuid::new_v4().to_string();

        let insert_result = connection
            .execute(
                "INSERT INTO alert_events (id, tenant_id, device_id, rule_id, severity, status,
                                           dedupe_key, details_json, opened_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    event_id.clone(),
                    tenant_id,
                    device_id,
                    rule_id,
                    severity.as_str(),
                    AlertEventStatus::Open.as_str(),
                    dedupe_key,
                    details.to_string(),
                    now.to_rfc3339()
                ],
            )
            .await
            .map_err(DbError::from_engine);

        match insert_result {
            Ok(_) => {
                info!("🚨 [ALERTS]: Event {} opened (key {}).", event_id, dedupe_key);
                Ok(self.find_event(tenant_id, &event_id).await?)
            }
            Err(fault) if fault.is_unique_violation() => {
                warn!("🔁 [ALERTS]: Concurrent duplicate for key {}; benign no-op.", dedupe_key);
                Ok(None)
            }
            Err(fault) => Err(fault),
        }
    }

    pub async fn find_event(
        &self,
        tenant_id: &str,
        event_id: &str,
    ) -> Result<Option<AlertEvent>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM alert_events WHERE id = ?1 AND tenant_id = ?2"
                ),
                params![event_id, tenant_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(map_event_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_events(
        &self,
        tenant_id: &str,
        filter: &AlertEventFilter,
    ) -> Result<(Vec<AlertEvent>, i64), DbError> {
        let connection = self.database_client.get_connection()?;

        let mut predicates = String::from("tenant_id = ?1");
        let mut bound_values: Vec<Value> = vec![Value::from(tenant_id.to_string())];

        if let Some(status) = filter.status {
            bound_values.push(Value::from(status.as_str().to_string()));
            predicates.push_str(&format!(" AND status = ?{}", bound_values.len()));
        }
        if let Some(severity) = filter.severity {
            bound_values.push(Value::from(severity.as_str().to_string()));
            predicates.push_str(&format!(" AND severity = ?{}", bound_values.len()));
        }
        if let Some(device_id) = &filter.device_id {
            bound_values.push(Value::from(device_id.clone()));
            predicates.push_str(&format!(" AND device_id = ?{}", bound_values.len()));
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
                    "SELECT {EVENT_COLUMNS} FROM alert_events WHERE {predicates}
                     ORDER BY opened_at DESC LIMIT ?{limit_placeholder} OFFSET ?{offset_placeholder}"
                ),
                page_values,
            )
            .await?;

        let mut events = Vec::new();
        while let Some(row) = rows.next().await? {
            events.push(map_event_row(&row)?);
        }

        let mut count_rows = connection
            .query(
                &format!("SELECT COUNT(*) FROM alert_events WHERE {predicates}"),
                bound_values,
            )
            .await?;

        let total = match count_rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };

        Ok((events, total))
    }

    /// Transición OPEN -> ACKNOWLEDGED.
    #[instrument(skip(self))]
    pub async fn acknowledge_event(
        &self,
        tenant_id: &str,
        event_id: &str,
    ) -> Result<AlertEvent, DbError> {
        let connection = self.database_client.get_connection()?;
        let now = Utc::now();

        let updated_rows = connection
            .execute(
                "UPDATE alert_events SET status = 'ACKNOWLEDGED', acknowledged_at = ?3
                 WHERE id = ?1 AND tenant_id = ?2 AND status = 'OPEN'",
                params![event_id, tenant_id, now.to_rfc3339()],
            )
            .await?;

        if updated_rows == 0 {
            // Distinción: inexistente vs transición inválida.
            return match self.find_event(tenant_id, event_id).await? {
                Some(_) => Err(DbError::InvalidState),
                None => Err(DbError::NotFound),
            };
        }

        self.find_event(tenant_id, event_id).await?.ok_or(DbError::NotFound)
    }

    /// Transición OPEN | ACKNOWLEDGED -> CLOSED. Libera la clave de dedupe.
    #[instrument(skip(self))]
    pub async fn close_event(
        &self,
        tenant_id: &str,
        event_id: &str,
    ) -> Result<AlertEvent, DbError> {
        let connection = self.database_client.get_connection()?;
        let now = Utc::now();

        let updated_rows = connection
            .execute(
                "UPDATE alert_events SET status = 'CLOSED', closed_at = ?3, dedupe_key = NULL
                 WHERE id = ?1 AND tenant_id = ?2 AND status IN ('OPEN', 'ACKNOWLEDGED')",
                params![event_id, tenant_id, now.to_rfc3339()],
            )
            .await?;

        if updated_rows == 0 {
            return match self.find_event(tenant_id, event_id).await? {
                Some(_) => Err(DbError::InvalidState),
                None => Err(DbError::NotFound),
            };
        }

        self.find_event(tenant_id, event_id).await?.ok_or(DbError::NotFound)
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
    async fn certify_dedupe_key_collision_is_benign_noop() {
        let (client, _guard) = test_client().await;
        let tenants = TenantRepository::new(client.clone());
        let alerts = AlertRepository::new(client);

        let tenant = tenants.create("Alert Org", TenantType::Installer).await.unwrap();

        let opened = alerts
            .open_event(&tenant.id, "dev-1", "rule-1", AlertSeverity::Warning,
                        "dev-1:rule-1", serde_json::json!({}))
            .await
            .unwrap();
        assert!(opened.is_some());

        // Segunda apertura con la misma clave: el índice único la detiene
        // y el repositorio la degrada a no-op.
        let duplicate = alerts
            .open_event(&tenant.id, "dev-1", "rule-1", AlertSeverity::Warning,
                        "dev-1:rule-1", serde_json::json!({}))
            .await
            .unwrap();
        assert!(duplicate.is_none());

        assert!(alerts.has_live_event_for_dedupe("dev-1:rule-1").await.unwrap());
    }

    #[tokio::test]
    async fn certify_closed_events_release_the_dedupe_key() {
        let (client, _guard) = test_client().await;
        let tenants = TenantRepository::new(client.clone());
        let alerts = AlertRepository::new(client);

        let tenant = tenants.create("Alert Org", TenantType::Installer).await.unwrap();

        let event = alerts
            .open_event(&tenant.id, "dev-2", "rule-2", AlertSeverity::Critical,
                        "dev-2:rule-2", serde_json::json!({}))
            .await
            .unwrap()
            .unwrap();

        let acknowledged = alerts.acknowledge_event(&tenant.id, &event.id).await.unwrap();
        assert_eq!(acknowledged.status, AlertEventStatus::Acknowledged);
        assert!(acknowledged.acknowledged_at.is_some());

        // ACKNOWLEDGED sigue bloqueando nuevas aperturas.
        assert!(alerts.has_live_event_for_dedupe("dev-2:rule-2").await.unwrap());

        let closed = alerts.close_event(&tenant.id, &event.id).await.unwrap();
        assert_eq!(closed.status, AlertEventStatus::Closed);
        assert!(closed.closed_at.is_some());

        // CLOSED no bloquea: una nueva apertura con la misma clave procede.
        assert!(!alerts.has_live_event_for_dedupe("dev-2:rule-2").await.unwrap());
        let reopened = alerts
            .open_event(&tenant.id, "dev-2", "rule-2", AlertSeverity::Critical,
                        "dev-2:rule-2", serde_json::json!({}))
            .await
            .unwrap();
        assert!(reopened.is_some());
    }

    #[tokio::test]
    async fn certify_ack_requires_open_state() {
        let (client, _guard) = test_client().await;
        let tenants = TenantRepository::new(client.clone());
        let alerts = AlertRepository::new(client);

        let tenant = tenants.create("Alert Org", TenantType::Installer).await.unwrap();
        let event = alerts
            .open_event(&tenant.id, "dev-3", "rule-3", AlertSeverity::Info,
                        "dev-3:rule-3", serde_json::json!({}))
            .await
            .unwrap()
            .unwrap();

        alerts.close_event(&tenant.id, &event.id).await.unwrap();

        let stale_ack = alerts.acknowledge_event(&tenant.id, &event.id).await;
        assert!(matches!(stale_ack, Err(DbError::InvalidState)));

        let ghost = alerts.acknowledge_event(&tenant.id, "missing").await;
        assert!(matches!(ghost, Err(DbError::NotFound)));
    }
}
