// [libs/infra/db-turso/src/repositories/notification.rs]
/*!
 * =================================================================
 * APARATO: NOTIFICATION OUTBOX REPOSITORY (V2.6 - HERALD DRAIN)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: CANALES POR TENANT Y COLA SALIENTE (OUTBOX)
 *
 * # Logic:
 * El productor encola QUEUED; el consumidor drena hasta N eventos, los
 * más antiguos primero, y sella SENT o FAILED. El reintento es política
 * externa: aquí no hay re-encolado.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::mappers;
use crate::TursoClient;
use chrono::Utc;
use helios_domain_models::{
    ChannelType, NotificationChannel, NotificationEvent, NotificationStatus,
};
use libsql::{params, Row};
use tracing::{info, instrument};
use uuid::Uuid;

pub struct NotificationRepository {
    database_client: TursoClient,
}

const CHANNEL_COLUMNS: &str = "id, tenant_id, channel_type, config_json, enabled, created_at";

const EVENT_COLUMNS: &str =
    "id, tenant_id, channel_id, alert_event_id, status, payload_json, sent_at, error_msg, created_at";

fn map_channel_row(row: &Row) -> Result<NotificationChannel, DbError> {
    let channel_type_raw: String = row.get(2)?;
    Ok(NotificationChannel {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        channel_type: mappers::decode_enum(&channel_type_raw, ChannelType::parse, "ChannelType")?,
        config: mappers::get_json(row, 3)?,
        enabled: mappers::get_bool(row, 4)?,
        created_at: mappers::get_timestamp(row, 5)?,
    })
}

fn map_event_row(row: &Row) -> Result<NotificationEvent, DbError> {
    let status_raw: String = row.get(4)?;
    Ok(NotificationEvent {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        channel_id: row.get(2)?,
        alert_event_id: row.get(3)?,
        status: mappers::decode_enum(&status_raw, NotificationStatus::parse, "NotificationStatus")?,
        payload: mappers::get_json(row, 5)?,
        sent_at: mappers::get_opt_timestamp(row, 6)?,
        error_msg: row.get(7)?,
        created_at: mappers::get_timestamp(row, 8)?,
    })
}

impl NotificationRepository {
    #[must_use]
    pub fn new(database_client: TursoClient) -> Self {
        Self { database_client }
    }

    // --- CANALES ---

    #[instrument(skip(self, config))]
    pub async fn create_channel(
        &self,
        tenant_id: &str,
        channel_type: ChannelType,
        config: serde_json::Value,
        enabled: bool,
    ) -> Result<NotificationChannel, DbError> {
        let connection = self.database_client.get_connection()?;
        let now = Utc::now();
        let channel_id = Uuid::new_v4().to_string();

        connection
            .execute(
                "INSERT INTO notification_channels (id, tenant_id, channel_type, config_json,
                                                    enabled, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    channel_id.clone(),
                    tenant_id,
                    channel_type.as_str(),
                    config.to_string(),
                    enabled as i64,
                    now.to_rfc3339()
                ],
            )
            .await
            .map_err(DbError::from_engine)?;

        info!("📣 [CHANNELS]: {} channel {} registered.", channel_type.as_str(), channel_id);

        let mut rows = connection
            .query(
                &format!("SELECT {CHANNEL_COLUMNS} FROM notification_channels WHERE id = ?1"),
                params![channel_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => map_channel_row(&row),
            None => Err(DbError::NotFound),
        }
    }

    pub async fn find_channel_by_id(
        &self,
        channel_id: &str,
    ) -> Result<Option<NotificationChannel>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!("SELECT {CHANNEL_COLUMNS} FROM notification_channels WHERE id = ?1"),
                params![channel_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(map_channel_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn list_channels_by_tenant(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<NotificationChannel>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!(
                    "SELECT {CHANNEL_COLUMNS} FROM notification_channels
                     WHERE tenant_id = ?1 ORDER BY created_at ASC"
                ),
                params![tenant_id],
            )
            .await?;

        let mut channels = Vec::new();
        while let Some(row) = rows.next().await? {
            channels.push(map_channel_row(&row)?);
        }
        Ok(channels)
    }

    pub async fn list_enabled_channels_by_tenant(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<NotificationChannel>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!(
                    "SELECT {CHANNEL_COLUMNS} FROM notification_channels
                     WHERE tenant_id = ?1 AND enabled = 1"
                ),
                params![tenant_id],
            )
            .await?;

        let mut channels = Vec::new();
        while let Some(row) = rows.next().await? {
            channels.push(map_channel_row(&row)?);
        }
        Ok(channels)
    }

    // --- OUTBOX ---

    #[instrument(skip(self, payload))]
    pub async fn enqueue_event(
        &self,
        tenant_id: &str,
        channel_id: &str,
        alert_event_id: Option<String>,
        payload: serde_json::Value,
    ) -> Result<NotificationEvent, DbError> {
        let connection = self.database_client.get_connection()?;
        let now = Utc::now();
        let event_id = Uuid::new_v4().to_string();

        connection
            .execute(
                "INSERT INTO notification_events (id, tenant_id, channel_id, alert_event_id,
                                                  status, payload_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    event_id.clone(),
                    tenant_id,
                    channel_id,
                    alert_event_id,
                    NotificationStatus::Queued.as_str(),
                    payload.to_string(),
                    now.to_rfc3339()
                ],
            )
            .await
            .map_err(DbError::from_engine)?;

        let mut rows = connection
            .query(
                &format!("SELECT {EVENT_COLUMNS} FROM notification_events WHERE id = ?1"),
                params![event_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => map_event_row(&row),
            None => Err(DbError::NotFound),
        }
    }

    /// Drenaje del consumidor: hasta 'limit' eventos QUEUED, más antiguos primero.
    pub async fn fetch_queued_oldest_first(
        &self,
        limit: i64,
    ) -> Result<Vec<NotificationEvent>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM notification_events
                     WHERE status = 'QUEUED' ORDER BY created_at ASC LIMIT ?1"
                ),
                params![limit],
            )
            .await?;

        let mut events = Vec::new();
        while let Some(row) = rows.next().await? {
            events.push(map_event_row(&row)?);
        }
        Ok(events)
    }

    pub async fn mark_sent(&self, event_id: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "UPDATE notification_events SET status = 'SENT', sent_at = ?2 WHERE id = ?1",
                params![event_id, Utc::now().to_rfc3339()],
            )
            .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, event_id: &str, error_msg: &str) -> Result<(), DbError> {
        let connection = self.database_client.get_connection()?;
        connection
            .execute(
                "UPDATE notification_events SET status = 'FAILED', error_msg = ?2 WHERE id = ?1",
                params![event_id, error_msg],
            )
            .await?;
        Ok(())
    }
}
