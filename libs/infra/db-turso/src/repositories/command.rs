// [libs/infra/db-turso/src/repositories/command.rs]
/*!
 * =================================================================
 * APARATO: COMMAND QUEUE REPOSITORY (V3.2 - ATOMIC DELIVERY)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: COLA POR DISPOSITIVO CON ENTREGA MARCA-Y-DEVUELVE
 *
 * # Logic:
 * El poll de pendientes selecciona QUEUED en orden 'requested_at'
 * ascendente y los marca DELIVERED dentro de la MISMA transacción,
 * antes de devolverlos. Un poll duplicado no puede resucitar filas.
 * =================================================================
 */

use crate::errors::DbError;
use crate::repositories::mappers;
use crate::TursoClient;
use chrono::Utc;
use helios_domain_models::{Command, CommandStatus, CommandType};
use libsql::{params, Row};
use tracing::{debug, info, instrument};
use uuid::Uuid;

pub struct CommandRepository {
    database_client: TursoClient,
}

const COMMAND_COLUMNS: &str = "id, tenant_id, device_id, command_type, payload_json, \
     requested_by_user_id, status, requested_at, delivered_at, ack_at, error_msg";

fn map_command_row(row: &Row) -> Result<Command, DbError> {
    let command_type_raw: String = row.get(3)?;
    let status_raw: String = row.get(6)?;

    Ok(Command {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        device_id: row.get(2)?,
        command_type: mappers::decode_enum(&command_type_raw, CommandType::parse, "CommandType")?,
        payload: mappers::get_json(row, 4)?,
        requested_by_user_id: row.get(5)?,
        status: mappers::decode_enum(&status_raw, CommandStatus::parse, "CommandStatus")?,
        requested_at: mappers::get_timestamp(row, 7)?,
        delivered_at: mappers::get_opt_timestamp(row, 8)?,
        ack_at: mappers::get_opt_timestamp(row, 9)?,
        error_msg: row.get(10)?,
    })
}

impl CommandRepository {
    #[must_use]
    pub fn new(database_client: TursoClient) -> Self {
        Self { database_client }
    }

    #[instrument(skip(self, payload))]
    pub async fn create(
        &self,
        tenant_id: &str,
        device_id: &str,
        command_type: CommandType,
        payload: serde_json::Value,
        requested_by_user_id: &str,
    ) -> Result<Command, DbError> {
        let connection = self.database_client.get_connection()?;
        let now = Utc::now();
        let command_id = Uuid::new_v4().to_string();

        connection
            .execute(
                "INSERT INTO commands (id, tenant_id, device_id, command_type, payload_json,
                                       requested_by_user_id, status, requested_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    command_id.clone(),
                    tenant_id,
                    device_id,
                    command_type.as_str(),
                    payload.to_string(),
                    requested_by_user_id,
                    CommandStatus::Queued.as_str(),
                    now.to_rfc3339()
                ],
            )
            .await
            .map_err(DbError::from_engine)?;

        info!("🎛️ [COMMANDS]: Instruction {} queued for unit {}.", command_id, device_id);

        self.find_by_id(&command_id).await?.ok_or(DbError::NotFound)
    }

    pub async fn find_by_id(&self, command_id: &str) -> Result<Option<Command>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!("SELECT {COMMAND_COLUMNS} FROM commands WHERE id = ?1"),
                params![command_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(map_command_row(&row)?)),
            None => Ok(None),
        }
    }

    /**
     * Entrega atómica: selecciona la cola QUEUED de la unidad en orden
     * de solicitud, la marca DELIVERED y recién entonces la devuelve.
     */
    #[instrument(skip(self))]
    pub async fn poll_and_deliver(&self, device_id: &str) -> Result<Vec<Command>, DbError> {
        let connection = self.database_client.get_connection()?;
        let delivery_transaction = connection.transaction().await.map_err(DbError::QueryError)?;
        let now = Utc::now();

        let mut rows = delivery_transaction
            .query(
                &format!(
                    "SELECT {COMMAND_COLUMNS} FROM commands
                     WHERE device_id = ?1 AND status = 'QUEUED'
                     ORDER BY requested_at ASC"
                ),
                params![device_id],
            )
            .await?;

        let mut pending_commands = Vec::new();
        while let Some(row) = rows.next().await? {
            pending_commands.push(map_command_row(&row)?);
        }

        for command in &mut pending_commands {
            delivery_transaction
                .execute(
                    "UPDATE commands SET status = 'DELIVERED', delivered_at = ?2 WHERE id = ?1",
                    params![command.id.clone(), now.to_rfc3339()],
                )
                .await?;
            command.status = CommandStatus::Delivered;
            command.delivered_at = Some(now);
        }

        delivery_transaction.commit().await.map_err(DbError::QueryError)?;

        if !pending_commands.is_empty() {
            debug!(
                "📬 [COMMANDS]: Delivered {} instruction(s) to unit {}.",
                pending_commands.len(),
                device_id
            );
        }

        Ok(pending_commands)
    }

    /**
     * Acuse del dispositivo: ACKED o FAILED con error opcional.
     * La instrucción debe pertenecer a la unidad que reporta.
     */
    #[instrument(skip(self))]
    pub async fn acknowledge(
        &self,
        device_id: &str,
        command_id: &str,
        final_status: CommandStatus,
        error_msg: Option<String>,
    ) -> Result<Command, DbError> {
        if !matches!(final_status, CommandStatus::Acked | CommandStatus::Failed) {
            return Err(DbError::InvalidState);
        }

        let connection = self.database_client.get_connection()?;
        let now = Utc::now();

        let updated_rows = connection
            .execute(
                "UPDATE commands SET status = ?3, ack_at = ?4, error_msg = ?5
                 WHERE id = ?1 AND device_id = ?2",
                params![
                    command_id,
                    device_id,
                    final_status.as_str(),
                    now.to_rfc3339(),
                    error_msg.clone()
                ],
            )
            .await?;

        if updated_rows == 0 {
            return Err(DbError::NotFound);
        }

        self.find_by_id(command_id).await?.ok_or(DbError::NotFound)
    }

    /// Historial de instrucciones de una unidad, acotado por tenant.
    pub async fn list_for_device(
        &self,
        tenant_id: &str,
        device_id: &str,
        limit: i64,
    ) -> Result<Vec<Command>, DbError> {
        let connection = self.database_client.get_connection()?;
        let mut rows = connection
            .query(
                &format!(
                    "SELECT {COMMAND_COLUMNS} FROM commands
                     WHERE tenant_id = ?1 AND device_id = ?2
                     ORDER BY requested_at DESC LIMIT ?3"
                ),
                params![tenant_id, device_id, limit],
            )
            .await?;

        let mut commands = Vec::new();
        while let Some(row) = rows.next().await? {
            commands.push(map_command_row(&row)?);
        }
        Ok(commands)
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

    async fn seed_device(client: &TursoClient) -> (String, String) {
        let tenants = TenantRepository::new(client.clone());
        let devices = DeviceRepository::new(client.clone());
        let tenant = tenants.create("Cmd Org", TenantType::Installer).await.unwrap();
        let device = devices
            .create_with_secret(
                NewDevice {
                    id: Uuid::new_v4().to_string(),
                    tenant_id: tenant.id.clone(),
                    serial_number: "SN-CMD-1".into(),
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
        (tenant.id, device.id)
    }

    #[tokio::test]
    async fn certify_poll_marks_delivered_and_never_resurfaces() {
        let (client, _guard) = test_client().await;
        let (tenant_id, device_id) = seed_device(&client).await;
        let commands = CommandRepository::new(client);

        let first = commands
            .create(&tenant_id, &device_id, CommandType::RemoteBoostSet,
                    serde_json::json!({"minutes": 30}), "user-1")
            .await
            .unwrap();
        let second = commands
            .create(&tenant_id, &device_id, CommandType::SetConfig,
                    serde_json::json!({"mode": "eco"}), "user-1")
            .await
            .unwrap();

        let delivered = commands.poll_and_deliver(&device_id).await.unwrap();
        assert_eq!(delivered.len(), 2);
        // Orden no-decreciente de solicitud.
        assert_eq!(delivered[0].id, first.id);
        assert_eq!(delivered[1].id, second.id);
        assert!(delivered.iter().all(|c| c.status == CommandStatus::Delivered));
        assert!(delivered.iter().all(|c| c.delivered_at.is_some()));

        // Re-poll: la cola quedó vacía, nada resucita.
        let repoll = commands.poll_and_deliver(&device_id).await.unwrap();
        assert!(repoll.is_empty());

        let persisted = commands.find_by_id(&first.id).await.unwrap().unwrap();
        assert_eq!(persisted.status, CommandStatus::Delivered);
    }

    #[tokio::test]
    async fn certify_acknowledge_transitions_and_device_scope() {
        let (client, _guard) = test_client().await;
        let (tenant_id, device_id) = seed_device(&client).await;
        let commands = CommandRepository::new(client);

        let command = commands
            .create(&tenant_id, &device_id, CommandType::RemoteBoostSet,
                    serde_json::json!({}), "user-1")
            .await
            .unwrap();
        commands.poll_and_deliver(&device_id).await.unwrap();

        // Otra unidad no puede acusar una instrucción ajena.
        let foreign_ack = commands
            .acknowledge("other-device", &command.id, CommandStatus::Acked, None)
            .await;
        assert!(matches!(foreign_ack, Err(DbError::NotFound)));

        let acked = commands
            .acknowledge(&device_id, &command.id, CommandStatus::Acked, None)
            .await
            .unwrap();
        assert_eq!(acked.status, CommandStatus::Acked);
        assert!(acked.ack_at.is_some());

        // Un estado terminal inválido es rechazado.
        let invalid = commands
            .acknowledge(&device_id, &command.id, CommandStatus::Queued, None)
            .await;
        assert!(matches!(invalid, Err(DbError::InvalidState)));
    }
}
