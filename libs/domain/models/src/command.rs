// [libs/domain/models/src/command.rs]
/*!
 * APARATO: COMMAND QUEUE CONTRACTS (ESTRATO L2)
 * RESPONSABILIDAD: INSTRUCCIÓN ENCOLADA Y SU MÁQUINA DE ESTADOS
 *
 * # Logic:
 * QUEUED -> DELIVERED -> ACKED | FAILED. 'EXPIRED' queda reservado
 * para una política temporal externa al núcleo; ninguna transición
 * del plano de control lo emite.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandType {
    RemoteBoostSet,
    SetSchedule,
    SetConfig,
}

impl CommandType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RemoteBoostSet => "REMOTE_BOOST_SET",
            Self::SetSchedule => "SET_SCHEDULE",
            Self::SetConfig => "SET_CONFIG",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "REMOTE_BOOST_SET" => Some(Self::RemoteBoostSet),
            "SET_SCHEDULE" => Some(Self::SetSchedule),
            "SET_CONFIG" => Some(Self::SetConfig),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStatus {
    Queued,
    Delivered,
    Acked,
    Failed,
    /// Reservado: lo emite una política temporal fuera del núcleo.
    Expired,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Delivered => "DELIVERED",
            Self::Acked => "ACKED",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "QUEUED" => Some(Self::Queued),
            "DELIVERED" => Some(Self::Delivered),
            "ACKED" => Some(Self::Acked),
            "FAILED" => Some(Self::Failed),
            "EXPIRED" => Some(Self::Expired),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub id: String,
    pub tenant_id: String,
    pub device_id: String,
    pub command_type: CommandType,
    pub payload: serde_json::Value,
    pub requested_by_user_id: String,
    pub status: CommandStatus,
    pub requested_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub ack_at: Option<DateTime<Utc>>,
    pub error_msg: Option<String>,
}
