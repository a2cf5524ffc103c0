// [libs/domain/models/src/audit.rs]
/*!
 * APARATO: AUDIT TRAIL CONTRACTS (ESTRATO L2)
 * RESPONSABILIDAD: REGISTRO SOLO-ANEXO DE TRANSICIONES SIGNIFICATIVAS
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Naturaleza del actor que origina la entrada de auditoría.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorType {
    User,
    Device,
    System,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Device => "DEVICE",
            Self::System => "SYSTEM",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "USER" => Some(Self::User),
            "DEVICE" => Some(Self::Device),
            "SYSTEM" => Some(Self::System),
            _ => None,
        }
    }
}

/// Vocabulario de acciones auditables del plano de control.
pub mod actions {
    pub const TENANT_CREATED: &str = "TENANT_CREATED";
    pub const USER_REGISTERED: &str = "USER_REGISTERED";
    pub const USER_INVITED: &str = "USER_INVITED";
    pub const USER_ROLE_CHANGED: &str = "USER_ROLE_CHANGED";
    pub const SITE_CREATED: &str = "SITE_CREATED";
    pub const SITE_LOCATION_UPDATED: &str = "SITE_LOCATION_UPDATED";
    pub const SITE_LOCATION_SET_FROM_DEVICE: &str = "SITE_LOCATION_SET_FROM_DEVICE";
    pub const DEVICE_GEO_LARGE_JUMP: &str = "DEVICE_GEO_LARGE_JUMP";
    pub const DEVICE_CREATED: &str = "DEVICE_CREATED";
    pub const DEVICE_UPDATED: &str = "DEVICE_UPDATED";
    pub const DEVICE_TOKEN_ROTATED: &str = "DEVICE_TOKEN_ROTATED";
    pub const COMMAND_CREATED: &str = "COMMAND_CREATED";
    pub const COMMAND_ACKED: &str = "COMMAND_ACKED";
    pub const COMMAND_FAILED: &str = "COMMAND_FAILED";
    pub const ALERT_RULE_CREATED: &str = "ALERT_RULE_CREATED";
    pub const ALERT_OPENED: &str = "ALERT_OPENED";
    pub const ALERT_ACKNOWLEDGED: &str = "ALERT_ACKNOWLEDGED";
    pub const ALERT_CLOSED: &str = "ALERT_CLOSED";
    pub const FIRMWARE_REGISTERED: &str = "FIRMWARE_REGISTERED";
    pub const OTA_JOB_SCHEDULED: &str = "OTA_JOB_SCHEDULED";
    pub const OTA_JOB_CANCELED: &str = "OTA_JOB_CANCELED";
    pub const OTA_JOB_COMPLETED: &str = "OTA_JOB_COMPLETED";
    pub const ENTITLEMENT_SET: &str = "ENTITLEMENT_SET";
    pub const SIM_ACTION_EXECUTED: &str = "SIM_ACTION_EXECUTED";
}

/// Entrada inmutable del registro; las filas jamás se borran.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: String,
    pub tenant_id: Option<String>,
    pub actor_user_id: Option<String>,
    pub actor_type: ActorType,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
