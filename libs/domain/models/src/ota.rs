// [libs/domain/models/src/ota.rs]
/*!
 * APARATO: OTA ROLLOUT CONTRACTS (ESTRATO L2)
 * RESPONSABILIDAD: CATÁLOGO DE FIRMWARE Y TRABAJOS DE DESPLIEGUE
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Paquete de firmware con versión única a nivel global.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirmwarePackage {
    pub id: String,
    pub version: String,
    pub download_url: String,
    pub checksum: String,
    pub release_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OtaTargetType {
    Device,
    Group,
}

impl OtaTargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Device => "DEVICE",
            Self::Group => "GROUP",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "DEVICE" => Some(Self::Device),
            "GROUP" => Some(Self::Group),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OtaJobStatus {
    Scheduled,
    InProgress,
    Success,
    Failed,
    Canceled,
}

impl OtaJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::InProgress => "IN_PROGRESS",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "SCHEDULED" => Some(Self::Scheduled),
            "IN_PROGRESS" => Some(Self::InProgress),
            "SUCCESS" => Some(Self::Success),
            "FAILED" => Some(Self::Failed),
            "CANCELED" => Some(Self::Canceled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Canceled)
    }
}

/// Trabajo de despliegue programado contra un dispositivo o un grupo filtrado.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtaJob {
    pub id: String,
    pub tenant_id: String,
    pub target_type: OtaTargetType,
    pub device_id: Option<String>,
    pub group_filter: Option<serde_json::Value>,
    pub firmware_id: String,
    pub status: OtaJobStatus,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub progress: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
