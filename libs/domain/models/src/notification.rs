// [libs/domain/models/src/notification.rs]
/*!
 * APARATO: NOTIFICATION CONTRACTS (ESTRATO L2)
 * RESPONSABILIDAD: CANALES POR TENANT, EVENTOS SALIENTES Y SUPRESIÓN
 *
 * # Logic:
 * La supresión es por severidad Y tipo de canal: WEBHOOK recibe todas
 * las severidades; EMAIL/SMS únicamente WARNING y CRITICAL. La
 * asimetría es deliberada y debe preservarse exactamente.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::AlertSeverity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelType {
    Email,
    Sms,
    Webhook,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "EMAIL",
            Self::Sms => "SMS",
            Self::Webhook => "WEBHOOK",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "EMAIL" => Some(Self::Email),
            "SMS" => Some(Self::Sms),
            "WEBHOOK" => Some(Self::Webhook),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Queued,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "QUEUED" => Some(Self::Queued),
            "SENT" => Some(Self::Sent),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Canal de notificación con alcance de tenant y configuración opaca.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationChannel {
    pub id: String,
    pub tenant_id: String,
    pub channel_type: ChannelType,
    pub config: serde_json::Value,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// Mensaje saliente encolado por el productor del evaluador de alertas.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub id: String,
    pub tenant_id: String,
    pub channel_id: String,
    pub alert_event_id: Option<String>,
    pub status: NotificationStatus,
    pub payload: serde_json::Value,
    pub sent_at: Option<DateTime<Utc>>,
    pub error_msg: Option<String>,
    pub created_at: DateTime<Utc>,
}

/**
 * Predicado del productor: un canal recibe el evento si es WEBHOOK
 * o si la severidad no es INFO.
 */
pub fn channel_receives_severity(channel_type: ChannelType, severity: AlertSeverity) -> bool {
    channel_type == ChannelType::Webhook || severity != AlertSeverity::Info
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certify_suppression_asymmetry() {
        // WEBHOOK recibe todo, incluida INFO.
        assert!(channel_receives_severity(ChannelType::Webhook, AlertSeverity::Info));
        assert!(channel_receives_severity(ChannelType::Webhook, AlertSeverity::Critical));

        // EMAIL/SMS suprimen INFO pero reciben WARNING y CRITICAL.
        assert!(!channel_receives_severity(ChannelType::Email, AlertSeverity::Info));
        assert!(!channel_receives_severity(ChannelType::Sms, AlertSeverity::Info));
        assert!(channel_receives_severity(ChannelType::Email, AlertSeverity::Warning));
        assert!(channel_receives_severity(ChannelType::Sms, AlertSeverity::Critical));
    }
}
