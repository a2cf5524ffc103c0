// [libs/domain/models/src/user.rs]
/*!
 * APARATO: USER PRINCIPAL CONTRACT (ESTRATO L2)
 * RESPONSABILIDAD: IDENTIDAD HUMANA Y SU CICLO DE VIDA
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Active,
    Invited,
    Suspended,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Invited => "INVITED",
            Self::Suspended => "SUSPENDED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ACTIVE" => Some(Self::Active),
            "INVITED" => Some(Self::Invited),
            "SUSPENDED" => Some(Self::Suspended),
            _ => None,
        }
    }
}

/// Principal humano con email único en todo el despliegue.
/// El hash de contraseña jamás cruza la frontera de serialización.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub status: UserStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn certify_password_hash_never_serialized() {
        let user = User {
            id: "u-1".into(),
            email: "operator@helios.example".into(),
            name: "Operator".into(),
            password_hash: "pbkdf2-sealed".into(),
            status: UserStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let wire = serde_json::to_string(&user).unwrap();
        assert!(!wire.contains("pbkdf2-sealed"));
        assert!(wire.contains("\"email\":\"operator@helios.example\""));
    }
}
