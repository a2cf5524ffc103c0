// [libs/domain/models/src/tenant.rs]
/*!
 * =================================================================
 * APARATO: TENANT & MEMBERSHIP CONTRACTS (V1.4 - ISOLATION CORE)
 * CLASIFICACIÓN: DOMAIN ENTITY (ESTRATO L2)
 * RESPONSABILIDAD: FRONTERA ORGANIZACIONAL Y RELACIÓN TERNARIA DE ROLES
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Naturaleza comercial de la organización arrendataria.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TenantType {
    Manufacturer,
    Retailer,
    Installer,
    PropertyManager,
}

impl TenantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manufacturer => "MANUFACTURER",
            Self::Retailer => "RETAILER",
            Self::Installer => "INSTALLER",
            Self::PropertyManager => "PROPERTY_MANAGER",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "MANUFACTURER" => Some(Self::Manufacturer),
            "RETAILER" => Some(Self::Retailer),
            "INSTALLER" => Some(Self::Installer),
            "PROPERTY_MANAGER" => Some(Self::PropertyManager),
            _ => None,
        }
    }
}

/// Ciclo de vida administrativo de la organización.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TenantStatus {
    Active,
    Suspended,
    Archived,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Suspended => "SUSPENDED",
            Self::Archived => "ARCHIVED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ACTIVE" => Some(Self::Active),
            "SUSPENDED" => Some(Self::Suspended),
            "ARCHIVED" => Some(Self::Archived),
            _ => None,
        }
    }
}

/**
 * Organización soberana: Toda entidad no-plataforma del sistema
 * vive bajo exactamente un Tenant.
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: String,
    pub name: String,
    pub tenant_type: TenantType,
    pub status: TenantStatus,
    /// Mapa de ajustes de forma libre persistido como JSON.
    pub settings: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Rol operativo dentro de una membresía (Usuario, Tenant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    PlatformAdmin,
    TenantAdmin,
    Installer,
    SupportAgent,
    EndUser,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlatformAdmin => "PLATFORM_ADMIN",
            Self::TenantAdmin => "TENANT_ADMIN",
            Self::Installer => "INSTALLER",
            Self::SupportAgent => "SUPPORT_AGENT",
            Self::EndUser => "END_USER",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PLATFORM_ADMIN" => Some(Self::PlatformAdmin),
            "TENANT_ADMIN" => Some(Self::TenantAdmin),
            "INSTALLER" => Some(Self::Installer),
            "SUPPORT_AGENT" => Some(Self::SupportAgent),
            "END_USER" => Some(Self::EndUser),
            _ => None,
        }
    }
}

/**
 * Relación ternaria (Usuario, Tenant, Rol).
 * Invariante: a lo sumo una membresía por par (usuario, tenant).
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub id: String,
    pub user_id: String,
    pub tenant_id: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certify_role_wire_parity() {
        for role in [
            Role::PlatformAdmin,
            Role::TenantAdmin,
            Role::Installer,
            Role::SupportAgent,
            Role::EndUser,
        ] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
            let wire = serde_json::to_string(&role).unwrap();
            assert_eq!(wire, format!("\"{}\"", role.as_str()));
        }
        assert_eq!(Role::parse("SUPERVISOR"), None);
    }

    #[test]
    fn certify_tenant_type_roundtrip() {
        let parsed: TenantType = serde_json::from_str("\"PROPERTY_MANAGER\"").unwrap();
        assert_eq!(parsed, TenantType::PropertyManager);
        assert_eq!(TenantType::parse("PROPERTY_MANAGER"), Some(TenantType::PropertyManager));
    }
}
