// [libs/domain/models/src/entitlement.rs]
/*!
 * =================================================================
 * APARATO: ENTITLEMENT RESOLUTION (V2.0 - PRECEDENCE SEALED)
 * CLASIFICACIÓN: DOMAIN POLICY (ESTRATO L2)
 * RESPONSABILIDAD: BANDERAS DE FUNCIONALIDAD CON PRECEDENCIA DEVICE > TENANT
 *
 * # Logic:
 * Si existe fila con alcance DEVICE, su 'enabled' decide; si no, la
 * fila TENANT; si tampoco, la tabla de defaults: BASIC_REMOTE_BOOST
 * es verdadera por omisión, el resto falsas. La resolución es una
 * función pura de las filas almacenadas.
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntitlementKey {
    BasicRemoteBoost,
    SmartHomeIntegration,
}

impl EntitlementKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BasicRemoteBoost => "BASIC_REMOTE_BOOST",
            Self::SmartHomeIntegration => "SMART_HOME_INTEGRATION",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "BASIC_REMOTE_BOOST" => Some(Self::BasicRemoteBoost),
            "SMART_HOME_INTEGRATION" => Some(Self::SmartHomeIntegration),
            _ => None,
        }
    }

    /// Tabla de defaults cuando no existe fila almacenada.
    pub fn default_enabled(&self) -> bool {
        matches!(self, Self::BasicRemoteBoost)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntitlementScope {
    Tenant,
    Device,
}

impl EntitlementScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tenant => "TENANT",
            Self::Device => "DEVICE",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "TENANT" => Some(Self::Tenant),
            "DEVICE" => Some(Self::Device),
            _ => None,
        }
    }
}

/// Fila de bandera; 'device_id' poblado si y solo si scope = DEVICE.
/// Invariante de unicidad: (tenant, key, device_id).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entitlement {
    pub id: String,
    pub tenant_id: String,
    pub scope: EntitlementScope,
    pub device_id: Option<String>,
    pub key: EntitlementKey,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/**
 * Resolución pura: fila DEVICE gana sobre fila TENANT, y ésta sobre
 * la tabla de defaults de la clave.
 */
pub fn resolve_entitlement(
    key: EntitlementKey,
    device_row: Option<&Entitlement>,
    tenant_row: Option<&Entitlement>,
) -> bool {
    if let Some(row) = device_row {
        return row.enabled;
    }
    if let Some(row) = tenant_row {
        return row.enabled;
    }
    key.default_enabled()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn row(scope: EntitlementScope, key: EntitlementKey, enabled: bool) -> Entitlement {
        Entitlement {
            id: "ent-1".into(),
            tenant_id: "tn-1".into(),
            scope,
            device_id: matches!(scope, EntitlementScope::Device).then(|| "dev-1".to_string()),
            key,
            enabled,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn certify_default_table() {
        assert!(resolve_entitlement(EntitlementKey::BasicRemoteBoost, None, None));
        assert!(!resolve_entitlement(EntitlementKey::SmartHomeIntegration, None, None));
    }

    #[test]
    fn certify_device_row_overrides_tenant_row() {
        let device_off = row(EntitlementScope::Device, EntitlementKey::BasicRemoteBoost, false);
        let tenant_on = row(EntitlementScope::Tenant, EntitlementKey::BasicRemoteBoost, true);

        assert!(!resolve_entitlement(
            EntitlementKey::BasicRemoteBoost,
            Some(&device_off),
            Some(&tenant_on)
        ));

        let device_on = row(EntitlementScope::Device, EntitlementKey::SmartHomeIntegration, true);
        assert!(resolve_entitlement(EntitlementKey::SmartHomeIntegration, Some(&device_on), None));
    }

    #[test]
    fn certify_tenant_row_overrides_default() {
        let tenant_off = row(EntitlementScope::Tenant, EntitlementKey::BasicRemoteBoost, false);
        assert!(!resolve_entitlement(EntitlementKey::BasicRemoteBoost, None, Some(&tenant_off)));
    }

    proptest! {
        /// La resolución es determinista y pura: mismas filas, mismo veredicto.
        #[test]
        fn certify_resolution_determinism(
            device_present in any::<bool>(),
            device_enabled in any::<bool>(),
            tenant_present in any::<bool>(),
            tenant_enabled in any::<bool>(),
            key_is_boost in any::<bool>(),
        ) {
            let key = if key_is_boost {
                EntitlementKey::BasicRemoteBoost
            } else {
                EntitlementKey::SmartHomeIntegration
            };

            let device_row = device_present
                .then(|| row(EntitlementScope::Device, key, device_enabled));
            let tenant_row = tenant_present
                .then(|| row(EntitlementScope::Tenant, key, tenant_enabled));

            let first = resolve_entitlement(key, device_row.as_ref(), tenant_row.as_ref());
            let second = resolve_entitlement(key, device_row.as_ref(), tenant_row.as_ref());
            prop_assert_eq!(first, second);

            let expected = if device_present {
                device_enabled
            } else if tenant_present {
                tenant_enabled
            } else {
                key.default_enabled()
            };
            prop_assert_eq!(first, expected);
        }
    }
}
