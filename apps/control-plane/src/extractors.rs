// [apps/control-plane/src/extractors.rs]
/*!
 * =================================================================
 * APARATO: TENANCY & DEVICE EXTRACTORS (V3.3 - SCOPE COMBINATOR)
 * CLASIFICACIÓN: SECURITY STRATUM (ESTRATO L4)
 * RESPONSABILIDAD: RESOLUCIÓN DE TENANT ACTIVO Y COMPUERTA DE ROLES
 *
 * # Logic:
 * El tenant activo se resuelve en orden de prioridad: parámetro de
 * ruta, cabecera 'x-tenant-id', valor de query 'tenantId'. Un
 * PLATFORM_ADMIN puede operar sin tenant (vista global) o apuntar a
 * cualquiera; el resto exige membresía en el tenant activo o 403.
 * =================================================================
 */

use std::collections::HashMap;

use axum::async_trait;
use axum::extract::{FromRequest, FromRequestParts, Path, Request};
use axum::http::request::Parts;
use helios_domain_models::Role;

use crate::errors::ApiError;
use crate::middleware::{AuthenticatedDevice, AuthenticatedUser};

/// Ámbito resuelto de una petición humana: identidad + tenant + rol.
#[derive(Debug, Clone)]
pub struct TenantScope {
    pub user: AuthenticatedUser,
    pub active_tenant_id: Option<String>,
    pub active_role: Option<Role>,
    pub is_platform_admin: bool,
}

impl TenantScope {
    /// Tenant activo obligatorio (operaciones con alcance de tenant).
    /// Sin tenant: VALIDATION para el administrador de plataforma (debe
    /// apuntar a alguno), FORBIDDEN para el resto.
    pub fn require_tenant(&self) -> Result<&str, ApiError> {
        match self.active_tenant_id.as_deref() {
            Some(tenant_id) => Ok(tenant_id),
            None if self.is_platform_admin => {
                Err(ApiError::validation("target tenant required (x-tenant-id)"))
            }
            None => Err(ApiError::Forbidden("tenant context required".into())),
        }
    }

    /**
     * Compuerta de roles: pasa si el rol activo pertenece al conjunto
     * o si el actor es PLATFORM_ADMIN.
     */
    pub fn require_role(&self, allowed_roles: &[Role]) -> Result<(), ApiError> {
        if self.is_platform_admin {
            return Ok(());
        }
        match self.active_role {
            Some(role) if allowed_roles.contains(&role) => Ok(()),
            _ => Err(ApiError::Forbidden("role not allowed for this operation".into())),
        }
    }

    pub fn require_platform_admin(&self) -> Result<(), ApiError> {
        if self.is_platform_admin {
            Ok(())
        } else {
            Err(ApiError::Forbidden("platform administrator required".into()))
        }
    }
}

fn query_value(parts: &Parts, wanted_key: &str) -> Option<String> {
    parts.uri.query()?.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == wanted_key).then(|| value.to_string())
    })
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantScope
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::Unauthorized("user authentication required".into()))?;

        // 1. RESOLUCIÓN DEL TENANT ACTIVO (ruta > cabecera > query)
        let path_params = Path::<HashMap<String, String>>::from_request_parts(parts, state)
            .await
            .map(|Path(map)| map)
            .unwrap_or_default();

        let candidate_tenant_id = path_params
            .get("tenantId")
            .or_else(|| path_params.get("tenant_id"))
            .cloned()
            .or_else(|| {
                parts
                    .headers
                    .get("x-tenant-id")
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_owned)
            })
            .or_else(|| query_value(parts, "tenantId"));

        let is_platform_admin = user
            .memberships
            .iter()
            .any(|membership| membership.role == Role::PlatformAdmin);

        // 2. POLÍTICA DE MEMBRESÍA
        let (active_tenant_id, active_role) = match (&candidate_tenant_id, is_platform_admin) {
            (Some(tenant_id), _) => {
                let membership_role = user
                    .memberships
                    .iter()
                    .find(|membership| &membership.tenant_id == tenant_id)
                    .map(|membership| membership.role);

                match (membership_role, is_platform_admin) {
                    // Miembro directo: su rol manda.
                    (Some(role), _) => (Some(tenant_id.clone()), Some(role)),
                    // PLATFORM_ADMIN puede apuntar a cualquier tenant.
                    (None, true) => (Some(tenant_id.clone()), Some(Role::PlatformAdmin)),
                    (None, false) => {
                        return Err(ApiError::Forbidden(
                            "no membership in the requested tenant".into(),
                        ))
                    }
                }
            }
            // Vista global: legítima para PLATFORM_ADMIN; el resto queda
            // sin ámbito y las operaciones tenant-scoped lo rechazarán.
            (None, true) => (None, Some(Role::PlatformAdmin)),
            (None, false) => (None, None),
        };

        Ok(TenantScope { user, active_tenant_id, active_role, is_platform_admin })
    }
}

/// Extractor de identidad de dispositivo; 403 para ciudadanos humanos.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    pub device_id: String,
}

impl DeviceIdentity {
    /// El id de la ruta DEBE calzar con el id sellado en el token.
    pub fn require_self(&self, path_device_id: &str) -> Result<(), ApiError> {
        if self.device_id == path_device_id {
            Ok(())
        } else {
            Err(ApiError::Forbidden("device id mismatch with sealed token identity".into()))
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for DeviceIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedDevice>()
            .map(|device| DeviceIdentity { device_id: device.device_id.clone() })
            .ok_or_else(|| ApiError::Forbidden("device authentication required".into()))
    }
}

/// Envoltura de Json cuyo rechazo habla el sobre de error canónico
/// (VALIDATION_ERROR) en lugar del rechazo plano del framework.
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: serde::de::DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(request, state).await {
            Ok(axum::Json(decoded_payload)) => Ok(Self(decoded_payload)),
            Err(json_rejection) => Err(ApiError::validation(json_rejection.body_text())),
        }
    }
}
