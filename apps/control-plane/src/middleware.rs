// [apps/control-plane/src/middleware.rs]
/*!
 * =================================================================
 * APARATO: DUAL AUTHENTICATION GUARD (V4.2 - DUAL CITIZENSHIP)
 * CLASIFICACIÓN: SECURITY STRATUM (ESTRATO L4)
 * RESPONSABILIDAD: VALIDACIÓN DUAL DE TOKENS E INYECCIÓN DE IDENTIDAD
 *
 * # Logic:
 * 1. Si el token calza el formato MAC '<deviceId>:<hex64>' y el digest
 *    verifica en tiempo constante -> Ciudadano Dispositivo.
 * 2. Si no, decodifica como JWT firmado -> Ciudadano Humano, con sus
 *    membresías hidratadas para el estrato de tenancy.
 * 3. En otro caso -> 401 con el sobre de error canónico.
 * =================================================================
 */

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use helios_domain_models::Membership;
use tracing::{debug, warn};

use crate::errors::ApiError;
use crate::security::{verify_bearer_token, verify_device_token};
use crate::state::AppState;

/// Identidad humana inyectada en el flujo de la petición.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub email: String,
    pub memberships: Vec<Membership>,
}

/// Identidad de unidad sellada por el token MAC.
#[derive(Debug, Clone)]
pub struct AuthenticatedDevice {
    pub device_id: String,
}

/**
 * Guardia perimetral: todo lo que viva detrás exige un portador válido.
 */
pub async fn auth_guard(
    State(application_state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    let bearer_token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_owned);

    let Some(raw_token) = bearer_token else {
        return Err(ApiError::Unauthorized("missing Authorization header".into()).into_response());
    };

    // --- ESCENARIO ALFA: CIUDADANO DISPOSITIVO (MAC constante) ---
    if let Some(device_id) =
        verify_device_token(&application_state.config.device_hmac_secret, &raw_token)
    {
        debug!("🤖 [AUTH]: Device citizen {} recognized.", device_id);
        request.extensions_mut().insert(AuthenticatedDevice { device_id });
        return Ok(next.run(request).await);
    }

    // --- ESCENARIO BETA: CIUDADANO HUMANO (JWT firmado) ---
    match verify_bearer_token(&application_state.config.jwt_secret, &raw_token) {
        Ok(claims) => {
            let memberships = application_state
                .users
                .memberships_for_user(&claims.sub)
                .await
                .map_err(|fault| ApiError::from(fault).into_response())?;

            debug!("👤 [AUTH]: Operator {} authenticated ({} memberships).",
                claims.sub, memberships.len());

            request.extensions_mut().insert(AuthenticatedUser {
                user_id: claims.sub,
                email: claims.email,
                memberships,
            });
            Ok(next.run(request).await)
        }
        Err(_) => {
            warn!("❌ [AUTH_REJECTION]: Token failed both citizenship checks.");
            Err(ApiError::Unauthorized("invalid bearer or device token".into()).into_response())
        }
    }
}
