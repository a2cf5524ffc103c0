// [apps/control-plane/src/security.rs]
/*!
 * =================================================================
 * APARATO: IDENTITY CRYPTO FORGE (V4.0 - DUAL CITIZENSHIP)
 * CLASIFICACIÓN: SECURITY STRATUM (ESTRATO L4)
 * RESPONSABILIDAD: TOKENS MAC DE DISPOSITIVO, JWT DE USUARIO Y KDF
 *
 * # Logic:
 * Token de dispositivo (bit-exacto): '<deviceId>:<hexlower-64>' donde
 * el digest es HMAC-SHA256(secreto_de_despliegue, utf8(deviceId)).
 * La comparación del digest es de tiempo constante sobre los bytes
 * hex: un compare byte-a-byte con corte temprano NO es conforme.
 * =================================================================
 */

use hmac::{Hmac, Mac};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use rand::RngCore;
use pbkdf2::Pbkdf2;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::errors::ApiError;

type HmacSha256 = Hmac<Sha256>;

/// Claims mínimos del sobre firmado de usuario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BearerClaims {
    /// Identificador del usuario (subject).
    pub sub: String,
    pub email: String,
    /// Expiración en segundos Unix.
    pub exp: i64,
}

// --- TOKENS DE USUARIO (JWT HS256) ---

pub fn issue_bearer_token(
    jwt_secret: &str,
    user_id: &str,
    email: &str,
    expires_hours: i64,
) -> Result<String, ApiError> {
    let claims = BearerClaims {
        sub: user_id.to_string(),
        email: email.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(expires_hours)).timestamp(),
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(jwt_secret.as_bytes()))
        .map_err(|fault| ApiError::Internal(format!("TOKEN_FORGE_FAULT: {fault}")))
}

pub fn verify_bearer_token(jwt_secret: &str, token: &str) -> Result<BearerClaims, ApiError> {
    decode::<BearerClaims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::Unauthorized("invalid or expired bearer token".into()))
}

// --- TOKENS MAC DE DISPOSITIVO ---

/// Digest hexlower-64 que ancla la identidad de la unidad al secreto
/// de despliegue.
pub fn derive_device_digest(device_hmac_secret: &str, device_id: &str) -> String {
    let mut mac_engine = HmacSha256::new_from_slice(device_hmac_secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac_engine.update(device_id.as_bytes());
    hex::encode(mac_engine.finalize().into_bytes())
}

/// Credencial completa '<deviceId>:<digest>'.
pub fn mint_device_token(device_hmac_secret: &str, device_id: &str) -> String {
    format!("{device_id}:{}", derive_device_digest(device_hmac_secret, device_id))
}

/**
 * Verifica una credencial de dispositivo. Devuelve el deviceId sellado
 * cuando el digest calza en comparación de tiempo constante.
 */
pub fn verify_device_token(device_hmac_secret: &str, raw_token: &str) -> Option<String> {
    let (device_id, presented_digest) = raw_token.split_once(':')?;
    if device_id.is_empty() || presented_digest.len() != 64 {
        return None;
    }

    let expected_digest = derive_device_digest(device_hmac_secret, device_id);

    // Igualdad de tiempo constante sobre los bytes del digest hex.
    let digests_match: bool = expected_digest
        .as_bytes()
        .ct_eq(presented_digest.as_bytes())
        .into();

    digests_match.then(|| device_id.to_string())
}

// --- KDF DE CONTRASEÑAS ---

pub fn hash_password(plain_password: &str) -> Result<String, ApiError> {
    let mut salt_material = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt_material);
    let salt = SaltString::encode_b64(&salt_material)
        .map_err(|fault| ApiError::Internal(format!("SALT_FORGE_FAULT: {fault}")))?;

    Pbkdf2
        .hash_password(plain_password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|fault| ApiError::Internal(format!("KDF_FAULT: {fault}")))
}

pub fn verify_password(stored_hash: &str, presented_password: &str) -> bool {
    PasswordHash::new(stored_hash)
        .map(|parsed| Pbkdf2.verify_password(presented_password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certify_device_token_known_answer() {
        // Con DEVICE_HMAC_SECRET="s" y deviceId="abc", el único token
        // válido es 'abc:' + hex(HMAC-SHA256("s","abc")).
        let expected_digest = "47d920ed90784dc5eae635bfd0824f612d05f09f9a47f60390de873ad37e546b";
        assert_eq!(derive_device_digest("s", "abc"), expected_digest);
        assert_eq!(mint_device_token("s", "abc"), format!("abc:{expected_digest}"));

        assert_eq!(verify_device_token("s", &format!("abc:{expected_digest}")), Some("abc".into()));
    }

    #[test]
    fn certify_device_token_rejects_every_other_digest() {
        let valid_token = mint_device_token("s", "abc");

        // Digest ajeno (válido para otra unidad) es rechazado.
        let foreign_digest = derive_device_digest("s", "xyz");
        assert_eq!(verify_device_token("s", &format!("abc:{foreign_digest}")), None);

        // Un byte alterado es rechazado.
        let mut tampered = valid_token.clone();
        let last = tampered.pop().unwrap();
        tampered.push(if last == '0' { '1' } else { '0' });
        assert_eq!(verify_device_token("s", &tampered), None);

        // Formas malformadas.
        assert_eq!(verify_device_token("s", "abc"), None);
        assert_eq!(verify_device_token("s", ":deadbeef"), None);
        assert_eq!(verify_device_token("s", "abc:tooshort"), None);

        // Secreto distinto: el token deja de ser válido.
        assert_eq!(verify_device_token("other-secret", &valid_token), None);
    }

    #[test]
    fn certify_bearer_roundtrip_and_expiry() {
        let token = issue_bearer_token("jwt-secret", "user-1", "op@helios.example", 24).unwrap();
        let claims = verify_bearer_token("jwt-secret", &token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.email, "op@helios.example");

        // Firma ajena.
        assert!(verify_bearer_token("wrong-secret", &token).is_err());

        // Token vencido (expiración en el pasado).
        let stale = issue_bearer_token("jwt-secret", "user-1", "op@helios.example", -2).unwrap();
        assert!(verify_bearer_token("jwt-secret", &stale).is_err());
    }

    #[test]
    fn certify_password_kdf_roundtrip() {
        let sealed = hash_password("hunter2-but-long").unwrap();
        assert_ne!(sealed, "hunter2-but-long");
        assert!(verify_password(&sealed, "hunter2-but-long"));
        assert!(!verify_password(&sealed, "wrong-password"));
        assert!(!verify_password("not-a-phc-string", "whatever"));
    }
}
