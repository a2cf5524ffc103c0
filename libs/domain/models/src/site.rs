// [libs/domain/models/src/site.rs]
/*!
 * =================================================================
 * APARATO: SITE & GEOLOCATION CONTRACTS (V2.1 - LOCATION LOCK)
 * CLASIFICACIÓN: DOMAIN ENTITY (ESTRATO L2)
 * RESPONSABILIDAD: UBICACIÓN FÍSICA, PROCEDENCIA GEO Y CANDADO DE SITIO
 *
 * # Logic:
 * El candado de ubicación ('location_lock') impide toda escritura
 * geográfica originada en dispositivos. La distancia de gran círculo
 * (Haversine, R = 6371 km) detecta saltos anómalos > 1 km.
 * =================================================================
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Radio terrestre nominal para la métrica de gran círculo (kilómetros).
const EARTH_RADIUS_KILOMETERS: f64 = 6371.0;

/// Procedencia de una coordenada registrada en el sistema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationSource {
    MobileGps,
    EdgeGnss,
    EdgeCell,
    Manual,
}

impl LocationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MobileGps => "MOBILE_GPS",
            Self::EdgeGnss => "EDGE_GNSS",
            Self::EdgeCell => "EDGE_CELL",
            Self::Manual => "MANUAL",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "MOBILE_GPS" => Some(Self::MobileGps),
            "EDGE_GNSS" => Some(Self::EdgeGnss),
            "EDGE_CELL" => Some(Self::EdgeCell),
            "MANUAL" => Some(Self::Manual),
            _ => None,
        }
    }
}

/**
 * Ubicación física bajo un tenant. Las coordenadas son opcionales
 * hasta que un instalador o un dispositivo las cristalice.
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub address_line: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub location_source: Option<LocationSource>,
    pub location_accuracy_m: Option<f64>,
    pub location_confidence: Option<f64>,
    pub location_updated_at: Option<DateTime<Utc>>,
    pub location_updated_by_user_id: Option<String>,
    /// Candado contra sobre-escrituras geográficas originadas en dispositivos.
    pub location_lock: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/**
 * Distancia de gran círculo entre dos coordenadas WGS84, en kilómetros.
 * Implementación Haversine clásica sobre el radio nominal de 6371 km.
 */
pub fn haversine_distance_km(lat_a: f64, lon_a: f64, lat_b: f64, lon_b: f64) -> f64 {
    let delta_lat = (lat_b - lat_a).to_radians();
    let delta_lon = (lon_b - lon_a).to_radians();

    let half_chord = (delta_lat / 2.0).sin().powi(2)
        + lat_a.to_radians().cos() * lat_b.to_radians().cos() * (delta_lon / 2.0).sin().powi(2);

    let angular_distance = 2.0 * half_chord.sqrt().asin();

    EARTH_RADIUS_KILOMETERS * angular_distance
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn certify_haversine_zero_distance() {
        let distance = haversine_distance_km(37.975, 23.735, 37.975, 23.735);
        assert!(distance.abs() < 1e-9);
    }

    #[test]
    fn certify_haversine_athens_reference_jump() {
        // Salto del escenario de sitio bloqueado: (37.975, 23.735) -> (38.5, 24.5)
        let distance = haversine_distance_km(37.975, 23.735, 38.5, 24.5);
        assert!(distance > 80.0 && distance < 110.0, "distance = {distance}");
    }

    #[test]
    fn certify_one_kilometer_boundary_is_exclusive() {
        // Un grado de latitud ≈ 111.19 km; escalamos para aterrizar en ~1.0 km.
        let one_km_in_degrees = 1.0 / (EARTH_RADIUS_KILOMETERS * std::f64::consts::PI / 180.0);
        let distance = haversine_distance_km(0.0, 0.0, one_km_in_degrees, 0.0);
        assert!((distance - 1.0).abs() < 1e-9);
        // La política de salto usa comparación estricta: exactamente 1 km NO dispara.
        assert!(!(distance > 1.0 + 1e-12));
    }
}
