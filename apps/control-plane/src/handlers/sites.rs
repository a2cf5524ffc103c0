// [apps/control-plane/src/handlers/sites.rs]
/*!
 * =================================================================
 * APARATO: SITE HANDLERS (V2.4 - LOCATION LOCK PATH)
 * CLASIFICACIÓN: API ADAPTER (ESTRATO L3-API)
 * RESPONSABILIDAD: ALTA DE SITIOS, PARCHEO MANUAL DE UBICACIÓN Y CLIMA
 *
 * # Logic:
 * Un END_USER solo puede parchear la ubicación de un sitio si posee
 * alguna unidad instalada allí ('ownerUserId' = actor).
 * =================================================================
 */

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{NaiveDate, Utc};
use helios_domain_models::{audit::actions, ActorType, LocationSource, Role};
use helios_infra_db::repositories::site::{ManualLocationPatch, NewSite};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::errors::ApiError;
use crate::extractors::{TenantScope, ValidatedJson};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSitePayload {
    pub name: String,
    pub address_line: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    #[serde(default)]
    pub location_lock: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPatchPayload {
    pub lat: f64,
    pub lon: f64,
    pub source: LocationSource,
    pub accuracy_m: Option<f64>,
    pub lock: Option<bool>,
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WeatherQuery {
    pub date: Option<String>,
}

/// POST /api/sites (PA | TA | INSTALLER, con tenant activo)
#[instrument(skip(application_state, scope, payload))]
pub async fn handle_create_site(
    State(application_state): State<AppState>,
    scope: TenantScope,
    ValidatedJson(payload): ValidatedJson<CreateSitePayload>,
) -> Result<impl IntoResponse, ApiError> {
    scope.require_role(&[Role::TenantAdmin, Role::Installer])?;
    let tenant_id = scope.require_tenant()?.to_string();

    if payload.name.trim().is_empty() {
        return Err(ApiError::validation("site name is required"));
    }

    let site = application_state
        .sites
        .create(NewSite {
            tenant_id: tenant_id.clone(),
            name: payload.name,
            address_line: payload.address_line,
            city: payload.city,
            postal_code: payload.postal_code,
            country: payload.country,
            lat: payload.lat,
            lon: payload.lon,
            location_lock: payload.location_lock,
        })
        .await?;

    application_state
        .audit_best_effort(
            Some(&tenant_id),
            Some(&scope.user.user_id),
            ActorType::User,
            actions::SITE_CREATED,
            "site",
            &site.id,
            json!({ "name": site.name }),
        )
        .await;

    Ok((StatusCode::CREATED, Json(site)))
}

/// GET /api/sites (con tenant activo)
#[instrument(skip(application_state, scope))]
pub async fn handle_list_sites(
    State(application_state): State<AppState>,
    scope: TenantScope,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = scope.require_tenant()?;
    let sites = application_state.sites.list_by_tenant(tenant_id).await?;
    Ok(Json(sites))
}

/// GET /api/sites/:siteId
#[instrument(skip(application_state, scope))]
pub async fn handle_get_site(
    State(application_state): State<AppState>,
    scope: TenantScope,
    Path(site_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = scope.require_tenant()?;
    let site = application_state
        .sites
        .find_by_id_in_tenant(tenant_id, &site_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(site))
}

/// PATCH /api/sites/:siteId/location — END_USER exige propiedad.
#[instrument(skip(application_state, scope, payload))]
pub async fn handle_patch_site_location(
    State(application_state): State<AppState>,
    scope: TenantScope,
    Path(site_id): Path<String>,
    ValidatedJson(payload): ValidatedJson<LocationPatchPayload>,
) -> Result<impl IntoResponse, ApiError> {
    scope.require_role(&[
        Role::TenantAdmin,
        Role::Installer,
        Role::SupportAgent,
        Role::EndUser,
    ])?;
    let tenant_id = scope.require_tenant()?.to_string();

    // Existencia acotada por tenant antes de cualquier política fina.
    application_state
        .sites
        .find_by_id_in_tenant(&tenant_id, &site_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    // Propiedad END_USER: alguna unidad del sitio debe pertenecerle.
    if scope.active_role == Some(Role::EndUser) {
        let owns_device_on_site = application_state
            .sites
            .has_device_owned_by(&site_id, &scope.user.user_id)
            .await?;
        if !owns_device_on_site {
            return Err(ApiError::Forbidden("end user does not own a device on this site".into()));
        }
    }

    if !(-90.0..=90.0).contains(&payload.lat) || !(-180.0..=180.0).contains(&payload.lon) {
        return Err(ApiError::validation("lat/lon outside WGS84 bounds"));
    }

    let site = application_state
        .sites
        .apply_manual_location(
            &tenant_id,
            &site_id,
            ManualLocationPatch {
                lat: payload.lat,
                lon: payload.lon,
                source: payload.source,
                accuracy_m: payload.accuracy_m,
                lock: payload.lock,
                address_line: payload.address,
                updated_by_user_id: scope.user.user_id.clone(),
            },
        )
        .await?;

    application_state
        .audit_best_effort(
            Some(&tenant_id),
            Some(&scope.user.user_id),
            ActorType::User,
            actions::SITE_LOCATION_UPDATED,
            "site",
            &site.id,
            json!({ "lat": payload.lat, "lon": payload.lon, "source": payload.source }),
        )
        .await;

    Ok(Json(site))
}

/// GET /api/sites/:siteId/weather?date=YYYY-MM-DD
#[instrument(skip(application_state, scope))]
pub async fn handle_get_site_weather(
    State(application_state): State<AppState>,
    scope: TenantScope,
    Path(site_id): Path<String>,
    Query(query): Query<WeatherQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let tenant_id = scope.require_tenant()?;

    application_state
        .sites
        .find_by_id_in_tenant(tenant_id, &site_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let date = match query.date {
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map_err(|_| ApiError::validation("date must be YYYY-MM-DD"))?,
        None => Utc::now().date_naive(),
    };

    let observation = application_state.weather.find_observation(&site_id, date).await?;
    Ok(Json(observation))
}
