// [apps/control-plane/src/handlers/mod.rs]
/*!
 * APARATO: API HANDLER MATRIX (ESTRATO L3-API)
 * RESPONSABILIDAD: ADAPTADORES HTTP FINOS SOBRE REPOSITORIOS Y POLÍTICA
 */

/// Registro y login de principales humanos.
pub mod auth;
/// Alta y listado de organizaciones.
pub mod tenants;
/// Invitaciones y gestión de roles.
pub mod users;
/// Sitios físicos, parcheo de ubicación y clima.
pub mod sites;
/// Inventario de unidades, gemelo, mapa y alta masiva.
pub mod devices;
/// Ingesta de telemetría autenticada por dispositivo.
pub mod telemetry;
/// Cola de comandos: creación, poll y acuse.
pub mod commands;
/// Reglas y eventos de alerta.
pub mod alerts;
/// Catálogo de firmware y trabajos OTA.
pub mod ota;
/// Banderas de funcionalidad.
pub mod entitlements;
/// Canales de notificación por tenant.
pub mod notifications;
/// Acciones contra el operador SIM.
pub mod sim;
/// Visor del registro de auditoría.
pub mod audit;
/// KPIs del tablero y salud del proceso.
pub mod dashboard;
