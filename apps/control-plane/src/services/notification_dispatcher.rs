// [apps/control-plane/src/services/notification_dispatcher.rs]
/*!
 * =================================================================
 * APARATO: NOTIFICATION DISPATCHER SERVICE (V2.8 - OUTBOX DRAIN)
 * CLASIFICACIÓN: BACKGROUND INFRASTRUCTURE (ESTRATO L4)
 * RESPONSABILIDAD: DRENAJE DEL OUTBOX HACIA ADAPTADORES DE CANAL
 *
 * # Logic:
 * Cada minuto drena hasta 100 eventos QUEUED, los más antiguos
 * primero. Éxito -> SENT con sello temporal; fallo -> FAILED con el
 * error. Fire-and-forget: el reintento es política externa al núcleo.
 * =================================================================
 */

use std::time::Duration;

use helios_domain_models::ChannelType;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::state::AppState;

/// Tope de drenaje por pasada.
const DRAIN_BATCH_LIMIT: i64 = 100;
/// Cadencia del consumidor (segundos).
const DRAIN_INTERVAL_SECONDS: u64 = 60;

#[derive(Debug, Default, Clone, Copy)]
pub struct DrainReport {
    pub drained: usize,
    pub sent: usize,
    pub failed: usize,
}

pub struct NotificationDispatcherService {
    application_state: AppState,
}

impl NotificationDispatcherService {
    pub fn new(application_state: AppState) -> Self {
        Self { application_state }
    }

    pub fn spawn_daemon(self) {
        let mut drain_ticker = interval(Duration::from_secs(DRAIN_INTERVAL_SECONDS));
        drain_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("📮 [NOTIFIER]: Outbox drain daemon active. Cadence: {}s.", DRAIN_INTERVAL_SECONDS);

        tokio::spawn(async move {
            loop {
                drain_ticker.tick().await;
                match drain_once(&self.application_state).await {
                    Ok(report) if report.drained > 0 => {
                        info!(
                            "📮 [NOTIFIER]: Drained {} (sent {}, failed {}).",
                            report.drained, report.sent, report.failed
                        );
                    }
                    Ok(_) => {}
                    Err(drain_fault) => {
                        error!("❌ [NOTIFIER]: Drain pass collapsed: {}", drain_fault);
                    }
                }
            }
        });
    }
}

/**
 * Una pasada del consumidor. Pública para el proving grounds.
 */
pub async fn drain_once(
    application_state: &AppState,
) -> Result<DrainReport, helios_infra_db::DbError> {
    let queued_events = application_state
        .notifications
        .fetch_queued_oldest_first(DRAIN_BATCH_LIMIT)
        .await?;

    let mut report = DrainReport { drained: queued_events.len(), ..Default::default() };

    for event in queued_events {
        // Canal ausente o deshabilitado: la fila muere en FAILED.
        let channel = match application_state
            .notifications
            .find_channel_by_id(&event.channel_id)
            .await?
        {
            Some(channel) => channel,
            None => {
                application_state
                    .notifications
                    .mark_failed(&event.id, "channel no longer exists")
                    .await?;
                report.failed += 1;
                continue;
            }
        };

        let adapter = match channel.channel_type {
            ChannelType::Email => &application_state.email_adapter,
            ChannelType::Sms => &application_state.sms_adapter,
            ChannelType::Webhook => &application_state.webhook_adapter,
        };

        match adapter.dispatch(&channel.config, &event.payload).await {
            Ok(()) => {
                application_state.notifications.mark_sent(&event.id).await?;
                report.sent += 1;
            }
            Err(adapter_fault) => {
                // El fallo del adaptador jamás aflora: la fila lo absorbe.
                warn!("⚠️ [NOTIFIER]: Event {} failed: {}", event.id, adapter_fault);
                application_state
                    .notifications
                    .mark_failed(&event.id, &adapter_fault.to_string())
                    .await?;
                report.failed += 1;
            }
        }
    }

    Ok(report)
}
