//! Passive listener for CFR broadcasts from the stats worker

use futures::StreamExt;
use shared::{CfrReply, Message, MessageBus, Result, SUBJECT_EVENTS_ALL};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache_key::ALL_COUNTRIES;
use crate::observability::record_cfr;

/// Subscribes to `stats.events.*` and spawns the task that consumes it.
///
/// The subscription is in place when this returns, so no broadcast sent
/// afterwards is missed.
pub async fn start_cfr_listener(bus: Arc<dyn MessageBus>) -> Result<JoinHandle<()>> {
    let mut events = bus
        .subscribe(SUBJECT_EVENTS_ALL)
        .await
        .map_err(|e| shared::AppError::service_unavailable(format!("message bus: {}", e)))?;

    info!(subject = SUBJECT_EVENTS_ALL, "CFR event listener started");

    Ok(tokio::spawn(async move {
        while let Some(message) = events.next().await {
            handle_event(&message);
        }
        warn!("CFR event stream ended");
    }))
}

fn handle_event(message: &Message) -> Option<CfrReply> {
    match serde_json::from_slice::<CfrReply>(&message.payload) {
        Ok(event) => {
            let country = event.country.as_deref().unwrap_or(ALL_COUNTRIES);
            record_cfr(country, event.cfr, event.total_cases, event.total_deaths);
            debug!(subject = %message.subject, country = %country, cfr = ?event.cfr, "Recorded CFR event");
            Some(event)
        }
        Err(e) => {
            warn!(subject = %message.subject, "Ignoring undecodable stats event: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::{COVID_CASES_TOTAL, COVID_CFR_RATIO};
    use shared::{MemoryBus, SUBJECT_EVENTS_CFR};
    use std::time::Duration;

    #[test]
    fn test_undecodable_event_is_ignored() {
        let message = Message {
            subject: SUBJECT_EVENTS_CFR.to_string(),
            reply_to: None,
            payload: b"{\"cfr\":".to_vec(),
        };
        assert!(handle_event(&message).is_none());
    }

    #[tokio::test]
    async fn test_broadcast_updates_gauges() {
        let bus = Arc::new(MemoryBus::new());
        let handle = start_cfr_listener(bus.clone()).await.unwrap();

        let event = CfrReply::new(Some("Listenerland".to_string()), 200, 10);
        bus.publish(SUBJECT_EVENTS_CFR, serde_json::to_vec(&event).unwrap())
            .await
            .unwrap();

        let mut recorded = false;
        for _ in 0..100 {
            if COVID_CASES_TOTAL.with_label_values(&["Listenerland"]).get() == 200 {
                recorded = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(recorded, "broadcast was not recorded");
        assert_eq!(COVID_CFR_RATIO.with_label_values(&["Listenerland"]).get(), 5.0);

        handle.abort();
    }
}
